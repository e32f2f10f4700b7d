//! Driver provisioning through tunnels.
//!
//! `TunnelDriverProvisioner` is the only caller of a [`TunnelProvider`]. It
//! consults the [`ResourceCache`] first and, on a miss, allocates a local
//! port, asks the provider for a tunnel bound to it, and caches the result.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TableGateError};
use crate::models::ConnectionDescriptor;
use crate::services::cache::{CachedResource, ResourceCache};
use crate::services::driver::Driver;

/// Transport-specific failure reported by a tunnel provider.
pub type TunnelError = Box<dyn std::error::Error + Send + Sync>;

/// Handle to an open tunnel. Dropping it stops the tunnel.
pub struct TunnelHandle {
    /// Local port the tunnel listens on
    local_port: u16,
    /// Cancellation token to stop the tunnel
    cancel_token: CancellationToken,
}

impl TunnelHandle {
    /// Create a handle for a tunnel listening on `local_port`.
    pub fn new(local_port: u16, cancel_token: CancellationToken) -> Self {
        Self { local_port, cancel_token }
    }

    /// Local port the tunnel listens on.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Stop the tunnel.
    pub fn stop(&self) {
        if !self.cancel_token.is_cancelled() {
            self.cancel_token.cancel();
            tracing::info!(local_port = self.local_port, "Tunnel stopped");
        }
    }

    /// Whether the tunnel has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// A tunnel together with the driver bound through it.
pub struct EstablishedTunnel {
    /// Driver connected to the local tunnel endpoint
    pub driver: Arc<dyn Driver>,
    /// Tunnel lifetime handle
    pub tunnel: TunnelHandle,
}

/// Opens a secure channel to the database described by a descriptor.
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Establish a tunnel listening on `local_port` and bind a driver to it.
    async fn establish(
        &self,
        descriptor: &ConnectionDescriptor,
        local_port: u16,
    ) -> std::result::Result<EstablishedTunnel, TunnelError>;
}

/// Hands out free local ports for tunnel endpoints.
pub trait PortAllocator: Send + Sync {
    /// Return a port that is currently free on the loopback interface.
    fn acquire_port(&self) -> std::io::Result<u16>;
}

/// Allocates ports by letting the OS pick one for a throwaway listener.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPortAllocator;

impl PortAllocator for LocalPortAllocator {
    fn acquire_port(&self) -> std::io::Result<u16> {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
        Ok(listener.local_addr()?.port())
    }
}

/// Resolves descriptors to live drivers, building tunnels on cache misses.
pub struct TunnelDriverProvisioner {
    cache: Arc<ResourceCache>,
    tunnels: Arc<dyn TunnelProvider>,
    ports: Arc<dyn PortAllocator>,
}

impl TunnelDriverProvisioner {
    /// Create a provisioner over an explicit cache instance.
    pub fn new(
        cache: Arc<ResourceCache>,
        tunnels: Arc<dyn TunnelProvider>,
        ports: Arc<dyn PortAllocator>,
    ) -> Self {
        Self { cache, tunnels, ports }
    }

    /// Get the cache this provisioner stores into.
    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// Get a driver for the descriptor, reusing a cached one when present.
    pub async fn get_driver(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn Driver>> {
        Ok(self.get_resource(descriptor).await?.driver())
    }

    /// Get the cached resource for the descriptor, building it if absent.
    ///
    /// Any tunnel failure surfaces as `ConnectionEstablishmentFailed`.
    pub async fn get_resource(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<CachedResource>> {
        if !descriptor.engine.is_mysql_family() {
            return Err(TableGateError::unsupported_engine(descriptor.engine.as_str()));
        }

        if let Some(resource) = self.cache.get(descriptor) {
            tracing::trace!(resource_id = %resource.id(), "Reusing cached driver");
            return Ok(resource);
        }

        self.cache.get_or_try_init(descriptor, || self.build(descriptor)).await
    }

    async fn build(&self, descriptor: &ConnectionDescriptor) -> Result<CachedResource> {
        let local_port = self.ports.acquire_port().map_err(|e| {
            tracing::warn!(error = %e, "No free local port for tunnel");
            TableGateError::connection_failed_with_source("Failed to allocate a local port", e)
        })?;

        tracing::debug!(
            descriptor = %descriptor.display_url(),
            local_port,
            "Establishing tunnel"
        );

        let established = self.tunnels.establish(descriptor, local_port).await.map_err(|e| {
            tracing::warn!(
                descriptor = %descriptor.display_url(),
                error = %e,
                "Tunnel establishment failed"
            );
            TableGateError::ConnectionEstablishmentFailed {
                message: format!("Tunnel to {} failed", descriptor.display_url()),
                source: Some(e),
            }
        })?;

        let resource = CachedResource::new(established);
        tracing::info!(
            resource_id = %resource.id(),
            descriptor = %descriptor.display_url(),
            local_port,
            "Tunnel and driver ready"
        );
        Ok(resource)
    }
}
