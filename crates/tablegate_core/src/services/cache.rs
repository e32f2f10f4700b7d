//! Process-wide cache of tunneled drivers keyed by connection descriptor.
//!
//! Each descriptor owns one `OnceCell`. Concurrent first callers for the
//! same descriptor wait on that cell, so only one tunnel is ever built per
//! descriptor. Failed builds leave the cell empty and are retried by the
//! next caller.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::Result;
use crate::models::ConnectionDescriptor;
use crate::services::driver::Driver;
use crate::services::tunnel::{EstablishedTunnel, TunnelHandle};

/// A tunnel and the driver bound through it.
pub struct CachedResource {
    /// Unique identifier used in logs
    id: Uuid,
    /// Driver connected through the tunnel
    driver: Arc<dyn Driver>,
    /// Keeps the tunnel open while the resource lives
    tunnel: TunnelHandle,
    /// When this resource was built
    created_at: DateTime<Utc>,
}

impl CachedResource {
    /// Wrap a freshly established tunnel.
    pub fn new(established: EstablishedTunnel) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver: established.driver,
            tunnel: established.tunnel,
            created_at: Utc::now(),
        }
    }

    /// Get the resource's unique identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get a shared handle to the driver.
    pub fn driver(&self) -> Arc<dyn Driver> {
        Arc::clone(&self.driver)
    }

    /// Local port the tunnel listens on.
    pub fn local_port(&self) -> u16 {
        self.tunnel.local_port()
    }

    /// Get when this resource was built.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Close the driver pool and stop the tunnel.
    pub async fn shutdown(&self) {
        self.driver.close().await;
        self.tunnel.stop();
        tracing::info!(resource_id = %self.id, "Cached resource shut down");
    }
}

type Slot = Arc<OnceCell<Arc<CachedResource>>>;

/// Descriptor-keyed cache holding at most one live resource per descriptor.
#[derive(Default)]
pub struct ResourceCache {
    entries: RwLock<HashMap<ConnectionDescriptor, Slot>>,
}

impl ResourceCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a built resource.
    pub fn get(&self, descriptor: &ConnectionDescriptor) -> Option<Arc<CachedResource>> {
        self.entries.read().get(descriptor).and_then(|slot| slot.get().cloned())
    }

    /// Store a resource, replacing any previous one for the descriptor.
    ///
    /// A replaced resource that was already built is shut down.
    pub async fn put(&self, descriptor: ConnectionDescriptor, resource: Arc<CachedResource>) {
        let slot = Arc::new(OnceCell::new_with(Some(Arc::clone(&resource))));
        let replaced = self.entries.write().insert(descriptor, slot);

        if let Some(old) = replaced.and_then(|slot| slot.get().cloned()) {
            if !Arc::ptr_eq(&old, &resource) {
                old.shutdown().await;
                tracing::debug!(resource_id = %old.id(), "Replaced cached resource");
            }
        }
    }

    /// Return the cached resource or build it exactly once.
    ///
    /// Concurrent callers with equal descriptors share one `build` call.
    /// Errors are returned to the caller whose build failed and not stored.
    pub async fn get_or_try_init<F, Fut>(
        &self,
        descriptor: &ConnectionDescriptor,
        build: F,
    ) -> Result<Arc<CachedResource>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedResource>>,
    {
        let slot = self.slot(descriptor);
        let resource =
            slot.get_or_try_init(move || async move { build().await.map(Arc::new) }).await?;
        Ok(Arc::clone(resource))
    }

    /// Remove and shut down the resource for a descriptor.
    ///
    /// Returns true if a built resource was evicted.
    pub async fn evict(&self, descriptor: &ConnectionDescriptor) -> bool {
        let slot = self.entries.write().remove(descriptor);
        match slot.and_then(|slot| slot.get().cloned()) {
            Some(resource) => {
                resource.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Remove and shut down every resource.
    pub async fn clear(&self) {
        let slots: Vec<Slot> = self.entries.write().drain().map(|(_, slot)| slot).collect();
        for resource in slots.iter().filter_map(|slot| slot.get()) {
            resource.shutdown().await;
        }
    }

    /// Number of built resources.
    pub fn len(&self) -> usize {
        self.entries.read().values().filter(|slot| slot.initialized()).count()
    }

    /// Whether no resource is built.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, descriptor: &ConnectionDescriptor) -> Slot {
        if let Some(slot) = self.entries.read().get(descriptor) {
            return Arc::clone(slot);
        }
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(descriptor.clone()).or_default())
    }
}
