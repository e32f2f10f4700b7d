//! Process-level state.
//!
//! Owns the resource cache and the provisioner shared by every DAO. Nothing
//! here is global: callers create one `TableGateState` and pass it around.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{Result, TableGateError};
use crate::models::ConnectionDescriptor;
use crate::services::{
    FieldSettingsValidator, LocalPortAllocator, PortAllocator, ResourceCache, SettingsValidator,
    SshTunnelProvider, TableDao, TunnelDriverProvisioner, TunnelProvider,
};

/// Shared engine state.
pub struct TableGateState {
    config: EngineConfig,
    cache: Arc<ResourceCache>,
    provisioner: Arc<TunnelDriverProvisioner>,
    validator: Arc<dyn SettingsValidator>,
}

impl TableGateState {
    /// Create state that opens SSH tunnels on OS-assigned local ports.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let tunnels = Arc::new(SshTunnelProvider::new(config.clone()));
        Self::with_providers(config, tunnels, Arc::new(LocalPortAllocator))
    }

    /// Create state with explicit tunnel and port collaborators.
    pub fn with_providers(
        config: EngineConfig,
        tunnels: Arc<dyn TunnelProvider>,
        ports: Arc<dyn PortAllocator>,
    ) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(ResourceCache::new());
        let provisioner =
            Arc::new(TunnelDriverProvisioner::new(Arc::clone(&cache), tunnels, ports));

        tracing::info!(
            default_per_page = config.default_per_page,
            autocomplete_row_limit = config.autocomplete_row_limit,
            "TableGateState initialized"
        );

        Ok(Self { config, cache, provisioner, validator: Arc::new(FieldSettingsValidator) })
    }

    /// Replace the settings validator.
    pub fn with_validator(mut self, validator: Arc<dyn SettingsValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Operation facade for `descriptor`.
    pub fn dao(&self, descriptor: ConnectionDescriptor) -> Result<TableDao> {
        descriptor.validate().map_err(TableGateError::invalid_request)?;

        Ok(TableDao::new(
            descriptor,
            Arc::clone(&self.provisioner),
            Arc::clone(&self.validator),
            self.config.clone(),
        ))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub fn provisioner(&self) -> &Arc<TunnelDriverProvisioner> {
        &self.provisioner
    }

    /// Close every cached driver and tunnel.
    pub async fn shutdown(&self) {
        let open = self.cache.len();
        self.cache.clear().await;
        tracing::info!(closed = open, "TableGateState shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FixedPortAllocator, MockDriver, MockTunnel};

    fn state(driver: MockDriver) -> TableGateState {
        TableGateState::with_providers(
            EngineConfig::default(),
            Arc::new(MockTunnel::new(driver)),
            Arc::new(FixedPortAllocator(4400)),
        )
        .unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig { pool_max_connections: 0, ..Default::default() };
        let result = TableGateState::with_providers(
            config,
            Arc::new(MockTunnel::new(MockDriver::new())),
            Arc::new(FixedPortAllocator(4400)),
        );
        assert!(matches!(result, Err(TableGateError::Config { .. })));
    }

    #[test]
    fn invalid_descriptor_is_rejected() {
        let state = state(MockDriver::new());
        let descriptor = ConnectionDescriptor::new("", "shop", "admin", "pw");
        assert!(matches!(state.dao(descriptor), Err(TableGateError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn daos_share_the_cache_and_shutdown_closes_it() {
        let driver = MockDriver::new();
        let state = state(driver.clone());
        let descriptor = ConnectionDescriptor::new("db.internal", "shop", "admin", "pw");

        assert!(state.dao(descriptor.clone()).unwrap().test_connection().await);
        assert!(state.dao(descriptor).unwrap().test_connection().await);
        assert_eq!(state.cache().len(), 1);

        state.shutdown().await;
        assert!(state.cache().is_empty());
        assert!(driver.is_closed());
    }
}
