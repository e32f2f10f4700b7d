//! Engine-wide configuration.

use serde::{Deserialize, Serialize};

use crate::error::TableGateError;

/// Tunables shared by every cached connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Page used when the caller gives none or a non-positive one
    pub default_page: u64,
    /// Page size used when neither caller nor settings give one
    pub default_per_page: u64,
    /// Row cap for autocomplete responses
    pub autocomplete_row_limit: u64,
    /// Driver connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Minimum idle connections per cached driver
    pub pool_min_connections: usize,
    /// Maximum live connections per cached driver
    pub pool_max_connections: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page: 1,
            default_per_page: 20,
            autocomplete_row_limit: 20,
            connect_timeout_secs: 15,
            pool_min_connections: 0,
            pool_max_connections: 1,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON document. Missing keys keep defaults.
    pub fn from_json_str(json: &str) -> Result<Self, TableGateError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TableGateError::config(format!("Invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), TableGateError> {
        if self.default_page == 0 {
            return Err(TableGateError::config("default_page must be at least 1"));
        }
        if self.default_per_page == 0 {
            return Err(TableGateError::config("default_per_page must be at least 1"));
        }
        if self.autocomplete_row_limit == 0 {
            return Err(TableGateError::config("autocomplete_row_limit must be at least 1"));
        }
        if self.pool_max_connections == 0 {
            return Err(TableGateError::config("pool_max_connections must be at least 1"));
        }
        if self.pool_min_connections > self.pool_max_connections {
            return Err(TableGateError::config(
                "pool_min_connections cannot exceed pool_max_connections",
            ));
        }
        Ok(())
    }

    /// Set the default page size.
    pub fn with_default_per_page(mut self, per_page: u64) -> Self {
        self.default_per_page = per_page;
        self
    }

    /// Set the autocomplete row cap.
    pub fn with_autocomplete_row_limit(mut self, limit: u64) -> Self {
        self.autocomplete_row_limit = limit;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }
}
