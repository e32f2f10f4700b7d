//! Core of the tablegate table access engine.
//!
//! Runs metadata-driven CRUD and listing operations against MySQL tables
//! reachable only through a tunnel:
//!
//! - **error**: Error handling with MySQL server codes and hints
//! - **config**: Engine-wide tunables
//! - **models**: Descriptors, schema, settings and request types
//! - **services**: Tunnels, driver cache, introspection, reads and writes
//! - **state**: Process-level state handing out per-descriptor DAOs
//! - **logging**: Structured logging setup

pub mod config;
pub mod error;
pub mod helpers;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_support;

pub use config::EngineConfig;
pub use error::{ErrorInfo, Result, TableGateError};
pub use models::{
    AutocompleteSpec, ColumnInfo, ConnectionDescriptor, EngineType, FilterCriterion, FilterEntry,
    ForeignKeyInfo, OrderDirection, Pagination, PrimaryKeyColumn, Row, RowsQuery, RowsResult,
    SshAuthMethod, SshTunnelConfig, TableSettings,
};
pub use services::{ResourceCache, TableDao, TunnelDriverProvisioner};
pub use state::TableGateState;
