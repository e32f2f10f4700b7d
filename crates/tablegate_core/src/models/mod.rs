//! Data models for the table access engine.
//!
//! - `connection` - ConnectionDescriptor, EngineType, SshTunnelConfig
//! - `schema` - ColumnInfo, PrimaryKeyColumn, ForeignKeyInfo
//! - `column_type` - enum/set column type parser
//! - `settings` - TableSettings
//! - `query` - filters, autocomplete and listing results

pub mod column_type;
pub mod connection;
pub mod query;
pub mod schema;
pub mod settings;

pub use connection::{
    ConnectionDescriptor, ConnectionDescriptorBuilder, EngineType, SshAuthMethod, SshTunnelConfig,
};
pub use query::{
    AutocompleteSpec, FilterCriterion, FilterEntry, Pagination, Row, RowsQuery, RowsResult,
    MATCH_ALL,
};
pub use schema::{ColumnInfo, ForeignKeyInfo, PrimaryKeyColumn, AUTO_INCREMENT};
pub use settings::{OrderDirection, TableSettings};
