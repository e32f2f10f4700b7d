//! Backend services for the table access engine.
//!
//! This module contains all service layer abstractions:
//! - `driver` - Driver trait and the mysql_async implementation
//! - `cache` - Descriptor-keyed cache of tunneled drivers
//! - `tunnel` - Driver provisioning through tunnels
//! - `ssh_tunnel` - SSH tunnel provider on russh
//! - `schema` - Catalog introspection
//! - `criteria` - Filter, search and autocomplete compilation
//! - `reader` - Row listing and lookups
//! - `writer` - Row insert, update and delete
//! - `validator` - Settings cross-checks
//! - `dao` - Per-descriptor operation facade

pub mod cache;
pub mod criteria;
pub mod dao;
pub mod driver;
pub mod reader;
pub mod schema;
pub mod ssh_tunnel;
pub mod tunnel;
pub mod validator;
pub mod writer;

pub use cache::{CachedResource, ResourceCache};
pub use criteria::{CriteriaCompiler, Predicate, SelectPlan};
pub use dao::TableDao;
pub use driver::{Driver, ExecResult, MySqlDriver};
pub use reader::RowReader;
pub use schema::SchemaIntrospector;
pub use ssh_tunnel::SshTunnelProvider;
pub use tunnel::{
    EstablishedTunnel, LocalPortAllocator, PortAllocator, TunnelDriverProvisioner, TunnelHandle,
    TunnelProvider,
};
pub use validator::{FieldSettingsValidator, SettingsValidator};
pub use writer::RowWriter;
