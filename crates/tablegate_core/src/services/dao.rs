//! Public table operations bound to one connection descriptor.
//!
//! Every operation resolves its driver through the provisioner first, so a
//! cached tunnel is reused and connection failures surface uniformly.

use serde_json::Value;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{
    ColumnInfo, ConnectionDescriptor, FilterEntry, ForeignKeyInfo, PrimaryKeyColumn, Row,
    RowsQuery, RowsResult, TableSettings,
};
use crate::services::driver::Driver;
use crate::services::reader::RowReader;
use crate::services::schema::SchemaIntrospector;
use crate::services::tunnel::TunnelDriverProvisioner;
use crate::services::validator::SettingsValidator;
use crate::services::writer::RowWriter;

/// Operation facade for the tables of one database.
pub struct TableDao {
    descriptor: ConnectionDescriptor,
    provisioner: Arc<TunnelDriverProvisioner>,
    validator: Arc<dyn SettingsValidator>,
    config: EngineConfig,
}

impl TableDao {
    pub fn new(
        descriptor: ConnectionDescriptor,
        provisioner: Arc<TunnelDriverProvisioner>,
        validator: Arc<dyn SettingsValidator>,
        config: EngineConfig,
    ) -> Self {
        Self { descriptor, provisioner, validator, config }
    }

    /// Descriptor this DAO operates on.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.schema().await?.list_tables().await
    }

    pub async fn get_structure(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.schema().await?.get_structure(table).await
    }

    pub async fn get_primary_keys(&self, table: &str) -> Result<Vec<PrimaryKeyColumn>> {
        self.schema().await?.get_primary_keys(table).await
    }

    pub async fn get_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        self.schema().await?.get_foreign_keys(table).await
    }

    /// List, filter, search or autocomplete rows.
    pub async fn get_rows(
        &self,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
    ) -> Result<RowsResult> {
        self.reader().await?.get_rows(table, settings, query).await
    }

    pub async fn count_rows(
        &self,
        table: &str,
        settings: &TableSettings,
        search: Option<&str>,
        filters: &[FilterEntry],
    ) -> Result<u64> {
        self.reader().await?.count_rows(table, settings, search, filters).await
    }

    pub async fn get_row_by_primary_key(
        &self,
        table: &str,
        primary_key: &Row,
        settings: Option<&TableSettings>,
    ) -> Result<Vec<Row>> {
        self.reader().await?.get_row_by_primary_key(table, primary_key, settings).await
    }

    pub async fn get_identity_columns(
        &self,
        table: &str,
        referenced_column: &str,
        identity_column: Option<&str>,
        values: &[Value],
    ) -> Result<Vec<Row>> {
        self.reader()
            .await?
            .get_identity_columns(table, referenced_column, identity_column, values)
            .await
    }

    /// Insert a row; see [`RowWriter::add_row`].
    pub async fn add_row(&self, table: &str, row: Row) -> Result<Option<Row>> {
        self.writer().await?.add_row(table, row).await
    }

    pub async fn update_row(&self, table: &str, row: Row, primary_key: &Row) -> Result<Row> {
        self.writer().await?.update_row(table, row, primary_key).await
    }

    pub async fn delete_row(&self, table: &str, primary_key: &Row) -> Result<Row> {
        self.writer().await?.delete_row(table, primary_key).await
    }

    /// Check settings against the live structure of `table`.
    ///
    /// Violations are returned, not raised.
    pub async fn validate_settings(
        &self,
        table: &str,
        settings: &TableSettings,
    ) -> Result<Vec<String>> {
        let structure = self.get_structure(table).await?;
        let violations = self.validator.validate(&structure, settings);
        if !violations.is_empty() {
            tracing::debug!(table, violation_count = violations.len(), "Settings rejected");
        }
        Ok(violations)
    }

    /// Liveness probe. Never fails; any error reports `false`.
    pub async fn test_connection(&self) -> bool {
        let driver = match self.driver().await {
            Ok(driver) => driver,
            Err(e) => {
                tracing::warn!(
                    descriptor = %self.descriptor.display_url(),
                    error = %e,
                    "Connection test could not acquire a driver"
                );
                return false;
            }
        };

        match driver.query("SELECT 1", &[]).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    descriptor = %self.descriptor.display_url(),
                    error = %e,
                    "Connection test query failed"
                );
                false
            }
        }
    }

    async fn driver(&self) -> Result<Arc<dyn Driver>> {
        self.provisioner.get_driver(&self.descriptor).await
    }

    async fn schema(&self) -> Result<SchemaIntrospector> {
        Ok(SchemaIntrospector::new(self.driver().await?, self.descriptor.database.as_str()))
    }

    async fn reader(&self) -> Result<RowReader> {
        Ok(RowReader::new(self.driver().await?, self.descriptor.database.as_str(), &self.config))
    }

    async fn writer(&self) -> Result<RowWriter> {
        Ok(RowWriter::new(self.driver().await?, self.descriptor.database.as_str()))
    }
}
