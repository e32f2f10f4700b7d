//! Schema introspection service.
//!
//! Queries MySQL `information_schema` views for column definitions, primary
//! keys, foreign keys and table names. Results are normalized into the
//! canonical model types and never cached: every call reads the live catalog.

use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::helpers::{first_number, is_auto_increment, lowercase_keys, rename_key};
use crate::models::column_type::{parse_list_values, ListKind};
use crate::models::{ColumnInfo, ForeignKeyInfo, PrimaryKeyColumn, Row, AUTO_INCREMENT};
use crate::services::driver::Driver;

pub(crate) const COLUMNS_QUERY: &str = r#"
    SELECT
        COLUMN_NAME,
        COLUMN_DEFAULT,
        DATA_TYPE,
        COLUMN_TYPE,
        IS_NULLABLE,
        EXTRA,
        CHARACTER_MAXIMUM_LENGTH
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

pub(crate) const PRIMARY_KEYS_QUERY: &str = r#"
    SELECT
        k.COLUMN_NAME AS COLUMN_NAME,
        c.DATA_TYPE AS DATA_TYPE
    FROM information_schema.TABLE_CONSTRAINTS t
    JOIN information_schema.KEY_COLUMN_USAGE k
        ON k.CONSTRAINT_NAME = t.CONSTRAINT_NAME
        AND k.TABLE_SCHEMA = t.TABLE_SCHEMA
        AND k.TABLE_NAME = t.TABLE_NAME
    JOIN information_schema.COLUMNS c
        ON c.TABLE_SCHEMA = k.TABLE_SCHEMA
        AND c.TABLE_NAME = k.TABLE_NAME
        AND c.COLUMN_NAME = k.COLUMN_NAME
    WHERE t.CONSTRAINT_TYPE = 'PRIMARY KEY'
        AND t.TABLE_SCHEMA = ?
        AND t.TABLE_NAME = ?
    ORDER BY k.ORDINAL_POSITION
"#;

pub(crate) const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        COLUMN_NAME,
        CONSTRAINT_NAME,
        REFERENCED_TABLE_NAME,
        REFERENCED_COLUMN_NAME
    FROM information_schema.KEY_COLUMN_USAGE
    WHERE TABLE_SCHEMA = ?
        AND TABLE_NAME = ?
        AND REFERENCED_TABLE_NAME IS NOT NULL
    ORDER BY ORDINAL_POSITION
"#;

pub(crate) const TABLES_QUERY: &str = r#"
    SELECT TABLE_NAME
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = ?
    ORDER BY TABLE_NAME
"#;

/// Schema introspection service scoped to one database.
pub struct SchemaIntrospector {
    driver: Arc<dyn Driver>,
    database: String,
}

impl SchemaIntrospector {
    /// Create an introspector reading the catalog of `database`.
    pub fn new(driver: Arc<dyn Driver>, database: impl Into<String>) -> Self {
        Self { driver, database: database.into() }
    }

    /// Load the normalized column definitions of a table.
    pub async fn get_structure(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = self.driver.query(COLUMNS_QUERY, &self.scope(table)).await?;
        tracing::debug!(table, column_count = rows.len(), "Loaded table structure");
        Ok(rows.into_iter().map(normalize_column).collect())
    }

    /// Load the primary-key columns of a table in key order.
    pub async fn get_primary_keys(&self, table: &str) -> Result<Vec<PrimaryKeyColumn>> {
        let rows = self.driver.query(PRIMARY_KEYS_QUERY, &self.scope(table)).await?;

        Ok(rows
            .into_iter()
            .map(lowercase_keys)
            .map(|row| PrimaryKeyColumn {
                column_name: text(&row, "column_name").unwrap_or_default(),
                data_type: text(&row, "data_type").unwrap_or_default(),
            })
            .collect())
    }

    /// Load the foreign keys declared on a table.
    pub async fn get_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        let rows = self.driver.query(FOREIGN_KEYS_QUERY, &self.scope(table)).await?;

        Ok(rows
            .into_iter()
            .map(lowercase_keys)
            .map(|row| ForeignKeyInfo {
                column_name: text(&row, "column_name").unwrap_or_default(),
                constraint_name: text(&row, "constraint_name").unwrap_or_default(),
                referenced_table_name: text(&row, "referenced_table_name").unwrap_or_default(),
                referenced_column_name: text(&row, "referenced_column_name").unwrap_or_default(),
            })
            .collect())
    }

    /// List every table and view in the database.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self.driver.query(TABLES_QUERY, &[Value::from(self.database.as_str())]).await?;

        Ok(rows
            .into_iter()
            .map(lowercase_keys)
            .filter_map(|row| text(&row, "table_name"))
            .collect())
    }

    fn scope(&self, table: &str) -> [Value; 2] {
        [Value::from(self.database.as_str()), Value::from(table)]
    }
}

/// Normalize one raw `information_schema.COLUMNS` row.
///
/// Keys are lower-cased first. An `auto_increment` extra replaces the default
/// with the sentinel, `IS_NULLABLE` becomes the boolean `allow_null`, enum and
/// set literals are parsed out of the column type, and a missing character
/// length falls back to the first number in the column type.
pub fn normalize_column(raw: Row) -> ColumnInfo {
    let mut row = lowercase_keys(raw);

    let extra = text(&row, "extra").unwrap_or_default();
    if is_auto_increment(&extra) {
        row.insert("column_default".to_string(), Value::from(AUTO_INCREMENT));
    }

    let nullable = text(&row, "is_nullable").is_some_and(|marker| marker == "YES");
    row.insert("is_nullable".to_string(), Value::Bool(nullable));
    rename_key(&mut row, "is_nullable", "allow_null");

    let data_type = text(&row, "data_type").unwrap_or_default();
    let column_type = text(&row, "column_type").unwrap_or_default();

    let data_type_params = ListKind::from_data_type(&data_type)
        .and_then(|kind| parse_list_values(kind, &column_type));

    let character_maximum_length =
        row.get("character_maximum_length").and_then(number).or_else(|| first_number(&column_type));

    ColumnInfo {
        column_name: text(&row, "column_name").unwrap_or_default(),
        column_default: text(&row, "column_default"),
        allow_null: row.get("allow_null").and_then(Value::as_bool).unwrap_or(false),
        data_type,
        column_type,
        extra,
        character_maximum_length,
        data_type_params,
    }
}

fn text(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
