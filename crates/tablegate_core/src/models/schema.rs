//! Table structure models produced by catalog introspection.
//!
//! All of these are rebuilt from the live catalog on every call.

use serde::{Deserialize, Serialize};

/// Sentinel written into `column_default` for server-generated keys.
pub const AUTO_INCREMENT: &str = "auto_increment";

/// A normalized column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub column_name: String,
    /// Default value, or `"auto_increment"` for generated keys.
    pub column_default: Option<String>,
    /// Declared type keyword (e.g. "varchar", "enum", "json").
    pub data_type: String,
    /// Full column type (e.g. "varchar(45)", "enum('a','b')").
    pub column_type: String,
    /// Whether the column accepts NULL.
    pub allow_null: bool,
    /// Catalog `EXTRA` flags (e.g. "auto_increment").
    pub extra: String,
    /// Maximum character length, if any.
    pub character_maximum_length: Option<u64>,
    /// Literal values of an enum or set column.
    pub data_type_params: Option<Vec<String>>,
}

impl ColumnInfo {
    /// Whether the server generates this column's value.
    pub fn is_auto_increment(&self) -> bool {
        self.column_default.as_deref() == Some(AUTO_INCREMENT)
    }

    /// Whether values for this column are stored as JSON documents.
    pub fn is_json(&self) -> bool {
        self.data_type.eq_ignore_ascii_case("json")
    }
}

/// A column participating in the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyColumn {
    /// Column name.
    pub column_name: String,
    /// Declared type keyword.
    pub data_type: String,
}

/// A foreign key relationship from one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Referencing column in the inspected table.
    pub column_name: String,
    /// Constraint name.
    pub constraint_name: String,
    /// Referenced table.
    pub referenced_table_name: String,
    /// Referenced column.
    pub referenced_column_name: String,
}
