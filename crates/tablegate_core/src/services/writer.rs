//! Row insert, update and delete.
//!
//! Statement failures surface as `Mutation` errors carrying the driver's
//! message. Catalog lookups made along the way keep their `Query` kind.

use serde_json::Value;
use std::sync::Arc;

use crate::error::{Result, TableGateError};
use crate::helpers::quote_identifier;
use crate::models::{ColumnInfo, Row};
use crate::services::driver::Driver;
use crate::services::reader::key_predicate;
use crate::services::schema::SchemaIntrospector;

const LAST_INSERT_ID_QUERY: &str = "SELECT LAST_INSERT_ID() AS id";

/// Writes rows into one table through a driver.
pub struct RowWriter {
    driver: Arc<dyn Driver>,
    schema: SchemaIntrospector,
}

impl RowWriter {
    pub fn new(driver: Arc<dyn Driver>, database: impl Into<String>) -> Self {
        Self { schema: SchemaIntrospector::new(Arc::clone(&driver), database), driver }
    }

    /// Insert a row and return its primary key.
    ///
    /// Only the first primary-key column is considered. When its default is
    /// the auto-increment sentinel the generated id reported by the INSERT's
    /// own connection is returned, otherwise
    /// the supplied value is echoed. Tables without a primary key return
    /// `None`.
    pub async fn add_row(&self, table: &str, row: Row) -> Result<Option<Row>> {
        let structure = self.schema.get_structure(table).await?;
        let row = serialize_json_columns(row, &structure);

        let primary_keys = self.schema.get_primary_keys(table).await?;
        let primary_key = primary_keys.first();
        if primary_keys.len() > 1 {
            tracing::debug!(
                table,
                key_count = primary_keys.len(),
                "Composite primary key, using first column"
            );
        }

        let (columns, params): (Vec<String>, Vec<Value>) =
            row.iter().map(|(k, v)| (quote_identifier(k), v.clone())).unzip();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            columns.join(", "),
            vec!["?"; params.len()].join(", ")
        );

        let inserted =
            self.driver.execute(&sql, &params).await.map_err(TableGateError::into_mutation)?;

        let Some(primary_key) = primary_key else {
            tracing::debug!(table, "Row inserted into table without primary key");
            return Ok(None);
        };

        let generated = structure
            .iter()
            .find(|c| c.column_name == primary_key.column_name)
            .is_some_and(ColumnInfo::is_auto_increment);

        let value = if !generated {
            row.get(&primary_key.column_name).cloned().unwrap_or(Value::Null)
        } else if let Some(id) = inserted.last_insert_id {
            Value::from(id)
        } else {
            // Driver did not report the id; ask the session.
            let rows = self.driver.query(LAST_INSERT_ID_QUERY, &[]).await?;
            rows.first().and_then(|r| r.get("id")).cloned().ok_or_else(|| {
                TableGateError::internal(format!("No generated id returned for {table}"))
            })?
        };

        tracing::debug!(table, primary_key = %primary_key.column_name, generated, "Row inserted");

        let mut result = Row::new();
        result.insert(primary_key.column_name.clone(), value);
        Ok(Some(result))
    }

    /// Update the rows matching every primary-key value and return the keys.
    pub async fn update_row(&self, table: &str, row: Row, primary_key: &Row) -> Result<Row> {
        let predicate = key_predicate(primary_key)?;
        if row.is_empty() {
            return Err(TableGateError::invalid_request("No columns to update"));
        }

        let structure = self.schema.get_structure(table).await?;
        let row = serialize_json_columns(row, &structure);

        let assignments: Vec<String> =
            row.keys().map(|k| format!("{} = ?", quote_identifier(k))).collect();
        let mut params: Vec<Value> = row.values().cloned().collect();

        let mut sql =
            format!("UPDATE {} SET {} WHERE ", quote_identifier(table), assignments.join(", "));
        predicate.render(&mut sql, &mut params);

        let result =
            self.driver.execute(&sql, &params).await.map_err(TableGateError::into_mutation)?;
        tracing::debug!(table, affected_rows = result.affected_rows, "Row updated");

        Ok(primary_key.clone())
    }

    /// Delete the rows matching every primary-key value and return the keys.
    pub async fn delete_row(&self, table: &str, primary_key: &Row) -> Result<Row> {
        let predicate = key_predicate(primary_key)?;

        let mut sql = format!("DELETE FROM {} WHERE ", quote_identifier(table));
        let mut params = Vec::new();
        predicate.render(&mut sql, &mut params);

        let result =
            self.driver.execute(&sql, &params).await.map_err(TableGateError::into_mutation)?;
        tracing::debug!(table, affected_rows = result.affected_rows, "Row deleted");

        Ok(primary_key.clone())
    }
}

/// Replace values of `json` columns with their JSON text. NULL stays NULL.
fn serialize_json_columns(mut row: Row, structure: &[ColumnInfo]) -> Row {
    for column in structure.iter().filter(|c| c.is_json()) {
        if let Some(value) = row.get_mut(&column.column_name) {
            if !value.is_null() {
                *value = Value::String(value.to_string());
            }
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schema::{COLUMNS_QUERY, PRIMARY_KEYS_QUERY};
    use crate::test_support::{catalog_column, catalog_primary_key, row, MockDriver};
    use serde_json::json;

    fn writer(driver: &MockDriver) -> RowWriter {
        RowWriter::new(Arc::new(driver.clone()), "shop")
    }

    fn orders_driver(pk_extra: &str) -> MockDriver {
        let driver = MockDriver::new();
        driver.respond(
            COLUMNS_QUERY,
            vec![
                catalog_column("id", "int", "int", false, pk_extra),
                catalog_column("meta", "json", "json", true, ""),
                catalog_column("note", "varchar", "varchar(45)", true, ""),
            ],
        );
        driver.respond(PRIMARY_KEYS_QUERY, vec![catalog_primary_key("id", "int")]);
        driver
    }

    #[tokio::test]
    async fn generated_id_falls_back_to_session_query() {
        let driver = orders_driver("auto_increment");
        driver.respond(LAST_INSERT_ID_QUERY, vec![row(json!({"id": 42}))]);

        let result = writer(&driver)
            .add_row("orders", row(json!({"meta": {"a": 1}, "note": "x"})))
            .await
            .unwrap();

        assert_eq!(result, Some(row(json!({"id": 42}))));
        let insert = &driver.calls_matching("INSERT INTO")[0];
        assert_eq!(insert.sql, "INSERT INTO `orders` (`meta`, `note`) VALUES (?, ?)");
        assert_eq!(insert.params, vec![json!(r#"{"a":1}"#), json!("x")]);
        assert_eq!(driver.calls_matching("LAST_INSERT_ID").len(), 1);
    }

    #[tokio::test]
    async fn generated_id_comes_from_the_insert_connection() {
        let driver = orders_driver("auto_increment");
        driver.report_insert_id(77);
        // A follow-up session query would see another request's insert.
        driver.respond(LAST_INSERT_ID_QUERY, vec![row(json!({"id": 78}))]);

        let result = writer(&driver).add_row("orders", row(json!({"note": "x"}))).await.unwrap();

        assert_eq!(result, Some(row(json!({"id": 77}))));
        assert!(driver.calls_matching("LAST_INSERT_ID").is_empty());
    }

    #[tokio::test]
    async fn supplied_key_insert_echoes_value() {
        let driver = orders_driver("");

        let result =
            writer(&driver).add_row("orders", row(json!({"id": 7, "note": "x"}))).await.unwrap();

        assert_eq!(result, Some(row(json!({"id": 7}))));
        assert!(driver.calls_matching("LAST_INSERT_ID").is_empty());
    }

    #[tokio::test]
    async fn table_without_primary_key_returns_nothing() {
        let driver = MockDriver::new();
        driver.respond(COLUMNS_QUERY, vec![catalog_column("line", "text", "text", true, "")]);

        let result = writer(&driver).add_row("log", row(json!({"line": "hi"}))).await.unwrap();
        assert_eq!(result, None);
        assert_eq!(driver.calls_matching("INSERT INTO").len(), 1);
    }

    #[tokio::test]
    async fn insert_failure_is_mutation_error() {
        let driver = orders_driver("");
        driver.fail_on("INSERT INTO", "Duplicate entry '7' for key 'PRIMARY'");

        let err = writer(&driver).add_row("orders", row(json!({"id": 7}))).await.unwrap_err();
        assert!(matches!(err, TableGateError::Mutation { .. }));
        assert!(err.to_string().contains("Duplicate entry"));
    }

    #[tokio::test]
    async fn update_matches_every_key_and_serializes_json() {
        let driver = orders_driver("");
        let key = row(json!({"id": 3}));

        let result = writer(&driver)
            .update_row("orders", row(json!({"meta": [1, 2]})), &key)
            .await
            .unwrap();

        assert_eq!(result, key);
        let update = &driver.calls_matching("UPDATE")[0];
        assert_eq!(update.sql, "UPDATE `orders` SET `meta` = ? WHERE `id` = ?");
        assert_eq!(update.params, vec![json!("[1,2]"), json!(3)]);
    }

    #[tokio::test]
    async fn delete_with_composite_key() {
        let driver = MockDriver::new();
        let key = row(json!({"order_id": 1, "line": 2}));

        writer(&driver).delete_row("order_lines", &key).await.unwrap();

        let delete = &driver.calls()[0];
        assert_eq!(delete.sql, "DELETE FROM `order_lines` WHERE (`line` = ? AND `order_id` = ?)");
        assert_eq!(delete.params, vec![json!(2), json!(1)]);
    }

    #[tokio::test]
    async fn empty_keys_are_rejected_before_any_statement() {
        let driver = orders_driver("");
        let writer = writer(&driver);

        assert!(writer.delete_row("orders", &Row::new()).await.is_err());
        assert!(writer.update_row("orders", row(json!({"note": "x"})), &Row::new()).await.is_err());
        assert!(driver.calls().is_empty());
    }
}
