//! Query driver abstraction and the MySQL implementation.
//!
//! The engine only talks to a [`Driver`]. `MySqlDriver` wraps a
//! `mysql_async` pool constrained to at most one live connection, so calls
//! against the same cached driver are serialized by the pool.

use async_trait::async_trait;
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, SslOpts};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{Result, TableGateError};
use crate::models::{ConnectionDescriptor, Row};

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    /// Rows changed by the statement.
    pub affected_rows: u64,
    /// Auto-increment value generated on the statement's own connection.
    pub last_insert_id: Option<u64>,
}

/// A live handle able to run queries against one database.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Run a statement returning rows. Parameters bind to `?` placeholders.
    async fn query(&self, sql: &str, params: &[serde_json::Value]) -> Result<Vec<Row>>;

    /// Run a statement returning no rows.
    async fn execute(&self, sql: &str, params: &[serde_json::Value]) -> Result<ExecResult>;

    /// Release pooled connections.
    async fn close(&self);
}

/// MySQL/MariaDB driver backed by `mysql_async`.
pub struct MySqlDriver {
    pool: Pool,
}

impl MySqlDriver {
    /// Connect to `host:port` with the credentials in `descriptor`.
    ///
    /// `host` and `port` are the local tunnel endpoint, not the descriptor's
    /// own address. Connectivity is verified before returning.
    pub async fn connect(
        host: &str,
        port: u16,
        descriptor: &ConnectionDescriptor,
        config: &EngineConfig,
    ) -> Result<Self> {
        let constraints =
            PoolConstraints::new(config.pool_min_connections, config.pool_max_connections)
                .ok_or_else(|| {
                    TableGateError::config(format!(
                        "Invalid pool constraints (min={}, max={})",
                        config.pool_min_connections, config.pool_max_connections
                    ))
                })?;

        let builder = OptsBuilder::default()
            .ip_or_hostname(host)
            .tcp_port(port)
            .user(Some(&descriptor.username))
            .pass(Some(&descriptor.password))
            .db_name(Some(&descriptor.database))
            .ssl_opts(ssl_opts(descriptor))
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        let pool = Pool::new(Opts::from(builder));

        let timeout = Duration::from_secs(config.connect_timeout_secs);
        let conn = tokio::time::timeout(timeout, pool.get_conn()).await.map_err(|_| {
            TableGateError::connection_failed(format!(
                "Timed out after {}s connecting to {}",
                config.connect_timeout_secs,
                descriptor.display_url()
            ))
        })?;
        conn.map_err(|e| {
            TableGateError::connection_failed_with_source(
                format!("Failed to connect to {}", descriptor.display_url()),
                e,
            )
        })?;

        tracing::info!(
            descriptor = %descriptor.display_url(),
            local_port = port,
            "MySQL pool created"
        );

        Ok(Self { pool })
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    async fn query(&self, sql: &str, params: &[serde_json::Value]) -> Result<Vec<Row>> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<mysql_async::Row> = conn.exec(sql, to_params(params)).await?;

        tracing::trace!(row_count = rows.len(), "query returned");
        Ok(rows.into_iter().map(row_to_json).collect())
    }

    async fn execute(&self, sql: &str, params: &[serde_json::Value]) -> Result<ExecResult> {
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(sql, to_params(params)).await?;

        Ok(ExecResult {
            affected_rows: conn.affected_rows(),
            last_insert_id: conn.last_insert_id(),
        })
    }

    async fn close(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            tracing::warn!(error = %e, "MySQL pool did not disconnect cleanly");
        }
    }
}

/// TLS options for the descriptor.
///
/// Connections go through a local tunnel endpoint, so the server name never
/// matches the certificate and domain validation is skipped.
fn ssl_opts(descriptor: &ConnectionDescriptor) -> Option<SslOpts> {
    if !descriptor.tls_enabled {
        return None;
    }

    let opts = SslOpts::default().with_danger_skip_domain_validation(true);
    match &descriptor.tls_certificate {
        Some(pem) => Some(opts.with_root_certs(vec![pem.as_bytes().to_vec().into()])),
        None => Some(opts.with_danger_accept_invalid_certs(true)),
    }
}

fn to_params(params: &[serde_json::Value]) -> Params {
    if params.is_empty() {
        return Params::Empty;
    }
    Params::Positional(params.iter().map(json_to_mysql).collect())
}

fn json_to_mysql(value: &serde_json::Value) -> mysql_async::Value {
    use serde_json::Value as Json;

    match value {
        Json::Null => mysql_async::Value::NULL,
        Json::Bool(b) => mysql_async::Value::Int(i64::from(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                mysql_async::Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                mysql_async::Value::UInt(u)
            } else {
                mysql_async::Value::Double(n.as_f64().unwrap_or_default())
            }
        }
        Json::String(s) => mysql_async::Value::Bytes(s.as_bytes().to_vec()),
        other => mysql_async::Value::Bytes(other.to_string().into_bytes()),
    }
}

fn row_to_json(row: mysql_async::Row) -> Row {
    let columns = row.columns();
    let values = row.unwrap();

    columns
        .iter()
        .zip(values)
        .map(|(column, value)| {
            (column.name_str().into_owned(), mysql_to_json(value, column.column_type()))
        })
        .collect()
}

fn mysql_to_json(value: mysql_async::Value, column_type: ColumnType) -> serde_json::Value {
    use mysql_async::Value as My;
    use serde_json::Value as Json;

    match value {
        My::NULL => Json::Null,
        My::Bytes(bytes) => {
            if column_type == ColumnType::MYSQL_TYPE_JSON {
                if let Ok(json) = serde_json::from_slice(&bytes) {
                    return json;
                }
            }
            Json::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        My::Int(i) => Json::from(i),
        My::UInt(u) => Json::from(u),
        My::Float(f) => Json::from(f64::from(f)),
        My::Double(d) => Json::from(d),
        My::Date(year, month, day, hour, minute, second, micros) => {
            if matches!(column_type, ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE) {
                Json::String(format!("{year:04}-{month:02}-{day:02}"))
            } else if micros > 0 {
                Json::String(format!(
                    "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
                ))
            } else {
                Json::String(format!(
                    "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
                ))
            }
        }
        My::Time(negative, days, hours, minutes, seconds, _micros) => {
            let sign = if negative { "-" } else { "" };
            let hours = u64::from(days) * 24 + u64::from(hours);
            Json::String(format!("{sign}{hours:02}:{minutes:02}:{seconds:02}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_params_map_to_mysql_values() {
        assert_eq!(json_to_mysql(&json!(null)), mysql_async::Value::NULL);
        assert_eq!(json_to_mysql(&json!(true)), mysql_async::Value::Int(1));
        assert_eq!(json_to_mysql(&json!(-7)), mysql_async::Value::Int(-7));
        assert_eq!(json_to_mysql(&json!(u64::MAX)), mysql_async::Value::UInt(u64::MAX));
        assert_eq!(json_to_mysql(&json!(1.5)), mysql_async::Value::Double(1.5));
        assert_eq!(json_to_mysql(&json!("x")), mysql_async::Value::Bytes(b"x".to_vec()));
        assert_eq!(
            json_to_mysql(&json!({"a": 1})),
            mysql_async::Value::Bytes(br#"{"a":1}"#.to_vec())
        );
    }

    #[test]
    fn empty_params_bind_nothing() {
        assert_eq!(to_params(&[]), Params::Empty);
    }

    #[test]
    fn mysql_values_map_to_json() {
        assert_eq!(
            mysql_to_json(
                mysql_async::Value::Bytes(b"abc".to_vec()),
                ColumnType::MYSQL_TYPE_VAR_STRING
            ),
            json!("abc")
        );
        assert_eq!(
            mysql_to_json(
                mysql_async::Value::Bytes(br#"{"k":[1]}"#.to_vec()),
                ColumnType::MYSQL_TYPE_JSON
            ),
            json!({"k": [1]})
        );
        assert_eq!(
            mysql_to_json(
                mysql_async::Value::Date(2024, 2, 29, 0, 0, 0, 0),
                ColumnType::MYSQL_TYPE_DATE
            ),
            json!("2024-02-29")
        );
        assert_eq!(
            mysql_to_json(
                mysql_async::Value::Date(2024, 2, 29, 13, 5, 9, 0),
                ColumnType::MYSQL_TYPE_DATETIME
            ),
            json!("2024-02-29 13:05:09")
        );
        assert_eq!(
            mysql_to_json(
                mysql_async::Value::Time(true, 1, 2, 3, 4, 0),
                ColumnType::MYSQL_TYPE_TIME
            ),
            json!("-26:03:04")
        );
    }

    #[test]
    fn tls_is_off_unless_enabled() {
        let mut descriptor = ConnectionDescriptor::new("db", "shop", "u", "p");
        assert!(ssl_opts(&descriptor).is_none());

        descriptor.tls_enabled = true;
        let opts = ssl_opts(&descriptor).unwrap();
        assert!(opts.accept_invalid_certs());
        assert!(opts.skip_domain_validation());
    }
}
