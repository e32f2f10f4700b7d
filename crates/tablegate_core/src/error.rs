//! Error types for the table access engine.
//!
//! Connection failures collapse into one user-safe variant; every other
//! failure keeps the driver's message so operators can diagnose SQL issues.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TableGateError>;

/// Main error type for table access operations.
#[derive(Debug, Error)]
pub enum TableGateError {
    /// Tunnel or driver acquisition failed.
    ///
    /// The display text is fixed; the cause is only kept for logging.
    #[error("Connection to the database could not be established")]
    ConnectionEstablishmentFailed {
        /// Internal description of what failed.
        message: String,
        /// Original transport or driver error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A catalog or data query failed.
    #[error("{message}")]
    Query {
        /// Driver error message.
        message: String,
        /// Server error code (e.g. 1146).
        code: Option<u16>,
        /// SQLSTATE reported by the server.
        sql_state: Option<String>,
    },

    /// An insert, update or delete statement failed.
    #[error("Mutation failed: {message}")]
    Mutation {
        /// Driver error message.
        message: String,
        /// Server error code (e.g. 1062 for duplicate key).
        code: Option<u16>,
        /// SQLSTATE reported by the server.
        sql_state: Option<String>,
    },

    /// The request cannot be compiled into a query.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What was wrong with the request.
        message: String,
    },

    /// The descriptor names an engine without a catalog dialect.
    #[error("Unsupported database engine: {engine}")]
    UnsupportedEngine {
        /// Engine name from the descriptor.
        engine: String,
    },

    /// Configuration error.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TableGateError {
    // ========== Constructors ==========

    /// Create a connection failure without an underlying cause.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionEstablishmentFailed { message: message.into(), source: None }
    }

    /// Create a connection failure wrapping the original cause.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConnectionEstablishmentFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error from a message.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query { message: message.into(), code: None, sql_state: None }
    }

    /// Create a mutation error from a message.
    pub fn mutation(message: impl Into<String>) -> Self {
        Self::Mutation { message: message.into(), code: None, sql_state: None }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    /// Create an unsupported engine error.
    pub fn unsupported_engine(engine: impl Into<String>) -> Self {
        Self::UnsupportedEngine { engine: engine.into() }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Re-tag a driver failure raised by a write statement.
    ///
    /// Errors that are not query failures pass through unchanged.
    pub fn into_mutation(self) -> Self {
        match self {
            Self::Query { message, code, sql_state } => Self::Mutation { message, code, sql_state },
            other => other,
        }
    }

    // ========== Methods ==========

    /// Check if this error came from driver acquisition.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::ConnectionEstablishmentFailed { .. })
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConnectionEstablishmentFailed { .. } => "Connection",
            Self::Query { .. } => "Query",
            Self::Mutation { .. } => "Mutation",
            Self::InvalidRequest { .. } => "Request",
            Self::UnsupportedEngine { .. } => "Engine",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::ConnectionEstablishmentFailed { .. } => {
                Some("Check the tunnel settings and that the database server is running")
            }
            Self::Query { .. } => None,
            Self::Mutation { code: Some(1062), .. } => Some("A row with this key already exists"),
            Self::Mutation { code: Some(1452), .. } => {
                Some("A referenced row does not exist in the related table")
            }
            Self::Mutation { .. } => None,
            Self::InvalidRequest { .. } => None,
            Self::UnsupportedEngine { .. } => Some("Only MySQL and MariaDB are supported"),
            Self::Config { .. } => None,
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Get the server error code (if applicable).
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Self::Query { code, .. } | Self::Mutation { code, .. } => *code,
            _ => None,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Query { code, sql_state, .. } | Self::Mutation { code, sql_state, .. } => {
                let mut parts = Vec::new();
                if let Some(code) = code {
                    parts.push(format!("Code: {code}"));
                }
                if let Some(state) = sql_state {
                    parts.push(format!("SQLSTATE: {state}"));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Connection Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for diagnostics.
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

/// Convert from mysql_async::Error to TableGateError.
impl From<mysql_async::Error> for TableGateError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(server) => TableGateError::Query {
                message: server.message,
                code: Some(server.code),
                sql_state: Some(server.state),
            },
            other => {
                TableGateError::Query { message: other.to_string(), code: None, sql_state: None }
            }
        }
    }
}

/// Convert from serde_json::Error to TableGateError.
impl From<serde_json::Error> for TableGateError {
    fn from(err: serde_json::Error) -> Self {
        TableGateError::InvalidRequest { message: format!("JSON error: {err}") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failure_hides_cause_in_display() {
        let cause = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "ssh refused");
        let err = TableGateError::connection_failed_with_source("tunnel failed", cause);

        assert_eq!(err.to_string(), "Connection to the database could not be established");
        assert!(err.is_connection_failure());
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("ssh refused"));
    }

    #[test]
    fn into_mutation_keeps_driver_details() {
        let err = TableGateError::Query {
            message: "Duplicate entry '1' for key 'PRIMARY'".to_string(),
            code: Some(1062),
            sql_state: Some("23000".to_string()),
        }
        .into_mutation();

        assert_eq!(err.category(), "Mutation");
        assert_eq!(err.server_code(), Some(1062));
        assert!(err.to_string().contains("Duplicate entry"));
        assert_eq!(err.hint(), Some("A row with this key already exists"));
    }

    #[test]
    fn into_mutation_passes_other_errors_through() {
        let err = TableGateError::invalid_request("no keys").into_mutation();
        assert!(matches!(err, TableGateError::InvalidRequest { .. }));
    }

    #[test]
    fn error_info_has_technical_detail_for_queries() {
        let err = TableGateError::Query {
            message: "Table 'shop.nope' doesn't exist".to_string(),
            code: Some(1146),
            sql_state: Some("42S02".to_string()),
        };
        let info = err.to_error_info();

        assert_eq!(info.error_type, "Query Error");
        assert_eq!(info.technical_detail.as_deref(), Some("Code: 1146\nSQLSTATE: 42S02"));
    }
}
