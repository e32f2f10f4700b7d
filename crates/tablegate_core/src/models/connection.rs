//! Connection descriptor and tunnel configuration models.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Database engine named by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// MySQL
    #[default]
    MySql,
    /// MariaDB (shares the MySQL catalog)
    MariaDb,
    /// PostgreSQL (no catalog dialect in this crate)
    Postgres,
}

impl EngineType {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::MariaDb => "mariadb",
            Self::Postgres => "postgres",
        }
    }

    /// Parse from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mysql" => Some(Self::MySql),
            "mariadb" => Some(Self::MariaDb),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Whether the engine uses the MySQL `information_schema` dialect.
    pub fn is_mysql_family(&self) -> bool {
        matches!(self, Self::MySql | Self::MariaDb)
    }
}

/// SSH authentication method.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SshAuthMethod {
    /// Password authentication
    Password {
        /// SSH password
        password: String,
    },
    /// Private key file authentication
    KeyFile {
        /// Path to the private key file
        path: PathBuf,
        /// Passphrase for an encrypted key
        #[serde(default, skip_serializing_if = "Option::is_none")]
        passphrase: Option<String>,
    },
    /// SSH agent authentication
    Agent,
}

impl fmt::Debug for SshAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { .. } => f.write_str("Password { .. }"),
            Self::KeyFile { path, .. } => f.debug_struct("KeyFile").field("path", path).finish(),
            Self::Agent => f.write_str("Agent"),
        }
    }
}

/// SSH tunnel configuration for reaching the database host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshTunnelConfig {
    /// SSH server hostname
    pub host: String,
    /// SSH server port (default 22)
    pub port: u16,
    /// SSH username
    pub username: String,
    /// Authentication method
    pub auth_method: SshAuthMethod,
}

impl SshTunnelConfig {
    /// Create a new SSH tunnel configuration using agent authentication.
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth_method: SshAuthMethod::Agent,
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set key-based authentication.
    pub fn with_key(mut self, path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        self.auth_method = SshAuthMethod::KeyFile { path: path.into(), passphrase };
        self
    }

    /// Set password-based authentication.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.auth_method = SshAuthMethod::Password { password: password.into() };
        self
    }
}

/// Everything needed to reach one remote database.
///
/// Two descriptors identify the same cached resource exactly when every
/// field is equal. Passwords and certificates are redacted from `Debug`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    /// Database hostname as seen from the tunnel endpoint
    pub host: String,
    /// Database port (default 3306)
    pub port: u16,
    /// Login username
    pub username: String,
    /// Login password
    pub password: String,
    /// Active database name
    pub database: String,
    /// Database engine
    #[serde(rename = "type")]
    pub engine: EngineType,
    /// Whether to negotiate TLS with the database
    #[serde(default)]
    pub tls_enabled: bool,
    /// PEM-encoded CA certificate used when TLS is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_certificate: Option<String>,
    /// SSH tunnel used to reach the database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_tunnel: Option<SshTunnelConfig>,
}

impl ConnectionDescriptor {
    /// Create a descriptor with required fields and MySQL defaults.
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 3306,
            username: username.into(),
            password: password.into(),
            database: database.into(),
            engine: EngineType::MySql,
            tls_enabled: false,
            tls_certificate: None,
            ssh_tunnel: None,
        }
    }

    /// Create a builder for complex descriptors.
    pub fn builder() -> ConnectionDescriptorBuilder {
        ConnectionDescriptorBuilder::default()
    }

    /// Validate the descriptor.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Host is required".to_string());
        }
        if self.port == 0 {
            return Err("Port must be non-zero".to_string());
        }
        if self.database.is_empty() || self.database.len() > 64 {
            return Err("Database name must be 1-64 characters".to_string());
        }
        if self.username.is_empty() {
            return Err("Username is required".to_string());
        }
        if let Some(ref tunnel) = self.ssh_tunnel {
            if tunnel.host.is_empty() || tunnel.username.is_empty() {
                return Err("SSH tunnel host and username are required".to_string());
            }
        }
        Ok(())
    }

    /// Get the display connection string (without password).
    pub fn display_url(&self) -> String {
        format!(
            "{}://{}@{}:{}/{}",
            self.engine.as_str(),
            self.username,
            self.host,
            self.port,
            self.database
        )
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("engine", &self.engine)
            .field("tls_enabled", &self.tls_enabled)
            .field("tls_certificate", &self.tls_certificate.as_ref().map(|_| "<redacted>"))
            .field("ssh_tunnel", &self.ssh_tunnel)
            .finish()
    }
}

/// Builder for ConnectionDescriptor.
#[derive(Debug, Default)]
pub struct ConnectionDescriptorBuilder {
    host: Option<String>,
    port: u16,
    username: Option<String>,
    password: String,
    database: Option<String>,
    engine: EngineType,
    tls_enabled: bool,
    tls_certificate: Option<String>,
    ssh_tunnel: Option<SshTunnelConfig>,
}

impl ConnectionDescriptorBuilder {
    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the engine type.
    pub fn engine(mut self, engine: EngineType) -> Self {
        self.engine = engine;
        self
    }

    /// Enable TLS, optionally pinning a CA certificate.
    pub fn tls(mut self, certificate: Option<String>) -> Self {
        self.tls_enabled = true;
        self.tls_certificate = certificate;
        self
    }

    /// Set the SSH tunnel.
    pub fn ssh_tunnel(mut self, tunnel: SshTunnelConfig) -> Self {
        self.ssh_tunnel = Some(tunnel);
        self
    }

    /// Build the descriptor.
    pub fn build(self) -> Result<ConnectionDescriptor, String> {
        let descriptor = ConnectionDescriptor {
            host: self.host.ok_or("Host is required")?,
            port: if self.port == 0 { 3306 } else { self.port },
            username: self.username.ok_or("Username is required")?,
            password: self.password,
            database: self.database.ok_or("Database is required")?,
            engine: self.engine,
            tls_enabled: self.tls_enabled,
            tls_certificate: self.tls_certificate,
            ssh_tunnel: self.ssh_tunnel,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}
