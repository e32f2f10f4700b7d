//! SSH tunnel provider built on russh.
//!
//! Listens on the allocated loopback port and forwards every accepted
//! connection over a `direct-tcpip` channel to the database host, then
//! binds a [`MySqlDriver`] to that loopback endpoint.

use async_trait::async_trait;
use russh::client;
use russh_keys::key::KeyPair;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::models::{ConnectionDescriptor, SshAuthMethod, SshTunnelConfig};
use crate::services::driver::MySqlDriver;
use crate::services::tunnel::{EstablishedTunnel, TunnelError, TunnelHandle, TunnelProvider};

/// Errors raised while opening an SSH tunnel.
#[derive(Debug, thiserror::Error)]
pub enum SshTunnelError {
    /// The descriptor carries no SSH settings.
    #[error("No SSH tunnel configured for {0}")]
    NotConfigured(String),

    /// The SSH server could not be reached.
    #[error("Failed to connect to SSH server {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: russh::Error,
    },

    /// The server rejected every credential offered.
    #[error("SSH authentication failed for {0}")]
    AuthenticationRejected(String),

    /// Authentication could not be attempted.
    #[error("SSH authentication error: {0}")]
    Authentication(String),

    /// The private key could not be read or decoded.
    #[error("SSH key error: {0}")]
    Key(String),

    /// The local listener could not be bound.
    #[error("Failed to bind local port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The server refused to open a forwarding channel.
    #[error("Failed to open SSH channel: {0}")]
    Channel(#[source] russh::Error),
}

/// SSH client handler for russh.
struct SshClientHandler;

#[async_trait]
impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // TODO: verify against a known_hosts file once descriptors carry host keys
        Ok(true)
    }
}

type SshHandle = Arc<Mutex<client::Handle<SshClientHandler>>>;

/// Tunnel provider that forwards through an SSH bastion.
pub struct SshTunnelProvider {
    config: EngineConfig,
}

impl SshTunnelProvider {
    /// Create a provider whose drivers use `config` for pooling and timeouts.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TunnelProvider for SshTunnelProvider {
    async fn establish(
        &self,
        descriptor: &ConnectionDescriptor,
        local_port: u16,
    ) -> Result<EstablishedTunnel, TunnelError> {
        let tunnel_config = descriptor
            .ssh_tunnel
            .as_ref()
            .ok_or_else(|| SshTunnelError::NotConfigured(descriptor.display_url()))?;

        tracing::info!(
            ssh_host = %tunnel_config.host,
            ssh_port = tunnel_config.port,
            local_port,
            "Establishing SSH tunnel"
        );

        let ssh_client = Arc::new(Mutex::new(connect_ssh(tunnel_config).await?));

        let listener = TcpListener::bind(("127.0.0.1", local_port))
            .await
            .map_err(|source| SshTunnelError::Bind { port: local_port, source })?;

        let cancel_token = CancellationToken::new();
        tokio::spawn(run_tunnel(
            listener,
            ssh_client,
            descriptor.host.clone(),
            descriptor.port,
            cancel_token.clone(),
        ));
        let tunnel = TunnelHandle::new(local_port, cancel_token);

        // Dropping `tunnel` on failure stops the forwarding task.
        let driver = MySqlDriver::connect("127.0.0.1", local_port, descriptor, &self.config).await?;

        Ok(EstablishedTunnel { driver: Arc::new(driver), tunnel })
    }
}

/// Connect and authenticate to the SSH server.
async fn connect_ssh(
    tunnel_config: &SshTunnelConfig,
) -> Result<client::Handle<SshClientHandler>, SshTunnelError> {
    let config = Arc::new(client::Config::default());

    let mut handle = client::connect(
        config,
        (tunnel_config.host.as_str(), tunnel_config.port),
        SshClientHandler,
    )
    .await
    .map_err(|source| SshTunnelError::Connect {
        host: tunnel_config.host.clone(),
        port: tunnel_config.port,
        source,
    })?;

    let username = tunnel_config.username.as_str();
    let authenticated = match &tunnel_config.auth_method {
        SshAuthMethod::Password { password } => handle
            .authenticate_password(username, password)
            .await
            .map_err(|e| SshTunnelError::Authentication(e.to_string()))?,
        SshAuthMethod::KeyFile { path, passphrase } => {
            let key = load_private_key(path, passphrase.as_deref()).await?;
            handle
                .authenticate_publickey(username, key)
                .await
                .map_err(|e| SshTunnelError::Authentication(e.to_string()))?
        }
        SshAuthMethod::Agent => authenticate_with_agent(&mut handle, username).await?,
    };

    if !authenticated {
        return Err(SshTunnelError::AuthenticationRejected(format!(
            "{}@{}",
            tunnel_config.username, tunnel_config.host
        )));
    }

    tracing::debug!(ssh_host = %tunnel_config.host, "SSH authentication successful");
    Ok(handle)
}

/// Load a private key from a file.
async fn load_private_key(
    path: &Path,
    passphrase: Option<&str>,
) -> Result<Arc<KeyPair>, SshTunnelError> {
    let key_data = tokio::fs::read(path)
        .await
        .map_err(|e| SshTunnelError::Key(format!("cannot read {}: {e}", path.display())))?;

    let key = russh_keys::decode_secret_key(&String::from_utf8_lossy(&key_data), passphrase)
        .map_err(|e| SshTunnelError::Key(format!("cannot decode {}: {e}", path.display())))?;

    Ok(Arc::new(key))
}

/// Authenticate with each identity held by the SSH agent.
#[cfg(unix)]
async fn authenticate_with_agent(
    handle: &mut client::Handle<SshClientHandler>,
    username: &str,
) -> Result<bool, SshTunnelError> {
    use russh_keys::agent::client::AgentClient;
    use tokio::net::UnixStream;

    let socket_path = std::env::var("SSH_AUTH_SOCK").map_err(|_| {
        SshTunnelError::Authentication("SSH agent not available (SSH_AUTH_SOCK not set)".into())
    })?;

    let stream = UnixStream::connect(&socket_path)
        .await
        .map_err(|e| SshTunnelError::Authentication(format!("cannot reach SSH agent: {e}")))?;

    let mut agent = AgentClient::connect(stream);
    let identities = agent
        .request_identities()
        .await
        .map_err(|e| SshTunnelError::Authentication(format!("SSH agent identities: {e}")))?;

    if identities.is_empty() {
        return Err(SshTunnelError::Authentication("No identities in SSH agent".into()));
    }

    for identity in identities {
        let (returned_agent, auth_result) =
            handle.authenticate_future(username, identity.clone(), agent).await;
        agent = returned_agent;

        match auth_result {
            Ok(true) => return Ok(true),
            Ok(false) => tracing::debug!("SSH agent key rejected, trying next"),
            Err(e) => tracing::debug!(error = %e, "SSH agent auth error, trying next"),
        }
    }

    Ok(false)
}

#[cfg(not(unix))]
async fn authenticate_with_agent(
    _handle: &mut client::Handle<SshClientHandler>,
    _username: &str,
) -> Result<bool, SshTunnelError> {
    Err(SshTunnelError::Authentication("SSH agent authentication requires a Unix socket".into()))
}

/// Accept local connections until cancelled.
async fn run_tunnel(
    listener: TcpListener,
    ssh_client: SshHandle,
    remote_host: String,
    remote_port: u16,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((local_stream, peer_addr)) => {
                        tracing::trace!(%peer_addr, "New tunnel connection");

                        let ssh_client = Arc::clone(&ssh_client);
                        let remote_host = remote_host.clone();
                        let cancel = cancel_token.clone();

                        tokio::spawn(async move {
                            if let Err(e) = forward_connection(
                                local_stream,
                                ssh_client,
                                &remote_host,
                                remote_port,
                                cancel,
                            )
                            .await
                            {
                                tracing::warn!(error = %e, "Tunnel forwarding error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept tunnel connection");
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                tracing::debug!(%remote_host, remote_port, "SSH tunnel listener closed");
                break;
            }
        }
    }
}

/// Pump bytes between one local stream and a new SSH channel.
async fn forward_connection(
    mut local_stream: TcpStream,
    ssh_client: SshHandle,
    remote_host: &str,
    remote_port: u16,
    cancel_token: CancellationToken,
) -> Result<(), SshTunnelError> {
    let channel = {
        let handle = ssh_client.lock().await;
        handle
            .channel_open_direct_tcpip(remote_host, u32::from(remote_port), "127.0.0.1", 0)
            .await
            .map_err(SshTunnelError::Channel)?
    };

    let mut channel = channel.into_stream();
    let mut buf_local = [0u8; 8192];
    let mut buf_remote = [0u8; 8192];

    loop {
        tokio::select! {
            n = local_stream.read(&mut buf_local) => {
                match n {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if channel.write_all(&buf_local[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            n = channel.read(&mut buf_remote) => {
                match n {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if local_stream.write_all(&buf_remote[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn descriptor_without_ssh_settings_is_rejected() {
        let provider = SshTunnelProvider::new(EngineConfig::default());
        let descriptor = ConnectionDescriptor::new("db.internal", "shop", "admin", "pw");

        let err = provider.establish(&descriptor, 4200).await.err().unwrap();
        assert!(err.to_string().starts_with("No SSH tunnel configured"));
    }

    #[tokio::test]
    async fn missing_key_file_is_a_key_error() {
        let err = load_private_key(Path::new("/nonexistent/id_ed25519"), None).await.unwrap_err();
        assert!(matches!(err, SshTunnelError::Key(_)));
    }
}
