use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Config, Handle, Handler};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{PublicKey, load_secret_key};
use russh_sftp::client::SftpSession;
use tokio::time::timeout;
use zeroize::Zeroizing;

use crate::config::LimitsConfig;
use crate::error::{MockError, Result};
use crate::ports::ConnectTarget;
use crate::ssh::connector;
use crate::ssh::sftp::SftpClient;

/// Sanitize SSH error messages to prevent credential leakage.
/// Masks authentication method names and truncates data dumps.
fn sanitize_ssh_error(error: &impl std::fmt::Display) -> String {
    let mut msg = error.to_string();
    for method in &["publickey", "keyboard-interactive", "gssapi-with-mic"] {
        msg = msg.replace(method, "***");
    }
    if msg.len() > 500 {
        let mut cut = 500;
        while !msg.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... (truncated)", &msg[..cut])
    } else {
        msg
    }
}

/// How the client proves its identity
#[derive(Clone)]
pub enum AuthMethod {
    Password(Zeroizing<String>),
    Key {
        path: String,
        passphrase: Option<Zeroizing<String>>,
    },
    None,
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(***)"),
            Self::Key { path, .. } => f.debug_struct("Key").field("path", path).finish_non_exhaustive(),
            Self::None => f.write_str("None"),
        }
    }
}

/// Options for [`SshClient::connect`]
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub user: String,
    pub auth: AuthMethod,
    pub connection_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl ConnectOptions {
    /// Password authentication with default limits
    #[must_use]
    pub fn password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_auth(user, AuthMethod::Password(Zeroizing::new(password.into())))
    }

    /// Key-file authentication with default limits; `~` is expanded
    #[must_use]
    pub fn key(user: impl Into<String>, path: impl Into<String>) -> Self {
        Self::with_auth(
            user,
            AuthMethod::Key {
                path: path.into(),
                passphrase: None,
            },
        )
    }

    #[must_use]
    pub fn with_auth(user: impl Into<String>, auth: AuthMethod) -> Self {
        let limits = LimitsConfig::default();
        Self {
            user: user.into(),
            auth,
            connection_timeout: limits.connection_timeout(),
            keepalive_interval: limits.keepalive_interval(),
        }
    }

    /// Take timeouts from `limits`
    #[must_use]
    pub fn limits(mut self, limits: &LimitsConfig) -> Self {
        self.connection_timeout = limits.connection_timeout();
        self.keepalive_interval = limits.keepalive_interval();
        self
    }
}

/// SSH client handler for russh
///
/// Server keys are accepted without verification: the only servers this
/// client is meant to reach in tests present freshly generated keys.
struct ClientHandler {
    target: String,
}

impl Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        tracing::debug!(
            target_addr = %self.target,
            algorithm = %server_public_key.algorithm(),
            "Accepting server host key"
        );
        Ok(true)
    }
}

/// SSH client wrapper
pub struct SshClient {
    handle: Handle<ClientHandler>,
    host_name: String,
}

impl SshClient {
    /// Connect to `target`, resolving it through the connection registry
    /// first so that active mock scopes can redirect it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The target is malformed
    /// - The SSH connection cannot be established (network error, timeout)
    /// - Authentication fails
    #[must_use = "the SSH client must be used or closed"]
    pub async fn connect(
        target: impl Into<ConnectTarget>,
        options: &ConnectOptions,
    ) -> Result<Self> {
        let requested = target.into();
        let host_name = requested.to_string();
        let resolved = connector::resolve_target(requested)?;

        tracing::debug!(host = %host_name, resolved = %resolved, "Connecting");

        let handle = Self::establish_connection(&host_name, resolved, options).await?;
        Self::authenticate(handle, &host_name, options).await
    }

    /// Open the TCP/SSH connection to an already-resolved target
    async fn establish_connection(
        host_name: &str,
        target: ConnectTarget,
        options: &ConnectOptions,
    ) -> Result<Handle<ClientHandler>> {
        let config = Arc::new(Config {
            inactivity_timeout: Some(options.keepalive_interval),
            keepalive_interval: Some(options.keepalive_interval),
            keepalive_max: 3,
            ..Default::default()
        });
        let handler = ClientHandler {
            target: target.to_string(),
        };
        let timeout_secs = options.connection_timeout.as_secs();

        timeout(
            options.connection_timeout,
            Self::open_transport(host_name, target, config, handler),
        )
        .await
        .map_err(|_| {
            tracing::error!(host = %host_name, timeout_secs, "SSH connection timeout");
            MockError::SshTimeout {
                seconds: timeout_secs,
            }
        })?
        .inspect_err(|e| {
            tracing::error!(host = %host_name, error = %e, "SSH connection failed");
        })
    }

    /// Run the SSH handshake over a caller-supplied socket or a fresh one
    async fn open_transport(
        host_name: &str,
        target: ConnectTarget,
        config: Arc<Config>,
        handler: ClientHandler,
    ) -> Result<Handle<ClientHandler>> {
        let connected = match target {
            ConnectTarget::Socket(stream) => {
                stream.set_nonblocking(true)?;
                let stream = tokio::net::TcpStream::from_std(stream)?;
                client::connect_stream(config, stream, handler).await
            }
            other => {
                let (host, port) = other.endpoint()?;
                client::connect(config, (host.as_str(), port), handler).await
            }
        };

        connected.map_err(|e| MockError::SshConnection {
            host: host_name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Authenticate using the configured method
    async fn authenticate(
        mut handle: Handle<ClientHandler>,
        host_name: &str,
        options: &ConnectOptions,
    ) -> Result<Self> {
        let user = options.user.as_str();
        let (method, outcome) = match &options.auth {
            AuthMethod::Password(password) => (
                "password",
                handle.authenticate_password(user, password.as_str()).await,
            ),
            AuthMethod::Key { path, passphrase } => {
                let expanded = shellexpand::tilde(path);
                let key_pair = load_secret_key(
                    Path::new(expanded.as_ref()),
                    passphrase.as_ref().map(|s| s.as_str()),
                )
                .map_err(|e| MockError::SshKeyInvalid {
                    path: format!("{path}: {}", sanitize_ssh_error(&e)),
                })?;

                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);
                ("key", handle.authenticate_publickey(user, key_with_hash).await)
            }
            AuthMethod::None => ("none", handle.authenticate_none(user).await),
        };

        let auth_result = outcome.map_err(|e| {
            tracing::error!(host = %host_name, user = %user, error = %sanitize_ssh_error(&e), method, "SSH authentication error");
            MockError::SshAuth {
                user: user.to_string(),
                host: format!("{host_name}: authentication failed"),
            }
        })?;

        if !auth_result.success() {
            tracing::error!(host = %host_name, user = %user, method, "SSH authentication rejected");
            return Err(MockError::SshAuth {
                user: user.to_string(),
                host: host_name.to_string(),
            });
        }

        tracing::info!(host = %host_name, user = %user, method, "SSH session established");

        Ok(Self {
            handle,
            host_name: host_name.to_string(),
        })
    }

    /// Check if the connection is still alive (with 5s timeout to avoid blocking)
    #[must_use = "the connection status should be checked"]
    pub async fn is_connected(&self) -> bool {
        match timeout(Duration::from_secs(5), self.handle.channel_open_session()).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) | Err(_) => false,
        }
    }

    /// The target as the caller named it, before any redirection
    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Close the connection (with 5s timeout to avoid blocking)
    ///
    /// # Errors
    ///
    /// Returns an error if the disconnect message cannot be sent.
    pub async fn close(self) -> Result<()> {
        match timeout(
            Duration::from_secs(5),
            self.handle
                .disconnect(russh::Disconnect::ByApplication, "", "en"),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MockError::SshConnection {
                host: self.host_name,
                reason: e.to_string(),
            }),
            Err(_) => {
                tracing::warn!(host = %self.host_name, "Timeout closing SSH connection, forcing drop");
                Ok(())
            }
        }
    }

    /// Create an SFTP session for file transfers
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The SSH channel cannot be opened
    /// - The SFTP subsystem request fails
    /// - SFTP initialization fails
    pub async fn sftp_session(&self) -> Result<SftpClient> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| MockError::Sftp {
                reason: format!("Failed to open channel: {e}"),
            })?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| MockError::Sftp {
                reason: format!("Failed to request SFTP subsystem: {e}"),
            })?;

        let sftp_session =
            SftpSession::new(channel.into_stream())
                .await
                .map_err(|e| MockError::Sftp {
                    reason: format!("Failed to initialize SFTP session: {e}"),
                })?;

        Ok(SftpClient::new(sftp_session))
    }
}
