//! Mock scope: start one server per host, intercept, tear down
//!
//! ```no_run
//! use sftpmock::{MockSftpServers, host_contents};
//!
//! let mut servers = MockSftpServers::new(host_contents! {
//!     "sftp.example.com" => { "readme.txt" => "hello" },
//! })?;
//! let scope = servers.enter()?;
//! // connections to sftp.example.com now reach the mock server
//! scope.exit()?;
//! # Ok::<(), sftpmock::MockError>(())
//! ```

use std::fmt;

use indexmap::IndexMap;
use tracing::{error, info, warn};

use super::interceptor::{self, HostPortTable, InterceptorPatch};
use crate::config::{HarnessConfig, LimitsConfig, validate_hosts, validate_limits};
use crate::domain::HostContentMap;
use crate::error::{MockError, Result};
use crate::server::{ServerConfig, ServerHandle};

/// Lifecycle state of a [`MockSftpServers`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeStatus {
    Created,
    Active,
    Closed,
}

impl ScopeStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ScopeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of mock SFTP servers, one per hostname
///
/// A scope is single-use: it can be entered once and is closed on exit.
pub struct MockSftpServers {
    host_contents: HostContentMap,
    server_config: ServerConfig,
    servers: IndexMap<String, ServerHandle>,
    status: ScopeStatus,
}

impl MockSftpServers {
    /// Create a scope with default limits.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if a hostname is empty, contains whitespace
    /// or is a loopback name.
    pub fn new(host_contents: HostContentMap) -> Result<Self> {
        Self::with_limits(host_contents, &LimitsConfig::default())
    }

    /// Create a scope with explicit limits.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` for an invalid hostname or a zero timeout.
    pub fn with_limits(host_contents: HostContentMap, limits: &LimitsConfig) -> Result<Self> {
        validate_hosts(&host_contents)?;
        validate_limits(limits)?;
        Ok(Self {
            host_contents,
            server_config: ServerConfig::from(limits),
            servers: IndexMap::new(),
            status: ScopeStatus::Created,
        })
    }

    /// Create a scope from a loaded harness configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if the configuration fails validation.
    pub fn from_config(config: HarnessConfig) -> Result<Self> {
        Self::with_limits(config.hosts, &config.limits)
    }

    #[must_use]
    pub const fn status(&self) -> ScopeStatus {
        self.status
    }

    #[must_use]
    pub const fn host_contents(&self) -> &HostContentMap {
        &self.host_contents
    }

    /// Servers started by this scope. Empty until entered; stopped servers
    /// remain listed after exit so their final contents can be inspected.
    #[must_use]
    pub const fn servers(&self) -> &IndexMap<String, ServerHandle> {
        &self.servers
    }

    /// Start every server, then install the interceptor.
    ///
    /// If any server fails to start, the ones already running are stopped,
    /// no interceptor is installed, and the scope is closed.
    ///
    /// # Errors
    ///
    /// Returns `ScopeState` unless the scope is freshly created, or the
    /// first `ServerStart` error.
    pub fn enter(&mut self) -> Result<ActiveScope<'_>> {
        if self.status != ScopeStatus::Created {
            return Err(MockError::ScopeState {
                expected: ScopeStatus::Created.as_str(),
                actual: self.status.as_str(),
            });
        }

        for (hostname, tree) in &self.host_contents {
            match ServerHandle::start(hostname, tree.clone(), &self.server_config) {
                Ok(server) => {
                    self.servers.insert(hostname.clone(), server);
                }
                Err(e) => {
                    error!(host = %hostname, error = %e, "Mock SFTP server failed to start");
                    for message in stop_all(&mut self.servers) {
                        warn!(error = %message, "Cleanup after failed start");
                    }
                    self.status = ScopeStatus::Closed;
                    return Err(e);
                }
            }
        }

        let table: HostPortTable = self
            .servers
            .iter()
            .map(|(hostname, server)| (hostname.clone(), server.port()))
            .collect();
        let patch = interceptor::install(table);
        self.status = ScopeStatus::Active;
        info!(hosts = self.servers.len(), "Mock SFTP scope entered");

        Ok(ActiveScope {
            scope: self,
            patch: Some(patch),
        })
    }

    fn close(&mut self, patch: Option<InterceptorPatch>) -> Result<()> {
        let errors = stop_all(&mut self.servers);
        if let Some(patch) = patch {
            patch.uninstall();
        }
        self.status = ScopeStatus::Closed;

        if errors.is_empty() {
            info!(hosts = self.servers.len(), "Mock SFTP scope exited");
            Ok(())
        } else {
            Err(MockError::Teardown { errors })
        }
    }
}

impl fmt::Debug for MockSftpServers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSftpServers")
            .field("hosts", &self.host_contents.keys().collect::<Vec<_>>())
            .field("servers", &self.servers)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Stop every server, collecting failures instead of stopping at the first.
fn stop_all(servers: &mut IndexMap<String, ServerHandle>) -> Vec<String> {
    let mut errors = Vec::new();
    for (hostname, server) in servers.iter_mut() {
        if let Err(e) = server.stop() {
            warn!(host = %hostname, error = %e, "Mock SFTP server stop failed");
            errors.push(e.to_string());
        }
    }
    errors
}

/// Guard for an entered scope
///
/// Exiting explicitly reports teardown errors; dropping (including during a
/// panic unwind) tears down on a best-effort basis and logs failures.
pub struct ActiveScope<'a> {
    scope: &'a mut MockSftpServers,
    patch: Option<InterceptorPatch>,
}

impl ActiveScope<'_> {
    /// Port of the mock server for `hostname`.
    #[must_use]
    pub fn port(&self, hostname: &str) -> Option<u16> {
        self.scope.servers.get(hostname).map(ServerHandle::port)
    }

    /// Every mocked hostname and its port.
    #[must_use]
    pub fn host_ports(&self) -> HostPortTable {
        self.patch
            .as_ref()
            .map(|patch| patch.table().clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn servers(&self) -> &IndexMap<String, ServerHandle> {
        &self.scope.servers
    }

    #[must_use]
    pub fn server(&self, hostname: &str) -> Option<&ServerHandle> {
        self.scope.servers.get(hostname)
    }

    /// Stop all servers and uninstall the interceptor.
    ///
    /// # Errors
    ///
    /// Returns `Teardown` listing every server that failed to stop. The
    /// interceptor is uninstalled regardless.
    pub fn exit(mut self) -> Result<()> {
        let patch = self.patch.take();
        self.scope.close(patch)
    }
}

impl Drop for ActiveScope<'_> {
    fn drop(&mut self) {
        if self.scope.status == ScopeStatus::Active {
            let patch = self.patch.take();
            if let Err(e) = self.scope.close(patch) {
                error!(error = %e, "Mock SFTP scope teardown failed");
            }
        }
    }
}

impl fmt::Debug for ActiveScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveScope")
            .field("host_ports", &self.host_ports())
            .finish_non_exhaustive()
    }
}
