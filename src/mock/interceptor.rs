//! Connection interceptor
//!
//! Installing the interceptor pushes a [`RedirectResolver`] onto the client
//! library's connection entrypoint. Connections to a mocked hostname are
//! rewritten to `localhost:<mock port>`; loopback targets and unknown hosts
//! reach the previous resolver unchanged.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ports::{ConnectTarget, TargetResolver, is_loopback};
use crate::ssh::connector::{self, LayerId};

/// Hostname to the loopback port of its mock server
pub type HostPortTable = IndexMap<String, u16>;

const REDIRECT_HOST: &str = "localhost";

/// Resolver that redirects mocked hostnames to their local ports
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    table: HostPortTable,
}

impl RedirectResolver {
    #[must_use]
    pub const fn new(table: HostPortTable) -> Self {
        Self { table }
    }

    #[must_use]
    pub const fn table(&self) -> &HostPortTable {
        &self.table
    }
}

impl TargetResolver for RedirectResolver {
    fn resolve(&self, target: ConnectTarget) -> Result<ConnectTarget> {
        let (host, port) = target.endpoint()?;

        if is_loopback(&host) {
            debug!(host = %host, port, "Loopback target, not redirected");
            return Ok(target);
        }

        match self.table.get(&host) {
            Some(&mock_port) => {
                debug!(host = %host, port, mock_port, "Redirecting connection to mock server");
                Ok(ConnectTarget::HostPort(REDIRECT_HOST.to_string(), mock_port))
            }
            None => {
                debug!(host = %host, port, "Host not mocked, passing through");
                Ok(target)
            }
        }
    }

    fn published_ports(&self) -> Option<&HostPortTable> {
        Some(&self.table)
    }
}

/// Install a redirect layer for `table` on the connection entrypoint.
///
/// The layer stays active until the returned patch is uninstalled or
/// dropped.
#[must_use = "dropping the patch uninstalls the interceptor immediately"]
pub fn install(table: HostPortTable) -> InterceptorPatch {
    let original = connector::base_resolver();
    let resolver = Arc::new(RedirectResolver::new(table.clone()));
    let layer = connector::install_layer(resolver);
    info!(hosts = table.len(), "Connection interceptor installed");
    InterceptorPatch {
        layer: Some(layer),
        original,
        table,
    }
}

/// Record of one interceptor installation
pub struct InterceptorPatch {
    layer: Option<LayerId>,
    original: Arc<dyn TargetResolver>,
    table: HostPortTable,
}

impl InterceptorPatch {
    /// Redirects this patch applies.
    #[must_use]
    pub const fn table(&self) -> &HostPortTable {
        &self.table
    }

    /// The base resolver that was in effect when this patch was installed.
    #[must_use]
    pub fn original(&self) -> Arc<dyn TargetResolver> {
        Arc::clone(&self.original)
    }

    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.layer.is_some()
    }

    /// Remove this patch's layer. Other active patches are untouched.
    pub fn uninstall(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(layer) = self.layer.take() {
            if connector::remove_layer(layer) {
                info!(hosts = self.table.len(), "Connection interceptor uninstalled");
            } else {
                warn!(layer = ?layer, "Interceptor layer was already removed");
            }
        }
    }
}

impl Drop for InterceptorPatch {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for InterceptorPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorPatch")
            .field("layer", &self.layer)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
