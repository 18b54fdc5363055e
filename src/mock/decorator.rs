//! Run a closure inside a mock scope
//!
//! These wrap `MockSftpServers::enter`/`ActiveScope::exit` for test bodies.
//! A panicking body still tears the scope down through the guard's `Drop`.

use std::future::Future;

use tracing::warn;

use super::interceptor::HostPortTable;
use super::scope::{ActiveScope, MockSftpServers};
use crate::domain::HostContentMap;
use crate::error::{MockError, Result};

/// Run `body` with servers for `host_contents` active.
///
/// # Errors
///
/// Returns configuration or startup errors before `body` runs, or a
/// `Teardown` error after it.
pub fn with_sftpmock<F, R>(host_contents: HostContentMap, body: F) -> Result<R>
where
    F: FnOnce(&ActiveScope<'_>) -> R,
{
    let mut servers = MockSftpServers::new(host_contents)?;
    let scope = servers.enter()?;
    let output = body(&scope);
    scope.exit()?;
    Ok(output)
}

/// Like [`with_sftpmock`] for a fallible body.
///
/// The body's own error takes precedence over a teardown error, which is
/// then only logged.
///
/// # Errors
///
/// Returns the body's error, or a setup/teardown error converted into `E`.
pub fn try_with_sftpmock<F, T, E>(host_contents: HostContentMap, body: F) -> std::result::Result<T, E>
where
    F: FnOnce(&ActiveScope<'_>) -> std::result::Result<T, E>,
    E: From<MockError>,
{
    let mut servers = MockSftpServers::new(host_contents)?;
    let scope = servers.enter()?;
    let outcome = body(&scope);
    let teardown = scope.exit();

    match (outcome, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(teardown_error)) => {
            warn!(error = %teardown_error, "Scope teardown failed after body error");
            Err(e)
        }
    }
}

/// Async form of [`with_sftpmock`].
///
/// The body receives a copy of the host-port table. Scope setup and
/// teardown block the calling thread briefly while server threads start
/// and stop.
///
/// # Errors
///
/// Returns configuration or startup errors before `body` runs, or a
/// `Teardown` error after it.
pub async fn with_sftpmock_async<F, Fut, R>(host_contents: HostContentMap, body: F) -> Result<R>
where
    F: FnOnce(HostPortTable) -> Fut,
    Fut: Future<Output = R>,
{
    let mut servers = MockSftpServers::new(host_contents)?;
    let scope = servers.enter()?;
    let output = body(scope.host_ports()).await;
    scope.exit()?;
    Ok(output)
}
