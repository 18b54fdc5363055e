//! Mock server lifecycle
//!
//! Each mock host gets its own SSH/SFTP server: a loopback listener on an
//! ephemeral port, a fresh Ed25519 host key, and a named worker thread that
//! runs a current-thread tokio runtime. Stopping cancels the accept loop,
//! waits (bounded) for the worker to finish and joins it.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use russh::keys::{Algorithm, PrivateKey};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handler::MockSshHandler;
use super::sftp::SharedProvider;
use crate::config::LimitsConfig;
use crate::domain::{ContentProvider, ContentTree};
use crate::error::{MockError, Result};

/// Ports handed out recently; a bind that lands on one of these is retried
const RECENT_PORTS: usize = 1024;
const BIND_ATTEMPTS: usize = 16;
/// How long in-flight sessions get once the accept loop has stopped
const SESSION_DRAIN: Duration = Duration::from_millis(100);

static ISSUED_PORTS: OnceLock<Mutex<VecDeque<u16>>> = OnceLock::new();

/// Settings for a single mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Upper bound on how long `stop` and startup wait for the worker
    pub stop_timeout: Duration,
    /// Idle SSH sessions are closed after this long
    pub inactivity_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for ServerConfig {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            stop_timeout: limits.stop_timeout(),
            inactivity_timeout: limits.inactivity_timeout(),
        }
    }
}

/// A running (or stopped) mock SFTP server for one hostname
pub struct ServerHandle {
    hostname: String,
    port: u16,
    provider: SharedProvider,
    shutdown: CancellationToken,
    running: Arc<AtomicBool>,
    done: Option<mpsc::Receiver<()>>,
    thread: Option<JoinHandle<()>>,
    stop_timeout: Duration,
}

/// Marks the worker as finished when dropped, even on panic.
struct WorkerExit {
    running: Arc<AtomicBool>,
    _done: mpsc::Sender<()>,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl ServerHandle {
    /// Bind a loopback port and start serving `tree` for `hostname`.
    ///
    /// Returns once the listener is registered with the worker's runtime.
    ///
    /// # Errors
    ///
    /// Returns `ServerStart` if the port cannot be bound, the host key cannot
    /// be generated, or the worker thread fails to come up.
    pub fn start(hostname: &str, tree: ContentTree, config: &ServerConfig) -> Result<Self> {
        let start_error = |reason: String| MockError::ServerStart {
            host: hostname.to_string(),
            reason,
        };

        #[cfg(test)]
        if faults::start_fails(hostname) {
            return Err(start_error("injected start failure".to_string()));
        }

        let listener = bind_ephemeral(hostname)?;
        let port = listener
            .local_addr()
            .map_err(|e| start_error(format!("cannot read bound address: {e}")))?
            .port();
        listener
            .set_nonblocking(true)
            .map_err(|e| start_error(format!("cannot make listener non-blocking: {e}")))?;

        let host_key = PrivateKey::random(&mut rand::rngs::OsRng, Algorithm::Ed25519)
            .map_err(|e| start_error(format!("Ed25519 key generation failed: {e}")))?;

        let mut ssh_config = russh::server::Config::default();
        ssh_config.keys.push(host_key);
        ssh_config.auth_rejection_time = Duration::ZERO;
        ssh_config.auth_rejection_time_initial = Some(Duration::ZERO);
        ssh_config.inactivity_timeout = Some(config.inactivity_timeout);
        let ssh_config = Arc::new(ssh_config);

        let provider: SharedProvider = Arc::new(Mutex::new(ContentProvider::new(tree)));
        let shutdown = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<std::result::Result<(), String>>(1);

        let worker = Worker {
            hostname: Arc::from(hostname),
            port,
            ssh_config,
            provider: Arc::clone(&provider),
            shutdown: shutdown.clone(),
            #[cfg(test)]
            stall: faults::stop_stall(hostname),
        };
        let exit = WorkerExit {
            running: Arc::clone(&running),
            _done: done_tx,
        };

        let thread = std::thread::Builder::new()
            .name(format!("sftpmock-{hostname}"))
            .spawn(move || {
                let _exit = exit;
                worker.run(listener, &ready_tx);
            })
            .map_err(|e| start_error(format!("cannot spawn worker thread: {e}")))?;

        match ready_rx.recv_timeout(config.stop_timeout) {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                let _ = thread.join();
                return Err(start_error(reason));
            }
            Err(_) => {
                shutdown.cancel();
                return Err(start_error(format!(
                    "worker not ready within {}ms",
                    config.stop_timeout.as_millis()
                )));
            }
        }

        info!(host = %hostname, port, "Mock SFTP server started");

        Ok(Self {
            hostname: hostname.to_string(),
            port,
            provider,
            shutdown,
            running,
            done: Some(done_rx),
            thread: Some(thread),
            stop_timeout: config.stop_timeout,
        })
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// False once the worker thread has finished.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Copy of the tree as it is now, including client uploads.
    #[must_use]
    pub fn snapshot(&self) -> ContentTree {
        self.provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Stop accepting, wait for the worker and join it. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `ServerStop` if the worker does not finish within the stop
    /// timeout (the thread is then left detached) or if it panicked.
    pub fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        self.shutdown.cancel();

        if let Some(done) = self.done.take() {
            if let Err(RecvTimeoutError::Timeout) = done.recv_timeout(self.stop_timeout) {
                error!(
                    host = %self.hostname,
                    port = self.port,
                    timeout_ms = self.stop_timeout.as_millis(),
                    "Mock SFTP server did not stop in time"
                );
                return Err(MockError::ServerStop {
                    host: self.hostname.clone(),
                    reason: format!(
                        "worker thread still running after {}ms",
                        self.stop_timeout.as_millis()
                    ),
                });
            }
        }

        thread.join().map_err(|_| MockError::ServerStop {
            host: self.hostname.clone(),
            reason: "worker thread panicked".to_string(),
        })?;

        info!(host = %self.hostname, port = self.port, "Mock SFTP server stopped");
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.stop() {
                warn!(host = %self.hostname, error = %e, "Mock SFTP server stop on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

struct Worker {
    hostname: Arc<str>,
    port: u16,
    ssh_config: Arc<russh::server::Config>,
    provider: SharedProvider,
    shutdown: CancellationToken,
    #[cfg(test)]
    stall: Option<Duration>,
}

impl Worker {
    fn run(self, listener: StdTcpListener, ready: &mpsc::SyncSender<std::result::Result<(), String>>) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = ready.send(Err(format!("cannot build runtime: {e}")));
                return;
            }
        };

        runtime.block_on(async {
            let listener = match TcpListener::from_std(listener) {
                Ok(listener) => listener,
                Err(e) => {
                    let _ = ready.send(Err(format!("cannot register listener: {e}")));
                    return;
                }
            };
            let _ = ready.send(Ok(()));
            self.accept_loop(listener).await;
        });

        #[cfg(test)]
        if let Some(stall) = self.stall {
            std::thread::sleep(stall);
        }

        runtime.shutdown_timeout(SESSION_DRAIN);
    }

    async fn accept_loop(&self, listener: TcpListener) {
        debug!(host = %self.hostname, port = self.port, "Accept loop running");
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_session(stream, peer),
                    Err(e) => {
                        warn!(host = %self.hostname, error = %e, "Accept failed");
                    }
                },
            }
        }
        debug!(host = %self.hostname, port = self.port, "Accept loop finished");
    }

    fn spawn_session(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        debug!(host = %self.hostname, peer = %peer, "Client connected");
        let handler =
            MockSshHandler::new(Arc::clone(&self.hostname), Some(peer), Arc::clone(&self.provider));
        let config = Arc::clone(&self.ssh_config);
        let hostname = Arc::clone(&self.hostname);

        tokio::spawn(async move {
            match russh::server::run_stream(config, stream, handler).await {
                Ok(session) => {
                    if let Err(e) = session.await {
                        debug!(host = %hostname, peer = %peer, error = %e, "SSH session ended with error");
                    }
                }
                Err(e) => {
                    debug!(host = %hostname, peer = %peer, error = %e, "SSH handshake failed");
                }
            }
        });
    }
}

/// Bind `127.0.0.1:0`, retrying while the OS hands back a recently issued
/// port. Rejected listeners stay open until a fresh port is found so the OS
/// cannot return the same one again.
fn bind_ephemeral(hostname: &str) -> Result<StdTcpListener> {
    let start_error = |reason: String| MockError::ServerStart {
        host: hostname.to_string(),
        reason,
    };

    let mut rejected = Vec::new();
    for _ in 0..BIND_ATTEMPTS {
        let listener = StdTcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .map_err(|e| start_error(format!("cannot bind loopback port: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| start_error(format!("cannot read bound address: {e}")))?
            .port();

        let mut issued = ISSUED_PORTS
            .get_or_init(|| Mutex::new(VecDeque::with_capacity(RECENT_PORTS)))
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !issued.contains(&port) {
            if issued.len() == RECENT_PORTS {
                issued.pop_front();
            }
            issued.push_back(port);
            return Ok(listener);
        }
        drop(issued);

        debug!(host = %hostname, port, "Ephemeral port issued recently, rebinding");
        rejected.push(listener);
    }

    Err(start_error(format!(
        "no unused ephemeral port after {BIND_ATTEMPTS} attempts"
    )))
}

/// Failures injected into server lifecycles by tests on the current thread
#[cfg(test)]
pub(crate) mod faults {
    use std::cell::RefCell;
    use std::time::Duration;

    #[derive(Default)]
    struct Plan {
        fail_start: Option<String>,
        stall_stop: Option<(String, Duration)>,
    }

    thread_local! {
        static PLAN: RefCell<Plan> = RefCell::new(Plan::default());
    }

    /// Make `start` fail for `host`.
    pub(crate) fn fail_start(host: &str) {
        PLAN.with_borrow_mut(|plan| plan.fail_start = Some(host.to_string()));
    }

    /// Keep the worker for `host` alive for `stall` after it is told to stop.
    pub(crate) fn stall_stop(host: &str, stall: Duration) {
        PLAN.with_borrow_mut(|plan| plan.stall_stop = Some((host.to_string(), stall)));
    }

    pub(crate) fn clear() {
        PLAN.with_borrow_mut(|plan| *plan = Plan::default());
    }

    pub(super) fn start_fails(host: &str) -> bool {
        PLAN.with_borrow(|plan| plan.fail_start.as_deref() == Some(host))
    }

    pub(super) fn stop_stall(host: &str) -> Option<Duration> {
        PLAN.with_borrow(|plan| {
            plan.stall_stop
                .as_ref()
                .filter(|(stalled, _)| stalled == host)
                .map(|(_, stall)| *stall)
        })
    }
}
