//! In-process SFTP servers for tests.
//!
//! A scope starts one in-memory SFTP server per hostname and redirects
//! connections made through [`SshClient::connect`] for those hostnames to
//! the matching loopback server until the scope ends.
//!
//! ```no_run
//! use sftpmock::{ConnectOptions, SshClient, host_contents, with_sftpmock_async};
//!
//! # async fn demo() -> sftpmock::Result<()> {
//! let hosts = host_contents! {
//!     "sftp.example.com" => { "inbox" => { "report.csv" => "a,b\n1,2\n" } },
//! };
//! let names = with_sftpmock_async(hosts, |_ports| async {
//!     let options = ConnectOptions::password("tester", "secret");
//!     let client = SshClient::connect("sftp.example.com:22", &options).await?;
//!     let sftp = client.sftp_session().await?;
//!     sftp.list_dir("inbox").await
//! })
//! .await??;
//! assert_eq!(names, ["report.csv"]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod error;
mod logging;
pub mod mock;
pub mod ports;
pub mod server;
pub mod ssh;

pub use config::{HarnessConfig, LimitsConfig, load_config};
pub use domain::{Content, ContentNode, ContentProvider, ContentTree, HostContentMap};
pub use error::{MockError, Result};
pub use logging::init_test_logging;
pub use mock::{
    ActiveScope, HostPortTable, InterceptorPatch, MockSftpServers, ScopeStatus, try_with_sftpmock,
    with_sftpmock, with_sftpmock_async,
};
pub use ports::{ConnectTarget, TargetResolver};
pub use server::{ServerConfig, ServerHandle};
pub use ssh::{AuthMethod, ConnectOptions, RemoteDirEntry, SftpClient, SshClient};
