//! In-process SSH/SFTP servers serving content trees
//!
//! The server side is built on russh's server API and russh-sftp's server
//! handler trait; each mock host gets an isolated server on its own port.

mod handler;
mod pool;
mod sftp;

pub use pool::{ServerConfig, ServerHandle};

#[cfg(test)]
pub(crate) use pool::faults;
