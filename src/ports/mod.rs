//! Ports module - Trait definitions for hexagonal architecture
//!
//! The connection-resolution seam lives here: the client library asks a
//! chain of `TargetResolver`s where to connect, and adapters (the direct
//! resolver, the mock interceptor) implement it.

mod resolver;

pub use resolver::{ConnectTarget, DirectResolver, TargetResolver, is_loopback, parse_address};

#[cfg(test)]
pub use resolver::mock;
