//! Target Resolver Port
//!
//! Every client connection passes its target through a chain of resolvers
//! before a socket is opened. The mock layer plugs in here to rewrite
//! connections to mocked hostnames; everything else passes through.

use std::fmt;
use std::net::TcpStream;

use crate::error::{MockError, Result};

/// The forms a connection target can take
#[derive(Debug)]
pub enum ConnectTarget {
    /// An already-connected socket
    Socket(TcpStream),
    /// Explicit hostname and port
    HostPort(String, u16),
    /// A `host:port` string; IPv6 hosts must be bracketed
    Address(String),
}

impl ConnectTarget {
    /// The hostname and port this target refers to.
    ///
    /// A socket reports its local address.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTarget` if a socket cannot be inspected, a host is
    /// empty or an address string is malformed.
    pub fn endpoint(&self) -> Result<(String, u16)> {
        match self {
            Self::Socket(stream) => {
                let addr = stream.local_addr().map_err(|e| {
                    MockError::invalid_target(format!("cannot inspect socket: {e}"))
                })?;
                Ok((addr.ip().to_string(), addr.port()))
            }
            Self::HostPort(host, port) => {
                if host.is_empty() {
                    return Err(MockError::invalid_target("empty hostname"));
                }
                Ok((host.clone(), *port))
            }
            Self::Address(address) => parse_address(address),
        }
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket(stream) => match stream.peer_addr() {
                Ok(peer) => write!(f, "socket to {peer}"),
                Err(_) => write!(f, "socket"),
            },
            Self::HostPort(host, port) if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::HostPort(host, port) => write!(f, "{host}:{port}"),
            Self::Address(address) => f.write_str(address),
        }
    }
}

impl From<TcpStream> for ConnectTarget {
    fn from(stream: TcpStream) -> Self {
        Self::Socket(stream)
    }
}

impl From<(&str, u16)> for ConnectTarget {
    fn from((host, port): (&str, u16)) -> Self {
        Self::HostPort(host.to_string(), port)
    }
}

impl From<(String, u16)> for ConnectTarget {
    fn from((host, port): (String, u16)) -> Self {
        Self::HostPort(host, port)
    }
}

impl From<&str> for ConnectTarget {
    fn from(address: &str) -> Self {
        Self::Address(address.to_string())
    }
}

impl From<String> for ConnectTarget {
    fn from(address: String) -> Self {
        Self::Address(address)
    }
}

/// Split a `host:port` string on its last colon.
///
/// # Errors
///
/// Returns `InvalidTarget` if there is no colon, the host is empty, an
/// IPv6 host is not bracketed, or the port is not a valid `u16`.
pub fn parse_address(address: &str) -> Result<(String, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| MockError::invalid_target(format!("'{address}' is not in host:port form")))?;

    let host = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        Some(bracketed) => bracketed,
        None if host.contains(':') => {
            return Err(MockError::invalid_target(format!(
                "IPv6 host in '{address}' must be bracketed"
            )));
        }
        None => host,
    };

    if host.is_empty() {
        return Err(MockError::invalid_target(format!(
            "'{address}' has an empty host"
        )));
    }

    let port = port
        .parse::<u16>()
        .map_err(|_| MockError::invalid_target(format!("'{port}' is not a valid port")))?;

    Ok((host.to_string(), port))
}

/// True for the hostnames that always name this machine.
#[must_use]
pub fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1"
}

/// A step in the connection resolution chain
///
/// Resolvers are synchronous: they run on the connecting task before any
/// I/O happens and must not block.
pub trait TargetResolver: Send + Sync {
    /// Return the target to actually connect to.
    ///
    /// # Errors
    ///
    /// Implementations fail on targets they cannot interpret.
    fn resolve(&self, target: ConnectTarget) -> Result<ConnectTarget>;

    /// Hostname to port redirects this resolver applies, if any.
    fn published_ports(&self) -> Option<&indexmap::IndexMap<String, u16>> {
        None
    }
}

/// Resolver that forwards every target unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectResolver;

impl DirectResolver {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TargetResolver for DirectResolver {
    fn resolve(&self, target: ConnectTarget) -> Result<ConnectTarget> {
        Ok(target)
    }
}
