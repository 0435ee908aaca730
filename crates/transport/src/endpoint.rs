//! Connection-string resolution.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Where the bus listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A TCP address in `host:port` form; the host may be a name.
    Tcp(String),
    /// A Unix domain socket path.
    Unix(PathBuf),
}

impl Endpoint {
    /// Resolves `connection` to an endpoint.
    ///
    /// Strings that read as a socket address or as `host:port` with a numeric
    /// port select TCP. Everything else, including any string containing a
    /// path separator, is a Unix socket path.
    pub fn parse(connection: &str) -> Self {
        if connection.parse::<SocketAddr>().is_ok() || looks_like_host_port(connection) {
            Self::Tcp(connection.to_owned())
        } else {
            Self::Unix(PathBuf::from(connection))
        }
    }
}

fn looks_like_host_port(connection: &str) -> bool {
    if connection.contains('/') {
        return false;
    }
    match connection.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(address) => write!(f, "tcp://{address}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}
