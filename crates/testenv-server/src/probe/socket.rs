use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

use super::{PROBE_TARGET, wait_for};

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

/// Upper bound for a single connection attempt.
const SOCKET_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Address a server is expected to accept connections on once ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEndpoint {
    /// TCP socket endpoint.
    Tcp {
        /// Host name or IP literal.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// Unix domain socket endpoint.
    Unix {
        /// Socket path.
        path: PathBuf,
    },
}

impl SocketEndpoint {
    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(formatter, "[{host}]:{port}"),
            Self::Tcp { host, port } => write!(formatter, "{host}:{port}"),
            Self::Unix { path } => write!(formatter, "unix://{}", path.display()),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    /// Accepts `host:port`, `[v6]:port`, `tcp://host:port` and
    /// `unix:///path`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.contains("://") {
            return parse_url(input);
        }
        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(SocketParseError::MissingHost(input.to_owned()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| SocketParseError::InvalidPort(input.to_owned()))?;
        Ok(Self::tcp(host, port))
    }
}

fn parse_url(input: &str) -> Result<SocketEndpoint, SocketParseError> {
    let url = Url::parse(input)?;
    match url.scheme() {
        "unix" => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                return Err(SocketParseError::MissingUnixPath(input.to_owned()));
            }
            Ok(SocketEndpoint::unix(path))
        }
        "tcp" => {
            let host = url
                .host_str()
                .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
            let port = url
                .port()
                .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
            Ok(SocketEndpoint::tcp(
                host.trim_start_matches('[').trim_end_matches(']'),
                port,
            ))
        }
        other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
    }
}

/// Errors encountered while parsing a [`SocketEndpoint`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme was not recognised.
    #[error("unsupported socket scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing from the address.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// TCP port was not a number in range.
    #[error("invalid TCP port in '{0}'")]
    InvalidPort(String),
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Polls `endpoint` with connection attempts until one succeeds or `max`
/// elapses. A zero `max` performs exactly one attempt.
#[must_use]
pub fn wait_for_socket(endpoint: &SocketEndpoint, max: Duration) -> bool {
    wait_for(|| socket_is_reachable(endpoint), max)
}

/// Performs a single connection attempt against `endpoint`.
#[must_use]
pub fn socket_is_reachable(endpoint: &SocketEndpoint) -> bool {
    match try_connect(endpoint) {
        Ok(()) => true,
        Err(error) => {
            debug!(
                target: PROBE_TARGET,
                endpoint = %endpoint,
                error = %error,
                refused = is_refused(&error),
                "socket not reachable"
            );
            false
        }
    }
}

fn try_connect(endpoint: &SocketEndpoint) -> io::Result<()> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address = resolve_tcp(host, *port)?;
            TcpStream::connect_timeout(&address, SOCKET_PROBE_TIMEOUT).map(|_| ())
        }
        SocketEndpoint::Unix { path } => connect_unix(path),
    }
}

fn resolve_tcp(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved address"))
}

#[cfg(unix)]
fn connect_unix(path: &Path) -> io::Result<()> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, SOCKET_PROBE_TIMEOUT)
}

#[cfg(not(unix))]
fn connect_unix(_path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets unsupported on this platform",
    ))
}

fn is_refused(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::NotFound
            | io::ErrorKind::AddrNotAvailable
    )
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::refused(io::ErrorKind::ConnectionRefused, true)]
    #[case::missing_socket(io::ErrorKind::NotFound, true)]
    #[case::timed_out(io::ErrorKind::TimedOut, false)]
    #[case::denied(io::ErrorKind::PermissionDenied, false)]
    fn refused_connects_are_told_apart(#[case] kind: io::ErrorKind, #[case] refused: bool) {
        assert_eq!(is_refused(&io::Error::from(kind)), refused);
    }
}
