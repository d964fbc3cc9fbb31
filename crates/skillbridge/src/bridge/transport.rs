//! Listening socket for the optimizer connection.
//!
//! Two endpoint flavours:
//! - **Unix**: filesystem socket; a stale file is removed before bind and the
//!   file is removed again when the session ends
//! - **Tcp**: `host:port` with address reuse and a backlog of one
//!
//! Exactly one connection is accepted. `accept` consumes the listener, so a
//! second client is never served by the same process.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket, UnixListener};

/// Where the optimizer connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// Any accepted socket, boxed so the session does not care which flavour it is.
pub trait PeerStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> PeerStream for T {}

/// Address of the connected optimizer as seen by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Tcp(SocketAddr),
    /// Unnamed client sockets have no path.
    Unix(Option<PathBuf>),
}

impl PeerAddr {
    /// `[host, port]` for TCP, the socket path (or null) for UNIX.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Tcp(addr) => json!([addr.ip().to_string(), addr.port()]),
            Self::Unix(Some(path)) => json!(path.display().to_string()),
            Self::Unix(None) => Value::Null,
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{}", addr),
            Self::Unix(Some(path)) => write!(f, "{}", path.display()),
            Self::Unix(None) => f.write_str("unnamed unix socket"),
        }
    }
}

/// Removes a filesystem socket when dropped.
#[derive(Debug)]
pub struct SocketFileGuard {
    path: PathBuf,
}

impl Drop for SocketFileGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed socket file");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove socket file");
            }
        }
    }
}

/// The optimizer connection together with whatever must outlive it.
pub struct Accepted {
    pub stream: Box<dyn PeerStream>,
    pub peer: PeerAddr,
    /// Held until session teardown so the socket file disappears with the session.
    pub socket_file: Option<SocketFileGuard>,
}

pub enum BoundListener {
    Unix {
        listener: UnixListener,
        guard: SocketFileGuard,
    },
    Tcp(TcpListener),
}

impl BoundListener {
    pub async fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Unix(path) => Self::bind_unix(path),
            Endpoint::Tcp { host, port } => Self::bind_tcp(host, *port).await,
        }
    }

    fn bind_unix(path: &Path) -> io::Result<Self> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed stale socket file");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let listener = UnixListener::bind(path)?;
        tracing::debug!(transport_type = "unix", path = %path.display(), "Bound listener");
        Ok(Self::Unix {
            listener,
            guard: SocketFileGuard {
                path: path.to_path_buf(),
            },
        })
    }

    async fn bind_tcp(host: &str, port: u16) -> io::Result<Self> {
        let addr = tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{}:{} did not resolve to any address", host, port),
                )
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(1)?;

        tracing::debug!(transport_type = "tcp", addr = %listener.local_addr()?, "Bound listener");
        Ok(Self::Tcp(listener))
    }

    /// Address actually bound; differs from the configured one when port 0 was requested.
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            Self::Unix { guard, .. } => Ok(Endpoint::Unix(guard.path.clone())),
            Self::Tcp(listener) => {
                let addr = listener.local_addr()?;
                Ok(Endpoint::Tcp {
                    host: addr.ip().to_string(),
                    port: addr.port(),
                })
            }
        }
    }

    /// Wait for the single optimizer connection and stop listening.
    pub async fn accept(self) -> io::Result<Accepted> {
        match self {
            Self::Unix { listener, guard } => {
                tracing::trace!("Waiting for optimizer connection");
                let (stream, addr) = listener.accept().await?;
                let peer = PeerAddr::Unix(addr.as_pathname().map(Path::to_path_buf));
                tracing::info!(%peer, "Optimizer connected");
                Ok(Accepted {
                    stream: Box::new(stream),
                    peer,
                    socket_file: Some(guard),
                })
            }
            Self::Tcp(listener) => {
                tracing::trace!("Waiting for optimizer connection");
                let (stream, addr) = listener.accept().await?;
                let peer = PeerAddr::Tcp(addr);
                tracing::info!(%peer, "Optimizer connected");
                Ok(Accepted {
                    stream: Box::new(stream),
                    peer,
                    socket_file: None,
                })
            }
        }
    }
}
