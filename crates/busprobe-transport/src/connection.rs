use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::address::Address;
use crate::error::{Result, TransportError};

/// Read half of a connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Size of the in-memory pipe created by [`Connection::pair`].
const PAIR_BUFFER_SIZE: usize = 64 * 1024;

/// A connected, reliable, ordered byte stream.
///
/// Owns both halves so callers can hand the read half to a background task
/// while keeping the write half for sends.
pub struct Connection {
    reader: BoxedReader,
    writer: BoxedWriter,
    peer: String,
}

impl Connection {
    /// Wrap arbitrary async read/write halves.
    pub fn from_io<R, W>(reader: R, writer: W, peer: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer: peer.into(),
        }
    }

    /// Create two in-memory connections wired to each other.
    pub fn pair() -> (Self, Self) {
        let (left, right) = tokio::io::duplex(PAIR_BUFFER_SIZE);
        let (left_read, left_write) = tokio::io::split(left);
        let (right_read, right_write) = tokio::io::split(right);
        (
            Self::from_io(left_read, left_write, "memory:left"),
            Self::from_io(right_read, right_write, "memory:right"),
        )
    }

    pub(crate) fn from_tcp(stream: tokio::net::TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream
            .peer_addr()
            .map(|addr| format!("tcp://{addr}"))
            .unwrap_or_else(|_| "tcp://unknown".to_string());
        let (reader, writer) = stream.into_split();
        Ok(Self::from_io(reader, writer, peer))
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(stream: tokio::net::UnixStream, peer: String) -> Self {
        let (reader, writer) = stream.into_split();
        Self::from_io(reader, writer, peer)
    }

    /// Human-readable description of the remote end.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Split into owned read and write halves.
    pub fn into_split(self) -> (BoxedReader, BoxedWriter) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Dial a peer.
pub async fn connect(address: &Address) -> Result<Connection> {
    match address {
        Address::Tcp(host_port) => {
            let stream = tokio::net::TcpStream::connect(host_port.as_str())
                .await
                .map_err(|source| TransportError::Connect {
                    address: address.to_string(),
                    source,
                })?;
            debug!(%address, "connected");
            Connection::from_tcp(stream)
        }
        #[cfg(unix)]
        Address::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .map_err(|source| TransportError::Connect {
                    address: address.to_string(),
                    source,
                })?;
            debug!(%address, "connected");
            Ok(Connection::from_unix(stream, address.to_string()))
        }
        #[cfg(not(unix))]
        Address::Unix(_) => Err(TransportError::UnsupportedScheme("unix".to_string())),
    }
}
