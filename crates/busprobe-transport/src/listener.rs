#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
#[cfg(unix)]
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::address::Address;
use crate::connection::Connection;
use crate::error::{Result, TransportError};

/// Accepts incoming connections on a TCP or Unix domain socket address.
///
/// Unix listeners remove a stale socket file before binding and clean up
/// their own socket file on drop.
pub struct Listener {
    inner: ListenerInner,
    address: Address,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

enum ListenerInner {
    Tcp(tokio::net::TcpListener),
    #[cfg(unix)]
    Unix(UnixSocketGuard),
}

#[cfg(unix)]
struct UnixSocketGuard {
    listener: tokio::net::UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl Listener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 elsewhere.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen.
    ///
    /// Binding `tcp://host:0` picks an ephemeral port; see [`Listener::local_address`].
    pub async fn bind(address: &Address) -> Result<Self> {
        match address {
            Address::Tcp(host_port) => {
                let listener = tokio::net::TcpListener::bind(host_port.as_str())
                    .await
                    .map_err(|source| TransportError::Bind {
                        address: address.to_string(),
                        source,
                    })?;
                let local = listener.local_addr()?;
                let address = Address::Tcp(local.to_string());
                info!(%address, "listening");
                Ok(Self {
                    inner: ListenerInner::Tcp(listener),
                    address,
                })
            }
            #[cfg(unix)]
            Address::Unix(path) => {
                let guard = bind_unix(path, Self::DEFAULT_SOCKET_MODE)?;
                info!(%address, "listening");
                Ok(Self {
                    inner: ListenerInner::Unix(guard),
                    address: address.clone(),
                })
            }
            #[cfg(not(unix))]
            Address::Unix(_) => Err(TransportError::UnsupportedScheme("unix".to_string())),
        }
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<Connection> {
        match &self.inner {
            ListenerInner::Tcp(listener) => {
                let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
                debug!(%peer, "accepted connection");
                Connection::from_tcp(stream)
            }
            #[cfg(unix)]
            ListenerInner::Unix(guard) => {
                let (stream, _addr) = guard
                    .listener
                    .accept()
                    .await
                    .map_err(TransportError::Accept)?;
                debug!(address = %self.address, "accepted connection");
                Ok(Connection::from_unix(stream, self.address.to_string()))
            }
        }
    }

    /// The address actually bound (ephemeral TCP ports resolved).
    pub fn local_address(&self) -> &Address {
        &self.address
    }
}

#[cfg(unix)]
fn bind_unix(path: &Path, mode: u32) -> Result<UnixSocketGuard> {
    let display = path.display().to_string();
    let bind_err = |source: std::io::Error| TransportError::Bind {
        address: format!("unix://{display}"),
        source,
    };

    let path_bytes = path.as_os_str().len();
    if path_bytes >= Listener::MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: display.clone(),
            len: path_bytes,
            max: Listener::MAX_PATH_LEN,
        });
    }

    // Remove stale socket if it exists, but never remove non-socket files.
    if path.exists() {
        let metadata = std::fs::symlink_metadata(path).map_err(bind_err)?;
        if !metadata.file_type().is_socket() {
            return Err(bind_err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "existing path is not a unix socket",
            )));
        }
        debug!(?path, "removing stale socket");
        std::fs::remove_file(path).map_err(bind_err)?;
    }

    let listener = tokio::net::UnixListener::bind(path).map_err(bind_err)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(bind_err)?;
    let created = std::fs::symlink_metadata(path).map_err(bind_err)?;

    Ok(UnixSocketGuard {
        listener,
        path: path.to_path_buf(),
        created_inode: Some((created.dev(), created.ino())),
    })
}

#[cfg(unix)]
impl Drop for UnixSocketGuard {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}
