use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// A peer address in URL form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// `tcp://host:port`
    Tcp(String),
    /// `unix:///path/to/socket`
    Unix(PathBuf),
}

impl Address {
    /// Parse an address URL.
    ///
    /// `tcps://` is rejected with [`TransportError::UnsupportedScheme`].
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| TransportError::InvalidAddress(input.to_string()))?;

        match scheme {
            "tcp" => {
                let (host, port) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| TransportError::InvalidAddress(input.to_string()))?;
                if host.is_empty() || port.parse::<u16>().is_err() {
                    return Err(TransportError::InvalidAddress(input.to_string()));
                }
                Ok(Self::Tcp(rest.to_string()))
            }
            "unix" => {
                if rest.is_empty() {
                    return Err(TransportError::InvalidAddress(input.to_string()));
                }
                Ok(Self::Unix(PathBuf::from(rest)))
            }
            "tcps" | "quic" => Err(TransportError::UnsupportedScheme(scheme.to_string())),
            _ => Err(TransportError::InvalidAddress(input.to_string())),
        }
    }

    /// Scheme name for diagnostics.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Unix(_) => "unix",
        }
    }
}

impl FromStr for Address {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(host_port) => write!(f, "tcp://{host_port}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}
