//! Peer addresses: the `(host, port)` key of every peer record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Remote peer address. Canonical text form is `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    host: String,
    port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Build an address from separately entered host and port strings (console input).
    pub fn from_parts(host: &str, port: &str) -> Result<Self, AddressError> {
        let host = host.trim();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(AddressError::InvalidHost(host.to_string()));
        }
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| AddressError::InvalidPort(port.trim().to_string()))?;
        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = AddressError;

    /// Split on the last `:` so the host part may itself contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;
        Self::from_parts(host, port)
    }
}

/// Error parsing a peer address from text or console input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("missing port in address {0:?}")]
    MissingPort(String),
    #[error("invalid host {0:?}")]
    InvalidHost(String),
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}
