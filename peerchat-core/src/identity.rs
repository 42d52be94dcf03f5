//! Local identity: display name plus the address peers should reply to.

use crate::address::PeerAddress;

/// This process's own identity. Set once at startup; embedded as the sender of every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
    address: PeerAddress,
}

impl Identity {
    /// The wire format is whitespace-delimited, so the name must be a single non-empty token.
    pub fn new(
        name: impl Into<String>,
        advertised_host: impl Into<String>,
        port: u16,
    ) -> Result<Self, IdentityError> {
        let name = name.into();
        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }
        if name.contains(char::is_whitespace) {
            return Err(IdentityError::NameContainsWhitespace(name));
        }
        let host = advertised_host.into();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(IdentityError::InvalidHost(host));
        }
        Ok(Self {
            name,
            address: PeerAddress::new(host, port),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }
}

/// Error building the local identity (name or host would break the line format).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("display name must not be empty")]
    EmptyName,
    #[error("display name {0:?} must not contain whitespace")]
    NameContainsWhitespace(String),
    #[error("invalid advertised host {0:?}")]
    InvalidHost(String),
}
