//! Peerchat protocol: message record and payload kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;

pub const CONNECT_REQUEST: &str = "CONNECT_REQUEST";
pub const CONNECT_ACCEPTED: &str = "CONNECT_ACCEPTED";
pub const DISCONNECT: &str = "DISCONNECT";
pub const DISCONNECT_ACK: &str = "DISCONNECT_ACK";
pub const WHO_IS_ONLINE: &str = "WHO_IS_ONLINE";
pub const CONNECTION_ESTABLISHED: &str = "CONNECTION_ESTABLISHED";
pub const EXIT: &str = "exit";
/// Type tag for chat bodies in the tagged wire format.
pub const CHAT_TAG: &str = "MSG";

/// One decoded protocol message. Every connection carries exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: PeerAddress,
    pub sender_name: String,
    pub payload: Payload,
}

impl Message {
    pub fn new(sender: PeerAddress, sender_name: impl Into<String>, payload: Payload) -> Self {
        Self {
            sender,
            sender_name: sender_name.into(),
            payload,
        }
    }
}

/// Control keyword or free-text chat body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Payload {
    ConnectRequest,
    ConnectAccepted,
    Disconnect,
    DisconnectAck,
    WhoIsOnline,
    ConnectionEstablished,
    /// Sender is going away; no reply expected.
    Exit,
    Chat(String),
}

impl Payload {
    /// Wire keyword for control payloads; `None` for chat.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Payload::ConnectRequest => Some(CONNECT_REQUEST),
            Payload::ConnectAccepted => Some(CONNECT_ACCEPTED),
            Payload::Disconnect => Some(DISCONNECT),
            Payload::DisconnectAck => Some(DISCONNECT_ACK),
            Payload::WhoIsOnline => Some(WHO_IS_ONLINE),
            Payload::ConnectionEstablished => Some(CONNECTION_ESTABLISHED),
            Payload::Exit => Some(EXIT),
            Payload::Chat(_) => None,
        }
    }

    /// Exact, case-sensitive keyword match.
    pub fn from_keyword(token: &str) -> Option<Self> {
        match token {
            CONNECT_REQUEST => Some(Payload::ConnectRequest),
            CONNECT_ACCEPTED => Some(Payload::ConnectAccepted),
            DISCONNECT => Some(Payload::Disconnect),
            DISCONNECT_ACK => Some(Payload::DisconnectAck),
            WHO_IS_ONLINE => Some(Payload::WhoIsOnline),
            CONNECTION_ESTABLISHED => Some(Payload::ConnectionEstablished),
            EXIT => Some(Payload::Exit),
            _ => None,
        }
    }

    pub fn is_control(&self) -> bool {
        !matches!(self, Payload::Chat(_))
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Chat(body) => write!(f, "chat {:?}", body),
            other => f.write_str(other.keyword().unwrap_or_default()),
        }
    }
}

/// Admission policy: which inbound traffic turns a sender into a connected peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Any well-formed chat or discovery message admits its sender.
    #[default]
    Open,
    /// Only the CONNECT_REQUEST / CONNECT_ACCEPTED handshake admits.
    Strict,
}

impl std::str::FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(Policy::Open),
            "strict" => Ok(Policy::Strict),
            other => Err(format!("unknown policy {other:?} (expected open or strict)")),
        }
    }
}
