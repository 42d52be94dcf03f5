//! Framing: one whitespace-delimited line per connection, terminated by end-of-stream.
//!
//! `<host>:<port> <name> <payload...>`. In the tagged format the third token is always a
//! type tag (`MSG` for chat); in the legacy format a payload equal to a keyword is a control
//! message and anything else is chat.

use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;
use crate::protocol::{Message, Payload, CHAT_TAG};

/// Minimum tokens in a well-formed line: address, name, payload.
const MIN_TOKENS: usize = 3;

/// Wire format selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Explicit type tag before every payload.
    #[default]
    Tagged,
    /// Keyword sniffing, compatible with untagged peers.
    Legacy,
}

impl std::str::FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tagged" => Ok(WireFormat::Tagged),
            "legacy" => Ok(WireFormat::Legacy),
            other => Err(format!(
                "unknown wire format {other:?} (expected tagged or legacy)"
            )),
        }
    }
}

/// Encode a message as a single line. Chat text is not escaped or validated.
pub fn encode(msg: &Message, format: WireFormat) -> Vec<u8> {
    let payload = match (&msg.payload, format) {
        (Payload::Chat(body), WireFormat::Tagged) => format!("{} {}", CHAT_TAG, body),
        (Payload::Chat(body), WireFormat::Legacy) => body.clone(),
        (control, _) => control.keyword().unwrap_or_default().to_string(),
    };
    format!("{} {} {}", msg.sender, msg.sender_name, payload).into_bytes()
}

/// Decode the full content of one connection.
pub fn decode(bytes: &[u8], format: WireFormat) -> Result<Message, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < MIN_TOKENS {
        return Err(DecodeError::TooFewTokens {
            found: tokens.len(),
        });
    }
    let sender: PeerAddress = tokens[0]
        .parse()
        .map_err(|_| DecodeError::InvalidSender(tokens[0].to_string()))?;
    let sender_name = tokens[1].to_string();
    let rest = &tokens[2..];

    let payload = match format {
        WireFormat::Legacy => {
            let joined = rest.join(" ");
            Payload::from_keyword(&joined).unwrap_or(Payload::Chat(joined))
        }
        WireFormat::Tagged => {
            let (tag, body) = (rest[0], &rest[1..]);
            if tag == CHAT_TAG {
                Payload::Chat(body.join(" "))
            } else {
                let control = Payload::from_keyword(tag)
                    .ok_or_else(|| DecodeError::UnknownTag(tag.to_string()))?;
                if !body.is_empty() {
                    return Err(DecodeError::TrailingTokens(tag.to_string()));
                }
                control
            }
        }
    };

    Ok(Message {
        sender,
        sender_name,
        payload,
    })
}

/// Malformed inbound message. The caller drops it without touching peer state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed message: expected at least 3 tokens, found {found}")]
    TooFewTokens { found: usize },
    #[error("malformed message: not valid UTF-8")]
    InvalidUtf8,
    #[error("malformed message: invalid sender address {0:?}")]
    InvalidSender(String),
    #[error("malformed message: unknown type tag {0:?}")]
    UnknownTag(String),
    #[error("malformed message: unexpected tokens after {0}")]
    TrailingTokens(String),
    #[error("malformed message: longer than {limit} bytes")]
    TooLarge { limit: usize },
}
