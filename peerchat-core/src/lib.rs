//! Peerchat protocol reference implementation.
//! Host-driven: no I/O; host passes inbound bytes and user intents, receives actions.

pub mod address;
pub mod directory;
pub mod engine;
pub mod identity;
pub mod protocol;
pub mod wire;

pub use address::{AddressError, PeerAddress};
pub use directory::{NoPendingRequest, PeerDirectory, PeerState};
pub use engine::{Action, EngineError, Event, ProtocolEngine};
pub use identity::{Identity, IdentityError};
pub use protocol::{Message, Payload, Policy};
pub use wire::{decode, encode, DecodeError, WireFormat};
