//! Host-driven API: ProtocolEngine receives decoded messages and user intents, mutates the
//! peer directory, and returns actions for the host to perform (send a message, notify the UI).

use std::fmt;

use crate::address::PeerAddress;
use crate::directory::{NoPendingRequest, PeerDirectory, PeerState};
use crate::identity::Identity;
use crate::protocol::{Message, Payload, Policy};
use crate::wire::{self, DecodeError, WireFormat};

/// Something the host must do after an engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a short-lived connection to `to`, write the encoded message, close.
    Send { to: PeerAddress, message: Message },
    /// Report a directory change or inbound traffic to the presentation layer.
    Notify(Event),
}

/// Presentation-layer notification. Drained by the console; never fed back into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ConnectRequested { from: PeerAddress, name: String },
    PeerConnected { addr: PeerAddress, name: String },
    PeerDisconnected { addr: PeerAddress, name: String },
    DisconnectAcknowledged { addr: PeerAddress },
    PeerExited { addr: PeerAddress, name: String },
    ChatReceived {
        from: PeerAddress,
        name: String,
        body: String,
    },
    DiscoveryQuery { from: PeerAddress, name: String },
    PeerAnnounced { from: PeerAddress, name: String },
    /// Strict policy: chat from a sender that is not connected.
    ChatDropped { from: PeerAddress, name: String },
    /// Strict policy: CONNECT_ACCEPTED we never asked for.
    UnsolicitedAccept { from: PeerAddress, name: String },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ConnectRequested { from, name } => {
                write!(f, "Connection request received from {from} ({name}).")
            }
            Event::PeerConnected { addr, name } => {
                write!(f, "Connected with {addr} ({name}).")
            }
            Event::PeerDisconnected { addr, name } => {
                write!(f, "Peer {addr} ({name}) disconnected.")
            }
            Event::DisconnectAcknowledged { addr } => {
                write!(f, "Peer {addr} acknowledged disconnection.")
            }
            Event::PeerExited { addr, name } => write!(f, "Peer {addr} ({name}) left."),
            Event::ChatReceived { from, name, body } => {
                write!(f, "Received from {from} ({name}): {body}")
            }
            Event::DiscoveryQuery { from, name } => {
                write!(f, "{from} ({name}) asked who is online.")
            }
            Event::PeerAnnounced { from, name } => {
                write!(f, "{from} ({name}) announced an established connection.")
            }
            Event::ChatDropped { from, name } => {
                write!(f, "Dropped message from unconnected peer {from} ({name}).")
            }
            Event::UnsolicitedAccept { from, name } => {
                write!(f, "Ignored unsolicited acceptance from {from} ({name}).")
            }
        }
    }
}

/// Error returned by a user-initiated engine operation. None of them change the directory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    NoPendingRequest(#[from] NoPendingRequest),
    #[error("connection request already pending for {0}")]
    AlreadyPending(PeerAddress),
    #[error("no outgoing connection request to {0}")]
    NoOutgoingRequest(PeerAddress),
    #[error("peer {0} is not connected")]
    NotConnected(PeerAddress),
    #[error("message body is empty")]
    EmptyMessage,
}

/// Protocol state machine over one injected peer directory.
///
/// All methods take `&self`: the directory serializes mutations internally, so one engine can be
/// shared by every connection handler and the console at once.
#[derive(Debug)]
pub struct ProtocolEngine {
    identity: Identity,
    directory: PeerDirectory,
    policy: Policy,
    wire_format: WireFormat,
}

impl ProtocolEngine {
    pub fn new(identity: Identity, directory: PeerDirectory) -> Self {
        Self {
            identity,
            directory,
            policy: Policy::default(),
            wire_format: WireFormat::default(),
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    /// Encode a message the way this engine's peers expect it.
    pub fn encode(&self, message: &Message) -> Vec<u8> {
        wire::encode(message, self.wire_format)
    }

    /// Entry point for connection handlers: decode the full content of one inbound connection
    /// and apply it. A decode error leaves the directory untouched.
    pub fn on_bytes_received(&self, bytes: &[u8]) -> Result<Vec<Action>, DecodeError> {
        let message = wire::decode(bytes, self.wire_format)?;
        Ok(self.handle(message))
    }

    /// Apply one decoded inbound message.
    pub fn handle(&self, message: Message) -> Vec<Action> {
        let Message {
            sender: from,
            sender_name: name,
            payload,
        } = message;
        tracing::debug!(%from, %name, %payload, "inbound message");
        let mut actions = Vec::new();

        match payload {
            Payload::ConnectRequest => {
                if self.directory.record_pending(&from, &name) {
                    actions.push(Action::Notify(Event::ConnectRequested { from, name }));
                } else {
                    tracing::debug!(%from, "duplicate connection request ignored");
                }
            }
            Payload::ConnectAccepted => {
                let admitted = match self.policy {
                    Policy::Strict => self.directory.accept_outgoing(&from, &name),
                    Policy::Open => {
                        self.directory.mark_connected(&from, &name);
                        true
                    }
                };
                if admitted {
                    actions.push(Action::Notify(Event::PeerConnected { addr: from, name }));
                } else {
                    tracing::warn!(%from, "acceptance without an outgoing request");
                    actions.push(Action::Notify(Event::UnsolicitedAccept { from, name }));
                }
            }
            Payload::Disconnect => {
                self.directory.remove_peer(&from);
                actions.push(self.send(&from, Payload::DisconnectAck));
                actions.push(Action::Notify(Event::PeerDisconnected { addr: from, name }));
            }
            Payload::DisconnectAck => {
                self.directory.remove_peer(&from);
                actions.push(Action::Notify(Event::DisconnectAcknowledged { addr: from }));
            }
            Payload::Exit => {
                self.directory.remove_peer(&from);
                actions.push(Action::Notify(Event::PeerExited { addr: from, name }));
            }
            Payload::WhoIsOnline => {
                if self.policy == Policy::Open {
                    self.admit(&from, &name, &mut actions);
                }
                actions.push(Action::Notify(Event::DiscoveryQuery { from, name }));
            }
            Payload::ConnectionEstablished => {
                if self.policy == Policy::Open {
                    self.admit(&from, &name, &mut actions);
                }
                actions.push(Action::Notify(Event::PeerAnnounced { from, name }));
            }
            Payload::Chat(body) => match self.policy {
                Policy::Open => {
                    self.admit(&from, &name, &mut actions);
                    actions.push(Action::Notify(Event::ChatReceived { from, name, body }));
                }
                Policy::Strict => {
                    if self.directory.state_of(&from) == PeerState::Connected {
                        actions.push(Action::Notify(Event::ChatReceived { from, name, body }));
                    } else {
                        tracing::warn!(%from, "chat from unconnected peer dropped");
                        actions.push(Action::Notify(Event::ChatDropped { from, name }));
                    }
                }
            },
        }
        actions
    }

    /// Implicit admit: any well-formed message makes its sender a connected peer.
    fn admit(&self, from: &PeerAddress, name: &str, actions: &mut Vec<Action>) {
        if self.directory.mark_connected(from, name) {
            actions.push(Action::Notify(Event::PeerConnected {
                addr: from.clone(),
                name: name.to_string(),
            }));
        }
    }

    fn send(&self, to: &PeerAddress, payload: Payload) -> Action {
        Action::Send {
            to: to.clone(),
            message: Message::new(
                self.identity.address().clone(),
                self.identity.name(),
                payload,
            ),
        }
    }

    fn send_to_connected(&self, payload: Payload) -> Vec<Action> {
        self.directory
            .list_connected()
            .into_iter()
            .map(|(addr, _)| self.send(&addr, payload.clone()))
            .collect()
    }

    /// Ask `target` to become a connected peer.
    pub fn initiate_connect(&self, target: &PeerAddress) -> Result<Vec<Action>, EngineError> {
        if !self.directory.record_outgoing(target) {
            return Err(EngineError::AlreadyPending(target.clone()));
        }
        tracing::info!(%target, "sending connection request");
        Ok(vec![self.send(target, Payload::ConnectRequest)])
    }

    /// Our CONNECT_REQUEST to `target` never left this host; allow a new attempt.
    pub fn connect_failed(&self, target: &PeerAddress) {
        if self.directory.forget_outgoing(target) {
            tracing::debug!(%target, "outgoing request forgotten after failed send");
        }
    }

    /// Give up on an unanswered CONNECT_REQUEST so a new one can be sent.
    pub fn cancel_connect(&self, target: &PeerAddress) -> Result<(), EngineError> {
        if !self.directory.forget_outgoing(target) {
            return Err(EngineError::NoOutgoingRequest(target.clone()));
        }
        tracing::info!(%target, "cancelled connection request");
        Ok(())
    }

    /// Accept an inbound request from `target` and tell it so.
    pub fn accept_connect(&self, target: &PeerAddress) -> Result<Vec<Action>, EngineError> {
        let name = self.directory.accept_pending(target)?;
        tracing::info!(%target, %name, "accepted connection");
        Ok(vec![self.send(target, Payload::ConnectAccepted)])
    }

    /// Drop an inbound request. Nothing is sent; the requester simply never hears back.
    pub fn reject_connect(&self, target: &PeerAddress) -> Result<String, EngineError> {
        let name = self.directory.reject_pending(target)?;
        tracing::info!(%target, %name, "rejected connection request");
        Ok(name)
    }

    pub fn initiate_disconnect(&self, target: &PeerAddress) -> Result<Vec<Action>, EngineError> {
        if self.directory.remove_connected(target).is_none() {
            return Err(EngineError::NotConnected(target.clone()));
        }
        tracing::info!(%target, "sending disconnect");
        Ok(vec![self.send(target, Payload::Disconnect)])
    }

    /// WHO_IS_ONLINE to every connected peer.
    pub fn broadcast_discover(&self) -> Vec<Action> {
        self.send_to_connected(Payload::WhoIsOnline)
    }

    /// CONNECTION_ESTABLISHED to every connected peer.
    pub fn broadcast_connect_known(&self) -> Vec<Action> {
        self.send_to_connected(Payload::ConnectionEstablished)
    }

    /// One-shot chat to any address; the directory is neither consulted nor changed.
    pub fn send_chat(&self, target: &PeerAddress, body: &str) -> Result<Vec<Action>, EngineError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        Ok(vec![self.send(target, Payload::Chat(body.to_string()))])
    }

    /// Local shutdown: forget everyone and tell connected peers we are leaving.
    pub fn leave(&self) -> Vec<Action> {
        self.directory
            .clear()
            .into_iter()
            .map(|(addr, _)| self.send(&addr, Payload::Exit))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> PeerAddress {
        s.parse().unwrap()
    }

    fn engine(policy: Policy) -> ProtocolEngine {
        let me = Identity::new("Me", "192.168.0.2", 5000).unwrap();
        ProtocolEngine::new(me, PeerDirectory::new()).with_policy(policy)
    }

    fn from(sender: &str, name: &str, payload: Payload) -> Message {
        Message::new(addr(sender), name, payload)
    }

    fn sends(actions: &[Action]) -> Vec<(PeerAddress, Payload)> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send { to, message } => Some((to.clone(), message.payload.clone())),
                Action::Notify(_) => None,
            })
            .collect()
    }

    fn events(actions: &[Action]) -> Vec<Event> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Notify(e) => Some(e.clone()),
                Action::Send { .. } => None,
            })
            .collect()
    }

    #[test]
    fn request_then_local_accept() {
        let e = engine(Policy::Open);
        let bob = addr("10.0.0.5:4000");
        let actions = e.handle(from("10.0.0.5:4000", "Bob", Payload::ConnectRequest));
        assert_eq!(
            events(&actions),
            vec![Event::ConnectRequested {
                from: bob.clone(),
                name: "Bob".into()
            }]
        );
        assert_eq!(e.directory().state_of(&bob), PeerState::PendingIn);

        // Duplicate request is a silent no-op.
        assert!(e
            .handle(from("10.0.0.5:4000", "Bob", Payload::ConnectRequest))
            .is_empty());

        let actions = e.accept_connect(&bob).unwrap();
        assert_eq!(sends(&actions), vec![(bob.clone(), Payload::ConnectAccepted)]);
        assert_eq!(e.directory().list_connected(), vec![(bob, "Bob".to_string())]);
        assert!(e.directory().list_pending().is_empty());
    }

    #[test]
    fn accept_without_request() {
        let e = engine(Policy::Open);
        let a = addr("10.0.0.5:4000");
        assert_eq!(
            e.accept_connect(&a),
            Err(EngineError::NoPendingRequest(NoPendingRequest(a)))
        );
        assert!(e.directory().list_connected().is_empty());
    }

    #[test]
    fn connect_accepted_admits() {
        let e = engine(Policy::Open);
        let a = addr("10.0.0.7:4000");
        e.initiate_connect(&a).unwrap();
        e.handle(from("10.0.0.7:4000", "Cy", Payload::ConnectAccepted));
        assert_eq!(e.directory().name_of(&a).as_deref(), Some("Cy"));
        assert!(!e.directory().has_outgoing(&a));
    }

    #[test]
    fn disconnect_removes_and_acks_once() {
        let e = engine(Policy::Open);
        let a = addr("1.2.3.4:9");
        e.directory().mark_connected(&a, "Al");
        let actions = e.handle(from("1.2.3.4:9", "Al", Payload::Disconnect));
        assert_eq!(sends(&actions), vec![(a.clone(), Payload::DisconnectAck)]);
        assert_eq!(e.directory().state_of(&a), PeerState::Unknown);
        match &actions[0] {
            Action::Send { message, .. } => {
                assert_eq!(message.sender, addr("192.168.0.2:5000"));
                assert_eq!(message.sender_name, "Me");
            }
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn disconnect_ack_and_exit_remove_without_reply() {
        let e = engine(Policy::Open);
        let a = addr("1.2.3.4:9");
        for payload in [Payload::DisconnectAck, Payload::Exit] {
            e.directory().mark_connected(&a, "Al");
            let actions = e.handle(from("1.2.3.4:9", "Al", payload));
            assert!(sends(&actions).is_empty());
            assert_eq!(e.directory().state_of(&a), PeerState::Unknown);
        }
    }

    #[test]
    fn chat_from_unknown_admits_in_open_mode() {
        let e = engine(Policy::Open);
        let a = addr("10.1.1.1:7000");
        let actions = e.handle(from("10.1.1.1:7000", "Dee", Payload::Chat("hi".into())));
        assert_eq!(e.directory().name_of(&a).as_deref(), Some("Dee"));
        assert_eq!(
            events(&actions),
            vec![
                Event::PeerConnected {
                    addr: a.clone(),
                    name: "Dee".into()
                },
                Event::ChatReceived {
                    from: a,
                    name: "Dee".into(),
                    body: "hi".into()
                },
            ]
        );
    }

    #[test]
    fn chat_clears_pending_request() {
        let e = engine(Policy::Open);
        let a = addr("10.1.1.1:7000");
        e.handle(from("10.1.1.1:7000", "Dee", Payload::ConnectRequest));
        e.handle(from("10.1.1.1:7000", "Dee", Payload::Chat("hello".into())));
        assert_eq!(e.directory().state_of(&a), PeerState::Connected);
        assert!(e.directory().list_pending().is_empty());
    }

    #[test]
    fn discovery_traffic_admits_only_in_open_mode() {
        for (policy, expected) in [
            (Policy::Open, PeerState::Connected),
            (Policy::Strict, PeerState::Unknown),
        ] {
            let e = engine(policy);
            e.handle(from("10.2.2.2:1", "Q", Payload::WhoIsOnline));
            e.handle(from("10.3.3.3:1", "R", Payload::ConnectionEstablished));
            assert_eq!(e.directory().state_of(&addr("10.2.2.2:1")), expected);
            assert_eq!(e.directory().state_of(&addr("10.3.3.3:1")), expected);
        }
    }

    #[test]
    fn strict_mode_drops_chat_from_strangers() {
        let e = engine(Policy::Strict);
        let a = addr("10.1.1.1:7000");
        let actions = e.handle(from("10.1.1.1:7000", "Dee", Payload::Chat("hi".into())));
        assert_eq!(e.directory().state_of(&a), PeerState::Unknown);
        assert!(matches!(events(&actions)[..], [Event::ChatDropped { .. }]));

        e.directory().mark_connected(&a, "Dee");
        let actions = e.handle(from("10.1.1.1:7000", "Dee", Payload::Chat("hi".into())));
        assert!(matches!(events(&actions)[..], [Event::ChatReceived { .. }]));
    }

    #[test]
    fn strict_mode_requires_outgoing_request_for_accept() {
        let e = engine(Policy::Strict);
        let a = addr("10.0.0.7:4000");
        let actions = e.handle(from("10.0.0.7:4000", "Cy", Payload::ConnectAccepted));
        assert!(matches!(events(&actions)[..], [Event::UnsolicitedAccept { .. }]));
        assert_eq!(e.directory().state_of(&a), PeerState::Unknown);

        e.initiate_connect(&a).unwrap();
        e.handle(from("10.0.0.7:4000", "Cy", Payload::ConnectAccepted));
        assert_eq!(e.directory().state_of(&a), PeerState::Connected);
    }

    #[test]
    fn connect_twice_is_already_pending() {
        let e = engine(Policy::Open);
        let a = addr("10.0.0.7:4000");
        assert_eq!(
            sends(&e.initiate_connect(&a).unwrap()),
            vec![(a.clone(), Payload::ConnectRequest)]
        );
        assert_eq!(
            e.initiate_connect(&a),
            Err(EngineError::AlreadyPending(a.clone()))
        );

        let b = addr("10.0.0.8:4000");
        e.handle(from("10.0.0.8:4000", "Di", Payload::ConnectRequest));
        assert_eq!(e.initiate_connect(&b), Err(EngineError::AlreadyPending(b)));
    }

    #[test]
    fn failed_or_cancelled_request_can_be_retried() {
        let e = engine(Policy::Open);
        let a = addr("10.0.0.7:4000");
        e.initiate_connect(&a).unwrap();
        e.connect_failed(&a);
        assert!(!e.directory().has_outgoing(&a));
        e.initiate_connect(&a).unwrap();

        assert_eq!(e.cancel_connect(&a), Ok(()));
        assert_eq!(
            e.cancel_connect(&a),
            Err(EngineError::NoOutgoingRequest(a.clone()))
        );
        assert_eq!(
            sends(&e.initiate_connect(&a).unwrap()),
            vec![(a, Payload::ConnectRequest)]
        );
    }

    #[test]
    fn not_connected_disconnect_keeps_outgoing_request() {
        let e = engine(Policy::Open);
        let a = addr("10.0.0.7:4000");
        e.initiate_connect(&a).unwrap();
        assert_eq!(
            e.initiate_disconnect(&a),
            Err(EngineError::NotConnected(a.clone()))
        );
        assert!(e.directory().has_outgoing(&a));
        assert_eq!(e.initiate_connect(&a), Err(EngineError::AlreadyPending(a)));
    }

    #[test]
    fn disconnect_scenario() {
        let e = engine(Policy::Open);
        let al = addr("1.2.3.4:9");
        e.directory().mark_connected(&al, "Al");
        let actions = e
            .initiate_disconnect(&PeerAddress::from_parts("1.2.3.4", "9").unwrap())
            .unwrap();
        assert!(e.directory().list_connected().is_empty());
        assert_eq!(sends(&actions), vec![(al.clone(), Payload::Disconnect)]);
        assert_eq!(
            e.initiate_disconnect(&al),
            Err(EngineError::NotConnected(al))
        );
    }

    #[test]
    fn broadcasts_fan_out_to_connected_only() {
        let e = engine(Policy::Open);
        e.directory().mark_connected(&addr("1.1.1.1:1"), "A");
        e.directory().mark_connected(&addr("2.2.2.2:2"), "B");
        e.directory().record_pending(&addr("3.3.3.3:3"), "C");
        assert_eq!(
            sends(&e.broadcast_discover()),
            vec![
                (addr("1.1.1.1:1"), Payload::WhoIsOnline),
                (addr("2.2.2.2:2"), Payload::WhoIsOnline),
            ]
        );
        assert_eq!(sends(&e.broadcast_connect_known()).len(), 2);
        assert!(engine(Policy::Open).broadcast_discover().is_empty());
    }

    #[test]
    fn chat_send_bypasses_directory() {
        let e = engine(Policy::Strict);
        let stranger = addr("8.8.4.4:1234");
        assert_eq!(
            sends(&e.send_chat(&stranger, "  hey you ").unwrap()),
            vec![(stranger.clone(), Payload::Chat("hey you".into()))]
        );
        assert_eq!(e.directory().state_of(&stranger), PeerState::Unknown);
        assert_eq!(e.send_chat(&stranger, "   "), Err(EngineError::EmptyMessage));
    }

    #[test]
    fn leave_notifies_connected_and_clears() {
        let e = engine(Policy::Open);
        e.directory().mark_connected(&addr("1.1.1.1:1"), "A");
        e.directory().record_pending(&addr("3.3.3.3:3"), "C");
        assert_eq!(
            sends(&e.leave()),
            vec![(addr("1.1.1.1:1"), Payload::Exit)]
        );
        assert!(e.directory().list_connected().is_empty());
        assert!(e.directory().list_pending().is_empty());
    }

    #[test]
    fn malformed_bytes_leave_directory_untouched() {
        let e = engine(Policy::Open);
        assert!(e.on_bytes_received(b"10.0.0.5:4000 Bob").is_err());
        assert!(e.directory().list_connected().is_empty());
        assert!(e.directory().list_pending().is_empty());

        let actions = e
            .on_bytes_received(b"10.0.0.5:4000 Bob CONNECT_REQUEST")
            .unwrap();
        assert_eq!(events(&actions).len(), 1);
    }

    #[test]
    fn reject_forgets_request() {
        let e = engine(Policy::Open);
        let a = addr("10.0.0.5:4000");
        e.handle(from("10.0.0.5:4000", "Bob", Payload::ConnectRequest));
        assert_eq!(e.reject_connect(&a).unwrap(), "Bob");
        assert!(e.accept_connect(&a).is_err());
    }
}
