//! Node: shares one protocol engine between the listener and the console, and performs the
//! actions the engine returns.

use std::net::SocketAddr;
use std::sync::Arc;

use peerchat_core::{Action, EngineError, Event, Payload, PeerAddress, ProtocolEngine};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::transport;

#[derive(Clone)]
pub struct Node {
    engine: Arc<ProtocolEngine>,
    events: mpsc::UnboundedSender<Event>,
    max_message_bytes: usize,
}

impl Node {
    /// Returns the node and the receiving end of its event channel (for the console).
    pub fn new(
        engine: ProtocolEngine,
        max_message_bytes: usize,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let node = Self {
            engine: Arc::new(engine),
            events,
            max_message_bytes,
        };
        (node, events_rx)
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Apply the full content of one inbound connection. Malformed input is logged and dropped.
    pub fn on_inbound(&self, bytes: &[u8], remote: SocketAddr) {
        match self.engine.on_bytes_received(bytes) {
            Ok(actions) => {
                self.perform(actions);
            }
            Err(e) => tracing::warn!(%remote, error = %e, "dropping inbound message"),
        }
    }

    /// Spawn one outbound send per `Send` action and forward events to the console.
    /// Sends are fire-and-forget; the handles are returned for callers that want to wait.
    pub fn perform(&self, actions: Vec<Action>) -> Vec<JoinHandle<()>> {
        let mut sends = Vec::new();
        for action in actions {
            match action {
                Action::Send { to, message } => {
                    let frame = self.engine.encode(&message);
                    let payload = message.payload;
                    let engine = Arc::clone(&self.engine);
                    sends.push(tokio::spawn(async move {
                        match transport::send_message(&to, &frame).await {
                            Ok(()) => tracing::debug!(%to, %payload, "sent"),
                            Err(e) => {
                                tracing::warn!(%to, %payload, error = %e, "send failed");
                                if payload == Payload::ConnectRequest {
                                    engine.connect_failed(&to);
                                }
                            }
                        }
                    }));
                }
                Action::Notify(event) => {
                    tracing::info!(%event);
                    // Console may already be gone during shutdown.
                    let _ = self.events.send(event);
                }
            }
        }
        sends
    }

    pub fn connect(&self, target: &PeerAddress) -> Result<(), EngineError> {
        let actions = self.engine.initiate_connect(target)?;
        self.perform(actions);
        Ok(())
    }

    pub fn cancel_connect(&self, target: &PeerAddress) -> Result<(), EngineError> {
        self.engine.cancel_connect(target)
    }

    pub fn accept(&self, target: &PeerAddress) -> Result<(), EngineError> {
        let actions = self.engine.accept_connect(target)?;
        self.perform(actions);
        Ok(())
    }

    pub fn reject(&self, target: &PeerAddress) -> Result<String, EngineError> {
        self.engine.reject_connect(target)
    }

    pub fn disconnect(&self, target: &PeerAddress) -> Result<(), EngineError> {
        let actions = self.engine.initiate_disconnect(target)?;
        self.perform(actions);
        Ok(())
    }

    /// Returns how many peers were queried.
    pub fn discover(&self) -> usize {
        self.perform(self.engine.broadcast_discover()).len()
    }

    /// Returns how many peers were notified.
    pub fn announce(&self) -> usize {
        self.perform(self.engine.broadcast_connect_known()).len()
    }

    pub fn send_chat(&self, target: &PeerAddress, body: &str) -> Result<(), EngineError> {
        let actions = self.engine.send_chat(target, body)?;
        self.perform(actions);
        Ok(())
    }

    /// Tell connected peers we are leaving and wait for those sends to finish.
    pub async fn leave(&self) {
        for handle in self.perform(self.engine.leave()) {
            let _ = handle.await;
        }
    }
}
