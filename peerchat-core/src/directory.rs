//! Peer directory: connected peers, inbound pending requests, and our own outgoing requests.
//!
//! A cheap cloneable handle over one mutex-guarded table set. Every public method takes the
//! lock once, so each operation is atomic with respect to the others no matter how many
//! connection handlers share the handle.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::address::PeerAddress;

/// Where an address currently sits in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Unknown,
    /// Sent us a CONNECT_REQUEST we have not accepted yet.
    PendingIn,
    Connected,
}

#[derive(Debug, Default)]
struct Tables {
    peers: BTreeMap<PeerAddress, String>,
    pending: BTreeMap<PeerAddress, String>,
    outgoing: BTreeSet<PeerAddress>,
}

#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    inner: Arc<Mutex<Tables>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // Mutations never call out while holding the guard, so poisoned tables are intact.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an inbound connection request. Returns false (no-op) if `addr` is already
    /// pending or connected.
    pub fn record_pending(&self, addr: &PeerAddress, name: &str) -> bool {
        let mut t = self.tables();
        if t.pending.contains_key(addr) || t.peers.contains_key(addr) {
            return false;
        }
        t.pending.insert(addr.clone(), name.to_string());
        true
    }

    /// Move a pending request into the connected table and return the offered name.
    pub fn accept_pending(&self, addr: &PeerAddress) -> Result<String, NoPendingRequest> {
        let mut t = self.tables();
        let name = t
            .pending
            .remove(addr)
            .ok_or_else(|| NoPendingRequest(addr.clone()))?;
        t.outgoing.remove(addr);
        t.peers.insert(addr.clone(), name.clone());
        Ok(name)
    }

    /// Drop a pending request without admitting the peer.
    pub fn reject_pending(&self, addr: &PeerAddress) -> Result<String, NoPendingRequest> {
        self.tables()
            .pending
            .remove(addr)
            .ok_or_else(|| NoPendingRequest(addr.clone()))
    }

    /// Unconditional upsert into the connected table. Clears any pending or outgoing entry.
    /// Returns true if the address was not connected before.
    pub fn mark_connected(&self, addr: &PeerAddress, name: &str) -> bool {
        let mut t = self.tables();
        t.pending.remove(addr);
        t.outgoing.remove(addr);
        t.peers.insert(addr.clone(), name.to_string()).is_none()
    }

    /// Remove a connected peer. Idempotent; returns the name it had, if any.
    pub fn remove_peer(&self, addr: &PeerAddress) -> Option<String> {
        let mut t = self.tables();
        t.outgoing.remove(addr);
        t.peers.remove(addr)
    }

    /// Remember that we are sending `addr` a CONNECT_REQUEST. Returns false if one is already
    /// recorded or `addr` has an inbound request of its own waiting for us.
    pub fn record_outgoing(&self, addr: &PeerAddress) -> bool {
        let mut t = self.tables();
        if t.pending.contains_key(addr) {
            return false;
        }
        t.outgoing.insert(addr.clone())
    }

    /// Drop our outgoing request to `addr` (send failed, or the user gave up on it).
    /// Returns false if none was recorded.
    pub fn forget_outgoing(&self, addr: &PeerAddress) -> bool {
        self.tables().outgoing.remove(addr)
    }

    /// Admit `addr` only if we have an outgoing request to it; check and upsert happen under
    /// one guard. Returns false and changes nothing otherwise.
    pub fn accept_outgoing(&self, addr: &PeerAddress, name: &str) -> bool {
        let mut t = self.tables();
        if !t.outgoing.remove(addr) {
            return false;
        }
        t.pending.remove(addr);
        t.peers.insert(addr.clone(), name.to_string());
        true
    }

    /// Remove `addr` only if it is connected. Leaves every table untouched otherwise.
    pub fn remove_connected(&self, addr: &PeerAddress) -> Option<String> {
        let mut t = self.tables();
        let name = t.peers.remove(addr)?;
        t.outgoing.remove(addr);
        Some(name)
    }

    pub fn has_outgoing(&self, addr: &PeerAddress) -> bool {
        self.tables().outgoing.contains(addr)
    }

    pub fn state_of(&self, addr: &PeerAddress) -> PeerState {
        let t = self.tables();
        if t.peers.contains_key(addr) {
            PeerState::Connected
        } else if t.pending.contains_key(addr) {
            PeerState::PendingIn
        } else {
            PeerState::Unknown
        }
    }

    pub fn name_of(&self, addr: &PeerAddress) -> Option<String> {
        self.tables().peers.get(addr).cloned()
    }

    /// Snapshot of connected peers, ordered by address.
    pub fn list_connected(&self) -> Vec<(PeerAddress, String)> {
        let t = self.tables();
        t.peers
            .iter()
            .map(|(a, n)| (a.clone(), n.clone()))
            .collect()
    }

    /// Snapshot of pending inbound requests, ordered by address.
    pub fn list_pending(&self) -> Vec<(PeerAddress, String)> {
        let t = self.tables();
        t.pending
            .iter()
            .map(|(a, n)| (a.clone(), n.clone()))
            .collect()
    }

    /// Drop every record and return the peers that were connected.
    pub fn clear(&self) -> Vec<(PeerAddress, String)> {
        let mut t = self.tables();
        t.pending.clear();
        t.outgoing.clear();
        std::mem::take(&mut t.peers).into_iter().collect()
    }
}

/// Accept or reject attempted with no inbound request from that address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no pending connection request from {0}")]
pub struct NoPendingRequest(pub PeerAddress);
