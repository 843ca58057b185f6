//! Connection registry.
//!
//! Links are directed: a peer may be connected outbound, inbound, or both
//! at once. The reachable set is the union of both directions; envelope
//! delivery resolves the outbound link first and falls back to an
//! inbound-only link, matching the original overlay's target resolution
//! order.

use crate::envelope::WireFrame;
use cordon_core::{NodeId, NodeRole};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

/// Direction of an established link, from the local node's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    /// The peer dialed us.
    Inbound,
    /// We dialed the peer.
    Outbound,
}

/// One established link to a peer. Frames handed to `tx` are written to
/// the socket by the connection's writer task in order (stream semantics).
#[derive(Debug, Clone)]
pub struct PeerLink {
    /// The peer at the far end.
    pub peer: NodeId,
    /// The peer's announced role.
    pub role: NodeRole,
    /// Link direction.
    pub direction: LinkDirection,
    /// Outgoing frame queue for this link.
    pub tx: mpsc::UnboundedSender<WireFrame>,
}

/// Tracks the inbound and outbound link sets plus connection waiters.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    outbound: HashMap<NodeId, PeerLink>,
    inbound: HashMap<NodeId, PeerLink>,
    waiters: Vec<(NodeId, oneshot::Sender<()>)>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an established link and wake any waiters for that exact peer.
    pub fn register(&mut self, link: PeerLink) {
        let peer = link.peer.clone();
        match link.direction {
            LinkDirection::Outbound => self.outbound.insert(peer.clone(), link),
            LinkDirection::Inbound => self.inbound.insert(peer.clone(), link),
        };

        // Wake only waiters for this peer; others keep waiting so a
        // concurrent wait for a different peer never consumes this signal.
        let mut kept = Vec::with_capacity(self.waiters.len());
        for (waited, tx) in self.waiters.drain(..) {
            if waited == peer {
                let _ = tx.send(());
            } else {
                kept.push((waited, tx));
            }
        }
        self.waiters = kept;
    }

    /// Drop a link. Returns the removed link if it was present.
    pub fn remove(&mut self, peer: &NodeId, direction: LinkDirection) -> Option<PeerLink> {
        match direction {
            LinkDirection::Outbound => self.outbound.remove(peer),
            LinkDirection::Inbound => self.inbound.remove(peer),
        }
    }

    /// Resolve the link used to deliver to `peer`: outbound first, then
    /// inbound-only.
    pub fn resolve(&self, peer: &NodeId) -> Option<&PeerLink> {
        self.outbound.get(peer).or_else(|| self.inbound.get(peer))
    }

    /// Whether `peer` is reachable through either direction.
    pub fn is_reachable(&self, peer: &NodeId) -> bool {
        self.outbound.contains_key(peer) || self.inbound.contains_key(peer)
    }

    /// Whether an outbound link to `peer` already exists.
    pub fn has_outbound(&self, peer: &NodeId) -> bool {
        self.outbound.contains_key(peer)
    }

    /// The announced role of a reachable peer.
    pub fn role_of(&self, peer: &NodeId) -> Option<NodeRole> {
        self.resolve(peer).map(|l| l.role)
    }

    /// Register interest in `peer` becoming reachable. The returned
    /// receiver fires once a link to that exact peer is registered.
    pub fn add_waiter(&mut self, peer: NodeId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push((peer, tx));
        rx
    }

    /// Drop every link. Writer tasks observe their queues closing and
    /// shut the sockets down.
    pub fn clear(&mut self) {
        self.outbound.clear();
        self.inbound.clear();
        self.waiters.clear();
    }
}
