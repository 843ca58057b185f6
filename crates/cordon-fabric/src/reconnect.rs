//! Reconnection policy.
//!
//! Unexpected disconnection of an always-on peer (data center, trust
//! engine, policy engine, access proxy) triggers an immediate single
//! reconnect attempt, no backoff. Disconnection of a dependent peer (the
//! web front-end) instead records a courtesy notice delivered once the
//! peer is back; the notice is best-effort and not required for
//! correctness.

use cordon_core::{NodeId, NodeRole};
use std::collections::HashSet;
use tokio::sync::Mutex;

/// What to do when a peer drops unexpectedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
    /// Dial the peer again immediately, once.
    Reconnect,
    /// Remember the drop and notify the peer after it reconnects.
    NotifyWhenBack,
}

/// Tracks pending courtesy notices for dependent peers.
#[derive(Debug, Default)]
pub struct ReconnectPolicy {
    pending_notices: Mutex<HashSet<NodeId>>,
}

impl ReconnectPolicy {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// The action for a peer of the given role.
    pub fn action_for(role: NodeRole) -> ReconnectAction {
        if role.is_always_on() {
            ReconnectAction::Reconnect
        } else {
            ReconnectAction::NotifyWhenBack
        }
    }

    /// Record that `peer` dropped and should be notified on return.
    pub async fn record_notice(&self, peer: NodeId) {
        self.pending_notices.lock().await.insert(peer);
    }

    /// Consume the pending notice for `peer`, if any. Returns whether a
    /// notice was pending.
    pub async fn take_notice(&self, peer: &NodeId) -> bool {
        self.pending_notices.lock().await.remove(peer)
    }
}
