//! Node identifiers and roles.
//!
//! The peer set is fixed and small: five roles, one node per role. Node
//! identifiers are opaque strings taken from the peer configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a fabric node, unique within the configured peer set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node identifier from a configured string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The role a node plays in the access-control fabric.
///
/// Roles are fixed at startup and drive intent dispatch: handlers are
/// registered against the sending node's role, never its raw identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Entry point for access attempts.
    AccessProxy,
    /// Trust-scoring node (policy decision point input side).
    Decision,
    /// Threshold policy engine rendering allow/deny verdicts.
    PolicyEngine,
    /// Web front-end boundary node.
    WebFront,
    /// Sole owner of durable collections.
    DataCenter,
}

impl NodeRole {
    /// Human-readable role label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            NodeRole::AccessProxy => "Access Proxy Node",
            NodeRole::Decision => "Trust Engine Node",
            NodeRole::PolicyEngine => "Policy Engine Node",
            NodeRole::WebFront => "Web UI",
            NodeRole::DataCenter => "Data Center Node",
        }
    }

    /// Whether a peer with this role is expected to be always reachable.
    ///
    /// Always-on peers get an immediate reconnect attempt on unexpected
    /// disconnection; dependent peers (the web front-end) instead receive a
    /// courtesy notification once they come back.
    pub fn is_always_on(&self) -> bool {
        !matches!(self, NodeRole::WebFront)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
