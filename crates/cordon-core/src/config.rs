//! Static fabric configuration.
//!
//! Each process is handed the full peer table at startup: one entry per
//! role, immutable for the process lifetime. The table is normally loaded
//! from a TOML document; tests construct it directly.

use crate::error::{CordonError, CordonResult};
use crate::identifiers::{NodeId, NodeRole};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity and address of one fabric node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Node identifier, unique within the peer set.
    pub id: NodeId,
    /// Role the node plays.
    pub role: NodeRole,
    /// Listen/connect host.
    pub host: String,
    /// Listen/connect port. Port 0 asks the OS for an ephemeral port;
    /// tests patch the resolved port back into their peer tables.
    pub port: u16,
}

impl NodeIdentity {
    /// The `host:port` address string for this node.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timeout bounds for fabric waits. All waits are bounded; there are no
/// indefinite blocks anywhere in the overlay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FabricTimeouts {
    /// Bound on waiting for a peer connection to establish, in seconds.
    pub connect_wait_secs: u64,
    /// Bound on waiting for a correlated response, in seconds.
    pub request_secs: u64,
}

impl Default for FabricTimeouts {
    fn default() -> Self {
        Self {
            connect_wait_secs: 10,
            request_secs: 20,
        }
    }
}

impl FabricTimeouts {
    /// Connection wait bound as a [`Duration`].
    pub fn connect_wait(&self) -> Duration {
        Duration::from_secs(self.connect_wait_secs)
    }

    /// Request/response bound as a [`Duration`].
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

/// The full static peer table plus timeout bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Every node in the fabric, including the local one.
    pub nodes: Vec<NodeIdentity>,
    /// Wait bounds.
    #[serde(default)]
    pub timeouts: FabricTimeouts,
}

impl FabricConfig {
    /// Parse a configuration from a TOML document.
    pub fn from_toml(doc: &str) -> CordonResult<Self> {
        toml::from_str(doc).map_err(|e| CordonError::serialization(e.to_string()))
    }

    /// Look up a node by identifier.
    pub fn node(&self, id: &NodeId) -> Option<&NodeIdentity> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Look up the node filling a role. The peer set is one node per role.
    pub fn node_for_role(&self, role: NodeRole) -> Option<&NodeIdentity> {
        self.nodes.iter().find(|n| n.role == role)
    }

    /// Role of a node, if it is part of the configured set.
    pub fn role_of(&self, id: &NodeId) -> Option<NodeRole> {
        self.node(id).map(|n| n.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
        [[nodes]]
        id = "ap"
        role = "access_proxy"
        host = "127.0.0.1"
        port = 8001

        [[nodes]]
        id = "dc"
        role = "data_center"
        host = "127.0.0.1"
        port = 8005

        [timeouts]
        connect_wait_secs = 10
        request_secs = 20
    "#;

    #[test]
    fn parses_peer_table_from_toml() {
        let config = FabricConfig::from_toml(DOC).unwrap();
        assert_eq!(config.nodes.len(), 2);
        let dc = config.node_for_role(NodeRole::DataCenter).unwrap();
        assert_eq!(dc.addr(), "127.0.0.1:8005");
        assert_eq!(config.role_of(&NodeId::new("ap")), Some(NodeRole::AccessProxy));
    }

    #[test]
    fn timeouts_default_when_absent() {
        let doc = r#"
            [[nodes]]
            id = "dc"
            role = "data_center"
            host = "127.0.0.1"
            port = 0
        "#;
        let config = FabricConfig::from_toml(doc).unwrap();
        assert_eq!(config.timeouts.connect_wait(), Duration::from_secs(10));
        assert_eq!(config.timeouts.request(), Duration::from_secs(20));
    }
}
