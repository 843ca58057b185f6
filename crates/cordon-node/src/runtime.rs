//! Process configuration and role startup.

use crate::handlers::{access_proxy, data_center, decision, policy_engine};
use cordon_core::{CordonError, CordonResult, FabricConfig, NodeRole};
use cordon_fabric::FabricNode;
use cordon_store::Store;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

fn default_data_dir() -> PathBuf {
    PathBuf::from("policy_data")
}

/// Full process configuration: the peer table plus the data directory
/// used by the data-center role.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory holding the JSON collections and the policy document.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Peer table and wait bounds.
    #[serde(flatten)]
    pub fabric: FabricConfig,
}

impl AppConfig {
    /// Parse a configuration from a TOML document.
    pub fn from_toml(doc: &str) -> CordonResult<Self> {
        toml::from_str(doc).map_err(|e| CordonError::serialization(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> CordonResult<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }
}

/// Start the fabric node for `role`: bind the listener, register the
/// role's handlers, and dial the always-on peers. Soft-fails the dials;
/// the reconnect policy and `wait_for_connection` cover peers that come
/// up later.
pub async fn start_node(config: &AppConfig, role: NodeRole) -> CordonResult<FabricNode> {
    let identity = config
        .fabric
        .node_for_role(role)
        .cloned()
        .ok_or_else(|| CordonError::missing_key(format!("node entry for role {role}")))?;

    let node = FabricNode::new(identity, &config.fabric);
    node.start().await?;

    match role {
        NodeRole::DataCenter => {
            let store = Store::open(&config.data_dir)?;
            data_center::register(&node, Arc::new(store)).await;
        }
        NodeRole::AccessProxy => access_proxy::register(&node).await,
        NodeRole::Decision => decision::register(&node).await,
        NodeRole::PolicyEngine => policy_engine::register(&node).await,
        // The web front's handlers are attached with its interface.
        NodeRole::WebFront => {}
    }

    for peer in &config.fabric.nodes {
        if peer.role == role || !peer.role.is_always_on() {
            continue;
        }
        if let Err(e) = node.connect(&peer.id).await {
            warn!(peer = %peer.id, error = %e, "initial dial failed");
        }
    }

    info!(%role, node = %node.id(), "role started");
    Ok(node)
}
