//! Per-role intent handlers.
//!
//! Each role registers the handlers for the intents it serves; the
//! registration functions are the wiring points used by the binary and
//! the integration tests.

pub mod access_proxy;
pub mod data_center;
pub mod decision;
pub mod policy_engine;

use cordon_core::{CordonError, CordonResult, NodeId, NodeRole};
use cordon_fabric::FabricNode;
use serde::Serialize;

/// Serialize a typed reply into an envelope payload.
pub fn to_payload<T: Serialize>(value: &T) -> CordonResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| CordonError::serialization(e.to_string()))
}

/// Resolve the configured peer filling `role`, failing with the role
/// label when the table has no such node.
pub async fn peer_for(fabric: &FabricNode, role: NodeRole) -> CordonResult<NodeId> {
    fabric
        .peer_for_role(role)
        .await
        .map(|identity| identity.id)
        .ok_or_else(|| CordonError::UnknownPeer {
            peer: NodeId::new(role.label()),
        })
}
