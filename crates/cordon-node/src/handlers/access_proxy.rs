//! Access-proxy role: the entry point for access attempts.
//!
//! Persists the attempt through the data center, then forwards a
//! trust-score request to the decision node and relays the verdict back
//! to the originator.

use crate::handlers::{peer_for, to_payload};
use crate::intents::{self, AccessRequestPayload, AccessRequestRecordPayload, UserScopedPayload, VerdictReply};
use async_trait::async_trait;
use chrono::Utc;
use cordon_core::{CordonResult, NodeRole};
use cordon_fabric::{Envelope, FabricNode, IntentHandler};
use cordon_store::{format_timestamp, AccessRequest};
use std::sync::Arc;
use tracing::info;

/// Handles [`intents::ACCESS_REQUEST`] from the web front.
pub struct AccessIngress;

/// Register the access-proxy intents.
pub async fn register(node: &FabricNode) {
    node.register_handler(NodeRole::WebFront, intents::ACCESS_REQUEST, Arc::new(AccessIngress))
        .await;
}

/// Forward a batch of raw identity-provider events to the data center
/// for cleaning and ingestion. Returns how many events were stored.
pub async fn sync_identity_events(
    fabric: &FabricNode,
    events: Vec<cordon_trust::RawAuthEvent>,
) -> CordonResult<usize> {
    let data_center = peer_for(fabric, NodeRole::DataCenter).await?;
    let reply = fabric
        .request(
            &data_center,
            intents::STORE_IDENTITY_EVENTS,
            to_payload(&intents::IdentityEventsPayload { events })?,
        )
        .await?;
    Ok(reply.get("stored").and_then(|v| v.as_u64()).unwrap_or(0) as usize)
}

/// Push partial identity records to the data center for merging.
/// Fire-and-forget, matching the identity source's sync cadence.
pub async fn push_user_roles(
    fabric: &FabricNode,
    identities: Vec<cordon_store::UserIdentity>,
) -> CordonResult<()> {
    let data_center = peer_for(fabric, NodeRole::DataCenter).await?;
    fabric
        .send(
            &data_center,
            intents::UPDATE_USER_ROLES,
            to_payload(&intents::IdentityMergePayload {
                extracted_data: identities,
            })?,
        )
        .await
}

#[async_trait]
impl IntentHandler for AccessIngress {
    async fn handle(
        &self,
        fabric: &FabricNode,
        envelope: Envelope,
    ) -> CordonResult<Option<serde_json::Value>> {
        let payload: AccessRequestPayload = envelope.decode()?;
        info!(user = %payload.user_id, resource = %payload.resource, "access attempt received");

        let record = AccessRequest {
            id: 0,
            user_id: payload.user_id.clone(),
            resource_requested: payload.resource,
            access_request_time: format_timestamp(Utc::now().naive_utc()),
            public_ip_address: payload.context.public_ip,
            location: payload.context.location,
            device_type: payload.context.device_type,
            browser: payload.context.browser,
            device_mac: payload.context.device_mac,
            device_vendor: payload.context.device_vendor,
            device_os: payload.context.operating_system,
            status: None,
        };

        let data_center = peer_for(fabric, NodeRole::DataCenter).await?;
        fabric
            .request(
                &data_center,
                intents::STORE_ACCESS_REQUEST,
                to_payload(&AccessRequestRecordPayload {
                    access_request: record,
                })?,
            )
            .await?;

        let decision = peer_for(fabric, NodeRole::Decision).await?;
        let verdict = fabric
            .request(
                &decision,
                intents::REQUEST_TRUST_SCORE,
                to_payload(&UserScopedPayload {
                    user_id: payload.user_id.clone(),
                })?,
            )
            .await?;

        // Relay the decision node's reply unchanged to the originator.
        let reply: VerdictReply = serde_json::from_value(verdict.clone())
            .map_err(|e| cordon_core::CordonError::malformed(format!("verdict reply: {e}")))?;
        info!(user = %payload.user_id, verdict = reply.access_decision, "verdict relayed");
        Ok(Some(verdict))
    }
}
