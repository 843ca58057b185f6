//! Policy-engine role: renders the verdict.
//!
//! Fetches the configured thresholds, applies the decision rule, logs
//! the decision through the data center before the verdict is returned,
//! and pushes a courtesy copy to the web front.

use crate::handlers::{peer_for, to_payload};
use crate::intents::{self, AccessDecisionRequest, ThresholdConfigReply, VerdictReply};
use async_trait::async_trait;
use chrono::Utc;
use cordon_core::{CordonError, CordonResult, NodeRole};
use cordon_fabric::{Envelope, FabricNode, IntentHandler};
use cordon_store::{format_timestamp, AccessDecision};
use cordon_trust::{make_access_decision, UserRole};
use std::sync::Arc;
use tracing::{info, warn};

/// Handles [`intents::REQUEST_ACCESS_DECISION`] from the decision node.
pub struct VerdictRenderer;

/// Register the policy-engine intents.
pub async fn register(node: &FabricNode) {
    node.register_handler(
        NodeRole::Decision,
        intents::REQUEST_ACCESS_DECISION,
        Arc::new(VerdictRenderer),
    )
    .await;
}

#[async_trait]
impl IntentHandler for VerdictRenderer {
    async fn handle(
        &self,
        fabric: &FabricNode,
        envelope: Envelope,
    ) -> CordonResult<Option<serde_json::Value>> {
        let payload: AccessDecisionRequest = envelope.decode()?;
        let data_center = peer_for(fabric, NodeRole::DataCenter).await?;

        let thresholds: ThresholdConfigReply = serde_json::from_value(
            fabric
                .request(
                    &data_center,
                    intents::REQUEST_THRESHOLD_CONFIGS,
                    serde_json::json!({}),
                )
                .await?,
        )
        .map_err(|e| CordonError::malformed(format!("threshold config reply: {e}")))?;

        let verdict = make_access_decision(
            UserRole::parse(payload.user_role.as_deref()),
            payload.user_trust_score,
            payload.sign_in_risk,
            &thresholds.policy_configs,
        );
        info!(user = %payload.user_id, verdict = verdict.as_u8(), "policy engine verdict");

        // Courtesy push; the correlated reply is the authoritative path.
        if let Ok(web_front) = peer_for(fabric, NodeRole::WebFront).await {
            if let Err(e) = fabric
                .send(
                    &web_front,
                    intents::ACCESS_DECISION,
                    serde_json::json!({ "access_decision": verdict.as_u8() }),
                )
                .await
            {
                warn!(error = %e, "courtesy verdict push failed");
            }
        }

        // The decision is durable before the verdict travels back.
        fabric
            .request(
                &data_center,
                intents::STORE_ACCESS_DECISION,
                to_payload(&AccessDecision {
                    id: 0,
                    user_id: payload.user_id,
                    user_trust_score: payload.user_trust_score,
                    access_decision: verdict.as_u8(),
                    timestamp: format_timestamp(Utc::now().naive_utc()),
                })?,
            )
            .await?;

        Ok(Some(to_payload(&VerdictReply {
            user_trust_score: payload.user_trust_score,
            access_decision: verdict.as_u8(),
        })?))
    }
}
