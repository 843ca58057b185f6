//! Decision role: computes the overall trust score.
//!
//! Pulls the subject's stored signals and the location configuration
//! from the data center, scores the attempt, and forwards score and
//! sign-in risk to the policy engine for the verdict. Evaluation fails
//! closed: a subject with no identity record, no recorded access
//! request, or no auth history cannot be scored and the whole request
//! fails rather than receiving a guessed score.

use crate::handlers::{peer_for, to_payload};
use crate::intents::{
    self, AccessDecisionRequest, LocationConfigReply, UserDataReply, UserScopedPayload,
};
use async_trait::async_trait;
use cordon_core::{CordonError, CordonResult, NodeRole};
use cordon_fabric::{Envelope, FabricNode, IntentHandler};
use cordon_trust::trust_score;
use std::sync::Arc;
use tracing::info;

/// Handles [`intents::REQUEST_TRUST_SCORE`] from the access proxy.
pub struct TrustEvaluator;

/// Register the decision-node intents.
pub async fn register(node: &FabricNode) {
    node.register_handler(
        NodeRole::AccessProxy,
        intents::REQUEST_TRUST_SCORE,
        Arc::new(TrustEvaluator),
    )
    .await;
}

#[async_trait]
impl IntentHandler for TrustEvaluator {
    async fn handle(
        &self,
        fabric: &FabricNode,
        envelope: Envelope,
    ) -> CordonResult<Option<serde_json::Value>> {
        let payload: UserScopedPayload = envelope.decode()?;
        let user_id = payload.user_id.clone();
        let data_center = peer_for(fabric, NodeRole::DataCenter).await?;

        let user_data: UserDataReply = serde_json::from_value(
            fabric
                .request(&data_center, intents::REQUEST_USER_DATA, to_payload(&payload)?)
                .await?,
        )
        .map_err(|e| CordonError::malformed(format!("user data reply: {e}")))?;

        let location_config: LocationConfigReply = serde_json::from_value(
            fabric
                .request(&data_center, intents::REQUEST_LOC_CONFIGS, serde_json::json!({}))
                .await?,
        )
        .map_err(|e| CordonError::malformed(format!("location config reply: {e}")))?;

        let user = user_data
            .user
            .ok_or_else(|| CordonError::not_found(format!("identity for user {user_id}")))?;
        let latest_request = user_data
            .latest_request
            .ok_or_else(|| CordonError::not_found(format!("access request for user {user_id}")))?;
        let latest_event = user_data
            .latest_data
            .ok_or_else(|| CordonError::not_found(format!("auth history for user {user_id}")))?;

        let location = latest_request.location.as_deref().unwrap_or("");
        let score = trust_score(
            latest_event.sign_in_risk,
            location,
            &latest_request.access_request_time,
            &location_config.ta_data,
        )?;
        info!(user = %user_id, score, "trust evaluation complete");

        let policy_engine = peer_for(fabric, NodeRole::PolicyEngine).await?;
        let verdict = fabric
            .request(
                &policy_engine,
                intents::REQUEST_ACCESS_DECISION,
                to_payload(&AccessDecisionRequest {
                    user_id,
                    user_trust_score: score,
                    sign_in_risk: latest_event.sign_in_risk,
                    user_role: user.user_role,
                })?,
            )
            .await?;

        Ok(Some(verdict))
    }
}
