//! Data-center role: serves every data intent against the store.
//!
//! Store operations are synchronous file work behind collection locks,
//! so they run on the blocking thread pool.

use crate::handlers::to_payload;
use crate::intents::{
    self, AccessRequestRecordPayload, IdentityEventsPayload, IdentityMergePayload,
    LocationConfigReply, PolicyUpdatePayload, PolicyUpdateReply, StoredReply,
    ThresholdConfigReply, UserDataReply, UserScopedPayload,
};
use async_trait::async_trait;
use cordon_core::{CordonError, CordonResult, NodeRole};
use cordon_fabric::{Envelope, FabricNode, IntentHandler};
use cordon_store::Store;
use cordon_trust::clean_and_score;
use std::sync::Arc;
use tracing::info;

/// One handler serves all data intents; dispatch is on the intent tag.
pub struct DataCenterService {
    store: Arc<Store>,
}

impl DataCenterService {
    /// Wrap a store for fabric service.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

/// Register the data-center intents with their sender roles.
pub async fn register(node: &FabricNode, store: Arc<Store>) {
    let service = Arc::new(DataCenterService::new(store));
    let pairs = [
        (NodeRole::AccessProxy, intents::STORE_ACCESS_REQUEST),
        (NodeRole::AccessProxy, intents::STORE_IDENTITY_EVENTS),
        (NodeRole::AccessProxy, intents::UPDATE_USER_ROLES),
        (NodeRole::Decision, intents::REQUEST_USER_DATA),
        (NodeRole::Decision, intents::REQUEST_LOC_CONFIGS),
        (NodeRole::PolicyEngine, intents::REQUEST_THRESHOLD_CONFIGS),
        (NodeRole::PolicyEngine, intents::STORE_ACCESS_DECISION),
        (NodeRole::WebFront, intents::UPDATE_POLICY_CONFIGS),
    ];
    for (role, intent) in pairs {
        node.register_handler(role, intent, service.clone()).await;
    }
}

/// Run a store closure on the blocking pool.
async fn run_store<T: Send + 'static>(
    store: &Arc<Store>,
    f: impl FnOnce(&Store) -> CordonResult<T> + Send + 'static,
) -> CordonResult<T> {
    let store = store.clone();
    match tokio::task::spawn_blocking(move || f(&store)).await {
        Ok(result) => result,
        Err(e) => Err(CordonError::serialization(format!("store task failed: {e}"))),
    }
}

#[async_trait]
impl IntentHandler for DataCenterService {
    async fn handle(
        &self,
        _fabric: &FabricNode,
        envelope: Envelope,
    ) -> CordonResult<Option<serde_json::Value>> {
        match envelope.intent.as_str() {
            intents::STORE_ACCESS_REQUEST => {
                let payload: AccessRequestRecordPayload = envelope.decode()?;
                let id = run_store(&self.store, move |store| {
                    store.append_access_request(payload.access_request)
                })
                .await?;
                info!(id, "access request recorded");
                Ok(Some(to_payload(&StoredReply { id })?))
            }
            intents::STORE_IDENTITY_EVENTS => {
                let payload: IdentityEventsPayload = envelope.decode()?;
                let stored = run_store(&self.store, move |store| {
                    store.ingest_auth_events(clean_and_score(payload.events))
                })
                .await?;
                info!(stored, "identity events ingested");
                Ok(Some(serde_json::json!({ "stored": stored })))
            }
            intents::UPDATE_USER_ROLES => {
                let payload: IdentityMergePayload = envelope.decode()?;
                run_store(&self.store, move |store| {
                    store.merge_identities(payload.extracted_data)
                })
                .await?;
                Ok(None)
            }
            intents::REQUEST_USER_DATA => {
                let payload: UserScopedPayload = envelope.decode()?;
                let reply = run_store(&self.store, move |store| {
                    Ok(UserDataReply {
                        user: store.identity(&payload.user_id)?,
                        latest_request: store.latest_access_request(&payload.user_id)?,
                        latest_data: store.latest_auth_event(&payload.user_id)?,
                    })
                })
                .await?;
                Ok(Some(to_payload(&reply)?))
            }
            intents::REQUEST_LOC_CONFIGS => {
                let reply = run_store(&self.store, |store| {
                    Ok(LocationConfigReply {
                        ta_data: store.policy().location_policy()?,
                    })
                })
                .await?;
                Ok(Some(to_payload(&reply)?))
            }
            intents::REQUEST_THRESHOLD_CONFIGS => {
                let reply = run_store(&self.store, |store| {
                    Ok(ThresholdConfigReply {
                        policy_configs: store.policy().thresholds()?,
                    })
                })
                .await?;
                Ok(Some(to_payload(&reply)?))
            }
            intents::STORE_ACCESS_DECISION => {
                let decision: intents::StoreDecisionPayload = envelope.decode()?;
                let id =
                    run_store(&self.store, move |store| store.append_decision(decision)).await?;
                info!(id, "access decision logged");
                Ok(Some(to_payload(&StoredReply { id })?))
            }
            intents::UPDATE_POLICY_CONFIGS => {
                let payload: PolicyUpdatePayload = envelope.decode()?;
                let partial: serde_yaml::Value = serde_yaml::to_value(&payload.data)
                    .map_err(|e| CordonError::serialization(e.to_string()))?;
                let partial = partial
                    .as_mapping()
                    .cloned()
                    .ok_or_else(|| CordonError::malformed("policy update must be a mapping"))?;
                let status =
                    run_store(&self.store, move |store| store.policy().update(&partial)).await?;
                Ok(Some(to_payload(&PolicyUpdateReply { status })?))
            }
            other => Err(CordonError::malformed(format!(
                "data center does not serve intent '{other}'"
            ))),
        }
    }
}
