//! Web-front role: the external interface of the fabric.
//!
//! Page rendering, sessions, and the OIDC login flow live outside this
//! crate; what remains here is the boundary the front-end calls into:
//! access attempts, policy updates, and the privileged-access quorum
//! workflow. The quorum coordinator is owned by this role and never
//! crosses the fabric.

use crate::handlers::{peer_for, to_payload};
use crate::intents::{
    self, AccessContext, AccessRequestPayload, PolicyUpdatePayload, PolicyUpdateReply,
    VerdictReply,
};
use async_trait::async_trait;
use cordon_core::{CordonError, CordonResult, NodeRole};
use cordon_fabric::{Envelope, FabricNode, IntentHandler, LINK_RESTORED_INTENT};
use cordon_quorum::{
    ApprovalStatus, ApproverAction, PamCoordinator, RequestStatus, ShareNotifier,
};
use cordon_store::UpdateStatus;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// The web front's fabric boundary.
pub struct CordonFront {
    node: FabricNode,
    pam: Mutex<PamCoordinator>,
    notifier: Box<dyn ShareNotifier>,
    last_pushed_verdict: Arc<RwLock<Option<u8>>>,
}

/// Records courtesy verdict pushes from the policy engine.
struct VerdictListener(Arc<RwLock<Option<u8>>>);

#[async_trait]
impl IntentHandler for VerdictListener {
    async fn handle(
        &self,
        _fabric: &FabricNode,
        envelope: Envelope,
    ) -> CordonResult<Option<serde_json::Value>> {
        let verdict = envelope
            .payload
            .get("access_decision")
            .and_then(|v| v.as_u64())
            .map(|v| v as u8);
        *self.0.write().await = verdict;
        Ok(None)
    }
}

/// Logs link-restored notices from always-on peers.
struct LinkRestoredListener;

#[async_trait]
impl IntentHandler for LinkRestoredListener {
    async fn handle(
        &self,
        _fabric: &FabricNode,
        envelope: Envelope,
    ) -> CordonResult<Option<serde_json::Value>> {
        info!(peer = %envelope.sender, "peer link restored");
        Ok(None)
    }
}

impl CordonFront {
    /// Attach the front to a started web-front node and register its
    /// inbound handlers.
    pub async fn attach(node: FabricNode, notifier: Box<dyn ShareNotifier>) -> Self {
        let last_pushed_verdict = Arc::new(RwLock::new(None));
        node.register_handler(
            NodeRole::PolicyEngine,
            intents::ACCESS_DECISION,
            Arc::new(VerdictListener(last_pushed_verdict.clone())),
        )
        .await;
        for role in [
            NodeRole::AccessProxy,
            NodeRole::Decision,
            NodeRole::PolicyEngine,
            NodeRole::DataCenter,
        ] {
            node.register_handler(role, LINK_RESTORED_INTENT, Arc::new(LinkRestoredListener))
                .await;
        }

        Self {
            node,
            pam: Mutex::new(PamCoordinator::new()),
            notifier,
            last_pushed_verdict,
        }
    }

    /// The underlying fabric node.
    pub fn node(&self) -> &FabricNode {
        &self.node
    }

    /// Submit an access attempt and block for the verdict. The round
    /// trip crosses the access proxy, decision node, policy engine, and
    /// data center.
    pub async fn submit_access_request(
        &self,
        user_id: impl Into<String>,
        resource: impl Into<String>,
        context: AccessContext,
    ) -> CordonResult<VerdictReply> {
        let access_proxy = peer_for(&self.node, NodeRole::AccessProxy).await?;
        let reply = self
            .node
            .request(
                &access_proxy,
                intents::ACCESS_REQUEST,
                to_payload(&AccessRequestPayload {
                    user_id: user_id.into(),
                    resource: resource.into(),
                    context,
                })?,
            )
            .await?;
        serde_json::from_value(reply)
            .map_err(|e| CordonError::malformed(format!("verdict reply: {e}")))
    }

    /// Shallow-merge a partial policy document.
    pub async fn update_policy_config(
        &self,
        partial: serde_json::Value,
    ) -> CordonResult<UpdateStatus> {
        let data_center = peer_for(&self.node, NodeRole::DataCenter).await?;
        let reply: PolicyUpdateReply = serde_json::from_value(
            self.node
                .request(
                    &data_center,
                    intents::UPDATE_POLICY_CONFIGS,
                    to_payload(&PolicyUpdatePayload { data: partial })?,
                )
                .await?,
        )
        .map_err(|e| CordonError::malformed(format!("policy update reply: {e}")))?;
        Ok(reply.status)
    }

    /// Open a privileged access request; shares go out through the
    /// notifier and the request starts pending.
    pub async fn submit_privileged_access_request(
        &self,
        resource_name: impl Into<String>,
        reason: impl Into<String>,
        duration_minutes: u32,
        requestor_id: impl Into<String>,
        approvers: Vec<(String, String)>,
    ) -> CordonResult<u64> {
        self.pam
            .lock()
            .await
            .create_request(
                resource_name,
                reason,
                duration_minutes,
                requestor_id,
                approvers,
                self.notifier.as_ref(),
            )
            .await
    }

    /// Record one approver's decision on a privileged request.
    pub async fn submit_approver_decision(
        &self,
        request_id: u64,
        approver_id: &str,
        action: ApproverAction,
        share: Option<String>,
    ) -> CordonResult<RequestStatus> {
        self.pam
            .lock()
            .await
            .submit_decision(request_id, approver_id, action, share)
    }

    /// Quorum progress for a privileged request.
    pub async fn poll_approval_status(&self, request_id: u64) -> CordonResult<ApprovalStatus> {
        self.pam.lock().await.poll_status(request_id)
    }

    /// Constant-time check of an externally entered secret.
    pub async fn verify_privileged_secret(
        &self,
        request_id: u64,
        entered: &str,
    ) -> CordonResult<bool> {
        self.pam.lock().await.verify_secret(request_id, entered)
    }

    /// The most recent courtesy verdict push, if any arrived.
    pub async fn last_pushed_verdict(&self) -> Option<u8> {
        *self.last_pushed_verdict.read().await
    }
}
