//! Intent tags and their typed payloads.
//!
//! Every intent carries a statically shaped payload, decoded from the
//! envelope's JSON value at the dispatch boundary. The tags and shapes
//! follow the historical wire vocabulary.

use cordon_store::{AccessDecision, AccessRequest, AuthEvent, DecisionThresholds, LocationPolicy, UserIdentity};
use cordon_trust::RawAuthEvent;
use serde::{Deserialize, Serialize};

/// An access attempt entering through the web front.
pub const ACCESS_REQUEST: &str = "access_request";
/// Access proxy asking the decision node for a score and verdict.
pub const REQUEST_TRUST_SCORE: &str = "request_trust_score";
/// Decision node pulling a user's stored signals.
pub const REQUEST_USER_DATA: &str = "request_user_data";
/// Decision node pulling the location risk lists and window.
pub const REQUEST_LOC_CONFIGS: &str = "request_loc_configs";
/// Policy engine asking for a verdict against the thresholds.
pub const REQUEST_ACCESS_DECISION: &str = "request_access_decision";
/// Policy engine pulling the decision thresholds.
pub const REQUEST_THRESHOLD_CONFIGS: &str = "request_threshold_configs";
/// Persist one access request.
pub const STORE_ACCESS_REQUEST: &str = "store_access_request";
/// Persist one rendered decision.
pub const STORE_ACCESS_DECISION: &str = "store_access_decision";
/// Batch of raw identity-provider events for cleaning and ingestion.
pub const STORE_IDENTITY_EVENTS: &str = "store_identity_events";
/// Partial identity records to merge.
pub const UPDATE_USER_ROLES: &str = "update_user_roles";
/// Shallow merge into the policy document.
pub const UPDATE_POLICY_CONFIGS: &str = "update_policy_configs";
/// Courtesy push of a rendered verdict to the web front.
pub const ACCESS_DECISION: &str = "access_decision";

/// Network and device context captured for an access attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessContext {
    /// Public address the attempt arrived from.
    pub public_ip: Option<String>,
    /// `City/CC` location string resolved from the address.
    pub location: Option<String>,
    /// Device class.
    pub device_type: Option<String>,
    /// Browser user agent.
    pub browser: Option<String>,
    /// Device hardware address.
    pub device_mac: Option<String>,
    /// Vendor resolved from the hardware address.
    pub device_vendor: Option<String>,
    /// Operating system.
    pub operating_system: Option<String>,
}

/// Payload of [`ACCESS_REQUEST`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequestPayload {
    /// Subject requesting access.
    pub user_id: String,
    /// Resource asked for.
    pub resource: String,
    /// Attempt context.
    #[serde(default)]
    pub context: AccessContext,
}

/// Payload of [`REQUEST_TRUST_SCORE`] and [`REQUEST_USER_DATA`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserScopedPayload {
    /// Subject under evaluation.
    pub user_id: String,
}

/// Reply to [`REQUEST_USER_DATA`]: everything the scoring step needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDataReply {
    /// Identity record, if known.
    pub user: Option<UserIdentity>,
    /// Most recent access request for the subject.
    pub latest_request: Option<AccessRequest>,
    /// Most recent authentication event for the subject.
    pub latest_data: Option<AuthEvent>,
}

/// Payload of [`REQUEST_ACCESS_DECISION`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecisionRequest {
    /// Subject under evaluation.
    pub user_id: String,
    /// Computed overall trust score.
    pub user_trust_score: f64,
    /// Smoothed sign-in risk from the latest auth event.
    pub sign_in_risk: f64,
    /// Identity source role string, when known.
    pub user_role: Option<String>,
}

/// Reply carrying the rendered verdict alongside the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictReply {
    /// Overall trust score the verdict was rendered against.
    pub user_trust_score: f64,
    /// 1 allow, 0 deny.
    pub access_decision: u8,
}

/// Payload of [`STORE_ACCESS_REQUEST`]: the record to append. The store
/// assigns the ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequestRecordPayload {
    /// Record built by the access proxy from the attempt payload.
    pub access_request: AccessRequest,
}

/// Reply to [`STORE_ACCESS_REQUEST`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReply {
    /// Assigned collection-scoped ID.
    #[serde(rename = "ID")]
    pub id: u64,
}

/// Payload of [`STORE_IDENTITY_EVENTS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityEventsPayload {
    /// Raw provider events, uncleaned.
    pub events: Vec<RawAuthEvent>,
}

/// Payload of [`UPDATE_USER_ROLES`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityMergePayload {
    /// Partial identity records to merge.
    pub extracted_data: Vec<UserIdentity>,
}

/// Payload of [`UPDATE_POLICY_CONFIGS`]: the partial document as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyUpdatePayload {
    /// Keys to merge into the policy document.
    pub data: serde_json::Value,
}

/// Reply to [`UPDATE_POLICY_CONFIGS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyUpdateReply {
    /// `success` or `fail`.
    pub status: cordon_store::UpdateStatus,
}

/// Reply to [`REQUEST_LOC_CONFIGS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfigReply {
    /// The configured lists and window.
    pub ta_data: LocationPolicy,
}

/// Reply to [`REQUEST_THRESHOLD_CONFIGS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfigReply {
    /// The four configured thresholds.
    pub policy_configs: DecisionThresholds,
}

/// Payload of [`STORE_ACCESS_DECISION`]; the record's ID is assigned by
/// the store.
pub type StoreDecisionPayload = AccessDecision;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_request_payload_tolerates_missing_context() {
        let payload: AccessRequestPayload =
            serde_json::from_value(serde_json::json!({"user_id": "u1", "resource": "resource-1"}))
                .unwrap();
        assert!(payload.context.location.is_none());
    }
}
