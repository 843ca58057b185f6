//! The privileged-access approval workflow.
//!
//! One fresh secret per request, split k-of-n across the approvers.
//! Shares live only in transit and on the approving approver's own
//! record; the request never stores the full share set. Reconstruction
//! happens at k approvals and fails closed below it.

use crate::notify::ShareNotifier;
use crate::shamir::{self, SecretShare};
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use cordon_core::{CordonError, CordonResult};
use curve25519_dalek::scalar::Scalar;
use rand::{thread_rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

/// Allowed elevation window, in minutes.
pub const MIN_ACCESS_DURATION: u32 = 1;
/// Upper bound on the elevation window, in minutes.
pub const MAX_ACCESS_DURATION: u32 = 100;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lifecycle of a privileged access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting quorum.
    Pending,
    /// Quorum reached; secret reconstructed.
    Approved,
    /// Enough rejections that quorum can no longer be reached.
    Rejected,
}

/// The action an approver took, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverAction {
    /// No decision yet.
    None,
    /// Approved, share submitted.
    Approved,
    /// Rejected; no share retained.
    Rejected,
}

/// One approver's state on one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproverRecord {
    /// Approver identifier.
    pub approver_id: String,
    /// Delivery address for the share.
    pub approver_email: String,
    /// Decision taken.
    pub action: ApproverAction,
    /// The submitted share, retained only on approval.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub secret_share: Option<String>,
}

/// A privileged access request and its quorum bookkeeping.
#[derive(Debug, Clone)]
pub struct PrivilegedAccessRequest {
    /// Request identifier, scoped to this coordinator.
    pub id: u64,
    /// Resource the elevation applies to.
    pub resource_name: String,
    /// Requestor's stated justification.
    pub reason_for_access: String,
    /// Elevation window in minutes, within [1,100].
    pub access_duration: u32,
    /// Who asked.
    pub requestor_id: String,
    /// When the request was created.
    pub request_time: String,
    /// Current lifecycle state.
    pub status: RequestStatus,
    /// Per-approver records.
    pub approvers: Vec<ApproverRecord>,
    /// Reconstruction threshold k = floor(0.8 × n).
    pub threshold: usize,
    /// When quorum was reached, if it was.
    pub decided_at: Option<String>,
    /// `decided_at` plus the access duration.
    pub expires_at: Option<String>,
    secret: Scalar,
    reconstructed: Option<Scalar>,
}

/// Snapshot returned by a status poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalStatus {
    /// Shares recorded with an approved action.
    pub approved_count: usize,
    /// Total eligible approvers n.
    pub total_approvers: usize,
    /// Hex form of the reconstructed secret once quorum is reached.
    pub reconstructed_secret: Option<String>,
    /// Current lifecycle state.
    pub status: RequestStatus,
}

/// Coordinates every in-flight privileged access request.
#[derive(Default)]
pub struct PamCoordinator {
    requests: HashMap<u64, PrivilegedAccessRequest>,
    next_id: u64,
}

impl PamCoordinator {
    /// Create an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a request: validate the duration, generate the secret,
    /// split it across the approvers, and hand each share to the
    /// notifier. Returns the request id with the request pending.
    pub async fn create_request(
        &mut self,
        resource_name: impl Into<String>,
        reason_for_access: impl Into<String>,
        access_duration: u32,
        requestor_id: impl Into<String>,
        approvers: Vec<(String, String)>,
        notifier: &dyn ShareNotifier,
    ) -> CordonResult<u64> {
        if !(MIN_ACCESS_DURATION..=MAX_ACCESS_DURATION).contains(&access_duration) {
            return Err(CordonError::malformed(format!(
                "access duration must be between {MIN_ACCESS_DURATION} and {MAX_ACCESS_DURATION} minutes"
            )));
        }
        if approvers.is_empty() {
            return Err(CordonError::malformed("at least one approver is required"));
        }

        let n = approvers.len();
        let threshold = shamir::threshold_for(n);
        let secret = fresh_secret();
        let shares = shamir::split(secret, n, threshold, &mut thread_rng());

        self.next_id += 1;
        let id = self.next_id;

        let mut records = Vec::with_capacity(n);
        for ((approver_id, email), share) in approvers.into_iter().zip(&shares) {
            let encoded = shamir::encode_share(share);
            notifier.deliver(&approver_id, &email, &encoded).await;
            records.push(ApproverRecord {
                approver_id,
                approver_email: email,
                action: ApproverAction::None,
                secret_share: None,
            });
        }

        info!(request = id, approvers = n, threshold, "privileged access request created");
        self.requests.insert(
            id,
            PrivilegedAccessRequest {
                id,
                resource_name: resource_name.into(),
                reason_for_access: reason_for_access.into(),
                access_duration,
                requestor_id: requestor_id.into(),
                request_time: now(),
                status: RequestStatus::Pending,
                approvers: records,
                threshold,
                decided_at: None,
                expires_at: None,
                secret,
                reconstructed: None,
            },
        );
        Ok(id)
    }

    /// Record one approver's decision. An approval must carry the share;
    /// a rejection retains none. Reaching k approvals reconstructs the
    /// secret and marks the request approved; enough rejections to make
    /// quorum unreachable marks it rejected.
    pub fn submit_decision(
        &mut self,
        request_id: u64,
        approver_id: &str,
        action: ApproverAction,
        share: Option<String>,
    ) -> CordonResult<RequestStatus> {
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| CordonError::not_found(format!("privileged request {request_id}")))?;

        let record = request
            .approvers
            .iter_mut()
            .find(|a| a.approver_id == approver_id)
            .ok_or_else(|| {
                CordonError::not_found(format!("approver {approver_id} on request {request_id}"))
            })?;

        match action {
            ApproverAction::Approved => {
                let share = share.ok_or_else(|| {
                    CordonError::malformed("an approval must include the approver's share")
                })?;
                // Reject undecodable shares up front rather than at quorum.
                shamir::decode_share(&share)?;
                record.action = ApproverAction::Approved;
                record.secret_share = Some(share);
            }
            ApproverAction::Rejected => {
                record.action = ApproverAction::Rejected;
                record.secret_share = None;
            }
            ApproverAction::None => {
                return Err(CordonError::malformed("decision must approve or reject"));
            }
        }

        let n = request.approvers.len();
        let approved = approved_count(request);
        let rejected = request
            .approvers
            .iter()
            .filter(|a| a.action == ApproverAction::Rejected)
            .count();

        if request.status == RequestStatus::Pending {
            if approved >= request.threshold {
                Self::reconstruct_and_approve(request)?;
            } else if rejected > n - request.threshold {
                warn!(request = request_id, rejected, "quorum unreachable, request rejected");
                request.status = RequestStatus::Rejected;
            }
        }

        Ok(request.status)
    }

    /// The reconstructed secret, hex-encoded. `ThresholdNotMet` below k.
    pub fn reconstructed_secret(&self, request_id: u64) -> CordonResult<String> {
        let request = self.request(request_id)?;
        match request.reconstructed {
            Some(secret) => Ok(hex::encode(secret.as_bytes())),
            None => Err(CordonError::ThresholdNotMet {
                approved: approved_count(request),
                required: request.threshold,
            }),
        }
    }

    /// Quorum progress for a request.
    pub fn poll_status(&self, request_id: u64) -> CordonResult<ApprovalStatus> {
        let request = self.request(request_id)?;
        Ok(ApprovalStatus {
            approved_count: approved_count(request),
            total_approvers: request.approvers.len(),
            reconstructed_secret: request
                .reconstructed
                .map(|s| hex::encode(s.as_bytes())),
            status: request.status,
        })
    }

    /// Compare an externally entered secret against the one generated for
    /// this request. Constant-time, exact match only.
    pub fn verify_secret(&self, request_id: u64, entered_hex: &str) -> CordonResult<bool> {
        let request = self.request(request_id)?;
        let entered = match hex::decode(entered_hex.trim()) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };
        Ok(entered.ct_eq(request.secret.as_bytes()).into())
    }

    /// Look up a request.
    pub fn request(&self, request_id: u64) -> CordonResult<&PrivilegedAccessRequest> {
        self.requests
            .get(&request_id)
            .ok_or_else(|| CordonError::not_found(format!("privileged request {request_id}")))
    }

    fn reconstruct_and_approve(request: &mut PrivilegedAccessRequest) -> CordonResult<()> {
        let shares: Vec<SecretShare> = request
            .approvers
            .iter()
            .filter(|a| a.action == ApproverAction::Approved)
            .filter_map(|a| a.secret_share.as_deref())
            .map(shamir::decode_share)
            .collect::<CordonResult<_>>()?;

        let secret = shamir::reconstruct(&shares)?;
        let decided = Utc::now().naive_utc();
        request.reconstructed = Some(secret);
        request.status = RequestStatus::Approved;
        request.decided_at = Some(format_time(decided));
        request.expires_at = Some(format_time(
            decided + ChronoDuration::minutes(i64::from(request.access_duration)),
        ));
        info!(request = request.id, "quorum reached, secret reconstructed");
        Ok(())
    }
}

fn approved_count(request: &PrivilegedAccessRequest) -> usize {
    request
        .approvers
        .iter()
        .filter(|a| a.action == ApproverAction::Approved && a.secret_share.is_some())
        .count()
}

fn fresh_secret() -> Scalar {
    let mut bytes = [0u8; 32];
    thread_rng().fill_bytes(&mut bytes);
    Scalar::from_bytes_mod_order(bytes)
}

fn now() -> String {
    format_time(Utc::now().naive_utc())
}

fn format_time(t: NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ShareNotifier;
    use std::sync::Mutex;

    /// Captures issued shares so tests can play the approvers.
    #[derive(Default)]
    struct CapturingNotifier {
        shares: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl ShareNotifier for CapturingNotifier {
        async fn deliver(&self, approver_id: &str, _email: &str, share: &str) {
            self.shares
                .lock()
                .unwrap()
                .push((approver_id.to_string(), share.to_string()));
        }
    }

    fn approvers(n: usize) -> Vec<(String, String)> {
        (1..=n)
            .map(|i| (format!("a{i}"), format!("a{i}@example.org")))
            .collect()
    }

    async fn created(
        n: usize,
    ) -> (PamCoordinator, u64, Vec<(String, String)>) {
        let notifier = CapturingNotifier::default();
        let mut pam = PamCoordinator::new();
        let id = pam
            .create_request("prod-db", "incident 4821", 30, "requestor", approvers(n), &notifier)
            .await
            .unwrap();
        let shares = notifier.shares.lock().unwrap().clone();
        (pam, id, shares)
    }

    #[tokio::test]
    async fn five_approvers_need_four_shares() {
        let (mut pam, id, shares) = created(5).await;
        assert_eq!(pam.request(id).unwrap().threshold, 4);
        assert_eq!(shares.len(), 5);

        for (approver, share) in shares.iter().take(3) {
            let status = pam
                .submit_decision(id, approver, ApproverAction::Approved, Some(share.clone()))
                .unwrap();
            assert_eq!(status, RequestStatus::Pending);
        }
        assert!(matches!(
            pam.reconstructed_secret(id),
            Err(CordonError::ThresholdNotMet { approved: 3, required: 4 })
        ));

        let (approver, share) = &shares[3];
        let status = pam
            .submit_decision(id, approver, ApproverAction::Approved, Some(share.clone()))
            .unwrap();
        assert_eq!(status, RequestStatus::Approved);

        let reconstructed = pam.reconstructed_secret(id).unwrap();
        assert!(pam.verify_secret(id, &reconstructed).unwrap());
    }

    #[tokio::test]
    async fn any_four_of_five_subset_recovers_the_same_secret() {
        let (mut pam_a, id_a, shares) = created(5).await;
        // First subset: approvers 1-4.
        for (approver, share) in shares.iter().take(4) {
            pam_a
                .submit_decision(id_a, approver, ApproverAction::Approved, Some(share.clone()))
                .unwrap();
        }
        let first = pam_a.reconstructed_secret(id_a).unwrap();

        // Second subset on the same request would need fresh state, so
        // reconstruct directly from the raw shares instead.
        let decoded: Vec<_> = shares
            .iter()
            .skip(1)
            .map(|(_, s)| crate::shamir::decode_share(s).unwrap())
            .collect();
        let second = crate::shamir::reconstruct(&decoded).unwrap();
        assert_eq!(hex::encode(second.as_bytes()), first);
    }

    #[tokio::test]
    async fn rejections_never_retain_shares_and_can_kill_quorum() {
        let (mut pam, id, shares) = created(5).await;

        let status = pam
            .submit_decision(id, "a1", ApproverAction::Rejected, Some(shares[0].1.clone()))
            .unwrap();
        assert_eq!(status, RequestStatus::Pending);
        assert!(pam.request(id).unwrap().approvers[0].secret_share.is_none());

        // A second rejection leaves only 3 possible approvals; k = 4.
        let status = pam
            .submit_decision(id, "a2", ApproverAction::Rejected, None)
            .unwrap();
        assert_eq!(status, RequestStatus::Rejected);
    }

    #[tokio::test]
    async fn verification_is_exact_match_only() {
        let (mut pam, id, shares) = created(5).await;
        for (approver, share) in shares.iter().take(4) {
            pam.submit_decision(id, approver, ApproverAction::Approved, Some(share.clone()))
                .unwrap();
        }
        let secret = pam.reconstructed_secret(id).unwrap();

        assert!(pam.verify_secret(id, &secret).unwrap());
        let mut tampered = secret.clone();
        let flipped = if tampered.ends_with('0') { '1' } else { '0' };
        tampered.pop();
        tampered.push(flipped);
        assert!(!pam.verify_secret(id, &tampered).unwrap());
        assert!(!pam.verify_secret(id, "not hex").unwrap());
    }

    #[tokio::test]
    async fn duration_outside_bounds_is_refused() {
        let notifier = CapturingNotifier::default();
        let mut pam = PamCoordinator::new();
        for duration in [0u32, 101] {
            let result = pam
                .create_request("prod-db", "why", duration, "r", approvers(3), &notifier)
                .await;
            assert!(result.is_err());
        }
    }

    #[tokio::test]
    async fn status_poll_reports_progress() {
        let (mut pam, id, shares) = created(5).await;
        let status = pam.poll_status(id).unwrap();
        assert_eq!(status.approved_count, 0);
        assert_eq!(status.total_approvers, 5);
        assert!(status.reconstructed_secret.is_none());

        for (approver, share) in shares.iter().take(4) {
            pam.submit_decision(id, approver, ApproverAction::Approved, Some(share.clone()))
                .unwrap();
        }
        let status = pam.poll_status(id).unwrap();
        assert_eq!(status.approved_count, 4);
        assert!(status.reconstructed_secret.is_some());
        assert_eq!(status.status, RequestStatus::Approved);

        let request = pam.request(id).unwrap();
        assert!(request.decided_at.is_some());
        assert!(request.expires_at.is_some());
    }
}
