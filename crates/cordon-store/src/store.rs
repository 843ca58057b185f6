//! The authoritative store over one data directory.
//!
//! Collection file names match the historical data layout so existing
//! directories remain usable: `access_requests.json`, `auth_data.json`,
//! `access_decision.json`, `user_data.json`, `policyConfiguration.yml`.

use crate::collection::{next_id, Collection};
use crate::policy_doc::PolicyDocument;
use crate::records::{AccessDecision, AccessRequest, AuthEvent, UserIdentity};
use cordon_core::CordonResult;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Typed access to every durable collection. The sole owner of the data
/// directory; all other components reach it through fabric messages.
#[derive(Debug)]
pub struct Store {
    access_requests: Collection<AccessRequest>,
    auth_events: Collection<AuthEvent>,
    decisions: Collection<AccessDecision>,
    identities: Collection<UserIdentity>,
    policy: PolicyDocument,
    dir: PathBuf,
}

impl Store {
    /// Open (creating if needed) the data directory.
    pub fn open(dir: impl AsRef<Path>) -> CordonResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "store opened");
        Ok(Self {
            access_requests: Collection::new(&dir, "access_requests"),
            auth_events: Collection::new(&dir, "auth_data"),
            decisions: Collection::new(&dir, "access_decision"),
            identities: Collection::new(&dir, "user_data"),
            policy: PolicyDocument::new(&dir),
            dir,
        })
    }

    /// Open with a short lock bound. Test setup.
    pub fn open_with_lock_timeout(dir: impl AsRef<Path>, timeout: Duration) -> CordonResult<Self> {
        let mut store = Self::open(dir)?;
        store.access_requests = store.access_requests.with_lock_timeout(timeout);
        store.auth_events = store.auth_events.with_lock_timeout(timeout);
        store.decisions = store.decisions.with_lock_timeout(timeout);
        store.identities = store.identities.with_lock_timeout(timeout);
        store.policy = store.policy.with_lock_timeout(timeout);
        Ok(store)
    }

    /// The data directory this store owns.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The policy-configuration document.
    pub fn policy(&self) -> &PolicyDocument {
        &self.policy
    }

    /// Append an access request, assigning the next collection-scoped ID.
    /// Returns the assigned ID.
    pub fn append_access_request(&self, mut request: AccessRequest) -> CordonResult<u64> {
        self.access_requests.mutate(|records| {
            let id = next_id(records.last().map(|r| r.id));
            request.id = id;
            records.push(request);
            Ok(id)
        })
    }

    /// Append cleaned authentication events, skipping any whose
    /// `(time, user_id)` pair is already present. Returns how many were
    /// actually appended.
    pub fn ingest_auth_events(&self, events: Vec<AuthEvent>) -> CordonResult<usize> {
        self.auth_events.mutate(|records| {
            let mut appended = 0;
            for mut event in events {
                let exists = records
                    .iter()
                    .any(|e| e.time == event.time && e.user_id == event.user_id);
                if exists {
                    debug!(user = %event.user_id, time = %event.time, "duplicate event skipped");
                    continue;
                }
                event.id = next_id(records.last().map(|e| e.id));
                records.push(event);
                appended += 1;
            }
            Ok(appended)
        })
    }

    /// Append an access decision, assigning the next ID. Returns it.
    pub fn append_decision(&self, mut decision: AccessDecision) -> CordonResult<u64> {
        self.decisions.mutate(|records| {
            let id = next_id(records.last().map(|d| d.id));
            decision.id = id;
            records.push(decision);
            Ok(id)
        })
    }

    /// Merge partial identity records. Known identities take non-null
    /// incoming fields; unknown identities are appended; none are removed.
    pub fn merge_identities(&self, incoming: Vec<UserIdentity>) -> CordonResult<()> {
        self.identities.mutate(|records| {
            for new_user in incoming {
                match records.iter_mut().find(|u| u.user_id == new_user.user_id) {
                    Some(existing) => existing.merge_from(&new_user),
                    None => records.push(new_user),
                }
            }
            Ok(())
        })
    }

    /// The most recent access request for `user_id`, by request time.
    pub fn latest_access_request(&self, user_id: &str) -> CordonResult<Option<AccessRequest>> {
        let records = self.access_requests.read_all()?;
        Ok(records
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .max_by(|a, b| a.access_request_time.cmp(&b.access_request_time)))
    }

    /// The most recent authentication event for `user_id`, by event time.
    pub fn latest_auth_event(&self, user_id: &str) -> CordonResult<Option<AuthEvent>> {
        let records = self.auth_events.read_all()?;
        Ok(records
            .into_iter()
            .filter(|e| e.user_id == user_id)
            .max_by(|a, b| a.time.cmp(&b.time)))
    }

    /// Every authentication event for `user_id`, in append order.
    pub fn auth_events_for(&self, user_id: &str) -> CordonResult<Vec<AuthEvent>> {
        let records = self.auth_events.read_all()?;
        Ok(records.into_iter().filter(|e| e.user_id == user_id).collect())
    }

    /// The identity record for `user_id`, if known.
    pub fn identity(&self, user_id: &str) -> CordonResult<Option<UserIdentity>> {
        let records = self.identities.read_all()?;
        Ok(records.into_iter().find(|u| u.user_id == user_id))
    }

    /// The most recently appended decision (maximum ID).
    pub fn latest_decision(&self) -> CordonResult<Option<AccessDecision>> {
        let records = self.decisions.read_all()?;
        Ok(records.into_iter().max_by_key(|d| d.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> Store {
        Store::open_with_lock_timeout(dir, Duration::from_secs(1)).unwrap()
    }

    fn event(user: &str, time: &str, status: u8) -> AuthEvent {
        AuthEvent {
            id: 0,
            time: time.to_string(),
            event_type: if status == 1 { "LOGIN" } else { "LOGIN_ERROR" }.to_string(),
            user_id: user.to_string(),
            ip_address: None,
            auth_type: Some("password".to_string()),
            auth_status: status,
            sign_in_risk: 0.5,
        }
    }

    fn request(user: &str, time: &str) -> AccessRequest {
        AccessRequest {
            id: 0,
            user_id: user.to_string(),
            resource_requested: "resource-1".to_string(),
            access_request_time: time.to_string(),
            public_ip_address: None,
            location: Some("London/GB".to_string()),
            device_type: None,
            browser: None,
            device_mac: None,
            device_vendor: None,
            device_os: None,
            status: None,
        }
    }

    #[test]
    fn access_request_ids_are_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(store.append_access_request(request("u1", "2024-01-01 10:00:00")).unwrap(), 1);
        assert_eq!(store.append_access_request(request("u2", "2024-01-01 11:00:00")).unwrap(), 2);
        assert_eq!(store.append_access_request(request("u1", "2024-01-01 12:00:00")).unwrap(), 3);
    }

    #[test]
    fn duplicate_events_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let first = store
            .ingest_auth_events(vec![
                event("u1", "2024-01-01 09:00:00", 1),
                event("u1", "2024-01-01 10:00:00", 0),
            ])
            .unwrap();
        assert_eq!(first, 2);

        // Same (time, user) pair again plus one genuinely new event.
        let second = store
            .ingest_auth_events(vec![
                event("u1", "2024-01-01 10:00:00", 0),
                event("u2", "2024-01-01 10:00:00", 1),
            ])
            .unwrap();
        assert_eq!(second, 1);

        let all = store.auth_events_for("u1").unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn latest_queries_pick_maximum_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.append_access_request(request("u1", "2024-01-02 08:00:00")).unwrap();
        store.append_access_request(request("u1", "2024-01-03 08:00:00")).unwrap();
        store.append_access_request(request("u2", "2024-01-04 08:00:00")).unwrap();

        let latest = store.latest_access_request("u1").unwrap().unwrap();
        assert_eq!(latest.access_request_time, "2024-01-03 08:00:00");
        assert!(store.latest_access_request("u9").unwrap().is_none());
    }

    #[test]
    fn identity_merge_appends_and_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let base = UserIdentity {
            user_id: "u1".to_string(),
            username: Some("alex".to_string()),
            email: None,
            created_timestamp: None,
            email_verified: None,
            totp_enabled: None,
            user_role: None,
        };
        store.merge_identities(vec![base.clone()]).unwrap();

        let update = UserIdentity {
            user_role: Some("Approver".to_string()),
            username: None,
            ..base.clone()
        };
        store.merge_identities(vec![update]).unwrap();

        let merged = store.identity("u1").unwrap().unwrap();
        assert_eq!(merged.username.as_deref(), Some("alex"));
        assert_eq!(merged.user_role.as_deref(), Some("Approver"));
    }

    #[test]
    fn latest_decision_is_max_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for (user, verdict) in [("u1", 1), ("u2", 0)] {
            store
                .append_decision(AccessDecision {
                    id: 0,
                    user_id: user.to_string(),
                    user_trust_score: 0.7,
                    access_decision: verdict,
                    timestamp: "2024-01-01 09:00:00".to_string(),
                })
                .unwrap();
        }
        let latest = store.latest_decision().unwrap().unwrap();
        assert_eq!(latest.user_id, "u2");
        // IDs are assigned at append time, under the collection lock.
        assert_eq!(latest.id, 2);
    }
}
