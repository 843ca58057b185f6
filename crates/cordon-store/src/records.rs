//! Durable record shapes.
//!
//! Field names mirror the on-disk JSON documents so existing data
//! directories stay readable. Timestamps are `%Y-%m-%d %H:%M:%S` strings;
//! for that format lexicographic order equals chronological order, which
//! the latest-record queries rely on.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp format used across all collections.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a timestamp in the collection format.
pub fn format_timestamp(t: NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// One recorded access attempt with its network and device context.
/// Immutable after ingestion except for `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Collection-scoped monotonic identifier.
    #[serde(rename = "ID", default)]
    pub id: u64,
    /// Subject requesting access.
    pub user_id: String,
    /// Resource the subject asked for.
    pub resource_requested: String,
    /// When the request was made.
    pub access_request_time: String,
    /// Public address the request arrived from.
    pub public_ip_address: Option<String>,
    /// City/country string resolved from the address.
    pub location: Option<String>,
    /// Device class.
    pub device_type: Option<String>,
    /// Browser user agent.
    pub browser: Option<String>,
    /// Device hardware address.
    pub device_mac: Option<String>,
    /// Device vendor resolved from the hardware address.
    pub device_vendor: Option<String>,
    /// Operating system.
    #[serde(rename = "device_OS")]
    pub device_os: Option<String>,
    /// Outcome recorded after evaluation, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<u8>,
}

/// A cleaned authentication event with its computed sign-in risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthEvent {
    /// Collection-scoped monotonic identifier.
    #[serde(rename = "ID", default)]
    pub id: u64,
    /// Event time.
    pub time: String,
    /// Identity-provider event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Subject the event concerns.
    pub user_id: String,
    /// Address the authentication came from.
    pub ip_address: Option<String>,
    /// Authentication mechanism.
    pub auth_type: Option<String>,
    /// 1 for success, 0 for failure.
    pub auth_status: u8,
    /// Smoothed sign-in risk at the time of this event, in [0,1].
    pub sign_in_risk: f64,
}

/// Audit record of one access evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Collection-scoped monotonic identifier.
    #[serde(rename = "ID", default)]
    pub id: u64,
    /// Subject that was evaluated.
    pub user_id: String,
    /// Trust score fed into the verdict.
    pub user_trust_score: f64,
    /// 1 allow, 0 deny.
    pub access_decision: u8,
    /// When the verdict was rendered.
    pub timestamp: String,
}

/// Identity record merged from the external identity source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Subject identifier.
    pub user_id: String,
    /// Login name, when known.
    pub username: Option<String>,
    /// Email address, when known.
    pub email: Option<String>,
    /// Identity creation time (epoch milliseconds), when known.
    pub created_timestamp: Option<i64>,
    /// Whether the email address is verified, when known.
    pub email_verified: Option<bool>,
    /// Whether TOTP is enabled, when known.
    pub totp_enabled: Option<bool>,
    /// Assigned role. Only overwritten by non-null incoming values.
    pub user_role: Option<String>,
}

impl UserIdentity {
    /// Merge a partial incoming record into this one. Non-null incoming
    /// fields overwrite; null fields leave the existing value alone.
    pub fn merge_from(&mut self, incoming: &UserIdentity) {
        if incoming.username.is_some() {
            self.username = incoming.username.clone();
        }
        if incoming.email.is_some() {
            self.email = incoming.email.clone();
        }
        if incoming.created_timestamp.is_some() {
            self.created_timestamp = incoming.created_timestamp;
        }
        if incoming.email_verified.is_some() {
            self.email_verified = incoming.email_verified;
        }
        if incoming.totp_enabled.is_some() {
            self.totp_enabled = incoming.totp_enabled;
        }
        if incoming.user_role.is_some() {
            self.user_role = incoming.user_role.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Option<&str>) -> UserIdentity {
        UserIdentity {
            user_id: "u1".to_string(),
            username: None,
            email: None,
            created_timestamp: None,
            email_verified: None,
            totp_enabled: None,
            user_role: role.map(str::to_string),
        }
    }

    #[test]
    fn merge_never_overwrites_with_null() {
        let mut existing = identity(None);
        existing.merge_from(&identity(Some("Approver")));
        assert_eq!(existing.user_role.as_deref(), Some("Approver"));

        existing.merge_from(&identity(None));
        assert_eq!(existing.user_role.as_deref(), Some("Approver"));
    }

    #[test]
    fn records_round_trip_with_disk_field_names() {
        let event = AuthEvent {
            id: 3,
            time: "2024-01-05 09:15:00".to_string(),
            event_type: "LOGIN".to_string(),
            user_id: "u1".to_string(),
            ip_address: None,
            auth_type: Some("password".to_string()),
            auth_status: 1,
            sign_in_risk: 0.75,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["ID"], 3);
        assert_eq!(json["type"], "LOGIN");
        let back: AuthEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
