//! Sign-in risk from raw identity-provider events.
//!
//! Cleaning keeps only LOGIN and LOGIN_ERROR events that carry a user id.
//! Per user the risk is the running ratio of successes to total attempts,
//! tracked as an ordered chain starting at 0. A one-step linear
//! prediction (the difference of the last two chain values) is blended
//! with the current value to damp single-event noise while staying
//! responsive to a trend.

use cordon_store::AuthEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A raw event as delivered by the identity provider, before cleaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAuthEvent {
    /// Event time, when present.
    pub time: Option<String>,
    /// Provider event type.
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    /// Subject, absent on some provider-internal events.
    pub user_id: Option<String>,
    /// Source address.
    pub ip_address: Option<String>,
    /// Authentication mechanism.
    pub auth_type: Option<String>,
}

/// Per-user running counters and risk chain.
#[derive(Debug, Clone, Default)]
pub struct SignalHistory {
    success_count: u32,
    failure_count: u32,
    chain: Vec<f64>,
}

impl SignalHistory {
    /// Start a history with the conventional leading 0 chain entry.
    pub fn new() -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            chain: vec![0.0],
        }
    }

    /// Record one authentication outcome and return the updated risk.
    pub fn observe(&mut self, auth_status: u8) -> f64 {
        if auth_status == 1 {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        let total = self.success_count + self.failure_count;
        let risk = f64::from(self.success_count) / f64::from(total);
        self.chain.push(risk);
        risk
    }

    /// The current (latest) risk value, when any event has been observed.
    pub fn current_risk(&self) -> Option<f64> {
        if self.success_count + self.failure_count == 0 {
            None
        } else {
            self.chain.last().copied()
        }
    }

    /// The ordered chain of risk values, including the leading 0.
    pub fn chain(&self) -> &[f64] {
        &self.chain
    }
}

/// One-step prediction from the last two chain values. `None` when fewer
/// than two points exist.
pub fn predicted_risk(chain: &[f64], current: f64) -> Option<f64> {
    if chain.len() < 2 {
        return None;
    }
    let delta = chain[chain.len() - 1] - chain[chain.len() - 2];
    Some(current + delta)
}

/// Blend of current and predicted risk; the current value unchanged when
/// no prediction exists.
pub fn smoothed_risk(chain: &[f64], current: f64) -> f64 {
    match predicted_risk(chain, current) {
        Some(predicted) => (current + predicted) / 2.0,
        None => current,
    }
}

/// Clean raw events and compute each event's sign-in risk.
///
/// Events without a user id are dropped, LOGIN maps to status 1,
/// LOGIN_ERROR to status 0, and every other type is dropped. Each kept
/// event carries the user's smoothed risk as of that event.
pub fn clean_and_score(raw: Vec<RawAuthEvent>) -> Vec<AuthEvent> {
    let mut histories: HashMap<String, SignalHistory> = HashMap::new();
    let mut cleaned = Vec::new();

    for event in raw {
        let Some(user_id) = event.user_id else {
            debug!("event without user id dropped");
            continue;
        };
        let event_type = event.event_type.unwrap_or_default();
        let auth_status = match event_type.as_str() {
            "LOGIN" => 1,
            "LOGIN_ERROR" => 0,
            _ => {
                debug!(event_type = %event_type, "non-login event dropped");
                continue;
            }
        };

        let history = histories.entry(user_id.clone()).or_insert_with(SignalHistory::new);
        let current = history.observe(auth_status);
        // Blending can overshoot the unit interval on a steep trend.
        let sign_in_risk = smoothed_risk(history.chain(), current).clamp(0.0, 1.0);

        cleaned.push(AuthEvent {
            id: 0,
            time: event.time.unwrap_or_default(),
            event_type,
            user_id,
            ip_address: event.ip_address,
            auth_type: event.auth_type,
            auth_status,
            sign_in_risk,
        });
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(user: Option<&str>, event_type: &str, time: &str) -> RawAuthEvent {
        RawAuthEvent {
            time: Some(time.to_string()),
            event_type: Some(event_type.to_string()),
            user_id: user.map(str::to_string),
            ip_address: None,
            auth_type: Some("password".to_string()),
        }
    }

    #[test]
    fn risk_equals_success_ratio_after_each_event() {
        let mut history = SignalHistory::new();
        let outcomes = [1u8, 0, 1, 1, 0, 1];
        let mut successes = 0u32;
        for (i, status) in outcomes.iter().enumerate() {
            if *status == 1 {
                successes += 1;
            }
            let risk = history.observe(*status);
            let expected = f64::from(successes) / (i as f64 + 1.0);
            assert!((risk - expected).abs() < 1e-12);
            assert!((0.0..=1.0).contains(&risk));
        }
    }

    #[test]
    fn prediction_and_smoothing_follow_the_chain() {
        // History [0, 1.0, 0.5]: delta -0.5, predicted 0.0, smoothed 0.25.
        let chain = [0.0, 1.0, 0.5];
        assert_eq!(predicted_risk(&chain, 0.5), Some(0.0));
        assert_eq!(smoothed_risk(&chain, 0.5), 0.25);
    }

    #[test]
    fn single_point_chain_is_not_smoothed() {
        let chain = [0.7];
        assert_eq!(predicted_risk(&chain, 0.7), None);
        assert_eq!(smoothed_risk(&chain, 0.7), 0.7);
    }

    #[test]
    fn cleaning_drops_null_users_and_other_event_types() {
        let cleaned = clean_and_score(vec![
            raw(None, "LOGIN", "2024-01-01 09:00:00"),
            raw(Some("u1"), "CODE_TO_TOKEN", "2024-01-01 09:01:00"),
            raw(Some("u1"), "LOGIN", "2024-01-01 09:02:00"),
            raw(Some("u1"), "LOGIN_ERROR", "2024-01-01 09:03:00"),
        ]);

        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].auth_status, 1);
        assert_eq!(cleaned[1].auth_status, 0);
        assert_eq!(cleaned[1].user_id, "u1");
    }

    #[test]
    fn scored_events_stay_in_unit_interval() {
        let cleaned = clean_and_score(vec![
            raw(Some("u1"), "LOGIN_ERROR", "t1"),
            raw(Some("u1"), "LOGIN", "t2"),
            raw(Some("u1"), "LOGIN", "t3"),
        ]);
        for event in &cleaned {
            assert!((0.0..=1.0).contains(&event.sign_in_risk));
        }
        // First event: chain [0, 0], current 0, smoothed 0.
        assert_eq!(cleaned[0].sign_in_risk, 0.0);
    }
}
