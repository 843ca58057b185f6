//! Overall trust score.
//!
//! The score is a monotone product of the smoothed sign-in risk, a
//! location-risk factor, and a risk-window factor, clamped to [0,1].
//! Any input indicating higher risk can only lower the score.

use chrono::{NaiveDateTime, NaiveTime};
use cordon_core::{CordonError, CordonResult};
use cordon_store::{LocationPolicy, TIMESTAMP_FORMAT};

/// Risk classification of the request's origin country.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationClass {
    /// On the high-risk list.
    High,
    /// On the medium-risk list.
    Medium,
    /// On the low-risk list.
    Low,
    /// On none of the lists.
    Unlisted,
}

impl LocationClass {
    /// Multiplicative score factor for this class. Unlisted countries are
    /// treated like low risk.
    pub fn factor(self) -> f64 {
        match self {
            Self::High => 0.2,
            Self::Medium => 0.6,
            Self::Low | Self::Unlisted => 1.0,
        }
    }
}

/// Classify a country code against the configured risk lists. High wins
/// over medium wins over low when a country appears on several.
pub fn classify_country(country: &str, policy: &LocationPolicy) -> LocationClass {
    if policy.high_risk.iter().any(|c| c == country) {
        LocationClass::High
    } else if policy.medium_risk.iter().any(|c| c == country) {
        LocationClass::Medium
    } else if policy.low_risk.iter().any(|c| c == country) {
        LocationClass::Low
    } else {
        LocationClass::Unlisted
    }
}

/// Extract the country code from a `City/CC` location string.
pub fn country_of(location: &str) -> &str {
    location.rsplit('/').next().unwrap_or(location)
}

/// Whether `at` falls inside the `[start, end)` time-of-day window.
/// A start later than the end denotes an overnight window.
pub fn in_risk_window(at: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        at >= start && at < end
    } else {
        at >= start || at < end
    }
}

/// Parse a collection timestamp.
pub fn parse_timestamp(s: &str) -> CordonResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| CordonError::serialization(format!("timestamp '{s}': {e}")))
}

fn parse_time_of_day(s: &str) -> CordonResult<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .map_err(|e| CordonError::serialization(format!("time of day '{s}': {e}")))
}

/// Compute the overall trust score for one access attempt.
///
/// Missing inputs are the caller's problem; by the time this runs the
/// evaluation has already resolved identity, latest request, and latest
/// auth event, failing closed if any were absent.
pub fn trust_score(
    sign_in_risk: f64,
    location: &str,
    request_time: &str,
    policy: &LocationPolicy,
) -> CordonResult<f64> {
    let class = classify_country(country_of(location), policy);
    let at = parse_timestamp(request_time)?.time();
    let window_start = parse_time_of_day(&policy.period_start)?;
    let window_end = parse_time_of_day(&policy.period_end)?;
    let window_factor = if in_risk_window(at, window_start, window_end) {
        0.5
    } else {
        1.0
    };

    Ok((sign_in_risk * class.factor() * window_factor).clamp(0.0, 1.0))
}
