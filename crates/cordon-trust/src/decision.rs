//! The deterministic allow/deny decision rule.
//!
//! Verdict starts at allow. Each check is independent and can only pin
//! the verdict to deny; nothing re-raises it. Output is strictly 0 or 1.

use cordon_store::DecisionThresholds;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Roles recognised by the role-specific threshold checks. Role names
/// match the identity source's `user_role` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    /// `"Policy Administrator"`
    PolicyAdministrator,
    /// `"Approver"`
    Approver,
    /// `"Security Viewer"`
    SecurityViewer,
    /// Any other (or absent) role; no role-specific threshold applies.
    Other,
}

impl UserRole {
    /// Parse the identity source's role string.
    pub fn parse(role: Option<&str>) -> Self {
        match role {
            Some("Policy Administrator") => Self::PolicyAdministrator,
            Some("Approver") => Self::Approver,
            Some("Security Viewer") => Self::SecurityViewer,
            _ => Self::Other,
        }
    }
}

/// Binary verdict for one access attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Verdict {
    /// Access denied.
    Deny,
    /// Access allowed.
    Allow,
}

impl Verdict {
    /// The wire/audit representation: 1 allow, 0 deny.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Allow => 1,
            Self::Deny => 0,
        }
    }
}

impl From<Verdict> for u8 {
    fn from(v: Verdict) -> u8 {
        v.as_u8()
    }
}

impl TryFrom<u8> for Verdict {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Deny),
            1 => Ok(Self::Allow),
            other => Err(format!("verdict must be 0 or 1, got {other}")),
        }
    }
}

/// Apply the decision rule.
pub fn make_access_decision(
    role: UserRole,
    trust_score: f64,
    sign_in_risk: f64,
    thresholds: &DecisionThresholds,
) -> Verdict {
    let mut verdict = Verdict::Allow;

    match role {
        UserRole::Approver if trust_score < thresholds.approver => verdict = Verdict::Deny,
        UserRole::SecurityViewer if trust_score < thresholds.security_viewer => {
            verdict = Verdict::Deny
        }
        UserRole::PolicyAdministrator if trust_score < thresholds.admin => verdict = Verdict::Deny,
        _ => {}
    }

    if sign_in_risk < thresholds.sign_in_risk {
        verdict = Verdict::Deny;
    }

    info!(
        ?role,
        trust_score,
        sign_in_risk,
        verdict = verdict.as_u8(),
        "access decision rendered"
    );
    verdict
}
