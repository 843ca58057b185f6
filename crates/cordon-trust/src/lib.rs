//! Trust scoring and the deterministic access decision rule.
//!
//! Evaluation fails closed: a missing identity, auth history, or policy
//! key aborts with an error rather than guessing a fallback score.

pub mod decision;
pub mod score;
pub mod signals;

pub use decision::{make_access_decision, UserRole, Verdict};
pub use score::{classify_country, country_of, in_risk_window, trust_score, LocationClass};
pub use signals::{clean_and_score, predicted_risk, smoothed_risk, RawAuthEvent, SignalHistory};
