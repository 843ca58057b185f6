//! k-of-n threshold secret sharing gating privileged access.
//!
//! A fresh secret is generated per request and split across the eligible
//! approvers; reconstruction is refused below the threshold and the
//! recovered value gates a constant-time verification step.

pub mod notify;
pub mod shamir;
pub mod workflow;

pub use notify::{LoggingNotifier, ShareNotifier};
pub use shamir::{decode_share, encode_share, reconstruct, split, threshold_for, SecretShare, ShamirPolynomial};
pub use workflow::{
    ApprovalStatus, ApproverAction, ApproverRecord, PamCoordinator, PrivilegedAccessRequest,
    RequestStatus, MAX_ACCESS_DURATION, MIN_ACCESS_DURATION,
};
