//! Data mediation layer: file-lock-guarded JSON collections plus the
//! YAML policy-configuration document.
//!
//! This crate is the sole owner of durable state. Other components reach
//! it only through fabric messages served by the data-center role; no one
//! else touches the files.

pub mod collection;
pub mod lock;
pub mod policy_doc;
pub mod records;
pub mod store;

pub use collection::{next_id, Collection};
pub use lock::{CollectionLock, DEFAULT_LOCK_TIMEOUT};
pub use policy_doc::{DecisionThresholds, LocationPolicy, PolicyDocument, UpdateStatus};
pub use records::{format_timestamp, AccessDecision, AccessRequest, AuthEvent, UserIdentity, TIMESTAMP_FORMAT};
pub use store::Store;
