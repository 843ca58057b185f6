//! Shared foundations for the Cordon zero-trust access fabric.
//!
//! Every other crate in the workspace builds on the types here: node
//! identity and role, the unified error type, and the static peer
//! configuration loaded at process start.

pub mod config;
pub mod error;
pub mod identifiers;

pub use config::{FabricConfig, FabricTimeouts, NodeIdentity};
pub use error::{CordonError, CordonResult};
pub use identifiers::{NodeId, NodeRole};
