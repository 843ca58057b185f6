//! Role wiring for the Cordon access fabric.
//!
//! Five roles cooperate per access attempt: the web front submits, the
//! access proxy ingests, the decision node scores, the policy engine
//! renders the verdict, and the data center owns every durable
//! collection. This crate binds each role's intent handlers to a fabric
//! node and exposes the external interface on the web front.

pub mod front;
pub mod handlers;
pub mod intents;
pub mod runtime;

pub use front::CordonFront;
pub use runtime::{start_node, AppConfig};
