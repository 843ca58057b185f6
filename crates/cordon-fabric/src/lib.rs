//! Node overlay for the Cordon access fabric.
//!
//! Maintains bidirectional links to a small, statically configured peer
//! set, delivers intent-tagged envelopes, and emulates request/response
//! over the push-only transport. Unlike the historical design this fabric
//! carries an explicit correlation identifier per request, so concurrent
//! outstanding requests to the same peer cannot cross-deliver.

pub mod connection;
pub mod dispatch;
pub mod envelope;
pub mod node;
pub mod reconnect;

pub use connection::{ConnectionRegistry, LinkDirection, PeerLink};
pub use dispatch::{HandlerRegistry, IntentHandler};
pub use envelope::{CorrelationId, Envelope, EnvelopeKind, WireFrame};
pub use node::{FabricNode, LINK_RESTORED_INTENT};
pub use reconnect::{ReconnectAction, ReconnectPolicy};
