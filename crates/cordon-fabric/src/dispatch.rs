//! Intent dispatch.
//!
//! Incoming envelopes are routed by the pair (sender role, intent) to a
//! registered handler. Envelopes from unknown sender roles are logged and
//! dropped; no error is surfaced to the sender.

use crate::envelope::Envelope;
use crate::node::FabricNode;
use async_trait::async_trait;
use cordon_core::{CordonResult, NodeRole};
use std::collections::HashMap;
use std::sync::Arc;

/// A handler for one or more intents from one sender role.
///
/// Returning `Ok(Some(value))` answers a request with a correlated
/// response; `Ok(None)` answers nothing (appropriate for notifies).
/// Errors on requests are reported back as correlated failures.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    /// Process one envelope. The fabric handle allows the handler to issue
    /// further sends and requests of its own.
    async fn handle(
        &self,
        fabric: &FabricNode,
        envelope: Envelope,
    ) -> CordonResult<Option<serde_json::Value>>;
}

/// Registry mapping (sender role, intent) to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(NodeRole, String), Arc<dyn IntentHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for envelopes with `intent` sent by `role`.
    /// Re-registering the same pair replaces the previous handler.
    pub fn register(
        &mut self,
        role: NodeRole,
        intent: impl Into<String>,
        handler: Arc<dyn IntentHandler>,
    ) {
        self.handlers.insert((role, intent.into()), handler);
    }

    /// Look up the handler for a (sender role, intent) pair.
    pub fn lookup(&self, role: NodeRole, intent: &str) -> Option<Arc<dyn IntentHandler>> {
        self.handlers.get(&(role, intent.to_string())).cloned()
    }

    /// Number of registered (role, intent) pairs.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
