//! Envelope protocol.
//!
//! Every message on the wire is an [`Envelope`]: sender, intent tag, a
//! correlation identifier, and an intent-defined payload. Payloads travel
//! as JSON values and are decoded into typed shapes at the dispatch
//! boundary, never inside the transport.

use cordon_core::{CordonError, CordonResult, NodeId, NodeRole};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Correlates a response (or failure) with the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh correlation identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The delivery discipline an envelope participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Expects a correlated `Response` or `Failure`.
    Request,
    /// Correlated answer to a `Request`.
    Response,
    /// Correlated error report for a `Request` that could not be served.
    Failure,
    /// Fire-and-forget; no answer expected.
    Notify,
}

/// The wire-level message unit exchanged between nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Identifier of the sending node.
    pub sender: NodeId,
    /// String tag identifying the semantic purpose of the message.
    pub intent: String,
    /// Delivery discipline.
    pub kind: EnvelopeKind,
    /// Request/response correlation.
    pub correlation: CorrelationId,
    /// Intent-defined payload, decoded at the dispatch boundary.
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Build a request envelope with a fresh correlation identifier.
    pub fn request(sender: NodeId, intent: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            sender,
            intent: intent.into(),
            kind: EnvelopeKind::Request,
            correlation: CorrelationId::new(),
            payload,
        }
    }

    /// Build a fire-and-forget envelope.
    pub fn notify(sender: NodeId, intent: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            sender,
            intent: intent.into(),
            kind: EnvelopeKind::Notify,
            correlation: CorrelationId::new(),
            payload,
        }
    }

    /// Build the response to a request, reusing its correlation.
    pub fn response_to(request: &Envelope, sender: NodeId, payload: serde_json::Value) -> Self {
        Self {
            sender,
            intent: request.intent.clone(),
            kind: EnvelopeKind::Response,
            correlation: request.correlation,
            payload,
        }
    }

    /// Build a failure report for a request, reusing its correlation.
    pub fn failure_to(request: &Envelope, sender: NodeId, message: impl Into<String>) -> Self {
        Self {
            sender,
            intent: request.intent.clone(),
            kind: EnvelopeKind::Failure,
            correlation: request.correlation,
            payload: serde_json::json!({ "message": message.into() }),
        }
    }

    /// Reject envelopes missing their sender or intent.
    pub fn validate(&self) -> CordonResult<()> {
        if self.sender.as_str().is_empty() {
            return Err(CordonError::malformed("missing sender"));
        }
        if self.intent.is_empty() {
            return Err(CordonError::malformed("missing intent"));
        }
        Ok(())
    }

    /// Decode the payload into a typed intent shape.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> CordonResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            CordonError::malformed(format!("payload for intent '{}': {}", self.intent, e))
        })
    }
}

/// Frames exchanged on a connection. The first frame in each direction is
/// a `Hello` identifying the peer; everything after is envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", content = "body", rename_all = "snake_case")]
pub enum WireFrame {
    /// Transport-level handshake announcing identity and role.
    Hello {
        /// Identifier of the connecting node.
        node_id: NodeId,
        /// Role of the connecting node.
        role: NodeRole,
    },
    /// An application envelope.
    Envelope(Envelope),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_reuses_request_correlation() {
        let req = Envelope::request(NodeId::new("ap"), "request_trust_score", json!({"user_id": "u1"}));
        let resp = Envelope::response_to(&req, NodeId::new("pe"), json!({"verdict": 1}));
        assert_eq!(resp.correlation, req.correlation);
        assert_eq!(resp.intent, req.intent);
        assert_eq!(resp.kind, EnvelopeKind::Response);
    }

    #[test]
    fn distinct_requests_get_distinct_correlations() {
        let a = Envelope::request(NodeId::new("ap"), "x", json!(null));
        let b = Envelope::request(NodeId::new("ap"), "x", json!(null));
        assert_ne!(a.correlation, b.correlation);
    }

    #[test]
    fn validation_rejects_missing_intent() {
        let mut env = Envelope::notify(NodeId::new("ap"), "ping", json!(null));
        env.intent.clear();
        assert!(env.validate().is_err());
    }

    #[test]
    fn wire_frame_round_trips_through_json() {
        let env = Envelope::notify(NodeId::new("dc"), "access_decision", json!({"verdict": 0}));
        let frame = WireFrame::Envelope(env);
        let bytes = serde_json::to_vec(&frame).unwrap();
        let back: WireFrame = serde_json::from_slice(&bytes).unwrap();
        match back {
            WireFrame::Envelope(e) => {
                assert_eq!(e.intent, "access_decision");
                assert_eq!(e.kind, EnvelopeKind::Notify);
            }
            WireFrame::Hello { .. } => panic!("wrong frame"),
        }
    }
}
