//! Unified error type for the Cordon workspace.
//!
//! Transport failures are soft: callers recover where possible (one
//! reconnect attempt) and otherwise surface the failed operation. A lock
//! timeout aborts a collection operation without partial writes. A quorum
//! shortfall is an expected outcome, not a fault, but is still modelled
//! here so callers can match on it.

use crate::identifiers::NodeId;
use thiserror::Error;

/// Result alias used across the workspace.
pub type CordonResult<T> = std::result::Result<T, CordonError>;

/// All error kinds surfaced by the fabric, store, trust, and quorum layers.
#[derive(Debug, Error)]
pub enum CordonError {
    /// Peer could not be reached within the connection wait bound.
    #[error("connection to peer {peer} timed out")]
    ConnectionTimeout {
        /// Peer that never became reachable.
        peer: NodeId,
    },

    /// No correlated response arrived within the request bound.
    #[error("no response to intent '{intent}' within the timeout")]
    MessageTimeout {
        /// Intent of the request that went unanswered.
        intent: String,
    },

    /// Target absent from both connection sets after waiting.
    #[error("peer {peer} not found in inbound or outbound connections")]
    UnknownPeer {
        /// The unreachable target.
        peer: NodeId,
    },

    /// Envelope missing its sender or intent, or carrying an undecodable
    /// payload for its intent.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Collection lock unavailable within the bounded wait.
    #[error("failed to acquire lock for collection '{collection}' within the timeout")]
    LockTimeout {
        /// Collection whose lock could not be acquired.
        collection: String,
    },

    /// Fewer approved shares than the reconstruction threshold.
    #[error("threshold not met: {approved} approved shares, {required} required")]
    ThresholdNotMet {
        /// Approved shares recorded so far.
        approved: usize,
        /// Reconstruction threshold k.
        required: usize,
    },

    /// Lookup miss in a collection or workflow.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Failure reported by a remote handler for a correlated request.
    #[error("remote operation failed: {0}")]
    Remote(String),

    /// Policy document lacks a required threshold or list.
    #[error("policy configuration missing required key '{0}'")]
    ConfigMissingKey(String),

    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CordonError {
    /// Create a malformed-envelope error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEnvelope(msg.into())
    }

    /// Create a record-not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::RecordNotFound(what.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a missing-config-key error.
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::ConfigMissingKey(key.into())
    }

    /// Whether this error is a transport-level soft failure.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::MessageTimeout { .. } | Self::UnknownPeer { .. }
        )
    }
}
