//! Out-of-band share delivery.
//!
//! Shares reach approvers outside the fabric (historically by email).
//! Delivery is fire-and-forget; no confirmation is consumed.

use async_trait::async_trait;
use tracing::info;

/// Delivers one share to one approver.
#[async_trait]
pub trait ShareNotifier: Send + Sync {
    /// Deliver `share` to the approver at `email`. Failures are the
    /// notifier's own concern; the workflow does not retry.
    async fn deliver(&self, approver_id: &str, email: &str, share: &str);
}

/// Notifier that records deliveries in the log instead of sending mail.
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl ShareNotifier for LoggingNotifier {
    async fn deliver(&self, approver_id: &str, email: &str, share: &str) {
        info!(approver = %approver_id, %email, share_len = share.len(), "share issued to approver");
    }
}
