//! One-shot rendezvous for data a background tool needs from the client.
//!
//! A background unit registers an operation id and waits on the returned
//! [`PendingExternalData`]. The inbound message handler delivers the payload (or
//! an error string) by operation id. Each registration is signalled at most once:
//! delivery removes it, and so does dropping the waiter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What the client sent back for an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalData {
    Payload(String),
    Failed(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RendezvousError {
    #[error("Timed out waiting for external data")]
    Timeout,

    /// The registration was discarded without a delivery
    #[error("Rendezvous closed before data arrived")]
    Closed,
}

/// Registration ticket plus the signalling half, keyed by operation id.
type PendingTable = DashMap<String, (u64, oneshot::Sender<ExternalData>)>;

/// Per-session table of outstanding rendezvous registrations.
#[derive(Debug, Default, Clone)]
pub struct Rendezvous {
    pending: Arc<PendingTable>,
    next_ticket: Arc<AtomicU64>,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `operation_id`. A previous registration under the same id is replaced.
    pub fn register(&self, operation_id: impl Into<String>) -> PendingExternalData {
        let operation_id = operation_id.into();
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        if self.pending.insert(operation_id.clone(), (ticket, tx)).is_some() {
            warn!(operation_id = %operation_id, "Replacing an existing rendezvous registration");
        }

        PendingExternalData {
            operation_id,
            ticket,
            rx: Some(rx),
            table: Arc::clone(&self.pending),
        }
    }

    /// Hand `data` to the waiter registered under `operation_id`.
    ///
    /// Returns `false` when nothing is waiting (unknown id, already delivered or
    /// timed out); such deliveries are logged and ignored.
    pub fn deliver(&self, operation_id: &str, data: ExternalData) -> bool {
        let Some((_, (_, tx))) = self.pending.remove(operation_id) else {
            warn!(
                operation_id = %operation_id,
                "External data for unknown or already processed operation"
            );
            return false;
        };

        if tx.send(data).is_err() {
            warn!(operation_id = %operation_id, "External data arrived after the waiter gave up");
            return false;
        }

        debug!(operation_id = %operation_id, "External data delivered");
        true
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Wait handle for one registration.
#[derive(Debug)]
pub struct PendingExternalData {
    operation_id: String,
    ticket: u64,
    rx: Option<oneshot::Receiver<ExternalData>>,
    table: Arc<PendingTable>,
}

impl PendingExternalData {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Wait up to `timeout` for the delivery. The registration is gone when this returns.
    pub async fn wait(mut self, timeout: Duration) -> Result<ExternalData, RendezvousError> {
        let Some(rx) = self.rx.take() else {
            return Err(RendezvousError::Closed);
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(_)) => Err(RendezvousError::Closed),
            Err(_) => Err(RendezvousError::Timeout),
        }
    }
}

impl Drop for PendingExternalData {
    fn drop(&mut self) {
        // only remove our own registration, not one that replaced it
        let ticket = self.ticket;
        self.table
            .remove_if(&self.operation_id, |_, (registered, _)| *registered == ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivery_wakes_waiter_and_clears_registration() {
        let rendezvous = Rendezvous::new();
        let pending = rendezvous.register("op-1");
        assert_eq!(rendezvous.len(), 1);

        assert!(rendezvous.deliver("op-1", ExternalData::Payload("data:image/png;base64,AA==".into())));
        assert!(rendezvous.is_empty());

        let data = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(data, ExternalData::Payload("data:image/png;base64,AA==".into()));
    }

    #[tokio::test]
    async fn test_error_delivery() {
        let rendezvous = Rendezvous::new();
        let pending = rendezvous.register("op-2");

        rendezvous.deliver("op-2", ExternalData::Failed("permission denied".into()));

        assert_eq!(
            pending.wait(Duration::from_secs(1)).await,
            Ok(ExternalData::Failed("permission denied".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_registration_and_ignores_late_delivery() {
        let rendezvous = Rendezvous::new();
        let pending = rendezvous.register("op-3");

        let result = pending.wait(Duration::from_secs(30)).await;
        assert_eq!(result, Err(RendezvousError::Timeout));
        assert!(rendezvous.is_empty());

        assert!(!rendezvous.deliver("op-3", ExternalData::Payload("late".into())));
    }

    #[tokio::test]
    async fn test_second_delivery_is_ignored() {
        let rendezvous = Rendezvous::new();
        let pending = rendezvous.register("op-4");

        assert!(rendezvous.deliver("op-4", ExternalData::Payload("first".into())));
        assert!(!rendezvous.deliver("op-4", ExternalData::Payload("second".into())));

        assert_eq!(
            pending.wait(Duration::from_secs(1)).await,
            Ok(ExternalData::Payload("first".into()))
        );
    }

    #[test]
    fn test_dropping_waiter_removes_registration() {
        let rendezvous = Rendezvous::new();
        let pending = rendezvous.register("op-5");
        drop(pending);

        assert!(rendezvous.is_empty());
        assert!(!rendezvous.deliver("op-5", ExternalData::Payload("x".into())));
    }

    #[test]
    fn test_stale_waiter_does_not_remove_replacement() {
        let rendezvous = Rendezvous::new();
        let first = rendezvous.register("op-6");
        let _second = rendezvous.register("op-6");

        drop(first);
        assert_eq!(rendezvous.len(), 1);
        assert!(rendezvous.deliver("op-6", ExternalData::Payload("fresh".into())));
    }
}
