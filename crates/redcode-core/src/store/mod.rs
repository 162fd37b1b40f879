// ── Shared alert store ──
//
// The lifecycle talks to the shared store through two narrow traits: one
// for alert records, one for acknowledgments. `RemoteStore` implements
// both over the PostgREST/Realtime client; `MemoryStore` implements both
// in-process for drills and tests.

pub mod memory;
pub mod remote;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::CoreError;
use crate::model::{Acknowledgment, Alert, AlertStatus, NewAcknowledgment, NewAlert, RecordId};

pub use memory::MemoryStore;
pub use remote::RemoteStore;

/// Buffer between a store's bridge task and the feed consumer.
pub(crate) const FEED_CAPACITY: usize = 64;

/// A change on the shared alert table, or a note about the feed itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertChange {
    /// A new alert record.
    Inserted(Alert),
    /// An existing record changed (typically its status).
    Updated(Alert),
    /// The feed may have missed changes; re-read current state.
    Resync,
    /// Delivery is interrupted. The feed stays open and may recover.
    Interrupted,
}

/// A change on the acknowledgments of one alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckChange {
    Inserted(Acknowledgment),
    /// The feed may have missed inserts; re-read the list.
    Resync,
}

/// A live subscription. Dropping it tears the subscription down.
#[derive(Debug)]
pub struct ChangeFeed<T> {
    rx: mpsc::Receiver<T>,
    _guard: DropGuard,
}

impl<T> ChangeFeed<T> {
    /// Wrap a receiver fed by a bridge task. `cancel` stops that task and
    /// is fired when the feed is dropped.
    pub fn new(rx: mpsc::Receiver<T>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            _guard: cancel.drop_guard(),
        }
    }

    /// Next item. `None` once the feed has closed for good.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

/// Shared alert records.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Subscribe to inserts and updates on the alert table.
    async fn subscribe(&self) -> Result<ChangeFeed<AlertChange>, CoreError>;

    /// The most recently created alert whose status is `active`.
    async fn latest_active(&self) -> Result<Option<Alert>, CoreError>;

    /// Create an alert with status `active`.
    async fn insert(&self, alert: NewAlert) -> Result<Alert, CoreError>;

    async fn update_status(&self, id: &RecordId, status: AlertStatus) -> Result<(), CoreError>;

    /// Up to `limit` alerts, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<Alert>, CoreError>;
}

/// Shared acknowledgment records.
#[async_trait]
pub trait AckStore: Send + Sync {
    /// Subscribe to acknowledgment inserts for one alert.
    async fn subscribe(&self, alert_id: &RecordId) -> Result<ChangeFeed<AckChange>, CoreError>;

    /// All acknowledgments of an alert, oldest first.
    async fn by_alert(&self, alert_id: &RecordId) -> Result<Vec<Acknowledgment>, CoreError>;

    async fn by_alert_and_receiver(
        &self,
        alert_id: &RecordId,
        receiver_id: &str,
    ) -> Result<Vec<Acknowledgment>, CoreError>;

    async fn insert(&self, ack: NewAcknowledgment) -> Result<Acknowledgment, CoreError>;
}
