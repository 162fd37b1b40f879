// ── In-process store ──
//
// Alerts and acknowledgments held in `DashMap`s, with change feeds fanned
// out over broadcast channels. Used for drills (no network) and as the
// store double in lifecycle tests, hence the fault-injection switches.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{AckChange, AckStore, AlertChange, AlertStore, ChangeFeed, FEED_CAPACITY};
use crate::clock::{Clock, SystemClock};
use crate::error::CoreError;
use crate::model::{Acknowledgment, Alert, AlertStatus, NewAcknowledgment, NewAlert, RecordId};

const BROADCAST_CAPACITY: usize = 256;

/// Cheaply cloneable in-memory store. Clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    alerts: DashMap<RecordId, Alert>,
    acks: DashMap<RecordId, Acknowledgment>,
    alert_tx: broadcast::Sender<AlertChange>,
    ack_tx: broadcast::Sender<Acknowledgment>,
    next_id: AtomicI64,
    clock: Arc<dyn Clock>,
    /// Live feed bridges, so tests can sever them.
    feeds: DashMap<u64, CancellationToken>,
    next_feed: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Stamp new records with `clock` instead of the system clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (alert_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (ack_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                alerts: DashMap::new(),
                acks: DashMap::new(),
                alert_tx,
                ack_tx,
                next_id: AtomicI64::new(1),
                clock,
                feeds: DashMap::new(),
                next_feed: AtomicU64::new(0),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            }),
        }
    }

    // ── Test and drill controls ──────────────────────────────────────

    /// Store a record as-is without notifying subscribers.
    pub fn seed_alert(&self, alert: Alert) {
        self.bump_past(&alert.id);
        self.inner.alerts.insert(alert.id.clone(), alert);
    }

    /// Store an acknowledgment as-is without notifying subscribers.
    pub fn seed_ack(&self, ack: Acknowledgment) {
        self.bump_past(&ack.id);
        self.inner.acks.insert(ack.id.clone(), ack);
    }

    /// Deliver a raw change to alert subscribers.
    pub fn emit(&self, change: AlertChange) {
        let _ = self.inner.alert_tx.send(change);
    }

    /// Close every open feed, as a lost subscription would.
    pub fn sever_feeds(&self) {
        let keys: Vec<u64> = self.inner.feeds.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, cancel)) = self.inner.feeds.remove(&key) {
                cancel.cancel();
            }
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn alert(&self, id: &RecordId) -> Option<Alert> {
        self.inner.alerts.get(id).map(|a| a.clone())
    }

    pub fn alert_count(&self) -> usize {
        self.inner.alerts.len()
    }

    pub fn ack_count(&self) -> usize {
        self.inner.acks.len()
    }

    /// Number of open feed bridges.
    pub fn feed_count(&self) -> usize {
        self.inner.feeds.len()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn next_id(&self) -> RecordId {
        RecordId::Number(self.inner.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn bump_past(&self, id: &RecordId) {
        if let Some(n) = id.as_number() {
            self.inner
                .next_id
                .fetch_max(n.saturating_add(1), Ordering::SeqCst);
        }
    }

    fn check_read(&self) -> Result<(), CoreError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(simulated("read"));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), CoreError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(simulated("write"));
        }
        Ok(())
    }

    /// Spawn a bridge from a broadcast receiver to a bounded feed.
    /// `map` filters and converts each broadcast item.
    fn bridge<T, U, F>(&self, mut rx: broadcast::Receiver<T>, map: F) -> ChangeFeed<U>
    where
        T: Clone + Send + 'static,
        U: FeedItem + Send + 'static,
        F: Fn(T) -> Option<U> + Send + 'static,
    {
        let (tx, out) = mpsc::channel(FEED_CAPACITY);
        let cancel = CancellationToken::new();
        let key = self.inner.next_feed.fetch_add(1, Ordering::SeqCst);
        self.inner.feeds.insert(key, cancel.clone());

        let inner = Arc::clone(&self.inner);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    result = rx.recv() => {
                        let item = match result {
                            Ok(item) => match map(item) {
                                Some(item) => item,
                                None => continue,
                            },
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "memory feed lagged");
                                U::resync()
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        };
                        if tx.send(item).await.is_err() {
                            break;
                        }
                    }
                }
            }
            inner.feeds.remove(&key);
            debug!(feed = key, "memory feed closed");
        });

        ChangeFeed::new(out, cancel)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Feed items that can say "re-read everything".
trait FeedItem {
    fn resync() -> Self;
}

impl FeedItem for AlertChange {
    fn resync() -> Self {
        Self::Resync
    }
}

impl FeedItem for AckChange {
    fn resync() -> Self {
        Self::Resync
    }
}

fn simulated(kind: &str) -> CoreError {
    CoreError::Api {
        message: format!("simulated {kind} failure"),
        code: None,
        status: None,
    }
}

// ── AlertStore ───────────────────────────────────────────────────────

#[async_trait]
impl AlertStore for MemoryStore {
    async fn subscribe(&self) -> Result<ChangeFeed<AlertChange>, CoreError> {
        self.check_read()?;
        let rx = self.inner.alert_tx.subscribe();
        Ok(self.bridge(rx, Some))
    }

    async fn latest_active(&self) -> Result<Option<Alert>, CoreError> {
        self.check_read()?;
        Ok(self
            .inner
            .alerts
            .iter()
            .filter(|e| e.is_active())
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|e| e.value().clone()))
    }

    async fn insert(&self, alert: NewAlert) -> Result<Alert, CoreError> {
        self.check_write()?;
        let record = Alert {
            id: self.next_id(),
            category: alert.category,
            origin: alert.origin,
            message: alert.message,
            status: AlertStatus::Active,
            created_at: self.inner.clock.now(),
            sender_id: alert.sender_id,
        };
        self.inner.alerts.insert(record.id.clone(), record.clone());
        debug!(alert_id = %record.id, "memory store: alert inserted");
        let _ = self
            .inner
            .alert_tx
            .send(AlertChange::Inserted(record.clone()));
        Ok(record)
    }

    async fn update_status(&self, id: &RecordId, status: AlertStatus) -> Result<(), CoreError> {
        self.check_write()?;
        let updated = {
            let mut entry =
                self.inner
                    .alerts
                    .get_mut(id)
                    .ok_or_else(|| CoreError::AlertNotFound {
                        identifier: id.to_string(),
                    })?;
            entry.status = status;
            entry.clone()
        };
        let _ = self.inner.alert_tx.send(AlertChange::Updated(updated));
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Alert>, CoreError> {
        self.check_read()?;
        let mut alerts: Vec<Alert> = self.inner.alerts.iter().map(|e| e.value().clone()).collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        alerts.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(alerts)
    }
}

// ── AckStore ─────────────────────────────────────────────────────────

#[async_trait]
impl AckStore for MemoryStore {
    async fn subscribe(
        &self,
        alert_id: &RecordId,
    ) -> Result<ChangeFeed<AckChange>, CoreError> {
        self.check_read()?;
        let rx = self.inner.ack_tx.subscribe();
        let alert_id = alert_id.clone();
        Ok(self.bridge(rx, move |ack: Acknowledgment| {
            (ack.alert_id == alert_id).then_some(AckChange::Inserted(ack))
        }))
    }

    async fn by_alert(&self, alert_id: &RecordId) -> Result<Vec<Acknowledgment>, CoreError> {
        self.check_read()?;
        let mut acks: Vec<Acknowledgment> = self
            .inner
            .acks
            .iter()
            .filter(|e| &e.alert_id == alert_id)
            .map(|e| e.value().clone())
            .collect();
        acks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(acks)
    }

    async fn by_alert_and_receiver(
        &self,
        alert_id: &RecordId,
        receiver_id: &str,
    ) -> Result<Vec<Acknowledgment>, CoreError> {
        let mut acks = AckStore::by_alert(self, alert_id).await?;
        acks.retain(|a| a.receiver_id == receiver_id);
        Ok(acks)
    }

    async fn insert(&self, ack: NewAcknowledgment) -> Result<Acknowledgment, CoreError> {
        self.check_write()?;
        if !self.inner.alerts.contains_key(&ack.alert_id) {
            return Err(CoreError::AlertNotFound {
                identifier: ack.alert_id.to_string(),
            });
        }

        let record = Acknowledgment {
            id: self.next_id(),
            alert_id: ack.alert_id,
            receiver_id: ack.receiver_id,
            receiver_label: ack.receiver_label,
            created_at: self.inner.clock.now(),
        };
        self.inner.acks.insert(record.id.clone(), record.clone());
        debug!(ack_id = %record.id, alert_id = %record.alert_id, "memory store: ack inserted");
        let _ = self.inner.ack_tx.send(record.clone());
        Ok(record)
    }
}
