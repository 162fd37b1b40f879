// ── Remote store ──
//
// `AlertStore` and `AckStore` over the hosted store: PostgREST for reads
// and writes, the Realtime socket for change feeds. One socket carries
// every channel; each feed is a channel plus a bridge task that turns
// channel events into domain changes.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use redcode_api::{
    AckRow, AlarmRow, ChangeBinding, ChangeEvent, ChangeKind, ChannelEvent, NewAckRow, NewAlarmRow,
    PostgresChange, RealtimeChannel, RealtimeHandle, RestClient, RowId, Tables, TlsMode,
    TransportConfig,
};

use super::{AckChange, AckStore, AlertChange, AlertStore, ChangeFeed, FEED_CAPACITY};
use crate::config::{StoreConfig, TlsVerification};
use crate::error::CoreError;
use crate::model::{Acknowledgment, Alert, AlertStatus, NewAcknowledgment, NewAlert, RecordId};

/// Channel carrying every alert insert and update.
const ALERT_CHANNEL: &str = "alarm-global";

/// Cheaply cloneable handle to the hosted store.
#[derive(Clone)]
pub struct RemoteStore {
    rest: RestClient,
    realtime: RealtimeHandle,
}

impl RemoteStore {
    /// Build the REST client and start the realtime socket.
    ///
    /// The socket connects in the background; feeds opened before it is
    /// up are joined as soon as it is.
    pub fn connect(config: &StoreConfig, cancel: CancellationToken) -> Result<Self, CoreError> {
        let transport = build_transport(config);
        let rest = RestClient::from_api_key(
            config.url.as_str(),
            &config.api_key,
            config.access_token.as_ref(),
            &transport,
        )?
        .with_tables(Tables {
            alarms: config.alerts_table.clone(),
            acknowledgments: config.acks_table.clone(),
        });

        let socket_url = RealtimeHandle::socket_url(config.url.as_str(), &config.api_key)?;
        let token = config
            .access_token
            .clone()
            .unwrap_or_else(|| config.api_key.clone());
        let realtime = RealtimeHandle::connect(socket_url, token, config.reconnect.clone(), cancel);

        debug!(url = %config.url, "remote store ready");
        Ok(Self { rest, realtime })
    }

    /// Assemble from pre-built clients.
    pub fn from_parts(rest: RestClient, realtime: RealtimeHandle) -> Self {
        Self { rest, realtime }
    }

    /// Stop the realtime socket. Open feeds end.
    pub fn shutdown(&self) {
        self.realtime.shutdown();
    }

    fn alarms_table(&self) -> &str {
        &self.rest.tables().alarms
    }

    fn acks_table(&self) -> &str {
        &self.rest.tables().acknowledgments
    }
}

fn build_transport(config: &StoreConfig) -> TransportConfig {
    TransportConfig {
        tls: match &config.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        },
        timeout: config.timeout,
    }
}

// ── AlertStore ───────────────────────────────────────────────────────

#[async_trait]
impl AlertStore for RemoteStore {
    async fn subscribe(&self) -> Result<ChangeFeed<AlertChange>, CoreError> {
        let channel = self.realtime.channel(
            ALERT_CHANNEL,
            vec![
                ChangeBinding::new(ChangeEvent::Insert, self.alarms_table()),
                ChangeBinding::new(ChangeEvent::Update, self.alarms_table()),
            ],
        )?;
        Ok(spawn_bridge(channel, alert_change))
    }

    async fn latest_active(&self) -> Result<Option<Alert>, CoreError> {
        Ok(self.rest.latest_active_alarm().await?.map(Alert::from))
    }

    async fn insert(&self, alert: NewAlert) -> Result<Alert, CoreError> {
        let row = self.rest.insert_alarm(&NewAlarmRow::from(&alert)).await?;
        Ok(Alert::from(row))
    }

    async fn update_status(&self, id: &RecordId, status: AlertStatus) -> Result<(), CoreError> {
        self.rest
            .update_alarm_status(&RowId::from(id), status.as_ref())
            .await?;
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Alert>, CoreError> {
        let rows = self.rest.recent_alarms(limit).await?;
        Ok(rows.into_iter().map(Alert::from).collect())
    }
}

// ── AckStore ─────────────────────────────────────────────────────────

#[async_trait]
impl AckStore for RemoteStore {
    async fn subscribe(&self, alert_id: &RecordId) -> Result<ChangeFeed<AckChange>, CoreError> {
        let channel = self.realtime.channel(
            &format!("ack-{alert_id}"),
            vec![
                ChangeBinding::new(ChangeEvent::Insert, self.acks_table())
                    .filter(format!("alarm_id=eq.{alert_id}")),
            ],
        )?;
        Ok(spawn_bridge(channel, ack_change))
    }

    async fn by_alert(&self, alert_id: &RecordId) -> Result<Vec<Acknowledgment>, CoreError> {
        let rows = self.rest.acks_for_alarm(&RowId::from(alert_id)).await?;
        Ok(rows.into_iter().map(Acknowledgment::from).collect())
    }

    async fn by_alert_and_receiver(
        &self,
        alert_id: &RecordId,
        receiver_id: &str,
    ) -> Result<Vec<Acknowledgment>, CoreError> {
        let rows = self
            .rest
            .acks_for_receiver(&RowId::from(alert_id), receiver_id)
            .await?;
        Ok(rows.into_iter().map(Acknowledgment::from).collect())
    }

    async fn insert(&self, ack: NewAcknowledgment) -> Result<Acknowledgment, CoreError> {
        let row = self.rest.insert_ack(&NewAckRow::from(&ack)).await?;
        Ok(Acknowledgment::from(row))
    }
}

// ── Channel → feed bridge ────────────────────────────────────────────

/// What a bridge should do with one channel event.
#[derive(Debug, PartialEq, Eq)]
enum Step<T> {
    Forward(T),
    Skip,
    /// The channel is unusable; end the feed so the consumer resubscribes.
    Close,
}

/// Spawn the task forwarding `channel` into a feed through `translate`.
fn spawn_bridge<T>(
    mut channel: RealtimeChannel,
    translate: fn(ChannelEvent) -> Step<T>,
) -> ChangeFeed<T>
where
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(FEED_CAPACITY);
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = task_cancel.cancelled() => break,
                event = channel.recv() => {
                    let Some(event) = event else { break };
                    match translate(event) {
                        Step::Forward(item) => {
                            if tx.send(item).await.is_err() {
                                break;
                            }
                        }
                        Step::Skip => {}
                        Step::Close => break,
                    }
                }
            }
        }
        debug!(topic = channel.topic(), "feed bridge stopped");
    });

    ChangeFeed::new(rx, cancel)
}

fn alert_change(event: ChannelEvent) -> Step<AlertChange> {
    match event {
        ChannelEvent::Joined { rejoin: false } => Step::Skip,
        ChannelEvent::Joined { rejoin: true } => Step::Forward(AlertChange::Resync),
        ChannelEvent::Lagged(n) => {
            warn!(skipped = n, "alert feed lagged");
            Step::Forward(AlertChange::Resync)
        }
        ChannelEvent::Disconnected => Step::Forward(AlertChange::Interrupted),
        ChannelEvent::Failed(reason) => {
            warn!(%reason, "alert channel failed");
            Step::Close
        }
        ChannelEvent::Change(change) => decode_alert(&change).map_or(Step::Skip, Step::Forward),
    }
}

fn decode_alert(change: &PostgresChange) -> Option<AlertChange> {
    let wrap: fn(Alert) -> AlertChange = match change.kind {
        ChangeKind::Insert => AlertChange::Inserted,
        ChangeKind::Update => AlertChange::Updated,
        ChangeKind::Delete | ChangeKind::Unknown => return None,
    };
    match change.record_as::<AlarmRow>() {
        Ok(row) => Some(wrap(Alert::from(row))),
        Err(e) => {
            warn!(error = %e, table = %change.table, "undecodable alert change");
            None
        }
    }
}

fn ack_change(event: ChannelEvent) -> Step<AckChange> {
    match event {
        ChannelEvent::Joined { rejoin: false } | ChannelEvent::Disconnected => Step::Skip,
        ChannelEvent::Joined { rejoin: true } | ChannelEvent::Lagged(_) => {
            Step::Forward(AckChange::Resync)
        }
        ChannelEvent::Failed(reason) => {
            warn!(%reason, "acknowledgment channel failed");
            Step::Close
        }
        ChannelEvent::Change(change) if change.kind == ChangeKind::Insert => {
            match change.record_as::<AckRow>() {
                Ok(row) => Step::Forward(AckChange::Inserted(Acknowledgment::from(row))),
                Err(e) => {
                    warn!(error = %e, "undecodable acknowledgment change");
                    Step::Skip
                }
            }
        }
        ChannelEvent::Change(_) => Step::Skip,
    }
}
