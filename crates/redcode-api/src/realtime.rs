//! Realtime change feed over the Phoenix channel protocol.
//!
//! One websocket per [`RealtimeHandle`] multiplexes any number of channels.
//! Each channel carries `postgres_changes` bindings (event + table + optional
//! filter) and surfaces row changes through a [`broadcast`] receiver. The
//! socket task heartbeats, reconnects with exponential backoff + jitter and
//! rejoins every open channel after a reconnect.
//!
//! # Example
//!
//! ```rust,ignore
//! use redcode_api::realtime::{ChangeBinding, ChangeEvent, RealtimeHandle, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let url = RealtimeHandle::socket_url("https://abc.example.co", &api_key)?;
//! let handle = RealtimeHandle::connect(url, token, ReconnectConfig::default(), CancellationToken::new());
//! let mut channel = handle.channel("alarm-global", vec![
//!     ChangeBinding::new(ChangeEvent::Insert, "alarms"),
//!     ChangeBinding::new(ChangeEvent::Update, "alarms"),
//! ])?;
//!
//! while let Some(event) = channel.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Constants ────────────────────────────────────────────────────────

const CHANNEL_EVENT_CAPACITY: usize = 256;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const PROTOCOL_VSN: &str = "1.0.0";
const HEARTBEAT_TOPIC: &str = "phoenix";

// ── Bindings ─────────────────────────────────────────────────────────

/// Which row operations a binding listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeEvent {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "*")]
    All,
}

/// A `postgres_changes` subscription inside a channel join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBinding {
    pub event: ChangeEvent,
    pub schema: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl ChangeBinding {
    pub fn new(event: ChangeEvent, table: impl Into<String>) -> Self {
        Self {
            event,
            schema: "public".into(),
            table: table.into(),
            filter: None,
        }
    }

    /// Restrict the binding with a PostgREST-style filter, e.g. `alarm_id=eq.42`.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

// ── Change payloads ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    #[serde(other)]
    Unknown,
}

/// A row change delivered by the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
    #[serde(default)]
    pub record: serde_json::Value,
    #[serde(default)]
    pub old_record: serde_json::Value,
}

impl PostgresChange {
    /// Deserialize the new row image into a typed row.
    pub fn record_as<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(self.record.clone()).map_err(|e| Error::Deserialization {
            message: format!("{} change on {}: {e}", kind_label(self.kind), self.table),
            body: self.record.to_string(),
        })
    }
}

fn kind_label(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Insert => "INSERT",
        ChangeKind::Update => "UPDATE",
        ChangeKind::Delete => "DELETE",
        ChangeKind::Unknown => "unknown",
    }
}

/// What a channel subscriber sees.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The server accepted the join. `rejoin` is set when this follows a
    /// reconnect, meaning changes may have been missed in between.
    Joined { rejoin: bool },
    /// A row change matching one of the channel's bindings.
    Change(Arc<PostgresChange>),
    /// The socket dropped; a rejoin will follow once it reconnects.
    Disconnected,
    /// The server rejected the join or reported a channel error.
    Failed(String),
    /// This subscriber fell behind and `n` events were dropped.
    Lagged(u64),
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for socket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── Wire envelope ────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeEnvelope {
    data: PostgresChange,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyPayload {
    #[serde(default)]
    status: String,
    #[serde(default)]
    response: serde_json::Value,
}

fn channel_topic(name: &str) -> String {
    format!("realtime:{name}")
}

fn join_message(
    topic: &str,
    bindings: &[ChangeBinding],
    access_token: &str,
    msg_ref: &str,
) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_owned(),
        event: "phx_join".into(),
        payload: serde_json::json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": bindings,
            },
            "access_token": access_token,
        }),
        msg_ref: Some(msg_ref.to_owned()),
        join_ref: Some(msg_ref.to_owned()),
    }
}

fn leave_message(topic: &str, msg_ref: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_owned(),
        event: "phx_leave".into(),
        payload: serde_json::json!({}),
        msg_ref: Some(msg_ref.to_owned()),
        join_ref: None,
    }
}

fn heartbeat_message(msg_ref: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: HEARTBEAT_TOPIC.into(),
        event: "heartbeat".into(),
        payload: serde_json::json!({}),
        msg_ref: Some(msg_ref.to_owned()),
        join_ref: None,
    }
}

// ── Handle ───────────────────────────────────────────────────────────

enum SocketCommand {
    Join {
        topic: String,
        bindings: Vec<ChangeBinding>,
        events: broadcast::Sender<ChannelEvent>,
    },
    Leave {
        topic: String,
    },
}

/// Handle to a running realtime socket.
///
/// Cheap to clone. The socket task exits when the cancellation token fires
/// or every handle and channel is dropped.
#[derive(Clone)]
pub struct RealtimeHandle {
    cmd_tx: mpsc::UnboundedSender<SocketCommand>,
    cancel: CancellationToken,
}

impl RealtimeHandle {
    /// Derive the websocket endpoint from a project URL.
    ///
    /// `https://abc.example.co` becomes
    /// `wss://abc.example.co/realtime/v1/websocket?apikey=…&vsn=1.0.0`.
    pub fn socket_url(project_url: &str, api_key: &SecretString) -> Result<Url, Error> {
        let mut url = Url::parse(project_url)?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(Error::RealtimeConnect(format!(
                    "unsupported URL scheme: {other}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::RealtimeConnect(format!("cannot use {scheme} for {url}")))?;

        let base = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{base}/realtime/v1/websocket"));
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", api_key.expose_secret())
            .append_pair("vsn", PROTOCOL_VSN);
        Ok(url)
    }

    /// Spawn the socket task. The first connection attempt happens
    /// asynchronously; channels opened before it completes are joined as
    /// soon as the socket is up.
    pub fn connect(
        url: Url,
        access_token: SecretString,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            socket_loop(url, access_token, reconnect, cmd_rx, task_cancel).await;
        });

        Self { cmd_tx, cancel }
    }

    /// Open a channel named `name` with the given change bindings.
    pub fn channel(
        &self,
        name: &str,
        bindings: Vec<ChangeBinding>,
    ) -> Result<RealtimeChannel, Error> {
        let topic = channel_topic(name);
        let (events, rx) = broadcast::channel(CHANNEL_EVENT_CAPACITY);
        self.cmd_tx
            .send(SocketCommand::Join {
                topic: topic.clone(),
                bindings,
                events,
            })
            .map_err(|_| Error::RealtimeShutdown)?;

        Ok(RealtimeChannel {
            topic,
            rx,
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    /// Signal the socket task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Channel ──────────────────────────────────────────────────────────

/// A joined (or joining) channel. Dropping it leaves the channel.
pub struct RealtimeChannel {
    topic: String,
    rx: broadcast::Receiver<ChannelEvent>,
    cmd_tx: mpsc::UnboundedSender<SocketCommand>,
}

impl RealtimeChannel {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next channel event. `None` once the socket task is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => Some(ChannelEvent::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(SocketCommand::Leave {
            topic: std::mem::take(&mut self.topic),
        });
    }
}

// ── Socket state ─────────────────────────────────────────────────────

struct ChannelEntry {
    bindings: Vec<ChangeBinding>,
    events: broadcast::Sender<ChannelEvent>,
    pending_join: Option<String>,
    joined_once: bool,
}

struct SocketState {
    channels: HashMap<String, ChannelEntry>,
    next_ref: u64,
    access_token: SecretString,
}

impl SocketState {
    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    /// Build the join frame for `topic` and remember its ref.
    fn join_frame(&mut self, topic: &str) -> Option<PhoenixMessage> {
        let msg_ref = self.next_ref();
        let entry = self.channels.get_mut(topic)?;
        entry.pending_join = Some(msg_ref.clone());
        Some(join_message(
            topic,
            &entry.bindings,
            self.access_token.expose_secret(),
            &msg_ref,
        ))
    }

    fn broadcast_all(&self, event: &ChannelEvent) {
        for entry in self.channels.values() {
            let _ = entry.events.send(event.clone());
        }
    }

    /// Route one inbound frame to its channel.
    fn dispatch(&mut self, msg: PhoenixMessage) {
        let Some(entry) = self.channels.get_mut(&msg.topic) else {
            tracing::trace!(topic = %msg.topic, event = %msg.event, "Frame for unknown topic");
            return;
        };

        match msg.event.as_str() {
            "phx_reply" => {
                if msg.msg_ref.is_none() || msg.msg_ref != entry.pending_join {
                    return;
                }
                entry.pending_join = None;
                let reply: ReplyPayload = serde_json::from_value(msg.payload).unwrap_or_default();
                if reply.status == "ok" {
                    let rejoin = entry.joined_once;
                    entry.joined_once = true;
                    tracing::debug!(topic = %msg.topic, rejoin, "Channel joined");
                    let _ = entry.events.send(ChannelEvent::Joined { rejoin });
                } else {
                    tracing::warn!(topic = %msg.topic, response = %reply.response, "Channel join rejected");
                    let _ = entry
                        .events
                        .send(ChannelEvent::Failed(reply.response.to_string()));
                }
            }
            "postgres_changes" => match serde_json::from_value::<ChangeEnvelope>(msg.payload) {
                Ok(envelope) => {
                    let _ = entry
                        .events
                        .send(ChannelEvent::Change(Arc::new(envelope.data)));
                }
                Err(e) => {
                    tracing::debug!(error = %e, topic = %msg.topic, "Failed to parse change payload");
                }
            },
            "phx_error" | "phx_close" => {
                tracing::warn!(topic = %msg.topic, event = %msg.event, "Channel closed by server");
                let _ = entry.events.send(ChannelEvent::Failed(msg.event.clone()));
            }
            other => {
                tracing::trace!(topic = %msg.topic, event = other, "Ignoring channel event");
            }
        }
    }
}

enum SessionEnd {
    Shutdown,
    Disconnected,
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → join → read → on error, backoff → reconnect.
async fn socket_loop(
    url: Url,
    access_token: SecretString,
    reconnect: ReconnectConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<SocketCommand>,
    cancel: CancellationToken,
) {
    let mut state = SocketState {
        channels: HashMap::new(),
        next_ref: 0,
        access_token,
    };
    let mut attempt: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = run_session(&url, &mut state, &mut cmd_rx, &cancel) => result,
        };

        let err = match result {
            Ok(SessionEnd::Shutdown) => break,
            // Clean disconnect: reset the attempt counter and reconnect.
            Ok(SessionEnd::Disconnected) => {
                tracing::info!("Realtime socket disconnected cleanly, reconnecting");
                state.broadcast_all(&ChannelEvent::Disconnected);
                attempt = 0;
                continue;
            }
            Err(e) => e,
        };

        tracing::warn!(error = %err, attempt, "Realtime socket error");
        state.broadcast_all(&ChannelEvent::Disconnected);

        if let Some(max) = reconnect.max_retries {
            if attempt >= max {
                tracing::error!(
                    max_retries = max,
                    "Realtime reconnection limit reached, giving up"
                );
                break;
            }
        }

        let delay = calculate_backoff(attempt, &reconnect);
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "Waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    tracing::debug!("Realtime socket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

async fn run_session(
    url: &Url,
    state: &mut SocketState,
    cmd_rx: &mut mpsc::UnboundedReceiver<SocketCommand>,
    cancel: &CancellationToken,
) -> Result<SessionEnd, Error> {
    tracing::info!(host = url.host_str().unwrap_or_default(), "Connecting to realtime socket");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::RealtimeConnect(e.to_string()))?;

    tracing::info!("Realtime socket connected");

    let (mut write, mut read) = ws_stream.split();

    // Rejoin everything that was open before the (re)connect.
    let topics: Vec<String> = state.channels.keys().cloned().collect();
    for topic in topics {
        if let Some(frame) = state.join_frame(&topic) {
            send_frame(&mut write, &frame).await?;
        }
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(SessionEnd::Shutdown),
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    return Ok(SessionEnd::Shutdown);
                };
                match cmd {
                    SocketCommand::Join { topic, bindings, events } => {
                        state.channels.insert(topic.clone(), ChannelEntry {
                            bindings,
                            events,
                            pending_join: None,
                            joined_once: false,
                        });
                        if let Some(frame) = state.join_frame(&topic) {
                            send_frame(&mut write, &frame).await?;
                        }
                    }
                    SocketCommand::Leave { topic } => {
                        if state.channels.remove(&topic).is_some() {
                            let msg_ref = state.next_ref();
                            send_frame(&mut write, &leave_message(&topic, &msg_ref)).await?;
                        }
                    }
                }
            }
            _ = heartbeat.tick() => {
                let msg_ref = state.next_ref();
                send_frame(&mut write, &heartbeat_message(&msg_ref)).await?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PhoenixMessage>(&text) {
                            Ok(msg) => state.dispatch(msg),
                            Err(e) => tracing::debug!(error = %e, "Failed to parse realtime frame"),
                        }
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("Realtime ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "Realtime close frame received");
                        } else {
                            tracing::info!("Realtime close frame received (no payload)");
                        }
                        return Ok(SessionEnd::Disconnected);
                    }
                    Some(Err(e)) => return Err(Error::RealtimeConnect(e.to_string())),
                    None => {
                        tracing::info!("Realtime stream ended");
                        return Ok(SessionEnd::Disconnected);
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

async fn send_frame<S>(write: &mut S, frame: &PhoenixMessage) -> Result<(), Error>
where
    S: futures_util::Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(frame).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: String::new(),
    })?;
    write
        .send(Message::text(text))
        .await
        .map_err(|e| Error::RealtimeConnect(e.to_string()))
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% so stations that lost the socket together do not all
/// reconnect in the same instant.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exp = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exp);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn state_with(topic: &str) -> (SocketState, broadcast::Receiver<ChannelEvent>) {
        let (events, rx) = broadcast::channel(16);
        let mut channels = HashMap::new();
        channels.insert(
            topic.to_owned(),
            ChannelEntry {
                bindings: vec![ChangeBinding::new(ChangeEvent::Insert, "alarms")],
                events,
                pending_join: None,
                joined_once: false,
            },
        );
        let state = SocketState {
            channels,
            next_ref: 0,
            access_token: SecretString::from("anon"),
        };
        (state, rx)
    }

    fn reply(topic: &str, msg_ref: &str, status: &str) -> PhoenixMessage {
        serde_json::from_value(serde_json::json!({
            "topic": topic,
            "event": "phx_reply",
            "payload": {"status": status, "response": {}},
            "ref": msg_ref
        }))
        .unwrap()
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        assert!(d10 <= Duration::from_secs(13), "got {d10:?}");
        let huge = calculate_backoff(u32::MAX, &config);
        assert!(huge <= Duration::from_secs(13), "got {huge:?}");
    }

    #[test]
    fn socket_url_from_project_url() {
        let key = SecretString::from("anon-key");
        let url = RealtimeHandle::socket_url("https://abc.example.co", &key).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://abc.example.co/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );

        let local = RealtimeHandle::socket_url("http://127.0.0.1:54321/", &key).unwrap();
        assert_eq!(local.scheme(), "ws");
        assert_eq!(local.path(), "/realtime/v1/websocket");
    }

    #[test]
    fn join_frame_carries_bindings_and_token() {
        let binding = ChangeBinding::new(ChangeEvent::Insert, "acknowledgments").filter("alarm_id=eq.9");
        let msg = join_message("realtime:ack-9", &[binding], "token", "3");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["event"], "phx_join");
        assert_eq!(json["ref"], "3");
        assert_eq!(json["join_ref"], "3");
        assert_eq!(json["payload"]["access_token"], "token");
        let changes = &json["payload"]["config"]["postgres_changes"][0];
        assert_eq!(changes["event"], "INSERT");
        assert_eq!(changes["schema"], "public");
        assert_eq!(changes["table"], "acknowledgments");
        assert_eq!(changes["filter"], "alarm_id=eq.9");
    }

    #[test]
    fn heartbeat_targets_phoenix_topic() {
        let json = serde_json::to_value(heartbeat_message("12")).unwrap();
        assert_eq!(json["topic"], "phoenix");
        assert_eq!(json["event"], "heartbeat");
        assert_eq!(json["ref"], "12");
    }

    #[test]
    fn join_reply_emits_joined_then_rejoined() {
        let (mut state, mut rx) = state_with("realtime:alarm-global");

        state.join_frame("realtime:alarm-global").unwrap();
        state.dispatch(reply("realtime:alarm-global", "1", "ok"));
        assert!(matches!(rx.try_recv().unwrap(), ChannelEvent::Joined { rejoin: false }));

        state.join_frame("realtime:alarm-global").unwrap();
        state.dispatch(reply("realtime:alarm-global", "2", "ok"));
        assert!(matches!(rx.try_recv().unwrap(), ChannelEvent::Joined { rejoin: true }));
    }

    #[test]
    fn reply_to_other_ref_is_ignored() {
        let (mut state, mut rx) = state_with("realtime:alarm-global");
        state.join_frame("realtime:alarm-global").unwrap();
        state.dispatch(reply("realtime:alarm-global", "99", "ok"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rejected_join_emits_failed() {
        let (mut state, mut rx) = state_with("realtime:alarm-global");
        state.join_frame("realtime:alarm-global").unwrap();
        state.dispatch(reply("realtime:alarm-global", "1", "error"));
        assert!(matches!(rx.try_recv().unwrap(), ChannelEvent::Failed(_)));
    }

    #[test]
    fn postgres_change_is_routed_and_typed() {
        let (mut state, mut rx) = state_with("realtime:alarm-global");
        let msg: PhoenixMessage = serde_json::from_value(serde_json::json!({
            "topic": "realtime:alarm-global",
            "event": "postgres_changes",
            "ref": null,
            "payload": {
                "ids": [1],
                "data": {
                    "type": "UPDATE",
                    "schema": "public",
                    "table": "alarms",
                    "commit_timestamp": "2025-11-20T08:16:00Z",
                    "record": {
                        "id": 17,
                        "code_type": "BLUE CODE",
                        "status": "resolved",
                        "created_at": "2025-11-20T08:15:00Z"
                    },
                    "old_record": {"id": 17}
                }
            }
        }))
        .unwrap();

        state.dispatch(msg);

        let ChannelEvent::Change(change) = rx.try_recv().unwrap() else {
            panic!("expected a change event");
        };
        assert_eq!(change.kind, ChangeKind::Update);
        let row: crate::models::AlarmRow = change.record_as().unwrap();
        assert_eq!(row.status, "resolved");
        assert_eq!(row.id, crate::models::RowId::Int(17));
    }

    #[test]
    fn frame_for_unknown_topic_is_dropped() {
        let (mut state, mut rx) = state_with("realtime:alarm-global");
        state.dispatch(reply("realtime:ack-4", "1", "ok"));
        assert!(rx.try_recv().is_err());
    }
}
