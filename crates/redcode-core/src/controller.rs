// ── Alarm controller ──
//
// One task per station owns the `Lifecycle` and serializes everything
// that touches it: alert feed changes, store results, watchdog events,
// audio completions and user intents. Store calls run in spawned tasks and
// report back over an internal channel, so a slow store never delays the
// countdown or the audio chain. Every result is re-checked against the
// currently displayed alert before it mutates anything.

use std::fmt;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use redcode_api::realtime::calculate_backoff;

use crate::audio::{AudioEvent, AudioOutput, PlaybackError};
use crate::clock::Clock;
use crate::config::{ManualStopPolicy, ReceiverIdentity, StationConfig};
use crate::error::CoreError;
use crate::lifecycle::{Activation, Fired, Lifecycle, LifecycleState, StopOutcome};
use crate::model::{Acknowledgment, Alert, AlertStatus, NewAcknowledgment, NewAlert, RecordId};
use crate::store::{AckChange, AckStore, AlertChange, AlertStore, ChangeFeed};

const INTENT_CHANNEL_SIZE: usize = 16;
const NOTICE_CHANNEL_SIZE: usize = 64;

// ── Notices ──────────────────────────────────────────────────────────

/// Non-fatal conditions a presentation surface should show the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The platform refused to start audio; call
    /// [`AlarmController::enable_audio`] after a user gesture.
    AudioBlocked { alert_id: RecordId },
    PlaybackFailed { message: String },
    /// This station's acknowledgment was written.
    Acknowledged { alert_id: RecordId },
    /// The resolve write failed. Other stations may still be alerting.
    ResolveFailed { alert_id: RecordId, message: String },
    StoreError {
        operation: &'static str,
        message: String,
    },
    FeedInterrupted,
    FeedRestored,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AudioBlocked { alert_id } => {
                write!(f, "audio blocked for alert {alert_id}; enable audio to resume")
            }
            Self::PlaybackFailed { message } => write!(f, "playback failed: {message}"),
            Self::Acknowledged { alert_id } => write!(f, "acknowledged alert {alert_id}"),
            Self::ResolveFailed { alert_id, message } => write!(
                f,
                "could not resolve alert {alert_id} ({message}); other stations may still be alerting"
            ),
            Self::StoreError { operation, message } => write!(f, "{operation} failed: {message}"),
            Self::FeedInterrupted => f.write_str("alert feed interrupted; reconnecting"),
            Self::FeedRestored => f.write_str("alert feed restored"),
        }
    }
}

// ── Controller ───────────────────────────────────────────────────────

/// The alarm lifecycle of one station.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Construct it, call
/// [`start()`](Self::start), then observe [`state()`](Self::state) and
/// [`notices()`](Self::notices) and forward user actions.
#[derive(Clone)]
pub struct AlarmController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    station: StationConfig,
    alerts: Arc<dyn AlertStore>,
    acks: Arc<dyn AckStore>,
    audio: Arc<dyn AudioOutput>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<LifecycleState>,
    notices: broadcast::Sender<Notice>,
    intent_tx: mpsc::Sender<Intent>,
    intent_rx: Mutex<Option<mpsc::Receiver<Intent>>>,
    started: AtomicBool,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

enum Intent {
    ManualStop(oneshot::Sender<StopOutcome>),
    EnableAudio(oneshot::Sender<bool>),
    Activate(Box<Alert>, oneshot::Sender<Activation>),
    SetReceiverClip(Option<String>, oneshot::Sender<()>),
}

impl AlarmController {
    /// Create a controller. Does NOT subscribe; call
    /// [`start()`](Self::start).
    pub fn new(
        station: StationConfig,
        alerts: Arc<dyn AlertStore>,
        acks: Arc<dyn AckStore>,
        audio: Arc<dyn AudioOutput>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_SIZE);
        let (intent_tx, intent_rx) = mpsc::channel(INTENT_CHANNEL_SIZE);

        Self {
            inner: Arc::new(ControllerInner {
                station,
                alerts,
                acks,
                audio,
                clock,
                state,
                notices,
                intent_tx,
                intent_rx: Mutex::new(Some(intent_rx)),
                started: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn station(&self) -> &StationConfig {
        &self.inner.station
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Subscribe to the alert feed, query the latest active alert and
    /// start processing. Calling it again while running is a no-op.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::ControllerStopped);
        }
        let Some(intents) = self.inner.intent_rx.lock().await.take() else {
            debug!("controller already started");
            return Ok(());
        };

        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let runner = Runner {
            lifecycle: Lifecycle::new(&self.inner.station, audio_tx),
            ctx: Arc::clone(&self.inner),
            intents,
            audio_events: audio_rx,
            internal_tx,
            internal_rx,
            alert_feed: None,
            feed_down: false,
            resubscribe: None,
            resubscribe_attempt: 0,
            tracker: None,
            cancel: self.inner.cancel.clone(),
        };

        *self.inner.task.lock().await = Some(tokio::spawn(runner.run()));
        self.inner.started.store(true, Ordering::SeqCst);
        info!(receiver = %self.inner.station.receiver.id, "alarm controller started");
        Ok(())
    }

    /// Release the feed subscriptions and timers, silence audio and wait
    /// for the controller task to finish. Ends in [`LifecycleState::Idle`].
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.task.lock().await.take() {
            let _ = handle.await;
        }
        debug!("alarm controller stopped");
    }

    // ── User intents ─────────────────────────────────────────────────

    /// Stop the displayed alert according to the station's manual-stop
    /// policy.
    pub async fn manual_stop(&self) -> Result<StopOutcome, CoreError> {
        self.request(Intent::ManualStop).await
    }

    /// Record the user's permission to play audio and resume the chain
    /// from the primary clip. Returns `true` if audio restarted.
    pub async fn enable_audio(&self) -> Result<bool, CoreError> {
        self.request(Intent::EnableAudio).await
    }

    /// Offer an alert for display, subject to the race policy.
    pub async fn activate(&self, alert: Alert) -> Result<Activation, CoreError> {
        self.request(|tx| Intent::Activate(Box::new(alert), tx)).await
    }

    /// Install this station's receiver clip once it becomes known.
    pub async fn set_receiver_clip(&self, clip: Option<String>) -> Result<(), CoreError> {
        self.request(|tx| Intent::SetReceiverClip(clip, tx)).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Intent,
    ) -> Result<T, CoreError> {
        if !self.inner.started.load(Ordering::SeqCst) {
            return Err(CoreError::ControllerStopped);
        }
        let (tx, rx) = oneshot::channel();
        self.inner
            .intent_tx
            .send(build(tx))
            .await
            .map_err(|_| CoreError::ControllerStopped)?;
        rx.await.map_err(|_| CoreError::ControllerStopped)
    }

    // ── Store passthrough ────────────────────────────────────────────

    /// Create a new alert in the shared store. Every station (this one
    /// included, once started) picks it up from the feed.
    pub async fn raise(&self, alert: NewAlert) -> Result<Alert, CoreError> {
        if alert.origin.trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "an alert needs an origin".into(),
            });
        }
        let created = self.inner.alerts.insert(alert).await?;
        info!(alert_id = %created.id, category = %created.category, "alert raised");
        Ok(created)
    }

    /// Up to `limit` alerts, newest first.
    pub async fn history(&self, limit: u32) -> Result<Vec<Alert>, CoreError> {
        self.inner.alerts.recent(limit).await
    }

    pub async fn acknowledgments(&self, alert_id: &RecordId) -> Result<Vec<Acknowledgment>, CoreError> {
        self.inner.acks.by_alert(alert_id).await
    }

    // ── State observation ────────────────────────────────────────────

    /// Subscribe to lifecycle state changes.
    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> LifecycleState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to operator notices.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }
}

// ── Runner ───────────────────────────────────────────────────────────

/// Results of spawned store calls.
enum Internal {
    AlertFeed(Result<ChangeFeed<AlertChange>, CoreError>),
    LatestActive {
        resync: bool,
        result: Result<Option<Alert>, CoreError>,
    },
    AckFeed {
        alert_id: RecordId,
        result: Result<ChangeFeed<AckChange>, CoreError>,
    },
    AcksLoaded {
        alert_id: RecordId,
        result: Result<Vec<Acknowledgment>, CoreError>,
    },
    AckSent {
        alert_id: RecordId,
        result: Result<Option<Acknowledgment>, CoreError>,
    },
    ResolveWritten {
        alert_id: RecordId,
        result: Result<(), CoreError>,
    },
}

/// Acknowledgment tracking for the displayed alert.
struct Tracker {
    alert_id: RecordId,
    cancel: CancellationToken,
    feed: Option<ChangeFeed<AckChange>>,
}

struct Runner {
    ctx: Arc<ControllerInner>,
    lifecycle: Lifecycle,
    intents: mpsc::Receiver<Intent>,
    audio_events: mpsc::UnboundedReceiver<AudioEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    alert_feed: Option<ChangeFeed<AlertChange>>,
    /// The feed reported an interruption that has not recovered yet.
    feed_down: bool,
    resubscribe: Option<Pin<Box<Sleep>>>,
    resubscribe_attempt: u32,
    tracker: Option<Tracker>,
    cancel: CancellationToken,
}

impl Runner {
    async fn run(mut self) {
        self.subscribe_alerts();
        self.query_latest_active(false);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                intent = self.intents.recv() => {
                    let Some(intent) = intent else { break };
                    self.on_intent(intent);
                }
                Some(msg) = self.internal_rx.recv() => self.on_internal(msg),
                Some(AudioEvent::Finished { token }) = self.audio_events.recv() => {
                    let result = self.lifecycle.on_audio_finished(token, self.ctx.audio.as_ref());
                    self.report_playback(result);
                }
                fired = self.lifecycle.watchdog.fired() => self.on_watchdog(fired),
                change = next(self.alert_feed.as_mut()) => self.on_alert_change(change),
                change = next(self.tracker.as_mut().and_then(|t| t.feed.as_mut())) => {
                    self.on_ack_change(change);
                }
                () = elapsed(self.resubscribe.as_mut()) => {
                    self.resubscribe = None;
                    self.subscribe_alerts();
                }
            }

            self.sync_tracker();
            self.publish();
        }

        self.lifecycle.teardown(self.ctx.audio.as_ref());
        self.sync_tracker();
        self.alert_feed = None;
        self.publish();
    }

    // ── Feed ─────────────────────────────────────────────────────────

    fn subscribe_alerts(&self) {
        let store = Arc::clone(&self.ctx.alerts);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = store.subscribe().await;
            let _ = tx.send(Internal::AlertFeed(result));
        });
    }

    fn query_latest_active(&self, resync: bool) {
        let store = Arc::clone(&self.ctx.alerts);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = store.latest_active().await;
            let _ = tx.send(Internal::LatestActive { resync, result });
        });
    }

    fn schedule_resubscribe(&mut self) {
        let policy = &self.ctx.station.resubscribe;
        if policy
            .max_retries
            .is_some_and(|max| self.resubscribe_attempt >= max)
        {
            error!(
                attempts = self.resubscribe_attempt,
                "giving up on the alert feed"
            );
            return;
        }

        let delay = calculate_backoff(self.resubscribe_attempt, policy);
        self.resubscribe_attempt = self.resubscribe_attempt.saturating_add(1);
        debug!(attempt = self.resubscribe_attempt, ?delay, "resubscribing to alert feed");
        self.resubscribe = Some(Box::pin(tokio::time::sleep(delay)));
    }

    fn feed_interrupted(&mut self) {
        if !self.feed_down {
            self.feed_down = true;
            self.notify(Notice::FeedInterrupted);
        }
    }

    fn feed_restored(&mut self) {
        if self.feed_down {
            self.feed_down = false;
            self.notify(Notice::FeedRestored);
        }
    }

    fn on_alert_change(&mut self, change: Option<AlertChange>) {
        let Some(change) = change else {
            warn!("alert feed closed");
            self.alert_feed = None;
            self.feed_interrupted();
            self.schedule_resubscribe();
            return;
        };

        match change {
            AlertChange::Inserted(alert) => {
                let outcome = self.consider(alert);
                debug!(%outcome, "feed insert");
            }
            AlertChange::Updated(alert) => {
                if alert.status == AlertStatus::Resolved
                    && self.lifecycle.on_resolved(&alert.id, self.ctx.audio.as_ref())
                {
                    info!(alert_id = %alert.id, "alert resolved");
                }
            }
            AlertChange::Resync => {
                self.feed_restored();
                self.query_latest_active(true);
            }
            AlertChange::Interrupted => self.feed_interrupted(),
        }
    }

    /// Apply the race policy, then try to activate.
    fn consider(&mut self, alert: Alert) -> Activation {
        if !self.lifecycle.admits(&alert, self.ctx.station.race) {
            debug!(alert_id = %alert.id, "holding current alert");
            return Activation::Held;
        }

        let now = self.ctx.clock.now();
        let outcome = self.lifecycle.activate(alert, now, self.ctx.audio.as_ref());
        if outcome == Activation::Activated {
            self.sync_tracker();
            let result = self.lifecycle.start_chain(self.ctx.audio.as_ref());
            self.report_playback(result);
        }
        outcome
    }

    // ── Store results ────────────────────────────────────────────────

    fn on_internal(&mut self, msg: Internal) {
        match msg {
            Internal::AlertFeed(Ok(feed)) => {
                let recovering = self.resubscribe_attempt > 0;
                self.alert_feed = Some(feed);
                self.resubscribe_attempt = 0;
                if recovering {
                    info!("alert feed re-acquired");
                    self.feed_restored();
                    self.query_latest_active(true);
                }
            }
            Internal::AlertFeed(Err(e)) => {
                warn!(error = %e, "alert feed subscription failed");
                self.store_error("subscribe", &e);
                self.feed_interrupted();
                self.schedule_resubscribe();
            }
            Internal::LatestActive { resync, result } => self.on_latest_active(resync, result),
            Internal::AckFeed { alert_id, result } => {
                let Some(tracker) = self.tracker.as_mut().filter(|t| t.alert_id == alert_id) else {
                    return;
                };
                match result {
                    Ok(feed) => tracker.feed = Some(feed),
                    Err(e) => {
                        warn!(%alert_id, error = %e, "acknowledgment feed unavailable");
                        self.store_error("acknowledgment feed", &e);
                    }
                }
            }
            Internal::AcksLoaded { alert_id, result } => match result {
                Ok(acks) => {
                    self.lifecycle.merge_acks(&alert_id, acks);
                }
                Err(e) => {
                    warn!(%alert_id, error = %e, "acknowledgment query failed");
                }
            },
            Internal::AckSent { alert_id, result } => match result {
                Ok(Some(ack)) => {
                    info!(%alert_id, ack_id = %ack.id, "acknowledged");
                    self.notify(Notice::Acknowledged { alert_id });
                }
                Ok(None) => debug!(%alert_id, "already acknowledged by this station"),
                Err(e) => {
                    warn!(%alert_id, error = %e, "acknowledgment write failed");
                    self.store_error("acknowledge", &e);
                }
            },
            Internal::ResolveWritten { alert_id, result } => {
                match result {
                    Ok(()) => info!(%alert_id, "alert resolved in store"),
                    Err(e) => {
                        warn!(%alert_id, error = %e, "resolve write failed");
                        self.notify(Notice::ResolveFailed {
                            alert_id: alert_id.clone(),
                            message: e.to_string(),
                        });
                    }
                }
                self.lifecycle
                    .finish_resolve(&alert_id, self.ctx.audio.as_ref());
            }
        }
    }

    /// Startup (or resync) query for the most recent active alert.
    ///
    /// On resync the displayed alert is dropped when the store no longer
    /// lists it as the newest active one: it was resolved while the feed
    /// was down.
    fn on_latest_active(&mut self, resync: bool, result: Result<Option<Alert>, CoreError>) {
        let latest = match result {
            Ok(latest) => latest,
            Err(e) => {
                warn!(error = %e, "latest active alert query failed");
                self.store_error("latest active query", &e);
                return;
            }
        };

        if resync {
            let missed = self.lifecycle.displayed_alert().and_then(|shown| {
                let superseded = latest
                    .as_ref()
                    .is_none_or(|l| l.id != shown.id && l.created_at < shown.created_at);
                superseded.then(|| shown.id.clone())
            });
            if let Some(id) = missed {
                info!(alert_id = %id, "alert resolved while the feed was down");
                self.lifecycle.on_resolved(&id, self.ctx.audio.as_ref());
            }
        }

        if let Some(alert) = latest {
            let outcome = self.consider(alert);
            debug!(%outcome, resync, "latest active alert");
        }
    }

    // ── Deadline ─────────────────────────────────────────────────────

    fn on_watchdog(&mut self, fired: Fired) {
        let now = self.ctx.clock.now();
        let due = self.lifecycle.refresh_remaining(now);
        let resolve = match fired {
            Fired::Timer => true,
            Fired::Tick => due,
        };
        if resolve && self.lifecycle.claim_auto_resolve() {
            self.resolve("expired");
        }
    }

    /// Enter RESOLVING and write `resolved` in the background.
    fn resolve(&mut self, reason: &'static str) {
        let Some(alert_id) = self.lifecycle.begin_resolve(self.ctx.audio.as_ref()) else {
            return;
        };
        info!(%alert_id, reason, "resolving alert");

        let store = Arc::clone(&self.ctx.alerts);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = store.update_status(&alert_id, AlertStatus::Resolved).await;
            let _ = tx.send(Internal::ResolveWritten { alert_id, result });
        });
    }

    // ── Intents ──────────────────────────────────────────────────────

    fn on_intent(&mut self, intent: Intent) {
        match intent {
            Intent::ManualStop(reply) => {
                let outcome = match self.ctx.station.manual_stop {
                    ManualStopPolicy::LocalOnly => {
                        self.lifecycle.dismiss_local(self.ctx.audio.as_ref())
                    }
                    ManualStopPolicy::Global => {
                        if self.lifecycle.active_id().is_some() {
                            self.resolve("manual stop");
                            StopOutcome::Resolving
                        } else {
                            StopOutcome::NothingActive
                        }
                    }
                };
                info!(%outcome, policy = %self.ctx.station.manual_stop, "manual stop");
                let _ = reply.send(outcome);
            }
            Intent::EnableAudio(reply) => {
                let result = self.lifecycle.enable_audio(self.ctx.audio.as_ref());
                let restarted = matches!(result, Ok(true));
                self.report_playback(result.map(|_| ()));
                let _ = reply.send(restarted);
            }
            Intent::Activate(alert, reply) => {
                let outcome = self.consider(*alert);
                let _ = reply.send(outcome);
            }
            Intent::SetReceiverClip(clip, reply) => {
                let result = self
                    .lifecycle
                    .set_receiver_clip(clip, self.ctx.audio.as_ref());
                self.report_playback(result.map(|_| ()));
                let _ = reply.send(());
            }
        }
    }

    // ── Acknowledgments ──────────────────────────────────────────────

    fn on_ack_change(&mut self, change: Option<AckChange>) {
        match change {
            Some(AckChange::Inserted(ack)) => {
                debug!(alert_id = %ack.alert_id, receiver = %ack.receiver_id, "acknowledgment received");
                self.lifecycle.append_ack(ack);
            }
            Some(AckChange::Resync) => {
                if let Some(tracker) = &self.tracker {
                    load_acks(&self.ctx.acks, tracker.alert_id.clone(), &self.internal_tx);
                }
            }
            None => {
                if let Some(tracker) = self.tracker.as_mut() {
                    warn!(alert_id = %tracker.alert_id, "acknowledgment feed closed");
                    tracker.feed = None;
                }
            }
        }
    }

    /// Keep exactly one tracker, bound to the displayed alert.
    fn sync_tracker(&mut self) {
        let active = self.lifecycle.active_id();
        if self.tracker.as_ref().map(|t| &t.alert_id) == active {
            return;
        }
        let active = active.cloned();

        if let Some(old) = self.tracker.take() {
            old.cancel.cancel();
            debug!(alert_id = %old.alert_id, "acknowledgment tracking stopped");
        }
        if let Some(alert_id) = active {
            self.tracker = Some(self.spawn_tracker(alert_id));
        }
    }

    fn spawn_tracker(&self, alert_id: RecordId) -> Tracker {
        let cancel = self.cancel.child_token();
        let acks = Arc::clone(&self.ctx.acks);
        let receiver = self.ctx.station.receiver.clone();
        let tx = self.internal_tx.clone();
        let task_cancel = cancel.clone();
        let id = alert_id.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = task_cancel.cancelled() => {}
                () = track(acks, id, receiver, tx) => {}
            }
        });

        debug!(%alert_id, "acknowledgment tracking started");
        Tracker {
            alert_id,
            cancel,
            feed: None,
        }
    }

    // ── Output ───────────────────────────────────────────────────────

    fn report_playback(&self, result: Result<(), PlaybackError>) {
        match result {
            Ok(()) => {}
            Err(PlaybackError::Blocked) => {
                if let Some(alert_id) = self.lifecycle.active_id().cloned() {
                    warn!(%alert_id, "audio blocked until enabled");
                    self.notify(Notice::AudioBlocked { alert_id });
                }
            }
            Err(PlaybackError::Failed(message)) => {
                warn!(%message, "audio playback failed");
                self.notify(Notice::PlaybackFailed { message });
            }
        }
    }

    fn store_error(&self, operation: &'static str, error: &CoreError) {
        self.notify(Notice::StoreError {
            operation,
            message: error.to_string(),
        });
    }

    fn notify(&self, notice: Notice) {
        let _ = self.ctx.notices.send(notice);
    }

    fn publish(&self) {
        let view = self.lifecycle.view();
        self.ctx.state.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

/// Subscribe, load the existing list, then acknowledge once.
///
/// Subscribing first means an acknowledgment inserted between the query
/// and the subscription is never missed.
async fn track(
    acks: Arc<dyn AckStore>,
    alert_id: RecordId,
    receiver: ReceiverIdentity,
    tx: mpsc::UnboundedSender<Internal>,
) {
    let result = acks.subscribe(&alert_id).await;
    let _ = tx.send(Internal::AckFeed {
        alert_id: alert_id.clone(),
        result,
    });

    let result = acks.by_alert(&alert_id).await;
    let _ = tx.send(Internal::AcksLoaded {
        alert_id: alert_id.clone(),
        result,
    });

    let result = acknowledge(acks.as_ref(), &alert_id, &receiver).await;
    let _ = tx.send(Internal::AckSent { alert_id, result });
}

/// Check-then-insert this station's acknowledgment. Two stations racing
/// here may both insert; that is tolerated.
async fn acknowledge(
    acks: &dyn AckStore,
    alert_id: &RecordId,
    receiver: &ReceiverIdentity,
) -> Result<Option<Acknowledgment>, CoreError> {
    let existing = acks.by_alert_and_receiver(alert_id, &receiver.id).await?;
    if !existing.is_empty() {
        return Ok(None);
    }

    acks.insert(NewAcknowledgment {
        alert_id: alert_id.clone(),
        receiver_id: receiver.id.clone(),
        receiver_label: receiver.label.clone(),
    })
    .await
    .map(Some)
}

fn load_acks(acks: &Arc<dyn AckStore>, alert_id: RecordId, tx: &mpsc::UnboundedSender<Internal>) {
    let acks = Arc::clone(acks);
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = acks.by_alert(&alert_id).await;
        let _ = tx.send(Internal::AcksLoaded { alert_id, result });
    });
}

/// Next item of an optional feed; pending forever when there is none.
async fn next<T>(feed: Option<&mut ChangeFeed<T>>) -> Option<T> {
    match feed {
        Some(feed) => feed.recv().await,
        None => pending().await,
    }
}

/// Completes when the optional sleep does; pending forever when unset.
async fn elapsed(sleep: Option<&mut Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
