// ── Alarm lifecycle state ──
//
// The single "currently displayed alert" slot of one station, plus the
// audio chain and expiry watchdogs bound to it. Everything here is
// synchronous: the controller task owns one `Lifecycle` and feeds it
// store results, feed changes, timer events and user intents.

pub mod deadline;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::audio::{AudioChain, AudioEvent, AudioOutput, ChainState, PlaybackError};
use crate::config::{RacePolicy, StationConfig};
use crate::model::{Acknowledgment, Alert, RecordId};
use crate::sound::SoundResolver;

pub use deadline::remaining;
pub(crate) use deadline::{Fired, Watchdog};

// ── Presentation state ───────────────────────────────────────────────

/// What a presentation surface renders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Nothing displayed.
    #[default]
    Idle,
    /// An alert is sounding and counting down.
    Active(ActiveView),
    /// The alert was silenced on this station only. It still counts down
    /// and will auto-resolve.
    Dismissed {
        alert_id: RecordId,
        remaining: Duration,
    },
    /// The deadline passed or a global stop was issued; audio and
    /// watchdogs are stopped and the resolve write is in flight.
    Resolving { alert_id: RecordId },
}

/// The displayed alert with its countdown and acknowledgments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveView {
    pub alert: Alert,
    pub remaining: Duration,
    pub acks: Vec<Acknowledgment>,
    /// `false` after the platform refused to start audio.
    pub audio_permitted: bool,
    pub chain: ChainState,
}

impl LifecycleState {
    pub fn alert_id(&self) -> Option<&RecordId> {
        match self {
            Self::Idle => None,
            Self::Dismissed { alert_id, .. }
            | Self::Resolving { alert_id } => Some(alert_id),
            Self::Active(view) => Some(&view.alert.id),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn as_active(&self) -> Option<&ActiveView> {
        match self {
            Self::Active(view) => Some(view),
            _ => None,
        }
    }
}

/// Result of an activation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Activation {
    /// The alert is now displayed.
    Activated,
    /// The alert was already displayed; nothing changed.
    AlreadyActive,
    /// The alert is past its expiry window and was skipped.
    Stale,
    /// The alert is not in `active` status.
    NotActive,
    /// The race policy kept the currently displayed alert.
    Held,
}

/// Result of a manual stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StopOutcome {
    /// Silenced on this station; shared state untouched.
    Dismissed,
    /// Resolve written (or being written) to the store.
    Resolving,
    NothingActive,
}

// ── Local lifecycle state ────────────────────────────────────────────

#[derive(Debug)]
struct Displayed {
    alert: Alert,
    /// Append-only while displayed.
    acks: Vec<Acknowledgment>,
    remaining: Duration,
    /// Single-use guard shared by the timer and the tick.
    auto_resolved: bool,
    dismissed: bool,
    /// A resolve write for this alert is in flight.
    resolving: bool,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    expiry: Duration,
    tick: Duration,
    sounds: SoundResolver,
    receiver_clip: Option<String>,
    displayed: Option<Displayed>,
    audio_permitted: bool,
    chain: AudioChain,
    pub(crate) watchdog: Watchdog,
}

impl Lifecycle {
    pub(crate) fn new(station: &StationConfig, audio_events: mpsc::UnboundedSender<AudioEvent>) -> Self {
        Self {
            expiry: station.expiry,
            tick: station.tick,
            sounds: station.sounds.clone(),
            receiver_clip: station.receiver.clip.clone(),
            displayed: None,
            audio_permitted: true,
            chain: AudioChain::new(audio_events),
            watchdog: Watchdog::default(),
        }
    }

    pub(crate) fn active_id(&self) -> Option<&RecordId> {
        self.displayed.as_ref().map(|d| &d.alert.id)
    }

    pub(crate) fn displayed_alert(&self) -> Option<&Alert> {
        self.displayed.as_ref().map(|d| &d.alert)
    }

    /// Whether a feed INSERT (or the startup query) may activate `alert`.
    pub(crate) fn admits(&self, alert: &Alert, policy: RacePolicy) -> bool {
        let Some(current) = &self.displayed else {
            return true;
        };
        if current.alert.id == alert.id {
            return true;
        }
        match policy {
            RacePolicy::PreferNewest => alert.created_at >= current.alert.created_at,
            RacePolicy::HoldCurrent => false,
        }
    }

    /// Display `alert` unless it is already displayed, resolved or stale.
    ///
    /// A successful activation supersedes whatever was displayed, arms the
    /// watchdogs for the remaining time and leaves the audio chain idle;
    /// call [`start_chain`](Self::start_chain) next.
    pub(crate) fn activate(
        &mut self,
        alert: Alert,
        now: DateTime<Utc>,
        audio: &dyn AudioOutput,
    ) -> Activation {
        if !alert.is_active() {
            return Activation::NotActive;
        }
        if self.active_id() == Some(&alert.id) {
            return Activation::AlreadyActive;
        }

        let left = remaining(self.expiry, alert.created_at, now);
        if left.is_zero() {
            tracing::debug!(alert_id = %alert.id, "skipping stale alert");
            return Activation::Stale;
        }

        self.teardown(audio);
        self.watchdog.arm(left, self.tick);
        tracing::info!(
            alert_id = %alert.id,
            category = %alert.category,
            remaining_ms = u64::try_from(left.as_millis()).unwrap_or(u64::MAX),
            "alert activated"
        );
        self.displayed = Some(Displayed {
            alert,
            acks: Vec::new(),
            remaining: left,
            auto_resolved: false,
            dismissed: false,
            resolving: false,
        });
        Activation::Activated
    }

    /// Start the audio chain for the displayed alert from the primary clip.
    ///
    /// Does nothing while audio is not permitted or the alert is silenced.
    /// A blocked start clears `audio_permitted`.
    pub(crate) fn start_chain(&mut self, audio: &dyn AudioOutput) -> Result<(), PlaybackError> {
        let Some(displayed) = &self.displayed else {
            return Ok(());
        };
        if !self.audio_permitted || displayed.dismissed || displayed.resolving {
            return Ok(());
        }

        let primary = self.sounds.resolve(&displayed.alert.category).to_owned();
        let result = self
            .chain
            .start(audio, &primary, self.receiver_clip.as_deref());
        if result == Err(PlaybackError::Blocked) {
            self.audio_permitted = false;
        }
        result
    }

    pub(crate) fn on_audio_finished(
        &mut self,
        token: u64,
        audio: &dyn AudioOutput,
    ) -> Result<(), PlaybackError> {
        let result = self.chain.on_finished(audio, token);
        if result == Err(PlaybackError::Blocked) {
            self.audio_permitted = false;
        }
        result
    }

    /// Clear the displayed alert, its acknowledgments, the watchdogs and
    /// the audio chain. Idempotent.
    pub(crate) fn teardown(&mut self, audio: &dyn AudioOutput) {
        self.chain.stop(audio);
        self.watchdog.disarm();
        if let Some(previous) = self.displayed.take() {
            tracing::debug!(alert_id = %previous.alert.id, "alert torn down");
        }
        self.audio_permitted = true;
    }

    // ── Deadline ─────────────────────────────────────────────────────

    /// Recompute the remaining time from the creation timestamp.
    /// Returns `true` when the deadline has been reached.
    pub(crate) fn refresh_remaining(&mut self, now: DateTime<Utc>) -> bool {
        let Some(displayed) = self.displayed.as_mut() else {
            return false;
        };
        displayed.remaining = remaining(self.expiry, displayed.alert.created_at, now);
        displayed.remaining.is_zero()
    }

    /// Take the single-use auto-resolve guard. `true` exactly once per
    /// displayed alert.
    pub(crate) fn claim_auto_resolve(&mut self) -> bool {
        match self.displayed.as_mut() {
            Some(displayed) if !displayed.auto_resolved => {
                displayed.auto_resolved = true;
                true
            }
            _ => false,
        }
    }

    /// Enter RESOLVING: silence the chain and disarm the watchdogs, keeping
    /// the alert displayed until the write settles. Returns the id to
    /// write, or `None` when nothing is displayed or a write is already in
    /// flight.
    pub(crate) fn begin_resolve(&mut self, audio: &dyn AudioOutput) -> Option<RecordId> {
        let displayed = self.displayed.as_mut()?;
        if displayed.resolving {
            return None;
        }
        displayed.resolving = true;
        let id = displayed.alert.id.clone();
        self.chain.stop(audio);
        self.watchdog.disarm();
        Some(id)
    }

    /// The resolve write for `id` settled, successfully or not. Tears down
    /// if that alert is still the one displayed.
    pub(crate) fn finish_resolve(&mut self, id: &RecordId, audio: &dyn AudioOutput) -> bool {
        let resolving = self
            .displayed
            .as_ref()
            .is_some_and(|d| d.resolving && &d.alert.id == id);
        if resolving {
            self.teardown(audio);
        }
        resolving
    }

    /// The store reports `id` resolved. Returns `true` if it was displayed.
    pub(crate) fn on_resolved(&mut self, id: &RecordId, audio: &dyn AudioOutput) -> bool {
        if self.active_id() == Some(id) {
            self.teardown(audio);
            true
        } else {
            false
        }
    }

    // ── User intents ─────────────────────────────────────────────────

    /// Silence and hide the displayed alert on this station only.
    /// The watchdogs and acknowledgment tracking continue.
    pub(crate) fn dismiss_local(&mut self, audio: &dyn AudioOutput) -> StopOutcome {
        let Some(displayed) = self.displayed.as_mut() else {
            return StopOutcome::NothingActive;
        };
        if displayed.resolving {
            return StopOutcome::Resolving;
        }
        displayed.dismissed = true;
        self.chain.stop(audio);
        StopOutcome::Dismissed
    }

    /// Record a user permission to play audio and resume the chain.
    /// Returns `true` if the chain was restarted.
    pub(crate) fn enable_audio(&mut self, audio: &dyn AudioOutput) -> Result<bool, PlaybackError> {
        audio.allow();
        self.audio_permitted = true;
        if self.is_audible() {
            self.start_chain(audio).map(|()| true)
        } else {
            Ok(false)
        }
    }

    /// Install (or clear) this station's receiver clip. While an alert is
    /// sounding a new clip restarts the chain from the primary clip.
    pub(crate) fn set_receiver_clip(
        &mut self,
        clip: Option<String>,
        audio: &dyn AudioOutput,
    ) -> Result<bool, PlaybackError> {
        let restart = clip.is_some() && self.audio_permitted && self.is_audible();
        self.receiver_clip = clip;
        if restart {
            self.start_chain(audio).map(|()| true)
        } else {
            Ok(false)
        }
    }

    fn is_audible(&self) -> bool {
        self.displayed
            .as_ref()
            .is_some_and(|d| !d.dismissed && !d.resolving)
    }

    // ── Acknowledgments ──────────────────────────────────────────────

    /// Append one acknowledgment from the feed. No dedup.
    pub(crate) fn append_ack(&mut self, ack: Acknowledgment) -> bool {
        match self.displayed.as_mut() {
            Some(displayed) if displayed.alert.id == ack.alert_id => {
                displayed.acks.push(ack);
                true
            }
            _ => false,
        }
    }

    /// Fold the initial acknowledgment query into the list.
    ///
    /// Rows already delivered by the feed are not added twice, and nothing
    /// already in the list is removed.
    pub(crate) fn merge_acks(&mut self, alert_id: &RecordId, acks: Vec<Acknowledgment>) -> bool {
        let Some(displayed) = self.displayed.as_mut() else {
            return false;
        };
        if &displayed.alert.id != alert_id {
            return false;
        }
        for ack in acks {
            if !displayed.acks.iter().any(|a| a.id == ack.id) {
                displayed.acks.push(ack);
            }
        }
        displayed.acks.sort_by_key(|a| a.created_at);
        true
    }

    // ── View ─────────────────────────────────────────────────────────

    pub(crate) fn view(&self) -> LifecycleState {
        match &self.displayed {
            None => LifecycleState::Idle,
            Some(d) if d.resolving => LifecycleState::Resolving {
                alert_id: d.alert.id.clone(),
            },
            Some(d) if d.dismissed => LifecycleState::Dismissed {
                alert_id: d.alert.id.clone(),
                remaining: d.remaining,
            },
            Some(d) => LifecycleState::Active(ActiveView {
                alert: d.alert.clone(),
                remaining: d.remaining,
                acks: d.acks.clone(),
                audio_permitted: self.audio_permitted,
                chain: self.chain.state(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::audio::{AudioChannel, CompletionHandle};
    use crate::config::ReceiverIdentity;
    use crate::model::{AlertCategory, AlertStatus};

    #[derive(Default)]
    struct Recorder {
        plays: Mutex<Vec<(AudioChannel, String)>>,
        blocked: Mutex<bool>,
    }

    impl AudioOutput for Recorder {
        fn play(
            &self,
            channel: AudioChannel,
            locator: &str,
            _done: CompletionHandle,
        ) -> Result<(), PlaybackError> {
            if *self.blocked.lock().unwrap() {
                return Err(PlaybackError::Blocked);
            }
            self.plays.lock().unwrap().push((channel, locator.to_owned()));
            Ok(())
        }

        fn stop(&self, _channel: AudioChannel) {}

        fn allow(&self) {
            *self.blocked.lock().unwrap() = false;
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn alert(id: i64, created_at: DateTime<Utc>) -> Alert {
        Alert {
            id: RecordId::Number(id),
            category: AlertCategory::Fire,
            origin: "Kitchen".into(),
            message: "Fire".into(),
            status: AlertStatus::Active,
            created_at,
            sender_id: None,
        }
    }

    fn ack(id: i64, alert_id: i64, secs: i64) -> Acknowledgment {
        Acknowledgment {
            id: RecordId::Number(id),
            alert_id: RecordId::Number(alert_id),
            receiver_id: format!("station-{id}"),
            receiver_label: None,
            created_at: t0() + TimeDelta::seconds(secs),
        }
    }

    fn lifecycle() -> Lifecycle {
        let (tx, _rx) = mpsc::unbounded_channel();
        Lifecycle::new(&StationConfig::new(ReceiverIdentity::new("me")), tx)
    }

    #[tokio::test(start_paused = true)]
    async fn activation_computes_remaining_from_age() {
        let audio = Recorder::default();
        let mut lc = lifecycle();

        let outcome = lc.activate(alert(1, t0()), t0() + TimeDelta::seconds(10), &audio);
        assert_eq!(outcome, Activation::Activated);
        let view = lc.view();
        assert_eq!(view.as_active().unwrap().remaining, Duration::from_secs(50));
        assert!(lc.watchdog.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_alert_is_skipped_without_side_effects() {
        let audio = Recorder::default();
        let mut lc = lifecycle();

        let outcome = lc.activate(alert(1, t0()), t0() + TimeDelta::seconds(60), &audio);
        assert_eq!(outcome, Activation::Stale);
        assert_eq!(lc.view(), LifecycleState::Idle);
        assert!(!lc.watchdog.is_armed());
        lc.start_chain(&audio).unwrap();
        assert!(audio.plays.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_alert_does_not_disturb_current() {
        let audio = Recorder::default();
        let mut lc = lifecycle();

        lc.activate(alert(1, t0()), t0(), &audio);
        let outcome = lc.activate(alert(2, t0() - TimeDelta::seconds(90)), t0(), &audio);
        assert_eq!(outcome, Activation::Stale);
        assert_eq!(lc.active_id(), Some(&RecordId::Number(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn second_activation_is_a_no_op() {
        let audio = Recorder::default();
        let mut lc = lifecycle();

        lc.activate(alert(1, t0()), t0(), &audio);
        lc.start_chain(&audio).unwrap();
        let again = lc.activate(alert(1, t0()), t0() + TimeDelta::seconds(5), &audio);

        assert_eq!(again, Activation::AlreadyActive);
        assert_eq!(audio.plays.lock().unwrap().len(), 1);
        assert_eq!(lc.view().as_active().unwrap().remaining, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn resolved_alert_never_activates() {
        let audio = Recorder::default();
        let mut lc = lifecycle();
        let mut resolved = alert(1, t0());
        resolved.status = AlertStatus::Resolved;

        assert_eq!(lc.activate(resolved, t0(), &audio), Activation::NotActive);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_twice_equals_once() {
        let audio = Recorder::default();
        let mut lc = lifecycle();

        lc.activate(alert(1, t0()), t0(), &audio);
        lc.teardown(&audio);
        let once = lc.view();
        lc.teardown(&audio);

        assert_eq!(once, LifecycleState::Idle);
        assert_eq!(lc.view(), once);
        assert!(!lc.watchdog.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn race_policy_decides_admission() {
        let audio = Recorder::default();
        let mut lc = lifecycle();
        lc.activate(alert(1, t0()), t0(), &audio);

        let newer = alert(2, t0() + TimeDelta::seconds(1));
        let older = alert(3, t0() - TimeDelta::seconds(1));
        assert!(lc.admits(&newer, RacePolicy::PreferNewest));
        assert!(!lc.admits(&older, RacePolicy::PreferNewest));
        assert!(!lc.admits(&newer, RacePolicy::HoldCurrent));
        assert!(lc.admits(&alert(1, t0()), RacePolicy::HoldCurrent));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_resolve_guard_is_single_use() {
        let audio = Recorder::default();
        let mut lc = lifecycle();
        lc.activate(alert(1, t0()), t0(), &audio);

        assert!(lc.claim_auto_resolve());
        assert!(!lc.claim_auto_resolve());
        assert_eq!(lc.begin_resolve(&audio), Some(RecordId::Number(1)));
        assert_eq!(
            lc.view(),
            LifecycleState::Resolving {
                alert_id: RecordId::Number(1)
            }
        );
        assert!(!lc.watchdog.is_armed());
        assert_eq!(lc.begin_resolve(&audio), None);
        assert_eq!(lc.dismiss_local(&audio), StopOutcome::Resolving);

        assert!(!lc.finish_resolve(&RecordId::Number(2), &audio));
        assert!(lc.finish_resolve(&RecordId::Number(1), &audio));
        assert_eq!(lc.view(), LifecycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn ack_list_never_shrinks() {
        let audio = Recorder::default();
        let mut lc = lifecycle();
        lc.activate(alert(1, t0()), t0(), &audio);

        assert!(lc.append_ack(ack(10, 1, 3)));
        assert!(lc.append_ack(ack(11, 1, 4)));
        assert!(!lc.append_ack(ack(12, 2, 4)));

        // The bootstrap query misses the feed-delivered rows.
        assert!(lc.merge_acks(&RecordId::Number(1), vec![ack(9, 1, 1), ack(10, 1, 3)]));

        let ids: Vec<RecordId> = lc
            .view()
            .as_active()
            .unwrap()
            .acks
            .iter()
            .map(|a| a.id.clone())
            .collect();
        assert_eq!(
            ids,
            vec![RecordId::Number(9), RecordId::Number(10), RecordId::Number(11)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_feed_acks_are_both_kept() {
        let audio = Recorder::default();
        let mut lc = lifecycle();
        lc.activate(alert(1, t0()), t0(), &audio);

        let mut first = ack(20, 1, 2);
        let mut second = ack(21, 1, 2);
        first.receiver_id = "ward-b".into();
        second.receiver_id = "ward-b".into();
        lc.append_ack(first);
        lc.append_ack(second);

        assert_eq!(lc.view().as_active().unwrap().acks.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn local_dismiss_keeps_watchdogs() {
        let audio = Recorder::default();
        let mut lc = lifecycle();
        lc.activate(alert(1, t0()), t0(), &audio);
        lc.start_chain(&audio).unwrap();

        assert_eq!(lc.dismiss_local(&audio), StopOutcome::Dismissed);
        assert!(lc.watchdog.is_armed());
        assert!(matches!(lc.view(), LifecycleState::Dismissed { .. }));
        assert!(lc.claim_auto_resolve());
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_audio_resumes_after_enable() {
        let audio = Recorder::default();
        *audio.blocked.lock().unwrap() = true;
        let mut lc = lifecycle();
        lc.activate(alert(1, t0()), t0(), &audio);

        assert_eq!(lc.start_chain(&audio), Err(PlaybackError::Blocked));
        assert!(!lc.view().as_active().unwrap().audio_permitted);

        assert_eq!(lc.enable_audio(&audio), Ok(true));
        let view = lc.view();
        let active = view.as_active().unwrap();
        assert!(active.audio_permitted);
        assert_eq!(active.chain, ChainState::PlayingPrimary);
    }

    #[tokio::test(start_paused = true)]
    async fn late_receiver_clip_restarts_chain() {
        let audio = Recorder::default();
        let mut lc = lifecycle();
        lc.activate(alert(1, t0()), t0(), &audio);
        lc.start_chain(&audio).unwrap();

        assert_eq!(lc.set_receiver_clip(Some("icu.mp3".into()), &audio), Ok(true));
        let plays = audio.plays.lock().unwrap().clone();
        assert_eq!(plays.len(), 2);
        assert!(plays.iter().all(|(channel, _)| *channel == AudioChannel::Primary));
    }
}
