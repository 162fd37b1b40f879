// Shared fixtures for controller tests: a recording audio output and a
// harness wiring a controller to an in-memory store on paused time.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::broadcast;

use redcode_core::{
    Alert, AlarmController, AlertCategory, AlertStatus, AudioChannel, AudioOutput, Clock,
    CompletionHandle, LifecycleState, MemoryStore, Notice, PlaybackError, ReceiverIdentity,
    RecordId, StationConfig, TokioClock,
};

/// Wall time the paused clock starts at.
pub fn t0() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_763_626_500, 0).unwrap()
}

/// Let every spawned task run to quiescence. Advances paused time by 1ms.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ── Audio ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingAudio {
    plays: Mutex<Vec<(AudioChannel, String)>>,
    pending: Mutex<Vec<CompletionHandle>>,
    stops: Mutex<usize>,
    blocked: AtomicBool,
}

impl RecordingAudio {
    pub fn plays(&self) -> Vec<(AudioChannel, String)> {
        self.plays.lock().unwrap().clone()
    }

    pub fn play_count(&self) -> usize {
        self.plays.lock().unwrap().len()
    }

    pub fn stop_count(&self) -> usize {
        *self.stops.lock().unwrap()
    }

    /// Refuse playback until `allow` is called.
    pub fn block(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    /// Complete the most recently started clip.
    pub fn finish_current(&self) {
        let handle = self.pending.lock().unwrap().pop().unwrap();
        handle.finish();
    }
}

impl AudioOutput for RecordingAudio {
    fn play(
        &self,
        channel: AudioChannel,
        locator: &str,
        done: CompletionHandle,
    ) -> Result<(), PlaybackError> {
        if self.blocked.load(Ordering::SeqCst) {
            return Err(PlaybackError::Blocked);
        }
        self.plays.lock().unwrap().push((channel, locator.to_owned()));
        self.pending.lock().unwrap().push(done);
        Ok(())
    }

    fn stop(&self, _channel: AudioChannel) {
        *self.stops.lock().unwrap() += 1;
        self.pending.lock().unwrap().clear();
    }

    fn allow(&self) {
        self.blocked.store(false, Ordering::SeqCst);
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub struct Station {
    pub controller: AlarmController,
    pub audio: Arc<RecordingAudio>,
    pub notices: broadcast::Receiver<Notice>,
}

impl Station {
    pub fn state(&self) -> LifecycleState {
        self.controller.snapshot()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            out.push(notice);
        }
        out
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<TokioClock>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let store = MemoryStore::with_clock(Arc::clone(&clock) as Arc<dyn Clock>);
        Self { store, clock }
    }

    pub fn station_config(id: &str) -> StationConfig {
        StationConfig::new(ReceiverIdentity::new(id).with_label(id.to_uppercase()))
    }

    /// A started controller for `config`.
    pub async fn station(&self, config: StationConfig) -> Station {
        let audio = Arc::new(RecordingAudio::default());
        let store = Arc::new(self.store.clone());
        let controller = AlarmController::new(
            config,
            store.clone(),
            store,
            Arc::clone(&audio) as Arc<dyn AudioOutput>,
            Arc::clone(&self.clock) as Arc<dyn Clock>,
        );
        let notices = controller.notices();
        controller.start().await.unwrap();
        settle().await;
        Station {
            controller,
            audio,
            notices,
        }
    }

    /// Store an active alert created `age` ago, without feed delivery.
    pub fn seed_active(&self, id: i64, category: AlertCategory, age: Duration) -> Alert {
        let alert = Alert {
            id: RecordId::Number(id),
            message: category.label().to_owned(),
            category,
            origin: "Emergency".into(),
            status: AlertStatus::Active,
            created_at: self.clock.now() - TimeDelta::from_std(age).unwrap(),
            sender_id: Some("sender-1".into()),
        };
        self.store.seed_alert(alert.clone());
        alert
    }
}
