//! Alert lifecycle state machine between `redcode-api` and presentation
//! surfaces (CLI watch mode, drills).
//!
//! Every connected station runs one of these independently; the only
//! coordination between stations is the shared store and its change feed.
//!
//! - **[`AlarmController`]**: owns the station's single "currently displayed
//!   alert" slot. [`start()`](AlarmController::start) subscribes to the alert
//!   feed and queries the latest active alert; from then on it activates
//!   incoming alerts, sequences audio, counts down to expiry and resolves.
//!   State is published on a `watch` channel as [`LifecycleState`].
//!
//! - **Acknowledgment tracking**: on activation the controller subscribes to
//!   the alert's acknowledgment feed, loads the existing list and writes one
//!   acknowledgment for the local receiver (check-then-insert).
//!
//! - **[`AlertStore`] / [`AckStore`]**: the store seam. [`RemoteStore`] talks
//!   PostgREST and Realtime; [`MemoryStore`] runs in-process.
//!
//! - **[`AudioChain`]** and [`SoundResolver`]: primary clip, then receiver
//!   clip, then primary again, over any [`AudioOutput`].
//!
//! - **Domain model** ([`model`]): [`Alert`], [`Acknowledgment`] and
//!   [`RecordId`], which accepts numeric, UUID and text identifiers.

pub mod audio;
pub mod clock;
pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod sound;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use audio::{
    AudioChain, AudioChannel, AudioEvent, AudioOutput, ChainState, CompletionHandle, PlaybackError,
};
pub use clock::{Clock, SystemClock, TokioClock};
pub use config::{
    DEFAULT_EXPIRY, DEFAULT_TICK, ManualStopPolicy, RacePolicy, ReceiverIdentity, StationConfig,
    StoreConfig, TlsVerification,
};
pub use controller::{AlarmController, Notice};
pub use error::CoreError;
pub use lifecycle::{Activation, ActiveView, LifecycleState, StopOutcome, remaining};
pub use sound::SoundResolver;
pub use store::{
    AckChange, AckStore, AlertChange, AlertStore, ChangeFeed, MemoryStore, RemoteStore,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Acknowledgment, Alert, AlertCategory, AlertStatus, NewAcknowledgment, NewAlert, Palette,
    RecordId,
};

// Reconnect tuning is configured through `StationConfig` and `StoreConfig`.
pub use redcode_api::ReconnectConfig;
