// ── Runtime station configuration ──
//
// These types describe how one station behaves and how it reaches the
// shared store. They carry credential data and tuning but never touch
// disk: the CLI builds them from a profile and hands them in.

use std::path::PathBuf;
use std::time::Duration;

use redcode_api::ReconnectConfig;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::sound::SoundResolver;

/// Default expiry window for an alert, measured from its creation time.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(60);

/// Default period of the countdown tick.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

// ── Policies ─────────────────────────────────────────────────────────

/// What a manual stop does.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ManualStopPolicy {
    /// Write `resolved` to the store; every station stops.
    Global,
    /// Silence and hide the alert on this station only. The shared
    /// expiry watchdogs keep running.
    #[default]
    LocalOnly,
}

/// How a station reacts to a new alert while another one is displayed.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RacePolicy {
    /// A newer alert (by creation time) replaces the displayed one.
    #[default]
    PreferNewest,
    /// The displayed alert stays until it is resolved or expires.
    HoldCurrent,
}

// ── Station ──────────────────────────────────────────────────────────

/// Who this station is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverIdentity {
    /// Receiver id written into acknowledgments.
    pub id: String,
    /// Human label, typically the department name.
    pub label: Option<String>,
    /// Station-specific clip played after the primary clip.
    pub clip: Option<String>,
}

impl ReceiverIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            clip: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_clip(mut self, clip: impl Into<String>) -> Self {
        self.clip = Some(clip.into());
        self
    }
}

/// Lifecycle tuning for one station.
#[derive(Debug, Clone)]
pub struct StationConfig {
    pub receiver: ReceiverIdentity,
    /// Alerts older than this are never displayed and auto-resolve.
    pub expiry: Duration,
    /// Countdown recompute period.
    pub tick: Duration,
    pub manual_stop: ManualStopPolicy,
    pub race: RacePolicy,
    pub sounds: SoundResolver,
    /// Backoff used to re-acquire the alert feed after it closes.
    pub resubscribe: ReconnectConfig,
}

impl StationConfig {
    pub fn new(receiver: ReceiverIdentity) -> Self {
        Self {
            receiver,
            expiry: DEFAULT_EXPIRY,
            tick: DEFAULT_TICK,
            manual_stop: ManualStopPolicy::default(),
            race: RacePolicy::default(),
            sounds: SoundResolver::default(),
            resubscribe: ReconnectConfig::default(),
        }
    }
}

// ── Store ────────────────────────────────────────────────────────────

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-hosted stores with self-signed certs).
    DangerAcceptInvalid,
}

/// How to reach the shared alert store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Project URL, e.g. `https://abc.example.co`.
    pub url: Url,
    /// Project API key, sent on every request and the realtime socket.
    pub api_key: SecretString,
    /// Signed-in user's token. Falls back to the API key when absent.
    pub access_token: Option<SecretString>,
    pub tls: TlsVerification,
    pub timeout: Duration,
    pub alerts_table: String,
    pub acks_table: String,
    /// Realtime socket reconnect backoff.
    pub reconnect: ReconnectConfig,
}

impl StoreConfig {
    pub fn new(url: Url, api_key: SecretString) -> Self {
        Self {
            url,
            api_key,
            access_token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            alerts_table: "alarms".into(),
            acks_table: "acknowledgments".into(),
            reconnect: ReconnectConfig::default(),
        }
    }
}
