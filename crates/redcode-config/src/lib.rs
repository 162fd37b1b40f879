//! Station profiles for the redcode CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `redcode_core::{StationConfig, StoreConfig}`. The CLI
//! layers its flag overrides on top of what this crate produces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use redcode_core::{
    ManualStopPolicy, RacePolicy, ReceiverIdentity, SoundResolver, StationConfig, StoreConfig,
    TlsVerification,
};

const KEYRING_SERVICE: &str = "redcode";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named station profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile, falling back to `default_profile` when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Alert expiry window, in humantime form ("60s", "2m").
    #[serde(default = "default_expiry")]
    pub expiry: String,

    #[serde(default)]
    pub manual_stop: ManualStopPolicy,

    #[serde(default)]
    pub race: RacePolicy,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            expiry: default_expiry(),
            manual_stop: ManualStopPolicy::default(),
            race: RacePolicy::default(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_expiry() -> String {
    "60s".into()
}

/// A named station profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Store project URL (e.g., "https://abc.example.co").
    pub url: String,

    /// Receiver id written into acknowledgments.
    pub receiver_id: String,

    /// Department label shown on banners and used as the default origin.
    pub label: Option<String>,

    /// Station-specific clip played between the two primary clips.
    pub receiver_clip: Option<String>,

    /// API key (plaintext; prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Environment variable name containing a signed-in user's token.
    pub access_token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Override expiry window.
    pub expiry: Option<String>,

    pub manual_stop: Option<ManualStopPolicy>,

    pub race: Option<RacePolicy>,

    pub alerts_table: Option<String>,

    pub acks_table: Option<String>,

    /// Category code → clip locator, merged over the stock table.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub sounds: HashMap<String, String>,

    /// Clip for categories without an entry.
    pub default_sound: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "redcode", "redcode").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("redcode");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// Environment keys use `__` as the nesting separator, e.g.
/// `REDCODE_DEFAULTS__EXPIRY=90s`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("REDCODE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution (without CLI flags) ───────────────────────

/// Resolve an API key from the credential chain (no CLI flag step).
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_api_key_with(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        keyring_api_key,
    )
}

/// Credential chain with injectable lookups.
///
/// Order: profile `api_key_env` → keyring → plaintext `api_key`.
pub fn resolve_api_key_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl FnOnce(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's api_key_env → env var lookup
    if let Some(val) = profile.api_key_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(val));
    }

    // 2. System keyring
    if let Some(secret) = keyring(profile_name) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref key) = profile.api_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/api-key"))
}

fn keyring_api_key(profile_name: &str) -> Option<String> {
    keyring_entry(profile_name)
        .and_then(|entry| entry.get_password())
        .ok()
}

/// Store a profile's API key in the system keyring.
pub fn store_api_key(profile_name: &str, key: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(key.expose_secret())?;
    Ok(())
}

// ── Translation to core types ───────────────────────────────────────

/// Parse a humantime duration ("90s", "2m"), rejecting zero.
pub fn parse_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    let value = humantime::parse_duration(raw).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("'{raw}': {e}"),
    })?;
    if value.is_zero() {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

/// Build the station side of a profile. Needs no credentials.
pub fn profile_to_station_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<StationConfig, ConfigError> {
    if profile.receiver_id.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "receiver_id".into(),
            reason: "must not be empty".into(),
        });
    }

    let mut receiver = ReceiverIdentity::new(profile.receiver_id.trim());
    if let Some(ref label) = profile.label {
        receiver = receiver.with_label(label.clone());
    }
    if let Some(ref clip) = profile.receiver_clip {
        receiver = receiver.with_clip(clip.clone());
    }

    let mut sounds = SoundResolver::default();
    for (code, locator) in &profile.sounds {
        sounds.insert(code.clone(), locator.clone());
    }
    if let Some(ref locator) = profile.default_sound {
        sounds.set_default(locator.clone());
    }

    let mut station = StationConfig::new(receiver);
    station.expiry = parse_duration(
        "expiry",
        profile.expiry.as_deref().unwrap_or(&defaults.expiry),
    )?;
    station.manual_stop = profile.manual_stop.unwrap_or(defaults.manual_stop);
    station.race = profile.race.unwrap_or(defaults.race);
    station.sounds = sounds;
    Ok(station)
}

/// Build the store side of a profile, resolving credentials.
pub fn profile_to_store_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<StoreConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    let api_key = resolve_api_key(profile, profile_name)?;
    Ok(build_store_config(profile, url, api_key, defaults))
}

/// Store side of a profile with the URL and key already resolved.
pub fn build_store_config(
    profile: &Profile,
    url: url::Url,
    api_key: SecretString,
    defaults: &Defaults,
) -> StoreConfig {
    let mut store = StoreConfig::new(url, api_key);
    store.access_token = profile
        .access_token_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
        .map(SecretString::from);
    store.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };
    store.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    if let Some(ref table) = profile.alerts_table {
        store.alerts_table.clone_from(table);
    }
    if let Some(ref table) = profile.acks_table {
        store.acks_table.clone_from(table);
    }
    store
}

/// Build both runtime configs from a profile, without CLI flag overrides.
pub fn profile_to_configs(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<(StationConfig, StoreConfig), ConfigError> {
    let station = profile_to_station_config(profile, defaults)?;
    let store = profile_to_store_config(profile, profile_name, defaults)?;
    Ok((station, store))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use redcode_core::AlertCategory;

    fn profile() -> Profile {
        Profile {
            url: "https://alerts.example.org".into(),
            receiver_id: "er-desk".into(),
            label: Some("EMERGENCY".into()),
            ..Profile::default()
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn no_keyring(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn loads_profiles_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_profile = "ward"

[defaults]
expiry = "90s"
manual_stop = "global"

[profiles.ward]
url = "https://alerts.example.org"
receiver_id = "ward-3"
label = "CARDIOLOGY"
race = "hold-current"

[profiles.ward.sounds]
"CODE GREY" = "alarm-sounds/grey.mp3"
"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        let (name, ward) = cfg.profile(None).unwrap();
        assert_eq!(name, "ward");
        assert_eq!(ward.receiver_id, "ward-3");

        let station = profile_to_station_config(ward, &cfg.defaults).unwrap();
        assert_eq!(station.expiry, Duration::from_secs(90));
        assert_eq!(station.manual_stop, ManualStopPolicy::Global);
        assert_eq!(station.race, RacePolicy::HoldCurrent);
        assert_eq!(station.receiver.label.as_deref(), Some("CARDIOLOGY"));
        assert_eq!(
            station.sounds.resolve(&AlertCategory::from_code("CODE GREY")),
            "alarm-sounds/grey.mp3"
        );
        assert_eq!(
            station.sounds.resolve(&AlertCategory::Fire),
            "alarm-sounds/fire_alarm.mp3"
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert_eq!(cfg.defaults.expiry, "60s");
        assert!(cfg.profiles.is_empty());
        assert!(matches!(
            cfg.profile(None),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn save_then_load_keeps_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.profiles.insert("default".into(), profile());
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        let (_, p) = loaded.profile(Some("default")).unwrap();
        assert_eq!(p.url, "https://alerts.example.org");
        assert_eq!(p.label.as_deref(), Some("EMERGENCY"));
    }

    #[test]
    fn credential_chain_order() {
        let mut p = profile();
        p.api_key = Some("plain".into());
        p.api_key_env = Some("STATION_KEY".into());

        let from_env = resolve_api_key_with(
            &p,
            "default",
            |name| (name == "STATION_KEY").then(|| "env".to_owned()),
            |_| Some("ring".into()),
        )
        .unwrap();
        assert_eq!(from_env.expose_secret(), "env");

        let from_ring =
            resolve_api_key_with(&p, "default", no_env, |_| Some("ring".into())).unwrap();
        assert_eq!(from_ring.expose_secret(), "ring");

        let plain = resolve_api_key_with(&p, "default", no_env, no_keyring).unwrap();
        assert_eq!(plain.expose_secret(), "plain");
    }

    #[test]
    fn no_credentials_is_an_error() {
        let err = resolve_api_key_with(&profile(), "ward", no_env, no_keyring).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { ref profile } if profile == "ward"));
    }

    #[test]
    fn rejects_bad_expiry_and_blank_receiver() {
        let mut p = profile();
        p.expiry = Some("soon".into());
        let err = profile_to_station_config(&p, &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "expiry"));

        p.expiry = Some("0s".into());
        assert!(profile_to_station_config(&p, &Defaults::default()).is_err());

        let mut blank = profile();
        blank.receiver_id = "  ".into();
        let err = profile_to_station_config(&blank, &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "receiver_id"));
    }

    #[test]
    fn store_config_honours_overrides() {
        let mut p = profile();
        p.insecure = Some(true);
        p.timeout = Some(5);
        p.alerts_table = Some("codes".into());

        let url = p.url.parse().unwrap();
        let store = build_store_config(&p, url, SecretString::from("k"), &Defaults::default());
        assert_eq!(store.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(store.timeout, Duration::from_secs(5));
        assert_eq!(store.alerts_table, "codes");
        assert_eq!(store.acks_table, "acknowledgments");
    }

    #[test]
    fn invalid_url_is_rejected() {
        let mut p = profile();
        p.url = "not a url".into();
        p.api_key = Some("plain".into());
        let err = profile_to_store_config(&p, "x", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "url"));
    }
}
