//! CLI configuration: thin wrapper around `redcode_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides (--url,
//! --api-key, --receiver, ...) and the lifecycle flags of `watch`/`drill`.

use std::time::Duration;

use secrecy::SecretString;

use redcode_core::{
    ManualStopPolicy, RacePolicy, ReceiverIdentity, StationConfig, StoreConfig, TlsVerification,
};

use crate::cli::{GlobalOpts, LifecycleOpts, RacePolicyArg, StopPolicyArg};
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use redcode_config::{
    Config, Profile, config_path, load_config_or_default, parse_duration, save_config,
};

// ── Flag conversions ────────────────────────────────────────────────

impl From<StopPolicyArg> for ManualStopPolicy {
    fn from(arg: StopPolicyArg) -> Self {
        match arg {
            StopPolicyArg::Global => Self::Global,
            StopPolicyArg::LocalOnly => Self::LocalOnly,
        }
    }
}

impl From<RacePolicyArg> for RacePolicy {
    fn from(arg: RacePolicyArg) -> Self {
        match arg {
            RacePolicyArg::PreferNewest => Self::PreferNewest,
            RacePolicyArg::HoldCurrent => Self::HoldCurrent,
        }
    }
}

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

fn available_profiles(config: &Config) -> String {
    let mut names: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
    names.sort_unstable();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}

/// Build the station config: profile (when present) with flag overrides.
///
/// Without a profile, `--receiver` is enough; everything else takes the
/// file's defaults.
pub fn resolve_station(
    global: &GlobalOpts,
    config: &Config,
    lifecycle: Option<&LifecycleOpts>,
) -> Result<StationConfig, CliError> {
    let profile_name = active_profile_name(global, config);

    let mut station = if let Some(profile) = config.profiles.get(&profile_name) {
        redcode_config::profile_to_station_config(profile, &config.defaults)?
    } else if let Some(ref receiver) = global.receiver {
        if global.profile.is_some() {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(config),
            });
        }
        let mut station = StationConfig::new(ReceiverIdentity::new(receiver.clone()));
        station.expiry = parse_duration("expiry", &config.defaults.expiry)?;
        station.manual_stop = config.defaults.manual_stop;
        station.race = config.defaults.race;
        station
    } else {
        return Err(missing_profile(global, config, profile_name));
    };

    if let Some(ref receiver) = global.receiver {
        station.receiver.id.clone_from(receiver);
    }
    if let Some(opts) = lifecycle {
        apply_lifecycle(&mut station, opts)?;
    }
    Ok(station)
}

/// Apply `--expiry`, `--manual-stop` and `--race`.
pub fn apply_lifecycle(station: &mut StationConfig, opts: &LifecycleOpts) -> Result<(), CliError> {
    if let Some(ref raw) = opts.expiry {
        station.expiry = parse_duration("expiry", raw)?;
    }
    if let Some(policy) = opts.manual_stop {
        station.manual_stop = policy.into();
    }
    if let Some(policy) = opts.race {
        station.race = policy.into();
    }
    Ok(())
}

/// Build the store config: profile (when present) with flag overrides.
pub fn resolve_store(global: &GlobalOpts, config: &Config) -> Result<StoreConfig, CliError> {
    let profile_name = active_profile_name(global, config);

    let mut store = if let Some(profile) = config.profiles.get(&profile_name) {
        let url = parse_url(global.url.as_deref().unwrap_or(&profile.url))?;
        let api_key = match global.api_key {
            Some(ref key) => SecretString::from(key.clone()),
            None => redcode_config::resolve_api_key(profile, &profile_name)?,
        };
        redcode_config::build_store_config(profile, url, api_key, &config.defaults)
    } else {
        let Some(ref url) = global.url else {
            return Err(missing_profile(global, config, profile_name));
        };
        let url = parse_url(url)?;
        let api_key = global
            .api_key
            .clone()
            .ok_or(CliError::NoCredentials {
                profile: profile_name,
            })?;
        let mut store = StoreConfig::new(url, SecretString::from(api_key));
        store.timeout = Duration::from_secs(config.defaults.timeout);
        if config.defaults.insecure {
            store.tls = TlsVerification::DangerAcceptInvalid;
        }
        store
    };

    if global.insecure {
        store.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        store.timeout = Duration::from_secs(secs);
    }
    Ok(store)
}

fn parse_url(raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

fn missing_profile(global: &GlobalOpts, config: &Config, profile_name: String) -> CliError {
    if global.profile.is_some() || !config.profiles.is_empty() {
        CliError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(config),
        }
    } else {
        CliError::NoConfig {
            path: config_path().display().to_string(),
        }
    }
}
