//! Config subcommand handlers.

use dialoguer::{Input, Select};
use secrecy::SecretString;

use redcode_core::{ManualStopPolicy, RacePolicy};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// A copy with plaintext secrets masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.api_key.is_some() {
            profile.api_key = Some(MASK.into());
        }
    }
    cfg
}

/// Format config for display as TOML.
fn format_config(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# failed to render config: {e}"))
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn not_found(name: String, cfg: &Config) -> CliError {
    let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
    available.sort_unstable();
    CliError::ProfileNotFound {
        name,
        available: if available.is_empty() {
            "(none)".into()
        } else {
            available.join(", ")
        },
    }
}

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Apply `config set <key> <value>` to a profile.
fn set_key(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    let invalid = |field: &str, reason: &str| CliError::Validation {
        field: field.into(),
        reason: reason.into(),
    };

    match key.replace('-', "_").as_str() {
        "url" => profile.url = value,
        "receiver_id" | "receiver" => profile.receiver_id = value,
        "label" => profile.label = optional(value),
        "receiver_clip" | "clip" => profile.receiver_clip = optional(value),
        "api_key_env" => profile.api_key_env = optional(value),
        "access_token_env" => profile.access_token_env = optional(value),
        "ca_cert" => profile.ca_cert = optional(value).map(Into::into),
        "default_sound" => profile.default_sound = optional(value),
        "alerts_table" => profile.alerts_table = optional(value),
        "acks_table" => profile.acks_table = optional(value),
        "expiry" => {
            config::parse_duration("expiry", &value)?;
            profile.expiry = Some(value);
        }
        "manual_stop" => {
            let policy: ManualStopPolicy = value
                .parse()
                .map_err(|_| invalid("manual_stop", "must be 'global' or 'local-only'"))?;
            profile.manual_stop = Some(policy);
        }
        "race" => {
            let policy: RacePolicy = value
                .parse()
                .map_err(|_| invalid("race", "must be 'prefer-newest' or 'hold-current'"))?;
            profile.race = Some(policy);
        }
        "insecure" => {
            profile.insecure = Some(
                value
                    .parse()
                    .map_err(|_| invalid("insecure", "must be 'true' or 'false'"))?,
            );
        }
        "timeout" => {
            profile.timeout = Some(
                value
                    .parse()
                    .map_err(|_| invalid("timeout", "must be a number (seconds)"))?,
            );
        }
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: url, receiver_id, label, \
                     receiver_clip, api_key_env, access_token_env, ca_cert, default_sound, \
                     alerts_table, acks_table, expiry, manual_stop, race, insecure, timeout"
                ),
            });
        }
    }
    Ok(())
}

/// Prompt for the API key and offer keyring or plaintext storage.
///
/// Returns `Some(key)` if the user chose plaintext, `None` if stored in keyring.
fn prompt_api_key(profile_name: &str) -> Result<Option<String>, CliError> {
    let key = rpassword::prompt_password("Project API key: ").map_err(prompt_err)?;
    if key.is_empty() {
        return Err(CliError::Validation {
            field: "api_key".into(),
            reason: "API key cannot be empty".into(),
        });
    }

    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the API key?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        redcode_config::store_api_key(profile_name, &SecretString::from(key))?;
        eprintln!("   ✓ API key stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(key))
    }
}

// ── Handler ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("redcode station setup");
            eprintln!("   Config path: {}\n", config_path.display());

            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default("default".into())
                .interact_text()
                .map_err(prompt_err)?;

            let url: String = Input::new()
                .with_prompt("Store project URL")
                .interact_text()
                .map_err(prompt_err)?;
            if url.parse::<url::Url>().is_err() {
                return Err(CliError::Validation {
                    field: "url".into(),
                    reason: format!("invalid URL: {url}"),
                });
            }

            let receiver_id: String = Input::new()
                .with_prompt("Receiver id for this station")
                .interact_text()
                .map_err(prompt_err)?;

            let label: String = Input::new()
                .with_prompt("Department label (shown on banners, used as origin)")
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_err)?;

            let stop_choices = &[
                "Silence this station only (alert still expires everywhere)",
                "Resolve for every station",
            ];
            let manual_stop = match Select::new()
                .with_prompt("What should a manual stop do?")
                .items(stop_choices)
                .default(0)
                .interact()
                .map_err(prompt_err)?
            {
                0 => ManualStopPolicy::LocalOnly,
                _ => ManualStopPolicy::Global,
            };

            let api_key = prompt_api_key(&profile_name)?;

            let profile = Profile {
                url,
                receiver_id,
                label: optional(label),
                api_key,
                manual_stop: Some(manual_stop),
                ..Profile::default()
            };

            // Keep other profiles when re-running init.
            let mut cfg = config::load_config_or_default();
            cfg.profiles.insert(profile_name.clone(), profile);
            cfg.default_profile = Some(profile_name.clone());

            config::save_config(&cfg)?;

            eprintln!("\n✓ Configuration written to {}", config_path.display());
            eprintln!("  Active profile: {profile_name}");
            eprintln!("\n  Try it: redcode alerts list");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config_or_default());
            let out = output::render_single(&global.output, &cfg, format_config, |_| {
                config::config_path().display().to_string()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);
            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            set_key(profile, &key, value)?;

            config::save_config(&cfg)?;
            eprintln!("✓ Set {key} on profile '{profile_name}'");
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: redcode config init");
            } else {
                let mut names: Vec<_> = cfg.profiles.keys().collect();
                names.sort();
                for name in names {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(not_found(name, &cfg));
            }

            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            eprintln!("✓ Default profile set to '{name}'");
            Ok(())
        }

        // ── SetKey ──────────────────────────────────────────────────
        ConfigCommand::SetKey { profile } => {
            let cfg = config::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(not_found(profile_name, &cfg));
            }

            let key = rpassword::prompt_password("Project API key: ").map_err(prompt_err)?;
            if key.is_empty() {
                return Err(CliError::Validation {
                    field: "api_key".into(),
                    reason: "API key cannot be empty".into(),
                });
            }
            redcode_config::store_api_key(&profile_name, &SecretString::from(key))?;
            eprintln!("✓ API key stored in system keyring for profile '{profile_name}'");
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn show_masks_plaintext_keys() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "ward".into(),
            Profile {
                url: "https://alerts.example.org".into(),
                receiver_id: "ward-3".into(),
                api_key: Some("sb-secret".into()),
                ..Profile::default()
            },
        );
        let shown = format_config(&redacted(&cfg));
        assert!(shown.contains("****"));
        assert!(!shown.contains("sb-secret"));
        assert!(shown.contains("receiver_id = \"ward-3\""));
    }

    #[test]
    fn set_key_validates_values() {
        let mut profile = Profile::default();
        set_key(&mut profile, "manual-stop", "global".into()).unwrap();
        assert_eq!(profile.manual_stop, Some(ManualStopPolicy::Global));

        set_key(&mut profile, "expiry", "90s".into()).unwrap();
        assert_eq!(profile.expiry.as_deref(), Some("90s"));

        set_key(&mut profile, "label", "  ".into()).unwrap();
        assert_eq!(profile.label, None);

        assert!(set_key(&mut profile, "race", "fastest".into()).is_err());
        assert!(set_key(&mut profile, "expiry", "later".into()).is_err());
        assert!(set_key(&mut profile, "colour", "red".into()).is_err());
    }
}
