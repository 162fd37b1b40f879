//! Shared helpers for command handlers.

use std::time::Duration;

use chrono::{DateTime, Utc};

use redcode_core::{AlertCategory, RecordId};

use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Parse a category from a code, slug or dashed code.
pub fn parse_category(raw: &str) -> Result<AlertCategory, CliError> {
    if raw.trim().is_empty() {
        return Err(CliError::Validation {
            field: "category".into(),
            reason: "must not be empty".into(),
        });
    }
    let Ok(category) = raw.parse::<AlertCategory>();
    Ok(category)
}

pub fn parse_id(raw: &str) -> Result<RecordId, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::Validation {
            field: "id".into(),
            reason: "must not be empty".into(),
        });
    }
    let Ok(id) = trimmed.parse::<RecordId>();
    Ok(id)
}

/// "3m 12s ago" style age, rounded to whole seconds.
pub fn age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - created_at).to_std().map_or(0, |d| d.as_secs());
    if secs == 0 {
        return "just now".into();
    }
    format!("{} ago", humantime::format_duration(Duration::from_secs(secs)))
}

/// Countdown as `mm:ss`.
pub fn countdown(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
