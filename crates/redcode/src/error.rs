//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use redcode_config::ConfigError;
use redcode_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the alert store at {url}")]
    #[diagnostic(
        code(redcode::connection_failed),
        help(
            "Check that the store URL is correct and reachable.\n\
             URL: {url}\n\
             Self-signed certificates need --insecure or ca_cert in the profile."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Change feed unavailable: {reason}")]
    #[diagnostic(
        code(redcode::feed_unavailable),
        help("The realtime socket could not be opened. Stations retry on their own; one-shot commands do not.")
    )]
    FeedUnavailable { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(redcode::auth_failed),
        help(
            "Verify the project API key.\n\
             Store it with: redcode config set-key --profile <name>"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(redcode::no_credentials),
        help(
            "Configure credentials with: redcode config init\n\
             Or set the REDCODE_API_KEY environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(redcode::not_found),
        help("Run: redcode {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Store ────────────────────────────────────────────────────────
    #[error("Store error ({code}): {message}")]
    #[diagnostic(code(redcode::store_error))]
    Store { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(redcode::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(redcode::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: redcode config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(redcode::no_config),
        help(
            "Create one with: redcode config init\n\
             Or pass --url, --api-key and --receiver.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(redcode::config))]
    Config(ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Operation '{action}' was not confirmed")]
    #[diagnostic(
        code(redcode::not_confirmed),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NotConfirmed { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(redcode::timeout),
        help("Increase timeout with --timeout or check the store's responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Alarm controller stopped unexpectedly")]
    #[diagnostic(code(redcode::controller_stopped))]
    ControllerStopped,

    #[error("Internal error: {0}")]
    #[diagnostic(code(redcode::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::FeedUnavailable { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NotConfirmed { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            other => CliError::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => {
                CliError::ConnectionFailed { url, reason }
            }
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::FeedUnavailable { reason } => CliError::FeedUnavailable { reason },
            CoreError::AlertNotFound { identifier } => CliError::NotFound {
                resource_type: "alert".into(),
                identifier,
                list_command: "alerts list".into(),
            },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Api { message, code, .. } => CliError::Store {
                code: code.unwrap_or_else(|| "unknown".into()),
                message,
            },
            CoreError::Config { message } => CliError::Validation {
                field: "configuration".into(),
                reason: message,
            },
            CoreError::ControllerStopped => CliError::ControllerStopped,
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_category() {
        let auth = CliError::from(CoreError::AuthenticationFailed {
            message: "bad key".into(),
        });
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let missing = CliError::from(CoreError::AlertNotFound {
            identifier: "42".into(),
        });
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let feed = CliError::from(CoreError::FeedUnavailable {
            reason: "refused".into(),
        });
        assert_eq!(feed.exit_code(), exit_code::CONNECTION);

        let usage = CliError::from(ConfigError::Validation {
            field: "expiry".into(),
            reason: "bad".into(),
        });
        assert_eq!(usage.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn store_error_keeps_code() {
        let err = CliError::from(CoreError::Api {
            message: "permission denied".into(),
            code: Some("42501".into()),
            status: Some(403),
        });
        assert_eq!(err.to_string(), "Store error (42501): permission denied");
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
