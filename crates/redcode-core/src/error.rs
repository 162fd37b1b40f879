// ── Core error types ──
//
// User-facing errors from redcode-core. Consumers never see HTTP status
// codes or JSON parse failures directly; the `From<redcode_api::Error>`
// impl translates store-client errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach the alert store at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Alert store request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Change feed unavailable: {reason}")]
    FeedUnavailable { reason: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Alert not found: {identifier}")]
    AlertNotFound { identifier: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Store errors (wrapped, not exposed raw) ──────────────────────
    #[error("Store error: {message}")]
    Api {
        message: String,
        /// Store-specific error code (e.g. a PostgREST or SQLSTATE code).
        code: Option<String>,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Alarm controller is not running")]
    ControllerStopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` when retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::FeedUnavailable { .. } => {
                true
            }
            Self::Api { status, .. } => status.is_some_and(|s| s >= 500 || s == 429),
            _ => false,
        }
    }
}

// ── Conversion from store-client errors ──────────────────────────────

impl From<redcode_api::Error> for CoreError {
    fn from(err: redcode_api::Error) -> Self {
        use redcode_api::Error as ApiError;

        match err {
            ApiError::Authentication { message } => CoreError::AuthenticationFailed { message },
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), |u| u.origin().ascii_serialization()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: None,
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            ApiError::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            ApiError::RateLimited { retry_after_secs } => CoreError::Api {
                message: format!("Rate limited -- retry after {retry_after_secs}s"),
                code: Some("rate_limited".into()),
                status: Some(429),
            },
            ApiError::Rest {
                message,
                code,
                hint,
                status,
                ..
            } => CoreError::Api {
                message: match hint {
                    Some(hint) => format!("{message} (hint: {hint})"),
                    None => message,
                },
                code,
                status: Some(status),
            },
            ApiError::RealtimeConnect(reason) => CoreError::FeedUnavailable { reason },
            ApiError::RealtimeClosed { code, reason } => CoreError::FeedUnavailable {
                reason: format!("closed (code {code}): {reason}"),
            },
            ApiError::RealtimeShutdown => CoreError::FeedUnavailable {
                reason: "realtime socket is shut down".into(),
            },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            ApiError::EmptyRepresentation { table } => {
                CoreError::Internal(format!("store returned no row for {table}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_errors_keep_code_and_hint() {
        let err = CoreError::from(redcode_api::Error::Rest {
            message: "permission denied for table alarms".into(),
            code: Some("42501".into()),
            details: None,
            hint: Some("check row level security".into()),
            status: 403,
        });
        match err {
            CoreError::Api {
                message,
                code,
                status,
            } => {
                assert!(message.contains("hint: check row level security"));
                assert_eq!(code.as_deref(), Some("42501"));
                assert_eq!(status, Some(403));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn realtime_errors_are_transient_feed_errors() {
        let err = CoreError::from(redcode_api::Error::RealtimeConnect("refused".into()));
        assert!(matches!(err, CoreError::FeedUnavailable { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn rate_limit_is_transient() {
        let err = CoreError::from(redcode_api::Error::RateLimited { retry_after_secs: 2 });
        assert!(err.is_transient());
        assert!(!CoreError::ControllerStopped.is_transient());
    }
}
