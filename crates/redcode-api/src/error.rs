use thiserror::Error;

/// Top-level error type for the `redcode-api` crate.
///
/// Covers every failure mode across both store surfaces: the PostgREST
/// query endpoint and the Realtime change feed. `redcode-core` maps these
/// into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The store rejected the API key or access token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Rate limited by the gateway. Includes retry-after in seconds.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── PostgREST ───────────────────────────────────────────────────
    /// Structured error body returned by PostgREST.
    #[error("Store error (HTTP {status}): {message}")]
    Rest {
        message: String,
        code: Option<String>,
        details: Option<String>,
        hint: Option<String>,
        status: u16,
    },

    // ── Realtime ────────────────────────────────────────────────────
    /// Realtime websocket connection failed.
    #[error("Realtime connection failed: {0}")]
    RealtimeConnect(String),

    /// Realtime websocket closed unexpectedly.
    #[error("Realtime connection closed (code {code}): {reason}")]
    RealtimeClosed { code: u16, reason: String },

    /// The socket task is gone; no further channels can be joined.
    #[error("Realtime socket is shut down")]
    RealtimeShutdown,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An insert returned no representation row.
    #[error("Store returned no row for {table}")]
    EmptyRepresentation { table: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::RealtimeConnect(_) => true,
            Self::Rest { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Rest { status: 404, .. } => true,
            _ => false,
        }
    }

    /// Extract the PostgREST error code (e.g. `"PGRST116"`), if available.
    pub fn api_error_code(&self) -> Option<&str> {
        match self {
            Self::Rest { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}
