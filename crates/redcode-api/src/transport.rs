// HTTP client construction for the store's REST surface.
//
// Owns TLS verification, request timeout and the two credential headers
// every PostgREST request carries.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

const USER_AGENT: &str = concat!("redcode/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode (api-level mirror of core's TlsVerification).
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    #[default]
    System,
    /// PEM bundle trusted in addition to the system roots.
    CustomCa(PathBuf),
    /// Self-hosted stores with self-signed certificates.
    DangerAcceptInvalid,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Build a client that authenticates every request to the store.
    ///
    /// `apikey` always carries the project key. The bearer token is the
    /// signed-in user's access token when present, else the project key.
    pub fn store_client(
        &self,
        api_key: &SecretString,
        access_token: Option<&SecretString>,
    ) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", secret_header(api_key.expose_secret())?);
        let bearer = access_token.unwrap_or(api_key).expose_secret();
        headers.insert(AUTHORIZATION, secret_header(&format!("Bearer {bearer}"))?);

        let builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers);

        let builder = match self.tls {
            TlsMode::System => builder,
            TlsMode::CustomCa(ref path) => {
                let pem = std::fs::read(path).map_err(|e| {
                    Error::Tls(format!("failed to read CA cert {}: {e}", path.display()))
                })?;
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder.add_root_certificate(cert)
            }
            TlsMode::DangerAcceptInvalid => builder.danger_accept_invalid_certs(true),
        };

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

/// A header value hidden from `Debug` output.
fn secret_header(raw: &str) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::from_str(raw).map_err(|e| Error::Authentication {
        message: format!("invalid credential header value: {e}"),
    })?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rejects_keys_that_cannot_be_headers() {
        let key = SecretString::from("line\nbreak");
        let err = TransportConfig::default()
            .store_client(&key, None)
            .unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
    }

    #[test]
    fn missing_ca_file_is_a_tls_error() {
        let transport = TransportConfig {
            tls: TlsMode::CustomCa("/nonexistent/ca.pem".into()),
            ..TransportConfig::default()
        };
        let err = transport
            .store_client(&SecretString::from("anon"), None)
            .unwrap_err();
        assert!(matches!(err, Error::Tls(ref msg) if msg.contains("/nonexistent/ca.pem")));
    }
}
