// Async HTTP client for the PostgREST query surface of the alert store.
//
// Base path: /rest/v1/
// Auth: `apikey` header plus `Authorization: Bearer <token>`

mod acks;
mod alarms;

use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::Error;
use crate::models::RestErrorBody;

// ── Table names ──────────────────────────────────────────────────────

/// Names of the two tables the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub alarms: String,
    pub acknowledgments: String,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            alarms: "alarms".into(),
            acknowledgments: "acknowledgments".into(),
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the PostgREST endpoint of a project.
///
/// Every request carries the project API key; the bearer token is the
/// signed-in user's access token when one is configured and the API key
/// otherwise.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    tables: Tables,
}

impl RestClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from a project URL, API key and optional user access token.
    pub fn from_api_key(
        project_url: &str,
        api_key: &SecretString,
        access_token: Option<&SecretString>,
        transport: &crate::TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.store_client(api_key, access_token)?;
        let base_url = Self::normalize_base_url(project_url)?;

        Ok(Self {
            http,
            base_url,
            tables: Tables::default(),
        })
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(project_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(project_url)?;
        Ok(Self {
            http,
            base_url,
            tables: Tables::default(),
        })
    }

    /// Override the table names.
    pub fn with_tables(mut self, tables: Tables) -> Self {
        self.tables = tables;
        self
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Build `https://<project>/rest/v1/` from a bare project URL.
    ///
    /// A URL that already ends in `/rest/v1` is accepted as-is.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();

        if path.ends_with("/rest/v1") {
            url.set_path(&format!("{path}/"));
        } else {
            url.set_path(&format!("{path}/rest/v1/"));
        }

        Ok(url)
    }

    // ── URL builder ──────────────────────────────────────────────────

    fn url(&self, table: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(table)?)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, Error> {
        let url = self.url(table)?;
        debug!("GET {url} params={params:?}");

        let resp = self.http.get(url).query(params).send().await?;
        Self::handle_response(resp).await
    }

    /// Insert one row and return the stored representation.
    async fn insert<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(table)?;
        debug!("POST {url}");

        let resp = self
            .http
            .post(url)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let rows: Vec<T> = Self::handle_response(resp).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::EmptyRepresentation {
                table: table.to_owned(),
            })
    }

    async fn update<B: Serialize + Sync>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &B,
    ) -> Result<(), Error> {
        let url = self.url(table)?;
        debug!("PATCH {url} filters={filters:?}");

        let resp = self
            .http
            .patch(url)
            .query(filters)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        Self::handle_empty(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(Self::parse_error(status, resp).await)
        }
    }

    async fn handle_empty(resp: reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::parse_error(status, resp).await)
        }
    }

    async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            return Error::RateLimited { retry_after_secs };
        }

        let raw = resp.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<RestErrorBody>(&raw).ok();

        if matches!(
            status,
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN
        ) {
            let message = parsed
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.to_string());
            return Error::Authentication { message };
        }

        match parsed {
            Some(body) => Error::Rest {
                message: body.message.unwrap_or_else(|| status.to_string()),
                code: body.code,
                details: body.details,
                hint: body.hint,
                status: status.as_u16(),
            },
            None => Error::Rest {
                message: if raw.is_empty() {
                    status.to_string()
                } else {
                    raw
                },
                code: None,
                details: None,
                hint: None,
                status: status.as_u16(),
            },
        }
    }
}

/// PostgREST equality filter value, e.g. `eq.42`.
fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_rest_prefix() {
        let url = RestClient::normalize_base_url("https://abc.example.co").unwrap();
        assert_eq!(url.as_str(), "https://abc.example.co/rest/v1/");
    }

    #[test]
    fn base_url_with_prefix_is_kept() {
        let url = RestClient::normalize_base_url("http://localhost:54321/rest/v1/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:54321/rest/v1/");
    }

    #[test]
    fn table_url_joins_under_prefix() {
        let client =
            RestClient::from_reqwest("https://abc.example.co", reqwest::Client::new()).unwrap();
        assert_eq!(
            client.url("alarms").unwrap().as_str(),
            "https://abc.example.co/rest/v1/alarms"
        );
    }
}
