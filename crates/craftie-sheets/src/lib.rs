//! Google Sheets integration for craftie.
//!
//! Provides the REST transport behind the core's spreadsheet sink:
//! - Credential acquisition from a helper executable or the system keyring
//! - Service-account token minting and caching
//! - The `values` endpoints of the Sheets v4 API

pub mod auth;
pub mod credentials;

use std::fmt;
use std::time::Duration;

use craftie_core::SheetsApi;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use auth::{ServiceAccountKey, TokenSource};
pub use credentials::{CredentialsError, fetch_credentials};

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const SHEETS_API_URL: &str = "https://sheets.googleapis.com";
const USER_ENTERED: &str = "USER_ENTERED";
const INSERT_ROWS: &str = "INSERT_ROWS";

/// Sheets client errors.
#[derive(Debug, Error)]
pub enum SheetsError {
    /// The service-account key could not be used.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Failed to sign the token assertion.
    #[error("failed to sign token assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    /// The token endpoint refused the assertion.
    #[error("authentication failed: {message}")]
    Auth { message: String },
    /// API returned an error response.
    #[error("API error: {message}")]
    Api { message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The request URL could not be built.
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),
}

/// Sheets v4 values client for one spreadsheet.
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: Url,
    spreadsheet_id: String,
    tokens: TokenSource,
}

impl fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetsClient")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl SheetsClient {
    /// Creates a client from raw service-account JSON.
    pub fn new(spreadsheet_id: impl Into<String>, credentials: &[u8]) -> Result<Self, SheetsError> {
        let spreadsheet_id = spreadsheet_id.into();
        if spreadsheet_id.trim().is_empty() {
            return Err(SheetsError::InvalidUrl(
                "spreadsheet ID cannot be empty".to_string(),
            ));
        }
        let key = ServiceAccountKey::from_json(credentials)?;
        let tokens = TokenSource::new(key)?;

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(SheetsError::ClientBuild)?;
        let base_url =
            Url::parse(SHEETS_API_URL).map_err(|e| SheetsError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            spreadsheet_id,
            tokens,
        })
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    /// `{base}/v4/spreadsheets/{id}/values/{range}{suffix}`, with the range percent-encoded.
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, SheetsError> {
        let last = format!("{range}{suffix}");
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SheetsError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                last.as_str(),
            ]);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, SheetsError> {
        let token = self.tokens.access_token(&self.http).await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(&body).unwrap_or_else(|| SheetsError::Api {
                message: format!("status {status}: {body}"),
            }));
        }
        Ok(body)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: &'a [Vec<String>],
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    updates: AppendUpdates,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: String,
}

impl SheetsApi for SheetsClient {
    type Error = SheetsError;

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let url = self.values_url(range, "")?;
        let body = self.send(self.http.get(url)).await?;
        let payload: ValuesResponse =
            serde_json::from_str(&body).map_err(|e| SheetsError::InvalidResponse(e.to_string()))?;
        Ok(payload
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn update_values(&self, range: &str, rows: &[Vec<String>]) -> Result<(), SheetsError> {
        let url = self.values_url(range, "")?;
        let request = self
            .http
            .put(url)
            .query(&[("valueInputOption", USER_ENTERED)])
            .json(&ValueRange {
                range,
                major_dimension: "ROWS",
                values: rows,
            });
        self.send(request).await?;
        tracing::debug!(range, rows = rows.len(), "updated values");
        Ok(())
    }

    async fn append_values(
        &self,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<String, SheetsError> {
        let url = self.values_url(range, ":append")?;
        let request = self
            .http
            .post(url)
            .query(&[
                ("valueInputOption", USER_ENTERED),
                ("insertDataOption", INSERT_ROWS),
            ])
            .json(&ValueRange {
                range,
                major_dimension: "ROWS",
                values: rows,
            });
        let body = self.send(request).await?;
        let payload: AppendResponse =
            serde_json::from_str(&body).map_err(|e| SheetsError::InvalidResponse(e.to_string()))?;
        tracing::debug!(range, updated = %payload.updates.updated_range, "appended values");
        Ok(payload.updates.updated_range)
    }
}

fn cell_text(cell: Value) -> String {
    match cell {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_api_error(body: &str) -> Option<SheetsError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| SheetsError::Api {
            message: payload.error.message,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SheetsClient {
        SheetsClient::new("sheet-123", auth::tests::key_json().as_bytes()).unwrap()
    }

    #[test]
    fn client_rejects_empty_spreadsheet_id() {
        let err = SheetsClient::new("  ", auth::tests::key_json().as_bytes()).unwrap_err();
        assert!(matches!(err, SheetsError::InvalidUrl(_)));
    }

    #[test]
    fn client_rejects_bad_credentials() {
        let err = SheetsClient::new("sheet-123", b"{}").unwrap_err();
        assert!(matches!(err, SheetsError::InvalidCredentials(_)));
    }

    #[test]
    fn client_debug_redacts_key() {
        let debug = format!("{:?}", client());
        assert!(debug.contains("sheet-123"));
        assert!(!debug.contains("PRIVATE KEY"));
    }

    #[test]
    fn values_url_encodes_quoted_range() {
        let url = client().values_url("'Craft Time'!A1:G1", "").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/'Craft%20Time'!A1:G1"
        );
    }

    #[test]
    fn append_url_has_suffix() {
        let url = client().values_url("'CraftTime'!A:G", ":append").unwrap();
        assert!(url.path().ends_with("/values/'CraftTime'!A:G:append"), "{url}");
    }

    #[test]
    fn parse_api_error_extracts_message() {
        let body = r#"{"error":{"code":400,"message":"Unable to parse range","status":"INVALID_ARGUMENT"}}"#;
        let err = parse_api_error(body).unwrap();
        assert!(matches!(err, SheetsError::Api { message } if message == "Unable to parse range"));
        assert!(parse_api_error("<html>").is_none());
    }

    #[test]
    fn cells_render_as_text() {
        assert_eq!(cell_text(Value::String("Project".into())), "Project");
        assert_eq!(cell_text(serde_json::json!(3)), "3");
        assert_eq!(cell_text(Value::Null), "");
    }
}
