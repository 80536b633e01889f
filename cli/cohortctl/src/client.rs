//! HTTP client for API communication.

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::config::{Config, Credentials};
use crate::error::CliError;

/// Thin JSON client for the placement API.
///
/// Routes are given as path segments; each segment is percent-encoded, so
/// ids containing `/`, `?` or `#` stay inside their segment.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Every request carries the stored bearer token, if there is one.
    pub fn new(config: &Config, credentials: Option<&Credentials>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(creds) = credentials {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", creds.token))
                    .context("Stored token contains characters not allowed in a header")?,
            );
        }

        let base_url = Url::parse(config.api_url())
            .with_context(|| format!("Invalid API URL {:?}", config.api_url()))?;
        if base_url.cannot_be_a_base() {
            bail!("API URL {base_url} cannot carry a path");
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Building HTTP client")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request; non-2xx responses become `CliError`s.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, CliError> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(api_error(response).await)
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, CliError> {
        self.get_with_query(segments, &[]).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, CliError> {
        let url = self.url(segments);
        debug!(url = %url, "GET");
        let response = self.send(self.client.get(url).query(query)).await?;
        decode(response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, CliError> {
        let url = self.url(segments);
        debug!(url = %url, "POST");
        let response = self.send(self.client.post(url).json(body)).await?;
        decode(response).await
    }

    /// POST where the success body may be empty or not JSON at all.
    pub async fn post_lenient<B: Serialize>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Option<serde_json::Value>, CliError> {
        let url = self.url(segments);
        debug!(url = %url, "POST");
        let response = self.send(self.client.post(url).json(body)).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text).ok())
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CliError> {
    let url = response.url().path().to_string();
    response
        .json()
        .await
        .with_context(|| format!("Unexpected response body from {url}"))
        .map_err(CliError::Other)
}

/// Error statuses keep the server's own message, 401 included.
async fn api_error(response: reqwest::Response) -> CliError {
    let status = response.status();
    let body: ApiErrorResponse = response.json().await.unwrap_or_default();
    let message = body
        .message
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    CliError::api(status.as_u16(), body.code, message, body.request_id)
}

/// API error response structure.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, alias = "error")]
    message: Option<String>,
    #[serde(default, alias = "requestId")]
    request_id: Option<String>,
}
