//! Remote highlight store over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{Highlight, HighlightId};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Operations the sync layer needs from a remote copy of the highlights.
#[async_trait]
pub trait RemoteHighlightStore: Send + Sync {
    async fn put(&self, highlight: &Highlight) -> Result<()>;

    /// The remote copy of `id`, or `None` when the remote has none.
    async fn get(&self, id: &HighlightId) -> Result<Option<Highlight>>;

    async fn delete(&self, id: &HighlightId) -> Result<()>;

    async fn fetch_material(&self, user_id: &str, material_id: &str) -> Result<Vec<Highlight>>;
}

/// JSON-over-HTTP remote store.
#[derive(Clone)]
pub struct HttpRemoteStore {
    endpoint: String,
    base: Url,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteStore")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpRemoteStore {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        let base = Url::parse(&endpoint)
            .map_err(|error| Error::Config(format!("invalid sync endpoint: {error}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("invalid sync endpoint: {endpoint}")));
        }
        Ok(Self {
            endpoint,
            base,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Append percent-encoded path segments to the endpoint.
    fn resource_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn highlight_url(&self, id: &HighlightId) -> Url {
        self.resource_url(&["v1", "highlights", id.as_str()])
    }

    fn material_url(&self, material_id: &str) -> Url {
        self.resource_url(&["v1", "materials", material_id, "highlights"])
    }
}

#[async_trait]
impl RemoteHighlightStore for HttpRemoteStore {
    async fn put(&self, highlight: &Highlight) -> Result<()> {
        let response = self
            .client
            .put(self.highlight_url(&highlight.id))
            .header("Accept", "application/json")
            .json(highlight)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn get(&self, id: &HighlightId) -> Result<Option<Highlight>> {
        let response = self
            .client
            .get(self.highlight_url(id))
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        Ok(Some(response.json::<Highlight>().await?))
    }

    async fn delete(&self, id: &HighlightId) -> Result<()> {
        let response = self
            .client
            .delete(self.highlight_url(id))
            .header("Accept", "application/json")
            .send()
            .await?;

        // Already gone on the remote is the desired end state
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }

    async fn fetch_material(&self, user_id: &str, material_id: &str) -> Result<Vec<Highlight>> {
        let response = self
            .client
            .get(self.material_url(material_id))
            .query(&[("user_id", user_id)])
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<Vec<Highlight>>().await?)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Remote(parse_api_error(status, &body)))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

pub(crate) fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::Config("sync endpoint must not be empty".to_string()))?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(
            "sync endpoint must include http:// or https://".to_string(),
        ))
    }
}
