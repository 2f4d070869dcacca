//! Client for an external description microservice (`POST {base}/describe`)
//!
//! Only used by the diagnostics routes.

use serde_json::{json, Value};
use snapvault_common::config::FastApiSettings;
use snapvault_common::time::with_timeout;
use std::time::Instant;

use super::ProviderError;

/// Tags sent when the caller supplies none
pub const DEFAULT_TAGS: &str = "Beach,Sunset,Ocean";

/// Upstream answer, whatever its status
#[derive(Debug, Clone)]
pub struct FastApiReply {
    pub status: u16,
    pub ok: bool,
    pub elapsed_ms: u64,
    /// Parsed JSON body, or the raw text when it is not JSON
    pub response: Value,
}

pub struct FastApiClient {
    http_client: reqwest::Client,
    base_url: Option<String>,
    timeout_ms: u64,
}

impl FastApiClient {
    pub fn new(settings: &FastApiSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: reqwest::Client::builder().build()?,
            base_url: settings
                .url
                .as_deref()
                .map(|u| u.trim().trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
            timeout_ms: settings.timeout_ms,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// POST `{tags}` to the describe endpoint
    pub async fn describe(&self, tags: &[String]) -> Result<FastApiReply, ProviderError> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or(ProviderError::NotConfigured("HF_FASTAPI_URL"))?;

        let started = Instant::now();
        let request = async {
            let response = self
                .http_client
                .post(format!("{}/describe", base_url))
                .json(&json!({ "tags": tags }))
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, ProviderError>((status, text))
        };

        let (status, text) = with_timeout(self.timeout_ms, request).await??;

        let response = match serde_json::from_str(&text) {
            Ok(json) => json,
            Err(_) => Value::String(text),
        };

        Ok(FastApiReply {
            status: status.as_u16(),
            ok: status.is_success(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            response,
        })
    }
}

/// Split a comma-separated tag list, falling back to [`DEFAULT_TAGS`]
pub fn parse_tags_param(raw: Option<&str>) -> Vec<String> {
    let raw = raw.filter(|r| !r.trim().is_empty()).unwrap_or(DEFAULT_TAGS);
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
