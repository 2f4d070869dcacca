//! Image download for analysis

use async_trait::async_trait;
use std::time::Duration;

use super::{ImageSource, ProviderError};

const USER_AGENT: &str = concat!("snapvault/", env!("CARGO_PKG_VERSION"));
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Downloads images over HTTP(S), refusing bodies above a size cap
pub struct HttpImageSource {
    http_client: reqwest::Client,
    max_bytes: usize,
}

impl HttpImageSource {
    pub fn new(max_bytes: usize) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http_client,
            max_bytes,
        })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let mut response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Fetch(status.to_string()));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(ProviderError::TooLarge(self.max_bytes));
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProviderError::Fetch(e.to_string()))?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(ProviderError::TooLarge(self.max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(ProviderError::Fetch("empty body".to_string()));
        }

        tracing::debug!(url, bytes = bytes.len(), "Fetched image");
        Ok(bytes)
    }
}
