/// Byte-fetching seam between the cache/feed layers and the network
///
/// The contract is deliberately narrow: given a URL, return the raw response
/// bytes or fail. Tests substitute in-memory implementations; production uses
/// [`HttpTransport`] over reqwest.
use async_trait::async_trait;

use crate::error::TransportError;

/// Anything that can turn a URL into bytes
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// HTTP transport backed by a pooled reqwest client
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Connection {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("fetch failed: {} - {}", url, status);
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(bytes.to_vec())
    }
}
