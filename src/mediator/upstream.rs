/*!
 * Upstream Fetching
 * Trait seam for outbound HTTP so the decision engine is testable
 * without sockets; the production impl uses reqwest
 */

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

/// Response metadata plus body from an upstream fetch
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("declared content length {declared} exceeds limit {limit}")]
    TooLarge { declared: u64, limit: u64 },

    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),
}

/// Enforce the declared Content-Length header against a policy limit.
///
/// Only the declared header is checked; a response without a length
/// header that streams past the limit is a documented bypass.
pub fn check_declared_length(
    declared: Option<u64>,
    limit: Option<u64>,
) -> Result<(), UpstreamError> {
    match (declared, limit) {
        (Some(declared), Some(limit)) if declared > limit => {
            Err(UpstreamError::TooLarge { declared, limit })
        }
        _ => Ok(()),
    }
}

/// Outbound fetch seam. Implementations must apply
/// [`check_declared_length`] between reading headers and reading the
/// body, so an over-limit body is never pulled.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(
        &self,
        method: &str,
        url: &Url,
        max_content_length: Option<u64>,
    ) -> Result<UpstreamResponse, UpstreamError>;
}

/// Production upstream backed by reqwest
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new() -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(
        &self,
        method: &str,
        url: &Url,
        max_content_length: Option<u64>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| UpstreamError::InvalidTarget(format!("bad method '{}'", method)))?;

        let response = self
            .client
            .request(method, url.as_str())
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // Declared length is checked before the body is read; an
        // over-limit body never enters this process
        check_declared_length(content_length, max_content_length)?;

        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(UpstreamResponse {
            status,
            content_length,
            content_type,
            body,
        })
    }
}
