//! Content-length probe used to backfill the byte size of cached images.

use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Why a size probe produced no measurement.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("response has no usable Content-Length")]
    MissingContentLength,
}

/// Measures the size in bytes of a published image.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SizeProbe: Send + Sync {
    async fn content_length(&self, url: &str) -> Result<u64, ProbeError>;
}

/// `HEAD` request against the CDN, reading `Content-Length` of a 200 answer.
#[derive(Clone)]
pub struct HttpSizeProbe {
    http_client: reqwest::Client,
}

impl HttpSizeProbe {
    /// # Errors
    ///
    /// Returns `ProbeError::Client` if the HTTP client cannot be created.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl SizeProbe for HttpSizeProbe {
    async fn content_length(&self, url: &str) -> Result<u64, ProbeError> {
        let response = self
            .http_client
            .head(url)
            .send()
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(ProbeError::UnexpectedStatus(response.status().as_u16()));
        }

        // Read the header itself: a HEAD response carries no body to size.
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or(ProbeError::MissingContentLength)
    }
}
