//! Image byte acquisition.
//!
//! The HTTP source streams the body and aborts mid-transfer as soon as the
//! size cap is crossed, so an oversized image never occupies more than one
//! chunk beyond the cap.

use crate::types::RejectionReason;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::debug;

/// Why a download failed, mapped onto a rejection reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// HTTP error status or connection failure
    Failed(String),
    /// Body exceeded the size cap
    TooLarge { cap_bytes: u64 },
    /// Download exceeded its timeout (applied by the caller)
    TimedOut,
}

impl FetchFailure {
    pub fn reason(&self) -> RejectionReason {
        match self {
            FetchFailure::Failed(_) => RejectionReason::FetchFailed,
            FetchFailure::TooLarge { .. } => RejectionReason::TooLarge,
            FetchFailure::TimedOut => RejectionReason::FetchTimeout,
        }
    }
}

/// The outbound boundary for fetching raw image bytes.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Download the bytes at `url`, enforcing `max_bytes`.
    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>, FetchFailure>;
}

/// Streaming HTTP downloader.
pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>, FetchFailure> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::Failed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchFailure::Failed(format!("HTTP {status}")));
        }

        // Trust Content-Length when present to skip the transfer entirely
        if let Some(len) = resp.content_length() {
            if len > max_bytes {
                return Err(FetchFailure::TooLarge { cap_bytes: max_bytes });
            }
        }

        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchFailure::Failed(e.to_string()))?;
            if (bytes.len() + chunk.len()) as u64 > max_bytes {
                debug!(url, cap_bytes = max_bytes, "aborting oversized download");
                return Err(FetchFailure::TooLarge { cap_bytes: max_bytes });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(bytes)
    }
}
