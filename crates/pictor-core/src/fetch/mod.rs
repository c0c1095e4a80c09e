//! Concurrent image acquisition, validation, and optimization.
//!
//! One task per candidate, bounded by a semaphore. Every failure is
//! per-candidate: a bad download or corrupt image becomes a typed
//! rejection and never disturbs its siblings.

mod decode;
mod hash;
mod metadata;
mod optimize;
mod source;

pub use decode::{color_mode, decode_and_validate, format_name, DecodedImage};
pub use hash::Hasher;
pub use source::{FetchFailure, HttpImageSource, ImageSource};

use crate::config::{FetchConfig, ThumbnailConfig};
use crate::types::{Candidate, ProcessedImage, RejectionReason};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// One rejected candidate with its typed reason.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub candidate_id: String,
    pub reason: RejectionReason,
}

/// Outcome of acquiring a batch of candidates.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Images that passed validation, in candidate order
    pub images: Vec<ProcessedImage>,
    /// Candidates that were rejected, in candidate order
    pub rejections: Vec<Rejection>,
    /// Total bytes downloaded, including rejected downloads
    pub bytes_downloaded: u64,
}

/// Downloads, validates, and optimizes candidates concurrently.
pub struct ImageFetcher {
    source: Arc<dyn ImageSource>,
    fetch: FetchConfig,
    thumbnail: ThumbnailConfig,
    hasher: Arc<Hasher>,
}

impl ImageFetcher {
    pub fn new(source: Arc<dyn ImageSource>, fetch: FetchConfig, thumbnail: ThumbnailConfig) -> Self {
        Self {
            source,
            fetch,
            thumbnail,
            hasher: Arc::new(Hasher::new()),
        }
    }

    /// Fetch and process all candidates with bounded concurrency.
    pub async fn fetch_all(&self, candidates: &[Candidate]) -> FetchReport {
        let semaphore = Arc::new(Semaphore::new(self.fetch.concurrency));
        let mut handles = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("fetch semaphore closed unexpectedly, stopping batch");
                    break;
                }
            };

            let source = self.source.clone();
            let fetch = self.fetch.clone();
            let thumbnail = self.thumbnail.clone();
            let hasher = self.hasher.clone();
            let candidate = candidate.clone();

            handles.push(tokio::spawn(async move {
                let result = fetch_one(&source, &candidate, &fetch, &thumbnail, &hasher).await;
                drop(permit);
                (candidate.id, result)
            }));
        }

        let mut report = FetchReport::default();
        for handle in handles {
            match handle.await {
                Ok((candidate_id, Ok((image, downloaded)))) => {
                    debug!(candidate_id = %candidate_id, "candidate processed");
                    report.bytes_downloaded += downloaded;
                    report.images.push(image);
                }
                Ok((candidate_id, Err((reason, downloaded)))) => {
                    debug!(candidate_id = %candidate_id, reason = reason.as_str(), "candidate rejected");
                    report.bytes_downloaded += downloaded;
                    report.rejections.push(Rejection { candidate_id, reason });
                }
                Err(e) => {
                    warn!("fetch task panicked: {e}");
                }
            }
        }

        info!(
            processed = report.images.len(),
            rejected = report.rejections.len(),
            bytes = report.bytes_downloaded,
            "acquisition finished"
        );
        report
    }
}

/// Download and process a single candidate.
///
/// Returns the processed image plus downloaded byte count on success, or
/// the rejection reason plus whatever was downloaded before failing.
async fn fetch_one(
    source: &Arc<dyn ImageSource>,
    candidate: &Candidate,
    fetch: &FetchConfig,
    thumbnail: &ThumbnailConfig,
    hasher: &Arc<Hasher>,
) -> Result<(ProcessedImage, u64), (RejectionReason, u64)> {
    let started = std::time::Instant::now();
    let timeout = Duration::from_millis(fetch.timeout_ms);

    let bytes = match tokio::time::timeout(
        timeout,
        source.fetch(&candidate.image_url, fetch.max_size_bytes()),
    )
    .await
    {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(failure)) => return Err((failure.reason(), 0)),
        Err(_) => return Err((RejectionReason::FetchTimeout, 0)),
    };
    let downloaded = bytes.len() as u64;

    // Decoding and re-encoding are CPU-bound; keep them off the runtime
    let candidate_id = candidate.id.clone();
    let fetch = fetch.clone();
    let thumbnail = thumbnail.clone();
    let hasher = hasher.clone();
    let processed = tokio::task::spawn_blocking(move || {
        process_bytes(&candidate_id, bytes, &fetch, &thumbnail, &hasher, started)
    })
    .await
    .map_err(|_| (RejectionReason::Corrupt, downloaded))?;

    match processed {
        Ok(image) => Ok((image, downloaded)),
        Err(reason) => Err((reason, downloaded)),
    }
}

fn process_bytes(
    candidate_id: &str,
    bytes: Vec<u8>,
    fetch: &FetchConfig,
    thumbnail_config: &ThumbnailConfig,
    hasher: &Hasher,
    started: std::time::Instant,
) -> Result<ProcessedImage, RejectionReason> {
    let decoded = decode::decode_and_validate(&bytes, fetch)?;

    let content_hash = Hasher::content_hash(&bytes);
    let perceptual_hash = hasher.perceptual_hash(&decoded.image);
    let exif = metadata::extract(&bytes);
    let color_mode = decode::color_mode(&decoded.image);
    let thumb = optimize::thumbnail(&decoded.image, thumbnail_config);
    let size_bytes = bytes.len() as u64;
    let optimized = optimize::optimize(&decoded, &bytes, fetch);

    Ok(ProcessedImage {
        candidate_id: candidate_id.to_string(),
        bytes: optimized.bytes,
        width: optimized.width,
        height: optimized.height,
        format: optimized.format,
        content_hash,
        size_bytes,
        thumbnail: thumb,
        perceptual_hash,
        color_mode,
        exif,
        processing_ms: started.elapsed().as_millis() as u64,
    })
}
