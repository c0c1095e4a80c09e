//! Storage adapter: image re-hosting and metadata persistence.
//!
//! The adapter owns the host and record-store boundaries, chunks record
//! batches, and routes every call through the executor. It knows nothing
//! about how winners were chosen.

mod airtable;
mod imgbb;

pub use airtable::AirtableStore;
pub use imgbb::ImgbbHost;

use crate::error::{ApiError, StorageError};
use crate::executor::{CallOutcome, RequestExecutor};
use crate::types::CostEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Rate-limit provider name for the image host.
pub const HOSTING_PROVIDER: &str = "hosting";
/// Rate-limit provider name for the record store.
pub const STORAGE_PROVIDER: &str = "storage";

/// A re-hosted image, as reported by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedImage {
    pub candidate_id: String,

    /// Public CDN URL
    pub public_url: String,

    /// Host-generated thumbnail URL, when provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    /// Opaque handle for later deletion, when the host provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_handle: Option<String>,

    /// Size reported by the host in bytes
    pub size_bytes: u64,
}

/// One persisted record for a selected image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub candidate_id: String,
    pub query: String,
    pub title: String,
    pub source_url: String,
    pub image_url: String,

    /// Re-hosted URL; the original URL when hosting is disabled
    pub hosted_url: String,

    pub description: String,
    pub tags: Vec<String>,
    pub relevance: f64,
    pub quality: f64,
    pub confidence: f64,
    pub total_score: f64,
    pub rank: u32,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub size_bytes: u64,
    pub content_hash: String,

    /// Run cost attributed to this record's run, in USD
    pub run_cost_usd: f64,
}

/// The outbound boundary to an image host.
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload image bytes; `name` is a display name for the host.
    async fn upload(
        &self,
        candidate_id: &str,
        bytes: &[u8],
        name: &str,
    ) -> Result<HostedImage, ApiError>;
}

/// A record as the store returned it, with its store-assigned id.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub record_id: String,
    pub fields: serde_json::Value,
}

/// The outbound boundary to a metadata store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create one batch of records (already within the store's batch cap).
    /// Returns the number of records created.
    async fn create_batch(&self, records: &[ImageRecord]) -> Result<usize, ApiError>;

    /// Overwrite the fields of an existing record.
    async fn update(&self, record_id: &str, record: &ImageRecord) -> Result<(), ApiError>;

    /// Fetch existing records for a candidate id.
    async fn find_by_candidate(&self, candidate_id: &str) -> Result<Vec<StoredRecord>, ApiError>;

    /// Create one batch of cost entries. Returns the number created.
    async fn create_cost_entries(&self, entries: &[CostEntry]) -> Result<usize, ApiError>;
}

/// Hosts winners and persists their records through the executor.
pub struct StorageAdapter {
    host: Arc<dyn ImageHost>,
    store: Arc<dyn RecordStore>,
    executor: Arc<RequestExecutor>,
    batch_size: usize,
}

impl StorageAdapter {
    pub fn new(
        host: Arc<dyn ImageHost>,
        store: Arc<dyn RecordStore>,
        executor: Arc<RequestExecutor>,
        batch_size: usize,
    ) -> Self {
        Self {
            host,
            store,
            executor,
            batch_size: batch_size.max(1),
        }
    }

    /// Re-host one selected image.
    pub async fn host_image(
        &self,
        candidate_id: &str,
        bytes: &[u8],
        name: &str,
    ) -> Result<HostedImage, StorageError> {
        let host = self.host.clone();
        self.executor
            .execute(HOSTING_PROVIDER, "upload", || {
                let host = host.clone();
                async move {
                    let hosted = host.upload(candidate_id, bytes, name).await?;
                    Ok(CallOutcome::unbilled(hosted))
                }
            })
            .await
            .map_err(StorageError::Hosting)
    }

    /// Persist records, updating candidates that already have one and
    /// batch-creating the rest, chunked to the store's batch cap.
    pub async fn persist_records(&self, records: &[ImageRecord]) -> Result<usize, StorageError> {
        let mut to_create: Vec<&ImageRecord> = Vec::new();
        let mut updated = 0;
        for record in records {
            match self.find_records(&record.candidate_id).await?.first() {
                Some(existing) => {
                    self.update_record(&existing.record_id, record).await?;
                    updated += 1;
                }
                None => to_create.push(record),
            }
        }

        let mut created = 0;
        for chunk in to_create.chunks(self.batch_size) {
            let store = self.store.clone();
            let chunk: Vec<ImageRecord> = chunk.iter().map(|r| (*r).clone()).collect();
            created += self
                .executor
                .execute(STORAGE_PROVIDER, "batch-create", || {
                    let store = store.clone();
                    let chunk = chunk.clone();
                    async move {
                        let count = store.create_batch(&chunk).await?;
                        Ok(CallOutcome::unbilled(count))
                    }
                })
                .await
                .map_err(StorageError::Records)?;
        }
        info!(created, updated, "records persisted");
        Ok(created + updated)
    }

    /// Overwrite one existing record.
    pub async fn update_record(
        &self,
        record_id: &str,
        record: &ImageRecord,
    ) -> Result<(), StorageError> {
        let store = self.store.clone();
        self.executor
            .execute(STORAGE_PROVIDER, "update", || {
                let store = store.clone();
                async move {
                    store.update(record_id, record).await?;
                    Ok(CallOutcome::unbilled(()))
                }
            })
            .await
            .map_err(StorageError::Records)
    }

    /// Fetch existing records for a candidate id.
    pub async fn find_records(
        &self,
        candidate_id: &str,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let store = self.store.clone();
        self.executor
            .execute(STORAGE_PROVIDER, "find", || {
                let store = store.clone();
                async move {
                    let found = store.find_by_candidate(candidate_id).await?;
                    Ok(CallOutcome::unbilled(found))
                }
            })
            .await
            .map_err(StorageError::Records)
    }

    /// Persist the run's cost entries, chunked to the store's batch cap.
    pub async fn persist_costs(&self, entries: &[CostEntry]) -> Result<usize, StorageError> {
        let mut created = 0;
        for chunk in entries.chunks(self.batch_size) {
            let store = self.store.clone();
            created += self
                .executor
                .execute(STORAGE_PROVIDER, "cost-entries", || {
                    let store = store.clone();
                    async move {
                        let count = store.create_cost_entries(chunk).await?;
                        Ok(CallOutcome::unbilled(count))
                    }
                })
                .await
                .map_err(StorageError::Records)?;
        }
        Ok(created)
    }
}
