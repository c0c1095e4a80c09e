//! Airtable-style metadata store.
//!
//! Records go to POST {endpoint}/{base_id}/{table} as a `records` array of
//! `fields` objects; updates PATCH a single record by its store-assigned id;
//! lookups filter on the candidate id field. The caller is responsible for
//! keeping batches within the 10-record API cap; this type just sends what
//! it is given.

use super::{ImageRecord, RecordStore, StoredRecord};
use crate::config::StorageConfig;
use crate::error::ApiError;
use crate::types::CostEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

pub struct AirtableStore {
    api_key: String,
    records_url: String,
    costs_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl AirtableStore {
    pub fn new(config: &StorageConfig, api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            records_url: format!("{}/{}/{}", config.endpoint, config.base_id, config.table),
            costs_url: format!("{}/{}/{}", config.endpoint, config.base_id, config.cost_table),
            timeout: Duration::from_millis(config.timeout_ms),
            client: reqwest::Client::new(),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = request
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout {
                        provider: "storage".to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    ApiError::Network {
                        provider: "storage".to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                provider: "storage".to_string(),
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(resp)
    }
}

#[derive(Serialize)]
struct BatchCreateRequest {
    records: Vec<RecordEnvelope>,
}

#[derive(Serialize)]
struct RecordEnvelope {
    fields: serde_json::Value,
}

#[derive(Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    records: Vec<RecordResponse>,
}

#[derive(Deserialize)]
struct RecordResponse {
    id: String,
    #[serde(default)]
    fields: serde_json::Value,
}

fn parse_records(e: serde_json::Error) -> ApiError {
    ApiError::InvalidResponse {
        provider: "storage".to_string(),
        message: format!("failed to parse records response: {e}"),
    }
}

/// Flatten an [`ImageRecord`] into Airtable field names.
fn to_fields(record: &ImageRecord) -> serde_json::Value {
    json!({
        "Candidate ID": record.candidate_id,
        "Query": record.query,
        "Title": record.title,
        "Source URL": record.source_url,
        "Image URL": record.image_url,
        "Hosted URL": record.hosted_url,
        "Description": record.description,
        "Tags": record.tags.join(", "),
        "Relevance": record.relevance,
        "Quality": record.quality,
        "Confidence": record.confidence,
        "Total Score": record.total_score,
        "Rank": record.rank,
        "Width": record.width,
        "Height": record.height,
        "Format": record.format,
        "Size Bytes": record.size_bytes,
        "Content Hash": record.content_hash,
        "Run Cost USD": record.run_cost_usd,
    })
}

fn cost_fields(entry: &CostEntry) -> serde_json::Value {
    json!({
        "Provider": entry.provider,
        "Operation": entry.operation,
        "Units": entry.units,
        "USD Cost": entry.usd_cost,
        "Timestamp MS": entry.timestamp_ms,
    })
}

#[async_trait]
impl RecordStore for AirtableStore {
    async fn create_batch(&self, records: &[ImageRecord]) -> Result<usize, ApiError> {
        let body = BatchCreateRequest {
            records: records
                .iter()
                .map(|r| RecordEnvelope { fields: to_fields(r) })
                .collect(),
        };

        let resp = self.send(self.client.post(&self.records_url).json(&body)).await?;
        let created: RecordsResponse =
            serde_json::from_str(&resp.text().await.unwrap_or_default()).map_err(parse_records)?;
        Ok(created.records.len())
    }

    async fn update(&self, record_id: &str, record: &ImageRecord) -> Result<(), ApiError> {
        let url = format!("{}/{}", self.records_url, record_id);
        let body = json!({ "fields": to_fields(record) });
        self.send(self.client.patch(&url).json(&body)).await?;
        Ok(())
    }

    async fn find_by_candidate(&self, candidate_id: &str) -> Result<Vec<StoredRecord>, ApiError> {
        // Candidate ids are hex, safe to splice into the filter formula
        let formula = format!("{{Candidate ID}} = '{candidate_id}'");
        let resp = self
            .send(
                self.client
                    .get(&self.records_url)
                    .query(&[("filterByFormula", formula.as_str())]),
            )
            .await?;

        let found: RecordsResponse =
            serde_json::from_str(&resp.text().await.unwrap_or_default()).map_err(parse_records)?;
        Ok(found
            .records
            .into_iter()
            .map(|r| StoredRecord {
                record_id: r.id,
                fields: r.fields,
            })
            .collect())
    }

    async fn create_cost_entries(&self, entries: &[CostEntry]) -> Result<usize, ApiError> {
        let body = BatchCreateRequest {
            records: entries
                .iter()
                .map(|e| RecordEnvelope { fields: cost_fields(e) })
                .collect(),
        };

        let resp = self.send(self.client.post(&self.costs_url).json(&body)).await?;
        let created: RecordsResponse =
            serde_json::from_str(&resp.text().await.unwrap_or_default()).map_err(parse_records)?;
        Ok(created.records.len())
    }
}
