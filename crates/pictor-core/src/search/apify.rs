//! Apify Google Images scraper backend.
//!
//! Uses the run-sync-get-dataset-items endpoint: one POST per query, the
//! dataset items come back in the response body. Each item carries an
//! `organicResults` array of image hits.

use super::{RawSearchResult, SearchProvider};
use crate::config::SearchConfig;
use crate::error::ApiError;
use crate::executor::CallOutcome;
use crate::types::SearchQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct ApifySearchProvider {
    api_key: String,
    endpoint: String,
    country_code: String,
    language_code: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl ApifySearchProvider {
    pub fn new(config: &SearchConfig, api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            endpoint: config.endpoint.clone(),
            country_code: config.country_code.clone(),
            language_code: config.language_code.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActorInput {
    queries: String,
    max_pages_per_query: usize,
    results_per_page: usize,
    mobile_results: bool,
    language_code: String,
    country_code: String,
    save_html: bool,
    include_unfiltered_results: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetItem {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrganicResult {
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl SearchProvider for ApifySearchProvider {
    async fn run_query(
        &self,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<CallOutcome<Vec<RawSearchResult>>, ApiError> {
        let results_per_page = limit.min(100);
        let max_pages = limit.div_ceil(results_per_page.max(1));

        let language_code = query
            .locale
            .as_deref()
            .and_then(|l| l.split('-').next())
            .unwrap_or(&self.language_code)
            .to_string();

        let input = ActorInput {
            queries: query.text.clone(),
            max_pages_per_query: max_pages,
            results_per_page,
            mobile_results: false,
            language_code,
            country_code: self.country_code.clone(),
            save_html: false,
            include_unfiltered_results: !query.safe_search,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&input)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout {
                        provider: "search".to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    ApiError::Network {
                        provider: "search".to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                provider: "search".to_string(),
                status: status.as_u16(),
                message: text,
            });
        }

        let items: Vec<DatasetItem> = resp.json().await.map_err(|e| ApiError::InvalidResponse {
            provider: "search".to_string(),
            message: format!("failed to parse dataset items: {e}"),
        })?;

        let rows = items
            .into_iter()
            .flat_map(|item| item.organic_results)
            .filter_map(|r| {
                let image_url = r.image_url?;
                Some(RawSearchResult {
                    thumbnail_url: r.thumbnail_url,
                    source_url: r.url.unwrap_or_default(),
                    title: r.title.unwrap_or_default(),
                    description: r.description.filter(|d| !d.is_empty()),
                    image_url,
                })
            })
            .collect();

        // Apify bills per actor run, one unit per call
        Ok(CallOutcome::billed(rows, 1, 0.0))
    }
}
