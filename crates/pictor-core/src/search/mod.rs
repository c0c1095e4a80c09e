//! Image search: provider trait, Apify-backed implementation, and the
//! client that turns raw provider rows into deduplicated candidates.

mod apify;

pub use apify::ApifySearchProvider;

use crate::error::SearchError;
use crate::executor::{CallOutcome, RequestExecutor};
use crate::types::{Candidate, SearchQuery};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Rate-limit provider name for the search provider.
pub const SEARCH_PROVIDER: &str = "search";

/// One raw row from a search provider, before dedup and id assignment.
#[derive(Debug, Clone, Default)]
pub struct RawSearchResult {
    pub image_url: String,
    pub source_url: String,
    pub thumbnail_url: Option<String>,
    pub title: String,
    pub description: Option<String>,
}

/// The outbound boundary to a search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query and return raw rows in provider order.
    async fn run_query(
        &self,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<CallOutcome<Vec<RawSearchResult>>, crate::error::ApiError>;
}

/// Turns queries into deduplicated [`Candidate`] lists through the executor.
pub struct SearchClient {
    provider: Arc<dyn SearchProvider>,
    executor: Arc<RequestExecutor>,
}

impl SearchClient {
    pub fn new(provider: Arc<dyn SearchProvider>, executor: Arc<RequestExecutor>) -> Self {
        Self { provider, executor }
    }

    /// Search for up to `limit` candidates.
    ///
    /// Rows with a duplicate or empty image URL are dropped; first
    /// occurrence wins and provider order is otherwise preserved. Zero
    /// results is a valid outcome, not an error.
    pub async fn search(
        &self,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<Vec<Candidate>, SearchError> {
        info!(query = %query.text, limit, "searching for images");

        let provider = self.provider.clone();
        let rows = self
            .executor
            .execute(SEARCH_PROVIDER, "search", || {
                let provider = provider.clone();
                async move { provider.run_query(query, limit).await }
            })
            .await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();
        for row in rows {
            if row.image_url.is_empty() || !seen.insert(row.image_url.clone()) {
                continue;
            }
            candidates.push(Candidate {
                id: Candidate::id_for_url(&row.image_url),
                source_url: row.source_url,
                image_url: row.image_url,
                thumbnail_url: row.thumbnail_url,
                title: row.title,
                description: row.description,
                origin_query: query.text.clone(),
            });
            if candidates.len() >= limit {
                break;
            }
        }

        debug!(count = candidates.len(), "search produced candidates");
        Ok(candidates)
    }
}
