//! Run orchestration: search, acquire, analyze, select, persist.
//!
//! Data flows strictly forward and every stage produces new records keyed
//! by candidate id. The run never returns an error: fatal failures are
//! recorded on the report and the summary is emitted regardless, so a
//! fully failed run still tells the operator what happened.

use crate::config::{resolve_env_var, Config};
use crate::error::{ConfigError, PictorError};
use crate::executor::RequestExecutor;
use crate::fetch::{FetchReport, HttpImageSource, ImageFetcher, ImageSource};
use crate::search::{
    ApifySearchProvider, SearchClient, SearchProvider, SEARCH_PROVIDER,
};
use crate::select::{SelectionEngine, SelectionOutcome, SelectionResult};
use crate::store::{
    AirtableStore, HostedImage, ImageHost, ImageRecord, ImgbbHost, RecordStore, StorageAdapter,
    HOSTING_PROVIDER, STORAGE_PROVIDER,
};
use crate::types::{Candidate, ProcessedImage, RunSummary, SearchQuery};
use crate::vision::{ImageAnalysis, OpenRouterGateway, VisionEngine, VisionGateway, VISION_PROVIDER};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Everything a run produced, fatal or not.
#[derive(Debug, Default)]
pub struct RunReport {
    pub summary: RunSummary,

    /// Full selection output, when the run got that far
    pub selection: Option<SelectionOutcome>,

    /// Re-hosted winners, when hosting is enabled
    pub hosted: Vec<HostedImage>,

    /// A failure that stopped the run early
    pub fatal: Option<String>,
}

impl RunReport {
    /// The winning results in rank order.
    pub fn winners(&self) -> Vec<&SelectionResult> {
        self.selection
            .as_ref()
            .map(|s| s.results.iter().filter(|r| r.rank.is_some()).collect())
            .unwrap_or_default()
    }
}

/// The search-and-vetting pipeline behind one `run` call.
pub struct Agent {
    config: Config,
    executor: Arc<RequestExecutor>,
    search: SearchClient,
    fetcher: ImageFetcher,
    vision: VisionEngine,
    selector: SelectionEngine,
    storage: StorageAdapter,
}

impl Agent {
    /// Wire an agent from explicit collaborators. Mock boundaries go here.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        search_provider: Arc<dyn SearchProvider>,
        image_source: Arc<dyn ImageSource>,
        gateway: Arc<dyn VisionGateway>,
        host: Arc<dyn ImageHost>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let mut executor = RequestExecutor::new(&config.retry);
        executor.register_provider(SEARCH_PROVIDER, config.search.rate_limit);
        executor.register_provider(VISION_PROVIDER, config.analysis.rate_limit);
        executor.register_provider(HOSTING_PROVIDER, config.hosting.rate_limit);
        executor.register_provider(STORAGE_PROVIDER, config.storage.rate_limit);
        let executor = Arc::new(executor);

        Self {
            search: SearchClient::new(search_provider, executor.clone()),
            fetcher: ImageFetcher::new(
                image_source,
                config.fetch.clone(),
                config.thumbnail.clone(),
            ),
            vision: VisionEngine::new(gateway, executor.clone(), config.analysis.clone()),
            selector: SelectionEngine::new(config.selection.diversity.clone()),
            storage: StorageAdapter::new(host, store, executor.clone(), config.storage.batch_size),
            executor,
            config,
        }
    }

    /// Wire an agent against the real providers in the configuration.
    pub fn from_config(config: Config) -> Result<Self, PictorError> {
        let search_key = require_credential(&config.search.api_key, "search.api_key")?;
        let vision_key = require_credential(&config.analysis.api_key, "analysis.api_key")?;

        let search_provider = Arc::new(ApifySearchProvider::new(&config.search, &search_key));
        let image_source = Arc::new(HttpImageSource::new(Duration::from_millis(
            config.fetch.timeout_ms,
        )));
        let gateway = Arc::new(OpenRouterGateway::new(&config.analysis, &vision_key));

        let hosting_key = if config.hosting.enabled {
            require_credential(&config.hosting.api_key, "hosting.api_key")?
        } else {
            String::new()
        };
        let storage_key = if config.storage.enabled {
            require_credential(&config.storage.api_key, "storage.api_key")?
        } else {
            String::new()
        };
        let host = Arc::new(ImgbbHost::new(&config.hosting, &hosting_key));
        let store = Arc::new(AirtableStore::new(&config.storage, &storage_key));

        Ok(Self::new(
            config,
            search_provider,
            image_source,
            gateway,
            host,
            store,
        ))
    }

    /// Run the full pipeline for one query.
    ///
    /// `top_k` overrides the configured winner count when given.
    pub async fn run(&self, query: &SearchQuery, top_k: Option<usize>) -> RunReport {
        let started = Instant::now();
        let deadline = match self.config.run.global_deadline_ms {
            0 => None,
            ms => Some(started + Duration::from_millis(ms)),
        };
        let top_k = top_k.unwrap_or(self.config.selection.top_k);

        let mut report = RunReport::default();
        self.run_stages(query, top_k, deadline, &mut report).await;

        report.summary.total_cost_usd = self.executor.ledger().total_usd();
        report.summary.duration_ms = started.elapsed().as_millis() as u64;
        if let Some(fatal) = &report.fatal {
            report.summary.errors.push(fatal.clone());
        }

        info!(
            attempted = report.summary.attempted,
            processed = report.summary.processed,
            rejected = report.summary.rejected,
            analyzed = report.summary.analyzed,
            selected = report.summary.selected,
            cost_usd = report.summary.total_cost_usd,
            duration_ms = report.summary.duration_ms,
            "run finished"
        );
        report
    }

    async fn run_stages(
        &self,
        query: &SearchQuery,
        top_k: usize,
        deadline: Option<Instant>,
        report: &mut RunReport,
    ) {
        // Stage 1: search (run-fatal on failure)
        let candidates = match self
            .search
            .search(query, self.config.search.result_limit)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "search failed");
                report.fatal = Some(format!("search: {e}"));
                return;
            }
        };
        report.summary.attempted = candidates.len();
        if candidates.is_empty() {
            info!("search returned no candidates");
            return;
        }

        if expired(deadline, report, "acquisition") {
            return;
        }

        // Stage 2: acquire and validate (per-item isolation)
        let fetch_report = self.fetcher.fetch_all(&candidates).await;
        record_fetch(&fetch_report, &mut report.summary);
        if fetch_report.images.is_empty() {
            return;
        }

        if expired(deadline, report, "analysis") {
            return;
        }

        // Stage 3: vision analysis (per-item isolation)
        let analyses = self
            .vision
            .analyze_all(&fetch_report.images, &query.text)
            .await;
        report.summary.analyzed = analyses.iter().filter(|a| !a.failed).count();
        report.summary.analysis_failed = analyses.iter().filter(|a| a.failed).count();

        let consensuses: Vec<_> = analyses
            .iter()
            .filter_map(|a| a.consensus.clone())
            .collect();
        if consensuses.is_empty() {
            warn!("no image produced a usable analysis");
            return;
        }

        // Stage 4: selection (invalid criteria is run-fatal)
        let outcome = match self.selector.select(
            &consensuses,
            &fetch_report.images,
            &self.config.selection.criteria,
            top_k,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "selection failed");
                report.fatal = Some(format!("selection: {e}"));
                return;
            }
        };
        report.summary.selected = outcome.selected.len();
        report.selection = Some(outcome);

        if expired(deadline, report, "storage") {
            return;
        }

        // Stage 5: host and persist (run-fatal on failure)
        if let Err(e) = self
            .store_winners(query, &candidates, &fetch_report.images, &analyses, report)
            .await
        {
            error!(error = %e, "storage failed");
            report.fatal = Some(format!("storage: {e}"));
        }
    }

    async fn store_winners(
        &self,
        query: &SearchQuery,
        candidates: &[Candidate],
        images: &[ProcessedImage],
        analyses: &[ImageAnalysis],
        report: &mut RunReport,
    ) -> Result<(), PictorError> {
        let Some(selection) = &report.selection else {
            return Ok(());
        };

        let candidate_by_id: HashMap<&str, &Candidate> =
            candidates.iter().map(|c| (c.id.as_str(), c)).collect();
        let image_by_id: HashMap<&str, &ProcessedImage> =
            images.iter().map(|i| (i.candidate_id.as_str(), i)).collect();
        let analysis_by_id: HashMap<&str, &ImageAnalysis> = analyses
            .iter()
            .map(|a| (a.candidate_id.as_str(), a))
            .collect();

        let winners: Vec<&SelectionResult> = selection
            .results
            .iter()
            .filter(|r| r.rank.is_some())
            .collect();

        let mut hosted_by_id: HashMap<String, HostedImage> = HashMap::new();
        if self.config.hosting.enabled {
            for winner in &winners {
                let Some(image) = image_by_id.get(winner.candidate_id.as_str()) else {
                    continue;
                };
                let name = format!("{}.{}", winner.candidate_id, image.format);
                let hosted = self
                    .storage
                    .host_image(&winner.candidate_id, &image.bytes, &name)
                    .await
                    .map_err(PictorError::Storage)?;
                hosted_by_id.insert(winner.candidate_id.clone(), hosted);
            }
        }

        if self.config.storage.enabled {
            let run_cost = self.executor.ledger().total_usd();
            let records: Vec<ImageRecord> = winners
                .iter()
                .filter_map(|winner| {
                    let candidate = candidate_by_id.get(winner.candidate_id.as_str())?;
                    let image = image_by_id.get(winner.candidate_id.as_str())?;
                    let consensus = analysis_by_id
                        .get(winner.candidate_id.as_str())
                        .and_then(|a| a.consensus.as_ref())?;
                    let hosted_url = hosted_by_id
                        .get(&winner.candidate_id)
                        .map(|h| h.public_url.clone())
                        .unwrap_or_else(|| candidate.image_url.clone());

                    Some(ImageRecord {
                        candidate_id: winner.candidate_id.clone(),
                        query: query.text.clone(),
                        title: candidate.title.clone(),
                        source_url: candidate.source_url.clone(),
                        image_url: candidate.image_url.clone(),
                        hosted_url,
                        description: consensus.description.clone(),
                        tags: consensus.tags.clone(),
                        relevance: consensus.relevance,
                        quality: consensus.quality,
                        confidence: consensus.confidence,
                        total_score: winner.total_score,
                        rank: winner.rank.unwrap_or(0),
                        width: image.width,
                        height: image.height,
                        format: image.format.clone(),
                        size_bytes: image.size_bytes,
                        content_hash: image.content_hash.clone(),
                        run_cost_usd: run_cost,
                    })
                })
                .collect();

            self.storage
                .persist_records(&records)
                .await
                .map_err(PictorError::Storage)?;

            let entries = self.executor.ledger().entries();
            if !entries.is_empty() {
                self.storage
                    .persist_costs(&entries)
                    .await
                    .map_err(PictorError::Storage)?;
            }
        }

        report.hosted = hosted_by_id.into_values().collect();
        Ok(())
    }
}

fn record_fetch(fetch_report: &FetchReport, summary: &mut RunSummary) {
    summary.processed = fetch_report.images.len();
    summary.rejected = fetch_report.rejections.len();
    summary.bytes_downloaded = fetch_report.bytes_downloaded;
    for rejection in &fetch_report.rejections {
        *summary
            .rejection_reasons
            .entry(rejection.reason.as_str().to_string())
            .or_default() += 1;
    }
}

/// Check the global deadline before scheduling a new stage.
fn expired(deadline: Option<Instant>, report: &mut RunReport, stage: &str) -> bool {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            warn!(stage, "global deadline expired, skipping remaining stages");
            report
                .summary
                .errors
                .push(format!("deadline expired before {stage}"));
            true
        }
        _ => false,
    }
}

fn require_credential(value: &str, key: &str) -> Result<String, ConfigError> {
    resolve_env_var(value).ok_or_else(|| ConfigError::MissingCredential(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSpec;
    use crate::error::ApiError;
    use crate::executor::CallOutcome;
    use crate::fetch::FetchFailure;
    use crate::search::RawSearchResult;
    use crate::store::StoredRecord;
    use crate::types::CostEntry;
    use crate::vision::{GatewayResponse, VisionRequest};
    use async_trait::async_trait;
    use base64::Engine;
    use image::{DynamicImage, ImageFormat};
    use std::io::Cursor;
    use std::sync::Mutex;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    struct FakeSearch {
        rows: Vec<RawSearchResult>,
    }

    #[async_trait]
    impl SearchProvider for FakeSearch {
        async fn run_query(
            &self,
            _query: &SearchQuery,
            _limit: usize,
        ) -> Result<CallOutcome<Vec<RawSearchResult>>, ApiError> {
            Ok(CallOutcome::unbilled(self.rows.clone()))
        }
    }

    struct MapSource {
        responses: HashMap<String, Result<Vec<u8>, FetchFailure>>,
    }

    #[async_trait]
    impl ImageSource for MapSource {
        async fn fetch(&self, url: &str, _max_bytes: u64) -> Result<Vec<u8>, FetchFailure> {
            self.responses
                .get(url)
                .cloned()
                .unwrap_or(Err(FetchFailure::Failed("unknown url".to_string())))
        }
    }

    /// Gateway scripted by (model, base64 image data) with an optional
    /// one-shot primary failure.
    struct ScriptedGateway {
        scores_by_data: HashMap<String, (f64, f64)>,
        fail_primary_for_data: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VisionGateway for ScriptedGateway {
        async fn analyze(&self, request: &VisionRequest) -> Result<GatewayResponse, ApiError> {
            self.calls.lock().unwrap().push(request.model_id.clone());

            if request.model_id == "primary"
                && self.fail_primary_for_data.as_deref() == Some(request.image.data.as_str())
            {
                return Err(ApiError::Http {
                    provider: "vision".to_string(),
                    status: 500,
                    message: "scripted primary failure".to_string(),
                });
            }

            let (relevance, quality) = self
                .scores_by_data
                .get(&request.image.data)
                .copied()
                .unwrap_or((0.5, 0.5));
            Ok(GatewayResponse {
                text: format!(
                    r#"{{"relevance_score": {relevance}, "quality_score": {quality}, "description": "scripted"}}"#
                ),
                model: request.model_id.clone(),
                total_tokens: Some(200),
            })
        }
    }

    struct RecordingHost {
        uploads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageHost for RecordingHost {
        async fn upload(
            &self,
            candidate_id: &str,
            bytes: &[u8],
            _name: &str,
        ) -> Result<HostedImage, ApiError> {
            self.uploads.lock().unwrap().push(candidate_id.to_string());
            Ok(HostedImage {
                candidate_id: candidate_id.to_string(),
                public_url: format!("https://cdn.example/{candidate_id}"),
                thumbnail_url: None,
                delete_handle: None,
                size_bytes: bytes.len() as u64,
            })
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        records: Mutex<Vec<ImageRecord>>,
        costs: Mutex<Vec<CostEntry>>,
    }

    #[async_trait]
    impl RecordStore for RecordingStore {
        async fn create_batch(&self, records: &[ImageRecord]) -> Result<usize, ApiError> {
            self.records.lock().unwrap().extend_from_slice(records);
            Ok(records.len())
        }

        async fn update(&self, _record_id: &str, _record: &ImageRecord) -> Result<(), ApiError> {
            Ok(())
        }

        async fn find_by_candidate(
            &self,
            _candidate_id: &str,
        ) -> Result<Vec<StoredRecord>, ApiError> {
            Ok(vec![])
        }

        async fn create_cost_entries(&self, entries: &[CostEntry]) -> Result<usize, ApiError> {
            self.costs.lock().unwrap().extend_from_slice(entries);
            Ok(entries.len())
        }
    }

    fn row(url: &str) -> RawSearchResult {
        RawSearchResult {
            image_url: url.to_string(),
            source_url: format!("{url}/page"),
            title: url.to_string(),
            ..Default::default()
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.retry.attempts = 0;
        config.analysis.models = vec![
            ModelSpec {
                id: "primary".to_string(),
                trust_weight: 1.0,
                cost_per_million_tokens: 2.0,
            },
            ModelSpec {
                id: "fallback".to_string(),
                trust_weight: 0.8,
                cost_per_million_tokens: 0.5,
            },
        ];
        config.analysis.consensus_models = 1;
        config
    }

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[tokio::test]
    async fn test_full_run_with_download_failures_and_fallback() {
        // 5 candidates: 2 fail download (404 and timeout), 3 process.
        // The primary model fails for one image and falls back.
        let best = png_bytes(800, 600);
        let mid = png_bytes(640, 480);
        let worst = png_bytes(512, 384);

        let search = FakeSearch {
            rows: vec![
                row("https://a/best.png"),
                row("https://b/404.png"),
                row("https://c/mid.png"),
                row("https://d/timeout.png"),
                row("https://e/worst.png"),
            ],
        };

        let mut responses = HashMap::new();
        responses.insert("https://a/best.png".to_string(), Ok(best.clone()));
        responses.insert(
            "https://b/404.png".to_string(),
            Err(FetchFailure::Failed("HTTP 404".to_string())),
        );
        responses.insert("https://c/mid.png".to_string(), Ok(mid.clone()));
        responses.insert("https://d/timeout.png".to_string(), Err(FetchFailure::TimedOut));
        responses.insert("https://e/worst.png".to_string(), Ok(worst.clone()));

        let gateway = ScriptedGateway {
            scores_by_data: HashMap::from([
                (b64(&best), (0.95, 0.9)),
                (b64(&mid), (0.6, 0.7)),
                (b64(&worst), (0.3, 0.4)),
            ]),
            // Primary dies for the mid image; the fallback covers it
            fail_primary_for_data: Some(b64(&mid)),
            calls: Mutex::new(Vec::new()),
        };

        let host = Arc::new(RecordingHost {
            uploads: Mutex::new(Vec::new()),
        });
        let store = Arc::new(RecordingStore::default());

        let agent = Agent::new(
            test_config(),
            Arc::new(search),
            Arc::new(MapSource { responses }),
            Arc::new(gateway),
            host.clone(),
            store.clone(),
        );

        let report = agent.run(&SearchQuery::new("mountain sunrise"), Some(1)).await;

        assert!(report.fatal.is_none());
        let summary = &report.summary;
        assert_eq!(summary.attempted, 5);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.rejection_reasons["fetch-failed"], 1);
        assert_eq!(summary.rejection_reasons["fetch-timeout"], 1);
        assert_eq!(summary.analyzed, 3);
        assert_eq!(summary.analysis_failed, 0);
        assert_eq!(summary.selected, 1);
        assert!(summary.total_cost_usd > 0.0);

        // The winner is the candidate with the highest weighted score
        let winner_id = Candidate::id_for_url("https://a/best.png");
        let selection = report.selection.as_ref().unwrap();
        assert_eq!(selection.selected, vec![winner_id.clone()]);

        // Winner was hosted and persisted with the hosted URL
        assert_eq!(*host.uploads.lock().unwrap(), vec![winner_id.clone()]);
        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].candidate_id, winner_id);
        assert_eq!(records[0].hosted_url, format!("https://cdn.example/{winner_id}"));
        assert_eq!(records[0].rank, 1);

        // Vision calls were billed, so the cost ledger reached the store
        assert!(!store.costs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_search_completes_without_error() {
        let agent = Agent::new(
            test_config(),
            Arc::new(FakeSearch { rows: vec![] }),
            Arc::new(MapSource {
                responses: HashMap::new(),
            }),
            Arc::new(ScriptedGateway {
                scores_by_data: HashMap::new(),
                fail_primary_for_data: None,
                calls: Mutex::new(Vec::new()),
            }),
            Arc::new(RecordingHost {
                uploads: Mutex::new(Vec::new()),
            }),
            Arc::new(RecordingStore::default()),
        );

        let report = agent.run(&SearchQuery::new("xyzzy"), None).await;
        assert!(report.fatal.is_none());
        assert_eq!(report.summary.attempted, 0);
        assert_eq!(report.summary.processed, 0);
        assert_eq!(report.summary.selected, 0);
        assert!(report.selection.is_none());
    }

    #[tokio::test]
    async fn test_search_failure_is_fatal_but_summary_emitted() {
        struct BrokenSearch;

        #[async_trait]
        impl SearchProvider for BrokenSearch {
            async fn run_query(
                &self,
                _query: &SearchQuery,
                _limit: usize,
            ) -> Result<CallOutcome<Vec<RawSearchResult>>, ApiError> {
                Err(ApiError::Http {
                    provider: "search".to_string(),
                    status: 402,
                    message: "credits exhausted".to_string(),
                })
            }
        }

        let agent = Agent::new(
            test_config(),
            Arc::new(BrokenSearch),
            Arc::new(MapSource {
                responses: HashMap::new(),
            }),
            Arc::new(ScriptedGateway {
                scores_by_data: HashMap::new(),
                fail_primary_for_data: None,
                calls: Mutex::new(Vec::new()),
            }),
            Arc::new(RecordingHost {
                uploads: Mutex::new(Vec::new()),
            }),
            Arc::new(RecordingStore::default()),
        );

        let report = agent.run(&SearchQuery::new("cats"), None).await;
        let fatal = report.fatal.as_ref().unwrap();
        assert!(fatal.contains("search"));
        assert!(fatal.contains("quota"));
        assert_eq!(report.summary.attempted, 0);
        assert_eq!(report.summary.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_hosting_disabled_persists_original_url() {
        let bytes = png_bytes(800, 600);
        let mut config = test_config();
        config.hosting.enabled = false;

        let mut responses = HashMap::new();
        responses.insert("https://a/only.png".to_string(), Ok(bytes.clone()));

        let host = Arc::new(RecordingHost {
            uploads: Mutex::new(Vec::new()),
        });
        let store = Arc::new(RecordingStore::default());

        let agent = Agent::new(
            config,
            Arc::new(FakeSearch {
                rows: vec![row("https://a/only.png")],
            }),
            Arc::new(MapSource { responses }),
            Arc::new(ScriptedGateway {
                scores_by_data: HashMap::from([(b64(&bytes), (0.9, 0.9))]),
                fail_primary_for_data: None,
                calls: Mutex::new(Vec::new()),
            }),
            host.clone(),
            store.clone(),
        );

        let report = agent.run(&SearchQuery::new("cats"), Some(1)).await;
        assert!(report.fatal.is_none());
        assert!(host.uploads.lock().unwrap().is_empty());

        let records = store.records.lock().unwrap();
        assert_eq!(records[0].hosted_url, "https://a/only.png");
    }
}
