//! Multi-model vision analysis with fallback and consensus.
//!
//! For each image the engine walks the configured model chain through the
//! executor, collecting valid results until it has enough for consensus.
//! A model that fails its calls or returns nothing usable falls through to
//! the next; only when every model fails does the image get a `failed`
//! analysis. The batch itself never aborts.

mod consensus;
mod gateway;
mod parse;

pub use consensus::aggregate;
pub use gateway::{GatewayResponse, ImageInput, OpenRouterGateway, VisionGateway, VisionRequest};
pub use parse::{parse_response, ModelScores, ModelVerdict};

use crate::config::AnalysisConfig;
use crate::executor::{CallOutcome, RequestExecutor};
use crate::types::{AnalysisResult, ConsensusAnalysis, ProcessedImage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Rate-limit provider name for the vision gateway.
pub const VISION_PROVIDER: &str = "vision";

/// Neutral scores used when a model's text carried no recognizable scores.
const NEUTRAL_SCORE: f64 = 0.5;

/// Everything the engine learned about one image.
#[derive(Debug, Clone)]
pub struct ImageAnalysis {
    pub candidate_id: String,
    /// Per-model results that contributed, in dispatch order
    pub results: Vec<AnalysisResult>,
    /// Aggregate; `None` when every model failed
    pub consensus: Option<ConsensusAnalysis>,
    pub failed: bool,
}

/// Walks the model chain and aggregates results per image.
pub struct VisionEngine {
    gateway: Arc<dyn VisionGateway>,
    executor: Arc<RequestExecutor>,
    config: AnalysisConfig,
    trust_weights: HashMap<String, f64>,
}

impl VisionEngine {
    pub fn new(
        gateway: Arc<dyn VisionGateway>,
        executor: Arc<RequestExecutor>,
        config: AnalysisConfig,
    ) -> Self {
        let trust_weights = config
            .models
            .iter()
            .map(|m| (m.id.clone(), m.trust_weight))
            .collect();
        Self {
            gateway,
            executor,
            config,
            trust_weights,
        }
    }

    /// Analyze all images with bounded concurrency, one entry per image.
    pub async fn analyze_all(&self, images: &[ProcessedImage], query: &str) -> Vec<ImageAnalysis> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut handles = Vec::with_capacity(images.len());

        for image in images {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("analysis semaphore closed unexpectedly, stopping batch");
                    break;
                }
            };

            let gateway = self.gateway.clone();
            let executor = self.executor.clone();
            let config = self.config.clone();
            let trust_weights = self.trust_weights.clone();
            let image_input = ImageInput::from_bytes(&image.bytes, &image.format);
            let candidate_id = image.candidate_id.clone();
            let prompt = build_prompt(query);

            handles.push(tokio::spawn(async move {
                let analysis = analyze_one(
                    &gateway,
                    &executor,
                    &config,
                    &trust_weights,
                    candidate_id,
                    image_input,
                    prompt,
                )
                .await;
                drop(permit);
                analysis
            }));
        }

        let mut analyses = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(analysis) => analyses.push(analysis),
                Err(e) => warn!("analysis task panicked: {e}"),
            }
        }

        info!(
            analyzed = analyses.iter().filter(|a| !a.failed).count(),
            failed = analyses.iter().filter(|a| a.failed).count(),
            "vision analysis finished"
        );
        analyses
    }
}

/// The analysis prompt, asking for a JSON assessment with the origin
/// query embedded for relevance scoring.
fn build_prompt(query: &str) -> String {
    format!(
        r#"Analyze this image and provide an assessment in JSON format with these fields:
{{
    "description": "detailed description of the image content and scene",
    "objects": ["list", "of", "main", "objects", "visible"],
    "quality_score": 0.95,
    "relevance_score": 0.85
}}

Scores are between 0.0 and 1.0. Be precise and objective.
This image was found for the search query "{query}". Score relevance_score
against that query."#
    )
}

async fn analyze_one(
    gateway: &Arc<dyn VisionGateway>,
    executor: &Arc<RequestExecutor>,
    config: &AnalysisConfig,
    trust_weights: &HashMap<String, f64>,
    candidate_id: String,
    image: ImageInput,
    prompt: String,
) -> ImageAnalysis {
    let mut results: Vec<AnalysisResult> = Vec::new();

    for model in &config.models {
        if results.len() >= config.consensus_models {
            break;
        }

        let request = VisionRequest {
            model_id: model.id.clone(),
            image: image.clone(),
            prompt: prompt.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        let gateway = gateway.clone();
        let cost_per_token = model.cost_per_million_tokens / 1_000_000.0;
        let outcome = executor
            .execute(VISION_PROVIDER, &model.id, || {
                let gateway = gateway.clone();
                let request = request.clone();
                async move {
                    let response = gateway.analyze(&request).await?;
                    // No reported usage means no ledger entry
                    Ok(match response.total_tokens {
                        Some(tokens) => {
                            let cost = tokens as f64 * cost_per_token;
                            CallOutcome::billed(response, tokens as u64, cost)
                        }
                        None => CallOutcome::unbilled(response),
                    })
                }
            })
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                debug!(candidate_id = %candidate_id, model = %model.id, error = %e, "model failed, trying next");
                continue;
            }
        };

        let tokens = response.total_tokens;
        let usd_cost = tokens.unwrap_or(0) as f64 * cost_per_token;
        let result = match parse_response(&response.text) {
            ModelVerdict::Structured(scores) => AnalysisResult {
                candidate_id: candidate_id.clone(),
                model_id: model.id.clone(),
                relevance_score: scores.relevance,
                quality_score: scores.quality,
                description: scores.description,
                tags: scores.tags,
                total_tokens: tokens,
                usd_cost,
                parsed_from_text: false,
            },
            ModelVerdict::Unstructured { text, parsed } => {
                let scores = parsed.unwrap_or(ModelScores {
                    relevance: NEUTRAL_SCORE,
                    quality: NEUTRAL_SCORE,
                    description: text,
                    tags: Vec::new(),
                });
                AnalysisResult {
                    candidate_id: candidate_id.clone(),
                    model_id: model.id.clone(),
                    relevance_score: scores.relevance,
                    quality_score: scores.quality,
                    description: scores.description,
                    tags: scores.tags,
                    total_tokens: tokens,
                    usd_cost,
                    parsed_from_text: true,
                }
            }
            ModelVerdict::Failed(reason) => {
                debug!(candidate_id = %candidate_id, model = %model.id, reason = %reason, "unusable response");
                continue;
            }
        };
        results.push(result);
    }

    let consensus = aggregate(&results, trust_weights);
    let failed = consensus.is_none();
    ImageAnalysis {
        candidate_id,
        results,
        consensus,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelSpec, RetryConfig};
    use crate::error::ApiError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted gateway: responses keyed by model id.
    struct ScriptedGateway {
        responses: HashMap<String, Result<String, u16>>,
        usage: Option<u32>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedGateway {
        fn new(responses: HashMap<String, Result<String, u16>>) -> Self {
            Self {
                responses,
                usage: Some(500),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn without_usage(responses: HashMap<String, Result<String, u16>>) -> Self {
            Self {
                usage: None,
                ..Self::new(responses)
            }
        }
    }

    #[async_trait]
    impl VisionGateway for ScriptedGateway {
        async fn analyze(&self, request: &VisionRequest) -> Result<GatewayResponse, ApiError> {
            self.calls.lock().unwrap().push(request.model_id.clone());
            match self.responses.get(&request.model_id) {
                Some(Ok(text)) => Ok(GatewayResponse {
                    text: text.clone(),
                    model: request.model_id.clone(),
                    total_tokens: self.usage,
                }),
                Some(Err(status)) => Err(ApiError::Http {
                    provider: "vision".to_string(),
                    status: *status,
                    message: "scripted failure".to_string(),
                }),
                None => Err(ApiError::Network {
                    provider: "vision".to_string(),
                    message: "no script".to_string(),
                }),
            }
        }
    }

    fn models(ids: &[&str]) -> Vec<ModelSpec> {
        ids.iter()
            .map(|id| ModelSpec {
                id: id.to_string(),
                trust_weight: 1.0,
                cost_per_million_tokens: 2.0,
            })
            .collect()
    }

    fn config(model_ids: &[&str], consensus_models: usize) -> AnalysisConfig {
        AnalysisConfig {
            models: models(model_ids),
            consensus_models,
            ..Default::default()
        }
    }

    fn engine(
        responses: HashMap<String, Result<String, u16>>,
        config: AnalysisConfig,
    ) -> (VisionEngine, Arc<RequestExecutor>) {
        let executor = Arc::new(RequestExecutor::new(&RetryConfig {
            attempts: 0,
            ..Default::default()
        }));
        (
            VisionEngine::new(Arc::new(ScriptedGateway::new(responses)), executor.clone(), config),
            executor,
        )
    }

    fn image(candidate_id: &str) -> ProcessedImage {
        ProcessedImage {
            candidate_id: candidate_id.to_string(),
            bytes: vec![0u8; 16],
            width: 800,
            height: 600,
            format: "jpeg".to_string(),
            content_hash: "hash".to_string(),
            size_bytes: 16,
            thumbnail: vec![],
            perceptual_hash: "ph".to_string(),
            color_mode: "rgb8".to_string(),
            exif: None,
            processing_ms: 1,
        }
    }

    fn good_json(relevance: f64, quality: f64) -> String {
        format!(r#"{{"relevance_score": {relevance}, "quality_score": {quality}, "description": "a scene"}}"#)
    }

    #[tokio::test]
    async fn test_two_models_reach_consensus() {
        let responses = HashMap::from([
            ("m1".to_string(), Ok(good_json(0.8, 0.8))),
            ("m2".to_string(), Ok(good_json(0.8, 0.8))),
        ]);
        let (engine, _) = engine(responses, config(&["m1", "m2", "m3"], 2));

        let analyses = engine.analyze_all(&[image("c1")], "cats").await;
        let analysis = &analyses[0];
        assert!(!analysis.failed);
        assert_eq!(analysis.results.len(), 2);
        let consensus = analysis.consensus.as_ref().unwrap();
        assert_eq!(consensus.models, vec!["m1", "m2"]);
        assert!(matches!(
            consensus.source,
            crate::types::ConfidenceSource::MultiModel { .. }
        ));
    }

    #[tokio::test]
    async fn test_fallback_past_failing_primary() {
        let responses = HashMap::from([
            ("m1".to_string(), Err(500)),
            ("m2".to_string(), Ok(good_json(0.7, 0.6))),
        ]);
        let (engine, _) = engine(responses, config(&["m1", "m2"], 2));

        let analyses = engine.analyze_all(&[image("c1")], "cats").await;
        let analysis = &analyses[0];
        assert!(!analysis.failed);
        assert_eq!(analysis.results.len(), 1);
        let consensus = analysis.consensus.as_ref().unwrap();
        assert_eq!(consensus.models, vec!["m2"]);
        assert_eq!(consensus.source, crate::types::ConfidenceSource::SingleSource);
        assert_eq!(consensus.confidence, 0.8);
    }

    #[tokio::test]
    async fn test_all_models_failing_marks_image_failed() {
        let responses = HashMap::from([
            ("m1".to_string(), Err(500)),
            ("m2".to_string(), Err(401)),
        ]);
        let (engine, _) = engine(responses, config(&["m1", "m2"], 2));

        let analyses = engine.analyze_all(&[image("c1")], "cats").await;
        assert!(analyses[0].failed);
        assert!(analyses[0].consensus.is_none());
        assert!(analyses[0].results.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_text_uses_neutral_default() {
        let responses = HashMap::from([(
            "m1".to_string(),
            Ok("A lovely image of a sunset.".to_string()),
        )]);
        let (engine, _) = engine(responses, config(&["m1"], 1));

        let analyses = engine.analyze_all(&[image("c1")], "sunsets").await;
        let result = &analyses[0].results[0];
        assert!(result.parsed_from_text);
        assert_eq!(result.relevance_score, NEUTRAL_SCORE);
        assert_eq!(result.quality_score, NEUTRAL_SCORE);
        assert!(!analyses[0].failed);
    }

    #[tokio::test]
    async fn test_model_calls_recorded_in_ledger() {
        let responses = HashMap::from([("m1".to_string(), Ok(good_json(0.9, 0.9)))]);
        let (engine, executor) = engine(responses, config(&["m1"], 1));

        engine.analyze_all(&[image("c1")], "cats").await;

        let entries = executor.ledger().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].provider, "vision");
        assert_eq!(entries[0].operation, "m1");
        assert_eq!(entries[0].units, 500);
        // 500 tokens at $2 per million
        assert!((entries[0].usd_cost - 0.001).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unreported_usage_writes_no_ledger_entry() {
        let responses = HashMap::from([("m1".to_string(), Ok(good_json(0.9, 0.9)))]);
        let executor = Arc::new(RequestExecutor::new(&RetryConfig {
            attempts: 0,
            ..Default::default()
        }));
        let engine = VisionEngine::new(
            Arc::new(ScriptedGateway::without_usage(responses)),
            executor.clone(),
            config(&["m1"], 1),
        );

        let analyses = engine.analyze_all(&[image("c1")], "cats").await;
        assert!(!analyses[0].failed);
        assert_eq!(analyses[0].results[0].usd_cost, 0.0);
        assert!(executor.ledger().entries().is_empty());
    }

    #[tokio::test]
    async fn test_blank_response_falls_through_to_next_model() {
        let responses = HashMap::from([
            ("m1".to_string(), Ok("   \n".to_string())),
            ("m2".to_string(), Ok(good_json(0.7, 0.6))),
        ]);
        let (engine, _) = engine(responses, config(&["m1", "m2"], 1));

        let analyses = engine.analyze_all(&[image("c1")], "cats").await;
        let analysis = &analyses[0];
        assert!(!analysis.failed);
        assert_eq!(analysis.results.len(), 1);
        assert_eq!(analysis.results[0].model_id, "m2");
    }

    #[tokio::test]
    async fn test_batch_isolation_across_images() {
        let responses = HashMap::from([("m1".to_string(), Ok(good_json(0.9, 0.9)))]);
        let (engine, _) = engine(responses, config(&["m1"], 1));

        let analyses = engine.analyze_all(&[image("c1"), image("c2")], "cats").await;
        assert_eq!(analyses.len(), 2);
        assert!(analyses.iter().all(|a| !a.failed));
    }
}
