//! Sub-configuration structs with defaults matching the pipeline design.

use crate::select::{Criterion, Direction, DiversityConfig};
use serde::{Deserialize, Serialize};

/// Search provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Provider endpoint (Apify-style image scraper, run-sync variant)
    pub endpoint: String,

    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Default number of candidates to request
    pub result_limit: usize,

    /// Country code for search localization
    pub country_code: String,

    /// Language code for search localization
    pub language_code: String,

    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,

    /// Rate limit for the search provider
    pub rate_limit: RateLimitConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.apify.com/v2/acts/apify~google-images-scraper/run-sync-get-dataset-items".to_string(),
            api_key: "${APIFY_API_KEY}".to_string(),
            result_limit: 20,
            country_code: "us".to_string(),
            language_code: "en".to_string(),
            timeout_ms: 60_000,
            rate_limit: RateLimitConfig { rate: 100, window_ms: 60_000 },
        }
    }
}

/// Image acquisition and validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum concurrent downloads
    pub concurrency: usize,

    /// Maximum download size in megabytes (aborts mid-stream if exceeded)
    pub max_size_mb: u64,

    /// Minimum acceptable width in pixels
    pub min_width: u32,

    /// Minimum acceptable height in pixels
    pub min_height: u32,

    /// Per-download timeout in milliseconds
    pub timeout_ms: u64,

    /// Accepted decoded formats
    pub allowed_formats: Vec<String>,

    /// Re-encode images whose longest edge exceeds this (pixels)
    pub optimize_max_dimension: u32,

    /// JPEG quality used when re-encoding oversized images
    pub optimize_quality: u8,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_size_mb: 10,
            min_width: 400,
            min_height: 300,
            timeout_ms: 30_000,
            allowed_formats: vec![
                "jpeg".to_string(),
                "png".to_string(),
                "gif".to_string(),
                "bmp".to_string(),
                "webp".to_string(),
                "tiff".to_string(),
            ],
            optimize_max_dimension: 2048,
            optimize_quality: 85,
        }
    }
}

impl FetchConfig {
    /// Maximum download size in bytes.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

/// Thumbnail generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Thumbnail target size in pixels (longest edge, aspect preserved)
    pub size: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self { size: 300 }
    }
}

/// One vision model in the fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Gateway model identifier (e.g., "anthropic/claude-sonnet-4")
    pub id: String,

    /// Trust weight used in consensus aggregation
    pub trust_weight: f64,

    /// Cost per million tokens in USD, for ledger estimates
    pub cost_per_million_tokens: f64,
}

/// Vision analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Gateway endpoint (OpenRouter-style chat completions)
    pub endpoint: String,

    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Ordered model chain: primary first, then fallbacks
    pub models: Vec<ModelSpec>,

    /// Valid results to gather per image before stopping the chain walk
    pub consensus_models: usize,

    /// Maximum concurrent per-image analyses
    pub concurrency: usize,

    /// Max tokens per model call
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,

    /// Rate limit for the vision gateway
    pub rate_limit: RateLimitConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            api_key: "${OPENROUTER_API_KEY}".to_string(),
            models: vec![
                ModelSpec {
                    id: "anthropic/claude-sonnet-4".to_string(),
                    trust_weight: 1.0,
                    cost_per_million_tokens: 9.0,
                },
                ModelSpec {
                    id: "google/gemini-2.0-flash-lite-001".to_string(),
                    trust_weight: 0.8,
                    cost_per_million_tokens: 0.19,
                },
                ModelSpec {
                    id: "anthropic/claude-3-haiku".to_string(),
                    trust_weight: 0.6,
                    cost_per_million_tokens: 0.25,
                },
            ],
            consensus_models: 2,
            concurrency: 3,
            max_tokens: 1024,
            temperature: 0.2,
            timeout_ms: 30_000,
            rate_limit: RateLimitConfig { rate: 50, window_ms: 60_000 },
        }
    }
}

/// Selection engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Weighted criteria applied per run
    pub criteria: Vec<Criterion>,

    /// Number of winners to select
    pub top_k: usize,

    /// Near-duplicate exclusion knob
    pub diversity: DiversityConfig,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            criteria: vec![
                Criterion {
                    name: "relevance".to_string(),
                    weight: 1.5,
                    direction: Direction::Maximize,
                    hard_threshold: None,
                },
                Criterion {
                    name: "quality".to_string(),
                    weight: 1.0,
                    direction: Direction::Maximize,
                    hard_threshold: None,
                },
            ],
            top_k: 3,
            diversity: DiversityConfig::default(),
        }
    }
}

/// Image hosting (CDN re-hosting) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostingConfig {
    /// Whether selected images are re-hosted
    pub enabled: bool,

    /// Upload endpoint (ImgBB-style)
    pub endpoint: String,

    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,

    /// Rate limit for the hosting provider
    pub rate_limit: RateLimitConfig,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.imgbb.com/1/upload".to_string(),
            api_key: "${IMGBB_API_KEY}".to_string(),
            timeout_ms: 60_000,
            rate_limit: RateLimitConfig { rate: 30, window_ms: 60_000 },
        }
    }
}

/// Metadata store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Whether run metadata is persisted
    pub enabled: bool,

    /// Store API base (Airtable-style record API)
    pub endpoint: String,

    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Base identifier
    pub base_id: String,

    /// Table name for selected-image records
    pub table: String,

    /// Table name for run cost entries
    pub cost_table: String,

    /// Max records per batch-create call
    pub batch_size: usize,

    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,

    /// Rate limit for the store
    pub rate_limit: RateLimitConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.airtable.com/v0".to_string(),
            api_key: "${AIRTABLE_API_KEY}".to_string(),
            base_id: String::new(),
            table: "Images".to_string(),
            cost_table: "Costs".to_string(),
            batch_size: 10,
            timeout_ms: 30_000,
            rate_limit: RateLimitConfig { rate: 5, window_ms: 1_000 },
        }
    }
}

/// Rate limit: at most `rate` calls per trailing `window_ms`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub rate: u32,
    pub window_ms: u64,
}

/// Retry and backoff settings shared by every outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Max retry attempts after the initial call
    pub attempts: u32,

    /// Base backoff delay in milliseconds
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,

    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: false,
        }
    }
}

/// Top-level run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Global run deadline in milliseconds; 0 disables the deadline.
    /// On expiry, in-flight work finishes but no new work is scheduled.
    pub global_deadline_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            global_deadline_ms: 0,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
