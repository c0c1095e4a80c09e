//! Core data types for the Pictor pipeline.
//!
//! Each stage produces a new immutable record referencing its input by
//! candidate id; nothing is mutated in place, so the pipeline can be
//! re-run on the same candidate set and produce the same records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A search query, immutable once issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query
    pub text: String,

    /// Locale hint for the provider (e.g., "en-US")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Safe-search filtering flag
    pub safe_search: bool,
}

impl SearchQuery {
    /// Create a safe-search query with no locale hint.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            locale: None,
            safe_search: true,
        }
    }
}

/// An unvalidated image reference returned by search.
///
/// Created by the search client and never mutated; later stages attach new
/// records keyed by `id`. The id is a truncated BLAKE3 hash of the image
/// URL, so re-running the same search yields stable ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable identifier derived from the image URL
    pub id: String,

    /// Page the image was found on
    pub source_url: String,

    /// Direct image URL
    pub image_url: String,

    /// Provider-supplied thumbnail URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    /// Result title
    pub title: String,

    /// Result description/snippet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The query this candidate was found for
    pub origin_query: String,
}

impl Candidate {
    /// Derive the stable candidate id for an image URL.
    pub fn id_for_url(image_url: &str) -> String {
        blake3::hash(image_url.as_bytes()).to_hex()[..16].to_string()
    }
}

/// Typed reason a candidate was rejected during acquisition or validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionReason {
    /// Dimensions below the configured minimum
    TooSmall,
    /// Byte size above the configured maximum
    TooLarge,
    /// Decoded format outside the allowed set
    UnsupportedFormat,
    /// Bytes could not be decoded as an image
    Corrupt,
    /// Download failed (HTTP error or network failure)
    FetchFailed,
    /// Download exceeded its timeout
    FetchTimeout,
}

impl RejectionReason {
    /// Stable string form used in summaries and persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::TooSmall => "too-small",
            RejectionReason::TooLarge => "too-large",
            RejectionReason::UnsupportedFormat => "unsupported-format",
            RejectionReason::Corrupt => "corrupt",
            RejectionReason::FetchFailed => "fetch-failed",
            RejectionReason::FetchTimeout => "fetch-timeout",
        }
    }
}

/// Embedded metadata extracted from a downloaded image.
///
/// Extraction is lenient: partial data is kept, fully absent data is `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExifData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,

    /// Image orientation (1-8 per EXIF spec)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<u32>,
}

/// A validated, optimized image derived from a candidate.
///
/// Only created when the image passed every validation check; failures
/// become a [`RejectionReason`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedImage {
    /// The candidate this image was derived from
    pub candidate_id: String,

    /// Optimized image bytes (in-memory handle, released with the run)
    #[serde(skip)]
    pub bytes: Vec<u8>,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Detected format ("jpeg", "png", ...)
    pub format: String,

    /// BLAKE3 hash of the original downloaded bytes
    pub content_hash: String,

    /// Size of the original download in bytes
    pub size_bytes: u64,

    /// Thumbnail bytes (WebP, aspect-preserving)
    #[serde(skip)]
    pub thumbnail: Vec<u8>,

    /// Perceptual hash for near-duplicate detection
    pub perceptual_hash: String,

    /// Color mode of the decoded image ("rgb8", "rgba8", ...)
    pub color_mode: String,

    /// Embedded metadata, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exif: Option<ExifData>,

    /// Wall time spent processing this image
    pub processing_ms: u64,
}

/// One model's analysis of one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub candidate_id: String,

    /// Model identifier that produced this result
    pub model_id: String,

    /// Relevance to the origin query, in [0, 1]
    pub relevance_score: f64,

    /// Visual/technical quality, in [0, 1]
    pub quality_score: f64,

    /// Free-text description from the model
    pub description: String,

    /// Extracted tags (objects, scene elements)
    pub tags: Vec<String>,

    /// Token usage reported by the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,

    /// Estimated cost of this call in USD
    pub usd_cost: f64,

    /// True when scores were scraped from free text rather than
    /// returned structurally
    pub parsed_from_text: bool,
}

/// How a consensus confidence value was derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConfidenceSource {
    /// Only one model produced a valid result
    SingleSource,
    /// Multiple models contributed; agreement is inverse score variance
    MultiModel { agreement: f64 },
}

/// Aggregated scoring across one or more model analyses of the same image.
///
/// Purely derived: recomputable from the contributing [`AnalysisResult`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusAnalysis {
    pub candidate_id: String,

    /// Trust-weighted mean relevance, in [0, 1]
    pub relevance: f64,

    /// Trust-weighted mean quality, in [0, 1]
    pub quality: f64,

    /// Confidence in the aggregate, in [0, 1]
    pub confidence: f64,

    /// Where the confidence value came from
    pub source: ConfidenceSource,

    /// Consensus description (longest contributing description)
    pub description: String,

    /// Tags agreed on by contributing models
    pub tags: Vec<String>,

    /// Contributing model ids, in dispatch order
    pub models: Vec<String>,
}

impl ConsensusAnalysis {
    /// Look up a criterion value by name. Unknown names return `None`;
    /// the selection engine treats that as a configuration error.
    pub fn criterion(&self, name: &str) -> Option<f64> {
        match name {
            "relevance" => Some(self.relevance),
            "quality" => Some(self.quality),
            "confidence" => Some(self.confidence),
            _ => None,
        }
    }
}

/// Append-only ledger entry, one per billable outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    /// Logical operation ("search", model id, "upload", ...)
    pub operation: String,

    /// Provider the call went to
    pub provider: String,

    /// Billing units reported by the provider (tokens, credits)
    pub units: u64,

    /// Cost in USD
    pub usd_cost: f64,

    /// Unix epoch milliseconds when the entry was recorded
    pub timestamp_ms: u64,
}

/// Per-run accounting, emitted on every run including fully failed ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Candidates returned by search
    pub attempted: usize,

    /// Candidates that passed acquisition and validation
    pub processed: usize,

    /// Candidates rejected during acquisition/validation
    pub rejected: usize,

    /// Rejection counts keyed by reason string
    pub rejection_reasons: BTreeMap<String, usize>,

    /// Images with a usable consensus analysis
    pub analyzed: usize,

    /// Images where every model failed
    pub analysis_failed: usize,

    /// Candidates selected as winners
    pub selected: usize,

    /// Total bytes downloaded
    pub bytes_downloaded: u64,

    /// Sum of all ledger entries in USD
    pub total_cost_usd: f64,

    /// Total run duration
    pub duration_ms: u64,

    /// Per-stage error strings accumulated during the run
    pub errors: Vec<String>,
}
