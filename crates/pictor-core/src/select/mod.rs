//! Deterministic weighted multi-criteria selection.
//!
//! Given the same analyses and criteria, selection always produces the
//! same output: scoring is pure arithmetic, ordering uses total ordering
//! on floats, and ties break by relevance then original candidate order.

use crate::error::SelectionError;
use crate::fetch::Hasher;
use crate::types::{ConsensusAnalysis, ProcessedImage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Criterion names the engine knows how to read off a consensus analysis.
const KNOWN_CRITERIA: [&str; 3] = ["relevance", "quality", "confidence"];

/// Whether higher or lower raw values are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Maximize,
    Minimize,
}

/// One weighted scoring criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    /// One of "relevance", "quality", "confidence"
    pub name: String,

    /// Relative weight; must be positive
    pub weight: f64,

    /// Direction the raw value is normalized against
    pub direction: Direction,

    /// Candidates failing this bound are rejected outright
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hard_threshold: Option<f64>,
}

/// Near-duplicate exclusion between winners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityConfig {
    pub enabled: bool,

    /// Perceptual hashes closer than this to a winner are excluded
    pub max_hamming_distance: u32,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_hamming_distance: 10,
        }
    }
}

/// One candidate's scoring outcome, winner or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    /// 1-based rank among winners; `None` for non-winners
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,

    pub candidate_id: String,

    /// Weighted sum of normalized criterion values
    pub total_score: f64,

    /// Normalized per-criterion values that fed the total
    pub criterion_scores: BTreeMap<String, f64>,

    /// Why this candidate was excluded, when it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// Full selection output: every scored candidate plus the winner list.
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    /// All candidates in final rank order (winners first)
    pub results: Vec<SelectionResult>,

    /// Winning candidate ids, best first
    pub selected: Vec<String>,

    /// How many short of `top_k` the winner list came up
    pub shortfall: usize,
}

/// Scores, ranks, and picks winners from consensus analyses.
pub struct SelectionEngine {
    diversity: DiversityConfig,
}

impl SelectionEngine {
    pub fn new(diversity: DiversityConfig) -> Self {
        Self { diversity }
    }

    /// Select up to `top_k` winners.
    ///
    /// Fewer analyses than `top_k` is not an error; the outcome reports
    /// the shortfall. Invalid criteria is the only error path.
    pub fn select(
        &self,
        analyses: &[ConsensusAnalysis],
        images: &[ProcessedImage],
        criteria: &[Criterion],
        top_k: usize,
    ) -> Result<SelectionOutcome, SelectionError> {
        validate_criteria(criteria)?;

        let hashes: HashMap<&str, &str> = images
            .iter()
            .map(|i| (i.candidate_id.as_str(), i.perceptual_hash.as_str()))
            .collect();

        // Score every candidate; hard-threshold failures keep their scores
        // but carry a rejection reason.
        let mut scored: Vec<(usize, SelectionResult)> = Vec::with_capacity(analyses.len());
        for (index, analysis) in analyses.iter().enumerate() {
            let mut criterion_scores = BTreeMap::new();
            let mut total_score = 0.0;
            let mut rejection_reason = None;

            for criterion in criteria {
                // Validated above, so the lookup cannot miss
                let raw = analysis.criterion(&criterion.name).unwrap_or(0.0);
                let normalized = match criterion.direction {
                    Direction::Maximize => raw.clamp(0.0, 1.0),
                    Direction::Minimize => 1.0 - raw.clamp(0.0, 1.0),
                };
                criterion_scores.insert(criterion.name.clone(), normalized);
                total_score += criterion.weight * normalized;

                if let Some(threshold) = criterion.hard_threshold {
                    if normalized < threshold && rejection_reason.is_none() {
                        rejection_reason = Some(format!(
                            "below {} threshold ({normalized:.3} < {threshold:.3})",
                            criterion.name
                        ));
                    }
                }
            }

            scored.push((
                index,
                SelectionResult {
                    rank: None,
                    candidate_id: analysis.candidate_id.clone(),
                    total_score,
                    criterion_scores,
                    rejection_reason,
                },
            ));
        }

        // Descending total, then descending relevance, then input order
        scored.sort_by(|(ai, a), (bi, b)| {
            b.total_score
                .total_cmp(&a.total_score)
                .then_with(|| {
                    let ar = a.criterion_scores.get("relevance").copied().unwrap_or(0.0);
                    let br = b.criterion_scores.get("relevance").copied().unwrap_or(0.0);
                    br.total_cmp(&ar)
                })
                .then_with(|| ai.cmp(bi))
        });

        let mut selected: Vec<String> = Vec::new();
        let mut selected_hashes: Vec<&str> = Vec::new();
        for (_, result) in scored.iter_mut() {
            if selected.len() >= top_k {
                break;
            }
            if result.rejection_reason.is_some() {
                continue;
            }

            if self.diversity.enabled {
                let hash = hashes.get(result.candidate_id.as_str()).copied();
                if let Some(hash) = hash {
                    let near_dup = selected_hashes.iter().any(|&picked| {
                        Hasher::perceptual_distance(hash, picked)
                            .is_some_and(|d| d < self.diversity.max_hamming_distance)
                    });
                    if near_dup {
                        result.rejection_reason =
                            Some("near-duplicate of a selected image".to_string());
                        debug!(candidate_id = %result.candidate_id, "diversity exclusion");
                        continue;
                    }
                    selected_hashes.push(hash);
                }
            }

            result.rank = Some(selected.len() as u32 + 1);
            selected.push(result.candidate_id.clone());
        }

        let shortfall = top_k.saturating_sub(selected.len());
        info!(
            selected = selected.len(),
            shortfall,
            candidates = analyses.len(),
            "selection finished"
        );

        Ok(SelectionOutcome {
            results: scored.into_iter().map(|(_, r)| r).collect(),
            selected,
            shortfall,
        })
    }
}

fn validate_criteria(criteria: &[Criterion]) -> Result<(), SelectionError> {
    if criteria.is_empty() {
        return Err(SelectionError::InvalidCriteria(
            "criteria list is empty".to_string(),
        ));
    }
    for criterion in criteria {
        if !KNOWN_CRITERIA.contains(&criterion.name.as_str()) {
            return Err(SelectionError::InvalidCriteria(format!(
                "unknown criterion '{}'",
                criterion.name
            )));
        }
        if criterion.weight <= 0.0 || !criterion.weight.is_finite() {
            return Err(SelectionError::InvalidCriteria(format!(
                "criterion '{}' has non-positive weight",
                criterion.name
            )));
        }
    }
    Ok(())
}
