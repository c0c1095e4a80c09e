//! Aggregating per-model results into a consensus analysis.
//!
//! Scores are combined by trust-weighted mean. Confidence comes from
//! agreement: the unweighted variance of each criterion across models,
//! mapped so that variance at or above 0.1 means zero agreement. A single
//! contributing model gets a fixed 0.8 baseline.

use crate::types::{AnalysisResult, ConfidenceSource, ConsensusAnalysis};
use std::collections::HashMap;

const SINGLE_SOURCE_CONFIDENCE: f64 = 0.8;
const MAX_EXPECTED_VARIANCE: f64 = 0.1;

/// Aggregate one image's model results. Returns `None` for an empty slice.
///
/// `trust_weights` maps model id to weight; missing models weigh 1.0.
pub fn aggregate(
    results: &[AnalysisResult],
    trust_weights: &HashMap<String, f64>,
) -> Option<ConsensusAnalysis> {
    let first = results.first()?;

    let weight_of = |r: &AnalysisResult| trust_weights.get(&r.model_id).copied().unwrap_or(1.0);
    let total_weight: f64 = results.iter().map(weight_of).sum();

    let relevance = results
        .iter()
        .map(|r| weight_of(r) * r.relevance_score)
        .sum::<f64>()
        / total_weight;
    let quality = results
        .iter()
        .map(|r| weight_of(r) * r.quality_score)
        .sum::<f64>()
        / total_weight;

    let (confidence, source) = if results.len() < 2 {
        (SINGLE_SOURCE_CONFIDENCE, ConfidenceSource::SingleSource)
    } else {
        let quality_agreement = agreement(results.iter().map(|r| r.quality_score));
        let relevance_agreement = agreement(results.iter().map(|r| r.relevance_score));
        let agreement = (quality_agreement + relevance_agreement) / 2.0;
        (agreement, ConfidenceSource::MultiModel { agreement })
    };

    // Longest description tends to be the most informative one
    let description = results
        .iter()
        .max_by_key(|r| r.description.len())
        .map(|r| r.description.clone())
        .unwrap_or_default();

    Some(ConsensusAnalysis {
        candidate_id: first.candidate_id.clone(),
        relevance,
        quality,
        confidence,
        source,
        description,
        tags: shared_tags(results),
        models: results.iter().map(|r| r.model_id.clone()).collect(),
    })
}

/// Agreement in [0, 1]: 1 at zero variance, 0 at or above the expected max.
fn agreement(scores: impl Iterator<Item = f64>) -> f64 {
    let scores: Vec<f64> = scores.collect();
    (1.0 - sample_variance(&scores) / MAX_EXPECTED_VARIANCE).max(0.0)
}

fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Tags kept by majority vote, ordered by first appearance.
///
/// A single contributing model keeps all of its tags.
fn shared_tags(results: &[AnalysisResult]) -> Vec<String> {
    if results.len() == 1 {
        return results[0].tags.clone();
    }

    let threshold = results.len().div_ceil(2);
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for result in results {
        for tag in &result.tags {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
    }

    let mut seen = std::collections::HashSet::new();
    let mut tags = Vec::new();
    for result in results {
        for tag in &result.tags {
            if counts[tag.as_str()] >= threshold && seen.insert(tag.clone()) {
                tags.push(tag.clone());
            }
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(model: &str, relevance: f64, quality: f64, tags: &[&str]) -> AnalysisResult {
        AnalysisResult {
            candidate_id: "cand".to_string(),
            model_id: model.to_string(),
            relevance_score: relevance,
            quality_score: quality,
            description: format!("description from {model}"),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            total_tokens: Some(100),
            usd_cost: 0.001,
            parsed_from_text: false,
        }
    }

    #[test]
    fn test_empty_results_yield_none() {
        assert!(aggregate(&[], &HashMap::new()).is_none());
    }

    #[test]
    fn test_single_model_gets_baseline_confidence() {
        let consensus = aggregate(&[result("m1", 0.9, 0.7, &["cat"])], &HashMap::new()).unwrap();
        assert_eq!(consensus.confidence, 0.8);
        assert_eq!(consensus.source, ConfidenceSource::SingleSource);
        assert_eq!(consensus.relevance, 0.9);
        assert_eq!(consensus.quality, 0.7);
        assert_eq!(consensus.tags, vec!["cat"]);
        assert_eq!(consensus.models, vec!["m1"]);
    }

    #[test]
    fn test_trust_weighted_mean() {
        let results = [
            result("heavy", 1.0, 1.0, &[]),
            result("light", 0.0, 0.0, &[]),
        ];
        let weights = HashMap::from([("heavy".to_string(), 3.0), ("light".to_string(), 1.0)]);
        let consensus = aggregate(&results, &weights).unwrap();
        assert!((consensus.relevance - 0.75).abs() < 1e-9);
        assert!((consensus.quality - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_perfect_agreement_gives_full_confidence() {
        let results = [
            result("m1", 0.8, 0.6, &[]),
            result("m2", 0.8, 0.6, &[]),
        ];
        let consensus = aggregate(&results, &HashMap::new()).unwrap();
        assert!((consensus.confidence - 1.0).abs() < 1e-9);
        assert!(matches!(
            consensus.source,
            ConfidenceSource::MultiModel { agreement } if (agreement - 1.0).abs() < 1e-9
        ));
    }

    #[test]
    fn test_disagreement_lowers_confidence() {
        let agreed = aggregate(
            &[result("m1", 0.80, 0.80, &[]), result("m2", 0.82, 0.82, &[])],
            &HashMap::new(),
        )
        .unwrap();
        let disputed = aggregate(
            &[result("m1", 0.2, 0.2, &[]), result("m2", 0.9, 0.9, &[])],
            &HashMap::new(),
        )
        .unwrap();
        assert!(agreed.confidence > disputed.confidence);
        // Variance well above 0.1 floors the agreement at zero
        assert_eq!(disputed.confidence, 0.0);
    }

    #[test]
    fn test_tags_kept_by_majority() {
        let results = [
            result("m1", 0.8, 0.8, &["cat", "sofa"]),
            result("m2", 0.8, 0.8, &["cat", "window"]),
            result("m3", 0.8, 0.8, &["cat", "sofa", "lamp"]),
        ];
        let consensus = aggregate(&results, &HashMap::new()).unwrap();
        assert_eq!(consensus.tags, vec!["cat", "sofa"]);
    }

    #[test]
    fn test_longest_description_wins() {
        let mut a = result("m1", 0.8, 0.8, &[]);
        a.description = "short".to_string();
        let mut b = result("m2", 0.8, 0.8, &[]);
        b.description = "a considerably longer description".to_string();
        let consensus = aggregate(&[a, b], &HashMap::new()).unwrap();
        assert_eq!(consensus.description, "a considerably longer description");
    }
}
