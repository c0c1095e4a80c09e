//! Parsing model output into scored verdicts.
//!
//! Models are asked for JSON, but not all of them comply. Parsing tries the
//! JSON envelope first, then scrapes score mentions out of free text.
//! Non-blank text with no recognizable scores is still usable at a neutral
//! default; the caller flags low confidence rather than discarding the
//! model. Blank responses fail outright.

use serde::Deserialize;

/// Scores recovered from one model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelScores {
    /// Relevance to the query, in [0, 1]
    pub relevance: f64,
    /// Visual/technical quality, in [0, 1]
    pub quality: f64,
    pub description: String,
    pub tags: Vec<String>,
}

/// How a model response was interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelVerdict {
    /// The response carried a valid JSON analysis
    Structured(ModelScores),
    /// Free text; scores scraped if any were found
    Unstructured {
        text: String,
        parsed: Option<ModelScores>,
    },
    /// The response carried no usable text
    Failed(String),
}

#[derive(Deserialize)]
struct JsonAnalysis {
    relevance_score: f64,
    quality_score: f64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    objects: Vec<String>,
}

/// Interpret a model's text response.
pub fn parse_response(text: &str) -> ModelVerdict {
    if text.trim().is_empty() {
        return ModelVerdict::Failed("empty response text".to_string());
    }
    if let Some(scores) = parse_json(text) {
        return ModelVerdict::Structured(scores);
    }
    ModelVerdict::Unstructured {
        text: text.to_string(),
        parsed: scrape_scores(text),
    }
}

/// Extract the outermost JSON object and require both score fields.
fn parse_json(text: &str) -> Option<ModelScores> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let analysis: JsonAnalysis = serde_json::from_str(&text[start..=end]).ok()?;
    Some(ModelScores {
        relevance: analysis.relevance_score.clamp(0.0, 1.0),
        quality: analysis.quality_score.clamp(0.0, 1.0),
        description: analysis.description,
        tags: analysis.objects,
    })
}

/// Best-effort score scraping from free text.
///
/// Looks for "relevance" and "quality" mentions followed by a number.
/// Numbers above 1 are treated as out-of-10 or out-of-100 scales.
fn scrape_scores(text: &str) -> Option<ModelScores> {
    let lower = text.to_lowercase();
    let relevance = find_score_after(&lower, "relevance")?;
    let quality = find_score_after(&lower, "quality")?;
    Some(ModelScores {
        relevance,
        quality,
        description: text.lines().next().unwrap_or_default().to_string(),
        tags: Vec::new(),
    })
}

fn find_score_after(text: &str, keyword: &str) -> Option<f64> {
    let pos = text.find(keyword)?;
    let rest = &text[pos + keyword.len()..];
    // Take the first numeric token within a short lookahead window
    let mut token = String::new();
    for c in rest.chars().take(40) {
        if c.is_ascii_digit() || (c == '.' && !token.is_empty()) {
            token.push(c);
        } else if !token.is_empty() {
            break;
        }
    }
    let value: f64 = token.parse().ok()?;
    Some(normalize_scale(value))
}

fn normalize_scale(value: f64) -> f64 {
    if value <= 1.0 {
        value
    } else if value <= 10.0 {
        value / 10.0
    } else if value <= 100.0 {
        value / 100.0
    } else {
        1.0
    }
}
