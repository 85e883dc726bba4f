//! Strict parsing of classification replies
//!
//! Small local models wrap JSON in markdown fences, append end-of-turn tokens
//! or add commentary. The reply is cleaned first, then decoded against an
//! exact three-field schema and checked against the published categories.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::sanitize::{sanitize_category, sanitize_filename};

/// End-of-turn tokens some servers leak into the content
const END_OF_TURN_TOKENS: &[&str] = &["<|eot_id|>", "<|im_end|>", "<|end|>", "<|endoftext|>", "</s>"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid JSON or unexpected fields: {0}")]
    Json(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("missing or invalid confidence_score: {0}")]
    Confidence(f64),
    #[error("invalid category '{category}'. Must be one of: {allowed}")]
    UnknownCategory { category: String, allowed: String },
}

/// A validated classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisResult {
    pub category: String,
    pub title: String,
    #[serde(alias = "confidenceScore")]
    pub confidence_score: f64,
}

/// Strip fences and end-of-turn tokens and keep the outermost braces
pub fn clean_json(raw: &str) -> String {
    let mut content = raw.trim();
    if let Some(rest) = content.strip_prefix("```json") {
        content = rest;
    } else if let Some(rest) = content.strip_prefix("```") {
        content = rest;
    }
    if let Some(rest) = content.strip_suffix("```") {
        content = rest;
    }

    let mut content = content.to_string();
    for token in END_OF_TURN_TOKENS {
        content = content.replace(token, "");
    }

    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => content[start..=end].to_string(),
        _ => content.trim().to_string(),
    }
}

/// Decode and validate a raw reply against the allowed categories.
///
/// On success the category and title are already sanitized.
pub fn parse_and_validate(raw: &str, categories: &[String]) -> Result<AnalysisResult, ValidationError> {
    let content = clean_json(raw);

    // from_str rejects anything after the closing brace
    let mut result: AnalysisResult =
        serde_json::from_str(&content).map_err(|e| ValidationError::Json(e.to_string()))?;

    if result.category.is_empty() {
        return Err(ValidationError::MissingField("category"));
    }
    if result.title.is_empty() {
        return Err(ValidationError::MissingField("title"));
    }
    // NaN fails this too
    if !(result.confidence_score > 0.0) {
        return Err(ValidationError::Confidence(result.confidence_score));
    }
    if !categories.iter().any(|c| c == &result.category) {
        return Err(ValidationError::UnknownCategory {
            category: result.category,
            allowed: categories.join(", "),
        });
    }

    result.category = sanitize_category(&result.category);
    result.title = sanitize_filename(&result.title);
    Ok(result)
}
