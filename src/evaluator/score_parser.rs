//! Parsing of judge responses into numeric scores.

use serde_json::Value;
use thiserror::Error;

/// Why a judge response could not be turned into a score.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreParseError {
    /// Structured response without a `score` key.
    #[error("response has no 'score' field")]
    MissingScore,

    /// `score` present but not coercible to a number.
    #[error("score is not numeric: {0}")]
    InvalidScore(String),

    /// Plain-text response with no usable number.
    #[error("no numeric score found in response")]
    NoNumber,
}

/// A successfully parsed judge response.
///
/// `eval` is the structured object when the judge answered in JSON, or the
/// plain text it answered with otherwise. `raw` is the untouched completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScore {
    pub score: f64,
    pub eval: Value,
    pub raw: String,
}

/// Parses a judge completion.
///
/// A JSON object (optionally wrapped in prose or a code fence) must carry a
/// `score` key; `null` counts as 0, numeric strings are accepted. Anything
/// else is treated as plain text and must end in a number, either in the
/// `score: 8, ...` shape or as the final token.
///
/// # Errors
///
/// Returns a [`ScoreParseError`] describing why no score could be read.
pub fn parse_score_response(raw: &str) -> Result<ParsedScore, ScoreParseError> {
    match structured_value(raw) {
        Some(Value::Object(map)) => {
            let score = match map.get("score") {
                None => return Err(ScoreParseError::MissingScore),
                Some(value) => coerce_score(value)?,
            };
            Ok(ParsedScore {
                score,
                eval: Value::Object(map),
                raw: raw.to_string(),
            })
        }
        Some(Value::Number(n)) => {
            let score = n.as_f64().ok_or(ScoreParseError::NoNumber)?;
            Ok(ParsedScore {
                score,
                eval: Value::Number(n),
                raw: raw.to_string(),
            })
        }
        Some(Value::Array(items)) if items.len() == 1 && !items[0].is_array() => {
            let score = coerce_score(&items[0])?;
            Ok(ParsedScore {
                score,
                eval: Value::Array(items),
                raw: raw.to_string(),
            })
        }
        Some(Value::String(text)) => plain_text_score(&text, raw),
        // A bare boolean or a longer array is not read as a score; the text
        // scan below finds no number in them and the attempt fails.
        _ => plain_text_score(raw, raw),
    }
}

/// Parses the whole response as JSON, falling back to the outermost `{…}`.
fn structured_value(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Some(value);
    }
    let object = extract_json(raw)?;
    serde_json::from_str::<Value>(&object).ok()
}

/// Extracts the outermost JSON object from model output that may carry
/// preamble text or markdown code fences.
fn extract_json(response: &str) -> Option<String> {
    let trimmed = response.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;

    if start <= end {
        Some(trimmed[start..=end].to_string())
    } else {
        None
    }
}

fn coerce_score(value: &Value) -> Result<f64, ScoreParseError> {
    match value {
        Value::Null => Ok(0.0),
        Value::Bool(false) => Ok(0.0),
        Value::Bool(true) => Ok(1.0),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ScoreParseError::InvalidScore(n.to_string())),
        Value::String(s) if s.trim().is_empty() => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ScoreParseError::InvalidScore(s.clone())),
        other => Err(ScoreParseError::InvalidScore(other.to_string())),
    }
}

fn plain_text_score(text: &str, raw: &str) -> Result<ParsedScore, ScoreParseError> {
    let score = leading_field_number(text)
        .or_else(|| trailing_number(text))
        .ok_or(ScoreParseError::NoNumber)?;
    Ok(ParsedScore {
        score,
        eval: Value::String(text.to_string()),
        raw: raw.to_string(),
    })
}

/// Reads `Score: 8, reasoning…`: the value after the last `:` of the first
/// comma-separated field.
fn leading_field_number(text: &str) -> Option<f64> {
    let field = text.split(',').next()?;
    let value = field.rsplit(':').next()?.trim();
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reads the last whitespace-separated token as a number, ignoring trailing
/// punctuation and markdown emphasis.
fn trailing_number(text: &str) -> Option<f64> {
    let token = text.split_whitespace().next_back()?;
    let token = token.trim_matches(|c: char| matches!(c, '*' | '.' | ')' | '(' | '"' | '\'' | '`'));
    let token = token.split('/').next()?;
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}
