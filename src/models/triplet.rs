use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::Metric;

/// Weights of the composite answer score: accuracy, completeness, groundedness.
pub const ANSWER_SCORE_WEIGHTS: (f64, f64, f64) = (0.40, 0.40, 0.20);

/// One QA item as produced by a generator model and annotated by the evaluator.
///
/// Scores are absent until the evaluation stage has run; a score of `-1.0`
/// marks a metric whose evaluation failed. Unknown fields are carried through
/// untouched so that re-serialising an item never loses data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaItem {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub question: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub answer: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub context: String,
    #[serde(default, deserialize_with = "deserialize_conditions")]
    pub conditions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groundedness_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_score: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QaItem {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        context: impl Into<String>,
        conditions: Vec<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            context: context.into(),
            conditions,
            ..Self::default()
        }
    }

    /// Returns the recorded score for `metric`, if any.
    pub fn score(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Accuracy => self.accuracy_score,
            Metric::Completeness => self.completeness_score,
            Metric::Groundedness => self.groundedness_score,
            Metric::Relevance => self.relevance_score,
            Metric::Intent => self.intent_score,
        }
    }

    pub fn set_score(&mut self, metric: Metric, score: f64) {
        let slot = match metric {
            Metric::Accuracy => &mut self.accuracy_score,
            Metric::Completeness => &mut self.completeness_score,
            Metric::Groundedness => &mut self.groundedness_score,
            Metric::Relevance => &mut self.relevance_score,
            Metric::Intent => &mut self.intent_score,
        };
        *slot = Some(score);
    }

    /// Stores the parsed judge response next to the score.
    pub fn set_eval(&mut self, metric: Metric, eval: Value) {
        self.extra.insert(metric.eval_key(), eval);
    }

    pub fn eval(&self, metric: Metric) -> Option<&Value> {
        self.extra.get(&metric.eval_key())
    }

    pub fn set_raw(&mut self, metric: Metric, raw: &str) {
        self.extra
            .insert(metric.raw_key(), Value::String(raw.to_string()));
    }
}

/// Strips label residue left by completion parsing (leading whitespace, `-`, `:`)
/// and surrounding whitespace.
pub fn normalize_label_residue(text: &str) -> String {
    text.trim_start_matches(|c: char| c.is_whitespace() || c == '-' || c == ':')
        .trim()
        .to_string()
}

/// A validated generated QA unit with per-metric scores and model provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTriplet {
    pub question: String,
    pub answer: String,
    pub context: String,
    pub conditions: Vec<String>,
    pub accuracy: f64,
    pub completeness: f64,
    pub groundedness: f64,
    pub relevance: f64,
    pub intent: f64,
    pub model: String,
}

impl CandidateTriplet {
    /// Builds a candidate from a response item.
    ///
    /// Returns `None` when the question, answer or context is empty after
    /// label normalisation. Missing scores default to 0.
    pub fn from_item(item: &QaItem, model: &str) -> Option<Self> {
        let question = normalize_label_residue(&item.question);
        let answer = normalize_label_residue(&item.answer);
        let context = normalize_label_residue(&item.context);
        if question.is_empty() || answer.is_empty() || context.is_empty() {
            return None;
        }

        Some(Self {
            question,
            answer,
            context,
            conditions: item.conditions.clone(),
            accuracy: item.accuracy_score.unwrap_or(0.0),
            completeness: item.completeness_score.unwrap_or(0.0),
            groundedness: item.groundedness_score.unwrap_or(0.0),
            relevance: item.relevance_score.unwrap_or(0.0),
            intent: item.intent_score.unwrap_or(0.0),
            model: model.to_string(),
        })
    }

    /// Composite answer score `0.40·accuracy + 0.40·completeness + 0.20·groundedness`.
    pub fn answer_score(&self) -> f64 {
        let (wa, wc, wg) = ANSWER_SCORE_WEIGHTS;
        wa * self.accuracy + wc * self.completeness + wg * self.groundedness
    }
}

/// The merged representative of one equivalence class.
///
/// `question`, `relevance` and `intent` come from the best-phrased candidate,
/// every other field from the best-answered one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTriplet {
    pub question: String,
    pub answer: String,
    pub context: String,
    #[serde(default, deserialize_with = "deserialize_conditions")]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub completeness: f64,
    #[serde(default)]
    pub groundedness: f64,
    #[serde(default)]
    pub relevance: f64,
    #[serde(default)]
    pub intent: f64,
    #[serde(default)]
    pub model: String,
}

impl CanonicalTriplet {
    /// Merges the question-side fields of one candidate with the answer-side
    /// fields of another.
    pub fn merge(question_source: &CandidateTriplet, answer_source: &CandidateTriplet) -> Self {
        Self {
            question: question_source.question.clone(),
            relevance: question_source.relevance,
            intent: question_source.intent,
            answer: answer_source.answer.clone(),
            context: answer_source.context.clone(),
            conditions: answer_source.conditions.clone(),
            accuracy: answer_source.accuracy,
            completeness: answer_source.completeness,
            groundedness: answer_source.groundedness,
            model: answer_source.model.clone(),
        }
    }
}

/// Accepts a string, null or a scalar for a free-text field.
fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Accepts conditions as a list, a single string, or null.
///
/// Generator completions often spell "no conditions" as `None`, `[]` or an
/// empty string; all three become an empty list.
fn deserialize_conditions<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let raw: Vec<String> = match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        other => vec![other.to_string()],
    };

    Ok(clean_conditions(raw))
}

/// Trims conditions and drops the spellings of "no condition".
pub fn clean_conditions(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && !matches!(c.as_str(), "None" | "none" | "[]" | "null" | "N/A"))
        .collect()
}
