//! Extraction of QA records from free-form generator completions.
//!
//! Generators are asked for records of the form
//!
//! ```text
//! ### 1
//! **Question** - <question>
//! **Answer** - <answer>
//! **Conditions** - [<conditions>]
//! **Context** - <context>
//! ```
//!
//! but routinely deviate from it (`question:`, `ANSWER -`, missing bold).
//! Every recognised label starts a field; a `Question` label starts a record.

use anyhow::{Context, Result};
use regex::Regex;

use crate::models::{QaItem, clean_conditions, normalize_label_residue};

/// Reply meaning "nothing to ask about this chunk".
const NOT_APPLICABLE: &str = "NA";

/// Returns whether a completion declines to produce any question.
pub fn is_not_applicable(completion: &str) -> bool {
    completion.trim().trim_matches(|c: char| c == '\'' || c == '"') == NOT_APPLICABLE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Question,
    Answer,
    Conditions,
    Context,
}

impl Field {
    fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "question" => Some(Self::Question),
            "answer" => Some(Self::Answer),
            "condition" | "conditions" => Some(Self::Conditions),
            "context" => Some(Self::Context),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct PartialPair<'t> {
    question: &'t str,
    answer: &'t str,
    conditions: &'t str,
    context: &'t str,
}

impl<'t> PartialPair<'t> {
    fn set(&mut self, field: Field, value: &'t str) {
        match field {
            Field::Question => self.question = value,
            Field::Answer => self.answer = value,
            Field::Conditions => self.conditions = value,
            Field::Context => self.context = value,
        }
    }

    fn finish(self) -> Option<QaItem> {
        let question = normalize_label_residue(self.question);
        if question.is_empty() {
            return None;
        }
        Some(QaItem::new(
            question,
            normalize_label_residue(self.answer),
            normalize_label_residue(self.context),
            parse_conditions(&normalize_label_residue(self.conditions)),
        ))
    }
}

/// Parser for generator completions.
#[derive(Debug, Clone)]
pub struct PairParser {
    label: Regex,
}

impl PairParser {
    /// # Errors
    ///
    /// Returns an error if the label pattern fails to compile.
    pub fn new() -> Result<Self> {
        let label = Regex::new(
            r"(?im)\*\*[ \t]*(question|answer|conditions?|context)[ \t]*[:\-]?[ \t]*\*\*|^[ \t]*(?:#+[ \t]*)?(question|answer|conditions?|context)[ \t]*[:\-]",
        )
        .context("failed to compile QA label regex")?;
        Ok(Self { label })
    }

    /// Extracts every QA record with a non-empty question.
    ///
    /// Text before the first question label is ignored. A field runs until
    /// the next label or the next `###` record header.
    pub fn parse(&self, completion: &str) -> Vec<QaItem> {
        let labels: Vec<(Field, usize, usize)> = self
            .label
            .captures_iter(completion)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1).or_else(|| caps.get(2))?;
                Some((Field::from_label(name.as_str())?, whole.start(), whole.end()))
            })
            .collect();

        let mut items = Vec::new();
        let mut current: Option<PartialPair<'_>> = None;
        for (i, &(field, _, value_start)) in labels.iter().enumerate() {
            let value_end = labels.get(i + 1).map_or(completion.len(), |next| next.1);
            let value = cut_at_record_header(&completion[value_start..value_end]);

            if field == Field::Question {
                items.extend(current.take().and_then(PartialPair::finish));
                current = Some(PartialPair::default());
            }
            if let Some(pair) = current.as_mut() {
                pair.set(field, value);
            }
        }
        items.extend(current.and_then(PartialPair::finish));
        items
    }
}

fn cut_at_record_header(value: &str) -> &str {
    value.find("###").map_or(value, |end| &value[..end])
}

/// Reads a conditions field: `[None]`, `['a', 'b']`, a bullet list, or a
/// single clause.
fn parse_conditions(raw: &str) -> Vec<String> {
    let inner = raw
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim();

    let items: Vec<String> = match inner.chars().next() {
        Some(quote @ ('\'' | '"')) => inner
            .split(quote)
            .skip(1)
            .step_by(2)
            .map(str::to_string)
            .collect(),
        _ if inner.contains('\n') => inner
            .lines()
            .map(|line| line.trim().trim_start_matches(['-', '*']).to_string())
            .collect(),
        _ => vec![inner.to_string()],
    };
    clean_conditions(items)
}
