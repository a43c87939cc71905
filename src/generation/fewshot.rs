//! Human-rated few-shot corpus loaded from CSV.

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{FewShotExample, PolicyType, QuestionType};

/// One CSV row as written by the annotation sheet.
#[derive(Debug, Deserialize)]
struct CsvRow {
    policy_type: String,
    question_type: String,
    question: String,
    answer: String,
    #[serde(default)]
    condition: String,
    context: String,
    q_rating: f64,
    a_rating: f64,
}

impl CsvRow {
    fn into_example(self) -> Option<FewShotExample> {
        Some(FewShotExample {
            policy_type: PolicyType::parse(&self.policy_type)?,
            question_type: QuestionType::parse(&self.question_type)?,
            question: self.question,
            answer: self.answer,
            conditions: self.condition,
            context: self.context,
            question_rating: self.q_rating,
            answer_rating: self.a_rating,
        })
    }
}

/// All few-shot examples, in file order.
#[derive(Debug, Clone, Default)]
pub struct FewShotCorpus {
    examples: Vec<FewShotExample>,
}

impl FewShotCorpus {
    /// Reads `policy_type, question_type, question, answer, condition,
    /// context, q_rating, a_rating` rows.
    ///
    /// Rows naming an unknown policy or question type are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a row is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open few-shot corpus: {}", path.display()))?;

        let mut examples = Vec::new();
        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.with_context(|| {
                format!("Malformed few-shot row {} in {}", line + 2, path.display())
            })?;
            match row.into_example() {
                Some(example) => examples.push(example),
                None => warn!(row = line + 2, "skipping few-shot row with unknown type"),
            }
        }
        debug!(count = examples.len(), "loaded few-shot corpus");
        Ok(Self { examples })
    }

    pub fn from_examples(examples: Vec<FewShotExample>) -> Self {
        Self { examples }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Returns up to `count` examples of the given policy and question type,
    /// best rated first. Equal ratings keep file order.
    pub fn select(
        &self,
        policy_type: PolicyType,
        question_type: QuestionType,
        count: usize,
    ) -> Vec<&FewShotExample> {
        let mut matching: Vec<&FewShotExample> = self
            .examples
            .iter()
            .filter(|e| e.policy_type == policy_type && e.question_type == question_type)
            .collect();
        matching.sort_by(|a, b| b.rating().partial_cmp(&a.rating()).unwrap_or(Ordering::Equal));
        matching.truncate(count);
        matching
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CSV: &str = "\
policy_type,question_type,question,answer,condition,context,q_rating,a_rating
Regulatory,Factual,When is the deadline?,June 1,,deadline is June 1,3,3
Regulatory,Factual,What is the penalty?,$100,,a $100 penalty,5,4
Incentives,Factual,What is the rebate?,$500,,a $500 rebate,5,5
Regulatory,Yes/No,Is a permit required?,Yes,,a permit is required,4,4
Regulatory,Factual,Who enforces it?,The commission,,the commission enforces,4,5
Unknown,Factual,Ignored?,Yes,,ignored,5,5
";

    fn corpus() -> FewShotCorpus {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.csv");
        fs::write(&path, CSV).unwrap();
        FewShotCorpus::load(&path).unwrap()
    }

    #[test]
    fn load_skips_unknown_types() {
        assert_eq!(corpus().len(), 5);
    }

    #[test]
    fn select_filters_by_type_and_prefers_high_ratings() {
        let corpus = corpus();
        let picked = corpus.select(PolicyType::Regulatory, QuestionType::Factual, 2);

        let questions: Vec<&str> = picked.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions, vec!["What is the penalty?", "Who enforces it?"]);
    }

    #[test]
    fn select_returns_fewer_when_the_pool_is_small() {
        let corpus = corpus();
        assert_eq!(corpus.select(PolicyType::Incentives, QuestionType::Factual, 4).len(), 1);
        assert!(corpus.select(PolicyType::Incentives, QuestionType::Descriptive, 4).is_empty());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = FewShotCorpus::load(Path::new("/nonexistent/context.csv")).unwrap_err();
        assert!(err.to_string().contains("Failed to open few-shot corpus"));
    }
}
