//! Score-threshold filter over deduplicated triplets.
//!
//! A triplet passes when both its question-side average
//! `(relevance + intent) / 2` and its answer-side average
//! `(accuracy + completeness + groundedness) / 3` reach the threshold.
//! Passing triplets are copied unchanged and partitioned by question type.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::models::{CanonicalBlock, CanonicalTriplet, FilteredTriplet, QuestionType};
use crate::utils::{ensure_input_folder, file_name, read_json, write_json_atomic};

/// Minimum average score, on the 0–10 judge scale, for a triplet to pass.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 7.0;

/// Average of the question-side scores.
pub fn question_score(triplet: &CanonicalTriplet) -> f64 {
    (triplet.relevance + triplet.intent) / 2.0
}

/// Average of the answer-side scores.
pub fn answer_quality(triplet: &CanonicalTriplet) -> f64 {
    (triplet.accuracy + triplet.completeness + triplet.groundedness) / 3.0
}

/// Returns whether `triplet` meets `threshold` on both averages.
pub fn passes(triplet: &CanonicalTriplet, threshold: f64) -> bool {
    question_score(triplet) >= threshold && answer_quality(triplet) >= threshold
}

/// Selects the passing triplets of `blocks`, grouped by question type.
///
/// `document_id` is attached to every passing triplet together with the
/// chunk text of its block.
pub fn filter_blocks(
    document_id: &str,
    blocks: &[CanonicalBlock],
    threshold: f64,
) -> BTreeMap<QuestionType, Vec<FilteredTriplet>> {
    let mut by_type: BTreeMap<QuestionType, Vec<FilteredTriplet>> = BTreeMap::new();
    for block in blocks {
        for triplet in block.result.iter().filter(|t| passes(t, threshold)) {
            by_type
                .entry(block.question_type)
                .or_default()
                .push(FilteredTriplet {
                    document_id: document_id.to_string(),
                    chunk: block.chunk.clone(),
                    triplet: triplet.clone(),
                });
        }
    }
    by_type
}

/// Path of the filtered output file of one question type.
pub fn output_path(output: &Path, question_type: QuestionType) -> PathBuf {
    output.join(format!("relevance_{}.json", question_type.slug()))
}

/// Per-type counts of one filter run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub files_read: usize,
    pub unreadable_files: usize,
    pub triplets_seen: usize,
    pub passed: BTreeMap<QuestionType, usize>,
}

impl FilterReport {
    pub fn total_passed(&self) -> usize {
        self.passed.values().sum()
    }
}

/// Filters every canonical file under `input` and writes one file per
/// question type to `output`.
///
/// The document id of a file is the name of the directory containing it.
/// Files that cannot be parsed are reported and skipped. Every question type
/// gets an output file, empty if nothing passed.
///
/// # Errors
///
/// Returns an error if the input folder is missing or an output file cannot
/// be written.
pub fn run(input: &Path, output: &Path, threshold: f64) -> Result<FilterReport> {
    ensure_input_folder(input)?;

    let mut report = FilterReport::default();
    let mut by_type: BTreeMap<QuestionType, Vec<FilteredTriplet>> = BTreeMap::new();

    let files = WalkDir::new(input)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"));

    for entry in files {
        let path = entry.path();
        let document_id = path
            .parent()
            .and_then(file_name)
            .unwrap_or_default()
            .to_string();

        let blocks: Vec<CanonicalBlock> = match read_json(path) {
            Ok(blocks) => blocks,
            Err(e) => {
                report.unreadable_files += 1;
                warn!(path = %path.display(), error = %format!("{e:#}"), "skipping unreadable file");
                continue;
            }
        };
        report.files_read += 1;
        report.triplets_seen += blocks.iter().map(|b| b.result.len()).sum::<usize>();

        for (question_type, triplets) in filter_blocks(&document_id, &blocks, threshold) {
            by_type.entry(question_type).or_default().extend(triplets);
        }
    }

    for question_type in QuestionType::ALL {
        let triplets = by_type.remove(&question_type).unwrap_or_default();
        let path = output_path(output, question_type);
        write_json_atomic(&path, &triplets)?;
        info!(count = triplets.len(), path = %path.display(), "wrote filtered triplets");
        report.passed.insert(question_type, triplets.len());
    }

    info!(
        files = report.files_read,
        seen = report.triplets_seen,
        passed = report.total_passed(),
        "filtering completed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentId;

    fn triplet(relevance: f64, intent: f64, accuracy: f64, completeness: f64, groundedness: f64) -> CanonicalTriplet {
        CanonicalTriplet {
            question: "Q".to_string(),
            answer: "A".to_string(),
            context: "C".to_string(),
            conditions: Vec::new(),
            accuracy,
            completeness,
            groundedness,
            relevance,
            intent,
            model: "mixtral".to_string(),
        }
    }

    #[test]
    fn threshold_boundary_passes() {
        let t = triplet(8.0, 6.0, 6.0, 8.0, 8.0);
        assert_eq!(question_score(&t), 7.0);
        assert!((answer_quality(&t) - 7.333).abs() < 0.01);
        assert!(passes(&t, DEFAULT_QUALITY_THRESHOLD));
    }

    #[test]
    fn low_question_side_fails_regardless_of_answer_side() {
        let t = triplet(5.0, 5.0, 10.0, 10.0, 10.0);
        assert!(!passes(&t, DEFAULT_QUALITY_THRESHOLD));
    }

    #[test]
    fn low_answer_side_fails() {
        let t = triplet(9.0, 9.0, 7.0, 7.0, 6.0);
        assert!(!passes(&t, DEFAULT_QUALITY_THRESHOLD));
    }

    #[test]
    fn failed_evaluation_sentinel_never_passes() {
        let t = triplet(-1.0, 10.0, 10.0, 10.0, 10.0);
        assert!(!passes(&t, DEFAULT_QUALITY_THRESHOLD));
    }

    #[test]
    fn filter_blocks_keeps_exactly_the_passing_subset_unchanged() {
        let good = triplet(8.0, 6.0, 6.0, 8.0, 8.0);
        let bad = triplet(5.0, 5.0, 9.0, 9.0, 9.0);
        let blocks = vec![
            CanonicalBlock {
                block_index: 0,
                chunk: "first chunk".to_string(),
                question_type: QuestionType::Factual,
                document_id: DocumentId::new(3),
                result: vec![good.clone(), bad.clone()],
            },
            CanonicalBlock {
                block_index: 1,
                chunk: "second chunk".to_string(),
                question_type: QuestionType::Factual,
                document_id: DocumentId::new(3),
                result: vec![bad],
            },
        ];

        let by_type = filter_blocks("3_doc", &blocks, DEFAULT_QUALITY_THRESHOLD);
        let factual = &by_type[&QuestionType::Factual];
        assert_eq!(factual.len(), 1);
        assert_eq!(factual[0].triplet, good);
        assert_eq!(factual[0].chunk, "first chunk");
        assert_eq!(factual[0].document_id, "3_doc");
        assert!(!by_type.contains_key(&QuestionType::YesNo));
    }
}
