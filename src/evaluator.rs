//! LLM-as-judge scoring of generated QA files.
//!
//! Every item of every chunk is scored on each [`Metric`] by a judge model.
//! One metric gets a bounded number of attempts; if none yields a score the
//! item keeps the `-1` sentinel and an [`ErrorRecord`] is collected.
//!
//! Input layout: `<input>/<document>/<generated file>.json`.
//! Output layout: `<output>/<document>/<same file name>`, plus
//! `<output>/error.json` holding every exhausted (item, metric).

mod metric_loop;
mod rubric;
mod score_parser;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::{EvaluationConfig, PipelineConfig};
use crate::models::{
    DocumentId, DocumentMetadata, GeneratedBlock, MetadataIndex, Metric, QaItem, QuestionType,
};
use crate::ollama::{CompletionRequest, OllamaClientTrait};
use crate::utils::{
    ensure_input_folder, file_name, file_stem, list_files_with_extension, list_subdirectories,
    read_json, write_json_atomic,
};

pub use metric_loop::{
    AttemptFailure, DEFAULT_MAX_ATTEMPTS, FAILED_SCORE, MetricOutcome, score_with_retries,
};
pub use rubric::{build_prompt, rubric};
pub use score_parser::{ParsedScore, ScoreParseError, parse_score_response};

/// One (item, metric) whose every attempt failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    pub file: String,
    pub chunk_index: usize,
    pub metric: String,
    pub attempts: usize,
    pub reason: String,
    pub item: QaItem,
}

/// Scores QA items with a judge model.
pub struct ItemEvaluator<'a> {
    client: &'a dyn OllamaClientTrait,
    model: &'a str,
    json_mode: bool,
    max_attempts: usize,
}

/// A metric that could not be scored for one item.
#[derive(Debug)]
pub struct MetricFailure {
    pub metric: Metric,
    pub attempts: usize,
    pub error: AttemptFailure,
}

impl<'a> ItemEvaluator<'a> {
    pub fn new(client: &'a dyn OllamaClientTrait, config: &'a EvaluationConfig) -> Self {
        Self {
            client,
            model: &config.model,
            json_mode: config.json_mode,
            max_attempts: config.max_attempts,
        }
    }

    /// Scores `item` on every metric, writing `<metric>_score`, `<metric>_eval`
    /// and `<metric>_raw` onto it.
    ///
    /// A metric starts at the sentinel score and only changes once a reply
    /// parses. Returns the metrics that exhausted their attempts.
    pub fn evaluate_item(
        &self,
        metadata: &DocumentMetadata,
        chunk: &str,
        question_type: QuestionType,
        item: &mut QaItem,
    ) -> Vec<MetricFailure> {
        let mut failures = Vec::new();

        for metric in Metric::ALL {
            item.set_score(metric, FAILED_SCORE);
            let prompt = build_prompt(metadata, chunk, item, metric, question_type);
            let mut request = CompletionRequest::new(self.model, prompt);
            if self.json_mode {
                request = request.json();
            }

            let outcome = score_with_retries(self.max_attempts, |_| self.client.generate(&request));
            item.set_score(metric, outcome.score());
            match outcome.result {
                Ok(parsed) => {
                    item.set_eval(metric, parsed.eval);
                    item.set_raw(metric, &parsed.raw);
                }
                Err(error) => {
                    warn!(metric = %metric, attempts = outcome.attempts, error = %error, "metric evaluation failed");
                    failures.push(MetricFailure {
                        metric,
                        attempts: outcome.attempts,
                        error,
                    });
                }
            }
        }

        failures
    }

    /// Scores every item of `block`, collecting one error record per
    /// exhausted (item, metric).
    pub fn evaluate_block(
        &self,
        metadata: &DocumentMetadata,
        file: &str,
        chunk_index: usize,
        block: &mut GeneratedBlock,
        errors: &mut Vec<ErrorRecord>,
    ) {
        let chunk = block.chunk.as_str();
        for item in &mut block.response {
            let failures = self.evaluate_item(metadata, chunk, block.question_type, item);
            for failure in failures {
                errors.push(ErrorRecord {
                    recorded_at: OffsetDateTime::now_utc(),
                    file: file.to_string(),
                    chunk_index,
                    metric: failure.metric.name().to_string(),
                    attempts: failure.attempts,
                    reason: failure.error.to_string(),
                    item: item.clone(),
                });
            }
        }
    }
}

/// Outcome counters of one evaluation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    pub files_found: usize,
    pub files_evaluated: usize,
    pub files_complete: usize,
    pub files_skipped: usize,
    pub chunks_evaluated: usize,
    pub chunks_reused: usize,
    pub items_evaluated: usize,
    pub failed_metrics: usize,
}

/// Path of the shared error log.
pub fn error_log_path(output: &Path) -> PathBuf {
    output.join("error.json")
}

/// Lists the generated files of every document folder from `start_index` on,
/// sorted by file name.
///
/// # Errors
///
/// Returns an error if the input folder cannot be listed.
pub fn discover_files(input: &Path, start_index: usize) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for document_dir in list_subdirectories(input)?.into_iter().skip(start_index) {
        let Some(document) = file_name(&document_dir).map(str::to_string) else {
            continue;
        };
        match list_files_with_extension(&document_dir, "json") {
            Ok(paths) => files.extend(paths.into_iter().map(|p| (document.clone(), p))),
            Err(e) => warn!(path = %document_dir.display(), error = %e, "skipping unreadable document folder"),
        }
    }
    files.sort_by(|(_, a), (_, b)| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Evaluates every generated file of the selected documents.
///
/// Output files are rewritten after every chunk. A file whose output already
/// covers all of its chunks is skipped without any service call; otherwise
/// the chunks already present in the output are carried over and only the
/// rest are evaluated.
///
/// # Errors
///
/// Returns an error if the input folder is missing or an output file cannot
/// be written.
pub fn run(
    input: &Path,
    output: &Path,
    start_index: usize,
    config: &PipelineConfig,
    client: &dyn OllamaClientTrait,
    metadata: &MetadataIndex,
) -> Result<EvaluationReport> {
    ensure_input_folder(input)?;

    let files = discover_files(input, start_index)?;
    let mut report = EvaluationReport {
        files_found: files.len(),
        ..EvaluationReport::default()
    };
    let evaluator = ItemEvaluator::new(client, &config.evaluation);
    let error_path = error_log_path(output);
    let mut errors = load_error_log(&error_path);

    let total = files.len();
    for (position, (document, path)) in files.iter().enumerate() {
        let errors_before = errors.len();
        info!(
            progress = %format!("{}/{}", position + 1, total),
            file = %path.display(),
            "evaluating"
        );

        evaluate_file(
            &evaluator,
            path,
            &output.join(document),
            metadata,
            &mut errors,
            &mut report,
        )?;

        if errors.len() != errors_before {
            report.failed_metrics += errors.len() - errors_before;
            write_json_atomic(&error_path, &errors)?;
        }
    }

    info!(
        evaluated = report.files_evaluated,
        complete = report.files_complete,
        skipped = report.files_skipped,
        chunks = report.chunks_evaluated,
        items = report.items_evaluated,
        failed_metrics = report.failed_metrics,
        "evaluation completed"
    );
    Ok(report)
}

fn evaluate_file(
    evaluator: &ItemEvaluator<'_>,
    path: &Path,
    output_dir: &Path,
    metadata: &MetadataIndex,
    errors: &mut Vec<ErrorRecord>,
    report: &mut EvaluationReport,
) -> Result<()> {
    let (Some(name), Some(stem)) = (file_name(path), file_stem(path)) else {
        report.files_skipped += 1;
        return Ok(());
    };
    let target = output_dir.join(name);

    let input_blocks: Vec<GeneratedBlock> = match read_json(path) {
        Ok(blocks) => blocks,
        Err(e) => {
            report.files_skipped += 1;
            warn!(path = %path.display(), error = %format!("{e:#}"), "skipping unreadable file");
            return Ok(());
        }
    };

    let mut completed = load_completed(&target);
    let input_chunks: HashSet<&str> = input_blocks.iter().map(|b| b.chunk.as_str()).collect();
    if input_chunks.iter().all(|chunk| completed.contains_key(*chunk)) {
        report.files_complete += 1;
        debug!(path = %target.display(), "all chunks already evaluated; skipping");
        return Ok(());
    }

    let Some(document_id) = DocumentId::from_file_stem(stem) else {
        report.files_skipped += 1;
        warn!(file = %name, "file name has no document id");
        return Ok(());
    };
    let Some(document) = metadata.get(document_id) else {
        report.files_skipped += 1;
        warn!(document_id = %document_id, "no metadata for document; skipping file");
        return Ok(());
    };

    // One slot per input chunk, in input order. Every write carries all
    // completed chunks, including reused ones not reached yet.
    let mut slots: Vec<Option<GeneratedBlock>> = input_blocks
        .iter()
        .map(|block| completed.remove(&block.chunk))
        .collect();
    report.chunks_reused += slots.iter().filter(|slot| slot.is_some()).count();

    for (chunk_index, mut block) in input_blocks.into_iter().enumerate() {
        if slots[chunk_index].is_some() {
            continue;
        }

        debug!(chunk_index, items = block.response.len(), "evaluating chunk");
        evaluator.evaluate_block(document, name, chunk_index, &mut block, errors);
        report.chunks_evaluated += 1;
        report.items_evaluated += block.response.len();
        slots[chunk_index] = Some(block);
        write_json_atomic(&target, &filled(&slots))?;
    }

    write_json_atomic(&target, &filled(&slots))?;
    report.files_evaluated += 1;
    Ok(())
}

fn filled(slots: &[Option<GeneratedBlock>]) -> Vec<&GeneratedBlock> {
    slots.iter().flatten().collect()
}

/// Reads an existing output file into chunk-keyed blocks.
///
/// A missing or unreadable file means nothing has been evaluated yet.
fn load_completed(target: &Path) -> HashMap<String, GeneratedBlock> {
    if !target.exists() {
        return HashMap::new();
    }
    match read_json::<Vec<GeneratedBlock>>(target) {
        Ok(blocks) => blocks.into_iter().map(|b| (b.chunk.clone(), b)).collect(),
        Err(e) => {
            warn!(path = %target.display(), error = %format!("{e:#}"), "ignoring unreadable output; re-evaluating");
            HashMap::new()
        }
    }
}

fn load_error_log(path: &Path) -> Vec<ErrorRecord> {
    if !path.exists() {
        return Vec::new();
    }
    read_json(path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %format!("{e:#}"), "starting a fresh error log");
        Vec::new()
    })
}
