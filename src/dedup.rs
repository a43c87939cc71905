//! Cross-model deduplication of evaluated QA files.
//!
//! For every (document, question type) pair found under the input folder, the
//! per-model evaluated files are merged chunk by chunk, near-duplicate
//! questions are clustered, and one canonical triplet is kept per cluster.
//!
//! Input layout: `<input>/<document>/<document>_<model>_<qtype-slug>_<fewshot>.json`.
//! Output layout: `<output>/<document>/<document>_<qtype-slug>.json`.

mod aggregator;
mod cluster;
mod selector;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::models::{GeneratedBlock, QuestionType};
use crate::ollama::OllamaClientTrait;
use crate::utils::{
    ensure_input_folder, file_name, file_stem, generated_file_name, list_files_with_extension,
    list_subdirectories, read_json, write_json_atomic,
};

pub use aggregator::{AggregationStats, ChunkAggregator, ChunkGroup, group_by_chunk};
pub use cluster::{DEFAULT_SIMILARITY_THRESHOLD, DisjointSet, SimilarityClusterer, cosine_similarity};
pub use selector::select_representative;

/// Outcome counters of one deduplication run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub pairs_found: usize,
    pub pairs_processed: usize,
    pub pairs_skipped: usize,
    pub missing_model_files: usize,
    pub unreadable_files: usize,
    pub stats: AggregationStats,
}

/// Finds every (document, question type) pair with at least one generated file.
///
/// Pairs are sorted by document name then question-type slug, which fixes the
/// meaning of `start_index` across runs. File names with fewer than four
/// `_`-separated parts, or whose second-to-last part is not a known question
/// type, are skipped.
///
/// # Errors
///
/// Returns an error if the input folder cannot be listed.
pub fn discover_pairs(input: &Path) -> Result<Vec<(String, QuestionType)>> {
    let mut pairs: BTreeSet<(String, &'static str)> = BTreeSet::new();

    for document_dir in list_subdirectories(input)? {
        let Some(document) = file_name(&document_dir) else {
            continue;
        };

        let files = match list_files_with_extension(&document_dir, "json") {
            Ok(files) => files,
            Err(e) => {
                warn!(path = %document_dir.display(), error = %e, "skipping unreadable document folder");
                continue;
            }
        };

        for file in files {
            let Some(stem) = file_stem(&file) else {
                continue;
            };
            let parts: Vec<&str> = stem.split('_').collect();
            if parts.len() < 4 {
                debug!(file = %file.display(), "skipping malformed file name");
                continue;
            }
            match QuestionType::parse(parts[parts.len() - 2]) {
                Some(question_type) => {
                    pairs.insert((document.to_string(), question_type.slug()));
                }
                None => warn!(file = %file.display(), "unknown question type in file name"),
            }
        }
    }

    Ok(pairs
        .into_iter()
        .filter_map(|(document, slug)| QuestionType::parse(slug).map(|qt| (document, qt)))
        .collect())
}

/// Path of the canonical output file of one (document, question type) pair.
pub fn output_path(output: &Path, document: &str, question_type: QuestionType) -> PathBuf {
    output
        .join(document)
        .join(format!("{}_{}.json", document, question_type.slug()))
}

/// Deduplicates every pair from `start_index` on.
///
/// Pairs whose output file already exists are skipped without any service
/// call, so an interrupted run can simply be restarted.
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
) -> Result<DedupReport> {
    ensure_input_folder(input)?;

    let pairs = discover_pairs(input)?;
    let mut report = DedupReport {
        pairs_found: pairs.len(),
        ..DedupReport::default()
    };
    let clusterer = SimilarityClusterer::new(config.dedup.similarity_threshold);
    info!(
        pairs = report.pairs_found,
        embedding_model = %config.dedup.embedding_model,
        threshold = clusterer.threshold(),
        "starting deduplication"
    );
    let aggregator = ChunkAggregator::new(client, &config.dedup.embedding_model, clusterer);

    let selected: Vec<&(String, QuestionType)> = pairs.iter().skip(start_index).collect();
    let total = selected.len();
    for (position, (document, question_type)) in selected.into_iter().enumerate() {
        let target = output_path(output, document, *question_type);
        if target.exists() {
            report.pairs_skipped += 1;
            debug!(path = %target.display(), "output exists; skipping");
            continue;
        }

        info!(
            progress = %format!("{}/{}", position + 1, total),
            document = %document,
            question_type = %question_type,
            "deduplicating"
        );
        deduplicate_pair(
            &input.join(document),
            document,
            *question_type,
            &target,
            config,
            &aggregator,
            &mut report,
        )?;
        report.pairs_processed += 1;
    }

    info!(
        processed = report.pairs_processed,
        skipped = report.pairs_skipped,
        chunks = report.stats.chunks,
        candidates = report.stats.candidates,
        classes = report.stats.classes,
        embedding_failures = report.stats.embedding_failures,
        "deduplication completed"
    );
    Ok(report)
}

fn deduplicate_pair(
    document_dir: &Path,
    document: &str,
    question_type: QuestionType,
    target: &Path,
    config: &PipelineConfig,
    aggregator: &ChunkAggregator<'_>,
    report: &mut DedupReport,
) -> Result<()> {
    let mut sources: Vec<(&str, Vec<GeneratedBlock>)> = Vec::new();

    for model in &config.models {
        let Some(fewshot) = config.fewshot_count(model, question_type) else {
            warn!(model = %model, question_type = %question_type, "no few-shot count configured");
            continue;
        };
        let path = document_dir.join(generated_file_name(document, model, question_type, fewshot));
        if !path.exists() {
            report.missing_model_files += 1;
            continue;
        }

        match read_json::<Vec<GeneratedBlock>>(&path) {
            Ok(blocks) => sources.push((model.as_str(), blocks)),
            Err(e) => {
                report.unreadable_files += 1;
                warn!(path = %path.display(), error = %format!("{e:#}"), "skipping unreadable file");
            }
        }
    }

    let mut stats = AggregationStats::default();
    let groups = group_by_chunk(sources, &mut stats);
    let blocks = aggregator.aggregate(&groups, &mut stats);
    report.stats.absorb(stats);

    write_json_atomic(target, &blocks)
}
