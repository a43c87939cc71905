//! QA generation from markdown policy documents.
//!
//! Every document is chunked, and every (generator model, question type) pair
//! gets its own output file of [`GeneratedBlock`]s, one per chunk that yielded
//! an answer. Chunks already present in an existing output file are reused
//! rather than regenerated.
//!
//! Input layout: `<input>/<id>_<name>.md`.
//! Output layout: `<output>/<id>_<name>/<id>_<name>_<model>_<qtype-slug>_<fewshot>.json`.

mod chunking;
mod fewshot;
mod pair_parser;
mod prompt;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::models::{
    DocumentId, DocumentMetadata, GeneratedBlock, MetadataIndex, QaItem, QuestionType,
};
use crate::ollama::{CompletionRequest, OllamaClientTrait};
use crate::utils::{
    ensure_input_folder, file_name, file_stem, generated_file_name, list_files_with_extension,
    read_json, write_json_atomic,
};

pub use chunking::MarkdownChunker;
pub use fewshot::FewShotCorpus;
pub use pair_parser::{PairParser, is_not_applicable};
pub use prompt::{GenerationPrompt, type_instructions};

/// Outcome counters of one generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub files_found: usize,
    pub files_skipped: usize,
    pub outputs_written: usize,
    pub chunks_generated: usize,
    pub chunks_reused: usize,
    pub chunks_not_applicable: usize,
    pub failed_calls: usize,
    pub pairs: usize,
}

/// Number of questions to request for a chunk.
///
/// One question per `chars_per_question` characters, rounded up; documents
/// whose file name contains `meta` always get `meta_question_count`.
pub fn questions_for_chunk(
    chunk: &str,
    document_file: &str,
    chars_per_question: usize,
    meta_question_count: usize,
) -> usize {
    if document_file.contains("meta") {
        return meta_question_count;
    }
    chunk
        .chars()
        .count()
        .div_ceil(chars_per_question.max(1))
        .max(1)
}

/// Shared state of a generation run.
pub struct Generator<'a> {
    client: &'a dyn OllamaClientTrait,
    config: &'a PipelineConfig,
    metadata: &'a MetadataIndex,
    corpus: &'a FewShotCorpus,
    chunker: MarkdownChunker,
    parser: PairParser,
}

impl<'a> Generator<'a> {
    /// # Errors
    ///
    /// Returns an error if the chunker or parser patterns fail to compile.
    pub fn new(
        client: &'a dyn OllamaClientTrait,
        config: &'a PipelineConfig,
        metadata: &'a MetadataIndex,
        corpus: &'a FewShotCorpus,
    ) -> Result<Self> {
        Ok(Self {
            client,
            config,
            metadata,
            corpus,
            chunker: MarkdownChunker::from_config(&config.generation)?,
            parser: PairParser::new()?,
        })
    }

    /// Generates every (model, question type) output of one markdown file.
    ///
    /// # Errors
    ///
    /// Returns an error if an output file cannot be written.
    pub fn generate_document(
        &self,
        path: &Path,
        output: &Path,
        report: &mut GenerationReport,
    ) -> Result<()> {
        let (Some(name), Some(document)) = (file_name(path), file_stem(path)) else {
            report.files_skipped += 1;
            return Ok(());
        };
        if self.config.generation.excluded_files.iter().any(|f| f == document) {
            report.files_skipped += 1;
            debug!(document = %document, "excluded");
            return Ok(());
        }

        let Some(document_id) = DocumentId::from_file_stem(document) else {
            report.files_skipped += 1;
            warn!(file = %name, "file name has no document id");
            return Ok(());
        };
        let Some(metadata) = self.metadata.get(document_id) else {
            report.files_skipped += 1;
            warn!(document_id = %document_id, "no metadata for document; skipping file");
            return Ok(());
        };

        let markdown = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                report.files_skipped += 1;
                warn!(path = %path.display(), error = %e, "skipping unreadable document");
                return Ok(());
            }
        };
        let chunks = self.chunker.chunk(&markdown);
        debug!(document = %document, chunks = chunks.len(), "chunked document");

        let document_dir = output.join(document);
        for model in &self.config.models {
            for question_type in QuestionType::ALL {
                let Some(fewshot) = self.config.fewshot_count(model, question_type) else {
                    warn!(model = %model, question_type = %question_type, "no few-shot count configured");
                    continue;
                };
                let target =
                    document_dir.join(generated_file_name(document, model, question_type, fewshot));
                let job = Job {
                    document: name,
                    document_id,
                    metadata,
                    model,
                    question_type,
                    fewshot,
                };
                self.generate_output(&job, &chunks, &target, report)?;
            }
        }
        Ok(())
    }

    fn generate_output(
        &self,
        job: &Job<'_>,
        chunks: &[String],
        target: &Path,
        report: &mut GenerationReport,
    ) -> Result<()> {
        let mut previous = load_previous(target);
        let examples = match job.metadata.policy_type() {
            Some(policy_type) => self.corpus.select(policy_type, job.question_type, job.fewshot),
            None => {
                debug!(program_type = %job.metadata.program_type, "no few-shot pool for program type");
                Vec::new()
            }
        };

        info!(
            document = %job.document,
            model = %job.model,
            question_type = %job.question_type,
            "generating"
        );

        // One slot per chunk, in document order. Reused chunks are filled in
        // up front so every intermediate write keeps them.
        let mut slots: Vec<Option<GeneratedBlock>> = chunks
            .iter()
            .map(|chunk| {
                previous
                    .remove(chunk)
                    .map(|response| self.block(job, chunk, response))
            })
            .collect();
        report.chunks_reused += slots.iter().filter(|slot| slot.is_some()).count();

        for (index, chunk) in chunks.iter().enumerate() {
            if slots[index].is_some() {
                continue;
            }

            let num_questions = questions_for_chunk(
                chunk,
                job.document,
                self.config.generation.chars_per_question,
                self.config.generation.meta_question_count,
            );
            let prompt = GenerationPrompt {
                metadata: job.metadata,
                chunk,
                question_type: job.question_type,
                examples: &examples,
                num_questions,
            }
            .render();

            let completion = match self.client.generate(&CompletionRequest::new(job.model, prompt)) {
                Ok(text) => text,
                Err(e) => {
                    report.failed_calls += 1;
                    warn!(model = %job.model, error = %e, "generation call failed; chunk left for the next run");
                    continue;
                }
            };
            if is_not_applicable(&completion) {
                report.chunks_not_applicable += 1;
                continue;
            }

            let response = self.parser.parse(&completion);
            if response.is_empty() {
                warn!(model = %job.model, "completion contained no QA records");
            }
            report.chunks_generated += 1;
            report.pairs += response.len();
            slots[index] = Some(self.block(job, chunk, response));
            write_json_atomic(target, &filled(&slots))?;
        }

        write_json_atomic(target, &filled(&slots))
            .with_context(|| format!("Failed to write generated pairs for {}", job.document))?;
        report.outputs_written += 1;
        Ok(())
    }

    fn block(&self, job: &Job<'_>, chunk: &str, response: Vec<QaItem>) -> GeneratedBlock {
        GeneratedBlock {
            chunk: chunk.to_string(),
            response,
            question_type: job.question_type,
            document_id: job.document_id,
            llm: Some(job.model.to_string()),
        }
    }
}

/// One (document, model, question type) output.
struct Job<'a> {
    document: &'a str,
    document_id: DocumentId,
    metadata: &'a DocumentMetadata,
    model: &'a str,
    question_type: QuestionType,
    fewshot: usize,
}

fn filled(slots: &[Option<GeneratedBlock>]) -> Vec<&GeneratedBlock> {
    slots.iter().flatten().collect()
}

fn load_previous(target: &Path) -> HashMap<String, Vec<QaItem>> {
    if !target.exists() {
        return HashMap::new();
    }
    match read_json::<Vec<GeneratedBlock>>(target) {
        Ok(blocks) => blocks.into_iter().map(|b| (b.chunk, b.response)).collect(),
        Err(e) => {
            warn!(path = %target.display(), error = %format!("{e:#}"), "ignoring unreadable output; regenerating");
            HashMap::new()
        }
    }
}

/// Generates QA pairs for every markdown file from `start_index` on.
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
    corpus: &FewShotCorpus,
) -> Result<GenerationReport> {
    ensure_input_folder(input)?;

    let files = list_files_with_extension(input, "md")?;
    let mut report = GenerationReport {
        files_found: files.len(),
        ..GenerationReport::default()
    };
    let generator = Generator::new(client, config, metadata, corpus)?;

    let selected: Vec<_> = files.iter().skip(start_index).collect();
    let total = selected.len();
    for (position, path) in selected.into_iter().enumerate() {
        info!(
            progress = %format!("{}/{}", position + 1, total),
            file = %path.display(),
            "processing document"
        );
        generator.generate_document(path, output, &mut report)?;
    }

    info!(
        outputs = report.outputs_written,
        generated = report.chunks_generated,
        reused = report.chunks_reused,
        not_applicable = report.chunks_not_applicable,
        failed_calls = report.failed_calls,
        pairs = report.pairs,
        "generation completed"
    );
    Ok(report)
}
