/// End-to-end tests of the generation stage with a mock generator model.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use policyqa::config::PipelineConfig;
use policyqa::generation::{self, FewShotCorpus, MarkdownChunker};
use policyqa::models::{DocumentId, DocumentMetadata, GeneratedBlock, MetadataIndex, QuestionType};
use policyqa::ollama::{CompletionRequest, OllamaClientTrait, OllamaError};
use policyqa::utils::generated_file_name;
use serde_json::Value;

const DOCUMENT: &str = "12_ohio_net_metering";

const COMPLETION: &str = "### 1
**Question** - Is net metering available to residential customers?
**Answer** - Yes, for systems up to 25 kW.
**Conditions** - [\"system size up to 25 kW\"]
**Context** - Net metering is available to residential customers with systems up to 25 kW.";

struct MockGenerator {
    reply: Result<String, u16>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl MockGenerator {
    fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            reply: Err(503),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl OllamaClientTrait for MockGenerator {
    fn generate(&self, request: &CompletionRequest) -> Result<String, OllamaError> {
        self.prompts
            .lock()
            .unwrap()
            .push((request.model.clone(), request.prompt.clone()));
        self.reply
            .clone()
            .map_err(|status| OllamaError::Http { status })
    }

    fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>, OllamaError> {
        Err(OllamaError::Api {
            message: "generation never embeds".to_string(),
        })
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        models: vec!["mixtral".to_string()],
        ..PipelineConfig::default()
    }
}

fn metadata() -> MetadataIndex {
    MetadataIndex::from_rows(vec![DocumentMetadata {
        id: DocumentId::new(12),
        title: "Ohio Net Metering".to_string(),
        state: "Ohio".to_string(),
        program_type: "Regulatory Policy".to_string(),
        sector: "Residential".to_string(),
        summary: "Net metering rules for Ohio utilities.".to_string(),
        incentive_amount_data: Value::Null,
    }])
}

fn seed_document(input: &Path) {
    fs::write(
        input.join(format!("{DOCUMENT}.md")),
        "# Net Metering\n\nNet metering is available to residential customers with systems up to 25 kW.\n\n![diagram](meter.png)\n",
    )
    .unwrap();
}

fn read_output(output: &Path, question_type: QuestionType) -> Vec<GeneratedBlock> {
    let config = config();
    let fewshot = config.fewshot_count("mixtral", question_type).unwrap();
    let path = output
        .join(DOCUMENT)
        .join(generated_file_name(DOCUMENT, "mixtral", question_type, fewshot));
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn run(input: &Path, output: &Path, client: &MockGenerator) -> generation::GenerationReport {
    generation::run(
        input,
        output,
        0,
        &config(),
        client,
        &metadata(),
        &FewShotCorpus::from_examples(Vec::new()),
    )
    .unwrap()
}

#[test]
fn each_question_type_gets_its_own_output_file() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed_document(input.path());
    let client = MockGenerator::replying(COMPLETION);

    let report = run(input.path(), output.path(), &client);

    assert_eq!(report.files_found, 1);
    assert_eq!(report.outputs_written, QuestionType::ALL.len());
    assert_eq!(report.chunks_generated, QuestionType::ALL.len());
    assert_eq!(client.calls(), QuestionType::ALL.len());

    for question_type in QuestionType::ALL {
        let blocks = read_output(output.path(), question_type);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].question_type, question_type);
        assert_eq!(blocks[0].document_id, DocumentId::new(12));
        assert_eq!(blocks[0].llm.as_deref(), Some("mixtral"));
        assert!(!blocks[0].chunk.contains("meter.png"));

        let item = &blocks[0].response[0];
        assert_eq!(item.question, "Is net metering available to residential customers?");
        assert_eq!(item.conditions, vec!["system size up to 25 kW".to_string()]);
    }

    let prompts = client.prompts.lock().unwrap();
    assert!(prompts.iter().all(|(model, _)| model == "mixtral"));
    assert!(prompts[0].1.contains("Ohio Net Metering"));
}

#[test]
fn rerun_reuses_generated_chunks() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed_document(input.path());
    run(input.path(), output.path(), &MockGenerator::replying(COMPLETION));

    let client = MockGenerator::replying("NA");
    let report = run(input.path(), output.path(), &client);

    assert_eq!(client.calls(), 0);
    assert_eq!(report.chunks_reused, QuestionType::ALL.len());
    assert_eq!(read_output(output.path(), QuestionType::Factual)[0].response.len(), 1);
}

#[test]
fn not_applicable_replies_leave_no_block() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed_document(input.path());

    let report = run(input.path(), output.path(), &MockGenerator::replying(" 'NA' "));

    assert_eq!(report.chunks_not_applicable, QuestionType::ALL.len());
    assert!(read_output(output.path(), QuestionType::YesNo).is_empty());
}

#[test]
fn failed_calls_are_retried_on_the_next_run() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed_document(input.path());

    let report = run(input.path(), output.path(), &MockGenerator::failing());
    assert_eq!(report.failed_calls, QuestionType::ALL.len());
    assert!(read_output(output.path(), QuestionType::Descriptive).is_empty());

    let client = MockGenerator::replying(COMPLETION);
    let report = run(input.path(), output.path(), &client);
    assert_eq!(report.chunks_generated, QuestionType::ALL.len());
    assert_eq!(read_output(output.path(), QuestionType::Descriptive).len(), 1);
}

/// Records which chunks the output file holds each time a call is made,
/// i.e. what a crash during that call would leave on disk.
struct DiskWatchingGenerator {
    target: PathBuf,
    seen_on_disk: Mutex<Vec<Vec<String>>>,
}

impl OllamaClientTrait for DiskWatchingGenerator {
    fn generate(&self, _request: &CompletionRequest) -> Result<String, OllamaError> {
        let chunks = fs::read_to_string(&self.target)
            .ok()
            .and_then(|text| serde_json::from_str::<Vec<GeneratedBlock>>(&text).ok())
            .map(|blocks| blocks.into_iter().map(|b| b.chunk).collect())
            .unwrap_or_default();
        self.seen_on_disk.lock().unwrap().push(chunks);
        Ok(COMPLETION.to_string())
    }

    fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>, OllamaError> {
        Err(OllamaError::Api {
            message: "generation never embeds".to_string(),
        })
    }
}

#[test]
fn intermediate_writes_keep_reused_chunks_later_in_the_document() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let markdown = "# Eligibility\n\nResidential customers with systems up to 25 kW qualify.\n\n\
                    # Billing\n\nExcess generation is credited to the next monthly bill.\n\n\
                    # Interconnection\n\nUtilities must process interconnection requests within 30 days.\n";
    fs::write(input.path().join(format!("{DOCUMENT}.md")), markdown).unwrap();

    let config = PipelineConfig {
        generation: policyqa::config::GenerationConfig {
            chunk_size: 40,
            ..Default::default()
        },
        ..config()
    };
    let chunks = MarkdownChunker::from_config(&config.generation)
        .unwrap()
        .chunk(markdown);
    assert_eq!(chunks.len(), 3);

    let fewshot = config.fewshot_count("mixtral", QuestionType::YesNo).unwrap();
    let target = output
        .path()
        .join(DOCUMENT)
        .join(generated_file_name(DOCUMENT, "mixtral", QuestionType::YesNo, fewshot));
    fs::create_dir_all(target.parent().unwrap()).unwrap();
    let reused = GeneratedBlock {
        chunk: chunks[2].clone(),
        response: Vec::new(),
        question_type: QuestionType::YesNo,
        document_id: DocumentId::new(12),
        llm: Some("mixtral".to_string()),
    };
    fs::write(&target, serde_json::to_string(&vec![reused]).unwrap()).unwrap();

    let client = DiskWatchingGenerator {
        target: target.clone(),
        seen_on_disk: Mutex::new(Vec::new()),
    };
    generation::run(
        input.path(),
        output.path(),
        0,
        &config,
        &client,
        &metadata(),
        &FewShotCorpus::from_examples(Vec::new()),
    )
    .unwrap();

    // Yes/No is generated first: one call per chunk not yet on disk.
    let seen = client.seen_on_disk.lock().unwrap();
    assert_eq!(seen[0], vec![chunks[2].clone()]);
    assert_eq!(seen[1], vec![chunks[0].clone(), chunks[2].clone()]);

    let blocks = read_output(output.path(), QuestionType::YesNo);
    let written: Vec<&str> = blocks.iter().map(|b| b.chunk.as_str()).collect();
    assert_eq!(written, vec![chunks[0].as_str(), chunks[1].as_str(), chunks[2].as_str()]);
}

#[test]
fn documents_without_metadata_or_excluded_are_skipped() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed_document(input.path());
    fs::write(input.path().join("99_unknown.md"), "# Unknown\n\nText.").unwrap();

    let config = PipelineConfig {
        generation: policyqa::config::GenerationConfig {
            excluded_files: vec![DOCUMENT.to_string()],
            ..Default::default()
        },
        ..config()
    };
    let client = MockGenerator::replying(COMPLETION);
    let report = generation::run(
        input.path(),
        output.path(),
        0,
        &config,
        &client,
        &metadata(),
        &FewShotCorpus::from_examples(Vec::new()),
    )
    .unwrap();

    assert_eq!(report.files_found, 2);
    assert_eq!(report.files_skipped, 2);
    assert_eq!(client.calls(), 0);
}
