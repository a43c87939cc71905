use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use policyqa::config::PipelineConfig;
use policyqa::generation::FewShotCorpus;
use policyqa::models::MetadataIndex;
use policyqa::ollama::{OllamaClient, OllamaClientBuilder};
use policyqa::{dedup, evaluator, generation, quality_gate};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// policyqa - builds a QA dataset from energy policy documents with local LLMs
#[derive(Parser)]
#[command(name = "policyqa")]
#[command(about = "Generate, evaluate, deduplicate and filter policy QA triplets")]
#[command(version)]
struct Cli {
    /// JSON configuration file; every field is optional
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Pipeline stages, in the order they are normally run
#[derive(Subcommand)]
enum Commands {
    /// Generate QA pairs from markdown documents with every generator model
    Generate(StageArgs),
    /// Score generated QA pairs with the judge model
    Evaluate(StageArgs),
    /// Merge near-duplicate questions across generator models
    Dedup(StageArgs),
    /// Keep triplets whose scores pass the quality threshold
    Filter(FilterArgs),
}

/// Folders and resume position of a stage
#[derive(Args)]
struct StageArgs {
    #[arg(value_name = "INPUT_FOLDER")]
    input_folder: PathBuf,

    #[arg(value_name = "OUTPUT_FOLDER")]
    output_folder: PathBuf,

    /// Number of leading input entries to skip
    #[arg(value_name = "START_INDEX")]
    start_index: usize,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(value_name = "INPUT_FOLDER")]
    input_folder: PathBuf,

    #[arg(value_name = "OUTPUT_FOLDER")]
    output_folder: PathBuf,
}

fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Generate(args) => handle_generate(args, &config),
        Commands::Evaluate(args) => handle_evaluate(args, &config),
        Commands::Dedup(args) => handle_dedup(args, &config),
        Commands::Filter(args) => handle_filter(args, &config),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_generate(args: &StageArgs, config: &PipelineConfig) -> Result<()> {
    let metadata = load_metadata(&config.metadata_path)?;
    let corpus = FewShotCorpus::load(&config.fewshot_path)?;
    let client = OllamaClientBuilder::new()
        .timeout(config.generation_timeout())
        .build()
        .context("Failed to create generation client")?;

    let report = generation::run(
        &args.input_folder,
        &args.output_folder,
        args.start_index,
        config,
        &client,
        &metadata,
        &corpus,
    )?;
    info!(?report, "generate finished");
    Ok(())
}

fn handle_evaluate(args: &StageArgs, config: &PipelineConfig) -> Result<()> {
    let metadata = load_metadata(&config.metadata_path)?;
    // Attempts are bounded by the evaluator itself.
    let client = OllamaClientBuilder::new()
        .timeout(config.evaluation_timeout())
        .retry_delays(&[])
        .build()
        .context("Failed to create evaluation client")?;

    let report = evaluator::run(
        &args.input_folder,
        &args.output_folder,
        args.start_index,
        config,
        &client,
        &metadata,
    )?;
    info!(?report, "evaluate finished");
    Ok(())
}

fn handle_dedup(args: &StageArgs, config: &PipelineConfig) -> Result<()> {
    let client = embedding_client()?;
    let report = dedup::run(
        &args.input_folder,
        &args.output_folder,
        args.start_index,
        config,
        &client,
    )?;
    info!(?report, "dedup finished");
    Ok(())
}

fn handle_filter(args: &FilterArgs, config: &PipelineConfig) -> Result<()> {
    let report = quality_gate::run(
        &args.input_folder,
        &args.output_folder,
        config.quality.threshold,
    )?;
    for (question_type, passed) in &report.passed {
        info!(question_type = %question_type, passed, "filter results");
    }
    Ok(())
}

fn embedding_client() -> Result<OllamaClient> {
    OllamaClientBuilder::new()
        .build()
        .context("Failed to create embedding client")
}

fn load_metadata(path: &Path) -> Result<MetadataIndex> {
    let metadata = MetadataIndex::load(path)?;
    if metadata.is_empty() {
        anyhow::bail!("Document metadata is empty: {}", path.display());
    }
    Ok(metadata)
}
