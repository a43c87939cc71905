pub mod config;
pub mod dedup;
pub mod evaluator;
pub mod generation;
pub mod models;
pub mod ollama;
pub mod quality_gate;
pub mod utils;

pub use config::PipelineConfig;
pub use models::{
    CandidateTriplet, CanonicalBlock, CanonicalTriplet, DocumentId, FilteredTriplet,
    GeneratedBlock, Metric, QaItem, QuestionType,
};
