//! Pipeline configuration.
//!
//! A single immutable [`PipelineConfig`] is built at process start and passed by
//! reference into every stage. Every field has a default, so a config file only
//! needs to name what it overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dedup::DEFAULT_SIMILARITY_THRESHOLD;
use crate::evaluator::DEFAULT_MAX_ATTEMPTS;
use crate::models::QuestionType;
use crate::quality_gate::DEFAULT_QUALITY_THRESHOLD;

/// Number of few-shot examples a generator model is prompted with for one
/// question type. The count is also part of the generated file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotCount {
    pub model: String,
    pub question_type: QuestionType,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub timeout_secs: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_chunk_limit: usize,
    pub chars_per_question: usize,
    /// Questions requested per chunk for `meta` documents.
    pub meta_question_count: usize,
    pub excluded_files: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 12_000,
            chunk_size: 4096,
            chunk_overlap: 512,
            max_chunk_limit: 8192,
            chars_per_question: 1024,
            meta_question_count: 5,
            excluded_files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub model: String,
    pub timeout_secs: u64,
    pub max_attempts: usize,
    pub json_mode: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            model: "qwen3:8b".to_string(),
            timeout_secs: 100,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            json_mode: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub embedding_model: String,
    pub similarity_threshold: f32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            embedding_model: "llama3".to_string(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_QUALITY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Generator models, in the order their outputs are merged.
    pub models: Vec<String>,
    pub fewshot_counts: Vec<FewShotCount>,
    pub generation: GenerationConfig,
    pub evaluation: EvaluationConfig,
    pub dedup: DedupConfig,
    pub quality: QualityConfig,
    pub metadata_path: PathBuf,
    pub fewshot_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let models = ["mixtral", "gemma3:27b", "llama3.3", "yi:34b"];
        // Rows follow `models`, columns follow `QuestionType::ALL`.
        let counts: [[usize; 5]; 4] = [
            [3, 3, 5, 4, 2],
            [3, 5, 2, 3, 4],
            [4, 5, 3, 2, 2],
            [4, 5, 3, 4, 2],
        ];

        let fewshot_counts = models
            .iter()
            .zip(counts)
            .flat_map(|(model, row)| {
                QuestionType::ALL
                    .into_iter()
                    .zip(row)
                    .map(move |(question_type, count)| FewShotCount {
                        model: model.to_string(),
                        question_type,
                        count,
                    })
            })
            .collect();

        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            fewshot_counts,
            generation: GenerationConfig::default(),
            evaluation: EvaluationConfig::default(),
            dedup: DedupConfig::default(),
            quality: QualityConfig::default(),
            metadata_path: PathBuf::from("data/documents.json"),
            fewshot_path: PathBuf::from("data/context.csv"),
        }
    }
}

impl PipelineConfig {
    /// Loads the configuration from a JSON file, or returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is inconsistent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse config: {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            anyhow::bail!("Config must name at least one generator model");
        }
        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            anyhow::bail!(
                "Similarity threshold must be within 0..=1, got {}",
                self.dedup.similarity_threshold
            );
        }
        if self.evaluation.max_attempts == 0 {
            anyhow::bail!("Evaluation needs at least one attempt per metric");
        }
        if self.generation.chunk_overlap >= self.generation.chunk_size {
            anyhow::bail!("Chunk overlap must be smaller than chunk size");
        }
        Ok(())
    }

    /// Returns the few-shot count configured for `model` and `question_type`.
    pub fn fewshot_count(&self, model: &str, question_type: QuestionType) -> Option<usize> {
        self.fewshot_counts
            .iter()
            .find(|entry| entry.model == model && entry.question_type == question_type)
            .map(|entry| entry.count)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.timeout_secs)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_fewshot_table() {
        let config = PipelineConfig::default();
        assert_eq!(config.models.len(), 4);
        assert_eq!(config.fewshot_counts.len(), 20);
        assert_eq!(
            config.fewshot_count("mixtral", QuestionType::LegalObligation),
            Some(5)
        );
        assert_eq!(
            config.fewshot_count("gemma3:27b", QuestionType::Descriptive),
            Some(4)
        );
        assert_eq!(config.fewshot_count("yi:34b", QuestionType::Factual), Some(4));
        assert_eq!(config.fewshot_count("phi3", QuestionType::Factual), None);
    }

    #[test]
    fn load_without_path_returns_defaults() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.evaluation.max_attempts, 2);
        assert_eq!(config.dedup.similarity_threshold, 0.95);
        assert_eq!(config.quality.threshold, 7.0);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"evaluation": {"model": "llama3.1"}, "dedup": {"similarity_threshold": 0.9}}"#,
        )
        .unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.evaluation.model, "llama3.1");
        assert_eq!(config.evaluation.timeout_secs, 100);
        assert_eq!(config.dedup.similarity_threshold, 0.9);
        assert_eq!(config.dedup.embedding_model, "llama3");
        assert_eq!(config.models.len(), 4);
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"dedup": {"similarity_threshold": 1.5}}"#).unwrap();

        let err = PipelineConfig::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Similarity threshold"));
    }
}
