//! On-disk record shapes shared between pipeline stages.

use serde::{Deserialize, Serialize};

use super::{CanonicalTriplet, DocumentId, QaItem, QuestionType};

/// All QA items one generator model produced for one chunk.
///
/// Generation and evaluation files are JSON arrays of these blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedBlock {
    pub chunk: String,
    #[serde(default)]
    pub response: Vec<QaItem>,
    pub question_type: QuestionType,
    pub document_id: DocumentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<String>,
}

/// Deduplicated triplets for one chunk of one document and question type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalBlock {
    pub block_index: usize,
    pub chunk: String,
    pub question_type: QuestionType,
    pub document_id: DocumentId,
    pub result: Vec<CanonicalTriplet>,
}

/// A triplet that passed the quality gate, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredTriplet {
    pub document_id: String,
    pub chunk: String,
    #[serde(flatten)]
    pub triplet: CanonicalTriplet,
}
