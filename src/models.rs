mod document;
mod fewshot;
mod ids;
mod metric;
mod question_type;
mod records;
mod triplet;

pub use document::{DocumentMetadata, MetadataIndex, PolicyType};
pub use fewshot::FewShotExample;
pub use ids::DocumentId;
pub use metric::Metric;
pub use question_type::QuestionType;
pub use records::{CanonicalBlock, FilteredTriplet, GeneratedBlock};
pub use triplet::{
    ANSWER_SCORE_WEIGHTS, CandidateTriplet, CanonicalTriplet, QaItem, clean_conditions,
    normalize_label_residue,
};
