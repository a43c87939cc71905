use serde::{Deserialize, Serialize};

use super::{PolicyType, QuestionType};

/// A human-rated QA example shown to generator models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub policy_type: PolicyType,
    pub question_type: QuestionType,
    pub question: String,
    pub answer: String,
    pub conditions: String,
    pub context: String,
    pub question_rating: f64,
    pub answer_rating: f64,
}

impl FewShotExample {
    /// Equal-weight mean of the question and answer ratings.
    pub fn rating(&self) -> f64 {
        0.5 * self.question_rating + 0.5 * self.answer_rating
    }
}
