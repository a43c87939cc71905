use std::fmt;

/// An LLM-judged quality dimension of a QA item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Accuracy,
    Completeness,
    Groundedness,
    Relevance,
    Intent,
}

impl Metric {
    /// All metrics, in evaluation order.
    pub const ALL: [Metric; 5] = [
        Metric::Accuracy,
        Metric::Completeness,
        Metric::Groundedness,
        Metric::Relevance,
        Metric::Intent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::Completeness => "completeness",
            Self::Groundedness => "groundedness",
            Self::Relevance => "relevance",
            Self::Intent => "intent",
        }
    }

    /// Key under which the numeric score is stored on a QA item.
    pub fn score_key(self) -> String {
        format!("{}_score", self.name())
    }

    /// Key under which the parsed judge response is stored on a QA item.
    pub fn eval_key(self) -> String {
        format!("{}_eval", self.name())
    }

    /// Key under which the unparsed judge completion is stored.
    pub fn raw_key(self) -> String {
        format!("{}_raw", self.name())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
