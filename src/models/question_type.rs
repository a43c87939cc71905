use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The closed set of question categories the dataset is built around.
///
/// Each type has two spellings: a human label carried inside JSON records
/// (`"Yes/No cond"`) and a filesystem-safe slug used in file names
/// (`"Yes-No-cond"`). Parsing accepts either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuestionType {
    YesNo,
    YesNoConditional,
    LegalObligation,
    Factual,
    Descriptive,
}

impl QuestionType {
    /// All question types, in canonical order.
    pub const ALL: [QuestionType; 5] = [
        QuestionType::YesNo,
        QuestionType::YesNoConditional,
        QuestionType::LegalObligation,
        QuestionType::Factual,
        QuestionType::Descriptive,
    ];

    /// Returns the label used inside JSON records and prompts.
    pub fn label(self) -> &'static str {
        match self {
            Self::YesNo => "Yes/No",
            Self::YesNoConditional => "Yes/No cond",
            Self::LegalObligation => "Legal Obligation",
            Self::Factual => "Factual",
            Self::Descriptive => "Descriptive",
        }
    }

    /// Returns the slug used in file names (`/` and spaces replaced by `-`).
    pub fn slug(self) -> &'static str {
        match self {
            Self::YesNo => "Yes-No",
            Self::YesNoConditional => "Yes-No-cond",
            Self::LegalObligation => "Legal-Obligation",
            Self::Factual => "Factual",
            Self::Descriptive => "Descriptive",
        }
    }

    /// Parses a label or a slug.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|qt| qt.label() == s || qt.slug() == s)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for QuestionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for QuestionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        QuestionType::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown question type: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_labels_and_slugs() {
        for qt in QuestionType::ALL {
            assert_eq!(QuestionType::parse(qt.label()), Some(qt));
            assert_eq!(QuestionType::parse(qt.slug()), Some(qt));
        }
        assert_eq!(QuestionType::parse("Yes/No"), Some(QuestionType::YesNo));
        assert_eq!(
            QuestionType::parse("Yes-No-cond"),
            Some(QuestionType::YesNoConditional)
        );
    }

    #[test]
    fn parse_rejects_unknown_spellings() {
        assert_eq!(QuestionType::parse("yes/no"), None);
        assert_eq!(QuestionType::parse("Opinion"), None);
        assert_eq!(QuestionType::parse(""), None);
    }

    #[test]
    fn serializes_as_label() {
        let json = serde_json::to_string(&QuestionType::LegalObligation).unwrap();
        assert_eq!(json, "\"Legal Obligation\"");

        let parsed: QuestionType = serde_json::from_str("\"Legal-Obligation\"").unwrap();
        assert_eq!(parsed, QuestionType::LegalObligation);
    }
}
