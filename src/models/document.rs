use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DocumentId;

/// Broad category of a policy document, which steers prompt wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyType {
    Regulatory,
    Incentives,
}

impl PolicyType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "regulatory" | "regulatory policy" => Some(Self::Regulatory),
            "incentives" | "incentive" | "financial incentive" => Some(Self::Incentives),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regulatory => write!(f, "Regulatory"),
            Self::Incentives => write!(f, "Incentives"),
        }
    }
}

/// Descriptive metadata of one policy document, used only to enrich prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub id: DocumentId,
    #[serde(rename = "name", default)]
    pub title: String,
    #[serde(rename = "state_name", default)]
    pub state: String,
    #[serde(rename = "program_category_name", default)]
    pub program_type: String,
    #[serde(rename = "sector_name", default)]
    pub sector: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub incentive_amount_data: Value,
}

impl DocumentMetadata {
    pub fn policy_type(&self) -> Option<PolicyType> {
        PolicyType::parse(&self.program_type)
    }
}

/// Document metadata indexed by id.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    rows: HashMap<DocumentId, DocumentMetadata>,
}

impl MetadataIndex {
    /// Loads a JSON array of metadata records.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not an array of records.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read document metadata: {}", path.display()))?;
        let rows: Vec<DocumentMetadata> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse document metadata: {}", path.display()))?;
        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(rows: Vec<DocumentMetadata>) -> Self {
        Self {
            rows: rows.into_iter().map(|row| (row.id, row)).collect(),
        }
    }

    pub fn get(&self, id: DocumentId) -> Option<&DocumentMetadata> {
        self.rows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_reads_source_column_names() {
        let json = r#"[{
            "id": 12,
            "name": "Net Metering Rules",
            "state_name": "Ohio",
            "program_category_name": "Regulatory",
            "sector_name": "Residential",
            "summary": "Rules for net metering.",
            "incentive_amount_data": null
        }]"#;
        let rows: Vec<DocumentMetadata> = serde_json::from_str(json).unwrap();
        let index = MetadataIndex::from_rows(rows);

        let meta = index.get(DocumentId::new(12)).unwrap();
        assert_eq!(meta.title, "Net Metering Rules");
        assert_eq!(meta.state, "Ohio");
        assert_eq!(meta.policy_type(), Some(PolicyType::Regulatory));
        assert!(index.get(DocumentId::new(13)).is_none());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MetadataIndex::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read document metadata"));
    }
}
