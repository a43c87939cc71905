use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier of a source policy document.
///
/// Source markdown files are named `<id>_<anything>.md`; the id links a file to
/// its metadata row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(i64);

impl DocumentId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Reads the leading run of digits of a file stem followed by `_`.
    ///
    /// `"1234_ohio_net_metering"` yields `1234`; a stem without a leading
    /// numeric component yields `None`.
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        let (head, _) = stem.split_once('_')?;
        if head.is_empty() || !head.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        head.parse().ok().map(Self)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
