//! Regex replacement over line records.

use super::Transform;
use crate::pipeline::Chunk;
use anyhow::{Context, Result};
use regex::Regex;

/// Replace every match of a regex in each record.
///
/// The replacement string may reference capture groups (`$1`, `${name}`).
#[derive(Debug, Clone)]
pub struct RegexReplace {
    regex: Regex,
    replacement: String,
}

impl RegexReplace {
    /// Compile `pattern` and pair it with `replacement`.
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let regex = Regex::new(pattern)
            .with_context(|| format!("Invalid replace pattern '{}'", pattern))?;
        Ok(Self {
            regex,
            replacement: replacement.into(),
        })
    }

    /// Apply the replacement to one record.
    pub fn replace_record(&self, record: &str) -> String {
        self.regex
            .replace_all(record, self.replacement.as_str())
            .into_owned()
    }
}

impl Transform<String, String> for RegexReplace {
    fn apply(&self, chunk: Chunk<String>) -> Result<Chunk<String>> {
        Ok(chunk.map_records(|records| {
            records
                .into_iter()
                .map(|record| self.replace_record(&record))
                .collect()
        }))
    }
}
