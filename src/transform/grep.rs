//! Line filters: keep records matching patterns.

use super::Transform;
use crate::pipeline::Chunk;
use anyhow::{Context, Result};
use dashmap::DashSet;
use regex::RegexSet;

/// Keep records matching any of a set of regular expressions.
#[derive(Debug, Clone)]
pub struct RegexFilter {
    patterns: RegexSet,
    invert: bool,
}

impl RegexFilter {
    /// Compile `patterns` into a filter. With `invert`, keep non-matching records.
    pub fn new<I, S>(patterns: I, invert: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = RegexSet::new(patterns).context("Invalid grep pattern")?;
        Ok(Self { patterns, invert })
    }

    /// Returns `true` if `record` should be kept.
    pub fn keeps(&self, record: &str) -> bool {
        self.patterns.is_match(record) != self.invert
    }
}

impl Transform<String, String> for RegexFilter {
    fn apply(&self, mut chunk: Chunk<String>) -> Result<Chunk<String>> {
        chunk.records.retain(|record| self.keeps(record));
        Ok(chunk)
    }
}

/// Keep records that equal one of a set of patterns exactly.
///
/// With `delete_matched`, a pattern is removed from the set the first time it
/// matches, so each pattern selects at most one record. Which record is
/// "first" depends on worker scheduling when more than one worker runs, so
/// the option is only honored at concurrency 1.
#[derive(Debug)]
pub struct ExactMatchFilter {
    patterns: DashSet<String>,
    delete_matched: bool,
    invert: bool,
}

impl ExactMatchFilter {
    /// Build a filter for `patterns`.
    ///
    /// `concurrency` is the worker count the filter will run under.
    pub fn new<I>(patterns: I, invert: bool, delete_matched: bool, concurrency: usize) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let delete_matched = if delete_matched && concurrency > 1 {
            tracing::warn!(
                "Ignoring delete-matched with {} workers; match order is not deterministic",
                concurrency
            );
            false
        } else {
            delete_matched
        };

        Self {
            patterns: patterns.into_iter().collect(),
            delete_matched,
            invert,
        }
    }

    /// Whether matched patterns are removed after their first hit.
    pub fn deletes_matched(&self) -> bool {
        self.delete_matched
    }

    /// Number of patterns still active.
    pub fn remaining(&self) -> usize {
        self.patterns.len()
    }

    fn matches(&self, record: &str) -> bool {
        if self.delete_matched {
            self.patterns.remove(record).is_some()
        } else {
            self.patterns.contains(record)
        }
    }
}

impl Transform<String, String> for ExactMatchFilter {
    fn apply(&self, mut chunk: Chunk<String>) -> Result<Chunk<String>> {
        chunk.records.retain(|record| self.matches(record) != self.invert);
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_regex_filter_keeps_order() {
        let filter = RegexFilter::new(["^>chr", "ACGT"], false).unwrap();
        let chunk = Chunk::new(2, lines(&[">chr1", "TTTT", "AACGTT", ">scaffold"]));

        let out = filter.apply(chunk).unwrap();
        assert_eq!(out.id, 2);
        assert_eq!(out.records, lines(&[">chr1", "AACGTT"]));
    }

    #[test]
    fn test_regex_filter_invert() {
        let filter = RegexFilter::new(["N+"], true).unwrap();
        let out = filter.apply(Chunk::new(0, lines(&["ACGT", "NNNN", "GATTACA"]))).unwrap();
        assert_eq!(out.records, lines(&["ACGT", "GATTACA"]));
    }

    #[test]
    fn test_regex_filter_rejects_bad_pattern() {
        let err = RegexFilter::new(["(unclosed"], false).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid grep pattern"));
    }

    #[test]
    fn test_exact_match_without_delete() {
        let filter = ExactMatchFilter::new(lines(&["seq1", "seq3"]), false, false, 4);
        let out = filter
            .apply(Chunk::new(0, lines(&["seq1", "seq2", "seq3", "seq1"])))
            .unwrap();
        assert_eq!(out.records, lines(&["seq1", "seq3", "seq1"]));
        assert_eq!(filter.remaining(), 2);
    }

    #[test]
    fn test_exact_match_delete_at_single_worker() {
        let filter = ExactMatchFilter::new(lines(&["seq1", "seq3"]), false, true, 1);
        assert!(filter.deletes_matched());

        let first = filter.apply(Chunk::new(0, lines(&["seq1", "seq2"]))).unwrap();
        let second = filter.apply(Chunk::new(1, lines(&["seq1", "seq3"]))).unwrap();

        assert_eq!(first.records, lines(&["seq1"]));
        assert_eq!(second.records, lines(&["seq3"]));
        assert_eq!(filter.remaining(), 0);
    }

    #[test]
    fn test_exact_match_delete_disabled_when_parallel() {
        let filter = ExactMatchFilter::new(lines(&["seq1"]), false, true, 8);
        assert!(!filter.deletes_matched());

        let out = filter.apply(Chunk::new(0, lines(&["seq1", "seq1"]))).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(filter.remaining(), 1);
    }

    #[test]
    fn test_exact_match_invert() {
        let filter = ExactMatchFilter::new(lines(&["skip"]), true, false, 2);
        let out = filter.apply(Chunk::new(0, lines(&["keep", "skip", "also"]))).unwrap();
        assert_eq!(out.records, lines(&["keep", "also"]));
    }
}
