//! Per-chunk transforms run by pipeline workers.
//!
//! A transform receives one whole chunk and returns a chunk with the same ID.
//! It may filter, rewrite, or annotate records, and may change the record
//! type. Any closure `Fn(Chunk<I>) -> anyhow::Result<Chunk<O>>` is a transform.

mod grep;
mod replace;

pub use grep::{ExactMatchFilter, RegexFilter};
pub use replace::RegexReplace;

use crate::pipeline::Chunk;

/// A per-chunk processing function.
///
/// Implementations are shared across workers through an `Arc`, so any
/// auxiliary state they mutate must be synchronized by the implementation
/// itself. The pipeline makes no promise about the order in which workers
/// observe such state.
pub trait Transform<I, O>: Send + Sync {
    /// Transform one chunk. The returned chunk must carry `chunk.id`.
    fn apply(&self, chunk: Chunk<I>) -> anyhow::Result<Chunk<O>>;
}

impl<I, O, F> Transform<I, O> for F
where
    F: Fn(Chunk<I>) -> anyhow::Result<Chunk<O>> + Send + Sync,
{
    fn apply(&self, chunk: Chunk<I>) -> anyhow::Result<Chunk<O>> {
        self(chunk)
    }
}

/// Transform that returns every chunk unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<R> Transform<R, R> for Identity {
    fn apply(&self, chunk: Chunk<R>) -> anyhow::Result<Chunk<R>> {
        Ok(chunk)
    }
}
