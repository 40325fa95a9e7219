//! Chunk sources: where numbered chunks come from.
//!
//! Sources are pulled from a blocking thread, so implementations may do
//! ordinary synchronous I/O.

use crate::pipeline::Chunk;
use anyhow::{Context, Result};
use std::io::BufRead;

/// A lazy, finite sequence of numbered chunks.
///
/// Chunk IDs must start at 0 and increase by one. An `Err` is terminal: the
/// pipeline attributes it to the next expected ID and stops reading.
pub trait ChunkSource<R>: Send {
    /// Produce the next chunk, an error, or `None` at end of input.
    fn next_chunk(&mut self) -> Option<Result<Chunk<R>>>;
}

impl<R, S> ChunkSource<R> for Box<S>
where
    S: ChunkSource<R> + ?Sized,
{
    fn next_chunk(&mut self) -> Option<Result<Chunk<R>>> {
        (**self).next_chunk()
    }
}

/// Adapt an iterator of ready-made chunk results into a source.
///
/// The iterator is responsible for chunk IDs.
#[derive(Debug)]
pub struct IterSource<I> {
    inner: I,
}

impl<I> IterSource<I> {
    /// Wrap `inner`.
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<R, I> ChunkSource<R> for IterSource<I>
where
    I: Iterator<Item = Result<Chunk<R>>> + Send,
{
    fn next_chunk(&mut self) -> Option<Result<Chunk<R>>> {
        self.inner.next()
    }
}

/// In-memory source that numbers pre-built batches 0, 1, 2, ...
#[derive(Debug)]
pub struct VecSource<R> {
    batches: std::vec::IntoIter<Vec<R>>,
    next_id: u64,
}

impl<R> VecSource<R> {
    /// Create a source yielding one chunk per batch.
    pub fn new(batches: Vec<Vec<R>>) -> Self {
        Self {
            batches: batches.into_iter(),
            next_id: 0,
        }
    }

    /// Split `records` into chunks of at most `chunk_size` records.
    pub fn chunked(records: Vec<R>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let mut batches = Vec::with_capacity(records.len().div_ceil(chunk_size));
        let mut records = records.into_iter().peekable();
        while records.peek().is_some() {
            batches.push(records.by_ref().take(chunk_size).collect());
        }
        Self::new(batches)
    }
}

impl<R: Send> ChunkSource<R> for VecSource<R> {
    fn next_chunk(&mut self) -> Option<Result<Chunk<R>>> {
        let records = self.batches.next()?;
        let chunk = Chunk::new(self.next_id, records);
        self.next_id += 1;
        Some(Ok(chunk))
    }
}

/// Group a fallible record iterator into numbered chunks.
///
/// The first record error ends the stream: it is returned in place of the
/// chunk being filled, and any records already gathered for that chunk are
/// discarded.
#[derive(Debug)]
pub struct RecordChunker<I> {
    records: I,
    chunk_size: usize,
    next_id: u64,
    done: bool,
}

impl<I> RecordChunker<I> {
    /// Create a chunker producing chunks of at most `chunk_size` records.
    pub fn new(records: I, chunk_size: usize) -> Self {
        Self {
            records,
            chunk_size: chunk_size.max(1),
            next_id: 0,
            done: false,
        }
    }
}

impl<R, I> ChunkSource<R> for RecordChunker<I>
where
    R: Send,
    I: Iterator<Item = Result<R>> + Send,
{
    fn next_chunk(&mut self) -> Option<Result<Chunk<R>>> {
        if self.done {
            return None;
        }

        let mut batch = Vec::with_capacity(self.chunk_size);
        while batch.len() < self.chunk_size {
            match self.records.next() {
                Some(Ok(record)) => batch.push(record),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if batch.is_empty() {
            return None;
        }

        let chunk = Chunk::new(self.next_id, batch);
        self.next_id += 1;
        Some(Ok(chunk))
    }
}

/// Read text lines into chunks of `chunk_size` lines.
///
/// Line terminators (`\n` or `\r\n`) are stripped.
#[derive(Debug)]
pub struct LineSource<B> {
    reader: B,
    chunk_size: usize,
    next_id: u64,
    line_no: u64,
    done: bool,
}

impl<B: BufRead> LineSource<B> {
    /// Create a line source over `reader`.
    pub fn new(reader: B, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            next_id: 0,
            line_no: 0,
            done: false,
        }
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .with_context(|| format!("Failed to read line {}", self.line_no + 1))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}

impl<B: BufRead + Send> ChunkSource<String> for LineSource<B> {
    fn next_chunk(&mut self) -> Option<Result<Chunk<String>>> {
        if self.done {
            return None;
        }

        let mut batch = Vec::with_capacity(self.chunk_size);
        while batch.len() < self.chunk_size {
            match self.read_line() {
                Ok(Some(line)) => batch.push(line),
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        if batch.is_empty() {
            return None;
        }

        let chunk = Chunk::new(self.next_id, batch);
        self.next_id += 1;
        Some(Ok(chunk))
    }
}
