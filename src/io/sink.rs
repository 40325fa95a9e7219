//! Sinks: where ordered records go.

use anyhow::{Context, Result};
use std::io::Write;

/// Receiver of ordered records.
///
/// Only the reassembler calls a sink, one chunk's records at a time, so
/// implementations need no locking. Calls may block: on a multi-threaded
/// runtime they run under `block_in_place`.
pub trait Sink<R> {
    /// Accept the records of one chunk.
    fn write(&mut self, records: Vec<R>) -> Result<()>;

    /// Called once after the last chunk of a successful run.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<R, S> Sink<R> for &mut S
where
    S: Sink<R> + ?Sized,
{
    fn write(&mut self, records: Vec<R>) -> Result<()> {
        (**self).write(records)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Collects records in memory.
#[derive(Debug)]
pub struct VecSink<R> {
    records: Vec<R>,
    writes: usize,
    flushed: bool,
}

impl<R> VecSink<R> {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            writes: 0,
            flushed: false,
        }
    }

    /// Records received so far.
    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Consume the sink, returning its records.
    pub fn into_records(self) -> Vec<R> {
        self.records
    }

    /// Number of `write` calls received.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Whether `flush` was called.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }
}

impl<R> Default for VecSink<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Sink<R> for VecSink<R> {
    fn write(&mut self, records: Vec<R>) -> Result<()> {
        self.writes += 1;
        self.records.extend(records);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushed = true;
        Ok(())
    }
}

/// Writes each record on its own line.
#[derive(Debug)]
pub struct LineSink<W: Write> {
    writer: W,
}

impl<W: Write> LineSink<W> {
    /// Wrap `writer`. Buffer it if it is a file or a pipe.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<R, W> Sink<R> for LineSink<W>
where
    R: AsRef<str>,
    W: Write,
{
    fn write(&mut self, records: Vec<R>) -> Result<()> {
        for record in &records {
            self.writer
                .write_all(record.as_ref().as_bytes())
                .and_then(|_| self.writer.write_all(b"\n"))
                .context("Failed to write record")?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush output")
    }
}
