//! Reassembly: restore ascending chunk order before writing to the sink.

use super::worker::Completion;
use super::{CancelToken, Metrics, ReorderBuffer};
use crate::error::{PipelineError, Result};
use crate::io::Sink;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;

/// Counts kept by the reassembler over one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Chunks written to the sink
    pub chunks_emitted: u64,

    /// Records written to the sink
    pub records_emitted: u64,

    /// Most chunks waiting on a missing predecessor at once
    pub max_buffered: usize,
}

/// Single consumer of completed chunks.
///
/// Chunk `k` is written only after chunks `0..k`. A failed chunk fails the
/// run when its turn comes, so everything before it has been written.
///
/// Buffered completions keep their concurrency tokens until they are written.
pub struct Reassembler<O> {
    buffer: ReorderBuffer<Completion<O>>,
    metrics: Arc<Metrics>,
    stats: ReassemblyStats,
}

impl<O> Reassembler<O> {
    /// Create a reassembler expecting chunk 0 first.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self::with_buffer(metrics, ReorderBuffer::new())
    }

    /// Create a reassembler that rejects IDs `window` or more ahead of the
    /// next expected chunk.
    pub fn with_window(metrics: Arc<Metrics>, window: usize) -> Self {
        Self::with_buffer(metrics, ReorderBuffer::with_window(window))
    }

    fn with_buffer(metrics: Arc<Metrics>, buffer: ReorderBuffer<Completion<O>>) -> Self {
        Self {
            buffer,
            metrics,
            stats: ReassemblyStats::default(),
        }
    }

    /// ID of the next chunk to be written.
    pub fn expected_id(&self) -> u64 {
        self.buffer.next_seq()
    }

    /// Chunks currently waiting for a predecessor.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Counts so far.
    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Accept one completed chunk and write every chunk that is now in order.
    ///
    /// Duplicate IDs, IDs already written, and IDs outside the window are
    /// rejected as `OutOfSequence`.
    pub fn accept<S: Sink<O>>(&mut self, completion: Completion<O>, sink: &mut S) -> Result<()> {
        let id = completion.id;

        if !self.buffer.insert(id, completion) {
            return Err(PipelineError::OutOfSequence {
                expected: self.buffer.next_seq(),
                found: id,
            });
        }

        while let Some(completion) = self.buffer.try_pop_next() {
            self.emit(completion, sink)?;
        }

        self.stats.max_buffered = self.stats.max_buffered.max(self.buffer.len());
        self.metrics.observe_buffered(self.buffer.len());
        Ok(())
    }

    /// Flush whatever is still buffered after the completion channel closed.
    ///
    /// Chunks left here sit behind a gap that will never be filled. They are
    /// written in ascending ID order.
    pub fn finish<S: Sink<O>>(&mut self, sink: &mut S) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        tracing::warn!(
            "Completion channel closed with {} chunks still buffered (expected chunk {})",
            self.buffer.len(),
            self.buffer.next_seq()
        );

        for (_, completion) in self.buffer.drain_all() {
            self.emit(completion, sink)?;
        }
        Ok(())
    }

    /// Receive completions until the channel closes, writing them in order.
    ///
    /// Returns `Cancelled` as soon as `cancel` fires.
    pub async fn run<S: Sink<O>>(
        mut self,
        mut completions: mpsc::Receiver<Completion<O>>,
        sink: &mut S,
        cancel: &CancelToken,
    ) -> Result<ReassemblyStats> {
        loop {
            let completion = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                completion = completions.recv() => completion,
            };

            match completion {
                Some(completion) => self.accept(completion, sink)?,
                None => break,
            }
        }

        self.finish(sink)?;
        Ok(self.stats)
    }

    /// Write one completion. Its token is released on return.
    fn emit<S: Sink<O>>(&mut self, mut completion: Completion<O>, sink: &mut S) -> Result<()> {
        let id = completion.id;
        let records = std::mem::replace(&mut completion.result, Ok(Vec::new()))?;

        let count = records.len() as u64;
        let start = Instant::now();
        blocking_io(|| sink.write(records))
            .map_err(|source| PipelineError::SinkWrite { chunk_id: id, source })?;
        self.metrics.add_sink_write_time(start.elapsed());
        self.metrics.add_chunk_emitted(count);

        self.stats.chunks_emitted += 1;
        self.stats.records_emitted += count;
        tracing::trace!("Emitted chunk {} ({} records)", id, count);
        Ok(())
    }
}

/// Run synchronous sink I/O without stalling other tasks on a multi-threaded
/// runtime. Elsewhere (no runtime, or a current-thread runtime) `f` runs in
/// place.
pub(crate) fn blocking_io<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::VecSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn reassembler() -> Reassembler<&'static str> {
        Reassembler::new(Metrics::new())
    }

    #[test]
    fn test_out_of_order_arrival() {
        let mut reassembler = reassembler();
        let mut sink = VecSink::new();

        reassembler.accept(Completion::ok(0, vec!["A", "B"]), &mut sink).unwrap();
        assert_eq!(sink.records(), &["A", "B"]);

        reassembler.accept(Completion::ok(2, vec!["E", "F"]), &mut sink).unwrap();
        assert_eq!(sink.records().len(), 2);
        assert_eq!(reassembler.pending(), 1);

        reassembler.accept(Completion::ok(1, vec!["C", "D"]), &mut sink).unwrap();
        assert_eq!(sink.records(), &["A", "B", "C", "D", "E", "F"]);
        assert_eq!(reassembler.pending(), 0);
        assert_eq!(reassembler.expected_id(), 3);
        assert_eq!(reassembler.stats().max_buffered, 1);
    }

    #[test]
    fn test_reverse_arrival() {
        let mut reassembler: Reassembler<u64> = Reassembler::new(Metrics::new());
        let mut sink = VecSink::new();

        for id in (0..10u64).rev() {
            reassembler.accept(Completion::ok(id, vec![id]), &mut sink).unwrap();
        }

        assert_eq!(sink.into_records(), (0..10).collect::<Vec<_>>());
        assert_eq!(reassembler.stats().chunks_emitted, 10);
        assert_eq!(reassembler.stats().max_buffered, 9);
    }

    #[test]
    fn test_error_surfaces_after_predecessors() {
        let mut reassembler = reassembler();
        let mut sink = VecSink::new();

        let failure = PipelineError::SourceRead {
            chunk_id: 1,
            source: anyhow::anyhow!("ParseFailure"),
        };
        reassembler.accept(Completion::failed(1, failure), &mut sink).unwrap();
        reassembler.accept(Completion::ok(2, vec!["late"]), &mut sink).unwrap();

        let err = reassembler
            .accept(Completion::ok(0, vec!["first"]), &mut sink)
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceRead { chunk_id: 1, .. }));
        assert_eq!(sink.records(), &["first"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut reassembler = reassembler();
        let mut sink = VecSink::new();

        reassembler.accept(Completion::ok(0, vec!["a"]), &mut sink).unwrap();
        let err = reassembler.accept(Completion::ok(0, vec!["b"]), &mut sink).unwrap_err();
        assert!(matches!(err, PipelineError::OutOfSequence { expected: 1, found: 0 }));
    }

    #[test]
    fn test_finish_drains_behind_gap() {
        let mut reassembler = reassembler();
        let mut sink = VecSink::new();

        reassembler.accept(Completion::ok(3, vec!["d"]), &mut sink).unwrap();
        reassembler.accept(Completion::ok(1, vec!["b"]), &mut sink).unwrap();
        assert!(sink.records().is_empty());

        reassembler.finish(&mut sink).unwrap();
        assert_eq!(sink.records(), &["b", "d"]);
    }

    struct FailingSink;

    impl Sink<&'static str> for FailingSink {
        fn write(&mut self, _records: Vec<&'static str>) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[test]
    fn test_sink_error_is_wrapped() {
        let mut reassembler = reassembler();
        let err = reassembler
            .accept(Completion::ok(0, vec!["x"]), &mut FailingSink)
            .unwrap_err();
        match err {
            PipelineError::SinkWrite { chunk_id, source } => {
                assert_eq!(chunk_id, 0);
                assert_eq!(source.to_string(), "disk full");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_until_close() {
        let (tx, rx) = mpsc::channel(8);
        for id in [2u64, 0, 1] {
            tx.send(Completion::ok(id, vec![id])).await.unwrap();
        }
        drop(tx);

        let mut sink = VecSink::new();
        let stats = Reassembler::new(Metrics::new())
            .run(rx, &mut sink, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(sink.into_records(), vec![0, 1, 2]);
        assert_eq!(stats.chunks_emitted, 3);
    }

    #[test]
    fn test_far_ahead_id_rejected() {
        let mut reassembler = Reassembler::with_window(Metrics::new(), 4);
        let mut sink = VecSink::new();

        let err = reassembler
            .accept(Completion::ok(u64::MAX, vec!["x"]), &mut sink)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::OutOfSequence { expected: 0, found: u64::MAX }
        ));

        reassembler.accept(Completion::ok(3, vec!["d"]), &mut sink).unwrap();
        assert!(reassembler.accept(Completion::ok(4, vec!["e"]), &mut sink).is_err());
        assert_eq!(reassembler.pending(), 1);
    }

    #[test]
    fn test_token_released_when_written() {
        let tokens = Arc::new(Semaphore::new(2));
        let mut reassembler = reassembler();
        let mut sink = VecSink::new();

        let early = Completion::ok(1, vec!["b"]).holding(tokens.clone().try_acquire_owned().unwrap());
        reassembler.accept(early, &mut sink).unwrap();
        // Buffered behind chunk 0, so still counted
        assert_eq!(tokens.available_permits(), 1);

        let first = Completion::ok(0, vec!["a"]).holding(tokens.clone().try_acquire_owned().unwrap());
        reassembler.accept(first, &mut sink).unwrap();
        assert_eq!(tokens.available_permits(), 2);
        assert_eq!(sink.records(), &["a", "b"]);
    }

    struct SlowSink {
        written: Vec<u64>,
    }

    impl Sink<u64> for SlowSink {
        fn write(&mut self, records: Vec<u64>) -> anyhow::Result<()> {
            std::thread::sleep(Duration::from_millis(50));
            self.written.extend(records);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_slow_sink_does_not_stall_runtime() {
        let (tx, rx) = mpsc::channel(8);
        for id in 0..4u64 {
            tx.send(Completion::ok(id, vec![id])).await.unwrap();
        }
        drop(tx);

        let ticks = Arc::new(AtomicUsize::new(0));
        let done = CancelToken::new();
        let ticker = {
            let ticks = ticks.clone();
            let done = done.clone();
            tokio::spawn(async move {
                while !done.is_cancelled() {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    ticks.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        // Runs on the only worker thread alongside the ticker
        let writer = tokio::spawn(async move {
            let mut sink = SlowSink { written: Vec::new() };
            let stats = Reassembler::new(Metrics::new())
                .run(rx, &mut sink, &CancelToken::new())
                .await;
            (stats, sink.written)
        });

        let (stats, written) = writer.await.unwrap();
        done.cancel();
        ticker.await.unwrap();

        assert_eq!(stats.unwrap().chunks_emitted, 4);
        assert_eq!(written, vec![0, 1, 2, 3]);
        // 200ms of sink writes; the ticker kept running throughout
        assert!(ticks.load(Ordering::Relaxed) >= 10);
    }

    #[tokio::test]
    async fn test_run_honors_cancel() {
        let (_tx, rx) = mpsc::channel::<Completion<u8>>(1);
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut sink = VecSink::new();
        let err = Reassembler::new(Metrics::new())
            .run(rx, &mut sink, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
