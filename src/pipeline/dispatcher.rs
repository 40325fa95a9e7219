//! Dispatch: pull chunks from the source and hand each to a worker under a
//! bounded number of concurrency tokens.
//!
//! ```text
//! ┌────────────┐  chunk_rx  ┌────────────┐  token  ┌─────────┐  done_tx
//! │   Source   │───────────▶│ Dispatcher │────────▶│ Workers │──────────▶ Reassembler
//! │ (blocking) │  (cap. 1)  └────────────┘  (N)    └─────────┘
//! └────────────┘
//! ```
//!
//! The completion channel closes once the dispatcher and every worker it
//! started have dropped their senders. The reassembler treats that as the
//! end of the run.

use super::worker::{run_worker, Completion, WorkerContext};
use super::{CancelToken, Chunk};
use crate::error::PipelineError;
use crate::io::ChunkSource;
use crate::transform::Transform;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// What the dispatcher got through before stopping.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DispatchSummary {
    pub chunks: u64,
    pub records: u64,
}

/// Pull chunks from `source` on a blocking thread and forward them, in
/// order, to `tx`.
///
/// Stops after the first error or when the receiving side goes away.
pub(crate) fn spawn_source_reader<I, S>(
    mut source: S,
    tx: async_channel::Sender<anyhow::Result<Chunk<I>>>,
) -> JoinHandle<()>
where
    I: Send + 'static,
    S: ChunkSource<I> + 'static,
{
    tokio::task::spawn_blocking(move || {
        while let Some(item) = source.next_chunk() {
            let failed = item.is_err();
            if tx.send_blocking(item).is_err() {
                tracing::debug!("Dispatcher stopped, source reader exiting");
                return;
            }
            if failed {
                return;
            }
        }
    })
}

/// Bounded-concurrency dispatcher.
pub(crate) struct Dispatcher<T, O> {
    tokens: Arc<Semaphore>,
    worker: WorkerContext<T, O>,
    cancel: CancelToken,
}

impl<T, O> Dispatcher<T, O> {
    /// Create a dispatcher issuing at most `concurrency` workers at once.
    pub(crate) fn new(concurrency: usize, worker: WorkerContext<T, O>, cancel: CancelToken) -> Self {
        Self {
            tokens: Arc::new(Semaphore::new(concurrency)),
            worker,
            cancel,
        }
    }

    async fn stopped(&self) {
        tokio::select! {
            _ = self.worker.halt.cancelled() => {}
            _ = self.cancel.cancelled() => {}
        }
    }

    /// Run until the source is exhausted, an error occurs, or the run is
    /// halted or cancelled.
    ///
    /// Source errors and out-of-sequence IDs are sent to the reassembler as a
    /// failed completion at the ID they occupy.
    pub(crate) async fn run<I>(
        self,
        chunks: async_channel::Receiver<anyhow::Result<Chunk<I>>>,
    ) -> DispatchSummary
    where
        T: Transform<I, O> + 'static,
        I: Send + 'static,
        O: Send + 'static,
    {
        let mut summary = DispatchSummary::default();
        let mut next_id: u64 = 0;

        loop {
            let item = tokio::select! {
                biased;
                _ = self.stopped() => break,
                item = chunks.recv() => item,
            };

            let chunk = match item {
                Err(_) => break, // source exhausted
                Ok(Err(source)) => {
                    let error = PipelineError::SourceRead { chunk_id: next_id, source };
                    self.fail(next_id, error).await;
                    break;
                }
                Ok(Ok(chunk)) if chunk.id != next_id => {
                    let error = PipelineError::OutOfSequence {
                        expected: next_id,
                        found: chunk.id,
                    };
                    self.fail(next_id, error).await;
                    break;
                }
                Ok(Ok(chunk)) => chunk,
            };

            let token = tokio::select! {
                biased;
                _ = self.stopped() => break,
                token = self.tokens.clone().acquire_owned() => match token {
                    Ok(token) => token,
                    Err(_) => break,
                },
            };

            next_id += 1;
            summary.chunks += 1;
            summary.records += chunk.len() as u64;
            self.worker.metrics.add_chunk_dispatched(chunk.len() as u64);
            tracing::trace!("Dispatching chunk {} ({} records)", chunk.id, chunk.len());

            tokio::spawn(run_worker(self.worker.clone(), chunk, token));
        }

        tracing::debug!(
            "Dispatcher finished after {} chunks ({} records)",
            summary.chunks,
            summary.records
        );
        summary
    }

    async fn fail(&self, id: u64, error: PipelineError) {
        tracing::debug!("Dispatch stopped at chunk {}: {}", id, error);
        self.worker.metrics.add_failure();
        self.worker.halt.cancel();
        let _ = self.worker.done.send(Completion::failed(id, error)).await;
    }
}
