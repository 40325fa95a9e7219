//! Worker invocation: run the transform for one chunk and report completion.

use super::{CancelToken, Chunk, Metrics};
use crate::error::PipelineError;
use crate::transform::Transform;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, OwnedSemaphorePermit};

/// A finished chunk on its way to the reassembler.
///
/// A completion produced by a worker holds that worker's concurrency token.
/// The token is released when the completion is dropped, which the
/// reassembler does only after writing the chunk, so a chunk counts against
/// the concurrency limit from dispatch until it reaches the sink.
#[derive(Debug)]
pub struct Completion<O> {
    /// ID of the chunk this result belongs to
    pub id: u64,

    /// Transformed records, or the error that ended the chunk
    pub result: Result<Vec<O>, PipelineError>,

    token: Option<OwnedSemaphorePermit>,
}

impl<O> Completion<O> {
    /// A successfully transformed chunk.
    pub fn ok(id: u64, records: Vec<O>) -> Self {
        Self {
            id,
            result: Ok(records),
            token: None,
        }
    }

    /// A failed chunk.
    pub fn failed(id: u64, error: PipelineError) -> Self {
        Self {
            id,
            result: Err(error),
            token: None,
        }
    }

    /// Whether this completion still holds a concurrency token.
    pub fn holds_token(&self) -> bool {
        self.token.is_some()
    }

    #[cfg(test)]
    pub(crate) fn holding(mut self, token: OwnedSemaphorePermit) -> Self {
        self.token = Some(token);
        self
    }
}

/// Everything a worker needs besides its chunk.
pub(crate) struct WorkerContext<T, O> {
    pub transform: Arc<T>,
    pub done: mpsc::Sender<Completion<O>>,
    pub halt: CancelToken,
    pub metrics: Arc<Metrics>,
}

impl<T, O> Clone for WorkerContext<T, O> {
    fn clone(&self) -> Self {
        Self {
            transform: self.transform.clone(),
            done: self.done.clone(),
            halt: self.halt.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Transform `chunk` on the blocking pool, then send the result to the
/// reassembler together with `token`.
///
/// Any failure trips the halt token so the dispatcher stops issuing chunks.
pub(crate) async fn run_worker<T, I, O>(
    ctx: WorkerContext<T, O>,
    chunk: Chunk<I>,
    token: OwnedSemaphorePermit,
) where
    T: Transform<I, O> + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    let id = chunk.id;
    ctx.metrics.worker_started();

    let transform = ctx.transform.clone();
    let start = Instant::now();
    let joined = tokio::task::spawn_blocking(move || transform.apply(chunk)).await;
    ctx.metrics.add_transform_time(start.elapsed());
    ctx.metrics.worker_finished();

    let result = match joined {
        Ok(Ok(out)) if out.id == id => Ok(out.records),
        Ok(Ok(out)) => Err(PipelineError::IdMismatch {
            expected: id,
            found: out.id,
        }),
        Ok(Err(source)) => Err(PipelineError::Transform { chunk_id: id, source }),
        Err(e) => {
            tracing::error!("Worker for chunk {} failed to complete: {}", id, e);
            Err(PipelineError::WorkerPanicked { chunk_id: id })
        }
    };

    if result.is_err() {
        ctx.metrics.add_failure();
        ctx.halt.cancel();
    }

    let completion = Completion {
        id,
        result,
        token: Some(token),
    };
    if ctx.done.send(completion).await.is_err() {
        tracing::debug!("Reassembler dropped, discarding chunk {}", id);
    }
}
