//! The order-preserving pipeline: source → dispatcher → workers →
//! reassembler → sink.

use super::dispatcher::{spawn_source_reader, DispatchSummary, Dispatcher};
use super::reassembler::{blocking_io, Reassembler};
use super::worker::WorkerContext;
use super::{CancelToken, Metrics, MetricsReporter};
use crate::error::{PipelineError, Result};
use crate::io::{ChunkSource, Sink};
use crate::transform::Transform;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Configuration for an ordered pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of concurrency tokens (workers in flight at once)
    pub concurrency: usize,

    /// Capacity of the completion channel (defaults to `concurrency`)
    pub completion_buffer: Option<usize>,

    /// Log progress periodically while running
    pub enable_metrics: bool,

    /// Progress reporting interval in seconds
    pub metrics_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            completion_buffer: None,
            enable_metrics: false,
            metrics_interval_secs: 10,
        }
    }
}

impl PipelineConfig {
    /// Default configuration with `concurrency` tokens.
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }

    /// Effective completion channel capacity.
    pub fn completion_capacity(&self) -> usize {
        self.completion_buffer.unwrap_or(self.concurrency).max(1)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "concurrency must be > 0".to_string(),
            ));
        }
        if self.completion_buffer == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "completion buffer must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Statistics from a completed run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Chunks read from the source and written to the sink
    pub chunks_emitted: u64,

    /// Records read from the source
    pub records_in: u64,

    /// Records written to the sink
    pub records_out: u64,

    /// Most chunks held by the reassembler waiting on a predecessor
    pub max_buffered: usize,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Chunks: {}, Records in: {}, Records out: {}, Max buffered: {}",
            self.chunks_emitted, self.records_in, self.records_out, self.max_buffered
        )
    }
}

/// Bounded-concurrency pipeline that writes results in source order.
///
/// At most `concurrency` chunks are between dispatch and the sink at once,
/// counting chunks being transformed, queued for the reassembler, and
/// waiting there on a predecessor. Results are written to the sink in
/// ascending chunk ID regardless of completion order, so a run with one
/// worker and a run with many produce the same output for a deterministic
/// transform.
pub struct OrderedPipeline<T> {
    transform: Arc<T>,
    config: PipelineConfig,
    metrics: Arc<Metrics>,
    cancel: CancelToken,
}

impl<T> OrderedPipeline<T> {
    /// Create a pipeline running `transform`.
    pub fn new(transform: T, config: PipelineConfig) -> Self {
        Self::from_arc(Arc::new(transform), config)
    }

    /// Create a pipeline around a transform that is shared elsewhere.
    pub fn from_arc(transform: Arc<T>, config: PipelineConfig) -> Self {
        Self {
            transform,
            config,
            metrics: Metrics::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Record into `metrics` instead of a private instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Stop runs when `cancel` fires.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Metrics this pipeline records into.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// A handle that cancels this pipeline's runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every chunk of `source` and write the results to `sink` in
    /// source order.
    ///
    /// The first error stops dispatch of new chunks and is returned once the
    /// chunks before it have been written. Records already written stay
    /// written. `sink.flush()` is called only when the run succeeds.
    pub async fn run<I, O, S, K>(&self, source: S, sink: &mut K) -> Result<PipelineStats>
    where
        T: Transform<I, O> + 'static,
        I: Send + 'static,
        O: Send + 'static,
        S: ChunkSource<I> + 'static,
        K: Sink<O>,
    {
        self.config.validate()?;
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        tracing::info!(
            "Starting ordered pipeline ({} workers, completion buffer {})",
            self.config.concurrency,
            self.config.completion_capacity()
        );

        // One chunk of read-ahead between the blocking reader and dispatch
        let (chunk_tx, chunk_rx) = async_channel::bounded(1);
        let (done_tx, done_rx) = mpsc::channel(self.config.completion_capacity());
        let halt = CancelToken::new();

        spawn_source_reader(source, chunk_tx);

        let worker = WorkerContext {
            transform: self.transform.clone(),
            done: done_tx,
            halt: halt.clone(),
            metrics: self.metrics.clone(),
        };
        let dispatcher = Dispatcher::new(self.config.concurrency, worker, self.cancel.clone());
        let dispatch_handle = tokio::spawn(dispatcher.run(chunk_rx));

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let reporter_handle = if self.config.enable_metrics {
            let reporter = MetricsReporter::new(
                self.metrics.clone(),
                self.config.metrics_interval_secs,
            );
            Some(tokio::spawn(reporter.run(shutdown_rx)))
        } else {
            drop(shutdown_rx);
            None
        };

        // Unwritten chunks hold tokens, so no ID reaches the reassembler more
        // than `concurrency` ahead of the next one to write.
        let window = self.config.concurrency + 1;
        let reassembled = Reassembler::with_window(self.metrics.clone(), window)
            .run(done_rx, sink, &self.cancel)
            .await;

        // No-op on success; on failure stops the dispatcher promptly.
        halt.cancel();
        let dispatched = match dispatch_handle.await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!("Dispatcher task failed: {}", e);
                DispatchSummary::default()
            }
        };

        let _ = shutdown_tx.send(()).await;
        if let Some(handle) = reporter_handle {
            let _ = handle.await;
        }

        let reassembled = match reassembled {
            Ok(stats) => stats,
            Err(e) => {
                tracing::debug!("Pipeline stopped: {}", e);
                return Err(e);
            }
        };

        blocking_io(|| sink.flush()).map_err(|source| PipelineError::SinkWrite {
            chunk_id: reassembled.chunks_emitted.saturating_sub(1),
            source,
        })?;

        let stats = PipelineStats {
            chunks_emitted: reassembled.chunks_emitted,
            records_in: dispatched.records,
            records_out: reassembled.records_emitted,
            max_buffered: reassembled.max_buffered,
        };
        tracing::info!("Pipeline complete: {}", stats);
        Ok(stats)
    }
}

/// Run `transform` over `source` with `concurrency` workers, writing results
/// to `sink` in source order.
///
/// `concurrency = 1` processes chunks strictly one after another and can
/// serve as the reference output for larger values.
pub async fn run<T, I, O, S, K>(
    source: S,
    transform: T,
    sink: &mut K,
    concurrency: usize,
) -> Result<PipelineStats>
where
    T: Transform<I, O> + 'static,
    I: Send + 'static,
    O: Send + 'static,
    S: ChunkSource<I> + 'static,
    K: Sink<O>,
{
    OrderedPipeline::new(transform, PipelineConfig::with_concurrency(concurrency))
        .run(source, sink)
        .await
}
