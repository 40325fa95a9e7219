//! Throughput monitoring and metrics collection.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Metrics for a pipeline run.
///
/// Shared between the dispatcher, the workers and the reassembler through an
/// `Arc`. All counters are relaxed atomics.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Chunks handed to a worker
    pub chunks_dispatched: AtomicU64,

    /// Chunks written to the sink
    pub chunks_emitted: AtomicU64,

    /// Records read from the source
    pub records_in: AtomicU64,

    /// Records written to the sink
    pub records_out: AtomicU64,

    /// Failed chunks
    pub failures: AtomicU64,

    /// Workers currently running
    pub in_flight: AtomicU64,

    /// Most workers running at once
    pub peak_in_flight: AtomicU64,

    /// Most chunks held by the reorder buffer at once
    pub peak_buffered: AtomicU64,

    /// Start time
    start_time: Option<Instant>,

    /// Time spent inside transforms (microseconds, summed across workers)
    pub transform_us: AtomicU64,

    /// Time spent writing to the sink (microseconds)
    pub sink_write_us: AtomicU64,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    /// Record a dispatched chunk of `records` records.
    pub fn add_chunk_dispatched(&self, records: u64) {
        self.chunks_dispatched.fetch_add(1, Ordering::Relaxed);
        self.records_in.fetch_add(records, Ordering::Relaxed);
    }

    /// Record an emitted chunk of `records` records.
    pub fn add_chunk_emitted(&self, records: u64) {
        self.chunks_emitted.fetch_add(1, Ordering::Relaxed);
        self.records_out.fetch_add(records, Ordering::Relaxed);
    }

    /// Record a failure.
    pub fn add_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a worker starting.
    pub fn worker_started(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::Relaxed);
    }

    /// Record a worker finishing.
    pub fn worker_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record the current reorder buffer depth.
    pub fn observe_buffered(&self, depth: usize) {
        self.peak_buffered.fetch_max(depth as u64, Ordering::Relaxed);
    }

    /// Record time spent in a transform (in microseconds).
    pub fn add_transform_time(&self, duration: Duration) {
        self.transform_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record time spent writing to the sink (in microseconds).
    pub fn add_sink_write_time(&self, duration: Duration) {
        self.sink_write_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get emitted chunks per second.
    pub fn chunks_per_second(&self) -> f64 {
        let chunks = self.chunks_emitted.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            chunks as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get records read per second.
    pub fn records_per_second(&self) -> f64 {
        let records = self.records_in.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            records as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            chunks_dispatched: self.chunks_dispatched.load(Ordering::Relaxed),
            chunks_emitted: self.chunks_emitted.load(Ordering::Relaxed),
            records_in: self.records_in.load(Ordering::Relaxed),
            records_out: self.records_out.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
            peak_buffered: self.peak_buffered.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            chunks_per_second: self.chunks_per_second(),
            records_per_second: self.records_per_second(),
            transform_secs: self.transform_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            sink_write_secs: self.sink_write_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub chunks_dispatched: u64,
    pub chunks_emitted: u64,
    pub records_in: u64,
    pub records_out: u64,
    pub failures: u64,
    pub in_flight: u64,
    pub peak_in_flight: u64,
    pub peak_buffered: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub chunks_per_second: f64,
    pub records_per_second: f64,
    /// Total CPU time spent in transforms (seconds, summed across workers)
    pub transform_secs: f64,
    /// Total time spent writing to the sink (seconds)
    pub sink_write_secs: f64,
}

impl MetricsSnapshot {
    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path);
        Ok(())
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Chunks: {} dispatched, {} emitted | Records: {} in, {} out | \
             Rate: {:.1} chunks/s, {:.0} records/s | Workers: {} (peak {}) | \
             Buffered peak: {} | Failures: {} | Elapsed: {:.1}s | \
             Time: transform {:.1}s, sink {:.1}s",
            self.chunks_dispatched,
            self.chunks_emitted,
            self.records_in,
            self.records_out,
            self.chunks_per_second,
            self.records_per_second,
            self.in_flight,
            self.peak_in_flight,
            self.peak_buffered,
            self.failures,
            self.elapsed.as_secs_f64(),
            self.transform_secs,
            self.sink_write_secs,
        )
    }
}

/// Periodic metrics reporter.
pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    /// Create a new metrics reporter.
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Log a progress line every interval until `shutdown` fires or closes.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::info!("{}", self.metrics.snapshot());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Final: {}", self.metrics.snapshot());
                    break;
                }
            }
        }
    }
}
