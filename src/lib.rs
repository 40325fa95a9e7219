//! seqflow
//!
//! Bounded-concurrency, order-preserving processing of numbered record chunks.
//! A transform runs on up to N chunks at once and results reach the sink in
//! the order the source produced them.
//!
//! # Architecture
//!
//! The pipeline consists of:
//!
//! - **I/O**: chunk sources (lines, iterators, in-memory) and record sinks
//! - **Transform**: per-chunk processing (regex filter, exact-match filter,
//!   regex replace, or any closure)
//! - **Pipeline**: dispatcher, worker pool, reassembler, cancellation and
//!   metrics
//!
//! # Usage
//!
//! ```no_run
//! use seqflow::io::{LineSink, LineSource};
//! use seqflow::transform::RegexFilter;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = LineSource::new(std::io::BufReader::new(std::io::stdin()), 1000);
//!     let mut sink = LineSink::new(std::io::stdout().lock());
//!     let filter = RegexFilter::new(["^>chr1"], false)?;
//!     let stats = seqflow::run(source, filter, &mut sink, 8).await?;
//!     eprintln!("{}", stats);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod transform;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use io::{ChunkSource, Sink};
pub use pipeline::{run, CancelToken, Chunk, Metrics, OrderedPipeline, PipelineConfig, PipelineStats};
pub use transform::Transform;

use std::future::Future;
use std::time::Duration;

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> anyhow::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}

/// Grace period for blocking tasks when a runtime is shut down.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Drive `future` to completion on `runtime`, then shut the runtime down.
///
/// Blocking tasks still running after [`SHUTDOWN_GRACE`] are abandoned. A
/// source reader parked on stdin after a cancelled run would otherwise keep
/// the process alive.
pub fn run_to_completion<F: Future>(runtime: tokio::runtime::Runtime, future: F) -> F::Output {
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    output
}
