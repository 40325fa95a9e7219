//! Pipeline orchestration for ordered chunk processing.

mod cancel;
mod chunk;
mod dispatcher;
mod metrics;
mod ordered;
mod reassembler;
mod reorder_buffer;
mod worker;


pub use cancel::CancelToken;
pub use chunk::Chunk;
pub use metrics::{Metrics, MetricsReporter, MetricsSnapshot};
pub use ordered::{run, OrderedPipeline, PipelineConfig, PipelineStats};
pub use reassembler::{Reassembler, ReassemblyStats};
pub use reorder_buffer::ReorderBuffer;
pub use worker::Completion;
