//! Error types for ordered pipeline runs.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error type for a pipeline run.
///
/// Every variant is fatal to the run that produced it. Records already
/// handed to the sink stay there.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The chunk source failed to produce the chunk at `chunk_id`.
    #[error("failed to read chunk {chunk_id}: {source:#}")]
    SourceRead {
        /// ID the failed chunk would have carried
        chunk_id: u64,
        /// Underlying reader error
        source: anyhow::Error,
    },

    /// The transform rejected a chunk.
    #[error("transform failed on chunk {chunk_id}: {source:#}")]
    Transform {
        /// ID of the chunk being transformed
        chunk_id: u64,
        /// Underlying transform error
        source: anyhow::Error,
    },

    /// The sink failed to accept records.
    #[error("failed to write chunk {chunk_id}: {source:#}")]
    SinkWrite {
        /// ID of the chunk being written (the last emitted ID for flush failures)
        chunk_id: u64,
        /// Underlying writer error
        source: anyhow::Error,
    },

    /// The source produced a chunk ID out of sequence.
    #[error("chunk source out of sequence: expected id {expected}, found {found}")]
    OutOfSequence {
        /// The next contiguous ID
        expected: u64,
        /// The ID the source actually produced
        found: u64,
    },

    /// A transform returned a chunk with a different ID than it was given.
    #[error("transform changed chunk id {expected} to {found}")]
    IdMismatch {
        /// ID of the chunk handed to the transform
        expected: u64,
        /// ID of the chunk the transform returned
        found: u64,
    },

    /// The transform panicked while processing a chunk.
    #[error("worker panicked while transforming chunk {chunk_id}")]
    WorkerPanicked {
        /// ID of the chunk being transformed
        chunk_id: u64,
    },

    /// The run was cancelled by the caller.
    #[error("pipeline cancelled")]
    Cancelled,

    /// The pipeline was configured with invalid parameters.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Chunk ID the error is attributed to, if any.
    pub fn chunk_id(&self) -> Option<u64> {
        match self {
            PipelineError::SourceRead { chunk_id, .. }
            | PipelineError::Transform { chunk_id, .. }
            | PipelineError::SinkWrite { chunk_id, .. }
            | PipelineError::WorkerPanicked { chunk_id } => Some(*chunk_id),
            PipelineError::OutOfSequence { expected, .. } => Some(*expected),
            PipelineError::IdMismatch { expected, .. } => Some(*expected),
            PipelineError::Cancelled | PipelineError::InvalidConfig(_) => None,
        }
    }

    /// Returns `true` if the run ended because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_read_message() {
        let error = PipelineError::SourceRead {
            chunk_id: 3,
            source: anyhow::anyhow!("ParseFailure"),
        };
        let msg = format!("{error}");
        assert!(msg.contains("chunk 3"));
        assert!(msg.contains("ParseFailure"));
        assert_eq!(error.chunk_id(), Some(3));
    }

    #[test]
    fn test_out_of_sequence_message() {
        let error = PipelineError::OutOfSequence { expected: 2, found: 4 };
        let msg = format!("{error}");
        assert!(msg.contains("expected id 2"));
        assert!(msg.contains("found 4"));
        assert_eq!(error.chunk_id(), Some(2));
    }

    #[test]
    fn test_cancelled_has_no_chunk() {
        let error = PipelineError::Cancelled;
        assert!(error.is_cancelled());
        assert_eq!(error.chunk_id(), None);
    }

    #[test]
    fn test_transform_keeps_context_chain() {
        let source = anyhow::anyhow!("bad record").context("while replacing");
        let error = PipelineError::Transform { chunk_id: 0, source };
        let msg = format!("{error}");
        assert!(msg.contains("while replacing"));
        assert!(msg.contains("bad record"));
    }
}
