//! Numbered batches of records, the unit of parallel dispatch.

/// A numbered batch of records.
///
/// Chunk IDs are assigned by the source, contiguous from 0 within one run.
/// The pipeline never inspects the records themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<R> {
    /// Position of this chunk in the source stream
    pub id: u64,

    /// Records in source order
    pub records: Vec<R>,
}

impl<R> Chunk<R> {
    /// Create a chunk.
    pub fn new(id: u64, records: Vec<R>) -> Self {
        Self { id, records }
    }

    /// Number of records in the chunk.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the chunk carries no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replace the records while keeping the chunk ID.
    ///
    /// Transforms that change the record type should go through this so the
    /// ID cannot drift.
    pub fn map_records<O, F>(self, f: F) -> Chunk<O>
    where
        F: FnOnce(Vec<R>) -> Vec<O>,
    {
        Chunk {
            id: self.id,
            records: f(self.records),
        }
    }

    /// Fallible version of [`Chunk::map_records`].
    pub fn try_map_records<O, E, F>(self, f: F) -> Result<Chunk<O>, E>
    where
        F: FnOnce(Vec<R>) -> Result<Vec<O>, E>,
    {
        Ok(Chunk {
            id: self.id,
            records: f(self.records)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_records_keeps_id() {
        let chunk = Chunk::new(7, vec![1, 2, 3]);
        let mapped = chunk.map_records(|r| r.into_iter().map(|v| v * 10).collect::<Vec<_>>());
        assert_eq!(mapped.id, 7);
        assert_eq!(mapped.records, vec![10, 20, 30]);
    }

    #[test]
    fn test_try_map_records_error() {
        let chunk = Chunk::new(1, vec!["a"]);
        let result: Result<Chunk<&str>, &str> = chunk.try_map_records(|_| Err("boom"));
        assert_eq!(result.unwrap_err(), "boom");
    }

    #[test]
    fn test_empty_chunk() {
        let chunk: Chunk<u8> = Chunk::new(0, Vec::new());
        assert!(chunk.is_empty());
        assert_eq!(chunk.len(), 0);
    }
}
