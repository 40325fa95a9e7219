//! Reordering buffer for out-of-order chunk completion.
//!
//! Items are inserted with their chunk ID and released strictly in ascending
//! ID order, starting from 0.
//!
//! # Example
//!
//! ```
//! use seqflow::pipeline::ReorderBuffer;
//!
//! let mut buffer: ReorderBuffer<&str> = ReorderBuffer::new();
//!
//! buffer.insert(2, "third");
//! buffer.insert(0, "first");
//! buffer.insert(1, "second");
//!
//! let ready: Vec<_> = buffer.drain_ready().collect();
//! assert_eq!(ready, vec!["first", "second", "third"]);
//! ```

use std::collections::VecDeque;

/// A buffer that releases items in sequential order.
///
/// Uses a sparse `VecDeque` where slot `i` holds the item with ID
/// `next_seq + i`, giving O(1) insert and pop.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    slots: VecDeque<Option<T>>,
    /// Next ID to release. Also the ID held by `slots[0]`.
    next_seq: u64,
    /// Number of items currently stored.
    count: usize,
    /// IDs at or beyond `next_seq + window` are rejected.
    window: usize,
}

/// Default insertion window for [`ReorderBuffer::new`].
pub const DEFAULT_WINDOW: usize = 1 << 16;

impl<T> ReorderBuffer<T> {
    /// Create an empty buffer expecting ID 0.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// Create an empty buffer that accepts IDs less than `next_seq + window`.
    pub fn with_window(window: usize) -> Self {
        Self {
            slots: VecDeque::new(),
            next_seq: 0,
            count: 0,
            window: window.max(1),
        }
    }

    /// Insert an item with its sequence number.
    ///
    /// Returns `false`, dropping `item`, if the ID was already released, is
    /// already buffered, or lies outside the window. The caller decides
    /// whether that is an error.
    pub fn insert(&mut self, seq: u64, item: T) -> bool {
        if seq < self.next_seq {
            return false;
        }

        let index = match usize::try_from(seq - self.next_seq) {
            Ok(index) if index < self.window => index,
            _ => return false,
        };

        while self.slots.len() <= index {
            self.slots.push_back(None);
        }

        if self.slots[index].is_some() {
            return false;
        }

        self.slots[index] = Some(item);
        self.count += 1;
        true
    }

    /// Pop the item with ID `next_seq` if it has arrived.
    pub fn try_pop_next(&mut self) -> Option<T> {
        if !self.can_pop() {
            return None;
        }

        let item = self.slots.pop_front().flatten()?;
        self.next_seq += 1;
        self.count -= 1;
        Some(item)
    }

    /// Drain all consecutive ready items starting from `next_seq`.
    ///
    /// Stops at the first gap.
    pub fn drain_ready(&mut self) -> DrainReady<'_, T> {
        DrainReady { buffer: self }
    }

    /// Remove every remaining item in ascending ID order, skipping gaps.
    ///
    /// Returns `(id, item)` pairs. Afterwards the buffer is empty and expects
    /// the ID following the last one returned.
    pub fn drain_all(&mut self) -> Vec<(u64, T)> {
        let mut out = Vec::with_capacity(self.count);
        let mut seq = self.next_seq;

        for slot in self.slots.drain(..) {
            if let Some(item) = slot {
                out.push((seq, item));
            }
            seq += 1;
        }

        if let Some((last, _)) = out.last() {
            self.next_seq = last + 1;
        }
        self.count = 0;
        out
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Next ID to be released.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Check if the next sequential item has arrived.
    pub fn can_pop(&self) -> bool {
        self.slots.front().is_some_and(Option::is_some)
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator that drains consecutive ready items from a [`ReorderBuffer`].
pub struct DrainReady<'a, T> {
    buffer: &'a mut ReorderBuffer<T>,
}

impl<T> Iterator for DrainReady<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.try_pop_next()
    }
}
