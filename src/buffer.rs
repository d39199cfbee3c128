//! Spill buffer.

use std::cmp::Ordering;

/// Buffer limited by the serialized size of its items.
pub struct SpillBuffer<T> {
    limit: usize,
    current_size: usize,
    inner: Vec<T>,
}

impl<T> SpillBuffer<T> {
    /// Creates a buffer that becomes full once `limit` bytes are accounted.
    pub fn new(limit: usize) -> Self {
        SpillBuffer {
            limit,
            current_size: 0,
            inner: Vec::new(),
        }
    }

    /// Adds a new element to the buffer accounting `size` bytes for it.
    pub fn push(&mut self, item: T, size: usize) {
        self.current_size = self.current_size.saturating_add(size);
        self.inner.push(item);
    }

    /// Returns buffer length.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.current_size >= self.limit
    }

    /// Returns the accounted size of the buffered items.
    pub fn mem_size(&self) -> usize {
        self.current_size
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn as_slice(&self) -> &[T] {
        self.inner.as_slice()
    }

    /// Sorts the buffer. Equal items may be reordered.
    pub fn sort_unstable_by<F>(&mut self, compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.inner.sort_unstable_by(compare);
    }

    /// Removes all items keeping the allocated memory.
    pub fn clear(&mut self) {
        self.inner.clear();
        self.current_size = 0;
    }

    /// Removes all items and frees the allocated memory.
    pub fn release(&mut self) {
        self.inner = Vec::new();
        self.current_size = 0;
    }
}
