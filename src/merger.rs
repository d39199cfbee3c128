//! Binary heap merger.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::marker::PhantomData;
use std::path::PathBuf;

use log;

use crate::segment::SegmentReader;
use crate::sort::{SortError, SorterError};
use crate::traits::ElementTraits;

/// Current head of a segment.
struct Head<'a, T, Tr: ElementTraits<T>> {
    item: T,
    segment: usize,
    context: &'a Tr::Context,
    traits_type: PhantomData<Tr>,
}

impl<'a, T, Tr: ElementTraits<T>> Ord for Head<'a, T, Tr> {
    // binary heap is max-heap so the order is reversed to make the smallest head the greatest entry
    fn cmp(&self, other: &Self) -> Ordering {
        Tr::compare(&other.item, &self.item, self.context).then_with(|| other.segment.cmp(&self.segment))
    }
}

impl<'a, T, Tr: ElementTraits<T>> PartialOrd for Head<'a, T, Tr> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'a, T, Tr: ElementTraits<T>> PartialEq for Head<'a, T, Tr> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<'a, T, Tr: ElementTraits<T>> Eq for Head<'a, T, Tr> {}

/// K-way merger over spilled segments.
/// Merges multiple sorted segments into a single sorted output holding one item per segment in memory.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of segments.
///
/// Items with equal keys are taken from the segment spilled first.
pub struct HeapIter<'a, T, Tr: ElementTraits<T>> {
    segments: Vec<SegmentReader>,
    heap: BinaryHeap<Head<'a, T, Tr>>,
    context: &'a Tr::Context,
    started: bool,
}

impl<'a, T, Tr: ElementTraits<T>> HeapIter<'a, T, Tr> {
    /// Opens every segment and loads its first item. Empty segments are skipped.
    /// Segment items should be sorted in ascending order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `paths` - Segments to be merged in a single sorted output
    /// * `context` - Traits context
    /// * `buf_size` - Segment read buffer size
    pub fn new(
        paths: &[PathBuf],
        context: &'a Tr::Context,
        buf_size: Option<usize>,
    ) -> Result<Self, SorterError<T, Tr>> {
        let mut segments = Vec::with_capacity(paths.len());
        let mut heap = BinaryHeap::with_capacity(paths.len());

        for (idx, path) in paths.iter().enumerate() {
            let mut segment = SegmentReader::open(path, buf_size).map_err(SortError::IO)?;
            match segment.load::<T, Tr>(context) {
                Ok(Some(item)) => heap.push(Head {
                    item,
                    segment: idx,
                    context,
                    traits_type: PhantomData,
                }),
                Ok(None) => log::trace!("segment {} is empty", path.display()),
                Err(err) => return Err(SortError::DeserializationError(err)),
            }
            segments.push(segment);
        }

        log::debug!("merging {} segments ({} non-empty)", segments.len(), heap.len());

        return Ok(HeapIter {
            segments,
            heap,
            context,
            started: false,
        });
    }

    /// Moves to the next item in ascending order.
    /// Returns `false` once all segments are exhausted.
    ///
    /// The first call positions the merger at the smallest head without consuming anything.
    pub fn advance(&mut self) -> Result<bool, SorterError<T, Tr>> {
        if self.heap.is_empty() {
            return Ok(false);
        }
        if !self.started {
            self.started = true;
            return Ok(true);
        }

        if let Some(mut head) = self.heap.pop() {
            match self.segments[head.segment].load::<T, Tr>(self.context) {
                Ok(Some(item)) => {
                    head.item = item;
                    self.heap.push(head);
                }
                Ok(None) => log::trace!("segment #{} exhausted", head.segment),
                Err(err) => return Err(SortError::DeserializationError(err)),
            }
        }

        return Ok(!self.heap.is_empty());
    }

    /// Returns the current item.
    ///
    /// # Panics
    /// Panics if called before the first successful [`HeapIter::advance`] or after exhaustion.
    pub fn current(&self) -> &T {
        assert!(self.started, "current() called before advance()");
        match self.heap.peek() {
            Some(head) => &head.item,
            None => panic!("current() called on an exhausted merger"),
        }
    }
}
