//! Sorted data iterators.

use std::iter::FusedIterator;
use std::path::PathBuf;

use crate::merger::HeapIter;
use crate::sort::SorterError;
use crate::traits::ElementTraits;

/// Forward iterator over an in-memory sorted buffer.
pub struct VectorIter<'a, T> {
    data: &'a [T],
    position: Option<usize>,
}

impl<'a, T> VectorIter<'a, T> {
    pub fn new(data: &'a [T]) -> Self {
        VectorIter { data, position: None }
    }

    /// Moves to the next item. Returns `false` once the buffer is exhausted.
    pub fn advance(&mut self) -> bool {
        let next = match self.position {
            Some(position) if position >= self.data.len() => position,
            Some(position) => position + 1,
            None => 0,
        };
        self.position = Some(next);

        return next < self.data.len();
    }

    /// Returns the current item.
    ///
    /// # Panics
    /// Panics if called before the first successful [`VectorIter::advance`] or after exhaustion.
    pub fn current(&self) -> &'a T {
        match self.position {
            Some(position) if position < self.data.len() => &self.data[position],
            Some(_) => panic!("current() called on an exhausted iterator"),
            None => panic!("current() called before advance()"),
        }
    }
}

enum Source<'a, T, Tr: ElementTraits<T>> {
    Memory(VectorIter<'a, T>),
    Merge(HeapIter<'a, T, Tr>),
    Exhausted,
}

/// Sorter result iterator.
///
/// Reads either the in-memory buffer or the spilled segments, whichever the sorter ended up with.
/// Once the underlying source is exhausted or fails the iterator stays exhausted.
///
/// Items are accessed through [`ResultIter::advance`] and [`ResultIter::current`]. For cloneable items
/// the iterator also implements [`Iterator`] yielding `Result<T, SortError>`; an error is yielded
/// once and ends the iteration.
pub struct ResultIter<'a, T, Tr: ElementTraits<T>> {
    source: Source<'a, T, Tr>,
}

impl<'a, T, Tr: ElementTraits<T>> ResultIter<'a, T, Tr> {
    /// Creates an iterator over already sorted in-memory data.
    pub fn from_memory(data: &'a [T]) -> Self {
        ResultIter {
            source: Source::Memory(VectorIter::new(data)),
        }
    }

    /// Creates an iterator merging spilled segments.
    pub fn from_segments(
        paths: &[PathBuf],
        context: &'a Tr::Context,
        buf_size: Option<usize>,
    ) -> Result<Self, SorterError<T, Tr>> {
        Ok(ResultIter {
            source: Source::Merge(HeapIter::new(paths, context, buf_size)?),
        })
    }

    /// Moves to the next item. Returns `false` once the data is exhausted.
    /// After an error the iterator is exhausted.
    pub fn advance(&mut self) -> Result<bool, SorterError<T, Tr>> {
        let advanced = match &mut self.source {
            Source::Memory(iter) => Ok(iter.advance()),
            Source::Merge(iter) => iter.advance(),
            Source::Exhausted => return Ok(false),
        };

        if !matches!(advanced, Ok(true)) {
            self.source = Source::Exhausted;
        }

        return advanced;
    }

    /// Returns the current item.
    ///
    /// # Panics
    /// Panics if called before the first successful [`ResultIter::advance`] or after exhaustion.
    pub fn current(&self) -> &T {
        match &self.source {
            Source::Memory(iter) => iter.current(),
            Source::Merge(iter) => iter.current(),
            Source::Exhausted => panic!("current() called on an exhausted iterator"),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.source, Source::Exhausted)
    }
}

impl<'a, T, Tr> Iterator for ResultIter<'a, T, Tr>
where
    T: Clone,
    Tr: ElementTraits<T>,
{
    type Item = Result<T, SorterError<T, Tr>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(true) => Some(Ok(self.current().clone())),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl<'a, T, Tr> FusedIterator for ResultIter<'a, T, Tr>
where
    T: Clone,
    Tr: ElementTraits<T>,
{
}

#[cfg(test)]
mod test {
    use std::fs;

    use rstest::*;

    use super::{ResultIter, VectorIter};
    use crate::segment::write_segment;
    use crate::traits::ArithmeticTraits;

    type Traits = ArithmeticTraits<u16, false>;

    #[rstest]
    #[case(vec![])]
    #[case(vec![1])]
    #[case(vec![1, 1, 2, 8])]
    fn test_vector_iter(#[case] data: Vec<u16>) {
        let mut iter = VectorIter::new(&data);
        let mut result = Vec::new();
        while iter.advance() {
            result.push(*iter.current());
        }
        assert_eq!(result, data);
        assert_eq!(iter.advance(), false);
    }

    #[test]
    #[should_panic(expected = "before advance")]
    fn test_vector_iter_current_before_advance() {
        let data = vec![1u16];
        VectorIter::new(&data).current();
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_vector_iter_current_after_end() {
        let data = vec![1u16];
        let mut iter = VectorIter::new(&data);
        while iter.advance() {}
        iter.current();
    }

    #[test]
    fn test_result_iter_memory() {
        let data = vec![3u16, 5, 7];
        let iter = ResultIter::<u16, Traits>::from_memory(&data);

        let result: Result<Vec<u16>, _> = iter.collect();
        assert_eq!(result.unwrap(), data);
    }

    #[test]
    fn test_result_iter_segments() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let paths = vec![tmp_dir.path().join("a"), tmp_dir.path().join("b")];
        write_segment::<u16, Traits>(&paths[0], &[1, 3, 5], None, &()).unwrap();
        write_segment::<u16, Traits>(&paths[1], &[2, 4], None, &()).unwrap();

        let mut iter = ResultIter::<u16, Traits>::from_segments(&paths, &(), None).unwrap();
        assert_eq!(iter.is_exhausted(), false);

        let mut result = Vec::new();
        while iter.advance().unwrap() {
            result.push(*iter.current());
        }
        assert_eq!(result, vec![1, 2, 3, 4, 5]);
        assert_eq!(iter.is_exhausted(), true);
        assert_eq!(iter.advance().unwrap(), false);
    }

    #[test]
    fn test_result_iter_error_ends_iteration() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("corrupted");
        fs::write(&path, [1u8, 0, 2]).unwrap();

        let iter = ResultIter::<u16, Traits>::from_segments(&[path], &(), None).unwrap();
        let result: Vec<_> = iter.collect();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].as_ref().ok(), Some(&1));
        assert!(result[1].is_err());
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_result_iter_current_after_end() {
        let data: Vec<u16> = Vec::new();
        let mut iter = ResultIter::<u16, Traits>::from_memory(&data);
        assert_eq!(iter.advance().unwrap(), false);
        iter.current();
    }
}
