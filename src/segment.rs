//! Spill segments.
//!
//! A segment is a headerless concatenation of items in the layout defined by [`ElementTraits::save`].
//! The end of a segment is detected by [`ElementTraits::load`] returning `Ok(None)`.

use std::error::Error;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use crate::traits::ElementTraits;

/// Segment writing error.
#[derive(Debug)]
pub enum SegmentError<S: Error> {
    /// Segment file creation error.
    Create(io::Error),
    /// Common I/O error.
    IO(io::Error),
    /// Data serialization error.
    SerializationError(S),
}

/// Writes items to a new segment file at `path`.
/// The file is truncated if it already exists.
pub fn write_segment<T, Tr>(
    path: &Path,
    items: &[T],
    buf_size: Option<usize>,
    context: &Tr::Context,
) -> Result<(), SegmentError<Tr::SerializationError>>
where
    Tr: ElementTraits<T>,
{
    let file = fs::File::create(path).map_err(SegmentError::Create)?;

    let mut segment_writer = match buf_size {
        Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
        None => io::BufWriter::new(file),
    };

    for item in items {
        Tr::save(&mut segment_writer, item, context).map_err(SegmentError::SerializationError)?;
    }

    segment_writer.flush().map_err(SegmentError::IO)?;

    return Ok(());
}

/// Sequential reader over a single segment file.
pub struct SegmentReader {
    reader: io::BufReader<fs::File>,
}

impl SegmentReader {
    /// Opens a segment for reading from its beginning.
    pub fn open(path: &Path, buf_size: Option<usize>) -> io::Result<Self> {
        let file = fs::File::open(path)?;

        let reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        return Ok(SegmentReader { reader });
    }

    /// Loads the next item. Returns `Ok(None)` once the segment is exhausted.
    pub fn load<T, Tr>(&mut self, context: &Tr::Context) -> Result<Option<T>, Tr::DeserializationError>
    where
        Tr: ElementTraits<T>,
    {
        Tr::load(&mut self.reader, context)
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use rstest::*;

    use super::{write_segment, SegmentError, SegmentReader};
    use crate::traits::{ArithmeticTraits, RecordError, RmpTraits};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    #[case(None)]
    #[case(Some(16))]
    fn test_segment(tmp_dir: tempfile::TempDir, #[case] buf_size: Option<usize>) {
        let path = tmp_dir.path().join("segment.0");
        let saved = Vec::from_iter(0..100);

        write_segment::<i32, ArithmeticTraits<i32, false>>(&path, &saved, buf_size, &()).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 400);

        let mut reader = SegmentReader::open(&path, buf_size).unwrap();
        let mut restored = Vec::new();
        while let Some(item) = reader.load::<i32, ArithmeticTraits<i32, false>>(&()).unwrap() {
            restored.push(item);
        }

        assert_eq!(restored, saved);
    }

    #[rstest]
    fn test_empty_segment(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("segment.0");

        write_segment::<String, RmpTraits<String>>(&path, &[], None, &()).unwrap();

        let mut reader = SegmentReader::open(&path, None).unwrap();
        assert!(reader.load::<String, RmpTraits<String>>(&()).unwrap().is_none());
    }

    #[rstest]
    fn test_truncated_segment(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("segment.0");
        fs::write(&path, [1u8, 0, 0, 0, 2, 0]).unwrap();

        let mut reader = SegmentReader::open(&path, None).unwrap();
        assert_eq!(reader.load::<u32, ArithmeticTraits<u32, false>>(&()).unwrap(), Some(1));
        assert!(matches!(
            reader.load::<u32, ArithmeticTraits<u32, false>>(&()),
            Err(RecordError::Truncated { expected: 4, actual: 2 })
        ));
    }

    #[rstest]
    fn test_segment_create_error(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("missing").join("segment.0");

        let result = write_segment::<i32, ArithmeticTraits<i32, false>>(&path, &[1], None, &());
        assert!(matches!(result, Err(SegmentError::Create(_))));
    }
}
