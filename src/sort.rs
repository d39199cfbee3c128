//! External sorter.

use log;
use std::env;
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::buffer::SpillBuffer;
use crate::iter::ResultIter;
use crate::segment::{write_segment, SegmentError};
use crate::traits::{ElementTraits, ObjectTraits};

/// Default in-memory buffer limit in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Default temporary file name prefix inside the OS temporary directory.
pub const DEFAULT_TMP_PREFIX: &str = "spill-sort";

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(0);

/// Sorting error.
#[derive(Debug)]
pub enum SortError<S: Error, D: Error> {
    /// Temporary file creation error.
    TempFile(io::Error),
    /// Common I/O error.
    IO(io::Error),
    /// Data serialization error.
    SerializationError(S),
    /// Data deserialization error.
    DeserializationError(D),
}

/// Sorting error produced by a sorter using `Tr` traits.
pub type SorterError<T, Tr> =
    SortError<<Tr as ElementTraits<T>>::SerializationError, <Tr as ElementTraits<T>>::DeserializationError>;

impl<S, D> Error for SortError<S, D>
where
    S: Error + 'static,
    D: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            SortError::TempFile(err) => err,
            SortError::IO(err) => err,
            SortError::SerializationError(err) => err,
            SortError::DeserializationError(err) => err,
        })
    }
}

impl<S: Error, D: Error> Display for SortError<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempFile(err) => write!(f, "temporary file not created: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::SerializationError(err) => write!(f, "data serialization error: {}", err),
            SortError::DeserializationError(err) => write!(f, "data deserialization error: {}", err),
        }
    }
}

impl<S: Error, D: Error> From<SegmentError<S>> for SortError<S, D> {
    fn from(err: SegmentError<S>) -> Self {
        match err {
            SegmentError::Create(err) => SortError::TempFile(err),
            SegmentError::IO(err) => SortError::IO(err),
            SegmentError::SerializationError(err) => SortError::SerializationError(err),
        }
    }
}

/// Sorter builder. Provides methods for [`Sorter`] initialization.
pub struct SorterBuilder<T, Tr = ObjectTraits<T>>
where
    Tr: ElementTraits<T>,
{
    /// In-memory buffer limit in bytes.
    buffer_size: Option<usize>,
    /// Temporary file path prefix.
    tmp_prefix: Option<Box<Path>>,
    /// Segment file read/write buffer size.
    rw_buf_size: Option<usize>,

    /// Item type.
    item_type: PhantomData<T>,
    /// Element traits type.
    traits_type: PhantomData<Tr>,
}

impl<T, Tr> SorterBuilder<T, Tr>
where
    Tr: ElementTraits<T>,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        SorterBuilder::default()
    }

    /// Sets the in-memory buffer limit in bytes. A segment is spilled once the buffered items reach it.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> SorterBuilder<T, Tr> {
        self.buffer_size = Some(buffer_size);
        return self;
    }

    /// Sets the temporary file path prefix (directory and base name) used for spilled segments.
    pub fn with_tmp_prefix(mut self, prefix: &Path) -> SorterBuilder<T, Tr> {
        self.tmp_prefix = Some(prefix.into());
        return self;
    }

    /// Sets segment read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> SorterBuilder<T, Tr> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Builds a [`Sorter`] passing `context` to every traits call.
    pub fn build_with_context(self, context: &Tr::Context) -> Sorter<'_, T, Tr> {
        Sorter::new(self.buffer_size, self.tmp_prefix.as_deref(), self.rw_buf_size, context)
    }
}

impl<T, Tr> SorterBuilder<T, Tr>
where
    Tr: ElementTraits<T, Context = ()>,
{
    /// Builds a [`Sorter`] for traits that need no context.
    pub fn build(self) -> Sorter<'static, T, Tr> {
        self.build_with_context(&())
    }
}

impl<T, Tr> Default for SorterBuilder<T, Tr>
where
    Tr: ElementTraits<T>,
{
    fn default() -> Self {
        SorterBuilder {
            buffer_size: None,
            tmp_prefix: None,
            rw_buf_size: None,
            item_type: PhantomData,
            traits_type: PhantomData,
        }
    }
}

/// External sorter.
///
/// Items are accumulated in memory until their accounted size reaches the buffer limit, then sorted and spilled
/// to a temporary segment file. Iteration merges the segments, or reads the buffer directly if nothing was spilled.
/// Segment files are removed on [`Sorter::clear`] or drop.
pub struct Sorter<'c, T, Tr = ObjectTraits<T>>
where
    Tr: ElementTraits<T>,
{
    /// In-memory buffer.
    buffer: SpillBuffer<T>,
    /// Temporary file path prefix.
    tmp_prefix: PathBuf,
    /// Distinguishes segments of sorters sharing a prefix within the process.
    instance_id: u64,
    /// Segment file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Traits context.
    context: &'c Tr::Context,
    /// Spilled segments in creation order.
    segments: Vec<PathBuf>,
    finished: bool,
    /// Set by a failed spill, reset by [`Sorter::clear`].
    poisoned: bool,

    /// Element traits type.
    traits_type: PhantomData<Tr>,
}

impl<'c, T, Tr> Sorter<'c, T, Tr>
where
    Tr: ElementTraits<T>,
{
    /// Creates a new sorter instance.
    ///
    /// # Arguments
    /// * `buffer_size` - In-memory buffer limit in bytes. If the parameter is [`None`] [`DEFAULT_BUFFER_SIZE`]
    ///   is used.
    /// * `tmp_prefix` - Temporary file path prefix. If the parameter is [`None`] files named
    ///   [`DEFAULT_TMP_PREFIX`] in the OS temporary directory are used.
    /// * `rw_buf_size` - Segment files read/write buffer size.
    /// * `context` - Context passed to every traits call.
    pub fn new(
        buffer_size: Option<usize>,
        tmp_prefix: Option<&Path>,
        rw_buf_size: Option<usize>,
        context: &'c Tr::Context,
    ) -> Self {
        let tmp_prefix = match tmp_prefix {
            Some(tmp_prefix) => tmp_prefix.to_path_buf(),
            None => env::temp_dir().join(DEFAULT_TMP_PREFIX),
        };
        let buffer_size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let instance_id = NEXT_INSTANCE_ID.fetch_add(1, AtomicOrdering::Relaxed);

        log::debug!(
            "sorter #{} created (buffer: {} bytes, prefix: {})",
            instance_id,
            buffer_size,
            tmp_prefix.display()
        );

        return Sorter {
            buffer: SpillBuffer::new(buffer_size),
            tmp_prefix,
            instance_id,
            rw_buf_size,
            context,
            segments: Vec::new(),
            finished: false,
            poisoned: false,
            traits_type: PhantomData,
        };
    }

    /// Adds an item. Spills the buffer once it is full.
    ///
    /// After a failed spill every call fails until the sorter is cleared.
    pub fn add(&mut self, item: T) -> Result<(), SorterError<T, Tr>> {
        self.check_poisoned()?;

        let size = Tr::size(&item);
        self.buffer.push(item, size);
        self.finished = false;

        if self.buffer.is_full() {
            self.spill()?;
        }

        return Ok(());
    }

    /// Adds every item of the iterator.
    pub fn extend<I>(&mut self, items: I) -> Result<(), SorterError<T, Tr>>
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.add(item)?;
        }

        return Ok(());
    }

    /// Prepares the added data for iteration. Does nothing if already finished.
    ///
    /// If nothing has been spilled the buffer is sorted in memory, otherwise it is spilled as the last
    /// segment (possibly an empty one) so that iteration reads segments only.
    /// Fails if a previous spill failed and the sorter was not cleared since.
    pub fn finish(&mut self) -> Result<(), SorterError<T, Tr>> {
        self.check_poisoned()?;
        if self.finished {
            return Ok(());
        }

        if self.segments.is_empty() {
            log::debug!("sorting {} items in memory", self.buffer.len());
            self.sort_buffer();
        } else {
            self.spill()?;
            log::debug!("{} segments spilled", self.segments.len());
        }
        self.finished = true;

        return Ok(());
    }

    /// Finishes the sorter and returns an iterator over the sorted data.
    pub fn iter(&mut self) -> Result<ResultIter<'_, T, Tr>, SorterError<T, Tr>> {
        self.finish()?;
        self.sorted_iter()
    }

    /// Returns a new iterator over the sorted data of a finished sorter.
    /// Every iterator opens its own segment readers, so several may be used at once.
    ///
    /// # Panics
    /// Panics if the sorter is not finished.
    pub fn sorted_iter(&self) -> Result<ResultIter<'_, T, Tr>, SorterError<T, Tr>> {
        assert!(self.finished, "sorted_iter() called on an unfinished sorter");

        if self.segments.is_empty() {
            Ok(ResultIter::from_memory(self.buffer.as_slice()))
        } else {
            ResultIter::from_segments(&self.segments, self.context, self.rw_buf_size)
        }
    }

    /// Finishes the sorter and passes every item in order to `handler`.
    pub fn for_each<F>(&mut self, mut handler: F) -> Result<(), SorterError<T, Tr>>
    where
        F: FnMut(&T),
    {
        let mut iter = self.iter()?;
        while iter.advance()? {
            handler(iter.current());
        }

        return Ok(());
    }

    /// Drops all buffered items and removes the spilled segments.
    /// Every segment removal is attempted; the first failure is returned.
    pub fn clear(&mut self) -> Result<(), SorterError<T, Tr>> {
        self.buffer.release();
        self.finished = false;
        self.poisoned = false;

        let mut result = Ok(());
        for path in self.segments.drain(..) {
            if let Err(err) = fs::remove_file(&path) {
                log::warn!("segment {} not removed: {}", path.display(), err);
                if result.is_ok() {
                    result = Err(SortError::IO(err));
                }
            }
        }

        return result;
    }

    /// Returns spilled segment paths in creation order.
    pub fn segments(&self) -> &[PathBuf] {
        &self.segments
    }

    /// Returns the accounted size of the buffered items.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.mem_size()
    }

    /// Returns the number of buffered items.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn check_poisoned(&self) -> Result<(), SorterError<T, Tr>> {
        if self.poisoned {
            return Err(SortError::IO(io::Error::new(
                io::ErrorKind::Other,
                "sorter is poisoned by a failed spill, clear it before further use",
            )));
        }

        return Ok(());
    }

    fn sort_buffer(&mut self) {
        let context = self.context;
        self.buffer.sort_unstable_by(|a, b| Tr::compare(a, b, context));
    }

    fn segment_path(&self, seq: usize) -> PathBuf {
        let mut name = self.tmp_prefix.clone().into_os_string();
        name.push(format!(".{}.{}.{}", process::id(), self.instance_id, seq));
        PathBuf::from(name)
    }

    fn spill(&mut self) -> Result<(), SorterError<T, Tr>> {
        log::debug!("sorting segment data ...");
        self.sort_buffer();

        let path = self.segment_path(self.segments.len());
        log::debug!(
            "saving segment {} ({} items, {} bytes)",
            path.display(),
            self.buffer.len(),
            self.buffer.mem_size()
        );

        let result = write_segment::<T, Tr>(&path, self.buffer.as_slice(), self.rw_buf_size, self.context);
        if result.is_err() {
            // the buffer may be partially written, spilling it again would duplicate items
            self.poisoned = true;
        }
        if !matches!(result, Err(SegmentError::Create(_))) {
            // a partially written file is still removed on clear
            self.segments.push(path);
        }
        result?;

        self.buffer.clear();

        return Ok(());
    }
}

impl<'c, T, Tr> Drop for Sorter<'c, T, Tr>
where
    Tr: ElementTraits<T>,
{
    fn drop(&mut self) {
        if let Err(err) = self.clear() {
            log::warn!("sorter #{} cleanup failed: {}", self.instance_id, err);
        }
    }
}

impl<'c, T, Tr> Debug for Sorter<'c, T, Tr>
where
    Tr: ElementTraits<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sorter")
            .field("instance_id", &self.instance_id)
            .field("tmp_prefix", &self.tmp_prefix)
            .field("buffer_limit", &self.buffer.limit())
            .field("buffered_bytes", &self.buffer.mem_size())
            .field("segments", &self.segments)
            .field("finished", &self.finished)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}
