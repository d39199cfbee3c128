//! `spill-sort` is a generic external merge sort engine.
//!
//! Elements are accumulated in a memory buffer bounded by their serialized size. Once the bound is reached the
//! buffer is sorted and spilled to a temporary segment file. On iteration the segments are lazily merged with a
//! k-way heap merge holding a single element per segment in memory. If nothing has been spilled the buffer is
//! sorted and read in place. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Element agnostic:**
//!   how elements are measured, stored and ordered is defined by an [`ElementTraits`] implementation.
//!   Traits for plain-old-data values, numbers, self-describing records, owning pointers and `serde` types
//!   (MessagePack encoded) are provided.
//! * **Context support:**
//!   traits may receive a caller-owned context (a shared dictionary for instance) in every call.
//! * **Repeatable iteration:**
//!   a finished sorter can be iterated any number of times, segments are reopened by every iterator.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use spill_sort::{ArithmeticTraits, Sorter, SorterBuilder};
//!
//! let mut sorter: Sorter<u64, ArithmeticTraits<u64>> = SorterBuilder::new()
//!     .with_buffer_size(1024 * 1024)
//!     .with_tmp_prefix(Path::new("./sort"))
//!     .build();
//!
//! for item in (0..1_000_000u64).rev() {
//!     sorter.add(item).unwrap();
//! }
//!
//! for item in sorter.iter().unwrap() {
//!     println!("{}", item.unwrap());
//! }
//! ```

pub mod buffer;
pub mod iter;
pub mod merger;
pub mod segment;
pub mod sort;
pub mod traits;

pub use buffer::SpillBuffer;
pub use iter::{ResultIter, VectorIter};
pub use merger::HeapIter;
pub use sort::{SortError, Sorter, SorterBuilder, SorterError};
pub use traits::{
    ArithmeticTraits, ElementTraits, ObjectTraits, OwningPtr, PodTraits, PointerTraits, Record, RecordError,
    Reversed, RmpTraits,
};
