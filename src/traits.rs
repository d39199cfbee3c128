//! Element traits.
//!
//! A traits type tells the sorter how to measure, serialize, deserialize and compare elements of some type.
//! All functions are static, so traits types are zero-sized markers selected at compile time.

use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;
use std::mem;
use std::rc::Rc;
use std::sync::Arc;

use bytemuck::Pod;

/// Element traits interface.
///
/// Every function receives the sorter's context, an opaque caller-owned value shared by reference
/// between all calls made for one sorter and its iterators.
pub trait ElementTraits<T> {
    /// Auxiliary state threaded through every call.
    type Context: ?Sized;
    /// Element serialization error.
    type SerializationError: Error;
    /// Element deserialization error.
    type DeserializationError: Error;

    /// Returns the serialized size of an item. Used for buffer accounting, so it should match
    /// the number of bytes [`ElementTraits::save`] writes.
    fn size(item: &T) -> usize;

    /// Appends a single item to the writer.
    fn save<W: Write>(writer: &mut W, item: &T, context: &Self::Context) -> Result<(), Self::SerializationError>;

    /// Reads a single item from the reader.
    /// Returns `Ok(None)` on a clean end of stream. A partially stored item is an error.
    fn load<R: BufRead>(reader: &mut R, context: &Self::Context) -> Result<Option<T>, Self::DeserializationError>;

    /// Compares two items. Must be a total order.
    fn compare(a: &T, b: &T, context: &Self::Context) -> Ordering;
}

/// Record reading error.
#[derive(Debug)]
pub enum RecordError {
    /// Common I/O error.
    IO(io::Error),
    /// The stream ended in the middle of a record.
    Truncated { expected: usize, actual: usize },
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            RecordError::IO(err) => Some(err),
            RecordError::Truncated { .. } => None,
        }
    }
}

impl Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            RecordError::IO(err) => write!(f, "record reading failed: {}", err),
            RecordError::Truncated { expected, actual } => {
                write!(f, "truncated record: expected {} bytes, got {}", expected, actual)
            }
        }
    }
}

impl From<io::Error> for RecordError {
    fn from(err: io::Error) -> Self {
        RecordError::IO(err)
    }
}

/// Fills `buf` from the reader.
/// Returns `Ok(false)` if the stream is already exhausted and `Ok(true)` if the buffer has been filled.
/// A stream ending after the first byte but before the last one is reported as [`RecordError::Truncated`].
pub fn read_exact_or_eof<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<bool, RecordError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(RecordError::IO(err)),
        }
    }

    return match filled {
        0 => Ok(false),
        n if n == buf.len() => Ok(true),
        n => Err(RecordError::Truncated {
            expected: buf.len(),
            actual: n,
        }),
    };
}

/// Writes the raw bytes of a plain-old-data value.
pub fn save_pod<T: Pod, W: Write + ?Sized>(writer: &mut W, item: &T) -> io::Result<()> {
    writer.write_all(bytemuck::bytes_of(item))
}

/// Reads the raw bytes of a plain-old-data value.
pub fn load_pod<T: Pod, R: Read + ?Sized>(reader: &mut R) -> Result<Option<T>, RecordError> {
    let mut item = T::zeroed();
    if read_exact_or_eof(reader, bytemuck::bytes_of_mut(&mut item))? {
        Ok(Some(item))
    } else {
        Ok(None)
    }
}

/// Fixed-width value traits.
/// Items are stored as raw byte copies. The [`Pod`] bound rules out types holding pointers or references.
pub struct PodTraits<T> {
    item_type: PhantomData<T>,
}

impl<T: Pod + Ord> ElementTraits<T> for PodTraits<T> {
    type Context = ();
    type SerializationError = io::Error;
    type DeserializationError = RecordError;

    fn size(_item: &T) -> usize {
        mem::size_of::<T>()
    }

    fn save<W: Write>(writer: &mut W, item: &T, _context: &()) -> Result<(), io::Error> {
        save_pod(writer, item)
    }

    fn load<R: BufRead>(reader: &mut R, _context: &()) -> Result<Option<T>, RecordError> {
        load_pod(reader)
    }

    fn compare(a: &T, b: &T, _context: &()) -> Ordering {
        a.cmp(b)
    }
}

/// Numeric value traits.
/// Stored like [`PodTraits`], ordered numerically; `DESC` selects descending order.
/// Values incomparable even with themselves (`NaN`) rank after every other value, before them in descending order.
pub struct ArithmeticTraits<T, const DESC: bool = false> {
    item_type: PhantomData<T>,
}

impl<T: Pod + PartialOrd, const DESC: bool> ElementTraits<T> for ArithmeticTraits<T, DESC> {
    type Context = ();
    type SerializationError = io::Error;
    type DeserializationError = RecordError;

    fn size(_item: &T) -> usize {
        mem::size_of::<T>()
    }

    fn save<W: Write>(writer: &mut W, item: &T, _context: &()) -> Result<(), io::Error> {
        save_pod(writer, item)
    }

    fn load<R: BufRead>(reader: &mut R, _context: &()) -> Result<Option<T>, RecordError> {
        load_pod(reader)
    }

    fn compare(a: &T, b: &T, _context: &()) -> Ordering {
        let ordering = match a.partial_cmp(b) {
            Some(ordering) => ordering,
            None => {
                let a_unordered = a.partial_cmp(a).is_none();
                let b_unordered = b.partial_cmp(b).is_none();
                a_unordered.cmp(&b_unordered)
            }
        };
        if DESC {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Self-describing element interface.
/// Implemented by types that know how to store and order themselves.
pub trait Record: Sized {
    /// Number of bytes [`Record::save`] writes.
    fn size(&self) -> usize;

    fn save<W: Write>(&self, writer: &mut W) -> io::Result<()>;

    /// Reads a record. Returns `Ok(None)` on a clean end of stream.
    fn load<R: BufRead>(reader: &mut R) -> Result<Option<Self>, RecordError>;

    fn compare(&self, other: &Self) -> Ordering;
}

/// Traits delegating to the element's own [`Record`] implementation.
pub struct ObjectTraits<T> {
    item_type: PhantomData<T>,
}

impl<T: Record> ElementTraits<T> for ObjectTraits<T> {
    type Context = ();
    type SerializationError = io::Error;
    type DeserializationError = RecordError;

    fn size(item: &T) -> usize {
        item.size()
    }

    fn save<W: Write>(writer: &mut W, item: &T, _context: &()) -> Result<(), io::Error> {
        item.save(writer)
    }

    fn load<R: BufRead>(reader: &mut R, _context: &()) -> Result<Option<T>, RecordError> {
        T::load(reader)
    }

    fn compare(a: &T, b: &T, _context: &()) -> Ordering {
        a.compare(b)
    }
}

/// Owning pointer to a [`Record`].
pub trait OwningPtr: Sized {
    type Pointee: Record;

    fn pointee(&self) -> &Self::Pointee;

    /// Wraps a freshly loaded record.
    fn from_record(record: Self::Pointee) -> Self;
}

impl<T: Record> OwningPtr for Box<T> {
    type Pointee = T;

    fn pointee(&self) -> &T {
        self
    }

    fn from_record(record: T) -> Self {
        Box::new(record)
    }
}

impl<T: Record> OwningPtr for Rc<T> {
    type Pointee = T;

    fn pointee(&self) -> &T {
        self
    }

    fn from_record(record: T) -> Self {
        Rc::new(record)
    }
}

impl<T: Record> OwningPtr for Arc<T> {
    type Pointee = T;

    fn pointee(&self) -> &T {
        self
    }

    fn from_record(record: T) -> Self {
        Arc::new(record)
    }
}

/// Traits for records held through an owning pointer.
/// Size, save and compare look through the pointer, load wraps the record via [`OwningPtr::from_record`].
pub struct PointerTraits<P> {
    item_type: PhantomData<P>,
}

impl<P: OwningPtr> ElementTraits<P> for PointerTraits<P> {
    type Context = ();
    type SerializationError = io::Error;
    type DeserializationError = RecordError;

    fn size(item: &P) -> usize {
        item.pointee().size()
    }

    fn save<W: Write>(writer: &mut W, item: &P, _context: &()) -> Result<(), io::Error> {
        item.pointee().save(writer)
    }

    fn load<R: BufRead>(reader: &mut R, _context: &()) -> Result<Option<P>, RecordError> {
        Ok(<P::Pointee as Record>::load(reader)?.map(P::from_record))
    }

    fn compare(a: &P, b: &P, _context: &()) -> Ordering {
        a.pointee().compare(b.pointee())
    }
}

/// RMP (Rust MessagePack) traits.
/// Any serde-serializable ordered type, stored as MessagePack. For more information see https://msgpack.org/.
pub struct RmpTraits<T> {
    item_type: PhantomData<T>,
}

struct ByteCounter(usize);

impl Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T> ElementTraits<T> for RmpTraits<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned + Ord,
{
    type Context = ();
    type SerializationError = rmp_serde::encode::Error;
    type DeserializationError = rmp_serde::decode::Error;

    fn size(item: &T) -> usize {
        let mut counter = ByteCounter(0);
        // an item that fails to encode is reported by save
        match rmp_serde::encode::write(&mut counter, item) {
            Ok(()) => counter.0,
            Err(_) => 0,
        }
    }

    fn save<W: Write>(writer: &mut W, item: &T, _context: &()) -> Result<(), rmp_serde::encode::Error> {
        rmp_serde::encode::write(writer, item)
    }

    fn load<R: BufRead>(reader: &mut R, _context: &()) -> Result<Option<T>, rmp_serde::decode::Error> {
        if reader
            .fill_buf()
            .map_err(rmp_serde::decode::Error::InvalidDataRead)?
            .is_empty()
        {
            return Ok(None);
        }
        rmp_serde::decode::from_read(reader).map(Some)
    }

    fn compare(a: &T, b: &T, _context: &()) -> Ordering {
        a.cmp(b)
    }
}

/// Wraps other traits reversing their order.
pub struct Reversed<Tr> {
    traits_type: PhantomData<Tr>,
}

impl<T, Tr: ElementTraits<T>> ElementTraits<T> for Reversed<Tr> {
    type Context = Tr::Context;
    type SerializationError = Tr::SerializationError;
    type DeserializationError = Tr::DeserializationError;

    fn size(item: &T) -> usize {
        Tr::size(item)
    }

    fn save<W: Write>(writer: &mut W, item: &T, context: &Self::Context) -> Result<(), Self::SerializationError> {
        Tr::save(writer, item, context)
    }

    fn load<R: BufRead>(reader: &mut R, context: &Self::Context) -> Result<Option<T>, Self::DeserializationError> {
        Tr::load(reader, context)
    }

    fn compare(a: &T, b: &T, context: &Self::Context) -> Ordering {
        Tr::compare(a, b, context).reverse()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::cmp::Ordering;
    use std::io::{self, prelude::*};

    use rstest::*;

    use super::*;

    /// Length-prefixed test record ordered by name then age.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Person {
        pub name: String,
        pub age: u8,
    }

    impl Person {
        pub fn new(name: &str, age: u8) -> Self {
            Person {
                name: name.to_string(),
                age,
            }
        }
    }

    impl Record for Person {
        fn size(&self) -> usize {
            4 + self.name.len() + 1
        }

        fn save<W: Write>(&self, writer: &mut W) -> io::Result<()> {
            save_pod(writer, &(self.name.len() as u32))?;
            writer.write_all(self.name.as_bytes())?;
            save_pod(writer, &self.age)
        }

        fn load<R: BufRead>(reader: &mut R) -> Result<Option<Self>, RecordError> {
            let len: u32 = match load_pod(reader)? {
                Some(len) => len,
                None => return Ok(None),
            };
            let mut name = vec![0; len as usize + 1];
            if !read_exact_or_eof(reader, &mut name)? {
                return Err(RecordError::Truncated {
                    expected: name.len(),
                    actual: 0,
                });
            }
            let age = name.pop().unwrap_or_default();
            let name = String::from_utf8(name).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

            Ok(Some(Person { name, age }))
        }

        fn compare(&self, other: &Self) -> Ordering {
            self.name.cmp(&other.name).then(self.age.cmp(&other.age))
        }
    }

    fn save_all<T, Tr: ElementTraits<T, Context = ()>>(items: &[T]) -> Vec<u8> {
        let mut buf = Vec::new();
        for item in items {
            Tr::save(&mut buf, item, &()).unwrap();
        }
        buf
    }

    fn load_all<T, Tr: ElementTraits<T, Context = ()>>(bytes: &[u8]) -> Result<Vec<T>, Tr::DeserializationError> {
        let mut reader = io::BufReader::new(bytes);
        let mut items = Vec::new();
        while let Some(item) = Tr::load(&mut reader, &())? {
            items.push(item);
        }
        Ok(items)
    }

    #[test]
    fn test_pod_traits() {
        let saved: Vec<u64> = vec![7, 0, u64::MAX, 42];
        let bytes = save_all::<_, PodTraits<u64>>(&saved);
        assert_eq!(bytes.len(), saved.iter().map(|item| PodTraits::<u64>::size(item)).sum::<usize>());

        let restored = load_all::<u64, PodTraits<u64>>(&bytes).unwrap();
        assert_eq!(restored, saved);
    }

    #[test]
    fn test_pod_truncated_record() {
        let mut bytes = save_all::<_, PodTraits<u32>>(&[1u32, 2]);
        bytes.pop();

        match load_all::<u32, PodTraits<u32>>(&bytes) {
            Err(RecordError::Truncated { expected, actual }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_stream() {
        let restored = load_all::<i32, ArithmeticTraits<i32, false>>(&[]).unwrap();
        assert!(restored.is_empty());
    }

    #[rstest]
    #[case(1, 2, Ordering::Less)]
    #[case(2, 1, Ordering::Greater)]
    #[case(3, 3, Ordering::Equal)]
    fn test_arithmetic_compare(#[case] a: i32, #[case] b: i32, #[case] expected: Ordering) {
        assert_eq!(ArithmeticTraits::<i32, false>::compare(&a, &b, &()), expected);
        assert_eq!(ArithmeticTraits::<i32, true>::compare(&a, &b, &()), expected.reverse());
    }

    #[rstest]
    #[case(f64::NAN, 1.0, Ordering::Greater)]
    #[case(1.0, f64::NAN, Ordering::Less)]
    #[case(f64::NAN, f64::NAN, Ordering::Equal)]
    #[case(f64::NEG_INFINITY, f64::NAN, Ordering::Less)]
    #[case(-1.5, 1.0, Ordering::Less)]
    fn test_arithmetic_nan_compare(#[case] a: f64, #[case] b: f64, #[case] expected: Ordering) {
        assert_eq!(ArithmeticTraits::<f64, false>::compare(&a, &b, &()), expected);
        assert_eq!(ArithmeticTraits::<f64, true>::compare(&a, &b, &()), expected.reverse());
    }

    #[test]
    fn test_object_traits() {
        let saved = vec![Person::new("bob", 31), Person::new("alice", 27), Person::new("", 0)];
        let bytes = save_all::<_, ObjectTraits<Person>>(&saved);
        assert_eq!(bytes.len(), saved.iter().map(|item| ObjectTraits::<Person>::size(item)).sum::<usize>());

        let restored = load_all::<Person, ObjectTraits<Person>>(&bytes).unwrap();
        assert_eq!(restored, saved);
        assert_eq!(ObjectTraits::<Person>::compare(&saved[0], &saved[1], &()), Ordering::Greater);
    }

    #[test]
    fn test_object_truncated_record() {
        let mut bytes = save_all::<_, ObjectTraits<Person>>(&[Person::new("carol", 50)]);
        bytes.truncate(6);

        let result = load_all::<Person, ObjectTraits<Person>>(&bytes);
        assert!(matches!(result, Err(RecordError::Truncated { .. })));
    }

    #[test]
    fn test_pointer_traits() {
        let saved = vec![Box::new(Person::new("dave", 40)), Box::new(Person::new("erin", 22))];
        let bytes = save_all::<_, PointerTraits<Box<Person>>>(&saved);

        let restored = load_all::<Box<Person>, PointerTraits<Box<Person>>>(&bytes).unwrap();
        assert_eq!(restored, saved);
        assert_eq!(PointerTraits::<Box<Person>>::size(&saved[0]), saved[0].size());

        let a = std::rc::Rc::new(Person::new("a", 1));
        let b = std::rc::Rc::new(Person::new("b", 1));
        assert_eq!(PointerTraits::<std::rc::Rc<Person>>::compare(&a, &b, &()), Ordering::Less);
    }

    #[test]
    fn test_rmp_traits() {
        let saved: Vec<String> = vec!["hello".into(), "".into(), "world!".into()];
        let bytes = save_all::<_, RmpTraits<String>>(&saved);
        assert_eq!(bytes.len(), saved.iter().map(|item| RmpTraits::<String>::size(item)).sum::<usize>());

        let restored = load_all::<String, RmpTraits<String>>(&bytes).unwrap();
        assert_eq!(restored, saved);
    }

    #[test]
    fn test_rmp_truncated_record() {
        let mut bytes = save_all::<_, RmpTraits<String>>(&["truncated".to_string()]);
        bytes.pop();

        assert!(load_all::<String, RmpTraits<String>>(&bytes).is_err());
    }

    #[test]
    fn test_reversed_traits() {
        assert_eq!(
            Reversed::<RmpTraits<String>>::compare(&"a".to_string(), &"b".to_string(), &()),
            Ordering::Greater
        );
        assert_eq!(Reversed::<ArithmeticTraits<u8, true>>::compare(&1, &2, &()), Ordering::Less);
    }
}
