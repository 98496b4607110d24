//! Buffered byte streams with pluggable filters and mirror fan-out.
//!
//! The naming follows the direction in which the *caller* moves data:
//! an [InputByteStream] is something you write input into, and an
//! [OutputByteStream] is something you read output from.  Content
//! encoders read from the latter and write into the former.
use std::cell::RefCell;
use std::rc::Rc;

mod array;
mod error;
mod file;
mod filter;
mod filterable;

pub use array::ArrayByteStream;
pub use error::StreamError;
pub use file::FileByteStream;
pub use filter::{CrlfFilter, ReplacementFilter, StreamFilter};
pub use filterable::{CommitSink, FilterableInputStream};

pub type Result<T> = std::result::Result<T, StreamError>;

/// A shared handle to a writable stream, used to bind mirrors.
/// Streams are owned by a single message-building call stack, so the
/// handle is intentionally neither `Send` nor `Sync`.
pub type SharedInputStream = Rc<RefCell<dyn InputByteStream>>;

/// Something that bytes can be written into.
pub trait InputByteStream {
    /// Write `bytes`.  Returns the sequence number of the write when
    /// the data was committed, or `None` when a filter asked for the
    /// data to remain buffered.
    fn write(&mut self, bytes: &[u8]) -> Result<Option<u64>>;

    /// Force any buffered data to be committed, regardless of
    /// whether a filter would prefer to keep buffering.
    fn commit(&mut self) -> Result<()>;

    /// Commit any buffered data and flush the underlying storage.
    fn flush_buffers(&mut self) -> Result<()>;
}

/// Something that bytes can be read out of.
pub trait OutputByteStream {
    /// Read up to `length` bytes.  Returns `None` once the read
    /// cursor has reached the end of the data.
    fn read(&mut self, length: usize) -> Result<Option<Vec<u8>>>;

    /// Move the read cursor to `offset`.  Offsets past the end are
    /// clamped to the end.
    fn set_read_pointer(&mut self, offset: u64) -> Result<()>;
}

impl InputByteStream for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> Result<Option<u64>> {
        self.extend_from_slice(bytes);
        Ok(Some(self.len() as u64))
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn flush_buffers(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Returns true if both handles refer to the same stream
pub(crate) fn same_stream(a: &SharedInputStream, b: &SharedInputStream) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}
