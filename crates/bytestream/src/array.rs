use crate::{
    FilterableInputStream, InputByteStream, OutputByteStream, Result, SharedInputStream,
    StreamFilter,
};

/// An in-memory byte stream.
/// Committed bytes are stored in an indexable array and can be read
/// back through an independent read cursor.
pub struct ArrayByteStream {
    inner: FilterableInputStream<Vec<u8>>,
    offset: usize,
}

impl Default for ArrayByteStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayByteStream {
    pub fn new() -> Self {
        Self {
            inner: FilterableInputStream::new(vec![]),
            offset: 0,
        }
    }

    /// Create a stream pre-populated with `bytes`; the read cursor is
    /// positioned at the start.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: FilterableInputStream::new(bytes.into()),
            offset: 0,
        }
    }

    /// The committed content
    pub fn contents(&self) -> &[u8] {
        self.inner.sink()
    }

    pub fn len(&self) -> usize {
        self.inner.sink().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sink().is_empty()
    }

    /// Discard the content and rewind the read cursor
    pub fn reset(&mut self) {
        self.inner.sink_mut().clear();
        self.offset = 0;
    }

    pub fn add_filter(&mut self, key: impl Into<String>, filter: Box<dyn StreamFilter>) {
        self.inner.add_filter(key, filter);
    }

    pub fn remove_filter(&mut self, key: &str) -> Option<Box<dyn StreamFilter>> {
        self.inner.remove_filter(key)
    }

    pub fn bind(&mut self, stream: SharedInputStream) {
        self.inner.bind(stream);
    }

    pub fn unbind(&mut self, stream: &SharedInputStream) -> Result<()> {
        self.inner.unbind(stream)
    }
}

impl InputByteStream for ArrayByteStream {
    fn write(&mut self, bytes: &[u8]) -> Result<Option<u64>> {
        self.inner.write(bytes)
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    fn flush_buffers(&mut self) -> Result<()> {
        self.inner.flush_buffers()
    }
}

impl OutputByteStream for ArrayByteStream {
    fn read(&mut self, length: usize) -> Result<Option<Vec<u8>>> {
        let data = self.inner.sink();
        if self.offset >= data.len() {
            return Ok(None);
        }
        let end = data.len().min(self.offset.saturating_add(length));
        let chunk = data[self.offset..end].to_vec();
        self.offset = end;
        Ok(Some(chunk))
    }

    fn set_read_pointer(&mut self, offset: u64) -> Result<()> {
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        self.offset = offset.min(self.len());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn read_advances_cursor() {
        let mut stream = ArrayByteStream::from_bytes("hello world");
        k9::assert_equal!(stream.read(5).unwrap(), Some(b"hello".to_vec()));
        k9::assert_equal!(stream.read(100).unwrap(), Some(b" world".to_vec()));
        k9::assert_equal!(stream.read(1).unwrap(), None);

        stream.set_read_pointer(6).unwrap();
        k9::assert_equal!(stream.read(3).unwrap(), Some(b"wor".to_vec()));
    }

    #[test]
    fn reads_observe_later_writes() {
        let mut stream = ArrayByteStream::new();
        k9::assert_equal!(stream.read(1).unwrap(), None);
        stream.write(b"abc").unwrap();
        k9::assert_equal!(stream.read(2).unwrap(), Some(b"ab".to_vec()));
        stream.write(b"def").unwrap();
        k9::assert_equal!(stream.read(10).unwrap(), Some(b"cdef".to_vec()));
    }

    #[test]
    fn unbind_mirror_gets_tail() {
        let mirror = Rc::new(RefCell::new(ArrayByteStream::new()));
        let handle: SharedInputStream = mirror.clone();

        let mut stream = ArrayByteStream::new();
        stream.add_filter("crlf", Box::new(crate::CrlfFilter));
        stream.bind(handle.clone());
        // held back by the crlf filter because it ends in CR
        stream.write(b"abc\r").unwrap();
        stream.unbind(&handle).unwrap();
        k9::assert_equal!(mirror.borrow().contents(), b"abc\r");
    }

    #[test]
    fn reset_clears() {
        let mut stream = ArrayByteStream::from_bytes("abc");
        stream.read(1).unwrap();
        stream.reset();
        assert!(stream.is_empty());
        k9::assert_equal!(stream.read(1).unwrap(), None);
    }
}
