use crate::{same_stream, InputByteStream, Result, SharedInputStream, StreamError, StreamFilter};
use indexmap::IndexMap;

/// The storage that a [FilterableInputStream] commits into.
pub trait CommitSink {
    /// Store filtered bytes
    fn commit_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Flush any storage level buffering
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl CommitSink for Vec<u8> {
    fn commit_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// A write buffer that sits in front of a [CommitSink].
///
/// Writes accumulate in the buffer until every registered filter is
/// happy for them to be committed.  On commit the buffer is passed
/// through the filter chain (in registration order) and stored in the
/// sink, while the original unfiltered bytes are delivered to each
/// bound mirror.
pub struct FilterableInputStream<S> {
    sink: S,
    write_buffer: Vec<u8>,
    sequence: u64,
    filters: IndexMap<String, Box<dyn StreamFilter>>,
    mirrors: Vec<SharedInputStream>,
}

impl<S: CommitSink> FilterableInputStream<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            write_buffer: vec![],
            sequence: 0,
            filters: IndexMap::new(),
            mirrors: vec![],
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Returns the bytes that have been written but not yet committed
    pub fn pending(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Register `filter` under `key`.  Re-using a key replaces the
    /// earlier filter but keeps its position in the chain.
    pub fn add_filter(&mut self, key: impl Into<String>, filter: Box<dyn StreamFilter>) {
        self.filters.insert(key.into(), filter);
    }

    pub fn remove_filter(&mut self, key: &str) -> Option<Box<dyn StreamFilter>> {
        self.filters.shift_remove(key)
    }

    pub fn has_filter(&self, key: &str) -> bool {
        self.filters.contains_key(key)
    }

    /// Attach `stream` as a mirror; it will receive every subsequent
    /// committed write and flush.
    pub fn bind(&mut self, stream: SharedInputStream) {
        self.mirrors.push(stream);
    }

    /// Detach `stream`.  Anything still sitting in the write buffer
    /// is handed to the stream first so that it doesn't miss the tail
    /// of the data.  The buffer itself is retained for the sink and
    /// the remaining mirrors.
    pub fn unbind(&mut self, stream: &SharedInputStream) -> Result<()> {
        let Some(idx) = self.mirrors.iter().position(|m| same_stream(m, stream)) else {
            return Ok(());
        };
        let mirror = self.mirrors.remove(idx);
        if !self.write_buffer.is_empty() {
            mirror
                .try_borrow_mut()
                .map_err(|_| StreamError::MirrorBusy)?
                .write(&self.write_buffer)?;
        }
        Ok(())
    }

    pub fn mirror_count(&self) -> usize {
        self.mirrors.len()
    }

    fn apply_filters(&self, bytes: &[u8]) -> Vec<u8> {
        let mut bytes = bytes.to_vec();
        for filter in self.filters.values() {
            bytes = filter.filter(&bytes);
        }
        bytes
    }

    fn do_write(&mut self) -> Result<()> {
        let buffer = std::mem::take(&mut self.write_buffer);
        let filtered = self.apply_filters(&buffer);
        self.sink.commit_bytes(&filtered)?;
        for mirror in &self.mirrors {
            mirror
                .try_borrow_mut()
                .map_err(|_| StreamError::MirrorBusy)?
                .write(&buffer)?;
        }
        Ok(())
    }
}

impl<S: CommitSink> InputByteStream for FilterableInputStream<S> {
    fn write(&mut self, bytes: &[u8]) -> Result<Option<u64>> {
        self.write_buffer.extend_from_slice(bytes);
        for (key, filter) in &self.filters {
            if filter.should_buffer(&self.write_buffer) {
                tracing::trace!(
                    "filter {key} holding {} buffered bytes",
                    self.write_buffer.len()
                );
                return Ok(None);
            }
        }
        self.do_write()?;
        self.sequence += 1;
        Ok(Some(self.sequence))
    }

    fn commit(&mut self) -> Result<()> {
        self.do_write()
    }

    fn flush_buffers(&mut self) -> Result<()> {
        if !self.write_buffer.is_empty() {
            self.do_write()?;
        }
        self.sink.flush()?;
        for mirror in &self.mirrors {
            mirror
                .try_borrow_mut()
                .map_err(|_| StreamError::MirrorBusy)?
                .flush_buffers()?;
        }
        Ok(())
    }
}
