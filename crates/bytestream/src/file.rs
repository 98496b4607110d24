use crate::{
    CommitSink, FilterableInputStream, InputByteStream, OutputByteStream, Result,
    SharedInputStream, StreamError, StreamFilter,
};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Lazily opened read and write handles onto a file
struct FileSink {
    path: PathBuf,
    writable: bool,
    writer: Option<File>,
    reader: Option<File>,
}

impl FileSink {
    fn write_handle(&mut self) -> Result<&mut File> {
        let file = match self.writer.take() {
            Some(file) => file,
            None => {
                if !self.writable {
                    return Err(StreamError::io(
                        &self.path,
                        std::io::Error::new(
                            std::io::ErrorKind::PermissionDenied,
                            "stream was opened read-only",
                        ),
                    ));
                }
                tracing::trace!("opening {:?} for write", self.path);
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&self.path)
                    .map_err(|err| StreamError::io(&self.path, err))?
            }
        };
        Ok(self.writer.insert(file))
    }

    fn read_handle(&mut self, offset: u64) -> Result<&mut File> {
        let file = match self.reader.take() {
            Some(file) => file,
            None => {
                tracing::trace!("opening {:?} for read at offset {offset}", self.path);
                let mut file =
                    File::open(&self.path).map_err(|err| StreamError::io(&self.path, err))?;
                if offset > 0 {
                    file.seek(SeekFrom::Start(offset))
                        .map_err(|err| StreamError::io(&self.path, err))?;
                }
                file
            }
        };
        Ok(self.reader.insert(file))
    }
}

impl CommitSink for FileSink {
    fn commit_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let path = self.path.clone();
        self.write_handle()?
            .write_all(bytes)
            .map_err(|err| StreamError::io(&path, err))?;
        // Re-open on the next read so that the new bytes are visible
        self.reader.take();
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|err| StreamError::io(&self.path, err))?;
        }
        Ok(())
    }
}

/// A byte stream backed by a file on disk
pub struct FileByteStream {
    inner: FilterableInputStream<FileSink>,
    offset: u64,
}

impl FileByteStream {
    /// Open `path` for reading only.  The file is not touched until
    /// the first read.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::with_mode(path.as_ref(), false)
    }

    /// Open `path` for reading and writing.  The file is created (or
    /// truncated) on the first write.
    pub fn create(path: impl AsRef<Path>) -> Self {
        Self::with_mode(path.as_ref(), true)
    }

    fn with_mode(path: &Path, writable: bool) -> Self {
        Self {
            inner: FilterableInputStream::new(FileSink {
                path: path.to_path_buf(),
                writable,
                writer: None,
                reader: None,
            }),
            offset: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.sink().path
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

impl InputByteStream for FileByteStream {
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

impl OutputByteStream for FileByteStream {
    fn read(&mut self, length: usize) -> Result<Option<Vec<u8>>> {
        let offset = self.offset;
        let sink = self.inner.sink_mut();
        let path = sink.path.clone();
        let reader = sink.read_handle(offset)?;

        let mut buf = Vec::with_capacity(length.min(64 * 1024));
        let size = Read::by_ref(reader)
            .take(length as u64)
            .read_to_end(&mut buf)
            .map_err(|err| StreamError::io(&path, err))?;
        if size == 0 {
            return Ok(None);
        }
        self.offset += size as u64;
        Ok(Some(buf))
    }

    fn set_read_pointer(&mut self, offset: u64) -> Result<()> {
        self.offset = offset;
        self.inner.sink_mut().reader.take();
        Ok(())
    }
}
