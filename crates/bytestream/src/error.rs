use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A mirror was written to while it was already mutably borrowed,
    /// which happens when a stream is bound (directly or indirectly)
    /// to itself.
    #[error("mirror stream is already in use; streams must not mirror into themselves")]
    MirrorBusy,
    /// The stream cannot accept data in its current state
    #[error("write rejected: {0}")]
    Rejected(String),
}

impl StreamError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
