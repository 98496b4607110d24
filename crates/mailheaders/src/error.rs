use crate::HeaderKind;
use mailencoding::EncodingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("invalid value for {header} header: {reason}")]
    Compliance { header: String, reason: String },
    #[error("{header} is a {actual:?} header, not {expected:?}")]
    WrongKind {
        header: String,
        actual: HeaderKind,
        expected: HeaderKind,
    },
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

impl HeaderError {
    pub(crate) fn compliance(header: &str, reason: impl Into<String>) -> Self {
        Self::Compliance {
            header: header.to_string(),
            reason: reason.into(),
        }
    }
}
