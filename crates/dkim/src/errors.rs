use mailheaders::HeaderError;
use thiserror::Error;

/// DKIM error status
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    Permfail,
    Tempfail,
}

#[derive(Debug, Error)]
/// DKIM errors
pub enum DKIMError {
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),
    #[error("unsupported canonicalization: {0}")]
    UnsupportedCanonicalizationType(String),
    #[error("no key for signature")]
    NoKeyForSignature,
    #[error("more than one key matches {0}")]
    AmbiguousKey(String),
    #[error("failed sign: {0}")]
    FailedToSign(String),
    #[error("failed to build object: {0}")]
    BuilderError(&'static str),
    #[error("failed to serialize DKIM header: {0}")]
    HeaderSerializeError(String),
    #[error("failed to load private key: {0}")]
    PrivateKeyLoadError(String),
    #[error("{0} called out of order")]
    InvalidState(&'static str),
    #[error(transparent)]
    Header(#[from] HeaderError),
}

impl DKIMError {
    pub fn status(&self) -> Status {
        use DKIMError::*;
        match self {
            NoKeyForSignature
            | AmbiguousKey(_)
            | UnsupportedCanonicalizationType(_)
            | UnsupportedHashAlgorithm(_)
            | Header(_) => Status::Permfail,
            FailedToSign(_)
            | BuilderError(_)
            | HeaderSerializeError(_)
            | PrivateKeyLoadError(_)
            | InvalidState(_) => Status::Tempfail,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_classification() {
        k9::assert_equal!(DKIMError::NoKeyForSignature.status(), Status::Permfail);
        k9::assert_equal!(
            DKIMError::UnsupportedHashAlgorithm("md5".into()).status(),
            Status::Permfail
        );
        k9::assert_equal!(
            DKIMError::FailedToSign("boom".into()).status(),
            Status::Tempfail
        );
        k9::assert_equal!(
            DKIMError::InvalidState("end_body").to_string(),
            "end_body called out of order"
        );
    }
}
