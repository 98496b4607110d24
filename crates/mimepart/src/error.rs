use bytestream::StreamError;
use mail_dkim::DKIMError;
use mailencoding::EncodingError;
use mailheaders::HeaderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MimeError {
    #[error("'{0}' is not a valid media type")]
    InvalidContentType(String),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    Dkim(#[from] DKIMError),
}
