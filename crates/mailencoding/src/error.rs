use bytestream::StreamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("unsupported character set {0}")]
    UnsupportedCharset(String),
    #[error("unsupported content transfer encoding {0}")]
    UnsupportedEncoding(String),
    #[error(transparent)]
    Stream(#[from] StreamError),
}
