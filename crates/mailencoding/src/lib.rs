//! Transfer encodings for MIME content and header values: base64,
//! quoted-printable, RFC 2231 parameter encoding and RFC 2047
//! encoded-words, plus streaming content encoders built on top of
//! the `bytestream` crate.
mod charstream;
pub mod content;
mod encoder;
mod error;

pub use charstream::{Character, CharacterStream};
pub use content::{
    Base64ContentEncoder, ContentEncoder, NullContentEncoder, PlainContentEncoder,
    QpContentEncoder, RawContentEncoder,
};
pub use encoder::{
    header_encoder_for_name, Base64Encoder, Base64HeaderEncoder, Encoder, HeaderEncoder,
    QpEncoder, QpHeaderEncoder, Rfc2231Encoder,
};
pub use error::EncodingError;

pub type Result<T> = std::result::Result<T, EncodingError>;
