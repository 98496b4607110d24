//! Serialization of a single MIME entity: an ordered header block,
//! the blank separator line and the transfer-encoded body, with
//! optional DKIM signing of the result.
mod entity;
mod error;

pub use entity::{AttachmentOptions, MimeBody, MimeEntity, CANONICAL_HEADER_ORDER};
pub use error::MimeError;

pub type Result<T> = std::result::Result<T, MimeError>;
