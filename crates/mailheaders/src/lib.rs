//! Typed header fields and their RFC 5322 rendering: RFC 2047
//! encoded-words, RFC 2231 parameters and line folding.
mod config;
mod error;
mod field;
mod fold;
pub mod grammar;
mod set;

pub use config::{HeaderConfig, HeaderEncoding};
pub use error::HeaderError;
pub use field::{HeaderField, HeaderKind, HeaderValue, Mailbox};
pub use set::{HeaderSet, SimpleHeaderSet};

pub type Result<T> = std::result::Result<T, HeaderError>;
