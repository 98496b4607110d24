use crate::Result;

mod base64;
mod header;
mod qp;
mod rfc2231;

pub use self::base64::Base64Encoder;
pub(crate) use self::base64::{clamp_line_length, LineWrapper};
pub use header::{header_encoder_for_name, Base64HeaderEncoder, HeaderEncoder, QpHeaderEncoder};
pub use qp::QpEncoder;
pub(crate) use qp::QpState;
pub use rfc2231::Rfc2231Encoder;

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

/// Append the `%XX` or `=XX` style escape of `b` to `out`
pub(crate) fn push_hex_escape(out: &mut String, marker: char, b: u8) {
    out.push(marker);
    out.push(HEX_CHARS[(b as usize) >> 4] as char);
    out.push(HEX_CHARS[(b as usize) & 0x0f] as char);
}

/// Encodes a complete string in one call.
///
/// `first_line_offset` is the number of columns already used on the
/// first output line (for example by a header name), and a
/// `max_line_length` of zero selects the default for the encoding.
pub trait Encoder {
    fn encode(&self, data: &[u8], first_line_offset: usize, max_line_length: usize) -> String;

    fn encode_str(&self, s: &str, first_line_offset: usize, max_line_length: usize) -> String {
        self.encode(s.as_bytes(), first_line_offset, max_line_length)
    }

    /// Called when the charset of the content being encoded changes.
    fn set_charset(&mut self, _charset: &str) -> Result<()> {
        Ok(())
    }
}
