use crate::encoder::Encoder;
use data_encoding::BASE64;

const MAX_LINE_LENGTH: usize = 76;

/// Zero and anything longer than RFC 2045 permits both mean 76
pub(crate) fn clamp_line_length(max_line_length: usize) -> usize {
    if max_line_length == 0 || max_line_length > MAX_LINE_LENGTH {
        MAX_LINE_LENGTH
    } else {
        max_line_length
    }
}

/// Breaks a run of text into fixed width lines.  State is kept between
/// calls to `push` so that text can be supplied in pieces.
#[derive(Debug)]
pub(crate) struct LineWrapper {
    max: usize,
    limit: usize,
    line_len: usize,
}

impl LineWrapper {
    pub fn new(first_line_offset: usize, max_line_length: usize) -> Self {
        Self {
            max: max_line_length,
            limit: max_line_length.saturating_sub(first_line_offset),
            line_len: 0,
        }
    }

    /// `text` must be ASCII
    pub fn push(&mut self, mut text: &str, out: &mut String) {
        while !text.is_empty() {
            if self.line_len >= self.limit {
                out.push_str("\r\n");
                self.line_len = 0;
                self.limit = self.max;
            }
            let take = (self.limit - self.line_len).min(text.len());
            out.push_str(&text[..take]);
            self.line_len += take;
            text = &text[take..];
        }
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct Base64Encoder;

impl Encoder for Base64Encoder {
    fn encode(&self, data: &[u8], first_line_offset: usize, max_line_length: usize) -> String {
        let encoded = BASE64.encode(data);
        let mut result = String::with_capacity(encoded.len() + encoded.len() / 38);
        LineWrapper::new(first_line_offset, clamp_line_length(max_line_length))
            .push(&encoded, &mut result);
        result
    }
}
