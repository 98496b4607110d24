use crate::encoder::{clamp_line_length, push_hex_escape, Encoder};
use crate::{Character, CharacterStream, Result};

/// Bytes that quoted-printable allows to be represented literally
pub(crate) fn is_qp_literal(b: u8) -> bool {
    matches!(b, 0x21..=0x3c | 0x3e..=0x7e)
}

fn escaped(bytes: &[u8]) -> String {
    let mut result = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        push_hex_escape(&mut result, '=', b);
    }
    result
}

/// Incremental quoted-printable encoder for body content.
///
/// Characters are fed in one at a time.  SP/HT is held back until we
/// know whether a line break follows it, and a CR is held back until
/// we know whether it is part of a CRLF pair.  Each character is
/// emitted as a single unit, so the escapes for a multi-byte character
/// never straddle a soft line break.
#[derive(Debug)]
pub(crate) struct QpState {
    max: usize,
    limit: usize,
    line_len: usize,
    pending_ws: Option<u8>,
    pending_cr: bool,
    canonical: bool,
    dot_escape: bool,
}

impl QpState {
    pub fn new(
        first_line_offset: usize,
        max_line_length: usize,
        canonical: bool,
        dot_escape: bool,
    ) -> Self {
        Self {
            max: max_line_length,
            limit: max_line_length.saturating_sub(first_line_offset),
            line_len: 0,
            pending_ws: None,
            pending_cr: false,
            canonical,
            dot_escape,
        }
    }

    pub fn push(&mut self, ch: &Character, out: &mut String) {
        if self.pending_cr {
            self.pending_cr = false;
            if ch.single_byte() == Some(b'\n') {
                self.hard_break(out);
                return;
            }
            self.bare_cr(out);
        }

        match ch.single_byte() {
            Some(b'\r') => self.pending_cr = true,
            Some(b'\n') => {
                if self.canonical {
                    self.hard_break(out);
                } else {
                    self.flush_whitespace(out);
                    self.emit("=0A", out);
                }
            }
            Some(ws @ (b' ' | b'\t')) => {
                self.flush_whitespace(out);
                self.pending_ws = Some(ws);
            }
            Some(b) if is_qp_literal(b) => {
                self.flush_whitespace(out);
                if b == b'.'
                    && self.dot_escape
                    && (self.line_len == 0 || self.line_len + 1 >= self.limit)
                {
                    // The dot would start a line; SMTP would treat a
                    // lone dot as the end of the data
                    self.emit("=2E", out);
                } else {
                    let mut buf = [0u8; 4];
                    self.emit((b as char).encode_utf8(&mut buf), out);
                }
            }
            _ => {
                self.flush_whitespace(out);
                self.emit(&escaped(ch.as_bytes()), out);
            }
        }
    }

    pub fn finish(&mut self, out: &mut String) {
        if self.pending_cr {
            self.pending_cr = false;
            self.bare_cr(out);
        }
        if let Some(ws) = self.pending_ws.take() {
            self.emit(&escaped(&[ws]), out);
        }
    }

    fn bare_cr(&mut self, out: &mut String) {
        if self.canonical {
            self.hard_break(out);
        } else {
            self.flush_whitespace(out);
            self.emit("=0D", out);
        }
    }

    fn hard_break(&mut self, out: &mut String) {
        if let Some(ws) = self.pending_ws.take() {
            self.emit(&escaped(&[ws]), out);
        }
        out.push_str("\r\n");
        self.line_len = 0;
        self.limit = self.max;
    }

    /// Whitespace followed by content is emitted as-is
    fn flush_whitespace(&mut self, out: &mut String) {
        if let Some(ws) = self.pending_ws.take() {
            let mut buf = [0u8; 4];
            self.emit((ws as char).encode_utf8(&mut buf), out);
        }
    }

    fn emit(&mut self, unit: &str, out: &mut String) {
        // One column is reserved for the `=` of a soft break
        if self.line_len > 0 && self.line_len + unit.len() >= self.limit {
            out.push_str("=\r\n");
            self.line_len = 0;
            self.limit = self.max;
        }
        out.push_str(unit);
        self.line_len += unit.len();
    }
}

/// Quoted-printable encoding of a complete string.
#[derive(Clone, Debug)]
pub struct QpEncoder {
    chars: CharacterStream,
    canonical: bool,
    dot_escape: bool,
}

impl QpEncoder {
    pub fn new(charset: &str) -> Result<Self> {
        Ok(Self {
            chars: CharacterStream::new(charset)?,
            canonical: false,
            dot_escape: false,
        })
    }

    /// When enabled, bare CR and bare LF are converted to CRLF
    pub fn with_canonicalization(mut self, canonical: bool) -> Self {
        self.canonical = canonical;
        self
    }

    /// When enabled, a `.` at the start of a line is encoded as `=2E`
    pub fn with_dot_escape(mut self, dot_escape: bool) -> Self {
        self.dot_escape = dot_escape;
        self
    }

    pub fn charset(&self) -> &str {
        self.chars.charset()
    }
}

impl Encoder for QpEncoder {
    fn encode(&self, data: &[u8], first_line_offset: usize, max_line_length: usize) -> String {
        let mut state = QpState::new(
            first_line_offset,
            clamp_line_length(max_line_length),
            self.canonical,
            self.dot_escape,
        );
        let mut chars = self.chars.clone();
        chars.import_bytes(data);

        let mut result = String::with_capacity(data.len() + data.len() / 4);
        while let Some(batch) = chars.read(64) {
            for ch in &batch {
                state.push(ch, &mut result);
            }
        }
        state.finish(&mut result);
        result
    }

    fn set_charset(&mut self, charset: &str) -> Result<()> {
        self.chars.set_character_set(charset)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn qp(s: &[u8]) -> String {
        QpEncoder::new("utf-8").unwrap().encode(s, 0, 0)
    }

    #[test]
    fn permitted_bytes_are_literal() {
        for b in (0x21u8..=0x3c).chain(0x3e..=0x7e) {
            k9::assert_equal!(qp(&[b]), (b as char).to_string());
        }
    }

    #[test]
    fn other_bytes_are_escaped() {
        let encoder = QpEncoder::new("iso-8859-1").unwrap();
        for b in (0x00u8..=0x20).chain(0x7f..=0xff).chain([0x3d]) {
            k9::assert_equal!(encoder.encode(&[b], 0, 0), format!("={b:02X}"));
        }
    }

    #[test]
    fn whitespace_before_line_break() {
        k9::assert_equal!(qp(b"a b"), "a b");
        k9::assert_equal!(qp(b"a \r\nb"), "a=20\r\nb");
        k9::assert_equal!(qp(b"a\t\r\nb"), "a=09\r\nb");
        k9::assert_equal!(qp(b"a  \r\n"), "a =20\r\n");
        k9::assert_equal!(qp(b"a "), "a=20");
        k9::assert_equal!(qp(b"\r\n\r\n"), "\r\n\r\n");
    }

    #[test]
    fn bare_line_endings() {
        k9::assert_equal!(qp(b"a\nb\rc"), "a=0Ab=0Dc");
        let canonical = QpEncoder::new("utf-8")
            .unwrap()
            .with_canonicalization(true);
        k9::assert_equal!(canonical.encode(b"a \nb\rc\r", 0, 0), "a=20\r\nb\r\nc\r\n");
    }

    #[test]
    fn soft_breaks() {
        let input = vec![b'a'; 100];
        let encoded = qp(&input);
        k9::assert_equal!(
            encoded,
            format!("{}=\r\n{}", "a".repeat(75), "a".repeat(25))
        );

        let input = vec![b'a'; 200];
        let encoded = QpEncoder::new("utf-8").unwrap().encode(&input, 30, 0);
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        k9::assert_equal!(lines[0].len(), 46);
        k9::assert_equal!(lines[1].len(), 76);
    }

    #[test]
    fn never_splits_a_character() {
        let input = "é".repeat(40);
        let encoded = qp(input.as_bytes());
        for line in encoded.split("\r\n") {
            assert!(line.len() <= 76, "{line}");
            // Each é is 6 bytes of escapes
            let body = line.trim_end_matches('=');
            k9::assert_equal!(body.len() % 6, 0);
        }
    }

    #[test]
    fn dot_escaping() {
        let encoder = QpEncoder::new("utf-8").unwrap().with_dot_escape(true);
        k9::assert_equal!(encoder.encode(b".\r\na.b", 0, 0), "=2E\r\na.b");
        k9::assert_equal!(qp(b".\r\n"), ".\r\n");
    }

    #[test]
    fn round_trip() {
        let input = "Hello wörld, this is a rather long line of text which needs to be \
                     wrapped at least once \t \r\nand also contains = signs\r\n \r\n.";
        let encoded = qp(input.as_bytes());
        for line in encoded.split("\r\n") {
            assert!(line.len() <= 76);
            assert!(!line.ends_with(' ') && !line.ends_with('\t'));
        }
        let decoded =
            quoted_printable::decode(encoded.as_bytes(), quoted_printable::ParseMode::Robust)
                .unwrap();
        k9::assert_equal!(String::from_utf8(decoded).unwrap(), input);
    }
}
