use crate::encoder::{push_hex_escape, Encoder};
use crate::{CharacterStream, Result};

const MAX_LINE_LENGTH: usize = 75;

/// Percent encoding for RFC 2231 extended parameter values.
///
/// Every byte is escaped.  Output lines are joined with a bare CRLF;
/// the caller is responsible for turning them into `name*N*=`
/// continuations.
#[derive(Clone, Debug)]
pub struct Rfc2231Encoder {
    chars: CharacterStream,
}

impl Rfc2231Encoder {
    pub fn new(charset: &str) -> Result<Self> {
        Ok(Self {
            chars: CharacterStream::new(charset)?,
        })
    }

    pub fn charset(&self) -> &str {
        self.chars.charset()
    }
}

impl Encoder for Rfc2231Encoder {
    fn encode(&self, data: &[u8], first_line_offset: usize, max_line_length: usize) -> String {
        let max = if max_line_length == 0 {
            MAX_LINE_LENGTH
        } else {
            max_line_length
        };
        let mut limit = max.saturating_sub(first_line_offset);
        let mut chars = self.chars.clone();
        chars.import_bytes(data);

        let mut lines = vec![];
        let mut current = String::new();
        while let Some(batch) = chars.read(4) {
            let mut encoded = String::new();
            for ch in &batch {
                for &b in ch.as_bytes() {
                    push_hex_escape(&mut encoded, '%', b);
                }
            }
            if !current.is_empty() && current.len() + encoded.len() > limit {
                lines.push(std::mem::take(&mut current));
                limit = max;
            }
            current.push_str(&encoded);
        }
        lines.push(current);
        lines.join("\r\n")
    }

    fn set_charset(&mut self, charset: &str) -> Result<()> {
        self.chars.set_character_set(charset)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn escapes_everything() {
        let encoder = Rfc2231Encoder::new("utf-8").unwrap();
        k9::assert_equal!(encoder.encode_str("a b", 0, 0), "%61%20%62");
        k9::assert_equal!(encoder.encode_str("é", 0, 0), "%C3%A9");
        k9::assert_equal!(encoder.encode_str("", 0, 0), "");
    }

    #[test]
    fn output_is_token_safe() {
        let encoder = Rfc2231Encoder::new("iso-8859-1").unwrap();
        let input: Vec<u8> = (0..=255).collect();
        let encoded = encoder.encode(&input, 0, 0);
        for line in encoded.split("\r\n") {
            assert!(line.len() <= 75);
            assert!(line
                .bytes()
                .all(|b| b == b'%' || b.is_ascii_digit() || (b'A'..=b'F').contains(&b)));
        }
    }

    #[test]
    fn wraps_in_groups_of_four() {
        let encoder = Rfc2231Encoder::new("utf-8").unwrap();
        // Each group of 4 characters encodes to 12 bytes, so 6 groups
        // fit in a line of 75
        let encoded = encoder.encode(&[b'x'; 30], 0, 0);
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        k9::assert_equal!(lines.len(), 2);
        k9::assert_equal!(lines[0].len(), 72);
        k9::assert_equal!(lines[1].len(), 18);

        let encoded = encoder.encode(&[b'x'; 30], 40, 0);
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        k9::assert_equal!(lines[0].len(), 24);
        k9::assert_equal!(lines[1].len(), 66);
    }

    #[test]
    fn keeps_characters_whole() {
        let encoder = Rfc2231Encoder::new("utf-8").unwrap();
        let encoded = encoder.encode_str(&"€".repeat(10), 0, 20);
        for line in encoded.split("\r\n") {
            k9::assert_equal!(line.len() % 9, 0);
        }
    }
}
