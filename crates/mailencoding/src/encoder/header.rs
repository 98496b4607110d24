use crate::encoder::push_hex_escape;
use crate::{CharacterStream, EncodingError, Result};
use data_encoding::BASE64;

/// RFC 2047 limits an encoded-word to 75 characters
const MAX_ENCODED_WORD_LENGTH: usize = 75;

/// Produces the encoded-text portion of RFC 2047 encoded-words.
pub trait HeaderEncoder {
    /// The encoding letter that appears in the encoded-word
    fn name(&self) -> &'static str;

    /// Encode `data`, which is text in `charset`, as lines of
    /// encoded-text joined by CRLF.  Characters are never split
    /// across lines.
    fn encode(
        &self,
        data: &[u8],
        charset: &str,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<String>;

    /// Render `data` as one or more complete encoded-words, each no
    /// longer than 75 characters, joined by folding whitespace.
    fn encoded_words(
        &self,
        data: &[u8],
        charset: &str,
        language: Option<&str>,
        first_line_offset: usize,
    ) -> Result<String> {
        let charset_decl = match language {
            Some(lang) if !lang.is_empty() => format!("{charset}*{lang}"),
            _ => charset.to_string(),
        };
        // =?charset?X?text?=
        let wrapper_len = charset_decl.len() + self.name().len() + 6;
        let max = MAX_ENCODED_WORD_LENGTH.saturating_sub(wrapper_len).max(4);
        let first_line_offset = if first_line_offset >= MAX_ENCODED_WORD_LENGTH {
            0
        } else {
            first_line_offset
        };

        let text = self.encode(data, charset, first_line_offset, max)?;
        let words: Vec<String> = text
            .split("\r\n")
            .map(|line| format!("=?{charset_decl}?{}?{line}?=", self.name()))
            .collect();
        Ok(words.join("\r\n "))
    }
}

/// Resolve `Q` or `B` (case insensitive) to a header encoder
pub fn header_encoder_for_name(name: &str) -> Result<Box<dyn HeaderEncoder>> {
    if name.eq_ignore_ascii_case("q") {
        Ok(Box::new(QpHeaderEncoder))
    } else if name.eq_ignore_ascii_case("b") {
        Ok(Box::new(Base64HeaderEncoder))
    } else {
        Err(EncodingError::UnsupportedEncoding(name.to_string()))
    }
}

fn import(data: &[u8], charset: &str) -> Result<CharacterStream> {
    let mut chars = CharacterStream::new(charset)?;
    chars.import_bytes(data);
    Ok(chars)
}

fn default_max(max_line_length: usize) -> usize {
    if max_line_length == 0 {
        MAX_ENCODED_WORD_LENGTH
    } else {
        max_line_length
    }
}

/// The "Q" encoding from RFC 2047 section 4.2
#[derive(Default, Debug, Clone, Copy)]
pub struct QpHeaderEncoder;

impl QpHeaderEncoder {
    /// The characters permitted in a `phrase` context
    fn is_safe(b: u8) -> bool {
        b.is_ascii_alphanumeric() || matches!(b, b'!' | b'*' | b'+' | b'-' | b'/')
    }
}

impl HeaderEncoder for QpHeaderEncoder {
    fn name(&self) -> &'static str {
        "Q"
    }

    fn encode(
        &self,
        data: &[u8],
        charset: &str,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<String> {
        let max = default_max(max_line_length);
        let mut limit = max.saturating_sub(first_line_offset);
        let mut chars = import(data, charset)?;

        let mut lines = vec![];
        let mut current = String::new();
        let mut unit = String::new();
        while let Some(batch) = chars.read(64) {
            for ch in &batch {
                unit.clear();
                match ch.single_byte() {
                    Some(b' ') => unit.push('_'),
                    Some(b) if Self::is_safe(b) => unit.push(b as char),
                    _ => {
                        for &b in ch.as_bytes() {
                            push_hex_escape(&mut unit, '=', b);
                        }
                    }
                }
                if !current.is_empty() && current.len() + unit.len() > limit {
                    lines.push(std::mem::take(&mut current));
                    limit = max;
                }
                current.push_str(&unit);
            }
        }
        lines.push(current);
        Ok(lines.join("\r\n"))
    }
}

/// The "B" encoding from RFC 2047 section 4.1.  Each line is
/// independently decodable: it holds whole characters and ends on a
/// base64 quantum boundary.
#[derive(Default, Debug, Clone, Copy)]
pub struct Base64HeaderEncoder;

fn base64_len(n: usize) -> usize {
    n.div_ceil(3) * 4
}

impl HeaderEncoder for Base64HeaderEncoder {
    fn name(&self) -> &'static str {
        "B"
    }

    fn encode(
        &self,
        data: &[u8],
        charset: &str,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<String> {
        let max = default_max(max_line_length);
        let mut limit = max.saturating_sub(first_line_offset);
        let mut chars = import(data, charset)?;

        let mut lines = vec![];
        let mut current: Vec<u8> = vec![];
        while let Some(batch) = chars.read(64) {
            for ch in &batch {
                if !current.is_empty() && base64_len(current.len() + ch.len()) > limit {
                    lines.push(BASE64.encode(&current));
                    current.clear();
                    limit = max;
                }
                current.extend_from_slice(ch.as_bytes());
            }
        }
        lines.push(BASE64.encode(&current));
        Ok(lines.join("\r\n"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn q_encoding() {
        k9::assert_equal!(
            QpHeaderEncoder
                .encode("Hello wörld?".as_bytes(), "utf-8", 0, 0)
                .unwrap(),
            "Hello_w=C3=B6rld=3F"
        );
        k9::assert_equal!(
            QpHeaderEncoder.encode(b"a=b_c\td", "utf-8", 0, 0).unwrap(),
            "a=3Db=5Fc=09d"
        );
    }

    #[test]
    fn encoded_words_fit() {
        let text = "Ünïcödé ".repeat(20);
        for encoder in [
            Box::new(QpHeaderEncoder) as Box<dyn HeaderEncoder>,
            Box::new(Base64HeaderEncoder),
        ] {
            let words = encoder
                .encoded_words(text.as_bytes(), "utf-8", None, 9)
                .unwrap();
            let lines: Vec<&str> = words.split("\r\n ").collect();
            assert!(lines.len() > 1);
            assert!(lines[0].len() <= 75 - 9, "{}", lines[0]);
            for word in &lines {
                assert!(word.len() <= 75, "{word}");
                assert!(word.starts_with(&format!("=?utf-8?{}?", encoder.name())));
                assert!(word.ends_with("?="));
                assert!(!word.contains(' ') && !word.contains('\t'));
            }
        }
    }

    #[test]
    fn base64_words_decode_independently() {
        let text = "日本語のテキスト".repeat(4);
        let encoded = Base64HeaderEncoder
            .encode(text.as_bytes(), "utf-8", 0, 20)
            .unwrap();
        let mut decoded = String::new();
        for line in encoded.split("\r\n") {
            assert!(line.len() <= 20);
            let bytes = BASE64.decode(line.as_bytes()).unwrap();
            decoded.push_str(std::str::from_utf8(&bytes).unwrap());
        }
        k9::assert_equal!(decoded, text);
    }

    #[test]
    fn language_in_charset() {
        k9::assert_equal!(
            QpHeaderEncoder
                .encoded_words("é".as_bytes(), "utf-8", Some("fr"), 0)
                .unwrap(),
            "=?utf-8*fr?Q?=C3=A9?="
        );
    }

    #[test]
    fn by_name() {
        k9::assert_equal!(header_encoder_for_name("b").unwrap().name(), "B");
        k9::assert_equal!(header_encoder_for_name("Q").unwrap().name(), "Q");
        assert!(header_encoder_for_name("x").is_err());
    }
}
