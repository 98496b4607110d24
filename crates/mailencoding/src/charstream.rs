use crate::{EncodingError, Result};
use bytestream::OutputByteStream;
use encoding_rs::Encoding;
use std::collections::VecDeque;

/// One logical character in some character set.  Depending on the
/// charset this may span several bytes; encoders that must not split
/// multi-byte sequences operate on these rather than on raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Character(Vec<u8>);

impl Character {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the byte value if this character is exactly one byte long
    pub fn single_byte(&self) -> Option<u8> {
        match self.0.as_slice() {
            [b] => Some(*b),
            _ => None,
        }
    }
}

impl AsRef<[u8]> for Character {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Knows how to find character boundaries for a family of charsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CharacterReader {
    Utf8,
    FixedWidth(usize),
    Utf16 { big_endian: bool },
    /// Big5, EUC-KR, GBK: a lead byte with the high bit set
    /// introduces a two byte sequence
    DoubleByte,
    ShiftJis,
    EucJp,
    Gb18030,
}

impl CharacterReader {
    fn for_charset(label: &str) -> Result<Self> {
        let lower = label.trim().to_ascii_lowercase();
        // encoding_rs only knows about charsets that browsers use
        match lower.as_str() {
            "ucs-4" | "ucs4" | "utf-32" | "utf-32le" | "utf-32be" => {
                return Ok(Self::FixedWidth(4))
            }
            "ucs-2" | "ucs2" => return Ok(Self::FixedWidth(2)),
            _ => {}
        }

        let encoding = Encoding::for_label(lower.as_bytes())
            .ok_or_else(|| EncodingError::UnsupportedCharset(label.to_string()))?;
        tracing::trace!("charset {label} resolved to {}", encoding.name());

        Ok(if encoding == encoding_rs::UTF_8 {
            Self::Utf8
        } else if encoding == encoding_rs::UTF_16LE {
            Self::Utf16 { big_endian: false }
        } else if encoding == encoding_rs::UTF_16BE {
            Self::Utf16 { big_endian: true }
        } else if encoding == encoding_rs::SHIFT_JIS {
            Self::ShiftJis
        } else if encoding == encoding_rs::EUC_JP {
            Self::EucJp
        } else if encoding == encoding_rs::GB18030 {
            Self::Gb18030
        } else if encoding == encoding_rs::GBK
            || encoding == encoding_rs::BIG5
            || encoding == encoding_rs::EUC_KR
        {
            Self::DoubleByte
        } else {
            // Single byte charsets, and ISO-2022-JP which is 7-bit
            // on the wire
            Self::FixedWidth(1)
        })
    }

    /// Returns the length of the character at the start of `bytes`,
    /// or `None` if more bytes are needed to know.
    fn char_len(&self, bytes: &[u8]) -> Option<usize> {
        let lead = *bytes.first()?;
        let need = match self {
            Self::FixedWidth(n) => *n,
            Self::Utf8 => {
                let need = match lead {
                    0xc0..=0xdf => 2,
                    0xe0..=0xef => 3,
                    0xf0..=0xf7 => 4,
                    _ => 1,
                };
                for i in 1..need {
                    let b = *bytes.get(i)?;
                    if b & 0xc0 != 0x80 {
                        // Invalid sequence; pass the lead byte through
                        // on its own
                        return Some(1);
                    }
                }
                need
            }
            Self::Utf16 { big_endian } => {
                let unit = bytes.get(..2)?;
                let high = if *big_endian { unit[0] } else { unit[1] };
                if (0xd8..=0xdb).contains(&high) {
                    4
                } else {
                    2
                }
            }
            Self::DoubleByte => {
                if lead < 0x80 {
                    1
                } else {
                    2
                }
            }
            Self::ShiftJis => match lead {
                0x00..=0x7f | 0xa1..=0xdf => 1,
                _ => 2,
            },
            Self::EucJp => match lead {
                0x00..=0x7f => 1,
                0x8f => 3,
                _ => 2,
            },
            Self::Gb18030 => {
                if lead < 0x80 {
                    1
                } else {
                    match bytes.get(1)? {
                        0x30..=0x39 => 4,
                        _ => 2,
                    }
                }
            }
        };
        if bytes.len() >= need {
            Some(need)
        } else {
            None
        }
    }
}

/// Splits bytes in a given charset into [Character]s.
///
/// Bytes arrive through [CharacterStream::write] and are split into
/// characters as soon as each character is complete; an incomplete
/// trailing sequence is held back until more bytes arrive or
/// [CharacterStream::finish] is called.
#[derive(Clone, Debug)]
pub struct CharacterStream {
    charset: String,
    reader: CharacterReader,
    pending: Vec<u8>,
    chars: VecDeque<Character>,
}

impl CharacterStream {
    pub fn new(charset: &str) -> Result<Self> {
        Ok(Self {
            charset: charset.to_string(),
            reader: CharacterReader::for_charset(charset)?,
            pending: vec![],
            chars: VecDeque::new(),
        })
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Switch to a different charset.  Any content that has not yet
    /// been read is discarded, as its boundaries were computed for the
    /// old charset.
    pub fn set_character_set(&mut self, charset: &str) -> Result<()> {
        self.reader = CharacterReader::for_charset(charset)?;
        self.charset = charset.to_string();
        self.flush_contents();
        Ok(())
    }

    pub fn flush_contents(&mut self) {
        self.pending.clear();
        self.chars.clear();
    }

    /// Replace the contents with `s`
    pub fn import_string(&mut self, s: &str) {
        self.import_bytes(s.as_bytes());
    }

    /// Replace the contents with `bytes`
    pub fn import_bytes(&mut self, bytes: &[u8]) {
        self.flush_contents();
        self.write(bytes);
        self.finish();
    }

    /// Replace the contents with everything that can be read from `stream`
    pub fn import_byte_stream(&mut self, stream: &mut dyn OutputByteStream) -> Result<()> {
        self.flush_contents();
        while let Some(bytes) = stream.read(8192)? {
            self.write(&bytes);
        }
        self.finish();
        Ok(())
    }

    /// Append bytes to the stream
    pub fn write(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let mut start = 0;
        while let Some(len) = self.reader.char_len(&self.pending[start..]) {
            self.chars
                .push_back(Character(self.pending[start..start + len].to_vec()));
            start += len;
        }
        self.pending.drain(..start);
    }

    /// Signal that no more bytes are coming.  Any incomplete
    /// trailing sequence is released as individual bytes.
    pub fn finish(&mut self) {
        for b in self.pending.drain(..) {
            self.chars.push_back(Character(vec![b]));
        }
    }

    /// Read up to `length` complete characters.  Returns `None` when
    /// there are no complete characters available.
    pub fn read(&mut self, length: usize) -> Option<Vec<Character>> {
        if self.chars.is_empty() || length == 0 {
            return None;
        }
        let n = length.min(self.chars.len());
        Some(self.chars.drain(..n).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn split(charset: &str, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut stream = CharacterStream::new(charset).unwrap();
        stream.import_bytes(bytes);
        let mut result = vec![];
        while let Some(chars) = stream.read(3) {
            result.extend(chars.into_iter().map(|c| c.as_bytes().to_vec()));
        }
        result
    }

    #[test]
    fn utf8_boundaries() {
        k9::assert_equal!(
            split("utf-8", "aé€😀".as_bytes()),
            vec![
                b"a".to_vec(),
                "é".as_bytes().to_vec(),
                "€".as_bytes().to_vec(),
                "😀".as_bytes().to_vec()
            ]
        );
    }

    #[test]
    fn utf8_invalid_sequence() {
        k9::assert_equal!(
            split("UTF-8", b"\xe2a\xff"),
            vec![b"\xe2".to_vec(), b"a".to_vec(), b"\xff".to_vec()]
        );
    }

    #[test]
    fn incomplete_sequence_is_held() {
        let euro = "€".as_bytes();
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.write(b"x");
        stream.write(&euro[..1]);
        k9::assert_equal!(stream.read(10), Some(vec![Character(b"x".to_vec())]));
        k9::assert_equal!(stream.read(10), None);
        stream.write(&euro[1..]);
        k9::assert_equal!(stream.read(10), Some(vec![Character(euro.to_vec())]));
    }

    #[test]
    fn finish_releases_tail() {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.write(b"\xe2\x82");
        k9::assert_equal!(stream.read(10), None);
        stream.finish();
        k9::assert_equal!(
            stream.read(10),
            Some(vec![Character(vec![0xe2]), Character(vec![0x82])])
        );
    }

    #[test]
    fn other_charsets() {
        k9::assert_equal!(
            split("iso-8859-1", b"a\xe9"),
            vec![b"a".to_vec(), b"\xe9".to_vec()]
        );
        k9::assert_equal!(
            split("utf-16le", b"a\x00\x3d\xd8\x00\xde"),
            vec![b"a\x00".to_vec(), b"\x3d\xd8\x00\xde".to_vec()]
        );
        k9::assert_equal!(
            split("shift_jis", b"a\xb1\x82\xa0"),
            vec![b"a".to_vec(), b"\xb1".to_vec(), b"\x82\xa0".to_vec()]
        );
        k9::assert_equal!(
            split("ucs-4", b"\x00\x00\x00a"),
            vec![b"\x00\x00\x00a".to_vec()]
        );
    }

    #[test]
    fn unknown_charset() {
        assert!(matches!(
            CharacterStream::new("x-no-such-thing"),
            Err(EncodingError::UnsupportedCharset(name)) if name == "x-no-such-thing"
        ));
    }

    #[test]
    fn import_replaces_contents() {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.import_string("abc");
        stream.import_string("d");
        k9::assert_equal!(stream.read(10), Some(vec![Character(b"d".to_vec())]));
        k9::assert_equal!(stream.read(10), None);
    }

    #[test]
    fn import_byte_stream_joins_reads() {
        // the é straddles the boundary of the first read
        let text = format!("{}é tail ü€", "a".repeat(8191));
        let mut source = bytestream::ArrayByteStream::from_bytes(text.as_bytes());
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.import_string("stale");
        stream.import_byte_stream(&mut source).unwrap();

        let mut chars = vec![];
        while let Some(batch) = stream.read(1000) {
            chars.extend(batch);
        }
        k9::assert_equal!(chars.len(), text.chars().count());
        k9::assert_equal!(chars[8191].as_bytes(), "é".as_bytes());
        k9::assert_equal!(
            chars.iter().flat_map(|c| c.as_bytes().to_vec()).collect::<Vec<u8>>(),
            text.as_bytes().to_vec()
        );
    }
}
