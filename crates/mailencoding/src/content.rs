//! Content transfer encoders.
//!
//! A content encoder pulls bytes from an [OutputByteStream] in fixed
//! size chunks and writes the encoded form into an [InputByteStream].
//! Any partial state is carried from one chunk to the next, so the
//! output does not depend on where the chunk boundaries fall.
use crate::encoder::{clamp_line_length, LineWrapper, QpState};
use crate::{CharacterStream, EncodingError, Result};
use bytestream::{ArrayByteStream, InputByteStream, OutputByteStream};
use data_encoding::BASE64;

const CHUNK_SIZE: usize = 8192;

pub trait ContentEncoder {
    /// The value for the Content-Transfer-Encoding header
    fn name(&self) -> &str;

    fn encode_stream(
        &self,
        output: &mut dyn OutputByteStream,
        input: &mut dyn InputByteStream,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<()>;

    fn encode_bytes(
        &self,
        data: &[u8],
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<Vec<u8>> {
        let mut output = ArrayByteStream::from_bytes(data);
        let mut input = vec![];
        self.encode_stream(&mut output, &mut input, first_line_offset, max_line_length)?;
        Ok(input)
    }

    /// Called when the charset of the content changes
    fn set_charset(&mut self, _charset: &str) -> Result<()> {
        Ok(())
    }
}

/// Resolve a Content-Transfer-Encoding name to an encoder.
/// Matching is case insensitive.
pub fn from_name(name: &str) -> Result<Box<dyn ContentEncoder>> {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "base64" => Ok(Box::new(Base64ContentEncoder)),
        "quoted-printable" => Ok(Box::new(QpContentEncoder::new("utf-8")?)),
        "7bit" | "8bit" | "binary" => Ok(Box::new(PlainContentEncoder::new(&lower, false))),
        "raw" => Ok(Box::new(RawContentEncoder)),
        _ => Err(EncodingError::UnsupportedEncoding(name.to_string())),
    }
}

/// Per-call encoding state
trait ChunkEncoder {
    fn push(&mut self, chunk: &[u8], out: &mut Vec<u8>);
    fn finish(&mut self, out: &mut Vec<u8>);
}

fn drive(
    state: &mut dyn ChunkEncoder,
    output: &mut dyn OutputByteStream,
    input: &mut dyn InputByteStream,
) -> Result<()> {
    let mut out = vec![];
    while let Some(chunk) = output.read(CHUNK_SIZE)? {
        state.push(&chunk, &mut out);
        if !out.is_empty() {
            input.write(&out)?;
            out.clear();
        }
    }
    state.finish(&mut out);
    if !out.is_empty() {
        input.write(&out)?;
    }
    Ok(())
}

#[derive(Default, Debug, Clone, Copy)]
pub struct Base64ContentEncoder;

struct Base64State {
    carry: Vec<u8>,
    wrapper: LineWrapper,
}

impl Base64ContentEncoder {
    fn state(&self, first_line_offset: usize, max_line_length: usize) -> Base64State {
        Base64State {
            carry: vec![],
            wrapper: LineWrapper::new(first_line_offset, clamp_line_length(max_line_length)),
        }
    }
}

impl ChunkEncoder for Base64State {
    fn push(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        self.carry.extend_from_slice(chunk);
        // Only whole 3 byte groups can be encoded without padding
        let whole = self.carry.len() - self.carry.len() % 3;
        if whole == 0 {
            return;
        }
        let encoded = BASE64.encode(&self.carry[..whole]);
        self.carry.drain(..whole);
        let mut wrapped = String::new();
        self.wrapper.push(&encoded, &mut wrapped);
        out.extend_from_slice(wrapped.as_bytes());
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        if self.carry.is_empty() {
            return;
        }
        let encoded = BASE64.encode(&self.carry);
        self.carry.clear();
        let mut wrapped = String::new();
        self.wrapper.push(&encoded, &mut wrapped);
        out.extend_from_slice(wrapped.as_bytes());
    }
}

impl ContentEncoder for Base64ContentEncoder {
    fn name(&self) -> &str {
        "base64"
    }

    fn encode_stream(
        &self,
        output: &mut dyn OutputByteStream,
        input: &mut dyn InputByteStream,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<()> {
        drive(
            &mut self.state(first_line_offset, max_line_length),
            output,
            input,
        )
    }
}

#[derive(Clone, Debug)]
pub struct QpContentEncoder {
    chars: CharacterStream,
    canonical: bool,
    dot_escape: bool,
}

impl QpContentEncoder {
    pub fn new(charset: &str) -> Result<Self> {
        Ok(Self {
            chars: CharacterStream::new(charset)?,
            canonical: false,
            dot_escape: false,
        })
    }

    /// Convert bare CR and bare LF to CRLF.  Appropriate for text
    /// content, but not for binary data.
    pub fn with_canonicalization(mut self, canonical: bool) -> Self {
        self.canonical = canonical;
        self
    }

    /// Encode a leading `.` on a line as `=2E`
    pub fn with_dot_escape(mut self, dot_escape: bool) -> Self {
        self.dot_escape = dot_escape;
        self
    }

    pub fn charset(&self) -> &str {
        self.chars.charset()
    }

    fn state(&self, first_line_offset: usize, max_line_length: usize) -> QpContentState {
        let mut chars = self.chars.clone();
        chars.flush_contents();
        QpContentState {
            chars,
            qp: QpState::new(
                first_line_offset,
                clamp_line_length(max_line_length),
                self.canonical,
                self.dot_escape,
            ),
        }
    }
}

struct QpContentState {
    chars: CharacterStream,
    qp: QpState,
}

impl QpContentState {
    fn drain(&mut self, out: &mut Vec<u8>) {
        let mut encoded = String::new();
        while let Some(batch) = self.chars.read(256) {
            for ch in &batch {
                self.qp.push(ch, &mut encoded);
            }
        }
        out.extend_from_slice(encoded.as_bytes());
    }
}

impl ChunkEncoder for QpContentState {
    fn push(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        self.chars.write(chunk);
        self.drain(out);
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        self.chars.finish();
        self.drain(out);
        let mut encoded = String::new();
        self.qp.finish(&mut encoded);
        out.extend_from_slice(encoded.as_bytes());
    }
}

impl ContentEncoder for QpContentEncoder {
    fn name(&self) -> &str {
        "quoted-printable"
    }

    fn encode_stream(
        &self,
        output: &mut dyn OutputByteStream,
        input: &mut dyn InputByteStream,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<()> {
        drive(
            &mut self.state(first_line_offset, max_line_length),
            output,
            input,
        )
    }

    fn set_charset(&mut self, charset: &str) -> Result<()> {
        self.chars.set_character_set(charset)
    }
}

/// 7bit, 8bit and binary content.  The bytes are not transformed,
/// other than optionally canonicalizing line endings and wrapping long
/// lines at whitespace.  A `max_line_length` of zero disables wrapping.
#[derive(Clone, Debug)]
pub struct PlainContentEncoder {
    name: String,
    canonical: bool,
}

impl PlainContentEncoder {
    pub fn new(name: &str, canonical: bool) -> Self {
        Self {
            name: name.to_string(),
            canonical,
        }
    }
}

struct PlainState {
    canonical: bool,
    max: usize,
    /// The incomplete last line
    pending: Vec<u8>,
}

impl PlainState {
    /// Returns the length of the prefix of `pending` made up of
    /// complete lines
    fn complete_len(&self) -> usize {
        let bytes = &self.pending;
        if !self.canonical {
            return memchr::memmem::rfind(bytes, b"\r\n")
                .map(|pos| pos + 2)
                .unwrap_or(0);
        }
        match memchr::memrchr2(b'\r', b'\n', bytes) {
            // A trailing CR may yet be followed by LF
            Some(pos) if bytes[pos] == b'\r' && pos + 1 == bytes.len() => {
                memchr::memrchr2(b'\r', b'\n', &bytes[..pos])
                    .map(|pos| pos + 1)
                    .unwrap_or(0)
            }
            Some(pos) => pos + 1,
            None => 0,
        }
    }

    fn wrap_line(&self, line: &[u8], out: &mut Vec<u8>) {
        if self.max == 0 {
            out.extend_from_slice(line);
            return;
        }
        let mut current = 0;
        for word in line.split_inclusive(|b| b.is_ascii_whitespace() || *b == 0x0b) {
            if current != 0 && current + word.len() > self.max {
                out.extend_from_slice(b"\r\n");
                current = 0;
            }
            out.extend_from_slice(word);
            current += word.len();
        }
    }

    /// Wrap and emit the lines in `bytes`.  Each line terminator is
    /// written as CRLF.
    fn emit_lines(&self, bytes: &[u8], out: &mut Vec<u8>) {
        let mut start = 0;
        if self.canonical {
            let mut i = 0;
            while i < bytes.len() {
                match bytes[i] {
                    b'\r' | b'\n' => {
                        self.wrap_line(&bytes[start..i], out);
                        out.extend_from_slice(b"\r\n");
                        if bytes[i] == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
                            i += 1;
                        }
                        start = i + 1;
                    }
                    _ => {}
                }
                i += 1;
            }
        } else {
            for pos in memchr::memmem::find_iter(bytes, b"\r\n") {
                self.wrap_line(&bytes[start..pos], out);
                out.extend_from_slice(b"\r\n");
                start = pos + 2;
            }
        }
        if start < bytes.len() {
            self.wrap_line(&bytes[start..], out);
        }
    }
}

impl ChunkEncoder for PlainState {
    fn push(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(chunk);
        let complete = self.complete_len();
        if complete > 0 {
            let lines: Vec<u8> = self.pending.drain(..complete).collect();
            self.emit_lines(&lines, out);
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        let rest = std::mem::take(&mut self.pending);
        self.emit_lines(&rest, out);
    }
}

impl ContentEncoder for PlainContentEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode_stream(
        &self,
        output: &mut dyn OutputByteStream,
        input: &mut dyn InputByteStream,
        _first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<()> {
        drive(
            &mut PlainState {
                canonical: self.canonical,
                max: max_line_length,
                pending: vec![],
            },
            output,
            input,
        )
    }
}

struct Passthru;

impl ChunkEncoder for Passthru {
    fn push(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        out.extend_from_slice(chunk);
    }

    fn finish(&mut self, _out: &mut Vec<u8>) {}
}

/// Passes content through unchanged under a caller supplied name.
/// Used when the content has already been encoded.
#[derive(Clone, Debug)]
pub struct NullContentEncoder {
    name: String,
}

impl NullContentEncoder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl ContentEncoder for NullContentEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode_stream(
        &self,
        output: &mut dyn OutputByteStream,
        input: &mut dyn InputByteStream,
        _first_line_offset: usize,
        _max_line_length: usize,
    ) -> Result<()> {
        drive(&mut Passthru, output, input)
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct RawContentEncoder;

impl ContentEncoder for RawContentEncoder {
    fn name(&self) -> &str {
        "raw"
    }

    fn encode_stream(
        &self,
        output: &mut dyn OutputByteStream,
        input: &mut dyn InputByteStream,
        _first_line_offset: usize,
        _max_line_length: usize,
    ) -> Result<()> {
        drive(&mut Passthru, output, input)
    }
}
