use crate::hash::LimitHasher;
use crate::DKIMError;
use serde::Deserialize;
use std::str::FromStr;

#[derive(PartialEq, Clone, Debug, Copy, Default, Deserialize)]
pub enum Type {
    #[default]
    #[serde(alias = "simple")]
    Simple,
    #[serde(alias = "relaxed")]
    Relaxed,
}

impl Type {
    pub fn canon_name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Relaxed => "relaxed",
        }
    }

    pub(crate) fn canon_header_into(&self, key: &str, value: &[u8], out: &mut Vec<u8>) {
        match self {
            Self::Simple => canonicalize_header_simple(key, value, out),
            Self::Relaxed => canonicalize_header_relaxed(key, value, out),
        }
    }
}

impl FromStr for Type {
    type Err = DKIMError;

    fn from_str(value: &str) -> Result<Self, DKIMError> {
        match value {
            "simple" => Ok(Self::Simple),
            "relaxed" => Ok(Self::Relaxed),
            v => Err(DKIMError::UnsupportedCanonicalizationType(v.to_string())),
        }
    }
}

/// Incremental body canonicalization.
///
/// Lines are delimited by CRLF only; a bare CR or LF is ordinary
/// content.  Trailing CRLFs (and, for relaxed, whitespace) are held
/// back until content follows them, so that empty lines at the end
/// of the body can be discarded without buffering the body.
pub(crate) struct BodyCanonicalizer {
    canon: Type,
    pending_crlf: usize,
    pending_cr: bool,
    pending_wsp: bool,
    seen_content: bool,
}

impl BodyCanonicalizer {
    pub fn new(canon: Type) -> Self {
        Self {
            canon,
            pending_crlf: 0,
            pending_cr: false,
            pending_wsp: false,
            seen_content: false,
        }
    }

    pub fn update(&mut self, mut data: &[u8], hasher: &mut LimitHasher) {
        while !data.is_empty() {
            if self.pending_cr {
                self.pending_cr = false;
                if data[0] == b'\n' {
                    // https://datatracker.ietf.org/doc/html/rfc6376#section-3.4.4
                    // Ignore all whitespace at the end of lines
                    self.pending_wsp = false;
                    self.pending_crlf += 1;
                    data = &data[1..];
                    continue;
                }
                self.content(b"\r", hasher);
            }

            let special = match self.canon {
                Type::Simple => memchr::memchr(b'\r', data),
                Type::Relaxed => memchr::memchr3(b'\r', b' ', b'\t', data),
            };
            let Some(idx) = special else {
                self.content(data, hasher);
                break;
            };
            if idx > 0 {
                self.content(&data[..idx], hasher);
            }
            match data[idx] {
                b'\r' => self.pending_cr = true,
                // Reduce all sequences of WSP within a line to a single SP
                _ => self.pending_wsp = true,
            }
            data = &data[idx + 1..];
        }
    }

    fn content(&mut self, bytes: &[u8], hasher: &mut LimitHasher) {
        for _ in 0..self.pending_crlf {
            hasher.hash(b"\r\n");
        }
        self.pending_crlf = 0;
        if self.pending_wsp {
            hasher.hash(b" ");
            self.pending_wsp = false;
        }
        hasher.hash(bytes);
        self.seen_content = true;
    }

    /// Emit the final line ending.  Empty lines at the end of the
    /// body are dropped.  The simple algorithm turns an empty body
    /// into a single CRLF while relaxed leaves it empty.
    pub fn finish(mut self, hasher: &mut LimitHasher) {
        if self.pending_cr {
            self.pending_cr = false;
            self.content(b"\r", hasher);
        }
        match self.canon {
            Type::Simple => hasher.hash(b"\r\n"),
            Type::Relaxed => {
                if self.seen_content {
                    hasher.hash(b"\r\n");
                }
            }
        }
    }
}

// https://datatracker.ietf.org/doc/html/rfc6376#section-3.4.1
fn canonicalize_header_simple(key: &str, value: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
}

// https://datatracker.ietf.org/doc/html/rfc6376#section-3.4.2
fn canonicalize_header_relaxed(key: &str, value: &[u8], out: &mut Vec<u8>) {
    let key = key.to_lowercase();
    let key = key.trim_end();

    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b":");

    let value = trim_ws_start(trim_ws_end(value));
    let mut space_run = false;
    for &c in value {
        match c {
            b'\r' | b'\n' => {}
            b' ' | b'\t' => {
                if space_run {
                    continue;
                }
                space_run = true;
                out.push(b' ');
            }
            _ => {
                space_run = false;
                out.push(c);
            }
        }
    }

    out.extend_from_slice(b"\r\n");
}

fn trim_ws_start(mut line: &[u8]) -> &[u8] {
    while let Some(c) = line.first() {
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => line = &line[1..],
            _ => break,
        }
    }
    line
}

fn trim_ws_end(mut line: &[u8]) -> &[u8] {
    while let Some(c) = line.last() {
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                line = &line[0..line.len() - 1];
            }
            _ => break,
        }
    }
    line
}
