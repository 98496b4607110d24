use crate::DKIMError;
use indexmap::map::IndexMap;

pub(crate) const HEADER: &str = "DKIM-Signature";
const MAX_LINE_LENGTH: usize = 78;
const SIGNATURE_CHUNK: usize = 64;

/// The tags of a DKIM-Signature, other than `b=`, in emission order
#[derive(Debug, Clone)]
pub(crate) struct DKIMHeader {
    tags: IndexMap<String, String>,
}

impl DKIMHeader {
    pub fn get_tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(|v| v.as_str())
    }

    /// Lay out every tag followed by an empty `b=`.  The layout of
    /// this prefix does not depend upon the signature, so the signed
    /// and unsigned forms agree up to the signature value.
    fn fold_prefix(&self) -> HeaderFolder {
        let mut folder = HeaderFolder::new();
        for (name, value) in &self.tags {
            for (idx, word) in tag_words(name, value).iter().enumerate() {
                folder.push(word, idx == 0);
            }
        }
        folder.push("b=", true);
        folder
    }

    /// The folded header value with an empty signature; this is the
    /// form that is hashed
    pub fn unsigned_value(&self) -> String {
        let mut value = self.fold_prefix().value;
        value.push(';');
        value
    }

    /// The folded header value carrying `signature`
    pub fn signed_value(&self, signature: &str) -> String {
        let mut folder = self.fold_prefix();
        let chunks: Vec<&str> = signature
            .as_bytes()
            .chunks(SIGNATURE_CHUNK)
            .filter_map(|c| std::str::from_utf8(c).ok())
            .collect();
        for (idx, chunk) in chunks.iter().enumerate() {
            if idx + 1 == chunks.len() {
                folder.push(&format!("{chunk};"), false);
            } else {
                folder.push(chunk, false);
            }
        }
        if chunks.is_empty() {
            folder.value.push(';');
        }
        folder.value
    }
}

/// Break a tag into the pieces between which folding whitespace is
/// permitted
fn tag_words(name: &str, value: &str) -> Vec<String> {
    let pieces: Vec<&str> = match name {
        "h" => value.split_inclusive(':').collect(),
        "z" => value.split_inclusive('|').collect(),
        _ => vec![value],
    };
    let last = pieces.len().saturating_sub(1);
    pieces
        .iter()
        .enumerate()
        .map(|(idx, piece)| {
            let mut word = if idx == 0 {
                format!("{name}={piece}")
            } else {
                piece.to_string()
            };
            if idx == last {
                word.push(';');
            }
            word
        })
        .collect()
}

struct HeaderFolder {
    value: String,
    line_len: usize,
}

impl HeaderFolder {
    fn new() -> Self {
        Self {
            value: String::new(),
            line_len: HEADER.len() + 2,
        }
    }

    /// Append `word`, preceded by a space when `space` is set, moving
    /// to a new line first if it would not fit on this one
    fn push(&mut self, word: &str, space: bool) {
        let space = space && !self.value.is_empty();
        let needed = word.len() + usize::from(space);
        if !self.value.is_empty() && self.line_len > 1 && self.line_len + needed > MAX_LINE_LENGTH
        {
            self.value.push_str("\r\n\t");
            self.line_len = 1;
        } else if space {
            self.value.push(' ');
            self.line_len += 1;
        }
        self.value.push_str(word);
        self.line_len += word.len();
    }
}

#[derive(Clone)]
pub(crate) struct DKIMHeaderBuilder {
    header: DKIMHeader,
    time: Option<chrono::DateTime<chrono::offset::Utc>>,
}

impl DKIMHeaderBuilder {
    pub(crate) fn new() -> Self {
        DKIMHeaderBuilder {
            header: DKIMHeader {
                tags: IndexMap::new(),
            },
            time: None,
        }
    }

    pub(crate) fn add_tag(mut self, name: &str, value: &str) -> Self {
        self.header.tags.insert(name.to_owned(), value.to_owned());
        self
    }

    pub(crate) fn set_signed_headers(self, headers: &[String]) -> Self {
        let value = headers.join(":");
        self.add_tag("h", &value)
    }

    pub(crate) fn set_expiry(self, duration: chrono::Duration) -> Result<Self, DKIMError> {
        let time = self
            .time
            .ok_or(DKIMError::BuilderError("missing require time"))?;
        let expiry = (time + duration).timestamp();
        Ok(self.add_tag("x", &expiry.to_string()))
    }

    pub(crate) fn set_time(mut self, time: chrono::DateTime<chrono::offset::Utc>) -> Self {
        self.time = Some(time);
        self.add_tag("t", &time.timestamp().to_string())
    }

    pub(crate) fn build(self) -> DKIMHeader {
        self.header
    }
}
