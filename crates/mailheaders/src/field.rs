use crate::fold::{encodable_word_tokens, fold};
use crate::grammar::{
    is_addr_spec, is_mime_token, is_msg_id, is_phrase, is_quotable, needs_encoding, quote_string,
};
use crate::{HeaderConfig, HeaderEncoding, HeaderError, Result};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use mailencoding::{CharacterStream, Encoder, Rfc2231Encoder};
use std::cell::OnceCell;

/// An address with an optional display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub address: String,
    pub name: Option<String>,
}

impl Mailbox {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn named(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
        }
    }
}

impl From<&str> for Mailbox {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Mailbox {
    fn from(address: String) -> Self {
        Self::new(address)
    }
}

/// `(address, name)`
impl<A: Into<String>, N: Into<String>> From<(A, N)> for Mailbox {
    fn from((address, name): (A, N)) -> Self {
        Self::named(address, name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Text,
    Date,
    Mailbox,
    Id,
    Path,
    Parameterized,
    Raw,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// Unstructured text
    Text(String),
    Date(DateTime<FixedOffset>),
    /// address -> optional display name
    Mailboxes(IndexMap<String, Option<String>>),
    /// Message identifiers, without angle brackets
    Ids(Vec<String>),
    /// A return path; `None` is the null path
    Path(Option<String>),
    Parameterized {
        value: String,
        parameters: IndexMap<String, String>,
    },
    /// Emitted exactly as given.  Must already be folded.
    Raw(String),
}

impl HeaderValue {
    pub fn kind(&self) -> HeaderKind {
        match self {
            Self::Text(_) => HeaderKind::Text,
            Self::Date(_) => HeaderKind::Date,
            Self::Mailboxes(_) => HeaderKind::Mailbox,
            Self::Ids(_) => HeaderKind::Id,
            Self::Path(_) => HeaderKind::Path,
            Self::Parameterized { .. } => HeaderKind::Parameterized,
            Self::Raw(_) => HeaderKind::Raw,
        }
    }

    fn validate(&self, header: &str) -> Result<()> {
        match self {
            Self::Mailboxes(map) => {
                for address in map.keys() {
                    if !is_addr_spec(address) {
                        return Err(HeaderError::compliance(
                            header,
                            format!("address '{address}' is not a valid addr-spec"),
                        ));
                    }
                }
            }
            Self::Ids(ids) => {
                for id in ids {
                    if !id.contains('@') {
                        return Err(HeaderError::compliance(
                            header,
                            format!("id '{id}' is missing an '@'"),
                        ));
                    }
                    if !is_msg_id(id) {
                        return Err(HeaderError::compliance(
                            header,
                            format!("id '{id}' is not a valid msg-id"),
                        ));
                    }
                }
            }
            Self::Path(Some(address)) => {
                if !is_addr_spec(address) {
                    return Err(HeaderError::compliance(
                        header,
                        format!("address '{address}' is not a valid addr-spec"),
                    ));
                }
            }
            Self::Parameterized { parameters, .. } => {
                for name in parameters.keys() {
                    if !is_mime_token(name) {
                        return Err(HeaderError::compliance(
                            header,
                            format!("parameter name '{name}' is not a valid token"),
                        ));
                    }
                }
            }
            Self::Text(_) | Self::Date(_) | Self::Path(None) | Self::Raw(_) => {}
        }
        Ok(())
    }
}

/// A single header field.
///
/// The rendered body is computed on demand and cached; every
/// mutator discards the cached copy.
#[derive(Debug, Clone)]
pub struct HeaderField {
    name: String,
    value: HeaderValue,
    charset: String,
    language: Option<String>,
    max_line_length: usize,
    encoding: HeaderEncoding,
    rfc2231_parameters: bool,
    body: OnceCell<String>,
}

impl HeaderField {
    /// Create a field, validating both the name and the value
    pub fn new(name: &str, value: HeaderValue, config: &HeaderConfig) -> Result<Self> {
        if name.is_empty() || !name.bytes().all(|b| matches!(b, 0x21..=0x39 | 0x3b..=0x7e)) {
            return Err(HeaderError::compliance(name, "invalid header name"));
        }
        CharacterStream::new(&config.charset)?;
        value.validate(name)?;
        Ok(Self {
            name: name.to_string(),
            value,
            charset: config.charset.clone(),
            language: config.language.clone(),
            max_line_length: config.max_line_length,
            encoding: config.encoding,
            rfc2231_parameters: config.rfc2231_parameters,
            body: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> HeaderKind {
        self.value.kind()
    }

    pub fn value(&self) -> &HeaderValue {
        &self.value
    }

    /// Replace the value.  The new value must be of the same kind.
    pub fn set_value(&mut self, value: HeaderValue) -> Result<()> {
        self.check_kind(value.kind())?;
        value.validate(&self.name)?;
        self.value = value;
        self.body.take();
        Ok(())
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn set_charset(&mut self, charset: &str) -> Result<()> {
        CharacterStream::new(charset)?;
        self.charset = charset.to_string();
        self.body.take();
        Ok(())
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, language: Option<&str>) {
        self.language = language.map(|s| s.to_string());
        self.body.take();
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    pub fn set_max_line_length(&mut self, max_line_length: usize) {
        self.max_line_length = max_line_length;
        self.body.take();
    }

    pub fn set_encoding(&mut self, encoding: HeaderEncoding) {
        self.encoding = encoding;
        self.body.take();
    }

    /// Enable or disable RFC 2231 encoding of parameter values
    pub fn set_rfc2231_parameters(&mut self, enable: bool) {
        self.rfc2231_parameters = enable;
        self.body.take();
    }

    fn check_kind(&self, expected: HeaderKind) -> Result<()> {
        let actual = self.kind();
        if actual == expected {
            Ok(())
        } else {
            Err(HeaderError::WrongKind {
                header: self.name.clone(),
                actual,
                expected,
            })
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.value {
            HeaderValue::Text(text) | HeaderValue::Raw(text) => Some(text),
            HeaderValue::Parameterized { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        match &self.value {
            HeaderValue::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn ids(&self) -> Option<&[String]> {
        match &self.value {
            HeaderValue::Ids(ids) => Some(ids),
            _ => None,
        }
    }

    /// The address of a path header.  `Some(None)` is the null path.
    pub fn path(&self) -> Option<Option<&str>> {
        match &self.value {
            HeaderValue::Path(path) => Some(path.as_deref()),
            _ => None,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        match &self.value {
            HeaderValue::Parameterized { parameters, .. } => {
                parameters.get(name).map(|s| s.as_str())
            }
            _ => None,
        }
    }

    /// Set (or replace) a parameter of a parameterized header
    pub fn set_parameter(&mut self, name: &str, value: &str) -> Result<()> {
        self.check_kind(HeaderKind::Parameterized)?;
        if !is_mime_token(name) {
            return Err(HeaderError::compliance(
                &self.name,
                format!("parameter name '{name}' is not a valid token"),
            ));
        }
        if let HeaderValue::Parameterized { parameters, .. } = &mut self.value {
            parameters.insert(name.to_string(), value.to_string());
        }
        self.body.take();
        Ok(())
    }

    /// The mailboxes of a mailbox header, in order
    pub fn name_addresses(&self) -> Option<Vec<Mailbox>> {
        match &self.value {
            HeaderValue::Mailboxes(map) => Some(
                map.iter()
                    .map(|(address, name)| Mailbox {
                        address: address.clone(),
                        name: name.clone(),
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn addresses(&self) -> Option<Vec<&str>> {
        match &self.value {
            HeaderValue::Mailboxes(map) => Some(map.keys().map(|s| s.as_str()).collect()),
            _ => None,
        }
    }

    /// Remove the given addresses from a mailbox header
    pub fn remove_addresses(&mut self, addresses: &[&str]) -> Result<()> {
        self.check_kind(HeaderKind::Mailbox)?;
        if let HeaderValue::Mailboxes(map) = &mut self.value {
            for address in addresses {
                map.shift_remove(*address);
            }
        }
        self.body.take();
        Ok(())
    }

    /// The field body: everything after `name: `, not yet folded
    pub fn body(&self) -> Result<&str> {
        if let Some(body) = self.body.get() {
            return Ok(body);
        }
        let body = self.render_body()?;
        Ok(self.body.get_or_init(|| body))
    }

    /// The complete folded field, terminated by CRLF
    pub fn to_header_string(&self) -> Result<String> {
        let body = self.body()?;
        if let HeaderValue::Raw(_) = &self.value {
            let mut result = format!("{}: {body}", self.name);
            if !result.ends_with("\r\n") {
                result.push_str("\r\n");
            }
            return Ok(result);
        }
        Ok(fold(&self.name, body, self.max_line_length))
    }

    fn render_body(&self) -> Result<String> {
        match &self.value {
            HeaderValue::Text(text) => self.encode_words(text, self.name.len() + 2),
            HeaderValue::Date(date) => Ok(date.to_rfc2822()),
            HeaderValue::Mailboxes(map) => {
                let mut entries = vec![];
                for (address, name) in map {
                    match name.as_deref() {
                        Some(name) if !name.is_empty() => {
                            let used = if entries.is_empty() {
                                self.name.len() + 2
                            } else {
                                0
                            };
                            entries.push(format!("{} <{address}>", self.phrase(name, used)?));
                        }
                        _ => entries.push(address.clone()),
                    }
                }
                Ok(entries.join(", "))
            }
            HeaderValue::Ids(ids) => Ok(ids
                .iter()
                .map(|id| format!("<{id}>"))
                .collect::<Vec<_>>()
                .join(" ")),
            HeaderValue::Path(Some(address)) => Ok(format!("<{address}>")),
            HeaderValue::Path(None) => Ok("<>".to_string()),
            HeaderValue::Parameterized { value, parameters } => {
                let mut body = self.encode_words(value, self.name.len() + 2)?;
                for (name, value) in parameters {
                    if value.is_empty() {
                        continue;
                    }
                    body.push_str("; ");
                    body.push_str(&self.render_parameter(name, value)?);
                }
                Ok(body)
            }
            HeaderValue::Raw(raw) => Ok(raw.clone()),
        }
    }

    fn encoded_word(&self, text: &str, first_line_offset: usize) -> Result<String> {
        Ok(self.encoding.encoder().encoded_words(
            text.as_bytes(),
            &self.charset,
            self.language.as_deref(),
            first_line_offset,
        )?)
    }

    /// Encode the words of `input` that cannot be represented
    /// literally.  `used` is the number of columns already in use on
    /// the line where `input` begins.
    fn encode_words(&self, input: &str, used: usize) -> Result<String> {
        let mut value = String::new();
        for token in encodable_word_tokens(input) {
            if !needs_encoding(token) {
                value.push_str(token);
                continue;
            }
            let mut token = token;
            if let Some(c) = token.chars().next().filter(|c| *c == ' ' || *c == '\t') {
                value.push(c);
                token = &token[1..];
            }
            let offset = match value.rfind("\r\n") {
                Some(pos) => value.len() - (pos + 2),
                None => used + value.len(),
            };
            value.push_str(&self.encoded_word(token, offset)?);
        }
        Ok(value)
    }

    /// Render a display name: as-is when it is a valid phrase, quoted
    /// when it is plain ASCII, otherwise as encoded-words
    fn phrase(&self, name: &str, used: usize) -> Result<String> {
        if is_phrase(name) {
            Ok(name.to_string())
        } else if is_quotable(name) {
            Ok(quote_string(name))
        } else {
            self.encode_words(name, used)
        }
    }

    fn render_parameter(&self, name: &str, value: &str) -> Result<String> {
        // Room for the name, index, "=", quotes and ";"
        let max_value_len = self
            .max_line_length
            .saturating_sub(name.len() + "=*N\"\";".len() + 1);
        let plain = is_mime_token(value) || is_quotable(value);

        if plain && value.len() <= max_value_len {
            return Ok(if is_mime_token(value) {
                format!("{name}={value}")
            } else {
                format!("{name}={}", quote_string(value))
            });
        }

        if !self.rfc2231_parameters {
            return Ok(format!("{name}=\"{}\"", self.encoded_word(value, 0)?));
        }

        let charset_lang = format!(
            "{}'{}'",
            self.charset,
            self.language.as_deref().unwrap_or("")
        );
        let max_value_len = self
            .max_line_length
            .saturating_sub(name.len() + "*N*=;".len() + 1);
        let encoded = Rfc2231Encoder::new(&self.charset)?.encode(
            value.as_bytes(),
            charset_lang.len(),
            max_value_len.max(charset_lang.len() + 12),
        );
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        if lines.len() == 1 {
            return Ok(format!("{name}*={charset_lang}{encoded}"));
        }
        Ok(lines
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                if idx == 0 {
                    format!("{name}*0*={charset_lang}{line}")
                } else {
                    format!("{name}*{idx}*={line}")
                }
            })
            .collect::<Vec<_>>()
            .join(";\r\n "))
    }
}
