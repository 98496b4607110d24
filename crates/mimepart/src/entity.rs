use crate::{MimeError, Result};
use bytestream::{ArrayByteStream, InputByteStream, OutputByteStream, SharedInputStream};
use indexmap::IndexMap;
use mail_dkim::Signer;
use mailencoding::content::from_name;
use mailencoding::{Base64ContentEncoder, ContentEncoder, PlainContentEncoder, QpContentEncoder};
use mailheaders::grammar::is_mime_token;
use mailheaders::{HeaderConfig, HeaderSet, SimpleHeaderSet};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Body lines produced by the transfer encoders are limited to this
/// many characters, per RFC 2045
const BODY_LINE_LENGTH: usize = 76;

const HEADER_DKIM_SIGNATURE: &str = "DKIM-Signature";

/// The order in which well-known headers are rendered.  Anything not
/// listed here follows, in insertion order.
pub const CANONICAL_HEADER_ORDER: &[&str] = &[
    "Return-Path",
    "Received",
    "DKIM-Signature",
    "Sender",
    "Message-ID",
    "Date",
    "Subject",
    "From",
    "Reply-To",
    "To",
    "Cc",
    "Bcc",
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentOptions {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub inline: bool,
    #[serde(default)]
    pub content_id: Option<String>,
}

/// The unencoded content of an entity
pub enum MimeBody {
    Bytes(Vec<u8>),
    /// Content that is pulled from a stream each time the entity is
    /// serialized.  The read pointer is rewound before every pass.
    Stream(Box<dyn OutputByteStream>),
}

impl std::fmt::Debug for MimeBody {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => fmt.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => fmt.write_str("Stream"),
        }
    }
}

/// A single MIME entity.
///
/// The `Content-Type` and `Content-Transfer-Encoding` headers are
/// owned by the entity and are regenerated whenever the media type,
/// its parameters or the content encoder change.
pub struct MimeEntity {
    headers: SimpleHeaderSet,
    content_type: String,
    parameters: IndexMap<String, String>,
    body: MimeBody,
    encoder: Box<dyn ContentEncoder>,
    max_line_length: usize,
}

impl std::fmt::Debug for MimeEntity {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("MimeEntity")
            .field("headers", &self.headers)
            .field("content_type", &self.content_type)
            .field("parameters", &self.parameters)
            .field("body", &self.body)
            .field("encoding", &self.encoder.name())
            .finish()
    }
}

impl MimeEntity {
    pub fn new(
        content_type: &str,
        body: impl Into<Vec<u8>>,
        encoder: Box<dyn ContentEncoder>,
    ) -> Result<Self> {
        Self::with_config(
            content_type,
            MimeBody::Bytes(body.into()),
            encoder,
            HeaderConfig::default(),
        )
    }

    /// Construct an entity whose content is read from `stream`
    pub fn with_stream(
        content_type: &str,
        stream: Box<dyn OutputByteStream>,
        encoder: Box<dyn ContentEncoder>,
    ) -> Result<Self> {
        Self::with_config(
            content_type,
            MimeBody::Stream(stream),
            encoder,
            HeaderConfig::default(),
        )
    }

    pub fn with_config(
        content_type: &str,
        body: MimeBody,
        encoder: Box<dyn ContentEncoder>,
        config: HeaderConfig,
    ) -> Result<Self> {
        validate_media_type(content_type)?;
        let mut headers = SimpleHeaderSet::with_config(config);
        headers.define_ordering(CANONICAL_HEADER_ORDER);
        headers.add_text_header("MIME-Version", "1.0")?;

        let mut entity = Self {
            headers,
            content_type: content_type.to_ascii_lowercase(),
            parameters: IndexMap::new(),
            body,
            encoder,
            max_line_length: BODY_LINE_LENGTH,
        };
        entity.sync_headers()?;
        Ok(entity)
    }

    /// Constructs a part with textual utf8 content.
    /// The content is sent as 7bit when it needs no encoding at all,
    /// otherwise as quoted-printable, unless base64 turns out to be
    /// the smaller representation.
    pub fn new_text(content_type: &str, content: &str) -> Result<Self> {
        let encoder = text_encoder(content.as_bytes())?;
        let mut entity = Self::new(content_type, content, encoder)?;
        entity.set_parameter(
            "charset",
            if content.is_ascii() {
                "us-ascii"
            } else {
                "utf-8"
            },
        )?;
        Ok(entity)
    }

    pub fn new_text_plain(content: &str) -> Result<Self> {
        Self::new_text("text/plain", content)
    }

    pub fn new_html(content: &str) -> Result<Self> {
        Self::new_text("text/html", content)
    }

    /// Constructs a base64 encoded part, optionally described as an
    /// attachment or inline content
    pub fn new_binary(
        content_type: &str,
        content: &[u8],
        options: Option<&AttachmentOptions>,
    ) -> Result<Self> {
        let mut entity = Self::new(content_type, content, Box::new(Base64ContentEncoder))?;

        if let Some(opts) = options {
            let mut disposition = vec![];
            if let Some(name) = &opts.file_name {
                disposition.push(("filename", name.as_str()));
                entity.set_parameter("name", name)?;
            }
            entity.headers.add_parameterized_header(
                "Content-Disposition",
                if opts.inline { "inline" } else { "attachment" },
                disposition,
            )?;

            if let Some(id) = &opts.content_id {
                entity.headers.add_id_header("Content-ID", [id.as_str()])?;
            }
        }

        Ok(entity)
    }

    pub fn headers(&self) -> &SimpleHeaderSet {
        &self.headers
    }

    /// Mutable access to the headers.  `Content-Type` and
    /// `Content-Transfer-Encoding` are regenerated by the setters on
    /// this type, so changes made to them here do not persist.
    pub fn headers_mut(&mut self) -> &mut SimpleHeaderSet {
        &mut self.headers
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn set_content_type(&mut self, content_type: &str) -> Result<()> {
        validate_media_type(content_type)?;
        self.content_type = content_type.to_ascii_lowercase();
        self.sync_headers()
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    /// Set (or replace) a `Content-Type` parameter
    pub fn set_parameter(&mut self, name: &str, value: &str) -> Result<()> {
        let key = name.to_ascii_lowercase();
        let previous = self.parameters.insert(key.clone(), value.to_string());
        if let Err(err) = self.sync_headers() {
            match previous {
                Some(value) => self.parameters.insert(key, value),
                None => self.parameters.shift_remove(&key),
            };
            self.sync_headers()?;
            return Err(err);
        }
        Ok(())
    }

    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Change the charset of the content.  The encoder, the
    /// `charset` parameter and the charset used to encode header text
    /// all follow the change.
    pub fn set_charset(&mut self, charset: &str) -> Result<()> {
        self.encoder.set_charset(charset)?;
        self.headers.set_charset(charset)?;
        self.set_parameter("charset", charset)
    }

    pub fn encoding(&self) -> &str {
        self.encoder.name()
    }

    pub fn set_encoder(&mut self, encoder: Box<dyn ContentEncoder>) -> Result<()> {
        self.encoder = encoder;
        if let Some(charset) = self.parameters.get("charset") {
            self.encoder.set_charset(charset)?;
        }
        self.sync_headers()
    }

    /// Select the content encoder by its Content-Transfer-Encoding name
    pub fn set_encoding(&mut self, name: &str) -> Result<()> {
        self.set_encoder(from_name(name)?)
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    pub fn set_max_line_length(&mut self, max_line_length: usize) {
        self.max_line_length = max_line_length;
    }

    pub fn body(&self) -> &MimeBody {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = MimeBody::Bytes(body.into());
    }

    pub fn set_body_stream(&mut self, stream: Box<dyn OutputByteStream>) {
        self.body = MimeBody::Stream(stream);
    }

    fn sync_headers(&mut self) -> Result<()> {
        self.headers.remove_all("Content-Type");
        self.headers.add_parameterized_header(
            "Content-Type",
            &self.content_type,
            self.parameters
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        )?;

        self.headers.remove_all("Content-Transfer-Encoding");
        // raw content is emitted verbatim and has no transfer encoding
        // that a recipient could act upon
        let encoding = self.encoder.name();
        if !encoding.eq_ignore_ascii_case("raw") {
            self.headers
                .add_text_header("Content-Transfer-Encoding", encoding)?;
        }
        Ok(())
    }

    /// Run the body through the content encoder into `out`.
    /// A non-empty body always ends with CRLF.
    fn encode_body(&mut self, out: &mut dyn InputByteStream) -> Result<()> {
        let mut out = LineTerminator::new(out);
        match &mut self.body {
            MimeBody::Bytes(bytes) => {
                let mut source = ArrayByteStream::from_bytes(bytes.as_slice());
                self.encoder
                    .encode_stream(&mut source, &mut out, 0, self.max_line_length)?;
            }
            MimeBody::Stream(stream) => {
                stream.set_read_pointer(0)?;
                self.encoder
                    .encode_stream(stream.as_mut(), &mut out, 0, self.max_line_length)?;
            }
        }
        out.finish()?;
        Ok(())
    }

    /// The transfer encoded body, exactly as it appears on the wire
    pub fn encoded_body(&mut self) -> Result<Vec<u8>> {
        let mut out = vec![];
        self.encode_body(&mut out)?;
        Ok(out)
    }

    /// Serialize the entity: the headers, a blank line and the
    /// encoded body
    pub fn write_to(&mut self, out: &mut dyn InputByteStream) -> Result<()> {
        out.write(self.headers.to_header_string()?.as_bytes())?;
        out.write(b"\r\n")?;
        self.encode_body(out)?;
        out.commit()?;
        Ok(())
    }

    /// Convenience method wrapping write_to that returns the
    /// serialized entity
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = vec![];
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// DKIM sign the entity, returning the signed serialization.
    ///
    /// The signer observes the encoded body as a mirror of the stream
    /// that the body is encoded into, so the body is encoded exactly
    /// once.  The `DKIM-Signature` header remains in the header set
    /// afterwards, and is replaced when the entity is signed again.
    pub fn sign_with(&mut self, signer: &Rc<RefCell<Signer>>) -> Result<Vec<u8>> {
        // a signature from an earlier pass is not part of the content
        self.headers.remove_all(HEADER_DKIM_SIGNATURE);
        {
            let mut signer = signer.borrow_mut();
            signer.reset();
            signer.set_headers(&self.headers)?;
            signer.start_body()?;
        }

        let handle: SharedInputStream = signer.clone();
        let mut body = ArrayByteStream::new();
        body.bind(handle.clone());
        let encoded = self.encode_body(&mut body);
        let unbound = body.unbind(&handle);
        encoded?;
        unbound?;

        let value = {
            let mut signer = signer.borrow_mut();
            signer.end_body()?;
            signer.add_signature(&mut self.headers)?
        };
        tracing::debug!("signed {} entity: {value}", self.content_type);

        let mut out = self.headers.to_header_string()?.into_bytes();
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(body.contents());
        Ok(out)
    }
}

/// Choose between 7bit, quoted-printable and base64 for text
fn text_encoder(content: &[u8]) -> Result<Box<dyn ContentEncoder>> {
    // We'll probably use qp, so speculatively do the work
    let qp = QpContentEncoder::new("utf-8")?;
    let qp_encoded = qp.encode_bytes(content, 0, BODY_LINE_LENGTH)?;
    if qp_encoded == content {
        return Ok(Box::new(PlainContentEncoder::new("7bit", true)));
    }

    let base64_len = Base64ContentEncoder
        .encode_bytes(content, 0, BODY_LINE_LENGTH)?
        .len();
    if qp_encoded.len() <= base64_len {
        Ok(Box::new(qp))
    } else {
        // the content is dominated by non-ASCII text
        Ok(Box::new(Base64ContentEncoder))
    }
}

fn validate_media_type(content_type: &str) -> Result<()> {
    match content_type.split_once('/') {
        Some((kind, subtype)) if is_mime_token(kind) && is_mime_token(subtype) => Ok(()),
        _ => Err(MimeError::InvalidContentType(content_type.to_string())),
    }
}

/// Tracks the last bytes written so that a missing final line break
/// can be supplied
struct LineTerminator<'a> {
    inner: &'a mut dyn InputByteStream,
    tail: [u8; 2],
    written: bool,
}

impl<'a> LineTerminator<'a> {
    fn new(inner: &'a mut dyn InputByteStream) -> Self {
        Self {
            inner,
            tail: [0; 2],
            written: false,
        }
    }

    fn finish(&mut self) -> bytestream::Result<()> {
        if self.written && self.tail != *b"\r\n" {
            self.write(b"\r\n")?;
        }
        self.inner.commit()
    }
}

impl InputByteStream for LineTerminator<'_> {
    fn write(&mut self, bytes: &[u8]) -> bytestream::Result<Option<u64>> {
        match bytes {
            [] => {}
            [b] => self.tail = [self.tail[1], *b],
            [.., a, b] => self.tail = [*a, *b],
        }
        self.written |= !bytes.is_empty();
        self.inner.write(bytes)
    }

    fn commit(&mut self) -> bytestream::Result<()> {
        self.inner.commit()
    }

    fn flush_buffers(&mut self) -> bytestream::Result<()> {
        self.inner.flush_buffers()
    }
}
