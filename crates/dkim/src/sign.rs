use base64::engine::general_purpose;
use base64::Engine;
use bytestream::{InputByteStream, StreamError};
use ed25519_dalek::Signer as _;
use mailheaders::{HeaderField, HeaderSet};
use rsa::Pkcs1v15Sign;
use sha1::Sha1;
use sha2::Sha256;

use crate::canonicalization::BodyCanonicalizer;
use crate::hash::{HashImpl, LimitHasher};
use crate::header::DKIMHeaderBuilder;
use crate::{canonicalization, hash, DKIMError, DkimPrivateKey, HEADER};

/// Builder for the Signer
pub struct SignerBuilder {
    signed_headers: Option<Vec<String>>,
    ignored_headers: Vec<String>,
    private_key: Option<DkimPrivateKey>,
    hash_algo: Option<hash::HashAlgo>,
    selector: Option<String>,
    signing_domain: Option<String>,
    identity: Option<String>,
    time: Option<chrono::DateTime<chrono::offset::Utc>>,
    header_canonicalization: canonicalization::Type,
    body_canonicalization: canonicalization::Type,
    expiry: Option<chrono::Duration>,
    over_sign: bool,
    body_length: bool,
    max_body_length: Option<usize>,
    debug_headers: bool,
}

impl SignerBuilder {
    /// New builder
    pub fn new() -> Self {
        Self {
            signed_headers: None,
            ignored_headers: vec!["return-path".to_string()],
            private_key: None,
            hash_algo: None,
            selector: None,
            signing_domain: None,
            identity: None,
            expiry: None,
            time: None,
            over_sign: false,
            body_length: false,
            max_body_length: None,
            debug_headers: false,

            header_canonicalization: canonicalization::Type::Simple,
            body_canonicalization: canonicalization::Type::Simple,
        }
    }

    /// Restrict signing to the named headers.
    /// The From: header is required.
    /// When not specified, every header that is not ignored is signed.
    pub fn with_signed_headers(
        mut self,
        headers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, DKIMError> {
        let headers: Vec<String> = headers
            .into_iter()
            .map(|h| h.into().to_lowercase())
            .collect();

        if !headers.iter().any(|h| h.eq_ignore_ascii_case("from")) {
            return Err(DKIMError::BuilderError("missing From in signed headers"));
        }

        self.signed_headers = Some(headers);
        Ok(self)
    }

    /// Never sign the named header.  `Return-Path` is always ignored.
    pub fn ignore_header(mut self, name: impl Into<String>) -> Self {
        self.ignored_headers.push(name.into().to_lowercase());
        self
    }

    /// Specify the private key used to sign the email
    pub fn with_private_key(mut self, key: DkimPrivateKey) -> Self {
        self.private_key = Some(key);
        self
    }

    /// Specify the signing algorithm.  The default is derived from
    /// the key: rsa-sha256 for RSA keys and ed25519-sha256 for
    /// ed25519 keys.
    pub fn with_hash_algo(mut self, algo: hash::HashAlgo) -> Self {
        self.hash_algo = Some(algo);
        self
    }

    /// Specify the selector under which the public key is published
    pub fn with_selector(mut self, value: impl Into<String>) -> Self {
        self.selector = Some(value.into());
        self
    }

    /// Specify for which domain the email should be signed for
    pub fn with_signing_domain(mut self, value: impl Into<String>) -> Self {
        self.signing_domain = Some(value.into());
        self
    }

    /// Specify the agent or user identifier (`i=`); it must be in
    /// the signing domain or one of its subdomains
    pub fn with_identity(mut self, value: impl Into<String>) -> Self {
        self.identity = Some(value.into());
        self
    }

    /// Specify the header canonicalization
    pub fn with_header_canonicalization(mut self, value: canonicalization::Type) -> Self {
        self.header_canonicalization = value;
        self
    }

    /// Specify the body canonicalization
    pub fn with_body_canonicalization(mut self, value: canonicalization::Type) -> Self {
        self.body_canonicalization = value;
        self
    }

    /// Specify current time. Mostly used for testing
    pub fn with_time(mut self, value: chrono::DateTime<chrono::offset::Utc>) -> Self {
        self.time = Some(value);
        self
    }

    /// Specify a expiry duration for the signature validity
    pub fn with_expiry(mut self, value: chrono::Duration) -> Self {
        self.expiry = Some(value);
        self
    }

    /// List every signed header name once more than it occurs, so
    /// that additional instances added in transit break the signature
    pub fn with_over_signing(mut self, value: bool) -> Self {
        self.over_sign = value;
        self
    }

    /// Include the number of signed body bytes as `l=`
    pub fn with_body_length(mut self, value: bool) -> Self {
        self.body_length = value;
        self
    }

    /// Sign at most `limit` bytes of canonicalized body.  Implies
    /// `with_body_length(true)`.
    pub fn with_max_body_length(mut self, limit: usize) -> Self {
        self.max_body_length = Some(limit);
        self.body_length = true;
        self
    }

    /// Include copies of the signed headers as `z=`
    pub fn with_debug_headers(mut self, value: bool) -> Self {
        self.debug_headers = value;
        self
    }

    /// Build an instance of the Signer
    /// Must be provided: private_key, selector and signing_domain.
    pub fn build(self) -> Result<Signer, DKIMError> {
        use DKIMError::BuilderError;

        let private_key = self
            .private_key
            .ok_or(BuilderError("missing required private key"))?;
        let hash_algo = match (&private_key, self.hash_algo) {
            (DkimPrivateKey::Rsa(_), None) => hash::HashAlgo::RsaSha256,
            (DkimPrivateKey::Ed25519(_), None) => hash::HashAlgo::Ed25519Sha256,
            (
                DkimPrivateKey::Rsa(_),
                Some(algo @ (hash::HashAlgo::RsaSha1 | hash::HashAlgo::RsaSha256)),
            ) => algo,
            (DkimPrivateKey::Ed25519(_), Some(algo @ hash::HashAlgo::Ed25519Sha256)) => algo,
            (_, Some(algo)) => {
                return Err(DKIMError::UnsupportedHashAlgorithm(format!(
                    "{} cannot be used with this key type",
                    algo.algo_name()
                )))
            }
        };
        let signing_domain = self
            .signing_domain
            .ok_or(BuilderError("missing required signing domain"))?;

        if let Some(identity) = &self.identity {
            let domain = identity.rsplit_once('@').map(|(_, d)| d).unwrap_or(identity);
            let domain = domain.to_ascii_lowercase();
            let sdid = signing_domain.to_ascii_lowercase();
            if domain != sdid && !domain.ends_with(&format!(".{sdid}")) {
                return Err(BuilderError(
                    "identity must be in the signing domain or a subdomain of it",
                ));
            }
        }

        Ok(Signer {
            signed_headers: self.signed_headers,
            ignored_headers: self.ignored_headers,
            private_key,
            selector: self
                .selector
                .ok_or(BuilderError("missing required selector"))?,
            signing_domain,
            identity: self.identity,
            header_canonicalization: self.header_canonicalization,
            body_canonicalization: self.body_canonicalization,
            expiry: self.expiry,
            hash_algo,
            time: self.time,
            over_sign: self.over_sign,
            body_length: self.body_length,
            max_body_length: self.max_body_length,
            debug_headers: self.debug_headers,
            state: State::Idle,
            header_buffer: vec![],
            signed_names: vec![],
            copied_headers: vec![],
        })
    }
}

impl Default for SignerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

enum State {
    Idle,
    HeadersCollected,
    Body {
        canonicalizer: BodyCanonicalizer,
        hasher: LimitHasher,
        writes: u64,
    },
    BodyHashed {
        body_hash: String,
        length: usize,
    },
    Signed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::HeadersCollected => "headers-collected",
            Self::Body { .. } => "body-streaming",
            Self::BodyHashed { .. } => "body-hashed",
            Self::Signed => "signed",
        }
    }
}

/// DKIM signer. Use the [SignerBuilder] to build an instance.
///
/// Signing a message is a sequence of calls:
/// [Signer::set_headers], [Signer::start_body], any number of
/// body writes, [Signer::end_body] and finally
/// [Signer::add_signature].  [Signer::reset] prepares the signer for
/// the next message.  The body may be written directly, or the signer
/// may be bound as a mirror of the stream that the body is written to.
pub struct Signer {
    signed_headers: Option<Vec<String>>,
    ignored_headers: Vec<String>,
    private_key: DkimPrivateKey,
    selector: String,
    signing_domain: String,
    identity: Option<String>,
    header_canonicalization: canonicalization::Type,
    body_canonicalization: canonicalization::Type,
    expiry: Option<chrono::Duration>,
    hash_algo: hash::HashAlgo,
    time: Option<chrono::DateTime<chrono::offset::Utc>>,
    over_sign: bool,
    body_length: bool,
    max_body_length: Option<usize>,
    debug_headers: bool,

    state: State,
    header_buffer: Vec<u8>,
    signed_names: Vec<String>,
    copied_headers: Vec<String>,
}

impl Signer {
    pub fn hash_algo(&self) -> hash::HashAlgo {
        self.hash_algo
    }

    /// Discard all per-message state
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.header_buffer.clear();
        self.signed_names.clear();
        self.copied_headers.clear();
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignored_headers
            .iter()
            .any(|n| n.eq_ignore_ascii_case(name))
    }

    /// Canonicalize the headers that are to be signed.
    ///
    /// Signers wishing to sign multiple instances of such a header
    /// field MUST include the header field name multiple times in the
    /// "h=" tag of the DKIM-Signature header field and MUST sign such
    /// header fields in order from the bottom of the header field
    /// block to the top.  (RFC 6376 section 5.4.2)
    pub fn set_headers<H: HeaderSet + ?Sized>(&mut self, headers: &H) -> Result<(), DKIMError> {
        if !matches!(self.state, State::Idle) {
            return Err(DKIMError::InvalidState("set_headers"));
        }

        let names: Vec<String> = match &self.signed_headers {
            Some(names) => {
                let mut unique: Vec<String> = vec![];
                for name in names {
                    if !unique.contains(name) {
                        unique.push(name.clone());
                    }
                }
                unique
            }
            None => headers.list_all().into_iter().map(|n| n.to_lowercase()).collect(),
        };

        let mut signed_names = vec![];
        for name in names {
            if self.is_ignored(&name) {
                continue;
            }
            let mut signed_any = false;
            for field in headers.get_all(&name).iter().rev() {
                if field.body()?.trim().is_empty() {
                    continue;
                }
                self.canonicalize_field(field)?;
                signed_names.push(name.clone());
                signed_any = true;
            }
            if signed_any && self.over_sign {
                signed_names.push(name);
            }
        }

        tracing::debug!(
            "headers to hash: {:?}",
            String::from_utf8_lossy(&self.header_buffer)
        );
        self.signed_names = signed_names;
        self.state = State::HeadersCollected;
        Ok(())
    }

    fn canonicalize_field(&mut self, field: &HeaderField) -> Result<(), DKIMError> {
        let rendered = field.to_header_string()?;
        let value = rendered
            .strip_prefix(field.name())
            .and_then(|r| r.strip_prefix(": "))
            .and_then(|r| r.strip_suffix("\r\n"))
            .ok_or_else(|| {
                DKIMError::HeaderSerializeError(format!(
                    "unexpected rendering of {} header",
                    field.name()
                ))
            })?;
        self.header_canonicalization
            .canon_header_into(field.name(), value.as_bytes(), &mut self.header_buffer);
        if self.debug_headers {
            let unfolded = value.replace("\r\n", "");
            self.copied_headers
                .push(format!("{}:{}", field.name(), dkim_quoted_printable(&unfolded)));
        }
        Ok(())
    }

    /// Begin hashing the body
    pub fn start_body(&mut self) -> Result<(), DKIMError> {
        if !matches!(self.state, State::HeadersCollected) {
            return Err(DKIMError::InvalidState("start_body"));
        }
        self.state = State::Body {
            canonicalizer: BodyCanonicalizer::new(self.body_canonicalization),
            hasher: LimitHasher::new(self.hash_algo, self.max_body_length),
            writes: 0,
        };
        Ok(())
    }

    /// Feed body bytes, as they will appear on the wire
    pub fn write_body(&mut self, bytes: &[u8]) -> Result<u64, DKIMError> {
        match &mut self.state {
            State::Body {
                canonicalizer,
                hasher,
                writes,
            } => {
                canonicalizer.update(bytes, hasher);
                *writes += 1;
                Ok(*writes)
            }
            _ => Err(DKIMError::InvalidState("write_body")),
        }
    }

    /// Complete the body and compute its hash
    pub fn end_body(&mut self) -> Result<(), DKIMError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Body {
                canonicalizer,
                mut hasher,
                ..
            } => {
                canonicalizer.finish(&mut hasher);
                let length = hasher.hashed;
                let body_hash = hasher.finalize();
                tracing::debug!("body_hash {body_hash:?} over {length} bytes");
                self.state = State::BodyHashed { body_hash, length };
                Ok(())
            }
            other => {
                self.state = other;
                Err(DKIMError::InvalidState("end_body"))
            }
        }
    }

    /// The body hash, available once [Signer::end_body] has been called
    pub fn body_hash(&self) -> Option<&str> {
        match &self.state {
            State::BodyHashed { body_hash, .. } => Some(body_hash),
            _ => None,
        }
    }

    fn dkim_header_builder(
        &self,
        body_hash: &str,
        length: usize,
    ) -> Result<DKIMHeaderBuilder, DKIMError> {
        let now = chrono::offset::Utc::now();

        let mut builder = DKIMHeaderBuilder::new()
            .add_tag("v", "1")
            .add_tag("a", self.hash_algo.algo_name())
            .add_tag("bh", body_hash)
            .add_tag("d", &self.signing_domain)
            .set_signed_headers(&self.signed_names);
        if let Some(identity) = &self.identity {
            builder = builder.add_tag("i", identity);
        }
        builder = builder
            .add_tag("s", &self.selector)
            .set_time(self.time.unwrap_or(now));
        if let Some(expiry) = self.expiry {
            builder = builder.set_expiry(expiry)?;
        }
        builder = builder.add_tag(
            "c",
            &format!(
                "{}/{}",
                self.header_canonicalization.canon_name(),
                self.body_canonicalization.canon_name()
            ),
        );
        if self.body_length {
            builder = builder.add_tag("l", &length.to_string());
        }
        if self.debug_headers && !self.copied_headers.is_empty() {
            builder = builder.add_tag("z", &self.copied_headers.join("|"));
        }

        Ok(builder)
    }

    fn sign_hash(&self, header_hash: &[u8]) -> Result<Vec<u8>, DKIMError> {
        Ok(match &self.private_key {
            DkimPrivateKey::Rsa(private_key) => private_key
                .sign(
                    match &self.hash_algo {
                        hash::HashAlgo::RsaSha1 => Pkcs1v15Sign::new::<Sha1>(),
                        hash::HashAlgo::RsaSha256 => Pkcs1v15Sign::new::<Sha256>(),
                        hash => {
                            return Err(DKIMError::UnsupportedHashAlgorithm(format!(
                                "{:?}",
                                hash
                            )))
                        }
                    },
                    header_hash,
                )
                .map_err(|err| DKIMError::FailedToSign(err.to_string()))?,
            DkimPrivateKey::Ed25519(key) => key.sign(header_hash).to_bytes().to_vec(),
        })
    }

    /// Sign the collected headers and body hash and add the resulting
    /// DKIM-Signature header to `headers`.  Returns the value of the
    /// added header.
    /// As specified in <https://datatracker.ietf.org/doc/html/rfc6376#section-5>
    pub fn add_signature<H: HeaderSet + ?Sized>(
        &mut self,
        headers: &mut H,
    ) -> Result<String, DKIMError> {
        let (body_hash, length) = match &self.state {
            State::BodyHashed { body_hash, length } => (body_hash.clone(), *length),
            _ => return Err(DKIMError::InvalidState("add_signature")),
        };
        let dkim_header = self.dkim_header_builder(&body_hash, length)?.build();

        // For signing the DKIM-Signature header the signature needs to be
        // null, and it is hashed without its trailing CRLF
        let mut signed_data = self.header_buffer.clone();
        self.header_canonicalization.canon_header_into(
            HEADER,
            dkim_header.unsigned_value().as_bytes(),
            &mut signed_data,
        );
        signed_data.truncate(signed_data.len() - 2);

        let mut hasher = HashImpl::from_algo(self.hash_algo);
        hasher.hash(&signed_data);
        let header_hash = hasher.finalize_bytes();

        let signature = self.sign_hash(&header_hash)?;
        let value = dkim_header.signed_value(&general_purpose::STANDARD.encode(signature));
        tracing::trace!(
            "signed {} for d={} s={}",
            dkim_header.get_tag("h").unwrap_or_default(),
            self.signing_domain,
            self.selector
        );
        headers.add_raw_header(HEADER, &value)?;
        self.state = State::Signed;
        Ok(value)
    }

    /// Sign a complete message in one call: `body` is the body exactly
    /// as it will be transmitted.
    pub fn sign<H: HeaderSet + ?Sized>(
        &mut self,
        headers: &mut H,
        body: &[u8],
    ) -> Result<String, DKIMError> {
        self.reset();
        self.set_headers(headers)?;
        self.start_body()?;
        self.write_body(body)?;
        self.end_body()?;
        self.add_signature(headers)
    }
}

impl InputByteStream for Signer {
    fn write(&mut self, bytes: &[u8]) -> bytestream::Result<Option<u64>> {
        match self.write_body(bytes) {
            Ok(seq) => Ok(Some(seq)),
            Err(_) => Err(StreamError::Rejected(format!(
                "DKIM signer is in the {} state and cannot accept body data",
                self.state.name()
            ))),
        }
    }

    fn commit(&mut self) -> bytestream::Result<()> {
        Ok(())
    }

    fn flush_buffers(&mut self) -> bytestream::Result<()> {
        Ok(())
    }
}

/// DKIM-Quoted-Printable (RFC 6376 section 2.11), additionally
/// escaping `|` for use in `z=`
fn dkim_quoted_printable(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for &b in value.as_bytes() {
        match b {
            b'!'..=b':' | b'<' | b'>'..=b'{' | b'}' | b'~' => result.push(b as char),
            _ => result.push_str(&format!("={b:02X}")),
        }
    }
    result
}
