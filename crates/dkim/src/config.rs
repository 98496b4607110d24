use crate::canonicalization::Type;
use crate::{DKIMError, DkimPrivateKey, HashAlgo, Signer, SignerBuilder};
use serde::Deserialize;
use std::path::PathBuf;

/// Declarative signer configuration
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SignerConfig {
    pub domain: String,
    pub selector: String,
    /// Path to the private key, in PEM or DER form
    pub key: PathBuf,
    /// Headers to sign; when empty, every header except those in
    /// `ignore_headers` is signed
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub ignore_headers: Vec<String>,
    #[serde(default = "SignerConfig::default_algorithm")]
    pub algorithm: HashAlgo,
    #[serde(default)]
    pub identity: Option<String>,
    /// Signature lifetime, in seconds
    #[serde(default)]
    pub expiration: Option<u64>,
    #[serde(default)]
    pub body_length: bool,
    #[serde(default)]
    pub max_body_length: Option<usize>,
    #[serde(default)]
    pub debug_headers: bool,
    #[serde(default)]
    pub over_sign: bool,
    #[serde(default = "SignerConfig::default_canon")]
    pub header_canonicalization: Type,
    #[serde(default = "SignerConfig::default_canon")]
    pub body_canonicalization: Type,
}

impl SignerConfig {
    fn default_algorithm() -> HashAlgo {
        HashAlgo::RsaSha256
    }

    fn default_canon() -> Type {
        Type::Relaxed
    }

    fn load_key(&self) -> Result<DkimPrivateKey, DKIMError> {
        match self.algorithm {
            HashAlgo::RsaSha1 | HashAlgo::RsaSha256 => DkimPrivateKey::rsa_key_file(&self.key),
            HashAlgo::Ed25519Sha256 => {
                let data = std::fs::read(&self.key).map_err(|err| {
                    DKIMError::PrivateKeyLoadError(format!(
                        "failed to read file {:?}: {err:#}",
                        self.key
                    ))
                })?;
                DkimPrivateKey::ed25519_key(&data)
            }
        }
    }

    /// Load the key and produce a signer
    pub fn configure(&self) -> Result<Signer, DKIMError> {
        let key = self.load_key()?;

        let mut signer = SignerBuilder::new()
            .with_private_key(key)
            .with_hash_algo(self.algorithm)
            .with_selector(&self.selector)
            .with_signing_domain(&self.domain)
            .with_over_signing(self.over_sign)
            .with_body_length(self.body_length)
            .with_debug_headers(self.debug_headers)
            .with_header_canonicalization(self.header_canonicalization)
            .with_body_canonicalization(self.body_canonicalization);
        if !self.headers.is_empty() {
            signer = signer.with_signed_headers(&self.headers)?;
        }
        for name in &self.ignore_headers {
            signer = signer.ignore_header(name);
        }
        if let Some(identity) = &self.identity {
            signer = signer.with_identity(identity);
        }
        if let Some(limit) = self.max_body_length {
            signer = signer.with_max_body_length(limit);
        }
        if let Some(exp) = self.expiration {
            let duration = i64::try_from(exp)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .ok_or(DKIMError::BuilderError("expiration is out of range"))?;
            signer = signer.with_expiry(duration);
        }

        signer.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailheaders::{HeaderSet, SimpleHeaderSet};

    #[test]
    fn minimal() {
        let config: SignerConfig = serde_json::from_str(
            r#"{"domain": "example.com", "selector": "s1", "key": "./test/keys/rsa2048.pem"}"#,
        )
        .unwrap();
        k9::assert_equal!(config.algorithm, HashAlgo::RsaSha256);
        k9::assert_equal!(config.header_canonicalization, Type::Relaxed);
        k9::assert_equal!(config.body_canonicalization, Type::Relaxed);
        assert!(config.headers.is_empty());

        let mut signer = config.configure().unwrap();
        let mut headers = SimpleHeaderSet::new();
        headers.add_text_header("Subject", "hello").unwrap();
        let value = signer.sign(&mut headers, b"hi\r\n").unwrap();
        assert!(value.contains("c=relaxed/relaxed;"), "{value}");
    }

    #[test]
    fn full() {
        let config: SignerConfig = serde_json::from_str(
            r#"{
                "domain": "example.com",
                "selector": "s1",
                "key": "./test/keys/ed25519.pem",
                "algorithm": "ed25519-sha256",
                "headers": ["From", "Subject"],
                "ignore_headers": ["X-Mailer"],
                "identity": "@example.com",
                "expiration": 3600,
                "body_length": true,
                "debug_headers": true,
                "over_sign": true,
                "header_canonicalization": "simple",
                "body_canonicalization": "Relaxed"
            }"#,
        )
        .unwrap();
        k9::assert_equal!(config.header_canonicalization, Type::Simple);
        let signer = config.configure().unwrap();
        k9::assert_equal!(signer.hash_algo(), HashAlgo::Ed25519Sha256);
    }

    #[test]
    fn errors() {
        assert!(serde_json::from_str::<SignerConfig>(
            r#"{"domain": "example.com", "selector": "s1", "key": "k", "bogus": 1}"#
        )
        .is_err());
        assert!(serde_json::from_str::<SignerConfig>(
            r#"{"domain": "example.com", "selector": "s1", "key": "k", "algorithm": "rsa-md5"}"#
        )
        .is_err());

        let config: SignerConfig = serde_json::from_str(
            r#"{"domain": "example.com", "selector": "s1", "key": "./test/keys/missing.pem"}"#,
        )
        .unwrap();
        assert!(matches!(
            config.configure(),
            Err(DKIMError::PrivateKeyLoadError(_))
        ));

        let config: SignerConfig = serde_json::from_str(
            r#"{"domain": "example.com", "selector": "s1", "key": "./test/keys/rsa2048.pem", "headers": ["Subject"]}"#,
        )
        .unwrap();
        assert!(matches!(
            config.configure(),
            Err(DKIMError::BuilderError(_))
        ));
    }

    #[test]
    fn key_from_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.der");
        std::fs::write(&path, include_bytes!("../test/keys/rsa2048.pk8.der")).unwrap();
        let config = SignerConfig {
            domain: "example.com".into(),
            selector: "s1".into(),
            key: path,
            headers: vec![],
            ignore_headers: vec![],
            algorithm: HashAlgo::RsaSha1,
            identity: None,
            expiration: None,
            body_length: false,
            max_body_length: None,
            debug_headers: false,
            over_sign: false,
            header_canonicalization: Type::Simple,
            body_canonicalization: Type::Simple,
        };
        k9::assert_equal!(config.configure().unwrap().hash_algo(), HashAlgo::RsaSha1);
    }
}
