// Implementation of DKIM signing: https://datatracker.ietf.org/doc/html/rfc6376

use ed25519_dalek::SigningKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;

pub mod canonicalization;
mod config;
mod errors;
mod hash;
mod header;
mod keyring;
#[cfg(test)]
mod parser;
mod sign;

pub use config::SignerConfig;
pub use errors::{DKIMError, Status};
pub use hash::HashAlgo;
use header::HEADER;
pub use keyring::DkimKeyRing;
pub use sign::{Signer, SignerBuilder};

#[derive(Debug, Clone)]
pub enum DkimPrivateKey {
    Rsa(RsaPrivateKey),
    Ed25519(SigningKey),
}

impl DkimPrivateKey {
    /// Parse RSA key data into a DkimPrivateKey.
    /// PKCS#1 and PKCS#8, in either DER or PEM form, are supported.
    pub fn rsa_key(data: &[u8]) -> Result<Self, DKIMError> {
        let mut errors = vec![];

        match RsaPrivateKey::from_pkcs1_der(data) {
            Ok(key) => return Ok(Self::Rsa(key)),
            Err(err) => errors.push(format!("from_pkcs1_der: {err:#}")),
        }
        match RsaPrivateKey::from_pkcs8_der(data) {
            Ok(key) => return Ok(Self::Rsa(key)),
            Err(err) => errors.push(format!("from_pkcs8_der: {err:#}")),
        }

        match std::str::from_utf8(data) {
            Ok(s) => {
                match RsaPrivateKey::from_pkcs1_pem(s) {
                    Ok(key) => return Ok(Self::Rsa(key)),
                    Err(err) => errors.push(format!("from_pkcs1_pem: {err:#}")),
                }
                match RsaPrivateKey::from_pkcs8_pem(s) {
                    Ok(key) => {
                        tracing::debug!("rsa_key: loaded as PKCS8 PEM after {errors:?}");
                        return Ok(Self::Rsa(key));
                    }
                    Err(err) => errors.push(format!("from_pkcs8_pem: {err:#}")),
                }
            }
            Err(err) => errors.push(format!("from_pkcs1_pem: data is not UTF-8: {err:#}")),
        }

        Err(DKIMError::PrivateKeyLoadError(errors.join(". ")))
    }

    /// Load RSA key data from a file and parse it into a DkimPrivateKey
    pub fn rsa_key_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, DKIMError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|err| {
            DKIMError::PrivateKeyLoadError(format!(
                "rsa_key_file: failed to read file {path:?}: {err:#}"
            ))
        })?;
        Self::rsa_key(&data)
    }

    /// Parse PKCS8 encoded ed25519 key data into a DkimPrivateKey.
    /// Both DER and PEM are supported
    pub fn ed25519_key(data: &[u8]) -> Result<Self, DKIMError> {
        let mut errors = vec![];

        match SigningKey::from_pkcs8_der(data) {
            Ok(key) => return Ok(Self::Ed25519(key)),
            Err(err) => errors.push(format!("Ed25519 SigningKey::from_pkcs8_der: {err:#}")),
        }

        match std::str::from_utf8(data) {
            Ok(s) => match SigningKey::from_pkcs8_pem(s) {
                Ok(key) => {
                    tracing::debug!("ed25519_key: loaded as PEM after {errors:?}");
                    return Ok(Self::Ed25519(key));
                }
                Err(err) => errors.push(format!("Ed25519 SigningKey::from_pkcs8_pem: {err:#}")),
            },
            Err(err) => errors.push(format!("ed25519_key: data is not UTF-8: {err:#}")),
        }

        Err(DKIMError::PrivateKeyLoadError(errors.join(". ")))
    }

    /// The algorithm used when none is configured explicitly
    pub fn default_hash_algo(&self) -> HashAlgo {
        match self {
            Self::Rsa(_) => HashAlgo::RsaSha256,
            Self::Ed25519(_) => HashAlgo::Ed25519Sha256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsa_key_formats() {
        let pem = include_bytes!("../test/keys/rsa2048.pem");
        let der = include_bytes!("../test/keys/rsa2048.pk8.der");
        let from_pem = DkimPrivateKey::rsa_key(pem).unwrap();
        let from_der = DkimPrivateKey::rsa_key(der).unwrap();
        match (from_pem, from_der) {
            (DkimPrivateKey::Rsa(a), DkimPrivateKey::Rsa(b)) => {
                k9::assert_equal!(a, b);
            }
            _ => panic!("expected rsa keys"),
        }

        let from_file = DkimPrivateKey::rsa_key_file("./test/keys/rsa2048.pem").unwrap();
        k9::assert_equal!(from_file.default_hash_algo(), HashAlgo::RsaSha256);

        let err = DkimPrivateKey::rsa_key_file("./test/keys/missing.pem").unwrap_err();
        assert!(err.to_string().contains("failed to read file"), "{err}");
    }

    #[test]
    fn ed25519_key_formats() {
        let pem = include_bytes!("../test/keys/ed25519.pem");
        let der = include_bytes!("../test/keys/ed25519.der");
        match (
            DkimPrivateKey::ed25519_key(pem).unwrap(),
            DkimPrivateKey::ed25519_key(der).unwrap(),
        ) {
            (DkimPrivateKey::Ed25519(a), DkimPrivateKey::Ed25519(b)) => {
                k9::assert_equal!(a.to_bytes(), b.to_bytes());
            }
            _ => panic!("expected ed25519 keys"),
        }
    }

    #[test]
    fn garbage_keys() {
        let err = DkimPrivateKey::rsa_key(b"not a key").unwrap_err();
        assert!(matches!(err, DKIMError::PrivateKeyLoadError(_)));
        assert!(err.to_string().contains("from_pkcs8_pem"), "{err}");
        assert!(DkimPrivateKey::ed25519_key(&[0xff, 0xfe]).is_err());
        // an RSA key is not an ed25519 key
        assert!(DkimPrivateKey::ed25519_key(include_bytes!("../test/keys/rsa2048.pem")).is_err());
    }
}
