use crate::{DKIMError, DkimPrivateKey, SignerBuilder};
use indexmap::IndexMap;

/// A set of signing keys, indexed by domain and selector
#[derive(Debug, Default, Clone)]
pub struct DkimKeyRing {
    keys: IndexMap<(String, String), DkimPrivateKey>,
}

impl DkimKeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key, replacing any existing key for the same domain and
    /// selector
    pub fn add_key(
        &mut self,
        domain: impl Into<String>,
        selector: impl Into<String>,
        key: DkimPrivateKey,
    ) {
        let domain = domain.into().to_ascii_lowercase();
        self.keys.insert((domain, selector.into()), key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Return a builder primed with the key, selector and signing domain
    /// for `identity`, which is either a domain or an address.  When an
    /// address is given it is also used as the `i=` identity.
    /// Exactly one key must be registered for the domain.
    pub fn signer_for_identity(&self, identity: &str) -> Result<SignerBuilder, DKIMError> {
        let domain = match identity.rsplit_once('@') {
            Some((_, domain)) => domain,
            None => identity,
        }
        .to_ascii_lowercase();

        let mut candidates = self.keys.iter().filter(|((d, _), _)| *d == domain);
        let ((domain, selector), key) = candidates.next().ok_or(DKIMError::NoKeyForSignature)?;
        if candidates.next().is_some() {
            return Err(DKIMError::AmbiguousKey(domain.clone()));
        }
        tracing::trace!("using key {domain}/{selector} for {identity}");

        let mut builder = SignerBuilder::new()
            .with_private_key(key.clone())
            .with_selector(selector)
            .with_signing_domain(domain);
        if identity.contains('@') {
            builder = builder.with_identity(identity);
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashAlgo;
    use rand::Rng;

    fn random_ed25519() -> DkimPrivateKey {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill(&mut secret);
        DkimPrivateKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&secret))
    }

    #[test]
    fn lookup() {
        let mut ring = DkimKeyRing::new();
        ring.add_key("Example.com", "s1", random_ed25519());
        ring.add_key("other.example", "a", random_ed25519());
        ring.add_key("other.example", "b", random_ed25519());
        k9::assert_equal!(ring.len(), 3);

        let signer = ring
            .signer_for_identity("user@EXAMPLE.com")
            .unwrap()
            .build()
            .unwrap();
        k9::assert_equal!(signer.hash_algo(), HashAlgo::Ed25519Sha256);

        assert!(ring.signer_for_identity("example.com").is_ok());
        assert!(matches!(
            ring.signer_for_identity("nobody@nowhere.example"),
            Err(DKIMError::NoKeyForSignature)
        ));
        assert!(matches!(
            ring.signer_for_identity("other.example"),
            Err(DKIMError::AmbiguousKey(domain)) if domain == "other.example"
        ));
    }

    #[test]
    fn replacing_a_key() {
        let mut ring = DkimKeyRing::new();
        ring.add_key("example.com", "s1", random_ed25519());
        ring.add_key("example.com", "s1", random_ed25519());
        k9::assert_equal!(ring.len(), 1);
        assert!(ring.signer_for_identity("example.com").is_ok());
    }
}
