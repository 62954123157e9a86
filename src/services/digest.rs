//! Streaming hashes bound to a key context.
//!
//! A digest is `Open` until the first `digest`, `sign` or `derive_key`;
//! afterwards it only reports its stored value.

use crate::domain::crypto::{HashAlgorithm, HashEngine};
use crate::domain::types::{ContextFlags, KeySlot, ProviderSelector, Thumbprint};
use crate::infra::error::{CspError, CspResult};
use crate::services::cert_store::CertificateStore;
use crate::services::certificate::Certificate;
use crate::services::context::{Csp, KeyContext};

enum DigestState {
    Open(Box<dyn HashEngine>),
    Finalized(Vec<u8>),
}

/// Hash (or HMAC) accumulator.
pub struct Digest {
    context: KeyContext,
    algorithm: HashAlgorithm,
    state: DigestState,
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Digest")
            .field("algorithm", &self.algorithm)
            .field("finalized", &matches!(self.state, DigestState::Finalized(_)))
            .finish()
    }
}

impl Digest {
    /// Start a digest.
    ///
    /// `length` 0 selects the configured default, 256/512 Streebog and 2001
    /// GOST R 34.11-94. With `key`, the result is an HMAC keyed by
    /// `derive_key` of a digest over the key bytes.
    ///
    /// # Errors
    /// Returns `InvalidInput` for an unknown length.
    pub fn create(
        context: &KeyContext,
        initial_data: &[u8],
        key: Option<&[u8]>,
        length: u32,
    ) -> CspResult<Self> {
        let algorithm = context.csp().config().hash_for_length(length)?;
        Self::with_algorithm(context, algorithm, initial_data, key)
    }

    fn with_algorithm(
        context: &KeyContext,
        algorithm: HashAlgorithm,
        initial_data: &[u8],
        key: Option<&[u8]>,
    ) -> CspResult<Self> {
        let engine = match key {
            Some(key) => {
                let mut key_digest = Self::with_algorithm(context, algorithm, key, None)?;
                algorithm.hmac_engine(&key_digest.derive_key()?)?
            }
            None => algorithm.engine(),
        };
        let mut digest = Self {
            context: context.clone(),
            algorithm,
            state: DigestState::Open(engine),
        };
        if !initial_data.is_empty() {
            digest.update(initial_data)?;
        }
        Ok(digest)
    }

    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn context(&self) -> &KeyContext {
        &self.context
    }

    /// # Errors
    /// Returns `StateError` once the digest is finalized.
    pub fn update(&mut self, data: &[u8]) -> CspResult<()> {
        match &mut self.state {
            DigestState::Open(engine) => {
                engine.update(data);
                Ok(())
            }
            DigestState::Finalized(_) => Err(CspError::StateError(
                "Digest already finalized".to_string(),
            )),
        }
    }

    /// Hash value; finalizes on first call and repeats it afterwards.
    pub fn digest(&mut self) -> Vec<u8> {
        let state = std::mem::replace(&mut self.state, DigestState::Finalized(Vec::new()));
        let value = match state {
            DigestState::Open(engine) => engine.finalize(),
            DigestState::Finalized(value) => value,
        };
        self.state = DigestState::Finalized(value.clone());
        value
    }

    pub fn hexdigest(&mut self) -> String {
        hex::encode(self.digest())
    }

    /// Key material derived from the hash value. Finalizes.
    ///
    /// # Errors
    /// Returns `StateError` if the digest is already finalized.
    pub fn derive_key(&mut self) -> CspResult<Vec<u8>> {
        if matches!(self.state, DigestState::Finalized(_)) {
            return Err(CspError::StateError(
                "Cannot derive a key from a finalized digest".to_string(),
            ));
        }
        Ok(self.digest())
    }

    /// Check a signature over this digest against a certificate's key.
    /// Finalizes. A mismatch is `false`.
    ///
    /// # Errors
    /// Returns `Unsupported` if the certificate key is not GOST.
    pub fn verify(&mut self, certificate: &Certificate, signature: &[u8]) -> CspResult<bool> {
        let public = certificate.public_key()?;
        Ok(public.verify_hash(&self.digest(), signature))
    }
}

/// Digest signed with a container's signature key.
#[derive(Debug)]
pub struct SignedDigest {
    digest: Digest,
    signer: Option<Certificate>,
}

impl SignedDigest {
    /// Start a digest to be signed with `context`'s signature key. Length 0
    /// follows the algorithm of that key: 2012-256 → 256, 2012-512 → 512,
    /// 2001 → GOST R 34.11-94. Without a signature key the provider family
    /// decides.
    ///
    /// # Errors
    /// Returns `InvalidInput` for an unknown length.
    pub fn create(context: &KeyContext, initial_data: &[u8], length: u32) -> CspResult<Self> {
        let algorithm = match length {
            0 => Self::key_digest(context)?,
            _ => HashAlgorithm::from_length(length)?,
        };
        Ok(Self {
            digest: Digest::with_algorithm(context, algorithm, initial_data, None)?,
            signer: None,
        })
    }

    fn key_digest(context: &KeyContext) -> CspResult<HashAlgorithm> {
        if !context.is_verify_only() {
            if let Some(key) = context.get_key(KeySlot::Signature)? {
                return Ok(key.algorithm().digest_algorithm());
            }
        }
        log::debug!("No signature key, hashing for the provider family");
        Ok(context.provider_type().key_algorithm().digest_algorithm())
    }

    /// Signed digest for a certificate found by thumbprint in the default
    /// store, or for the signature key of a container.
    ///
    /// # Errors
    /// Returns `NotFound` when the certificate is missing and `StateError`
    /// when it is not bound to a key.
    pub fn for_certificate(
        csp: &Csp,
        thumbprint: Option<&str>,
        container: Option<&str>,
    ) -> CspResult<Self> {
        match (thumbprint, container) {
            (Some(_), Some(_)) => Err(CspError::InvalidInput(
                "Give a thumbprint or a container, not both".to_string(),
            )),
            (None, container) => {
                let ctx = KeyContext::open(
                    csp,
                    container,
                    ProviderSelector::default(),
                    ContextFlags::NONE,
                )?;
                Self::create(&ctx, &[], 0)
            }
            (Some(thumb), None) => {
                let thumb = Thumbprint::from_hex(thumb)?;
                let store = CertificateStore::open_default(csp)?;
                let cert = store
                    .find_by_thumbprint(thumb.as_bytes())?
                    .into_iter()
                    .next()
                    .ok_or_else(|| CspError::NotFound(format!("Certificate {thumb}")))?;
                let binding = cert.binding().ok_or_else(|| {
                    CspError::StateError(format!("Certificate {thumb} is not bound to a key"))
                })?;
                let algorithm = cert.public_key()?.algorithm().digest_algorithm();
                Ok(Self {
                    digest: Digest::with_algorithm(&binding.context, algorithm, &[], None)?,
                    signer: Some(cert),
                })
            }
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.digest.algorithm()
    }

    /// # Errors
    /// Returns `StateError` once finalized.
    pub fn update(&mut self, data: &[u8]) -> CspResult<()> {
        self.digest.update(data)
    }

    pub fn digest(&mut self) -> Vec<u8> {
        self.digest.digest()
    }

    pub fn hexdigest(&mut self) -> String {
        self.digest.hexdigest()
    }

    /// # Errors
    /// Returns `Unsupported` if the certificate key is not GOST.
    pub fn verify(&mut self, certificate: &Certificate, signature: &[u8]) -> CspResult<bool> {
        self.digest.verify(certificate, signature)
    }

    /// Sign the hash value. Finalizes.
    ///
    /// # Errors
    /// Returns `NotFound` when the context has no signature key.
    pub fn sign(&mut self) -> CspResult<Vec<u8>> {
        let hash = self.digest.digest();
        if let Some(cert) = &self.signer {
            return cert.sign_hash(&hash);
        }
        let context = self.digest.context();
        if context.get_key(KeySlot::Signature)?.is_none() {
            return Err(CspError::NotFound(
                "Context has no signature key".to_string(),
            ));
        }
        context.sign_hash(KeySlot::Signature, &hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ProviderType;
    use crate::infra::config::CspConfiguration;
    use crate::infra::retry::RetryPolicy;
    use crate::adapters::{KeyBackend, KeyInfo, SoftProvider};
    use crate::domain::crypto::PublicKey;
    use crate::domain::types::{ContainerName, Password};
    use crate::services::cert_issuer::CertificateIssuer;
    use std::sync::Arc;

    /// Software provider that reports a different family than its keys.
    struct Relabeled {
        inner: SoftProvider,
        reported: ProviderType,
    }

    impl KeyBackend for Relabeled {
        fn provider_name(&self) -> &str {
            self.inner.provider_name()
        }
        fn provider_type(&self) -> ProviderType {
            self.reported
        }
        fn container_exists(&self, container: &ContainerName) -> CspResult<bool> {
            self.inner.container_exists(container)
        }
        fn default_container(&self) -> CspResult<Option<ContainerName>> {
            self.inner.default_container()
        }
        fn create_container(&self, container: &ContainerName) -> CspResult<()> {
            self.inner.create_container(container)
        }
        fn delete_container(&self, container: &ContainerName) -> CspResult<()> {
            self.inner.delete_container(container)
        }
        fn list_containers(&self) -> CspResult<Vec<ContainerName>> {
            self.inner.list_containers()
        }
        fn verify_or_set_pin(
            &self,
            container: &ContainerName,
            slot: KeySlot,
            pin: &Password,
        ) -> CspResult<()> {
            self.inner.verify_or_set_pin(container, slot, pin)
        }
        fn key_info(&self, container: &ContainerName, slot: KeySlot) -> CspResult<Option<KeyInfo>> {
            self.inner.key_info(container, slot)
        }
        fn generate_key(
            &self,
            container: &ContainerName,
            slot: KeySlot,
            exportable: bool,
        ) -> CspResult<KeyInfo> {
            self.inner.generate_key(container, slot, exportable)
        }
        fn sign_hash(
            &self,
            container: &ContainerName,
            slot: KeySlot,
            pin: Option<&Password>,
            hash: &[u8],
        ) -> CspResult<Vec<u8>> {
            self.inner.sign_hash(container, slot, pin, hash)
        }
        fn agree(
            &self,
            container: &ContainerName,
            slot: KeySlot,
            pin: Option<&Password>,
            peer: &PublicKey,
            ukm: &[u8],
        ) -> CspResult<Vec<u8>> {
            self.inner.agree(container, slot, pin, peer, ukm)
        }
        fn store_certificate(&self, container: &ContainerName, der: &[u8]) -> CspResult<()> {
            self.inner.store_certificate(container, der)
        }
        fn load_certificate(&self, container: &ContainerName) -> CspResult<Option<Vec<u8>>> {
            self.inner.load_certificate(container)
        }
    }

    fn context(provider: ProviderType) -> KeyContext {
        let csp = Csp::builder(CspConfiguration::in_memory().with_retry(RetryPolicy::none()))
            .build()
            .unwrap();
        KeyContext::create(&csp, "digest-test", provider, ContextFlags::NONE).unwrap()
    }

    #[test]
    fn test_digest_lengths() {
        let ctx = context(ProviderType::Gost2012_256);
        assert_eq!(
            Digest::create(&ctx, b"", None, 0).unwrap().algorithm(),
            HashAlgorithm::Streebog256
        );
        assert_eq!(
            Digest::create(&ctx, b"", None, 512).unwrap().algorithm(),
            HashAlgorithm::Streebog512
        );
        assert_eq!(
            Digest::create(&ctx, b"", None, 2001).unwrap().algorithm(),
            HashAlgorithm::Gost94
        );
        assert!(matches!(
            Digest::create(&ctx, b"", None, 384),
            Err(CspError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_digest_is_idempotent_and_streaming() {
        let ctx = context(ProviderType::Gost2012_256);
        let mut whole = Digest::create(&ctx, b"hurblewurble", None, 0).unwrap();
        let mut parts = Digest::create(&ctx, b"hurble", None, 0).unwrap();
        parts.update(b"wurble").unwrap();
        let first = whole.digest();
        assert_eq!(first, whole.digest());
        assert_eq!(first, parts.digest());
        assert_eq!(whole.hexdigest(), hex::encode(&first));
        assert_eq!(first, HashAlgorithm::Streebog256.digest(b"hurblewurble"));
    }

    #[test]
    fn test_update_after_finalize_fails() {
        let ctx = context(ProviderType::Gost2012_256);
        let mut digest = Digest::create(&ctx, b"data", None, 0).unwrap();
        digest.digest();
        assert!(matches!(digest.update(b"more"), Err(CspError::StateError(_))));
        assert!(matches!(digest.derive_key(), Err(CspError::StateError(_))));
    }

    #[test]
    fn test_hmac_is_keyed() {
        let ctx = context(ProviderType::Gost2012_256);
        let mut a = Digest::create(&ctx, b"data", Some(b"key one"), 0).unwrap();
        let mut b = Digest::create(&ctx, b"data", Some(b"key two"), 0).unwrap();
        let mut plain = Digest::create(&ctx, b"data", None, 0).unwrap();
        let mac = a.digest();
        assert_ne!(mac, b.digest());
        assert_ne!(mac, plain.digest());

        let key = HashAlgorithm::Streebog256.digest(b"key one");
        assert_eq!(mac, HashAlgorithm::Streebog256.hmac(&key, b"data").unwrap());
    }

    #[test]
    fn test_signed_digest_length_follows_key() {
        assert_eq!(
            SignedDigest::create(&context(ProviderType::Gost2012_512), b"", 0)
                .unwrap()
                .algorithm(),
            HashAlgorithm::Streebog512
        );
        assert_eq!(
            SignedDigest::create(&context(ProviderType::Gost2001), b"", 0)
                .unwrap()
                .algorithm(),
            HashAlgorithm::Gost94
        );
    }

    #[test]
    fn test_signed_digest_uses_key_not_provider_family() {
        let relabeled = Relabeled {
            inner: SoftProvider::in_memory("Relabeled", ProviderType::Gost2001),
            reported: ProviderType::Gost2012_512,
        };
        let csp = Csp::builder(CspConfiguration::in_memory().with_retry(RetryPolicy::none()))
            .with_provider(Arc::new(relabeled))
            .build()
            .unwrap();
        let ctx = KeyContext::create(&csp, "mixed", "Relabeled", ContextFlags::NONE).unwrap();

        // No key yet: the provider family decides.
        let before = SignedDigest::create(&ctx, b"", 0).unwrap();
        assert_eq!(before.algorithm(), HashAlgorithm::Streebog512);

        ctx.create_key(false, KeySlot::Signature).unwrap();
        let mut signed = SignedDigest::create(&ctx, b"hurblewurble", 0).unwrap();
        assert_eq!(signed.algorithm(), HashAlgorithm::Gost94);
        let cert = CertificateIssuer::new("CN=mixed")
            .self_signed(&ctx, KeySlot::Signature)
            .unwrap();
        let signature = signed.sign().unwrap();
        let mut check = SignedDigest::create(&ctx, b"hurblewurble", 0).unwrap();
        assert!(check.verify(&cert, &signature).unwrap());
    }

    #[test]
    fn test_sign_and_verify() {
        let ctx = context(ProviderType::Gost2012_256);
        let mut unsigned = SignedDigest::create(&ctx, b"hurblewurble", 0).unwrap();
        assert!(matches!(unsigned.sign(), Err(CspError::NotFound(_))));

        ctx.create_key(false, KeySlot::Signature).unwrap();
        let cert = CertificateIssuer::new("CN=signer")
            .self_signed(&ctx, KeySlot::Signature)
            .unwrap();
        let mut signed = SignedDigest::create(&ctx, b"hurblewurble", 0).unwrap();
        let signature = signed.sign().unwrap();
        assert_eq!(signature.len(), 64);

        let mut check = Digest::create(&ctx, b"hurblewurble", None, 0).unwrap();
        assert!(check.verify(&cert, &signature).unwrap());
        let mut tampered = Digest::create(&ctx, b"hUrblEwurBle", None, 0).unwrap();
        assert!(!tampered.verify(&cert, &signature).unwrap());
    }
}
