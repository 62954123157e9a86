//! `SignWorkflow`: sign data, optionally enveloping the signed message.

use crate::domain::types::ProviderSelector;
use crate::infra::error::CspResult;
use crate::pipelines::{load_certificates, resolve_signer};
use crate::services::{CryptoMessage, Csp};

/// Signs with a certificate from the default store or a container.
#[derive(Debug, Clone)]
pub struct SignWorkflow {
    csp: Csp,
    provider: ProviderSelector,
}

impl SignWorkflow {
    #[must_use]
    pub fn new(csp: &Csp) -> Self {
        Self {
            csp: csp.clone(),
            provider: ProviderSelector::default(),
        }
    }

    /// Provider used to open containers.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<ProviderSelector>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Sign `data` with the certificate found by `thumbprint`, or with the
    /// certificate kept in `container` when one is given. Without
    /// `include_data` the signature is detached.
    ///
    /// # Errors
    /// Returns `NotFound` when the signer cannot be found and signing errors.
    pub fn sign(
        &self,
        thumbprint: Option<&str>,
        data: &[u8],
        include_data: bool,
        container: Option<&str>,
    ) -> CspResult<Vec<u8>> {
        self.csp.retry().run("Sign data", || {
            let signer = resolve_signer(&self.csp, &self.provider, thumbprint, container)?;
            CryptoMessage::new().sign_data(data, Some(&signer), Some(!include_data))
        })
    }

    /// Sign `data` with an attached signature, then encrypt the signed
    /// message to `recipients` (DER or PEM certificates).
    ///
    /// # Errors
    /// Returns `NotFound` when the signer cannot be found, `InvalidInput`
    /// without recipients and signing or encryption errors.
    pub fn sign_and_encrypt(
        &self,
        thumbprint: Option<&str>,
        recipients: &[&[u8]],
        data: &[u8],
        container: Option<&str>,
    ) -> CspResult<Vec<u8>> {
        self.csp.retry().run("Sign and encrypt data", || {
            let mut envelope = CryptoMessage::new();
            for cert in load_certificates(recipients)? {
                envelope.add_recipient(&cert)?;
            }
            let signer = resolve_signer(&self.csp, &self.provider, thumbprint, container)?;
            let signed = CryptoMessage::new().sign_data(data, Some(&signer), Some(false))?;
            envelope.encrypt_data(&signed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ContextFlags, KeySlot, ProviderType};
    use crate::infra::config::CspConfiguration;
    use crate::infra::error::CspError;
    use crate::infra::retry::RetryPolicy;
    use crate::services::{Certificate, CertificateIssuer, CertificateStore, KeyContext};

    fn setup() -> (Csp, Certificate) {
        let csp = Csp::builder(CspConfiguration::in_memory().with_retry(RetryPolicy::none()))
            .build()
            .unwrap();
        let ctx = KeyContext::create(&csp, "signer", ProviderType::Gost2012_256, ContextFlags::NONE)
            .unwrap();
        let key = ctx.create_key(false, KeySlot::Signature).unwrap();
        ctx.create_key(false, KeySlot::Exchange).unwrap();
        let cert = CertificateIssuer::new("signer")
            .self_signed(&ctx, KeySlot::Signature)
            .unwrap();
        key.store_cert(&cert).unwrap();
        CertificateStore::open_default(&csp)
            .unwrap()
            .add_cert(&cert)
            .unwrap();
        (csp, cert)
    }

    #[test]
    fn test_sign_by_thumbprint_and_container() {
        let (csp, cert) = setup();
        let workflow = SignWorkflow::new(&csp);
        let thumb = cert.thumbprint().to_hex();

        let attached = workflow.sign(Some(&thumb), b"hurblewurble", true, None).unwrap();
        let message = CryptoMessage::decode(&attached).unwrap();
        assert_eq!(message.get_data().unwrap(), b"hurblewurble");
        assert!(message.verify_cert(&cert).unwrap());

        let detached = workflow.sign(None, b"hurblewurble", false, Some("signer")).unwrap();
        let message = CryptoMessage::decode(&detached).unwrap();
        assert!(message.is_detached());
        assert!(message.verify_data(Some(b"hurblewurble"), 0).unwrap());

        assert!(matches!(
            workflow.sign(Some(&hex::encode([7u8; 20])), b"x", true, None),
            Err(CspError::NotFound(_))
        ));
    }

    #[test]
    fn test_sign_and_encrypt() {
        let (csp, cert) = setup();
        let workflow = SignWorkflow::new(&csp);
        let encrypted = workflow
            .sign_and_encrypt(None, &[cert.as_der()], b"payload", Some("signer"))
            .unwrap();

        let mut envelope = CryptoMessage::decode(&encrypted).unwrap();
        let signed = envelope.decrypt_by_cert(&cert).unwrap();
        let message = CryptoMessage::decode(&signed).unwrap();
        assert_eq!(message.get_data().unwrap(), b"payload");
        assert!(message.verify_cert(&cert).unwrap());
    }
}
