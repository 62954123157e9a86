//! `VerifyWorkflow`: high-level facade for checking signed messages.
//!
//! Delegates the trust decision to `VerificationService`.

use crate::domain::types::ProviderSelector;
use crate::infra::error::CspResult;
use crate::services::{Certificate, CryptoMessage, Csp, TrustAnchor, VerificationService};

/// Checks a signature against a given certificate, a container's
/// certificate or the default store.
#[derive(Debug, Clone)]
pub struct VerifyWorkflow {
    csp: Csp,
    svc: VerificationService,
    provider: ProviderSelector,
}

impl VerifyWorkflow {
    #[must_use]
    pub fn new(csp: &Csp) -> Self {
        Self {
            csp: csp.clone(),
            svc: VerificationService::new(csp),
            provider: ProviderSelector::default(),
        }
    }

    /// Provider used to open containers.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<ProviderSelector>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Whether `signature` (attached or detached) over `data` is valid.
    ///
    /// With `cert` (DER or PEM) or `container` only that certificate is
    /// trusted; with neither, any signer present in the default store
    /// suffices. Mismatches and unresolvable signers give `false`.
    ///
    /// # Errors
    /// Returns `FormatError` for a malformed signature or certificate and
    /// `NotFound` for a missing container.
    pub fn check_signature(
        &self,
        cert: Option<&[u8]>,
        signature: &[u8],
        data: &[u8],
        container: Option<&str>,
    ) -> CspResult<bool> {
        self.csp.retry().run("Check signature", || {
            let message = CryptoMessage::decode(signature)?;
            let anchor = match (cert, container) {
                (Some(cert), _) => TrustAnchor::Certificate(Certificate::load(cert)?),
                (None, Some(name)) => TrustAnchor::Container {
                    name: name.to_string(),
                    provider: self.provider.clone(),
                },
                (None, None) => TrustAnchor::DefaultStore,
            };
            self.svc.verify(&message, Some(data), &anchor)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ContextFlags, KeySlot, ProviderType};
    use crate::infra::config::CspConfiguration;
    use crate::infra::retry::RetryPolicy;
    use crate::services::{CertificateIssuer, CertificateStore, KeyContext};

    #[test]
    fn test_check_signature_policies() {
        let csp = Csp::builder(CspConfiguration::in_memory().with_retry(RetryPolicy::none()))
            .build()
            .unwrap();
        let ctx = KeyContext::create(&csp, "checker", ProviderType::Gost2012_512, ContextFlags::NONE)
            .unwrap();
        let key = ctx.create_key(false, KeySlot::Signature).unwrap();
        let cert = CertificateIssuer::new("checker")
            .self_signed(&ctx, KeySlot::Signature)
            .unwrap();
        key.store_cert(&cert).unwrap();
        let signature = CryptoMessage::signature()
            .sign_data(b"hurblewurble", Some(&cert), None)
            .unwrap();

        let workflow = VerifyWorkflow::new(&csp).with_provider(ProviderType::Gost2012_512);
        assert!(!workflow
            .check_signature(None, &signature, b"hurblewurble", None)
            .unwrap());
        assert!(workflow
            .check_signature(Some(cert.as_der()), &signature, b"hurblewurble", None)
            .unwrap());
        assert!(workflow
            .check_signature(None, &signature, b"hurblewurble", Some("checker"))
            .unwrap());

        CertificateStore::open_default(&csp)
            .unwrap()
            .add_cert(&cert)
            .unwrap();
        assert!(workflow
            .check_signature(None, &signature, b"hurblewurble", None)
            .unwrap());
        assert!(!workflow
            .check_signature(None, &signature, b"hUrblEwurBle", None)
            .unwrap());
        assert!(workflow
            .check_signature(None, b"garbage", b"hurblewurble", None)
            .is_err());
    }
}
