//! Trust decision for signed messages.
//!
//! With an explicit certificate or container the message is checked
//! against that single candidate. Otherwise each signer is looked up in
//! the default system store and the message is accepted when any signer
//! that resolves there verifies. Errors while checking a signer count as
//! "not verified".

use crate::domain::types::{ContextFlags, KeySlot, ProviderSelector};
use crate::infra::error::CspResult;
use crate::services::cert_store::CertificateStore;
use crate::services::certificate::Certificate;
use crate::services::context::{Csp, KeyContext};
use crate::services::message::CryptoMessage;

/// Where the trusted signer comes from.
#[derive(Debug, Clone, Default)]
pub enum TrustAnchor {
    /// Signers resolved in the default system store
    #[default]
    DefaultStore,
    Certificate(Certificate),
    /// The certificate kept in a container
    Container {
        name: String,
        provider: ProviderSelector,
    },
}

/// Service deciding whether a decoded message is signed by a trusted key.
#[derive(Debug, Clone)]
pub struct VerificationService {
    csp: Csp,
}

impl VerificationService {
    #[must_use]
    pub fn new(csp: &Csp) -> Self {
        Self { csp: csp.clone() }
    }

    /// Verify `message`; `data` is required for detached signatures.
    ///
    /// # Errors
    /// Returns `NotFound` when an explicit container does not exist and
    /// store read errors. Signature mismatches are `Ok(false)`.
    pub fn verify(
        &self,
        message: &CryptoMessage,
        data: Option<&[u8]>,
        anchor: &TrustAnchor,
    ) -> CspResult<bool> {
        match anchor {
            TrustAnchor::Certificate(cert) => Ok(check_candidate(message, data, cert)),
            TrustAnchor::Container { name, provider } => {
                let Some(cert) = self.container_certificate(name, provider)? else {
                    log::warn!("Container {name} holds no certificate to verify against");
                    return Ok(false);
                };
                Ok(check_candidate(message, data, &cert))
            }
            TrustAnchor::DefaultStore => self.verify_against_store(message, data),
        }
    }

    fn verify_against_store(&self, message: &CryptoMessage, data: Option<&[u8]>) -> CspResult<bool> {
        let store = CertificateStore::open_default(&self.csp)?;
        for (index, info) in message.signer_infos().iter().enumerate() {
            let Some(cert) = store.get_cert_by_signer_info(info)? else {
                log::warn!(
                    "Signer {index} ({}, serial {}) is not in the {} store; skipped",
                    info.sid.issuer_string(),
                    info.sid.serial_hex(),
                    self.csp.config().default_store
                );
                continue;
            };
            match message.verify_data_with_cert(data, index, &cert) {
                Ok(true) => {
                    log::info!("Signature verified by {}", cert.subject());
                    return Ok(true);
                }
                Ok(false) => log::debug!("Signer {index} does not verify"),
                Err(e) => log::warn!("Signer {index} could not be checked: {e}"),
            }
        }
        Ok(false)
    }

    fn container_certificate(
        &self,
        name: &str,
        provider: &ProviderSelector,
    ) -> CspResult<Option<Certificate>> {
        let ctx = KeyContext::open(&self.csp, Some(name), provider.clone(), ContextFlags::SILENT)?;
        for slot in [KeySlot::Signature, KeySlot::Exchange] {
            if let Some(key) = ctx.get_key(slot)? {
                if let Some(cert) = key.extract_cert()? {
                    return Ok(Some(cert));
                }
            }
        }
        Ok(None)
    }
}

fn check_candidate(message: &CryptoMessage, data: Option<&[u8]>, cert: &Certificate) -> bool {
    match message.verify_cert_with_data(cert, data) {
        Ok(verified) => verified,
        Err(e) => {
            log::warn!("Verification against {} failed: {e}", cert.subject());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ProviderType;
    use crate::infra::config::CspConfiguration;
    use crate::infra::retry::RetryPolicy;
    use crate::services::cert_issuer::CertificateIssuer;

    fn setup() -> (Csp, Certificate) {
        let csp = Csp::builder(CspConfiguration::in_memory().with_retry(RetryPolicy::none()))
            .build()
            .unwrap();
        let ctx = KeyContext::create(&csp, "verifier", ProviderType::Gost2012_256, ContextFlags::NONE)
            .unwrap();
        let key = ctx.create_key(false, KeySlot::Signature).unwrap();
        let cert = CertificateIssuer::new("verifier")
            .self_signed(&ctx, KeySlot::Signature)
            .unwrap();
        key.store_cert(&cert).unwrap();
        (csp, cert)
    }

    #[test]
    fn test_default_store_requires_known_signer() {
        let (csp, cert) = setup();
        let signed = CryptoMessage::new()
            .sign_data(b"hurblewurble", Some(&cert), None)
            .unwrap();
        let message = CryptoMessage::decode(&signed).unwrap();
        let service = VerificationService::new(&csp);

        assert!(!service.verify(&message, None, &TrustAnchor::DefaultStore).unwrap());
        CertificateStore::open_default(&csp)
            .unwrap()
            .add_cert(&cert)
            .unwrap();
        assert!(service.verify(&message, None, &TrustAnchor::DefaultStore).unwrap());
    }

    #[test]
    fn test_explicit_candidates() {
        let (csp, cert) = setup();
        let signed = CryptoMessage::signature()
            .sign_data(b"hurblewurble", Some(&cert), None)
            .unwrap();
        let message = CryptoMessage::decode(&signed).unwrap();
        let service = VerificationService::new(&csp);

        let by_cert = TrustAnchor::Certificate(cert.duplicate());
        assert!(service.verify(&message, Some(b"hurblewurble"), &by_cert).unwrap());
        assert!(!service.verify(&message, Some(b"hUrblEwurBle"), &by_cert).unwrap());
        assert!(!service.verify(&message, None, &by_cert).unwrap());

        let by_container = TrustAnchor::Container {
            name: "verifier".to_string(),
            provider: ProviderType::Gost2012_256.into(),
        };
        assert!(service.verify(&message, Some(b"hurblewurble"), &by_container).unwrap());
        let missing = TrustAnchor::Container {
            name: "missing".to_string(),
            provider: ProviderSelector::default(),
        };
        assert!(service.verify(&message, Some(b"x"), &missing).is_err());
    }
}
