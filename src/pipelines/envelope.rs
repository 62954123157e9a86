//! `EnvelopeWorkflow`: encrypt to recipient certificates and decrypt with
//! a stored or container certificate.

use crate::domain::types::ProviderSelector;
use crate::infra::error::{CspError, CspResult};
use crate::pipelines::{
    certificate_by_thumbprint, container_certificate, load_certificates, open_container,
};
use crate::services::{CryptoMessage, Csp};

#[derive(Debug, Clone)]
pub struct EnvelopeWorkflow {
    csp: Csp,
    provider: ProviderSelector,
}

impl EnvelopeWorkflow {
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

    /// Encrypt `data` so that each of `certs` (DER or PEM) can decrypt it.
    ///
    /// # Errors
    /// Returns `InvalidInput` without recipients and `FormatError` for
    /// certificates that do not parse.
    pub fn encrypt(&self, certs: &[&[u8]], data: &[u8]) -> CspResult<Vec<u8>> {
        self.csp.retry().run("Encrypt data", || {
            let mut message = CryptoMessage::new();
            for cert in load_certificates(certs)? {
                message.add_recipient(&cert)?;
            }
            message.encrypt_data(data)
        })
    }

    /// Decrypt `data` with the certificate found by `thumbprint` in the
    /// default store, or with the certificate kept in `container`.
    ///
    /// # Errors
    /// Returns `NotFound` when the certificate is missing and
    /// `CryptoFailure` when it is not a recipient.
    pub fn decrypt(
        &self,
        data: &[u8],
        thumbprint: Option<&str>,
        container: Option<&str>,
    ) -> CspResult<Vec<u8>> {
        self.csp.retry().run("Decrypt data", || {
            let context = container
                .map(|name| open_container(&self.csp, name, &self.provider))
                .transpose()?;
            let cert = match (thumbprint, &context) {
                (Some(thumb), context) => {
                    certificate_by_thumbprint(&self.csp, context.as_ref(), thumb)?
                }
                (None, Some(context)) => container_certificate(context)?,
                (None, None) => {
                    return Err(CspError::InvalidInput(
                        "Decryption needs a thumbprint or a container".to_string(),
                    ))
                }
            };
            let mut message = CryptoMessage::decode(data)?;
            message.decrypt_by_cert(&cert)?;
            message.get_data()
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
    fn test_encrypt_decrypt() {
        let csp = Csp::builder(CspConfiguration::in_memory().with_retry(RetryPolicy::none()))
            .build()
            .unwrap();
        let ctx = KeyContext::create(&csp, "recipient", ProviderType::Gost2012_256, ContextFlags::NONE)
            .unwrap();
        let key = ctx.create_key(false, KeySlot::Signature).unwrap();
        let cert = CertificateIssuer::new("recipient")
            .self_signed(&ctx, KeySlot::Signature)
            .unwrap();
        key.store_cert(&cert).unwrap();
        CertificateStore::open_default(&csp)
            .unwrap()
            .add_cert(&cert)
            .unwrap();

        let workflow = EnvelopeWorkflow::new(&csp);
        let encrypted = workflow
            .encrypt(&[cert.as_der()], b"murblehurblewurble")
            .unwrap();
        let thumb = cert.thumbprint().to_hex();
        assert_eq!(
            workflow.decrypt(&encrypted, Some(&thumb), None).unwrap(),
            b"murblehurblewurble"
        );
        assert_eq!(
            workflow.decrypt(&encrypted, None, Some("recipient")).unwrap(),
            b"murblehurblewurble"
        );
        assert!(matches!(
            workflow.decrypt(&encrypted, None, None),
            Err(CspError::InvalidInput(_))
        ));
        assert!(matches!(
            workflow.encrypt(&[], b"x"),
            Err(CspError::InvalidInput(_))
        ));
    }
}
