//! `InspectWorkflow`: structured summaries of messages and certificates.

use crate::domain::pkcs7::{ContentType, IssuerAndSerial};
use crate::infra::error::{CspError, CspResult};
use crate::services::{Certificate, CertificateStore, CryptoMessage};
use der::asn1::ObjectIdentifier;
use std::time::SystemTime;

/// A signer or recipient as named on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyInfo {
    /// `a:1b:...` hex serial
    pub serial_number: String,
    pub issuer: Vec<(ObjectIdentifier, String)>,
}

impl PartyInfo {
    fn from_id(id: &IssuerAndSerial) -> CspResult<Self> {
        Ok(Self {
            serial_number: id.serial_hex(),
            issuer: crate::domain::asn1::name_attributes(&id.issuer)?,
        })
    }
}

/// Summary of a PKCS#7 message.
#[derive(Debug, Clone)]
pub struct Pkcs7Info {
    pub content_type: ContentType,
    /// Payload, absent for detached signatures and envelopes
    pub content: Option<Vec<u8>>,
    /// DER of the embedded certificates
    pub certificates: Vec<Vec<u8>>,
    pub signer_infos: Vec<PartyInfo>,
    pub recipient_infos: Vec<PartyInfo>,
}

/// Summary of a certificate.
#[derive(Debug, Clone)]
pub struct CertInfo {
    pub version: u32,
    pub valid_from: SystemTime,
    pub valid_to: SystemTime,
    pub issuer: Vec<(ObjectIdentifier, String)>,
    pub subject: Vec<(ObjectIdentifier, String)>,
    pub use_to_sign: bool,
    pub use_to_encrypt: bool,
    /// Hex SHA-1 of the DER encoding
    pub thumbprint: String,
    pub serial_number: String,
    pub signature_algorithm: ObjectIdentifier,
    pub public_key_algorithm: ObjectIdentifier,
    /// Extended key usage purposes
    pub extended_key_usage: Vec<ObjectIdentifier>,
    pub extensions: Vec<ObjectIdentifier>,
}

/// Stateless reporting over encoded messages and certificates.
#[derive(Debug, Clone, Copy, Default)]
pub struct InspectWorkflow;

impl InspectWorkflow {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// # Errors
    /// Returns `FormatError` for malformed messages.
    pub fn pkcs7_info(&self, data: &[u8]) -> CspResult<Pkcs7Info> {
        let message = CryptoMessage::decode(data)?;
        let content_type = message.content_type().ok_or_else(|| {
            CspError::StateError("Decoded message without a content type".to_string())
        })?;
        let certificates = match content_type {
            ContentType::SignedData => CertificateStore::from_message(&message)?
                .iter()?
                .map(|cert| cert.extract())
                .collect(),
            _ => Vec::new(),
        };
        let signer_infos = message
            .signer_infos()
            .iter()
            .map(|info| PartyInfo::from_id(&info.sid))
            .collect::<CspResult<Vec<_>>>()?;
        let recipient_infos = message
            .recipient_infos()
            .iter()
            .map(|info| PartyInfo::from_id(&info.rid))
            .collect::<CspResult<Vec<_>>>()?;
        Ok(Pkcs7Info {
            content_type,
            content: message.get_data().ok(),
            certificates,
            signer_infos,
            recipient_infos,
        })
    }

    /// # Errors
    /// Returns `FormatError` for a certificate that does not parse.
    pub fn cert_info(&self, cert: &[u8]) -> CspResult<CertInfo> {
        let cert = Certificate::load(cert)?;
        Ok(CertInfo {
            version: cert.version(),
            valid_from: cert.not_before(),
            valid_to: cert.not_after(),
            issuer: cert.issuer_attributes()?,
            subject: cert.subject_attributes()?,
            use_to_sign: cert.can_sign(),
            use_to_encrypt: cert.can_encrypt(),
            thumbprint: cert.thumbprint().to_hex(),
            serial_number: cert.serial_hex(),
            signature_algorithm: cert.signature_algorithm(),
            public_key_algorithm: cert.public_key_algorithm(),
            extended_key_usage: cert.extended_key_usage()?,
            extensions: cert.extension_oids(),
        })
    }

    /// Hex subject key identifier.
    ///
    /// # Errors
    /// Returns `NotFound` when the certificate has no such extension.
    pub fn cert_subject_id(&self, cert: &[u8]) -> CspResult<String> {
        let cert = Certificate::load(cert)?;
        cert.subject_key_id()
            .map(hex::encode)
            .ok_or_else(|| CspError::NotFound("Subject key identifier".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constants::{CERT_DIGITAL_SIGNATURE_KEY_USAGE, OID_GOST_R3410_2012_256};
    use crate::domain::types::{ContextFlags, KeySlot, ProviderType};
    use crate::infra::config::CspConfiguration;
    use crate::infra::retry::RetryPolicy;
    use crate::services::{CertificateIssuer, Csp, KeyContext};

    fn cert() -> Certificate {
        let csp = Csp::builder(CspConfiguration::in_memory().with_retry(RetryPolicy::none()))
            .build()
            .unwrap();
        let ctx = KeyContext::create(&csp, "inspect", ProviderType::Gost2012_256, ContextFlags::NONE)
            .unwrap();
        ctx.create_key(false, KeySlot::Signature).unwrap();
        CertificateIssuer::new("CN=inspect,O=Example")
            .with_serial(vec![0x01, 0x02, 0xab])
            .with_key_usage(CERT_DIGITAL_SIGNATURE_KEY_USAGE)
            .self_signed(&ctx, KeySlot::Signature)
            .unwrap()
    }

    #[test]
    fn test_cert_info() {
        let cert = cert();
        let info = InspectWorkflow::new().cert_info(cert.as_der()).unwrap();
        assert_eq!(info.version, 3);
        assert!(info.use_to_sign);
        assert!(!info.use_to_encrypt);
        assert_eq!(info.serial_number, "1:2:ab");
        assert_eq!(info.thumbprint, cert.thumbprint().to_hex());
        assert_eq!(info.public_key_algorithm, OID_GOST_R3410_2012_256);
        assert!(info.subject.iter().any(|(_, v)| v == "inspect"));
        assert_eq!(info.subject, info.issuer);
        assert!(info.valid_from < info.valid_to);

        let ski = InspectWorkflow::new().cert_subject_id(cert.as_der()).unwrap();
        assert_eq!(ski.len(), 40);
    }

    #[test]
    fn test_pkcs7_info() {
        let cert = cert();
        let signed = CryptoMessage::new()
            .sign_data(b"hurblewurble", Some(&cert), None)
            .unwrap();
        let info = InspectWorkflow::new().pkcs7_info(&signed).unwrap();
        assert_eq!(info.content_type, ContentType::SignedData);
        assert_eq!(info.content.as_deref(), Some(&b"hurblewurble"[..]));
        assert_eq!(info.certificates, vec![cert.extract()]);
        assert_eq!(info.signer_infos.len(), 1);
        assert_eq!(info.signer_infos[0].serial_number, "1:2:ab");
        assert!(info.recipient_infos.is_empty());

        let mut envelope = CryptoMessage::new();
        envelope.add_recipient(&cert).unwrap();
        let encrypted = envelope.encrypt_data(b"secret").unwrap();
        let info = InspectWorkflow::new().pkcs7_info(&encrypted).unwrap();
        assert_eq!(info.content_type, ContentType::EnvelopedData);
        assert!(info.content.is_none());
        assert_eq!(info.recipient_infos.len(), 1);
    }
}
