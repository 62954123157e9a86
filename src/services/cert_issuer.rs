//! Issues X.509 certificates for container keys.

use crate::domain::asn1;
use crate::domain::constants::{
    ASN1_BIT_STRING_TAG, ASN1_BOOLEAN_TAG, CERT_DATA_ENCIPHERMENT_KEY_USAGE,
    CERT_DIGITAL_SIGNATURE_KEY_USAGE, CERT_KEY_AGREEMENT_KEY_USAGE, CERT_KEY_CERT_SIGN_KEY_USAGE,
    CERT_KEY_ENCIPHERMENT_KEY_USAGE, CERT_NON_REPUDIATION_KEY_USAGE, OID_BASIC_CONSTRAINTS,
    OID_EXTENDED_KEY_USAGE, OID_KEY_USAGE, OID_SUBJECT_KEY_IDENTIFIER,
};
use crate::domain::crypto::PublicKey;
use crate::domain::types::KeySlot;
use crate::infra::error::{CspError, CspResult};
use crate::services::certificate::{CertBinding, Certificate};
use crate::services::context::KeyContext;
use der::asn1::{BitString, ObjectIdentifier, OctetString};
use der::Encode;
use sha1::{Digest as _, Sha1};
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::time::{Time, Validity};

const DEFAULT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);
const SERIAL_LEN: usize = 16;

/// Builder for self-signed and CA-signed certificates.
#[derive(Debug, Clone)]
pub struct CertificateIssuer {
    subject: String,
    serial: Option<Vec<u8>>,
    not_before: Option<SystemTime>,
    validity: Duration,
    key_usage: u8,
    extended_key_usage: Vec<ObjectIdentifier>,
    ca: bool,
}

impl CertificateIssuer {
    /// Subject as an RFC 4514 string; a bare name becomes `CN=<name>`.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        let subject = subject.into();
        let subject = if subject.contains('=') {
            subject
        } else {
            format!("CN={subject}")
        };
        Self {
            subject,
            serial: None,
            not_before: None,
            validity: DEFAULT_VALIDITY,
            key_usage: CERT_DIGITAL_SIGNATURE_KEY_USAGE
                | CERT_NON_REPUDIATION_KEY_USAGE
                | CERT_KEY_ENCIPHERMENT_KEY_USAGE
                | CERT_DATA_ENCIPHERMENT_KEY_USAGE
                | CERT_KEY_AGREEMENT_KEY_USAGE,
            extended_key_usage: Vec::new(),
            ca: false,
        }
    }

    /// Serial number, big-endian, positive and minimally encoded.
    #[must_use]
    pub fn with_serial(mut self, serial: Vec<u8>) -> Self {
        self.serial = Some(serial);
        self
    }

    #[must_use]
    pub fn with_validity(mut self, not_before: SystemTime, validity: Duration) -> Self {
        self.not_before = Some(not_before);
        self.validity = validity;
        self
    }

    /// First byte of the KeyUsage bit string (`CERT_*_KEY_USAGE` bits).
    #[must_use]
    pub fn with_key_usage(mut self, key_usage: u8) -> Self {
        self.key_usage = key_usage;
        self
    }

    #[must_use]
    pub fn with_extended_key_usage(mut self, oids: Vec<ObjectIdentifier>) -> Self {
        self.extended_key_usage = oids;
        self
    }

    /// Mark as a CA certificate able to sign others.
    #[must_use]
    pub fn as_ca(mut self) -> Self {
        self.ca = true;
        self.key_usage |= CERT_KEY_CERT_SIGN_KEY_USAGE;
        self
    }

    /// Self-signed certificate for the key in `slot`, bound to `context`.
    ///
    /// # Errors
    /// Returns `NotFound` for an empty slot and `InvalidInput` for a
    /// malformed subject.
    pub fn self_signed(&self, context: &KeyContext, slot: KeySlot) -> CspResult<Certificate> {
        let public = Self::slot_key(context, slot)?;
        let subject = self.subject_name()?;
        let der = self.sign(subject.clone(), subject, &public, &public, |hash| {
            context.sign_hash(slot, hash)
        })?;
        self.finish(&der, context, slot)
    }

    /// Certificate for the key in `slot`, signed by a bound issuer certificate.
    ///
    /// # Errors
    /// Returns `StateError` when the issuer is not bound.
    pub fn issue(
        &self,
        context: &KeyContext,
        slot: KeySlot,
        issuer: &Certificate,
    ) -> CspResult<Certificate> {
        if !issuer.is_bound() {
            return Err(CspError::StateError(format!(
                "Issuer certificate {} is not bound to a key",
                issuer.thumbprint()
            )));
        }
        let public = Self::slot_key(context, slot)?;
        let issuer_key = issuer.public_key()?;
        let der = self.sign(
            issuer.subject_name(),
            self.subject_name()?,
            &public,
            &issuer_key,
            |hash| issuer.sign_hash(hash),
        )?;
        self.finish(&der, context, slot)
    }

    fn slot_key(context: &KeyContext, slot: KeySlot) -> CspResult<PublicKey> {
        context
            .get_key(slot)?
            .map(|key| key.public_key().clone())
            .ok_or_else(|| CspError::NotFound(format!("{slot} key to certify")))
    }

    fn subject_name(&self) -> CspResult<Name> {
        Name::from_str(&self.subject)
            .map_err(|e| CspError::InvalidInput(format!("Subject {:?}: {e}", self.subject)))
    }

    fn finish(&self, der: &[u8], context: &KeyContext, slot: KeySlot) -> CspResult<Certificate> {
        let cert = Certificate::load(der)?.with_binding(CertBinding {
            context: context.clone(),
            slot,
        });
        log::info!(
            "Issued certificate {} for {} ({})",
            cert.thumbprint(),
            self.subject,
            cert.serial_hex()
        );
        Ok(cert)
    }

    fn sign<F>(
        &self,
        issuer: Name,
        subject: Name,
        public: &PublicKey,
        issuer_key: &PublicKey,
        signer: F,
    ) -> CspResult<Vec<u8>>
    where
        F: FnOnce(&[u8]) -> CspResult<Vec<u8>>,
    {
        let algorithm = issuer_key.algorithm();
        let signature_algorithm = AlgorithmIdentifierOwned {
            oid: algorithm.signature_oid(),
            parameters: None,
        };
        let not_before = self.not_before.unwrap_or_else(SystemTime::now);
        let validity = Validity {
            not_before: Time::try_from(not_before)?,
            not_after: Time::try_from(not_before + self.validity)?,
        };
        let serial = match &self.serial {
            Some(serial) => serial.clone(),
            None => random_serial(),
        };

        let tbs = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(&serial)?,
            signature: signature_algorithm.clone(),
            issuer,
            validity,
            subject,
            subject_public_key_info: public.to_spki()?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(self.extensions(public)?),
        };
        let tbs_der = tbs.to_der()?;
        let hash = algorithm.digest_algorithm().digest(&tbs_der);
        let signature = signer(&hash)?;

        let cert = x509_cert::Certificate {
            tbs_certificate: tbs,
            signature_algorithm,
            signature: BitString::from_bytes(&signature)?,
        };
        Ok(cert.to_der()?)
    }

    fn extensions(&self, public: &PublicKey) -> CspResult<Vec<Extension>> {
        let mut extensions = Vec::new();
        if self.ca {
            // BasicConstraints { cA TRUE }
            let value = asn1::sequence(&[&asn1::tlv(ASN1_BOOLEAN_TAG, &[0xFF])]);
            extensions.push(extension(OID_BASIC_CONSTRAINTS, true, value)?);
        }
        if self.key_usage != 0 {
            let unused = self.key_usage.trailing_zeros() as u8;
            let value = asn1::tlv(ASN1_BIT_STRING_TAG, &[unused, self.key_usage]);
            extensions.push(extension(OID_KEY_USAGE, true, value)?);
        }
        if !self.extended_key_usage.is_empty() {
            let oids: Vec<Vec<u8>> = self.extended_key_usage.iter().map(asn1::oid).collect();
            let refs: Vec<&[u8]> = oids.iter().map(Vec::as_slice).collect();
            extensions.push(extension(
                OID_EXTENDED_KEY_USAGE,
                false,
                asn1::sequence(&refs),
            )?);
        }
        let key_id = Sha1::digest(public.to_raw());
        extensions.push(extension(
            OID_SUBJECT_KEY_IDENTIFIER,
            false,
            asn1::octet_string(&key_id),
        )?);
        Ok(extensions)
    }
}

fn extension(oid: ObjectIdentifier, critical: bool, value: Vec<u8>) -> CspResult<Extension> {
    Ok(Extension {
        extn_id: oid,
        critical,
        extn_value: OctetString::new(value)?,
    })
}

fn random_serial() -> Vec<u8> {
    let mut serial = vec![0u8; SERIAL_LEN];
    rand::fill(&mut serial[..]);
    // positive, no leading zero octet
    serial[0] = (serial[0] & 0x7F) | 0x01;
    serial
}
