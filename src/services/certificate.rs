//! Certificate handles.
//!
//! A [`Certificate`] wraps an immutable DER encoding (shared through an
//! `Arc`) plus per-handle state: the key it is bound to and, for handles
//! returned by a store, the entry they came from.

use crate::domain::asn1;
use crate::domain::constants::{
    ASN1_BIT_STRING_TAG, ASN1_OCTET_STRING_TAG, ASN1_SEQUENCE_TAG,
    CERT_DATA_ENCIPHERMENT_KEY_USAGE, CERT_DIGITAL_SIGNATURE_KEY_USAGE, OID_EXTENDED_KEY_USAGE,
    OID_KEY_USAGE, OID_SUBJECT_KEY_IDENTIFIER,
};
use crate::domain::crypto::PublicKey;
use crate::domain::pkcs7::{format_serial, IssuerAndSerial};
use crate::domain::types::{KeySlot, StoreName, Thumbprint};
use crate::infra::error::{CspError, CspResult};
use crate::services::cert_store::CertificateStore;
use crate::services::context::KeyContext;
use der::asn1::ObjectIdentifier;
use der::{Decode, Encode};
use sha1::{Digest as _, Sha1};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use x509_cert::certificate::Version;
use x509_cert::ext::Extension;

const PEM_MARKER: &[u8] = b"-----BEGIN";

struct CertData {
    der: Vec<u8>,
    parsed: x509_cert::Certificate,
    thumbprint: Thumbprint,
}

/// Key a certificate is bound to.
#[derive(Clone, Debug)]
pub struct CertBinding {
    pub context: KeyContext,
    pub slot: KeySlot,
}

/// Store entry a handle was read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum EntryOrigin {
    System { store: StoreName, id: u64 },
    Local { store_id: u64, entry_id: u64 },
}

/// Certificate handle.
#[derive(Clone)]
pub struct Certificate {
    data: Arc<CertData>,
    binding: Option<CertBinding>,
    origin: Option<EntryOrigin>,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject())
            .field("thumbprint", &self.data.thumbprint)
            .field("bound", &self.binding.is_some())
            .finish()
    }
}

impl Certificate {
    /// Parse a certificate from DER or PEM.
    ///
    /// # Errors
    /// Returns `FormatError` for anything that is not a certificate.
    pub fn load(bytes: &[u8]) -> CspResult<Self> {
        let trimmed = trim_ascii_start(bytes);
        let der = if trimmed.starts_with(PEM_MARKER) {
            let pem = pem::parse(trimmed)?;
            if pem.tag() != "CERTIFICATE" {
                return Err(CspError::FormatError(format!(
                    "Expected a CERTIFICATE PEM block, found {}",
                    pem.tag()
                )));
            }
            pem.contents().to_vec()
        } else {
            bytes.to_vec()
        };
        let parsed = x509_cert::Certificate::from_der(&der)
            .map_err(|e| CspError::FormatError(format!("Invalid certificate: {e}")))?;
        let thumbprint = Thumbprint::from_bytes(&Sha1::digest(&der))?;
        Ok(Self {
            data: Arc::new(CertData {
                der,
                parsed,
                thumbprint,
            }),
            binding: None,
            origin: None,
        })
    }

    pub(crate) fn with_origin(mut self, origin: EntryOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub(crate) fn origin(&self) -> Option<&EntryOrigin> {
        self.origin.as_ref()
    }

    pub(crate) fn with_binding(mut self, binding: CertBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Bind to the key of `context` whose public key the certificate carries.
    ///
    /// # Errors
    /// Returns `CryptoFailure` when neither container key matches.
    pub fn bind(&mut self, context: &KeyContext) -> CspResult<()> {
        let public = self.public_key()?;
        let slot = context.slot_for(&public)?.ok_or_else(|| {
            CspError::CryptoFailure(format!(
                "No key in container {} matches certificate {}",
                context
                    .container_name()
                    .map_or_else(|| "<verify-only>".to_string(), ToString::to_string),
                self.thumbprint()
            ))
        })?;
        log::debug!("Bound certificate {} to {slot}", self.thumbprint());
        self.binding = Some(CertBinding {
            context: context.clone(),
            slot,
        });
        Ok(())
    }

    /// Unbound, unstored copy sharing the encoding.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            binding: None,
            origin: None,
        }
    }

    /// DER encoding.
    #[must_use]
    pub fn extract(&self) -> Vec<u8> {
        self.data.der.clone()
    }

    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.data.der
    }

    /// SHA-1 of the DER encoding.
    #[must_use]
    pub fn thumbprint(&self) -> Thumbprint {
        self.data.thumbprint
    }

    /// Remove the store entry this handle refers to.
    ///
    /// # Errors
    /// Returns `StateError` for read-only stores.
    pub fn remove_from_store(&self, store: &mut CertificateStore) -> CspResult<bool> {
        store.remove(self)
    }

    #[must_use]
    pub fn binding(&self) -> Option<&CertBinding> {
        self.binding.as_ref()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    fn tbs(&self) -> &x509_cert::TbsCertificate {
        &self.data.parsed.tbs_certificate
    }

    /// Subject as an RFC 4514 string.
    #[must_use]
    pub fn subject(&self) -> String {
        self.tbs().subject.to_string()
    }

    /// Value of the first CN attribute of the subject.
    #[must_use]
    pub fn common_name(&self) -> Option<String> {
        self.subject().split(',').find_map(|rdn| {
            rdn.trim()
                .strip_prefix("CN=")
                .map(ToString::to_string)
        })
    }

    pub(crate) fn subject_name(&self) -> x509_cert::name::Name {
        self.tbs().subject.clone()
    }

    #[must_use]
    pub fn issuer(&self) -> String {
        self.tbs().issuer.to_string()
    }

    /// Subject attributes in encoding order.
    ///
    /// # Errors
    /// Returns `FormatError` if the name cannot be re-encoded.
    pub fn subject_attributes(&self) -> CspResult<Vec<(ObjectIdentifier, String)>> {
        asn1::name_attributes(&self.tbs().subject.to_der()?)
    }

    /// Issuer attributes in encoding order.
    ///
    /// # Errors
    /// Returns `FormatError` if the name cannot be re-encoded.
    pub fn issuer_attributes(&self) -> CspResult<Vec<(ObjectIdentifier, String)>> {
        asn1::name_attributes(&self.tbs().issuer.to_der()?)
    }

    /// X.509 version number (1, 2 or 3).
    #[must_use]
    pub fn version(&self) -> u32 {
        match self.tbs().version {
            Version::V1 => 1,
            Version::V2 => 2,
            Version::V3 => 3,
        }
    }

    #[must_use]
    pub fn not_before(&self) -> SystemTime {
        self.tbs().validity.not_before.to_system_time()
    }

    #[must_use]
    pub fn not_after(&self) -> SystemTime {
        self.tbs().validity.not_after.to_system_time()
    }

    /// Validity window as `YYYY-MM-DDTHH:MM:SSZ` strings.
    #[must_use]
    pub fn validity_strings(&self) -> (String, String) {
        let validity = &self.tbs().validity;
        (
            validity.not_before.to_date_time().to_string(),
            validity.not_after.to_date_time().to_string(),
        )
    }

    /// Serial number content octets, big-endian.
    #[must_use]
    pub fn serial_bytes(&self) -> Vec<u8> {
        self.tbs().serial_number.as_bytes().to_vec()
    }

    /// Serial as `a:1b:...` unpadded hex pairs.
    #[must_use]
    pub fn serial_hex(&self) -> String {
        format_serial(self.tbs().serial_number.as_bytes())
    }

    #[must_use]
    pub fn signature_algorithm(&self) -> ObjectIdentifier {
        self.data.parsed.signature_algorithm.oid
    }

    #[must_use]
    pub fn public_key_algorithm(&self) -> ObjectIdentifier {
        self.tbs().subject_public_key_info.algorithm.oid
    }

    /// GOST public key carried by the certificate.
    ///
    /// # Errors
    /// Returns `Unsupported` for non-GOST keys.
    pub fn public_key(&self) -> CspResult<PublicKey> {
        PublicKey::from_spki(&self.tbs().subject_public_key_info)
    }

    fn extensions(&self) -> &[Extension] {
        self.tbs().extensions.as_deref().unwrap_or(&[])
    }

    fn extension_value(&self, oid: &ObjectIdentifier) -> Option<&[u8]> {
        self.extensions()
            .iter()
            .find(|e| e.extn_id == *oid)
            .map(|e| e.extn_value.as_bytes())
    }

    /// OIDs of every extension present.
    #[must_use]
    pub fn extension_oids(&self) -> Vec<ObjectIdentifier> {
        self.extensions().iter().map(|e| e.extn_id).collect()
    }

    /// First byte of the KeyUsage bit string, 0 when absent.
    #[must_use]
    pub fn key_usage(&self) -> u8 {
        self.extension_value(&OID_KEY_USAGE)
            .and_then(|value| asn1::parse_single(value).ok())
            .filter(|bits| bits.tag == ASN1_BIT_STRING_TAG)
            .and_then(|bits| bits.content.get(1).copied())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn can_sign(&self) -> bool {
        self.key_usage() & CERT_DIGITAL_SIGNATURE_KEY_USAGE != 0
    }

    #[must_use]
    pub fn can_encrypt(&self) -> bool {
        self.key_usage() & CERT_DATA_ENCIPHERMENT_KEY_USAGE != 0
    }

    /// Extended key usage OIDs, empty when the extension is absent.
    ///
    /// # Errors
    /// Returns `FormatError` for a malformed extension.
    pub fn extended_key_usage(&self) -> CspResult<Vec<ObjectIdentifier>> {
        let Some(value) = self.extension_value(&OID_EXTENDED_KEY_USAGE) else {
            return Ok(Vec::new());
        };
        let seq = asn1::parse_single(value)?;
        if seq.tag != ASN1_SEQUENCE_TAG {
            return Err(CspError::FormatError(
                "ExtendedKeyUsage is not a SEQUENCE".to_string(),
            ));
        }
        seq.reader()
            .read_all()?
            .iter()
            .map(asn1::Tlv::to_oid)
            .collect()
    }

    /// Subject key identifier, when present.
    #[must_use]
    pub fn subject_key_id(&self) -> Option<Vec<u8>> {
        self.extension_value(&OID_SUBJECT_KEY_IDENTIFIER)
            .and_then(|value| asn1::parse_single(value).ok())
            .filter(|os| os.tag == ASN1_OCTET_STRING_TAG)
            .map(|os| os.content.to_vec())
    }

    /// How signer infos and recipient infos name this certificate.
    ///
    /// # Errors
    /// Returns `FormatError` if the issuer cannot be re-encoded.
    pub fn issuer_and_serial(&self) -> CspResult<IssuerAndSerial> {
        Ok(IssuerAndSerial {
            issuer: self.tbs().issuer.to_der()?,
            serial: self.serial_bytes(),
        })
    }

    /// Sign a hash with the bound key.
    pub(crate) fn sign_hash(&self, hash: &[u8]) -> CspResult<Vec<u8>> {
        let binding = self.require_binding()?;
        binding.context.sign_hash(binding.slot, hash)
    }

    /// VKO agreement with the bound key.
    pub(crate) fn agree(&self, peer: &PublicKey, ukm: &[u8]) -> CspResult<Vec<u8>> {
        let binding = self.require_binding()?;
        binding.context.agree(binding.slot, peer, ukm)
    }

    fn require_binding(&self) -> CspResult<&CertBinding> {
        self.binding.as_ref().ok_or_else(|| {
            CspError::StateError(format!(
                "Certificate {} is not bound to a key",
                self.thumbprint()
            ))
        })
    }
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constants::CERT_KEY_CERT_SIGN_KEY_USAGE;
    use crate::domain::types::{ContextFlags, ProviderType};
    use crate::infra::config::CspConfiguration;
    use crate::infra::retry::RetryPolicy;
    use crate::services::cert_issuer::CertificateIssuer;
    use crate::services::context::Csp;

    fn issued(subject: &str) -> (KeyContext, Certificate) {
        let csp = Csp::builder(CspConfiguration::in_memory().with_retry(RetryPolicy::none()))
            .build()
            .unwrap();
        let ctx =
            KeyContext::create(&csp, "cert-test", ProviderType::Gost2012_256, ContextFlags::NONE)
                .unwrap();
        ctx.create_key(false, KeySlot::Signature).unwrap();
        let cert = CertificateIssuer::new(subject)
            .with_serial(vec![0x0a, 0x1b, 0x00])
            .self_signed(&ctx, KeySlot::Signature)
            .unwrap();
        (ctx, cert)
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(matches!(
            Certificate::load(b"definitely not a certificate"),
            Err(CspError::FormatError(_))
        ));
        assert!(Certificate::load(b"-----BEGIN CERTIFICATE-----\n!!!\n-----END CERTIFICATE-----\n")
            .is_err());
    }

    #[test]
    fn test_pem_and_der_give_same_thumbprint() {
        let (_, cert) = issued("CN=test");
        let pem_text = pem::encode(&pem::Pem::new("CERTIFICATE", cert.extract()));
        let from_pem = Certificate::load(pem_text.as_bytes()).unwrap();
        assert_eq!(from_pem.thumbprint(), cert.thumbprint());
        assert_eq!(from_pem.extract(), cert.extract());
    }

    #[test]
    fn test_accessors() {
        let (_, cert) = issued("CN=test,O=Example");
        assert_eq!(cert.common_name().as_deref(), Some("test"));
        assert!(cert.subject().contains("CN=test"));
        assert_eq!(cert.subject(), cert.issuer());
        assert_eq!(cert.version(), 3);
        assert_eq!(cert.serial_bytes(), vec![0x0a, 0x1b, 0x00]);
        assert_eq!(cert.serial_hex(), "a:1b:0");
        assert!(cert.can_sign());
        assert!(cert.can_encrypt());
        assert_eq!(cert.key_usage() & CERT_KEY_CERT_SIGN_KEY_USAGE, 0);
        assert!(cert.extension_oids().contains(&OID_KEY_USAGE));
        assert!(cert.subject_key_id().is_some());
        assert!(cert.not_before() < cert.not_after());
    }

    #[test]
    fn test_duplicate_is_unbound_with_same_thumbprint() {
        let (_, cert) = issued("CN=test");
        assert!(cert.is_bound());
        let dup = cert.duplicate();
        assert!(!dup.is_bound());
        assert_eq!(dup.thumbprint(), cert.thumbprint());
        assert_eq!(dup.thumbprint().as_bytes().len(), 20);
    }

    #[test]
    fn test_bind_to_foreign_container_fails() {
        let (ctx, cert) = issued("CN=test");
        let other = KeyContext::create(ctx.csp(), "other", ProviderType::Gost2012_256, ContextFlags::NONE)
            .unwrap();
        other.create_key(false, KeySlot::Signature).unwrap();
        let mut dup = cert.duplicate();
        assert!(matches!(dup.bind(&other), Err(CspError::CryptoFailure(_))));
        dup.bind(&ctx).unwrap();
        assert_eq!(dup.binding().unwrap().slot, KeySlot::Signature);
    }
}
