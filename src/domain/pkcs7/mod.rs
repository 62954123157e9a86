//! PKCS#7 message structures.
//!
//! `ContentInfo` wrapping plus the two content types this crate produces
//! (`signedData`, `envelopedData`). The remaining members of the family are
//! recognized by OID so callers can report them, but not decoded.

use crate::domain::asn1::{self, DerReader};
use crate::domain::constants::{
    ASN1_CONTEXT_0, ASN1_INTEGER_TAG, ASN1_OCTET_STRING_CONSTRUCTED_TAG, ASN1_OCTET_STRING_TAG,
    ASN1_SEQUENCE_TAG, OID_PKCS7_DATA, OID_PKCS7_DIGESTED_DATA, OID_PKCS7_ENCRYPTED_DATA, OID_PKCS7_ENVELOPED_DATA,
    OID_PKCS7_SIGNED_AND_ENVELOPED_DATA, OID_PKCS7_SIGNED_DATA,
};
use crate::infra::error::{CspError, CspResult};
use der::asn1::ObjectIdentifier;
use der::Decode;
use std::fmt;
use x509_cert::name::Name;

pub mod enveloped;
pub mod signed;

pub use enveloped::{EnvelopedData, KeyTransport, RecipientInfo};
pub use signed::{SignedAttributes, SignedData, SignerInfo};

/// PKCS#7 content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Data,
    SignedData,
    EnvelopedData,
    SignedAndEnvelopedData,
    DigestedData,
    EncryptedData,
}

impl ContentType {
    #[must_use]
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            ContentType::Data => OID_PKCS7_DATA,
            ContentType::SignedData => OID_PKCS7_SIGNED_DATA,
            ContentType::EnvelopedData => OID_PKCS7_ENVELOPED_DATA,
            ContentType::SignedAndEnvelopedData => OID_PKCS7_SIGNED_AND_ENVELOPED_DATA,
            ContentType::DigestedData => OID_PKCS7_DIGESTED_DATA,
            ContentType::EncryptedData => OID_PKCS7_ENCRYPTED_DATA,
        }
    }

    /// Content type from its OID.
    ///
    /// # Errors
    /// Returns `FormatError` for OIDs outside the PKCS#7 family.
    pub fn from_oid(oid: &ObjectIdentifier) -> CspResult<Self> {
        [
            ContentType::Data,
            ContentType::SignedData,
            ContentType::EnvelopedData,
            ContentType::SignedAndEnvelopedData,
            ContentType::DigestedData,
            ContentType::EncryptedData,
        ]
        .into_iter()
        .find(|ct| ct.oid() == *oid)
        .ok_or_else(|| CspError::FormatError(format!("Unknown PKCS#7 content type {oid}")))
    }

    /// Name as used in ASN.1 module definitions.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Data => "data",
            ContentType::SignedData => "signedData",
            ContentType::EnvelopedData => "envelopedData",
            ContentType::SignedAndEnvelopedData => "signedAndEnvelopedData",
            ContentType::DigestedData => "digestedData",
            ContentType::EncryptedData => "encryptedData",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outer `ContentInfo`: content type plus the `[0] EXPLICIT` content.
#[derive(Debug, Clone)]
pub struct ContentInfo {
    pub content_type: ContentType,
    /// Encoding of the inner content, `None` when absent
    pub content: Option<Vec<u8>>,
}

impl ContentInfo {
    /// `ContentInfo` of type `data` around raw bytes.
    #[must_use]
    pub fn data(payload: &[u8]) -> Self {
        Self {
            content_type: ContentType::Data,
            content: Some(asn1::octet_string(payload)),
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let oid = asn1::oid(&self.content_type.oid());
        match &self.content {
            Some(content) => asn1::sequence(&[&oid, &asn1::context(0, content)]),
            None => asn1::sequence(&[&oid]),
        }
    }

    /// Decode a DER or BER `ContentInfo`.
    ///
    /// # Errors
    /// Returns `FormatError` for malformed input or unknown content types.
    pub fn decode(der_bytes: &[u8]) -> CspResult<Self> {
        let outer = asn1::parse_single(der_bytes)?;
        if outer.tag != ASN1_SEQUENCE_TAG {
            return Err(CspError::FormatError(
                "ContentInfo is not a SEQUENCE".to_string(),
            ));
        }
        let mut reader = outer.reader();
        let content_type = ContentType::from_oid(&reader.read()?.to_oid()?)?;
        let content = match reader.optional(ASN1_CONTEXT_0)? {
            Some(explicit) => {
                let inner = asn1::parse_single(explicit.content)?;
                Some(inner.raw.to_vec())
            }
            None => None,
        };
        Ok(Self {
            content_type,
            content,
        })
    }

    /// Payload of a `data` content.
    ///
    /// # Errors
    /// Returns `FormatError` when the content is not an OCTET STRING.
    pub fn data_payload(&self) -> CspResult<Option<Vec<u8>>> {
        match &self.content {
            Some(content) => {
                let os = asn1::parse_single(content)?;
                if os.tag != ASN1_OCTET_STRING_TAG
                    && os.tag != ASN1_OCTET_STRING_CONSTRUCTED_TAG
                {
                    return Err(CspError::FormatError(
                        "data content is not an OCTET STRING".to_string(),
                    ));
                }
                Ok(Some(os.octets()?))
            }
            None => Ok(None),
        }
    }
}

/// `IssuerAndSerialNumber`: how signers and recipients name their certificate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssuerAndSerial {
    /// DER encoding of the issuer `Name`
    pub issuer: Vec<u8>,
    /// Content octets of the serial INTEGER (big-endian)
    pub serial: Vec<u8>,
}

impl IssuerAndSerial {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        asn1::sequence(&[&self.issuer, &asn1::tlv(ASN1_INTEGER_TAG, &self.serial)])
    }

    /// Decode from a reader positioned at the SEQUENCE.
    ///
    /// # Errors
    /// Returns `FormatError` for malformed input.
    pub fn decode(reader: &mut DerReader<'_>) -> CspResult<Self> {
        let seq = reader.expect(ASN1_SEQUENCE_TAG)?;
        let mut inner = seq.reader();
        let issuer = inner.expect(ASN1_SEQUENCE_TAG)?;
        let serial = inner.expect(ASN1_INTEGER_TAG)?;
        Ok(Self {
            issuer: issuer.raw.to_vec(),
            serial: serial.content.to_vec(),
        })
    }

    /// Issuer as a structured name.
    ///
    /// # Errors
    /// Returns `FormatError` when the stored encoding is not a valid Name.
    pub fn issuer_name(&self) -> CspResult<Name> {
        Ok(Name::from_der(&self.issuer)?)
    }

    /// RFC 4514 issuer string, or hex when the name does not parse.
    #[must_use]
    pub fn issuer_string(&self) -> String {
        self.issuer_name()
            .map(|n| n.to_string())
            .unwrap_or_else(|_| hex::encode(&self.issuer))
    }

    /// Serial as colon-separated unpadded hex bytes, most significant first.
    #[must_use]
    pub fn serial_hex(&self) -> String {
        format_serial(&self.serial)
    }
}

/// `a:1b:...` form of serial bytes. A leading sign byte is dropped.
#[must_use]
pub fn format_serial(serial: &[u8]) -> String {
    let trimmed = match serial {
        [0, rest @ ..] if !rest.is_empty() => rest,
        other => other,
    };
    trimmed
        .iter()
        .map(|b| format!("{b:x}"))
        .collect::<Vec<_>>()
        .join(":")
}
