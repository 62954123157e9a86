//! `EnvelopedData` codec with GOST key transport recipients.
//!
//! Each recipient carries a `GostR3410-KeyTransport`:
//!
//! ```text
//! SEQUENCE {
//!     encryptedKey         OCTET STRING,          -- KExp15 output
//!     ephemeralPublicKey   [0] IMPLICIT SubjectPublicKeyInfo,
//!     ukm                  OCTET STRING }         -- 32 bytes
//! }
//! ```

use crate::domain::asn1::{self, DerReader};
use crate::domain::constants::{
    ASN1_CONTEXT_0, ASN1_CONTEXT_0_PRIMITIVE, ASN1_INTEGER_TAG, ASN1_SEQUENCE_TAG, ASN1_SET_TAG,
};
use crate::domain::pkcs7::{ContentType, IssuerAndSerial};
use crate::infra::error::{CspError, CspResult};
use der::asn1::ObjectIdentifier;

/// Wrapped content key for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTransport {
    pub encrypted_key: Vec<u8>,
    /// DER SubjectPublicKeyInfo of the sender's ephemeral key
    pub ephemeral_public_key: Vec<u8>,
    pub ukm: Vec<u8>,
}

impl KeyTransport {
    /// # Errors
    /// Returns `FormatError` if the ephemeral key encoding is empty.
    pub fn encode(&self) -> CspResult<Vec<u8>> {
        let ephemeral = asn1::retag(&self.ephemeral_public_key, ASN1_CONTEXT_0)?;
        Ok(asn1::sequence(&[
            &asn1::octet_string(&self.encrypted_key),
            &ephemeral,
            &asn1::octet_string(&self.ukm),
        ]))
    }

    /// # Errors
    /// Returns `FormatError` for malformed input.
    pub fn decode(der_bytes: &[u8]) -> CspResult<Self> {
        let seq = asn1::parse_single(der_bytes)?;
        if seq.tag != ASN1_SEQUENCE_TAG {
            return Err(CspError::FormatError(
                "Key transport is not a SEQUENCE".to_string(),
            ));
        }
        let mut fields = seq.reader();
        let encrypted_key = fields.expect_octets()?;
        let ephemeral = fields.expect(ASN1_CONTEXT_0).map_err(|_| {
            CspError::FormatError("Key transport lacks the ephemeral public key".to_string())
        })?;
        let ephemeral_public_key = asn1::retag(ephemeral.raw, ASN1_SEQUENCE_TAG)?;
        let ukm = fields.expect_octets()?;
        Ok(Self {
            encrypted_key,
            ephemeral_public_key,
            ukm,
        })
    }
}

/// `KeyTransRecipientInfo` identified by issuer and serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientInfo {
    pub rid: IssuerAndSerial,
    /// Recipient public key algorithm
    pub key_encryption_algorithm: ObjectIdentifier,
    /// Encoded [`KeyTransport`]
    pub encrypted_key: Vec<u8>,
}

impl RecipientInfo {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        asn1::sequence(&[
            &asn1::small_integer(0),
            &self.rid.encode(),
            &asn1::algorithm_identifier(&self.key_encryption_algorithm),
            &asn1::octet_string(&self.encrypted_key),
        ])
    }

    /// # Errors
    /// Returns `FormatError` for malformed input.
    pub fn decode(reader: &mut DerReader<'_>) -> CspResult<Self> {
        let seq = reader.expect(ASN1_SEQUENCE_TAG)?;
        let mut fields = seq.reader();
        let version = fields.expect(ASN1_INTEGER_TAG)?.to_u32()?;
        if version != 0 {
            return Err(CspError::Unsupported(format!(
                "Recipient info version {version}"
            )));
        }
        let rid = IssuerAndSerial::decode(&mut fields)?;
        let alg = fields.expect(ASN1_SEQUENCE_TAG)?;
        let key_encryption_algorithm = alg.reader().read()?.to_oid()?;
        let encrypted_key = fields.expect_octets()?;
        Ok(Self {
            rid,
            key_encryption_algorithm,
            encrypted_key,
        })
    }
}

/// `EnvelopedData` body.
#[derive(Debug, Clone)]
pub struct EnvelopedData {
    pub recipients: Vec<RecipientInfo>,
    pub content_encryption_algorithm: ObjectIdentifier,
    /// Content IV carried in the algorithm parameters
    pub iv: Vec<u8>,
    pub encrypted_content: Vec<u8>,
}

impl EnvelopedData {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let recipients: Vec<Vec<u8>> = self.recipients.iter().map(RecipientInfo::encode).collect();
        let params = asn1::sequence(&[&asn1::octet_string(&self.iv)]);
        let alg = asn1::sequence(&[&asn1::oid(&self.content_encryption_algorithm), &params]);
        let eci = asn1::sequence(&[
            &asn1::oid(&ContentType::Data.oid()),
            &alg,
            &asn1::context_primitive(0, &self.encrypted_content),
        ]);
        asn1::sequence(&[&asn1::small_integer(0), &asn1::set_of(&recipients), &eci])
    }

    /// # Errors
    /// Returns `FormatError` for malformed input.
    pub fn decode(der_bytes: &[u8]) -> CspResult<Self> {
        let outer = asn1::parse_single(der_bytes)?;
        if outer.tag != ASN1_SEQUENCE_TAG {
            return Err(CspError::FormatError(
                "EnvelopedData is not a SEQUENCE".to_string(),
            ));
        }
        let mut fields = outer.reader();
        fields.expect(ASN1_INTEGER_TAG)?.to_u32()?;
        // originatorInfo is not produced here
        fields.optional(ASN1_CONTEXT_0)?;

        let mut recipients = Vec::new();
        let mut infos = fields.expect(ASN1_SET_TAG)?.reader();
        while !infos.is_empty() {
            recipients.push(RecipientInfo::decode(&mut infos)?);
        }

        let eci = fields.expect(ASN1_SEQUENCE_TAG)?;
        let mut eci_fields = eci.reader();
        eci_fields.read()?.to_oid()?;
        let alg = eci_fields.expect(ASN1_SEQUENCE_TAG)?;
        let mut alg_fields = alg.reader();
        let content_encryption_algorithm = alg_fields.read()?.to_oid()?;
        let params = alg_fields.expect(ASN1_SEQUENCE_TAG)?;
        let iv = params.reader().expect_octets()?;
        // [0] IMPLICIT OCTET STRING, segmented when BER encoded
        let encrypted_content = match eci_fields.peek_tag() {
            Some(ASN1_CONTEXT_0_PRIMITIVE | ASN1_CONTEXT_0) => eci_fields.read()?.octets()?,
            _ => {
                return Err(CspError::FormatError(
                    "EnvelopedData carries no encrypted content".to_string(),
                ))
            }
        };

        Ok(Self {
            recipients,
            content_encryption_algorithm,
            iv,
            encrypted_content,
        })
    }
}
