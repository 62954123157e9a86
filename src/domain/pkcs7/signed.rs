//! `SignedData` and `SignerInfo` codec.

use crate::domain::asn1::{self, DerReader};
use crate::domain::constants::{
    ASN1_CONTEXT_0, ASN1_CONTEXT_1, ASN1_INTEGER_TAG, ASN1_OCTET_STRING_CONSTRUCTED_TAG,
    ASN1_OCTET_STRING_TAG, ASN1_SEQUENCE_TAG, ASN1_SET_TAG, OID_CONTENT_TYPE, OID_MESSAGE_DIGEST,
};
use crate::domain::crypto::HashAlgorithm;
use crate::domain::pkcs7::{ContentType, IssuerAndSerial};
use crate::infra::error::{CspError, CspResult};
use der::asn1::ObjectIdentifier;

/// Authenticated attributes of a signer: content type and message digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAttributes {
    pub content_type: ObjectIdentifier,
    pub message_digest: Vec<u8>,
    /// Exact SET encoding the signature was computed over
    encoded: Vec<u8>,
}

impl SignedAttributes {
    #[must_use]
    pub fn new(content_type: ContentType, message_digest: Vec<u8>) -> Self {
        let ct_attr = asn1::sequence(&[
            &asn1::oid(&OID_CONTENT_TYPE),
            &asn1::set_of(&[asn1::oid(&content_type.oid())]),
        ]);
        let md_attr = asn1::sequence(&[
            &asn1::oid(&OID_MESSAGE_DIGEST),
            &asn1::set_of(&[asn1::octet_string(&message_digest)]),
        ]);
        let encoded = asn1::set_of(&[ct_attr, md_attr]);
        Self {
            content_type: content_type.oid(),
            message_digest,
            encoded,
        }
    }

    /// The `SET OF Attribute` encoding that is hashed and signed.
    #[must_use]
    pub fn signed_bytes(&self) -> &[u8] {
        &self.encoded
    }

    /// Attributes from their `[0] IMPLICIT` element. The signed bytes are
    /// the received encoding with the SET tag restored.
    fn decode(implicit: &asn1::Tlv<'_>) -> CspResult<Self> {
        let encoded = asn1::retag(implicit.raw, ASN1_SET_TAG)?;
        let mut content_type = None;
        let mut message_digest = None;
        let mut attrs = implicit.reader();
        while !attrs.is_empty() {
            let attr = attrs.expect(ASN1_SEQUENCE_TAG)?;
            let mut fields = attr.reader();
            let attr_type = fields.read()?.to_oid()?;
            let values = fields.expect(ASN1_SET_TAG)?;
            let first = values.reader().read()?;
            if attr_type == OID_CONTENT_TYPE {
                content_type = Some(first.to_oid()?);
            } else if attr_type == OID_MESSAGE_DIGEST {
                if !is_octet_string(&first) {
                    return Err(CspError::FormatError(
                        "messageDigest is not an OCTET STRING".to_string(),
                    ));
                }
                message_digest = Some(first.octets()?);
            }
        }
        let content_type = content_type.ok_or_else(|| {
            CspError::FormatError("Signed attributes lack contentType".to_string())
        })?;
        let message_digest = message_digest.ok_or_else(|| {
            CspError::FormatError("Signed attributes lack messageDigest".to_string())
        })?;
        Ok(Self {
            content_type,
            message_digest,
            encoded,
        })
    }
}

fn is_octet_string(element: &asn1::Tlv<'_>) -> bool {
    element.tag == ASN1_OCTET_STRING_TAG || element.tag == ASN1_OCTET_STRING_CONSTRUCTED_TAG
}

/// One signer of a `SignedData`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerInfo {
    pub version: u32,
    pub sid: IssuerAndSerial,
    pub digest_algorithm: HashAlgorithm,
    pub signed_attributes: Option<SignedAttributes>,
    /// Public key algorithm OID of the signer
    pub signature_algorithm: ObjectIdentifier,
    pub signature: Vec<u8>,
}

impl SignerInfo {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut parts: Vec<Vec<u8>> = vec![
            asn1::small_integer(self.version as u8),
            self.sid.encode(),
            asn1::algorithm_identifier(&self.digest_algorithm.oid()),
        ];
        if let Some(attrs) = &self.signed_attributes {
            // [0] IMPLICIT SET OF Attribute
            let mut implicit = attrs.signed_bytes().to_vec();
            implicit[0] = ASN1_CONTEXT_0;
            parts.push(implicit);
        }
        parts.push(asn1::algorithm_identifier(&self.signature_algorithm));
        parts.push(asn1::octet_string(&self.signature));
        let refs: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
        asn1::sequence(&refs)
    }

    /// Decode one `SignerInfo` from a reader.
    ///
    /// # Errors
    /// Returns `FormatError` for malformed input and `Unsupported` for
    /// non-GOST digest algorithms.
    pub fn decode(reader: &mut DerReader<'_>) -> CspResult<Self> {
        let seq = reader.expect(ASN1_SEQUENCE_TAG)?;
        let mut fields = seq.reader();
        let version = fields.expect(ASN1_INTEGER_TAG)?.to_u32()?;
        let sid = IssuerAndSerial::decode(&mut fields)?;
        let digest_alg = fields.expect(ASN1_SEQUENCE_TAG)?;
        let digest_algorithm = HashAlgorithm::from_oid(&digest_alg.reader().read()?.to_oid()?)?;
        let signed_attributes = match fields.optional(ASN1_CONTEXT_0)? {
            Some(implicit) => Some(SignedAttributes::decode(&implicit)?),
            None => None,
        };
        let sig_alg = fields.expect(ASN1_SEQUENCE_TAG)?;
        let signature_algorithm = sig_alg.reader().read()?.to_oid()?;
        let signature = fields.expect_octets()?;
        Ok(Self {
            version,
            sid,
            digest_algorithm,
            signed_attributes,
            signature_algorithm,
            signature,
        })
    }
}

/// Decoded or to-be-encoded `SignedData`.
#[derive(Debug, Clone, Default)]
pub struct SignedData {
    pub digest_algorithms: Vec<HashAlgorithm>,
    /// Encapsulated payload, `None` for a detached signature
    pub content: Option<Vec<u8>>,
    /// DER certificates carried in the message
    pub certificates: Vec<Vec<u8>>,
    pub signer_infos: Vec<SignerInfo>,
}

impl SignedData {
    /// Encode the `SignedData` body (without the outer `ContentInfo`).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut digest_algs: Vec<Vec<u8>> = Vec::new();
        for alg in &self.digest_algorithms {
            let encoded = asn1::algorithm_identifier(&alg.oid());
            if !digest_algs.contains(&encoded) {
                digest_algs.push(encoded);
            }
        }

        let data_oid = asn1::oid(&ContentType::Data.oid());
        let encap = match &self.content {
            Some(payload) => {
                asn1::sequence(&[&data_oid, &asn1::context(0, &asn1::octet_string(payload))])
            }
            None => asn1::sequence(&[&data_oid]),
        };

        let mut parts: Vec<Vec<u8>> = vec![
            asn1::small_integer(1),
            asn1::set_of(&digest_algs),
            encap,
        ];
        if !self.certificates.is_empty() {
            parts.push(asn1::context(0, &self.certificates.concat()));
        }
        let signer_infos: Vec<Vec<u8>> = self.signer_infos.iter().map(SignerInfo::encode).collect();
        parts.push(asn1::set_of(&signer_infos));

        let refs: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
        asn1::sequence(&refs)
    }

    /// Decode a DER or BER `SignedData` body.
    ///
    /// # Errors
    /// Returns `FormatError` for malformed input.
    pub fn decode(der_bytes: &[u8]) -> CspResult<Self> {
        let outer = asn1::parse_single(der_bytes)?;
        if outer.tag != ASN1_SEQUENCE_TAG {
            return Err(CspError::FormatError(
                "SignedData is not a SEQUENCE".to_string(),
            ));
        }
        let mut fields = outer.reader();
        fields.expect(ASN1_INTEGER_TAG)?.to_u32()?;

        let mut digest_algorithms = Vec::new();
        let mut algs = fields.expect(ASN1_SET_TAG)?.reader();
        while !algs.is_empty() {
            let alg = algs.expect(ASN1_SEQUENCE_TAG)?;
            let oid = alg.reader().read()?.to_oid()?;
            match HashAlgorithm::from_oid(&oid) {
                Ok(hash) => digest_algorithms.push(hash),
                Err(_) => log::debug!("Ignoring unsupported digest algorithm {oid}"),
            }
        }

        let encap = fields.expect(ASN1_SEQUENCE_TAG)?;
        let mut encap_fields = encap.reader();
        let econtent_type = encap_fields.read()?.to_oid()?;
        if econtent_type != ContentType::Data.oid() {
            log::debug!("Encapsulated content type {econtent_type} treated as opaque data");
        }
        let content = match encap_fields.optional(ASN1_CONTEXT_0)? {
            Some(explicit) => {
                let os = asn1::parse_single(explicit.content)?;
                if !is_octet_string(&os) {
                    return Err(CspError::FormatError(
                        "eContent is not an OCTET STRING".to_string(),
                    ));
                }
                Some(os.octets()?)
            }
            None => None,
        };

        let mut certificates = Vec::new();
        if let Some(certs) = fields.optional(ASN1_CONTEXT_0)? {
            for cert in certs.reader().read_all()? {
                if cert.tag == ASN1_SEQUENCE_TAG {
                    certificates.push(cert.raw.to_vec());
                }
            }
        }
        // CRLs are not used
        fields.optional(ASN1_CONTEXT_1)?;

        let mut signer_infos = Vec::new();
        let mut infos = fields.expect(ASN1_SET_TAG)?.reader();
        while !infos.is_empty() {
            signer_infos.push(SignerInfo::decode(&mut infos)?);
        }

        Ok(Self {
            digest_algorithms,
            content,
            certificates,
            signer_infos,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constants::OID_GOST_R3410_2012_256;

    fn sample_signer(attrs: bool) -> SignerInfo {
        SignerInfo {
            version: 1,
            sid: IssuerAndSerial {
                issuer: asn1::sequence(&[]),
                serial: vec![0x01, 0x02],
            },
            digest_algorithm: HashAlgorithm::Streebog256,
            signed_attributes: attrs
                .then(|| SignedAttributes::new(ContentType::Data, vec![0xAB; 32])),
            signature_algorithm: OID_GOST_R3410_2012_256,
            signature: vec![0x55; 64],
        }
    }

    #[test]
    fn test_signed_data_round_trip() {
        let sd = SignedData {
            digest_algorithms: vec![HashAlgorithm::Streebog256, HashAlgorithm::Streebog256],
            content: Some(b"hurblewurble".to_vec()),
            certificates: vec![asn1::sequence(&[&asn1::small_integer(7)])],
            signer_infos: vec![sample_signer(true), sample_signer(false)],
        };
        let decoded = SignedData::decode(&sd.encode()).unwrap();
        assert_eq!(decoded.digest_algorithms, vec![HashAlgorithm::Streebog256]);
        assert_eq!(decoded.content.as_deref(), Some(&b"hurblewurble"[..]));
        assert_eq!(decoded.certificates, sd.certificates);
        assert_eq!(decoded.signer_infos.len(), 2);
        assert!(decoded
            .signer_infos
            .iter()
            .any(|si| si.signed_attributes.is_none()));
    }

    #[test]
    fn test_indefinite_length_signed_data() {
        let signer = sample_signer(true);
        let mut ber = vec![0x30, 0x80];
        ber.extend(asn1::small_integer(1));
        ber.extend(asn1::set_of(&[asn1::algorithm_identifier(
            &HashAlgorithm::Streebog256.oid(),
        )]));
        ber.extend([0x30, 0x80]);
        ber.extend(asn1::oid(&ContentType::Data.oid()));
        ber.extend([0xA0, 0x80, 0x24, 0x80]);
        ber.extend(asn1::octet_string(b"hurbl"));
        ber.extend(asn1::octet_string(b"ewurble"));
        ber.extend([0x00; 6]);
        ber.extend(asn1::set_of(&[signer.encode()]));
        ber.extend([0x00, 0x00]);

        let decoded = SignedData::decode(&ber).unwrap();
        assert_eq!(decoded.content.as_deref(), Some(&b"hurblewurble"[..]));
        assert_eq!(decoded.signer_infos, vec![signer.clone()]);
        assert_eq!(
            decoded.signer_infos[0]
                .signed_attributes
                .as_ref()
                .unwrap()
                .signed_bytes(),
            signer.signed_attributes.as_ref().unwrap().signed_bytes()
        );
    }

    #[test]
    fn test_detached_has_no_content() {
        let sd = SignedData {
            digest_algorithms: vec![HashAlgorithm::Gost94],
            content: None,
            certificates: Vec::new(),
            signer_infos: vec![sample_signer(true)],
        };
        let decoded = SignedData::decode(&sd.encode()).unwrap();
        assert!(decoded.content.is_none());
        assert!(decoded.certificates.is_empty());
    }

    #[test]
    fn test_signed_attributes_reencode_exactly() {
        let attrs = SignedAttributes::new(ContentType::Data, vec![0x01; 32]);
        let signer = SignerInfo {
            signed_attributes: Some(attrs.clone()),
            ..sample_signer(false)
        };
        let encoded = signer.encode();
        let decoded = SignerInfo::decode(&mut DerReader::new(&encoded)).unwrap();
        let decoded_attrs = decoded.signed_attributes.unwrap();
        assert_eq!(decoded_attrs.signed_bytes(), attrs.signed_bytes());
        assert_eq!(decoded_attrs.message_digest, vec![0x01; 32]);
        assert_eq!(decoded_attrs.signed_bytes()[0], ASN1_SET_TAG);
    }
}
