//! Minimal DER writer and TLV reader for the PKCS#7 structures built here.
//!
//! Certificates, names and public key infos go through `der`/`x509-cert`;
//! the message containers are assembled by hand because their layout is
//! fixed and every byte of the signed attributes must be reproduced exactly
//! during verification.
//!
//! Output is always DER. The reader also takes BER as produced by streaming
//! encoders: indefinite lengths, non-minimal lengths and segmented
//! OCTET STRINGs.

use crate::domain::constants::{
    ASN1_BMP_STRING_TAG, ASN1_CONSTRUCTED, ASN1_IA5_STRING_TAG, ASN1_INDEFINITE_LENGTH,
    ASN1_INTEGER_TAG, ASN1_NUMERIC_STRING_TAG, ASN1_OCTET_STRING_CONSTRUCTED_TAG,
    ASN1_OCTET_STRING_TAG, ASN1_OID_TAG, ASN1_PRINTABLE_STRING_TAG, ASN1_SEQUENCE_TAG,
    ASN1_SET_TAG, ASN1_UTF8_STRING_TAG,
};
use crate::infra::error::{CspError, CspResult};
use der::asn1::ObjectIdentifier;

/// Encode a DER length.
#[must_use]
pub fn encode_len(len: usize) -> Vec<u8> {
    if len < 128 {
        return vec![len as u8];
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let significant = &bytes[skip..];
    let mut out = Vec::with_capacity(1 + significant.len());
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
    out
}

/// Tag, length and content.
#[must_use]
pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 6);
    out.push(tag);
    out.extend(encode_len(content.len()));
    out.extend_from_slice(content);
    out
}

/// SEQUENCE of already-encoded elements.
#[must_use]
pub fn sequence(parts: &[&[u8]]) -> Vec<u8> {
    tlv(ASN1_SEQUENCE_TAG, &parts.concat())
}

/// SET OF already-encoded elements, sorted by encoding.
#[must_use]
pub fn set_of(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut sorted: Vec<&Vec<u8>> = parts.iter().collect();
    sorted.sort();
    let content: Vec<u8> = sorted.into_iter().flatten().copied().collect();
    tlv(ASN1_SET_TAG, &content)
}

#[must_use]
pub fn oid(oid: &ObjectIdentifier) -> Vec<u8> {
    tlv(ASN1_OID_TAG, oid.as_bytes())
}

#[must_use]
pub fn octet_string(content: &[u8]) -> Vec<u8> {
    tlv(ASN1_OCTET_STRING_TAG, content)
}

/// INTEGER from a small non-negative value.
#[must_use]
pub fn small_integer(value: u8) -> Vec<u8> {
    if value < 0x80 {
        vec![ASN1_INTEGER_TAG, 0x01, value]
    } else {
        vec![ASN1_INTEGER_TAG, 0x02, 0x00, value]
    }
}

/// Context-specific tag `[n]`, constructed.
#[must_use]
pub fn context(n: u8, content: &[u8]) -> Vec<u8> {
    tlv(0xA0 | n, content)
}

/// Context-specific tag `[n]`, primitive.
#[must_use]
pub fn context_primitive(n: u8, content: &[u8]) -> Vec<u8> {
    tlv(0x80 | n, content)
}

/// AlgorithmIdentifier without parameters.
#[must_use]
pub fn algorithm_identifier(alg: &ObjectIdentifier) -> Vec<u8> {
    sequence(&[&oid(alg)])
}

/// Replace the outer tag of an encoded element (IMPLICIT re-tagging).
///
/// # Errors
/// Returns `FormatError` for empty input.
pub fn retag(encoded: &[u8], tag: u8) -> CspResult<Vec<u8>> {
    let (_, rest) = encoded
        .split_first()
        .ok_or_else(|| CspError::FormatError("Cannot re-tag empty element".to_string()))?;
    let mut out = Vec::with_capacity(encoded.len());
    out.push(tag);
    out.extend_from_slice(rest);
    Ok(out)
}

/// One decoded element.
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    pub tag: u8,
    /// Content octets, without the end-of-contents marker of an
    /// indefinite-length element
    pub content: &'a [u8],
    /// The complete encoding including tag and length
    pub raw: &'a [u8],
}

impl<'a> Tlv<'a> {
    #[must_use]
    pub fn is_constructed(&self) -> bool {
        self.tag & ASN1_CONSTRUCTED != 0
    }

    /// String value of the element. A primitive element yields its
    /// content; a constructed one the concatenation of its OCTET STRING
    /// segments, nested to any depth.
    ///
    /// # Errors
    /// Returns `FormatError` when a segment is not an OCTET STRING.
    pub fn octets(&self) -> CspResult<Vec<u8>> {
        if !self.is_constructed() {
            return Ok(self.content.to_vec());
        }
        let mut out = Vec::with_capacity(self.content.len());
        let mut segments = self.reader();
        while !segments.is_empty() {
            let segment = segments.read()?;
            if segment.tag != ASN1_OCTET_STRING_TAG
                && segment.tag != ASN1_OCTET_STRING_CONSTRUCTED_TAG
            {
                return Err(CspError::FormatError(format!(
                    "Segment of a constructed string has tag 0x{:02x}",
                    segment.tag
                )));
            }
            out.extend(segment.octets()?);
        }
        Ok(out)
    }

    /// Reader over the content of a constructed element.
    #[must_use]
    pub fn reader(&self) -> DerReader<'a> {
        DerReader::new(self.content)
    }

    /// Decode the content as an OBJECT IDENTIFIER.
    ///
    /// # Errors
    /// Returns `FormatError` when the element is not a valid OID.
    pub fn to_oid(&self) -> CspResult<ObjectIdentifier> {
        if self.tag != ASN1_OID_TAG {
            return Err(CspError::FormatError(format!(
                "Expected OBJECT IDENTIFIER, found tag 0x{:02x}",
                self.tag
            )));
        }
        ObjectIdentifier::from_bytes(self.content)
            .map_err(|e| CspError::FormatError(format!("Invalid OID: {e}")))
    }

    /// Decode the content as a small non-negative INTEGER.
    ///
    /// # Errors
    /// Returns `FormatError` for other tags or values that do not fit in u32.
    pub fn to_u32(&self) -> CspResult<u32> {
        if self.tag != ASN1_INTEGER_TAG || self.content.is_empty() || self.content.len() > 5 {
            return Err(CspError::FormatError("Expected small INTEGER".to_string()));
        }
        if self.content[0] & 0x80 != 0 {
            return Err(CspError::FormatError("Negative INTEGER".to_string()));
        }
        let mut value: u64 = 0;
        for &b in self.content {
            value = (value << 8) | u64::from(b);
        }
        u32::try_from(value).map_err(|_| CspError::FormatError("INTEGER too large".to_string()))
    }
}

/// Sequential reader over concatenated DER or BER elements.
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Tag of the next element, if any.
    #[must_use]
    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read the next element.
    ///
    /// # Errors
    /// Returns `FormatError` for truncated input, a primitive element with
    /// indefinite length, a missing end-of-contents marker and high tag
    /// numbers.
    pub fn read(&mut self) -> CspResult<Tlv<'a>> {
        let start = self.pos;
        let tag = *self
            .data
            .get(start)
            .ok_or_else(|| CspError::FormatError("Unexpected end of DER input".to_string()))?;
        if tag & 0x1F == 0x1F {
            return Err(CspError::FormatError(
                "High tag numbers are not supported".to_string(),
            ));
        }
        let first = *self
            .data
            .get(start + 1)
            .ok_or_else(|| CspError::FormatError("Missing DER length".to_string()))?;
        let (len, len_size) = if first < 0x80 {
            (usize::from(first), 1)
        } else if first == ASN1_INDEFINITE_LENGTH {
            return self.read_indefinite(start, tag);
        } else {
            let n = usize::from(first & 0x7F);
            if n > 4 {
                return Err(CspError::FormatError(format!("DER length of {n} bytes")));
            }
            let bytes = self
                .data
                .get(start + 2..start + 2 + n)
                .ok_or_else(|| CspError::FormatError("Truncated DER length".to_string()))?;
            let len = bytes
                .iter()
                .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
            (len, 1 + n)
        };
        let content_start = start + 1 + len_size;
        let end = content_start
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                CspError::FormatError(format!(
                    "DER element of {len} bytes overruns its container"
                ))
            })?;
        self.pos = end;
        Ok(Tlv {
            tag,
            content: &self.data[content_start..end],
            raw: &self.data[start..end],
        })
    }

    /// Constructed element whose content runs up to a `00 00` marker.
    fn read_indefinite(&mut self, start: usize, tag: u8) -> CspResult<Tlv<'a>> {
        if tag & ASN1_CONSTRUCTED == 0 {
            return Err(CspError::FormatError(format!(
                "Indefinite length on primitive tag 0x{tag:02x}"
            )));
        }
        let content_start = start + 2;
        let mut inner = DerReader {
            data: self.data,
            pos: content_start,
        };
        loop {
            match self.data.get(inner.pos..inner.pos + 2) {
                Some([0x00, 0x00]) => break,
                Some(_) => {
                    inner.read()?;
                }
                None => {
                    return Err(CspError::FormatError(
                        "Missing end-of-contents marker".to_string(),
                    ))
                }
            }
        }
        let content_end = inner.pos;
        self.pos = content_end + 2;
        Ok(Tlv {
            tag,
            content: &self.data[content_start..content_end],
            raw: &self.data[start..self.pos],
        })
    }

    /// Read an OCTET STRING in either form and return its value.
    ///
    /// # Errors
    /// Returns `FormatError` for any other element.
    pub fn expect_octets(&mut self) -> CspResult<Vec<u8>> {
        let element = self.read()?;
        if element.tag != ASN1_OCTET_STRING_TAG && element.tag != ASN1_OCTET_STRING_CONSTRUCTED_TAG
        {
            return Err(CspError::FormatError(format!(
                "Expected OCTET STRING, found tag 0x{:02x}",
                element.tag
            )));
        }
        element.octets()
    }

    /// Read the next element and check its tag.
    ///
    /// # Errors
    /// Returns `FormatError` when the tag differs.
    pub fn expect(&mut self, tag: u8) -> CspResult<Tlv<'a>> {
        let element = self.read()?;
        if element.tag != tag {
            return Err(CspError::FormatError(format!(
                "Expected tag 0x{tag:02x}, found 0x{:02x}",
                element.tag
            )));
        }
        Ok(element)
    }

    /// Read the next element only if it carries `tag`.
    ///
    /// # Errors
    /// Returns `FormatError` when the element is malformed.
    pub fn optional(&mut self, tag: u8) -> CspResult<Option<Tlv<'a>>> {
        if self.peek_tag() == Some(tag) {
            self.read().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Read all remaining elements.
    ///
    /// # Errors
    /// Returns `FormatError` when any element is malformed.
    pub fn read_all(&mut self) -> CspResult<Vec<Tlv<'a>>> {
        let mut out = Vec::new();
        while !self.is_empty() {
            out.push(self.read()?);
        }
        Ok(out)
    }
}

/// Parse exactly one element spanning the whole input.
///
/// # Errors
/// Returns `FormatError` for malformed input or trailing bytes.
pub fn parse_single(data: &[u8]) -> CspResult<Tlv<'_>> {
    let mut reader = DerReader::new(data);
    let element = reader.read()?;
    if !reader.is_empty() {
        return Err(CspError::FormatError(
            "Trailing data after DER element".to_string(),
        ));
    }
    Ok(element)
}

/// Attributes of a DER `Name` in order, values as text.
///
/// String types are decoded; any other value type is rendered as hex.
///
/// # Errors
/// Returns `FormatError` for a malformed name.
pub fn name_attributes(name_der: &[u8]) -> CspResult<Vec<(ObjectIdentifier, String)>> {
    let name = parse_single(name_der)?;
    if name.tag != ASN1_SEQUENCE_TAG {
        return Err(CspError::FormatError("Name is not a SEQUENCE".to_string()));
    }
    let mut out = Vec::new();
    let mut rdns = name.reader();
    while !rdns.is_empty() {
        let mut atvs = rdns.expect(ASN1_SET_TAG)?.reader();
        while !atvs.is_empty() {
            let mut atv = atvs.expect(ASN1_SEQUENCE_TAG)?.reader();
            let attr_type = atv.read()?.to_oid()?;
            let value = atv.read()?;
            out.push((attr_type, value_text(&value)));
        }
    }
    Ok(out)
}

fn value_text(value: &Tlv<'_>) -> String {
    match value.tag {
        ASN1_UTF8_STRING_TAG
        | ASN1_NUMERIC_STRING_TAG
        | ASN1_PRINTABLE_STRING_TAG
        | ASN1_IA5_STRING_TAG => String::from_utf8_lossy(value.content).into_owned(),
        ASN1_BMP_STRING_TAG => {
            let units: Vec<u16> = value
                .content
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => hex::encode(value.content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constants::OID_PKCS7_DATA;

    #[test]
    fn test_encode_len_forms() {
        assert_eq!(encode_len(0x7f), vec![0x7f]);
        assert_eq!(encode_len(0x80), vec![0x81, 0x80]);
        assert_eq!(encode_len(0x1234), vec![0x82, 0x12, 0x34]);
        assert_eq!(encode_len(0x0102_0304), vec![0x84, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_reader_walks_nested_sequence() {
        let inner = octet_string(&[0xAA; 300]);
        let encoded = sequence(&[&oid(&OID_PKCS7_DATA), &small_integer(1), &inner]);

        let outer = parse_single(&encoded).unwrap();
        assert_eq!(outer.tag, ASN1_SEQUENCE_TAG);
        let mut r = outer.reader();
        assert_eq!(r.read().unwrap().to_oid().unwrap(), OID_PKCS7_DATA);
        assert_eq!(r.read().unwrap().to_u32().unwrap(), 1);
        let os = r.expect(ASN1_OCTET_STRING_TAG).unwrap();
        assert_eq!(os.content.len(), 300);
        assert_eq!(os.raw, inner.as_slice());
        assert!(r.is_empty());
    }

    #[test]
    fn test_set_of_sorts_elements() {
        let a = octet_string(&[2]);
        let b = octet_string(&[1]);
        let set = set_of(&[a.clone(), b.clone()]);
        assert_eq!(set[2..5], b[..]);
        assert_eq!(set[5..8], a[..]);
    }

    #[test]
    fn test_rejects_truncated() {
        assert!(parse_single(&[0x30, 0x05, 0x01]).is_err());
        assert!(parse_single(&[0x04, 0x01, 0x00, 0xFF]).is_err());
        assert!(DerReader::new(&[]).read().is_err());
    }

    #[test]
    fn test_indefinite_length_elements() {
        let empty = parse_single(&[0x30, 0x80, 0x00, 0x00]).unwrap();
        assert!(empty.content.is_empty());

        // SEQUENCE { SEQUENCE (indefinite) { INTEGER 5 }, INTEGER 6 } (indefinite)
        let nested = [
            0x30, 0x80, 0x30, 0x80, 0x02, 0x01, 0x05, 0x00, 0x00, 0x02, 0x01, 0x06, 0x00, 0x00,
        ];
        let outer = parse_single(&nested).unwrap();
        assert_eq!(outer.raw.len(), nested.len());
        let mut r = outer.reader();
        let inner = r.expect(ASN1_SEQUENCE_TAG).unwrap();
        assert_eq!(inner.raw, &nested[2..9]);
        assert_eq!(inner.reader().read().unwrap().to_u32().unwrap(), 5);
        assert_eq!(r.read().unwrap().to_u32().unwrap(), 6);
        assert!(r.is_empty());

        assert!(parse_single(&[0x04, 0x80, 0x01, 0x00, 0x00]).is_err());
        assert!(parse_single(&[0x30, 0x80, 0x02, 0x01, 0x05]).is_err());
        assert!(parse_single(&[0x30, 0x80, 0x02, 0x01, 0x05, 0x00]).is_err());
    }

    #[test]
    fn test_non_minimal_length_accepted() {
        let element = parse_single(&[0x04, 0x81, 0x02, 0xAA, 0xBB]).unwrap();
        assert_eq!(element.content, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_segmented_octet_string() {
        // definite outer with an indefinite inner segment group
        let encoded = [
            0x24, 0x0C, 0x04, 0x02, 0x01, 0x02, 0x24, 0x80, 0x04, 0x02, 0x03, 0x04, 0x00, 0x00,
        ];
        assert_eq!(
            DerReader::new(&encoded).expect_octets().unwrap(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(
            DerReader::new(&octet_string(&[9, 9])).expect_octets().unwrap(),
            vec![9, 9]
        );
        assert!(DerReader::new(&[0x24, 0x03, 0x02, 0x01, 0x00])
            .expect_octets()
            .is_err());
        assert!(DerReader::new(&small_integer(1)).expect_octets().is_err());
    }

    #[test]
    fn test_small_integer_high_bit() {
        let enc = small_integer(0x80);
        assert_eq!(enc, vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(parse_single(&enc).unwrap().to_u32().unwrap(), 0x80);
    }

    #[test]
    fn test_retag() {
        let set = set_of(&[octet_string(&[1])]);
        let implicit = retag(&set, 0xA0).unwrap();
        assert_eq!(implicit[0], 0xA0);
        assert_eq!(&implicit[1..], &set[1..]);
    }

    #[test]
    fn test_name_attributes() {
        let cn = sequence(&[
            &oid(&ObjectIdentifier::new_unwrap("2.5.4.3")),
            &tlv(ASN1_UTF8_STRING_TAG, "Тест".as_bytes()),
        ]);
        let country = sequence(&[
            &oid(&ObjectIdentifier::new_unwrap("2.5.4.6")),
            &tlv(ASN1_PRINTABLE_STRING_TAG, b"RU"),
        ]);
        let name = sequence(&[&set_of(&[country]), &set_of(&[cn])]);
        let attrs = name_attributes(&name).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].1, "RU");
        assert_eq!(attrs[1].0.to_string(), "2.5.4.3");
        assert_eq!(attrs[1].1, "Тест");
        assert!(name_attributes(&octet_string(b"x")).is_err());
    }
}
