//! Centralized constants: provider identifiers, flag values, tags and OIDs.
//! Keep this intentionally small; only broadly reused literals should live here.

use der::asn1::ObjectIdentifier;

// === Provider names ===

pub const PROV_KC1_GR3410_2001: &str = "Crypto-Pro GOST R 34.10-2001 KC1 CSP";
pub const PROV_KC2_GR3410_2001: &str = "Crypto-Pro GOST R 34.10-2001 KC2 CSP";
pub const PROV_KC1_GR3410_2012: &str = "Crypto-Pro GOST R 34.10-2012 KC1 CSP";
pub const PROV_KC2_GR3410_2012: &str = "Crypto-Pro GOST R 34.10-2012 KC2 CSP";
pub const PROV_KC1_GR3410_2012_512: &str = "Crypto-Pro GOST R 34.10-2012 Strong CSP";
pub const PROV_HSM: &str = "Crypto-Pro HSM CSP";
pub const PROV_GR3410_2001_HSM_LOCAL: &str = "Crypto-Pro GOST R 34.10-2001 HSM Local CSP";
pub const PROV_GR3410_2012_HSM_LOCAL: &str = "Crypto-Pro GOST R 34.10-2012 HSM Local CSP";

// === Provider types ===

pub const PROV_GOST_2001_DH: u32 = 75;
pub const PROV_GOST_2012_256: u32 = 80;
pub const PROV_GOST_2012_512: u32 = 81;

// === Key algorithm identifiers ===

/// GOST R 34.10-2001 key exchange/signature key
pub const CALG_DH_EL_SF: u32 = 0xaa24;
/// GOST R 34.10-2012 256-bit key
pub const CALG_DH_GR3410_12_256_SF: u32 = 0xaa46;
/// GOST R 34.10-2012 512-bit key
pub const CALG_DH_GR3410_12_512_SF: u32 = 0xaa42;

// === Context flags ===

pub const CRYPT_VERIFYCONTEXT: u32 = 0xF000_0000;
pub const CRYPT_NEWKEYSET: u32 = 0x0000_0008;
pub const CRYPT_DELETEKEYSET: u32 = 0x0000_0010;
pub const CRYPT_SILENT: u32 = 0x0000_0040;
pub const CRYPT_EXPORTABLE: u32 = 0x0000_0001;
/// Library flag: replace an existing container on create.
pub const CONTEXT_RECREATE: u32 = 0x0001_0000;

// === Key slots ===

pub const AT_KEYEXCHANGE: u32 = 1;
pub const AT_SIGNATURE: u32 = 2;

// === Key usage bits (first byte of the KeyUsage BIT STRING) ===

pub const CERT_DIGITAL_SIGNATURE_KEY_USAGE: u8 = 0x80;
pub const CERT_NON_REPUDIATION_KEY_USAGE: u8 = 0x40;
pub const CERT_KEY_ENCIPHERMENT_KEY_USAGE: u8 = 0x20;
pub const CERT_DATA_ENCIPHERMENT_KEY_USAGE: u8 = 0x10;
pub const CERT_KEY_AGREEMENT_KEY_USAGE: u8 = 0x08;
pub const CERT_KEY_CERT_SIGN_KEY_USAGE: u8 = 0x04;

// === Stores ===

/// Personal certificate store
pub const DEFAULT_STORE_NAME: &str = "MY";

// === Sizes ===

/// SHA-1 certificate thumbprint length
pub const THUMBPRINT_LEN: usize = 20;

/// Kuznyechik block size
pub const KUZNYECHIK_BLOCK_LEN: usize = 16;

/// Content-encryption and key-encryption key length
pub const GOST_KEY_LEN: usize = 32;

/// ACPKM section size for Kuznyechik CTR-ACPKM (256 KiB)
pub const ACPKM_SECTION_LEN: u64 = 256 * 1024;

// === ASN.1 DER tags ===

pub const ASN1_BOOLEAN_TAG: u8 = 0x01;
pub const ASN1_INTEGER_TAG: u8 = 0x02;
pub const ASN1_BIT_STRING_TAG: u8 = 0x03;
pub const ASN1_OCTET_STRING_TAG: u8 = 0x04;
pub const ASN1_NULL_TAG: u8 = 0x05;
pub const ASN1_OID_TAG: u8 = 0x06;
pub const ASN1_SEQUENCE_TAG: u8 = 0x30;
pub const ASN1_SET_TAG: u8 = 0x31;
pub const ASN1_UTF8_STRING_TAG: u8 = 0x0C;
pub const ASN1_NUMERIC_STRING_TAG: u8 = 0x12;
pub const ASN1_PRINTABLE_STRING_TAG: u8 = 0x13;
pub const ASN1_IA5_STRING_TAG: u8 = 0x16;
pub const ASN1_BMP_STRING_TAG: u8 = 0x1E;
/// `[0]` constructed context-specific
pub const ASN1_CONTEXT_0: u8 = 0xA0;
/// `[1]` constructed context-specific
pub const ASN1_CONTEXT_1: u8 = 0xA1;
/// `[0]` primitive context-specific
pub const ASN1_CONTEXT_0_PRIMITIVE: u8 = 0x80;

/// Constructed-encoding bit of an identifier octet
pub const ASN1_CONSTRUCTED: u8 = 0x20;
/// OCTET STRING split into segments (BER)
pub const ASN1_OCTET_STRING_CONSTRUCTED_TAG: u8 = 0x24;
/// Length octet opening an indefinite-length element (BER)
pub const ASN1_INDEFINITE_LENGTH: u8 = 0x80;

// === PKCS#7 content types ===

pub const OID_PKCS7_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
pub const OID_PKCS7_SIGNED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
pub const OID_PKCS7_ENVELOPED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.3");
pub const OID_PKCS7_SIGNED_AND_ENVELOPED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.4");
pub const OID_PKCS7_DIGESTED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.5");
pub const OID_PKCS7_ENCRYPTED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.6");

// === PKCS#9 attributes ===

pub const OID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
pub const OID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

// === GOST public key algorithms ===

pub const OID_GOST_R3410_2001: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.643.2.2.19");
pub const OID_GOST_R3410_2012_256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.7.1.1.1.1");
pub const OID_GOST_R3410_2012_512: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.7.1.1.1.2");

// === GOST curve and hash parameter sets ===

pub const OID_CRYPTOPRO_A_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.2.2.35.1");
pub const OID_CRYPTOPRO_B_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.2.2.35.2");
pub const OID_CRYPTOPRO_C_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.2.2.35.3");
pub const OID_CRYPTOPRO_XCHA_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.2.2.36.0");
pub const OID_CRYPTOPRO_XCHB_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.2.2.36.1");
pub const OID_TC26_256_A_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.7.1.2.1.1.1");
pub const OID_TC26_256_B_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.7.1.2.1.1.2");
pub const OID_TC26_256_C_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.7.1.2.1.1.3");
pub const OID_TC26_256_D_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.7.1.2.1.1.4");
pub const OID_TC26_512_A_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.7.1.2.1.2.1");
pub const OID_TC26_512_B_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.7.1.2.1.2.2");
pub const OID_TC26_512_C_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.7.1.2.1.2.3");
pub const OID_GOST_R3411_94_CRYPTOPRO_PARAMSET: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.2.2.30.1");

// === GOST digests ===

pub const OID_GOST_R3411_94: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.643.2.2.9");
pub const OID_STREEBOG_256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.643.7.1.1.2.2");
pub const OID_STREEBOG_512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.643.7.1.1.2.3");

// === GOST signature algorithms (hash + sign) ===

pub const OID_GOST_R3411_94_WITH_R3410_2001: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.2.2.3");
pub const OID_SIGNWITHDIGEST_2012_256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.7.1.1.3.2");
pub const OID_SIGNWITHDIGEST_2012_512: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.7.1.1.3.3");

// === Kuznyechik key wrapping and content encryption ===

pub const OID_KUZNYECHIK_CTR_ACPKM: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.643.7.1.1.5.2.1");

// === X.509 extensions ===

pub const OID_SUBJECT_KEY_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");
pub const OID_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");
pub const OID_BASIC_CONSTRAINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.19");
pub const OID_EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37");
