//! GOST R 34.10-2001 / 34.10-2012 keys, signatures and VKO key agreement.
//!
//! Signatures are `s || r`, each big-endian and as long as the curve order.
//! Hash values are read as little-endian integers before reduction, the same
//! way the native provider hands them to the signing primitive.

use crate::domain::asn1;
use crate::domain::constants::{
    ASN1_OCTET_STRING_TAG, ASN1_SEQUENCE_TAG, CALG_DH_EL_SF, CALG_DH_GR3410_12_256_SF,
    CALG_DH_GR3410_12_512_SF, OID_CRYPTOPRO_A_PARAMSET, OID_CRYPTOPRO_B_PARAMSET,
    OID_CRYPTOPRO_C_PARAMSET, OID_CRYPTOPRO_XCHA_PARAMSET, OID_CRYPTOPRO_XCHB_PARAMSET,
    OID_GOST_R3410_2001, OID_GOST_R3410_2012_256, OID_GOST_R3410_2012_512,
    OID_GOST_R3411_94_CRYPTOPRO_PARAMSET, OID_GOST_R3411_94_WITH_R3410_2001,
    OID_SIGNWITHDIGEST_2012_256, OID_SIGNWITHDIGEST_2012_512, OID_STREEBOG_256,
    OID_TC26_256_A_PARAMSET, OID_TC26_256_B_PARAMSET, OID_TC26_256_C_PARAMSET,
    OID_TC26_256_D_PARAMSET, OID_TC26_512_A_PARAMSET, OID_TC26_512_B_PARAMSET,
    OID_TC26_512_C_PARAMSET,
};
use crate::domain::crypto::curve::{self, AffinePoint, Curve};
use crate::domain::crypto::hash::HashAlgorithm;
use crate::infra::error::{CspError, CspResult};
use der::asn1::{BitString, ObjectIdentifier};
use der::{Any, Decode};
use num_bigint_dig::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

/// Public key algorithm of a container key.
///
/// Container keys are generated on the algorithm's default parameter set;
/// keys read from certificates may use any set of the right size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// GOST R 34.10-2001, CryptoPro-A by default
    Gost2001,
    /// GOST R 34.10-2012, 256-bit key, CryptoPro-A by default
    Gost2012_256,
    /// GOST R 34.10-2012, 512-bit key, tc26 paramSetA by default
    Gost2012_512,
}

impl KeyAlgorithm {
    /// Curve of the default parameter set.
    #[must_use]
    pub fn curve(&self) -> &'static Curve {
        self.default_paramset().curve()
    }

    /// Scalar and coordinate size in bytes
    #[must_use]
    pub fn key_len(&self) -> usize {
        self.curve().size
    }

    /// Signature length in bytes (`s || r`)
    #[must_use]
    pub fn signature_len(&self) -> usize {
        self.key_len() * 2
    }

    /// Native ALG_ID of the key
    #[must_use]
    pub fn alg_id(&self) -> u32 {
        match self {
            KeyAlgorithm::Gost2001 => CALG_DH_EL_SF,
            KeyAlgorithm::Gost2012_256 => CALG_DH_GR3410_12_256_SF,
            KeyAlgorithm::Gost2012_512 => CALG_DH_GR3410_12_512_SF,
        }
    }

    /// Key algorithm from its native ALG_ID.
    ///
    /// # Errors
    /// Returns `Unsupported` for other identifiers.
    pub fn from_alg_id(alg_id: u32) -> CspResult<Self> {
        match alg_id {
            CALG_DH_EL_SF => Ok(KeyAlgorithm::Gost2001),
            CALG_DH_GR3410_12_256_SF => Ok(KeyAlgorithm::Gost2012_256),
            CALG_DH_GR3410_12_512_SF => Ok(KeyAlgorithm::Gost2012_512),
            other => Err(CspError::Unsupported(format!("Key ALG_ID 0x{other:04x}"))),
        }
    }

    /// Hash paired with this key for signing.
    #[must_use]
    pub fn digest_algorithm(&self) -> HashAlgorithm {
        match self {
            KeyAlgorithm::Gost2001 => HashAlgorithm::Gost94,
            KeyAlgorithm::Gost2012_256 => HashAlgorithm::Streebog256,
            KeyAlgorithm::Gost2012_512 => HashAlgorithm::Streebog512,
        }
    }

    /// SubjectPublicKeyInfo algorithm OID.
    #[must_use]
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            KeyAlgorithm::Gost2001 => OID_GOST_R3410_2001,
            KeyAlgorithm::Gost2012_256 => OID_GOST_R3410_2012_256,
            KeyAlgorithm::Gost2012_512 => OID_GOST_R3410_2012_512,
        }
    }

    /// Key algorithm from a public key OID.
    ///
    /// # Errors
    /// Returns `Unsupported` for non-GOST public key algorithms.
    pub fn from_oid(oid: &ObjectIdentifier) -> CspResult<Self> {
        [
            KeyAlgorithm::Gost2001,
            KeyAlgorithm::Gost2012_256,
            KeyAlgorithm::Gost2012_512,
        ]
        .into_iter()
        .find(|alg| alg.oid() == *oid)
        .ok_or_else(|| CspError::Unsupported(format!("Public key algorithm {oid}")))
    }

    /// Certificate signature algorithm (hash with sign) OID.
    #[must_use]
    pub fn signature_oid(&self) -> ObjectIdentifier {
        match self {
            KeyAlgorithm::Gost2001 => OID_GOST_R3411_94_WITH_R3410_2001,
            KeyAlgorithm::Gost2012_256 => OID_SIGNWITHDIGEST_2012_256,
            KeyAlgorithm::Gost2012_512 => OID_SIGNWITHDIGEST_2012_512,
        }
    }

    /// Parameter set used for newly generated keys.
    #[must_use]
    pub fn default_paramset(&self) -> ParamSet {
        match self {
            KeyAlgorithm::Gost2001 | KeyAlgorithm::Gost2012_256 => ParamSet::CryptoProA,
            KeyAlgorithm::Gost2012_512 => ParamSet::Tc26_512A,
        }
    }

    /// Whether keys of this algorithm may use `paramset`.
    #[must_use]
    pub fn accepts(&self, paramset: ParamSet) -> bool {
        match self {
            KeyAlgorithm::Gost2001 => paramset.is_cryptopro(),
            KeyAlgorithm::Gost2012_256 => paramset.curve().size == 32,
            KeyAlgorithm::Gost2012_512 => paramset.curve().size == 64,
        }
    }

    /// Hash applied to the VKO shared point.
    #[must_use]
    pub fn vko_digest(&self) -> HashAlgorithm {
        match self {
            KeyAlgorithm::Gost2001 => HashAlgorithm::Gost94,
            KeyAlgorithm::Gost2012_256 => HashAlgorithm::Streebog256,
            KeyAlgorithm::Gost2012_512 => HashAlgorithm::Streebog512,
        }
    }

    /// Encoded `GostR3410-2012-PublicKeyParameters`. The digest parameter is
    /// written for the CryptoPro sets only.
    fn parameters_der(&self, paramset: ParamSet) -> Vec<u8> {
        let set = asn1::oid(&paramset.oid());
        match self {
            KeyAlgorithm::Gost2001 => {
                asn1::sequence(&[&set, &asn1::oid(&OID_GOST_R3411_94_CRYPTOPRO_PARAMSET)])
            }
            KeyAlgorithm::Gost2012_256 if paramset.is_cryptopro() => {
                asn1::sequence(&[&set, &asn1::oid(&OID_STREEBOG_256)])
            }
            KeyAlgorithm::Gost2012_256 | KeyAlgorithm::Gost2012_512 => asn1::sequence(&[&set]),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Gost2001 => "GOST R 34.10-2001",
            KeyAlgorithm::Gost2012_256 => "GOST R 34.10-2012 (256)",
            KeyAlgorithm::Gost2012_512 => "GOST R 34.10-2012 (512)",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named elliptic curve parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSet {
    CryptoProA,
    CryptoProB,
    CryptoProC,
    /// Exchange set, same curve as CryptoPro-A
    CryptoProXchA,
    /// Exchange set, same curve as CryptoPro-C
    CryptoProXchB,
    Tc26_256A,
    Tc26_256B,
    Tc26_256C,
    Tc26_256D,
    Tc26_512A,
    Tc26_512B,
    Tc26_512C,
}

impl ParamSet {
    pub const ALL: [ParamSet; 12] = [
        ParamSet::CryptoProA,
        ParamSet::CryptoProB,
        ParamSet::CryptoProC,
        ParamSet::CryptoProXchA,
        ParamSet::CryptoProXchB,
        ParamSet::Tc26_256A,
        ParamSet::Tc26_256B,
        ParamSet::Tc26_256C,
        ParamSet::Tc26_256D,
        ParamSet::Tc26_512A,
        ParamSet::Tc26_512B,
        ParamSet::Tc26_512C,
    ];

    #[must_use]
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            ParamSet::CryptoProA => OID_CRYPTOPRO_A_PARAMSET,
            ParamSet::CryptoProB => OID_CRYPTOPRO_B_PARAMSET,
            ParamSet::CryptoProC => OID_CRYPTOPRO_C_PARAMSET,
            ParamSet::CryptoProXchA => OID_CRYPTOPRO_XCHA_PARAMSET,
            ParamSet::CryptoProXchB => OID_CRYPTOPRO_XCHB_PARAMSET,
            ParamSet::Tc26_256A => OID_TC26_256_A_PARAMSET,
            ParamSet::Tc26_256B => OID_TC26_256_B_PARAMSET,
            ParamSet::Tc26_256C => OID_TC26_256_C_PARAMSET,
            ParamSet::Tc26_256D => OID_TC26_256_D_PARAMSET,
            ParamSet::Tc26_512A => OID_TC26_512_A_PARAMSET,
            ParamSet::Tc26_512B => OID_TC26_512_B_PARAMSET,
            ParamSet::Tc26_512C => OID_TC26_512_C_PARAMSET,
        }
    }

    /// Parameter set named by `oid`.
    ///
    /// # Errors
    /// Returns `Unsupported` for unknown curve OIDs.
    pub fn from_oid(oid: &ObjectIdentifier) -> CspResult<Self> {
        Self::ALL
            .into_iter()
            .find(|set| set.oid() == *oid)
            .ok_or_else(|| CspError::Unsupported(format!("Curve parameter set {oid}")))
    }

    #[must_use]
    pub fn curve(&self) -> &'static Curve {
        match self {
            ParamSet::CryptoProA | ParamSet::CryptoProXchA | ParamSet::Tc26_256B => {
                curve::cryptopro_a()
            }
            ParamSet::CryptoProB | ParamSet::Tc26_256C => curve::cryptopro_b(),
            ParamSet::CryptoProC | ParamSet::CryptoProXchB | ParamSet::Tc26_256D => {
                curve::cryptopro_c()
            }
            ParamSet::Tc26_256A => curve::tc26_256_a(),
            ParamSet::Tc26_512A => curve::tc26_512_a(),
            ParamSet::Tc26_512B => curve::tc26_512_b(),
            ParamSet::Tc26_512C => curve::tc26_512_c(),
        }
    }

    /// Sets defined for GOST R 34.10-2001 and usable with 2001 keys.
    #[must_use]
    pub fn is_cryptopro(&self) -> bool {
        matches!(
            self,
            ParamSet::CryptoProA
                | ParamSet::CryptoProB
                | ParamSet::CryptoProC
                | ParamSet::CryptoProXchA
                | ParamSet::CryptoProXchB
        )
    }
}

fn random_scalar(q: &BigUint, len: usize) -> BigUint {
    // 64 extra bits keep the modular bias negligible
    let mut buf = vec![0u8; len + 8];
    rand::fill(buf.as_mut_slice());
    let range = q - BigUint::one();
    BigUint::from_bytes_be(&buf) % range + BigUint::one()
}

fn hash_to_scalar(hash: &[u8], q: &BigUint) -> BigUint {
    let e = BigUint::from_bytes_le(hash) % q;
    if e.is_zero() {
        BigUint::one()
    } else {
        e
    }
}

/// `(r, s)` for scalar `e` and nonce `k`, `None` when either is zero.
fn sign_scalars(curve: &Curve, d: &BigUint, e: &BigUint, k: &BigUint) -> Option<(BigUint, BigUint)> {
    let q = &curve.q;
    let c = curve.mul_base(k)?;
    let r = &c.x % q;
    if r.is_zero() {
        return None;
    }
    let s = (&r * d + k * e) % q;
    if s.is_zero() {
        return None;
    }
    Some((r, s))
}

fn verify_scalars(curve: &Curve, point: &AffinePoint, e: &BigUint, r: &BigUint, s: &BigUint) -> bool {
    let q = &curve.q;
    if r.is_zero() || s.is_zero() || r >= q || s >= q {
        return false;
    }
    let v = e.modpow(&(q - BigUint::from(2u32)), q);
    let z1 = (s * &v) % q;
    let z2 = ((q - r) * &v) % q;
    match curve.mul_add(&z1, &curve.base, &z2, point) {
        Some(c) => &c.x % q == *r,
        None => false,
    }
}

/// Private signing/agreement key.
#[derive(Clone)]
pub struct PrivateKey {
    algorithm: KeyAlgorithm,
    paramset: ParamSet,
    d: BigUint,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm)
            .field("paramset", &self.paramset)
            .finish_non_exhaustive()
    }
}

impl PrivateKey {
    /// Fresh random key on the algorithm's default parameter set.
    #[must_use]
    pub fn generate(algorithm: KeyAlgorithm) -> Self {
        Self::generate_on(algorithm, algorithm.default_paramset())
    }

    fn generate_on(algorithm: KeyAlgorithm, paramset: ParamSet) -> Self {
        let curve = paramset.curve();
        Self {
            algorithm,
            paramset,
            d: random_scalar(&curve.q, curve.size),
        }
    }

    /// Ephemeral key on the same curve as `peer`, for key agreement.
    #[must_use]
    pub fn generate_for(peer: &PublicKey) -> Self {
        Self::generate_on(peer.algorithm, peer.paramset)
    }

    /// Key from its big-endian scalar.
    ///
    /// # Errors
    /// Returns `FormatError` for a scalar of the wrong length or out of range.
    pub fn from_bytes(algorithm: KeyAlgorithm, bytes: &[u8]) -> CspResult<Self> {
        let curve = algorithm.curve();
        if bytes.len() != curve.size {
            return Err(CspError::FormatError(format!(
                "{algorithm} private key must be {} bytes, got {}",
                curve.size,
                bytes.len()
            )));
        }
        let d = BigUint::from_bytes_be(bytes);
        if d.is_zero() || d >= curve.q {
            return Err(CspError::FormatError(
                "Private key scalar out of range".to_string(),
            ));
        }
        Ok(Self {
            algorithm,
            paramset: algorithm.default_paramset(),
            d,
        })
    }

    /// Big-endian scalar, fixed length.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        curve::to_fixed_be(&self.d, self.algorithm.key_len())
    }

    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn paramset(&self) -> ParamSet {
        self.paramset
    }

    /// Matching public key.
    ///
    /// # Errors
    /// Returns `CryptoFailure` if the scalar maps to the point at infinity.
    pub fn public_key(&self) -> CspResult<PublicKey> {
        let point = self
            .paramset
            .curve()
            .mul_base(&self.d)
            .ok_or_else(|| CspError::CryptoFailure("Degenerate private key".to_string()))?;
        Ok(PublicKey {
            algorithm: self.algorithm,
            paramset: self.paramset,
            point,
        })
    }

    /// Sign a hash value.
    ///
    /// # Errors
    /// Returns `CryptoFailure` if no usable nonce was found.
    pub fn sign_hash(&self, hash: &[u8]) -> CspResult<Vec<u8>> {
        let curve = self.paramset.curve();
        let e = hash_to_scalar(hash, &curve.q);
        for _ in 0..16 {
            let k = random_scalar(&curve.q, curve.size);
            let Some((r, s)) = sign_scalars(curve, &self.d, &e, &k) else {
                continue;
            };
            let mut sig = curve::to_fixed_be(&s, curve.size);
            sig.extend(curve::to_fixed_be(&r, curve.size));
            return Ok(sig);
        }
        Err(CspError::CryptoFailure(
            "Failed to produce a signature".to_string(),
        ))
    }

    /// VKO key agreement with a peer public key, hashed with the algorithm's
    /// [`KeyAlgorithm::vko_digest`]: 32 bytes for 256-bit keys and 64 bytes
    /// for 512-bit keys.
    ///
    /// # Errors
    /// See [`PrivateKey::agree_with`].
    pub fn agree(&self, peer: &PublicKey, ukm: &[u8]) -> CspResult<Vec<u8>> {
        self.agree_with(peer, ukm, self.algorithm.vko_digest())
    }

    /// VKO with an explicit digest.
    ///
    /// The shared point `(m/q * UKM * d mod q) * Q` is hashed as
    /// `LE(x) || LE(y)`. `ukm` is read little-endian; zero counts as one.
    ///
    /// # Errors
    /// Returns `CryptoFailure` for keys on different curves or a degenerate
    /// result.
    pub fn agree_with(
        &self,
        peer: &PublicKey,
        ukm: &[u8],
        digest: HashAlgorithm,
    ) -> CspResult<Vec<u8>> {
        let curve = self.paramset.curve();
        if peer.paramset.curve().name != curve.name {
            return Err(CspError::CryptoFailure(format!(
                "Key agreement between {:?} and {:?} keys",
                self.paramset, peer.paramset
            )));
        }
        let ukm = hash_to_scalar(ukm, &curve.q);
        let k = (BigUint::from(curve.cofactor) * ukm * &self.d) % &curve.q;
        let shared = curve
            .mul(&k, &peer.point)
            .ok_or_else(|| CspError::CryptoFailure("Degenerate shared point".to_string()))?;
        let mut raw = curve::to_fixed_le(&shared.x, curve.size);
        raw.extend(curve::to_fixed_le(&shared.y, curve.size));
        Ok(digest.digest(&raw))
    }
}

/// Public key: curve point plus its algorithm and parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    algorithm: KeyAlgorithm,
    paramset: ParamSet,
    point: AffinePoint,
}

impl PublicKey {
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn paramset(&self) -> ParamSet {
        self.paramset
    }

    /// `LE(x) || LE(y)`, the content of the key's OCTET STRING.
    #[must_use]
    pub fn to_raw(&self) -> Vec<u8> {
        let len = self.paramset.curve().size;
        let mut out = curve::to_fixed_le(&self.point.x, len);
        out.extend(curve::to_fixed_le(&self.point.y, len));
        out
    }

    /// Parse `LE(x) || LE(y)` on the algorithm's default parameter set.
    ///
    /// # Errors
    /// See [`PublicKey::from_raw_on`].
    pub fn from_raw(algorithm: KeyAlgorithm, raw: &[u8]) -> CspResult<Self> {
        Self::from_raw_on(algorithm, algorithm.default_paramset(), raw)
    }

    /// Parse `LE(x) || LE(y)` on a given parameter set.
    ///
    /// # Errors
    /// Returns `FormatError` for a set that does not fit the algorithm, a
    /// wrong length or a point off the curve.
    pub fn from_raw_on(algorithm: KeyAlgorithm, paramset: ParamSet, raw: &[u8]) -> CspResult<Self> {
        if !algorithm.accepts(paramset) {
            return Err(CspError::FormatError(format!(
                "Parameter set {paramset:?} does not fit {algorithm} keys"
            )));
        }
        let curve = paramset.curve();
        let len = curve.size;
        if raw.len() != len * 2 {
            return Err(CspError::FormatError(format!(
                "{algorithm} public key must be {} bytes, got {}",
                len * 2,
                raw.len()
            )));
        }
        let point = AffinePoint {
            x: BigUint::from_bytes_le(&raw[..len]),
            y: BigUint::from_bytes_le(&raw[len..]),
        };
        if !curve.contains(&point) {
            return Err(CspError::FormatError(
                "Public key point is not on the curve".to_string(),
            ));
        }
        Ok(Self {
            algorithm,
            paramset,
            point,
        })
    }

    /// Verify an `s || r` signature over a hash value.
    #[must_use]
    pub fn verify_hash(&self, hash: &[u8], signature: &[u8]) -> bool {
        let curve = self.paramset.curve();
        if signature.len() != curve.size * 2 {
            return false;
        }
        let s = BigUint::from_bytes_be(&signature[..curve.size]);
        let r = BigUint::from_bytes_be(&signature[curve.size..]);
        let e = hash_to_scalar(hash, &curve.q);
        verify_scalars(curve, &self.point, &e, &r, &s)
    }

    /// SubjectPublicKeyInfo structure.
    ///
    /// # Errors
    /// Returns `FormatError` if the parameters fail to encode.
    pub fn to_spki(&self) -> CspResult<SubjectPublicKeyInfoOwned> {
        let parameters = Any::from_der(&self.algorithm.parameters_der(self.paramset))?;
        let key = asn1::octet_string(&self.to_raw());
        Ok(SubjectPublicKeyInfoOwned {
            algorithm: AlgorithmIdentifierOwned {
                oid: self.algorithm.oid(),
                parameters: Some(parameters),
            },
            subject_public_key: BitString::from_bytes(&key)?,
        })
    }

    /// DER SubjectPublicKeyInfo.
    ///
    /// # Errors
    /// Returns `FormatError` if encoding fails.
    pub fn to_spki_der(&self) -> CspResult<Vec<u8>> {
        use der::Encode;
        Ok(self.to_spki()?.to_der()?)
    }

    /// Public key from a SubjectPublicKeyInfo.
    ///
    /// Absent or non-SEQUENCE parameters select the algorithm's default set.
    ///
    /// # Errors
    /// Returns `Unsupported` for non-GOST keys or unknown parameter sets and
    /// `FormatError` for malformed content.
    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> CspResult<Self> {
        let algorithm = KeyAlgorithm::from_oid(&spki.algorithm.oid)?;
        let mut paramset = algorithm.default_paramset();
        if let Some(params) = &spki.algorithm.parameters {
            use der::Encode;
            let encoded = params.to_der()?;
            let params = asn1::parse_single(&encoded)?;
            if params.tag == ASN1_SEQUENCE_TAG {
                let first = params.reader().read()?;
                paramset = ParamSet::from_oid(&first.to_oid()?)?;
            }
        }
        let bits = spki.subject_public_key.as_bytes().ok_or_else(|| {
            CspError::FormatError("Public key BIT STRING has unused bits".to_string())
        })?;
        let mut reader = asn1::DerReader::new(bits);
        let raw = reader.expect(ASN1_OCTET_STRING_TAG)?;
        Self::from_raw_on(algorithm, paramset, raw.content)
    }

    /// Public key from DER SubjectPublicKeyInfo.
    ///
    /// # Errors
    /// See [`PublicKey::from_spki`].
    pub fn from_spki_der(der_bytes: &[u8]) -> CspResult<Self> {
        let spki = SubjectPublicKeyInfoOwned::from_der(der_bytes)?;
        Self::from_spki(&spki)
    }
}
