//! Hash algorithm domain type.
//!
//! GOST R 34.11-94 (CryptoPro parameters) and GOST R 34.11-2012 "Streebog"
//! in its 256 and 512-bit variants. Engines are boxed behind [`HashEngine`]
//! so a digest object can switch algorithm at runtime by requested length.

use crate::domain::constants::{OID_GOST_R3411_94, OID_STREEBOG_256, OID_STREEBOG_512};
use crate::infra::error::{CspError, CspResult};
use der::asn1::ObjectIdentifier;
use gost94::Gost94CryptoPro;
use hmac::{Mac, SimpleHmac};
use std::fmt;
use std::str::FromStr;
use streebog::digest::Digest;
use streebog::{Streebog256, Streebog512};

/// Supported GOST hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// GOST R 34.11-94
    Gost94,
    /// GOST R 34.11-2012, 256-bit output
    Streebog256,
    /// GOST R 34.11-2012, 512-bit output
    Streebog512,
}

impl HashAlgorithm {
    /// Algorithm selected by the native length parameter.
    ///
    /// 256 and 512 pick Streebog, 2001 picks the hash paired with
    /// GOST R 34.10-2001 keys.
    ///
    /// # Errors
    /// Returns `InvalidInput` for any other length.
    pub fn from_length(length: u32) -> CspResult<Self> {
        match length {
            256 => Ok(HashAlgorithm::Streebog256),
            512 => Ok(HashAlgorithm::Streebog512),
            2001 => Ok(HashAlgorithm::Gost94),
            other => Err(CspError::InvalidInput(format!(
                "Unsupported hash length: {other} (expected 256, 512 or 2001)"
            ))),
        }
    }

    /// Inverse of [`HashAlgorithm::from_length`].
    #[must_use]
    pub fn length_param(&self) -> u32 {
        match self {
            HashAlgorithm::Gost94 => 2001,
            HashAlgorithm::Streebog256 => 256,
            HashAlgorithm::Streebog512 => 512,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Gost94 => "gostr3411-94",
            HashAlgorithm::Streebog256 => "streebog256",
            HashAlgorithm::Streebog512 => "streebog512",
        }
    }

    /// Output size in bytes
    #[must_use]
    pub fn digest_size(&self) -> usize {
        match self {
            HashAlgorithm::Gost94 | HashAlgorithm::Streebog256 => 32,
            HashAlgorithm::Streebog512 => 64,
        }
    }

    #[must_use]
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            HashAlgorithm::Gost94 => OID_GOST_R3411_94,
            HashAlgorithm::Streebog256 => OID_STREEBOG_256,
            HashAlgorithm::Streebog512 => OID_STREEBOG_512,
        }
    }

    /// Algorithm identified by a digest OID.
    ///
    /// # Errors
    /// Returns `Unsupported` for non-GOST digest OIDs.
    pub fn from_oid(oid: &ObjectIdentifier) -> CspResult<Self> {
        [
            HashAlgorithm::Gost94,
            HashAlgorithm::Streebog256,
            HashAlgorithm::Streebog512,
        ]
        .into_iter()
        .find(|alg| alg.oid() == *oid)
        .ok_or_else(|| CspError::Unsupported(format!("Digest algorithm {oid}")))
    }

    /// Fresh streaming engine.
    #[must_use]
    pub fn engine(&self) -> Box<dyn HashEngine> {
        match self {
            HashAlgorithm::Gost94 => Box::new(Gost94Engine::new()),
            HashAlgorithm::Streebog256 => Box::new(Streebog256Engine::new()),
            HashAlgorithm::Streebog512 => Box::new(Streebog512Engine::new()),
        }
    }

    /// Streaming HMAC engine keyed with `key`.
    ///
    /// # Errors
    /// Returns `CryptoFailure` if the MAC rejects the key.
    pub fn hmac_engine(&self, key: &[u8]) -> CspResult<Box<dyn HashEngine>> {
        Ok(match self {
            HashAlgorithm::Gost94 => Box::new(HmacGost94Engine::new(key)?),
            HashAlgorithm::Streebog256 => Box::new(HmacStreebog256Engine::new(key)?),
            HashAlgorithm::Streebog512 => Box::new(HmacStreebog512Engine::new(key)?),
        })
    }

    /// One-shot hash.
    #[must_use]
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut engine = self.engine();
        engine.update(data);
        engine.finalize()
    }

    /// One-shot HMAC.
    ///
    /// # Errors
    /// Returns `CryptoFailure` if the MAC rejects the key.
    pub fn hmac(&self, key: &[u8], data: &[u8]) -> CspResult<Vec<u8>> {
        let mut engine = self.hmac_engine(key)?;
        engine.update(data);
        Ok(engine.finalize())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gostr3411-94" | "gost94" | "2001" => Ok(HashAlgorithm::Gost94),
            "streebog256" | "streebog-256" | "256" => Ok(HashAlgorithm::Streebog256),
            "streebog512" | "streebog-512" | "512" => Ok(HashAlgorithm::Streebog512),
            _ => Err(CspError::InvalidInput(format!("Unknown hash algorithm: {s}"))),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Streaming hash or MAC computation.
pub trait HashEngine: Send {
    /// Feed data into the hash.
    fn update(&mut self, data: &[u8]);
    /// Finalize and return the hash value.
    fn finalize(self: Box<Self>) -> Vec<u8>;
    /// Underlying hash algorithm.
    fn algorithm(&self) -> HashAlgorithm;
}

macro_rules! impl_hash_engine {
    ($name:ident, $hasher:ty, $alg:expr) => {
        struct $name {
            inner: $hasher,
        }

        impl $name {
            fn new() -> Self {
                Self {
                    inner: <$hasher>::new(),
                }
            }
        }

        impl HashEngine for $name {
            fn update(&mut self, data: &[u8]) {
                Digest::update(&mut self.inner, data);
            }

            fn finalize(self: Box<Self>) -> Vec<u8> {
                Digest::finalize(self.inner).to_vec()
            }

            fn algorithm(&self) -> HashAlgorithm {
                $alg
            }
        }
    };
}

macro_rules! impl_hmac_engine {
    ($name:ident, $hasher:ty, $alg:expr) => {
        struct $name {
            inner: SimpleHmac<$hasher>,
        }

        impl $name {
            fn new(key: &[u8]) -> CspResult<Self> {
                let inner = <SimpleHmac<$hasher> as Mac>::new_from_slice(key)
                    .map_err(|e| CspError::CryptoFailure(format!("HMAC key rejected: {e}")))?;
                Ok(Self { inner })
            }
        }

        impl HashEngine for $name {
            fn update(&mut self, data: &[u8]) {
                Mac::update(&mut self.inner, data);
            }

            fn finalize(self: Box<Self>) -> Vec<u8> {
                Mac::finalize(self.inner).into_bytes().to_vec()
            }

            fn algorithm(&self) -> HashAlgorithm {
                $alg
            }
        }
    };
}

impl_hash_engine!(Gost94Engine, Gost94CryptoPro, HashAlgorithm::Gost94);
impl_hash_engine!(Streebog256Engine, Streebog256, HashAlgorithm::Streebog256);
impl_hash_engine!(Streebog512Engine, Streebog512, HashAlgorithm::Streebog512);

impl_hmac_engine!(HmacGost94Engine, Gost94CryptoPro, HashAlgorithm::Gost94);
impl_hmac_engine!(HmacStreebog256Engine, Streebog256, HashAlgorithm::Streebog256);
impl_hmac_engine!(HmacStreebog512Engine, Streebog512, HashAlgorithm::Streebog512);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_length() {
        assert_eq!(HashAlgorithm::from_length(256).unwrap(), HashAlgorithm::Streebog256);
        assert_eq!(HashAlgorithm::from_length(512).unwrap(), HashAlgorithm::Streebog512);
        assert_eq!(HashAlgorithm::from_length(2001).unwrap(), HashAlgorithm::Gost94);
        assert!(HashAlgorithm::from_length(384).is_err());
    }

    #[test]
    fn test_digest_sizes() {
        for alg in [
            HashAlgorithm::Gost94,
            HashAlgorithm::Streebog256,
            HashAlgorithm::Streebog512,
        ] {
            assert_eq!(alg.digest(b"hurblewurble").len(), alg.digest_size());
            assert_eq!(alg.hmac(b"key", b"hurblewurble").unwrap().len(), alg.digest_size());
        }
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let alg = HashAlgorithm::Streebog256;
        let mut engine = alg.engine();
        engine.update(b"hurble");
        engine.update(b"wurble");
        assert_eq!(engine.finalize(), alg.digest(b"hurblewurble"));
    }

    #[test]
    fn test_algorithms_disagree() {
        let a = HashAlgorithm::Gost94.digest(b"hurblewurble");
        let b = HashAlgorithm::Streebog256.digest(b"hurblewurble");
        assert_ne!(a, b);
        assert_ne!(a, HashAlgorithm::Gost94.digest(b"hUrblEwurBle"));
    }

    #[test]
    fn test_oid_round_trip() {
        let alg = HashAlgorithm::from_oid(&OID_STREEBOG_512).unwrap();
        assert_eq!(alg, HashAlgorithm::Streebog512);
        assert!(HashAlgorithm::from_oid(&crate::domain::constants::OID_PKCS7_DATA).is_err());
    }

    #[test]
    fn test_hmac_known_answers() {
        let key: Vec<u8> = (0..32u8).collect();
        let data = hex::decode("0126bdb87800af214341456563780100").unwrap();
        assert_eq!(
            hex::encode(HashAlgorithm::Streebog256.hmac(&key, &data).unwrap()),
            "a1aa5f7de402d7b3d323f2991c8d4534013137010a83754fd0af6d7cd4922ed9"
        );
        assert_eq!(
            hex::encode(HashAlgorithm::Streebog512.hmac(&key, &data).unwrap()),
            "a59bab22ecae19c65fbde6e5f4e9f5d8549d31f037f9df9b905500e171923a77\
             3d5f1530f2ed7e964cb2eedc29e9ad2f3afe93b2814f79f5000ffc0366c251e6"
        );
    }

    #[test]
    fn test_streebog_empty_input() {
        assert_eq!(
            hex::encode(HashAlgorithm::Streebog256.digest(b"")),
            "3f539a213e97c802cc229d474c6aa32a825a360b2a933a949fd925208d9ce1bb"
        );
    }
}
