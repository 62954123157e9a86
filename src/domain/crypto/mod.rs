//! GOST cryptographic primitives.
//!
//! - Hash algorithms (GOST R 34.11-94, Streebog) behind a streaming engine trait
//! - Curve arithmetic and GOST R 34.10 keys, signatures and VKO agreement
//! - Kuznyechik CTR-ACPKM, KDF_TREE and KExp15 key wrapping
//!
//! Everything here is pure computation; key storage lives in the adapters.

pub mod cipher;
pub mod curve;
mod gost3410;
mod hash;

pub use gost3410::{KeyAlgorithm, ParamSet, PrivateKey, PublicKey};
pub use hash::{HashAlgorithm, HashEngine};
