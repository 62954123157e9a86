//! Domain layer: constants, typed identifiers, GOST primitives and PKCS#7
//! message structures. Nothing here touches a key container or a store.

pub mod asn1;
pub mod constants;
pub mod crypto;
pub mod pkcs7;
pub mod types;
