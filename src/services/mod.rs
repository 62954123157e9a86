//! Service layer: contexts, certificates, stores, digests and messages.

pub mod cert_issuer;
pub mod cert_store;
pub mod certificate;
pub mod context;
pub mod digest;
pub mod message;
pub mod verification;

pub use cert_issuer::CertificateIssuer;
pub use cert_store::CertificateStore;
pub use certificate::{CertBinding, Certificate};
pub use context::{Csp, CspBuilder, Key, KeyContext};
pub use digest::{Digest, SignedDigest};
pub use message::CryptoMessage;
pub use verification::{TrustAnchor, VerificationService};
