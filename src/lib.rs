//! GOST Crypto Provider Library
//!
//! Key containers, certificates, certificate stores, GOST R 34.11 digests
//! and PKCS#7 signed and enveloped messages over pluggable key providers.
//! A software provider persisting containers to a directory is included.

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod pipelines;
pub mod services;

pub use adapters::{KeyBackend, SoftProvider, StoreBackend};
pub use domain::crypto::{HashAlgorithm, KeyAlgorithm, ParamSet, PublicKey};
pub use domain::pkcs7::{ContentType, IssuerAndSerial, RecipientInfo, SignerInfo};
pub use domain::types::{
    ContainerName, ContextFlags, KeySlot, Password, ProviderSelector, ProviderType, StoreName,
    Thumbprint,
};
pub use infra::config::{ConfigManager, CspConfiguration};
pub use infra::error::{CspError, CspResult};
pub use infra::retry::RetryPolicy;
pub use pipelines::{EnvelopeWorkflow, InspectWorkflow, KeyWorkflow, SignWorkflow, VerifyWorkflow};
pub use services::{
    CertBinding, Certificate, CertificateIssuer, CertificateStore, CryptoMessage, Csp, CspBuilder,
    Digest, Key, KeyContext, SignedDigest, TrustAnchor,
};
