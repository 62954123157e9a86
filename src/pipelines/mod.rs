//! Workflow facades composing the services into whole operations.
//!
//! Signing, verification, encryption and decryption run entirely under
//! the runtime's retry policy, on top of the retries of the individual
//! token operations they perform.

pub mod envelope;
pub mod inspect;
pub mod keys;
pub mod sign;
pub mod verify;

pub use envelope::EnvelopeWorkflow;
pub use inspect::{CertInfo, InspectWorkflow, PartyInfo, Pkcs7Info};
pub use keys::KeyWorkflow;
pub use sign::SignWorkflow;
pub use verify::VerifyWorkflow;

use crate::domain::types::{ContextFlags, KeySlot, ProviderSelector, Thumbprint};
use crate::infra::error::{CspError, CspResult};
use crate::services::{CertificateStore, Certificate, Csp, KeyContext};

/// Open an existing container without prompting.
fn open_container(csp: &Csp, container: &str, provider: &ProviderSelector) -> CspResult<KeyContext> {
    KeyContext::open(csp, Some(container), provider.clone(), ContextFlags::SILENT)
}

/// Certificate kept with the signature key of a container, bound to it.
fn container_certificate(context: &KeyContext) -> CspResult<Certificate> {
    let key = context
        .get_key(KeySlot::Signature)?
        .ok_or_else(|| CspError::NotFound("Container has no signature key".to_string()))?;
    key.extract_cert()?
        .ok_or_else(|| CspError::NotFound("Container holds no certificate".to_string()))
}

/// First certificate with `thumbprint` (hex) in the default store.
fn certificate_by_thumbprint(
    csp: &Csp,
    context: Option<&KeyContext>,
    thumbprint: &str,
) -> CspResult<Certificate> {
    let thumb = Thumbprint::from_hex(thumbprint)?;
    let store = CertificateStore::open(csp, context, &csp.config().default_store)?;
    store
        .find_by_thumbprint(thumb.as_bytes())?
        .into_iter()
        .next()
        .ok_or_else(|| {
            CspError::NotFound(format!(
                "Certificate {thumb} is not in the {} store",
                csp.config().default_store
            ))
        })
}

/// Signing certificate from a container, or else from the store by
/// thumbprint.
fn resolve_signer(
    csp: &Csp,
    provider: &ProviderSelector,
    thumbprint: Option<&str>,
    container: Option<&str>,
) -> CspResult<Certificate> {
    match (container, thumbprint) {
        (Some(container), _) => container_certificate(&open_container(csp, container, provider)?),
        (None, Some(thumb)) => certificate_by_thumbprint(csp, None, thumb),
        (None, None) => Err(CspError::InvalidInput(
            "A signing thumbprint or container is required".to_string(),
        )),
    }
}

/// Parse recipient certificates given as DER or PEM.
fn load_certificates(certs: &[&[u8]]) -> CspResult<Vec<Certificate>> {
    certs.iter().map(|bytes| Certificate::load(bytes)).collect()
}
