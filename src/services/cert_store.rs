//! Certificate stores.
//!
//! Three kinds share one type:
//! - system stores, named and persisted through the runtime's
//!   [`StoreBackend`](crate::adapters::StoreBackend);
//! - memory stores, local to the handle;
//! - message stores, a read-only view of certificates embedded in a
//!   decoded message.
//!
//! Entries are handles: adding the same certificate twice yields two
//! entries with the same thumbprint that are removed independently.

use crate::adapters::backend::StoredBinding;
use crate::domain::pkcs7::{IssuerAndSerial, SignerInfo};
use crate::domain::types::{ContainerName, ContextFlags, StoreName};
use crate::infra::error::{CspError, CspResult};
use crate::services::certificate::{CertBinding, Certificate, EntryOrigin};
use crate::services::context::{Csp, KeyContext};
use crate::services::message::CryptoMessage;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MEMORY_STORE: AtomicU64 = AtomicU64::new(1);

enum StoreKind {
    System {
        csp: Csp,
        name: StoreName,
        context: Option<KeyContext>,
    },
    Memory {
        id: u64,
        next_entry: u64,
        entries: Vec<(u64, Certificate)>,
    },
    Message {
        certs: Vec<Certificate>,
    },
}

/// Collection of certificate entries.
pub struct CertificateStore {
    kind: StoreKind,
}

impl std::fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            StoreKind::System { name, .. } => write!(f, "CertificateStore(system {name})"),
            StoreKind::Memory { id, entries, .. } => {
                write!(f, "CertificateStore(memory #{id}, {} entries)", entries.len())
            }
            StoreKind::Message { certs } => {
                write!(f, "CertificateStore(message, {} certificates)", certs.len())
            }
        }
    }
}

impl CertificateStore {
    /// Open a named system store, optionally associated with a context whose
    /// bound entries reuse it (and its passwords).
    ///
    /// # Errors
    /// Returns `InvalidInput` for a malformed store name.
    pub fn open(csp: &Csp, context: Option<&KeyContext>, name: &str) -> CspResult<Self> {
        let name = StoreName::new(name)?;
        log::debug!("Opened system store {name}");
        Ok(Self {
            kind: StoreKind::System {
                csp: csp.clone(),
                name,
                context: context.cloned(),
            },
        })
    }

    /// The runtime's default system store ("MY").
    ///
    /// # Errors
    /// Returns `InvalidInput` if the configured name is malformed.
    pub fn open_default(csp: &Csp) -> CspResult<Self> {
        let name = csp.default_store()?;
        Self::open(csp, None, name.as_str())
    }

    /// Fresh in-memory store.
    #[must_use]
    pub fn open_empty() -> Self {
        Self {
            kind: StoreKind::Memory {
                id: NEXT_MEMORY_STORE.fetch_add(1, Ordering::Relaxed),
                next_entry: 0,
                entries: Vec::new(),
            },
        }
    }

    /// Read-only view of the certificates embedded in a message.
    ///
    /// # Errors
    /// Returns `StateError` if the message has not been decoded.
    pub fn from_message(message: &CryptoMessage) -> CspResult<Self> {
        Ok(Self::from_certificates(message.embedded_certificates()?.to_vec()))
    }

    pub(crate) fn from_certificates(certs: Vec<Certificate>) -> Self {
        Self {
            kind: StoreKind::Message { certs },
        }
    }

    /// Whether entries can be added and removed.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(self.kind, StoreKind::Message { .. })
    }

    /// Add a new entry and return its handle. Bound certificates keep their
    /// binding.
    ///
    /// # Errors
    /// Returns `StateError` for a message store.
    pub fn add_cert(&mut self, cert: &Certificate) -> CspResult<Certificate> {
        match &mut self.kind {
            StoreKind::System { csp, name, .. } => {
                let binding = cert.binding().and_then(|b| {
                    b.context.container_name().map(|container| StoredBinding {
                        provider: b.context.provider_name().to_string(),
                        container: container.as_str().to_string(),
                        slot: b.slot,
                    })
                });
                let id = csp.store_backend().insert(name, cert.as_der(), binding)?;
                let mut handle = cert.duplicate().with_origin(EntryOrigin::System {
                    store: name.clone(),
                    id,
                });
                if let Some(binding) = cert.binding() {
                    handle = handle.with_binding(binding.clone());
                }
                Ok(handle)
            }
            StoreKind::Memory {
                id,
                next_entry,
                entries,
            } => {
                let entry_id = *next_entry;
                *next_entry += 1;
                let mut handle = cert.duplicate().with_origin(EntryOrigin::Local {
                    store_id: *id,
                    entry_id,
                });
                if let Some(binding) = cert.binding() {
                    handle = handle.with_binding(binding.clone());
                }
                entries.push((entry_id, handle.clone()));
                log::debug!("Added certificate {} to memory store #{id}", cert.thumbprint());
                Ok(handle)
            }
            StoreKind::Message { .. } => Err(read_only()),
        }
    }

    /// Current entries in insertion order. Each call reflects live state.
    ///
    /// # Errors
    /// Returns error if a persistent store cannot be read.
    pub fn iter(&self) -> CspResult<std::vec::IntoIter<Certificate>> {
        Ok(self.certificates()?.into_iter())
    }

    /// Number of entries.
    ///
    /// # Errors
    /// Returns error if a persistent store cannot be read.
    pub fn len(&self) -> CspResult<usize> {
        Ok(self.certificates()?.len())
    }

    /// # Errors
    /// Returns error if a persistent store cannot be read.
    pub fn is_empty(&self) -> CspResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Entries whose thumbprint equals `thumbprint`. Empty when none match.
    ///
    /// # Errors
    /// Returns error if a persistent store cannot be read.
    pub fn find_by_thumbprint(&self, thumbprint: &[u8]) -> CspResult<Vec<Certificate>> {
        Ok(self
            .certificates()?
            .into_iter()
            .filter(|c| c.thumbprint().as_bytes() == thumbprint)
            .collect())
    }

    /// Entries whose subject contains `name`, ignoring case.
    ///
    /// # Errors
    /// Returns error if a persistent store cannot be read.
    pub fn find_by_name(&self, name: &str) -> CspResult<Vec<Certificate>> {
        let needle = name.to_lowercase();
        Ok(self
            .certificates()?
            .into_iter()
            .filter(|c| c.subject().to_lowercase().contains(&needle))
            .collect())
    }

    /// Certificate identified by a signer info.
    ///
    /// # Errors
    /// Returns error if a persistent store cannot be read.
    pub fn get_cert_by_signer_info(&self, signer: &SignerInfo) -> CspResult<Option<Certificate>> {
        self.find_by_issuer_and_serial(&signer.sid)
    }

    /// Certificate with exactly this issuer and serial.
    ///
    /// # Errors
    /// Returns error if a persistent store cannot be read.
    pub fn find_by_issuer_and_serial(
        &self,
        id: &IssuerAndSerial,
    ) -> CspResult<Option<Certificate>> {
        for cert in self.certificates()? {
            match cert.issuer_and_serial() {
                Ok(sid) if sid == *id => return Ok(Some(cert)),
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Skipping {} without a usable issuer: {e}", cert.thumbprint());
                }
            }
        }
        Ok(None)
    }

    /// Remove the entry `cert` refers to. Returns `false` when the handle
    /// does not belong to this store or was already removed.
    ///
    /// # Errors
    /// Returns `StateError` for a message store.
    pub fn remove(&mut self, cert: &Certificate) -> CspResult<bool> {
        match &mut self.kind {
            StoreKind::System { csp, name, .. } => match cert.origin() {
                Some(EntryOrigin::System { store, id }) if *store == *name => {
                    csp.store_backend().remove(name, *id)
                }
                _ => Ok(false),
            },
            StoreKind::Memory { id, entries, .. } => match cert.origin() {
                Some(EntryOrigin::Local { store_id, entry_id }) if *store_id == *id => {
                    let before = entries.len();
                    entries.retain(|(e, _)| e != entry_id);
                    Ok(entries.len() != before)
                }
                _ => Ok(false),
            },
            StoreKind::Message { .. } => Err(read_only()),
        }
    }

    fn certificates(&self) -> CspResult<Vec<Certificate>> {
        match &self.kind {
            StoreKind::System { csp, name, context } => {
                let stored = csp
                    .retry()
                    .run("Read certificate store", || csp.store_backend().list(name))?;
                let mut certs = Vec::with_capacity(stored.len());
                for entry in stored {
                    let cert = match Certificate::load(&entry.der) {
                        Ok(cert) => cert,
                        Err(e) => {
                            log::warn!(
                                "Skipping unreadable entry {} of store {name}: {e}",
                                entry.id
                            );
                            continue;
                        }
                    };
                    let cert = cert.with_origin(EntryOrigin::System {
                        store: name.clone(),
                        id: entry.id,
                    });
                    let cert = match entry.binding {
                        Some(binding) => rebind(csp, context.as_ref(), cert, &binding),
                        None => cert,
                    };
                    certs.push(cert);
                }
                Ok(certs)
            }
            StoreKind::Memory { entries, .. } => {
                Ok(entries.iter().map(|(_, cert)| cert.clone()).collect())
            }
            StoreKind::Message { certs } => Ok(certs.clone()),
        }
    }
}

fn read_only() -> CspError {
    CspError::StateError("Message certificate store is read-only".to_string())
}

/// Restore a stored binding. A binding whose container is gone leaves the
/// certificate unbound.
fn rebind(
    csp: &Csp,
    context: Option<&KeyContext>,
    cert: Certificate,
    binding: &StoredBinding,
) -> Certificate {
    let Ok(container) = ContainerName::from_decoded(binding.container.clone()) else {
        return cert;
    };
    if let Some(ctx) = context {
        if ctx.provider_name() == binding.provider && ctx.container_name() == Some(&container) {
            return cert.with_binding(CertBinding {
                context: ctx.clone(),
                slot: binding.slot,
            });
        }
    }
    let Some(backend) = csp.provider_by_name(&binding.provider) else {
        log::debug!("Provider {} of a stored binding is not registered", binding.provider);
        return cert;
    };
    match backend.container_exists(&container) {
        Ok(true) => {
            let ctx = KeyContext::attach(csp, backend, Some(container), ContextFlags::NONE);
            cert.with_binding(CertBinding {
                context: ctx,
                slot: binding.slot,
            })
        }
        _ => {
            log::debug!("Container {container} of a stored binding is gone");
            cert
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{KeySlot, ProviderType};
    use crate::infra::config::CspConfiguration;
    use crate::infra::retry::RetryPolicy;
    use crate::services::cert_issuer::CertificateIssuer;

    fn setup() -> (Csp, KeyContext, Certificate) {
        let csp = Csp::builder(CspConfiguration::in_memory().with_retry(RetryPolicy::none()))
            .build()
            .unwrap();
        let ctx = KeyContext::create(&csp, "store-test", ProviderType::Gost2012_256, ContextFlags::NONE)
            .unwrap();
        ctx.create_key(false, KeySlot::Signature).unwrap();
        let cert = CertificateIssuer::new("CN=test")
            .self_signed(&ctx, KeySlot::Signature)
            .unwrap();
        (csp, ctx, cert)
    }

    #[test]
    fn test_memory_store_duplicates_are_independent() {
        let (_, _, cert) = setup();
        let mut store = CertificateStore::open_empty();
        let first = store.add_cert(&cert).unwrap();
        let second = store.add_cert(&cert).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(first.thumbprint(), second.thumbprint());

        assert!(store.remove(&first).unwrap());
        assert!(!store.remove(&first).unwrap());
        let left = store.find_by_thumbprint(cert.thumbprint().as_bytes()).unwrap();
        assert_eq!(left.len(), 1);
        assert!(store.remove(&left[0]).unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_handles_from_other_store_are_ignored() {
        let (_, _, cert) = setup();
        let mut a = CertificateStore::open_empty();
        let mut b = CertificateStore::open_empty();
        let in_a = a.add_cert(&cert).unwrap();
        b.add_cert(&cert).unwrap();
        assert!(!b.remove(&in_a).unwrap());
        assert!(!b.remove(&cert).unwrap());
        assert_eq!(b.len().unwrap(), 1);
    }

    #[test]
    fn test_unreadable_entries_are_skipped() {
        let (csp, _, cert) = setup();
        let mut store = CertificateStore::open(&csp, None, "MY").unwrap();
        csp.store_backend()
            .insert(&StoreName::new("MY").unwrap(), b"not a certificate", None)
            .unwrap();
        store.add_cert(&cert).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.find_by_name("test").unwrap().len(), 1);
        let sid = cert.issuer_and_serial().unwrap();
        let found = store.find_by_issuer_and_serial(&sid).unwrap().unwrap();
        assert_eq!(found.thumbprint(), cert.thumbprint());
        assert!(store.find_by_thumbprint(&[0xAB; 20]).unwrap().is_empty());
    }

    #[test]
    fn test_system_store_keeps_binding() {
        let (csp, ctx, cert) = setup();
        let mut store = CertificateStore::open(&csp, None, "MY").unwrap();
        store.add_cert(&cert).unwrap();

        let reopened = CertificateStore::open(&csp, None, "MY").unwrap();
        let found = reopened.find_by_name("TEST").unwrap();
        assert_eq!(found.len(), 1);
        let binding = found[0].binding().unwrap();
        assert!(binding.context.same_container(&ctx));
        assert_eq!(binding.slot, KeySlot::Signature);
    }

    #[test]
    fn test_system_store_entries_removed_individually() {
        let (csp, _, cert) = setup();
        let mut store = CertificateStore::open(&csp, None, "MY").unwrap();
        let first = store.add_cert(&cert).unwrap();
        store.add_cert(&cert).unwrap();
        assert!(cert.remove_from_store(&mut store).is_ok_and(|removed| !removed));
        assert!(first.remove_from_store(&mut store).unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_empty_lookups() {
        let (csp, _, cert) = setup();
        let store = CertificateStore::open(&csp, None, "MY").unwrap();
        assert!(store.find_by_thumbprint(&[b'x'; 20]).unwrap().is_empty());
        assert!(store.find_by_name("nobody").unwrap().is_empty());
        let sid = cert.issuer_and_serial().unwrap();
        assert!(store.find_by_issuer_and_serial(&sid).unwrap().is_none());
    }

    #[test]
    fn test_message_store_is_read_only() {
        let (_, _, cert) = setup();
        let mut store = CertificateStore::from_certificates(vec![cert.duplicate()]);
        assert!(store.is_read_only());
        assert!(matches!(store.add_cert(&cert), Err(CspError::StateError(_))));
        assert!(matches!(store.remove(&cert), Err(CspError::StateError(_))));
        assert_eq!(store.len().unwrap(), 1);
    }
}
