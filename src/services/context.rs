//! Runtime and key container contexts.
//!
//! [`Csp`] is the explicit runtime: configuration, the provider registry and
//! the system store backend. [`KeyContext`] is a handle to one container of
//! one provider (or a verify-only handle with no container). Both are cheap
//! `Arc` clones.

use crate::adapters::backend::{KeyBackend, KeyInfo, StoreBackend};
use crate::adapters::soft::SoftProvider;
use crate::adapters::stores::{DirectoryStores, MemoryStores};
use crate::domain::crypto::{KeyAlgorithm, PublicKey};
use crate::domain::types::{
    ContainerName, ContextFlags, KeySlot, Password, ProviderSelector, ProviderType, StoreName,
};
use crate::infra::config::CspConfiguration;
use crate::infra::error::{CspError, CspResult};
use crate::infra::retry::RetryPolicy;
use crate::services::certificate::Certificate;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

const PROVIDER_TYPES: [ProviderType; 3] = [
    ProviderType::Gost2001,
    ProviderType::Gost2012_256,
    ProviderType::Gost2012_512,
];

struct CspInner {
    config: CspConfiguration,
    providers: Vec<Arc<dyn KeyBackend>>,
    stores: Arc<dyn StoreBackend>,
}

/// Provider runtime shared by every context, store and message.
#[derive(Clone)]
pub struct Csp {
    inner: Arc<CspInner>,
}

impl fmt::Debug for Csp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .inner
            .providers
            .iter()
            .map(|p| p.provider_name())
            .collect();
        f.debug_struct("Csp").field("providers", &names).finish_non_exhaustive()
    }
}

impl Csp {
    /// Runtime with in-memory software providers and stores.
    #[must_use]
    pub fn in_memory() -> Self {
        let config = CspConfiguration::in_memory();
        let providers = PROVIDER_TYPES
            .iter()
            .map(|&t| {
                Arc::new(SoftProvider::in_memory(config.providers.name_for(t), t))
                    as Arc<dyn KeyBackend>
            })
            .collect();
        Self {
            inner: Arc::new(CspInner {
                config,
                providers,
                stores: Arc::new(MemoryStores::new()),
            }),
        }
    }

    /// Runtime built from a configuration with the default backends.
    ///
    /// # Errors
    /// Returns `ConfigurationError` for invalid values and `IoError` if a
    /// configured directory cannot be created.
    pub fn from_config(config: CspConfiguration) -> CspResult<Self> {
        CspBuilder::new(config).build()
    }

    #[must_use]
    pub fn builder(config: CspConfiguration) -> CspBuilder {
        CspBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &CspConfiguration {
        &self.inner.config
    }

    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.inner.config.retry
    }

    /// Name of the store used when none is given.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the configured name is malformed.
    pub fn default_store(&self) -> CspResult<StoreName> {
        StoreName::new(&self.inner.config.default_store)
    }

    /// Resolve a provider by type (through the configured default name) or by name.
    ///
    /// # Errors
    /// Returns `NotFound` when no registered provider matches.
    pub fn provider(&self, selector: &ProviderSelector) -> CspResult<Arc<dyn KeyBackend>> {
        let name = match selector {
            ProviderSelector::Type(t) => self.inner.config.providers.name_for(*t),
            ProviderSelector::Name(name) => name.as_str(),
        };
        self.provider_by_name(name)
            .ok_or_else(|| CspError::NotFound(format!("Provider {name}")))
    }

    /// Registered provider with the given name.
    #[must_use]
    pub fn provider_by_name(&self, name: &str) -> Option<Arc<dyn KeyBackend>> {
        self.inner
            .providers
            .iter()
            .find(|p| p.provider_name() == name)
            .cloned()
    }

    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn KeyBackend>> {
        self.inner.providers.iter()
    }

    pub(crate) fn store_backend(&self) -> &Arc<dyn StoreBackend> {
        &self.inner.stores
    }
}

/// Builder for a [`Csp`] with custom backends.
pub struct CspBuilder {
    config: CspConfiguration,
    providers: Vec<Arc<dyn KeyBackend>>,
    stores: Option<Arc<dyn StoreBackend>>,
}

impl CspBuilder {
    #[must_use]
    pub fn new(config: CspConfiguration) -> Self {
        Self {
            config,
            providers: Vec::new(),
            stores: None,
        }
    }

    /// Register a provider. Providers registered here take precedence over
    /// the software providers created for unclaimed default names.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn KeyBackend>) -> Self {
        self.providers.push(provider);
        self
    }

    #[must_use]
    pub fn with_stores(mut self, stores: Arc<dyn StoreBackend>) -> Self {
        self.stores = Some(stores);
        self
    }

    /// # Errors
    /// Returns `ConfigurationError` for invalid values and `IoError` if a
    /// configured directory cannot be created.
    pub fn build(self) -> CspResult<Csp> {
        self.config.validate()?;
        let mut providers = self.providers;
        for t in PROVIDER_TYPES {
            let name = self.config.providers.name_for(t);
            if providers.iter().any(|p| p.provider_name() == name) {
                continue;
            }
            let provider = match &self.config.container_dir {
                Some(dir) => {
                    SoftProvider::in_directory(name, t, dir.join(t.as_u32().to_string()))?
                }
                None => SoftProvider::in_memory(name, t),
            };
            log::debug!("Registered software provider {name}");
            providers.push(Arc::new(provider));
        }
        let stores: Arc<dyn StoreBackend> = match self.stores {
            Some(stores) => stores,
            None => match &self.config.store_dir {
                Some(dir) => Arc::new(DirectoryStores::new(dir)?),
                None => Arc::new(MemoryStores::new()),
            },
        };
        Ok(Csp {
            inner: Arc::new(CspInner {
                config: self.config,
                providers,
                stores,
            }),
        })
    }
}

struct ContextInner {
    csp: Csp,
    backend: Arc<dyn KeyBackend>,
    container: Option<ContainerName>,
    flags: ContextFlags,
    passwords: Mutex<HashMap<KeySlot, Password>>,
}

/// Handle to a key container of one provider.
#[derive(Clone)]
pub struct KeyContext {
    inner: Arc<ContextInner>,
}

impl fmt::Debug for KeyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyContext")
            .field("provider", &self.provider_name())
            .field("container", &self.inner.container)
            .field("flags", &self.inner.flags)
            .finish_non_exhaustive()
    }
}

impl KeyContext {
    /// Open an existing container.
    ///
    /// `None` with [`ContextFlags::VERIFY_CONTEXT`] gives a verify-only
    /// context; `None` without it opens the provider's default container.
    /// [`ContextFlags::NEW_KEYSET`] delegates to [`KeyContext::create`].
    ///
    /// # Errors
    /// Returns `NotFound` if the provider or container is missing and
    /// `InvalidInput` for contradictory flags.
    pub fn open(
        csp: &Csp,
        container: Option<&str>,
        provider: impl Into<ProviderSelector>,
        flags: ContextFlags,
    ) -> CspResult<Self> {
        let selector = provider.into();
        if flags.contains(ContextFlags::DELETE_KEYSET) {
            return Err(CspError::InvalidInput(
                "Containers are deleted with KeyContext::remove".to_string(),
            ));
        }
        if flags.contains(ContextFlags::VERIFY_CONTEXT) {
            if let Some(name) = container {
                return Err(CspError::InvalidInput(format!(
                    "Verify-only context cannot open container {name}"
                )));
            }
            let backend = csp.provider(&selector)?;
            log::debug!("Opened verify-only context on {}", backend.provider_name());
            return Ok(Self::attach(csp, backend, None, flags));
        }
        if flags.contains(ContextFlags::NEW_KEYSET) {
            let name = container.ok_or_else(|| {
                CspError::InvalidInput("A new key set needs a container name".to_string())
            })?;
            return Self::create(csp, name, selector, flags);
        }

        let backend = csp.provider(&selector)?;
        let name = match container {
            Some(name) => ContainerName::new(name)?,
            None => backend.default_container()?.ok_or_else(|| {
                CspError::NotFound(format!(
                    "Default key container of {}",
                    backend.provider_name()
                ))
            })?,
        };
        csp.retry().run("Open key container", || {
            if backend.container_exists(&name)? {
                Ok(())
            } else {
                Err(CspError::NotFound(format!("Key container {name}")))
            }
        })?;
        log::debug!("Opened container {name} on {}", backend.provider_name());
        Ok(Self::attach(csp, backend, Some(name), flags))
    }

    /// Create a new, empty container. With [`ContextFlags::RECREATE`] an
    /// existing container of that name is destroyed first.
    ///
    /// # Errors
    /// Returns `AlreadyExists` if the container exists and `RECREATE` is
    /// not set.
    pub fn create(
        csp: &Csp,
        container: &str,
        provider: impl Into<ProviderSelector>,
        flags: ContextFlags,
    ) -> CspResult<Self> {
        let backend = csp.provider(&provider.into())?;
        let name = ContainerName::new(container)?;
        if flags.contains(ContextFlags::RECREATE) && backend.container_exists(&name)? {
            backend.delete_container(&name)?;
            log::info!("Removed container {name} to recreate it");
        }
        backend.create_container(&name)?;
        Ok(Self::attach(csp, backend, Some(name), flags))
    }

    /// Destroy a container and everything in it.
    ///
    /// # Errors
    /// Returns `NotFound` if the container is absent.
    pub fn remove(
        csp: &Csp,
        container: &str,
        provider: impl Into<ProviderSelector>,
    ) -> CspResult<()> {
        let backend = csp.provider(&provider.into())?;
        backend.delete_container(&ContainerName::new(container)?)
    }

    pub(crate) fn attach(
        csp: &Csp,
        backend: Arc<dyn KeyBackend>,
        container: Option<ContainerName>,
        flags: ContextFlags,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                csp: csp.clone(),
                backend,
                container,
                flags,
                passwords: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Bind a password to a key slot. The first call on a fresh slot sets
    /// its PIN; later calls must match.
    ///
    /// # Errors
    /// Returns `CryptoFailure` on mismatch, `StateError` on a verify-only context.
    pub fn set_password(&self, secret: &str, slot: KeySlot) -> CspResult<()> {
        let container = self.require_container()?;
        let password = Password::new(secret);
        self.inner
            .backend
            .verify_or_set_pin(container, slot, &password)?;
        self.inner
            .passwords
            .lock()
            .map_err(|_| CspError::StateError("Password table lock poisoned".to_string()))?
            .insert(slot, password);
        Ok(())
    }

    /// Key in a slot, `None` when the slot is empty.
    ///
    /// # Errors
    /// Returns `StateError` on a verify-only context.
    pub fn get_key(&self, slot: KeySlot) -> CspResult<Option<Key>> {
        let container = self.require_container()?;
        let info = self.inner.csp.retry().run("Get user key", || {
            self.inner.backend.key_info(container, slot)
        })?;
        Ok(info.map(|info| self.key_from_info(slot, info)))
    }

    /// Generate a key pair into an empty slot.
    ///
    /// # Errors
    /// Returns `AlreadyExists` if the slot already holds a key.
    pub fn create_key(&self, exportable: bool, slot: KeySlot) -> CspResult<Key> {
        let container = self.require_container()?;
        let exportable = exportable || self.inner.flags.contains(ContextFlags::EXPORTABLE);
        let info = self
            .inner
            .backend
            .generate_key(container, slot, exportable)?;
        Ok(self.key_from_info(slot, info))
    }

    /// DER SubjectPublicKeyInfo of the signature key, or of the exchange key
    /// when there is no signature key.
    ///
    /// # Errors
    /// Returns `NotFound` when the container holds no key.
    pub fn public_key(&self) -> CspResult<Vec<u8>> {
        for slot in [KeySlot::Signature, KeySlot::Exchange] {
            if let Some(key) = self.get_key(slot)? {
                return key.encode();
            }
        }
        Err(CspError::NotFound(format!(
            "Key pair in container {}",
            self.describe()
        )))
    }

    /// Import an exported public key blob as a public-only key.
    ///
    /// # Errors
    /// Returns `FormatError` for a malformed blob.
    pub fn import_public_key(&self, blob: &[u8]) -> CspResult<Key> {
        let public = PublicKey::from_spki_der(blob)?;
        Ok(Key {
            context: self.clone(),
            slot: None,
            public,
            exportable: true,
        })
    }

    #[must_use]
    pub fn container_name(&self) -> Option<&ContainerName> {
        self.inner.container.as_ref()
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.inner.backend.provider_name()
    }

    #[must_use]
    pub fn provider_type(&self) -> ProviderType {
        self.inner.backend.provider_type()
    }

    #[must_use]
    pub fn flags(&self) -> ContextFlags {
        self.inner.flags
    }

    #[must_use]
    pub fn is_verify_only(&self) -> bool {
        self.inner.container.is_none()
    }

    #[must_use]
    pub fn csp(&self) -> &Csp {
        &self.inner.csp
    }

    /// Whether both handles address the same container of the same provider.
    #[must_use]
    pub fn same_container(&self, other: &KeyContext) -> bool {
        self.provider_name() == other.provider_name()
            && self.inner.container.is_some()
            && self.inner.container == other.inner.container
    }

    /// Slot whose key has this public key, signature slot first.
    pub(crate) fn slot_for(&self, public: &PublicKey) -> CspResult<Option<KeySlot>> {
        for slot in [KeySlot::Signature, KeySlot::Exchange] {
            if let Some(key) = self.get_key(slot)? {
                if key.public_key() == public {
                    return Ok(Some(slot));
                }
            }
        }
        Ok(None)
    }

    pub(crate) fn sign_hash(&self, slot: KeySlot, hash: &[u8]) -> CspResult<Vec<u8>> {
        let container = self.require_container()?;
        let password = self.password(slot)?;
        self.inner.csp.retry().run("Sign hash", || {
            self.inner
                .backend
                .sign_hash(container, slot, password.as_ref(), hash)
        })
    }

    pub(crate) fn agree(&self, slot: KeySlot, peer: &PublicKey, ukm: &[u8]) -> CspResult<Vec<u8>> {
        let container = self.require_container()?;
        let password = self.password(slot)?;
        self.inner.csp.retry().run("Key agreement", || {
            self.inner
                .backend
                .agree(container, slot, password.as_ref(), peer, ukm)
        })
    }

    fn key_from_info(&self, slot: KeySlot, info: KeyInfo) -> Key {
        Key {
            context: self.clone(),
            slot: Some(slot),
            public: info.public,
            exportable: info.exportable,
        }
    }

    fn password(&self, slot: KeySlot) -> CspResult<Option<Password>> {
        Ok(self
            .inner
            .passwords
            .lock()
            .map_err(|_| CspError::StateError("Password table lock poisoned".to_string()))?
            .get(&slot)
            .cloned())
    }

    fn require_container(&self) -> CspResult<&ContainerName> {
        self.inner.container.as_ref().ok_or_else(|| {
            CspError::StateError("Verify-only context has no key container".to_string())
        })
    }

    fn describe(&self) -> String {
        self.inner
            .container
            .as_ref()
            .map_or_else(|| "<verify-only>".to_string(), ToString::to_string)
    }
}

/// A key of a container slot, or a public-only imported key.
#[derive(Clone)]
pub struct Key {
    context: KeyContext,
    slot: Option<KeySlot>,
    public: PublicKey,
    exportable: bool,
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("slot", &self.slot)
            .field("algorithm", &self.public.algorithm())
            .field("exportable", &self.exportable)
            .finish()
    }
}

impl Key {
    /// Slot of a container key; `None` for an imported public key.
    #[must_use]
    pub fn slot(&self) -> Option<KeySlot> {
        self.slot
    }

    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.public.algorithm()
    }

    /// Native algorithm id (`CALG_*`).
    #[must_use]
    pub fn alg_id(&self) -> u32 {
        self.public.algorithm().alg_id()
    }

    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    #[must_use]
    pub fn is_exportable(&self) -> bool {
        self.exportable
    }

    #[must_use]
    pub fn context(&self) -> &KeyContext {
        &self.context
    }

    /// Exported public key blob (DER SubjectPublicKeyInfo).
    ///
    /// # Errors
    /// Returns `FormatError` if the key cannot be encoded.
    pub fn encode(&self) -> CspResult<Vec<u8>> {
        self.public.to_spki_der()
    }

    /// Keep a certificate for this key inside its container.
    ///
    /// # Errors
    /// Returns `StateError` for public-only keys and `InvalidInput` when the
    /// certificate carries a different public key.
    pub fn store_cert(&self, cert: &Certificate) -> CspResult<()> {
        let slot = self.slot.ok_or_else(|| {
            CspError::StateError("Imported public key has no container".to_string())
        })?;
        if cert.public_key()? != self.public {
            return Err(CspError::InvalidInput(format!(
                "Certificate {} does not match the {slot} key",
                cert.thumbprint()
            )));
        }
        let container = self.context.require_container()?;
        self.context
            .inner
            .backend
            .store_certificate(container, &cert.extract())
    }

    /// Certificate kept in the container, bound to this context when its key
    /// is present.
    ///
    /// # Errors
    /// Returns `StateError` for public-only keys and `FormatError` if the
    /// stored certificate does not parse.
    pub fn extract_cert(&self) -> CspResult<Option<Certificate>> {
        if self.slot.is_none() {
            return Err(CspError::StateError(
                "Imported public key has no container".to_string(),
            ));
        }
        let container = self.context.require_container()?;
        let Some(der) = self.context.inner.backend.load_certificate(container)? else {
            return Ok(None);
        };
        let mut cert = Certificate::load(&der)?;
        if let Err(e) = cert.bind(&self.context) {
            log::warn!("Container certificate left unbound: {e}");
        }
        Ok(Some(cert))
    }
}
