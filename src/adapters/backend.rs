//! Provider and store backend traits.
//!
//! A key backend is one cryptographic provider: it owns key containers, each
//! holding at most one signature key and one exchange key plus an optional
//! certificate. A store backend keeps named, persistent certificate stores.
//! Services talk to both only through these traits, so a hardware token and
//! the software provider are interchangeable.

use crate::domain::crypto::{KeyAlgorithm, PublicKey};
use crate::domain::types::{ContainerName, KeySlot, Password, ProviderType, StoreName};
use crate::infra::error::CspResult;
use serde::{Deserialize, Serialize};

/// Public description of a key held in a container slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub algorithm: KeyAlgorithm,
    pub public: PublicKey,
    pub exportable: bool,
}

/// Cryptographic provider operations.
///
/// Implementations serialize access to their container state internally;
/// every method takes `&self`.
pub trait KeyBackend: Send + Sync {
    /// Provider name as used for explicit selection.
    fn provider_name(&self) -> &str;

    /// Provider family.
    fn provider_type(&self) -> ProviderType;

    /// Whether a container exists.
    ///
    /// # Errors
    /// Returns error if the container list cannot be read.
    fn container_exists(&self, container: &ContainerName) -> CspResult<bool>;

    /// Container opened when no name is given, if any.
    ///
    /// # Errors
    /// Returns error if the container list cannot be read.
    fn default_container(&self) -> CspResult<Option<ContainerName>>;

    /// Create an empty container.
    ///
    /// # Errors
    /// Returns `AlreadyExists` if the container is present.
    fn create_container(&self, container: &ContainerName) -> CspResult<()>;

    /// Destroy a container with its keys and certificate.
    ///
    /// # Errors
    /// Returns `NotFound` if the container is absent.
    fn delete_container(&self, container: &ContainerName) -> CspResult<()>;

    /// All container names, sorted.
    ///
    /// # Errors
    /// Returns error if the container list cannot be read.
    fn list_containers(&self) -> CspResult<Vec<ContainerName>>;

    /// Set the PIN of a slot on first use, verify it afterwards.
    ///
    /// # Errors
    /// Returns `CryptoFailure` when the PIN does not match.
    fn verify_or_set_pin(&self, container: &ContainerName, slot: KeySlot, pin: &Password)
        -> CspResult<()>;

    /// Key held in a slot, `None` when empty.
    ///
    /// # Errors
    /// Returns `NotFound` if the container is absent.
    fn key_info(&self, container: &ContainerName, slot: KeySlot) -> CspResult<Option<KeyInfo>>;

    /// Generate a key pair into an empty slot.
    ///
    /// # Errors
    /// Returns `AlreadyExists` if the slot holds a key.
    fn generate_key(
        &self,
        container: &ContainerName,
        slot: KeySlot,
        exportable: bool,
    ) -> CspResult<KeyInfo>;

    /// Sign a hash value with the key in a slot.
    ///
    /// # Errors
    /// Returns `CryptoFailure` for a missing or wrong PIN, `NotFound` for an
    /// empty slot.
    fn sign_hash(
        &self,
        container: &ContainerName,
        slot: KeySlot,
        pin: Option<&Password>,
        hash: &[u8],
    ) -> CspResult<Vec<u8>>;

    /// VKO agreement between the slot key and a peer public key.
    ///
    /// # Errors
    /// Returns `CryptoFailure` for a missing or wrong PIN or mismatched
    /// curves, `NotFound` for an empty slot.
    fn agree(
        &self,
        container: &ContainerName,
        slot: KeySlot,
        pin: Option<&Password>,
        peer: &PublicKey,
        ukm: &[u8],
    ) -> CspResult<Vec<u8>>;

    /// Keep a certificate inside the container.
    ///
    /// # Errors
    /// Returns `NotFound` if the container is absent.
    fn store_certificate(&self, container: &ContainerName, der: &[u8]) -> CspResult<()>;

    /// Certificate kept inside the container, if any.
    ///
    /// # Errors
    /// Returns `NotFound` if the container is absent.
    fn load_certificate(&self, container: &ContainerName) -> CspResult<Option<Vec<u8>>>;
}

/// Where a stored certificate's private key lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBinding {
    pub provider: String,
    pub container: String,
    pub slot: KeySlot,
}

/// One entry of a persistent store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCert {
    /// Entry id, unique within its store
    pub id: u64,
    pub der: Vec<u8>,
    pub binding: Option<StoredBinding>,
}

/// Named persistent certificate stores.
pub trait StoreBackend: Send + Sync {
    /// Current entries of a store in insertion order. Unknown stores are empty.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    fn list(&self, store: &StoreName) -> CspResult<Vec<StoredCert>>;

    /// Append an entry, returning its id.
    ///
    /// # Errors
    /// Returns error if the store cannot be written.
    fn insert(
        &self,
        store: &StoreName,
        der: &[u8],
        binding: Option<StoredBinding>,
    ) -> CspResult<u64>;

    /// Remove one entry. Returns `false` when no entry has that id.
    ///
    /// # Errors
    /// Returns error if the store cannot be written.
    fn remove(&self, store: &StoreName, id: u64) -> CspResult<bool>;
}
