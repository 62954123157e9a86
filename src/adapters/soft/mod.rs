//! Software GOST provider.
//!
//! Keys are generated and used in process. Containers live either in memory
//! or as one TOML file each under a directory; the file name is the hex of
//! the container name so arbitrary names are safe on any filesystem.

mod record;

use crate::adapters::backend::{KeyBackend, KeyInfo};
use crate::domain::crypto::{KeyAlgorithm, PrivateKey, PublicKey};
use crate::domain::types::{ContainerName, KeySlot, Password, ProviderType};
use crate::infra::error::{CspError, CspResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use record::{ContainerRecord, SlotRecord};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const CONTAINER_FILE_EXT: &str = "toml";

enum Storage {
    Memory(Mutex<BTreeMap<String, ContainerRecord>>),
    Directory { root: PathBuf, lock: Mutex<()> },
}

/// Software implementation of [`KeyBackend`].
pub struct SoftProvider {
    name: String,
    provider_type: ProviderType,
    storage: Storage,
}

impl SoftProvider {
    /// Provider whose containers vanish with the process.
    #[must_use]
    pub fn in_memory(name: impl Into<String>, provider_type: ProviderType) -> Self {
        Self {
            name: name.into(),
            provider_type,
            storage: Storage::Memory(Mutex::new(BTreeMap::new())),
        }
    }

    /// Provider keeping containers under `root`, created if missing.
    ///
    /// # Errors
    /// Returns `IoError` if the directory cannot be created.
    pub fn in_directory(
        name: impl Into<String>,
        provider_type: ProviderType,
        root: impl Into<PathBuf>,
    ) -> CspResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        log::debug!("Software provider containers under {}", root.display());
        Ok(Self {
            name: name.into(),
            provider_type,
            storage: Storage::Directory {
                root,
                lock: Mutex::new(()),
            },
        })
    }

    fn algorithm(&self) -> KeyAlgorithm {
        self.provider_type.key_algorithm()
    }

    fn container_path(root: &Path, container: &ContainerName) -> PathBuf {
        root.join(format!(
            "{}.{CONTAINER_FILE_EXT}",
            hex::encode(container.as_str().as_bytes())
        ))
    }

    fn poisoned() -> CspError {
        CspError::StateError("Container storage lock poisoned".to_string())
    }

    fn not_found(container: &ContainerName) -> CspError {
        CspError::NotFound(format!("Key container {container}"))
    }

    /// Run `f` over a container, persisting the record when `write` is set.
    fn with_container<T>(
        &self,
        container: &ContainerName,
        write: bool,
        f: impl FnOnce(&mut ContainerRecord) -> CspResult<T>,
    ) -> CspResult<T> {
        match &self.storage {
            Storage::Memory(map) => {
                let mut map = map.lock().map_err(|_| Self::poisoned())?;
                let record = map
                    .get_mut(container.as_str())
                    .ok_or_else(|| Self::not_found(container))?;
                f(record)
            }
            Storage::Directory { root, lock } => {
                let _guard = lock.lock().map_err(|_| Self::poisoned())?;
                let path = Self::container_path(root, container);
                if !path.exists() {
                    return Err(Self::not_found(container));
                }
                let mut record = ContainerRecord::load(&path)?;
                let result = f(&mut record)?;
                if write {
                    record.save(&path)?;
                }
                Ok(result)
            }
        }
    }

    fn key_info_from(&self, slot: &SlotRecord) -> CspResult<Option<KeyInfo>> {
        let Some(private) = slot.private_key(self.algorithm())? else {
            return Ok(None);
        };
        Ok(Some(KeyInfo {
            algorithm: self.algorithm(),
            public: private.public_key()?,
            exportable: slot.exportable,
        }))
    }

    fn unlocked_key(
        &self,
        container: &ContainerName,
        slot: KeySlot,
        pin: Option<&Password>,
    ) -> CspResult<PrivateKey> {
        self.with_container(container, false, |record| {
            let slot_record = record.slot(slot);
            slot_record.authorize(pin)?;
            slot_record
                .private_key(self.algorithm())?
                .ok_or_else(|| CspError::NotFound(format!("{slot} key in container {container}")))
        })
    }
}

impl KeyBackend for SoftProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    fn container_exists(&self, container: &ContainerName) -> CspResult<bool> {
        match &self.storage {
            Storage::Memory(map) => Ok(map
                .lock()
                .map_err(|_| Self::poisoned())?
                .contains_key(container.as_str())),
            Storage::Directory { root, .. } => Ok(Self::container_path(root, container).exists()),
        }
    }

    fn default_container(&self) -> CspResult<Option<ContainerName>> {
        Ok(self.list_containers()?.into_iter().next())
    }

    fn create_container(&self, container: &ContainerName) -> CspResult<()> {
        let exists = CspError::AlreadyExists(format!("Key container {container}"));
        match &self.storage {
            Storage::Memory(map) => {
                let mut map = map.lock().map_err(|_| Self::poisoned())?;
                if map.contains_key(container.as_str()) {
                    return Err(exists);
                }
                map.insert(
                    container.as_str().to_string(),
                    ContainerRecord::new(container.as_str()),
                );
            }
            Storage::Directory { root, lock } => {
                let _guard = lock.lock().map_err(|_| Self::poisoned())?;
                let path = Self::container_path(root, container);
                if path.exists() {
                    return Err(exists);
                }
                ContainerRecord::new(container.as_str()).save(&path)?;
            }
        }
        log::info!("Created key container {container} in {}", self.name);
        Ok(())
    }

    fn delete_container(&self, container: &ContainerName) -> CspResult<()> {
        let removed = match &self.storage {
            Storage::Memory(map) => map
                .lock()
                .map_err(|_| Self::poisoned())?
                .remove(container.as_str())
                .is_some(),
            Storage::Directory { root, lock } => {
                let _guard = lock.lock().map_err(|_| Self::poisoned())?;
                let path = Self::container_path(root, container);
                if path.exists() {
                    fs::remove_file(&path)?;
                    true
                } else {
                    false
                }
            }
        };
        if !removed {
            return Err(Self::not_found(container));
        }
        log::info!("Deleted key container {container} from {}", self.name);
        Ok(())
    }

    fn list_containers(&self) -> CspResult<Vec<ContainerName>> {
        let mut names = match &self.storage {
            Storage::Memory(map) => map
                .lock()
                .map_err(|_| Self::poisoned())?
                .keys()
                .cloned()
                .collect::<Vec<_>>(),
            Storage::Directory { root, lock } => {
                let _guard = lock.lock().map_err(|_| Self::poisoned())?;
                let mut names = Vec::new();
                for entry in fs::read_dir(root)? {
                    let path = entry?.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(CONTAINER_FILE_EXT) {
                        continue;
                    }
                    match ContainerRecord::load(&path) {
                        Ok(record) => names.push(record.name),
                        Err(e) => log::warn!("Skipping unreadable container file: {e}"),
                    }
                }
                names
            }
        };
        names.sort();
        names.into_iter().map(ContainerName::from_decoded).collect()
    }

    fn verify_or_set_pin(
        &self,
        container: &ContainerName,
        slot: KeySlot,
        pin: &Password,
    ) -> CspResult<()> {
        let changed = self.with_container(container, true, |record| {
            record.slot_mut(slot).verify_or_set_pin(pin)
        })?;
        if changed {
            log::debug!("PIN set for {slot} in container {container}");
        }
        Ok(())
    }

    fn key_info(&self, container: &ContainerName, slot: KeySlot) -> CspResult<Option<KeyInfo>> {
        self.with_container(container, false, |record| {
            self.key_info_from(record.slot(slot))
        })
    }

    fn generate_key(
        &self,
        container: &ContainerName,
        slot: KeySlot,
        exportable: bool,
    ) -> CspResult<KeyInfo> {
        let algorithm = self.algorithm();
        let info = self.with_container(container, true, |record| {
            let slot_record = record.slot_mut(slot);
            if slot_record.key.is_some() {
                return Err(CspError::AlreadyExists(format!(
                    "{slot} key in container {container}"
                )));
            }
            let private = PrivateKey::generate(algorithm);
            let public = private.public_key()?;
            slot_record.key = Some(hex::encode(private.to_bytes()));
            slot_record.exportable = exportable;
            Ok(KeyInfo {
                algorithm,
                public,
                exportable,
            })
        })?;
        log::info!("Generated {algorithm} {slot} key in container {container}");
        Ok(info)
    }

    fn sign_hash(
        &self,
        container: &ContainerName,
        slot: KeySlot,
        pin: Option<&Password>,
        hash: &[u8],
    ) -> CspResult<Vec<u8>> {
        let key = self.unlocked_key(container, slot, pin)?;
        log::debug!("Signing {}-byte hash with {slot} key of {container}", hash.len());
        key.sign_hash(hash)
    }

    fn agree(
        &self,
        container: &ContainerName,
        slot: KeySlot,
        pin: Option<&Password>,
        peer: &PublicKey,
        ukm: &[u8],
    ) -> CspResult<Vec<u8>> {
        let key = self.unlocked_key(container, slot, pin)?;
        key.agree(peer, ukm)
    }

    fn store_certificate(&self, container: &ContainerName, der: &[u8]) -> CspResult<()> {
        self.with_container(container, true, |record| {
            record.certificate = Some(STANDARD.encode(der));
            Ok(())
        })?;
        log::info!("Stored certificate in container {container}");
        Ok(())
    }

    fn load_certificate(&self, container: &ContainerName) -> CspResult<Option<Vec<u8>>> {
        self.with_container(container, false, |record| match &record.certificate {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(|e| CspError::FormatError(format!("Stored certificate: {e}"))),
            None => Ok(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crypto::HashAlgorithm;
    use tempfile::tempdir;

    fn name(s: &str) -> ContainerName {
        ContainerName::new(s).unwrap()
    }

    fn exercise(provider: &SoftProvider) {
        let c = name("test-container");
        assert!(!provider.container_exists(&c).unwrap());
        assert!(provider.default_container().unwrap().is_none());
        provider.create_container(&c).unwrap();
        assert!(matches!(
            provider.create_container(&c),
            Err(CspError::AlreadyExists(_))
        ));
        assert_eq!(provider.default_container().unwrap(), Some(c.clone()));

        assert!(provider.key_info(&c, KeySlot::Signature).unwrap().is_none());
        let info = provider.generate_key(&c, KeySlot::Signature, false).unwrap();
        assert_eq!(
            provider.key_info(&c, KeySlot::Signature).unwrap(),
            Some(info.clone())
        );
        assert!(provider.generate_key(&c, KeySlot::Signature, false).is_err());

        let hash = HashAlgorithm::Streebog256.digest(b"hurblewurble");
        let sig = provider.sign_hash(&c, KeySlot::Signature, None, &hash).unwrap();
        assert!(info.public.verify_hash(&hash, &sig));

        provider.store_certificate(&c, b"\x30\x00").unwrap();
        assert_eq!(provider.load_certificate(&c).unwrap().unwrap(), b"\x30\x00");

        provider.delete_container(&c).unwrap();
        assert!(matches!(
            provider.delete_container(&c),
            Err(CspError::NotFound(_))
        ));
    }

    #[test]
    fn test_memory_provider() {
        exercise(&SoftProvider::in_memory("soft", ProviderType::Gost2012_256));
    }

    #[test]
    fn test_directory_provider() {
        let dir = tempdir().unwrap();
        exercise(
            &SoftProvider::in_directory("soft", ProviderType::Gost2012_512, dir.path()).unwrap(),
        );
    }

    #[test]
    fn test_directory_provider_persists_across_instances() {
        let dir = tempdir().unwrap();
        let c = name("keep\\x20me");
        let first =
            SoftProvider::in_directory("soft", ProviderType::Gost2001, dir.path()).unwrap();
        first.create_container(&c).unwrap();
        let info = first.generate_key(&c, KeySlot::Exchange, true).unwrap();

        let second =
            SoftProvider::in_directory("soft", ProviderType::Gost2001, dir.path()).unwrap();
        assert_eq!(second.list_containers().unwrap(), vec![c.clone()]);
        let again = second.key_info(&c, KeySlot::Exchange).unwrap().unwrap();
        assert_eq!(again.public, info.public);
        assert!(again.exportable);
    }

    #[test]
    fn test_pin_protects_signing() {
        let provider = SoftProvider::in_memory("soft", ProviderType::Gost2012_256);
        let c = name("pinned");
        provider.create_container(&c).unwrap();
        provider.generate_key(&c, KeySlot::Signature, false).unwrap();
        provider
            .verify_or_set_pin(&c, KeySlot::Signature, &Password::new("1234"))
            .unwrap();
        let hash = [7u8; 32];
        assert!(provider.sign_hash(&c, KeySlot::Signature, None, &hash).is_err());
        assert!(provider
            .sign_hash(&c, KeySlot::Signature, Some(&Password::new("1234")), &hash)
            .is_ok());
    }
}
