//! System certificate store backends.
//!
//! `DirectoryStores` keeps each named store as `<root>/<NAME>.toml` and
//! re-reads the file on every listing, so several runtimes over the same
//! directory see each other's writes. `MemoryStores` is process-local.

use crate::adapters::backend::{StoreBackend, StoredBinding, StoredCert};
use crate::domain::types::StoreName;
use crate::infra::error::{CspError, CspResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    entries: Vec<EntryRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    id: u64,
    /// Base64 DER
    certificate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    binding: Option<StoredBinding>,
}

impl EntryRecord {
    fn to_stored(&self) -> CspResult<StoredCert> {
        let der = STANDARD
            .decode(&self.certificate)
            .map_err(|e| CspError::FormatError(format!("Store entry {}: {e}", self.id)))?;
        Ok(StoredCert {
            id: self.id,
            der,
            binding: self.binding.clone(),
        })
    }
}

fn poisoned() -> CspError {
    CspError::StateError("Certificate store lock poisoned".to_string())
}

/// Stores persisted as TOML files in a directory.
pub struct DirectoryStores {
    root: PathBuf,
    lock: Mutex<()>,
}

impl DirectoryStores {
    /// # Errors
    /// Returns `IoError` if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> CspResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, store: &StoreName) -> PathBuf {
        self.root.join(format!("{}.toml", store.as_str()))
    }

    fn load(path: &Path) -> CspResult<StoreFile> {
        if !path.exists() {
            return Ok(StoreFile::default());
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CspError::FormatError(format!("Store file {}: {e}", path.display())))
    }

    fn save(path: &Path, file: &StoreFile) -> CspResult<()> {
        let content = toml::to_string_pretty(file)
            .map_err(|e| CspError::FormatError(format!("Failed to serialize store: {e}")))?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl StoreBackend for DirectoryStores {
    fn list(&self, store: &StoreName) -> CspResult<Vec<StoredCert>> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let file = Self::load(&self.path(store))?;
        file.entries.iter().map(EntryRecord::to_stored).collect()
    }

    fn insert(
        &self,
        store: &StoreName,
        der: &[u8],
        binding: Option<StoredBinding>,
    ) -> CspResult<u64> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let path = self.path(store);
        let mut file = Self::load(&path)?;
        let id = file.next_id;
        file.next_id += 1;
        file.entries.push(EntryRecord {
            id,
            certificate: STANDARD.encode(der),
            binding,
        });
        Self::save(&path, &file)?;
        log::info!("Added certificate entry {id} to store {store}");
        Ok(id)
    }

    fn remove(&self, store: &StoreName, id: u64) -> CspResult<bool> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let path = self.path(store);
        let mut file = Self::load(&path)?;
        let before = file.entries.len();
        file.entries.retain(|e| e.id != id);
        if file.entries.len() == before {
            return Ok(false);
        }
        Self::save(&path, &file)?;
        log::info!("Removed certificate entry {id} from store {store}");
        Ok(true)
    }
}

/// Process-local stores.
#[derive(Default)]
pub struct MemoryStores {
    stores: Mutex<HashMap<String, (u64, Vec<StoredCert>)>>,
}

impl MemoryStores {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryStores {
    fn list(&self, store: &StoreName) -> CspResult<Vec<StoredCert>> {
        let stores = self.stores.lock().map_err(|_| poisoned())?;
        Ok(stores
            .get(store.as_str())
            .map(|(_, entries)| entries.clone())
            .unwrap_or_default())
    }

    fn insert(
        &self,
        store: &StoreName,
        der: &[u8],
        binding: Option<StoredBinding>,
    ) -> CspResult<u64> {
        let mut stores = self.stores.lock().map_err(|_| poisoned())?;
        let (next_id, entries) = stores.entry(store.as_str().to_string()).or_default();
        let id = *next_id;
        *next_id += 1;
        entries.push(StoredCert {
            id,
            der: der.to_vec(),
            binding,
        });
        log::debug!("Added certificate entry {id} to in-memory store {store}");
        Ok(id)
    }

    fn remove(&self, store: &StoreName, id: u64) -> CspResult<bool> {
        let mut stores = self.stores.lock().map_err(|_| poisoned())?;
        let Some((_, entries)) = stores.get_mut(store.as_str()) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() != before)
    }
}
