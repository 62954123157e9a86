//! On-disk form of a software container.

use crate::domain::crypto::{HashAlgorithm, KeyAlgorithm, PrivateKey};
use crate::domain::types::{KeySlot, Password};
use crate::infra::error::{CspError, CspResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One key slot: optional PIN digest and optional key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SlotRecord {
    /// Hex Streebog-256 of the PIN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    /// Hex big-endian private scalar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub exportable: bool,
}

impl SlotRecord {
    fn pin_digest(pin: &Password) -> String {
        hex::encode(HashAlgorithm::Streebog256.digest(pin.as_str().as_bytes()))
    }

    pub fn verify_or_set_pin(&mut self, pin: &Password) -> CspResult<bool> {
        let digest = Self::pin_digest(pin);
        match &self.pin {
            None => {
                self.pin = Some(digest);
                Ok(true)
            }
            Some(stored) if *stored == digest => Ok(false),
            Some(_) => Err(CspError::CryptoFailure("Wrong PIN".to_string())),
        }
    }

    /// A slot without a PIN is open; otherwise the given PIN (empty when
    /// absent) must match.
    pub fn authorize(&self, pin: Option<&Password>) -> CspResult<()> {
        let Some(stored) = &self.pin else {
            return Ok(());
        };
        let given = Self::pin_digest(&pin.cloned().unwrap_or_else(|| Password::new("")));
        if *stored == given {
            Ok(())
        } else {
            Err(CspError::CryptoFailure(match pin {
                Some(_) => "Wrong PIN".to_string(),
                None => "PIN required".to_string(),
            }))
        }
    }

    pub fn private_key(&self, algorithm: KeyAlgorithm) -> CspResult<Option<PrivateKey>> {
        match &self.key {
            Some(encoded) => {
                let bytes = hex::decode(encoded)
                    .map_err(|e| CspError::FormatError(format!("Stored key is not hex: {e}")))?;
                Ok(Some(PrivateKey::from_bytes(algorithm, &bytes)?))
            }
            None => Ok(None),
        }
    }
}

/// A whole container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ContainerRecord {
    pub name: String,
    /// Base64 DER certificate kept next to the keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default)]
    pub signature: SlotRecord,
    #[serde(default)]
    pub exchange: SlotRecord,
}

impl ContainerRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn slot(&self, slot: KeySlot) -> &SlotRecord {
        match slot {
            KeySlot::Signature => &self.signature,
            KeySlot::Exchange => &self.exchange,
        }
    }

    pub fn slot_mut(&mut self, slot: KeySlot) -> &mut SlotRecord {
        match slot {
            KeySlot::Signature => &mut self.signature,
            KeySlot::Exchange => &mut self.exchange,
        }
    }

    pub fn load(path: &Path) -> CspResult<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            CspError::FormatError(format!("Container file {}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> CspResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            CspError::FormatError(format!("Failed to serialize container {}: {e}", self.name))
        })?;
        fs::write(path, content)?;
        Ok(())
    }
}
