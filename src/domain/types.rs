//! Type-safe wrappers using new-type pattern
//!
//! Container names, store names, thumbprints, key slots, provider
//! selection and context flags are validated once at the boundary and then
//! passed around as typed values.

use crate::domain::constants::{
    AT_KEYEXCHANGE, AT_SIGNATURE, CONTEXT_RECREATE, CRYPT_DELETEKEYSET, CRYPT_EXPORTABLE,
    CRYPT_NEWKEYSET, CRYPT_SILENT, CRYPT_VERIFYCONTEXT, PROV_GOST_2001_DH, PROV_GOST_2012_256,
    PROV_GOST_2012_512, THUMBPRINT_LEN,
};
use crate::domain::crypto::KeyAlgorithm;
use crate::infra::error::{CspError, CspResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Key container name.
///
/// Names may carry `\xNN` escapes for bytes that cannot be typed directly;
/// they are decoded on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerName(String);

impl ContainerName {
    /// Create a container name, decoding `\xNN` escapes.
    ///
    /// # Errors
    /// Returns `InvalidInput` for empty names, malformed escapes or names
    /// that do not decode to UTF-8.
    pub fn new(name: impl AsRef<str>) -> CspResult<Self> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(CspError::InvalidInput(
                "Container name cannot be empty".to_string(),
            ));
        }
        let decoded = Self::unescape(name)?;
        Ok(ContainerName(decoded))
    }

    /// Name already in decoded form, as read back from a backend.
    pub(crate) fn from_decoded(name: String) -> CspResult<Self> {
        if name.is_empty() {
            return Err(CspError::InvalidInput(
                "Container name cannot be empty".to_string(),
            ));
        }
        Ok(ContainerName(name))
    }

    /// Get the container name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name with every non-printable or non-ASCII byte written as `\xNN`.
    #[must_use]
    pub fn escaped(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        for &b in self.0.as_bytes() {
            if b.is_ascii_graphic() || b == b' ' {
                out.push(char::from(b));
            } else {
                out.push_str(&format!("\\x{b:02X}"));
            }
        }
        out
    }

    fn unescape(name: &str) -> CspResult<String> {
        let bytes = name.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'x') {
                let pair = bytes.get(i + 2..i + 4).ok_or_else(|| {
                    CspError::InvalidInput(format!("Truncated escape in container name: {name}"))
                })?;
                let pair = std::str::from_utf8(pair).map_err(|_| {
                    CspError::InvalidInput(format!("Malformed escape in container name: {name}"))
                })?;
                let byte = u8::from_str_radix(pair, 16).map_err(|_| {
                    CspError::InvalidInput(format!("Malformed escape in container name: {name}"))
                })?;
                out.push(byte);
                i += 4;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        String::from_utf8(out).map_err(|_| {
            CspError::InvalidInput(format!("Container name is not valid UTF-8: {name}"))
        })
    }
}

impl FromStr for ContainerName {
    type Err = CspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.escaped())
    }
}

/// Certificate store name ("MY", "ROOT", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreName(String);

impl StoreName {
    /// Create a store name after validation.
    ///
    /// # Errors
    /// Returns `InvalidInput` for empty names or names containing path separators.
    pub fn new(name: impl AsRef<str>) -> CspResult<Self> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(CspError::InvalidInput(
                "Store name cannot be empty".to_string(),
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CspError::InvalidInput(format!(
                "Store name may contain only letters, digits, '_' and '-': {name}"
            )));
        }
        Ok(StoreName(name.to_string()))
    }

    /// Get the store name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-1 certificate thumbprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Thumbprint([u8; THUMBPRINT_LEN]);

impl Thumbprint {
    /// Wrap a 20-byte digest.
    ///
    /// # Errors
    /// Returns `InvalidInput` when `bytes` is not 20 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> CspResult<Self> {
        let arr: [u8; THUMBPRINT_LEN] = bytes.try_into().map_err(|_| {
            CspError::InvalidInput(format!(
                "Thumbprint must be {THUMBPRINT_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Thumbprint(arr))
    }

    /// Parse the hex form returned by [`Thumbprint::to_hex`].
    ///
    /// # Errors
    /// Returns `InvalidInput` for non-hex input or a wrong length.
    pub fn from_hex(hex_str: &str) -> CspResult<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| CspError::InvalidInput(format!("Invalid thumbprint hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Thumbprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thumbprint({})", self.to_hex())
    }
}

impl fmt::Display for Thumbprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Key slot inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySlot {
    /// AT_KEYEXCHANGE
    Exchange,
    /// AT_SIGNATURE
    Signature,
}

impl KeySlot {
    /// Native slot number
    #[must_use]
    pub fn as_u32(self) -> u32 {
        match self {
            KeySlot::Exchange => AT_KEYEXCHANGE,
            KeySlot::Signature => AT_SIGNATURE,
        }
    }

    /// Slot from its native number.
    ///
    /// # Errors
    /// Returns `InvalidInput` for unknown slot numbers.
    pub fn from_u32(value: u32) -> CspResult<Self> {
        match value {
            AT_KEYEXCHANGE => Ok(KeySlot::Exchange),
            AT_SIGNATURE => Ok(KeySlot::Signature),
            other => Err(CspError::InvalidInput(format!("Unknown key slot: {other}"))),
        }
    }
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySlot::Exchange => write!(f, "AT_KEYEXCHANGE"),
            KeySlot::Signature => write!(f, "AT_SIGNATURE"),
        }
    }
}

/// Provider family, identified by its native provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    /// PROV_GOST_2001_DH (75)
    Gost2001,
    /// PROV_GOST_2012_256 (80)
    Gost2012_256,
    /// PROV_GOST_2012_512 (81)
    Gost2012_512,
}

impl ProviderType {
    #[must_use]
    pub fn as_u32(self) -> u32 {
        match self {
            ProviderType::Gost2001 => PROV_GOST_2001_DH,
            ProviderType::Gost2012_256 => PROV_GOST_2012_256,
            ProviderType::Gost2012_512 => PROV_GOST_2012_512,
        }
    }

    /// Provider family from its native number.
    ///
    /// # Errors
    /// Returns `Unsupported` for non-GOST provider types.
    pub fn from_u32(value: u32) -> CspResult<Self> {
        match value {
            PROV_GOST_2001_DH => Ok(ProviderType::Gost2001),
            PROV_GOST_2012_256 => Ok(ProviderType::Gost2012_256),
            PROV_GOST_2012_512 => Ok(ProviderType::Gost2012_512),
            other => Err(CspError::Unsupported(format!("Provider type {other}"))),
        }
    }

    /// Key algorithm generated by providers of this family.
    #[must_use]
    pub fn key_algorithm(self) -> KeyAlgorithm {
        match self {
            ProviderType::Gost2001 => KeyAlgorithm::Gost2001,
            ProviderType::Gost2012_256 => KeyAlgorithm::Gost2012_256,
            ProviderType::Gost2012_512 => KeyAlgorithm::Gost2012_512,
        }
    }
}

/// How a context picks its provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSelector {
    /// The configured default provider of a family
    Type(ProviderType),
    /// An explicitly named provider
    Name(String),
}

impl Default for ProviderSelector {
    fn default() -> Self {
        ProviderSelector::Type(ProviderType::Gost2012_256)
    }
}

impl From<ProviderType> for ProviderSelector {
    fn from(value: ProviderType) -> Self {
        ProviderSelector::Type(value)
    }
}

impl From<&str> for ProviderSelector {
    fn from(value: &str) -> Self {
        ProviderSelector::Name(value.to_string())
    }
}

/// Flags passed when opening a context or creating a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextFlags(u32);

impl ContextFlags {
    pub const NONE: ContextFlags = ContextFlags(0);
    pub const VERIFY_CONTEXT: ContextFlags = ContextFlags(CRYPT_VERIFYCONTEXT);
    pub const NEW_KEYSET: ContextFlags = ContextFlags(CRYPT_NEWKEYSET);
    pub const DELETE_KEYSET: ContextFlags = ContextFlags(CRYPT_DELETEKEYSET);
    pub const SILENT: ContextFlags = ContextFlags(CRYPT_SILENT);
    pub const EXPORTABLE: ContextFlags = ContextFlags(CRYPT_EXPORTABLE);
    /// Remove a container of the same name before creating it
    pub const RECREATE: ContextFlags = ContextFlags(CONTEXT_RECREATE);

    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        ContextFlags(bits)
    }

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn contains(self, other: ContextFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ContextFlags {
    type Output = ContextFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        ContextFlags(self.0 | rhs.0)
    }
}

/// Container PIN. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Password(secret.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password([REDACTED])")
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PIN REDACTED]")
    }
}
