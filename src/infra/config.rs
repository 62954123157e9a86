//! Configuration management infrastructure.
//!
//! The configuration names the provider that backs each provider family,
//! where persistent containers and certificate stores live, and the retry
//! schedule applied to token-facing calls. It replaces the process-wide
//! provider defaults of the native CSP with an explicit value threaded
//! through every [`crate::Csp`] runtime.

use crate::domain::constants::{
    DEFAULT_STORE_NAME, PROV_KC1_GR3410_2001, PROV_KC1_GR3410_2012, PROV_KC1_GR3410_2012_512,
};
use crate::domain::crypto::HashAlgorithm;
use crate::domain::types::{ProviderType, StoreName};
use crate::infra::error::{CspError, CspResult};
use crate::infra::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Runtime configuration for a [`crate::Csp`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CspConfiguration {
    /// Provider names used when a context is opened by provider type
    pub providers: ProviderDefaults,

    /// Store opened when no store name is given ("MY")
    pub default_store: String,

    /// Directory holding persistent certificate stores; `None` keeps stores in memory
    pub store_dir: Option<PathBuf>,

    /// Directory holding key containers; `None` keeps containers in memory
    pub container_dir: Option<PathBuf>,

    /// Hash length used by digests created with length 0 (256, 512 or 2001)
    pub default_hash_length: u32,

    /// Retry schedule for token-facing operations
    pub retry: RetryPolicy,
}

/// Default provider name per provider family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDefaults {
    /// GOST R 34.10-2001 (provider type 75)
    pub gost_2001: String,
    /// GOST R 34.10-2012, 256-bit keys (provider type 80)
    pub gost_2012_256: String,
    /// GOST R 34.10-2012, 512-bit keys (provider type 81)
    pub gost_2012_512: String,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            gost_2001: PROV_KC1_GR3410_2001.to_string(),
            gost_2012_256: PROV_KC1_GR3410_2012.to_string(),
            gost_2012_512: PROV_KC1_GR3410_2012_512.to_string(),
        }
    }
}

impl ProviderDefaults {
    /// Provider name configured for a provider family.
    #[must_use]
    pub fn name_for(&self, provider_type: ProviderType) -> &str {
        match provider_type {
            ProviderType::Gost2001 => &self.gost_2001,
            ProviderType::Gost2012_256 => &self.gost_2012_256,
            ProviderType::Gost2012_512 => &self.gost_2012_512,
        }
    }
}

impl Default for CspConfiguration {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir().map(|d| d.join("gost-csp"));
        Self {
            providers: ProviderDefaults::default(),
            default_store: DEFAULT_STORE_NAME.to_string(),
            store_dir: data_dir.as_ref().map(|d| d.join("stores")),
            container_dir: data_dir.map(|d| d.join("containers")),
            default_hash_length: 256,
            retry: RetryPolicy::default(),
        }
    }
}

impl CspConfiguration {
    /// Configuration with every container and store kept in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            store_dir: None,
            container_dir: None,
            ..Self::default()
        }
    }

    /// Configuration persisting containers and stores below `root`.
    #[must_use]
    pub fn rooted_at<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            store_dir: Some(root.join("stores")),
            container_dir: Some(root.join("containers")),
            ..Self::default()
        }
    }

    /// Replace the retry schedule.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Hash algorithm used for a requested length, 0 meaning the configured default.
    ///
    /// # Errors
    /// Returns `InvalidInput` for lengths other than 0, 256, 512 and 2001.
    pub fn hash_for_length(&self, length: u32) -> CspResult<HashAlgorithm> {
        if length == 0 {
            HashAlgorithm::from_length(self.default_hash_length)
        } else {
            HashAlgorithm::from_length(length)
        }
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    /// Returns `ConfigurationError` describing the first invalid value.
    pub fn validate(&self) -> CspResult<()> {
        StoreName::new(&self.default_store)
            .map_err(|e| CspError::ConfigurationError(format!("default_store: {e}")))?;

        HashAlgorithm::from_length(self.default_hash_length).map_err(|_| {
            CspError::ConfigurationError(format!(
                "Invalid default hash length: {}",
                self.default_hash_length
            ))
        })?;

        for (family, name) in [
            ("gost_2001", &self.providers.gost_2001),
            ("gost_2012_256", &self.providers.gost_2012_256),
            ("gost_2012_512", &self.providers.gost_2012_512),
        ] {
            if name.trim().is_empty() {
                return Err(CspError::ConfigurationError(format!(
                    "Provider name for {family} must not be empty"
                )));
            }
        }

        if self.retry.attempts == 0 {
            return Err(CspError::ConfigurationError(
                "Retry attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration manager for handling config files
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new configuration manager with default path
    ///
    /// # Errors
    /// Currently infallible; kept fallible for platform lookups.
    pub fn new() -> CspResult<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Create a configuration manager with custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the default configuration file path
    ///
    /// # Errors
    /// Currently infallible.
    pub fn default_config_path() -> CspResult<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Ok(config_dir.join("gost-csp").join("config.toml"))
        } else {
            Ok(PathBuf::from("gost-csp-config.toml"))
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    ///
    /// # Errors
    /// Returns `ConfigurationError` when the file cannot be read, parsed or written.
    pub fn load_or_create_default(&self) -> CspResult<CspConfiguration> {
        if self.config_path.exists() {
            self.load()
        } else {
            log::info!(
                "Configuration file not found, creating default: {}",
                self.config_path.display()
            );
            let default_config = CspConfiguration::default();
            self.save(&default_config)?;
            Ok(default_config)
        }
    }

    /// Load configuration from file
    ///
    /// # Errors
    /// Returns `ConfigurationError` when the file is unreadable or invalid.
    pub fn load(&self) -> CspResult<CspConfiguration> {
        log::info!("Loading configuration from: {}", self.config_path.display());

        let content = fs::read_to_string(&self.config_path).map_err(|e| {
            CspError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;

        let config: CspConfiguration = toml::from_str(&content).map_err(|e| {
            CspError::ConfigurationError(format!("Failed to parse config file: {e}"))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    /// Returns `ConfigurationError` when the file or its directory cannot be written.
    pub fn save(&self, config: &CspConfiguration) -> CspResult<()> {
        log::info!("Saving configuration to: {}", self.config_path.display());

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CspError::ConfigurationError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| {
            CspError::ConfigurationError(format!("Failed to serialize config: {e}"))
        })?;

        fs::write(&self.config_path, content).map_err(|e| {
            CspError::ConfigurationError(format!(
                "Failed to write config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Get the configuration file path
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
