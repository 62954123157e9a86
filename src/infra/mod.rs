//! Infrastructure layer for cross-cutting concerns.
//!
//! Provides foundational infrastructure including:
//! - Configuration management and validation
//! - Error handling and result types
//! - Retry scheduling for token-facing operations

pub mod config;
pub mod error;
pub mod retry;

pub use config::{ConfigManager, CspConfiguration, ProviderDefaults};
pub use error::{CspError, CspResult};
pub use retry::RetryPolicy;
