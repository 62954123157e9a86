//! Error types for provider, certificate and message operations.

use thiserror::Error;

/// Result type for CSP operations
pub type CspResult<T> = Result<T, CspError>;

/// Error kinds surfaced by the crate.
///
/// A failed signature check is never an error: verification returns `false`.
/// Lookups that find nothing return `None` or an empty sequence.
#[derive(Error, Debug, miette::Diagnostic)]
pub enum CspError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Format error: {0}")]
    FormatError(String),

    #[error("Invalid state: {0}")]
    StateError(String),

    #[error("Cryptographic failure: {0}")]
    CryptoFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl CspError {
    /// Whether a retry could change the outcome.
    ///
    /// Malformed input, misuse of a finalized object and unsupported
    /// algorithms fail the same way every time.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            CspError::FormatError(_)
                | CspError::StateError(_)
                | CspError::InvalidInput(_)
                | CspError::Unsupported(_)
                | CspError::ConfigurationError(_)
        )
    }
}

impl From<der::Error> for CspError {
    fn from(error: der::Error) -> Self {
        CspError::FormatError(error.to_string())
    }
}

impl From<std::io::Error> for CspError {
    fn from(error: std::io::Error) -> Self {
        CspError::IoError(error.to_string())
    }
}

impl From<pem::PemError> for CspError {
    fn from(error: pem::PemError) -> Self {
        CspError::FormatError(format!("PEM: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CspError::NotFound("container 'test'".to_string());
        assert_eq!(error.to_string(), "Not found: container 'test'");

        let error = CspError::StateError("digest already finalized".to_string());
        assert_eq!(error.to_string(), "Invalid state: digest already finalized");
    }

    #[test]
    fn test_transient_classification() {
        assert!(CspError::CryptoFailure("token busy".into()).is_transient());
        assert!(CspError::NotFound("container".into()).is_transient());
        assert!(!CspError::FormatError("bad DER".into()).is_transient());
        assert!(!CspError::StateError("finalized".into()).is_transient());
        assert!(!CspError::InvalidInput("both".into()).is_transient());
    }
}
