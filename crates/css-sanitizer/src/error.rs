use thiserror::Error;

/// Error types for the stylesheet sanitizer
///
/// Only configuration errors ever reach callers of [`crate::CssSanitizer::new`].
/// `Malformed` and `Hostile` travel between the internal stages and are turned
/// into sentinel comments at the public boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizerError {
    /// Container id is not a plain CSS identifier
    #[error("Invalid container id: {0:?}")]
    InvalidContainerId(String),
    /// Class/id prefix is not a plain CSS identifier
    #[error("Invalid class prefix: {0:?}")]
    InvalidClassPrefix(String),
    /// Trusted host entry is not a bare hostname
    #[error("Invalid trusted host: {0:?}")]
    InvalidTrustedHost(String),
    /// Configuration document could not be read
    #[error("Configuration error: {0}")]
    Config(String),
    /// Stylesheet has no usable structure
    #[error("Malformed stylesheet: {0}")]
    Malformed(String),
    /// Stylesheet carries a whole-sheet attack pattern
    #[error("Hostile stylesheet: {0}")]
    Hostile(String),
}

/// Result type for sanitizer operations
pub type SanitizerResult<T> = Result<T, SanitizerError>;

impl From<serde_json::Error> for SanitizerError {
    fn from(err: serde_json::Error) -> Self {
        SanitizerError::Config(err.to_string())
    }
}
