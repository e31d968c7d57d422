//! Core error types.

/// Errors raised while parsing versions, ranges, and keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A version string does not follow the version grammar.
    #[error("malformed version '{input}': {detail}")]
    MalformedVersion { input: String, detail: String },

    /// A version-range expression does not follow the interval grammar.
    #[error("malformed version range '{input}': {detail}")]
    MalformedRange { input: String, detail: String },

    /// An API key token is not a well-formed key.
    #[error("'{token}' is not a valid API key")]
    InvalidApiKey { token: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
