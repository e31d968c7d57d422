//! Registry error types and their mapping to outward status categories.

use std::fmt;

use gallery_core::CoreError;

use crate::auth::Action;

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No package matches the requested id/version.
    #[error("package '{id}' version '{}' not found", .version.as_deref().unwrap_or("latest"))]
    NotFound { id: String, version: Option<String> },

    /// The API key token is not a well-formed key.
    #[error("'{token}' is not a valid API key")]
    InvalidKeyFormat { token: String },

    /// The API key is well-formed but nobody holds it.
    #[error("the API key is not recognized")]
    UnknownKey,

    /// Authenticated, but not an owner of the target registration.
    #[error("the API key is not authorized to {action} '{id}'")]
    Forbidden { action: Action, id: String },

    /// The (id, version) pair is already published.
    #[error("package '{id}' version '{version}' already exists and cannot be modified")]
    VersionConflict { id: String, version: String },

    /// The uploaded artifact could not be read as a package.
    #[error("malformed package artifact: {detail}")]
    MalformedArtifact { detail: String },

    /// A version or version range failed to parse.
    #[error("malformed version expression: {0}")]
    MalformedVersionExpression(CoreError),

    /// A principal with this username already exists.
    #[error("principal '{username}' already exists")]
    PrincipalExists { username: String },

    /// Another principal already holds this API key.
    #[error("the API key is already assigned to another principal")]
    ApiKeyInUse,

    /// A storage collaborator failed.
    #[error("storage error: {detail}")]
    Storage { detail: String },

    /// Configuration file could not be parsed.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive error.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for RegistryError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidApiKey { token } => RegistryError::InvalidKeyFormat { token },
            other => RegistryError::MalformedVersionExpression(other),
        }
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Outward status category of an operation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Created,
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

impl Status {
    /// The HTTP status code an HTTP binding would use.
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::Conflict => 409,
            Status::Internal => 500,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Ok => "ok",
            Status::Created => "created",
            Status::BadRequest => "bad request",
            Status::Forbidden => "forbidden",
            Status::NotFound => "not found",
            Status::Conflict => "conflict",
            Status::Internal => "internal error",
        };
        write!(f, "{label}")
    }
}

impl RegistryError {
    pub fn status(&self) -> Status {
        match self {
            RegistryError::NotFound { .. } => Status::NotFound,
            RegistryError::InvalidKeyFormat { .. }
            | RegistryError::MalformedArtifact { .. }
            | RegistryError::MalformedVersionExpression(_) => Status::BadRequest,
            RegistryError::UnknownKey | RegistryError::Forbidden { .. } => Status::Forbidden,
            RegistryError::VersionConflict { .. }
            | RegistryError::PrincipalExists { .. }
            | RegistryError::ApiKeyInUse => Status::Conflict,
            RegistryError::Storage { .. }
            | RegistryError::Toml(_)
            | RegistryError::Json(_)
            | RegistryError::Zip(_)
            | RegistryError::Io(_) => Status::Internal,
        }
    }

    /// Whether this is an unexpected fault rather than a caller mistake.
    pub fn is_internal(&self) -> bool {
        self.status() == Status::Internal
    }
}

/// Caller-facing rendering of a failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub status: Status,
    pub message: String,
    /// Internal detail, only present for trusted callers.
    pub detail: Option<String>,
}

impl ErrorReport {
    /// Render `err` for a caller.
    ///
    /// Internal faults are logged in full and reduced to a generic message
    /// unless the caller is trusted.
    pub fn from_error(err: &RegistryError, trusted: bool) -> Self {
        let status = err.status();
        if !err.is_internal() {
            return ErrorReport {
                status,
                message: err.to_string(),
                detail: None,
            };
        }

        tracing::error!(error = ?err, "internal registry failure");
        ErrorReport {
            status,
            message: "the registry failed to process the request".to_string(),
            detail: trusted.then(|| error_chain(err)),
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
