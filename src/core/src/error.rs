use thiserror::Error;

/// ocifit error types
#[derive(Error, Debug)]
pub enum FitError {
    /// Identifier is neither an existing Dockerfile nor a registry reference
    #[error("{0} is not a valid Docker URI or existing filepath")]
    InvalidImageReference(String),

    /// Dockerfile content could not be read or fetched
    #[error("Failed to acquire Dockerfile for {reference}: {message}")]
    AcquisitionFailure { reference: String, message: String },

    /// Image filesystem could not be enumerated
    #[error("Failed to resolve filesystem of {uri}: {message}")]
    ResolutionFailure { uri: String, message: String },

    /// Dockerfile parse error
    #[error("Dockerfile parse error: {0}")]
    ParseError(String),

    /// No parser registered under the requested name
    #[error("Unknown parser '{name}' (available: {available})")]
    UnknownParser { name: String, available: String },

    /// Cache error
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for FitError {
    fn from(err: serde_json::Error) -> Self {
        FitError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for FitError {
    fn from(err: serde_yaml::Error) -> Self {
        FitError::SerializationError(err.to_string())
    }
}

/// Result type alias for ocifit operations
pub type Result<T> = std::result::Result<T, FitError>;
