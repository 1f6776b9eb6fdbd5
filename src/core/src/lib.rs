//! ocifit Core - Foundational Types
//!
//! Error taxonomy, configuration and the compatibility document types
//! shared by the runtime and the CLI.

pub mod config;
pub mod error;
pub mod spec;

// Re-export commonly used types
pub use config::{FitConfig, LogLevel, DEFAULT_MODEL_NAME, DEFAULT_PARSER, DEFAULT_PATTERN};
pub use error::{FitError, Result};
pub use spec::{CompatibilitySpec, DockerfileModel, Guts, ModelShape};

/// ocifit version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
