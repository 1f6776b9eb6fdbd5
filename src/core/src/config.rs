use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FitError, Result};

/// Parser used when none is configured.
pub const DEFAULT_PARSER: &str = "dockerfile";

/// Library pattern used to filter guts listings when no paths are given.
pub const DEFAULT_PATTERN: &str = "mpi";

/// Model name recorded when the caller does not choose one.
pub const DEFAULT_MODEL_NAME: &str = "rules";

/// ocifit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Root of the specification cache (one subdirectory per parser)
    pub cache_dir: PathBuf,

    /// Parser selected when `--parser` is not given
    pub parser: String,

    /// Library pattern for the matched-paths filter
    pub pattern: String,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            cache_dir: home_dir().join("cache"),
            parser: DEFAULT_PARSER.to_string(),
            pattern: DEFAULT_PATTERN.to_string(),
            log_level: LogLevel::Warn,
        }
    }
}

impl FitConfig {
    /// Default location of the config file (~/.ocifit/config.yaml).
    pub fn default_path() -> PathBuf {
        home_dir().join("config.yaml")
    }

    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FitError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: FitConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve configuration: defaults, then the YAML file, then environment.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => {
                let default = Self::default_path();
                if default.is_file() {
                    Self::load(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override fields from `OCIFIT_*` variables returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("OCIFIT_CACHE_DIR").filter(|v| !v.is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(parser) = lookup("OCIFIT_PARSER").filter(|v| !v.is_empty()) {
            self.parser = parser;
        }
        if let Some(pattern) = lookup("OCIFIT_PATTERN").filter(|v| !v.is_empty()) {
            self.pattern = pattern;
        }
    }
}

/// ocifit home directory (~/.ocifit).
pub fn home_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".ocifit"))
        .unwrap_or_else(|| PathBuf::from(".ocifit"))
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = FitConfig::default();
        assert_eq!(config.parser, "dockerfile");
        assert_eq!(config.pattern, "mpi");
        assert_eq!(config.log_level, LogLevel::Warn);
        assert!(config.cache_dir.ends_with(".ocifit/cache"));
    }

    #[test]
    fn test_load_partial_yaml_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "parser: compspec\nlog_level: debug\n").unwrap();

        let config = FitConfig::load(&path).unwrap();
        assert_eq!(config.parser, "compspec");
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.pattern, "mpi");
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let err = FitConfig::load(&tmp.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, FitError::ConfigError(_)));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "log_level: [not, a, level]\n").unwrap();
        assert!(matches!(
            FitConfig::load(&path).unwrap_err(),
            FitError::SerializationError(_)
        ));
    }

    #[test]
    fn test_apply_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OCIFIT_CACHE_DIR", "/tmp/ocifit-cache"),
            ("OCIFIT_PARSER", "compspec"),
            ("OCIFIT_PATTERN", ""),
        ]
        .into_iter()
        .collect();

        let mut config = FitConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/ocifit-cache"));
        assert_eq!(config.parser, "compspec");
        // Empty values are ignored
        assert_eq!(config.pattern, "mpi");
    }

    #[test]
    fn test_log_level_directive() {
        assert_eq!(LogLevel::Info.as_directive(), "info");
        assert_eq!(LogLevel::Error.as_directive(), "error");
    }
}
