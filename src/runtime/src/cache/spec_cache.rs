//! Namespaced on-disk cache for compatibility specifications.
//!
//! Entries live under `cache_dir/<namespace>/<sha256(key)>.json`, one JSON
//! envelope per image reference. The namespace is the parser name, so two
//! parsers never read each other's documents.

use std::path::{Path, PathBuf};

use ocifit_core::error::{FitError, Result};
use ocifit_core::spec::CompatibilitySpec;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A cached specification with its bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Image reference the document was generated for
    pub key: String,
    /// Parser namespace
    pub namespace: String,
    /// When this entry was written (Unix timestamp)
    pub cached_at: i64,
    /// The cached document
    pub spec: CompatibilitySpec,
}

/// Key/value store for generated specifications.
///
/// No expiry: entries are overwritten by the next `put` for the same key.
#[derive(Debug)]
pub struct SpecCache {
    /// Directory holding this namespace's entries
    dir: PathBuf,
    namespace: String,
}

impl SpecCache {
    /// Open (creating if needed) the cache for `namespace` under `cache_dir`.
    ///
    /// Namespaces are single path components of ASCII letters, digits, `-`
    /// and `_`.
    pub fn new(cache_dir: &Path, namespace: &str) -> Result<Self> {
        let valid = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(FitError::CacheError(format!(
                "Invalid cache namespace '{}'",
                namespace
            )));
        }

        let dir = cache_dir.join(namespace);
        std::fs::create_dir_all(&dir).map_err(|e| {
            FitError::CacheError(format!(
                "Failed to create cache directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        Ok(Self {
            dir,
            namespace: namespace.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up the document cached for `key`.
    ///
    /// Returns `None` on a miss or when the entry cannot be decoded.
    pub fn get(&self, key: &str) -> Result<Option<CompatibilitySpec>> {
        Ok(self.get_entry(key)?.map(|entry| entry.spec))
    }

    /// Look up the full envelope cached for `key`.
    pub fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            FitError::CacheError(format!(
                "Failed to read cache entry {}: {}",
                path.display(),
                e
            ))
        })?;

        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) => {
                tracing::debug!(key, namespace = %self.namespace, "Cache hit");
                Ok(Some(entry))
            }
            Err(e) => {
                tracing::warn!(
                    key,
                    path = %path.display(),
                    error = %e,
                    "Ignoring undecodable cache entry"
                );
                Ok(None)
            }
        }
    }

    /// Store `spec` under `key`, replacing any previous entry.
    ///
    /// The envelope is written to a temporary file and renamed into place,
    /// so readers see either the old or the new entry.
    pub fn put(&self, key: &str, spec: &CompatibilitySpec) -> Result<()> {
        let entry = CacheEntry {
            key: key.to_string(),
            namespace: self.namespace.clone(),
            cached_at: chrono::Utc::now().timestamp(),
            spec: spec.clone(),
        };
        let content = serde_json::to_string_pretty(&entry)?;

        let path = self.entry_path(key);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content).map_err(|e| {
            FitError::CacheError(format!(
                "Failed to write cache entry {}: {}",
                tmp_path.display(),
                e
            ))
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| {
            FitError::CacheError(format!(
                "Failed to move cache entry into place {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(
            key,
            namespace = %self.namespace,
            path = %path.display(),
            "Cached specification"
        );

        Ok(())
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entry_path(key).is_file()
    }

    /// Remove the entry for `key`. Returns whether one existed.
    pub fn invalidate(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(false);
        }

        std::fs::remove_file(&path).map_err(|e| {
            FitError::CacheError(format!(
                "Failed to remove cache entry {}: {}",
                path.display(),
                e
            ))
        })?;
        tracing::debug!(key, namespace = %self.namespace, "Invalidated cache entry");
        Ok(true)
    }

    /// All decodable entries in this namespace, sorted by key.
    pub fn list_entries(&self) -> Result<Vec<CacheEntry>> {
        let read_dir = std::fs::read_dir(&self.dir).map_err(|e| {
            FitError::CacheError(format!(
                "Failed to read cache directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| {
                FitError::CacheError(format!("Failed to read directory entry: {}", e))
            })?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(content) = std::fs::read_to_string(&path) {
                if let Ok(cached) = serde_json::from_str::<CacheEntry>(&content) {
                    entries.push(cached);
                }
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// File name for a key: hex SHA256, so any reference is a safe name.
    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{}.json", digest))
    }
}
