//! Filesystem guts of built images.
//!
//! Maps paths inside an image to their link sets. The registry-backed
//! resolver indexes the image layers; the assembler narrows a full listing
//! down to interesting shared libraries with [`filter_matched_paths`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use ocifit_core::error::{FitError, Result};
use ocifit_core::spec::Guts;

use crate::oci::layers::normalize_path;
use crate::oci::{FilesystemIndex, ImageReference, RegistryClient};

/// Lists paths of a built image and their link sets.
#[async_trait]
pub trait GutsResolver: Send + Sync {
    /// With `paths`, cover exactly the requested paths present in the
    /// image. Without, list every non-directory entry.
    async fn resolve_guts(&self, uri: &str, paths: Option<&BTreeSet<String>>) -> Result<Guts>;
}

/// Resolver that pulls and indexes the image layers from a registry.
pub struct LayerGutsResolver {
    client: RegistryClient,
}

impl LayerGutsResolver {
    pub fn new(client: RegistryClient) -> Self {
        Self { client }
    }
}

impl Default for LayerGutsResolver {
    fn default() -> Self {
        Self::new(RegistryClient::new())
    }
}

#[async_trait]
impl GutsResolver for LayerGutsResolver {
    async fn resolve_guts(&self, uri: &str, paths: Option<&BTreeSet<String>>) -> Result<Guts> {
        let failure = |e: FitError| FitError::ResolutionFailure {
            uri: uri.to_string(),
            message: e.to_string(),
        };

        let reference = ImageReference::parse(uri).map_err(failure)?;
        let mut index = FilesystemIndex::new();
        let layers = self
            .client
            .for_each_layer(&reference, |blob| index.apply_blob(&blob))
            .await
            .map_err(failure)?;

        tracing::info!(
            uri,
            layers,
            entries = index.len(),
            "Indexed image filesystem"
        );
        Ok(guts_from_index(&index, paths))
    }
}

/// Answer a guts query from an index.
pub fn guts_from_index(index: &FilesystemIndex, paths: Option<&BTreeSet<String>>) -> Guts {
    match paths {
        Some(paths) => paths
            .iter()
            .filter(|path| index.contains(path))
            .map(|path| (path.clone(), index.link_chain(path)))
            .collect(),
        None => index
            .files()
            .map(|path| (path.to_string(), Vec::new()))
            .collect(),
    }
}

/// Paths in `guts` that contain `pattern`, are shared libraries and are
/// not test artifacts. Sorted.
pub fn filter_matched_paths(guts: &Guts, pattern: &str) -> Vec<String> {
    guts.keys()
        .filter(|path| path.contains(pattern) && is_shared_library(path) && !path.contains("test"))
        .cloned()
        .collect()
}

/// Whether the file name ends in `.so` or `.so.<digits>[.<digits>...]`.
pub fn is_shared_library(path: &str) -> bool {
    let normalized = normalize_path(path);
    let file_name = normalized.rsplit('/').next().unwrap_or(&normalized);
    let Some(pos) = file_name.rfind(".so") else {
        return false;
    };
    if pos == 0 {
        return false;
    }

    let suffix = &file_name[pos + 3..];
    suffix.is_empty()
        || suffix
            .strip_prefix('.')
            .is_some_and(|versions| {
                versions
                    .split('.')
                    .all(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
            })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guts(paths: &[&str]) -> Guts {
        paths.iter().map(|p| (p.to_string(), Vec::new())).collect()
    }

    #[test]
    fn test_filter_matched_paths() {
        let guts = guts(&["/lib/libmpi_test.so", "/lib/libmpi.so", "/lib/libfoo.txt"]);
        assert_eq!(filter_matched_paths(&guts, "mpi"), vec!["/lib/libmpi.so"]);
    }

    #[test]
    fn test_filter_matched_paths_versioned_and_pattern() {
        let guts = guts(&[
            "/usr/lib/x86_64-linux-gnu/libmpi.so.40.30.1",
            "/usr/lib/x86_64-linux-gnu/libmpich.so.12",
            "/usr/share/doc/openmpi/README",
            "/usr/lib/libfabric.so.1",
        ]);
        assert_eq!(
            filter_matched_paths(&guts, "mpi"),
            vec![
                "/usr/lib/x86_64-linux-gnu/libmpi.so.40.30.1",
                "/usr/lib/x86_64-linux-gnu/libmpich.so.12",
            ]
        );
        assert_eq!(
            filter_matched_paths(&guts, "fabric"),
            vec!["/usr/lib/libfabric.so.1"]
        );
    }

    #[test]
    fn test_is_shared_library() {
        assert!(is_shared_library("/lib/libmpi.so"));
        assert!(is_shared_library("/lib/libmpi.so.40"));
        assert!(is_shared_library("libc.so.6"));
        assert!(!is_shared_library("/lib/libmpi.so.bak"));
        assert!(!is_shared_library("/lib/libfoo.txt"));
        assert!(!is_shared_library("/opt/mpi.soft/bin/mpirun"));
        assert!(!is_shared_library("/lib/.so"));
    }

    #[test]
    fn test_guts_from_index_with_and_without_paths() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;
        use tar::{Builder, EntryType, Header};

        let mut builder = Builder::new(Vec::new());
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(1);
        header.set_cksum();
        builder
            .append_data(&mut header, "usr/lib/libc.so.6", &b"x"[..])
            .unwrap();
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_mode(0o777);
        header.set_size(0);
        builder
            .append_link(&mut header, "usr/lib/libc.so", "libc.so.6")
            .unwrap();
        let tar = builder.into_inner().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar).unwrap();

        let mut index = FilesystemIndex::new();
        index.apply_layer(&encoder.finish().unwrap()).unwrap();

        let all = guts_from_index(&index, None);
        assert_eq!(all.len(), 2);
        assert!(all.values().all(|links| links.is_empty()));

        let requested: BTreeSet<String> = ["/usr/lib/libc.so", "/usr/lib/missing.so"]
            .iter()
            .map(|p| p.to_string())
            .collect();
        let some = guts_from_index(&index, Some(&requested));
        assert_eq!(some.len(), 1);
        assert_eq!(
            some.get("/usr/lib/libc.so"),
            Some(&vec!["/usr/lib/libc.so.6".to_string()])
        );
    }
}
