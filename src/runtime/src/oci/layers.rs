//! In-memory filesystem index over OCI image layers.
//!
//! Layers are applied bottom to top without touching disk. Each tar entry
//! is recorded by its absolute path; `.wh.<name>` entries delete a path
//! from lower layers and `.wh..wh..opq` hides the lower contents of its
//! directory.

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::ops::Bound;

use flate2::read::GzDecoder;
use ocifit_core::error::Result;
use tar::{Archive, EntryType};

use super::registry::LayerBlob;

/// Prefix marking a deleted path in an upper layer.
const WHITEOUT_PREFIX: &str = ".wh.";

/// Marker hiding every lower-layer entry in the same directory.
const WHITEOUT_OPAQUE: &str = ".wh..wh..opq";

/// Maximum link hops followed when resolving a chain.
pub const MAX_LINK_HOPS: usize = 40;

/// What a path in the merged filesystem is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Symbolic link with its absolute, normalized target.
    Symlink(String),
    /// Hard link with its absolute, normalized target.
    Hardlink(String),
    /// Devices, fifos and other special files.
    Other,
}

/// Merged view of an image's layers.
#[derive(Debug, Default)]
pub struct FilesystemIndex {
    entries: BTreeMap<String, EntryKind>,
}

impl FilesystemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a pulled layer blob on top of the index.
    pub fn apply_blob(&mut self, layer: &LayerBlob) -> Result<()> {
        self.apply_layer(&layer.data)?;
        tracing::debug!(
            digest = %layer.digest,
            entries = self.len(),
            "Indexed layer"
        );
        Ok(())
    }

    /// Apply one layer (gzip-compressed or plain tar) on top of the index.
    pub fn apply_layer(&mut self, data: &[u8]) -> Result<()> {
        let is_gzip = data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b;
        if is_gzip {
            self.apply_tar(GzDecoder::new(data))
        } else {
            self.apply_tar(data)
        }
    }

    fn apply_tar<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut archive = Archive::new(reader);
        // Entries added by this layer survive its own opaque markers
        let mut added: HashSet<String> = HashSet::new();

        for entry in archive.entries()? {
            let entry = entry?;
            let path = normalize_path(&entry.path()?.to_string_lossy());
            if path == "/" {
                continue;
            }
            let (parent, file_name) = split_parent(&path);

            if file_name == WHITEOUT_OPAQUE {
                self.remove_children(parent, |p| added.contains(p));
                continue;
            }

            if let Some(target_name) = file_name.strip_prefix(WHITEOUT_PREFIX) {
                let target = join_path(parent, target_name);
                self.remove_tree(&target);
                continue;
            }

            let link_target = entry
                .link_name()?
                .map(|name| name.to_string_lossy().into_owned());
            let kind = match (entry.header().entry_type(), link_target) {
                (EntryType::Directory, _) => EntryKind::Directory,
                (EntryType::Symlink, Some(target)) => {
                    EntryKind::Symlink(resolve_link_target(parent, &target))
                }
                // Hard link names are relative to the archive root
                (EntryType::Link, Some(target)) => {
                    EntryKind::Hardlink(normalize_path(&target))
                }
                (EntryType::Regular, _) | (EntryType::Continuous, _) => EntryKind::File,
                _ => EntryKind::Other,
            };

            // A non-directory replacing a directory hides its old contents
            if kind != EntryKind::Directory {
                self.remove_children(&path, |_| false);
            }
            added.insert(path.clone());
            self.entries.insert(path, kind);
        }

        Ok(())
    }

    fn remove_tree(&mut self, path: &str) {
        self.entries.remove(path);
        self.remove_children(path, |_| false);
    }

    /// Remove every entry below `dir` for which `keep` is false.
    fn remove_children<F>(&mut self, dir: &str, keep: F)
    where
        F: Fn(&str) -> bool,
    {
        let prefix = child_prefix(dir);
        let doomed: Vec<String> = self
            .entries
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .map(|(p, _)| p)
            .take_while(|p| p.starts_with(&prefix))
            .filter(|p| !keep(p))
            .cloned()
            .collect();
        for path in doomed {
            self.entries.remove(&path);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&EntryKind> {
        self.entries.get(&normalize_path(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Every non-directory path, sorted.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, kind)| **kind != EntryKind::Directory)
            .map(|(path, _)| path.as_str())
    }

    /// Successive link targets starting from `path`.
    ///
    /// Empty for regular files. Stops at a non-link, a missing target, a
    /// revisited path or after [`MAX_LINK_HOPS`].
    pub fn link_chain(&self, path: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = normalize_path(path);
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(current.clone());

        while chain.len() < MAX_LINK_HOPS {
            let target = match self.entries.get(&current) {
                Some(EntryKind::Symlink(target)) | Some(EntryKind::Hardlink(target)) => {
                    target.clone()
                }
                _ => break,
            };
            chain.push(target.clone());
            if !visited.insert(target.clone()) {
                break;
            }
            current = target;
        }

        chain
    }
}

/// Normalize a tar or absolute path to `/a/b` form, resolving `.` and `..`.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

fn resolve_link_target(parent: &str, target: &str) -> String {
    if target.starts_with('/') {
        normalize_path(target)
    } else {
        normalize_path(&join_path(parent, target))
    }
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("/", path),
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

fn child_prefix(dir: &str) -> String {
    if dir == "/" {
        "/".to_string()
    } else {
        format!("{}/", dir)
    }
}
