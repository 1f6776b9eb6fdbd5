//! OCI image access.
//!
//! Reads what ocifit needs from a registry without building or unpacking
//! anything to disk:
//!
//! - `reference`: parsing and validating `registry/repo:tag` references
//! - `registry`: manifest, config and layer pulls
//! - `history`: Dockerfile reconstruction from the image config
//! - `layers`: merged in-memory view of the layer tarballs

pub mod history;
pub mod layers;
pub mod reference;
pub mod registry;

pub use history::reconstruct_dockerfile;
pub use layers::{EntryKind, FilesystemIndex};
pub use reference::{is_docker_uri, ImageReference};
pub use registry::{LayerBlob, RegistryAuth, RegistryClient};
