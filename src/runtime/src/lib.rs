//! ocifit Runtime
//!
//! Generates compatibility specifications from Dockerfiles and container
//! images: source acquisition, Dockerfile parsing, filesystem inspection of
//! built images and the spec cache.

pub mod cache;
pub mod compat;
pub mod guts;
pub mod oci;
pub mod parsers;
pub mod source;

pub use cache::{CacheEntry, SpecCache};
pub use compat::{CompatGenerator, GenerateRequest};
pub use guts::{filter_matched_paths, is_shared_library, GutsResolver, LayerGutsResolver};
pub use oci::{is_docker_uri, ImageReference, RegistryAuth, RegistryClient};
pub use parsers::{
    available_parsers, get_parser, parser_shape, validate_parser_name, DockerfileParser,
};
pub use source::{AcquiredSource, DockerfileFetcher, RegistryDockerfileFetcher, SourceAcquirer};
