//! Dockerfile model parsers.
//!
//! Each variant turns Dockerfile text into a [`DockerfileModel`] and
//! declares the [`ModelShape`] of its output. Variants are looked up by
//! name; the name also namespaces the cache.

pub mod compspec;
pub mod dockerfile;
pub mod facts;
pub mod flat;

use std::sync::Arc;

use ocifit_core::error::{FitError, Result};
use ocifit_core::spec::{DockerfileModel, ModelShape};

use crate::cache::SpecCache;

pub use compspec::{CompspecParser, COMPSPEC_PARSER_NAME};
pub use dockerfile::{CommandForm, Dockerfile, Instruction, Stage};
pub use flat::{FlatParser, FLAT_PARSER_NAME};

/// Converts Dockerfile text into a model.
pub trait DockerfileParser: Send + Sync {
    /// Registry name of this variant.
    fn name(&self) -> &'static str;

    /// Output shape of [`DockerfileParser::parse_dockerfile`].
    fn shape(&self) -> ModelShape;

    /// Parse Dockerfile content into category values.
    fn parse_dockerfile(&self, content: &str) -> Result<DockerfileModel>;
}

type ParserConstructor = fn(Arc<SpecCache>) -> Box<dyn DockerfileParser>;

fn new_compspec(cache: Arc<SpecCache>) -> Box<dyn DockerfileParser> {
    Box::new(CompspecParser::new(cache))
}

fn new_flat(_cache: Arc<SpecCache>) -> Box<dyn DockerfileParser> {
    Box::new(FlatParser)
}

/// Registered variants, sorted by name.
const PARSERS: &[(&str, ModelShape, ParserConstructor)] = &[
    (COMPSPEC_PARSER_NAME, ModelShape::Annotated, new_compspec),
    (FLAT_PARSER_NAME, ModelShape::Flat, new_flat),
];

/// Names of all registered parsers.
pub fn available_parsers() -> Vec<&'static str> {
    PARSERS.iter().map(|(name, _, _)| *name).collect()
}

/// Output shape of the parser registered under `name`.
pub fn parser_shape(name: &str) -> Option<ModelShape> {
    PARSERS
        .iter()
        .find(|(registered, _, _)| *registered == name)
        .map(|(_, shape, _)| *shape)
}

/// Construct the parser registered under `name`.
pub fn get_parser(name: &str, cache: Arc<SpecCache>) -> Result<Box<dyn DockerfileParser>> {
    PARSERS
        .iter()
        .find(|(registered, _, _)| *registered == name)
        .map(|(_, _, constructor)| constructor(cache))
        .ok_or_else(|| unknown_parser(name))
}

/// Check that `name` is a registered parser.
pub fn validate_parser_name(name: &str) -> Result<()> {
    match parser_shape(name) {
        Some(_) => Ok(()),
        None => Err(unknown_parser(name)),
    }
}

fn unknown_parser(name: &str) -> FitError {
    FitError::UnknownParser {
        name: name.to_string(),
        available: available_parsers().join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache(tmp: &TempDir) -> Arc<SpecCache> {
        Arc::new(SpecCache::new(tmp.path(), "test").unwrap())
    }

    #[test]
    fn test_available_parsers() {
        assert_eq!(available_parsers(), vec!["compspec", "dockerfile"]);
    }

    #[test]
    fn test_get_parser_by_name() {
        let tmp = TempDir::new().unwrap();
        let parser = get_parser("compspec", cache(&tmp)).unwrap();
        assert_eq!(parser.name(), "compspec");
        assert_eq!(parser.shape(), ModelShape::Annotated);

        let parser = get_parser(ocifit_core::DEFAULT_PARSER, cache(&tmp)).unwrap();
        assert_eq!(parser.name(), "dockerfile");
        assert_eq!(parser.shape(), ModelShape::Flat);
    }

    #[test]
    fn test_parser_shape_matches_constructed_parser() {
        let tmp = TempDir::new().unwrap();
        for name in available_parsers() {
            let parser = get_parser(name, cache(&tmp)).unwrap();
            assert_eq!(parser_shape(name), Some(parser.shape()));
        }
        assert_eq!(parser_shape("podman"), None);
    }

    #[test]
    fn test_get_parser_unknown() {
        let tmp = TempDir::new().unwrap();
        let err = get_parser("podman", cache(&tmp)).err().unwrap();
        assert!(matches!(err, FitError::UnknownParser { .. }));
        assert!(err.to_string().contains("compspec, dockerfile"));
    }

    #[test]
    fn test_validate_parser_name() {
        assert!(validate_parser_name("compspec").is_ok());
        let err = validate_parser_name("../dockerfile").unwrap_err();
        assert!(matches!(err, FitError::UnknownParser { ref name, .. } if name == "../dockerfile"));
    }
}
