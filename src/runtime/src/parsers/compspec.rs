//! The `compspec` parser: an annotated compatibility document.
//!
//! ```text
//! { "annotations":     { "compat.parser": "compspec" },
//!   "compatibilities": [ { "compspec.os.name": "ubuntu", ... } ],
//!   "version":         "v1alpha1" }
//! ```
//!
//! Base image facts are memoized: when the cache already holds a document
//! for the base image, its first compatibility record is inherited.

use std::collections::BTreeMap;
use std::sync::Arc;

use ocifit_core::error::Result;
use ocifit_core::spec::{
    normalize_model, DockerfileModel, ModelShape, ANNOTATIONS_KEY, COMPATIBILITIES_KEY,
};
use serde_json::{Map, Value};

use super::dockerfile::{Dockerfile, Instruction};
use super::facts::{detect_os, extract_packages};
use super::DockerfileParser;
use crate::cache::SpecCache;

/// Registry name of the annotated parser.
pub const COMPSPEC_PARSER_NAME: &str = "compspec";

/// Version tag written into every document.
pub const COMPSPEC_VERSION: &str = "v1alpha1";

/// Annotation naming the parser that produced a document.
pub const PARSER_ANNOTATION: &str = "compat.parser";

/// Parser producing `compspec.*` compatibility records.
pub struct CompspecParser {
    cache: Arc<SpecCache>,
}

impl CompspecParser {
    pub fn new(cache: Arc<SpecCache>) -> Self {
        Self { cache }
    }

    /// Copy keys from the cached base image record that `record` lacks.
    fn inherit_from_base(&self, base_image: &str, record: &mut Map<String, Value>) -> Result<()> {
        let Some(cached) = self.cache.get(base_image)? else {
            return Ok(());
        };
        let Some(base_record) = cached.compatibility() else {
            return Ok(());
        };

        let mut inherited = 0;
        for (key, value) in base_record {
            if !record.contains_key(key) {
                record.insert(key.clone(), value.clone());
                inherited += 1;
            }
        }
        tracing::debug!(base_image, inherited, "Inherited base image compatibilities");
        Ok(())
    }
}

impl DockerfileParser for CompspecParser {
    fn name(&self) -> &'static str {
        COMPSPEC_PARSER_NAME
    }

    fn shape(&self) -> ModelShape {
        ModelShape::Annotated
    }

    fn parse_dockerfile(&self, content: &str) -> Result<DockerfileModel> {
        let dockerfile = Dockerfile::parse(content)?;
        let base_image = dockerfile.base_image();

        let mut record = build_record(&dockerfile, base_image.as_deref());
        if let Some(base) = base_image.as_deref() {
            self.inherit_from_base(base, &mut record)?;
        }

        let mut annotations = Map::new();
        annotations.insert(
            PARSER_ANNOTATION.to_string(),
            Value::String(COMPSPEC_PARSER_NAME.to_string()),
        );

        let mut model = DockerfileModel::new();
        model.insert(ANNOTATIONS_KEY.to_string(), Value::Object(annotations));
        model.insert(
            COMPATIBILITIES_KEY.to_string(),
            Value::Array(vec![Value::Object(record)]),
        );
        model.insert(
            "version".to_string(),
            Value::String(COMPSPEC_VERSION.to_string()),
        );
        Ok(normalize_model(model))
    }
}

/// Flatten the final image's instructions into `compspec.*` keys.
fn build_record(dockerfile: &Dockerfile, base_image: Option<&str>) -> Map<String, Value> {
    let mut keys: BTreeMap<String, String> = BTreeMap::new();
    let mut ports: Vec<String> = Vec::new();

    if let Some(base) = base_image {
        keys.insert("compspec.base_image".into(), base.to_string());
        if let Some(os) = detect_os(base) {
            keys.insert("compspec.os.name".into(), os.name);
            if let Some(version) = os.version {
                keys.insert("compspec.os.version".into(), version);
            }
        }
    }

    for instruction in dockerfile.final_lineage() {
        match instruction {
            Instruction::Env { pairs } => {
                for (key, value) in pairs {
                    keys.insert(format!("compspec.env.{}", key), value.clone());
                }
            }
            Instruction::Label { pairs } => {
                for (key, value) in pairs {
                    keys.insert(format!("compspec.label.{}", key), value.clone());
                }
            }
            Instruction::Arg {
                name,
                default: Some(default),
            } => {
                keys.insert(format!("compspec.arg.{}", name), default.clone());
            }
            Instruction::Expose { ports: exposed } => ports.extend(exposed.iter().cloned()),
            Instruction::Run { command } => {
                for package in extract_packages(command) {
                    keys.insert(format!("compspec.package.{}", package), "true".into());
                }
            }
            Instruction::User { user } => {
                keys.insert("compspec.user".into(), user.clone());
            }
            Instruction::Workdir { path } => {
                keys.insert("compspec.workdir".into(), path.clone());
            }
            Instruction::Entrypoint { command } => {
                keys.insert("compspec.entrypoint".into(), command.to_command_line());
            }
            Instruction::Cmd { command } => {
                keys.insert("compspec.cmd".into(), command.to_command_line());
            }
            _ => {}
        }
    }

    if !ports.is_empty() {
        ports.sort();
        ports.dedup();
        keys.insert("compspec.expose".into(), ports.join(","));
    }

    keys.into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key, Value::String(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocifit_core::spec::CompatibilitySpec;
    use serde_json::json;
    use tempfile::TempDir;

    fn parser() -> (TempDir, Arc<SpecCache>, CompspecParser) {
        let tmp = TempDir::new().unwrap();
        let cache = Arc::new(SpecCache::new(tmp.path(), COMPSPEC_PARSER_NAME).unwrap());
        let parser = CompspecParser::new(cache.clone());
        (tmp, cache, parser)
    }

    fn record(model: &DockerfileModel) -> &Map<String, Value> {
        model[COMPATIBILITIES_KEY][0].as_object().unwrap()
    }

    #[test]
    fn test_compspec_document_shape() {
        let (_tmp, _cache, parser) = parser();
        let model = parser
            .parse_dockerfile("FROM ubuntu:22.04\nEXPOSE 8080 22 8080\nENV MPI_HOME=/opt/mpi")
            .unwrap();

        assert_eq!(model[ANNOTATIONS_KEY], json!({"compat.parser": "compspec"}));
        assert_eq!(model["version"], json!("v1alpha1"));
        let record = record(&model);
        assert_eq!(record["compspec.os.name"], json!("ubuntu"));
        assert_eq!(record["compspec.os.version"], json!("22.04"));
        assert_eq!(record["compspec.base_image"], json!("ubuntu:22.04"));
        assert_eq!(record["compspec.expose"], json!("22,8080"));
        assert_eq!(record["compspec.env.MPI_HOME"], json!("/opt/mpi"));
        assert_eq!(parser.shape(), ModelShape::Annotated);
    }

    #[test]
    fn test_compspec_model_is_normalized() {
        let (_tmp, _cache, parser) = parser();
        let model = parser.parse_dockerfile("FROM scratch\nEXPOSE 9090 80").unwrap();

        assert_eq!(normalize_model(model.clone()), model);
        let keys: Vec<&str> = model.keys().map(String::as_str).collect();
        assert_eq!(keys, [ANNOTATIONS_KEY, COMPATIBILITIES_KEY, "version"]);
        assert_eq!(record(&model)["compspec.expose"], json!("80,9090"));
    }

    #[test]
    fn test_compspec_packages_and_labels() {
        let (_tmp, _cache, parser) = parser();
        let model = parser
            .parse_dockerfile(
                "FROM rockylinux:9\nLABEL org.hpc.fabric=ofi\nRUN dnf install -y openmpi-devel\nCMD [\"bash\"]",
            )
            .unwrap();

        let record = record(&model);
        assert_eq!(record["compspec.package.openmpi-devel"], json!("true"));
        assert_eq!(record["compspec.label.org.hpc.fabric"], json!("ofi"));
        assert_eq!(record["compspec.cmd"], json!("bash"));
        assert!(!record.contains_key("compspec.expose"));
    }

    #[test]
    fn test_compspec_inherits_cached_base_record() {
        let (_tmp, cache, parser) = parser();
        let base = CompatibilitySpec::from(
            json!({
                "compatibilities": [{
                    "compspec.env.FABRIC": "verbs",
                    "compspec.os.name": "ubuntu",
                    "compspec.package.openmpi-bin": "true",
                }]
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        cache.put("ghcr.io/hpc/mpi-base:4.1", &base).unwrap();

        let model = parser
            .parse_dockerfile("FROM ghcr.io/hpc/mpi-base:4.1\nENV FABRIC=ofi")
            .unwrap();

        let record = record(&model);
        // Child values win, missing ones come from the base
        assert_eq!(record["compspec.env.FABRIC"], json!("ofi"));
        assert_eq!(record["compspec.os.name"], json!("ubuntu"));
        assert_eq!(record["compspec.package.openmpi-bin"], json!("true"));
    }

    #[test]
    fn test_compspec_without_cached_base() {
        let (_tmp, _cache, parser) = parser();
        let model = parser.parse_dockerfile("FROM scratch").unwrap();
        let record = record(&model);
        assert_eq!(record.len(), 1);
        assert_eq!(record["compspec.base_image"], json!("scratch"));
    }
}
