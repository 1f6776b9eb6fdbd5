//! Compatibility specification generation.
//!
//! Ties the pipeline together: acquire Dockerfile text, parse it with the
//! selected variant, optionally merge filesystem guts of the built image,
//! and optionally persist the result.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use ocifit_core::config::{DEFAULT_MODEL_NAME, DEFAULT_PATTERN};
use ocifit_core::error::Result;
use ocifit_core::spec::{CompatibilitySpec, Guts, ModelShape, COMPATIBILITIES_KEY};
use serde_json::{json, Map, Value};

use crate::cache::SpecCache;
use crate::guts::{filter_matched_paths, GutsResolver, LayerGutsResolver};
use crate::oci::is_docker_uri;
use crate::parsers::{get_parser, DockerfileParser};
use crate::source::{DockerfileFetcher, RegistryDockerfileFetcher, SourceAcquirer};

/// Annotation recording the model name.
pub const MODEL_ANNOTATION: &str = "compat.model";

/// Annotation recording the image reference.
pub const URI_ANNOTATION: &str = "compat.uri";

/// Flat-shape key listing requested binaries and their link sets.
pub const BINARIES_KEY: &str = "binaries";

/// Flat-shape key listing library paths matched by pattern.
pub const MATCHED_PATHS_KEY: &str = "matched_paths";

/// Inputs of a single generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Dockerfile path or registry reference
    pub image: String,
    /// Model name recorded in annotated documents
    pub model_name: String,
    /// Persist the result under its URI
    pub save: bool,
    /// Built image to inspect when `image` is a local file
    pub uri: Option<String>,
    /// Specific paths to resolve inside the built image
    pub paths: Option<BTreeSet<String>>,
    /// Substring selecting libraries when no paths are given
    pub pattern: String,
}

impl GenerateRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            save: false,
            uri: None,
            paths: None,
            pattern: DEFAULT_PATTERN.to_string(),
        }
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_save(mut self, save: bool) -> Self {
        self.save = save;
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// An empty set is treated as no paths.
    pub fn with_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths: BTreeSet<String> = paths.into_iter().map(Into::into).collect();
        self.paths = if paths.is_empty() { None } else { Some(paths) };
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }
}

/// Generates compatibility specifications with one parser variant.
pub struct CompatGenerator {
    parser: Box<dyn DockerfileParser>,
    cache: Arc<SpecCache>,
    acquirer: SourceAcquirer,
    resolver: Arc<dyn GutsResolver>,
    use_cache: bool,
}

impl CompatGenerator {
    /// Create a generator for `parser_name`, caching under `cache_dir`.
    pub fn new(
        parser_name: &str,
        cache_dir: &Path,
        fetcher: Arc<dyn DockerfileFetcher>,
        resolver: Arc<dyn GutsResolver>,
    ) -> Result<Self> {
        let cache = Arc::new(SpecCache::new(cache_dir, parser_name)?);
        let parser = get_parser(parser_name, cache.clone())?;

        Ok(Self {
            parser,
            cache,
            acquirer: SourceAcquirer::new(fetcher),
            resolver,
            use_cache: false,
        })
    }

    /// Create a generator backed by container registries.
    pub fn with_registry(parser_name: &str, cache_dir: &Path) -> Result<Self> {
        Self::new(
            parser_name,
            cache_dir,
            Arc::new(RegistryDockerfileFetcher::default()),
            Arc::new(LayerGutsResolver::default()),
        )
    }

    /// Serve cached documents for registry references instead of
    /// regenerating them.
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn cache(&self) -> &Arc<SpecCache> {
        &self.cache
    }

    pub fn parser_name(&self) -> &'static str {
        self.parser.name()
    }

    /// Generate the specification for `request`.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<CompatibilitySpec> {
        if let Some(cached) = self.lookup_cached(&request.image)? {
            return Ok(cached);
        }

        let source = self.acquirer.resolve(&request.image).await?;
        let model = self.parser.parse_dockerfile(&source.content)?;
        let mut spec = CompatibilitySpec::from_model(model);

        let shape = self.parser.shape();
        if shape == ModelShape::Annotated {
            if let Some(annotations) = spec.annotations_mut() {
                annotations.insert(
                    MODEL_ANNOTATION.to_string(),
                    Value::String(request.model_name.clone()),
                );
            }
        }

        // A registry image is its own URI
        let uri = source.uri.or_else(|| request.uri.clone());

        if let Some(uri) = uri.as_deref() {
            let guts = self
                .resolver
                .resolve_guts(uri, request.paths.as_ref())
                .await?;
            tracing::info!(uri, entries = guts.len(), "Resolved image filesystem");

            match shape {
                ModelShape::Annotated => {
                    annotate_binaries(&mut spec, &guts, request);
                    if let Some(annotations) = spec.annotations_mut() {
                        annotations.insert(URI_ANNOTATION.to_string(), Value::String(uri.into()));
                    }
                }
                ModelShape::Flat => list_binaries(&mut spec, &guts, request),
            }
            spec.set_uri(uri);
        }

        if request.save {
            match uri.as_deref() {
                Some(uri) => {
                    tracing::info!(uri, parser = self.parser.name(), "Saving to cache");
                    self.cache.put(uri, &spec)?;
                }
                None => tracing::warn!(
                    image = %request.image,
                    "Not saving: no URI to key the cache entry"
                ),
            }
        }

        Ok(spec)
    }

    fn lookup_cached(&self, image: &str) -> Result<Option<CompatibilitySpec>> {
        if !self.use_cache || Path::new(image).exists() || !is_docker_uri(image) {
            return Ok(None);
        }
        let cached = self.cache.get(image)?;
        if cached.is_some() {
            tracing::info!(uri = image, "Using cached specification");
        }
        Ok(cached)
    }
}

/// Add `compspec.binary.*` keys to the first compatibility record.
fn annotate_binaries(spec: &mut CompatibilitySpec, guts: &Guts, request: &GenerateRequest) {
    if spec.compatibility().is_none() {
        spec.insert(COMPATIBILITIES_KEY, json!([{}]));
    }
    let Some(record) = spec.compatibility_mut() else {
        return;
    };

    if request.paths.is_some() {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for (path, link_set) in guts {
            let basename = path.rsplit('/').next().unwrap_or(path);
            if let Some(previous) = seen.insert(basename, path.as_str()) {
                tracing::warn!(
                    basename,
                    previous,
                    path = %path,
                    "Requested binaries share a basename, keeping the later path"
                );
            }

            // Link keys of an earlier path with this basename would go stale
            let link_prefix = format!("compspec.binary.{}.link.", basename);
            let stale: Vec<String> = record
                .keys()
                .filter(|key| key.starts_with(&link_prefix))
                .cloned()
                .collect();
            for key in stale {
                record.remove(&key);
            }

            record.insert(
                format!("compspec.binary.{}", basename),
                Value::String(path.clone()),
            );
            for (i, link) in link_set.iter().enumerate() {
                record.insert(
                    format!("compspec.binary.{}.link.{}", basename, i),
                    Value::String(link.clone()),
                );
            }
        }
    } else {
        let matched = filter_matched_paths(guts, &request.pattern);
        if !matched.is_empty() {
            record.insert(
                format!("compspec.binary.{}", request.pattern),
                Value::String(matched.join(",")),
            );
        }
    }
}

/// Add `binaries` or `matched_paths` to a flat document.
fn list_binaries(spec: &mut CompatibilitySpec, guts: &Guts, request: &GenerateRequest) {
    if request.paths.is_some() {
        if guts.is_empty() {
            return;
        }
        let binaries: Map<String, Value> = guts
            .iter()
            .map(|(path, links)| (path.clone(), json!(links)))
            .collect();
        spec.insert(BINARIES_KEY, Value::Object(binaries));
    } else {
        let matched = filter_matched_paths(guts, &request.pattern);
        if !matched.is_empty() {
            spec.insert(MATCHED_PATHS_KEY, json!(matched));
        }
    }
}
