//! `ocifit compat` command.

use clap::Args;
use ocifit_core::{FitConfig, DEFAULT_MODEL_NAME};
use ocifit_runtime::{CompatGenerator, GenerateRequest};

use crate::output;

#[derive(Args)]
pub struct CompatArgs {
    /// Dockerfile path or registry reference (registry/repo:tag)
    pub image: String,

    /// Built image to inspect when IMAGE is a local Dockerfile
    #[arg(long)]
    pub uri: Option<String>,

    /// Comma-separated paths to resolve inside the image
    #[arg(long, value_delimiter = ',')]
    pub paths: Vec<String>,

    /// Library pattern used when no paths are given (default: mpi)
    #[arg(long)]
    pub pattern: Option<String>,

    /// Save the result to the cache under its URI
    #[arg(long)]
    pub save: bool,

    /// Parser variant (see `ocifit parsers`)
    #[arg(long)]
    pub parser: Option<String>,

    /// Model name recorded in annotated output
    #[arg(long, default_value = DEFAULT_MODEL_NAME)]
    pub model: String,

    /// Return a cached spec for a registry reference when one exists
    #[arg(long)]
    pub cached: bool,

    /// Print single-line JSON
    #[arg(long)]
    pub compact: bool,
}

pub async fn execute(args: CompatArgs, config: &FitConfig) -> Result<(), Box<dyn std::error::Error>> {
    let parser = args.parser.unwrap_or_else(|| config.parser.clone());
    let pattern = args.pattern.unwrap_or_else(|| config.pattern.clone());

    let generator =
        CompatGenerator::with_registry(&parser, &config.cache_dir)?.use_cache(args.cached);

    let mut request = GenerateRequest::new(args.image)
        .with_model_name(args.model)
        .with_save(args.save)
        .with_paths(args.paths)
        .with_pattern(pattern);
    if let Some(uri) = args.uri {
        request = request.with_uri(uri);
    }

    let spec = generator.generate(&request).await?;

    if args.save {
        if let Some(uri) = spec.uri() {
            println!("Saved {} to {} cache", uri, generator.parser_name());
            return Ok(());
        }
    }

    output::print_json(spec.as_map(), args.compact)?;
    Ok(())
}
