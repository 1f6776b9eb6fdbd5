//! `ocifit cache` commands.

use clap::{Args, Subcommand};
use ocifit_core::FitConfig;
use ocifit_runtime::{available_parsers, validate_parser_name, SpecCache};

use crate::output;

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// List cached specs
    Ls {
        /// Only list entries of this parser
        #[arg(long)]
        parser: Option<String>,

        /// Only show URIs (one per line)
        #[arg(short, long)]
        quiet: bool,
    },
    /// Print a cached spec
    Show {
        /// Image reference the spec was saved under
        uri: String,

        /// Parser namespace (default: configured parser)
        #[arg(long)]
        parser: Option<String>,

        /// Print single-line JSON
        #[arg(long)]
        compact: bool,
    },
    /// Remove cached specs
    Rm {
        /// Image references to remove
        #[arg(required = true)]
        uris: Vec<String>,

        /// Parser namespace (default: configured parser)
        #[arg(long)]
        parser: Option<String>,
    },
}

pub async fn execute(args: CacheArgs, config: &FitConfig) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        CacheCommand::Ls { parser, quiet } => list(config, parser, quiet),
        CacheCommand::Show {
            uri,
            parser,
            compact,
        } => {
            let cache = open_cache(config, parser)?;
            match cache.get(&uri)? {
                Some(spec) => output::print_json(spec.as_map(), compact),
                None => Err(format!(
                    "No cached spec for {} (parser: {})",
                    uri,
                    cache.namespace()
                )
                .into()),
            }
        }
        CacheCommand::Rm { uris, parser } => {
            let cache = open_cache(config, parser)?;
            let mut missing = Vec::new();
            for uri in uris {
                if cache.invalidate(&uri)? {
                    println!("{uri}");
                } else {
                    missing.push(uri);
                }
            }
            if missing.is_empty() {
                Ok(())
            } else {
                Err(format!("No such cache entry: {}", missing.join(", ")).into())
            }
        }
    }
}

fn open_cache(
    config: &FitConfig,
    parser: Option<String>,
) -> Result<SpecCache, Box<dyn std::error::Error>> {
    let parser = parser.unwrap_or_else(|| config.parser.clone());
    validate_parser_name(&parser)?;
    Ok(SpecCache::new(&config.cache_dir, &parser)?)
}

fn list(
    config: &FitConfig,
    parser: Option<String>,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Only namespaces that already exist on disk
    let namespaces: Vec<String> = match parser {
        Some(parser) => {
            validate_parser_name(&parser)?;
            vec![parser]
        }
        None => available_parsers().into_iter().map(String::from).collect(),
    };

    let mut entries = Vec::new();
    for namespace in namespaces {
        if !config.cache_dir.join(&namespace).is_dir() {
            continue;
        }
        let cache = SpecCache::new(&config.cache_dir, &namespace)?;
        entries.extend(cache.list_entries()?);
    }

    if quiet {
        for entry in &entries {
            println!("{}", entry.key);
        }
        return Ok(());
    }

    let mut table = output::new_table(&["URI", "PARSER", "CACHED"]);
    for entry in &entries {
        let cached = chrono::DateTime::from_timestamp(entry.cached_at, 0)
            .map(|dt| output::format_ago(&dt))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(&[&entry.key, &entry.namespace, &cached]);
    }

    println!("{table}");
    Ok(())
}
