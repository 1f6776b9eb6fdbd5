//! `ocifit parsers` command.

use clap::Args;
use ocifit_core::{FitConfig, ModelShape};
use ocifit_runtime::{available_parsers, parser_shape};

use crate::output;

#[derive(Args)]
pub struct ParsersArgs {
    /// Only show parser names (one per line)
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(args: ParsersArgs, config: &FitConfig) -> Result<(), Box<dyn std::error::Error>> {
    if args.quiet {
        for name in available_parsers() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut table = output::new_table(&["NAME", "SHAPE", "DEFAULT"]);
    for name in available_parsers() {
        let shape = match parser_shape(name) {
            Some(ModelShape::Flat) => "flat",
            Some(ModelShape::Annotated) => "annotated",
            None => "-",
        };
        let default = if name == config.parser { "*" } else { "" };
        table.add_row(&[name, shape, default]);
    }

    println!("{table}");
    Ok(())
}
