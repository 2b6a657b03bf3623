//! Lower command - rewrite a unit into explicit records and closures

use anyhow::{Context, Result};
use clap::Args;
use contour_diagnostics::Diagnostics;
use contour_transform::{heap_hints, lower_environments};
use std::fs;
use std::path::PathBuf;

use super::config::OptionArgs;
use super::{emit, fail, load_unit};
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct LowerArgs {
    /// Compilation unit (JSON)
    pub input: PathBuf,

    #[command(flatten)]
    pub options: OptionArgs,

    /// Write the lowered unit to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Explain why each heap-allocated record is on the heap
    #[arg(long)]
    pub hints: bool,
}

pub fn run(args: LowerArgs, format: OutputFormat, use_color: bool, quiet: bool) -> Result<()> {
    let options = args.options.resolve()?;
    let mut unit = load_unit(&args.input, args.options.annotate, format, use_color)?;

    let analysis = lower_environments(&mut unit, &options)
        .map_err(|e| fail(e.to_diagnostic(&unit.name), format, use_color))?;

    let rendered = match format {
        OutputFormat::Text => contour_ir::print_unit(&unit),
        OutputFormat::Json => serde_json::to_string_pretty(&unit)?,
    };
    match &args.output {
        Some(path) => {
            fs::write(path, format!("{}\n", rendered))
                .with_context(|| format!("failed to write {}", path.display()))?;
            if !quiet && matches!(format, OutputFormat::Text) {
                if use_color {
                    println!(
                        "{} `{}` -> {}",
                        console::style("Lowered").green().bold(),
                        unit.name,
                        path.display()
                    );
                } else {
                    println!("Lowered `{}` -> {}", unit.name, path.display());
                }
            }
        }
        None => println!("{}", rendered),
    }

    if args.hints && !quiet {
        let mut diagnostics = Diagnostics::new();
        diagnostics.extend(heap_hints(&unit, &analysis));
        emit(diagnostics, format, use_color)?;
    }
    Ok(())
}
