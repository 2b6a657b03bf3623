//! Contour - environment lowering for closure conversion
//!
//! CLI driver: reads a bound compilation unit as JSON, lowers it, and
//! prints the result.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

/// Environment lowering for closure conversion
#[derive(Parser, Debug)]
#[command(name = "contour")]
#[command(author, version, about = "Lower nested functions to explicit environment records")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lower a unit and print the rewritten tree
    Lower(commands::lower::LowerArgs),

    /// Print free variables and record layouts without rewriting
    Layout(commands::layout::LayoutArgs),

    /// Explain a diagnostic code
    Explain(commands::explain::ExplainArgs),
}

fn log_filter(quiet: bool, verbose: u8) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.quiet, cli.verbose)),
    )
    .init();

    // Determine if colors should be used
    let use_color = !cli.no_color && !cli.quiet && atty::is(atty::Stream::Stdout);

    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Lower(args) => commands::lower::run(args, cli.format, use_color, cli.quiet),
        Commands::Layout(args) => commands::layout::run(args, cli.format, use_color),
        Commands::Explain(args) => commands::explain::run(args, cli.format, use_color),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(false, 0), "warn");
        assert_eq!(log_filter(false, 2), "debug");
        assert_eq!(log_filter(false, 9), "trace");
        assert_eq!(log_filter(true, 3), "error");
    }

    #[test]
    fn test_parse_lower_flags() {
        let cli = Cli::parse_from([
            "contour", "--format", "json", "lower", "unit.json", "--no-stack", "--area", "scratch",
        ]);
        assert!(matches!(cli.format, OutputFormat::Json));
        let Some(Commands::Lower(args)) = cli.command else {
            panic!("expected lower");
        };
        assert!(args.options.no_stack);
        assert_eq!(args.options.area.as_deref(), Some("scratch"));
    }
}
