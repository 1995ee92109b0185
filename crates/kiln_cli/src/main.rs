//! Kiln CLI: merges directories and archives into one output directory,
//! reprocessing only what changed since the last successful merge.
//!
//! Provides `kiln merge` for full and incremental merges and `kiln cache` for
//! inspecting or discarding the persisted archive cache.

#![warn(missing_docs)]

mod cache;
mod merge;
mod pipeline;
mod writer;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Kiln: incremental file-set merging.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln incremental merger")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `kiln.toml` configuration file or project directory.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Merge the configured inputs into the output directory.
    Merge(MergeArgs),
    /// Inspect or discard the persisted archive cache.
    Cache {
        /// The cache operation to run.
        #[command(subcommand)]
        action: CacheCommand,
    },
}

/// Arguments for the `kiln merge` subcommand.
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Ignore previous state and rebuild the output from scratch.
    #[arg(long)]
    pub full: bool,

    /// A changed input or file, as `PATH=new|changed|removed`. Repeatable.
    #[arg(long = "changed", value_name = "PATH=STATUS", conflicts_with = "full")]
    pub changed: Vec<String>,

    /// Output format for the merge summary.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Subcommands of `kiln cache`.
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// List cached archives and their entry counts.
    Show {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Delete the persisted cache so the next merge is a full rebuild.
    Clear,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Merge(ref args) => merge::run(args, &global),
        Command::Cache { ref action } => match action {
            CacheCommand::Show { format } => cache::show(*format, &global),
            CacheCommand::Clear => cache::clear(&global),
        },
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs a stderr logger. `RUST_LOG` takes precedence over the flags.
fn init_tracing(quiet: bool, verbose: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
