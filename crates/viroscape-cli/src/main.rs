//! Viroscape CLI - run partitioned virus and immune response simulations.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "viroscape")]
#[command(author, version, about = "Viroscape - Agent-based simulation of viral infection and immune response", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: viroscape.toml in this or a parent directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default viroscape.toml
    Init {
        /// Project directory (default: current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Run the simulation
    Run {
        /// Number of ticks to run (default: run.stop_at)
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Ranks along the x axis
        #[arg(long)]
        ranks_x: Option<i32>,

        /// Ranks along the y axis
        #[arg(long)]
        ranks_y: Option<i32>,

        /// Random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Census output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: OutputFormat,

        /// Census output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Params,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Init { path } => commands::init::run(path),
        Commands::Run {
            ticks,
            ranks_x,
            ranks_y,
            seed,
            format,
            output,
        } => commands::run::run(
            cli.config.as_deref(),
            commands::run::RunOptions {
                ticks,
                ranks_x,
                ranks_y,
                seed,
                format,
                output,
            },
        ),
        Commands::Params => commands::params::run(cli.config.as_deref()),
    }
}
