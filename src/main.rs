mod aggregate;
mod cli;
mod commands;
mod compare;
mod config;
mod error;
mod levels;
mod matrix;
mod mds;
mod metadata;
mod model;
mod results;
mod similarity;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Aggregate(args) => commands::aggregate::run(args),
        Commands::Compare(args) => commands::compare::run(args),
        Commands::Heatmap(args) => commands::heatmap::run(args),
        Commands::Levels(args) => commands::levels::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
