//! RagGuard CLI
//!
//! Serve and query the compliance question pipeline.

use anyhow::Result;
use clap::Parser;
use ragguard_core::error::exit_codes;
use ragguard_core::{Config, RagGuardError};

mod app;
mod commands;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    // Logs go to stderr so `--format json` output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ragguard=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config).await,
        Commands::Ask(args) => commands::ask::run(args, &config, cli.format).await,
        Commands::Config => commands::config::run(&config, cli.format),
        Commands::Digest(args) => commands::digest::run(args, &config, cli.format),
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<RagGuardError>()
        .map(RagGuardError::exit_code)
        .unwrap_or(exit_codes::GENERAL_ERROR)
}
