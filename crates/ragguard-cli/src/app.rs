//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ragguard")]
#[command(
    author,
    version,
    about = "Resilient question answering over approved compliance documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to <config dir>/ragguard/config.yml)
    #[arg(long, global = true, env = "RAGGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),

    /// Ask one question and print the answer
    Ask(AskArgs),

    /// Print the effective configuration
    Config,

    /// Print the audit digest of a question or client id
    Digest(DigestArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Bind address (overrides server.host)
    #[arg(long)]
    pub host: Option<String>,

    /// Port (overrides server.port)
    #[arg(long, short)]
    pub port: Option<u16>,
}

#[derive(Args)]
pub struct AskArgs {
    /// Question text
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,

    /// Client id used for rate limiting and audit
    #[arg(long, default_value = "cli")]
    pub client_id: String,
}

#[derive(Args)]
pub struct DigestArgs {
    /// Text to digest; surrounding whitespace is ignored
    pub text: String,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Cli,
    Json,
}
