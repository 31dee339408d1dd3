use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod console;

#[derive(Parser)]
#[command(name = "webmfd", about = "Remote MFD panels in the terminal")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Open panels against an MFD server
    Run(commands::run::RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Run(args) => commands::run::run(args).await,
    }
}
