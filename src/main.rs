use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "benchbox")]
#[command(
    author,
    version,
    about = "Run commands in isolated local or container sandboxes"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command in a sandbox and exit with its exit code
    Run(commands::run::RunArgs),

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging; stderr keeps stdout for the command's output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("benchbox=debug")
        } else {
            EnvFilter::new("benchbox=warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Config => {
            commands::show_config::run().await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
