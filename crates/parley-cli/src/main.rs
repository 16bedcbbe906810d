//! `parley` -- CLI binary for the parley message pipeline.
//!
//! Provides the following subcommands:
//!
//! - `parley run` -- Run the pipeline on the console channel with an echo engine.
//! - `parley chunk` -- Split stdin into outbound fragments.
//! - `parley config` -- Show the effective configuration.

use clap::{Parser, Subcommand};

mod commands;

/// parley multi-channel message pipeline.
#[derive(Parser)]
#[command(name = "parley", about = "parley multi-channel message pipeline", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (overrides PARLEY_CONFIG).
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline on stdin/stdout with an echo engine.
    Run(commands::run::RunArgs),

    /// Split text from stdin the way replies are split for a channel.
    Chunk(commands::chunk::ChunkArgs),

    /// Show the effective configuration.
    Config(commands::config_cmd::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run(args) => commands::run::run(args, config).await?,
        Commands::Chunk(args) => commands::chunk::run(args, &config).await?,
        Commands::Config(args) => commands::config_cmd::run(&args, &config)?,
    }

    Ok(())
}
