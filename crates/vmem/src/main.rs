//! vmem - Visual Memory Engine CLI
//!
//! Turns screenshots into versioned, diffable memories.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", serde_json::json!({ "error": format!("{:#}", err) }));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("vmem=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = config::Config::load()?;

    match cli.command {
        Commands::Process {
            image,
            metadata,
            update,
        } => commands::process::execute(&image, metadata.as_deref(), update, cli.json, &config).await,
        Commands::Fingerprint { image } => commands::fingerprint::execute(&image, cli.json).await,
        Commands::Diff { old, new, apply } => commands::diff::execute(&old, &new, apply),
        Commands::List { limit } => commands::list::execute(limit, cli.json, &config),
        Commands::Show { id } => commands::show::execute(&id, cli.json, &config),
        Commands::History { id, compact } => commands::history::execute(&id, compact, cli.json, &config),
        Commands::Version => {
            println!("vmem {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
