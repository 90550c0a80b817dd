//! Command implementations for the vmem CLI.
//!
//! Each submodule implements the logic for one command.

pub mod diff;
pub mod fingerprint;
pub mod history;
pub mod list;
pub mod process;
pub mod show;

use anyhow::{Context, Result};
use vmem_sdk::vmem_core::MemoryDatabase;

use crate::config::Config;

/// Open the configured store for read-only commands.
pub fn open_store(config: &Config) -> Result<MemoryDatabase> {
    let path = &config.engine.database_path;
    MemoryDatabase::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}
