//! Show one memory.

use anyhow::{anyhow, Result};
use colored::Colorize;

use super::{open_store, print_json};
use crate::config::Config;

/// Execute the show command.
pub fn execute(id: &str, json: bool, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let memory = store
        .get_memory(id)?
        .ok_or_else(|| anyhow!("Memory not found: {}", id))?;

    if json {
        return print_json(&memory);
    }

    println!("{} (v{})", memory.id.cyan().bold(), memory.version);
    println!("  Created:    {}", memory.created_at.to_rfc3339());
    println!("  Updated:    {}", memory.updated_at.to_rfc3339());
    println!("  Perceptual: {}", memory.perceptual_hash);
    println!("  Summary:    {}", memory.summary);
    if !memory.metadata.is_empty() {
        println!("  Metadata:   {}", serde_json::to_string(&memory.metadata)?);
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&memory.structured_content)?);

    Ok(())
}
