//! List recently updated memories.

use anyhow::Result;
use colored::Colorize;
use vmem_sdk::vmem_core::MemoryRecord;

use super::{open_store, print_json};
use crate::config::Config;

/// Execute the list command.
pub fn execute(limit: usize, json: bool, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let memories = store.list_recent(limit)?;

    if json {
        return print_json(&memories);
    }

    if memories.is_empty() {
        println!("{}", "No memories stored yet".dimmed());
        return Ok(());
    }

    println!("{}", format!("{} memories", memories.len()).bold());
    for memory in &memories {
        println!("{}", list_line(memory));
    }

    Ok(())
}

fn list_line(memory: &MemoryRecord) -> String {
    format!(
        "  {} v{:<3} {}  {}",
        memory.id.cyan(),
        memory.version,
        memory.updated_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
        truncate(&memory.summary, 60)
    )
}

/// Shorten to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max.saturating_sub(1)).collect();
    short.push('…');
    short
}
