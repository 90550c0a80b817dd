//! Show the version history of a memory.

use anyhow::{bail, Result};
use colored::Colorize;
use vmem_sdk::vmem_core::history::{self, CompactedEntry};

use super::{open_store, print_json};
use crate::config::Config;

/// Execute the history command.
pub fn execute(id: &str, compact: bool, json: bool, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    if store.get_memory(id)?.is_none() {
        bail!("Memory not found: {}", id);
    }

    let entries = store.history(id)?;

    if compact {
        let compacted = history::compress(&entries);
        if json {
            return print_json(&compacted);
        }
        print_entries(&compacted);
        return Ok(());
    }

    if json {
        return print_json(&entries);
    }
    let entries: Vec<CompactedEntry> = entries.iter().map(CompactedEntry::from).collect();
    print_entries(&entries);

    Ok(())
}

fn print_entries(entries: &[CompactedEntry]) {
    if entries.is_empty() {
        println!("{}", "No changes recorded".dimmed());
        return;
    }

    for entry in entries {
        let versions = if entry.first_version == entry.last_version {
            format!("v{}", entry.last_version)
        } else {
            format!("v{}-v{}", entry.first_version, entry.last_version)
        };
        println!(
            "{} {}  {} change(s)",
            versions.cyan().bold(),
            entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            entry.change_count
        );
        for op in &entry.operations {
            println!("    {} {}", op.op.to_string().yellow(), op.joined_path());
        }
    }
}
