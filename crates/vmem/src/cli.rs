//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Visual Memory Engine CLI
///
/// Deduplicates screenshots, extracts their content and keeps a versioned
/// history of what changed.
#[derive(Parser, Debug)]
#[command(name = "vmem")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a screenshot into a new or updated memory
    Process {
        /// Image file to process
        image: PathBuf,

        /// Metadata stored with a new memory (JSON object)
        #[arg(short, long)]
        metadata: Option<String>,

        /// Update this memory instead of searching for a similar one
        #[arg(short, long, value_name = "ID")]
        update: Option<String>,
    },

    /// Print the fingerprints of an image (no API key needed)
    Fingerprint {
        /// Image file to fingerprint
        image: PathBuf,
    },

    /// Diff two JSON documents
    Diff {
        /// Base document
        old: PathBuf,

        /// Target document
        new: PathBuf,

        /// Apply the diff to the base document and print the result
        #[arg(long)]
        apply: bool,
    },

    /// List recently updated memories
    List {
        /// Maximum number of memories to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one memory
    Show {
        /// Memory ID
        id: String,
    },

    /// Show the version history of a memory
    History {
        /// Memory ID
        id: String,

        /// Merge closely related consecutive entries
        #[arg(long)]
        compact: bool,
    },

    /// Show version
    Version,
}
