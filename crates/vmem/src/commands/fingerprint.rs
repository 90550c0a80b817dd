//! Print image fingerprints.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use super::print_json;

/// Execute the fingerprint command. Needs neither a database nor an API key.
pub async fn execute(image: &Path, json: bool) -> Result<()> {
    let fingerprints = vmem_sdk::engine::fingerprint(image)
        .await
        .with_context(|| format!("Failed to fingerprint {}", image.display()))?;

    if json {
        return print_json(&fingerprints);
    }

    println!("{}", image.display().to_string().bold());
    println!("  Content hash:    {}", fingerprints.content_hash);
    println!("  Perceptual hash: {}", fingerprints.perceptual_hash.cyan());
    println!("  Structural hash: {}", fingerprints.structural_hash);
    println!(
        "  Size:            {}x{} ({})",
        fingerprints.width, fingerprints.height, fingerprints.color_mode
    );

    Ok(())
}
