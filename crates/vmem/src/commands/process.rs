//! Process a screenshot through the engine.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::{Map, Value};
use std::path::Path;
use vmem_sdk::{Engine, ProcessRequest, ProcessStatus};

use super::print_json;
use crate::config::Config;

/// Execute the process command.
pub async fn execute(
    image: &Path,
    metadata: Option<&str>,
    update: Option<String>,
    json: bool,
    config: &Config,
) -> Result<()> {
    let metadata = parse_metadata(metadata)?;
    let engine = Engine::from_config(config.engine.clone()).context("Failed to initialise engine")?;

    let mut request = ProcessRequest::new(image).with_metadata(metadata);
    if let Some(id) = update {
        request = request.with_target(id);
    }

    let outcome = engine
        .process(request)
        .await
        .with_context(|| format!("Failed to process {}", image.display()))?;

    if json {
        return print_json(&outcome);
    }

    let status = match outcome.status {
        ProcessStatus::Created => outcome.status.as_str().green(),
        ProcessStatus::Updated => outcome.status.as_str().yellow(),
        ProcessStatus::Unchanged => outcome.status.as_str().dimmed(),
        ProcessStatus::Skipped => outcome.status.as_str().cyan(),
    };
    println!("{} {} (v{})", status.bold(), outcome.memory_id, outcome.version);
    if let Some(count) = outcome.changes_count {
        println!("  Changes: {}", count);
    }
    println!("  Summary: {}", outcome.summary);
    println!("  {}", outcome.message.dimmed());

    Ok(())
}

/// Parse `--metadata`, which must be a JSON object.
fn parse_metadata(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };

    match serde_json::from_str(raw).context("Invalid --metadata JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("--metadata must be a JSON object"),
    }
}
