//! Story collection load/save with schema + invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde_json::Value;
use tracing::debug;

use crate::core::stories::{Story, validate_invariants};
use crate::io::atomic::write_json_atomic;

/// JSON Schema (Draft 2020-12) for `.loop/stories.json`.
pub const STORIES_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/stories.schema.json"
));

/// Load and validate stories from disk (schema + invariants).
pub fn load_stories(path: &Path) -> Result<Vec<Story>> {
    debug!(path = %path.display(), "loading stories");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read stories {}", path.display()))?;
    parse_stories(&contents).with_context(|| format!("load stories {}", path.display()))
}

/// Parse and validate an in-memory story document.
pub fn parse_stories(contents: &str) -> Result<Vec<Story>> {
    let value: Value = serde_json::from_str(contents).context("parse stories json")?;
    validate_schema(&value)?;
    let stories: Vec<Story> = serde_json::from_value(value).context("deserialize stories")?;
    let errors = validate_invariants(&stories);
    if !errors.is_empty() {
        return Err(anyhow!("story invariants failed: {}", errors.join("; ")));
    }
    debug!(count = stories.len(), "stories loaded");
    Ok(stories)
}

/// Atomically write stories to disk, preserving stored order.
pub fn write_stories(path: &Path, stories: &[Story]) -> Result<()> {
    debug!(path = %path.display(), count = stories.len(), "writing stories");
    write_json_atomic(path, &stories)
}

fn validator() -> Result<Validator> {
    let schema: Value =
        serde_json::from_str(STORIES_SCHEMA).context("parse embedded stories schema")?;
    validator_for(&schema).map_err(|err| anyhow!("invalid stories schema: {err}"))
}

fn validate_schema(stories: &Value) -> Result<()> {
    let compiled = validator()?;
    if compiled.is_valid(stories) {
        return Ok(());
    }
    let messages = compiled
        .iter_errors(stories)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    Err(anyhow!(
        "stories schema validation failed: {}",
        messages.join("; ")
    ))
}
