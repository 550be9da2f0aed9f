//! Failure state storage (`.loop/failure_state.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::DateTime;
use tracing::debug;

use crate::core::failure::FailureState;
use crate::io::atomic::write_json_atomic;

/// Load failure state, defaulting to zero failures when the file is absent.
pub fn load_failure_state(path: &Path) -> Result<FailureState> {
    if !path.exists() {
        debug!(path = %path.display(), "failure state absent, using default");
        return Ok(FailureState::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read failure state {}", path.display()))?;
    let state: FailureState = serde_json::from_str(&contents)
        .with_context(|| format!("parse failure state {}", path.display()))?;
    if !state.last_failure_at.is_empty() {
        DateTime::parse_from_rfc3339(&state.last_failure_at).map_err(|err| {
            anyhow!(
                "lastFailureAt must be empty or RFC 3339 (got '{}'): {err}",
                state.last_failure_at
            )
        })?;
    }
    debug!(
        consecutive_failures = state.consecutive_failures,
        "failure state loaded"
    );
    Ok(state)
}

/// Atomically write failure state to disk.
pub fn write_failure_state(path: &Path, state: &FailureState) -> Result<()> {
    debug!(
        path = %path.display(),
        consecutive_failures = state.consecutive_failures,
        "writing failure state"
    );
    write_json_atomic(path, state)
}
