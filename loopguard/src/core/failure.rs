//! Consecutive-failure tracking and the derived pause decision.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Persisted failure bookkeeping (`.loop/failure_state.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FailureState {
    /// Failing runs since the last successful run.
    pub consecutive_failures: u32,
    /// Code-prefixed summary of the most recent failure.
    pub last_failure_summary: String,
    /// Run reference supplied by the trigger for the most recent failure.
    pub last_failure_run_ref: String,
    /// RFC 3339 timestamp of the most recent failure, or empty.
    pub last_failure_at: String,
}

/// Count one more failure and overwrite the failure details.
pub fn record_failure(
    state: &FailureState,
    run_ref: &str,
    summary: &str,
    at: DateTime<Utc>,
) -> FailureState {
    FailureState {
        consecutive_failures: state.consecutive_failures.saturating_add(1),
        last_failure_summary: summary.to_string(),
        last_failure_run_ref: run_ref.to_string(),
        last_failure_at: at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

/// Reset the counter after a successful run.
///
/// The last-failure details are kept as a record of the most recent failure;
/// only the counter drives pause decisions.
pub fn record_success(state: &FailureState) -> FailureState {
    FailureState {
        consecutive_failures: 0,
        ..state.clone()
    }
}

pub fn should_pause(state: &FailureState, max_retries: u32) -> bool {
    state.consecutive_failures >= max_retries
}
