//! Run-level agent contract: pause flag and retry threshold.

use serde::Serialize;

/// The only supported value for `MAX_ITERATIONS_PER_RUN`.
pub const ITERATIONS_PER_RUN: u32 = 1;

/// Run-level configuration loaded from `.loop/AGENT_CONTRACT.md`.
///
/// `paused` is set by the loop controller when the failure threshold is
/// crossed and cleared only by a human (`loopguard resume`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgentContract {
    pub paused: bool,
    pub max_iterations_per_run: u32,
    pub max_failure_retries: u32,
    pub require_tests: bool,
}

impl Default for AgentContract {
    fn default() -> Self {
        Self {
            paused: false,
            max_iterations_per_run: ITERATIONS_PER_RUN,
            max_failure_retries: 3,
            require_tests: true,
        }
    }
}

impl AgentContract {
    /// Returns a list of stable error messages (empty on success).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_iterations_per_run != ITERATIONS_PER_RUN {
            errors.push(format!(
                "MAX_ITERATIONS_PER_RUN must be {ITERATIONS_PER_RUN} (got {})",
                self.max_iterations_per_run
            ));
        }
        if self.max_failure_retries == 0 {
            errors.push("MAX_FAILURE_RETRIES must be >= 1".to_string());
        }
        errors
    }

    pub fn with_paused(self, paused: bool) -> Self {
        Self { paused, ..self }
    }
}
