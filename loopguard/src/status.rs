//! Read-only status report and the human `resume` action.

use std::fmt;
use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::core::contract::AgentContract;
use crate::core::failure::FailureState;
use crate::core::stories::{select_next, status_counts};
use crate::error::LoopError;
use crate::io::contract_doc::{load_contract, write_paused};
use crate::io::init::LoopPaths;
use crate::io::state_store::{FsStateStore, StateStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub contract: AgentContract,
    pub failure: FailureState,
    pub todo: usize,
    pub doing: usize,
    pub done: usize,
    pub next_story: Option<String>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "paused: {}", self.contract.paused)?;
        writeln!(
            f,
            "consecutive failures: {}/{}",
            self.failure.consecutive_failures, self.contract.max_failure_retries
        )?;
        if !self.failure.last_failure_summary.is_empty() {
            writeln!(
                f,
                "last failure: {} (run {}, at {})",
                self.failure.last_failure_summary,
                self.failure.last_failure_run_ref,
                self.failure.last_failure_at
            )?;
        }
        writeln!(
            f,
            "stories: {} todo, {} doing, {} done",
            self.todo, self.doing, self.done
        )?;
        match &self.next_story {
            Some(id) => write!(f, "next: {id}"),
            None => write!(f, "next: none"),
        }
    }
}

/// Load every document and summarize the loop state.
pub fn status_from_root(root: &Path) -> Result<StatusReport> {
    let state = FsStateStore::new(LoopPaths::new(root)).load()?;
    let (todo, doing, done) = status_counts(&state.stories);
    let next_story = select_next(&state.stories).map(|s| s.id.clone());
    Ok(StatusReport {
        contract: state.contract,
        failure: state.failure,
        todo,
        doing,
        done,
        next_story,
    })
}

/// Clear the pause flag. The failure counter is left as is.
///
/// Returns whether the loop was paused before.
pub fn resume(root: &Path) -> Result<bool> {
    let paths = LoopPaths::new(root);
    let contract = load_contract(&paths.contract_path)
        .map_err(|err| LoopError::config(&paths.contract_path, &err))?;
    if !contract.paused {
        info!("loop was not paused");
        return Ok(false);
    }
    write_paused(&paths.contract_path, false)?;
    info!("loop resumed");
    Ok(true)
}
