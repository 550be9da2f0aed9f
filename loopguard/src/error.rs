//! Typed fatal errors carried inside `anyhow::Error`.
//!
//! Callers recover the category with `err.downcast_ref::<LoopError>()`.
//! Guard violations and agent failures are not errors: the loop controller
//! turns them into a failure-tracker update.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoopError {
    /// A required state document is missing or invalid. Raised before any mutation.
    #[error("config error in {}: {reason}", document.display())]
    Config { document: PathBuf, reason: String },
    /// The working tree had changes before delegation.
    #[error("working tree not clean before run: {0}")]
    DirtyWorktree(String),
    /// Staging, committing, or pushing failed after state was decided.
    #[error("commit failed: {0}")]
    Commit(String),
}

impl LoopError {
    pub fn config(document: impl Into<PathBuf>, err: &anyhow::Error) -> Self {
        LoopError::Config {
            document: document.into(),
            reason: format!("{err:#}"),
        }
    }
}
