//! Workspace port: how the loop controller observes, discards, and commits changes.

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::types::ChangeSet;
use crate::error::LoopError;
use crate::io::git::Git;

/// Point in history the agent's change is measured against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub rev: String,
}

/// What a commit includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitScope {
    /// Every pending change (agent edits plus checkpoint documents).
    All,
    /// Only these repository-relative paths.
    Paths(Vec<String>),
}

pub trait Workspace {
    /// Fail with [`LoopError::DirtyWorktree`] if anything is pending.
    fn ensure_clean(&self) -> Result<()>;
    fn snapshot(&self) -> Result<Snapshot>;
    /// Change between `base` and the current working tree.
    fn pending_change(&self, base: &Snapshot) -> Result<ChangeSet>;
    /// Drop every change made since `base`.
    fn discard_pending(&self, base: &Snapshot) -> Result<()>;
    /// Returns `Ok(false)` when there was nothing to commit.
    fn commit(&self, scope: &CommitScope, message: &str) -> Result<bool>;
    fn push(&self) -> Result<()>;
}

/// Git-backed workspace rooted at the repository.
#[derive(Debug, Clone)]
pub struct GitWorkspace {
    git: Git,
    push_remote: Option<String>,
    discard_failed_changes: bool,
}

impl GitWorkspace {
    pub fn new(git: Git, push_remote: Option<String>, discard_failed_changes: bool) -> Self {
        Self {
            git,
            push_remote,
            discard_failed_changes,
        }
    }
}

impl Workspace for GitWorkspace {
    fn ensure_clean(&self) -> Result<()> {
        self.git
            .ensure_clean()
            .map_err(|err| LoopError::DirtyWorktree(format!("{err:#}")).into())
    }

    fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            rev: self.git.head_rev()?,
        })
    }

    fn pending_change(&self, base: &Snapshot) -> Result<ChangeSet> {
        self.git.change_since(&base.rev)
    }

    #[instrument(skip_all, fields(rev = %base.rev))]
    fn discard_pending(&self, base: &Snapshot) -> Result<()> {
        if !self.discard_failed_changes {
            debug!("discarding failed changes disabled; leaving working tree as is");
            return Ok(());
        }
        self.git.reset_hard(&base.rev)
    }

    #[instrument(skip_all)]
    fn commit(&self, scope: &CommitScope, message: &str) -> Result<bool> {
        let committed = match scope {
            CommitScope::All => {
                self.git.add_all()?;
                self.git.commit_staged(message)?
            }
            CommitScope::Paths(paths) => self.git.commit_paths(paths, message)?,
        };
        if committed {
            info!(message, "committed");
        }
        Ok(committed)
    }

    fn push(&self) -> Result<()> {
        match &self.push_remote {
            Some(remote) => self.git.push(remote),
            None => {
                debug!("push disabled");
                Ok(())
            }
        }
    }
}

/// Wrap a commit or push failure as [`LoopError::Commit`].
pub fn commit_error(err: anyhow::Error) -> anyhow::Error {
    if err.downcast_ref::<LoopError>().is_some() {
        return err;
    }
    anyhow!(LoopError::Commit(format!("{err:#}")))
}
