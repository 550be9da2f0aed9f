//! State store port: loads every loop document up front and writes one checkpoint per run.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::contract::AgentContract;
use crate::core::failure::FailureState;
use crate::core::stories::Story;
use crate::core::types::ConstraintPolicy;
use crate::error::LoopError;
use crate::io::contract_doc::{load_contract, write_paused};
use crate::io::failure_store::{load_failure_state, write_failure_state};
use crate::io::init::LoopPaths;
use crate::io::policy_store::load_policy;
use crate::io::story_store::{load_stories, write_stories};

/// Every document a run reads, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedState {
    pub contract: AgentContract,
    pub stories: Vec<Story>,
    pub failure: FailureState,
    pub policy: ConstraintPolicy,
}

/// The documents a run writes at its single persistence point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    Success {
        stories: Vec<Story>,
        failure: FailureState,
    },
    Failure {
        failure: FailureState,
        contract: AgentContract,
    },
}

pub trait StateStore {
    /// Fails with [`LoopError::Config`] when a required document is missing or invalid.
    fn load(&self) -> Result<LoadedState>;
    /// Returns the repository-relative paths written.
    fn persist(&self, checkpoint: &Checkpoint) -> Result<Vec<String>>;
}

/// Store backed by the documents under `.loop/`.
#[derive(Debug, Clone)]
pub struct FsStateStore {
    paths: LoopPaths,
    policy_path: PathBuf,
}

impl FsStateStore {
    pub fn new(paths: LoopPaths) -> Self {
        let policy_path = paths.policy_path.clone();
        Self { paths, policy_path }
    }

    /// Read the policy from `policy_path` instead of `.loop/constraints.toml`.
    pub fn with_policy_path(mut self, policy_path: impl Into<PathBuf>) -> Self {
        self.policy_path = policy_path.into();
        self
    }

    pub fn paths(&self) -> &LoopPaths {
        &self.paths
    }
}

impl StateStore for FsStateStore {
    #[instrument(skip_all)]
    fn load(&self) -> Result<LoadedState> {
        let contract = as_config(&self.paths.contract_path, load_contract)?;
        let stories = as_config(&self.paths.stories_path, load_stories)?;
        let policy = as_config(&self.policy_path, load_policy)?;
        let failure = as_config(&self.paths.failure_state_path, load_failure_state)?;
        debug!(
            stories = stories.len(),
            paused = contract.paused,
            consecutive_failures = failure.consecutive_failures,
            "loop state loaded"
        );
        Ok(LoadedState {
            contract,
            stories,
            failure,
            policy,
        })
    }

    #[instrument(skip_all)]
    fn persist(&self, checkpoint: &Checkpoint) -> Result<Vec<String>> {
        let written = match checkpoint {
            Checkpoint::Success { stories, failure } => {
                write_stories(&self.paths.stories_path, stories)?;
                write_failure_state(&self.paths.failure_state_path, failure)?;
                [&self.paths.stories_path, &self.paths.failure_state_path]
            }
            Checkpoint::Failure { failure, contract } => {
                write_failure_state(&self.paths.failure_state_path, failure)?;
                write_paused(&self.paths.contract_path, contract.paused)?;
                [&self.paths.failure_state_path, &self.paths.contract_path]
            }
        };
        written
            .into_iter()
            .map(|path| self.paths.relative(path))
            .collect()
    }
}

fn as_config<T>(path: &Path, load: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    load(path).map_err(|err| LoopError::config(path, &err).into())
}
