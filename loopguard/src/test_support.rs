//! Test-only helpers: builders, a git-backed scratch repository, and a scripted agent.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::path_rules::default_dependency_manifests;
use crate::core::stories::{Story, StoryStatus};
use crate::core::types::ConstraintPolicy;
use crate::io::agent::{AgentOutcome, AgentRequest, ChangeAgent};
use crate::io::config::{LoopConfig, write_config};
use crate::io::git::Git;
use crate::io::init::{InitOptions, LoopPaths, init_loop};
use crate::io::story_store::write_stories;

/// Create a deterministic story with the given status.
pub fn story(id: &str, status: StoryStatus) -> Story {
    Story {
        id: id.to_string(),
        title: format!("{id} title"),
        status,
        acceptance: vec![format!("{id} works")],
        notes: None,
    }
}

/// Policy that accepts any reasonably sized change.
pub fn permissive_policy() -> ConstraintPolicy {
    ConstraintPolicy {
        max_files_changed: 100,
        max_lines_changed: 10_000,
        allow_paths: Vec::new(),
        deny_paths: Vec::new(),
        allow_dependency_changes: true,
        dependency_manifests: default_dependency_manifests(),
    }
}

/// Temporary git repository with scaffolded `.loop/` and one initial commit.
///
/// Pushing is disabled in its config.
pub struct TestRepo {
    temp: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        let root = temp.path();
        run_git(root, &["init", "-q"])?;
        run_git(root, &["config", "user.email", "loop@example.com"])?;
        run_git(root, &["config", "user.name", "Loop Test"])?;
        run_git(root, &["config", "commit.gpgsign", "false"])?;

        let paths = init_loop(root, &InitOptions { force: false })?;
        let mut cfg = LoopConfig::default();
        cfg.git.push = false;
        write_config(&paths.config_path, &cfg)?;
        fs::write(root.join("README.md"), "scratch repo\n").context("write README")?;

        let repo = Self { temp };
        repo.commit_all("chore: initial scaffold")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn paths(&self) -> LoopPaths {
        LoopPaths::new(self.path())
    }

    pub fn git(&self) -> Git {
        Git::new(self.path())
    }

    /// Replace `.loop/stories.json`.
    pub fn write_stories(&self, stories: &[Story]) -> Result<()> {
        write_stories(&self.paths().stories_path, stories)
    }

    /// Write a repository-relative file, creating parent directories.
    pub fn write_file(&self, rel: &str, contents: &str) -> Result<()> {
        write_relative(self.path(), rel, contents)
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        let git = self.git();
        git.add_all()?;
        git.commit_staged(message)?;
        Ok(())
    }

    /// Subject lines of every commit, newest first.
    pub fn log_subjects(&self) -> Result<Vec<String>> {
        let out = Command::new("git")
            .args(["log", "--format=%s"])
            .current_dir(self.path())
            .output()
            .context("spawn git log")?;
        if !out.status.success() {
            return Err(anyhow!("git log failed"));
        }
        Ok(String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }

    /// Files touched by the `HEAD` commit.
    pub fn head_files(&self) -> Result<Vec<String>> {
        let out = Command::new("git")
            .args(["show", "--name-only", "--format=", "HEAD"])
            .current_dir(self.path())
            .output()
            .context("spawn git show")?;
        if !out.status.success() {
            return Err(anyhow!("git show failed"));
        }
        Ok(String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// One scripted agent invocation: files to write, then the reported outcome.
#[derive(Debug, Clone)]
pub struct ScriptedEdit {
    pub writes: Vec<(String, String)>,
    pub outcome: AgentOutcome,
}

impl ScriptedEdit {
    pub fn produce(writes: &[(&str, &str)]) -> Self {
        Self {
            writes: writes
                .iter()
                .map(|(path, contents)| (path.to_string(), contents.to_string()))
                .collect(),
            outcome: AgentOutcome::Produced,
        }
    }

    pub fn fail(summary: &str) -> Self {
        Self {
            writes: Vec::new(),
            outcome: AgentOutcome::Failed {
                summary: summary.to_string(),
            },
        }
    }
}

/// Agent that edits the working tree from a queue instead of spawning a process.
pub struct ScriptedAgent {
    edits: RefCell<VecDeque<ScriptedEdit>>,
    seen: RefCell<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new(edits: Vec<ScriptedEdit>) -> Self {
        Self {
            edits: RefCell::new(edits.into()),
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.seen.borrow().clone()
    }

    pub fn assert_drained(&self) {
        assert!(
            self.edits.borrow().is_empty(),
            "scripted agent has {} unused edits",
            self.edits.borrow().len()
        );
    }
}

impl ChangeAgent for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest) -> Result<AgentOutcome> {
        self.seen.borrow_mut().push(request.clone());
        let edit = self
            .edits
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted agent called more times than scripted"))?;
        for (rel, contents) in &edit.writes {
            write_relative(&request.workdir, rel, contents)?;
        }
        Ok(edit.outcome)
    }
}

fn write_relative(root: &Path, rel: &str, contents: &str) -> Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
}

fn run_git(root: &Path, args: &[&str]) -> Result<()> {
    let out = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !out.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }
    Ok(())
}
