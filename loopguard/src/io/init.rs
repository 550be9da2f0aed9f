//! Initialization helpers for `.loop/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::core::failure::FailureState;
use crate::io::config::{LoopConfig, write_config};
use crate::io::failure_store::write_failure_state;

pub const LOOP_DIR: &str = ".loop";

/// All canonical paths within `.loop/` for a repository root.
#[derive(Debug, Clone)]
pub struct LoopPaths {
    pub root: PathBuf,
    pub loop_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub stories_path: PathBuf,
    pub policy_path: PathBuf,
    pub failure_state_path: PathBuf,
    pub contract_path: PathBuf,
    pub config_path: PathBuf,
}

impl LoopPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let loop_dir = root.join(LOOP_DIR);
        Self {
            root: root.clone(),
            runs_dir: loop_dir.join("runs"),
            gitignore_path: loop_dir.join(".gitignore"),
            stories_path: loop_dir.join("stories.json"),
            policy_path: loop_dir.join("constraints.toml"),
            failure_state_path: loop_dir.join("failure_state.json"),
            contract_path: loop_dir.join("AGENT_CONTRACT.md"),
            config_path: loop_dir.join("config.toml"),
            loop_dir,
        }
    }

    /// Per-run artifact directory (git-ignored).
    pub fn run_dir(&self, run_ref: &str) -> PathBuf {
        self.runs_dir.join(run_ref)
    }

    /// `path` relative to the repository root, with `/` separators.
    pub fn relative(&self, path: &Path) -> Result<String> {
        let rel = path.strip_prefix(&self.root).map_err(|_| {
            anyhow!(
                "{} is outside repository root {}",
                path.display(),
                self.root.display()
            )
        })?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }
}

/// Options for `init_loop`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing loop-owned files.
    pub force: bool,
}

/// Create `.loop/` scaffolding in `root`.
///
/// Fails if `.loop/` already exists unless `options.force` is set.
pub fn init_loop(root: &Path, options: &InitOptions) -> Result<LoopPaths> {
    let paths = LoopPaths::new(root);
    if paths.loop_dir.exists() && !paths.loop_dir.is_dir() {
        return Err(anyhow!("loopguard init: .loop exists but is not a directory"));
    }
    if paths.loop_dir.exists() && !options.force {
        return Err(anyhow!(
            "loopguard init: .loop already exists (use --force to overwrite)"
        ));
    }

    create_dir(&paths.loop_dir)?;
    create_dir(&paths.runs_dir)?;

    write_file(&paths.gitignore_path, LOOP_GITIGNORE)?;
    write_file(&paths.stories_path, STORIES_PLACEHOLDER)?;
    write_file(&paths.policy_path, POLICY_PLACEHOLDER)?;
    write_file(&paths.contract_path, CONTRACT_PLACEHOLDER)?;
    write_failure_state(&paths.failure_state_path, &FailureState::default())?;
    write_config(&paths.config_path, &LoopConfig::default())?;

    info!(loop_dir = %paths.loop_dir.display(), "initialized loop scaffolding");
    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const LOOP_GITIGNORE: &str = "runs/\n";

const STORIES_PLACEHOLDER: &str = r#"[
  {
    "id": "example-1",
    "title": "Replace this with the first story",
    "status": "todo",
    "acceptance": [
      "Describe an observable outcome"
    ]
  }
]
"#;

const POLICY_PLACEHOLDER: &str = r#"[iteration]
maxFilesChanged = 12
maxLinesChanged = 400

[scope]
# Entries ending in "/" match everything under that directory; others match one file.
allowPaths = []
denyPaths = [".loop/", ".github/"]

[dependencies]
allowDependencyChanges = false
"#;

const CONTRACT_PLACEHOLDER: &str = "# Agent contract

Run-level options read by loopguard. Edit the values, keep the keys.

- PAUSED=false
- MAX_ITERATIONS_PER_RUN=1
- MAX_FAILURE_RETRIES=3
- REQUIRE_TESTS=true

loopguard sets PAUSED=true after MAX_FAILURE_RETRIES consecutive failed runs.
Run `loopguard resume` once the cause is fixed.
";
