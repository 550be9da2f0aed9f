//! Governed automation loop for code changes.
//!
//! State lives under `.loop/` in the repository root. Each `loopguard run`
//! works on at most one story and exits with a stable code the trigger
//! pipeline can branch on.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use loopguard::error::LoopError;
use loopguard::exit_codes;
use loopguard::guard::run_guard;
use loopguard::io::init::{InitOptions, LoopPaths, init_loop};
use loopguard::run::{RunPath, run_from_root};
use loopguard::select::{SelectOutcome, select_from_root};
use loopguard::status::{resume, status_from_root};

#[derive(Parser)]
#[command(
    name = "loopguard",
    version,
    about = "Bounded, guarded automation loop for code changes"
)]
struct Cli {
    /// Repository root (defaults to the current directory).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.loop/` with placeholder documents.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Check the pending working-tree change against the constraint policy.
    Guard {
        /// Policy document, relative to `--root` (defaults to `.loop/constraints.toml`).
        #[arg(long)]
        policy: Option<PathBuf>,
        /// Also log checks that failed after the first violation.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print the id of the next `todo` story.
    Select,
    /// Execute one loop run.
    Run {
        /// Reference recorded with failures (e.g. the CI job id).
        #[arg(long)]
        run_ref: String,
    },
    /// Print pause flag, failure counter, and story counts.
    Status,
    /// Clear the pause flag after fixing the cause of repeated failures.
    Resume,
}

fn main() {
    loopguard::logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = cli.root;
    match cli.command {
        Command::Init { force } => {
            let paths = init_loop(&root, &InitOptions { force })?;
            println!("initialized {}", paths.loop_dir.display());
            Ok(exit_codes::OK)
        }
        Command::Guard { policy, verbose } => {
            let policy = policy_path(&root, policy);
            let verdict = run_guard(&root, &policy, verbose)?;
            println!("{}", verdict.message);
            Ok(verdict.exit_code())
        }
        Command::Select => match select_from_root(&root)? {
            SelectOutcome::Next { id, .. } => {
                println!("{id}");
                Ok(exit_codes::OK)
            }
            SelectOutcome::Complete => {
                println!("complete: no todo story");
                Ok(exit_codes::COMPLETE)
            }
        },
        Command::Run { run_ref } => {
            let report = run_from_root(&root, &run_ref, Utc::now())?;
            match &report.path {
                RunPath::Paused => println!("paused: run `loopguard resume` to continue"),
                RunPath::NoWork => println!("complete: no todo story"),
                RunPath::Committed { story_id, .. } => println!("done: {story_id}"),
                RunPath::FailureRecorded {
                    story_id,
                    summary,
                    paused_now,
                    ..
                } => {
                    println!("failed: {story_id}: {summary}");
                    if *paused_now {
                        println!("paused: failure threshold reached");
                    }
                }
            }
            Ok(report.exit_code())
        }
        Command::Status => {
            let report = status_from_root(&root).context("loopguard status")?;
            println!("{report}");
            Ok(exit_codes::OK)
        }
        Command::Resume => {
            if resume(&root)? {
                println!("resumed");
            } else {
                println!("not paused");
            }
            Ok(exit_codes::OK)
        }
    }
}

/// Policy document for `guard`; relative paths are taken from `--root`.
fn policy_path(root: &Path, policy: Option<PathBuf>) -> PathBuf {
    match policy {
        Some(path) => root.join(path),
        None => LoopPaths::new(root).policy_path,
    }
}

fn report_error(err: &anyhow::Error) {
    eprintln!("{err:#}");
    match err.downcast_ref::<LoopError>() {
        Some(LoopError::Config { .. }) => {
            eprintln!("hint: fix the document, or run `loopguard init` to scaffold .loop/");
        }
        Some(LoopError::DirtyWorktree(_)) => {
            eprintln!("hint: commit or discard local changes before `loopguard run`");
        }
        Some(LoopError::Commit(_)) => {
            eprintln!("hint: loop state was written but not committed; inspect `git status`");
        }
        None => {}
    }
}
