//! Git adapter for loopguard commands.
//!
//! The loop observes changes and commits deterministically, so we keep a
//! small, explicit wrapper around `git` subprocess calls.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::types::ChangeSet;

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Return the full HEAD commit id.
    pub fn head_rev(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--verify", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Ensure the worktree is fully clean (including untracked files).
    #[instrument(skip_all)]
    pub fn ensure_clean(&self) -> Result<()> {
        let entries = self.status_porcelain()?;
        if entries.is_empty() {
            debug!("worktree is clean");
            return Ok(());
        }
        warn!(dirty_count = entries.len(), "worktree not clean");
        let mut msg = String::new();
        for entry in entries {
            msg.push_str(&format!("{} {}\n", entry.code, entry.path));
        }
        Err(anyhow!(msg.trim_end().to_string()))
    }

    /// Compute the change between `base` and the working tree, untracked files included.
    ///
    /// Binary files count as changed with zero line deltas.
    #[instrument(skip_all, fields(base))]
    pub fn change_since(&self, base: &str) -> Result<ChangeSet> {
        let mut change = ChangeSet::new();
        let numstat = self.run_capture(&["diff", "--numstat", "-z", "--no-renames", base, "--"])?;
        for (path, added, deleted) in parse_numstat_z(&numstat)? {
            change.record(path, added, deleted);
        }
        for path in self.untracked_files()? {
            let added = count_text_lines(&self.workdir.join(&path));
            change.record(path, added, 0);
        }
        debug!(
            files = change.file_count(),
            lines = change.total_lines(),
            "computed change set"
        );
        Ok(change)
    }

    /// Untracked files that are not ignored.
    pub fn untracked_files(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["ls-files", "--others", "--exclude-standard", "-z"])?;
        Ok(out
            .split('\0')
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Stage exactly `paths` (additions, modifications, and deletions).
    pub fn add_paths(&self, paths: &[String]) -> Result<()> {
        let mut args = vec!["add", "-A", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_checked(&args)?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Stage and commit only `paths`, leaving every other change untouched.
    ///
    /// Returns Ok(false) if none of the paths changed.
    #[instrument(skip_all, fields(paths = paths.len()))]
    pub fn commit_paths(&self, paths: &[String], message: &str) -> Result<bool> {
        self.add_paths(paths)?;
        let mut args = vec!["diff", "--cached", "--name-only", "--"];
        args.extend(paths.iter().map(String::as_str));
        if self.run_capture(&args)?.trim().is_empty() {
            debug!("selected paths unchanged, skipping commit");
            return Ok(false);
        }
        let mut args = vec!["commit", "-m", message, "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_checked(&args)?;
        Ok(true)
    }

    /// Reset tracked files to `rev` and remove untracked, non-ignored files.
    #[instrument(skip_all, fields(rev))]
    pub fn reset_hard(&self, rev: &str) -> Result<()> {
        debug!(rev, "discarding working tree changes");
        self.run_checked(&["reset", "--hard", rev])?;
        self.run_checked(&["clean", "-fd"])?;
        Ok(())
    }

    /// Push the current branch to `remote`.
    #[instrument(skip_all, fields(remote))]
    pub fn push(&self, remote: &str) -> Result<()> {
        debug!(remote, "pushing HEAD");
        self.run_checked(&["push", remote, "HEAD"])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

/// Parse `git diff --numstat -z --no-renames` output into `(path, added, deleted)`.
fn parse_numstat_z(out: &str) -> Result<Vec<(String, u64, u64)>> {
    let mut entries = Vec::new();
    for record in out.split('\0') {
        let record = record.trim_start_matches('\n');
        if record.is_empty() {
            continue;
        }
        let mut parts = record.splitn(3, '\t');
        let (Some(added), Some(deleted), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(anyhow!("unexpected numstat record: '{record}'"));
        };
        entries.push((
            path.to_string(),
            parse_numstat_count(added)?,
            parse_numstat_count(deleted)?,
        ));
    }
    Ok(entries)
}

fn parse_numstat_count(raw: &str) -> Result<u64> {
    // Binary files report "-".
    if raw == "-" {
        return Ok(0);
    }
    raw.parse::<u64>()
        .with_context(|| format!("parse numstat count '{raw}'"))
}

/// Line count of a text file the way `git diff --numstat` counts additions.
/// Added-line count for an untracked entry, matching `git diff --numstat`.
///
/// A symlink counts as its one-line target. Directories (nested repositories)
/// and unreadable entries count as zero so the path is still reported.
fn count_text_lines(path: &Path) -> u64 {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot stat untracked entry");
            return 0;
        }
    };
    if meta.file_type().is_symlink() {
        return 1;
    }
    if !meta.is_file() {
        return 0;
    }
    match fs::read(path) {
        Ok(bytes) => line_count(&bytes),
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot read untracked file");
            0
        }
    }
}

fn line_count(bytes: &[u8]) -> u64 {
    if bytes.contains(&0) {
        return 0;
    }
    let newlines = bytes.iter().filter(|b| **b == b'\n').count() as u64;
    let trailing = u64::from(!bytes.is_empty() && !bytes.ends_with(b"\n"));
    newlines + trailing
}
