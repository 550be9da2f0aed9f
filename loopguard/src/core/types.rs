//! Shared deterministic types for guard evaluation.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::exit_codes;

/// Lines added/deleted for one changed file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineDelta {
    pub added: u64,
    pub deleted: u64,
}

impl LineDelta {
    pub fn total(&self) -> u64 {
        self.added.saturating_add(self.deleted)
    }
}

/// The pending change of a single run: changed paths and their line deltas.
///
/// Paths are repository-relative with `/` separators. Keys are kept sorted so
/// messages and logs are stable for identical inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    per_file: BTreeMap<String, LineDelta>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delta for `path`. Repeated paths accumulate.
    pub fn record(&mut self, path: impl Into<String>, added: u64, deleted: u64) {
        let entry = self.per_file.entry(path.into()).or_default();
        entry.added = entry.added.saturating_add(added);
        entry.deleted = entry.deleted.saturating_add(deleted);
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.per_file.keys().map(String::as_str)
    }

    pub fn file_count(&self) -> usize {
        self.per_file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_file.is_empty()
    }

    pub fn per_file(&self) -> &BTreeMap<String, LineDelta> {
        &self.per_file
    }

    /// Sum of `added + deleted` across every file.
    pub fn total_lines(&self) -> u64 {
        self.per_file
            .values()
            .fold(0u64, |acc, delta| acc.saturating_add(delta.total()))
    }
}

impl<S: Into<String>> FromIterator<(S, u64, u64)> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = (S, u64, u64)>>(iter: I) -> Self {
        let mut change = ChangeSet::new();
        for (path, added, deleted) in iter {
            change.record(path, added, deleted);
        }
        change
    }
}

/// Configured bounds and path rules a change must satisfy.
///
/// `deny_paths` always wins over `allow_paths`. An empty `allow_paths` allows
/// every path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintPolicy {
    pub max_files_changed: usize,
    pub max_lines_changed: u64,
    pub allow_paths: Vec<String>,
    pub deny_paths: Vec<String>,
    pub allow_dependency_changes: bool,
    /// File names recognized as dependency manifests.
    pub dependency_manifests: Vec<String>,
}

/// Discriminant of a failed guard check. Exactly one per verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViolationCode {
    TooManyFiles,
    DeniedPathModified,
    PathOutsideAllowlist,
    DependencyChangeForbidden,
    TooManyLinesChanged,
}

impl ViolationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationCode::TooManyFiles => "TooManyFiles",
            ViolationCode::DeniedPathModified => "DeniedPathModified",
            ViolationCode::PathOutsideAllowlist => "PathOutsideAllowlist",
            ViolationCode::DependencyChangeForbidden => "DependencyChangeForbidden",
            ViolationCode::TooManyLinesChanged => "TooManyLinesChanged",
        }
    }

    /// Process exit status reported by `loopguard guard`.
    pub fn exit_code(&self) -> i32 {
        match self {
            ViolationCode::TooManyFiles => exit_codes::TOO_MANY_FILES,
            ViolationCode::DeniedPathModified => exit_codes::DENIED_PATH_MODIFIED,
            ViolationCode::PathOutsideAllowlist => exit_codes::PATH_OUTSIDE_ALLOWLIST,
            ViolationCode::DependencyChangeForbidden => exit_codes::DEPENDENCY_CHANGE_FORBIDDEN,
            ViolationCode::TooManyLinesChanged => exit_codes::TOO_MANY_LINES_CHANGED,
        }
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating a [`ChangeSet`] against a [`ConstraintPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyVerdict {
    pub passed: bool,
    pub violation: Option<ViolationCode>,
    pub message: String,
}

impl PolicyVerdict {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            violation: None,
            message: message.into(),
        }
    }

    pub fn violation(code: ViolationCode, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            violation: Some(code),
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.violation
            .map_or(exit_codes::OK, |code| code.exit_code())
    }

    /// Message prefixed with the violation code, used as a failure summary.
    pub fn summary(&self) -> String {
        match self.violation {
            Some(code) => format!("{code}: {}", self.message),
            None => self.message.clone(),
        }
    }
}
