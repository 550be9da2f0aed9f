//! Constraint policy document (`.loop/constraints.toml`).
//!
//! ```toml
//! [iteration]
//! maxFilesChanged = 12
//! maxLinesChanged = 400
//!
//! [scope]
//! allowPaths = ["src/", "tests/"]
//! denyPaths = [".loop/"]
//!
//! [dependencies]
//! allowDependencyChanges = false
//! ```
//!
//! A `.json` file with the same shape is accepted as well.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::path_rules::default_dependency_manifests;
use crate::core::types::ConstraintPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyDocument {
    pub iteration: IterationLimits,
    #[serde(default)]
    pub scope: ScopeRules,
    pub dependencies: DependencyRules,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IterationLimits {
    pub max_files_changed: usize,
    pub max_lines_changed: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScopeRules {
    #[serde(default)]
    pub allow_paths: Vec<String>,
    #[serde(default)]
    pub deny_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DependencyRules {
    pub allow_dependency_changes: bool,
    /// Overrides the built-in list of manifest file names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifests: Option<Vec<String>>,
}

impl PolicyDocument {
    /// Validate entries and convert to the evaluator's flat policy.
    pub fn into_policy(self) -> Result<ConstraintPolicy> {
        let mut errors = Vec::new();
        check_entries("scope.allowPaths", &self.scope.allow_paths, &mut errors);
        check_entries("scope.denyPaths", &self.scope.deny_paths, &mut errors);
        if let Some(manifests) = &self.dependencies.manifests {
            check_entries("dependencies.manifests", manifests, &mut errors);
        }
        if !errors.is_empty() {
            return Err(anyhow!("invalid policy: {}", errors.join("; ")));
        }

        Ok(ConstraintPolicy {
            max_files_changed: self.iteration.max_files_changed,
            max_lines_changed: self.iteration.max_lines_changed,
            allow_paths: dedup_ordered(self.scope.allow_paths),
            deny_paths: dedup_ordered(self.scope.deny_paths),
            allow_dependency_changes: self.dependencies.allow_dependency_changes,
            dependency_manifests: self
                .dependencies
                .manifests
                .map(dedup_ordered)
                .unwrap_or_else(default_dependency_manifests),
        })
    }
}

/// Load and validate a policy document. The format follows the file extension.
pub fn load_policy(path: &Path) -> Result<ConstraintPolicy> {
    debug!(path = %path.display(), "loading constraint policy");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read policy {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let document = if is_json {
        parse_policy_json(&contents)
    } else {
        parse_policy_toml(&contents)
    }
    .with_context(|| format!("parse policy {}", path.display()))?;
    document.into_policy()
}

pub fn parse_policy_toml(contents: &str) -> Result<PolicyDocument> {
    toml::from_str(contents).context("parse policy toml")
}

pub fn parse_policy_json(contents: &str) -> Result<PolicyDocument> {
    serde_json::from_str(contents).context("parse policy json")
}

fn check_entries(field: &str, entries: &[String], errors: &mut Vec<String>) {
    for entry in entries {
        if entry.trim().is_empty() {
            errors.push(format!("{field} contains an empty entry"));
        } else if entry.starts_with('/') {
            errors.push(format!(
                "{field} entry '{entry}' must be repository-relative"
            ));
        }
    }
}

fn dedup_ordered(entries: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(entries.len());
    for entry in entries {
        if !out.contains(&entry) {
            out.push(entry);
        }
    }
    out
}
