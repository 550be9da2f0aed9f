//! Declarative guard evaluation of a pending change.
//!
//! Checks run in a fixed order and the first failing check decides the
//! verdict. Later checks are not consulted for the primary result, so every
//! evaluation yields at most one [`ViolationCode`]. [`suppressed_violations`]
//! exposes the remaining failures for verbose logging only.

use crate::core::path_rules::{is_dependency_manifest, matches_any};
use crate::core::types::{ChangeSet, ConstraintPolicy, PolicyVerdict, ViolationCode};

type Check = fn(&ChangeSet, &ConstraintPolicy) -> Option<PolicyVerdict>;

/// Evaluation order. Do not reorder: consumers key off the first violation.
const CHECKS: [Check; 5] = [
    check_file_count,
    check_denied_paths,
    check_allowlist,
    check_dependency_changes,
    check_line_count,
];

/// Evaluate `change` against `policy`, short-circuiting on the first violation.
pub fn evaluate(change: &ChangeSet, policy: &ConstraintPolicy) -> PolicyVerdict {
    for check in CHECKS {
        if let Some(verdict) = check(change, policy) {
            return verdict;
        }
    }
    PolicyVerdict::pass(format!(
        "policy passed: {} files, {} lines changed",
        change.file_count(),
        change.total_lines()
    ))
}

/// Violations after the first one, in check order.
///
/// Never affects the primary verdict; intended for `--verbose` diagnostics.
pub fn suppressed_violations(change: &ChangeSet, policy: &ConstraintPolicy) -> Vec<PolicyVerdict> {
    CHECKS
        .iter()
        .filter_map(|check| check(change, policy))
        .skip(1)
        .collect()
}

fn check_file_count(change: &ChangeSet, policy: &ConstraintPolicy) -> Option<PolicyVerdict> {
    let observed = change.file_count();
    if observed <= policy.max_files_changed {
        return None;
    }
    Some(PolicyVerdict::violation(
        ViolationCode::TooManyFiles,
        format!(
            "too many files changed: {observed} > {}",
            policy.max_files_changed
        ),
    ))
}

fn check_denied_paths(change: &ChangeSet, policy: &ConstraintPolicy) -> Option<PolicyVerdict> {
    let offending: Vec<&str> = change
        .files()
        .filter(|path| matches_any(&policy.deny_paths, path))
        .collect();
    if offending.is_empty() {
        return None;
    }
    Some(PolicyVerdict::violation(
        ViolationCode::DeniedPathModified,
        format!("denied path modified: {}", offending.join(", ")),
    ))
}

fn check_allowlist(change: &ChangeSet, policy: &ConstraintPolicy) -> Option<PolicyVerdict> {
    // Empty allowlist means every path is allowed.
    if policy.allow_paths.is_empty() {
        return None;
    }
    let outside: Vec<&str> = change
        .files()
        .filter(|path| !matches_any(&policy.allow_paths, path))
        .collect();
    if outside.is_empty() {
        return None;
    }
    Some(PolicyVerdict::violation(
        ViolationCode::PathOutsideAllowlist,
        format!("path outside allowlist: {}", outside.join(", ")),
    ))
}

fn check_dependency_changes(
    change: &ChangeSet,
    policy: &ConstraintPolicy,
) -> Option<PolicyVerdict> {
    if policy.allow_dependency_changes {
        return None;
    }
    let manifests: Vec<&str> = change
        .files()
        .filter(|path| is_dependency_manifest(path, &policy.dependency_manifests))
        .collect();
    if manifests.is_empty() {
        return None;
    }
    Some(PolicyVerdict::violation(
        ViolationCode::DependencyChangeForbidden,
        format!("dependency change forbidden: {}", manifests.join(", ")),
    ))
}

fn check_line_count(change: &ChangeSet, policy: &ConstraintPolicy) -> Option<PolicyVerdict> {
    let observed = change.total_lines();
    if observed <= policy.max_lines_changed {
        return None;
    }
    Some(PolicyVerdict::violation(
        ViolationCode::TooManyLinesChanged,
        format!(
            "too many lines changed: {observed} > {}",
            policy.max_lines_changed
        ),
    ))
}
