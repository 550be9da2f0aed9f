//! Guard command: evaluate the pending working-tree change against a policy.

use std::path::Path;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::guard::{evaluate, suppressed_violations};
use crate::core::types::PolicyVerdict;
use crate::error::LoopError;
use crate::io::git::Git;
use crate::io::policy_store::load_policy;

/// Evaluate the change between `HEAD` and the working tree in `root`.
///
/// With `verbose`, every check that also failed after the first is logged.
/// The returned verdict is the same either way.
#[instrument(skip_all, fields(policy = %policy_path.display(), verbose))]
pub fn run_guard(root: &Path, policy_path: &Path, verbose: bool) -> Result<PolicyVerdict> {
    let policy =
        load_policy(policy_path).map_err(|err| LoopError::config(policy_path, &err))?;
    let change = Git::new(root).change_since("HEAD")?;
    let verdict = evaluate(&change, &policy);
    info!(
        passed = verdict.passed,
        files = change.file_count(),
        lines = change.total_lines(),
        "guard verdict"
    );
    if verbose {
        for suppressed in suppressed_violations(&change, &policy) {
            warn!(suppressed = %suppressed.summary(), "suppressed guard violation");
        }
    }
    Ok(verdict)
}
