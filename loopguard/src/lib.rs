//! Bounded, governed automation loop for code changes.
//!
//! Each run picks one story, hands it to an external change agent, checks the
//! resulting change against a declarative policy, and either commits it or
//! records a failure. Repeated failures pause the loop until a human resumes it.
//!
//! - **[`core`]**: Pure, deterministic logic (guard evaluation, failure tracking,
//!   story selection). No I/O.
//! - **[`io`]**: Side-effecting adapters (documents, git, agent process).
//!
//! Orchestration modules ([`run`], [`guard`], [`select`], [`status`]) wire core
//! logic to I/O and implement CLI commands.
//!
//! Runs against one repository must be serialized by the caller: each run reads
//! the state documents once and writes them once, with no locking.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod guard;
pub mod io;
pub mod logging;
pub mod run;
pub mod select;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
