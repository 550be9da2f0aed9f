//! Stable exit codes for loopguard CLI commands.

/// Command succeeded, the guard passed, or a run committed its story.
pub const OK: i32 = 0;
/// Missing/invalid documents, dirty worktree, commit failure, or other errors.
pub const INVALID: i32 = 1;

// `loopguard guard`: one code per violation, fixed by contract.
pub const TOO_MANY_FILES: i32 = 2;
pub const DENIED_PATH_MODIFIED: i32 = 3;
pub const PATH_OUTSIDE_ALLOWLIST: i32 = 4;
pub const DEPENDENCY_CHANGE_FORBIDDEN: i32 = 5;
pub const TOO_MANY_LINES_CHANGED: i32 = 6;

/// `loopguard run` stopped because the agent contract is paused.
pub const PAUSED: i32 = 7;
/// `loopguard run` or `loopguard select` found no `todo` story.
pub const COMPLETE: i32 = 8;
/// `loopguard run` recorded a failure (agent failure or guard violation).
pub const FAILURE_RECORDED: i32 = 9;
