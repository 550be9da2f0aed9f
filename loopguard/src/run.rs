//! Orchestration for a single `loopguard run`.
//!
//! One run loads every document once, works on at most one story, and writes
//! at most one checkpoint: the success checkpoint (stories + failure state) or
//! the failure checkpoint (failure state + contract). Agent edits are committed
//! only on success.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::core::contract::AgentContract;
use crate::core::failure::{FailureState, record_failure, record_success, should_pause};
use crate::core::guard::evaluate;
use crate::core::stories::{Story, StoryStatus, find_story_mut, select_next, transition};
use crate::core::types::{PolicyVerdict, ViolationCode};
use crate::error::LoopError;
use crate::exit_codes;
use crate::io::agent::{AgentOutcome, AgentRequest, ChangeAgent, CommandAgent};
use crate::io::config::load_config;
use crate::io::git::Git;
use crate::io::init::LoopPaths;
use crate::io::prompt::{PromptInputs, render_agent_prompt};
use crate::io::state_store::{Checkpoint, FsStateStore, LoadedState, StateStore};
use crate::io::workspace::{CommitScope, GitWorkspace, Snapshot, Workspace, commit_error};

/// States visited by the loop controller during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Selecting,
    Delegating,
    Evaluating,
    Committing,
    RecordingFailure,
    Paused,
    Done,
}

/// Why a run failed. Both kinds are recorded the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    Violation(ViolationCode),
    AgentFailure,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::Violation(code) => code.as_str(),
            FailureCause::AgentFailure => "AgentFailure",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way the run went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPath {
    /// The contract was paused; nothing was selected.
    Paused,
    /// No `todo` story remains.
    NoWork,
    /// The story passed the guard and was marked `done`.
    Committed { story_id: String, committed: bool },
    /// The agent failed or the guard rejected the change.
    FailureRecorded {
        story_id: String,
        cause: FailureCause,
        summary: String,
        paused_now: bool,
    },
}

/// Result of one run, including the values the next run will load.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_ref: String,
    pub trace: Vec<LoopPhase>,
    pub path: RunPath,
    pub verdict: Option<PolicyVerdict>,
    pub contract: AgentContract,
    /// Stories as seen at the end of the run. A `doing` story here is
    /// in-memory only; failed runs never persist it, so it stays `todo` on disk.
    pub stories: Vec<Story>,
    pub failure: FailureState,
}

impl RunReport {
    pub fn terminal(&self) -> LoopPhase {
        self.trace.last().copied().unwrap_or(LoopPhase::Idle)
    }

    pub fn exit_code(&self) -> i32 {
        match self.path {
            RunPath::Paused => exit_codes::PAUSED,
            RunPath::NoWork => exit_codes::COMPLETE,
            RunPath::Committed { .. } => exit_codes::OK,
            RunPath::FailureRecorded { .. } => exit_codes::FAILURE_RECORDED,
        }
    }
}

/// Per-run inputs supplied by the trigger.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_ref: String,
    pub now: DateTime<Utc>,
    pub workdir: PathBuf,
    pub agent_log_path: PathBuf,
    pub agent_timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Execute one loop controller run.
///
/// Guard violations and agent failures are recorded and returned as
/// [`RunPath::FailureRecorded`]. Only config, dirty-worktree, commit, and
/// infrastructure errors are returned as `Err`.
#[instrument(skip_all, fields(run_ref = %request.run_ref))]
pub fn run_once<S: StateStore, A: ChangeAgent, W: Workspace>(
    store: &S,
    agent: &A,
    workspace: &W,
    request: &RunRequest,
) -> Result<RunReport> {
    validate_run_ref(&request.run_ref)?;
    let mut trace = vec![LoopPhase::Idle];
    let LoadedState {
        contract,
        mut stories,
        failure,
        policy,
    } = store.load()?;

    if contract.paused {
        warn!("loop is paused; run `loopguard resume` after fixing the cause");
        trace.push(LoopPhase::Paused);
        return Ok(RunReport {
            run_ref: request.run_ref.clone(),
            trace,
            path: RunPath::Paused,
            verdict: None,
            contract,
            stories,
            failure,
        });
    }

    let Some(story_id) = select_next(&stories).map(|story| story.id.clone()) else {
        info!("no todo story remains");
        trace.push(LoopPhase::Done);
        return Ok(RunReport {
            run_ref: request.run_ref.clone(),
            trace,
            path: RunPath::NoWork,
            verdict: None,
            contract,
            stories,
            failure,
        });
    };

    workspace.ensure_clean()?;

    trace.push(LoopPhase::Selecting);
    let story = find_story_mut(&mut stories, &story_id)
        .ok_or_else(|| anyhow!("selected story '{story_id}' not found"))?;
    transition(story, StoryStatus::Doing)?;
    let story = story.clone();
    info!(story_id = %story.id, title = %story.title, "selected story");

    let snapshot = workspace.snapshot()?;
    trace.push(LoopPhase::Delegating);
    let prompt = render_agent_prompt(&PromptInputs {
        story: &story,
        policy: &policy,
        contract: &contract,
        failure: &failure,
    })?;
    let outcome = agent
        .invoke(&AgentRequest {
            workdir: request.workdir.clone(),
            run_ref: request.run_ref.clone(),
            story_id: story.id.clone(),
            prompt,
            timeout: request.agent_timeout,
            output_limit_bytes: request.output_limit_bytes,
            log_path: request.agent_log_path.clone(),
        })
        .unwrap_or_else(|err| {
            warn!(err = %format!("{err:#}"), "agent invocation errored");
            AgentOutcome::Failed {
                summary: format!("{err:#}"),
            }
        });

    let mut verdict = None;
    let failed = match outcome {
        AgentOutcome::Failed { summary } => Some((FailureCause::AgentFailure, summary)),
        AgentOutcome::Produced => match workspace.pending_change(&snapshot) {
            Err(err) => {
                warn!(err = %format!("{err:#}"), "cannot read agent change");
                Some((
                    FailureCause::AgentFailure,
                    format!("cannot read agent change: {err:#}"),
                ))
            }
            Ok(change) if change.is_empty() => Some((
                FailureCause::AgentFailure,
                "agent produced no changes".to_string(),
            )),
            Ok(change) => {
                trace.push(LoopPhase::Evaluating);
                let result = evaluate(&change, &policy);
                info!(
                    passed = result.passed,
                    files = change.file_count(),
                    lines = change.total_lines(),
                    message = %result.message,
                    "guard verdict"
                );
                let failed = result
                    .violation
                    .map(|code| (FailureCause::Violation(code), result.message.clone()));
                verdict = Some(result);
                failed
            }
        },
    };

    let finisher = Finisher {
        store,
        workspace,
        request,
        snapshot: &snapshot,
    };
    let decided = Decided {
        story_id: story.id,
        stories,
        failure,
        contract,
    };
    let (path, decided) = match failed {
        None => finisher.commit_success(&mut trace, decided)?,
        Some((cause, detail)) => finisher.record_failure(&mut trace, decided, cause, &detail)?,
    };
    trace.push(LoopPhase::Done);

    Ok(RunReport {
        run_ref: request.run_ref.clone(),
        trace,
        path,
        verdict,
        contract: decided.contract,
        stories: decided.stories,
        failure: decided.failure,
    })
}

/// Build the production ports from `.loop/` and run once in `root`.
pub fn run_from_root(root: &Path, run_ref: &str, now: DateTime<Utc>) -> Result<RunReport> {
    let paths = LoopPaths::new(root);
    let cfg = load_config(&paths.config_path)
        .map_err(|err| anyhow!(LoopError::config(&paths.config_path, &err)))?;
    let agent = CommandAgent::new(cfg.agent.command.clone())?;
    let workspace = GitWorkspace::new(
        Git::new(root),
        cfg.git.push.then(|| cfg.git.remote.clone()),
        cfg.git.discard_failed_changes,
    );
    let request = RunRequest {
        run_ref: run_ref.to_string(),
        now,
        workdir: root.to_path_buf(),
        agent_log_path: paths.run_dir(run_ref).join("agent.log"),
        agent_timeout: Duration::from_secs(cfg.agent.timeout_secs),
        output_limit_bytes: cfg.agent.output_limit_bytes,
    };
    let store = FsStateStore::new(paths);
    run_once(&store, &agent, &workspace, &request).context("loopguard run")
}

/// Run state carried into the success or failure checkpoint.
struct Decided {
    story_id: String,
    stories: Vec<Story>,
    failure: FailureState,
    contract: AgentContract,
}

struct Finisher<'a, S, W> {
    store: &'a S,
    workspace: &'a W,
    request: &'a RunRequest,
    snapshot: &'a Snapshot,
}

impl<S: StateStore, W: Workspace> Finisher<'_, S, W> {
    fn commit_success(
        &self,
        trace: &mut Vec<LoopPhase>,
        mut decided: Decided,
    ) -> Result<(RunPath, Decided)> {
        trace.push(LoopPhase::Committing);
        let story_id = decided.story_id.clone();
        let story = find_story_mut(&mut decided.stories, &story_id)
            .ok_or_else(|| anyhow!("story '{story_id}' disappeared during run"))?;
        transition(story, StoryStatus::Done)?;
        decided.failure = record_success(&decided.failure);

        self.store.persist(&Checkpoint::Success {
            stories: decided.stories.clone(),
            failure: decided.failure.clone(),
        })?;
        let message = format!(
            "chore(loop): run {} story {story_id} done",
            self.request.run_ref
        );
        let committed = self.commit_and_push(&CommitScope::All, &message)?;
        info!(story_id, committed, "story done");

        Ok((
            RunPath::Committed {
                story_id,
                committed,
            },
            decided,
        ))
    }

    fn record_failure(
        &self,
        trace: &mut Vec<LoopPhase>,
        mut decided: Decided,
        cause: FailureCause,
        detail: &str,
    ) -> Result<(RunPath, Decided)> {
        trace.push(LoopPhase::RecordingFailure);
        let summary = format!("{cause}: {detail}");
        warn!(story_id = %decided.story_id, code = %cause, %summary, "run failed");

        self.workspace.discard_pending(self.snapshot)?;
        decided.failure = record_failure(
            &decided.failure,
            &self.request.run_ref,
            &summary,
            self.request.now,
        );
        let paused_now = should_pause(&decided.failure, decided.contract.max_failure_retries);
        if paused_now {
            warn!(
                consecutive_failures = decided.failure.consecutive_failures,
                max_failure_retries = decided.contract.max_failure_retries,
                "failure threshold reached; pausing loop"
            );
            decided.contract = decided.contract.with_paused(true);
        }

        let written = self.store.persist(&Checkpoint::Failure {
            failure: decided.failure.clone(),
            contract: decided.contract,
        })?;
        let message = format!(
            "chore(loop): run {} story {} failed code={cause} failures={}",
            self.request.run_ref, decided.story_id, decided.failure.consecutive_failures
        );
        self.commit_and_push(&CommitScope::Paths(written), &message)?;

        Ok((
            RunPath::FailureRecorded {
                story_id: decided.story_id.clone(),
                cause,
                summary,
                paused_now,
            },
            decided,
        ))
    }

    fn commit_and_push(&self, scope: &CommitScope, message: &str) -> Result<bool> {
        let committed = self
            .workspace
            .commit(scope, message)
            .map_err(commit_error)?;
        if committed {
            self.workspace.push().map_err(commit_error)?;
        }
        Ok(committed)
    }
}

fn validate_run_ref(run_ref: &str) -> Result<()> {
    let valid = !run_ref.is_empty()
        && run_ref != "."
        && run_ref != ".."
        && run_ref
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(anyhow!(
            "invalid run ref '{run_ref}' (use letters, digits, '-', '_', '.')"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use chrono::TimeZone;

    use crate::core::types::{ChangeSet, ConstraintPolicy};
    use crate::test_support::{permissive_policy, story};

    struct MemoryStore {
        state: RefCell<LoadedState>,
        checkpoints: RefCell<Vec<Checkpoint>>,
    }

    impl MemoryStore {
        fn new(stories: Vec<Story>, contract: AgentContract, failure: FailureState) -> Self {
            Self::with_policy(stories, contract, failure, permissive_policy())
        }

        fn with_policy(
            stories: Vec<Story>,
            contract: AgentContract,
            failure: FailureState,
            policy: ConstraintPolicy,
        ) -> Self {
            Self {
                state: RefCell::new(LoadedState {
                    contract,
                    stories,
                    failure,
                    policy,
                }),
                checkpoints: RefCell::new(Vec::new()),
            }
        }
    }

    impl StateStore for MemoryStore {
        fn load(&self) -> Result<LoadedState> {
            Ok(self.state.borrow().clone())
        }

        fn persist(&self, checkpoint: &Checkpoint) -> Result<Vec<String>> {
            let mut state = self.state.borrow_mut();
            let written = match checkpoint {
                Checkpoint::Success { stories, failure } => {
                    state.stories = stories.clone();
                    state.failure = failure.clone();
                    vec![".loop/stories.json", ".loop/failure_state.json"]
                }
                Checkpoint::Failure { failure, contract } => {
                    state.failure = failure.clone();
                    state.contract = *contract;
                    vec![".loop/failure_state.json", ".loop/AGENT_CONTRACT.md"]
                }
            };
            self.checkpoints.borrow_mut().push(checkpoint.clone());
            Ok(written.into_iter().map(str::to_string).collect())
        }
    }

    struct QueuedAgent {
        outcomes: RefCell<Vec<Result<AgentOutcome>>>,
        calls: RefCell<Vec<String>>,
    }

    impl QueuedAgent {
        fn new(mut outcomes: Vec<Result<AgentOutcome>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: RefCell::new(outcomes),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChangeAgent for QueuedAgent {
        fn invoke(&self, request: &AgentRequest) -> Result<AgentOutcome> {
            self.calls.borrow_mut().push(request.story_id.clone());
            self.outcomes
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| Err(anyhow!("no scripted agent outcome left")))
        }
    }

    #[derive(Default)]
    struct FakeWorkspace {
        dirty: bool,
        pending: RefCell<ChangeSet>,
        discarded: RefCell<u32>,
        commits: RefCell<Vec<(CommitScope, String)>>,
        pushes: RefCell<u32>,
        fail_commit: bool,
        fail_change: bool,
    }

    impl FakeWorkspace {
        fn with_change(change: ChangeSet) -> Self {
            Self {
                pending: RefCell::new(change),
                ..Self::default()
            }
        }
    }

    impl Workspace for FakeWorkspace {
        fn ensure_clean(&self) -> Result<()> {
            if self.dirty {
                return Err(LoopError::DirtyWorktree(" M src/lib.rs".to_string()).into());
            }
            Ok(())
        }

        fn snapshot(&self) -> Result<Snapshot> {
            Ok(Snapshot {
                rev: "base".to_string(),
            })
        }

        fn pending_change(&self, _base: &Snapshot) -> Result<ChangeSet> {
            if self.fail_change {
                return Err(anyhow!("read /repo/link: No such file or directory"));
            }
            Ok(self.pending.borrow().clone())
        }

        fn discard_pending(&self, _base: &Snapshot) -> Result<()> {
            *self.discarded.borrow_mut() += 1;
            *self.pending.borrow_mut() = ChangeSet::new();
            Ok(())
        }

        fn commit(&self, scope: &CommitScope, message: &str) -> Result<bool> {
            if self.fail_commit {
                return Err(anyhow!("remote rejected"));
            }
            self.commits
                .borrow_mut()
                .push((scope.clone(), message.to_string()));
            Ok(true)
        }

        fn push(&self) -> Result<()> {
            *self.pushes.borrow_mut() += 1;
            Ok(())
        }
    }

    fn request(run_ref: &str) -> RunRequest {
        RunRequest {
            run_ref: run_ref.to_string(),
            now: Utc
                .with_ymd_and_hms(2026, 3, 1, 12, 30, 0)
                .single()
                .expect("valid timestamp"),
            workdir: PathBuf::from("/repo"),
            agent_log_path: PathBuf::from("/repo/.loop/runs/r/agent.log"),
            agent_timeout: Duration::from_secs(60),
            output_limit_bytes: 1_000,
        }
    }

    fn small_change() -> ChangeSet {
        [("src/a.rs", 10, 2), ("src/b.rs", 5, 0)]
            .into_iter()
            .collect()
    }

    #[test]
    fn successful_run_marks_story_done_and_commits_everything() {
        let store = MemoryStore::new(
            vec![story("s1", StoryStatus::Done), story("s2", StoryStatus::Todo)],
            AgentContract::default(),
            FailureState {
                consecutive_failures: 2,
                last_failure_summary: "AgentFailure: boom".to_string(),
                last_failure_run_ref: "r0".to_string(),
                last_failure_at: "2026-02-28T00:00:00Z".to_string(),
            },
        );
        let agent = QueuedAgent::new(vec![Ok(AgentOutcome::Produced)]);
        let workspace = FakeWorkspace::with_change(small_change());

        let report = run_once(&store, &agent, &workspace, &request("r1")).expect("run");

        assert_eq!(
            report.trace,
            vec![
                LoopPhase::Idle,
                LoopPhase::Selecting,
                LoopPhase::Delegating,
                LoopPhase::Evaluating,
                LoopPhase::Committing,
                LoopPhase::Done,
            ]
        );
        assert_eq!(
            report.path,
            RunPath::Committed {
                story_id: "s2".to_string(),
                committed: true
            }
        );
        assert_eq!(report.exit_code(), exit_codes::OK);
        assert!(report.verdict.as_ref().is_some_and(|v| v.passed));
        assert_eq!(report.stories[1].status, StoryStatus::Done);
        assert_eq!(report.failure.consecutive_failures, 0);
        assert_eq!(report.failure.last_failure_summary, "AgentFailure: boom");

        let commits = workspace.commits.borrow();
        assert_eq!(
            *commits,
            vec![(
                CommitScope::All,
                "chore(loop): run r1 story s2 done".to_string()
            )]
        );
        assert_eq!(*workspace.pushes.borrow(), 1);
        assert_eq!(*workspace.discarded.borrow(), 0);
        assert_eq!(store.checkpoints.borrow().len(), 1);
    }

    #[test]
    fn unreadable_change_is_recorded_as_agent_failure() {
        let store = MemoryStore::new(
            vec![story("s1", StoryStatus::Todo)],
            AgentContract::default(),
            FailureState::default(),
        );
        let agent = QueuedAgent::new(vec![Ok(AgentOutcome::Produced)]);
        let workspace = FakeWorkspace {
            fail_change: true,
            ..FakeWorkspace::default()
        };

        let report = run_once(&store, &agent, &workspace, &request("r1")).expect("run");

        let RunPath::FailureRecorded { cause, summary, .. } = &report.path else {
            panic!("expected failure, got {:?}", report.path);
        };
        assert_eq!(*cause, FailureCause::AgentFailure);
        assert!(summary.contains("cannot read agent change"), "{summary}");
        assert!(!report.trace.contains(&LoopPhase::Evaluating));
        assert!(report.verdict.is_none());
        assert_eq!(*workspace.discarded.borrow(), 1);
        assert_eq!(store.state.borrow().failure.consecutive_failures, 1);
        assert_eq!(workspace.commits.borrow().len(), 1);
    }

    #[test]
    fn guard_violation_records_failure_without_touching_stories() {
        let mut policy = permissive_policy();
        policy.max_files_changed = 1;
        let store = MemoryStore::with_policy(
            vec![story("s1", StoryStatus::Todo)],
            AgentContract::default(),
            FailureState::default(),
            policy,
        );
        let agent = QueuedAgent::new(vec![Ok(AgentOutcome::Produced)]);
        let workspace = FakeWorkspace::with_change(small_change());

        let report = run_once(&store, &agent, &workspace, &request("r2")).expect("run");

        assert_eq!(report.terminal(), LoopPhase::Done);
        assert!(report.trace.contains(&LoopPhase::RecordingFailure));
        assert!(!report.trace.contains(&LoopPhase::Committing));
        let RunPath::FailureRecorded {
            cause,
            summary,
            paused_now,
            ..
        } = &report.path
        else {
            panic!("expected failure, got {:?}", report.path);
        };
        assert_eq!(*cause, FailureCause::Violation(ViolationCode::TooManyFiles));
        assert_eq!(summary, "TooManyFiles: too many files changed: 2 > 1");
        assert!(!paused_now);
        assert_eq!(report.exit_code(), exit_codes::FAILURE_RECORDED);
        assert_eq!(report.failure.consecutive_failures, 1);
        assert_eq!(report.failure.last_failure_run_ref, "r2");
        assert_eq!(report.failure.last_failure_at, "2026-03-01T12:30:00Z");
        assert_eq!(report.stories[0].status, StoryStatus::Doing);

        assert_eq!(*workspace.discarded.borrow(), 1);
        let persisted = store.state.borrow();
        assert_eq!(persisted.stories[0].status, StoryStatus::Todo);
        assert_eq!(persisted.failure.consecutive_failures, 1);
        let commits = workspace.commits.borrow();
        assert_eq!(
            *commits,
            vec![(
                CommitScope::Paths(vec![
                    ".loop/failure_state.json".to_string(),
                    ".loop/AGENT_CONTRACT.md".to_string()
                ]),
                "chore(loop): run r2 story s1 failed code=TooManyFiles failures=1".to_string()
            )]
        );
    }

    #[test]
    fn agent_errors_and_empty_changes_are_agent_failures() {
        let store = MemoryStore::new(
            vec![story("s1", StoryStatus::Todo)],
            AgentContract::default(),
            FailureState::default(),
        );
        let agent = QueuedAgent::new(vec![
            Err(anyhow!("spawn agent: not found")),
            Ok(AgentOutcome::Produced),
            Ok(AgentOutcome::Failed {
                summary: "agent exited with status 2".to_string(),
            }),
        ]);
        let workspace = FakeWorkspace::default();

        let mut summaries = Vec::new();
        for run_ref in ["r1", "r2", "r3"] {
            let report = run_once(&store, &agent, &workspace, &request(run_ref)).expect("run");
            let RunPath::FailureRecorded { cause, summary, .. } = report.path else {
                panic!("expected failure");
            };
            assert_eq!(cause, FailureCause::AgentFailure);
            assert!(!report.trace.contains(&LoopPhase::Evaluating));
            summaries.push(summary);
        }

        assert_eq!(
            summaries,
            vec![
                "AgentFailure: spawn agent: not found",
                "AgentFailure: agent produced no changes",
                "AgentFailure: agent exited with status 2",
            ]
        );
        // The third failure reaches the default retry limit of 3.
        let persisted = store.state.borrow();
        assert_eq!(persisted.failure.consecutive_failures, 3);
        assert!(persisted.contract.paused);
        assert_eq!(*agent.calls.borrow(), vec!["s1", "s1", "s1"]);
    }

    #[test]
    fn crossing_the_retry_threshold_pauses_and_later_runs_stop_early() {
        let contract = AgentContract {
            max_failure_retries: 5,
            ..AgentContract::default()
        };
        let failure = FailureState {
            consecutive_failures: 4,
            ..FailureState::default()
        };
        let store = MemoryStore::new(vec![story("s1", StoryStatus::Todo)], contract, failure);
        let agent = QueuedAgent::new(vec![Ok(AgentOutcome::Failed {
            summary: "timed out".to_string(),
        })]);
        let workspace = FakeWorkspace::default();

        let report = run_once(&store, &agent, &workspace, &request("r5")).expect("run");
        assert!(matches!(
            report.path,
            RunPath::FailureRecorded {
                paused_now: true,
                ..
            }
        ));
        assert_eq!(report.failure.consecutive_failures, 5);
        assert!(report.contract.paused);

        let report = run_once(&store, &agent, &workspace, &request("r6")).expect("run");
        assert_eq!(report.trace, vec![LoopPhase::Idle, LoopPhase::Paused]);
        assert_eq!(report.path, RunPath::Paused);
        assert_eq!(report.exit_code(), exit_codes::PAUSED);
        assert_eq!(agent.calls.borrow().len(), 1);

        store.state.borrow_mut().contract.paused = false;
        let report = run_once(&store, &agent, &workspace, &request("r7")).expect("run");
        assert_ne!(report.path, RunPath::Paused);
        assert_eq!(agent.calls.borrow().len(), 2);
    }

    #[test]
    fn all_done_reaches_done_without_mutation() {
        let stories = vec![story("s1", StoryStatus::Done), story("s2", StoryStatus::Done)];
        let store = MemoryStore::new(
            stories.clone(),
            AgentContract::default(),
            FailureState::default(),
        );
        let agent = QueuedAgent::new(Vec::new());
        let workspace = FakeWorkspace {
            dirty: true,
            ..FakeWorkspace::default()
        };

        let report = run_once(&store, &agent, &workspace, &request("r1")).expect("run");

        assert_eq!(report.trace, vec![LoopPhase::Idle, LoopPhase::Done]);
        assert_eq!(report.path, RunPath::NoWork);
        assert_eq!(report.exit_code(), exit_codes::COMPLETE);
        assert_eq!(report.stories, stories);
        assert!(store.checkpoints.borrow().is_empty());
        assert!(workspace.commits.borrow().is_empty());
        assert!(agent.calls.borrow().is_empty());
    }

    #[test]
    fn dirty_worktree_is_fatal_before_any_mutation() {
        let store = MemoryStore::new(
            vec![story("s1", StoryStatus::Todo)],
            AgentContract::default(),
            FailureState::default(),
        );
        let agent = QueuedAgent::new(Vec::new());
        let workspace = FakeWorkspace {
            dirty: true,
            ..FakeWorkspace::default()
        };

        let err = run_once(&store, &agent, &workspace, &request("r1")).expect_err("dirty");

        assert!(matches!(
            err.downcast_ref::<LoopError>(),
            Some(LoopError::DirtyWorktree(_))
        ));
        assert!(store.checkpoints.borrow().is_empty());
        assert!(agent.calls.borrow().is_empty());
    }

    #[test]
    fn commit_failure_surfaces_after_state_is_persisted() {
        let store = MemoryStore::new(
            vec![story("s1", StoryStatus::Todo)],
            AgentContract::default(),
            FailureState::default(),
        );
        let agent = QueuedAgent::new(vec![Ok(AgentOutcome::Produced)]);
        let workspace = FakeWorkspace {
            fail_commit: true,
            ..FakeWorkspace::with_change(small_change())
        };

        let err = run_once(&store, &agent, &workspace, &request("r1")).expect_err("commit");

        assert!(matches!(
            err.downcast_ref::<LoopError>(),
            Some(LoopError::Commit(_))
        ));
        assert_eq!(store.state.borrow().stories[0].status, StoryStatus::Done);
    }

    #[test]
    fn rejects_run_refs_that_are_not_path_safe() {
        let store = MemoryStore::new(Vec::new(), AgentContract::default(), FailureState::default());
        let agent = QueuedAgent::new(Vec::new());
        let workspace = FakeWorkspace::default();
        for bad in ["", "..", "a/b", "run 1"] {
            assert!(run_once(&store, &agent, &workspace, &request(bad)).is_err());
        }
        assert!(run_once(&store, &agent, &workspace, &request("ci-42.1")).is_ok());
    }
}
