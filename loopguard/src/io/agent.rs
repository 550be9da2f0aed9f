//! Change agent abstraction.
//!
//! The [`ChangeAgent`] trait decouples the loop controller from the actual
//! agent backend (a configured command line). Tests use scripted agents that
//! edit the working tree directly without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::{run_command_with_timeout, write_bounded_log};

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Repository root; the agent edits files here.
    pub workdir: PathBuf,
    pub run_ref: String,
    pub story_id: String,
    /// Rendered prompt fed to the agent.
    pub prompt: String,
    pub timeout: Duration,
    /// Truncate agent output logs beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Where the agent's stdout/stderr log is written.
    pub log_path: PathBuf,
}

/// What the agent reported. The produced change is observed from the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    Produced,
    Failed { summary: String },
}

pub trait ChangeAgent {
    fn invoke(&self, request: &AgentRequest) -> Result<AgentOutcome>;
}

/// Agent that spawns a configured command with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    command: Vec<String>,
}

impl CommandAgent {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(anyhow!("agent command must not be empty"));
        }
        Ok(Self { command })
    }
}

impl ChangeAgent for CommandAgent {
    #[instrument(skip_all, fields(story_id = %request.story_id, run_ref = %request.run_ref, timeout_secs = request.timeout.as_secs()))]
    fn invoke(&self, request: &AgentRequest) -> Result<AgentOutcome> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent command must not be empty"))?;
        info!(program = %program, "starting change agent");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&request.workdir)
            .env("LOOPGUARD_STORY_ID", &request.story_id)
            .env("LOOPGUARD_RUN_REF", &request.run_ref);

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run agent command '{program}'"))?;

        write_bounded_log(
            &request.log_path,
            &output.render_log("agent"),
            request.output_limit_bytes,
        )?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
            return Ok(AgentOutcome::Failed {
                summary: format!("agent timed out after {}s", request.timeout.as_secs()),
            });
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent exited unsuccessfully");
            let mut summary = match output.status.code() {
                Some(code) => format!("agent exited with status {code}"),
                None => "agent terminated by signal".to_string(),
            };
            if let Some(tail) = output.stderr_tail() {
                summary.push_str(": ");
                summary.push_str(&tail);
            }
            return Ok(AgentOutcome::Failed { summary });
        }

        debug!("agent completed successfully");
        Ok(AgentOutcome::Produced)
    }
}
