//! Prompt rendering for the change agent.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::contract::AgentContract;
use crate::core::failure::FailureState;
use crate::core::stories::Story;
use crate::core::types::ConstraintPolicy;

const AGENT_TEMPLATE: &str = include_str!("prompts/agent.md");

#[derive(Debug, Serialize)]
struct StoryContext<'a> {
    id: &'a str,
    title: &'a str,
    acceptance: &'a [String],
    notes: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PolicyContext<'a> {
    max_files_changed: usize,
    max_lines_changed: u64,
    allow_paths: &'a [String],
    deny_paths: &'a [String],
    allow_dependency_changes: bool,
}

/// Everything the agent prompt is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub story: &'a Story,
    pub policy: &'a ConstraintPolicy,
    pub contract: &'a AgentContract,
    pub failure: &'a FailureState,
}

/// Render the agent prompt for the selected story.
///
/// The previous failure summary is included only while the failure counter is non-zero.
pub fn render_agent_prompt(inputs: &PromptInputs<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("agent", AGENT_TEMPLATE)
        .context("load agent prompt template")?;
    let template = env.get_template("agent").context("get agent template")?;

    let previous_failure = (inputs.failure.consecutive_failures > 0)
        .then_some(inputs.failure.last_failure_summary.trim())
        .filter(|summary| !summary.is_empty());

    let rendered = template
        .render(context! {
            story => StoryContext {
                id: &inputs.story.id,
                title: &inputs.story.title,
                acceptance: &inputs.story.acceptance,
                notes: inputs.story.notes.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            },
            policy => PolicyContext {
                max_files_changed: inputs.policy.max_files_changed,
                max_lines_changed: inputs.policy.max_lines_changed,
                allow_paths: &inputs.policy.allow_paths,
                deny_paths: &inputs.policy.deny_paths,
                allow_dependency_changes: inputs.policy.allow_dependency_changes,
            },
            require_tests => inputs.contract.require_tests,
            previous_failure => previous_failure,
        })
        .context("render agent prompt")?;
    debug!(bytes = rendered.len(), story_id = %inputs.story.id, "rendered agent prompt");
    Ok(rendered)
}
