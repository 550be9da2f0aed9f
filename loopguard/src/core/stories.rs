//! Story selection and status lifecycle.
//!
//! Stories advance `todo -> doing -> done` and are never deleted. Selection is
//! the first `todo` story in stored order.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    Todo,
    Doing,
    Done,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Todo => "todo",
            StoryStatus::Doing => "doing",
            StoryStatus::Done => "done",
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    pub status: StoryStatus,
    #[serde(default)]
    pub acceptance: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition for story '{id}': {from} -> {to}")]
pub struct InvalidTransition {
    pub id: String,
    pub from: StoryStatus,
    pub to: StoryStatus,
}

/// First story with status `todo`, in stored order.
pub fn select_next(stories: &[Story]) -> Option<&Story> {
    stories
        .iter()
        .find(|story| story.status == StoryStatus::Todo)
}

/// Move `story` to `to`. Only `todo -> doing` and `doing -> done` are accepted.
pub fn transition(story: &mut Story, to: StoryStatus) -> Result<(), InvalidTransition> {
    let allowed = matches!(
        (story.status, to),
        (StoryStatus::Todo, StoryStatus::Doing) | (StoryStatus::Doing, StoryStatus::Done)
    );
    if !allowed {
        return Err(InvalidTransition {
            id: story.id.clone(),
            from: story.status,
            to,
        });
    }
    story.status = to;
    Ok(())
}

pub fn find_story_mut<'a>(stories: &'a mut [Story], id: &str) -> Option<&'a mut Story> {
    stories.iter_mut().find(|story| story.id == id)
}

/// Count stories per status as `(todo, doing, done)`.
pub fn status_counts(stories: &[Story]) -> (usize, usize, usize) {
    stories
        .iter()
        .fold((0, 0, 0), |(todo, doing, done), story| match story.status {
            StoryStatus::Todo => (todo + 1, doing, done),
            StoryStatus::Doing => (todo, doing + 1, done),
            StoryStatus::Done => (todo, doing, done + 1),
        })
}

/// Validate semantic invariants that the JSON schema cannot express.
///
/// Returns a list of stable error messages (empty on success).
pub fn validate_invariants(stories: &[Story]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = BTreeSet::new();
    for (index, story) in stories.iter().enumerate() {
        if story.id.trim().is_empty() {
            errors.push(format!("story[{index}] has an empty id"));
            continue;
        }
        if story.title.trim().is_empty() {
            errors.push(format!("story '{}' has an empty title", story.id));
        }
        if !seen.insert(story.id.as_str()) {
            errors.push(format!("duplicate story id '{}'", story.id));
        }
    }
    errors
}
