//! Selection helper for `loopguard select`.

use std::path::Path;

use anyhow::Result;

use crate::core::stories::{Story, select_next};
use crate::error::LoopError;
use crate::io::init::LoopPaths;
use crate::io::story_store::load_stories;

/// Structured selection outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// No `todo` story remains.
    Complete,
    /// Next story a run would work on.
    Next { id: String, title: String },
}

/// Select the next story from an in-memory list.
pub fn select_story(stories: &[Story]) -> SelectOutcome {
    match select_next(stories) {
        Some(story) => SelectOutcome::Next {
            id: story.id.clone(),
            title: story.title.clone(),
        },
        None => SelectOutcome::Complete,
    }
}

/// Load stories from disk and select the next one.
pub fn select_from_root(root: &Path) -> Result<SelectOutcome> {
    let paths = LoopPaths::new(root);
    let stories = load_stories(&paths.stories_path)
        .map_err(|err| LoopError::config(&paths.stories_path, &err))?;
    Ok(select_story(&stories))
}
