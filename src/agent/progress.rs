//! Cached project state for multi-session resumption.
//!
//! The remote issue tracker is the source of truth. The marker file is a
//! local cache written by the initialization workflow; this module only
//! reads it, and any problem reading it means "not initialized".

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::tracker::PROJECT_MARKER;

/// Contents of the marker file. All fields are required; a record missing
/// any of them is treated as corrupt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    pub initialized: bool,
    pub total_issues: u32,
    pub meta_issue_number: u64,
    pub repo_owner: String,
    pub repo_name: String,
}

impl ProjectState {
    /// `owner/name`
    pub fn repository(&self) -> String {
        format!("{}/{}", self.repo_owner, self.repo_name)
    }
}

pub fn marker_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_MARKER)
}

/// Reads the cached state. Missing, unreadable, truncated or otherwise
/// invalid files all yield `None`.
pub fn load(project_root: &Path) -> Option<ProjectState> {
    let path = marker_path(project_root);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No project state at {}", path.display());
            return None;
        }
        Err(e) => {
            warn!("Cannot read project state {}: {e}", path.display());
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(state) => Some(state),
        Err(e) => {
            // May be a write in progress from another session
            warn!("Ignoring invalid project state {}: {e}", path.display());
            None
        }
    }
}

/// True only for a valid record with `initialized: true`.
pub fn is_initialized(project_root: &Path) -> bool {
    load(project_root).is_some_and(|state| state.initialized)
}

/// Human-readable summary of the cached progress.
pub fn summary(project_root: &Path) -> String {
    match load(project_root) {
        None => "Progress: GitHub project not yet initialized".to_string(),
        Some(state) => format!(
            "GitHub Project Status:\n  \
             Repository: {}\n  \
             Initialized: {}\n  \
             Total issues created: {}\n  \
             META issue number: #{}\n  \
             (Check GitHub for current status:done/status:in-progress/status:todo counts)",
            state.repository(),
            if state.initialized { "yes" } else { "no" },
            state.total_issues,
            state.meta_issue_number,
        ),
    }
}
