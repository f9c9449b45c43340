//! Issue-tracker conventions shared with the remote initialization
//! workflow: label set, META issue title and the local marker file.

use serde::Serialize;

/// Local marker file caching the remote project state.
pub const PROJECT_MARKER: &str = ".github_project.json";

/// Title of the issue used for progress tracking and session handoff.
pub const META_ISSUE_TITLE: &str = "[META] Project Progress Tracker";

/// Number of feature issues the initializer creates by default.
pub const DEFAULT_ISSUE_COUNT: u32 = 50;

pub const LABEL_STATUS_TODO: &str = "status:todo";
pub const LABEL_STATUS_IN_PROGRESS: &str = "status:in-progress";
pub const LABEL_STATUS_DONE: &str = "status:done";
pub const LABEL_META: &str = "meta";

/// (name, color, description)
const LABELS: &[(&str, &str, &str)] = &[
    // Status
    (LABEL_STATUS_TODO, "0052CC", "Work not yet started"),
    (LABEL_STATUS_IN_PROGRESS, "FFA500", "Currently being worked on"),
    (LABEL_STATUS_DONE, "00B300", "Completed and verified"),
    // Priority (1 = urgent … 4 = low)
    ("priority:urgent", "D73A4A", "Priority 1 - Foundational/urgent"),
    ("priority:high", "FF6B6B", "Priority 2 - High importance"),
    ("priority:medium", "FFA500", "Priority 3 - Medium importance"),
    ("priority:low", "FBCA04", "Priority 4 - Low priority/polish"),
    // Category
    ("category:functional", "1D76DB", "Functional feature"),
    ("category:style", "C5DEF5", "UI/styling feature"),
    ("category:infrastructure", "5319E7", "Infrastructure/tooling"),
    (LABEL_META, "E99695", "Meta/tracking issue"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    pub name: &'static str,
    pub color: &'static str,
    pub description: &'static str,
}

/// Labels the initializer creates, in creation order.
pub fn labels() -> Vec<Label> {
    LABELS
        .iter()
        .map(|&(name, color, description)| Label {
            name,
            color,
            description,
        })
        .collect()
}

/// Everything the initialization workflow needs to agree on.
#[derive(Debug, Clone, Serialize)]
pub struct Conventions {
    pub marker_file: &'static str,
    pub meta_issue_title: &'static str,
    pub default_issue_count: u32,
    pub labels: Vec<Label>,
}

impl Conventions {
    pub fn current() -> Self {
        Self {
            marker_file: PROJECT_MARKER,
            meta_issue_title: META_ISSUE_TITLE,
            default_issue_count: DEFAULT_ISSUE_COUNT,
            labels: labels(),
        }
    }
}

/// Paragraph appended to the session's system directive.
pub fn conventions() -> String {
    format!(
        "Track every feature as a GitHub issue. Move issues through the labels \
         '{LABEL_STATUS_TODO}', '{LABEL_STATUS_IN_PROGRESS}' and '{LABEL_STATUS_DONE}', \
         and record session progress as comments on the issue titled '{META_ISSUE_TITLE}' \
         (label '{LABEL_META}')."
    )
}
