//! Access scope: the declarative permission and sandbox settings the host
//! runtime enforces for every file and tool operation.
//!
//! This layer bounds *where* the agent may act. The shell is granted
//! broadly here (`Bash(*)`) because *what* it may run is decided by the
//! command validator in `crate::hook`. The two layers never call each other.
//!
//! Every filesystem grant is a pattern relative to the project root
//! (`./**`); the host runs the session with the project root as its working
//! directory, so nothing outside it is reachable through a grant.

use std::ffi::OsString;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::agent::tools::ToolManifest;
use crate::hook::BASH_TOOL;

/// Settings artifact written under the project root.
pub const SETTINGS_FILE: &str = ".claude_settings.json";

/// Pattern covering the project root and everything below it.
pub const PROJECT_PATTERN: &str = "./**";

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("invalid grant '{0}'")]
    InvalidGrant(String),
    #[error("grant {tool}({pattern}) is not anchored at the project root")]
    Unanchored { tool: String, pattern: String },
    #[error("cannot write settings to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxSettings {
    pub enabled: bool,
    /// Shell commands run without a prompt when the OS sandbox is active.
    pub auto_allow_bash_if_sandboxed: bool,
}

/// Approval mode for operations covered by a grant, chosen with
/// `[session] permission_mode`. There is no variant that bypasses permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    Plan,
}

/// One capability grant, in the host's string form:
/// `Read(./**)` for a scoped grant, `mcp__github__get_issue` for a whole tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Grant {
    Scoped { tool: String, pattern: String },
    Tool(String),
}

impl Grant {
    pub fn scoped(tool: &str, pattern: &str) -> Self {
        Grant::Scoped {
            tool: tool.to_string(),
            pattern: pattern.to_string(),
        }
    }

    pub fn tool(name: &str) -> Self {
        Grant::Tool(name.to_string())
    }

    /// Scoped grants other than the shell's carry a filesystem path pattern.
    pub fn path_pattern(&self) -> Option<&str> {
        match self {
            Grant::Scoped { tool, pattern } if tool != BASH_TOOL => Some(pattern),
            _ => None,
        }
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::Scoped { tool, pattern } => write!(f, "{tool}({pattern})"),
            Grant::Tool(name) => f.write_str(name),
        }
    }
}

fn valid_tool_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FromStr for Grant {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScopeError::InvalidGrant(s.to_string());
        match s.split_once('(') {
            Some((tool, rest)) => {
                let pattern = rest.strip_suffix(')').ok_or_else(invalid)?;
                if !valid_tool_name(tool) || pattern.is_empty() {
                    return Err(invalid());
                }
                Ok(Grant::scoped(tool, pattern))
            }
            None if valid_tool_name(s) => Ok(Grant::tool(s)),
            None => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Grant {
    type Error = ScopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Grant> for String {
    fn from(grant: Grant) -> Self {
        grant.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub default_mode: PermissionMode,
    /// Ordered grant list.
    pub allow: Vec<Grant>,
}

/// The full settings artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    pub sandbox: SandboxSettings,
    pub permissions: Permissions,
}

/// True if `pattern` is a `./`-relative pattern that cannot leave the root.
fn is_anchored(pattern: &str) -> bool {
    let Some(rest) = pattern.strip_prefix("./") else {
        return false;
    };
    let path = Path::new(rest);
    !path.is_absolute()
        && !rest.starts_with('~')
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Builds the access scope for a session rooted at `project_root`.
///
/// File tools get a project-relative grant, the shell gets `Bash(*)` and
/// every external tool is granted by name.
pub fn build(project_root: &Path, manifest: &ToolManifest) -> AccessScope {
    let mut allow: Vec<Grant> = manifest
        .file_tools()
        .map(|tool| Grant::scoped(tool, PROJECT_PATTERN))
        .collect();
    if manifest.has_shell() {
        allow.push(Grant::scoped(BASH_TOOL, "*"));
    }
    allow.extend(manifest.external_tools().map(Grant::tool));

    debug!(
        "Built access scope for {} with {} grants",
        project_root.display(),
        allow.len()
    );

    AccessScope {
        sandbox: SandboxSettings {
            enabled: true,
            auto_allow_bash_if_sandboxed: true,
        },
        permissions: Permissions {
            default_mode: PermissionMode::AcceptEdits,
            allow,
        },
    }
}

impl AccessScope {
    /// Filesystem path patterns, in grant order.
    pub fn path_patterns(&self) -> impl Iterator<Item = &str> {
        self.permissions.allow.iter().filter_map(Grant::path_pattern)
    }

    /// Checks that every filesystem grant stays under the project root.
    pub fn check_anchored(&self) -> Result<(), ScopeError> {
        for grant in &self.permissions.allow {
            if let (Some(pattern), Grant::Scoped { tool, .. }) = (grant.path_pattern(), grant) {
                if !is_anchored(pattern) {
                    return Err(ScopeError::Unanchored {
                        tool: tool.clone(),
                        pattern: pattern.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Path of the settings artifact for a project.
pub fn settings_path(project_root: &Path) -> PathBuf {
    project_root.join(SETTINGS_FILE)
}

/// Writes the scope to `destination`, replacing any previous artifact.
///
/// Parent directories are created as needed. The file is written to a
/// sibling temporary file first and renamed into place, so readers never
/// see a partial artifact.
pub fn persist(scope: &AccessScope, destination: &Path) -> Result<(), ScopeError> {
    scope.check_anchored()?;

    let io_err = |source| ScopeError::Io {
        path: destination.to_path_buf(),
        source,
    };

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut json = serde_json::to_string_pretty(scope)?;
    json.push('\n');

    let mut tmp_name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from(SETTINGS_FILE));
    tmp_name.push(".tmp");
    let tmp = destination.with_file_name(tmp_name);

    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, destination).map_err(io_err)?;

    info!("Wrote access scope settings to {}", destination.display());
    Ok(())
}
