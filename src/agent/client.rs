//! Session client assembly.
//!
//! Produces the client descriptor the host agent runtime is started with.
//! Security is layered:
//!
//! 1. Sandbox: OS-level isolation of shell commands.
//! 2. Permissions: file operations restricted to the project directory.
//! 3. Hook: every shell command validated against the allowlist policy.
//!
//! Credentials are checked before anything touches the filesystem, and no
//! descriptor is returned unless the settings artifact was written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::tools::{McpServer, ToolManifest};
use crate::config::SessionConfig;
use crate::hook::BASH_TOOL;
use crate::sandbox::{self, ScopeError};
use crate::tracker;

pub const OAUTH_TOKEN_VAR: &str = "CLAUDE_CODE_OAUTH_TOKEN";
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";

const OAUTH_TOKEN_HINT: &str =
    "Run 'claude setup-token' after installing the Claude Code CLI.";
const GITHUB_TOKEN_HINT: &str = "Get your token from: https://github.com/settings/tokens\n\
     Create a Personal Access Token (classic) with scopes:\n  \
     - repo (Full control of private repositories)\n  \
     - project (Full control of projects)";

/// Hook event the validator is registered for.
pub const PRE_TOOL_USE: &str = "PreToolUse";

const REDACTED: &str = "***";

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("{var} environment variable not set.\n{hint}")]
    MissingCredential {
        var: &'static str,
        hint: &'static str,
    },
    #[error("hook config {} must be an absolute path", .0.display())]
    RelativeConfig(PathBuf),
    #[error(
        "hook config {} lies inside project {}; the agent could rewrite its own policy",
        config.display(),
        project.display()
    )]
    ConfigInProject { config: PathBuf, project: PathBuf },
    #[error("cannot prepare project directory {}: {source}", path.display())]
    ProjectDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Scope(#[from] ScopeError),
}

/// Tokens required before a session can start.
#[derive(Clone)]
pub struct Credentials {
    pub oauth_token: String,
    pub github_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("oauth_token", &REDACTED)
            .field("github_token", &REDACTED)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, SetupError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Resolves both tokens through `lookup`. Blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SetupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |var: &'static str, hint: &'static str| {
            lookup(var)
                .filter(|value| !value.trim().is_empty())
                .ok_or(SetupError::MissingCredential { var, hint })
        };

        Ok(Self {
            oauth_token: require(OAUTH_TOKEN_VAR, OAUTH_TOKEN_HINT)?,
            github_token: require(GITHUB_TOKEN_VAR, GITHUB_TOKEN_HINT)?,
        })
    }
}

/// Hooks registered for one tool-name matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookMatcher {
    pub matcher: String,
    /// Commands the host runs for each matching tool call.
    pub hooks: Vec<String>,
}

/// Everything the host runtime needs to start a session.
#[derive(Debug, Clone, Serialize)]
pub struct ClientDescriptor {
    pub model: String,
    pub system_prompt: String,
    pub allowed_tools: Vec<String>,
    pub mcp_servers: BTreeMap<String, McpServer>,
    /// Hook event → matchers
    pub hooks: BTreeMap<String, Vec<HookMatcher>>,
    pub max_turns: u32,
    /// Absolute project directory; the session's working directory.
    pub cwd: PathBuf,
    /// Absolute path of the settings artifact.
    pub settings: PathBuf,
    /// Environment for the runtime process.
    pub env: BTreeMap<String, String>,
}

impl ClientDescriptor {
    /// Copy with every credential value masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for value in copy.env.values_mut() {
            *value = REDACTED.to_string();
        }
        for server in copy.mcp_servers.values_mut() {
            for value in server.env.values_mut() {
                *value = REDACTED.to_string();
            }
        }
        copy
    }
}

/// Shell command line the host runs for the pre-execution hook.
pub fn hook_command(executable: &Path, config: Option<&Path>) -> String {
    let mut parts = vec![executable.display().to_string(), "hook".to_string()];
    if let Some(config) = config {
        parts.push("--config".to_string());
        parts.push(config.display().to_string());
    }
    shell_words::join(parts)
}

/// Builds the client descriptor for a session in `project_dir`.
///
/// Creates the project directory if needed and writes the settings
/// artifact, replacing any previous one. The hook runs `executable` with
/// `config`, which must be absolute and outside the project: the agent can
/// write anywhere under the project root.
pub fn assemble(
    project_dir: &Path,
    session: &SessionConfig,
    credentials: &Credentials,
    executable: &Path,
    config: Option<&Path>,
) -> Result<ClientDescriptor, SetupError> {
    if let Some(config) = config.filter(|c| !c.is_absolute()) {
        return Err(SetupError::RelativeConfig(config.to_path_buf()));
    }

    let dir_err = |source| SetupError::ProjectDir {
        path: project_dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(project_dir).map_err(dir_err)?;
    let project_dir = std::fs::canonicalize(project_dir).map_err(dir_err)?;

    if let Some(config) = config.filter(|c| c.starts_with(&project_dir)) {
        return Err(SetupError::ConfigInProject {
            config: config.to_path_buf(),
            project: project_dir,
        });
    }

    let manifest = ToolManifest::standard(&credentials.github_token);
    let mut scope = sandbox::build(&project_dir, &manifest);
    scope.permissions.default_mode = session.permission_mode;
    let settings = sandbox::settings_path(&project_dir);
    sandbox::persist(&scope, &settings)?;

    info!("Created security settings at {}", settings.display());
    info!("  - Sandbox enabled (OS-level bash isolation)");
    info!("  - Filesystem restricted to: {}", project_dir.display());
    info!(
        "  - File grants: {}",
        scope.path_patterns().collect::<Vec<_>>().join(", ")
    );
    match config {
        Some(config) => info!(
            "  - Bash commands restricted to allowlist (pre-execution hook, config {})",
            config.display()
        ),
        None => info!("  - Bash commands restricted to built-in allowlist (pre-execution hook)"),
    }
    info!(
        "  - MCP servers: {}",
        manifest
            .external
            .iter()
            .map(|set| set.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let hooks = BTreeMap::from([(
        PRE_TOOL_USE.to_string(),
        vec![HookMatcher {
            matcher: BASH_TOOL.to_string(),
            hooks: vec![hook_command(executable, config)],
        }],
    )]);

    Ok(ClientDescriptor {
        model: session.model.clone(),
        system_prompt: format!("{}\n\n{}", session.system_prompt.trim(), tracker::conventions()),
        allowed_tools: manifest.allowed_tools(),
        mcp_servers: manifest.servers(),
        hooks,
        max_turns: session.max_turns,
        cwd: project_dir,
        settings,
        env: BTreeMap::from([(OAUTH_TOKEN_VAR.to_string(), credentials.oauth_token.clone())]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{AccessScope, PermissionMode, SETTINGS_FILE};
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    fn credentials() -> Credentials {
        Credentials::from_lookup(lookup(&[
            (OAUTH_TOKEN_VAR, "oauth-secret"),
            (GITHUB_TOKEN_VAR, "ghp_secret"),
        ]))
        .unwrap()
    }

    // ── Credentials ─────────────────────────────────────

    #[test]
    fn test_missing_oauth_token_named() {
        let err = Credentials::from_lookup(lookup(&[(GITHUB_TOKEN_VAR, "ghp")])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(OAUTH_TOKEN_VAR));
        assert!(msg.contains("claude setup-token"));
    }

    #[test]
    fn test_missing_github_token_named() {
        let err = Credentials::from_lookup(lookup(&[(OAUTH_TOKEN_VAR, "tok")])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(GITHUB_TOKEN_VAR));
        assert!(msg.contains("https://github.com/settings/tokens"));
    }

    #[test]
    fn test_both_missing_reports_oauth_first() {
        match Credentials::from_lookup(lookup(&[])) {
            Err(SetupError::MissingCredential { var, .. }) => assert_eq!(var, OAUTH_TOKEN_VAR),
            other => panic!("expected MissingCredential, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_token_counts_as_missing() {
        let result = Credentials::from_lookup(lookup(&[
            (OAUTH_TOKEN_VAR, "tok"),
            (GITHUB_TOKEN_VAR, "   "),
        ]));
        assert!(matches!(
            result,
            Err(SetupError::MissingCredential { var: GITHUB_TOKEN_VAR, .. })
        ));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let text = format!("{:?}", credentials());
        assert!(!text.contains("oauth-secret"));
        assert!(!text.contains("ghp_secret"));
    }

    // ── assemble ────────────────────────────────────────

    #[test]
    fn test_assemble_writes_one_settings_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("my-app");

        let client = assemble(
            &project,
            &SessionConfig::default(),
            &credentials(),
            Path::new("/usr/local/bin/agent-gate"),
            None,
        )
        .unwrap();

        let entries: Vec<_> = std::fs::read_dir(&project).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(client.settings.file_name().unwrap(), SETTINGS_FILE);
        assert!(client.settings.is_absolute());
        assert!(client.cwd.is_absolute());

        let content = std::fs::read_to_string(&client.settings).unwrap();
        let scope: AccessScope = serde_json::from_str(&content).unwrap();
        assert!(scope.sandbox.enabled);
    }

    #[test]
    fn test_assemble_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::default();
        let first = assemble(dir.path(), &config, &credentials(), Path::new("gate"), None).unwrap();
        let before = std::fs::read_to_string(&first.settings).unwrap();
        let second = assemble(dir.path(), &config, &credentials(), Path::new("gate"), None).unwrap();
        let after = std::fs::read_to_string(&second.settings).unwrap();
        assert_eq!(before, after);
        assert_eq!(first.settings, second.settings);
    }

    #[test]
    fn test_assemble_registers_bash_hook_only() {
        let dir = tempfile::tempdir().unwrap();
        let client = assemble(
            dir.path(),
            &SessionConfig::default(),
            &credentials(),
            Path::new("gate"),
            None,
        )
        .unwrap();

        assert_eq!(client.hooks.len(), 1);
        let matchers = &client.hooks[PRE_TOOL_USE];
        assert_eq!(
            matchers,
            &vec![HookMatcher {
                matcher: "Bash".to_string(),
                hooks: vec!["gate hook".to_string()],
            }]
        );
    }

    #[test]
    fn test_assemble_descriptor_contents() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            model: "test-model".to_string(),
            max_turns: 12,
            system_prompt: "Build a todo app.".to_string(),
            permission_mode: PermissionMode::Plan,
        };
        let client = assemble(dir.path(), &config, &credentials(), Path::new("gate"), None).unwrap();

        assert_eq!(client.model, "test-model");
        assert_eq!(client.max_turns, 12);
        assert!(client.system_prompt.starts_with("Build a todo app."));
        assert!(client.system_prompt.contains(tracker::META_ISSUE_TITLE));
        assert!(client.allowed_tools.iter().any(|t| t == "Bash"));
        assert!(client.allowed_tools.iter().any(|t| t == "mcp__github__create_issue"));
        assert_eq!(client.mcp_servers["github"].env["GITHUB_PERSONAL_ACCESS_TOKEN"], "ghp_secret");
        assert_eq!(client.env[OAUTH_TOKEN_VAR], "oauth-secret");

        let content = std::fs::read_to_string(&client.settings).unwrap();
        let scope: AccessScope = serde_json::from_str(&content).unwrap();
        assert_eq!(scope.permissions.default_mode, PermissionMode::Plan);
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let client = assemble(
            dir.path(),
            &SessionConfig::default(),
            &credentials(),
            Path::new("gate"),
            None,
        )
        .unwrap();
        let json = serde_json::to_string(&client.redacted()).unwrap();
        assert!(!json.contains("ghp_secret"));
        assert!(!json.contains("oauth-secret"));
        assert!(json.contains(REDACTED));
    }

    #[test]
    fn test_assemble_fails_on_unwritable_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let result = assemble(
            &blocker.join("project"),
            &SessionConfig::default(),
            &credentials(),
            Path::new("gate"),
            None,
        );
        assert!(matches!(result, Err(SetupError::ProjectDir { .. })));
    }

    #[test]
    fn test_assemble_pins_hook_config() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("app");
        let config = dir.path().join("agent-gate.toml");

        let client = assemble(
            &project,
            &SessionConfig::default(),
            &credentials(),
            Path::new("/bin/gate"),
            Some(&config),
        )
        .unwrap();

        let hook = &client.hooks[PRE_TOOL_USE][0].hooks[0];
        let words = shell_words::split(hook).unwrap();
        assert_eq!(words[1..3], ["hook", "--config"]);
        assert_eq!(Path::new(&words[3]), config.as_path());
    }

    #[test]
    fn test_assemble_refuses_config_inside_project() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().canonicalize().unwrap();
        let config = project.join("config").join("agent-gate.toml");

        let result = assemble(
            &project,
            &SessionConfig::default(),
            &credentials(),
            Path::new("/bin/gate"),
            Some(&config),
        );

        assert!(matches!(result, Err(SetupError::ConfigInProject { .. })));
        assert!(!project.join(SETTINGS_FILE).exists());
    }

    #[test]
    fn test_assemble_refuses_relative_config() {
        let dir = tempfile::tempdir().unwrap();
        let result = assemble(
            &dir.path().join("app"),
            &SessionConfig::default(),
            &credentials(),
            Path::new("/bin/gate"),
            Some(Path::new("config/agent-gate.toml")),
        );
        assert!(matches!(result, Err(SetupError::RelativeConfig(_))));
        assert!(!dir.path().join("app").exists());
    }

    #[test]
    fn test_hook_command_quotes_paths() {
        let cmd = hook_command(
            Path::new("/opt/agent gate/bin/agent-gate"),
            Some(Path::new("/etc/agent-gate.toml")),
        );
        assert_eq!(
            shell_words::split(&cmd).unwrap(),
            vec![
                "/opt/agent gate/bin/agent-gate",
                "hook",
                "--config",
                "/etc/agent-gate.toml"
            ]
        );
        assert_eq!(hook_command(Path::new("/bin/gate"), None), "/bin/gate hook");
    }
}
