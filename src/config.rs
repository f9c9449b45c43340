use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

use crate::policy::Policy;
use crate::sandbox::PermissionMode;

/// Config file used when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "config/agent-gate.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub hook: HookConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Supports ${ENV_VAR} substitution
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Approval mode written to the settings artifact
    #[serde(default = "default_permission_mode")]
    pub permission_mode: PermissionMode,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PolicyConfig {
    /// Extra program names to allowlist, e.g. `["cargo", "python3"]`.
    /// The built-in deny rules still apply to them.
    #[serde(default)]
    pub extra_commands: Vec<String>,
    /// Extra command prefixes to allowlist, e.g. `["make test"]`.
    /// Matched on word boundaries; deny rules still apply.
    #[serde(default)]
    pub extra_prefixes: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HookConfig {
    /// How long the hook waits for the host to close its stdin
    #[serde(default = "default_stdin_timeout_secs")]
    pub stdin_timeout_secs: u64,
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_turns() -> u32 {
    1000
}

fn default_system_prompt() -> String {
    "You are an expert full-stack developer building a production-quality web application. \
     You use GitHub Issues for project management and tracking all your work."
        .to_string()
}

fn default_permission_mode() -> PermissionMode {
    PermissionMode::AcceptEdits
}

fn default_stdin_timeout_secs() -> u64 {
    5
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_turns: default_max_turns(),
            system_prompt: default_system_prompt(),
            permission_mode: default_permission_mode(),
        }
    }
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            stdin_timeout_secs: default_stdin_timeout_secs(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${GITHUB_OWNER}
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// `path` if given, else `DEFAULT_CONFIG_PATH` if it exists.
    ///
    /// The default is relative to the working directory, so this is only
    /// for operator-facing commands, never for the hook.
    pub fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        match path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                default.is_file().then(|| default.to_path_buf())
            }
        }
    }

    /// Loads the file `resolve_path` picks, else the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match Self::resolve_path(path) {
            Some(path) => Self::load(&path),
            None => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Loads `path` if given, else the built-in defaults. Never looks for
    /// `DEFAULT_CONFIG_PATH`.
    pub fn load_explicit(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// The standard policy extended with the configured programs and prefixes.
    pub fn policy(&self) -> anyhow::Result<Policy> {
        let policy = Policy::standard().context("built-in command policy is invalid")?;
        Ok(policy
            .with_programs(&self.policy.extra_commands)
            .with_prefixes(&self.policy.extra_prefixes))
    }

    pub fn stdin_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.hook.stdin_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.session.model, default_model());
        assert_eq!(config.session.max_turns, 1000);
        assert!(config.policy.extra_commands.is_empty());
        assert!(config.policy.extra_prefixes.is_empty());
        assert_eq!(config.session.permission_mode, PermissionMode::AcceptEdits);
        assert_eq!(config.hook.stdin_timeout_secs, 5);
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
            [session]
            model = "claude-opus-4-5"
            max_turns = 50
            system_prompt = "Build the app."
            permission_mode = "plan"

            [policy]
            extra_commands = ["cargo", "python3"]
            extra_prefixes = ["make test"]

            [hook]
            stdin_timeout_secs = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.session.model, "claude-opus-4-5");
        assert_eq!(config.session.max_turns, 50);
        assert_eq!(config.session.system_prompt, "Build the app.");
        assert_eq!(config.session.permission_mode, PermissionMode::Plan);
        assert_eq!(config.policy.extra_commands, vec!["cargo", "python3"]);
        assert_eq!(config.policy.extra_prefixes, vec!["make test"]);
        assert_eq!(config.stdin_timeout(), std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("AGENT_GATE_TEST_MODEL", "model-from-env");
        let config = Config::parse(
            r#"
            [session]
            model = "${AGENT_GATE_TEST_MODEL}"
            "#,
        )
        .unwrap();
        assert_eq!(config.session.model, "model-from-env");
    }

    #[test]
    fn test_missing_env_var_is_an_error() {
        let result = Config::parse(
            r#"
            [session]
            model = "${AGENT_GATE_TEST_SURELY_UNSET_VAR}"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_includes_extra_commands() {
        let config = Config::parse("[policy]\nextra_commands = [\"cargo\"]\n").unwrap();
        let policy = config.policy().unwrap();
        assert!(policy.decide("cargo test").is_allowed());
        assert!(!policy.decide("sudo cargo test").is_allowed());
    }

    #[test]
    fn test_policy_includes_extra_prefixes() {
        let config = Config::parse("[policy]\nextra_prefixes = [\"make  test\"]\n").unwrap();
        let policy = config.policy().unwrap();
        assert!(policy.decide("make test").is_allowed());
        assert!(!policy.decide("make test-unit").is_allowed());
        assert!(!policy.decide("make install").is_allowed());
    }

    #[test]
    fn test_unknown_permission_mode_rejected() {
        let result = Config::parse("[session]\npermission_mode = \"bypassPermissions\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_explicit_ignores_default_path() {
        let config = Config::load_explicit(None).unwrap();
        assert!(config.policy.extra_commands.is_empty());
        assert_eq!(config.session.max_turns, default_max_turns());
    }

    #[test]
    fn test_resolve_path_prefers_explicit() {
        let explicit = Path::new("/etc/agent-gate.toml");
        assert_eq!(Config::resolve_path(Some(explicit)), Some(explicit.to_path_buf()));
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent-gate.toml");
        std::fs::write(&path, "[session]\nmax_turns = 7\n").unwrap();
        let config = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.session.max_turns, 7);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_or_default(Some(&dir.path().join("missing.toml")));
        assert!(result.is_err());
    }
}
