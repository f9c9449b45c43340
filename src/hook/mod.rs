//! Pre-execution command validator.
//!
//! The host runtime calls the validator synchronously before every shell
//! command. It is a fail-closed gate: panics and unexpected input collapse
//! to a Deny verdict and never escape into the host's tool loop.

pub mod protocol;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::policy::{Policy, Verdict};

/// Tool name of the shell-command class of tools.
pub const BASH_TOOL: &str = "Bash";

/// A shell command the agent wants to run.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub cwd: PathBuf,
    pub tool_name: String,
}

impl CommandRequest {
    pub fn bash(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.into(),
            tool_name: BASH_TOOL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandValidator {
    policy: Arc<Policy>,
}

impl CommandValidator {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }

    /// Evaluates a request against the policy.
    pub fn validate(&self, request: &CommandRequest) -> Verdict {
        if request.tool_name != BASH_TOOL {
            warn!(
                "Validator received non-shell tool '{}', denying",
                request.tool_name
            );
            return Verdict::deny(format!(
                "tool '{}' is not a shell tool and cannot be validated; denied",
                request.tool_name
            ));
        }

        let policy = &self.policy;
        let verdict = match panic::catch_unwind(AssertUnwindSafe(|| policy.decide(&request.command)))
        {
            Ok(verdict) => verdict,
            Err(_) => {
                error!("Policy evaluation panicked for '{}'", request.command);
                Verdict::deny("internal validator error; denied")
            }
        };

        match &verdict {
            Verdict::Allow => info!(
                "Allowed '{}' (cwd {})",
                request.command,
                request.cwd.display()
            ),
            Verdict::Deny { reason } => warn!("Denied: {reason}"),
        }

        verdict
    }
}
