//! PreToolUse hook wire format.
//!
//! The host writes one JSON object to the hook's stdin:
//!
//! ```json
//! {"session_id":"…","cwd":"/work/app","hook_event_name":"PreToolUse",
//!  "tool_name":"Bash","tool_input":{"command":"ls ./src"}}
//! ```
//!
//! A denial is reported on stdout as
//! `{"hookSpecificOutput":{"hookEventName":"PreToolUse","permissionDecision":"deny","permissionDecisionReason":"…"}}`.
//! An allowed command produces no output, which leaves the decision to the
//! host's own permission layer instead of overriding it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::{CommandRequest, CommandValidator, BASH_TOOL};
use crate::policy::Verdict;

/// Hook payloads larger than this are refused.
const MAX_INPUT_BYTES: u64 = 1024 * 1024;

const PRE_TOOL_USE: &str = "PreToolUse";

#[derive(Debug, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub hook_event_name: Option<String>,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: serde_json::Value,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HookOutput {
    #[serde(rename = "hookSpecificOutput")]
    pub hook_specific_output: HookSpecificOutput,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    pub permission_decision: String,
    pub permission_decision_reason: String,
}

impl HookOutput {
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: PRE_TOOL_USE.to_string(),
                permission_decision: "deny".to_string(),
                permission_decision_reason: reason.into(),
            },
        }
    }

    pub fn reason(&self) -> &str {
        &self.hook_specific_output.permission_decision_reason
    }
}

/// Turns one raw hook payload into the hook's response.
///
/// `None` means "print nothing": the command is allowed, or the tool is not
/// a shell tool and is governed by the permission settings instead.
pub fn respond(validator: &CommandValidator, raw: &str, fallback_cwd: &Path) -> Option<HookOutput> {
    let raw = raw.trim();
    if raw.is_empty() {
        warn!("Hook received empty input, denying");
        return Some(HookOutput::deny("hook received no input; denied"));
    }

    let input: HookInput = match serde_json::from_str(raw) {
        Ok(input) => input,
        Err(e) => {
            warn!("Failed to parse hook input: {e}");
            return Some(HookOutput::deny(format!(
                "hook input could not be parsed ({e}); denied"
            )));
        }
    };

    debug!(
        "Hook event {:?} for tool {} (session {:?})",
        input.hook_event_name, input.tool_name, input.session_id
    );

    if input.tool_name != BASH_TOOL {
        debug!("Non-shell tool {}, no opinion", input.tool_name);
        return None;
    }

    let Some(command) = input.tool_input.get("command").and_then(|c| c.as_str()) else {
        return Some(HookOutput::deny("shell tool call has no command; denied"));
    };

    let request = CommandRequest {
        command: command.to_string(),
        cwd: input.cwd.unwrap_or_else(|| fallback_cwd.to_path_buf()),
        tool_name: input.tool_name,
    };

    match validator.validate(&request) {
        Verdict::Allow => None,
        Verdict::Deny { reason } => Some(HookOutput::deny(reason)),
    }
}

/// Reads the whole payload, giving up after `timeout`.
pub async fn read_input<R>(reader: R, timeout: Duration) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut input = String::new();
    let mut limited = reader.take(MAX_INPUT_BYTES);
    tokio::time::timeout(timeout, limited.read_to_string(&mut input))
        .await
        .map_err(|_| anyhow::anyhow!("timed out after {}s waiting for hook input", timeout.as_secs()))??;
    Ok(input)
}

/// Runs one hook invocation: read stdin, validate, answer on stdout.
///
/// Read failures are answered with a denial; only a failure to write the
/// answer itself is returned as an error.
pub async fn run<R, W>(
    validator: &CommandValidator,
    reader: R,
    mut writer: W,
    timeout: Duration,
    fallback_cwd: &Path,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let output = match read_input(reader, timeout).await {
        Ok(raw) => respond(validator, &raw, fallback_cwd),
        Err(e) => {
            warn!("Hook input unavailable: {e}");
            Some(HookOutput::deny(format!("hook input unavailable ({e}); denied")))
        }
    };

    if let Some(output) = output {
        debug!("Answering with denial: {}", output.reason());
        let mut json = serde_json::to_vec(&output)?;
        json.push(b'\n');
        writer.write_all(&json).await?;
        writer.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::policy::Policy;

    fn validator() -> CommandValidator {
        CommandValidator::new(Arc::new(Policy::standard().unwrap()))
    }

    fn bash_input(command: &str) -> String {
        serde_json::json!({
            "session_id": "abc123",
            "cwd": "/work/app",
            "hook_event_name": "PreToolUse",
            "tool_name": "Bash",
            "tool_input": { "command": command }
        })
        .to_string()
    }

    #[test]
    fn test_allowed_command_prints_nothing() {
        let out = respond(&validator(), &bash_input("ls ./src"), Path::new("/"));
        assert!(out.is_none());
    }

    #[test]
    fn test_denied_command_reports_reason() {
        let out = respond(&validator(), &bash_input("rm -rf /"), Path::new("/")).unwrap();
        assert_eq!(out.hook_specific_output.permission_decision, "deny");
        assert_eq!(out.hook_specific_output.hook_event_name, "PreToolUse");
        assert!(out.reason().contains("destructive-delete"));
    }

    #[test]
    fn test_deny_wire_format() {
        let json = serde_json::to_value(HookOutput::deny("nope")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "hookSpecificOutput": {
                    "hookEventName": "PreToolUse",
                    "permissionDecision": "deny",
                    "permissionDecisionReason": "nope"
                }
            })
        );
    }

    #[test]
    fn test_non_shell_tool_has_no_opinion() {
        let raw = serde_json::json!({
            "tool_name": "Write",
            "tool_input": { "file_path": "./a.txt", "content": "x" }
        })
        .to_string();
        assert!(respond(&validator(), &raw, Path::new("/")).is_none());
    }

    #[test]
    fn test_malformed_input_fails_closed() {
        let v = validator();
        assert!(respond(&v, "", Path::new("/")).is_some());
        assert!(respond(&v, "{not json", Path::new("/")).is_some());
        assert!(respond(&v, r#"{"tool_input":{}}"#, Path::new("/")).is_some());
        let out = respond(&v, r#"{"tool_name":"Bash","tool_input":{}}"#, Path::new("/")).unwrap();
        assert!(out.reason().contains("no command"));
    }

    #[tokio::test]
    async fn test_run_writes_denial_line() {
        let input = bash_input("sudo rm -rf /");
        let mut out = Vec::new();
        run(
            &validator(),
            input.as_bytes(),
            &mut out,
            Duration::from_secs(1),
            Path::new("/"),
        )
        .await
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["hookSpecificOutput"]["permissionDecision"], "deny");
    }

    #[tokio::test]
    async fn test_run_allow_writes_nothing() {
        let input = bash_input("git status");
        let mut out = Vec::new();
        run(
            &validator(),
            input.as_bytes(),
            &mut out,
            Duration::from_secs(1),
            Path::new("/"),
        )
        .await
        .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_run_denies_when_input_never_closes() {
        // The write half stays open, so the read never reaches EOF
        let (_writer, reader) = tokio::io::duplex(64);
        let mut out = Vec::new();
        run(
            &validator(),
            reader,
            &mut out,
            Duration::from_millis(50),
            Path::new("/"),
        )
        .await
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("timed out"));
        assert!(text.contains("\"deny\""));
    }
}
