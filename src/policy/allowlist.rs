use std::fmt;

use regex::Regex;

/// Development processes `pkill` may target.
const DEV_PROCESSES: &[&str] = &["node", "npm", "npx", "vite", "next"];

/// Programs the agent may run without further argument checks
/// (argument-checked programs are listed separately in `standard_entries`).
const STANDARD_PROGRAMS: &[&str] = &[
    // File inspection
    "ls", "cat", "head", "tail", "wc", "grep",
    // File operations
    "cp", "mkdir", "pwd",
    // Node.js development
    "npm", "node",
    // Version control
    "git",
    // Process inspection
    "ps", "lsof", "sleep",
    // Project bootstrap script
    "./init.sh",
];

/// Whether a matching entry lets the command through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// A command line after quote removal.
///
/// `text` is the words joined by single spaces, so matchers see
/// `rm -rf "/"` and `rm  -rf /` the same way.
#[derive(Debug)]
pub struct CommandLine {
    words: Vec<String>,
    text: String,
}

impl CommandLine {
    /// `words` must not be empty.
    pub fn new(words: Vec<String>) -> Self {
        let text = words.join(" ");
        Self { words, text }
    }

    pub fn program(&self) -> &str {
        self.words.first().map(String::as_str).unwrap_or("")
    }

    pub fn args(&self) -> &[String] {
        self.words.get(1..).unwrap_or(&[])
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// How an entry recognises a command.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// The first word equals this name exactly (no basename stripping).
    Program(String),
    /// The normalised text starts with this prefix on a word boundary.
    Prefix(String),
    /// Structured matcher over the normalised text.
    Pattern(Regex),
}

impl Matcher {
    pub fn pattern(source: &str) -> Result<Self, regex::Error> {
        Ok(Matcher::Pattern(Regex::new(source)?))
    }

    pub fn matches(&self, line: &CommandLine) -> bool {
        match self {
            Matcher::Program(name) => line.program() == name,
            Matcher::Prefix(prefix) => {
                let text = line.text();
                text.strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
            }
            Matcher::Pattern(re) => re.is_match(line.text()),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Program(name) => write!(f, "program '{name}'"),
            Matcher::Prefix(prefix) => write!(f, "prefix '{prefix}'"),
            Matcher::Pattern(re) => write!(f, "pattern /{}/", re.as_str()),
        }
    }
}

/// Extra argument validation applied after an allow entry matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgRule {
    Any,
    /// `chmod` limited to adding the executable bit (`+x`, `u+x`, ...).
    ExecutableBitOnly,
    /// `pkill` limited to development server processes.
    DevProcessesOnly,
}

impl ArgRule {
    /// Returns the reason the arguments are rejected, if they are.
    pub fn check(&self, line: &CommandLine) -> Result<(), String> {
        match self {
            ArgRule::Any => Ok(()),
            ArgRule::ExecutableBitOnly => check_chmod(line.args()),
            ArgRule::DevProcessesOnly => check_pkill(line.args()),
        }
    }
}

fn check_chmod(args: &[String]) -> Result<(), String> {
    let Some((mode, files)) = args.split_first() else {
        return Err("is missing a mode; chmod needs '+x' and a file".to_string());
    };
    if mode.starts_with('-') {
        return Err(format!("uses chmod flag '{mode}'; only '+x' modes are allowed"));
    }
    let who = mode.strip_suffix("+x").unwrap_or("?");
    if !who.chars().all(|c| matches!(c, 'u' | 'g' | 'o' | 'a')) {
        return Err(format!("uses chmod mode '{mode}'; only '+x' modes are allowed"));
    }
    if files.is_empty() {
        return Err("has no file operand for chmod".to_string());
    }
    if let Some(flag) = files.iter().find(|f| f.starts_with('-')) {
        return Err(format!("uses chmod flag '{flag}'; only '+x' modes are allowed"));
    }
    Ok(())
}

fn check_pkill(args: &[String]) -> Result<(), String> {
    let Some(target) = args.iter().filter(|a| !a.starts_with('-')).last() else {
        return Err("has no process name; pkill needs a target".to_string());
    };
    // `pkill -f "node server.js"` is judged by its first word
    let name = target.split_whitespace().next().unwrap_or("");
    if DEV_PROCESSES.contains(&name) {
        Ok(())
    } else {
        Err(format!(
            "targets process '{name}'; pkill may only stop {}",
            DEV_PROCESSES.join(", ")
        ))
    }
}

/// One row of the policy table.
#[derive(Debug, Clone)]
pub struct PolicyEntry {
    pub matcher: Matcher,
    pub decision: Decision,
    /// Short rule name quoted in deny reasons, e.g. "destructive-delete".
    pub label: String,
    pub reason: Option<String>,
    pub args: ArgRule,
}

impl PolicyEntry {
    pub fn allow_program(name: &str) -> Self {
        Self {
            matcher: Matcher::Program(name.to_string()),
            decision: Decision::Allow,
            label: name.to_string(),
            reason: None,
            args: ArgRule::Any,
        }
    }

    /// Allows commands starting with `prefix` on a word boundary.
    /// Runs of whitespace in `prefix` are collapsed to match `CommandLine::text`.
    pub fn allow_prefix(prefix: &str) -> Self {
        let prefix = prefix.split_whitespace().collect::<Vec<_>>().join(" ");
        Self {
            matcher: Matcher::Prefix(prefix.clone()),
            decision: Decision::Allow,
            label: prefix,
            reason: None,
            args: ArgRule::Any,
        }
    }

    pub fn deny(matcher: Matcher, label: &str, reason: &str) -> Self {
        Self {
            matcher,
            decision: Decision::Deny,
            label: label.to_string(),
            reason: Some(reason.to_string()),
            args: ArgRule::Any,
        }
    }

    pub fn with_args(mut self, args: ArgRule) -> Self {
        self.args = args;
        self
    }

    /// Deny reason for a command that hit this entry.
    pub fn deny_reason(&self, command: &str) -> String {
        match &self.reason {
            Some(why) => format!(
                "command '{command}' matches {} pattern; denied ({why})",
                self.label
            ),
            None => format!("command '{command}' matches {} pattern; denied", self.label),
        }
    }
}

/// The built-in table: deny rows first, then the allowlisted programs.
pub fn standard_entries() -> Result<Vec<PolicyEntry>, regex::Error> {
    let mut entries = vec![
        PolicyEntry::deny(
            Matcher::pattern(r"^rm\s(.*\s)?(-[a-zA-Z]*[rR][a-zA-Z]*|--recursive)(\s|$)")?,
            "destructive-delete",
            "recursive deletes are not permitted",
        ),
        PolicyEntry::deny(
            Matcher::pattern(r"^rm\s(.*\s)?(/|/\*|~|~/|~/\*|\*|\.\.|\.\./\S*)(\s|$)")?,
            "destructive-delete",
            "deleting outside the project or by wildcard is not permitted",
        ),
        PolicyEntry::deny(
            Matcher::pattern(r"^(sudo|su|doas|pkexec)(\s|$)")?,
            "privilege-escalation",
            "commands must run as the current user",
        ),
        PolicyEntry::deny(
            Matcher::pattern(r"^(mkfs(\.\w+)?|dd|shred|fdisk|wipefs)(\s|$)")?,
            "disk-destruction",
            "raw disk and filesystem tools are not permitted",
        ),
        PolicyEntry::deny(
            Matcher::pattern(r"^(shutdown|reboot|halt|poweroff)(\s|$)")?,
            "host-power",
            "the agent may not power off or restart the host",
        ),
        PolicyEntry::deny(
            Matcher::pattern(
                r"^git\s+push\s(.*\s)?(--force(-with-lease)?(=\S*)?|-[a-zA-Z]*f[a-zA-Z]*|\+\S+)(\s|$)",
            )?,
            "force-push",
            "remote history must not be overwritten",
        ),
        PolicyEntry::deny(
            Matcher::pattern(r"^git\s+reset\s(.*\s)?--hard\s+\S+/\S+")?,
            "history-rewrite",
            "resetting onto a remote ref discards local commits",
        ),
        PolicyEntry::deny(
            Matcher::pattern(r"^git\s+clean\s(.*\s)?-[a-zA-Z]*x[a-zA-Z]*(\s|$)")?,
            "history-rewrite",
            "purging ignored files is not permitted",
        ),
        // Allowlisted programs that can still run arbitrary code
        PolicyEntry::deny(
            Matcher::pattern(r"^git\s+(-[^c\s]\S*\s+)*(-c|--config-env)(=|\s|$)")?,
            "code-execution",
            "per-command git configuration can run arbitrary programs",
        ),
        PolicyEntry::deny(
            Matcher::pattern(r"^git\s(.*\s)?--(upload-pack|receive-pack|exec)(=|\s|$)")?,
            "code-execution",
            "git options that run external programs are not permitted",
        ),
        PolicyEntry::deny(
            Matcher::pattern(
                r"^git\s+config\s(.*\s)?(?i:alias\.\S+|core\.(pager|editor|sshcommand|hookspath|fsmonitor))(\s|$)",
            )?,
            "code-execution",
            "git aliases and command-running settings are not permitted",
        ),
        PolicyEntry::deny(
            Matcher::pattern(r"^node\s(.*\s)?(-e|--eval|-p|--print|-pe|-ep)(=|\s|$)")?,
            "code-execution",
            "inline node code is not permitted; write a script file instead",
        ),
        PolicyEntry::deny(
            Matcher::pattern(r"^npm\s+(exec|x)(\s|$)")?,
            "code-execution",
            "npm exec runs arbitrary packages",
        ),
    ];

    entries.extend(STANDARD_PROGRAMS.iter().map(|p| PolicyEntry::allow_program(p)));
    entries.push(PolicyEntry::allow_program("chmod").with_args(ArgRule::ExecutableBitOnly));
    entries.push(PolicyEntry::allow_program("pkill").with_args(ArgRule::DevProcessesOnly));

    Ok(entries)
}
