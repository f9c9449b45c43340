//! Command allowlist policy.
//!
//! A `Policy` is an immutable table of entries built once per process and
//! shared by reference. Evaluation is fail-closed:
//!
//! 1. Empty commands, compound commands and unparseable commands are denied.
//! 2. Every deny entry is checked first; the first hit denies (deny wins
//!    over any allow entry matching the same command).
//! 3. The allowed program is looked up by exact name, then prefix/pattern
//!    allow entries are tried in table order. Argument rules run last.
//! 4. Anything left over is denied.

pub mod allowlist;
pub mod shell;

use std::collections::HashMap;

use tracing::debug;

pub use allowlist::{CommandLine, Decision, Matcher, PolicyEntry};

/// Outcome of evaluating one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny { reason: String },
}

impl Verdict {
    pub fn deny(reason: impl Into<String>) -> Self {
        Verdict::Deny {
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Allow => None,
            Verdict::Deny { reason } => Some(reason),
        }
    }
}

pub struct Policy {
    entries: Vec<PolicyEntry>,
    /// Exact program name → index of its allow entry.
    programs: HashMap<String, usize>,
}

impl Policy {
    pub fn new(entries: Vec<PolicyEntry>) -> Self {
        let mut policy = Self {
            entries: Vec::with_capacity(entries.len()),
            programs: HashMap::new(),
        };
        for entry in entries {
            policy.push(entry);
        }
        policy
    }

    /// The built-in table for autonomous coding sessions.
    pub fn standard() -> Result<Self, regex::Error> {
        Ok(Self::new(allowlist::standard_entries()?))
    }

    /// Appends allow entries for extra program names.
    /// Deny entries keep precedence over them.
    pub fn with_programs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() {
                self.push(PolicyEntry::allow_program(name));
            }
        }
        self
    }

    /// Appends word-boundary prefix allow entries, e.g. `make test`.
    /// Deny entries keep precedence over them.
    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for prefix in prefixes {
            let entry = PolicyEntry::allow_prefix(prefix.as_ref());
            if !entry.label.is_empty() {
                self.push(entry);
            }
        }
        self
    }

    fn push(&mut self, entry: PolicyEntry) {
        if let (Decision::Allow, Matcher::Program(name)) = (entry.decision, &entry.matcher) {
            // First entry for a program wins
            self.programs
                .entry(name.clone())
                .or_insert(self.entries.len());
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[PolicyEntry] {
        &self.entries
    }

    /// Decides whether `command` may run.
    pub fn decide(&self, command: &str) -> Verdict {
        let command = command.trim();
        if command.is_empty() {
            return Verdict::deny("empty command; denied");
        }

        if let Some(chain) = shell::find_chain(command) {
            return Verdict::deny(format!(
                "command '{command}' contains {}; compound commands are not permitted, \
                 run each command separately; denied",
                chain.describe()
            ));
        }

        let words = match shell::split_words(command) {
            Ok(words) if !words.is_empty() => words,
            Ok(_) => return Verdict::deny("empty command; denied"),
            Err(e) => {
                return Verdict::deny(format!(
                    "command '{command}' could not be parsed ({e}); denied"
                ))
            }
        };

        if shell::is_assignment(&words[0]) {
            return Verdict::deny(format!(
                "command '{command}' starts with an environment assignment '{}'; denied",
                words[0]
            ));
        }

        let line = CommandLine::new(words);

        if let Some(entry) = self
            .entries
            .iter()
            .filter(|e| e.decision == Decision::Deny)
            .find(|e| e.matcher.matches(&line))
        {
            debug!("Deny entry {} matched '{command}'", entry.matcher);
            return Verdict::deny(entry.deny_reason(command));
        }

        let allowed = self
            .programs
            .get(line.program())
            .and_then(|&i| self.entries.get(i))
            .or_else(|| {
                self.entries.iter().find(|e| {
                    e.decision == Decision::Allow
                        && !matches!(e.matcher, Matcher::Program(_))
                        && e.matcher.matches(&line)
                })
            });

        match allowed {
            Some(entry) => match entry.args.check(&line) {
                Ok(()) => Verdict::Allow,
                Err(why) => Verdict::deny(format!("command '{command}' {why}; denied")),
            },
            None => Verdict::deny(format!(
                "program '{}' is not in the allowlist; denied",
                line.program()
            )),
        }
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("entries", &self.entries.len())
            .field("programs", &self.programs.len())
            .finish()
    }
}
