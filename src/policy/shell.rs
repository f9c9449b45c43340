//! Shell-syntax helpers for the command policy.
//!
//! Nothing here executes or expands a command. The policy only needs to
//! know whether a command line chains several commands together and what
//! its words are once quoting has been removed.

/// A chaining or substitution construct found in a command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    /// `;`
    Sequence,
    /// A raw newline or carriage return.
    Newline,
    /// `|` or `||`
    Pipe,
    /// `&` or `&&` (not part of a redirection)
    Background,
    /// Backticks or `$(...)`
    Substitution,
    /// `<(...)` or `>(...)`
    ProcessSubstitution,
}

impl Chain {
    /// Short description used in deny reasons.
    pub fn describe(&self) -> &'static str {
        match self {
            Chain::Sequence => "a command separator ';'",
            Chain::Newline => "a newline separator",
            Chain::Pipe => "a pipe or '||' operator",
            Chain::Background => "a '&' or '&&' operator",
            Chain::Substitution => "a command substitution",
            Chain::ProcessSubstitution => "a process substitution",
        }
    }
}

/// Scans a command line for the first chaining construct.
///
/// Single quotes make everything literal. Double quotes hide operators but
/// not backticks or `$(`, which the shell still expands there. A `&` that
/// belongs to a redirection (`2>&1`, `&>log`, `>&2`) and the `>|` clobber
/// redirection are not chains.
pub fn find_chain(command: &str) -> Option<Chain> {
    let chars: Vec<char> = command.chars().collect();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        let prev = if i > 0 { chars.get(i - 1).copied() } else { None };
        let next = chars.get(i + 1).copied();

        if escaped {
            escaped = false;
            continue;
        }
        if in_single {
            if c == '\'' {
                in_single = false;
            }
            continue;
        }

        match c {
            '\\' => escaped = true,
            '\'' if !in_double => in_single = true,
            '"' => in_double = !in_double,
            '`' => return Some(Chain::Substitution),
            '$' if next == Some('(') => return Some(Chain::Substitution),
            _ if in_double => {}
            ';' => return Some(Chain::Sequence),
            '\n' | '\r' => return Some(Chain::Newline),
            '|' if prev == Some('>') => {}
            '|' => return Some(Chain::Pipe),
            '&' if prev == Some('>') || next == Some('>') => {}
            '&' => return Some(Chain::Background),
            '<' | '>' if next == Some('(') => return Some(Chain::ProcessSubstitution),
            _ => {}
        }
    }

    None
}

/// Splits a command line into words using shell quoting rules.
pub fn split_words(command: &str) -> Result<Vec<String>, shell_words::ParseError> {
    shell_words::split(command)
}

/// True if the word is a leading `NAME=value` environment assignment.
pub fn is_assignment(word: &str) -> bool {
    let Some((name, _)) = word.split_once('=') else {
        return false;
    };
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
