mod agent;
mod config;
mod hook;
mod policy;
mod sandbox;
mod tracker;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::agent::client::{self, Credentials};
use crate::agent::progress;
use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::hook::protocol::{self, HookOutput};
use crate::hook::{CommandRequest, CommandValidator};

/// Exit status of `check` for a denied command, and of a hook that failed
/// (the host treats 2 as "block the tool call").
const EXIT_DENIED: i32 = 2;

fn print_help() {
    println!(
        "\
agent-gate v{}

Command-execution security gateway for autonomous coding agents.

USAGE:
    agent-gate <COMMAND> [OPTIONS] [ARGS]

COMMANDS:
    hook                     Pre-execution hook: reads the tool call as JSON on
                             stdin, prints a denial on stdout (nothing if allowed).
                             Uses the built-in policy unless --config is given;
                             never reads {DEFAULT_CONFIG_PATH}
    check <COMMAND...>       Evaluate a shell command against the allowlist
                             (exit 0 if allowed, 2 if denied)
    setup <PROJECT_DIR>      Validate credentials, write the sandbox/permission
                             settings and print the client descriptor as JSON
    status <PROJECT_DIR>     Show cached project progress
    tracker                  Print the issue-tracker conventions (labels, META
                             issue title, marker file) as JSON

OPTIONS:
    -c, --config <PATH>    TOML configuration file [default: {DEFAULT_CONFIG_PATH} if present,
                           except for `hook`]
    --reveal-credentials   `setup` prints the descriptor with real token values
                           (default: masked; the host must then inject them)
    -h, --help             Print this help message and exit
    -V, --version          Print version and exit

ENVIRONMENT VARIABLES:
    RUST_LOG                   Log level filter for tracing (logs go to stderr)
                               (e.g. debug, agent_gate=debug,warn)
    CLAUDE_CODE_OAUTH_TOKEN    Agent credential, required by `setup`
                               (run 'claude setup-token')
    GITHUB_TOKEN               Repository access token, required by `setup`
                               (from https://github.com/settings/tokens)

EXAMPLES:
    agent-gate check ls ./src
    agent-gate setup ./my-app
    RUST_LOG=debug agent-gate setup --config config/agent-gate.toml ./my-app",
        env!("CARGO_PKG_VERSION"),
    );
}

/// Parsed command line.
struct Cli {
    command: Option<String>,
    config: Option<PathBuf>,
    reveal_credentials: bool,
    args: Vec<String>,
}

impl Cli {
    fn parse(raw: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut cli = Cli {
            command: None,
            config: None,
            reveal_credentials: false,
            args: Vec::new(),
        };
        let mut raw = raw.into_iter();
        while let Some(arg) = raw.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    let path = raw
                        .next()
                        .ok_or_else(|| anyhow!("{arg} requires a path"))?;
                    cli.config = Some(PathBuf::from(path));
                }
                "--reveal-credentials" => cli.reveal_credentials = true,
                _ if cli.command.is_none() => cli.command = Some(arg),
                _ => {
                    // Everything after `check` belongs to the checked command
                    if cli.command.as_deref() == Some("check") {
                        cli.args.push(arg);
                        cli.args.extend(raw.by_ref());
                    } else {
                        cli.args.push(arg);
                    }
                }
            }
        }
        Ok(cli)
    }

    fn config(&self) -> Result<Config> {
        Config::load_or_default(self.config.as_deref())
    }

    /// True if the first non-option argument is `hook`, whether or not
    /// the rest of the command line parses.
    fn is_hook(raw: &[String]) -> bool {
        let mut raw = raw.iter();
        while let Some(arg) = raw.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    raw.next();
                }
                "--reveal-credentials" => {}
                other => return other == "hook",
            }
        }
        false
    }

    fn project_dir(&self) -> Result<&Path> {
        match self.args.as_slice() {
            [dir] => Ok(Path::new(dir)),
            [] => bail!("missing <PROJECT_DIR>; see --help"),
            _ => bail!("expected a single <PROJECT_DIR>; see --help"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("agent-gate v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {}
        }
    }

    // stdout carries hook and descriptor JSON, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agent_gate=info")),
        )
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    if Cli::is_hook(&raw) {
        std::process::exit(hook_main(raw).await);
    }

    let cli = Cli::parse(raw)?;

    match cli.command.as_deref() {
        Some("check") => run_check(&cli),
        Some("setup") => run_setup(&cli),
        Some("status") => {
            println!("{}", progress::summary(cli.project_dir()?));
            Ok(())
        }
        Some("tracker") => {
            println!("{}", serde_json::to_string_pretty(&tracker::Conventions::current())?);
            Ok(())
        }
        Some(other) => Err(anyhow!("unknown command '{other}'; see --help")),
        None => {
            print_help();
            std::process::exit(EXIT_DENIED);
        }
    }
}

fn validator(config: &Config) -> Result<CommandValidator> {
    let policy = config.policy()?;
    debug!("Command policy loaded with {} entries", policy.entries().len());
    Ok(CommandValidator::new(Arc::new(policy)))
}

/// Runs the hook and maps every outcome to an exit status.
///
/// Denials are answered on stdout with status 0. Anything else (bad
/// arguments, an unwritable stdout, a panic) is reported on stderr with
/// `EXIT_DENIED`, which the host treats as blocking.
async fn hook_main(raw: Vec<String>) -> i32 {
    let task = tokio::spawn(async move {
        let cli = Cli::parse(raw)?;
        run_hook(&cli).await?;
        anyhow::Ok(())
    });

    let failure = match task.await {
        Ok(Ok(())) => return 0,
        Ok(Err(e)) => format!("{e:#}"),
        Err(e) if e.is_panic() => "internal hook error".to_string(),
        Err(e) => e.to_string(),
    };
    error!("Hook failed, blocking the command: {failure}");
    eprintln!("agent-gate hook: {failure}; denied");
    EXIT_DENIED
}

/// Configuration problems are answered with a denial.
async fn run_hook(cli: &Cli) -> Result<()> {
    let setup = std::env::current_dir()
        .context("cannot determine working directory")
        .and_then(|cwd| {
            let config = hook_config(cli.config.as_deref(), &cwd)?;
            let validator = validator(&config)?;
            Ok((config, validator, cwd))
        });

    let (config, validator, cwd) = match setup {
        Ok(ready) => ready,
        Err(e) => {
            error!("Hook configuration error: {e:#}");
            let output = HookOutput::deny(format!("hook configuration error ({e:#}); denied"));
            let mut stdout = std::io::stdout();
            writeln!(stdout, "{}", serde_json::to_string(&output)?)?;
            stdout.flush()?;
            return Ok(());
        }
    };

    protocol::run(
        &validator,
        tokio::io::stdin(),
        tokio::io::stdout(),
        config.stdin_timeout(),
        &cwd,
    )
    .await
}

/// The hook runs inside the project, where the agent can write files, so
/// it only reads an explicit config that lies outside its working directory.
fn hook_config(path: Option<&Path>, cwd: &Path) -> Result<Config> {
    let Some(path) = path else {
        debug!("Hook without --config, using built-in policy");
        return Config::load_explicit(None);
    };
    let path = std::fs::canonicalize(path)
        .with_context(|| format!("cannot resolve config {}", path.display()))?;
    let cwd = std::fs::canonicalize(cwd)
        .with_context(|| format!("cannot resolve working directory {}", cwd.display()))?;
    if path.starts_with(&cwd) {
        bail!(
            "config {} lies inside the working directory {}",
            path.display(),
            cwd.display()
        );
    }
    Config::load_explicit(Some(path.as_path()))
}

fn run_check(cli: &Cli) -> Result<()> {
    if cli.args.is_empty() {
        bail!("missing <COMMAND>; see --help");
    }
    let config = cli.config()?;
    let validator = validator(&config)?;

    // A single argument is taken as the whole command line
    let command = match cli.args.as_slice() {
        [line] => line.clone(),
        words => shell_words::join(words),
    };
    let request = CommandRequest::bash(command, std::env::current_dir()?);
    let verdict = validator.validate(&request);
    if verdict.is_allowed() {
        println!("allow");
        return Ok(());
    }
    println!("deny: {}", verdict.reason().unwrap_or_default());
    std::process::exit(EXIT_DENIED);
}

fn run_setup(cli: &Cli) -> Result<()> {
    let project_dir = cli.project_dir()?;
    let config = cli.config()?;

    // Fail before any side effect if a credential is missing
    let credentials = Credentials::from_env()?;

    // The hook runs with the project as cwd, so it gets absolute paths and
    // never falls back to a relative default config
    let executable = std::env::current_exe().context("cannot locate agent-gate executable")?;
    let config_path = Config::resolve_path(cli.config.as_deref())
        .map(std::fs::canonicalize)
        .transpose()
        .context("cannot resolve config path")?;

    if progress::is_initialized(project_dir) {
        info!("Project already initialized, resuming from cached state");
    } else {
        info!("Project not yet initialized");
    }

    let descriptor = client::assemble(
        project_dir,
        &config.session,
        &credentials,
        &executable,
        config_path.as_deref(),
    )?;
    let descriptor = if cli.reveal_credentials {
        warn!("Printing descriptor with unmasked credentials");
        descriptor
    } else {
        descriptor.redacted()
    };
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}
