//! Tool capability manifests.
//!
//! Tool names are opaque strings: they are granted in the permission
//! settings and listed in the client's allowed tools, never interpreted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hook::BASH_TOOL;

/// Built-in tools of the host runtime.
pub const BUILTIN_TOOLS: &[&str] = &["Read", "Write", "Edit", "Glob", "Grep", BASH_TOOL];

/// Puppeteer MCP tools for browser automation
pub const PUPPETEER_TOOLS: &[&str] = &[
    "mcp__puppeteer__puppeteer_navigate",
    "mcp__puppeteer__puppeteer_screenshot",
    "mcp__puppeteer__puppeteer_click",
    "mcp__puppeteer__puppeteer_fill",
    "mcp__puppeteer__puppeteer_select",
    "mcp__puppeteer__puppeteer_hover",
    "mcp__puppeteer__puppeteer_evaluate",
];

/// GitHub MCP tools for repository and issue management
pub const GITHUB_TOOLS: &[&str] = &[
    // Repository
    "mcp__github__get_file_contents",
    "mcp__github__search_repositories",
    "mcp__github__create_repository",
    "mcp__github__get_repository",
    // Issues
    "mcp__github__create_issue",
    "mcp__github__get_issue",
    "mcp__github__update_issue",
    "mcp__github__list_issues",
    "mcp__github__add_issue_comment",
    "mcp__github__search_issues",
    // Labels
    "mcp__github__create_label",
    "mcp__github__get_label",
    "mcp__github__list_labels",
    // Pull requests
    "mcp__github__create_pull_request",
    "mcp__github__get_pull_request",
    "mcp__github__list_pull_requests",
];

/// Environment variable the GitHub MCP server reads its token from.
pub const GITHUB_SERVER_TOKEN_VAR: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

/// How the host launches an external tool server (stdio transport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServer {
    pub command: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl McpServer {
    pub fn npx(args: &[&str]) -> Self {
        Self {
            command: "npx".to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }
}

/// An external capability set served by one tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSet {
    /// Server name, also the `mcp__{name}__` prefix of its tools.
    pub name: String,
    pub tools: Vec<String>,
    pub server: McpServer,
}

impl ToolSet {
    pub fn new(name: &str, tools: &[&str], server: McpServer) -> Self {
        Self {
            name: name.to_string(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
            server,
        }
    }
}

/// Every tool a session may use: built-ins plus external tool sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolManifest {
    pub builtin: Vec<String>,
    pub external: Vec<ToolSet>,
}

impl ToolManifest {
    /// Built-ins, browser automation (puppeteer) and repository
    /// management (github, authenticated with `github_token`).
    pub fn standard(github_token: &str) -> Self {
        Self {
            builtin: BUILTIN_TOOLS.iter().map(|t| t.to_string()).collect(),
            external: vec![
                ToolSet::new(
                    "puppeteer",
                    PUPPETEER_TOOLS,
                    McpServer::npx(&["puppeteer-mcp-server"]),
                ),
                ToolSet::new(
                    "github",
                    GITHUB_TOOLS,
                    McpServer::npx(&["-y", "@modelcontextprotocol/server-github"])
                        .with_env(GITHUB_SERVER_TOKEN_VAR, github_token),
                ),
            ],
        }
    }

    /// Built-in tools that operate on files (everything but the shell).
    pub fn file_tools(&self) -> impl Iterator<Item = &str> {
        self.builtin
            .iter()
            .map(String::as_str)
            .filter(|t| *t != BASH_TOOL)
    }

    pub fn has_shell(&self) -> bool {
        self.builtin.iter().any(|t| t == BASH_TOOL)
    }

    /// External tool names, in manifest order.
    pub fn external_tools(&self) -> impl Iterator<Item = &str> {
        self.external
            .iter()
            .flat_map(|set| set.tools.iter().map(String::as_str))
    }

    /// Built-in then external tool names.
    pub fn allowed_tools(&self) -> Vec<String> {
        self.builtin
            .iter()
            .map(String::as_str)
            .chain(self.external_tools())
            .map(str::to_string)
            .collect()
    }

    pub fn servers(&self) -> BTreeMap<String, McpServer> {
        self.external
            .iter()
            .map(|set| (set.name.clone(), set.server.clone()))
            .collect()
    }
}
