//! Router configuration.
//!
//! The router reads a JSON document (conventionally
//! `watson_mcprouter_config.json`) with one recognized root key:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "weather": {
//!       "type": "stdio",
//!       "command": "npx",
//!       "args": ["-y", "@example/weather-mcp"],
//!       "env": { "API_KEY": "..." },
//!       "cwd": "/srv/weather",
//!       "disabled": false,
//!       "timeout": 30000
//!     }
//!   }
//! }
//! ```
//!
//! Unknown keys are ignored at both levels. Entries are kept in file
//! order; the supervisor spawns them in that order and list responses
//! inherit it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Transport kind for connecting to a child server.
///
/// Only `stdio` is supported; any other value parses as
/// [`TransportKind::Unsupported`] so the entry can be skipped with a
/// warning instead of failing the whole configuration.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    #[serde(other)]
    Unsupported,
}

/// One `mcpServers` entry as it appears in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    #[serde(rename = "type")]
    pub transport: TransportKind,

    /// The executable to spawn.
    pub command: String,

    /// Arguments to pass to the command. May be empty.
    pub args: Vec<String>,

    /// Extra environment variables, merged over the inherited
    /// environment. Entry values win.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory for the child.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub disabled: bool,

    /// Per-request deadline in milliseconds. No deadline when absent.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// A validated child server definition with its alias attached.
/// Read-only after load.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub alias: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RouterConfig
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(rename = "mcpServers", default)]
    mcp_servers: serde_json::Map<String, serde_json::Value>,
}

/// The parsed configuration document.
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    entries: Vec<(String, ServerEntry)>,
}

impl RouterConfig {
    /// Load and validate the configuration file. Missing, unparseable,
    /// or semantically invalid configuration is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Parse a configuration document from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: RawConfig = serde_json::from_str(raw)
            .map_err(|e| Error::Config(format!("parsing config: {e}")))?;

        let mut entries = Vec::with_capacity(doc.mcp_servers.len());
        for (alias, value) in doc.mcp_servers {
            if alias.is_empty() {
                return Err(Error::Config("server alias must not be empty".into()));
            }
            let entry: ServerEntry = serde_json::from_value(value)
                .map_err(|e| Error::Config(format!("server '{alias}': {e}")))?;
            entries.push((alias, entry));
        }
        Ok(Self { entries })
    }

    /// Number of configured entries, including disabled ones.
    pub fn server_count(&self) -> usize {
        self.entries.len()
    }

    /// The servers eligible to spawn, in file order. Disabled entries
    /// and entries with an unsupported transport are skipped with a
    /// warning.
    pub fn enabled_servers(&self) -> Vec<ServerConfig> {
        let mut servers = Vec::with_capacity(self.entries.len());
        for (alias, entry) in &self.entries {
            if entry.disabled {
                tracing::info!(alias = %alias, "server disabled, skipping");
                continue;
            }
            if entry.transport != TransportKind::Stdio {
                tracing::warn!(alias = %alias, "unsupported transport type, skipping");
                continue;
            }
            servers.push(ServerConfig {
                alias: alias.clone(),
                command: entry.command.clone(),
                args: entry.args.clone(),
                env: entry.env.clone(),
                cwd: entry.cwd.clone(),
                timeout: entry.timeout.map(Duration::from_millis),
            });
        }
        servers
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Listener address
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the HTTP surface binds. The configuration file format is fixed
/// by contract, so the listener comes from `MCP_ROUTER_HOST` /
/// `MCP_ROUTER_PORT` instead.
#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl ListenConfig {
    /// Resolve from the environment, falling back to `127.0.0.1:3000`.
    pub fn from_env() -> Self {
        let mut listen = Self::default();
        if let Ok(host) = std::env::var("MCP_ROUTER_HOST") {
            listen.host = host;
        }
        if let Ok(port) = std::env::var("MCP_ROUTER_PORT") {
            match port.parse() {
                Ok(p) => listen.port = p,
                Err(_) => {
                    tracing::warn!(value = %port, "invalid MCP_ROUTER_PORT, using default")
                }
            }
        }
        listen
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
