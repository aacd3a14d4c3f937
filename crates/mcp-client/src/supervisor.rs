//! Child process supervision.
//!
//! Materializes the configured `mcpServers` into running children:
//! spawns each process with piped stdio, wires it to a [`McpClient`],
//! runs the MCP handshake and capability discovery, and keeps the
//! shared registry consistent with child lifecycles. A child that
//! exits is purged and never respawned; it takes a router restart to
//! bring it back.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::Mutex as TokioMutex;

use mcpr_domain::config::ServerConfig;

use crate::client::McpClient;
use crate::protocol::{McpPrompt, McpResource, McpTool};
use crate::registry::{unified_name, PromptEntry, ResourceEntry, SharedRegistry, ToolEntry};

/// Errors that can occur while bringing a child up.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("spawn failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCP handshake failed: {0}")]
    Handshake(String),
}

/// Lifecycle state of a supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Spawning,
    Ready,
    Exited,
    Failed,
}

/// One supervised child server.
pub struct ChildRecord {
    pub alias: String,
    pub config: ServerConfig,
    client: Arc<McpClient>,
    state: RwLock<ChildState>,
    /// Process handle; `None` for externally connected clients.
    child: Option<TokioMutex<Child>>,
}

impl ChildRecord {
    pub fn state(&self) -> ChildState {
        *self.state.read()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ChildState::Ready
    }
}

/// Capabilities reported by one child during discovery.
struct Discovered {
    tools: Vec<McpTool>,
    resources: Vec<McpResource>,
    prompts: Vec<McpPrompt>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ServerManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Owns every [`ChildRecord`] and the registry writes that mirror
/// their lifecycles.
pub struct ServerManager {
    children: RwLock<HashMap<String, Arc<ChildRecord>>>,
    registry: SharedRegistry,
}

impl ServerManager {
    pub fn new(registry: SharedRegistry) -> Arc<Self> {
        Arc::new(Self {
            children: RwLock::new(HashMap::new()),
            registry,
        })
    }

    /// Spawn every configured child, in configuration order. A child
    /// that fails to spawn or complete its handshake is logged and
    /// skipped; the rest continue.
    pub async fn spawn_all(self: &Arc<Self>, configs: &[ServerConfig]) {
        for config in configs {
            if let Err(e) = self.spawn_child(config).await {
                tracing::warn!(
                    alias = %config.alias,
                    error = %e,
                    "failed to start MCP server, skipping"
                );
            }
        }
        tracing::info!(
            ready = self.ready_count(),
            configured = configs.len(),
            "child supervision ready"
        );
    }

    async fn spawn_child(self: &Arc<Self>, config: &ServerConfig) -> Result<(), SpawnError> {
        tracing::info!(
            alias = %config.alias,
            command = %config.command,
            "starting MCP server"
        );

        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Merge configured env over the inherited environment.
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "failed to capture child stdin")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "failed to capture child stdout")
        })?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_logger(config.alias.clone(), stderr);
        }

        let client = Arc::new(McpClient::new(
            config.alias.as_str(),
            stdout,
            stdin,
            config.timeout,
        ));
        let record = Arc::new(ChildRecord {
            alias: config.alias.clone(),
            config: config.clone(),
            client: client.clone(),
            state: RwLock::new(ChildState::Spawning),
            child: Some(TokioMutex::new(child)),
        });
        self.children
            .write()
            .insert(config.alias.clone(), record.clone());

        match connect_and_discover(&config.alias, &client).await {
            Ok(discovered) => {
                *record.state.write() = ChildState::Ready;
                self.register(&config.alias, discovered);
                self.watch_exit(record);
                Ok(())
            }
            Err(e) => {
                *record.state.write() = ChildState::Failed;
                record.client.close().await;
                if let Some(child) = &record.child {
                    let _ = child.lock().await.start_kill();
                }
                Err(e)
            }
        }
    }

    /// Insert one child's discoveries under its namespace.
    fn register(&self, alias: &str, discovered: Discovered) {
        let mut registry = self.registry.write();
        let (tools, resources, prompts) = (
            discovered.tools.len(),
            discovered.resources.len(),
            discovered.prompts.len(),
        );
        for tool in discovered.tools {
            registry.insert_tool(ToolEntry {
                unified_name: unified_name(alias, &tool.name),
                original_name: tool.name,
                server_alias: alias.into(),
                title: tool.title,
                description: tool.description,
                input_schema: tool.input_schema,
            });
        }
        for resource in discovered.resources {
            registry.insert_resource(ResourceEntry {
                unified_uri: unified_name(alias, &resource.uri),
                original_uri: resource.uri,
                server_alias: alias.into(),
                name: resource.name,
                title: resource.title,
                description: resource.description,
                mime_type: resource.mime_type,
            });
        }
        for prompt in discovered.prompts {
            registry.insert_prompt(PromptEntry {
                unified_name: unified_name(alias, &prompt.name),
                original_name: prompt.name,
                server_alias: alias.into(),
                title: prompt.title,
                description: prompt.description,
                arguments: prompt.arguments,
            });
        }
        tracing::info!(alias = %alias, tools, resources, prompts, "MCP server ready");
    }

    /// Purge a child the moment its stream closes.
    fn watch_exit(self: &Arc<Self>, record: Arc<ChildRecord>) {
        let manager = self.clone();
        tokio::spawn(async move {
            record.client.wait_closed().await;
            manager.handle_exit(&record).await;
        });
    }

    async fn handle_exit(&self, record: &Arc<ChildRecord>) {
        // Claim the record; shutdown drains the map first, so a child
        // no longer tracked was already terminated there and the purge
        // must not run twice.
        if self.children.write().remove(&record.alias).is_none() {
            return;
        }
        // Flip state and purge before waiting on the process so no
        // dispatch can observe an entry for a non-ready child.
        *record.state.write() = ChildState::Exited;
        self.registry.write().remove_alias(&record.alias);

        match &record.child {
            Some(child) => match child.lock().await.wait().await {
                Ok(status) => {
                    tracing::warn!(alias = %record.alias, code = ?status.code(), "MCP server exited")
                }
                Err(e) => {
                    tracing::warn!(alias = %record.alias, error = %e, "error waiting for MCP server process")
                }
            },
            None => tracing::warn!(alias = %record.alias, "MCP server stream closed"),
        }
    }

    /// The client for `alias`, only while its child is `ready`.
    pub fn client_for(&self, alias: &str) -> Option<Arc<McpClient>> {
        let children = self.children.read();
        let record = children.get(alias)?;
        if !record.is_ready() {
            return None;
        }
        Some(record.client.clone())
    }

    pub fn child_state(&self, alias: &str) -> Option<ChildState> {
        self.children.read().get(alias).map(|r| r.state())
    }

    /// Number of children currently `ready`.
    pub fn ready_count(&self) -> usize {
        self.children.read().values().filter(|r| r.is_ready()).count()
    }

    /// Terminate every child and clear the registry: signal each
    /// process, done. No waiting and no kill escalation. Draining the
    /// map first disarms the exit watchers, so the per-child purge
    /// path never runs for a child terminated here.
    pub async fn shutdown(&self) {
        let records: Vec<Arc<ChildRecord>> =
            self.children.write().drain().map(|(_, r)| r).collect();
        for record in &records {
            tracing::info!(alias = %record.alias, "terminating MCP server");
            *record.state.write() = ChildState::Exited;
            if let Some(child) = &record.child {
                if let Err(e) = child.lock().await.start_kill() {
                    tracing::debug!(alias = %record.alias, error = %e, "failed to signal MCP server");
                }
            }
            record.client.close().await;
        }
        self.registry.write().clear();
    }
}

/// `initialize` handshake plus capability discovery. A failed list call
/// degrades that category to empty; only a failed handshake is fatal
/// for the child.
async fn connect_and_discover(alias: &str, client: &McpClient) -> Result<Discovered, SpawnError> {
    client
        .initialize()
        .await
        .map_err(|e| SpawnError::Handshake(e.to_string()))?;

    let tools = match client.list_tools().await {
        Ok(tools) => tools,
        Err(e) => {
            tracing::warn!(alias = %alias, error = %e, "tools/list failed, child contributes no tools");
            Vec::new()
        }
    };
    let resources = match client.list_resources().await {
        Ok(resources) => resources,
        Err(e) => {
            tracing::warn!(alias = %alias, error = %e, "resources/list failed, child contributes no resources");
            Vec::new()
        }
    };
    let prompts = match client.list_prompts().await {
        Ok(prompts) => prompts,
        Err(e) => {
            tracing::warn!(alias = %alias, error = %e, "prompts/list failed, child contributes no prompts");
            Vec::new()
        }
    };

    Ok(Discovered {
        tools,
        resources,
        prompts,
    })
}

/// Forward child stderr lines to the log, tagged with the alias.
fn spawn_stderr_logger(alias: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.trim().is_empty() {
                tracing::warn!(alias = %alias, line = %line, "child stderr");
            }
        }
    });
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Test support
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(any(test, feature = "test-util"))]
impl ServerManager {
    /// Register an already-connected client as a ready child: run the
    /// handshake and discovery exactly as a spawned child would, minus
    /// the process.
    pub async fn adopt(
        self: &Arc<Self>,
        config: ServerConfig,
        client: McpClient,
    ) -> Result<(), SpawnError> {
        let alias = config.alias.clone();
        let client = Arc::new(client);
        let discovered = connect_and_discover(&alias, &client).await?;
        let record = Arc::new(ChildRecord {
            alias: alias.clone(),
            config,
            client,
            state: RwLock::new(ChildState::Ready),
            child: None,
        });
        self.children.write().insert(alias.clone(), record.clone());
        self.register(&alias, discovered);
        self.watch_exit(record);
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
