//! Unified capability registry.
//!
//! Maps outward (namespaced) identifiers to the child that owns them.
//! Unified names are minted once at registration and treated as opaque
//! labels afterwards: dispatch always goes through the stored
//! `server_alias` + original name, never by parsing the unified form,
//! so aliases containing `_` cannot be misrouted.
//!
//! List order is deterministic: children in configuration order,
//! capabilities within a child in the order the child reported them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Registry shared between the supervisor (writer) and dispatch
/// handlers (readers).
pub type SharedRegistry = Arc<RwLock<CapabilityRegistry>>;

/// Mint the outward identifier for a child capability.
pub fn unified_name(alias: &str, original: &str) -> String {
    format!("{alias}_{original}")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub unified_name: String,
    pub original_name: String,
    pub server_alias: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Deep copy of the child's `inputSchema` taken at discovery time,
    /// so later child mutation cannot corrupt it.
    pub input_schema: Value,
}

#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub unified_uri: String,
    pub original_uri: String,
    pub server_alias: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PromptEntry {
    pub unified_name: String,
    pub original_name: String,
    pub server_alias: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub arguments: Option<Value>,
}

/// Per-alias reverse index for O(k) removal on child exit.
#[derive(Debug, Default)]
struct OwnedKeys {
    tools: Vec<String>,
    resources: Vec<String>,
    prompts: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CapabilityRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// All capabilities currently exposed by ready children.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    tools: HashMap<String, ToolEntry>,
    tool_order: Vec<String>,
    resources: HashMap<String, ResourceEntry>,
    resource_order: Vec<String>,
    prompts: HashMap<String, PromptEntry>,
    prompt_order: Vec<String>,
    owned: HashMap<String, OwnedKeys>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tool entry. On a unified-name collision the first
    /// registration wins and the loser is logged.
    pub fn insert_tool(&mut self, entry: ToolEntry) -> bool {
        if let Some(existing) = self.tools.get(&entry.unified_name) {
            tracing::warn!(
                unified = %entry.unified_name,
                winner = %existing.server_alias,
                loser = %entry.server_alias,
                "tool name collision, keeping first registration"
            );
            return false;
        }
        self.owned
            .entry(entry.server_alias.clone())
            .or_default()
            .tools
            .push(entry.unified_name.clone());
        self.tool_order.push(entry.unified_name.clone());
        self.tools.insert(entry.unified_name.clone(), entry);
        true
    }

    /// Insert a resource entry, first-wins on collision.
    pub fn insert_resource(&mut self, entry: ResourceEntry) -> bool {
        if let Some(existing) = self.resources.get(&entry.unified_uri) {
            tracing::warn!(
                unified = %entry.unified_uri,
                winner = %existing.server_alias,
                loser = %entry.server_alias,
                "resource URI collision, keeping first registration"
            );
            return false;
        }
        self.owned
            .entry(entry.server_alias.clone())
            .or_default()
            .resources
            .push(entry.unified_uri.clone());
        self.resource_order.push(entry.unified_uri.clone());
        self.resources.insert(entry.unified_uri.clone(), entry);
        true
    }

    /// Insert a prompt entry, first-wins on collision.
    pub fn insert_prompt(&mut self, entry: PromptEntry) -> bool {
        if let Some(existing) = self.prompts.get(&entry.unified_name) {
            tracing::warn!(
                unified = %entry.unified_name,
                winner = %existing.server_alias,
                loser = %entry.server_alias,
                "prompt name collision, keeping first registration"
            );
            return false;
        }
        self.owned
            .entry(entry.server_alias.clone())
            .or_default()
            .prompts
            .push(entry.unified_name.clone());
        self.prompt_order.push(entry.unified_name.clone());
        self.prompts.insert(entry.unified_name.clone(), entry);
        true
    }

    /// Remove every capability owned by `alias`, via the reverse index.
    /// Entries that lost a collision to another child are untouched.
    pub fn remove_alias(&mut self, alias: &str) {
        let Some(owned) = self.owned.remove(alias) else {
            return;
        };
        for key in &owned.tools {
            self.tools.remove(key);
        }
        for key in &owned.resources {
            self.resources.remove(key);
        }
        for key in &owned.prompts {
            self.prompts.remove(key);
        }
        self.tool_order.retain(|k| self.tools.contains_key(k));
        self.resource_order.retain(|k| self.resources.contains_key(k));
        self.prompt_order.retain(|k| self.prompts.contains_key(k));
    }

    /// Drop everything (router shutdown).
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn tool(&self, unified: &str) -> Option<&ToolEntry> {
        self.tools.get(unified)
    }

    pub fn resource(&self, unified: &str) -> Option<&ResourceEntry> {
        self.resources.get(unified)
    }

    pub fn prompt(&self, unified: &str) -> Option<&PromptEntry> {
        self.prompts.get(unified)
    }

    /// Tools in registration order.
    pub fn tools(&self) -> impl Iterator<Item = &ToolEntry> {
        self.tool_order.iter().filter_map(|k| self.tools.get(k))
    }

    /// Resources in registration order.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceEntry> {
        self.resource_order.iter().filter_map(|k| self.resources.get(k))
    }

    /// Prompts in registration order.
    pub fn prompts(&self) -> impl Iterator<Item = &PromptEntry> {
        self.prompt_order.iter().filter_map(|k| self.prompts.get(k))
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
