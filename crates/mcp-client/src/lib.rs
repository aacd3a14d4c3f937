//! `mcpr-client` — child-side MCP plumbing for the router.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for the MCP dialect.
//! - A line-framed transport over async byte streams, tolerant of
//!   partial chunks and malformed lines.
//! - A full-duplex [`McpClient`] that correlates responses by id, so a
//!   child can answer concurrent requests in any order.
//! - The unified [`CapabilityRegistry`] mapping namespaced identifiers
//!   to their owning child.
//! - A [`ServerManager`] that spawns, discovers, and supervises the
//!   configured children.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mcpr_client::{CapabilityRegistry, ServerManager};
//!
//! let registry = Arc::new(RwLock::new(CapabilityRegistry::new()));
//! let manager = ServerManager::new(registry.clone());
//! manager.spawn_all(&config.enabled_servers()).await;
//!
//! // Dispatch a namespaced call.
//! let entry = registry.read().tool("weather_get_forecast").cloned();
//! ```

pub mod client;
pub mod protocol;
pub mod registry;
pub mod supervisor;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod transport;

// Re-exports for convenience.
pub use client::{ClientError, McpClient};
pub use registry::{CapabilityRegistry, SharedRegistry};
pub use supervisor::{ChildState, ServerManager, SpawnError};
