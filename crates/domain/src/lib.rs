//! `mcpr-domain` — configuration and shared error types for the MCP router.

pub mod config;
pub mod error;

// Re-exports for convenience.
pub use config::{ListenConfig, RouterConfig, ServerConfig, TransportKind};
pub use error::{Error, Result};
