use std::sync::Arc;
use std::time::Instant;

use mcpr_client::{ServerManager, SharedRegistry};

use crate::session::SessionMap;

/// Shared application state passed to all MCP handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ServerManager>,
    pub registry: SharedRegistry,
    pub sessions: Arc<SessionMap>,
    pub started_at: Instant,
}
