pub mod mcp;

use axum::routing::post;
use axum::Router;

use crate::state::AppState;

/// Build the MCP endpoint router.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/mcp",
        post(mcp::post_mcp).get(mcp::get_mcp).delete(mcp::delete_mcp),
    )
}
