//! The `/mcp` endpoint — MCP streamable HTTP transport.
//!
//! - `POST` carries JSON-RPC traffic. The first `initialize` request
//!   (sent without a session header) mints a session whose id is
//!   returned in the `mcp-session-id` response header; every other
//!   request must present a valid id.
//! - `GET` opens the server→client event stream (SSE).
//! - `DELETE` tears the session down.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::FutureExt;
use serde_json::{json, Value};

use mcpr_client::protocol::error_codes::{INTERNAL_ERROR, INVALID_SESSION, PARSE_ERROR};

use crate::dispatch;
use crate::state::AppState;

/// Header carrying the session id on every request after `initialize`.
pub const SESSION_HEADER: &str = "mcp-session-id";

fn session_id<'h>(headers: &'h HeaderMap) -> Option<&'h str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

fn bad_session_response() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "jsonrpc": "2.0",
            "error": {
                "code": INVALID_SESSION,
                "message": "Bad Request: No valid session ID provided",
            },
            "id": null,
        })),
    )
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /mcp
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn post_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let msg: Value = match serde_json::from_slice(&body) {
        Ok(msg) => msg,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(dispatch::error_response(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {e}"),
                )),
            )
                .into_response();
        }
    };

    // Known session: plain dispatch.
    if let Some(sid) = session_id(&headers) {
        if state.sessions.get(sid).is_some() {
            return run_dispatch(&state, &msg).await;
        }
        return bad_session_response();
    }

    // No session id: only `initialize` may mint one.
    if msg.get("method").and_then(Value::as_str) == Some("initialize") {
        let session = state.sessions.create();
        tracing::info!(session = %session.id, "session initialized");
        let response = run_dispatch(&state, &msg).await;
        return ([(SESSION_HEADER, session.id.clone())], response).into_response();
    }

    bad_session_response()
}

/// Run the dispatcher, degrading panics to a JSON-RPC `-32003` response
/// with the request id preserved.
async fn run_dispatch(state: &AppState, msg: &Value) -> Response {
    let id = msg.get("id").cloned().unwrap_or(Value::Null);
    match std::panic::AssertUnwindSafe(dispatch::dispatch(state, msg))
        .catch_unwind()
        .await
    {
        Ok(Some(response)) => Json(response).into_response(),
        // Notification: acknowledged, nothing due back.
        Ok(None) => StatusCode::ACCEPTED.into_response(),
        Err(_) => {
            tracing::error!("dispatch handler panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(dispatch::error_response(
                    id,
                    INTERNAL_ERROR,
                    "Internal server error: handler panicked",
                )),
            )
                .into_response()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /mcp (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_mcp(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session) = session_id(&headers).and_then(|sid| state.sessions.get(sid)) else {
        return bad_session_response();
    };
    let Some(mut rx) = session.take_stream() else {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "event stream already attached" })),
        )
            .into_response();
    };

    let stream = async_stream::stream! {
        while let Some(msg) = rx.recv().await {
            yield Ok::<Event, std::convert::Infallible>(
                Event::default().event("message").data(msg.to_string()),
            );
        }
    };
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /mcp
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn delete_mcp(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match session_id(&headers) {
        Some(sid) if state.sessions.remove(sid) => {
            tracing::info!(session = %sid, "session terminated");
            StatusCode::OK.into_response()
        }
        _ => bad_session_response(),
    }
}
