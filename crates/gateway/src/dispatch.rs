//! Proxy dispatch — routes incoming MCP calls onto the owning child.
//!
//! Lookups resolve a unified name to its registry entry and dispatch
//! through the entry's stored alias and original name; the unified name
//! itself is never parsed. Child responses flow back verbatim. Any
//! failure on the way to or inside a child is shaped into an MCP error
//! result (`isError: true`) so downstream clients never see a
//! transport-level failure for a forwarding problem.

use serde_json::{json, Map, Value};

use mcpr_client::protocol::error_codes::{INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND};
use mcpr_client::protocol::PROTOCOL_VERSION;

use crate::state::AppState;

/// Resource URI of the router's own stats document. Always present and
/// never namespaced.
pub const STATS_URI: &str = "stats://mcp-router-server";

/// Build a JSON-RPC error response envelope.
pub fn error_response(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() },
    })
}

/// A method-level failure that becomes a JSON-RPC error (as opposed to
/// an MCP-shaped `isError` result).
struct RpcFailure {
    code: i64,
    message: String,
}

impl RpcFailure {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }
}

/// Dispatch one decoded JSON-RPC message.
///
/// Returns `None` for notifications (nothing is due back) and
/// `Some(response)` for requests.
pub async fn dispatch(state: &AppState, msg: &Value) -> Option<Value> {
    if !msg.is_object() {
        return Some(error_response(Value::Null, INVALID_REQUEST, "Invalid Request"));
    }
    let method = msg.get("method").and_then(Value::as_str).unwrap_or_default();
    let Some(id) = msg.get("id").cloned() else {
        tracing::debug!(method, "notification from client");
        return None;
    };
    let params = msg.get("params");

    let outcome = match method {
        "initialize" => Ok(initialize_result()),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(list_tools(state)),
        "tools/call" => call_tool(state, params).await,
        "resources/list" => Ok(list_resources(state)),
        "resources/read" => read_resource(state, params).await,
        "prompts/list" => Ok(list_prompts(state)),
        "prompts/get" => get_prompt(state, params).await,
        _ => Err(RpcFailure {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {method}"),
        }),
    };

    Some(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(failure) => error_response(id, failure.code, failure.message),
    })
}

/// The router's own `initialize` result.
fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": true },
            "resources": {},
            "prompts": {},
        },
        "serverInfo": {
            "name": "mcp-router-server",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// An MCP-shaped error result: well-formed for every capability kind.
fn capability_error(text: String) -> Value {
    json!({
        "isError": true,
        "content": [{ "type": "text", "text": text }],
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn list_tools(state: &AppState) -> Value {
    let registry = state.registry.read();
    let tools: Vec<Value> = registry
        .tools()
        .map(|t| {
            let mut obj = Map::new();
            obj.insert("name".into(), t.unified_name.clone().into());
            if let Some(title) = &t.title {
                obj.insert("title".into(), title.clone().into());
            }
            if let Some(description) = &t.description {
                obj.insert("description".into(), description.clone().into());
            }
            obj.insert("inputSchema".into(), t.input_schema.clone());
            Value::Object(obj)
        })
        .collect();
    json!({ "tools": tools })
}

async fn call_tool(state: &AppState, params: Option<&Value>) -> Result<Value, RpcFailure> {
    let name = params
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| RpcFailure::invalid_params("tools/call requires a string 'name'"))?;
    let arguments = params
        .and_then(|p| p.get("arguments"))
        .cloned()
        .unwrap_or_else(|| json!({}));

    let target = {
        let registry = state.registry.read();
        registry
            .tool(name)
            .map(|t| (t.server_alias.clone(), t.original_name.clone()))
    };
    let Some((alias, original)) = target else {
        return Ok(capability_error(format!("Unknown tool: {name}")));
    };
    let Some(client) = state.manager.client_for(&alias) else {
        return Ok(capability_error(format!("Server '{alias}' is not available")));
    };

    tracing::debug!(tool = %name, alias = %alias, original = %original, "forwarding tools/call");
    match client.call_tool(&original, arguments).await {
        Ok(result) => Ok(result),
        Err(e) => Ok(capability_error(format!("Tool call failed: {e}"))),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resources
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn list_resources(state: &AppState) -> Value {
    let registry = state.registry.read();
    let mut resources: Vec<Value> = registry
        .resources()
        .map(|r| {
            let mut obj = Map::new();
            obj.insert("uri".into(), r.unified_uri.clone().into());
            if let Some(name) = &r.name {
                obj.insert("name".into(), name.clone().into());
            }
            if let Some(title) = &r.title {
                obj.insert("title".into(), title.clone().into());
            }
            if let Some(description) = &r.description {
                obj.insert("description".into(), description.clone().into());
            }
            if let Some(mime_type) = &r.mime_type {
                obj.insert("mimeType".into(), mime_type.clone().into());
            }
            Value::Object(obj)
        })
        .collect();
    resources.push(json!({
        "uri": STATS_URI,
        "name": "router-stats",
        "description": "Aggregate statistics for this MCP router",
        "mimeType": "application/json",
    }));
    json!({ "resources": resources })
}

fn stats_document(state: &AppState) -> Value {
    let registry = state.registry.read();
    json!({
        "activeServers": state.manager.ready_count(),
        "toolCount": registry.tool_count(),
        "resourceCount": registry.resource_count(),
        "promptCount": registry.prompt_count(),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
    })
}

async fn read_resource(state: &AppState, params: Option<&Value>) -> Result<Value, RpcFailure> {
    let uri = params
        .and_then(|p| p.get("uri"))
        .and_then(Value::as_str)
        .ok_or_else(|| RpcFailure::invalid_params("resources/read requires a string 'uri'"))?;

    if uri == STATS_URI {
        return Ok(json!({
            "contents": [{
                "uri": STATS_URI,
                "mimeType": "application/json",
                "text": stats_document(state).to_string(),
            }],
        }));
    }

    let target = {
        let registry = state.registry.read();
        registry
            .resource(uri)
            .map(|r| (r.server_alias.clone(), r.original_uri.clone()))
    };
    let Some((alias, original)) = target else {
        return Ok(capability_error(format!("Unknown resource: {uri}")));
    };
    let Some(client) = state.manager.client_for(&alias) else {
        return Ok(capability_error(format!("Server '{alias}' is not available")));
    };

    tracing::debug!(uri = %uri, alias = %alias, "forwarding resources/read");
    match client.read_resource(&original).await {
        Ok(result) => Ok(result),
        Err(e) => Ok(capability_error(format!("Resource read failed: {e}"))),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn list_prompts(state: &AppState) -> Value {
    let registry = state.registry.read();
    let prompts: Vec<Value> = registry
        .prompts()
        .map(|p| {
            let mut obj = Map::new();
            obj.insert("name".into(), p.unified_name.clone().into());
            if let Some(title) = &p.title {
                obj.insert("title".into(), title.clone().into());
            }
            if let Some(description) = &p.description {
                obj.insert("description".into(), description.clone().into());
            }
            if let Some(arguments) = &p.arguments {
                obj.insert("arguments".into(), arguments.clone());
            }
            Value::Object(obj)
        })
        .collect();
    json!({ "prompts": prompts })
}

async fn get_prompt(state: &AppState, params: Option<&Value>) -> Result<Value, RpcFailure> {
    let name = params
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| RpcFailure::invalid_params("prompts/get requires a string 'name'"))?;
    let arguments = params.and_then(|p| p.get("arguments")).cloned();

    let target = {
        let registry = state.registry.read();
        registry
            .prompt(name)
            .map(|p| (p.server_alias.clone(), p.original_name.clone()))
    };
    let Some((alias, original)) = target else {
        return Ok(capability_error(format!("Unknown prompt: {name}")));
    };
    let Some(client) = state.manager.client_for(&alias) else {
        return Ok(capability_error(format!("Server '{alias}' is not available")));
    };

    tracing::debug!(prompt = %name, alias = %alias, "forwarding prompts/get");
    match client.get_prompt(&original, arguments).await {
        Ok(result) => Ok(result),
        Err(e) => Ok(capability_error(format!("Prompt fetch failed: {e}"))),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
