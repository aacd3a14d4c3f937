//! In-process fakes for driving [`McpClient`] without child processes.
//!
//! Compiled for this crate's own tests and for dependents that enable
//! the `test-util` feature. A scripted server speaks newline-delimited
//! JSON-RPC over a `tokio::io::duplex` pipe, so client and supervisor
//! behavior can be exercised deterministically.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::client::McpClient;
use crate::protocol::{JsonRpcError, JsonRpcResponse, PROTOCOL_VERSION};
use crate::transport::{MessageReader, MessageWriter};

/// Handle to a scripted server task. Dropping it closes the server side
/// of the pipe, which the client observes as a child exit.
pub struct ScriptedServer {
    _stop: oneshot::Sender<()>,
}

impl ScriptedServer {
    /// Close the server side of the pipe immediately.
    pub fn stop(self) {}
}

/// Spawn a scripted MCP server over an in-memory pipe and return a
/// connected client.
///
/// `handler` receives `(method, params)` for every *request* and
/// returns `Some(Ok(result))` / `Some(Err(error))` to respond, or
/// `None` to stay silent. Notifications are consumed without reaching
/// the handler.
pub fn scripted_client<F>(
    name: &str,
    timeout: Option<Duration>,
    mut handler: F,
) -> (McpClient, ScriptedServer)
where
    F: FnMut(&str, Option<&Value>) -> Option<Result<Value, JsonRpcError>> + Send + 'static,
{
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (cr, cw) = tokio::io::split(client_io);
    let client = McpClient::new(name, cr, cw, timeout);

    let (sr, sw) = tokio::io::split(server_io);
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let mut reader = MessageReader::new(sr);
        let mut writer = MessageWriter::new(sw);
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                msg = reader.next() => {
                    let Some(Ok(msg)) = msg else { break };
                    let Some(id) = msg.get("id").and_then(Value::as_u64) else { continue };
                    let method = msg
                        .get("method")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let response = match handler(&method, msg.get("params")) {
                        Some(Ok(result)) => JsonRpcResponse::ok(id, result),
                        Some(Err(error)) => JsonRpcResponse::err(id, error),
                        None => continue,
                    };
                    let Ok(response) = serde_json::to_value(&response) else { break };
                    if writer.send(&response).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    (client, ScriptedServer { _stop: stop_tx })
}

/// Standard `initialize` result for scripted servers.
pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "serverInfo": { "name": "scripted", "version": "0.0.0" }
    })
}

/// Handler answering the full discovery sequence from canned lists.
/// Requests outside the discovery set get an empty object.
pub fn discovery_handler(
    tools: Vec<Value>,
    resources: Vec<Value>,
    prompts: Vec<Value>,
) -> impl FnMut(&str, Option<&Value>) -> Option<Result<Value, JsonRpcError>> + Send + 'static {
    move |method, _params| match method {
        "initialize" => Some(Ok(initialize_result())),
        "tools/list" => Some(Ok(json!({ "tools": tools.clone() }))),
        "resources/list" => Some(Ok(json!({ "resources": resources.clone() }))),
        "prompts/list" => Some(Ok(json!({ "prompts": prompts.clone() }))),
        _ => Some(Ok(json!({}))),
    }
}
