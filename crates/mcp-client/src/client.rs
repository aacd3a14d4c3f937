//! Child MCP client.
//!
//! A minimal JSON-RPC 2.0 client specialized for MCP, one per child
//! server. Owns the child's stdio pair: a reader task correlates
//! responses to callers by id, so many requests can be in flight at
//! once and the child may answer them in any order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{oneshot, watch};

use crate::protocol::{
    self, JsonRpcError, JsonRpcNotification, JsonRpcRequest, McpPrompt, McpResource, McpTool,
};
use crate::transport::{MessageReader, MessageWriter, TransportError};

/// Errors surfaced by client calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// Structured error returned by the child. Carried verbatim.
    #[error("{0}")]
    Rpc(JsonRpcError),

    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("connection closed before a response arrived")]
    Closed,
}

type Pending = oneshot::Sender<Result<Value, ClientError>>;

/// State shared between callers and the reader task.
struct Shared {
    name: String,
    /// Map of request id → pending completion sender.
    pending: Mutex<HashMap<u64, Pending>>,
    next_id: AtomicU64,
    alive: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl Shared {
    /// Route one inbound message: responses complete their pending
    /// entry; notifications are accepted and dropped.
    fn handle_message(&self, msg: Value) {
        if let Some(method) = msg.get("method").and_then(Value::as_str) {
            // Server-initiated notification (or request, which this
            // subset never answers). Must be accepted without error.
            tracing::debug!(server = %self.name, method, "notification from child");
            return;
        }

        let Some(id) = msg.get("id").and_then(Value::as_u64) else {
            tracing::debug!(server = %self.name, "dropping message without method or numeric id");
            return;
        };
        let Some(tx) = self.pending.lock().remove(&id) else {
            tracing::debug!(server = %self.name, id, "response for unknown request id");
            return;
        };

        let outcome = if let Some(err) = msg.get("error") {
            let err = serde_json::from_value::<JsonRpcError>(err.clone()).unwrap_or_else(|e| {
                JsonRpcError {
                    code: -32603,
                    message: format!("malformed error object from child: {e}"),
                    data: None,
                }
            });
            Err(ClientError::Rpc(err))
        } else {
            Ok(msg.get("result").cloned().unwrap_or(Value::Null))
        };
        let _ = tx.send(outcome);
    }

    /// Mark the connection closed and fail every in-flight request.
    fn close(&self, reason: &str) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<(u64, Pending)> = {
            let mut pending = self.pending.lock();
            pending.drain().collect()
        };
        if !drained.is_empty() {
            tracing::warn!(
                server = %self.name,
                in_flight = drained.len(),
                reason,
                "failing in-flight requests"
            );
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(ClientError::Closed));
        }
        let _ = self.closed_tx.send(true);
    }
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: MessageReader<R>, shared: Arc<Shared>) {
    while let Some(msg) = reader.next().await {
        match msg {
            Ok(msg) => shared.handle_message(msg),
            Err(TransportError::Decode(e)) => {
                tracing::warn!(server = %shared.name, error = %e, "discarding malformed line from child");
            }
            Err(e) => {
                tracing::warn!(server = %shared.name, error = %e, "child stream error");
                break;
            }
        }
    }
    shared.close("child stream closed");
}

/// JSON-RPC 2.0 client over a line-framed stream pair.
pub struct McpClient {
    shared: Arc<Shared>,
    writer: TokioMutex<MessageWriter<Box<dyn AsyncWrite + Send + Unpin>>>,
    timeout: Option<Duration>,
    closed_rx: watch::Receiver<bool>,
}

impl McpClient {
    /// Wire a client over a child's (stdout, stdin) pair — or any byte
    /// stream pair — and spawn its reader task.
    pub fn new(
        name: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        timeout: Option<Duration>,
    ) -> Self {
        let (closed_tx, closed_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            name: name.into(),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            closed_tx,
        });
        tokio::spawn(read_loop(MessageReader::new(reader), shared.clone()));
        Self {
            shared,
            writer: TokioMutex::new(MessageWriter::new(Box::new(writer))),
            timeout,
            closed_rx,
        }
    }

    /// Send a request and wait for its correlated response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        if !self.shared.alive.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let msg = serde_json::to_value(JsonRpcRequest::new(id, method, params))
            .map_err(TransportError::Json)?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);

        tracing::debug!(server = %self.shared.name, id, method, "sending request");
        if let Err(e) = self.writer.lock().await.send(&msg).await {
            self.shared.pending.lock().remove(&id);
            return Err(e.into());
        }

        match self.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(ClientError::Closed),
                Err(_) => {
                    self.shared.pending.lock().remove(&id);
                    Err(ClientError::Timeout(deadline))
                }
            },
            None => rx.await.unwrap_or(Err(ClientError::Closed)),
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ClientError> {
        if !self.shared.alive.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        let msg = serde_json::to_value(JsonRpcNotification::new(method, params))
            .map_err(TransportError::Json)?;
        self.writer.lock().await.send(&msg).await?;
        Ok(())
    }

    /// MCP handshake: `initialize` followed by `notifications/initialized`.
    pub async fn initialize(&self) -> Result<Value, ClientError> {
        let params =
            serde_json::to_value(protocol::initialize_params()).map_err(TransportError::Json)?;
        let result = self.request("initialize", Some(params)).await?;
        self.notify("notifications/initialized", None).await?;
        Ok(result)
    }

    /// `tools/list`, lenient: a missing or non-array `tools` field is an
    /// empty list with a warning, not an error.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, ClientError> {
        let result = self.request("tools/list", None).await?;
        Ok(extract_list(&self.shared.name, &result, "tools"))
    }

    /// `resources/list`, with the same leniency as [`Self::list_tools`].
    pub async fn list_resources(&self) -> Result<Vec<McpResource>, ClientError> {
        let result = self.request("resources/list", None).await?;
        Ok(extract_list(&self.shared.name, &result, "resources"))
    }

    /// `prompts/list`, with the same leniency as [`Self::list_tools`].
    pub async fn list_prompts(&self) -> Result<Vec<McpPrompt>, ClientError> {
        let result = self.request("prompts/list", None).await?;
        Ok(extract_list(&self.shared.name, &result, "prompts"))
    }

    /// `tools/call` — the child's result is returned verbatim.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ClientError> {
        self.request(
            "tools/call",
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    /// `resources/read` — the child's result is returned verbatim.
    pub async fn read_resource(&self, uri: &str) -> Result<Value, ClientError> {
        self.request("resources/read", Some(json!({ "uri": uri }))).await
    }

    /// `prompts/get` — the child's result is returned verbatim.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<Value, ClientError> {
        let params = match arguments {
            Some(args) => json!({ "name": name, "arguments": args }),
            None => json!({ "name": name }),
        };
        self.request("prompts/get", Some(params)).await
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Resolves once the child's stream has closed (or [`Self::close`]
    /// was called).
    pub async fn wait_closed(&self) {
        let mut rx = self.closed_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Close the connection: fail in-flight requests and end the
    /// outbound stream, delivering EOF to the child's stdin.
    pub async fn close(&self) {
        self.shared.close("closed by router");
        if let Err(e) = self.writer.lock().await.shutdown().await {
            tracing::debug!(server = %self.shared.name, error = %e, "error closing child stdin");
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.shared.pending.lock().len()
    }
}

/// Pull `result[key]` out as a typed list, degrading anything
/// unexpected to an empty list with a warning so partially-capable
/// children remain usable.
fn extract_list<T: DeserializeOwned>(server: &str, result: &Value, key: &str) -> Vec<T> {
    let Some(items) = result.get(key).and_then(Value::as_array) else {
        tracing::warn!(
            server = %server,
            key,
            "list response missing expected array, treating as empty"
        );
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(server = %server, key, error = %e, "skipping unparseable entry");
                None
            }
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
