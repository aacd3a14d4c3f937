//! Line-framed JSON-RPC transport.
//!
//! Messages are UTF-8 JSON objects separated by a single line feed, with
//! no length prefix. [`LineBuffer`] reassembles frames from arbitrarily
//! split chunks; [`MessageReader`] and [`MessageWriter`] adapt that
//! framing onto async byte streams (a child's stdio pipes in production,
//! `tokio::io::duplex` pairs in tests).

use std::collections::VecDeque;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(serde_json::Error),

    /// A malformed line was received. The stream itself stays usable.
    #[error("malformed JSON line: {0}")]
    Decode(serde_json::Error),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound framing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Byte buffer that reassembles newline-delimited JSON messages from
/// arbitrarily split chunks. A partial trailing line stays buffered
/// until its terminator arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line it finishes.
    ///
    /// Lines are trimmed of surrounding whitespace; empty lines are
    /// skipped. A line that fails to parse yields a
    /// [`TransportError::Decode`] but later lines are still processed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Value, TransportError>> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(msg) => out.push(Ok(msg)),
                Err(e) => out.push(Err(TransportError::Decode(e))),
            }
        }
        out
    }

    /// Bytes of the buffered partial line.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

/// Some child servers emit `result.structuredContent: null` where the
/// downstream schema expects an object. Rewrite that one position to
/// `{}`; every other null in the message is preserved.
pub fn coerce_structured_content(msg: &mut Value) {
    if let Some(sc) = msg
        .get_mut("result")
        .and_then(|r| r.get_mut("structuredContent"))
    {
        if sc.is_null() {
            *sc = Value::Object(serde_json::Map::new());
        }
    }
}

/// Reads discrete JSON messages from a byte stream.
pub struct MessageReader<R> {
    reader: R,
    buf: LineBuffer,
    queued: VecDeque<Result<Value, TransportError>>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: LineBuffer::new(),
            queued: VecDeque::new(),
        }
    }

    /// The next inbound message, or `None` on end of stream.
    ///
    /// Decode failures are returned as errors without terminating the
    /// stream; the caller decides whether to keep reading.
    pub async fn next(&mut self) -> Option<Result<Value, TransportError>> {
        loop {
            if let Some(front) = self.queued.pop_front() {
                return Some(front.map(|mut msg| {
                    coerce_structured_content(&mut msg);
                    msg
                }));
            }

            let mut chunk = [0u8; 8192];
            match self.reader.read(&mut chunk).await {
                Ok(0) => return None,
                Ok(n) => self.queued.extend(self.buf.push(&chunk[..n])),
                Err(e) => return Some(Err(TransportError::Io(e))),
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound framing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Writes one JSON object per line.
pub struct MessageWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize, append `\n`, write, flush. The await inherits the
    /// stream's backpressure: a full pipe delays completion until drain.
    pub async fn send(&mut self, msg: &Value) -> Result<(), TransportError> {
        let mut line = serde_json::to_vec(msg).map_err(TransportError::Json)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// End the outbound stream. For a child's stdin this delivers EOF.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    fn ok_values(results: Vec<Result<Value, TransportError>>) -> Vec<Value> {
        results.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn whole_lines_in_one_chunk() {
        let mut buf = LineBuffer::new();
        let out = ok_values(buf.push(b"{\"a\":1}\n{\"b\":2}\n"));
        assert_eq!(out, vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn framing_survives_arbitrary_splits() {
        let messages = vec![
            json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}}),
            json!({"jsonrpc": "2.0", "method": "notifications/progress"}),
            json!({"jsonrpc": "2.0", "id": 2, "error": {"code": -1, "message": "x"}}),
        ];
        let mut wire = Vec::new();
        for msg in &messages {
            wire.extend_from_slice(msg.to_string().as_bytes());
            wire.push(b'\n');
        }

        // Feed the same byte stream at every possible chunk size; the
        // reassembled sequence must never change.
        for chunk_size in 1..=wire.len() {
            let mut buf = LineBuffer::new();
            let mut out = Vec::new();
            for chunk in wire.chunks(chunk_size) {
                out.extend(ok_values(buf.push(chunk)));
            }
            assert_eq!(out, messages, "chunk_size {chunk_size}");
            assert_eq!(buf.pending_len(), 0);
        }
    }

    #[test]
    fn partial_line_stays_buffered() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"a\"").is_empty());
        assert!(buf.pending_len() > 0);
        let out = ok_values(buf.push(b":1}\n"));
        assert_eq!(out, vec![json!({"a": 1})]);
    }

    #[test]
    fn empty_and_whitespace_lines_are_skipped() {
        let mut buf = LineBuffer::new();
        let out = ok_values(buf.push(b"\n   \n\r\n{\"a\":1}\r\n"));
        assert_eq!(out, vec![json!({"a": 1})]);
    }

    #[test]
    fn malformed_line_does_not_stop_the_stream() {
        let mut buf = LineBuffer::new();
        let out = buf.push(b"not json\n{\"ok\":true}\n");
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(TransportError::Decode(_))));
        assert_eq!(*out[1].as_ref().unwrap(), json!({"ok": true}));
    }

    #[test]
    fn coercion_rewrites_null_structured_content_only() {
        let mut msg = json!({"jsonrpc": "2.0", "id": 1, "result": {"structuredContent": null, "other": null}});
        coerce_structured_content(&mut msg);
        assert_eq!(msg["result"]["structuredContent"], json!({}));
        assert_eq!(msg["result"]["other"], Value::Null);
    }

    #[test]
    fn coercion_leaves_non_null_structured_content() {
        let mut msg = json!({"result": {"structuredContent": {"x": 1}}});
        coerce_structured_content(&mut msg);
        assert_eq!(msg["result"]["structuredContent"], json!({"x": 1}));
    }

    #[test]
    fn coercion_ignores_other_positions() {
        let mut msg = json!({"params": {"structuredContent": null}, "structuredContent": null});
        coerce_structured_content(&mut msg);
        assert_eq!(msg["params"]["structuredContent"], Value::Null);
        assert_eq!(msg["structuredContent"], Value::Null);
    }

    #[tokio::test]
    async fn reader_reassembles_partial_writes() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = MessageReader::new(rx);

        let write = tokio::spawn(async move {
            tx.write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,").await.unwrap();
            tx.write_all(b"\"result\":{\"structuredContent\":null}}\n").await.unwrap();
            tx.write_all(b"{\"a\":2}\n").await.unwrap();
            tx.shutdown().await.unwrap();
        });

        let first = reader.next().await.unwrap().unwrap();
        assert_eq!(first["result"]["structuredContent"], json!({}));
        let second = reader.next().await.unwrap().unwrap();
        assert_eq!(second, json!({"a": 2}));
        assert!(reader.next().await.is_none());
        write.await.unwrap();
    }

    #[tokio::test]
    async fn writer_terminates_each_message_with_newline() {
        let (tx, mut rx) = tokio::io::duplex(1024);
        let mut writer = MessageWriter::new(tx);
        writer.send(&json!({"a": 1})).await.unwrap();
        writer.send(&json!({"b": 2})).await.unwrap();
        writer.shutdown().await.unwrap();

        let mut raw = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut rx, &mut raw).await.unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert_eq!(text, "{\"a\":1}\n{\"b\":2}\n");
    }
}
