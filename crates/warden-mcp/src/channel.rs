// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Newline-delimited JSON-RPC 2.0 channel over a server's stdio.
//!
//! One id counter per channel; outstanding calls live in a pending map and
//! responses are dispatched by id. Notifications are logged and dropped.
//! When the peer closes its stream, every pending call fails with a fixed
//! error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use warden_core::WardenError;

use crate::protocol::{RpcError, RpcFrame, RpcRequest};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<serde_json::Value, RpcError>>>>>;

/// Error every pending call fails with when the server stream closes.
const CHANNEL_CLOSED: &str = "mcp server stream closed";

/// A JSON-RPC channel to one MCP server.
pub struct JsonRpcChannel {
    server: String,
    next_id: AtomicU64,
    pending: PendingMap,
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Unpin + Send>>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl JsonRpcChannel {
    /// Attach a channel to a server's stdio pair and start the read loop.
    pub fn new(
        server: impl Into<String>,
        reader: impl AsyncRead + Unpin + Send + 'static,
        writer: impl AsyncWrite + Unpin + Send + 'static,
    ) -> Self {
        let server = server.into();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let reader_task = {
            let pending = pending.clone();
            let server = server.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(reader).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            let line = line.trim().to_string();
                            if line.is_empty() {
                                continue;
                            }
                            dispatch_frame(&server, &line, &pending);
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(server = %server, error = %e, "mcp read error");
                            break;
                        }
                    }
                }
                fail_all_pending(&pending);
                debug!(server = %server, "mcp read loop ended");
            })
        };

        Self {
            server,
            next_id: AtomicU64::new(1),
            pending,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            reader_task,
        }
    }

    /// Whether the read loop is still running.
    pub fn is_alive(&self) -> bool {
        !self.reader_task.is_finished()
    }

    /// Send one request and await its response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value, WardenError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(id, tx);

        let request = RpcRequest::new(id, method, params);
        let mut line = serde_json::to_string(&request).map_err(|e| WardenError::Mcp {
            server: self.server.clone(),
            message: format!("request serialization: {e}"),
        })?;
        line.push('\n');

        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(line.as_bytes())
                .await
                .map_err(|e| self.cleanup_and_err(id, format!("write failed: {e}")))?;
            writer
                .flush()
                .await
                .map_err(|e| self.cleanup_and_err(id, format!("flush failed: {e}")))?;
        }

        let outcome = tokio::time::timeout(timeout, rx).await;
        match outcome {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(rpc_error))) => Err(WardenError::Mcp {
                server: self.server.clone(),
                message: format!("rpc error {}: {}", rpc_error.code, rpc_error.message),
            }),
            // Sender dropped: the read loop failed everything.
            Ok(Err(_)) => Err(WardenError::Mcp {
                server: self.server.clone(),
                message: CHANNEL_CLOSED.to_string(),
            }),
            Err(_) => {
                self.pending
                    .lock()
                    .expect("pending lock poisoned")
                    .remove(&id);
                Err(WardenError::Timeout { duration: timeout })
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), WardenError> {
        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        let mut line = frame.to_string();
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| WardenError::Mcp {
                server: self.server.clone(),
                message: format!("notify write failed: {e}"),
            })?;
        writer.flush().await.map_err(|e| WardenError::Mcp {
            server: self.server.clone(),
            message: format!("notify flush failed: {e}"),
        })
    }

    /// Stop the read loop and fail anything still pending.
    pub async fn shutdown(&self) {
        self.reader_task.abort();
        fail_all_pending(&self.pending);
    }

    fn cleanup_and_err(&self, id: u64, message: String) -> WardenError {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&id);
        WardenError::Mcp {
            server: self.server.clone(),
            message,
        }
    }
}

fn dispatch_frame(server: &str, line: &str, pending: &PendingMap) {
    let frame: RpcFrame = match serde_json::from_str(line) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(server, error = %e, "unparseable mcp frame");
            return;
        }
    };

    match frame.id {
        Some(id) => {
            let waiter = pending.lock().expect("pending lock poisoned").remove(&id);
            match waiter {
                Some(tx) => {
                    let payload = match (frame.result, frame.error) {
                        (_, Some(error)) => Err(error),
                        (Some(result), None) => Ok(result),
                        (None, None) => Ok(serde_json::Value::Null),
                    };
                    let _ = tx.send(payload);
                }
                None => warn!(server, id, "response for unknown request id"),
            }
        }
        None => {
            // Interleaved notification.
            debug!(server, method = frame.method.as_deref().unwrap_or("?"), "mcp notification");
        }
    }
}

fn fail_all_pending(pending: &PendingMap) {
    let waiters: Vec<_> = pending
        .lock()
        .expect("pending lock poisoned")
        .drain()
        .collect();
    for (_, tx) in waiters {
        let _ = tx.send(Err(RpcError {
            code: -32000,
            message: CHANNEL_CLOSED.to_string(),
        }));
    }
}
