// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON-lines server over a UNIX domain socket.
//!
//! Accepts multiple concurrent bridge clients, each assigned an opaque
//! client id. Outbound frames go through a bounded per-client buffer: on
//! overflow the oldest non-critical frame is dropped; if a critical frame
//! cannot be buffered the client is disconnected instead.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_core::WardenError;

use crate::protocol::{InboundFrame, OutboundFrame};

/// Opaque id for one connected bridge client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Events surfaced to the gateway.
#[derive(Debug)]
pub enum ServerEvent {
    Connected(ClientId),
    Disconnected(ClientId),
    Frame(ClientId, InboundFrame),
}

struct ClientState {
    queue: Mutex<VecDeque<OutboundFrame>>,
    notify: Notify,
    disconnect: CancellationToken,
}

/// The gateway side of the bridge transport.
pub struct BridgeServer {
    socket_path: PathBuf,
    send_buffer: usize,
    clients: Arc<Mutex<HashMap<ClientId, Arc<ClientState>>>>,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

impl BridgeServer {
    pub fn new(socket_path: impl AsRef<Path>, send_buffer: usize) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            send_buffer,
            clients: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Bind the socket (removing a stale file) and start accepting.
    ///
    /// Returns the event stream the gateway consumes.
    pub async fn start(self: &Arc<Self>) -> Result<mpsc::Receiver<ServerEvent>, WardenError> {
        if self.socket_path.exists() {
            debug!(path = %self.socket_path.display(), "removing stale socket file");
            std::fs::remove_file(&self.socket_path)
                .map_err(|e| WardenError::transport("stale socket removal failed", e))?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WardenError::transport("socket directory creation failed", e))?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|e| WardenError::transport("socket bind failed", e))?;
        info!(path = %self.socket_path.display(), "bridge server listening");

        let (events_tx, events_rx) = mpsc::channel(256);
        let server = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _)) => server.clone().admit(stream, events_tx.clone()),
                            Err(e) => warn!(error = %e, "accept failed"),
                        }
                    }
                    _ = server.cancel.cancelled() => break,
                }
            }
        });

        Ok(events_rx)
    }

    /// Stop accepting, disconnect every client, unlink the socket.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let clients: Vec<Arc<ClientState>> = {
            let mut map = self.clients.lock().expect("clients lock poisoned");
            map.drain().map(|(_, state)| state).collect()
        };
        for client in clients {
            client.disconnect.cancel();
        }
        let _ = std::fs::remove_file(&self.socket_path);
        info!("bridge server stopped");
    }

    /// Queue a frame for one client. Returns false if the client is gone.
    pub fn send(&self, client_id: ClientId, frame: OutboundFrame) -> bool {
        let state = {
            let clients = self.clients.lock().expect("clients lock poisoned");
            clients.get(&client_id).cloned()
        };
        match state {
            Some(state) => {
                self.enqueue(client_id, &state, frame);
                true
            }
            None => false,
        }
    }

    /// Queue a frame for every connected client.
    pub fn broadcast(&self, frame: OutboundFrame) {
        let clients: Vec<(ClientId, Arc<ClientState>)> = {
            let map = self.clients.lock().expect("clients lock poisoned");
            map.iter().map(|(id, state)| (*id, state.clone())).collect()
        };
        for (id, state) in clients {
            self.enqueue(id, &state, frame.clone());
        }
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().expect("clients lock poisoned").len()
    }

    fn enqueue(&self, client_id: ClientId, state: &ClientState, frame: OutboundFrame) {
        let mut queue = state.queue.lock().expect("queue lock poisoned");
        if queue.len() >= self.send_buffer {
            // Make room by dropping the oldest non-critical frame.
            let dropped = queue
                .iter()
                .position(|f| !f.is_critical())
                .map(|i| queue.remove(i));
            if dropped.is_none() {
                if frame.is_critical() {
                    // All buffered frames are critical and so is this one:
                    // the client is too slow to be trusted with approvals.
                    warn!(%client_id, "send buffer full of critical frames, disconnecting");
                    drop(queue);
                    state.disconnect.cancel();
                    return;
                }
                debug!(%client_id, "dropping non-critical frame under backpressure");
                return;
            }
        }
        queue.push_back(frame);
        drop(queue);
        state.notify.notify_one();
    }

    fn admit(self: Arc<Self>, stream: UnixStream, events: mpsc::Sender<ServerEvent>) {
        let client_id = ClientId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let state = Arc::new(ClientState {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            disconnect: CancellationToken::new(),
        });
        self.clients
            .lock()
            .expect("clients lock poisoned")
            .insert(client_id, state.clone());
        info!(%client_id, "bridge client connected");

        tokio::spawn(async move {
            let _ = events.send(ServerEvent::Connected(client_id)).await;
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();

            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                let trimmed = line.trim();
                                if trimmed.is_empty() {
                                    continue;
                                }
                                match serde_json::from_str::<InboundFrame>(trimmed) {
                                    Ok(frame) => {
                                        let _ = events
                                            .send(ServerEvent::Frame(client_id, frame))
                                            .await;
                                    }
                                    Err(e) => {
                                        warn!(%client_id, error = %e, "rejecting malformed frame");
                                        self.send(
                                            client_id,
                                            OutboundFrame::Error {
                                                message: format!("malformed frame: {e}"),
                                            },
                                        );
                                    }
                                }
                            }
                            // EOF or a non-UTF-8 line: the link is done.
                            Ok(None) => break,
                            Err(e) => {
                                debug!(%client_id, error = %e, "read error, dropping client");
                                break;
                            }
                        }
                    }
                    _ = state.notify.notified() => {
                        loop {
                            let frame = state
                                .queue
                                .lock()
                                .expect("queue lock poisoned")
                                .pop_front();
                            let Some(frame) = frame else { break };
                            let mut line = serde_json::to_string(&frame)
                                .expect("outbound frames always serialize");
                            line.push('\n');
                            if write_half.write_all(line.as_bytes()).await.is_err() {
                                state.disconnect.cancel();
                                break;
                            }
                        }
                    }
                    _ = state.disconnect.cancelled() => break,
                }
            }

            self.clients
                .lock()
                .expect("clients lock poisoned")
                .remove(&client_id);
            let _ = events.send(ServerEvent::Disconnected(client_id)).await;
            info!(%client_id, "bridge client disconnected");
        });
    }
}
