// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnecting bridge client.
//!
//! Used by bridge adapter processes to talk to the gateway socket. On an
//! unexpected close the client reconnects with bounded exponential backoff
//! until `disconnect()` is called.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use warden_core::WardenError;

use crate::protocol::{InboundFrame, OutboundFrame};

/// Initial reconnect delay.
const BACKOFF_INITIAL: Duration = Duration::from_millis(250);

/// Backoff ceiling.
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Events surfaced to the bridge adapter.
#[derive(Debug)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Frame(OutboundFrame),
}

/// A bridge-side client of the gateway socket.
pub struct BridgeClient {
    socket_path: PathBuf,
    outbound: mpsc::Sender<InboundFrame>,
    outbound_rx: Option<mpsc::Receiver<InboundFrame>>,
    should_reconnect: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
}

impl BridgeClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (outbound, outbound_rx) = mpsc::channel(256);
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            outbound,
            outbound_rx: Some(outbound_rx),
            should_reconnect: Arc::new(AtomicBool::new(true)),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the link is currently up.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queue a frame for the gateway.
    pub async fn send(&self, frame: InboundFrame) -> Result<(), WardenError> {
        self.outbound.send(frame).await.map_err(|_| {
            WardenError::Transport {
                message: "client connection task is gone".to_string(),
                source: None,
            }
        })
    }

    /// Stop reconnecting and let the current link drop.
    pub fn disconnect(&self) {
        self.should_reconnect.store(false, Ordering::SeqCst);
    }

    /// Start the connect/reconnect loop. Returns the event stream.
    ///
    /// May be called once; subsequent calls return an error.
    pub fn connect(&mut self) -> Result<mpsc::Receiver<ClientEvent>, WardenError> {
        let mut outbound_rx = self.outbound_rx.take().ok_or_else(|| {
            WardenError::Transport {
                message: "connect() may only be called once".to_string(),
                source: None,
            }
        })?;

        let (events_tx, events_rx) = mpsc::channel(256);
        let socket_path = self.socket_path.clone();
        let should_reconnect = self.should_reconnect.clone();
        let connected = self.connected.clone();

        tokio::spawn(async move {
            let mut backoff = BACKOFF_INITIAL;
            while should_reconnect.load(Ordering::SeqCst) {
                let stream = match UnixStream::connect(&socket_path).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        debug!(error = %e, "connect failed, backing off {backoff:?}");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(BACKOFF_MAX);
                        continue;
                    }
                };

                backoff = BACKOFF_INITIAL;
                connected.store(true, Ordering::SeqCst);
                let _ = events_tx.send(ClientEvent::Connected).await;
                info!(path = %socket_path.display(), "connected to gateway");

                let (read_half, mut write_half) = stream.into_split();
                let mut lines = BufReader::new(read_half).lines();

                loop {
                    tokio::select! {
                        line = lines.next_line() => {
                            match line {
                                Ok(Some(line)) => {
                                    match serde_json::from_str::<OutboundFrame>(line.trim()) {
                                        Ok(frame) => {
                                            let _ = events_tx
                                                .send(ClientEvent::Frame(frame))
                                                .await;
                                        }
                                        Err(e) => {
                                            warn!(error = %e, "dropping malformed gateway frame");
                                        }
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    debug!(error = %e, "read error");
                                    break;
                                }
                            }
                        }
                        frame = outbound_rx.recv() => {
                            match frame {
                                Some(frame) => {
                                    let mut line = serde_json::to_string(&frame)
                                        .expect("inbound frames always serialize");
                                    line.push('\n');
                                    if write_half.write_all(line.as_bytes()).await.is_err() {
                                        break;
                                    }
                                }
                                None => {
                                    // Client handle dropped.
                                    should_reconnect.store(false, Ordering::SeqCst);
                                    break;
                                }
                            }
                        }
                    }
                }

                connected.store(false, Ordering::SeqCst);
                let _ = events_tx.send(ClientEvent::Disconnected).await;
            }
        });

        Ok(events_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Outgoing, ReplyTo, RequestMessage};
    use crate::server::{BridgeServer, ServerEvent};

    fn request(id: &str) -> InboundFrame {
        InboundFrame::SocketRequest {
            request_id: id.to_string(),
            message: RequestMessage {
                content: "hello".into(),
                user_id: None,
                source: None,
            },
            reply_to: ReplyTo {
                chat_id: "c1".into(),
                message_id: None,
            },
        }
    }

    #[tokio::test]
    async fn connects_sends_and_receives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.sock");
        let server = Arc::new(BridgeServer::new(&path, 16));
        let mut server_events = server.start().await.unwrap();

        let mut client = BridgeClient::new(&path);
        let mut client_events = client.connect().unwrap();

        // Connected on both sides.
        assert!(matches!(
            client_events.recv().await.unwrap(),
            ClientEvent::Connected
        ));
        let client_id = match server_events.recv().await.unwrap() {
            ServerEvent::Connected(id) => id,
            other => panic!("unexpected {other:?}"),
        };
        assert!(client.connected());

        // Client -> server.
        client.send(request("r1")).await.unwrap();
        match server_events.recv().await.unwrap() {
            ServerEvent::Frame(_, frame) => assert_eq!(frame, request("r1")),
            other => panic!("unexpected {other:?}"),
        }

        // Server -> client.
        let response = OutboundFrame::SocketResponse {
            request_id: "r1".into(),
            outgoing: Outgoing {
                chat_id: "c1".into(),
                content: "hi".into(),
                reply_to_id: None,
            },
        };
        server.send(client_id, response.clone());
        match client_events.recv().await.unwrap() {
            ClientEvent::Frame(frame) => assert_eq!(frame, response),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn reconnects_after_server_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.sock");

        let server = Arc::new(BridgeServer::new(&path, 16));
        let _events = server.start().await.unwrap();

        let mut client = BridgeClient::new(&path);
        let mut client_events = client.connect().unwrap();
        assert!(matches!(
            client_events.recv().await.unwrap(),
            ClientEvent::Connected
        ));

        // Take the server down; the client observes the drop.
        server.stop().await;
        assert!(matches!(
            client_events.recv().await.unwrap(),
            ClientEvent::Disconnected
        ));

        // Bring a new server up on the same path; the client comes back.
        let server2 = Arc::new(BridgeServer::new(&path, 16));
        let mut server_events = server2.start().await.unwrap();
        assert!(matches!(
            client_events.recv().await.unwrap(),
            ClientEvent::Connected
        ));
        assert!(matches!(
            server_events.recv().await.unwrap(),
            ServerEvent::Connected(_)
        ));
    }

    #[tokio::test]
    async fn explicit_disconnect_stops_reconnecting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.sock");
        let server = Arc::new(BridgeServer::new(&path, 16));
        let _events = server.start().await.unwrap();

        let mut client = BridgeClient::new(&path);
        let mut client_events = client.connect().unwrap();
        assert!(matches!(
            client_events.recv().await.unwrap(),
            ClientEvent::Connected
        ));

        client.disconnect();
        server.stop().await;
        assert!(matches!(
            client_events.recv().await.unwrap(),
            ClientEvent::Disconnected
        ));

        // No further Connected events: the loop has exited.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(client_events.try_recv().is_err());
        assert!(!client.connected());
    }

    #[tokio::test]
    async fn connect_twice_is_an_error() {
        let mut client = BridgeClient::new("/tmp/never-used.sock");
        let _events = client.connect().unwrap();
        assert!(client.connect().is_err());
    }
}
