// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The gateway event loop: inbound bridge frames in, orchestrated turns and
//! command responses out.
//!
//! Each `socket-request` runs on its own task so approval decisions keep
//! flowing while a turn is blocked on the gate. Turns for the same user are
//! serialised through a per-user mutex.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use warden_agent::{HeartbeatRunner, HitlGate, Orchestrator, TaskRunner};
use warden_audit::{AuditKind, AuditLogger};
use warden_bridge::{
    BridgeServer, ClientId, HeartbeatSummary, InboundFrame, OutboundFrame, Outgoing, ReplyTo,
    RequestMessage, ServerEvent, SessionSummary,
};
use warden_core::traits::bridge::{BridgeSink, GatewayEvent};
use warden_core::types::{ConversationTurn, Role, TurnContent};
use warden_core::WardenError;
use warden_store::{MemoryStore, SessionStore};

/// Message prefix that routes a request through the task loop.
const TASK_PREFIX: &str = "/task ";

/// Fixed reply when a provider failure aborts the turn.
const UNAVAILABLE_MESSAGE: &str =
    "I'm temporarily unavailable right now. Please try again in a moment.";

/// Broadcast-all implementation of the gate's bridge sink.
pub struct BroadcastSink {
    server: Arc<BridgeServer>,
}

impl BroadcastSink {
    pub fn new(server: Arc<BridgeServer>) -> Self {
        Self { server }
    }
}

#[async_trait::async_trait]
impl BridgeSink for BroadcastSink {
    async fn emit(&self, event: GatewayEvent) -> Result<(), WardenError> {
        self.server.broadcast(event.into());
        Ok(())
    }
}

/// Everything the event loop needs, wired once at startup.
pub struct Gateway {
    pub sessions: SessionStore,
    pub memories: MemoryStore,
    pub gate: Arc<HitlGate>,
    pub orchestrator: Arc<Orchestrator>,
    pub tasks: Arc<TaskRunner>,
    pub heartbeats: Arc<HeartbeatRunner>,
    pub server: Arc<BridgeServer>,
    pub audit: AuditLogger,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: SessionStore,
        memories: MemoryStore,
        gate: Arc<HitlGate>,
        orchestrator: Arc<Orchestrator>,
        tasks: Arc<TaskRunner>,
        heartbeats: Arc<HeartbeatRunner>,
        server: Arc<BridgeServer>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            sessions,
            memories,
            gate,
            orchestrator,
            tasks,
            heartbeats,
            server,
            audit,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Consume server events until cancelled.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ServerEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(ServerEvent::Frame(client_id, frame)) => {
                            self.clone().handle_frame(client_id, frame);
                        }
                        Some(ServerEvent::Connected(client_id)) => {
                            info!(%client_id, "bridge connected");
                        }
                        Some(ServerEvent::Disconnected(client_id)) => {
                            info!(%client_id, "bridge disconnected");
                        }
                        None => break,
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        info!("gateway event loop stopped");
    }

    /// Route one inbound frame. Requests spawn; commands run inline.
    pub fn handle_frame(self: Arc<Self>, client_id: ClientId, frame: InboundFrame) {
        tokio::spawn(async move {
            match frame {
                InboundFrame::SocketRequest {
                    request_id,
                    message,
                    reply_to,
                } => {
                    self.handle_request(client_id, request_id, message, reply_to)
                        .await;
                }
                InboundFrame::ApprovalDecision {
                    approval_id,
                    decision,
                } => {
                    if let Err(e) = self.gate.resolve(&approval_id, decision.into()).await {
                        warn!(approval_id, error = %e, "approval decision not applied");
                    }
                }
                InboundFrame::MemoryList { user_id } => {
                    let frame = match self.memories.list(&user_id).await {
                        Ok(memories) => OutboundFrame::MemoryListResponse { memories },
                        Err(e) => OutboundFrame::Error {
                            message: e.to_string(),
                        },
                    };
                    self.server.send(client_id, frame);
                }
                InboundFrame::MemoryDelete { user_id, id } => {
                    // Ownership-scoped: a memory id alone is not authority
                    // to remove another user's memory.
                    let frame = match self.memories.delete_by_id_for_user(&user_id, &id).await {
                        Ok(deleted) => OutboundFrame::MemoryDeleteResponse { deleted },
                        Err(e) => OutboundFrame::Error {
                            message: e.to_string(),
                        },
                    };
                    self.server.send(client_id, frame);
                }
                InboundFrame::SessionList => {
                    let sessions = self
                        .sessions
                        .list()
                        .into_iter()
                        .map(|s| SessionSummary {
                            id: s.id,
                            user_id: s.user_id,
                            turns: s.messages.len(),
                            updated_at: s.updated_at,
                        })
                        .collect();
                    self.server
                        .send(client_id, OutboundFrame::SessionListResponse { sessions });
                }
                InboundFrame::TaskStop { user_id } => {
                    let cancelled = self.tasks.stop(&user_id).await;
                    self.server
                        .send(client_id, OutboundFrame::TaskStopResponse { cancelled });
                }
                InboundFrame::HeartbeatList => {
                    let heartbeats = self
                        .heartbeats
                        .list()
                        .await
                        .into_iter()
                        .map(|h| HeartbeatSummary {
                            name: h.name,
                            schedule: h.schedule,
                            enabled: h.enabled,
                        })
                        .collect();
                    self.server.send(
                        client_id,
                        OutboundFrame::HeartbeatListResponse { heartbeats },
                    );
                }
                InboundFrame::HeartbeatToggle { name } => {
                    let enabled = self.heartbeats.toggle(&name).await;
                    self.server.send(
                        client_id,
                        OutboundFrame::HeartbeatToggleResponse { name, enabled },
                    );
                }
            }
        });
    }

    async fn handle_request(
        &self,
        client_id: ClientId,
        request_id: String,
        message: RequestMessage,
        reply_to: ReplyTo,
    ) {
        let user_id = message
            .user_id
            .clone()
            .unwrap_or_else(|| reply_to.chat_id.clone());
        let chat_id = reply_to.chat_id.clone();

        // Turns for one user are serialised; a new turn waits for the
        // previous one.
        let lock = {
            let mut locks = self.session_locks.lock().await;
            locks
                .entry(user_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _turn_guard = lock.lock().await;

        let session = self.sessions.get_or_create(&user_id);
        self.audit
            .log(
                AuditKind::MessageReceived,
                &session.id,
                serde_json::json!({
                    "requestId": request_id,
                    "chatId": chat_id,
                    "bytes": message.content.len(),
                }),
            )
            .await;

        let content = if let Some(task_request) = message.content.strip_prefix(TASK_PREFIX) {
            self.run_task_request(&session.id, &user_id, &chat_id, task_request)
                .await
        } else {
            self.run_chat_request(&session.id, &user_id, &chat_id, &message.content)
                .await
        };

        self.audit
            .log(
                AuditKind::MessageSent,
                &session.id,
                serde_json::json!({
                    "requestId": request_id,
                    "bytes": content.len(),
                }),
            )
            .await;

        self.server.send(
            client_id,
            OutboundFrame::SocketResponse {
                request_id,
                outgoing: Outgoing {
                    chat_id,
                    content,
                    reply_to_id: reply_to.message_id,
                },
            },
        );
    }

    /// One ordinary orchestrated turn. Session history mutates only on
    /// success; provider failures leave it untouched.
    async fn run_chat_request(
        &self,
        session_id: &str,
        user_id: &str,
        chat_id: &str,
        content: &str,
    ) -> String {
        let session = self.sessions.get_or_create(user_id);
        let mut history = session.messages;
        history.push(ConversationTurn::user(content));

        let active_task = self.tasks.active(user_id).await;
        match self
            .orchestrator
            .chat(
                session_id,
                history,
                chat_id,
                user_id,
                active_task.as_ref(),
                &CancellationToken::new(),
            )
            .await
        {
            Ok(outcome) => {
                self.sessions.set_messages(user_id, outcome.history);
                outcome.text
            }
            Err(e) => {
                error!(session_id, error = %e, "turn aborted");
                self.audit
                    .log(
                        AuditKind::Error,
                        session_id,
                        serde_json::json!({"error": e.to_string()}),
                    )
                    .await;
                UNAVAILABLE_MESSAGE.to_string()
            }
        }
    }

    /// A `/task` request drives the multi-iteration task loop.
    async fn run_task_request(
        &self,
        session_id: &str,
        user_id: &str,
        chat_id: &str,
        request: &str,
    ) -> String {
        self.sessions
            .append(user_id, Role::User, TurnContent::Text(request.to_string()));

        match self
            .tasks
            .execute(user_id, request, chat_id, session_id)
            .await
        {
            Ok(outcome) => {
                let reply = if outcome.text.is_empty() {
                    "The task was stopped before producing a result.".to_string()
                } else {
                    outcome.text
                };
                self.sessions.append(
                    user_id,
                    Role::Assistant,
                    TurnContent::Text(reply.clone()),
                );
                reply
            }
            Err(e) => {
                warn!(user_id, error = %e, "task did not start");
                format!("Could not start the task: {e}")
            }
        }
    }
}
