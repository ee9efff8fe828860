// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete gateway pipeline.
//!
//! Each test wires a full gateway (real unix-socket transport, real stores,
//! real gate) with a scripted provider and container runtime, connects a
//! real bridge client, and drives whole turns through the socket.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use warden::gateway::{BroadcastSink, Gateway};
use warden_agent::{GatePolicy, HeartbeatRunner, HitlGate, Orchestrator, TaskRunner};
use warden_audit::AuditLogger;
use warden_bridge::{
    BridgeClient, BridgeServer, ClientEvent, Decision, InboundFrame, OutboundFrame, ReplyTo,
    RequestMessage,
};
use warden_capability::TokenSigner;
use warden_config::model::{
    ActionTiersConfig, ApprovalConfig, ExecutorsConfig, RuleConfig, SkillsConfig,
};
use warden_core::types::ApprovalStatus;
use warden_prompt::{PromptBuilder, SkillCatalog, SoulLoader};
use warden_sandbox::Dispatcher;
use warden_store::{Database, SessionStore};
use warden_test_utils::{MockProvider, MockRuntime};

struct Harness {
    provider: MockProvider,
    runtime: Arc<MockRuntime>,
    gateway: Arc<Gateway>,
    db: Database,
    client: BridgeClient,
    client_events: tokio::sync::mpsc::Receiver<ClientEvent>,
    _tmp: tempfile::TempDir,
}

struct NoLauncher;

#[async_trait::async_trait]
impl warden_mcp::ServerLauncher for NoLauncher {
    async fn launch(
        &self,
        config: &warden_config::model::McpServerConfig,
    ) -> Result<warden_mcp::ServerIo, warden_core::WardenError> {
        Err(warden_core::WardenError::Mcp {
            server: config.name.clone(),
            message: "no mcp servers in e2e".to_string(),
        })
    }
}

async fn harness(tiers: ActionTiersConfig, approval: ApprovalConfig) -> Harness {
    harness_with_heartbeats(tiers, approval, &[]).await
}

async fn harness_with_heartbeats(
    tiers: ActionTiersConfig,
    approval: ApprovalConfig,
    heartbeats: &[warden_config::model::HeartbeatConfig],
) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let audit = AuditLogger::new(tmp.path().join("audit")).unwrap();
    let db = Database::open_in_memory().await.unwrap();

    let provider = MockProvider::new();
    let runtime = Arc::new(MockRuntime::new());

    let signer = Arc::new(
        TokenSigner::new(&SecretString::from(
            "0123456789abcdef0123456789abcdef".to_string(),
        ))
        .unwrap(),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        runtime.clone(),
        signer,
        ExecutorsConfig::default(),
        &[],
    ));

    let socket_path = tmp.path().join("gateway.sock");
    let server = Arc::new(BridgeServer::new(&socket_path, 64));
    let sink = Arc::new(BroadcastSink::new(server.clone()));

    let gate = Arc::new(HitlGate::new(
        GatePolicy {
            tiers,
            ..GatePolicy::default()
        },
        db.approvals(),
        audit.clone(),
        sink.clone(),
        &approval,
    ));

    let soul = SoulLoader::new(None, audit.clone()).await;
    let skills = SkillCatalog::scan(&SkillsConfig::default(), audit.clone())
        .await
        .unwrap();
    let prompt = Arc::new(PromptBuilder::new(soul, skills, db.memories()));
    let mcp = Arc::new(warden_mcp::McpManager::new(Arc::new(NoLauncher)));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(provider.clone()),
        gate.clone(),
        dispatcher,
        mcp,
        db.memories(),
        db.soul_versions(),
        prompt,
        audit.clone(),
        "test-model".to_string(),
        1024,
    ));

    let tasks = Arc::new(TaskRunner::new(orchestrator.clone(), sink.clone(), 10));
    let heartbeats = Arc::new(HeartbeatRunner::new(heartbeats, orchestrator.clone(), sink));

    let events = server.start().await.unwrap();
    let gateway = Arc::new(Gateway::new(
        SessionStore::new(),
        db.memories(),
        gate,
        orchestrator,
        tasks,
        heartbeats,
        server.clone(),
        audit,
    ));
    tokio::spawn(gateway.clone().run(events, CancellationToken::new()));

    let mut client = BridgeClient::new(&socket_path);
    let mut client_events = client.connect().unwrap();
    // Wait for the link to come up.
    match tokio::time::timeout(Duration::from_secs(2), client_events.recv())
        .await
        .unwrap()
        .unwrap()
    {
        ClientEvent::Connected => {}
        other => panic!("expected Connected, got {other:?}"),
    }

    Harness {
        provider,
        runtime,
        gateway,
        db,
        client,
        client_events,
        _tmp: tmp,
    }
}

impl Harness {
    async fn send_request(&self, request_id: &str, content: &str, chat_id: &str) {
        self.client
            .send(InboundFrame::SocketRequest {
                request_id: request_id.to_string(),
                message: RequestMessage {
                    content: content.to_string(),
                    user_id: None,
                    source: None,
                },
                reply_to: ReplyTo {
                    chat_id: chat_id.to_string(),
                    message_id: None,
                },
            })
            .await
            .unwrap();
    }

    /// Receive frames until the predicate matches, with a global timeout.
    async fn recv_until<T>(
        &mut self,
        mut pick: impl FnMut(&OutboundFrame) -> Option<T>,
    ) -> (T, Vec<OutboundFrame>) {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let event = tokio::time::timeout_at(deadline, self.client_events.recv())
                .await
                .expect("timed out waiting for frame")
                .expect("client event stream closed");
            if let ClientEvent::Frame(frame) = event {
                if let Some(found) = pick(&frame) {
                    return (found, seen);
                }
                seen.push(frame);
            }
        }
    }

    async fn recv_response(&mut self, request_id: &str) -> (String, Vec<OutboundFrame>) {
        let request_id = request_id.to_string();
        self.recv_until(move |frame| match frame {
            OutboundFrame::SocketResponse {
                request_id: id,
                outgoing,
            } if *id == request_id => Some(outgoing.content.clone()),
            _ => None,
        })
        .await
    }

    async fn recv_approval_request(&mut self) -> String {
        self.recv_until(|frame| match frame {
            OutboundFrame::ApprovalRequest { approval_id, .. } => Some(approval_id.clone()),
            _ => None,
        })
        .await
        .0
    }
}

fn auto_rule(tool: &str) -> ActionTiersConfig {
    ActionTiersConfig {
        auto_approve: vec![RuleConfig {
            tool: tool.to_string(),
            conditions: Default::default(),
        }],
        notify: vec![],
        require_approval: vec![],
    }
}

// ---- Scenario 1: simple chat ----

#[tokio::test]
async fn simple_chat_roundtrip() {
    let mut h = harness(ActionTiersConfig::default(), ApprovalConfig::default()).await;
    h.provider.push_text("Hello!");

    h.send_request("r1", "Hi", "c1").await;
    let (content, earlier) = h.recv_response("r1").await;

    assert_eq!(content, "Hello!");
    assert!(earlier.is_empty(), "no other frames expected: {earlier:?}");
    assert_eq!(h.runtime.created_count(), 0, "no tool calls");

    // Session history grew by user + assistant.
    let session = h.gateway.sessions.get("c1").unwrap();
    assert_eq!(session.messages.len(), 2);
}

// ---- Scenario 2: auto-approved tool ----

#[tokio::test]
async fn auto_approved_tool_end_to_end() {
    let mut h = harness(auto_rule("list_directory"), ApprovalConfig::default()).await;
    h.provider.push_tool_call(
        Some("Let me look."),
        "tc-1",
        "list_directory",
        json!({"path": "/workspace"}),
    );
    h.runtime
        .script_stdout("{\"success\":true,\"exit_code\":0,\"stdout\":\"a.txt\\nb.txt\"}\n")
        .await;
    h.provider.push_text("Files: a.txt, b.txt");

    h.send_request("r2", "What files?", "c1").await;
    let (content, earlier) = h.recv_response("r2").await;

    assert_eq!(content, "Files: a.txt, b.txt");
    assert!(
        !earlier
            .iter()
            .any(|f| matches!(f, OutboundFrame::ApprovalRequest { .. })),
        "auto-approved call must not produce approval frames"
    );
    assert_eq!(h.runtime.created_count(), 1);
    assert_eq!(h.runtime.removed_count(), 1);
}

// ---- Scenario 3: rejected tool ----

#[tokio::test]
async fn rejected_tool_never_dispatches() {
    let mut h = harness(ActionTiersConfig::default(), ApprovalConfig::default()).await;
    h.provider.push_tool_call(
        None,
        "tc-1",
        "run_shell_command",
        json!({"command": "rm -rf /"}),
    );
    h.provider.push_text("Okay, I won't run that.");

    h.send_request("r3", "wipe everything", "c1").await;
    let approval_id = h.recv_approval_request().await;

    h.client
        .send(InboundFrame::ApprovalDecision {
            approval_id: approval_id.clone(),
            decision: Decision::Rejected,
        })
        .await
        .unwrap();

    let (content, _) = h.recv_response("r3").await;
    assert_eq!(content, "Okay, I won't run that.");
    assert_eq!(h.runtime.created_count(), 0, "dispatcher never invoked");

    let row = h.db.approvals().get_by_id(&approval_id).await.unwrap().unwrap();
    assert_eq!(row.status, ApprovalStatus::Rejected);

    // The model saw the rejection as a tool result.
    let session = h.gateway.sessions.get("c1").unwrap();
    let history_json = serde_json::to_string(&session.messages).unwrap();
    assert!(history_json.contains("rejected by the user"));
}

// ---- Scenario 4: approval expiry ----

#[tokio::test]
async fn approval_expiry_emits_and_resolves() {
    // Zero timeout so a manual sweep expires the pending approval.
    let mut h = harness(
        ActionTiersConfig::default(),
        ApprovalConfig {
            timeout_secs: 0,
            sweep_interval_secs: 3600,
        },
    )
    .await;
    h.provider
        .push_tool_call(None, "tc-1", "run_shell_command", json!({"command": "x"}));
    h.provider.push_text("The approval lapsed.");

    h.send_request("r4", "run x", "c1").await;
    let approval_id = h.recv_approval_request().await;

    assert_eq!(h.gateway.gate.sweep().await.unwrap(), 1);

    let (content, earlier) = h.recv_response("r4").await;
    assert_eq!(content, "The approval lapsed.");

    let expired_frames: Vec<&OutboundFrame> = earlier
        .iter()
        .filter(|f| matches!(f, OutboundFrame::ApprovalExpired { .. }))
        .collect();
    assert_eq!(expired_frames.len(), 1);
    match expired_frames[0] {
        OutboundFrame::ApprovalExpired {
            approval_id: id,
            chat_id,
        } => {
            assert_eq!(id, &approval_id);
            assert_eq!(chat_id, "c1");
        }
        _ => unreachable!(),
    }

    let row = h.db.approvals().get_by_id(&approval_id).await.unwrap().unwrap();
    assert_eq!(row.status, ApprovalStatus::Expired);
    assert!(row.resolved_at.is_some());

    let session = h.gateway.sessions.get("c1").unwrap();
    let history_json = serde_json::to_string(&session.messages).unwrap();
    assert!(history_json.contains("expired"));
}

// ---- Scenario 5: session grant ----

#[tokio::test]
async fn session_approval_downgrades_identical_call() {
    let mut h = harness(ActionTiersConfig::default(), ApprovalConfig::default()).await;

    // First call: full approval round.
    h.provider
        .push_tool_call(None, "tc-1", "read_file", json!({"path": "/w/a.txt"}));
    h.runtime
        .script_stdout("{\"success\":true,\"stdout\":\"contents\"}\n")
        .await;
    h.provider.push_text("Here it is.");

    h.send_request("r5", "read a.txt", "c1").await;
    let approval_id = h.recv_approval_request().await;
    h.client
        .send(InboundFrame::ApprovalDecision {
            approval_id,
            decision: Decision::SessionApproved,
        })
        .await
        .unwrap();
    let (content, _) = h.recv_response("r5").await;
    assert_eq!(content, "Here it is.");

    // Second identical call in the same session: notify tier, no frame.
    h.provider
        .push_tool_call(None, "tc-2", "read_file", json!({"path": "/w/a.txt"}));
    h.runtime
        .script_stdout("{\"success\":true,\"stdout\":\"contents\"}\n")
        .await;
    h.provider.push_text("Read it again.");

    h.send_request("r6", "read it again", "c1").await;
    let (content, earlier) = h.recv_response("r6").await;
    assert_eq!(content, "Read it again.");
    assert!(
        !earlier
            .iter()
            .any(|f| matches!(f, OutboundFrame::ApprovalRequest { .. })),
        "granted call must not produce a new approval frame"
    );
    assert!(
        earlier
            .iter()
            .any(|f| matches!(f, OutboundFrame::Notification { .. })),
        "granted call downgrades to notify"
    );
}

// ---- Scenario 6: task loop + cancel ----

#[tokio::test]
async fn task_loop_cancellation() {
    let mut h = harness(ActionTiersConfig::default(), ApprovalConfig::default()).await;

    // Iteration 1 blocks on an approval; we stop the task while it waits.
    h.provider
        .push_tool_call(None, "tc-1", "run_shell_command", json!({"command": "step"}));

    h.send_request("r7", "/task do the long thing", "c1").await;
    let approval_id = h.recv_approval_request().await;

    h.client
        .send(InboundFrame::TaskStop {
            user_id: "c1".to_string(),
        })
        .await
        .unwrap();
    let (cancelled, _) = h
        .recv_until(|frame| match frame {
            OutboundFrame::TaskStopResponse { cancelled } => Some(*cancelled),
            _ => None,
        })
        .await;
    assert!(cancelled);

    // Unblock the gate; the orchestrator observes the cancellation at its
    // next suspension point, before any further LLM call starts.
    h.client
        .send(InboundFrame::ApprovalDecision {
            approval_id,
            decision: Decision::Rejected,
        })
        .await
        .unwrap();

    let (_content, _) = h.recv_response("r7").await;
    assert_eq!(
        h.provider.call_count(),
        1,
        "no LLM call starts after cancellation"
    );
    assert!(h.gateway.tasks.active("c1").await.is_none());

    // A fresh task can start afterwards.
    h.provider.push_text("done in one step");
    h.send_request("r8", "/task something small", "c1").await;
    let (content, _) = h.recv_response("r8").await;
    assert_eq!(content, "done in one step");
}

// ---- Task loop completion and iteration flow ----

#[tokio::test]
async fn task_loop_iterates_with_fresh_context() {
    let mut h = harness(ActionTiersConfig::default(), ApprovalConfig::default()).await;
    h.provider.push_text("first step done [CONTINUE]");
    h.provider.push_text("all finished");

    h.send_request("r9", "/task migrate the database", "c1").await;
    let (content, earlier) = h.recv_response("r9").await;

    assert_eq!(content, "all finished");
    assert_eq!(h.provider.call_count(), 2);

    // Every iteration started from a fresh single-user-message history
    // carrying the original request.
    for request in h.provider.requests() {
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, warden_core::types::Role::User);
        match &request.messages[0].content[0] {
            warden_core::types::ContentBlock::Text { text } => {
                assert!(text.starts_with("migrate the database"));
            }
            other => panic!("expected text block, got {other:?}"),
        }
    }

    // Progress frames were delivered.
    assert!(earlier
        .iter()
        .any(|f| matches!(f, OutboundFrame::TaskProgress { .. })));
}

#[tokio::test]
async fn at_most_one_active_task_per_user() {
    let mut h = harness(ActionTiersConfig::default(), ApprovalConfig::default()).await;

    // First task blocks on an approval, so it is definitely active.
    h.provider
        .push_tool_call(None, "tc-1", "run_shell_command", json!({"command": "x"}));

    let tasks = h.gateway.tasks.clone();
    let first = tokio::spawn(async move { tasks.execute("u9", "long thing", "c9", "s9").await });
    let approval_id = h.recv_approval_request().await;

    // A second task for the same user is refused while the first is active.
    let second = h
        .gateway
        .tasks
        .execute("u9", "another thing", "c9", "s9")
        .await;
    assert!(second.is_err());

    // Unblock the first task; with no further [CONTINUE] it completes.
    h.client
        .send(InboundFrame::ApprovalDecision {
            approval_id,
            decision: Decision::Rejected,
        })
        .await
        .unwrap();
    let outcome = first.await.unwrap().unwrap();
    assert!(outcome.completed);

    // With the first task finished, a new one may start.
    h.provider.push_text("fresh task done");
    let third = h
        .gateway
        .tasks
        .execute("u9", "third thing", "c9", "s9")
        .await
        .unwrap();
    assert_eq!(third.text, "fresh task done");
}

// ---- Memory command surface ----

#[tokio::test]
async fn memory_commands_roundtrip() {
    let mut h = harness(ActionTiersConfig::default(), ApprovalConfig::default()).await;

    h.db.memories()
        .save(
            "u1",
            warden_core::types::MemoryCategory::Fact,
            "dog",
            "named Max",
        )
        .await
        .unwrap();

    h.client
        .send(InboundFrame::MemoryList {
            user_id: "u1".to_string(),
        })
        .await
        .unwrap();
    let (memories, _) = h
        .recv_until(|frame| match frame {
            OutboundFrame::MemoryListResponse { memories } => Some(memories.clone()),
            _ => None,
        })
        .await;
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].topic, "dog");

    // Another user cannot delete it, even knowing the id.
    h.client
        .send(InboundFrame::MemoryDelete {
            user_id: "intruder".to_string(),
            id: memories[0].id.clone(),
        })
        .await
        .unwrap();
    let (deleted, _) = h
        .recv_until(|frame| match frame {
            OutboundFrame::MemoryDeleteResponse { deleted } => Some(*deleted),
            _ => None,
        })
        .await;
    assert!(!deleted);
    assert_eq!(h.db.memories().list("u1").await.unwrap().len(), 1);

    // The owner can.
    h.client
        .send(InboundFrame::MemoryDelete {
            user_id: "u1".to_string(),
            id: memories[0].id.clone(),
        })
        .await
        .unwrap();
    let (deleted, _) = h
        .recv_until(|frame| match frame {
            OutboundFrame::MemoryDeleteResponse { deleted } => Some(*deleted),
            _ => None,
        })
        .await;
    assert!(deleted);
    assert!(h.db.memories().list("u1").await.unwrap().is_empty());
}

// ---- Session and heartbeat command surface ----

#[tokio::test]
async fn session_list_reports_live_sessions() {
    let mut h = harness(ActionTiersConfig::default(), ApprovalConfig::default()).await;

    // No sessions yet.
    h.client.send(InboundFrame::SessionList).await.unwrap();
    let (sessions, _) = h
        .recv_until(|frame| match frame {
            OutboundFrame::SessionListResponse { sessions } => Some(sessions.clone()),
            _ => None,
        })
        .await;
    assert!(sessions.is_empty());

    // One chat turn creates one session with two turns.
    h.provider.push_text("Hello!");
    h.send_request("r1", "Hi", "c1").await;
    h.recv_response("r1").await;

    h.client.send(InboundFrame::SessionList).await.unwrap();
    let (sessions, _) = h
        .recv_until(|frame| match frame {
            OutboundFrame::SessionListResponse { sessions } => Some(sessions.clone()),
            _ => None,
        })
        .await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].user_id, "c1");
    assert_eq!(sessions[0].turns, 2);
}

#[tokio::test]
async fn heartbeat_list_and_toggle_roundtrip() {
    let mut h = harness_with_heartbeats(
        ActionTiersConfig::default(),
        ApprovalConfig::default(),
        &[warden_config::model::HeartbeatConfig {
            name: "morning-brief".to_string(),
            schedule: "0 7 * * *".to_string(),
            prompt: "Summarize my inbox".to_string(),
            enabled: true,
            channel: Some("c1".to_string()),
        }],
    )
    .await;

    h.client.send(InboundFrame::HeartbeatList).await.unwrap();
    let (heartbeats, _) = h
        .recv_until(|frame| match frame {
            OutboundFrame::HeartbeatListResponse { heartbeats } => Some(heartbeats.clone()),
            _ => None,
        })
        .await;
    assert_eq!(heartbeats.len(), 1);
    assert_eq!(heartbeats[0].name, "morning-brief");
    assert_eq!(heartbeats[0].schedule, "0 7 * * *");
    assert!(heartbeats[0].enabled);

    // Toggle flips the flag and echoes the new state.
    h.client
        .send(InboundFrame::HeartbeatToggle {
            name: "morning-brief".to_string(),
        })
        .await
        .unwrap();
    let ((name, enabled), _) = h
        .recv_until(|frame| match frame {
            OutboundFrame::HeartbeatToggleResponse { name, enabled } => {
                Some((name.clone(), *enabled))
            }
            _ => None,
        })
        .await;
    assert_eq!(name, "morning-brief");
    assert_eq!(enabled, Some(false));

    // The list reflects the toggle.
    h.client.send(InboundFrame::HeartbeatList).await.unwrap();
    let (heartbeats, _) = h
        .recv_until(|frame| match frame {
            OutboundFrame::HeartbeatListResponse { heartbeats } => Some(heartbeats.clone()),
            _ => None,
        })
        .await;
    assert!(!heartbeats[0].enabled);

    // Toggling an unknown heartbeat reports no state.
    h.client
        .send(InboundFrame::HeartbeatToggle {
            name: "missing".to_string(),
        })
        .await
        .unwrap();
    let ((name, enabled), _) = h
        .recv_until(|frame| match frame {
            OutboundFrame::HeartbeatToggleResponse { name, enabled } => {
                Some((name.clone(), *enabled))
            }
            _ => None,
        })
        .await;
    assert_eq!(name, "missing");
    assert_eq!(enabled, None);
}

// ---- Provider outage keeps session history unchanged ----

#[tokio::test]
async fn provider_outage_gives_fixed_apology() {
    let mut h = harness(ActionTiersConfig::default(), ApprovalConfig::default()).await;
    h.provider.push_error("overloaded");

    h.send_request("r10", "hello?", "c1").await;
    let (content, _) = h.recv_response("r10").await;
    assert!(content.contains("temporarily unavailable"));

    // The aborted turn left no trace in the session.
    let session = h.gateway.sessions.get("c1").unwrap();
    assert!(session.messages.is_empty());
}
