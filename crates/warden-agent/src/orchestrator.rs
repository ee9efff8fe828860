// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The agentic tool-use loop.
//!
//! Drives up to [`MAX_ITERATIONS`] LLM round-trips, executing tool calls in
//! the order the model emitted them. Memory tools run in-process and skip
//! the gate; everything else is gated, then routed to an ephemeral executor
//! or an MCP server by name. Tool-level failures become tool results and the
//! loop continues; provider failures abort the turn.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_audit::{AuditKind, AuditLogger};
use warden_core::traits::provider::{ChatMessage, ChatRequest, LlmProvider, StopReason};
use warden_core::types::{
    ContentBlock, ConversationTurn, ExecutorResult, ExecutorTask, Role, TaskSession, TurnContent,
};
use warden_core::WardenError;
use warden_mcp::McpManager;
use warden_prompt::{sha256_hex, PromptBuilder};
use warden_sandbox::Dispatcher;
use warden_store::{MemoryStore, SoulVersionStore};

use crate::gate::{GateRequest, HitlGate};
use crate::memory_tools;
use crate::tools::{self, builtin_tools};

/// Upper bound on LLM round-trips per user turn.
pub const MAX_ITERATIONS: usize = 10;

/// Returned when the model never reaches a terminal stop.
const MAX_ITERATIONS_MESSAGE: &str =
    "I reached the maximum number of tool iterations for this request and stopped here. \
     Ask me to continue if you want me to keep going.";

/// Result of one orchestrated user turn.
#[derive(Debug)]
pub struct ChatOutcome {
    pub text: String,
    pub history: Vec<ConversationTurn>,
}

/// The orchestrator. Stateless across turns; conversation state lives in the
/// caller-supplied history.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    gate: Arc<HitlGate>,
    dispatcher: Arc<Dispatcher>,
    mcp: Arc<McpManager>,
    memories: MemoryStore,
    soul_versions: SoulVersionStore,
    prompt: Arc<PromptBuilder>,
    audit: AuditLogger,
    model: String,
    max_tokens: u32,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        gate: Arc<HitlGate>,
        dispatcher: Arc<Dispatcher>,
        mcp: Arc<McpManager>,
        memories: MemoryStore,
        soul_versions: SoulVersionStore,
        prompt: Arc<PromptBuilder>,
        audit: AuditLogger,
        model: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            gate,
            dispatcher,
            mcp,
            memories,
            soul_versions,
            prompt,
            audit,
            model,
            max_tokens,
        }
    }

    /// Drive one user turn to completion.
    pub async fn chat(
        &self,
        session_id: &str,
        history: Vec<ConversationTurn>,
        chat_id: &str,
        user_id: &str,
        active_task: Option<&TaskSession>,
        cancel: &CancellationToken,
    ) -> Result<ChatOutcome, WardenError> {
        let mut working = history;
        let last_user_text = working
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.text())
            .unwrap_or_default();

        let mut tool_specs = builtin_tools();
        tool_specs.extend(self.mcp.tool_specs().await);

        for iteration in 1..=MAX_ITERATIONS {
            if cancel.is_cancelled() {
                return Err(WardenError::Cancelled);
            }

            let system = self
                .prompt
                .build(user_id, &last_user_text, active_task)
                .await?;

            self.audit
                .log(
                    AuditKind::LlmRequest,
                    session_id,
                    serde_json::json!({"iteration": iteration, "model": self.model}),
                )
                .await;

            let response = self
                .provider
                .chat(ChatRequest {
                    model: self.model.clone(),
                    system: Some(system),
                    messages: to_chat_messages(&working),
                    tools: tool_specs.clone(),
                    max_tokens: self.max_tokens,
                })
                .await?;

            self.audit
                .log(
                    AuditKind::LlmResponse,
                    session_id,
                    serde_json::json!({
                        "iteration": iteration,
                        "stopReason": response.stop_reason,
                    }),
                )
                .await;

            match response.stop_reason {
                StopReason::EndTurn | StopReason::MaxTokens => {
                    let text = response.text();
                    working.push(ConversationTurn::assistant(response.content));
                    info!(session_id, iteration, "turn complete");
                    return Ok(ChatOutcome {
                        text,
                        history: working,
                    });
                }
                StopReason::ToolUse => {
                    let reason = response.text();
                    let calls: Vec<(String, String, serde_json::Value)> = response
                        .content
                        .iter()
                        .filter_map(|block| match block {
                            ContentBlock::ToolCall { id, name, input } => {
                                Some((id.clone(), name.clone(), input.clone()))
                            }
                            _ => None,
                        })
                        .collect();

                    // The raw assistant response is one turn, interleaved
                    // text and tool calls preserved.
                    working.push(ConversationTurn::assistant(response.content));

                    let mut results = Vec::with_capacity(calls.len());
                    for (call_id, tool_name, input) in calls {
                        if cancel.is_cancelled() {
                            return Err(WardenError::Cancelled);
                        }
                        let content = self
                            .run_tool(
                                session_id,
                                chat_id,
                                user_id,
                                &call_id,
                                &tool_name,
                                input,
                                &reason,
                                &last_user_text,
                            )
                            .await;
                        results.push(ContentBlock::tool_result(call_id, content));
                    }

                    working.push(ConversationTurn::tool_results(results));
                }
            }
        }

        warn!(session_id, "max iterations reached without end_turn");
        working.push(ConversationTurn {
            role: Role::Assistant,
            content: TurnContent::Text(MAX_ITERATIONS_MESSAGE.to_string()),
        });
        Ok(ChatOutcome {
            text: MAX_ITERATIONS_MESSAGE.to_string(),
            history: working,
        })
    }

    /// Execute one tool call, producing the tool-result content. Errors
    /// never escape: every failure mode becomes result text for the model.
    #[allow(clippy::too_many_arguments)]
    async fn run_tool(
        &self,
        session_id: &str,
        chat_id: &str,
        user_id: &str,
        call_id: &str,
        tool_name: &str,
        input: serde_json::Value,
        reason: &str,
        plan_context: &str,
    ) -> String {
        self.audit
            .log(
                AuditKind::ToolCall,
                session_id,
                serde_json::json!({"id": call_id, "tool": tool_name, "input": input}),
            )
            .await;

        // Memory tools run in-process and skip the gate entirely.
        if tools::is_memory_tool(tool_name) {
            let outcome = if tool_name == tools::SAVE_MEMORY {
                memory_tools::save_memory(&self.memories, user_id, &input).await
            } else {
                memory_tools::search_memory(&self.memories, user_id, &input).await
            };
            let content = match outcome {
                Ok(content) => content,
                Err(e) => format!("error: {e}"),
            };
            self.audit
                .log(
                    AuditKind::ToolResult,
                    session_id,
                    serde_json::json!({"id": call_id, "tool": tool_name, "inProcess": true}),
                )
                .await;
            return content;
        }

        let decision = match self
            .gate
            .gate(GateRequest {
                session_id: session_id.to_string(),
                tool_name: tool_name.to_string(),
                tool_input: input.clone(),
                chat_id: chat_id.to_string(),
                reason: reason.to_string(),
                plan_context: if plan_context.is_empty() {
                    None
                } else {
                    Some(plan_context.to_string())
                },
            })
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                warn!(tool = tool_name, error = %e, "gate failure");
                return format!("error: approval system unavailable: {e}");
            }
        };

        if !decision.proceed {
            let content = match decision.outcome {
                Some(warden_core::types::ApprovalStatus::Expired) => {
                    "The approval request expired before the user responded. \
                     The action was not executed."
                        .to_string()
                }
                _ => "This action was rejected by the user. Do not retry it; \
                      accept the decision and continue without it."
                    .to_string(),
            };
            self.audit
                .log(
                    AuditKind::ToolResult,
                    session_id,
                    serde_json::json!({"id": call_id, "tool": tool_name, "denied": true}),
                )
                .await;
            return content;
        }

        let mut content = self.execute_routed(tool_name, input).await;
        truncate_in_place(&mut content, self.dispatcher.default_max_output());

        self.audit
            .log(
                AuditKind::ToolResult,
                session_id,
                serde_json::json!({"id": call_id, "tool": tool_name, "bytes": content.len()}),
            )
            .await;
        content
    }

    /// Route an approved call to MCP, the soul store, or an ephemeral
    /// executor.
    async fn execute_routed(&self, tool_name: &str, input: serde_json::Value) -> String {
        if tool_name == warden_policy::PROPOSE_SOUL_UPDATE {
            return self.record_soul_update(&input).await;
        }

        if tool_name.starts_with("mcp_") {
            return match self.mcp.call_tool(tool_name, input).await {
                Ok(result) if result.is_error => format!("tool error: {}", result.text()),
                Ok(result) => result.text(),
                Err(e) => format!("error: {e}"),
            };
        }

        match tools::executor_kind_for(tool_name) {
            Some(kind) => {
                let exec = self.dispatcher.executor_config(kind);
                let task = ExecutorTask {
                    tool: tool_name.to_string(),
                    input,
                    timeout_secs: exec.default_timeout,
                    max_output_bytes: exec.default_max_output,
                };
                let result = self.dispatcher.dispatch(kind, task).await;
                executor_result_text(&result)
            }
            None => {
                debug!(tool = tool_name, "unknown tool requested by model");
                format!("error: unknown tool `{tool_name}`")
            }
        }
    }

    /// An approved soul update is recorded as a new revision; the running
    /// identity file only changes when the operator installs it, so the
    /// integrity pin stays valid.
    async fn record_soul_update(&self, input: &serde_json::Value) -> String {
        let text = input
            .get("text")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return "error: missing required field `text`".to_string();
        }
        match self
            .soul_versions
            .record(&sha256_hex(text.as_bytes()), text)
            .await
        {
            Ok(version) => format!(
                "Soul update recorded as revision {} (sha256 {}). It takes effect \
                 once the operator installs it.",
                version.id, version.sha256
            ),
            Err(e) => format!("error: {e}"),
        }
    }
}

/// Render an executor result as tool-result content for the model.
fn executor_result_text(result: &ExecutorResult) -> String {
    if result.success {
        result.stdout.clone()
    } else {
        let mut text = format!(
            "error: {}",
            result.error.as_deref().unwrap_or("executor failed")
        );
        if !result.stderr.is_empty() {
            text.push('\n');
            text.push_str(&result.stderr);
        }
        text
    }
}

fn truncate_in_place(s: &mut String, max_bytes: usize) {
    if s.len() > max_bytes {
        let mut end = max_bytes;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
        s.push_str("\n[output truncated]");
    }
}

fn to_chat_messages(history: &[ConversationTurn]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|turn| ChatMessage {
            role: turn.role,
            content: match &turn.content {
                TurnContent::Text(text) => vec![ContentBlock::text(text.clone())],
                TurnContent::Blocks(blocks) => blocks.clone(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;
    use warden_capability::TokenSigner;
    use warden_config::model::{
        ActionTiersConfig, ApprovalConfig, ExecutorsConfig, RuleConfig, SkillsConfig,
    };
    use warden_core::types::ApprovalStatus;
    use warden_prompt::{SkillCatalog, SoulLoader};
    use warden_store::Database;
    use warden_test_utils::{MockProvider, MockRuntime, RecordingBridge};

    struct Fixture {
        orchestrator: Orchestrator,
        provider: MockProvider,
        runtime: Arc<MockRuntime>,
        bridge: RecordingBridge,
        gate: Arc<HitlGate>,
        db: Database,
        _dirs: (tempfile::TempDir,),
    }

    async fn fixture(tiers: ActionTiersConfig) -> Fixture {
        let audit_dir = tempfile::tempdir().unwrap();
        let audit = AuditLogger::new(audit_dir.path()).unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let memories = db.memories();

        let provider = MockProvider::new();
        let runtime = Arc::new(MockRuntime::new());
        let bridge = RecordingBridge::new();

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

        let gate = Arc::new(HitlGate::new(
            crate::gate::GatePolicy {
                tiers,
                ..Default::default()
            },
            db.approvals(),
            audit.clone(),
            Arc::new(bridge.clone()),
            &ApprovalConfig::default(),
        ));

        let soul = SoulLoader::new(None, audit.clone()).await;
        let skills = SkillCatalog::scan(&SkillsConfig::default(), audit.clone())
            .await
            .unwrap();
        let prompt = Arc::new(PromptBuilder::new(soul, skills, memories.clone()));

        let mcp = Arc::new(McpManager::new(Arc::new(NoLauncher)));

        let orchestrator = Orchestrator::new(
            Arc::new(provider.clone()),
            gate.clone(),
            dispatcher,
            mcp,
            memories,
            db.soul_versions(),
            prompt,
            audit,
            "test-model".to_string(),
            1024,
        );

        Fixture {
            orchestrator,
            provider,
            runtime,
            bridge,
            gate,
            db,
            _dirs: (audit_dir,),
        }
    }

    struct NoLauncher;

    #[async_trait::async_trait]
    impl warden_mcp::ServerLauncher for NoLauncher {
        async fn launch(
            &self,
            config: &warden_config::model::McpServerConfig,
        ) -> Result<warden_mcp::ServerIo, WardenError> {
            Err(WardenError::Mcp {
                server: config.name.clone(),
                message: "no launcher in tests".to_string(),
            })
        }
    }

    fn auto_all(tools: &[&str]) -> ActionTiersConfig {
        ActionTiersConfig {
            auto_approve: tools
                .iter()
                .map(|t| RuleConfig {
                    tool: t.to_string(),
                    conditions: Default::default(),
                })
                .collect(),
            notify: vec![],
            require_approval: vec![],
        }
    }

    fn user_turn(text: &str) -> Vec<ConversationTurn> {
        vec![ConversationTurn::user(text)]
    }

    #[tokio::test]
    async fn simple_chat_appends_two_turns() {
        let f = fixture(ActionTiersConfig::default()).await;
        f.provider.push_text("Hello!");

        let outcome = f
            .orchestrator
            .chat(
                "s1",
                user_turn("Hi"),
                "c1",
                "u1",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.text, "Hello!");
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.history[1].role, Role::Assistant);
        assert!(f.bridge.events().is_empty());
        assert_eq!(f.runtime.created_count(), 0);
    }

    #[tokio::test]
    async fn auto_approved_tool_roundtrip() {
        let f = fixture(auto_all(&["list_directory"])).await;
        f.provider.push_tool_call(
            Some("Checking the workspace."),
            "tc-1",
            "list_directory",
            json!({"path": "/workspace"}),
        );
        f.runtime
            .script_stdout("{\"success\":true,\"exit_code\":0,\"stdout\":\"a.txt\\nb.txt\"}\n")
            .await;
        f.provider.push_text("Files: a.txt, b.txt");

        let outcome = f
            .orchestrator
            .chat(
                "s1",
                user_turn("What files?"),
                "c1",
                "u1",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.text, "Files: a.txt, b.txt");
        // user, assistant(tool_call), tool_results, assistant(final)
        assert_eq!(outcome.history.len(), 4);
        assert_eq!(outcome.history[2].role, Role::ToolResults);
        match &outcome.history[2].content {
            TurnContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 1);
                match &blocks[0] {
                    ContentBlock::ToolResult {
                        tool_call_id,
                        content,
                    } => {
                        assert_eq!(tool_call_id, "tc-1");
                        assert_eq!(content, "a.txt\nb.txt");
                    }
                    other => panic!("expected tool_result, got {other:?}"),
                }
            }
            other => panic!("expected blocks, got {other:?}"),
        }
        assert!(f.bridge.approval_requests().is_empty());
        assert_eq!(f.runtime.created_count(), 1);
        assert_eq!(f.runtime.removed_count(), 1);
    }

    #[tokio::test]
    async fn rejected_tool_is_never_dispatched() {
        let f = fixture(ActionTiersConfig::default()).await;
        f.provider.push_tool_call(
            None,
            "tc-1",
            "run_shell_command",
            json!({"command": "rm -rf /"}),
        );
        f.provider.push_text("Understood, I won't do that.");

        let bridge = f.bridge.clone();
        let gate = f.gate.clone();
        let rejecter = tokio::spawn(async move {
            let approval_id = bridge.wait_for_approval_id().await;
            gate.resolve(&approval_id, ApprovalStatus::Rejected)
                .await
                .unwrap();
        });

        let outcome = f
            .orchestrator
            .chat(
                "s1",
                user_turn("wipe the disk"),
                "c1",
                "u1",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        rejecter.await.unwrap();

        assert_eq!(outcome.text, "Understood, I won't do that.");
        assert_eq!(f.runtime.created_count(), 0, "dispatcher never invoked");
        match &outcome.history[2].content {
            TurnContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { content, .. } => {
                    assert!(content.contains("rejected by the user"));
                }
                other => panic!("unexpected block {other:?}"),
            },
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[tokio::test]
    async fn memory_tools_skip_the_gate() {
        let f = fixture(ActionTiersConfig::default()).await;
        f.provider.push_tool_call(
            None,
            "tc-1",
            "save_memory",
            json!({"category": "fact", "topic": "dog", "content": "named Max"}),
        );
        f.provider.push_text("Noted.");

        let outcome = f
            .orchestrator
            .chat(
                "s1",
                user_turn("my dog is named Max"),
                "c1",
                "u1",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.text, "Noted.");
        // No approval frames despite the empty rule config.
        assert!(f.bridge.approval_requests().is_empty());
    }

    #[tokio::test]
    async fn executor_failure_becomes_tool_result_and_loop_continues() {
        let f = fixture(auto_all(&["run_shell_command"])).await;
        f.provider
            .push_tool_call(None, "tc-1", "run_shell_command", json!({"command": "x"}));
        f.runtime.script_run_error("container runtime exploded").await;
        f.provider.push_text("That failed, sorry.");

        let outcome = f
            .orchestrator
            .chat(
                "s1",
                user_turn("run x"),
                "c1",
                "u1",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.text, "That failed, sorry.");
        match &outcome.history[2].content {
            TurnContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { content, .. } => {
                    assert!(content.starts_with("error:"), "got: {content}");
                }
                other => panic!("unexpected block {other:?}"),
            },
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_error_aborts_turn() {
        let f = fixture(ActionTiersConfig::default()).await;
        f.provider.push_error("overloaded");

        let result = f
            .orchestrator
            .chat(
                "s1",
                user_turn("hi"),
                "c1",
                "u1",
                None,
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(WardenError::Llm { .. })));
    }

    #[tokio::test]
    async fn halts_at_max_iterations() {
        let f = fixture(auto_all(&["list_directory"])).await;
        for i in 0..MAX_ITERATIONS {
            f.provider.push_tool_call(
                None,
                &format!("tc-{i}"),
                "list_directory",
                json!({"path": "/w"}),
            );
            f.runtime
                .script_stdout("{\"success\":true,\"stdout\":\"x\"}\n")
                .await;
        }
        // Never pushes end_turn; the loop must stop on its own.

        let outcome = f
            .orchestrator
            .chat(
                "s1",
                user_turn("loop forever"),
                "c1",
                "u1",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(f.provider.call_count(), MAX_ITERATIONS);
        assert!(outcome.text.contains("maximum number of tool iterations"));
    }

    #[tokio::test]
    async fn tool_results_match_tool_calls_in_order() {
        let f = fixture(auto_all(&["list_directory", "read_file"])).await;
        f.provider.push_response(warden_core::traits::provider::ChatResponse {
            content: vec![
                ContentBlock::text("Two at once."),
                ContentBlock::ToolCall {
                    id: "tc-a".into(),
                    name: "list_directory".into(),
                    input: json!({"path": "/w"}),
                },
                ContentBlock::ToolCall {
                    id: "tc-b".into(),
                    name: "read_file".into(),
                    input: json!({"path": "/w/a.txt"}),
                },
            ],
            stop_reason: StopReason::ToolUse,
        });
        f.runtime
            .script_stdout("{\"success\":true,\"stdout\":\"dir listing\"}\n")
            .await;
        f.runtime
            .script_stdout("{\"success\":true,\"stdout\":\"file content\"}\n")
            .await;
        f.provider.push_text("done");

        let outcome = f
            .orchestrator
            .chat(
                "s1",
                user_turn("do both"),
                "c1",
                "u1",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        match &outcome.history[2].content {
            TurnContent::Blocks(blocks) => {
                let ids: Vec<&str> = blocks
                    .iter()
                    .map(|b| match b {
                        ContentBlock::ToolResult { tool_call_id, .. } => tool_call_id.as_str(),
                        other => panic!("unexpected block {other:?}"),
                    })
                    .collect();
                assert_eq!(ids, vec!["tc-a", "tc-b"]);
            }
            other => panic!("unexpected content {other:?}"),
        }

        // Invariant: tool_result count equals tool_call count across turns.
        let calls: usize = outcome
            .history
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .map(|t| t.content.tool_calls().len())
            .sum();
        let results: usize = outcome
            .history
            .iter()
            .filter(|t| t.role == Role::ToolResults)
            .map(|t| match &t.content {
                TurnContent::Blocks(blocks) => blocks.len(),
                TurnContent::Text(_) => 0,
            })
            .sum();
        assert_eq!(calls, results);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_result() {
        let f = fixture(auto_all(&["made_up_tool"])).await;
        f.provider
            .push_tool_call(None, "tc-1", "made_up_tool", json!({}));
        f.provider.push_text("hm");

        let outcome = f
            .orchestrator
            .chat(
                "s1",
                user_turn("x"),
                "c1",
                "u1",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        match &outcome.history[2].content {
            TurnContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { content, .. } => {
                    assert!(content.contains("unknown tool"));
                }
                other => panic!("unexpected block {other:?}"),
            },
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[tokio::test]
    async fn approved_soul_update_records_revision() {
        let f = fixture(ActionTiersConfig::default()).await;
        f.provider.push_tool_call(
            None,
            "tc-1",
            "propose_soul_update",
            json!({"text": "I am Warden, v2."}),
        );
        f.provider.push_text("Proposed.");

        let bridge = f.bridge.clone();
        let gate = f.gate.clone();
        let approver = tokio::spawn(async move {
            let approval_id = bridge.wait_for_approval_id().await;
            gate.resolve(&approval_id, ApprovalStatus::Approved)
                .await
                .unwrap();
        });

        let outcome = f
            .orchestrator
            .chat(
                "s1",
                user_turn("update your identity"),
                "c1",
                "u1",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        approver.await.unwrap();

        assert_eq!(outcome.text, "Proposed.");
        let latest = f.db.soul_versions().latest().await.unwrap().unwrap();
        assert_eq!(latest.content, "I am Warden, v2.");
        assert_eq!(f.runtime.created_count(), 0, "soul updates never dispatch");
    }

    #[tokio::test]
    async fn cancellation_stops_before_llm_call() {
        let f = fixture(ActionTiersConfig::default()).await;
        f.provider.push_text("never seen");

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = f
            .orchestrator
            .chat("s1", user_turn("hi"), "c1", "u1", None, &cancel)
            .await;
        assert!(matches!(result, Err(WardenError::Cancelled)));
        assert_eq!(f.provider.call_count(), 0);
    }

    #[test]
    fn truncation_appends_marker() {
        let mut s = "x".repeat(100);
        truncate_in_place(&mut s, 10);
        assert!(s.starts_with("xxxxxxxxxx"));
        assert!(s.ends_with("[output truncated]"));
    }
}
