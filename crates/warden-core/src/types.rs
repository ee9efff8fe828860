// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Warden gateway crates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Maximum number of conversation turns retained per session.
pub const MAX_SESSION_TURNS: usize = 50;

/// Chat platform a message originated from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Telegram,
    Slack,
    Web,
}

/// A platform-agnostic inbound user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id assigned by the gateway.
    pub id: String,
    /// The platform's own message id, if any.
    pub platform_id: Option<String>,
    /// Which bridge the message arrived through.
    pub source: SourceTag,
    /// Opaque user identifier.
    pub user_id: String,
    /// Text content of the message.
    pub content: String,
    /// When the message was received.
    pub timestamp: DateTime<Utc>,
    /// Free-form platform metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolResults,
}

/// A discriminated-union fragment of an LLM turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },
    /// The model is requesting a tool invocation.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// The result of a tool invocation, fed back to the model.
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

impl ContentBlock {
    /// Convenience constructor for a text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Convenience constructor for a tool result block.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ContentBlock::ToolResult {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }
}

/// Content of a conversation turn: a plain string or ordered content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl TurnContent {
    /// Concatenated text of every text block (or the plain string itself).
    pub fn text(&self) -> String {
        match self {
            TurnContent::Text(s) => s.clone(),
            TurnContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// All tool-call blocks, in order.
    pub fn tool_calls(&self) -> Vec<&ContentBlock> {
        match self {
            TurnContent::Text(_) => Vec::new(),
            TurnContent::Blocks(blocks) => blocks
                .iter()
                .filter(|b| matches!(b, ContentBlock::ToolCall { .. }))
                .collect(),
        }
    }
}

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: TurnContent,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Blocks(blocks),
        }
    }

    pub fn tool_results(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::ToolResults,
            content: TurnContent::Blocks(blocks),
        }
    }
}

/// Bounded conversation state for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub messages: Vec<ConversationTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Memory classification buckets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    User,
    Preference,
    Project,
    Fact,
    Environment,
}

/// A persistent memory about a user.
///
/// `(user_id, category, topic)` is unique; re-saving the same triple
/// upserts the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub user_id: String,
    pub category: MemoryCategory,
    pub topic: String,
    pub content: String,
    pub access_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

/// Lifecycle status of a multi-iteration task session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl TaskStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Check whether transitioning from `self` to `target` is valid.
    ///
    /// Only explicitly allowed transitions return `true`; everything else
    /// is denied (fail-closed).
    pub fn can_transition_to(self, target: TaskStatus) -> bool {
        matches!(
            (self, target),
            (TaskStatus::Active, TaskStatus::Completed)
                | (TaskStatus::Active, TaskStatus::Failed)
                | (TaskStatus::Active, TaskStatus::Paused)
                | (TaskStatus::Active, TaskStatus::Cancelled)
                | (TaskStatus::Paused, TaskStatus::Active)
                | (TaskStatus::Paused, TaskStatus::Cancelled)
        )
    }
}

/// Status of a single plan step.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

/// One step of a task plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    pub status: StepStatus,
    #[serde(default)]
    pub result: Option<String>,
}

/// Compressed plan state carried across task-loop iterations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub log: Vec<String>,
}

/// A distinct multi-iteration task with its own lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSession {
    pub id: String,
    pub user_id: String,
    pub original_request: String,
    pub status: TaskStatus,
    pub iteration: u32,
    pub max_iterations: u32,
    pub plan: TaskPlan,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Resolution state of a human-in-the-loop approval.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    SessionApproved,
    Expired,
}

impl ApprovalStatus {
    /// Terminal once non-pending.
    pub fn is_terminal(self) -> bool {
        self != ApprovalStatus::Pending
    }

    /// Whether this resolution allows the gated tool call to proceed.
    pub fn allows_proceed(self) -> bool {
        matches!(
            self,
            ApprovalStatus::Approved | ApprovalStatus::SessionApproved
        )
    }
}

/// A pending or resolved human approval for a gated tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: String,
    pub session_id: String,
    pub tool_name: String,
    /// Serialized JSON of the tool input.
    pub tool_input: String,
    /// Serialized capability claims the tool would run under, if minted.
    #[serde(default)]
    pub capability: Option<String>,
    /// The assistant's stated reason for the call.
    pub reason: String,
    /// The user request that led to the call, for reviewer context.
    #[serde(default)]
    pub plan_context: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub status: ApprovalStatus,
}

/// Classification tier for a tool action.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ActionTier {
    AutoApprove,
    Notify,
    RequireApproval,
}

/// Kind of ephemeral executor container.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Shell,
    File,
    Web,
}

/// Outbound network policy for a sandboxed container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum NetworkPolicy {
    /// No network interface at all.
    None,
    /// Egress restricted to TCP/443 toward the listed domains.
    Allowed { domains: Vec<String> },
}

impl NetworkPolicy {
    pub fn is_none(&self) -> bool {
        matches!(self, NetworkPolicy::None)
    }
}

/// A task handed to an ephemeral executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorTask {
    /// Tool being executed (`run_shell_command`, `read_file`, ...).
    pub tool: String,
    /// Tool input as the model produced it.
    pub input: serde_json::Value,
    /// Wall-clock budget for the task.
    pub timeout_secs: u64,
    /// Cap on concatenated stdout+stderr.
    pub max_output_bytes: usize,
}

/// Result of one executor invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorResult {
    pub success: bool,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutorResult {
    /// Synthesize a failure result with the given error text.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
            error: Some(error.into()),
        }
    }
}
