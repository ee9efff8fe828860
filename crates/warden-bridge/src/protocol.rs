// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bridge<->gateway message taxonomy.
//!
//! Each frame is one JSON object on one line, internally tagged with
//! kebab-case `type`. Frames must be UTF-8 JSON; anything else is rejected
//! at the transport layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::traits::bridge::GatewayEvent;
use warden_core::types::{ApprovalStatus, Memory, SourceTag};

/// A user message carried by a `socket-request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub content: String,
    /// Opaque user id; defaults to the chat id when absent.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub source: Option<SourceTag>,
}

/// Where the response to a request should go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyTo {
    pub chat_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Decision values a bridge may send for a pending approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Approved,
    Rejected,
    SessionApproved,
}

impl From<Decision> for ApprovalStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => ApprovalStatus::Approved,
            Decision::Rejected => ApprovalStatus::Rejected,
            Decision::SessionApproved => ApprovalStatus::SessionApproved,
        }
    }
}

/// Frames a bridge sends to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundFrame {
    SocketRequest {
        request_id: String,
        message: RequestMessage,
        reply_to: ReplyTo,
    },
    ApprovalDecision {
        approval_id: String,
        decision: Decision,
    },
    MemoryList {
        user_id: String,
    },
    MemoryDelete {
        user_id: String,
        id: String,
    },
    SessionList,
    TaskStop {
        user_id: String,
    },
    HeartbeatList,
    HeartbeatToggle {
        name: String,
    },
}

/// Outgoing payload of a `socket-response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outgoing {
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub reply_to_id: Option<String>,
}

/// Summary row for the `session-list` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub user_id: String,
    pub turns: usize,
    pub updated_at: DateTime<Utc>,
}

/// Summary row for the `heartbeat-list` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatSummary {
    pub name: String,
    pub schedule: String,
    pub enabled: bool,
}

/// Frames the gateway sends to bridges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundFrame {
    SocketResponse {
        request_id: String,
        outgoing: Outgoing,
    },
    ApprovalRequest {
        approval_id: String,
        tool_name: String,
        tool_input: serde_json::Value,
        reason: String,
        #[serde(default)]
        plan_context: Option<String>,
        chat_id: String,
    },
    ApprovalExpired {
        approval_id: String,
        chat_id: String,
    },
    Notification {
        chat_id: String,
        text: String,
    },
    TaskProgress {
        chat_id: String,
        text: String,
    },
    MemoryListResponse {
        memories: Vec<Memory>,
    },
    MemoryDeleteResponse {
        deleted: bool,
    },
    SessionListResponse {
        sessions: Vec<SessionSummary>,
    },
    TaskStopResponse {
        cancelled: bool,
    },
    HeartbeatListResponse {
        heartbeats: Vec<HeartbeatSummary>,
    },
    HeartbeatToggleResponse {
        name: String,
        #[serde(default)]
        enabled: Option<bool>,
    },
    Error {
        message: String,
    },
}

impl OutboundFrame {
    /// Critical frames are never silently dropped under backpressure; the
    /// client is disconnected instead. Notifications and task progress are
    /// droppable.
    pub fn is_critical(&self) -> bool {
        !matches!(
            self,
            OutboundFrame::Notification { .. } | OutboundFrame::TaskProgress { .. }
        )
    }
}

impl From<GatewayEvent> for OutboundFrame {
    fn from(event: GatewayEvent) -> Self {
        match event {
            GatewayEvent::ApprovalRequest {
                approval_id,
                tool_name,
                tool_input,
                reason,
                plan_context,
                chat_id,
            } => OutboundFrame::ApprovalRequest {
                approval_id,
                tool_name,
                tool_input,
                reason,
                plan_context,
                chat_id,
            },
            GatewayEvent::ApprovalExpired {
                approval_id,
                chat_id,
            } => OutboundFrame::ApprovalExpired {
                approval_id,
                chat_id,
            },
            GatewayEvent::Notification { chat_id, text } => {
                OutboundFrame::Notification { chat_id, text }
            }
            GatewayEvent::TaskProgress { chat_id, text } => {
                OutboundFrame::TaskProgress { chat_id, text }
            }
        }
    }
}
