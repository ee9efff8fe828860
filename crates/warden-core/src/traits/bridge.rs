// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound event sink toward the bridges.
//!
//! The gate and the task loop hold a [`BridgeSink`] handle, not a
//! back-pointer to the transport, so there are no cycles: the transport
//! layer implements this trait and forwards events as wire frames.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WardenError;

/// An event the gateway pushes toward connected bridges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GatewayEvent {
    /// A gated tool call is waiting on a human decision.
    ApprovalRequest {
        approval_id: String,
        tool_name: String,
        tool_input: serde_json::Value,
        reason: String,
        #[serde(default)]
        plan_context: Option<String>,
        chat_id: String,
    },
    /// A pending approval expired without a decision.
    ApprovalExpired { approval_id: String, chat_id: String },
    /// Informational notification about a notify-tier action.
    Notification { chat_id: String, text: String },
    /// Progress line from a running task loop.
    TaskProgress { chat_id: String, text: String },
}

impl GatewayEvent {
    /// Critical events must never be silently dropped by the transport;
    /// under backpressure the client is disconnected instead.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            GatewayEvent::ApprovalRequest { .. } | GatewayEvent::ApprovalExpired { .. }
        )
    }
}

/// Injected send-to-bridge capability.
#[async_trait]
pub trait BridgeSink: Send + Sync {
    /// Deliver an event to every connected bridge (best effort for
    /// non-critical events).
    async fn emit(&self, event: GatewayEvent) -> Result<(), WardenError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criticality_split() {
        assert!(GatewayEvent::ApprovalRequest {
            approval_id: "a".into(),
            tool_name: "t".into(),
            tool_input: serde_json::json!({}),
            reason: String::new(),
            plan_context: None,
            chat_id: "c".into(),
        }
        .is_critical());
        assert!(GatewayEvent::ApprovalExpired {
            approval_id: "a".into(),
            chat_id: "c".into()
        }
        .is_critical());
        assert!(!GatewayEvent::Notification {
            chat_id: "c".into(),
            text: "x".into()
        }
        .is_critical());
        assert!(!GatewayEvent::TaskProgress {
            chat_id: "c".into(),
            text: "x".into()
        }
        .is_critical());
    }

    #[test]
    fn wire_tag_is_kebab_case() {
        let e = GatewayEvent::ApprovalExpired {
            approval_id: "a1".into(),
            chat_id: "c1".into(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "approval-expired");
    }
}
