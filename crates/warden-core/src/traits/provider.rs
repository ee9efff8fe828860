// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM provider trait and the provider-agnostic chat vocabulary.
//!
//! Concrete providers (Anthropic, OpenAI, Gemini, Codex) translate between
//! their wire formats and the [`ContentBlock`] vocabulary; the orchestrator
//! never sees provider-specific types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WardenError;
use crate::types::{ContentBlock, Role};

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished its reply.
    EndTurn,
    /// The model is waiting on tool results.
    ToolUse,
    /// Output was truncated at the token limit.
    MaxTokens,
}

/// A tool made visible to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

/// One message in a provider chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

/// A provider-agnostic chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(default)]
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
}

/// A provider-agnostic chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Interleaved text and tool-call blocks, in model order.
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
}

impl ChatResponse {
    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Capability interface for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one chat round-trip and return the full response.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, WardenError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_skips_tool_calls() {
        let resp = ChatResponse {
            content: vec![
                ContentBlock::text("a"),
                ContentBlock::ToolCall {
                    id: "1".into(),
                    name: "t".into(),
                    input: serde_json::json!({}),
                },
                ContentBlock::text("b"),
            ],
            stop_reason: StopReason::ToolUse,
        };
        assert_eq!(resp.text(), "ab");
    }

    #[test]
    fn stop_reason_serde() {
        assert_eq!(
            serde_json::to_value(StopReason::EndTurn).unwrap(),
            "end_turn"
        );
        assert_eq!(
            serde_json::to_value(StopReason::ToolUse).unwrap(),
            "tool_use"
        );
    }
}
