// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider for deterministic testing.
//!
//! Responses are popped from a FIFO queue. When the queue is empty, a
//! default `end_turn` text response is returned. Every received request is
//! recorded for assertions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use warden_core::traits::provider::{ChatRequest, ChatResponse, LlmProvider, StopReason};
use warden_core::types::ContentBlock;
use warden_core::WardenError;

/// A mock LLM provider that returns pre-configured responses.
#[derive(Clone, Default)]
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<Result<ChatResponse, String>>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain-text `end_turn` response.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push_response(ChatResponse {
            content: vec![ContentBlock::text(text)],
            stop_reason: StopReason::EndTurn,
        });
    }

    /// Queue a `tool_use` response with one tool call (and optional preamble
    /// text).
    pub fn push_tool_call(
        &self,
        preamble: Option<&str>,
        id: &str,
        name: &str,
        input: serde_json::Value,
    ) {
        let mut content = Vec::new();
        if let Some(text) = preamble {
            content.push(ContentBlock::text(text));
        }
        content.push(ContentBlock::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            input,
        });
        self.push_response(ChatResponse {
            content,
            stop_reason: StopReason::ToolUse,
        });
    }

    /// Queue a full response.
    pub fn push_response(&self, response: ChatResponse) {
        self.responses
            .lock()
            .expect("mock lock poisoned")
            .push_back(Ok(response));
    }

    /// Queue a provider error.
    pub fn push_error(&self, message: impl Into<String>) {
        self.responses
            .lock()
            .expect("mock lock poisoned")
            .push_back(Err(message.into()));
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("mock lock poisoned").clone()
    }

    /// Number of chat round-trips served.
    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("mock lock poisoned").len()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, WardenError> {
        self.requests
            .lock()
            .expect("mock lock poisoned")
            .push(request);

        let next = self
            .responses
            .lock()
            .expect("mock lock poisoned")
            .pop_front();

        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(WardenError::Llm {
                message,
                source: None,
            }),
            None => Ok(ChatResponse {
                content: vec![ContentBlock::text("mock response")],
                stop_reason: StopReason::EndTurn,
            }),
        }
    }
}
