// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API request/response types and translation to the
//! provider-agnostic content-block vocabulary.

use serde::{Deserialize, Serialize};
use warden_core::traits::provider::{ChatMessage, ChatRequest, StopReason, ToolSpec};
use warden_core::types::{ContentBlock, Role};
use warden_core::WardenError;

/// A tool definition for the Anthropic Messages API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's input parameters.
    pub input_schema: serde_json::Value,
}

/// A request to the Anthropic Messages API (non-streaming).
#[derive(Debug, Clone, Serialize)]
pub struct ApiRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ApiToolDefinition>>,
}

/// A single message in the Anthropic conversation format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    /// "user" or "assistant".
    pub role: String,
    pub content: Vec<ApiContentBlock>,
}

/// A typed content block on the Anthropic wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

/// A full response from the Anthropic Messages API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub content: Vec<ApiContentBlock>,
    pub stop_reason: Option<String>,
}

/// API error response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

/// Error detail within an API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(rename = "type")]
    pub type_: String,
    pub message: String,
}

/// Translate a provider-agnostic request into the Anthropic wire format.
pub fn to_api_request(request: &ChatRequest) -> ApiRequest {
    ApiRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(to_api_message).collect(),
        system: request.system.clone(),
        max_tokens: request.max_tokens,
        tools: if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(to_api_tool).collect())
        },
    }
}

fn to_api_tool(tool: &ToolSpec) -> ApiToolDefinition {
    ApiToolDefinition {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.input_schema.clone(),
    }
}

fn to_api_message(message: &ChatMessage) -> ApiMessage {
    // Tool results travel as user-role messages on the Anthropic wire.
    let role = match message.role {
        Role::Assistant => "assistant",
        Role::User | Role::ToolResults => "user",
    };
    ApiMessage {
        role: role.to_string(),
        content: message.content.iter().map(to_api_block).collect(),
    }
}

fn to_api_block(block: &ContentBlock) -> ApiContentBlock {
    match block {
        ContentBlock::Text { text } => ApiContentBlock::Text { text: text.clone() },
        ContentBlock::ToolCall { id, name, input } => ApiContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        ContentBlock::ToolResult {
            tool_call_id,
            content,
        } => ApiContentBlock::ToolResult {
            tool_use_id: tool_call_id.clone(),
            content: content.clone(),
        },
    }
}

/// Translate an Anthropic response back into the agnostic vocabulary.
pub fn from_api_response(
    response: ApiResponse,
) -> Result<(Vec<ContentBlock>, StopReason), WardenError> {
    let content = response
        .content
        .into_iter()
        .map(|block| match block {
            ApiContentBlock::Text { text } => ContentBlock::Text { text },
            ApiContentBlock::ToolUse { id, name, input } => {
                ContentBlock::ToolCall { id, name, input }
            }
            ApiContentBlock::ToolResult {
                tool_use_id,
                content,
            } => ContentBlock::ToolResult {
                tool_call_id: tool_use_id,
                content,
            },
        })
        .collect();

    let stop_reason = match response.stop_reason.as_deref() {
        Some("end_turn") | Some("stop_sequence") | None => StopReason::EndTurn,
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some(other) => {
            return Err(WardenError::Llm {
                message: format!("unrecognized stop_reason `{other}`"),
                source: None,
            })
        }
    };

    Ok((content, stop_reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serialization_shape() {
        let request = ChatRequest {
            model: "claude-sonnet-4-20250514".into(),
            system: Some("You are Warden.".into()),
            messages: vec![ChatMessage {
                role: Role::User,
                content: vec![ContentBlock::text("Hi")],
            }],
            tools: vec![ToolSpec {
                name: "read_file".into(),
                description: "Read a file".into(),
                input_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
            }],
            max_tokens: 1024,
        };

        let api = to_api_request(&request);
        let value = serde_json::to_value(&api).unwrap();
        assert_eq!(value["model"], "claude-sonnet-4-20250514");
        assert_eq!(value["system"], "You are Warden.");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"][0]["type"], "text");
        assert_eq!(value["tools"][0]["name"], "read_file");
        assert!(value["tools"][0]["input_schema"]["properties"]["path"].is_object());
    }

    #[test]
    fn tools_field_omitted_when_empty() {
        let request = ChatRequest {
            model: "m".into(),
            system: None,
            messages: vec![],
            tools: vec![],
            max_tokens: 10,
        };
        let value = serde_json::to_value(to_api_request(&request)).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("system").is_none());
    }

    #[test]
    fn tool_results_travel_as_user_role() {
        let message = ChatMessage {
            role: Role::ToolResults,
            content: vec![ContentBlock::tool_result("tc-1", "a.txt\nb.txt")],
        };
        let api = to_api_message(&message);
        assert_eq!(api.role, "user");
        let value = serde_json::to_value(&api).unwrap();
        assert_eq!(value["content"][0]["type"], "tool_result");
        assert_eq!(value["content"][0]["tool_use_id"], "tc-1");
    }

    #[test]
    fn response_roundtrip_with_tool_use() {
        let json_body = r#"{
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "list_directory",
                 "input": {"path": "/workspace"}}
            ],
            "stop_reason": "tool_use"
        }"#;
        let response: ApiResponse = serde_json::from_str(json_body).unwrap();
        let (content, stop_reason) = from_api_response(response).unwrap();

        assert_eq!(stop_reason, StopReason::ToolUse);
        assert_eq!(content.len(), 2);
        assert!(matches!(
            &content[1],
            ContentBlock::ToolCall { name, .. } if name == "list_directory"
        ));
    }

    #[test]
    fn end_turn_and_max_tokens_mapping() {
        for (wire, expected) in [
            (Some("end_turn"), StopReason::EndTurn),
            (Some("stop_sequence"), StopReason::EndTurn),
            (None, StopReason::EndTurn),
            (Some("max_tokens"), StopReason::MaxTokens),
        ] {
            let response = ApiResponse {
                content: vec![],
                stop_reason: wire.map(String::from),
            };
            assert_eq!(from_api_response(response).unwrap().1, expected);
        }
    }

    #[test]
    fn unknown_stop_reason_is_an_error() {
        let response = ApiResponse {
            content: vec![],
            stop_reason: Some("pause_turn".into()),
        };
        assert!(from_api_response(response).is_err());
    }

    #[test]
    fn error_response_parses() {
        let body = r#"{"error": {"type": "overloaded_error", "message": "Overloaded"}}"#;
        let err: ApiErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(err.error.type_, "overloaded_error");
        assert_eq!(err.error.message, "Overloaded");
    }
}
