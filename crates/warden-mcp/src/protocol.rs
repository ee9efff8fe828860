// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON-RPC 2.0 envelope and MCP method payloads.
//!
//! MCP servers speak newline-delimited JSON-RPC 2.0 over stdio, with the
//! handshake `initialize` -> `tools/list` -> `tools/call`.

use serde::{Deserialize, Serialize};

/// Protocol version the gateway negotiates.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// An outgoing JSON-RPC request.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// An incoming JSON-RPC frame: response or notification.
///
/// Responses carry an `id`; notifications carry a `method` and no `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcFrame {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// One tool advertised by a server via `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema", rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object"})
}

/// `tools/list` result payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<ToolDescriptor>,
}

/// One content fragment of a `tools/call` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpContent {
    Text { text: String },
}

/// Normalised `tools/call` result handed back to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedResult {
    #[serde(default, rename = "isError")]
    pub is_error: bool,
    #[serde(default)]
    pub content: Vec<McpContent>,
}

impl NormalizedResult {
    /// Concatenated text content.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|McpContent::Text { text }| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// An error result carrying one text fragment.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            content: vec![McpContent::Text { text: text.into() }],
        }
    }
}
