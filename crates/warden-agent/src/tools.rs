// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The built-in tool catalog visible to the model.

use serde_json::json;
use warden_core::traits::provider::ToolSpec;
use warden_core::types::ExecutorKind;

/// In-process memory tools, exempt from the HITL gate.
pub const SAVE_MEMORY: &str = "save_memory";
pub const SEARCH_MEMORY: &str = "search_memory";

/// Which executor kind an executor-routed tool runs on. `None` means the
/// tool is not executor-routed (in-process or MCP).
pub fn executor_kind_for(tool: &str) -> Option<ExecutorKind> {
    match tool {
        "run_shell_command" => Some(ExecutorKind::Shell),
        "read_file" | "write_file" | "list_directory" | "search_files" => {
            Some(ExecutorKind::File)
        }
        "browse_web" => Some(ExecutorKind::Web),
        _ => None,
    }
}

/// Whether a tool runs in-process against the memory store.
pub fn is_memory_tool(tool: &str) -> bool {
    tool == SAVE_MEMORY || tool == SEARCH_MEMORY
}

/// The built-in tool specs, in catalog order.
pub fn builtin_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "run_shell_command".into(),
            description: "Run a shell command in an ephemeral sandbox and return its output."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "The command to run"}
                },
                "required": ["command"]
            }),
        },
        ToolSpec {
            name: "read_file".into(),
            description: "Read a file from a mounted workspace path.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Absolute path to read"}
                },
                "required": ["path"]
            }),
        },
        ToolSpec {
            name: "write_file".into(),
            description: "Write content to a file under a mounted workspace path.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Absolute path to write"},
                    "content": {"type": "string", "description": "Full file content"}
                },
                "required": ["path", "content"]
            }),
        },
        ToolSpec {
            name: "list_directory".into(),
            description: "List the entries of a directory.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Absolute directory path"}
                },
                "required": ["path"]
            }),
        },
        ToolSpec {
            name: "search_files".into(),
            description: "Search file contents under a directory for a pattern.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Directory to search under"},
                    "pattern": {"type": "string", "description": "Search pattern"}
                },
                "required": ["path", "pattern"]
            }),
        },
        ToolSpec {
            name: "browse_web".into(),
            description: "Fetch a web page in the sandboxed browser executor.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "URL to fetch"}
                },
                "required": ["url"]
            }),
        },
        ToolSpec {
            name: SAVE_MEMORY.into(),
            description: "Save a durable memory about the user.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "enum": ["user", "preference", "project", "fact", "environment"]
                    },
                    "topic": {"type": "string", "description": "Short unique topic key"},
                    "content": {"type": "string", "description": "The fact to remember"}
                },
                "required": ["category", "topic", "content"]
            }),
        },
        ToolSpec {
            name: SEARCH_MEMORY.into(),
            description: "Search saved memories by keyword.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Keywords to search for"},
                    "limit": {"type": "integer", "description": "Max results (default 5)"}
                },
                "required": ["query"]
            }),
        },
        ToolSpec {
            name: "propose_soul_update".into(),
            description: "Propose a replacement for the agent's identity text. \
                          Always requires explicit human approval."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "The full proposed identity text"}
                },
                "required": ["text"]
            }),
        },
    ]
}
