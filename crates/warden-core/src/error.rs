// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Warden agent gateway.

use thiserror::Error;

/// The primary error type used across all Warden crates.
///
/// Variants follow the gateway's propagation policy: errors local to a tool
/// call become tool results, errors local to a turn abort the turn, errors
/// local to startup are fatal, and integrity errors degrade the resource
/// without escalating.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Configuration errors (invalid TOML, missing required fields or secrets).
    /// Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bridge transport errors (socket bind, accept, or frame failure).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM provider errors (API failure, malformed response).
    #[error("provider error: {message}")]
    Llm {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An approval rendezvous expired before a decision arrived.
    #[error("approval {approval_id} timed out")]
    ApprovalTimeout { approval_id: String },

    /// Container start, token mint, or executor runtime failure.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Hash mismatch on an integrity-protected resource (soul or skill file).
    /// Never fatal: the resource is disabled and assembly falls back.
    #[error("integrity failure for {resource}: {message}")]
    Integrity { resource: String, message: String },

    /// MCP server crash or protocol violation.
    #[error("mcp server '{server}': {message}")]
    Mcp { server: String, message: String },

    /// Capability token signature or expiry failure.
    #[error("capability error: {0}")]
    Capability(String),

    /// Storage backend errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Operation was cancelled by a task-stop or shutdown signal.
    #[error("operation cancelled")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// Wrap an arbitrary error as a storage error.
    pub fn storage<E: std::error::Error + Send + Sync + 'static>(source: E) -> Self {
        WardenError::Storage {
            source: Box::new(source),
        }
    }

    /// Wrap an arbitrary error as a transport error with context.
    pub fn transport<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        WardenError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
