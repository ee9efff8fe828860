// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as unique MCP server names and non-zero timeouts.
//! Collects all errors rather than failing fast.

use std::collections::HashSet;

use crate::model::WardenConfig;

/// A single semantic configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

fn err(message: impl Into<String>) -> ValidationError {
    ValidationError {
        message: message.into(),
    }
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns all collected errors; startup treats any error as fatal.
pub fn validate_config(config: &WardenConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.bridge.socket_path.trim().is_empty() {
        errors.push(err("bridge.socket_path must not be empty"));
    }

    if config.audit.directory.trim().is_empty() {
        errors.push(err("audit.directory must not be empty"));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(err("storage.database_path must not be empty"));
    }

    if config.llm.max_tokens == 0 {
        errors.push(err("llm.max_tokens must be greater than zero"));
    }

    match config.llm.provider.as_str() {
        "anthropic" | "openai" | "gemini" | "codex" => {}
        other => errors.push(err(format!(
            "llm.provider `{other}` is not one of anthropic, openai, gemini, codex"
        ))),
    }

    for (kind, exec) in [
        ("shell", &config.executors.shell),
        ("file", &config.executors.file),
        ("web", &config.executors.web),
    ] {
        if exec.image.trim().is_empty() {
            errors.push(err(format!("executors.{kind}.image must not be empty")));
        }
        if exec.default_timeout == 0 {
            errors.push(err(format!(
                "executors.{kind}.default_timeout must be greater than zero"
            )));
        }
        if exec.default_max_output == 0 {
            errors.push(err(format!(
                "executors.{kind}.default_max_output must be greater than zero"
            )));
        }
    }

    for (i, mount) in config.mounts.iter().enumerate() {
        if !mount.host_path.starts_with('/') {
            errors.push(err(format!(
                "mounts[{i}].host_path must be absolute, got `{}`",
                mount.host_path
            )));
        }
        if !mount.container_path.starts_with('/') {
            errors.push(err(format!(
                "mounts[{i}].container_path must be absolute, got `{}`",
                mount.container_path
            )));
        }
    }

    for (tier, rules) in [
        ("auto_approve", &config.action_tiers.auto_approve),
        ("notify", &config.action_tiers.notify),
        ("require_approval", &config.action_tiers.require_approval),
    ] {
        for (i, rule) in rules.iter().enumerate() {
            if rule.tool.trim().is_empty() {
                errors.push(err(format!(
                    "action_tiers.{tier}[{i}].tool must not be empty"
                )));
            }
            for (field, pattern) in &rule.conditions {
                if pattern.is_empty() {
                    errors.push(err(format!(
                        "action_tiers.{tier}[{i}].conditions.{field} must not be empty"
                    )));
                }
            }
        }
    }

    let mut seen_servers = HashSet::new();
    for (i, server) in config.mcp_servers.iter().enumerate() {
        if server.name.trim().is_empty() {
            errors.push(err(format!("mcp_servers[{i}].name must not be empty")));
        } else if !seen_servers.insert(&server.name) {
            errors.push(err(format!(
                "duplicate MCP server name `{}` in [[mcp_servers]] array",
                server.name
            )));
        }
        if server.name.contains("__") {
            errors.push(err(format!(
                "mcp_servers[{i}].name must not contain `__` (reserved as tool prefix separator)"
            )));
        }
        if server.image.trim().is_empty() {
            errors.push(err(format!("mcp_servers[{i}].image must not be empty")));
        }
        if server.max_tools == 0 {
            errors.push(err(format!(
                "mcp_servers[{i}].max_tools must be greater than zero"
            )));
        }
    }

    let mut seen_heartbeats = HashSet::new();
    for (i, hb) in config.heartbeats.iter().enumerate() {
        if hb.name.trim().is_empty() {
            errors.push(err(format!("heartbeats[{i}].name must not be empty")));
        } else if !seen_heartbeats.insert(&hb.name) {
            errors.push(err(format!(
                "duplicate heartbeat name `{}` in [[heartbeats]] array",
                hb.name
            )));
        }
        if hb.schedule.split_whitespace().count() != 5 {
            errors.push(err(format!(
                "heartbeats[{i}].schedule `{}` is not a 5-field cron expression",
                hb.schedule
            )));
        }
        if hb.prompt.trim().is_empty() {
            errors.push(err(format!("heartbeats[{i}].prompt must not be empty")));
        }
    }

    if config.approval.timeout_secs == 0 {
        errors.push(err("approval.timeout_secs must be greater than zero"));
    }
    if config.approval.sweep_interval_secs == 0 {
        errors.push(err("approval.sweep_interval_secs must be greater than zero"));
    }
    if config.task.max_iterations == 0 {
        errors.push(err("task.max_iterations must be greater than zero"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
