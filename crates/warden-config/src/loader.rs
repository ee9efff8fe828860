// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./warden.toml` > `~/.config/warden/warden.toml`
//! > `/etc/warden/warden.toml`, with environment variable overrides via the
//! `WARDEN_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::WardenConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/warden/warden.toml` (system-wide)
/// 3. `~/.config/warden/warden.toml` (user XDG config)
/// 4. `./warden.toml` (local directory)
/// 5. `WARDEN_*` environment variables
pub fn load_config() -> Result<WardenConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<WardenConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WardenConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WardenConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WardenConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for
/// diagnostic use so callers can inspect provenance metadata).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(WardenConfig::default()))
        .merge(Toml::file("/etc/warden/warden.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("warden/warden.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("warden.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `WARDEN_BRIDGE_SOCKET_PATH` must map to
/// `bridge.socket_path`, not `bridge.socket.path`.
fn env_provider() -> Env {
    Env::prefixed("WARDEN_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("llm_", "llm.", 1)
            .replacen("bridge_", "bridge.", 1)
            .replacen("audit_", "audit.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("approval_", "approval.", 1)
            .replacen("task_", "task.", 1)
            .replacen("soul_", "soul.", 1)
            .replacen("skills_", "skills.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_any_file() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.agent.name, "warden");
        assert_eq!(config.llm.max_tokens, 4096);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [agent]
            name = "custom"
            log_level = "debug"

            [approval]
            timeout_secs = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.agent.name, "custom");
        assert_eq!(config.agent.log_level, "debug");
        assert_eq!(config.approval.timeout_secs, 120);
        // Untouched sections keep their defaults.
        assert_eq!(config.approval.sweep_interval_secs, 60);
    }

    #[test]
    fn action_tier_rules_parse() {
        let config = load_config_from_str(
            r#"
            [[action_tiers.auto_approve]]
            tool = "list_directory"

            [[action_tiers.auto_approve]]
            tool = "read_file"
            conditions = { path = "/workspace/**" }

            [[action_tiers.require_approval]]
            tool = "run_shell_command"
            "#,
        )
        .unwrap();
        assert_eq!(config.action_tiers.auto_approve.len(), 2);
        assert_eq!(
            config.action_tiers.auto_approve[1]
                .conditions
                .get("path")
                .unwrap(),
            "/workspace/**"
        );
        assert_eq!(config.action_tiers.require_approval.len(), 1);
    }

    #[test]
    fn heartbeats_and_mcp_servers_parse() {
        let config = load_config_from_str(
            r#"
            [[heartbeats]]
            name = "morning-brief"
            schedule = "0 7 * * *"
            prompt = "Summarize my inbox"
            channel = "tg-1"

            [[mcp_servers]]
            name = "github"
            image = "mcp/github:latest"
            allowed_domains = ["api.github.com"]
            include_tools = ["search_issues"]
            default_tier = "notify"
            "#,
        )
        .unwrap();
        assert_eq!(config.heartbeats.len(), 1);
        assert!(config.heartbeats[0].enabled);
        assert_eq!(config.mcp_servers[0].allowed_domains, ["api.github.com"]);
        assert_eq!(
            config.mcp_servers[0].default_tier,
            warden_core::types::ActionTier::Notify
        );
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(load_config_from_str("this is not toml [").is_err());
    }
}
