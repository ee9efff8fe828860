// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Warden agent gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use warden_core::types::ActionTier;

/// Top-level Warden configuration.
///
/// Loaded from TOML following the XDG hierarchy, with `WARDEN_` environment
/// variable overrides. All sections are optional and default to sensible
/// values; validation catches semantically invalid combinations.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WardenConfig {
    /// Gateway identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// LLM provider selection.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Ephemeral executor sandbox policy, per executor kind.
    #[serde(default)]
    pub executors: ExecutorsConfig,

    /// Bind mounts offered to executors (capability mount claims).
    #[serde(default)]
    pub mounts: Vec<MountConfig>,

    /// Classifier rule sets, in priority order.
    #[serde(default)]
    pub action_tiers: ActionTiersConfig,

    /// Base allow-list for `browse_web` classification.
    #[serde(default)]
    pub trusted_domains: Vec<String>,

    /// Integrity-protected identity file.
    #[serde(default)]
    pub soul: SoulConfig,

    /// Integrity-protected skills directory.
    #[serde(default)]
    pub skills: SkillsConfig,

    /// Scheduled synthetic user turns.
    #[serde(default)]
    pub heartbeats: Vec<HeartbeatConfig>,

    /// Long-lived MCP plug-in servers.
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,

    /// Bridge transport settings.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Audit log settings.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Approval gate timing.
    #[serde(default)]
    pub approval: ApprovalConfig,

    /// Task loop settings.
    #[serde(default)]
    pub task: TaskConfig,
}

/// Gateway identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the agent.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "warden".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// LLM provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider name: `anthropic`, `openai`, `gemini`, or `codex`.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier passed to the provider.
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

/// Sandbox policy for one executor kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Container image for this executor.
    pub image: String,

    /// Memory limit, e.g. "512m".
    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,

    /// CPU limit, e.g. "0.5".
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: String,

    /// Default wall-clock timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout: u64,

    /// Default cap on concatenated stdout+stderr in bytes.
    #[serde(default = "default_max_output")]
    pub default_max_output: usize,

    /// Outbound domains this executor may reach. `None` means no network.
    #[serde(default)]
    pub allowed_domains: Option<Vec<String>>,
}

fn default_memory_limit() -> String {
    "512m".to_string()
}

fn default_cpu_limit() -> String {
    "0.5".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_output() -> usize {
    64 * 1024
}

/// Per-kind executor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorsConfig {
    #[serde(default = "default_shell_executor")]
    pub shell: ExecutorConfig,
    #[serde(default = "default_file_executor")]
    pub file: ExecutorConfig,
    #[serde(default = "default_web_executor")]
    pub web: ExecutorConfig,

    /// Structured (`structured`) vs legacy (`legacy`) browse output.
    #[serde(default = "default_web_result_format")]
    pub web_result_format: String,
}

impl Default for ExecutorsConfig {
    fn default() -> Self {
        Self {
            shell: default_shell_executor(),
            file: default_file_executor(),
            web: default_web_executor(),
            web_result_format: default_web_result_format(),
        }
    }
}

fn default_shell_executor() -> ExecutorConfig {
    ExecutorConfig {
        image: "warden-executor-shell:latest".to_string(),
        memory_limit: default_memory_limit(),
        cpu_limit: default_cpu_limit(),
        default_timeout: default_timeout_secs(),
        default_max_output: default_max_output(),
        allowed_domains: None,
    }
}

fn default_file_executor() -> ExecutorConfig {
    ExecutorConfig {
        image: "warden-executor-file:latest".to_string(),
        memory_limit: "256m".to_string(),
        cpu_limit: default_cpu_limit(),
        default_timeout: 30,
        default_max_output: default_max_output(),
        allowed_domains: None,
    }
}

fn default_web_executor() -> ExecutorConfig {
    ExecutorConfig {
        image: "warden-executor-web:latest".to_string(),
        memory_limit: "1g".to_string(),
        cpu_limit: "1.0".to_string(),
        default_timeout: 120,
        default_max_output: 128 * 1024,
        allowed_domains: Some(Vec::new()),
    }
}

fn default_web_result_format() -> String {
    "structured".to_string()
}

/// A bind mount offered to executors.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    pub host_path: String,
    pub container_path: String,
    #[serde(default = "default_read_only")]
    pub read_only: bool,
}

fn default_read_only() -> bool {
    true
}

/// One classifier rule: a tool name plus optional glob conditions on fields
/// of the tool input.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// Tool name the rule applies to.
    pub tool: String,

    /// Field -> glob pattern. All conditions must match; a missing field
    /// means the rule does not match.
    #[serde(default)]
    pub conditions: BTreeMap<String, String>,
}

/// Classifier rule sets, walked in tier order.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ActionTiersConfig {
    #[serde(default)]
    pub auto_approve: Vec<RuleConfig>,
    #[serde(default)]
    pub notify: Vec<RuleConfig>,
    #[serde(default)]
    pub require_approval: Vec<RuleConfig>,
}

impl ActionTiersConfig {
    /// Rule sets in classification priority order.
    pub fn tiers(&self) -> [(ActionTier, &[RuleConfig]); 3] {
        [
            (ActionTier::AutoApprove, self.auto_approve.as_slice()),
            (ActionTier::Notify, self.notify.as_slice()),
            (ActionTier::RequireApproval, self.require_approval.as_slice()),
        ]
    }
}

/// Integrity-protected identity (soul) file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SoulConfig {
    /// Path to the soul text file. `None` uses the built-in default identity.
    #[serde(default)]
    pub file: Option<String>,
}

/// Integrity-protected skills directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SkillsConfig {
    /// Directory scanned for skill files. `None` disables skills.
    #[serde(default)]
    pub directory: Option<String>,

    /// Character budget for inlined `always_load` skill content.
    #[serde(default = "default_char_budget")]
    pub char_budget: usize,

    /// Per-skill overrides: name -> enabled.
    #[serde(default)]
    pub overrides: BTreeMap<String, bool>,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            char_budget: default_char_budget(),
            overrides: BTreeMap::new(),
        }
    }
}

fn default_char_budget() -> usize {
    6_000
}

/// A scheduled synthetic user turn.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    pub name: String,
    /// Standard 5-field cron expression.
    pub schedule: String,
    /// Prompt injected as the synthetic user message.
    pub prompt: String,
    #[serde(default = "default_heartbeat_enabled")]
    pub enabled: bool,
    /// Chat to deliver results to; `None` broadcasts a notification.
    #[serde(default)]
    pub channel: Option<String>,
}

fn default_heartbeat_enabled() -> bool {
    true
}

/// Registry entry for a long-lived MCP plug-in server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct McpServerConfig {
    /// Unique server name; exposed tools are prefixed `mcp_{name}__`.
    pub name: String,

    /// Container image for the server.
    pub image: String,

    /// Command run inside the container.
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments for the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment passed into the container.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Bind mounts for the server.
    #[serde(default)]
    pub mounts: Vec<MountConfig>,

    /// Memory limit, e.g. "512m".
    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,

    /// CPU limit, e.g. "0.5".
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: String,

    /// Domains the server may reach through the egress proxy.
    /// Empty means no network at all.
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Tier applied to this server's tools when no explicit rule matches.
    #[serde(default = "default_mcp_tier")]
    pub default_tier: ActionTier,

    /// Only expose these tools (empty = all).
    #[serde(default)]
    pub include_tools: Vec<String>,

    /// Never expose these tools.
    #[serde(default)]
    pub exclude_tools: Vec<String>,

    /// Hard cap on exposed tools per server.
    #[serde(default = "default_max_tools")]
    pub max_tools: usize,

    /// Per-call timeout in seconds.
    #[serde(default = "default_mcp_call_timeout")]
    pub call_timeout: u64,
}

fn default_mcp_tier() -> ActionTier {
    ActionTier::RequireApproval
}

fn default_max_tools() -> usize {
    32
}

fn default_mcp_call_timeout() -> u64 {
    60
}

/// Bridge transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Path of the UNIX domain socket the gateway listens on.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Bounded per-client outbound frame buffer.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            send_buffer: default_send_buffer(),
        }
    }
}

fn default_socket_path() -> String {
    "/run/warden/gateway.sock".to_string()
}

fn default_send_buffer() -> usize {
    256
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Directory audit JSONL files are appended under.
    #[serde(default = "default_audit_dir")]
    pub directory: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            directory: default_audit_dir(),
        }
    }
}

fn default_audit_dir() -> String {
    "./audit".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "warden.db".to_string()
}

/// Approval gate timing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalConfig {
    /// How long a pending approval waits before expiring, in seconds.
    #[serde(default = "default_approval_timeout")]
    pub timeout_secs: u64,

    /// Expiry sweeper period in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_approval_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_approval_timeout() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

/// Task loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Maximum iterations per task session.
    #[serde(default = "default_task_iterations")]
    pub max_iterations: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_task_iterations(),
        }
    }
}

fn default_task_iterations() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_complete() {
        let config = WardenConfig::default();
        assert_eq!(config.agent.name, "warden");
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.executors.file.default_max_output, 64 * 1024);
        assert_eq!(config.approval.timeout_secs, 300);
        assert_eq!(config.approval.sweep_interval_secs, 60);
        assert_eq!(config.task.max_iterations, 10);
        assert!(config.mcp_servers.is_empty());
        assert!(config.heartbeats.is_empty());
    }

    #[test]
    fn shell_executor_has_no_network() {
        let config = WardenConfig::default();
        assert!(config.executors.shell.allowed_domains.is_none());
        assert!(config.executors.file.allowed_domains.is_none());
        assert!(config.executors.web.allowed_domains.is_some());
    }

    #[test]
    fn tiers_are_walked_in_priority_order() {
        let tiers = ActionTiersConfig::default();
        let order = tiers.tiers();
        assert_eq!(order[0].0, ActionTier::AutoApprove);
        assert_eq!(order[1].0, ActionTier::Notify);
        assert_eq!(order[2].0, ActionTier::RequireApproval);
    }

    #[test]
    fn mcp_server_defaults() {
        let toml = r#"
            name = "github"
            image = "mcp/github:latest"
        "#;
        let server: McpServerConfig = toml_from_str(toml);
        assert_eq!(server.default_tier, ActionTier::RequireApproval);
        assert_eq!(server.max_tools, 32);
        assert!(server.allowed_domains.is_empty());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let toml = r#"
            [agent]
            name = "test"
            unknown_option = true
        "#;
        let result: Result<WardenConfig, _> = try_toml_from_str(toml);
        assert!(result.is_err());
    }

    fn toml_from_str<T: serde::de::DeserializeOwned>(s: &str) -> T {
        try_toml_from_str(s).expect("valid toml")
    }

    fn try_toml_from_str<T: serde::de::DeserializeOwned>(
        s: &str,
    ) -> Result<T, figment::Error> {
        use figment::providers::Format;
        figment::Figment::new()
            .merge(figment::providers::Toml::string(s))
            .extract()
    }
}
