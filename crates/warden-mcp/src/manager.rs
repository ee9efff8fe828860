// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MCP server manager.
//!
//! Boot: launch each configured server's sandboxed container, perform the
//! `initialize` handshake, list its tools, apply include/exclude/max-tools
//! filters, and expose the survivors prefixed `mcp_{server}__`. Runtime:
//! route `call_tool` by prefix to the owning server's channel. A dead server
//! gets exactly one restart attempt with backoff; failing that, its tools
//! stay unavailable until the next boot.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use warden_config::model::McpServerConfig;
use warden_core::traits::provider::ToolSpec;
use warden_core::types::NetworkPolicy;
use warden_core::WardenError;
use warden_sandbox::EGRESS_BRIDGE;

use crate::channel::JsonRpcChannel;
use crate::protocol::{NormalizedResult, ToolDescriptor, ToolsListResult, MCP_PROTOCOL_VERSION};

/// Separator between the server prefix and the tool name.
pub const TOOL_PREFIX_SEP: &str = "__";

/// Stdio pair (plus optional child handle) for one launched server.
pub struct ServerIo {
    pub reader: Box<dyn AsyncRead + Unpin + Send>,
    pub writer: Box<dyn AsyncWrite + Unpin + Send>,
    pub child: Option<tokio::process::Child>,
}

/// Launches MCP server containers. The production launcher shells out to the
/// container CLI; tests substitute in-process streams.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    async fn launch(&self, config: &McpServerConfig) -> Result<ServerIo, WardenError>;
}

/// Container-CLI launcher: `docker run -i` with the full hardening set.
pub struct DockerLauncher {
    binary: String,
}

impl DockerLauncher {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Argument vector for one server, exposed for doctor/diagnostics.
    pub fn run_args(config: &McpServerConfig) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--rm".into(),
            "--interactive".into(),
            "--cap-drop".into(),
            "ALL".into(),
            "--security-opt".into(),
            "no-new-privileges".into(),
            "--user".into(),
            "10001".into(),
            "--memory".into(),
            config.memory_limit.clone(),
            "--cpus".into(),
            config.cpu_limit.clone(),
        ];

        let network = if config.allowed_domains.is_empty() {
            NetworkPolicy::None
        } else {
            NetworkPolicy::Allowed {
                domains: config.allowed_domains.clone(),
            }
        };
        args.push("--network".into());
        args.push(match network {
            NetworkPolicy::None => "none".into(),
            NetworkPolicy::Allowed { .. } => EGRESS_BRIDGE.into(),
        });

        for mount in &config.mounts {
            let suffix = if mount.read_only { ":ro" } else { ":rw" };
            args.push("--volume".into());
            args.push(format!("{}:{}{suffix}", mount.host_path, mount.container_path));
        }
        for (key, value) in &config.env {
            args.push("--env".into());
            args.push(format!("{key}={value}"));
        }

        args.push(config.image.clone());
        if let Some(command) = &config.command {
            args.push(command.clone());
        }
        args.extend(config.args.iter().cloned());
        args
    }
}

impl Default for DockerLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServerLauncher for DockerLauncher {
    async fn launch(&self, config: &McpServerConfig) -> Result<ServerIo, WardenError> {
        let mut child = tokio::process::Command::new(&self.binary)
            .args(Self::run_args(config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| WardenError::Mcp {
                server: config.name.clone(),
                message: format!("container spawn failed: {e}"),
            })?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stdin = child.stdin.take().expect("stdin piped");
        Ok(ServerIo {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            child: Some(child),
        })
    }
}

struct ServerHandle {
    config: McpServerConfig,
    channel: JsonRpcChannel,
    child: Option<tokio::process::Child>,
    /// Unprefixed tool names this server exposes after filtering.
    tools: Vec<ToolDescriptor>,
    restarted: bool,
}

/// Manages the fleet of long-lived MCP plug-in servers.
pub struct McpManager {
    launcher: Arc<dyn ServerLauncher>,
    servers: Mutex<HashMap<String, ServerHandle>>,
}

impl McpManager {
    pub fn new(launcher: Arc<dyn ServerLauncher>) -> Self {
        Self {
            launcher,
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// Launch and initialize every configured server. A server that fails to
    /// boot is skipped with an error log; the rest of the fleet comes up.
    pub async fn boot(&self, configs: &[McpServerConfig]) -> Result<(), WardenError> {
        for config in configs {
            match self.boot_one(config).await {
                Ok(handle) => {
                    info!(
                        server = %config.name,
                        tools = handle.tools.len(),
                        "mcp server ready"
                    );
                    self.servers
                        .lock()
                        .await
                        .insert(config.name.clone(), handle);
                }
                Err(e) => {
                    error!(server = %config.name, error = %e, "mcp server failed to boot");
                }
            }
        }
        Ok(())
    }

    async fn boot_one(&self, config: &McpServerConfig) -> Result<ServerHandle, WardenError> {
        let io = self.launcher.launch(config).await?;
        let channel = JsonRpcChannel::new(config.name.clone(), io.reader, io.writer);
        let timeout = Duration::from_secs(config.call_timeout);

        channel
            .request(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "warden", "version": env!("CARGO_PKG_VERSION")},
                })),
                timeout,
            )
            .await?;
        channel
            .notify("notifications/initialized", None)
            .await?;

        let listed = channel.request("tools/list", None, timeout).await?;
        let listed: ToolsListResult =
            serde_json::from_value(listed).map_err(|e| WardenError::Mcp {
                server: config.name.clone(),
                message: format!("malformed tools/list result: {e}"),
            })?;

        let tools = filter_tools(listed.tools, config);
        Ok(ServerHandle {
            config: config.clone(),
            channel,
            child: io.child,
            tools,
            restarted: false,
        })
    }

    /// Every exposed tool, prefixed, across all live servers.
    pub async fn tool_specs(&self) -> Vec<ToolSpec> {
        let servers = self.servers.lock().await;
        let mut specs = Vec::new();
        for (name, handle) in servers.iter() {
            for tool in &handle.tools {
                specs.push(ToolSpec {
                    name: prefixed_name(name, &tool.name),
                    description: tool.description.clone(),
                    input_schema: tool.input_schema.clone(),
                });
            }
        }
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Whether a prefixed tool name routes to a live server.
    pub async fn owns_tool(&self, prefixed: &str) -> bool {
        match split_prefixed(prefixed) {
            Some((server, tool)) => {
                let servers = self.servers.lock().await;
                servers
                    .get(server)
                    .is_some_and(|h| h.tools.iter().any(|t| t.name == tool))
            }
            None => false,
        }
    }

    /// Call a prefixed tool, restarting the owning server once if its
    /// channel died.
    pub async fn call_tool(
        &self,
        prefixed: &str,
        args: serde_json::Value,
    ) -> Result<NormalizedResult, WardenError> {
        let (server_name, tool_name) = split_prefixed(prefixed).ok_or_else(|| {
            WardenError::Mcp {
                server: "?".to_string(),
                message: format!("`{prefixed}` is not an mcp-prefixed tool name"),
            }
        })?;
        let server_name = server_name.to_string();
        let tool_name = tool_name.to_string();

        self.ensure_alive(&server_name).await?;

        let (timeout, known) = {
            let servers = self.servers.lock().await;
            let handle = servers.get(&server_name).ok_or_else(|| WardenError::Mcp {
                server: server_name.clone(),
                message: "server not running".to_string(),
            })?;
            (
                Duration::from_secs(handle.config.call_timeout),
                handle.tools.iter().any(|t| t.name == tool_name),
            )
        };
        if !known {
            return Err(WardenError::Mcp {
                server: server_name,
                message: format!("tool `{tool_name}` is not exposed"),
            });
        }

        let result = {
            let servers = self.servers.lock().await;
            let handle = servers.get(&server_name).ok_or_else(|| WardenError::Mcp {
                server: server_name.clone(),
                message: "server not running".to_string(),
            })?;
            handle
                .channel
                .request(
                    "tools/call",
                    Some(serde_json::json!({"name": tool_name, "arguments": args})),
                    timeout,
                )
                .await?
        };

        serde_json::from_value(result).map_err(|e| WardenError::Mcp {
            server: server_name,
            message: format!("malformed tools/call result: {e}"),
        })
    }

    /// Restart a dead server once, with backoff. A second death sticks.
    async fn ensure_alive(&self, server_name: &str) -> Result<(), WardenError> {
        let needs_restart = {
            let servers = self.servers.lock().await;
            match servers.get(server_name) {
                Some(handle) => !handle.channel.is_alive() && !handle.restarted,
                None => {
                    return Err(WardenError::Mcp {
                        server: server_name.to_string(),
                        message: "server not running".to_string(),
                    })
                }
            }
        };

        if needs_restart {
            warn!(server = server_name, "mcp server died, attempting one restart");
            tokio::time::sleep(Duration::from_secs(1)).await;

            // The attempt itself consumes the single retry, success or not.
            let config = {
                let mut servers = self.servers.lock().await;
                let handle = servers.get_mut(server_name).expect("checked above");
                handle.restarted = true;
                handle.config.clone()
            };
            match self.boot_one(&config).await {
                Ok(mut handle) => {
                    handle.restarted = true;
                    let mut servers = self.servers.lock().await;
                    if let Some(old) = servers.insert(server_name.to_string(), handle) {
                        shutdown_handle(old).await;
                    }
                }
                Err(e) => {
                    error!(server = server_name, error = %e, "mcp restart failed");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Terminate all servers and drain their channels.
    pub async fn shutdown(&self) {
        let handles: Vec<ServerHandle> = {
            let mut servers = self.servers.lock().await;
            servers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            shutdown_handle(handle).await;
        }
        info!("mcp manager shut down");
    }
}

async fn shutdown_handle(handle: ServerHandle) {
    handle.channel.shutdown().await;
    if let Some(mut child) = handle.child {
        let _ = child.kill().await;
    }
}

fn prefixed_name(server: &str, tool: &str) -> String {
    format!("mcp_{server}{TOOL_PREFIX_SEP}{tool}")
}

/// Split `mcp_{server}__{tool}` into its parts.
fn split_prefixed(prefixed: &str) -> Option<(&str, &str)> {
    prefixed
        .strip_prefix("mcp_")?
        .split_once(TOOL_PREFIX_SEP)
}

/// Apply include/exclude/max-tools filters, in that order.
fn filter_tools(tools: Vec<ToolDescriptor>, config: &McpServerConfig) -> Vec<ToolDescriptor> {
    let mut filtered: Vec<ToolDescriptor> = tools
        .into_iter()
        .filter(|t| config.include_tools.is_empty() || config.include_tools.contains(&t.name))
        .filter(|t| !config.exclude_tools.contains(&t.name))
        .collect();
    if filtered.len() > config.max_tools {
        warn!(
            server = %config.name,
            dropped = filtered.len() - config.max_tools,
            "max_tools cap dropped advertised tools"
        );
        filtered.truncate(config.max_tools);
    }
    filtered
}
