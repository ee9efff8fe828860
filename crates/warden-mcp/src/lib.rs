// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-lived MCP plug-in servers for the Warden gateway: sandboxed
//! containers speaking JSON-RPC 2.0 over stdio, with a per-server domain
//! firewall enforced by the CONNECT proxy.

pub mod channel;
pub mod manager;
pub mod protocol;
pub mod proxy;

pub use channel::JsonRpcChannel;
pub use manager::{DockerLauncher, McpManager, ServerIo, ServerLauncher, TOOL_PREFIX_SEP};
pub use protocol::{McpContent, NormalizedResult, ToolDescriptor};
pub use proxy::{DomainProxy, HostResolver, SystemResolver};
