// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits at the gateway's seams.

pub mod bridge;
pub mod provider;
pub mod runtime;

pub use bridge::{BridgeSink, GatewayEvent};
pub use provider::{ChatMessage, ChatRequest, ChatResponse, LlmProvider, StopReason, ToolSpec};
pub use runtime::{ContainerId, ContainerRuntime, ContainerSpec, MountSpec, RunOutput};
