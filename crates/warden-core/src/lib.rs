// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Warden agent gateway.
//!
//! This crate provides the foundational types, error taxonomy, and capability
//! traits used throughout the Warden workspace: the content-block vocabulary,
//! session/memory/approval/task data model, and the provider, container
//! runtime, and bridge-sink seams.

pub mod error;
pub mod traits;
pub mod types;

pub use error::WardenError;
pub use traits::{
    BridgeSink, ChatMessage, ChatRequest, ChatResponse, ContainerId, ContainerRuntime,
    ContainerSpec, GatewayEvent, LlmProvider, MountSpec, RunOutput, StopReason, ToolSpec,
};
pub use types::{
    ActionTier, Approval, ApprovalStatus, ContentBlock, ConversationTurn, ExecutorKind,
    ExecutorResult, ExecutorTask, Memory, MemoryCategory, Message, NetworkPolicy, PlanStep, Role,
    Session, SourceTag, StepStatus, TaskPlan, TaskSession, TaskStatus, TurnContent,
    MAX_SESSION_TURNS,
};
