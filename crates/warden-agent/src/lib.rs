// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Warden gateway's request-processing kernel.
//!
//! The [`Orchestrator`] drives the LLM/tool loop, the [`HitlGate`] stands
//! between the model and every tool call, the [`TaskRunner`] iterates
//! complex tasks with a fresh context window, and the [`HeartbeatRunner`]
//! injects scheduled synthetic turns.

pub mod gate;
pub mod heartbeat;
pub mod memory_tools;
pub mod orchestrator;
pub mod taskloop;
pub mod tools;

pub use gate::{GateDecision, GatePolicy, GateRequest, HitlGate};
pub use heartbeat::{HeartbeatRunner, HeartbeatStatus};
pub use orchestrator::{ChatOutcome, Orchestrator, MAX_ITERATIONS};
pub use taskloop::{TaskOutcome, TaskRunner, CONTINUE_SENTINEL};
