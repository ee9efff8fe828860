// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted mock adapters for fast, CI-runnable Warden tests: no external
//! API calls, no container runtime, no sockets.

pub mod mock_provider;
pub mod mock_runtime;
pub mod recording_bridge;

pub use mock_provider::MockProvider;
pub use mock_runtime::{MockRuntime, SharedMockRuntime};
pub use recording_bridge::RecordingBridge;
