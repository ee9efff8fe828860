// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API implementation of the Warden
//! [`LlmProvider`](warden_core::LlmProvider) trait.
//!
//! Other providers (OpenAI, Gemini, Codex) plug in behind the same trait;
//! the orchestrator only ever sees the provider-agnostic content blocks.

pub mod client;
pub mod types;

pub use client::AnthropicProvider;
