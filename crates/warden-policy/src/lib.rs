// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Action classification policy for the Warden gateway.
//!
//! Every tool call the model requests is classified into an
//! [`ActionTier`](warden_core::types::ActionTier) by walking the configured
//! rule sets; the HITL gate combines the tier with per-session grants to
//! decide whether a human must approve the call.

pub mod classifier;
pub mod glob;
pub mod grants;
pub mod net;

pub use classifier::{browse_target_is_trusted, classify, classify_rules, PROPOSE_SOUL_UPDATE};
pub use grants::{canonical_input_key, SessionGrants};
pub use net::is_private_ip;
