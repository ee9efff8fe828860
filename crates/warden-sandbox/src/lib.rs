// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ephemeral executor sandboxing for the Warden gateway.
//!
//! Every executor-routed tool call becomes exactly one hardened container:
//! capability token in, last JSON line of stdout out, removal guaranteed.

pub mod dispatcher;
pub mod docker;
pub mod egress;

pub use dispatcher::{Dispatcher, TASK_ENV, TOKEN_ENV, WEB_RESULT_FORMAT_ENV};
pub use docker::{DockerCli, EGRESS_BRIDGE};
pub use egress::{iptables_rules, resolve_allowed_domains};
