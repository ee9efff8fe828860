// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Warden gateway wiring: the event loop, production serve path, and
//! preflight checks. The binary in `main.rs` is a thin CLI over these.

pub mod doctor;
pub mod gateway;
pub mod serve;
