// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge transport for the Warden gateway: JSON-lines frames over a local
//! UNIX domain socket, with a multi-client server on the gateway side and a
//! reconnecting client for bridge adapters.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{BridgeClient, ClientEvent};
pub use protocol::{
    Decision, HeartbeatSummary, InboundFrame, OutboundFrame, Outgoing, ReplyTo, RequestMessage,
    SessionSummary,
};
pub use server::{BridgeServer, ClientId, ServerEvent};
