// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge sink that records every emitted event.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use warden_core::traits::bridge::{BridgeSink, GatewayEvent};
use warden_core::WardenError;

/// Records [`GatewayEvent`]s for assertions.
#[derive(Clone, Default)]
pub struct RecordingBridge {
    events: Arc<Mutex<Vec<GatewayEvent>>>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<GatewayEvent> {
        self.events.lock().expect("bridge lock poisoned").clone()
    }

    /// Approval-request events only.
    pub fn approval_requests(&self) -> Vec<GatewayEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, GatewayEvent::ApprovalRequest { .. }))
            .collect()
    }

    /// Poll until an approval request shows up, returning its id.
    ///
    /// Panics after ~2 seconds; tests drive the gate concurrently and need a
    /// rendezvous point to learn the generated approval id.
    pub async fn wait_for_approval_id(&self) -> String {
        for _ in 0..200 {
            if let Some(GatewayEvent::ApprovalRequest { approval_id, .. }) =
                self.approval_requests().into_iter().next_back()
            {
                return approval_id;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no approval request emitted within 2s");
    }
}

#[async_trait]
impl BridgeSink for RecordingBridge {
    async fn emit(&self, event: GatewayEvent) -> Result<(), WardenError> {
        self.events.lock().expect("bridge lock poisoned").push(event);
        Ok(())
    }
}
