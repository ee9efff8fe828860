// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The human-in-the-loop gate.
//!
//! Every non-memory tool call passes through [`HitlGate::gate`]: the call is
//! classified, auto-approved calls proceed, notify-tier calls emit a
//! notification before dispatch, and require-approval calls block on a
//! single-shot rendezvous keyed by approval id. The first resolution wins --
//! a bridge decision or the expiry sweeper -- and later resolutions are
//! no-ops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_audit::{AuditKind, AuditLogger};
use warden_config::model::{ActionTiersConfig, ApprovalConfig, McpServerConfig};
use warden_core::traits::bridge::{BridgeSink, GatewayEvent};
use warden_core::types::{ActionTier, ApprovalStatus};
use warden_core::WardenError;
use warden_policy::{browse_target_is_trusted, classify_rules, SessionGrants};
use warden_store::{ApprovalStore, NewApproval};

/// A tool call presented to the gate.
#[derive(Debug, Clone)]
pub struct GateRequest {
    pub session_id: String,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub chat_id: String,
    /// The assistant's surrounding text, shown to the approver.
    pub reason: String,
    /// The user request that led here, shown to the approver.
    pub plan_context: Option<String>,
}

/// Outcome of gating one tool call.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub proceed: bool,
    pub tier: ActionTier,
    pub approval_id: Option<String>,
    /// Terminal approval status, for require-approval calls.
    pub outcome: Option<ApprovalStatus>,
}

struct Waiter {
    tx: oneshot::Sender<ApprovalStatus>,
    chat_id: String,
}

/// Everything that feeds classification: tier rules, the trusted-domain
/// base allow-list, and per-server MCP default tiers.
#[derive(Default)]
pub struct GatePolicy {
    pub tiers: ActionTiersConfig,
    pub trusted_domains: Vec<String>,
    /// Server name -> tier applied to that server's tools when no explicit
    /// rule matches.
    pub mcp_default_tiers: HashMap<String, ActionTier>,
}

impl GatePolicy {
    pub fn new(
        tiers: ActionTiersConfig,
        trusted_domains: Vec<String>,
        mcp_servers: &[McpServerConfig],
    ) -> Self {
        Self {
            tiers,
            trusted_domains,
            mcp_default_tiers: mcp_servers
                .iter()
                .map(|s| (s.name.clone(), s.default_tier))
                .collect(),
        }
    }

    /// Resolve a tool call's tier: explicit rules first, then the
    /// per-server MCP default, then the trusted browse allow-list, then
    /// the fail-safe require-approval default.
    fn tier_for(&self, tool_name: &str, input: &serde_json::Value) -> ActionTier {
        if let Some(tier) = classify_rules(tool_name, input, &self.tiers) {
            return tier;
        }
        if let Some(server) = tool_name
            .strip_prefix("mcp_")
            .and_then(|rest| rest.split_once("__"))
            .map(|(server, _)| server)
        {
            if let Some(tier) = self.mcp_default_tiers.get(server) {
                return *tier;
            }
        }
        if tool_name == "browse_web" && browse_target_is_trusted(input, &self.trusted_domains) {
            return ActionTier::Notify;
        }
        ActionTier::RequireApproval
    }
}

/// Classification + approval coordinator between the model and every tool.
pub struct HitlGate {
    policy: GatePolicy,
    grants: SessionGrants,
    approvals: ApprovalStore,
    audit: AuditLogger,
    bridge: Arc<dyn BridgeSink>,
    timeout: Duration,
    sweep_interval: Duration,
    waiters: Mutex<HashMap<String, Waiter>>,
}

impl HitlGate {
    pub fn new(
        policy: GatePolicy,
        approvals: ApprovalStore,
        audit: AuditLogger,
        bridge: Arc<dyn BridgeSink>,
        config: &ApprovalConfig,
    ) -> Self {
        Self {
            policy,
            grants: SessionGrants::new(),
            approvals,
            audit,
            bridge,
            timeout: Duration::from_secs(config.timeout_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Grants store, exposed so session expiry can clear them.
    pub fn grants(&self) -> &SessionGrants {
        &self.grants
    }

    /// Gate one tool call. Blocks until approval resolves for
    /// require-approval calls.
    pub async fn gate(&self, request: GateRequest) -> Result<GateDecision, WardenError> {
        let mut tier = self.policy.tier_for(&request.tool_name, &request.tool_input);

        // Session-grant downgrade. `propose_soul_update` never qualifies;
        // the grants store refuses to record or match it.
        if tier == ActionTier::RequireApproval
            && self
                .grants
                .is_granted(&request.session_id, &request.tool_name, &request.tool_input)
        {
            debug!(tool = %request.tool_name, "session grant downgrades to notify");
            tier = ActionTier::Notify;
        }

        self.audit
            .log(
                AuditKind::ActionClassified,
                &request.session_id,
                serde_json::json!({
                    "tool": request.tool_name,
                    "tier": tier,
                }),
            )
            .await;

        match tier {
            ActionTier::AutoApprove => Ok(GateDecision {
                proceed: true,
                tier,
                approval_id: None,
                outcome: None,
            }),
            ActionTier::Notify => {
                // Emitted before dispatch so the user learns about the
                // action even if the dispatch stalls.
                if let Err(e) = self
                    .bridge
                    .emit(GatewayEvent::Notification {
                        chat_id: request.chat_id.clone(),
                        text: format!("Running {}: {}", request.tool_name, request.reason),
                    })
                    .await
                {
                    warn!(error = %e, "notify emission failed");
                }
                Ok(GateDecision {
                    proceed: true,
                    tier,
                    approval_id: None,
                    outcome: None,
                })
            }
            ActionTier::RequireApproval => self.await_approval(request).await,
        }
    }

    async fn await_approval(&self, request: GateRequest) -> Result<GateDecision, WardenError> {
        let approval = self
            .approvals
            .create(NewApproval {
                session_id: request.session_id.clone(),
                tool_name: request.tool_name.clone(),
                tool_input: request.tool_input.to_string(),
                capability: None,
                reason: request.reason.clone(),
                plan_context: request.plan_context.clone(),
            })
            .await?;

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().expect("waiters lock poisoned").insert(
            approval.id.clone(),
            Waiter {
                tx,
                chat_id: request.chat_id.clone(),
            },
        );

        self.audit
            .log(
                AuditKind::ApprovalRequested,
                &request.session_id,
                serde_json::json!({
                    "approvalId": approval.id,
                    "tool": request.tool_name,
                }),
            )
            .await;

        self.bridge
            .emit(GatewayEvent::ApprovalRequest {
                approval_id: approval.id.clone(),
                tool_name: request.tool_name.clone(),
                tool_input: request.tool_input.clone(),
                reason: request.reason.clone(),
                plan_context: request.plan_context.clone(),
                chat_id: request.chat_id.clone(),
            })
            .await?;

        info!(approval_id = %approval.id, tool = %request.tool_name, "awaiting approval");

        // First writer wins: a bridge decision or the expiry sweeper.
        let outcome = rx.await.unwrap_or(ApprovalStatus::Expired);

        if outcome == ApprovalStatus::SessionApproved {
            self.grants
                .grant(&request.session_id, &request.tool_name, &request.tool_input);
        }

        Ok(GateDecision {
            proceed: outcome.allows_proceed(),
            tier: ActionTier::RequireApproval,
            approval_id: Some(approval.id),
            outcome: Some(outcome),
        })
    }

    /// Apply a bridge decision. Later decisions for an already-resolved
    /// approval are no-ops.
    pub async fn resolve(
        &self,
        approval_id: &str,
        decision: ApprovalStatus,
    ) -> Result<(), WardenError> {
        if !decision.is_terminal() || decision == ApprovalStatus::Expired {
            return Err(WardenError::Internal(format!(
                "`{decision}` is not a valid bridge decision"
            )));
        }

        let row = self
            .approvals
            .resolve(approval_id, decision)
            .await?
            .ok_or_else(|| {
                WardenError::Internal(format!("approval {approval_id} not found"))
            })?;

        let waiter = self
            .waiters
            .lock()
            .expect("waiters lock poisoned")
            .remove(approval_id);

        match waiter {
            Some(waiter) => {
                self.audit
                    .log(
                        AuditKind::ApprovalResolved,
                        &row.session_id,
                        serde_json::json!({
                            "approvalId": approval_id,
                            "outcome": row.status,
                        }),
                    )
                    .await;
                let _ = waiter.tx.send(row.status);
            }
            None => {
                debug!(approval_id, "late decision ignored (already resolved)");
            }
        }
        Ok(())
    }

    /// Expire stale pending approvals, firing their rendezvous and emitting
    /// `approval-expired` to the bridges. Returns how many expired.
    pub async fn sweep(&self) -> Result<usize, WardenError> {
        let expired = self
            .approvals
            .expire_stale_pending(chrono::Duration::from_std(self.timeout).expect("timeout fits"))
            .await?;

        for approval in &expired {
            let waiter = self
                .waiters
                .lock()
                .expect("waiters lock poisoned")
                .remove(&approval.id);

            self.audit
                .log(
                    AuditKind::ApprovalResolved,
                    &approval.session_id,
                    serde_json::json!({
                        "approvalId": approval.id,
                        "outcome": ApprovalStatus::Expired,
                    }),
                )
                .await;

            if let Some(waiter) = waiter {
                if let Err(e) = self
                    .bridge
                    .emit(GatewayEvent::ApprovalExpired {
                        approval_id: approval.id.clone(),
                        chat_id: waiter.chat_id.clone(),
                    })
                    .await
                {
                    warn!(error = %e, "approval-expired emission failed");
                }
                let _ = waiter.tx.send(ApprovalStatus::Expired);
            }
        }
        Ok(expired.len())
    }

    /// Spawn the periodic expiry sweeper.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let gate = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(gate.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = gate.sweep().await {
                            warn!(error = %e, "approval sweep failed");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }
}
