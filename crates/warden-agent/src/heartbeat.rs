// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled synthetic user turns ("heartbeats").
//!
//! Each configured heartbeat carries a 5-field cron schedule. On each due
//! tick the prompt is injected through the orchestrator as a fresh user
//! turn and the result is delivered as a notification to the configured
//! channel. Heartbeats can be listed and toggled at runtime through the
//! bridge command surface.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_config::model::HeartbeatConfig;
use warden_core::traits::bridge::{BridgeSink, GatewayEvent};
use warden_core::types::ConversationTurn;
use warden_core::WardenError;

use crate::orchestrator::Orchestrator;

/// How often the runner checks for due schedules.
const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// User id heartbeat turns run under.
const HEARTBEAT_USER: &str = "heartbeat";

struct Entry {
    config: HeartbeatConfig,
    schedule: cron::Schedule,
    enabled: bool,
    next_run: DateTime<Utc>,
}

/// Snapshot of one heartbeat for the `heartbeat-list` command.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HeartbeatStatus {
    pub name: String,
    pub schedule: String,
    pub enabled: bool,
    pub next_run: Option<DateTime<Utc>>,
}

/// Owns the heartbeat schedules and fires due ones.
pub struct HeartbeatRunner {
    entries: Mutex<Vec<Entry>>,
    orchestrator: Arc<Orchestrator>,
    bridge: Arc<dyn BridgeSink>,
}

impl HeartbeatRunner {
    /// Parse the configured heartbeats. Unparseable schedules are skipped
    /// with a warning (config validation already rejects wrong field counts).
    pub fn new(
        configs: &[HeartbeatConfig],
        orchestrator: Arc<Orchestrator>,
        bridge: Arc<dyn BridgeSink>,
    ) -> Self {
        let now = Utc::now();
        let entries = configs
            .iter()
            .filter_map(|config| match parse_schedule(&config.schedule) {
                Ok(schedule) => {
                    let next_run = schedule.after(&now).next().unwrap_or(now);
                    Some(Entry {
                        config: config.clone(),
                        enabled: config.enabled,
                        schedule,
                        next_run,
                    })
                }
                Err(e) => {
                    warn!(heartbeat = %config.name, error = %e, "skipping unparseable schedule");
                    None
                }
            })
            .collect();

        Self {
            entries: Mutex::new(entries),
            orchestrator,
            bridge,
        }
    }

    /// Snapshot for the `heartbeat-list` command.
    pub async fn list(&self) -> Vec<HeartbeatStatus> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| HeartbeatStatus {
                name: e.config.name.clone(),
                schedule: e.config.schedule.clone(),
                enabled: e.enabled,
                next_run: e.enabled.then_some(e.next_run),
            })
            .collect()
    }

    /// Flip a heartbeat's enabled flag, returning the new state.
    pub async fn toggle(&self, name: &str) -> Option<bool> {
        let mut entries = self.entries.lock().await;
        let entry = entries.iter_mut().find(|e| e.config.name == name)?;
        entry.enabled = !entry.enabled;
        if entry.enabled {
            // Re-anchor so a long-disabled heartbeat does not fire instantly.
            entry.next_run = entry.schedule.after(&Utc::now()).next()?;
        }
        info!(heartbeat = name, enabled = entry.enabled, "heartbeat toggled");
        Some(entry.enabled)
    }

    /// Names of heartbeats due at `now`, advancing their next-run marks.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<HeartbeatConfig> {
        let mut due = Vec::new();
        let mut entries = self.entries.lock().await;
        for entry in entries.iter_mut() {
            if entry.enabled && entry.next_run <= now {
                due.push(entry.config.clone());
                entry.next_run = entry
                    .schedule
                    .after(&now)
                    .next()
                    .unwrap_or(now + chrono::Duration::hours(1));
            }
        }
        due
    }

    /// Fire every due heartbeat once.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<(), WardenError> {
        for config in self.take_due(now).await {
            let chat_id = config.channel.clone().unwrap_or_default();
            let session_id = format!("heartbeat:{}", config.name);
            let history = vec![ConversationTurn::user(config.prompt.clone())];

            info!(heartbeat = %config.name, "heartbeat firing");
            match self
                .orchestrator
                .chat(
                    &session_id,
                    history,
                    &chat_id,
                    HEARTBEAT_USER,
                    None,
                    &CancellationToken::new(),
                )
                .await
            {
                Ok(outcome) => {
                    if let Err(e) = self
                        .bridge
                        .emit(GatewayEvent::Notification {
                            chat_id,
                            text: outcome.text,
                        })
                        .await
                    {
                        warn!(heartbeat = %config.name, error = %e, "heartbeat delivery failed");
                    }
                }
                Err(e) => {
                    warn!(heartbeat = %config.name, error = %e, "heartbeat turn failed");
                }
            }
        }
        Ok(())
    }

    /// Spawn the periodic tick loop.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = runner.run_due(Utc::now()).await {
                            warn!(error = %e, "heartbeat tick failed");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }
}

/// The `cron` crate wants 7 fields; standard 5-field input gets seconds
/// pinned to zero and an open year.
fn parse_schedule(expr: &str) -> Result<cron::Schedule, WardenError> {
    let trimmed = expr.trim();
    let seven_field = match trimmed.split_whitespace().count() {
        5 => format!("0 {trimmed} *"),
        6 => format!("{trimmed} *"),
        _ => trimmed.to_string(),
    };
    cron::Schedule::from_str(&seven_field)
        .map_err(|e| WardenError::Config(format!("invalid cron expression `{expr}`: {e}")))
}
