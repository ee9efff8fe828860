// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only JSONL audit logging.
//!
//! Every gateway action is appended as one JSON object per line to a file
//! named `audit-YYYY-MM-DD.jsonl` under the audit directory, rolling at UTC
//! midnight. Writes are serialized through a single mutex so events for one
//! session are totally ordered and monotonic in timestamp.
//!
//! Audit failures never abort the calling operation: a failed append is
//! logged through tracing and dropped. The audit trail degrades, the
//! gateway does not.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::Mutex;
use tracing::{error, warn};
use warden_core::WardenError;

/// The kind of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    MessageReceived,
    LlmRequest,
    LlmResponse,
    MessageSent,
    ToolCall,
    ToolResult,
    ActionClassified,
    ApprovalRequested,
    ApprovalResolved,
    Error,
    SoulLoaded,
    SoulVerificationFailed,
    SkillLoaded,
    SkillVerificationFailed,
    McpProxy,
}

/// One audit record as it appears on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: AuditKind,
    pub session_id: String,
    pub data: serde_json::Value,
}

struct Inner {
    directory: PathBuf,
    /// (date-stamp, open handle) for the current day's file.
    current: Option<(String, std::fs::File)>,
    /// Last timestamp written, to keep per-logger ordering monotonic.
    last_ts: Option<DateTime<Utc>>,
}

/// Process-wide audit logger.
///
/// Cheaply cloneable; all clones append to the same serialized writer.
#[derive(Clone)]
pub struct AuditLogger {
    inner: Arc<Mutex<Inner>>,
}

impl AuditLogger {
    /// Create a logger appending under `directory`, creating it if needed.
    pub fn new(directory: impl AsRef<Path>) -> Result<Self, WardenError> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory).map_err(|e| {
            WardenError::Config(format!(
                "cannot create audit directory {}: {e}",
                directory.display()
            ))
        })?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                directory,
                current: None,
                last_ts: None,
            })),
        })
    }

    /// Append one event. Failures are swallowed after a tracing error --
    /// audit must never take the gateway down mid-turn.
    pub async fn log(&self, kind: AuditKind, session_id: &str, data: serde_json::Value) {
        if let Err(e) = self.try_log(kind, session_id, data).await {
            error!(error = %e, kind = %kind, "audit append failed");
        }
    }

    /// Append one event, surfacing failures. Used by startup checks.
    pub async fn try_log(
        &self,
        kind: AuditKind,
        session_id: &str,
        data: serde_json::Value,
    ) -> Result<(), WardenError> {
        let mut inner = self.inner.lock().await;

        // Monotonic per-logger timestamps even under clock slew.
        let mut now = Utc::now();
        if let Some(last) = inner.last_ts {
            if now < last {
                warn!("clock moved backwards; clamping audit timestamp");
                now = last;
            }
        }
        inner.last_ts = Some(now);

        let event = AuditEvent {
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            kind,
            session_id: session_id.to_string(),
            data,
        };

        let stamp = now.format("%Y-%m-%d").to_string();
        let needs_roll = match &inner.current {
            Some((open_stamp, _)) => *open_stamp != stamp,
            None => true,
        };
        if needs_roll {
            let path = inner.directory.join(format!("audit-{stamp}.jsonl"));
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| {
                    WardenError::Config(format!("cannot open audit file {}: {e}", path.display()))
                })?;
            inner.current = Some((stamp, file));
        }

        let line = serde_json::to_string(&event)
            .map_err(|e| WardenError::Internal(format!("audit event serialization: {e}")))?;

        let (_, file) = inner.current.as_mut().expect("rolled above");
        writeln!(file, "{line}").map_err(WardenError::storage)?;
        file.flush().map_err(WardenError::storage)?;
        Ok(())
    }

    /// Path of the file events are currently appended to (today's file).
    pub async fn current_path(&self) -> PathBuf {
        let inner = self.inner.lock().await;
        let stamp = Utc::now().format("%Y-%m-%d").to_string();
        inner.directory.join(format!("audit-{stamp}.jsonl"))
    }
}
