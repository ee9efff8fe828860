// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent approval store.
//!
//! Approvals are terminal once non-pending: `resolve` only transitions
//! `pending` rows, and later resolutions are no-ops that return the row as
//! it already is. `expired` is only reachable from `pending` via the stale
//! sweep.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use tokio_rusqlite::Connection;
use tracing::debug;
use warden_core::types::{Approval, ApprovalStatus};
use warden_core::WardenError;

use crate::schema::storage_err;

/// Input for creating a pending approval.
#[derive(Debug, Clone)]
pub struct NewApproval {
    pub session_id: String,
    pub tool_name: String,
    /// Serialized JSON of the tool input.
    pub tool_input: String,
    /// Serialized capability claims, if already minted.
    pub capability: Option<String>,
    pub reason: String,
    pub plan_context: Option<String>,
}

/// Persistent store for human-in-the-loop approvals.
#[derive(Clone)]
pub struct ApprovalStore {
    conn: Connection,
}

impl ApprovalStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Create a pending approval with a fresh id.
    pub async fn create(&self, input: NewApproval) -> Result<Approval, WardenError> {
        let approval = Approval {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: input.session_id,
            tool_name: input.tool_name,
            tool_input: input.tool_input,
            capability: input.capability,
            reason: input.reason,
            plan_context: input.plan_context,
            created_at: Utc::now(),
            resolved_at: None,
            status: ApprovalStatus::Pending,
        };

        let row = approval.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO approvals
                         (id, session_id, tool_name, tool_input, capability, reason,
                          plan_context, status, created_at, resolved_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)",
                    rusqlite::params![
                        row.id,
                        row.session_id,
                        row.tool_name,
                        row.tool_input,
                        row.capability,
                        row.reason,
                        row.plan_context,
                        row.status.to_string(),
                        row.created_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)?;

        debug!(approval_id = %approval.id, tool = %approval.tool_name, "approval created");
        Ok(approval)
    }

    /// Fetch an approval by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Approval>, WardenError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!("{SELECT_APPROVAL} WHERE id = ?1"))?;
                let mut rows = stmt
                    .query_map(rusqlite::params![id], row_to_approval)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows.pop())
            })
            .await
            .map_err(storage_err)
    }

    /// Resolve a pending approval to a terminal status.
    ///
    /// Returns the row after the attempt. If the approval was already
    /// terminal the stored status and `resolved_at` are unchanged.
    pub async fn resolve(
        &self,
        id: &str,
        status: ApprovalStatus,
    ) -> Result<Option<Approval>, WardenError> {
        if !status.is_terminal() {
            return Err(WardenError::Internal(
                "resolve requires a terminal status".to_string(),
            ));
        }

        let id_arg = id.to_string();
        let now = Utc::now().to_rfc3339();
        let status_str = status.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE approvals SET status = ?1, resolved_at = ?2
                     WHERE id = ?3 AND status = 'pending'",
                    rusqlite::params![status_str, now, id_arg],
                )?;
                let mut stmt = conn.prepare(&format!("{SELECT_APPROVAL} WHERE id = ?1"))?;
                let mut rows = stmt
                    .query_map(rusqlite::params![id_arg], row_to_approval)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows.pop())
            })
            .await
            .map_err(storage_err)
    }

    /// Transition every pending approval older than `max_age` to `expired`.
    ///
    /// Returns the newly expired rows so the gate can fire their rendezvous;
    /// the count the contract asks for is `returned.len()`.
    pub async fn expire_stale_pending(
        &self,
        max_age: Duration,
    ) -> Result<Vec<Approval>, WardenError> {
        let cutoff = (Utc::now() - max_age).to_rfc3339();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let ids: Vec<String> = {
                    let mut stmt = tx.prepare(
                        "SELECT id FROM approvals
                         WHERE status = 'pending' AND created_at < ?1",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![cutoff], |row| row.get(0))?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                };

                let mut expired = Vec::with_capacity(ids.len());
                for id in &ids {
                    tx.execute(
                        "UPDATE approvals SET status = 'expired', resolved_at = ?1
                         WHERE id = ?2 AND status = 'pending'",
                        rusqlite::params![now, id],
                    )?;
                    let mut stmt = tx.prepare(&format!("{SELECT_APPROVAL} WHERE id = ?1"))?;
                    expired.push(stmt.query_row(rusqlite::params![id], row_to_approval)?);
                }
                tx.commit()?;
                Ok(expired)
            })
            .await
            .map_err(storage_err)
    }

    /// Most recent approvals, newest first.
    pub async fn get_recent(&self, limit: usize) -> Result<Vec<Approval>, WardenError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_APPROVAL} ORDER BY created_at DESC LIMIT ?1"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![limit as i64], row_to_approval)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)
    }
}

const SELECT_APPROVAL: &str = "SELECT id, session_id, tool_name, tool_input, capability, reason,
        plan_context, status, created_at, resolved_at
 FROM approvals";

fn row_to_approval(row: &rusqlite::Row) -> Result<Approval, rusqlite::Error> {
    let status_str: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let resolved_at: Option<String> = row.get(9)?;
    Ok(Approval {
        id: row.get(0)?,
        session_id: row.get(1)?,
        tool_name: row.get(2)?,
        tool_input: row.get(3)?,
        capability: row.get(4)?,
        reason: row.get(5)?,
        plan_context: row.get(6)?,
        status: ApprovalStatus::from_str(&status_str).unwrap_or(ApprovalStatus::Pending),
        created_at: parse_ts(&created_at),
        resolved_at: resolved_at.as_deref().map(parse_ts),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
