// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Soul version history.
//!
//! Every accepted `propose_soul_update` records the new identity text and
//! its SHA-256 so integrity failures can be diagnosed against the last
//! known-good version.

use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;
use warden_core::WardenError;

use crate::schema::storage_err;

/// One recorded identity revision.
#[derive(Debug, Clone)]
pub struct SoulVersion {
    pub id: String,
    pub sha256: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Persistent store of soul revisions.
#[derive(Clone)]
pub struct SoulVersionStore {
    conn: Connection,
}

impl SoulVersionStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Record a new revision.
    pub async fn record(&self, sha256: &str, content: &str) -> Result<SoulVersion, WardenError> {
        let version = SoulVersion {
            id: uuid::Uuid::new_v4().to_string(),
            sha256: sha256.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let row = version.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO soul_versions (id, sha256, content, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![row.id, row.sha256, row.content, row.created_at.to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)?;
        Ok(version)
    }

    /// The most recently recorded revision, if any.
    pub async fn latest(&self) -> Result<Option<SoulVersion>, WardenError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, sha256, content, created_at FROM soul_versions
                     ORDER BY created_at DESC LIMIT 1",
                )?;
                let mut rows = stmt
                    .query_map([], row_to_version)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows.pop())
            })
            .await
            .map_err(storage_err)
    }

    /// Revision history, newest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<SoulVersion>, WardenError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, sha256, content, created_at FROM soul_versions
                     ORDER BY created_at DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![limit as i64], row_to_version)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)
    }
}

fn row_to_version(row: &rusqlite::Row) -> Result<SoulVersion, rusqlite::Error> {
    let created_at: String = row.get(3)?;
    Ok(SoulVersion {
        id: row.get(0)?,
        sha256: row.get(1)?,
        content: row.get(2)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
