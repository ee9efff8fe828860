// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed memory store with FTS5 ranked search.
//!
//! `(user_id, category, topic)` is unique; saving an existing triple upserts
//! the content. Search matches topic + content via BM25 and bumps each hit's
//! `access_count` exactly once per call.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;
use tracing::debug;
use warden_core::types::{Memory, MemoryCategory};
use warden_core::WardenError;

use crate::schema::storage_err;

/// Persistent store for user memories.
#[derive(Clone)]
pub struct MemoryStore {
    conn: Connection,
}

impl MemoryStore {
    /// Wrap an existing connection with the schema already applied.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Save a memory, upserting by `(user_id, category, topic)`.
    ///
    /// Returns the stored memory. Re-saving an identical triple replaces the
    /// content and resets nothing else; `created_at` and `access_count` of
    /// the original row survive.
    pub async fn save(
        &self,
        user_id: &str,
        category: MemoryCategory,
        topic: &str,
        content: &str,
    ) -> Result<Memory, WardenError> {
        let user_id = user_id.to_string();
        let category_str = category.to_string();
        let topic = topic.to_string();
        let content = content.to_string();
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let stored = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO memories
                         (id, user_id, category, topic, content, access_count, created_at, last_accessed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
                     ON CONFLICT (user_id, category, topic)
                     DO UPDATE SET content = excluded.content,
                                   last_accessed_at = excluded.last_accessed_at",
                    rusqlite::params![id, user_id, category_str, topic, content, now],
                )?;
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, category, topic, content, access_count, created_at, last_accessed_at
                     FROM memories WHERE user_id = ?1 AND category = ?2 AND topic = ?3",
                )?;
                let memory = stmt.query_row(
                    rusqlite::params![user_id, category_str, topic],
                    row_to_memory,
                )?;
                Ok(memory)
            })
            .await
            .map_err(storage_err)?;

        debug!(topic = %stored.topic, category = %stored.category, "memory saved");
        Ok(stored)
    }

    /// All memories of one category for a user, newest first.
    pub async fn get_by_category(
        &self,
        user_id: &str,
        category: MemoryCategory,
    ) -> Result<Vec<Memory>, WardenError> {
        let user_id = user_id.to_string();
        let category_str = category.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, category, topic, content, access_count, created_at, last_accessed_at
                     FROM memories WHERE user_id = ?1 AND category = ?2
                     ORDER BY created_at DESC",
                )?;
                let memories = stmt
                    .query_map(rusqlite::params![user_id, category_str], row_to_memory)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(memories)
            })
            .await
            .map_err(storage_err)
    }

    /// All memories for a user, newest first (bridge `memory-list` command).
    pub async fn list(&self, user_id: &str) -> Result<Vec<Memory>, WardenError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, category, topic, content, access_count, created_at, last_accessed_at
                     FROM memories WHERE user_id = ?1 ORDER BY created_at DESC",
                )?;
                let memories = stmt
                    .query_map(rusqlite::params![user_id], row_to_memory)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(memories)
            })
            .await
            .map_err(storage_err)
    }

    /// Ranked full-text search over topic + content.
    ///
    /// Each returned hit's `access_count` is incremented exactly once, and
    /// the returned rows reflect the incremented value.
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Memory>, WardenError> {
        let fts_query = build_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }
        let user_id = user_id.to_string();
        let now = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let ids: Vec<String> = {
                    let mut stmt = tx.prepare(
                        "SELECT m.id
                         FROM memories_fts
                         JOIN memories m ON m.rowid = memories_fts.rowid
                         WHERE memories_fts MATCH ?1 AND m.user_id = ?2
                         ORDER BY bm25(memories_fts)
                         LIMIT ?3",
                    )?;
                    let rows = stmt
                        .query_map(
                            rusqlite::params![fts_query, user_id, limit as i64],
                            |row| row.get(0),
                        )?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                };

                let mut memories = Vec::with_capacity(ids.len());
                for id in &ids {
                    tx.execute(
                        "UPDATE memories
                         SET access_count = access_count + 1, last_accessed_at = ?1
                         WHERE id = ?2",
                        rusqlite::params![now, id],
                    )?;
                    let mut stmt = tx.prepare(
                        "SELECT id, user_id, category, topic, content, access_count, created_at, last_accessed_at
                         FROM memories WHERE id = ?1",
                    )?;
                    memories.push(stmt.query_row(rusqlite::params![id], row_to_memory)?);
                }
                tx.commit()?;
                Ok(memories)
            })
            .await
            .map_err(storage_err)
    }

    /// Delete a memory by id. Returns whether a row was removed.
    pub async fn delete_by_id(&self, id: &str) -> Result<bool, WardenError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM memories WHERE id = ?1", rusqlite::params![id])?;
                Ok(n > 0)
            })
            .await
            .map_err(storage_err)
    }

    /// Delete a memory by id, but only when it belongs to `user_id`.
    ///
    /// The bridge `memory-delete` command goes through this: a client
    /// holding another user's memory id must not be able to remove it.
    pub async fn delete_by_id_for_user(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<bool, WardenError> {
        let user_id = user_id.to_string();
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM memories WHERE id = ?1 AND user_id = ?2",
                    rusqlite::params![id, user_id],
                )?;
                Ok(n > 0)
            })
            .await
            .map_err(storage_err)
    }

    /// Delete all of a user's memories with the given topic.
    pub async fn delete_by_topic(&self, user_id: &str, topic: &str) -> Result<usize, WardenError> {
        let user_id = user_id.to_string();
        let topic = topic.to_string();
        self.conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM memories WHERE user_id = ?1 AND topic = ?2",
                    rusqlite::params![user_id, topic],
                )?;
                Ok(n)
            })
            .await
            .map_err(storage_err)
    }
}

/// Quote each whitespace-separated term so punctuation in user text cannot
/// break FTS5 query syntax.
fn build_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn row_to_memory(row: &rusqlite::Row) -> Result<Memory, rusqlite::Error> {
    let category_str: String = row.get(2)?;
    let created_at: String = row.get(6)?;
    let last_accessed_at: String = row.get(7)?;
    Ok(Memory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category: MemoryCategory::from_str(&category_str)
            .unwrap_or(MemoryCategory::Fact),
        topic: row.get(3)?,
        content: row.get(4)?,
        access_count: row.get(5)?,
        created_at: parse_ts(&created_at),
        last_accessed_at: parse_ts(&last_accessed_at),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
