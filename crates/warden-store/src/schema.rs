// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite schema for the Warden gateway stores.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread; the [`Database`](crate::Database) struct is the single writer.

use warden_core::WardenError;

/// Memories table + FTS5 index over topic and content, with sync triggers.
const MEMORIES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    category TEXT NOT NULL,
    topic TEXT NOT NULL,
    content TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL,
    UNIQUE (user_id, category, topic)
);

CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    topic,
    content,
    content='memories',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, topic, content)
        VALUES (new.rowid, new.topic, new.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, topic, content)
        VALUES('delete', old.rowid, old.topic, old.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, topic, content)
        VALUES('delete', old.rowid, old.topic, old.content);
    INSERT INTO memories_fts(rowid, topic, content)
        VALUES (new.rowid, new.topic, new.content);
END;

CREATE INDEX IF NOT EXISTS idx_memories_user_category
    ON memories(user_id, category);
";

/// Approvals table, ordered recent-first by created_at.
const APPROVALS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS approvals (
    id TEXT PRIMARY KEY NOT NULL,
    session_id TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    tool_input TEXT NOT NULL,
    capability TEXT,
    reason TEXT NOT NULL DEFAULT '',
    plan_context TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    resolved_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_approvals_status ON approvals(status);
CREATE INDEX IF NOT EXISTS idx_approvals_created ON approvals(created_at DESC);
";

/// Soul version history: one row per accepted identity revision.
const SOUL_VERSIONS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS soul_versions (
    id TEXT PRIMARY KEY NOT NULL,
    sha256 TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_soul_versions_created
    ON soul_versions(created_at DESC);
";

/// Apply the full schema to a connection. Idempotent.
pub(crate) fn apply(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(MEMORIES_SCHEMA)?;
    conn.execute_batch(APPROVALS_SCHEMA)?;
    conn.execute_batch(SOUL_VERSIONS_SCHEMA)?;
    Ok(())
}

/// Helper to convert tokio_rusqlite errors into WardenError::Storage.
pub(crate) fn storage_err(e: tokio_rusqlite::Error) -> WardenError {
    WardenError::Storage {
        source: Box::new(e),
    }
}
