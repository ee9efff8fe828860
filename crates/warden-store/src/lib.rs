// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent and in-memory state for the Warden gateway.
//!
//! SQLite-backed stores (memories, approvals, soul versions) share one
//! [`Database`] whose tokio-rusqlite connection serializes all access on a
//! single background thread. The session table is purely in-memory.

pub mod approvals;
pub mod memories;
mod schema;
pub mod sessions;
pub mod soul_versions;

use tokio_rusqlite::Connection;
use tracing::info;
use warden_core::WardenError;

pub use approvals::{ApprovalStore, NewApproval};
pub use memories::MemoryStore;
pub use sessions::{SessionStore, SESSION_TTL, SWEEP_INTERVAL};
pub use soul_versions::{SoulVersion, SoulVersionStore};

/// The single writer for all SQLite-backed stores.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, applying schema and enabling
    /// WAL mode.
    pub async fn open(path: &str) -> Result<Self, WardenError> {
        let conn = Connection::open(path)
            .await
            .map_err(schema::storage_err)?;
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            schema::apply(conn)?;
            Ok(())
        })
        .await
        .map_err(schema::storage_err)?;
        info!(path, "database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (tests).
    pub async fn open_in_memory() -> Result<Self, WardenError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(schema::storage_err)?;
        conn.call(|conn| {
            schema::apply(conn)?;
            Ok(())
        })
        .await
        .map_err(schema::storage_err)?;
        Ok(Self { conn })
    }

    pub fn memories(&self) -> MemoryStore {
        MemoryStore::new(self.conn.clone())
    }

    pub fn approvals(&self) -> ApprovalStore {
        ApprovalStore::new(self.conn.clone())
    }

    pub fn soul_versions(&self) -> SoulVersionStore {
        SoulVersionStore::new(self.conn.clone())
    }

    /// Close the connection, flushing pending writes.
    pub async fn close(self) -> Result<(), WardenError> {
        self.conn
            .close()
            .await
            .map_err(|e| WardenError::Storage {
                source: Box::new(e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_applies_schema() {
        let db = Database::open_in_memory().await.unwrap();
        // Each store works against the shared connection.
        let _ = db.memories().list("u1").await.unwrap();
        let _ = db.approvals().get_recent(1).await.unwrap();
        let _ = db.soul_versions().latest().await.unwrap();
    }

    #[tokio::test]
    async fn open_on_disk_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.db");
        let path_str = path.to_str().unwrap();

        {
            let db = Database::open(path_str).await.unwrap();
            db.memories()
                .save("u1", warden_core::types::MemoryCategory::Fact, "t", "c")
                .await
                .unwrap();
            db.close().await.unwrap();
        }

        let db = Database::open(path_str).await.unwrap();
        let all = db.memories().list("u1").await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
