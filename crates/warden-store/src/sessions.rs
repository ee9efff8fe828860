// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory session table with turn cap and TTL sweeper.
//!
//! Sessions hold bounded conversation state per user: at most
//! [`MAX_SESSION_TURNS`] turns (oldest dropped), expired 60 minutes after the
//! last update. The sweeper runs every 5 minutes and fires the registered
//! `on_expired` callback for each dropped session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use warden_core::types::{ConversationTurn, Role, Session, TurnContent, MAX_SESSION_TURNS};

/// Idle lifetime of a session.
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// How often the sweeper scans for expired sessions.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

type ExpiryCallback = Arc<dyn Fn(&Session) + Send + Sync>;

/// Thread-safe in-memory session store, keyed by user id.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, Session>>>,
    on_expired: Arc<Mutex<Option<ExpiryCallback>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback fired with each expired session as it is removed.
    pub fn set_on_expired(&self, callback: impl Fn(&Session) + Send + Sync + 'static) {
        *self.on_expired.lock().expect("session lock poisoned") = Some(Arc::new(callback));
    }

    /// Get the user's session, creating an empty one if absent.
    pub fn get_or_create(&self, user_id: &str) -> Session {
        let mut map = self.inner.lock().expect("session lock poisoned");
        map.entry(user_id.to_string())
            .or_insert_with(|| {
                let now = Utc::now();
                debug!(user_id, "session created");
                Session {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: user_id.to_string(),
                    messages: Vec::new(),
                    created_at: now,
                    updated_at: now,
                }
            })
            .clone()
    }

    /// Get the user's session if one exists.
    pub fn get(&self, user_id: &str) -> Option<Session> {
        self.inner
            .lock()
            .expect("session lock poisoned")
            .get(user_id)
            .cloned()
    }

    /// Replace the session's message history, enforcing the turn cap.
    pub fn set_messages(&self, user_id: &str, messages: Vec<ConversationTurn>) {
        let mut map = self.inner.lock().expect("session lock poisoned");
        let session = map.entry(user_id.to_string()).or_insert_with(|| {
            let now = Utc::now();
            Session {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                messages: Vec::new(),
                created_at: now,
                updated_at: now,
            }
        });
        session.messages = messages;
        enforce_cap(&mut session.messages);
        session.updated_at = Utc::now();
    }

    /// Append one turn, enforcing the turn cap.
    pub fn append(&self, user_id: &str, role: Role, content: TurnContent) {
        let mut map = self.inner.lock().expect("session lock poisoned");
        let session = map.entry(user_id.to_string()).or_insert_with(|| {
            let now = Utc::now();
            Session {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                messages: Vec::new(),
                created_at: now,
                updated_at: now,
            }
        });
        session.messages.push(ConversationTurn { role, content });
        enforce_cap(&mut session.messages);
        session.updated_at = Utc::now();
    }

    /// Snapshot of all live sessions (bridge `session-list` command).
    pub fn list(&self) -> Vec<Session> {
        self.inner
            .lock()
            .expect("session lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Drop sessions idle longer than [`SESSION_TTL`] as of `now`, firing the
    /// expiry callback for each. Returns the expired user ids.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<Session> = {
            let mut map = self.inner.lock().expect("session lock poisoned");
            let cutoff = now
                - chrono::Duration::from_std(SESSION_TTL).expect("ttl fits chrono duration");
            let expired_users: Vec<String> = map
                .iter()
                .filter(|(_, s)| s.updated_at < cutoff)
                .map(|(user_id, _)| user_id.clone())
                .collect();
            expired_users
                .iter()
                .filter_map(|user_id| map.remove(user_id))
                .collect()
        };

        if !expired.is_empty() {
            info!(count = expired.len(), "expired idle sessions");
            let callback = self
                .on_expired
                .lock()
                .expect("session lock poisoned")
                .clone();
            if let Some(cb) = callback {
                for session in &expired {
                    cb(session);
                }
            }
        }
        expired.into_iter().map(|s| s.user_id).collect()
    }

    /// Spawn the periodic sweeper; stops when the token is cancelled.
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        store.sweep_expired(Utc::now());
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }
}

fn enforce_cap(messages: &mut Vec<ConversationTurn>) {
    if messages.len() > MAX_SESSION_TURNS {
        let excess = messages.len() - MAX_SESSION_TURNS;
        messages.drain(..excess);
    }
}
