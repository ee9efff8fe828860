// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session approval grants.
//!
//! When a user resolves an approval as `session-approved`, subsequent
//! identical calls in the same session are downgraded from require-approval
//! to notify. "Identical" is defined per tool by [`canonical_input_key`]:
//! file tools key on `path`, shell on the full command, browsing on the URL
//! host, everything else on the compact JSON of the whole input.
//!
//! `propose_soul_update` is never grantable.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::Value;

use crate::classifier::PROPOSE_SOUL_UPDATE;

/// Compute the canonical key a session grant is stored and looked up under.
pub fn canonical_input_key(tool_name: &str, input: &Value) -> String {
    let field = |name: &str| {
        input
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match tool_name {
        "read_file" | "write_file" | "list_directory" | "search_files" => field("path"),
        "run_shell_command" => field("command"),
        "browse_web" => {
            let url = field("url");
            url_host(&url).unwrap_or(url)
        }
        _ => serde_json::to_string(input).unwrap_or_default(),
    }
}

/// Extract the host from a URL without pulling in a URL parser: the part
/// between `://` and the next `/`, `:` or `?`.
fn url_host(url: &str) -> Option<String> {
    let rest = url.split_once("://")?.1;
    let host: String = rest
        .chars()
        .take_while(|c| !matches!(c, '/' | ':' | '?' | '#'))
        .collect();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Thread-safe store of `(tool, canonical key)` grants per session.
#[derive(Default)]
pub struct SessionGrants {
    inner: Mutex<HashMap<String, HashSet<(String, String)>>>,
}

impl SessionGrants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session-approved grant. No-op for `propose_soul_update`.
    pub fn grant(&self, session_id: &str, tool_name: &str, input: &Value) {
        if tool_name == PROPOSE_SOUL_UPDATE {
            return;
        }
        let key = canonical_input_key(tool_name, input);
        self.inner
            .lock()
            .expect("grants lock poisoned")
            .entry(session_id.to_string())
            .or_default()
            .insert((tool_name.to_string(), key));
    }

    /// Whether this call is covered by an earlier session grant.
    pub fn is_granted(&self, session_id: &str, tool_name: &str, input: &Value) -> bool {
        if tool_name == PROPOSE_SOUL_UPDATE {
            return false;
        }
        let key = canonical_input_key(tool_name, input);
        self.inner
            .lock()
            .expect("grants lock poisoned")
            .get(session_id)
            .is_some_and(|set| set.contains(&(tool_name.to_string(), key)))
    }

    /// Drop all grants for a session (called when the session expires).
    pub fn clear_session(&self, session_id: &str) {
        self.inner
            .lock()
            .expect("grants lock poisoned")
            .remove(session_id);
    }
}
