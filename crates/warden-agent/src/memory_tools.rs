// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process handlers for the memory tools.
//!
//! `save_memory` and `search_memory` run inside the gateway against the
//! memory store; they never reach the HITL gate or an executor.

use std::str::FromStr;

use serde_json::Value;
use warden_core::types::MemoryCategory;
use warden_core::WardenError;
use warden_store::MemoryStore;

const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Execute `save_memory {category, topic, content}`.
pub async fn save_memory(
    memories: &MemoryStore,
    user_id: &str,
    input: &Value,
) -> Result<String, WardenError> {
    let category_str = required_str(input, "category")?;
    let topic = required_str(input, "topic")?;
    let content = required_str(input, "content")?;

    let category = MemoryCategory::from_str(category_str).map_err(|_| {
        WardenError::Internal(format!(
            "unknown memory category `{category_str}` (expected user, preference, project, fact, or environment)"
        ))
    })?;

    let memory = memories.save(user_id, category, topic, content).await?;
    Ok(format!(
        "Saved memory [{}] {}: {}",
        memory.category, memory.topic, memory.content
    ))
}

/// Execute `search_memory {query, limit?}`.
pub async fn search_memory(
    memories: &MemoryStore,
    user_id: &str,
    input: &Value,
) -> Result<String, WardenError> {
    let query = required_str(input, "query")?;
    let limit = input
        .get("limit")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_SEARCH_LIMIT);

    let hits = memories.search(user_id, query, limit).await?;
    if hits.is_empty() {
        return Ok("No matching memories.".to_string());
    }

    let mut out = String::new();
    for memory in &hits {
        out.push_str(&format!(
            "[{}] {}: {}\n",
            memory.category, memory.topic, memory.content
        ));
    }
    Ok(out.trim_end().to_string())
}

fn required_str<'a>(input: &'a Value, field: &str) -> Result<&'a str, WardenError> {
    input
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| WardenError::Internal(format!("missing required field `{field}`")))
}
