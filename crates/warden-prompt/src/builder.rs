// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered system-prompt assembly.
//!
//! Sections, in order: identity (hash-verified soul), skills catalog, what
//! is known about the user (user + preference memories), relevant context
//! (ranked memory search on the last user message), the active task if any,
//! and the fixed behaviour rules.

use tracing::debug;
use warden_core::types::{MemoryCategory, TaskSession};
use warden_core::WardenError;
use warden_store::MemoryStore;

use crate::skills::SkillCatalog;
use crate::soul::SoulLoader;

/// How many ranked memories the relevant-context section carries.
const RELEVANT_MEMORY_LIMIT: usize = 5;

/// Fixed closing rules. These are always present regardless of soul content.
const BEHAVIOUR_RULES: &str = "\
# Rules
- Use tools for anything you cannot know or do yourself; never invent tool output.
- If a tool result says an action was rejected or expired, accept that as final.
- Keep replies short and concrete. Say what you did, not what you might do.
- For multi-step work, state assumptions explicitly and continue stepwise.";

/// Assembles the system prompt for each orchestrator iteration.
pub struct PromptBuilder {
    soul: SoulLoader,
    skills: SkillCatalog,
    memories: MemoryStore,
}

impl PromptBuilder {
    pub fn new(soul: SoulLoader, skills: SkillCatalog, memories: MemoryStore) -> Self {
        Self {
            soul,
            skills,
            memories,
        }
    }

    /// Build the system prompt for one LLM round-trip.
    pub async fn build(
        &self,
        user_id: &str,
        last_user_message: &str,
        active_task: Option<&TaskSession>,
    ) -> Result<String, WardenError> {
        let mut sections: Vec<String> = Vec::with_capacity(6);

        // 1. Identity.
        sections.push(self.soul.identity().await);

        // 2. Skills catalog.
        let skills = self.skills.prompt_section().await;
        if !skills.is_empty() {
            sections.push(format!("# Skills\n{skills}"));
        }

        // 3. What you know about the user.
        let mut known = String::new();
        for category in [MemoryCategory::User, MemoryCategory::Preference] {
            for memory in self.memories.get_by_category(user_id, category).await? {
                known.push_str(&format!("- [{}] {}: {}\n", memory.category, memory.topic, memory.content));
            }
        }
        if !known.is_empty() {
            sections.push(format!("# What you know about the user\n{known}"));
        }

        // 4. Relevant context from ranked search.
        if !last_user_message.trim().is_empty() {
            let hits = self
                .memories
                .search(user_id, last_user_message, RELEVANT_MEMORY_LIMIT)
                .await?;
            if !hits.is_empty() {
                let mut relevant = String::new();
                for memory in &hits {
                    relevant.push_str(&format!("- {}: {}\n", memory.topic, memory.content));
                }
                sections.push(format!("# Relevant context\n{relevant}"));
            }
        }

        // 5. Active task.
        if let Some(task) = active_task {
            let mut section = format!(
                "# Active task\nGoal: {}\nIteration {}/{}\n",
                if task.plan.goal.is_empty() {
                    task.original_request.as_str()
                } else {
                    task.plan.goal.as_str()
                },
                task.iteration,
                task.max_iterations
            );
            for step in &task.plan.steps {
                section.push_str(&format!("- [{}] {}\n", step.status, step.description));
            }
            sections.push(section);
        }

        // 6. Behaviour rules.
        sections.push(BEHAVIOUR_RULES.to_string());

        let prompt = sections.join("\n\n");
        debug!(user_id, bytes = prompt.len(), "system prompt assembled");
        Ok(prompt)
    }
}
