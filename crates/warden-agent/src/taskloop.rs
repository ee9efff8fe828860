// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-iteration task driver with context reset.
//!
//! Complex tasks must not share an ever-growing context window: every
//! iteration starts from a fresh history of exactly one user message --
//! the original request plus the compressed plan state. The model signals
//! continuation with the `[CONTINUE]` sentinel and may update its plan in a
//! fenced ```plan JSON block; everything else ends the task.
//!
//! At most one active task per user. Cancellation is edge-triggered via a
//! `task-stop` and honoured between suspension points, never mid-dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_core::traits::bridge::{BridgeSink, GatewayEvent};
use warden_core::types::{ConversationTurn, TaskPlan, TaskSession, TaskStatus};
use warden_core::WardenError;

use crate::orchestrator::Orchestrator;

/// Sentinel the model emits to request another iteration.
pub const CONTINUE_SENTINEL: &str = "[CONTINUE]";

/// Result of driving one task to its end.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub text: String,
    pub session_id: String,
    pub iterations: u32,
    pub completed: bool,
}

struct ActiveTask {
    session: TaskSession,
    cancel: CancellationToken,
}

/// Owns task sessions and drives them through the orchestrator.
pub struct TaskRunner {
    orchestrator: Arc<Orchestrator>,
    bridge: Arc<dyn BridgeSink>,
    max_iterations: u32,
    tasks: Mutex<HashMap<String, ActiveTask>>,
}

impl TaskRunner {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        bridge: Arc<dyn BridgeSink>,
        max_iterations: u32,
    ) -> Self {
        Self {
            orchestrator,
            bridge,
            max_iterations,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// The user's active task session, if any.
    pub async fn active(&self, user_id: &str) -> Option<TaskSession> {
        self.tasks
            .lock()
            .await
            .get(user_id)
            .filter(|t| t.session.status == TaskStatus::Active)
            .map(|t| t.session.clone())
    }

    /// Deliver a cancellation signal to the user's active task.
    ///
    /// Returns whether a task was cancelled. The running loop observes the
    /// signal at its next suspension point.
    pub async fn stop(&self, user_id: &str) -> bool {
        let tasks = self.tasks.lock().await;
        match tasks.get(user_id) {
            Some(task) if task.session.status == TaskStatus::Active => {
                info!(user_id, task_id = %task.session.id, "task-stop delivered");
                task.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Drive a task to completion, cancellation, or the iteration cap.
    pub async fn execute(
        &self,
        user_id: &str,
        original_request: &str,
        chat_id: &str,
        audit_session_id: &str,
    ) -> Result<TaskOutcome, WardenError> {
        let cancel = CancellationToken::new();
        let session = {
            let mut tasks = self.tasks.lock().await;
            if tasks
                .get(user_id)
                .is_some_and(|t| t.session.status == TaskStatus::Active)
            {
                return Err(WardenError::Internal(format!(
                    "user {user_id} already has an active task"
                )));
            }
            let now = Utc::now();
            let session = TaskSession {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                original_request: original_request.to_string(),
                status: TaskStatus::Active,
                iteration: 0,
                max_iterations: self.max_iterations,
                plan: TaskPlan::default(),
                created_at: now,
                updated_at: now,
            };
            tasks.insert(
                user_id.to_string(),
                ActiveTask {
                    session: session.clone(),
                    cancel: cancel.clone(),
                },
            );
            session
        };

        info!(task_id = %session.id, user_id, "task session started");
        let mut last_text = String::new();

        for iteration in 1..=self.max_iterations {
            if cancel.is_cancelled() {
                return Ok(self
                    .finish(user_id, TaskStatus::Cancelled, last_text, iteration - 1)
                    .await);
            }

            let snapshot = self.update_iteration(user_id, iteration).await;

            // Fresh context: one user message carrying the request and the
            // compressed plan state. No prior turns.
            let history = vec![ConversationTurn::user(compose_iteration_prompt(
                original_request,
                &snapshot.plan,
            ))];

            let outcome = self
                .orchestrator
                .chat(
                    audit_session_id,
                    history,
                    chat_id,
                    user_id,
                    Some(&snapshot),
                    &cancel,
                )
                .await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(WardenError::Cancelled) => {
                    return Ok(self
                        .finish(user_id, TaskStatus::Cancelled, last_text, iteration)
                        .await);
                }
                Err(e) => {
                    warn!(error = %e, "task iteration failed");
                    self.record_log(user_id, &format!("iteration {iteration} failed: {e}"))
                        .await;
                    return Ok(self
                        .finish(user_id, TaskStatus::Failed, last_text, iteration)
                        .await);
                }
            };

            let (text, wants_continue, plan_update) = parse_iteration_text(&outcome.text);
            last_text = text.clone();

            if let Some(plan) = plan_update {
                self.update_plan(user_id, plan).await;
            }
            self.record_log(user_id, &format!("iteration {iteration}: {}", summary(&text)))
                .await;

            if let Err(e) = self
                .bridge
                .emit(GatewayEvent::TaskProgress {
                    chat_id: chat_id.to_string(),
                    text: format!("[{iteration}/{}] {}", self.max_iterations, summary(&text)),
                })
                .await
            {
                warn!(error = %e, "task progress emission failed");
            }

            if !wants_continue {
                return Ok(self
                    .finish(user_id, TaskStatus::Completed, last_text, iteration)
                    .await);
            }
        }

        self.record_log(user_id, "iteration-cap").await;
        Ok(self
            .finish(user_id, TaskStatus::Failed, last_text, self.max_iterations)
            .await)
    }

    async fn update_iteration(&self, user_id: &str, iteration: u32) -> TaskSession {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(user_id).expect("task registered in execute");
        task.session.iteration = iteration;
        task.session.updated_at = Utc::now();
        task.session.clone()
    }

    async fn update_plan(&self, user_id: &str, plan: TaskPlan) {
        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.get_mut(user_id) {
            // The log is runner-owned; carry it across model updates.
            let log = std::mem::take(&mut task.session.plan.log);
            task.session.plan = plan;
            task.session.plan.log = log;
            task.session.updated_at = Utc::now();
        }
    }

    async fn record_log(&self, user_id: &str, line: &str) {
        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.get_mut(user_id) {
            task.session.plan.log.push(line.to_string());
        }
    }

    async fn finish(
        &self,
        user_id: &str,
        status: TaskStatus,
        text: String,
        iterations: u32,
    ) -> TaskOutcome {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(user_id).expect("task registered in execute");
        if task.session.status.can_transition_to(status) {
            task.session.status = status;
        }
        task.session.updated_at = Utc::now();
        info!(
            task_id = %task.session.id,
            status = %task.session.status,
            iterations,
            "task session finished"
        );
        TaskOutcome {
            text,
            session_id: task.session.id.clone(),
            iterations,
            completed: task.session.status == TaskStatus::Completed,
        }
    }
}

/// Compose the single fresh user message for one iteration.
fn compose_iteration_prompt(original_request: &str, plan: &TaskPlan) -> String {
    let mut prompt = original_request.to_string();
    let state = compress_plan(plan);
    if !state.is_empty() {
        prompt.push_str("\n\nCurrent plan state:\n");
        prompt.push_str(&state);
    }
    prompt.push_str(
        "\n\nIf the task needs another iteration, end your reply with [CONTINUE]. \
         To update the plan, include a ```plan fenced JSON block.",
    );
    prompt
}

/// Render the plan compactly for the iteration prompt.
fn compress_plan(plan: &TaskPlan) -> String {
    let mut out = String::new();
    if !plan.goal.is_empty() {
        out.push_str(&format!("Goal: {}\n", plan.goal));
    }
    for step in &plan.steps {
        out.push_str(&format!("- [{}] {}", step.status, step.description));
        if let Some(result) = &step.result {
            out.push_str(&format!(" -> {result}"));
        }
        out.push('\n');
    }
    if !plan.assumptions.is_empty() {
        out.push_str(&format!("Assumptions: {}\n", plan.assumptions.join("; ")));
    }
    for line in plan.log.iter().rev().take(3).rev() {
        out.push_str(&format!("Log: {line}\n"));
    }
    out
}

/// Split an iteration's final text into (cleaned text, wants-continue,
/// plan update).
fn parse_iteration_text(text: &str) -> (String, bool, Option<TaskPlan>) {
    let wants_continue = text.contains(CONTINUE_SENTINEL);
    let mut cleaned = text.replace(CONTINUE_SENTINEL, "");

    let mut plan = None;
    if let Some(start) = cleaned.find("```plan") {
        let after = &cleaned[start + "```plan".len()..];
        if let Some(end) = after.find("```") {
            let body = &after[..end];
            match serde_json::from_str::<TaskPlan>(body.trim()) {
                Ok(parsed) => plan = Some(parsed),
                Err(e) => warn!(error = %e, "unparseable plan block ignored"),
            }
            let full_block_end = start + "```plan".len() + end + 3;
            cleaned.replace_range(start..full_block_end, "");
        }
    }

    (cleaned.trim().to_string(), wants_continue, plan)
}

/// First line, bounded, for progress frames and logs.
fn summary(text: &str) -> String {
    let first = text.lines().next().unwrap_or_default();
    let mut summary: String = first.chars().take(120).collect();
    if summary.len() < first.len() {
        summary.push_str("...");
    }
    if summary.is_empty() {
        summary.push_str("(working)");
    }
    summary
}
