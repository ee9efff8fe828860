// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatcher turns an approved tool call into one sandboxed container
//! invocation.
//!
//! Lifecycle per task: mint a capability token scoped to exactly this task,
//! base64-encode the task payload, create a hardened container carrying only
//! the token and payload in its environment, run it under the token's
//! wall-clock deadline, and parse the last JSON line of stdout as the
//! [`ExecutorResult`]. The container is removed on every exit path; the
//! spawned container's lifetime is the bracketed scope of `dispatch`.
//!
//! Dispatch failures never escape as errors: they surface as
//! `ExecutorResult { success: false, error }` and feed back to the model as
//! a tool result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, error, info};
use warden_capability::{CapabilityClaims, TokenSigner};
use warden_config::model::{ExecutorConfig, ExecutorsConfig, MountConfig};
use warden_core::traits::runtime::{ContainerRuntime, ContainerSpec, MountSpec};
use warden_core::types::{ExecutorKind, ExecutorResult, ExecutorTask, NetworkPolicy};

/// Environment variable carrying the capability token into the executor.
pub const TOKEN_ENV: &str = "WARDEN_CAPABILITY_TOKEN";

/// Environment variable carrying the base64-encoded task payload.
pub const TASK_ENV: &str = "WARDEN_TASK_B64";

/// Environment variable selecting structured vs legacy browse output.
pub const WEB_RESULT_FORMAT_ENV: &str = "WARDEN_WEB_RESULT_FORMAT";

/// Dispatches tasks to ephemeral sandboxed executors.
pub struct Dispatcher {
    runtime: Arc<dyn ContainerRuntime>,
    signer: Arc<TokenSigner>,
    executors: ExecutorsConfig,
    mounts: Vec<MountSpec>,
}

impl Dispatcher {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        signer: Arc<TokenSigner>,
        executors: ExecutorsConfig,
        mounts: &[MountConfig],
    ) -> Self {
        let mounts = mounts
            .iter()
            .map(|m| MountSpec {
                host_path: m.host_path.clone(),
                container_path: m.container_path.clone(),
                read_only: m.read_only,
            })
            .collect();
        Self {
            runtime,
            signer,
            executors,
            mounts,
        }
    }

    /// Config for one executor kind.
    pub fn executor_config(&self, kind: ExecutorKind) -> &ExecutorConfig {
        match kind {
            ExecutorKind::Shell => &self.executors.shell,
            ExecutorKind::File => &self.executors.file,
            ExecutorKind::Web => &self.executors.web,
        }
    }

    /// Default output cap applied to tool results by the orchestrator.
    pub fn default_max_output(&self) -> usize {
        self.executors.file.default_max_output
    }

    /// Run one task in a fresh sandboxed container.
    pub async fn dispatch(&self, kind: ExecutorKind, task: ExecutorTask) -> ExecutorResult {
        let started = Instant::now();
        let exec = self.executor_config(kind);

        let network = match &exec.allowed_domains {
            None => NetworkPolicy::None,
            Some(domains) => NetworkPolicy::Allowed {
                domains: domains.clone(),
            },
        };

        let claims = CapabilityClaims::for_task(
            kind,
            self.mounts.clone(),
            network.clone(),
            task.timeout_secs,
            task.max_output_bytes,
        );
        let token = match self.signer.mint(&claims) {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "capability mint failed");
                return ExecutorResult::failure(format!("capability mint failed: {e}"));
            }
        };

        let payload = match serde_json::to_vec(&task) {
            Ok(bytes) => BASE64.encode(bytes),
            Err(e) => {
                return ExecutorResult::failure(format!("task serialization failed: {e}"));
            }
        };

        let mut env = vec![(TOKEN_ENV.into(), token), (TASK_ENV.into(), payload)];
        if kind == ExecutorKind::Web {
            env.push((
                WEB_RESULT_FORMAT_ENV.into(),
                self.executors.web_result_format.clone(),
            ));
        }

        let spec = ContainerSpec {
            image: exec.image.clone(),
            command: Vec::new(),
            env,
            mounts: self.mounts.clone(),
            network,
            memory_limit: Some(exec.memory_limit.clone()),
            cpu_limit: Some(exec.cpu_limit.clone()),
        };

        let id = match self.runtime.create(&spec).await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, executor = %kind, "container create failed");
                return ExecutorResult::failure(e.to_string());
            }
        };
        debug!(container = %id, executor = %kind, tool = %task.tool, "executor dispatched");

        // From here on the container exists: remove it on every exit path.
        let deadline = Duration::from_secs(claims.timeout_seconds);
        let run = self.runtime.run_to_completion(&id, deadline).await;
        if let Err(e) = self.runtime.remove(&id).await {
            error!(container = %id, error = %e, "container remove failed");
        }

        let mut result = match run {
            Ok(output) if output.timed_out => ExecutorResult::failure("timeout"),
            Ok(output) => parse_executor_output(&output.stdout, &output.stderr, output.exit_code),
            Err(e) => ExecutorResult::failure(e.to_string()),
        };

        result.duration_ms = started.elapsed().as_millis() as u64;
        truncate_output(&mut result, task.max_output_bytes);

        info!(
            executor = %kind,
            tool = %task.tool,
            success = result.success,
            duration_ms = result.duration_ms,
            "dispatch complete"
        );
        result
    }
}

/// Parse the last JSON line of stdout as the executor's result; synthesize a
/// failure when no line parses.
fn parse_executor_output(stdout: &str, stderr: &str, exit_code: Option<i32>) -> ExecutorResult {
    let last_line = stdout.lines().rev().find(|l| !l.trim().is_empty());

    if let Some(line) = last_line {
        if let Ok(mut result) = serde_json::from_str::<ExecutorResult>(line) {
            if result.exit_code.is_none() {
                result.exit_code = exit_code;
            }
            return result;
        }
    }

    ExecutorResult {
        success: false,
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        duration_ms: 0,
        error: Some("executor produced no parseable result".to_string()),
    }
}

/// Truncate stdout+stderr to a combined byte budget, stdout first.
fn truncate_output(result: &mut ExecutorResult, max_bytes: usize) {
    truncate_string(&mut result.stdout, max_bytes);
    let remaining = max_bytes.saturating_sub(result.stdout.len());
    truncate_string(&mut result.stderr, remaining);
}

fn truncate_string(s: &mut String, max_bytes: usize) {
    if s.len() > max_bytes {
        let mut end = max_bytes;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
}
