// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted container runtime for dispatcher tests.
//!
//! Each `script_*` call enqueues the behavior of one dispatch. Created and
//! removed containers are counted so tests can assert the
//! one-created-one-removed invariant.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use warden_core::traits::runtime::{ContainerId, ContainerRuntime, ContainerSpec, RunOutput};
use warden_core::WardenError;

enum RunScript {
    Stdout(String),
    Timeout,
    RunError(String),
    CreateError(String),
}

/// Scripted [`ContainerRuntime`] with create/remove accounting.
#[derive(Default)]
pub struct MockRuntime {
    scripts: Mutex<VecDeque<RunScript>>,
    created: AtomicUsize,
    removed: AtomicUsize,
    next_id: AtomicUsize,
    last_spec: Mutex<Option<ContainerSpec>>,
    pending: Mutex<VecDeque<RunScript>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a dispatch whose container prints `stdout` and exits 0.
    pub async fn script_stdout(&self, stdout: &str) {
        self.push(RunScript::Stdout(stdout.to_string()));
    }

    /// Script a dispatch whose container exceeds its deadline.
    pub async fn script_timeout(&self) {
        self.push(RunScript::Timeout);
    }

    /// Script a dispatch whose run fails with a runtime error.
    pub async fn script_run_error(&self, message: &str) {
        self.push(RunScript::RunError(message.to_string()));
    }

    /// Script a dispatch whose container cannot even be created.
    pub async fn script_create_error(&self, message: &str) {
        self.push(RunScript::CreateError(message.to_string()));
    }

    fn push(&self, script: RunScript) {
        self.scripts.lock().expect("mock lock poisoned").push_back(script);
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn removed_count(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }

    /// The spec of the most recently created container.
    pub fn last_spec(&self) -> Option<ContainerSpec> {
        self.last_spec.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, WardenError> {
        let script = self
            .scripts
            .lock()
            .expect("mock lock poisoned")
            .pop_front()
            .unwrap_or(RunScript::Stdout("{\"success\":true}\n".to_string()));

        if let RunScript::CreateError(message) = script {
            return Err(WardenError::Dispatch(message));
        }

        *self.last_spec.lock().expect("mock lock poisoned") = Some(spec.clone());
        self.pending
            .lock()
            .expect("mock lock poisoned")
            .push_back(script);
        self.created.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(ContainerId(format!("mock-{id}")))
    }

    async fn run_to_completion(
        &self,
        _id: &ContainerId,
        _deadline: Duration,
    ) -> Result<RunOutput, WardenError> {
        let script = self
            .pending
            .lock()
            .expect("mock lock poisoned")
            .pop_front()
            .unwrap_or(RunScript::Stdout("{\"success\":true}\n".to_string()));

        match script {
            RunScript::Stdout(stdout) => Ok(RunOutput {
                exit_code: Some(0),
                stdout,
                stderr: String::new(),
                timed_out: false,
            }),
            RunScript::Timeout => Ok(RunOutput {
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: true,
            }),
            RunScript::RunError(message) => Err(WardenError::Dispatch(message)),
            RunScript::CreateError(_) => unreachable!("consumed in create"),
        }
    }

    async fn remove(&self, _id: &ContainerId) -> Result<(), WardenError> {
        self.removed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Shared handle alias used across tests.
pub type SharedMockRuntime = Arc<MockRuntime>;
