// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Abstract container lifecycle interface.
//!
//! The dispatcher and the MCP manager never shell out directly; they drive
//! this trait. The production implementation wraps the container CLI, tests
//! use a scripted mock. The lifecycle is split into create / wait / remove so
//! callers can bracket execution and guarantee removal on every exit path.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WardenError;
use crate::types::NetworkPolicy;

/// A bind mount into a sandboxed container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountSpec {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

/// Full specification of a hardened container.
///
/// Every container started through this interface runs with all Linux
/// capabilities dropped, no-new-privileges, and a non-root UID; those are
/// not options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    /// Entrypoint override; empty means the image default.
    #[serde(default)]
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<MountSpec>,
    pub network: NetworkPolicy,
    /// e.g. "512m".
    #[serde(default)]
    pub memory_limit: Option<String>,
    /// e.g. "0.5".
    #[serde(default)]
    pub cpu_limit: Option<String>,
}

/// Opaque handle to a created container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Captured output of a finished (or killed) container.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// True when the wall-clock deadline fired and the container was killed.
    pub timed_out: bool,
}

/// Abstract lifecycle of sandboxed containers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create (but do not start) a container from the spec.
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, WardenError>;

    /// Start the container and wait for it to exit, killing it when the
    /// deadline fires. Returns captured stdout/stderr either way.
    async fn run_to_completion(
        &self,
        id: &ContainerId,
        deadline: Duration,
    ) -> Result<RunOutput, WardenError>;

    /// Force-remove the container. Must be idempotent; called on every
    /// dispatch exit path.
    async fn remove(&self, id: &ContainerId) -> Result<(), WardenError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_spec_serde() {
        let m = MountSpec {
            host_path: "/data/notes".into(),
            container_path: "/workspace/notes".into(),
            read_only: true,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["host_path"], "/data/notes");
        assert_eq!(json["read_only"], true);
    }

    #[test]
    fn container_id_display() {
        assert_eq!(ContainerId("abc123".into()).to_string(), "abc123");
    }
}
