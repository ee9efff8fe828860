// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Container CLI implementation of [`ContainerRuntime`].
//!
//! Every container is created with the full hardening set: all capabilities
//! dropped, no-new-privileges, a non-root UID, resource limits from the
//! spec, and `--network none` unless the spec carries an allow-list policy
//! (in which case the container joins the gateway's filtered egress bridge).

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};
use warden_core::traits::runtime::{ContainerId, ContainerRuntime, ContainerSpec, RunOutput};
use warden_core::types::NetworkPolicy;
use warden_core::WardenError;

/// Name of the egress-filtered bridge network containers with an
/// allow-list policy are attached to.
pub const EGRESS_BRIDGE: &str = "warden-egress";

/// Non-root UID executors run as.
const SANDBOX_UID: &str = "10001";

/// `docker`-CLI-backed container runtime.
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Use a different CLI binary (e.g. `podman`).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Whether the container runtime answers at all. Used by startup checks.
    pub async fn ping(&self) -> Result<(), WardenError> {
        let status = Command::new(&self.binary)
            .args(["version", "--format", "{{.Server.Version}}"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| WardenError::Dispatch(format!("container runtime unreachable: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(WardenError::Dispatch(
                "container runtime returned non-zero for version probe".to_string(),
            ))
        }
    }

    /// Build the `create` argument vector for a spec.
    pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "create".into(),
            "--cap-drop".into(),
            "ALL".into(),
            "--security-opt".into(),
            "no-new-privileges".into(),
            "--user".into(),
            SANDBOX_UID.into(),
            "--read-only".into(),
            "--tmpfs".into(),
            "/tmp:rw,noexec,nosuid,size=64m".into(),
        ];

        match &spec.network {
            NetworkPolicy::None => {
                args.push("--network".into());
                args.push("none".into());
            }
            NetworkPolicy::Allowed { .. } => {
                args.push("--network".into());
                args.push(EGRESS_BRIDGE.into());
            }
        }

        if let Some(mem) = &spec.memory_limit {
            args.push("--memory".into());
            args.push(mem.clone());
        }
        if let Some(cpu) = &spec.cpu_limit {
            args.push("--cpus".into());
            args.push(cpu.clone());
        }

        for mount in &spec.mounts {
            let suffix = if mount.read_only { ":ro" } else { ":rw" };
            args.push("--volume".into());
            args.push(format!(
                "{}:{}{suffix}",
                mount.host_path, mount.container_path
            ));
        }

        for (key, value) in &spec.env {
            args.push("--env".into());
            args.push(format!("{key}={value}"));
        }

        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, WardenError> {
        let args = Self::create_args(spec);
        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| WardenError::Dispatch(format!("container create failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WardenError::Dispatch(format!(
                "container create exited non-zero: {}",
                stderr.trim()
            )));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(WardenError::Dispatch(
                "container create printed no id".to_string(),
            ));
        }
        debug!(container = %id, image = %spec.image, "container created");
        Ok(ContainerId(id))
    }

    async fn run_to_completion(
        &self,
        id: &ContainerId,
        deadline: Duration,
    ) -> Result<RunOutput, WardenError> {
        let mut child = Command::new(&self.binary)
            .args(["start", "--attach", &id.0])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| WardenError::Dispatch(format!("container start failed: {e}")))?;

        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");

        let outcome = tokio::time::timeout(deadline, async {
            let mut stdout = String::new();
            let mut stderr = String::new();
            let _ = stdout_pipe.read_to_string(&mut stdout).await;
            let _ = stderr_pipe.read_to_string(&mut stderr).await;
            let status = child.wait().await;
            (status, stdout, stderr)
        })
        .await;

        match outcome {
            Ok((status, stdout, stderr)) => {
                let status = status
                    .map_err(|e| WardenError::Dispatch(format!("container wait failed: {e}")))?;
                Ok(RunOutput {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                    timed_out: false,
                })
            }
            Err(_elapsed) => {
                warn!(container = %id, "deadline exceeded, killing container");
                let _ = Command::new(&self.binary)
                    .args(["kill", &id.0])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await;
                let _ = child.kill().await;
                Ok(RunOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    timed_out: true,
                })
            }
        }
    }

    async fn remove(&self, id: &ContainerId) -> Result<(), WardenError> {
        let status = Command::new(&self.binary)
            .args(["rm", "--force", &id.0])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| WardenError::Dispatch(format!("container remove failed: {e}")))?;
        if !status.success() {
            // rm --force on an already-gone container is fine; anything else
            // is worth a warning but not an error (removal is best-effort
            // cleanup and must be idempotent).
            warn!(container = %id, "container remove exited non-zero");
        }
        Ok(())
    }
}
