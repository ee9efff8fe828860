// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `warden doctor`: preflight checks with a human-readable report.
//!
//! Hard failures (config, secrets, audit dir) make the command exit
//! non-zero; degraded-but-survivable conditions (missing soul file,
//! unreachable container runtime) are reported as warnings. Each check is a
//! standalone function over explicit inputs so the logic is testable
//! without touching process environment.

use secrecy::SecretString;
use warden_audit::{AuditKind, AuditLogger};
use warden_capability::TokenSigner;
use warden_config::model::WardenConfig;
use warden_config::{validate_config, AUDIT_DIR_ENV, CAPABILITY_SECRET_ENV, LLM_API_KEY_ENV};
use warden_prompt::{SkillCatalog, SoulLoader};
use warden_sandbox::DockerCli;

/// Status of a preflight check.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CheckStatus {
    /// Check passed.
    Pass,
    /// Degraded but survivable.
    Warn,
    /// Hard failure; the gateway cannot run like this.
    Fail,
}

/// Result of a single preflight check.
#[derive(Debug, Clone)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    message: String,
}

impl CheckResult {
    fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            message: message.into(),
        }
    }

    fn warn(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warn,
            message: message.into(),
        }
    }

    fn fail(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            message: message.into(),
        }
    }
}

/// Run every check, print the report, and return overall health.
pub async fn run_doctor(config: &WardenConfig) -> bool {
    let audit_dir =
        std::env::var(AUDIT_DIR_ENV).unwrap_or_else(|_| config.audit.directory.clone());

    let mut results = vec![
        check_config(config),
        check_capability_secret(std::env::var(CAPABILITY_SECRET_ENV).ok()),
        check_api_key(std::env::var(LLM_API_KEY_ENV).ok()),
        check_audit_dir(&audit_dir).await,
        check_container_runtime(&DockerCli::new()).await,
    ];
    results.extend(check_prompt_inputs(config, &audit_dir).await);

    let healthy = is_healthy(&results);
    for result in &results {
        let tag = match result.status {
            CheckStatus::Pass => "  ok  ",
            CheckStatus::Warn => " warn ",
            CheckStatus::Fail => " FAIL ",
        };
        println!("{tag} {:<22} {}", result.name, result.message);
    }
    println!();
    if healthy {
        println!("warden doctor: all hard checks passed");
    } else {
        println!("warden doctor: hard failures found");
    }
    healthy
}

/// Healthy means no hard failure; warnings do not flip the exit code.
fn is_healthy(results: &[CheckResult]) -> bool {
    results.iter().all(|r| r.status != CheckStatus::Fail)
}

/// Semantic config validation.
fn check_config(config: &WardenConfig) -> CheckResult {
    match validate_config(config) {
        Ok(()) => CheckResult::pass("configuration", "validates"),
        Err(errors) => CheckResult::fail(
            "configuration",
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        ),
    }
}

/// The capability secret must be present and long enough for HMAC signing.
fn check_capability_secret(secret: Option<String>) -> CheckResult {
    match secret {
        None => CheckResult::fail(
            "capability secret",
            format!("{CAPABILITY_SECRET_ENV} is not set"),
        ),
        Some(secret) => match TokenSigner::new(&SecretString::from(secret)) {
            Ok(_) => CheckResult::pass("capability secret", format!("{CAPABILITY_SECRET_ENV} usable")),
            Err(e) => CheckResult::fail("capability secret", e.to_string()),
        },
    }
}

/// The LLM API key is opaque to the core; presence is all doctor can check.
fn check_api_key(key: Option<String>) -> CheckResult {
    match key {
        Some(_) => CheckResult::pass("llm api key", format!("{LLM_API_KEY_ENV} present")),
        None => CheckResult::fail("llm api key", format!("{LLM_API_KEY_ENV} is not set")),
    }
}

/// The audit directory must be creatable and appendable.
async fn check_audit_dir(audit_dir: &str) -> CheckResult {
    match AuditLogger::new(audit_dir) {
        Ok(audit) => {
            match audit
                .try_log(AuditKind::Error, "doctor", serde_json::json!({"check": true}))
                .await
            {
                Ok(()) => CheckResult::pass("audit directory", format!("{audit_dir} writable")),
                Err(e) => CheckResult::fail("audit directory", format!("append failed: {e}")),
            }
        }
        Err(e) => CheckResult::fail("audit directory", e.to_string()),
    }
}

/// Unreachable container runtime is a warning: the gateway cannot dispatch
/// without it, but doctor still completes the remaining checks and serve
/// performs its own fatal probe.
async fn check_container_runtime(runtime: &DockerCli) -> CheckResult {
    match runtime.ping().await {
        Ok(()) => CheckResult::pass("container runtime", "reachable"),
        Err(e) => CheckResult::warn("container runtime", e.to_string()),
    }
}

/// Soul and skills load (audits to the directory already checked above).
async fn check_prompt_inputs(config: &WardenConfig, audit_dir: &str) -> Vec<CheckResult> {
    let mut results = Vec::new();
    let Ok(audit) = AuditLogger::new(audit_dir) else {
        // The audit-dir check already failed; nothing more to report here.
        return results;
    };

    match &config.soul.file {
        Some(path) if !std::path::Path::new(path).exists() => {
            results.push(CheckResult::warn(
                "soul",
                format!("{path} missing, default identity will be used"),
            ));
        }
        _ => {
            let _ = SoulLoader::new(config.soul.file.as_deref(), audit.clone()).await;
            results.push(CheckResult::pass("soul", "loads"));
        }
    }

    match SkillCatalog::scan(&config.skills, audit).await {
        Ok(catalog) => results.push(CheckResult::pass(
            "skills",
            format!("{} skill(s) loaded", catalog.enabled().count()),
        )),
        Err(e) => results.push(CheckResult::warn("skills", e.to_string())),
    }
    results
}
