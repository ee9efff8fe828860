// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hash-verified identity ("soul") loading.
//!
//! The soul file defines who the agent is. It is integrity-pinned at load
//! and re-verified on every prompt assembly; verification failure falls back
//! to the fixed default identity and records an audit event. Executor output
//! never reaches this file through the gateway.

use tracing::{info, warn};
use warden_audit::{AuditKind, AuditLogger};

use crate::integrity::PinnedFile;

/// Identity used when no soul file is configured or verification fails.
pub const DEFAULT_SOUL: &str = "You are Warden, a careful personal assistant. \
You act only through approved tools, you never overstate what you did, and \
you ask before anything irreversible.";

/// Loads and re-verifies the identity text.
pub struct SoulLoader {
    pinned: Option<PinnedFile>,
    audit: AuditLogger,
}

impl SoulLoader {
    /// Pin the configured soul file; `None` path means default identity.
    ///
    /// An unreadable file degrades to the default identity (with an audit
    /// event) rather than failing startup; integrity problems never crash
    /// the gateway.
    pub async fn new(path: Option<&str>, audit: AuditLogger) -> Self {
        let pinned = match path {
            None => None,
            Some(path) => match PinnedFile::pin(path).await {
                Ok((pinned, _)) => {
                    info!(path, sha256 = %pinned.expected_sha256, "soul pinned");
                    audit
                        .log(
                            AuditKind::SoulLoaded,
                            "system",
                            serde_json::json!({
                                "path": path,
                                "sha256": pinned.expected_sha256,
                            }),
                        )
                        .await;
                    Some(pinned)
                }
                Err(e) => {
                    warn!(path, error = %e, "soul file unreadable, using default identity");
                    audit
                        .log(
                            AuditKind::SoulVerificationFailed,
                            "system",
                            serde_json::json!({
                                "path": path,
                                "error": e.to_string(),
                            }),
                        )
                        .await;
                    None
                }
            },
        };
        Self { pinned, audit }
    }

    /// The identity text for this prompt assembly.
    ///
    /// Falls back to [`DEFAULT_SOUL`] on verification failure; the failure
    /// is audited and the degraded state logged, never escalated.
    pub async fn identity(&self) -> String {
        let Some(pinned) = &self.pinned else {
            return DEFAULT_SOUL.to_string();
        };

        match pinned.read_verified().await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %pinned.path, error = %e, "soul verification failed, using default identity");
                self.audit
                    .log(
                        AuditKind::SoulVerificationFailed,
                        "system",
                        serde_json::json!({
                            "path": pinned.path,
                            "error": e.to_string(),
                        }),
                    )
                    .await;
                DEFAULT_SOUL.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn audit() -> (AuditLogger, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (AuditLogger::new(dir.path()).unwrap(), dir)
    }

    #[tokio::test]
    async fn no_file_uses_default() {
        let (logger, _dir) = audit().await;
        let soul = SoulLoader::new(None, logger).await;
        assert_eq!(soul.identity().await, DEFAULT_SOUL);
    }

    #[tokio::test]
    async fn verified_file_is_used() {
        let (logger, _audit_dir) = audit().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soul.md");
        tokio::fs::write(&path, "I am Custom Warden.").await.unwrap();

        let soul = SoulLoader::new(Some(path.to_str().unwrap()), logger).await;
        assert_eq!(soul.identity().await, "I am Custom Warden.");
    }

    #[tokio::test]
    async fn tampered_file_falls_back_and_audits() {
        let (logger, audit_dir) = audit().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soul.md");
        tokio::fs::write(&path, "Original identity.").await.unwrap();

        let soul = SoulLoader::new(Some(path.to_str().unwrap()), logger.clone()).await;
        tokio::fs::write(&path, "Injected identity!").await.unwrap();

        assert_eq!(soul.identity().await, DEFAULT_SOUL);

        let content = tokio::fs::read_to_string(logger.current_path().await)
            .await
            .unwrap();
        assert!(content.contains("soul_verification_failed"));
        drop(audit_dir);
    }

    #[tokio::test]
    async fn missing_configured_file_degrades_to_default() {
        let (logger, _dir) = audit().await;
        let soul = SoulLoader::new(Some("/nope/soul.md"), logger).await;
        assert_eq!(soul.identity().await, DEFAULT_SOUL);
    }
}
