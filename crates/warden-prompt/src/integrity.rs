// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SHA-256 integrity verification for prompt fragments.
//!
//! Each protected file's digest is pinned at load time and re-verified on
//! every read. A mismatch disables the resource; it never crashes the
//! gateway.

use ring::digest::{digest, SHA256};
use warden_core::WardenError;

/// Hex-encoded SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let d = digest(&SHA256, bytes);
    d.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

/// A file whose content hash was pinned when it was first loaded.
#[derive(Debug, Clone)]
pub struct PinnedFile {
    pub path: String,
    pub expected_sha256: String,
}

impl PinnedFile {
    /// Load the file and pin its current digest.
    pub async fn pin(path: &str) -> Result<(Self, String), WardenError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            WardenError::Integrity {
                resource: path.to_string(),
                message: format!("cannot read: {e}"),
            }
        })?;
        let pinned = Self {
            path: path.to_string(),
            expected_sha256: sha256_hex(content.as_bytes()),
        };
        Ok((pinned, content))
    }

    /// Re-read the file, verifying its digest against the pin.
    pub async fn read_verified(&self) -> Result<String, WardenError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            WardenError::Integrity {
                resource: self.path.clone(),
                message: format!("cannot read: {e}"),
            }
        })?;
        let actual = sha256_hex(content.as_bytes());
        if actual != self.expected_sha256 {
            return Err(WardenError::Integrity {
                resource: self.path.clone(),
                message: format!(
                    "hash mismatch: expected {}, got {actual}",
                    self.expected_sha256
                ),
            });
        }
        Ok(content)
    }
}
