// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HMAC-signed capability tokens.
//!
//! A capability token is a signed, time-bounded envelope of authority claims
//! carried from the gateway to an executor container. Wire format is three
//! base64url (unpadded) segments separated by `.`:
//!
//! ```text
//! base64url(header) . base64url(claims) . base64url(hmac-sha256(header.claims))
//! ```
//!
//! Verification is symmetric: the executor entrypoint holds the same secret
//! and rejects tasks whose token fails signature or expiry checks. Any
//! component minting derivative scopes verifies the parent token first.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ring::hmac;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use warden_core::traits::runtime::MountSpec;
use warden_core::types::{ExecutorKind, NetworkPolicy};
use warden_core::WardenError;

/// Fixed token header: algorithm and format version.
const HEADER: &str = r#"{"alg":"HS256","ver":1}"#;

/// Grace added to the task timeout when computing token lifetime.
const LIFETIME_GRACE_SECS: i64 = 30;

/// Hard cap on token lifetime regardless of task timeout.
const LIFETIME_HARD_CAP_SECS: i64 = 15 * 60;

/// Authority claims carried by a capability token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityClaims {
    pub executor_type: ExecutorKind,
    pub mounts: Vec<MountSpec>,
    pub network: NetworkPolicy,
    pub timeout_seconds: u64,
    pub max_output_bytes: usize,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CapabilityClaims {
    /// Build claims for a task, clamping the token lifetime to
    /// `min(timeout + 30s, hard cap)` from now.
    pub fn for_task(
        executor_type: ExecutorKind,
        mounts: Vec<MountSpec>,
        network: NetworkPolicy,
        timeout_seconds: u64,
        max_output_bytes: usize,
    ) -> Self {
        let issued_at = Utc::now();
        let lifetime = (timeout_seconds as i64 + LIFETIME_GRACE_SECS).min(LIFETIME_HARD_CAP_SECS);
        Self {
            executor_type,
            mounts,
            network,
            timeout_seconds,
            max_output_bytes,
            issued_at,
            expires_at: issued_at + Duration::seconds(lifetime),
        }
    }
}

/// Mints and verifies capability tokens with a process-wide symmetric secret.
pub struct TokenSigner {
    key: hmac::Key,
}

impl TokenSigner {
    /// Create a signer from the capability secret.
    ///
    /// The secret must be at least 32 bytes; shorter secrets are a
    /// configuration error.
    pub fn new(secret: &SecretString) -> Result<Self, WardenError> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.len() < 32 {
            return Err(WardenError::Config(
                "capability secret must be at least 32 bytes".to_string(),
            ));
        }
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, bytes),
        })
    }

    /// Mint a signed token for the given claims.
    pub fn mint(&self, claims: &CapabilityClaims) -> Result<String, WardenError> {
        let header_b64 = URL_SAFE_NO_PAD.encode(HEADER.as_bytes());
        let claims_json = serde_json::to_vec(claims)
            .map_err(|e| WardenError::Capability(format!("claims serialization: {e}")))?;
        let claims_b64 = URL_SAFE_NO_PAD.encode(&claims_json);

        let signing_input = format!("{header_b64}.{claims_b64}");
        let tag = hmac::sign(&self.key, signing_input.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(tag.as_ref());

        Ok(format!("{signing_input}.{sig_b64}"))
    }

    /// Verify a token's signature and expiry, returning its claims.
    ///
    /// Signature verification is constant-time via `ring::hmac::verify`.
    pub fn verify(&self, token: &str) -> Result<CapabilityClaims, WardenError> {
        let mut parts = token.split('.');
        let (header_b64, claims_b64, sig_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(c), Some(s), None) => (h, c, s),
                _ => {
                    return Err(WardenError::Capability(
                        "token must have exactly three segments".to_string(),
                    ))
                }
            };

        let header = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| WardenError::Capability("invalid header encoding".to_string()))?;
        if header != HEADER.as_bytes() {
            return Err(WardenError::Capability("unrecognized token header".to_string()));
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| WardenError::Capability("invalid signature encoding".to_string()))?;
        hmac::verify(&self.key, signing_input.as_bytes(), &sig)
            .map_err(|_| WardenError::Capability("signature verification failed".to_string()))?;

        let claims_json = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| WardenError::Capability("invalid claims encoding".to_string()))?;
        let claims: CapabilityClaims = serde_json::from_slice(&claims_json)
            .map_err(|e| WardenError::Capability(format!("claims deserialization: {e}")))?;

        if claims.expires_at <= Utc::now() {
            return Err(WardenError::Capability("token expired".to_string()));
        }

        Ok(claims)
    }
}
