// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model and layered loader for the Warden agent gateway.
//!
//! Config parse failures and validation errors are fatal at startup; the
//! binary maps them to exit code 1.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::WardenConfig;
pub use validation::{validate_config, ValidationError};

/// Environment variable carrying the capability-signing secret.
pub const CAPABILITY_SECRET_ENV: &str = "WARDEN_CAPABILITY_SECRET";

/// Environment variable overriding the audit directory.
pub const AUDIT_DIR_ENV: &str = "WARDEN_AUDIT_DIR";

/// Environment variable carrying the LLM API key (opaque to the core).
pub const LLM_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
