// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt assembly for the Warden gateway: hash-verified identity and
//! skills, memory-backed context, and the layered system prompt.

pub mod builder;
pub mod integrity;
pub mod skills;
pub mod soul;

pub use builder::PromptBuilder;
pub use integrity::{sha256_hex, PinnedFile};
pub use skills::{Skill, SkillCatalog};
pub use soul::{SoulLoader, DEFAULT_SOUL};
