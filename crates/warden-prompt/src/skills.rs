// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integrity-protected skills catalog.
//!
//! Skills are markdown files with a small `---` frontmatter block:
//!
//! ```text
//! ---
//! name: release-notes
//! description: Draft release notes from merged PRs
//! always_load: true
//! ---
//! <body injected into the prompt for always_load skills>
//! ```
//!
//! The scan rejects symlinks (a symlinked skill could escape the directory),
//! pins each file's SHA-256, and re-verifies on every read. Verification
//! failure disables the skill for that assembly.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};
use warden_audit::{AuditKind, AuditLogger};
use warden_config::model::SkillsConfig;
use warden_core::WardenError;

use crate::integrity::PinnedFile;

/// One scanned skill.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub always_load: bool,
    pub enabled: bool,
    pinned: PinnedFile,
}

/// The scanned, pinned skills catalog.
pub struct SkillCatalog {
    skills: Vec<Skill>,
    char_budget: usize,
    audit: AuditLogger,
}

impl SkillCatalog {
    /// Scan the configured directory. `None` directory means no skills.
    pub async fn scan(config: &SkillsConfig, audit: AuditLogger) -> Result<Self, WardenError> {
        let mut skills = Vec::new();

        if let Some(dir) = &config.directory {
            let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
                WardenError::Config(format!("cannot read skills directory {dir}: {e}"))
            })?;

            while let Some(entry) = entries.next_entry().await.map_err(WardenError::storage)? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }

                // symlink_metadata does not follow the link.
                let meta = tokio::fs::symlink_metadata(&path)
                    .await
                    .map_err(WardenError::storage)?;
                if meta.file_type().is_symlink() {
                    warn!(path = %path.display(), "skipping symlinked skill file");
                    audit
                        .log(
                            AuditKind::SkillVerificationFailed,
                            "system",
                            serde_json::json!({
                                "path": path.display().to_string(),
                                "error": "symlink rejected",
                            }),
                        )
                        .await;
                    continue;
                }

                match load_skill(&path, &config.overrides).await {
                    Ok(skill) => {
                        audit
                            .log(
                                AuditKind::SkillLoaded,
                                "system",
                                serde_json::json!({
                                    "name": skill.name,
                                    "sha256": skill.pinned.expected_sha256,
                                }),
                            )
                            .await;
                        skills.push(skill);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unparseable skill");
                    }
                }
            }
            skills.sort_by(|a, b| a.name.cmp(&b.name));
            info!(count = skills.len(), "skills catalog scanned");
        }

        Ok(Self {
            skills,
            char_budget: config.char_budget,
            audit,
        })
    }

    /// Enabled skills, for the catalog section.
    pub fn enabled(&self) -> impl Iterator<Item = &Skill> {
        self.skills.iter().filter(|s| s.enabled)
    }

    /// The prompt section: one catalog line per enabled skill plus inlined
    /// bodies of `always_load` skills, subject to the character budget.
    pub async fn prompt_section(&self) -> String {
        let mut section = String::new();
        for skill in self.enabled() {
            section.push_str(&format!("- {}: {}\n", skill.name, skill.description));
        }

        let mut budget = self.char_budget;
        for skill in self.enabled().filter(|s| s.always_load) {
            let content = match skill.pinned.read_verified().await {
                Ok(content) => content,
                Err(e) => {
                    warn!(skill = %skill.name, error = %e, "skill verification failed, skipping");
                    self.audit
                        .log(
                            AuditKind::SkillVerificationFailed,
                            "system",
                            serde_json::json!({
                                "name": skill.name,
                                "error": e.to_string(),
                            }),
                        )
                        .await;
                    continue;
                }
            };
            let body = frontmatter_body(&content);
            if body.len() > budget {
                debug!(skill = %skill.name, "char budget exhausted, truncating skill body");
                let mut end = budget;
                while end > 0 && !body.is_char_boundary(end) {
                    end -= 1;
                }
                section.push_str(&format!("\n## Skill: {}\n{}\n", skill.name, &body[..end]));
                break;
            }
            budget -= body.len();
            section.push_str(&format!("\n## Skill: {}\n{body}\n", skill.name));
        }
        section
    }
}

async fn load_skill(
    path: &Path,
    overrides: &BTreeMap<String, bool>,
) -> Result<Skill, WardenError> {
    let path_str = path.to_str().ok_or_else(|| {
        WardenError::Config(format!("non-UTF-8 skill path: {}", path.display()))
    })?;
    let (pinned, content) = PinnedFile::pin(path_str).await?;
    let meta = parse_frontmatter(&content).ok_or_else(|| WardenError::Integrity {
        resource: path_str.to_string(),
        message: "missing or malformed frontmatter".to_string(),
    })?;

    let name = meta
        .get("name")
        .cloned()
        .or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(String::from)
        })
        .unwrap_or_default();
    let enabled = overrides.get(&name).copied().unwrap_or(true);

    Ok(Skill {
        description: meta.get("description").cloned().unwrap_or_default(),
        always_load: meta
            .get("always_load")
            .map(|v| v == "true")
            .unwrap_or(false),
        enabled,
        name,
        pinned,
    })
}

/// Parse the `---`-delimited `key: value` frontmatter block.
fn parse_frontmatter(content: &str) -> Option<BTreeMap<String, String>> {
    let rest = content.strip_prefix("---")?;
    let end = rest.find("\n---")?;
    let mut map = BTreeMap::new();
    for line in rest[..end].lines() {
        if let Some((key, value)) = line.split_once(':') {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Some(map)
}

/// Everything after the frontmatter block.
fn frontmatter_body(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("---") else {
        return content;
    };
    match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            after.strip_prefix('\n').unwrap_or(after)
        }
        None => content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn audit() -> (AuditLogger, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (AuditLogger::new(dir.path()).unwrap(), dir)
    }

    async fn write_skill(dir: &Path, file: &str, name: &str, always_load: bool, body: &str) {
        let content = format!(
            "---\nname: {name}\ndescription: does {name} things\nalways_load: {always_load}\n---\n{body}"
        );
        tokio::fs::write(dir.join(file), content).await.unwrap();
    }

    fn config(dir: &Path) -> SkillsConfig {
        SkillsConfig {
            directory: Some(dir.to_str().unwrap().to_string()),
            char_budget: 6_000,
            overrides: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn scan_and_catalog_section() {
        let (logger, _a) = audit().await;
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "notes.md", "notes", false, "Take notes.").await;
        write_skill(dir.path(), "deploy.md", "deploy", true, "Deploy steps here.").await;

        let catalog = SkillCatalog::scan(&config(dir.path()), logger).await.unwrap();
        assert_eq!(catalog.enabled().count(), 2);

        let section = catalog.prompt_section().await;
        assert!(section.contains("- deploy: does deploy things"));
        assert!(section.contains("- notes: does notes things"));
        // Only always_load bodies are inlined.
        assert!(section.contains("Deploy steps here."));
        assert!(!section.contains("Take notes."));
    }

    #[tokio::test]
    async fn overrides_disable_skills() {
        let (logger, _a) = audit().await;
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "notes.md", "notes", false, "x").await;

        let mut cfg = config(dir.path());
        cfg.overrides.insert("notes".to_string(), false);
        let catalog = SkillCatalog::scan(&cfg, logger).await.unwrap();
        assert_eq!(catalog.enabled().count(), 0);
        assert!(catalog.prompt_section().await.is_empty());
    }

    #[tokio::test]
    async fn char_budget_truncates_inlined_bodies() {
        let (logger, _a) = audit().await;
        let dir = tempfile::tempdir().unwrap();
        let long_body = "A".repeat(500);
        write_skill(dir.path(), "big.md", "big", true, &long_body).await;

        let mut cfg = config(dir.path());
        cfg.char_budget = 100;
        let catalog = SkillCatalog::scan(&cfg, logger).await.unwrap();
        let section = catalog.prompt_section().await;
        assert!(section.contains(&"A".repeat(100)));
        assert!(!section.contains(&"A".repeat(101)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_skills_are_rejected() {
        let (logger, _a) = audit().await;
        let outside = tempfile::tempdir().unwrap();
        write_skill(outside.path(), "evil.md", "evil", true, "exfiltrate").await;

        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "good.md", "good", false, "fine").await;
        std::os::unix::fs::symlink(
            outside.path().join("evil.md"),
            dir.path().join("evil.md"),
        )
        .unwrap();

        let catalog = SkillCatalog::scan(&config(dir.path()), logger).await.unwrap();
        let names: Vec<&str> = catalog.enabled().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["good"]);
    }

    #[tokio::test]
    async fn tampered_skill_is_skipped_at_assembly() {
        let (logger, _a) = audit().await;
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "s.md", "s", true, "original body").await;

        let catalog = SkillCatalog::scan(&config(dir.path()), logger).await.unwrap();
        write_skill(dir.path(), "s.md", "s", true, "tampered body").await;

        let section = catalog.prompt_section().await;
        // Catalog line survives; body is withheld.
        assert!(section.contains("- s: does s things"));
        assert!(!section.contains("tampered body"));
        assert!(!section.contains("original body"));
    }

    #[tokio::test]
    async fn no_directory_means_empty_catalog() {
        let (logger, _a) = audit().await;
        let catalog = SkillCatalog::scan(&SkillsConfig::default(), logger).await.unwrap();
        assert_eq!(catalog.enabled().count(), 0);
    }

    #[test]
    fn frontmatter_parsing() {
        let content = "---\nname: x\ndescription: y z\n---\nbody line\n";
        let meta = parse_frontmatter(content).unwrap();
        assert_eq!(meta.get("name").unwrap(), "x");
        assert_eq!(meta.get("description").unwrap(), "y z");
        assert_eq!(frontmatter_body(content), "body line\n");

        assert!(parse_frontmatter("no frontmatter").is_none());
    }
}
