// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule-based action tier classification.
//!
//! Tiers are walked in order auto-approve -> notify -> require-approval; the
//! first tier containing a matching rule wins. Anything unmatched defaults to
//! require-approval (fail-safe).

use serde_json::Value;
use tracing::debug;
use warden_config::model::{ActionTiersConfig, RuleConfig};
use warden_core::types::ActionTier;

use crate::glob;

/// Tool name that is always require-approval and never eligible for
/// session-grant downgrades.
pub const PROPOSE_SOUL_UPDATE: &str = "propose_soul_update";

/// Classify a tool call into an action tier.
///
/// `trusted_domains` is the base allow-list for `browse_web`: when no rule
/// matches, browsing a trusted host classifies as notify instead of the
/// require-approval default.
pub fn classify(
    tool_name: &str,
    input: &Value,
    tiers: &ActionTiersConfig,
    trusted_domains: &[String],
) -> ActionTier {
    if let Some(tier) = classify_rules(tool_name, input, tiers) {
        return tier;
    }

    if tool_name == "browse_web" && browse_target_is_trusted(input, trusted_domains) {
        debug!(tool = tool_name, "trusted domain, classifying as notify");
        return ActionTier::Notify;
    }

    debug!(tool = tool_name, "no rule matched, defaulting to require-approval");
    ActionTier::RequireApproval
}

/// Walk the tier rules alone, returning `None` when nothing matched.
///
/// Callers that layer their own fallbacks (per-server MCP default tiers,
/// trusted browsing) build on this; plain [`classify`] applies the
/// fail-safe require-approval default.
pub fn classify_rules(
    tool_name: &str,
    input: &Value,
    tiers: &ActionTiersConfig,
) -> Option<ActionTier> {
    if tool_name == PROPOSE_SOUL_UPDATE {
        return Some(ActionTier::RequireApproval);
    }

    for (tier, rules) in tiers.tiers() {
        if rules.iter().any(|rule| rule_matches(rule, tool_name, input)) {
            debug!(tool = tool_name, tier = %tier, "action classified");
            return Some(tier);
        }
    }
    None
}

/// A browse target is trusted when its host is a trusted domain or a
/// subdomain of one.
pub fn browse_target_is_trusted(input: &Value, trusted_domains: &[String]) -> bool {
    let Some(url) = input.get("url").and_then(Value::as_str) else {
        return false;
    };
    let Some(host) = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .map(|rest| {
            rest.chars()
                .take_while(|c| !matches!(c, '/' | ':' | '?' | '#'))
                .collect::<String>()
        })
        .filter(|host| !host.is_empty())
    else {
        return false;
    };
    trusted_domains
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// A rule matches when its tool name equals the call's and every condition
/// field exists (non-null) on the input with a glob-matching string value.
fn rule_matches(rule: &RuleConfig, tool_name: &str, input: &Value) -> bool {
    if rule.tool != tool_name {
        return false;
    }

    rule.conditions.iter().all(|(field, pattern)| {
        match input.get(field) {
            None | Some(Value::Null) => false,
            Some(value) => glob::matches(&coerce_to_string(value), pattern),
        }
    })
}

/// String-coerce a JSON value the way condition matching sees it.
fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn rule(tool: &str, conditions: &[(&str, &str)]) -> RuleConfig {
        RuleConfig {
            tool: tool.to_string(),
            conditions: conditions
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn tiers(
        auto: Vec<RuleConfig>,
        notify: Vec<RuleConfig>,
        require: Vec<RuleConfig>,
    ) -> ActionTiersConfig {
        ActionTiersConfig {
            auto_approve: auto,
            notify,
            require_approval: require,
        }
    }

    #[test]
    fn unmatched_tool_requires_approval() {
        let t = tiers(vec![rule("list_directory", &[])], vec![], vec![]);
        assert_eq!(
            classify("run_shell_command", &json!({"command": "ls"}), &t, &[]),
            ActionTier::RequireApproval
        );
    }

    #[test]
    fn empty_config_requires_approval_for_everything() {
        let t = ActionTiersConfig::default();
        for tool in ["read_file", "write_file", "browse_web", "anything"] {
            assert_eq!(
                classify(tool, &json!({}), &t, &[]),
                ActionTier::RequireApproval
            );
        }
    }

    #[test]
    fn first_matching_tier_wins() {
        let t = tiers(
            vec![rule("read_file", &[("path", "/workspace/**")])],
            vec![rule("read_file", &[])],
            vec![],
        );
        // Condition satisfied: auto wins over the unconditional notify rule.
        assert_eq!(
            classify("read_file", &json!({"path": "/workspace/a.txt"}), &t, &[]),
            ActionTier::AutoApprove
        );
        // Condition unsatisfied: falls through to notify.
        assert_eq!(
            classify("read_file", &json!({"path": "/etc/passwd"}), &t, &[]),
            ActionTier::Notify
        );
    }

    #[test]
    fn missing_condition_field_is_no_match() {
        let t = tiers(vec![rule("read_file", &[("path", "/workspace/**")])], vec![], vec![]);
        assert_eq!(
            classify("read_file", &json!({}), &t, &[]),
            ActionTier::RequireApproval
        );
        assert_eq!(
            classify("read_file", &json!({"path": null}), &t, &[]),
            ActionTier::RequireApproval
        );
    }

    #[test]
    fn all_conditions_must_match() {
        let t = tiers(
            vec![rule(
                "write_file",
                &[("path", "/workspace/**"), ("content", "*")],
            )],
            vec![],
            vec![],
        );
        assert_eq!(
            classify(
                "write_file",
                &json!({"path": "/workspace/a", "content": "x"}),
                &t,
                &[]
            ),
            ActionTier::AutoApprove
        );
        assert_eq!(
            classify("write_file", &json!({"path": "/workspace/a"}), &t, &[]),
            ActionTier::RequireApproval
        );
    }

    #[test]
    fn path_traversal_does_not_satisfy_sandbox_rule() {
        let t = tiers(vec![rule("read_file", &[("path", "/sandbox/**")])], vec![], vec![]);
        assert_eq!(
            classify("read_file", &json!({"path": "/sandbox/notes.txt"}), &t, &[]),
            ActionTier::AutoApprove
        );
        assert_eq!(
            classify("read_file", &json!({"path": "/sandbox/../etc/passwd"}), &t, &[]),
            ActionTier::RequireApproval
        );
    }

    #[test]
    fn negated_condition() {
        let t = tiers(
            vec![rule("run_shell_command", &[("command", "!(rm *)")])],
            vec![],
            vec![],
        );
        assert_eq!(
            classify("run_shell_command", &json!({"command": "git status"}), &t, &[]),
            ActionTier::AutoApprove
        );
        assert_eq!(
            classify("run_shell_command", &json!({"command": "rm -rf /"}), &t, &[]),
            ActionTier::RequireApproval
        );
    }

    #[test]
    fn numeric_and_bool_fields_are_string_coerced() {
        let t = tiers(
            vec![rule("set_limit", &[("count", "4?"), ("force", "false")])],
            vec![],
            vec![],
        );
        assert_eq!(
            classify("set_limit", &json!({"count": 42, "force": false}), &t, &[]),
            ActionTier::AutoApprove
        );
        assert_eq!(
            classify("set_limit", &json!({"count": 7, "force": false}), &t, &[]),
            ActionTier::RequireApproval
        );
    }

    #[test]
    fn propose_soul_update_is_hardcoded() {
        // Even an explicit auto-approve rule cannot downgrade it.
        let t = tiers(vec![rule(PROPOSE_SOUL_UPDATE, &[])], vec![], vec![]);
        assert_eq!(
            classify(PROPOSE_SOUL_UPDATE, &json!({"text": "new soul"}), &t, &[]),
            ActionTier::RequireApproval
        );
    }

    #[test]
    fn notify_tier_reachable() {
        let t = tiers(
            vec![],
            vec![rule("browse_web", &[("url", "https://*.github.com*")])],
            vec![],
        );
        assert_eq!(
            classify("browse_web", &json!({"url": "https://api.github.com"}), &t, &[]),
            ActionTier::Notify
        );
    }

    #[test]
    fn trusted_domains_downgrade_unmatched_browsing() {
        let t = ActionTiersConfig::default();
        let trusted = vec!["docs.rs".to_string()];

        assert_eq!(
            classify("browse_web", &json!({"url": "https://docs.rs/tokio"}), &t, &trusted),
            ActionTier::Notify
        );
        // Subdomains of a trusted domain count.
        assert_eq!(
            classify("browse_web", &json!({"url": "https://static.docs.rs/x"}), &t, &trusted),
            ActionTier::Notify
        );
        // Suffix tricks do not.
        assert_eq!(
            classify("browse_web", &json!({"url": "https://notdocs.rs/"}), &t, &trusted),
            ActionTier::RequireApproval
        );
        // Only browse_web gets the base allow-list.
        assert_eq!(
            classify("run_shell_command", &json!({"command": "curl docs.rs"}), &t, &trusted),
            ActionTier::RequireApproval
        );
        // An explicit rule still wins over the base allow-list.
        let t = tiers(
            vec![],
            vec![],
            vec![rule("browse_web", &[("url", "https://docs.rs/**")])],
        );
        assert_eq!(
            classify("browse_web", &json!({"url": "https://docs.rs/tokio"}), &t, &trusted),
            ActionTier::RequireApproval
        );
    }
}
