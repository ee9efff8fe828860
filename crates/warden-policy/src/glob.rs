// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Literal glob matching for classifier rule conditions.
//!
//! Semantics:
//! - `*` matches any run of characters within one `/`-separated segment
//! - `**` as a full segment matches any number of segments
//! - `?` matches exactly one character within a segment
//! - `!(pattern)` matches exactly when `pattern` does not
//! - Matching is case-sensitive
//! - Wildcards never match a segment starting with `.`, so `/sandbox/../x`
//!   does not match `/sandbox/**`
//! - No path canonicalisation of any kind is performed

/// Match `value` against `pattern`.
pub fn matches(value: &str, pattern: &str) -> bool {
    if let Some(inner) = pattern.strip_prefix("!(").and_then(|p| p.strip_suffix(')')) {
        return !matches(value, inner);
    }

    let value_segs: Vec<&str> = value.split('/').collect();
    let pattern_segs: Vec<&str> = pattern.split('/').collect();
    match_segments(&value_segs, &pattern_segs)
}

fn match_segments(value: &[&str], pattern: &[&str]) -> bool {
    let Some((p_head, p_rest)) = pattern.split_first() else {
        return value.is_empty();
    };

    if *p_head == "**" {
        // Zero segments...
        if match_segments(value, p_rest) {
            return true;
        }
        // ...or one more, as long as it is not a dot segment.
        match value.split_first() {
            Some((v_head, v_rest)) if !v_head.starts_with('.') => {
                match_segments(v_rest, pattern)
            }
            _ => false,
        }
    } else {
        match value.split_first() {
            Some((v_head, v_rest)) => {
                match_segment(v_head, p_head) && match_segments(v_rest, p_rest)
            }
            None => false,
        }
    }
}

/// Match a single `/`-free segment. An embedded `**` degrades to `*`.
fn match_segment(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();

    // Dot rule: a leading wildcard never matches a leading dot.
    if v.first() == Some(&'.') && matches!(p.first(), Some('*') | Some('?')) {
        return false;
    }

    match_chars(&v, &p)
}

fn match_chars(v: &[char], p: &[char]) -> bool {
    match p.first() {
        None => v.is_empty(),
        Some('*') => {
            // Collapse consecutive stars, then try every split point.
            let rest: &[char] = {
                let mut i = 0;
                while i < p.len() && p[i] == '*' {
                    i += 1;
                }
                &p[i..]
            };
            (0..=v.len()).any(|i| match_chars(&v[i..], rest))
        }
        Some('?') => !v.is_empty() && match_chars(&v[1..], &p[1..]),
        Some(c) => v.first() == Some(c) && match_chars(&v[1..], &p[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_match() {
        assert!(matches("/workspace", "/workspace"));
        assert!(!matches("/workspace", "/Workspace"));
        assert!(!matches("/workspace/x", "/workspace"));
    }

    #[test]
    fn star_stays_within_a_segment() {
        assert!(matches("/workspace/a.txt", "/workspace/*"));
        assert!(matches("/workspace/a.txt", "/workspace/*.txt"));
        assert!(!matches("/workspace/sub/a.txt", "/workspace/*"));
        assert!(!matches("a/b", "*"));
        assert!(matches("abc", "a*c"));
        assert!(matches("ac", "a*c"));
    }

    #[test]
    fn double_star_spans_segments() {
        assert!(matches("/workspace/a.txt", "/workspace/**"));
        assert!(matches("/workspace/sub/deep/a.txt", "/workspace/**"));
        assert!(matches("/workspace", "/workspace/**"));
        assert!(matches("/a/b/c/d.log", "/**/*.log"));
        assert!(!matches("/elsewhere/a.txt", "/workspace/**"));
    }

    #[test]
    fn no_canonicalisation_dot_segments_escape_wildcards() {
        // Wildcards never match dot segments; paths are taken literally.
        assert!(!matches("/sandbox/../x", "/sandbox/**"));
        assert!(!matches("/sandbox/./x", "/sandbox/**"));
        assert!(!matches("/sandbox/.hidden", "/sandbox/*"));
        // An explicit literal dot segment in the pattern still matches.
        assert!(matches("/sandbox/../x", "/sandbox/../x"));
        assert!(matches("/sandbox/../x", "/sandbox/../*"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(matches("ab", "a?"));
        assert!(!matches("a", "a?"));
        assert!(!matches("abc", "a?"));
        assert!(!matches("a/b", "a?b"));
    }

    #[test]
    fn negation_is_exact_complement() {
        let cases = [
            ("/workspace/a.txt", "/workspace/**"),
            ("/sandbox/../x", "/sandbox/**"),
            ("hello", "h*o"),
            ("hello", "nope"),
            ("", ""),
        ];
        for (value, pattern) in cases {
            let plain = matches(value, pattern);
            let negated = matches(value, &format!("!({pattern})"));
            assert_eq!(plain, !negated, "value={value} pattern={pattern}");
        }
    }

    #[test]
    fn case_sensitive() {
        assert!(matches("README.md", "README.*"));
        assert!(!matches("readme.md", "README.*"));
        assert!(!matches("/Workspace/a", "/workspace/*"));
    }

    #[test]
    fn empty_value_and_pattern() {
        assert!(matches("", ""));
        assert!(matches("", "*"));
        assert!(matches("", "**"));
        assert!(!matches("x", ""));
    }

    #[test]
    fn non_path_values_match_too() {
        // Conditions apply to arbitrary string-coerced fields, not just paths.
        assert!(matches("git status", "git *"));
        assert!(matches("git log --oneline", "git *"));
        assert!(!matches("rm -rf /", "git *"));
        assert!(matches("https://api.github.com", "https://*.github.com"));
    }
}
