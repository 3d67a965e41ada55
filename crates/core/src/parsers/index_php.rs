//! Dispatch table extraction from the API `index.php`

use std::sync::OnceLock;

use regex::Regex;

use super::types::{Extraction, IndexEntry};
use super::{code_mask, switch_cases};
use crate::catalog::{map_action_key, map_content_key_to_type, Action};

const SOURCE: &str = "index.php";

/// Extract every recognized content/action combination and the handler it loads.
///
/// Entries whose content key is unknown are kept with `content_type: None`
/// so callers can decide whether an unknown key matters.
pub fn parse_index_php(text: &str) -> Extraction<IndexEntry> {
    let mut out = Extraction::default();

    let Some(switch) = switch_cases(text, "content") else {
        out.warn(SOURCE, "no dispatch switch on the 'content' parameter found");
        return out;
    };

    if !switch.terminated {
        out.warn(SOURCE, "content switch is never closed; reading to end of file");
    }

    for case in &switch.cases {
        let content_type = case
            .labels
            .iter()
            .find_map(|label| map_content_key_to_type(label));
        let content_key = case.labels.first().cloned().unwrap_or_default();

        if content_type.is_none() {
            out.warn(
                SOURCE,
                format!("unknown content key '{}'", case.labels.join("', '")),
            );
        }

        let includes = included_paths(&case.body);
        if includes.is_empty() {
            out.warn(SOURCE, format!("case '{content_key}' includes no handler"));
            continue;
        }

        let tested = tested_actions(&case.body);

        for path in includes {
            let stem = path
                .rsplit('/')
                .next()
                .and_then(|name| name.strip_suffix(".php"))
                .unwrap_or(&path);

            let action = map_action_key(stem).or_else(|| match tested.as_slice() {
                [only] => Some(*only),
                _ => None,
            });

            out.records.push(IndexEntry {
                content_key: content_key.clone(),
                content_type,
                action,
                entry_point: path,
            });
        }
    }

    out
}

/// Paths named by `include`/`require` statements that are code, not comments.
fn included_paths(body: &str) -> Vec<String> {
    static INCLUDE_RE: OnceLock<Regex> = OnceLock::new();
    let include_re = INCLUDE_RE.get_or_init(|| {
        Regex::new(r#"\b(?:require|include)(?:_once)?\b[^;]*?['"]([^'";]*\.php)['"]"#).unwrap()
    });

    let mask = code_mask(body);
    let mut paths: Vec<String> = Vec::new();

    for caps in include_re.captures_iter(body) {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !mask[whole.start()] {
            continue;
        }
        let path = path.as_str().trim_start_matches('/').to_string();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    paths
}

/// Actions compared against `$post['action']` inside a case body.
fn tested_actions(body: &str) -> Vec<Action> {
    static ACTION_TEST_RE: OnceLock<Regex> = OnceLock::new();
    let action_test_re = ACTION_TEST_RE.get_or_init(|| {
        Regex::new(
            r#"\[\s*['"]action['"]\s*\]\s*={2,3}\s*['"](\w+)['"]|['"]action['"]\s*=>\s*['"](\w+)['"]"#,
        )
        .unwrap()
    });

    let mut actions: Vec<Action> = action_test_re
        .captures_iter(body)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| map_action_key(m.as_str()))
        .collect();
    actions.sort();
    actions.dedup();
    actions
}
