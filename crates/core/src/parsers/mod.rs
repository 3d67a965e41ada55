//! Pure extractors over upstream REDCap source text
//!
//! Upstream files are PHP and HTML written for humans and a PHP interpreter,
//! not for us. Nothing here attempts a grammar: each parser tokenizes just
//! enough (string literals, comments, brace depth) to locate the constructs it
//! cares about and matches them with regular expressions. Anything it does not
//! recognize is skipped with a [`ParseWarning`] so one odd file, or one odd
//! block in a file, never costs the rest of the extraction.
//!
//! Every parser is a deterministic function of its input text.

pub mod action_file;
pub mod curl;
pub mod help_php;
pub mod index_php;
pub mod schemas;
pub mod types;

use std::sync::OnceLock;

use regex::Regex;

pub use action_file::{parse_action_file, parse_action_files};
pub use curl::{parse_curl_example, parse_curl_examples};
pub use help_php::parse_help_php;
pub use index_php::parse_index_php;
pub use schemas::{parse_class_schemas, parse_project_schemas, parse_user_rights_schemas};
pub use types::*;

/// Route every unit to the parsers that apply to it and gather the results.
///
/// - `index.php` outside a help directory: dispatch table
/// - anything under a `help` directory: help page (plus its curl examples)
/// - other PHP files that read request parameters: action handlers
/// - every PHP file: project, user-rights and class schemas
/// - non-PHP documentation (`.md`, `.txt`, `.sh`, ...): curl examples
pub fn extract_sources(units: &[SourceUnit]) -> SourceExtraction {
    let mut out = SourceExtraction::default();
    let records = &mut out.records;

    for unit in units {
        let is_php = unit.extension() == Some("php");
        let in_help = unit.path.split('/').any(|part| part.eq_ignore_ascii_case("help"));

        if in_help {
            let help = parse_help_php(&unit.text).with_source(&unit.path);
            records.help.extend(help.records);
            out.warnings.extend(help.warnings);

            let examples = parse_curl_examples(&unit.text).with_source(&unit.path);
            records.examples.extend(examples.records);
            out.warnings.extend(examples.warnings);
        } else if is_php && unit.file_name() == "index.php" {
            let index = parse_index_php(&unit.text).with_source(&unit.path);
            records.index.extend(index.records);
            out.warnings.extend(index.warnings);
        } else if is_php && action_file::looks_like_handler(&unit.text) {
            let actions = parse_action_file(unit);
            records.actions.extend(actions.records);
            out.warnings.extend(actions.warnings);
        } else if !is_php {
            let examples = parse_curl_examples(&unit.text).with_source(&unit.path);
            records.examples.extend(examples.records);
            out.warnings.extend(examples.warnings);
        }

        if is_php {
            for schemas in [
                parse_project_schemas(&unit.text),
                parse_user_rights_schemas(&unit.text),
                parse_class_schemas(&unit.text),
            ] {
                let schemas = schemas.with_source(&unit.path);
                records.schemas.extend(schemas.records);
                out.warnings.extend(schemas.warnings);
            }
        }
    }

    out
}

// ----------------------------------------------------------------------------
// Shared scanning helpers
// ----------------------------------------------------------------------------

/// Mark which bytes are code, as opposed to string literals or comments.
pub(crate) fn code_mask(text: &str) -> Vec<bool> {
    let bytes = text.as_bytes();
    let mut mask = vec![true; bytes.len()];
    let mut i = 0;

    while i < bytes.len() {
        let next = bytes.get(i + 1).copied();
        let end = match (bytes[i], next) {
            (quote @ (b'\'' | b'"'), _) => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j] != quote {
                    if bytes[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
                Some((j + 1).min(bytes.len()))
            }
            (b'/', Some(b'/')) | (b'#', _) => Some(
                text[i..]
                    .find('\n')
                    .map(|offset| i + offset)
                    .unwrap_or(bytes.len()),
            ),
            (b'/', Some(b'*')) => Some(
                text[i + 2..]
                    .find("*/")
                    .map(|offset| i + 2 + offset + 2)
                    .unwrap_or(bytes.len()),
            ),
            _ => None,
        };

        match end {
            Some(end) => {
                mask[i..end].fill(false);
                i = end;
            }
            None => i += 1,
        }
    }

    mask
}

/// Index of the delimiter closing the one at `open`, counting only code bytes.
pub(crate) fn matching_delimiter(text: &str, mask: &[bool], open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let (open_byte, close_byte) = match bytes.get(open)? {
        b'{' => (b'{', b'}'),
        b'(' => (b'(', b')'),
        b'[' => (b'[', b']'),
        _ => return None,
    };

    let mut depth = 0usize;
    for i in open..bytes.len() {
        if !mask[i] {
            continue;
        }
        if bytes[i] == open_byte {
            depth += 1;
        } else if bytes[i] == close_byte {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Brace depth in front of every byte of `text[start..end]`, relative to `start`.
pub(crate) fn relative_depths(text: &str, mask: &[bool], start: usize, end: usize) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut depths = Vec::with_capacity(end.saturating_sub(start));
    let mut depth = 0usize;

    for i in start..end {
        depths.push(depth);
        if mask[i] {
            match bytes[i] {
                b'{' => depth += 1,
                b'}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }
    depths
}

/// One `case` block of a `switch`: its labels (stacked labels share a body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CaseBlock {
    pub labels: Vec<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SwitchCases {
    pub cases: Vec<CaseBlock>,
    /// From `switch` through the closing brace (or end of text).
    pub span: std::ops::Range<usize>,
    /// False when the switch body never closes; cases run to end of text.
    pub terminated: bool,
}

/// Locate `switch ($var['<subject>']) { ... }` and split its top-level cases.
pub(crate) fn switch_cases(text: &str, subject: &str) -> Option<SwitchCases> {
    let switch_re = Regex::new(&format!(
        r#"switch\s*\(\s*\$\w+\s*\[\s*['"]{}['"]\s*\]\s*\)\s*\{{"#,
        regex::escape(subject)
    ))
    .ok()?;

    static LABEL_RE: OnceLock<Regex> = OnceLock::new();
    let label_re = LABEL_RE.get_or_init(|| {
        Regex::new(r#"\bcase\s+(?:'([^']*)'|"([^"]*)")\s*:|\bdefault\s*:"#).unwrap()
    });

    let mask = code_mask(text);
    let found = switch_re
        .find_iter(text)
        .find(|m| mask[m.start()])?;

    let open = found.end() - 1;
    let close = matching_delimiter(text, &mask, open);
    let body_start = open + 1;
    let body_end = close.unwrap_or(text.len());
    let depths = relative_depths(text, &mask, body_start, body_end);
    let body = &text[body_start..body_end];

    // (label or None for default, label start, label end), top level only
    let labels: Vec<(Option<String>, usize, usize)> = label_re
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let abs = body_start + whole.start();
            if !mask[abs] || depths[whole.start()] != 0 {
                return None;
            }
            let label = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string());
            Some((label, whole.start(), whole.end()))
        })
        .collect();

    let mut cases = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    for (i, (label, _, label_end)) in labels.iter().enumerate() {
        let block_end = labels.get(i + 1).map(|(_, s, _)| *s).unwrap_or(body.len());
        let block = &body[*label_end..block_end];

        match label {
            Some(label) => pending.push(label.clone()),
            // `default:` ends any pending stack without a body of its own.
            None => {
                pending.clear();
                continue;
            }
        }

        let span = body_start + label_end..body_start + block_end;
        if has_code(&text[span.clone()], &mask[span]) {
            cases.push(CaseBlock {
                labels: std::mem::take(&mut pending),
                body: block.to_string(),
            });
        }
    }

    if !pending.is_empty() {
        cases.push(CaseBlock {
            labels: pending,
            body: String::new(),
        });
    }

    Some(SwitchCases {
        cases,
        span: found.start()..close.map_or(text.len(), |c| c + 1),
        terminated: close.is_some(),
    })
}

fn has_code(segment: &str, mask: &[bool]) -> bool {
    segment
        .bytes()
        .zip(mask)
        .any(|(b, is_code)| *is_code && !b.is_ascii_whitespace())
}

/// Remove tags, decode entities and collapse whitespace.
pub(crate) fn strip_html(html: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());
    let without_tags = tag_re.replace_all(html, " ");
    let decoded = html_escape::decode_html_entities(&without_tags);
    collapse_whitespace(&decoded)
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the body of a PCRE literal such as `/^\d+$/i`, keeping the case flag.
pub(crate) fn pcre_body(literal: &str) -> Option<String> {
    let mut chars = literal.chars();
    let delimiter = chars.next()?;
    if delimiter.is_alphanumeric() || delimiter == '\\' {
        return None;
    }
    let closing = match delimiter {
        '(' => ')',
        '{' => '}',
        '[' => ']',
        other => other,
    };
    let rest = &literal[delimiter.len_utf8()..];
    let end = rest.rfind(closing)?;
    let body = &rest[..end];
    let flags = &rest[end + closing.len_utf8()..];

    if flags.contains('i') {
        Some(format!("(?i){body}"))
    } else {
        Some(body.to_string())
    }
}
