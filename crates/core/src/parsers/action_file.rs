//! Action handler extraction
//!
//! A handler is the PHP file `index.php` includes for one content type. It
//! either serves a single action or branches on `$post['action']`; every
//! branch becomes its own [`ActionFileInfo`].

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::curl::parse_curl_examples;
use super::types::{
    ActionFileInfo, CurlExample, Extraction, ParamType, Parameter, ReturnShape, SourceUnit,
};
use super::{code_mask, pcre_body, switch_cases};
use crate::catalog::{is_action_available, map_action_key, map_content_key_to_type, Action, ContentType};

/// Request parameters every operation carries; the generator adds these itself.
const IMPLICIT_PARAMS: [&str; 3] = ["token", "content", "action"];

/// Lines after a presence check that may still hold its error exit.
const REQUIRED_LOOKAHEAD_LINES: usize = 2;

/// Cheap test for whether a PHP file reads request parameters at all.
pub(crate) fn looks_like_handler(text: &str) -> bool {
    ["$post[", "$_POST[", "$_REQUEST[", "$_FILES[", "@content"]
        .iter()
        .any(|needle| text.contains(needle))
}

/// Parse every unit, in input order.
pub fn parse_action_files(units: &[SourceUnit]) -> Extraction<ActionFileInfo> {
    let mut out = Extraction::default();
    for unit in units {
        out.absorb(parse_action_file(unit));
    }
    out
}

/// Extract one record per action the handler serves.
///
/// Well-formed segments are returned even when others are not; each skipped
/// segment leaves a warning attributed to `unit.path`.
pub fn parse_action_file(unit: &SourceUnit) -> Extraction<ActionFileInfo> {
    let mut out = Extraction::default();
    let source = unit.path.as_str();
    let text = unit.text.as_str();

    let Some(content_type) = resolve_content_type(unit) else {
        out.warn(source, "cannot resolve the content type this handler serves");
        return out;
    };

    let Extraction {
        records: examples,
        warnings,
    } = parse_curl_examples(text).with_source(source);
    out.warnings.extend(warnings);

    let docs = param_docs(text);

    let segments: Vec<(Action, String)> = match switch_cases(text, "action") {
        Some(switch) => {
            if !switch.terminated {
                out.warn(source, "action switch is never closed; reading to end of file");
            }
            let shared = format!(
                "{}\n{}",
                &text[..switch.span.start],
                &text[switch.span.end..]
            );

            let mut segments: Vec<(Action, String)> = Vec::new();
            for case in &switch.cases {
                for label in &case.labels {
                    match map_action_key(label) {
                        Some(action) if segments.iter().any(|(a, _)| *a == action) => {}
                        Some(action) => segments.push((action, format!("{shared}\n{}", case.body))),
                        None => out.warn(
                            source,
                            format!("unrecognized action label '{label}'; segment skipped"),
                        ),
                    }
                }
            }
            segments
        }
        None => vec![(default_action(unit), text.to_string())],
    };

    for (action, segment) in segments {
        if !is_action_available(content_type, action) {
            out.warn(
                source,
                format!("'{content_type}' has no '{}' action; segment skipped", action.key()),
            );
            continue;
        }

        let examples: Vec<CurlExample> = examples
            .iter()
            .filter(|ex| {
                ex.content_type.is_none_or(|c| c == content_type)
                    && ex.action.is_none_or(|a| a == action)
            })
            .cloned()
            .collect();

        out.records.push(ActionFileInfo {
            source: source.to_string(),
            content_type,
            action,
            parameters: segment_parameters(&segment, &docs),
            returns: return_shape(&segment),
            examples,
        });
    }

    out
}

fn docblock_tag(text: &str, tag: &str) -> Option<String> {
    let re = Regex::new(&format!(r"@{}\s+([\w-]+)", regex::escape(tag))).ok()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// `@content` tag, then the parent directory, then the file stem.
fn resolve_content_type(unit: &SourceUnit) -> Option<ContentType> {
    docblock_tag(&unit.text, "content")
        .and_then(|key| map_content_key_to_type(&key))
        .or_else(|| unit.parent_dir().and_then(map_content_key_to_type))
        .or_else(|| map_content_key_to_type(unit.file_stem()))
}

fn default_action(unit: &SourceUnit) -> Action {
    docblock_tag(&unit.text, "action")
        .and_then(|key| map_action_key(&key))
        .or_else(|| map_action_key(unit.file_stem()))
        .unwrap_or(Action::Export)
}

#[derive(Debug, Default)]
struct ParamDoc {
    param_type: Option<ParamType>,
    description: Option<String>,
}

/// `@param type $name description` lines anywhere in the file.
fn param_docs(text: &str) -> BTreeMap<String, ParamDoc> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"@param[ \t]+([\w\\\[\]|?]+)[ \t]+\$?(\w+)[ \t]*([^\n]*)").unwrap()
    });

    let mut docs = BTreeMap::new();
    for caps in re.captures_iter(text) {
        let (Some(kind), Some(name)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let description = caps
            .get(3)
            .map(|m| m.as_str().trim().trim_end_matches("*/").trim().to_string())
            .filter(|d| !d.is_empty());
        let param_type = kind.as_str().split('|').find_map(ParamType::from_name);

        docs.entry(name.as_str().to_string()).or_insert(ParamDoc {
            param_type,
            description,
        });
    }
    docs
}

fn param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\$(post|_POST|_REQUEST|_FILES)\s*\[\s*['"]([A-Za-z_]\w*)['"]\s*\]"#).unwrap()
    })
}

fn segment_parameters(segment: &str, docs: &BTreeMap<String, ParamDoc>) -> Vec<Parameter> {
    let mask = code_mask(segment);
    let patterns = validation_patterns(segment);
    let mut parameters: Vec<Parameter> = Vec::new();

    for caps in param_re().captures_iter(segment) {
        let (Some(whole), Some(superglobal), Some(name)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        if !mask[whole.start()] || IMPLICIT_PARAMS.contains(&name.as_str()) {
            continue;
        }

        let line_start = segment[..whole.start()].rfind('\n').map_or(0, |i| i + 1);
        let line_end = segment[whole.end()..]
            .find('\n')
            .map_or(segment.len(), |i| whole.end() + i);
        let before = &segment[line_start..whole.start()];
        let after = &segment[whole.end()..line_end];

        let inferred = if superglobal.as_str() == "_FILES" {
            ParamType::File
        } else {
            infer_type(before, after)
        };
        let required = is_negative_check(before, after)
            && has_error_exit(lookahead(segment, line_start, REQUIRED_LOOKAHEAD_LINES));

        match parameters.iter_mut().find(|p| p.name == name.as_str()) {
            Some(existing) => {
                existing.param_type = existing.param_type.max(inferred);
                existing.required |= required;
            }
            None => parameters.push(Parameter::new(name.as_str(), inferred, required)),
        }
    }

    for parameter in &mut parameters {
        if parameter.param_type == ParamType::String {
            parameter.param_type = type_from_name(&parameter.name);
        }
        if let Some(doc) = docs.get(&parameter.name) {
            if let Some(param_type) = doc.param_type {
                parameter.param_type = param_type;
            }
            if doc.description.is_some() {
                parameter.description.clone_from(&doc.description);
            }
        }
        if let Some(pattern) = patterns.get(&parameter.name) {
            parameter.pattern = Some(pattern.clone());
        }
    }

    parameters
}

/// The line starting at `line_start` plus up to `extra` following lines.
fn lookahead(text: &str, line_start: usize, extra: usize) -> &str {
    let rest = &text[line_start..];
    let end = rest
        .match_indices('\n')
        .nth(extra)
        .map_or(rest.len(), |(i, _)| i);
    &rest[..end]
}

fn infer_type(before: &str, after: &str) -> ParamType {
    static BEFORE: OnceLock<Vec<(Regex, ParamType)>> = OnceLock::new();
    static AFTER: OnceLock<Vec<(Regex, ParamType)>> = OnceLock::new();

    let before_rules = BEFORE.get_or_init(|| {
        vec![
            (
                Regex::new(r"(?:\b(?:is_array|foreach|count)\s*\(|\bexplode\s*\([^()]*,)\s*$").unwrap(),
                ParamType::Array,
            ),
            (
                Regex::new(r"(?:\(\s*int(?:eger)?\s*\)|\b(?:intval|is_numeric|ctype_digit|is_int)\s*\()\s*$")
                    .unwrap(),
                ParamType::Integer,
            ),
            (
                Regex::new(r"(?:\(\s*(?:float|double)\s*\)|\b(?:floatval|is_float)\s*\()\s*$").unwrap(),
                ParamType::Number,
            ),
            (
                Regex::new(r"(?:\(\s*bool(?:ean)?\s*\)|\bboolval\s*\()\s*$").unwrap(),
                ParamType::Boolean,
            ),
        ]
    });
    let after_rules = AFTER.get_or_init(|| {
        vec![
            (Regex::new(r"^\s*\[").unwrap(), ParamType::Array),
            (
                Regex::new(r#"^\s*[!=]==?\s*(?:'(?:true|false|1|0)'|"(?:true|false|1|0)"|true\b|false\b)"#)
                    .unwrap(),
                ParamType::Boolean,
            ),
            (
                Regex::new(r"^[^;]*\bFILTER_VALIDATE_BOOL(?:EAN)?\b").unwrap(),
                ParamType::Boolean,
            ),
            (
                Regex::new(r"^[^;]*\bFILTER_VALIDATE_INT\b").unwrap(),
                ParamType::Integer,
            ),
        ]
    });

    before_rules
        .iter()
        .filter(|(re, _)| re.is_match(before))
        .chain(after_rules.iter().filter(|(re, _)| re.is_match(after)))
        .map(|(_, param_type)| *param_type)
        .max()
        .unwrap_or(ParamType::String)
}

/// Range boundaries such as `dateRangeBegin` or `end_time` carry timestamps.
fn type_from_name(name: &str) -> ParamType {
    let lower = name.to_ascii_lowercase();
    if lower.contains("daterange")
        || lower.ends_with("_begin")
        || lower.ends_with("_end")
        || name.ends_with("Begin")
        || name.ends_with("End")
    {
        ParamType::Datetime
    } else {
        ParamType::String
    }
}

fn is_negative_check(before: &str, after: &str) -> bool {
    static BEFORE_RE: OnceLock<Regex> = OnceLock::new();
    static AFTER_RE: OnceLock<Regex> = OnceLock::new();
    let before_re = BEFORE_RE.get_or_init(|| {
        Regex::new(r"(?:!\s*isset|\bempty)\s*\(\s*(?:\w+\s*\(\s*)?$").unwrap()
    });
    let after_re = AFTER_RE.get_or_init(|| {
        Regex::new(r#"^\s*\)?\s*===?\s*(?:''|""|null\b)"#).unwrap()
    });

    before_re.is_match(before) || after_re.is_match(after)
}

fn has_error_exit(window: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\bsendResponse\s*\(\s*4\d\d\b|\bdie\s*\(|\bexit\b|\bthrow\b").unwrap()
    });
    re.is_match(window)
}

/// `preg_match('<pcre>', $post['name'])` validations, first one per parameter.
fn validation_patterns(segment: &str) -> BTreeMap<String, String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r#"\bpreg_match\s*\(\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")\s*,\s*(?:\w+\s*\(\s*)?\$(?:post|_POST|_REQUEST)\s*\[\s*['"](\w+)['"]"#,
        )
        .unwrap()
    });

    let mut patterns = BTreeMap::new();
    for caps in re.captures_iter(segment) {
        let (Some(literal), Some(name)) = (caps.get(1).or_else(|| caps.get(2)), caps.get(3)) else {
            continue;
        };
        let literal = literal.as_str().replace("\\\\", "\\").replace("\\'", "'");
        if let Some(pattern) = pcre_body(&literal) {
            patterns.entry(name.as_str().to_string()).or_insert(pattern);
        }
    }
    patterns
}

fn return_shape(segment: &str) -> ReturnShape {
    static BINARY_RE: OnceLock<Regex> = OnceLock::new();
    static COUNT_RE: OnceLock<Regex> = OnceLock::new();
    static FORMAT_RE: OnceLock<Regex> = OnceLock::new();

    let binary_re = BINARY_RE.get_or_init(|| {
        Regex::new(r"(?i)application/octet-stream|content-disposition|\breadfile\s*\(|\bfpassthru\s*\(")
            .unwrap()
    });
    let count_re = COUNT_RE.get_or_init(|| Regex::new(r"\bsendResponse\s*\([^;]*\bcount\b").unwrap());
    let format_re = FORMAT_RE.get_or_init(|| {
        Regex::new(r#"\[\s*['"](?:format|returnFormat)['"]\s*\]|\$format\b"#).unwrap()
    });

    if binary_re.is_match(segment) {
        ReturnShape::Binary
    } else if count_re.is_match(segment) {
        ReturnShape::Count
    } else if format_re.is_match(segment) {
        ReturnShape::Formatted
    } else {
        ReturnShape::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Single-action handlers
    // ========================================================================

    const RECORD_EXPORT: &str = r#"<?php
/**
 * Export records
 *
 * @param string $format csv, json or xml
 * @param array $fields Field names to export
 *
 * curl -X POST -d 'token=ABC&content=record&format=json' https://redcap.example.edu/api/
 */
$format = $post['format'];

if (!isset($post['type'])) {
    RestUtility::sendResponse(400, 'The parameter "type" is missing');
}
$records = explode(',', $post['records']);
$fields = $post['fields'];
$limit = intval($post['limit']);
$surveyFields = $post['exportSurveyFields'] == 'true';
$begin = $post['dateRangeBegin'];
// $post['commented_out']
if (!preg_match('/^[a-z0-9_]+$/i', $post['filterLogic'])) {
    $post['filterLogic'] = '';
}
$token = $post['token'];
"#;

    #[test]
    fn test_single_action_parameters() {
        let unit = SourceUnit::new("API/record/export.php", RECORD_EXPORT);
        let out = parse_action_file(&unit);
        assert!(out.is_clean(), "{:?}", out.warnings);
        assert_eq!(out.records.len(), 1);

        let info = &out.records[0];
        assert_eq!(info.content_type, ContentType::Record);
        assert_eq!(info.action, Action::Export);
        assert_eq!(info.returns, ReturnShape::Formatted);

        let names: Vec<_> = info.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "format",
                "type",
                "records",
                "fields",
                "limit",
                "exportSurveyFields",
                "dateRangeBegin",
                "filterLogic"
            ]
        );
    }

    #[test]
    fn test_types_required_and_docs() {
        let unit = SourceUnit::new("API/record/export.php", RECORD_EXPORT);
        let out = parse_action_file(&unit);
        let params = &out.records[0].parameters;
        let find = |name: &str| params.iter().find(|p| p.name == name).unwrap();

        assert!(find("type").required);
        assert!(!find("format").required);
        assert!(!find("filterLogic").required);

        assert_eq!(find("records").param_type, ParamType::Array);
        assert_eq!(find("fields").param_type, ParamType::Array);
        assert_eq!(find("limit").param_type, ParamType::Integer);
        assert_eq!(find("exportSurveyFields").param_type, ParamType::Boolean);
        assert_eq!(find("dateRangeBegin").param_type, ParamType::Datetime);
        assert_eq!(find("format").param_type, ParamType::String);

        assert_eq!(find("format").description.as_deref(), Some("csv, json or xml"));
        assert_eq!(find("filterLogic").pattern.as_deref(), Some("(?i)^[a-z0-9_]+$"));
    }

    #[test]
    fn test_embedded_example_attached() {
        let unit = SourceUnit::new("API/record/export.php", RECORD_EXPORT);
        let out = parse_action_file(&unit);
        let examples = &out.records[0].examples;
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].params.get("format").map(String::as_str), Some("json"));
    }

    #[test]
    fn test_content_from_tag_and_binary_return() {
        let text = r#"<?php
/** @content file @action export */
$field = $post['field'];
if (empty($post['record'])) die('record missing');
header('Content-Type: application/octet-stream');
readfile($path);
"#;
        let unit = SourceUnit::new("API/misc/download.php", text);
        let out = parse_action_file(&unit);
        assert_eq!(out.records.len(), 1);
        let info = &out.records[0];
        assert_eq!(info.content_type, ContentType::File);
        assert_eq!(info.action, Action::Export);
        assert_eq!(info.returns, ReturnShape::Binary);
        assert!(info.parameters.iter().any(|p| p.name == "record" && p.required));
    }

    #[test]
    fn test_files_superglobal_is_file_typed() {
        let text = "<?php\n$upload = $_FILES['file'];\nRestUtility::sendResponse(200, count($ids));\n";
        let unit = SourceUnit::new("API/file/import.php", text);
        let out = parse_action_file(&unit);
        let info = &out.records[0];
        assert_eq!(info.action, Action::Import);
        assert_eq!(info.returns, ReturnShape::Count);
        assert_eq!(info.parameters[0].param_type, ParamType::File);
    }

    // ========================================================================
    // Switch handlers and malformed input
    // ========================================================================

    const ARM_HANDLER: &str = r#"<?php
$format = $post['format'];
switch ($post['action']) {
    case 'import':
        $data = $post['data'];
        $override = (int)$post['override'];
        RestUtility::sendResponse(200, $count);
        break;
    case 'exp#rt':
        $x = $post['arms'
        break;
    case 'delete':
        foreach ($post['arms'] as $arm) { remove($arm); }
        RestUtility::sendResponse(200, count($post['arms']));
        break;
}
"#;

    #[test]
    fn test_switch_segments_and_garbled_label() {
        let unit = SourceUnit::new("API/arm/handler.php", ARM_HANDLER);
        let out = parse_action_file(&unit);

        let actions: Vec<_> = out.records.iter().map(|r| r.action).collect();
        assert_eq!(actions, vec![Action::Import, Action::Delete]);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].source, "API/arm/handler.php");
        assert!(out.warnings[0].message.contains("exp#rt"));
    }

    #[test]
    fn test_switch_segments_share_preamble() {
        let unit = SourceUnit::new("API/arm/handler.php", ARM_HANDLER);
        let out = parse_action_file(&unit);

        let import = &out.records[0];
        let names: Vec<_> = import.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["format", "data", "override"]);
        assert_eq!(import.parameters[2].param_type, ParamType::Integer);
        assert_eq!(import.returns, ReturnShape::Count);

        let delete = &out.records[1];
        let arms = delete.parameters.iter().find(|p| p.name == "arms").unwrap();
        assert_eq!(arms.param_type, ParamType::Array);
        assert!(!delete.parameters.iter().any(|p| p.name == "data"));
    }

    #[test]
    fn test_unresolvable_content() {
        let unit = SourceUnit::new("lib/helpers.php", "<?php $x = $post['x'];");
        let out = parse_action_file(&unit);
        assert!(out.records.is_empty());
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_unavailable_action_skipped() {
        let unit = SourceUnit::new("API/version/delete.php", "<?php $x = $post['x'];");
        let out = parse_action_file(&unit);
        assert!(out.records.is_empty());
        assert!(out.warnings[0].message.contains("has no 'delete' action"));
    }

    #[test]
    fn test_parse_action_files_keeps_input_order() {
        let units = vec![
            SourceUnit::new("API/arm/handler.php", ARM_HANDLER),
            SourceUnit::new("API/record/export.php", RECORD_EXPORT),
        ];
        let out = parse_action_files(&units);
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.records[2].content_type, ContentType::Record);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_looks_like_handler() {
        assert!(looks_like_handler("<?php $a = $_POST['a'];"));
        assert!(!looks_like_handler("<?php class Util {}"));
    }
}
