//! Parameter documentation from the API help page

use std::sync::OnceLock;

use regex::Regex;

use super::strip_html;
use super::types::{Extraction, HelpEntry, ParamType, Parameter};
use crate::catalog::{map_action_key, map_content_key_to_type, Action};

const SOURCE: &str = "help";

fn section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<div\b[^>]*\bclass\s*=\s*["'][^"']*\bapi-method\b[^"']*["'][^>]*>"#)
            .unwrap()
    })
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r#"(?i)\b{}\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        regex::escape(name)
    ))
    .ok()?;
    let caps = re.captures(tag)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
}

/// Extract one [`HelpEntry`] per `api-method` section.
///
/// A section runs from its opening `<div class="api-method" ...>` tag to the
/// next one. `data-action` may be omitted, in which case the operation is an
/// export.
pub fn parse_help_php(text: &str) -> Extraction<HelpEntry> {
    let mut out = Extraction::default();
    let starts: Vec<_> = section_re().find_iter(text).collect();

    if starts.is_empty() {
        out.warn(SOURCE, "no api-method sections found");
        return out;
    }

    for (i, start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map(|m| m.start()).unwrap_or(text.len());
        let tag = start.as_str();
        let body = &text[start.end()..end];

        let Some(content_key) = attribute(tag, "data-content") else {
            out.warn(SOURCE, "api-method section without data-content");
            continue;
        };
        let Some(content_type) = map_content_key_to_type(&content_key) else {
            out.warn(SOURCE, format!("unknown content '{content_key}' in help section"));
            continue;
        };

        let action = match attribute(tag, "data-action") {
            None => Action::Export,
            Some(key) => match map_action_key(&key) {
                Some(action) => action,
                None => {
                    out.warn(
                        SOURCE,
                        format!("unknown action '{key}' in help section for '{content_key}'"),
                    );
                    continue;
                }
            },
        };

        out.records.push(HelpEntry {
            content_type,
            action,
            title: section_title(body),
            description: section_description(body),
            parameters: section_parameters(body),
        });
    }

    out
}

fn section_title(body: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?is)<h[34][^>]*>(.*?)</h[34]>").unwrap());

    re.captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| strip_html(m.as_str()))
        .find(|title| !title.is_empty() && parameter_marker(title).is_none())
}

fn section_description(body: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").unwrap());

    re.captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| strip_html(m.as_str()))
        .filter(|text| !text.is_empty())
}

/// `Some(true)` for a required-parameters heading, `Some(false)` for optional.
fn parameter_marker(text: &str) -> Option<bool> {
    let lower = text.to_ascii_lowercase();
    if lower.contains("required parameters") {
        Some(true)
    } else if lower.contains("optional parameters") {
        Some(false)
    } else {
        None
    }
}

fn section_parameters(body: &str) -> Vec<Parameter> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r#"(?is)(?P<marker>(?:required|optional)\s+parameters)|<td\b[^>]*\bclass\s*=\s*["'][^"']*\bparam\b[^"']*["'][^>]*>(?P<name>.*?)</td>\s*<td\b[^>]*>(?P<desc>.*?)</td>"#,
        )
        .unwrap()
    });

    let mut required = false;
    let mut parameters: Vec<Parameter> = Vec::new();

    for caps in re.captures_iter(body) {
        if let Some(marker) = caps.name("marker") {
            required = parameter_marker(marker.as_str()).unwrap_or(required);
            continue;
        }

        let (Some(name), Some(desc)) = (caps.name("name"), caps.name("desc")) else {
            continue;
        };
        let raw_name = strip_html(name.as_str());
        let description = strip_html(desc.as_str());

        let (name, is_array) = match raw_name.strip_suffix("[]") {
            Some(stripped) => (stripped.trim().to_string(), true),
            None => (raw_name, false),
        };
        if name.is_empty() || parameters.iter().any(|p| p.name == name) {
            continue;
        }

        let param_type = if is_array {
            ParamType::Array
        } else {
            type_from_description(&description)
        };

        let mut parameter = Parameter::new(name, param_type, required);
        if !description.is_empty() {
            parameter = parameter.with_description(description);
        }
        parameters.push(parameter);
    }

    parameters
}

fn type_from_description(description: &str) -> ParamType {
    let lower = description.to_ascii_lowercase();
    if lower.contains("an array") || lower.contains("array of") {
        ParamType::Array
    } else if lower.contains("true") && lower.contains("false") {
        ParamType::Boolean
    } else if lower.contains("yyyy-mm-dd hh:mm") {
        ParamType::Datetime
    } else if lower.contains("yyyy-mm-dd") {
        ParamType::Date
    } else if lower.contains("integer") {
        ParamType::Integer
    } else {
        ParamType::String
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ContentType;

    const HELP: &str = r#"
<html><body>
<div class="api-method" data-content="record" data-action="export">
  <h3>Export Records</h3>
  <p>This method allows you to export a set of records
     for a project.</p>
  <h4>Permissions Required</h4>
  <h4>Required Parameters</h4>
  <table>
    <tr><td class="param">token</td><td>The API token specific to your REDCap project and username</td></tr>
    <tr><td class="param">format</td><td>csv, json, xml</td></tr>
  </table>
  <h4>Optional Parameters</h4>
  <table>
    <tr><td class="param">records[]</td><td>an array of record names specifying specific records</td></tr>
    <tr><td class="param">rawOrLabelHeaders</td><td>raw or label for the CSV headers</td></tr>
    <tr><td class="param">exportSurveyFields</td><td>true, false [default] &mdash; include survey identifier</td></tr>
    <tr><td class="param">dateRangeBegin</td><td>YYYY-MM-DD HH:MM:SS, export only records created after</td></tr>
  </table>
</div>
<div class="api-method" data-content="spaceship" data-action="export">
  <h3>Export Spaceships</h3>
</div>
<div class="api-method" data-content="arm" data-action="launch">
  <h3>Launch Arms</h3>
</div>
<div class="api-method" data-content="version">
  <h3>Export REDCap Version</h3>
  <p>Returns the current REDCap version number &amp; nothing else.</p>
</div>
</body></html>
"#;

    #[test]
    fn test_parses_record_export_section() {
        let out = parse_help_php(HELP);
        let record = &out.records[0];
        assert_eq!(record.content_type, ContentType::Record);
        assert_eq!(record.action, Action::Export);
        assert_eq!(record.title.as_deref(), Some("Export Records"));
        assert_eq!(
            record.description.as_deref(),
            Some("This method allows you to export a set of records for a project.")
        );

        let names: Vec<_> = record.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "token",
                "format",
                "records",
                "rawOrLabelHeaders",
                "exportSurveyFields",
                "dateRangeBegin"
            ]
        );
    }

    #[test]
    fn test_required_and_types() {
        let out = parse_help_php(HELP);
        let params = &out.records[0].parameters;
        let find = |name: &str| params.iter().find(|p| p.name == name).unwrap();

        assert!(find("token").required);
        assert!(find("format").required);
        assert!(!find("records").required);
        assert_eq!(find("records").param_type, ParamType::Array);
        assert_eq!(find("exportSurveyFields").param_type, ParamType::Boolean);
        assert_eq!(find("dateRangeBegin").param_type, ParamType::Datetime);
        assert_eq!(find("rawOrLabelHeaders").param_type, ParamType::String);
        assert!(find("exportSurveyFields")
            .description
            .as_deref()
            .unwrap()
            .contains("true, false [default]"));
    }

    #[test]
    fn test_unknown_sections_are_skipped_with_warnings() {
        let out = parse_help_php(HELP);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.warnings.len(), 2);
        assert!(out.warnings[0].message.contains("spaceship"));
        assert!(out.warnings[1].message.contains("launch"));
    }

    #[test]
    fn test_missing_action_defaults_to_export() {
        let out = parse_help_php(HELP);
        let version = &out.records[1];
        assert_eq!(version.content_type, ContentType::Version);
        assert_eq!(version.action, Action::Export);
        assert_eq!(
            version.description.as_deref(),
            Some("Returns the current REDCap version number & nothing else.")
        );
        assert!(version.parameters.is_empty());
    }

    #[test]
    fn test_no_sections() {
        let out = parse_help_php("<html><p>Nothing here</p></html>");
        assert!(out.records.is_empty());
        assert_eq!(out.warnings.len(), 1);
    }
}
