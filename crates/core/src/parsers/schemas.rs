//! Data shapes embedded in PHP source: attribute arrays and class properties

use std::sync::OnceLock;

use regex::Regex;

use super::types::{Extraction, ParamType, SchemaDefinition, SchemaField, SchemaKind};
use super::{code_mask, matching_delimiter, relative_depths};

const SOURCE: &str = "schema";

/// Quoted values that name a type instead of carrying a sample.
const TYPE_NAMES: &[&str] = &[
    "string", "int", "integer", "bool", "boolean", "float", "number", "array", "date", "datetime",
    "file",
];

/// `$project... = array(...)` / `[...]` literals, excluding user-rights arrays.
pub fn parse_project_schemas(text: &str) -> Extraction<SchemaDefinition> {
    parse_array_schemas(text, SchemaKind::Project, |name| {
        name.contains("project") && !name.contains("right")
    })
}

/// `$...rights... = array(...)` / `[...]` literals.
pub fn parse_user_rights_schemas(text: &str) -> Extraction<SchemaDefinition> {
    parse_array_schemas(text, SchemaKind::UserRights, |name| name.contains("right"))
}

fn parse_array_schemas(
    text: &str,
    kind: SchemaKind,
    accepts: impl Fn(&str) -> bool,
) -> Extraction<SchemaDefinition> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\$(\w+)\s*=\s*(?:array\s*\(|\[)").unwrap());

    let mut out = Extraction::default();
    let mask = code_mask(text);

    for caps in re.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str();
        if !mask[whole.start()] || !accepts(&name.to_ascii_lowercase()) {
            continue;
        }

        let open = whole.end() - 1;
        let Some(close) = matching_delimiter(text, &mask, open) else {
            out.warn(SOURCE, format!("array literal ${name} is never closed"));
            continue;
        };

        let fields = array_fields(text, &mask, open + 1, close);
        if fields.is_empty() {
            out.warn(SOURCE, format!("array literal ${name} declares no fields"));
            continue;
        }

        out.records.push(SchemaDefinition {
            name: name.to_string(),
            kind,
            fields,
        });
    }

    out
}

/// Split `text[start..end]` on commas outside nested literals.
fn top_level_items<'a>(text: &'a str, mask: &[bool], start: usize, end: usize) -> Vec<&'a str> {
    let bytes = text.as_bytes();
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut item_start = start;

    for i in start..end {
        if !mask[i] {
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                items.push(&text[item_start..i]);
                item_start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&text[item_start..end]);

    items
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

fn array_fields(text: &str, mask: &[bool], start: usize, end: usize) -> Vec<SchemaField> {
    let mut fields: Vec<SchemaField> = Vec::new();

    for item in top_level_items(text, mask, start, end) {
        let field = match item.split_once("=>") {
            Some((key, value)) => string_literal(key).map(|name| SchemaField {
                name: name.to_string(),
                field_type: literal_type(value),
            }),
            None => string_literal(item).map(|name| SchemaField {
                name: name.to_string(),
                field_type: ParamType::String,
            }),
        };

        if let Some(field) = field {
            if !fields.iter().any(|f| f.name == field.name) {
                fields.push(field);
            }
        }
    }

    fields
}

fn string_literal(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    let quote = raw.chars().next()?;
    if !matches!(quote, '\'' | '"') || raw.len() < 2 || !raw.ends_with(quote) {
        return None;
    }
    Some(&raw[1..raw.len() - 1])
}

/// Type of a PHP literal; a quoted type name stands for that type.
fn literal_type(raw: &str) -> ParamType {
    static INT_RE: OnceLock<Regex> = OnceLock::new();
    static FLOAT_RE: OnceLock<Regex> = OnceLock::new();
    let int_re = INT_RE.get_or_init(|| Regex::new(r"^-?\d+$").unwrap());
    let float_re = FLOAT_RE.get_or_init(|| Regex::new(r"^-?\d*\.\d+$").unwrap());

    let raw = raw.trim();
    let lower = raw.to_ascii_lowercase();

    if let Some(inner) = string_literal(raw) {
        let inner = inner.trim().to_ascii_lowercase();
        return if TYPE_NAMES.contains(&inner.as_str()) {
            ParamType::from_name(&inner).unwrap_or(ParamType::String)
        } else {
            ParamType::String
        };
    }

    if lower == "true" || lower == "false" {
        ParamType::Boolean
    } else if int_re.is_match(raw) {
        ParamType::Integer
    } else if float_re.is_match(raw) {
        ParamType::Number
    } else if lower.starts_with("array") || raw.starts_with('[') {
        ParamType::Array
    } else {
        ParamType::String
    }
}

/// A declared or documented PHP type; unions resolve to their first known member.
fn declared_type(raw: &str) -> Option<ParamType> {
    raw.split('|')
        .filter(|part| !part.eq_ignore_ascii_case("null"))
        .find_map(ParamType::from_name)
}

/// Properties of every `class Name { ... }` block.
///
/// Only properties declared directly in the class body count. Their type comes
/// from the declaration (`public ?int $x`), then an `@var` docblock, then the
/// default value. Classes without properties yield nothing.
pub fn parse_class_schemas(text: &str) -> Extraction<SchemaDefinition> {
    static CLASS_RE: OnceLock<Regex> = OnceLock::new();
    static PROPERTY_RE: OnceLock<Regex> = OnceLock::new();
    let class_re = CLASS_RE.get_or_init(|| {
        Regex::new(r"\bclass\s+(\w+)(?:\s+extends\s+[\w\\]+)?(?:\s+implements\s+[\w\\,\s]+?)?\s*\{")
            .unwrap()
    });
    let property_re = PROPERTY_RE.get_or_init(|| {
        Regex::new(
            r"\b(?:public|protected|private|var)\s+(?:(?:static|readonly)\s+)*(?:(\??[\w\\\[\]|]+)\s+)?\$(\w+)",
        )
        .unwrap()
    });

    let mut out = Extraction::default();
    let mask = code_mask(text);

    for caps in class_re.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !mask[whole.start()] {
            continue;
        }

        let open = whole.end() - 1;
        let Some(close) = matching_delimiter(text, &mask, open) else {
            out.warn(SOURCE, format!("class {} is never closed", name.as_str()));
            continue;
        };

        let body_start = open + 1;
        let body = &text[body_start..close];
        let depths = relative_depths(text, &mask, body_start, close);
        let mut fields: Vec<SchemaField> = Vec::new();

        for prop in property_re.captures_iter(body) {
            let (Some(decl), Some(prop_name)) = (prop.get(0), prop.get(2)) else {
                continue;
            };
            if !mask[body_start + decl.start()] || depths[decl.start()] != 0 {
                continue;
            }

            let field_type = prop
                .get(1)
                .and_then(|t| declared_type(t.as_str()))
                .or_else(|| docblock_var(&body[..decl.start()]))
                .or_else(|| default_value(&body[decl.end()..]).map(literal_type))
                .unwrap_or(ParamType::String);

            if !fields.iter().any(|f| f.name == prop_name.as_str()) {
                fields.push(SchemaField {
                    name: prop_name.as_str().to_string(),
                    field_type,
                });
            }
        }

        if !fields.is_empty() {
            out.records.push(SchemaDefinition {
                name: name.as_str().to_string(),
                kind: SchemaKind::Class,
                fields,
            });
        }
    }

    out
}

/// `@var` type of a docblock that directly precedes a declaration.
fn docblock_var(preceding: &str) -> Option<ParamType> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"@var\s+([\w\\\[\]|?]+)").unwrap());

    let preceding = preceding.trim_end();
    if !preceding.ends_with("*/") {
        return None;
    }
    let docblock = &preceding[preceding.rfind("/*")?..];
    re.captures(docblock)
        .and_then(|caps| caps.get(1))
        .and_then(|m| declared_type(m.as_str()))
}

/// Text of `= <value>` right after a property name, up to the `;`.
fn default_value(rest: &str) -> Option<&str> {
    let rest = rest.trim_start().strip_prefix('=')?;
    let end = rest.find(';')?;
    Some(rest[..end].trim())
}
