//! Structural diffs between generated descriptions
//!
//! Every result is directional: comparing `b` against `a` swaps added with
//! removed and flips each change's before/after, which [`ComparisonResult::mirrored`]
//! reproduces exactly.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::catalog::Operation;
use crate::generator::{InterfaceDescription, PathItem};
use crate::parsers::{Parameter, ParamType, SchemaDefinition};

/// An entity present on only one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// An entity whose value differs. Additions and removals nested inside a
/// change leave `before` or `after` empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Change>,
}

impl Change {
    fn value(name: impl Into<String>, before: Option<String>, after: Option<String>) -> Self {
        Change {
            name: name.into(),
            before,
            after,
            details: Vec::new(),
        }
    }

    fn nested(name: impl Into<String>, details: Vec<Change>) -> Self {
        Change {
            name: name.into(),
            before: None,
            after: None,
            details,
        }
    }

    pub fn mirrored(&self) -> Change {
        Change {
            name: self.name.clone(),
            before: self.after.clone(),
            after: self.before.clone(),
            details: self.details.iter().map(Change::mirrored).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub added: Vec<DiffEntry>,
    pub removed: Vec<DiffEntry>,
    pub changed: Vec<Change>,
}

impl ComparisonResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// The result of comparing in the opposite direction.
    pub fn mirrored(&self) -> ComparisonResult {
        ComparisonResult {
            added: self.removed.clone(),
            removed: self.added.clone(),
            changed: self.changed.iter().map(Change::mirrored).collect(),
        }
    }

    pub fn counts(&self) -> ComparisonCounts {
        ComparisonCounts {
            added: self.added.len(),
            removed: self.removed.len(),
            changed: self.changed.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonCounts {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
}

impl std::ops::Add for ComparisonCounts {
    type Output = ComparisonCounts;

    fn add(self, rhs: ComparisonCounts) -> ComparisonCounts {
        ComparisonCounts {
            added: self.added + rhs.added,
            removed: self.removed + rhs.removed,
            changed: self.changed + rhs.changed,
        }
    }
}

/// Everything that differs between two descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub from: String,
    pub to: String,
    pub counts: ComparisonCounts,
    pub paths: ComparisonResult,
    pub schemas: ComparisonResult,
    pub patterns: ComparisonResult,
}

impl ComparisonSummary {
    pub fn is_identical(&self) -> bool {
        self.paths.is_empty() && self.schemas.is_empty() && self.patterns.is_empty()
    }

    pub fn mirrored(&self) -> ComparisonSummary {
        ComparisonSummary {
            from: self.to.clone(),
            to: self.from.clone(),
            counts: ComparisonCounts {
                added: self.counts.removed,
                removed: self.counts.added,
                changed: self.counts.changed,
            },
            paths: self.paths.mirrored(),
            schemas: self.schemas.mirrored(),
            patterns: self.patterns.mirrored(),
        }
    }

    /// Plain-text report, one line per top-level entry.
    pub fn summary_text(&self) -> String {
        let mut out = format!(
            "{} -> {}: {} added, {} removed, {} changed\n",
            self.from, self.to, self.counts.added, self.counts.removed, self.counts.changed
        );
        if self.is_identical() {
            out.push_str("no differences\n");
            return out;
        }

        for (title, result) in [
            ("paths", &self.paths),
            ("schemas", &self.schemas),
            ("patterns", &self.patterns),
        ] {
            if result.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{title}:");
            for entry in &result.added {
                let _ = writeln!(out, "  + {}", entry.name);
            }
            for entry in &result.removed {
                let _ = writeln!(out, "  - {}", entry.name);
            }
            for change in &result.changed {
                write_change(&mut out, change, 1);
            }
        }
        out
    }
}

fn write_change(out: &mut String, change: &Change, depth: usize) {
    let indent = "  ".repeat(depth);
    let _ = match (&change.before, &change.after) {
        (None, None) => writeln!(out, "{indent}~ {}", change.name),
        (None, Some(after)) => writeln!(out, "{indent}+ {}: {after}", change.name),
        (Some(before), None) => writeln!(out, "{indent}- {}: {before}", change.name),
        (Some(before), Some(after)) => {
            writeln!(out, "{indent}~ {}: {before} -> {after}", change.name)
        }
    };
    for detail in &change.details {
        write_change(out, detail, depth + 1);
    }
}

/// Diff two keyed collections. `describe` fills the detail of one-sided
/// entries; `diff` yields the change for a key present on both sides.
fn compare_keyed<K, V>(
    a: &BTreeMap<K, V>,
    b: &BTreeMap<K, V>,
    describe: impl Fn(&V) -> Option<String>,
    diff: impl Fn(String, &V, &V) -> Option<Change>,
    name: impl Fn(&K) -> String,
) -> ComparisonResult
where
    K: Ord,
{
    let mut result = ComparisonResult::default();

    for (key, value) in b {
        if !a.contains_key(key) {
            result.added.push(DiffEntry {
                name: name(key),
                detail: describe(value),
            });
        }
    }

    for (key, before) in a {
        match b.get(key) {
            None => result.removed.push(DiffEntry {
                name: name(key),
                detail: describe(before),
            }),
            Some(after) => result.changed.extend(diff(name(key), before, after)),
        }
    }

    result
}

// ============================================================================
// Schemas
// ============================================================================

/// Schema-level additions and removals; shared schemas with different fields
/// become one change whose details are the field differences.
pub fn compare_schemas(
    a: &BTreeMap<String, SchemaDefinition>,
    b: &BTreeMap<String, SchemaDefinition>,
) -> ComparisonResult {
    compare_keyed(
        a,
        b,
        |schema| Some(format!("{} fields", schema.fields.len())),
        |name, before, after| {
            let mut details = Vec::new();
            if before.kind != after.kind {
                details.push(Change::value(
                    "kind",
                    Some(format!("{:?}", before.kind)),
                    Some(format!("{:?}", after.kind)),
                ));
            }
            details.extend(field_changes(before, after));

            if details.is_empty() {
                None
            } else {
                Some(Change::nested(name, details))
            }
        },
        String::clone,
    )
}

fn field_changes(before: &SchemaDefinition, after: &SchemaDefinition) -> Vec<Change> {
    let fields = |schema: &SchemaDefinition| -> BTreeMap<String, ParamType> {
        schema
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.field_type))
            .collect()
    };
    let (before, after) = (fields(before), fields(after));
    let names: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    names
        .into_iter()
        .filter_map(|name| {
            let old = before.get(name);
            let new = after.get(name);
            (old != new).then(|| {
                Change::value(
                    name.clone(),
                    old.map(|t| t.as_str().to_string()),
                    new.map(|t| t.as_str().to_string()),
                )
            })
        })
        .collect()
}

// ============================================================================
// Paths
// ============================================================================

fn by_operation(items: &[PathItem]) -> BTreeMap<Operation, &PathItem> {
    items.iter().map(|item| (item.operation(), item)).collect()
}

fn signature(parameter: &Parameter) -> String {
    let presence = if parameter.required { "required" } else { "optional" };
    format!("{}, {presence}", parameter.param_type.as_str())
}

/// Operations added or removed, plus per-operation parameter, permission and
/// return-shape changes.
pub fn compare_paths(a: &[PathItem], b: &[PathItem]) -> ComparisonResult {
    compare_keyed(
        &by_operation(a),
        &by_operation(b),
        |item| Some(item.summary.clone()),
        |name, before, after| {
            let (before, after): (&PathItem, &PathItem) = (before, after);
            let mut details = parameter_changes(before, after);

            let permissions = |item: &PathItem| -> String {
                item.permissions
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let (old, new) = (permissions(before), permissions(after));
            if old != new {
                details.push(Change::value("permissions", Some(old), Some(new)));
            }

            if before.returns != after.returns {
                details.push(Change::value(
                    "returns",
                    Some(before.returns.to_string()),
                    Some(after.returns.to_string()),
                ));
            }

            if details.is_empty() {
                None
            } else {
                Some(Change::nested(name, details))
            }
        },
        Operation::path,
    )
}

fn parameter_changes(before: &PathItem, after: &PathItem) -> Vec<Change> {
    let signatures = |item: &PathItem| -> BTreeMap<String, String> {
        item.parameters
            .iter()
            .map(|p| (p.name.clone(), signature(p)))
            .collect()
    };
    let (before, after) = (signatures(before), signatures(after));
    let names: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    names
        .into_iter()
        .filter_map(|name| {
            let old = before.get(name);
            let new = after.get(name);
            (old != new).then(|| Change::value(format!("parameters.{name}"), old.cloned(), new.cloned()))
        })
        .collect()
}

// ============================================================================
// Patterns
// ============================================================================

/// Validation patterns keyed `"<path>#<parameter>"`, compared literally.
pub fn compare_patterns(a: &[PathItem], b: &[PathItem]) -> ComparisonResult {
    let patterns = |items: &[PathItem]| -> BTreeMap<(Operation, String), String> {
        items
            .iter()
            .flat_map(|item| {
                item.parameters.iter().filter_map(move |p| {
                    p.pattern
                        .as_ref()
                        .map(|pattern| ((item.operation(), p.name.clone()), pattern.clone()))
                })
            })
            .collect()
    };

    compare_keyed(
        &patterns(a),
        &patterns(b),
        |pattern| Some(pattern.clone()),
        |name, before, after| {
            (before != after).then(|| Change::value(name, Some(before.clone()), Some(after.clone())))
        },
        |(op, name): &(Operation, String)| format!("{}#{name}", op.path()),
    )
}

// ============================================================================
// Documents
// ============================================================================

fn label(description: &InterfaceDescription) -> String {
    format!(
        "REDCap {} ({})",
        description.info.server_version, description.info.adapter
    )
}

/// Compare two whole descriptions. `compare_specs(a, a)` is always identical.
pub fn compare_specs(a: &InterfaceDescription, b: &InterfaceDescription) -> ComparisonSummary {
    let paths = compare_paths(&a.paths, &b.paths);
    let schemas = compare_schemas(&a.schemas, &b.schemas);
    let patterns = compare_patterns(&a.paths, &b.paths);

    ComparisonSummary {
        from: label(a),
        to: label(b),
        counts: paths.counts() + schemas.counts() + patterns.counts(),
        paths,
        schemas,
        patterns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Action, ContentType, Permission};
    use crate::parsers::{ReturnShape, SchemaField, SchemaKind};

    fn schema(name: &str, fields: &[(&str, ParamType)]) -> (String, SchemaDefinition) {
        let definition = SchemaDefinition {
            name: name.to_string(),
            kind: SchemaKind::Class,
            fields: fields
                .iter()
                .map(|(n, t)| SchemaField {
                    name: n.to_string(),
                    field_type: *t,
                })
                .collect(),
        };
        (name.to_string(), definition)
    }

    fn item(content: ContentType, action: Action, parameters: Vec<Parameter>) -> PathItem {
        let op = Operation::new(content, action);
        PathItem {
            path: op.path(),
            operation_id: op.operation_id(),
            tag: content.tag_group().name().to_string(),
            content,
            action,
            summary: format!("{} {}", action.verb(), content.label()),
            description: None,
            parameters,
            permissions: vec![Permission::ApiExport],
            returns: ReturnShape::Formatted,
            examples: vec![],
        }
    }

    // ========================================================================
    // Schemas
    // ========================================================================

    #[test]
    fn test_type_change_is_a_single_detail() {
        let a = BTreeMap::from([schema("Arm", &[("arm_num", ParamType::String), ("name", ParamType::String)])]);
        let b = BTreeMap::from([schema("Arm", &[("arm_num", ParamType::Integer), ("name", ParamType::String)])]);

        let result = compare_schemas(&a, &b);
        assert!(result.added.is_empty());
        assert!(result.removed.is_empty());
        assert_eq!(result.changed.len(), 1);

        let change = &result.changed[0];
        assert_eq!(change.name, "Arm");
        assert_eq!(
            change.details,
            vec![Change::value("arm_num", Some("string".into()), Some("integer".into()))]
        );
    }

    #[test]
    fn test_schema_added_and_removed() {
        let a = BTreeMap::from([schema("Arm", &[("arm_num", ParamType::Integer)])]);
        let b = BTreeMap::from([
            schema("Event", &[("event_name", ParamType::String)]),
            schema("Arm", &[("arm_num", ParamType::Integer), ("name", ParamType::String)]),
        ]);

        let result = compare_schemas(&a, &b);
        assert_eq!(result.added.len(), 1);
        assert_eq!(result.added[0].name, "Event");
        assert_eq!(result.added[0].detail.as_deref(), Some("1 fields"));
        assert!(result.removed.is_empty());
        assert_eq!(result.changed[0].details[0].before, None);
        assert_eq!(result.changed[0].details[0].after.as_deref(), Some("string"));
    }

    #[test]
    fn test_schema_comparison_mirrors() {
        let a = BTreeMap::from([
            schema("Arm", &[("arm_num", ParamType::String)]),
            schema("Dag", &[("unique_group_name", ParamType::String)]),
        ]);
        let b = BTreeMap::from([
            schema("Arm", &[("arm_num", ParamType::Integer)]),
            schema("User", &[("username", ParamType::String)]),
        ]);

        assert_eq!(compare_schemas(&b, &a), compare_schemas(&a, &b).mirrored());
        assert!(compare_schemas(&a, &a).is_empty());
    }

    // ========================================================================
    // Paths and patterns
    // ========================================================================

    #[test]
    fn test_path_added_removed_in_documentation_order() {
        let a = vec![
            item(ContentType::Arm, Action::Export, vec![]),
            item(ContentType::Version, Action::Export, vec![]),
        ];
        let b = vec![
            item(ContentType::Version, Action::Export, vec![]),
            item(ContentType::FileInfo, Action::Export, vec![]),
            item(ContentType::Record, Action::Export, vec![]),
        ];

        let result = compare_paths(&a, &b);
        let added: Vec<_> = result.added.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(added, vec!["/record/export", "/fileInfo/export"]);
        assert_eq!(result.removed.len(), 1);
        assert_eq!(result.removed[0].name, "/arm/export");
        assert!(result.changed.is_empty());
    }

    #[test]
    fn test_parameter_and_permission_changes_nest() {
        let a = vec![item(
            ContentType::Record,
            Action::Export,
            vec![
                Parameter::new("records", ParamType::String, false),
                Parameter::new("fields", ParamType::Array, false),
            ],
        )];
        let mut changed = item(
            ContentType::Record,
            Action::Export,
            vec![
                Parameter::new("records", ParamType::Array, false),
                Parameter::new("type", ParamType::String, true),
            ],
        );
        changed.permissions.push(Permission::Reports);
        let b = vec![changed];

        let result = compare_paths(&a, &b);
        assert_eq!(result.changed.len(), 1);
        let details = &result.changed[0].details;
        let names: Vec<_> = details.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["parameters.fields", "parameters.records", "parameters.type", "permissions"]
        );
        assert_eq!(details[0].after, None);
        assert_eq!(details[1].before.as_deref(), Some("string, optional"));
        assert_eq!(details[1].after.as_deref(), Some("array, optional"));
        assert_eq!(details[3].after.as_deref(), Some("api-export, reports"));

        assert_eq!(compare_paths(&b, &a), result.mirrored());
    }

    #[test]
    fn test_patterns_compare_literally() {
        let a = vec![item(
            ContentType::Record,
            Action::Rename,
            vec![
                Parameter::new("record", ParamType::String, true).with_pattern("^\\w+$"),
                Parameter::new("new_record_name", ParamType::String, true).with_pattern("^\\w+$"),
            ],
        )];
        let b = vec![item(
            ContentType::Record,
            Action::Rename,
            vec![
                Parameter::new("record", ParamType::String, true).with_pattern("^[A-Za-z0-9_-]+$"),
                Parameter::new("new_record_name", ParamType::String, true),
            ],
        )];

        let result = compare_patterns(&a, &b);
        assert!(result.added.is_empty());
        assert_eq!(result.removed.len(), 1);
        assert_eq!(result.removed[0].name, "/record/rename#new_record_name");
        assert_eq!(result.changed.len(), 1);
        assert_eq!(result.changed[0].name, "/record/rename#record");
        assert_eq!(result.changed[0].after.as_deref(), Some("^[A-Za-z0-9_-]+$"));
    }

    #[test]
    fn test_summary_text() {
        let result = compare_paths(&[], &[item(ContentType::FileInfo, Action::Export, vec![])]);
        let summary = ComparisonSummary {
            from: "REDCap 15.5.32 (v15)".to_string(),
            to: "REDCap 16.0.8 (v16)".to_string(),
            counts: result.counts(),
            paths: result,
            schemas: ComparisonResult::default(),
            patterns: ComparisonResult::default(),
        };
        let text = summary.summary_text();
        assert!(text.starts_with("REDCap 15.5.32 (v15) -> REDCap 16.0.8 (v16): 1 added, 0 removed, 0 changed"));
        assert!(text.contains("  + /fileInfo/export"));
        assert!(!summary.is_identical());
    }
}
