//! Interface description assembly
//!
//! Combines parser records with the catalog and the adapter selected for a
//! server version. Output never depends on the order records arrive in: inputs
//! are sorted before they are merged, paths follow documentation order and
//! parameters are listed required-first, then by name.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::adapters::{nearest_lower_adapter_in, registry, select_adapter_in, Adapter, Feature};
use crate::catalog::{operations_for_adapter, required_permissions, Action, ContentType, Operation, Permission};
use crate::error::Result;
use crate::parsers::{
    ActionFileInfo, CurlExample, HelpEntry, ParamType, Parameter, ReturnShape, SchemaDefinition,
    SourceRecords,
};
use crate::version::{Version, VersionRange};

pub const OPENAPI_VERSION: &str = "3.0.3";
pub const API_TITLE: &str = "REDCap API";

/// REDCap API tokens are 32 uppercase hexadecimal characters.
pub const TOKEN_PATTERN: &str = "^[0-9A-F]{32}$";

/// Parameters the generator supplies for every operation. Extracted records
/// never redefine them.
pub const STANDARD_PARAMETERS: [&str; 5] = ["token", "content", "action", "format", "returnFormat"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Attach parsed curl examples to their operations.
    pub include_examples: bool,
    /// Fall back to the nearest lower adapter for unsupported versions.
    pub best_effort_version: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecInfo {
    pub title: String,
    pub server_version: Version,
    pub adapter: String,
    pub version_range: VersionRange,
    pub features: Vec<Feature>,
}

/// One operation of the generated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathItem {
    pub path: String,
    pub operation_id: String,
    pub tag: String,
    pub content: ContentType,
    pub action: Action,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
    pub permissions: Vec<Permission>,
    pub returns: ReturnShape,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<CurlExample>,
}

impl PathItem {
    pub fn operation(&self) -> Operation {
        Operation::new(self.content, self.action)
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// The generated, version-scoped description of the callable API surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescription {
    pub openapi: String,
    pub info: SpecInfo,
    pub paths: Vec<PathItem>,
    pub schemas: BTreeMap<String, SchemaDefinition>,
}

impl InterfaceDescription {
    pub fn path(&self, path: &str) -> Option<&PathItem> {
        self.paths.iter().find(|item| item.path == path)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub description: InterfaceDescription,
    pub warnings: Vec<String>,
}

/// Generate the description for `version` against the built-in adapter table.
pub fn generate_openapi_spec(
    version: &str,
    records: &SourceRecords,
    options: &GenerationOptions,
) -> Result<GenerationOutput> {
    generate_openapi_spec_in(registry(), version, records, options)
}

/// Generate against an explicit adapter table.
///
/// Fails only on a malformed version, or on a version no adapter covers when
/// best-effort generation is off (or finds no lower adapter either). Missing
/// or inconsistent records become warnings.
pub fn generate_openapi_spec_in(
    adapters: &[Adapter],
    version: &str,
    records: &SourceRecords,
    options: &GenerationOptions,
) -> Result<GenerationOutput> {
    let server_version = Version::parse(version)?;
    let mut fallback: Option<String> = None;

    let adapter = match select_adapter_in(adapters, &server_version) {
        Ok(adapter) => adapter,
        Err(err) if options.best_effort_version => {
            let Some(adapter) = nearest_lower_adapter_in(adapters, &server_version) else {
                return Err(err);
            };
            fallback = Some(format!(
                "REDCap {server_version} is outside every supported range; \
                 generated best-effort against adapter {} ({})",
                adapter.name, adapter.range
            ));
            adapter
        }
        Err(err) => return Err(err),
    };

    let mut notes: BTreeSet<String> = BTreeSet::new();

    let mut actions: Vec<&ActionFileInfo> = records.actions.iter().collect();
    actions.sort_by(|a, b| {
        (a.content_type, a.action, &a.source)
            .cmp(&(b.content_type, b.action, &b.source))
            .then_with(|| a.cmp(b))
    });

    // (content, action, title, description, parameters)
    let mut help: Vec<&HelpEntry> = records.help.iter().collect();
    help.sort();

    let mut examples: Vec<&CurlExample> = records
        .examples
        .iter()
        .chain(records.actions.iter().flat_map(|a| a.examples.iter()))
        .collect();
    examples.sort();
    examples.dedup();

    let operations = operations_for_adapter(adapter, &server_version);
    let offered: BTreeSet<Operation> = operations.iter().copied().collect();

    for entry in &records.index {
        match (entry.content_type, entry.action) {
            (None, _) => {
                notes.insert(format!(
                    "index.php routes unknown content '{}' to {}",
                    entry.content_key, entry.entry_point
                ));
            }
            (Some(content), Some(action)) => {
                let op = Operation::new(content, action);
                if !content.actions().contains(&action) {
                    notes.insert(format!("index.php routes {op}, which the catalog does not define"));
                } else if !offered.contains(&op) {
                    notes.insert(format!(
                        "index.php routes {op}, which adapter {} does not offer",
                        adapter.name
                    ));
                }
            }
            (Some(_), None) => {}
        }
    }

    for handler in &actions {
        let op = Operation::new(handler.content_type, handler.action);
        if !offered.contains(&op) {
            notes.insert(format!(
                "{} serves {op}, which adapter {} does not offer",
                handler.source, adapter.name
            ));
        }
    }

    let paths = operations
        .iter()
        .map(|op| build_path(*op, &actions, &help, &examples, options, &mut notes))
        .collect();

    let description = InterfaceDescription {
        openapi: OPENAPI_VERSION.to_string(),
        info: SpecInfo {
            title: API_TITLE.to_string(),
            server_version,
            adapter: adapter.name.to_string(),
            version_range: adapter.range,
            features: adapter.features.enabled().collect(),
        },
        paths,
        schemas: merge_schemas(&records.schemas),
    };

    Ok(GenerationOutput {
        description,
        warnings: fallback.into_iter().chain(notes).collect(),
    })
}

fn build_path(
    op: Operation,
    actions: &[&ActionFileInfo],
    help: &[&HelpEntry],
    examples: &[&CurlExample],
    options: &GenerationOptions,
    notes: &mut BTreeSet<String>,
) -> PathItem {
    let path = op.path();
    let handlers: Vec<&ActionFileInfo> = actions
        .iter()
        .copied()
        .filter(|a| a.content_type == op.content && a.action == op.action)
        .collect();
    let docs: Vec<&HelpEntry> = help
        .iter()
        .copied()
        .filter(|h| h.content_type == op.content && h.action == op.action)
        .collect();

    if handlers.is_empty() && docs.is_empty() {
        notes.insert(format!("{path}: no source records; only standard parameters emitted"));
    }

    let mut extracted: Vec<Parameter> = Vec::new();
    for parameter in handlers
        .iter()
        .flat_map(|h| &h.parameters)
        .chain(docs.iter().flat_map(|h| &h.parameters))
    {
        if !STANDARD_PARAMETERS.contains(&parameter.name.as_str()) {
            merge_parameter(&mut extracted, parameter);
        }
    }

    let returns = handlers
        .iter()
        .map(|h| h.returns)
        .max()
        .unwrap_or_else(|| default_return_shape(op.content, op.action));

    let mut parameters = standard_parameters(op, returns);
    parameters.extend(extracted);
    parameters.sort_by(|a, b| b.required.cmp(&a.required).then_with(|| a.name.cmp(&b.name)));

    let relevant: Vec<&CurlExample> = examples
        .iter()
        .copied()
        .filter(|ex| ex.content_type == Some(op.content) && ex.action == Some(op.action))
        .collect();

    for example in &relevant {
        for name in example.params.keys().chain(example.files.keys()) {
            if STANDARD_PARAMETERS.contains(&name.as_str()) {
                continue;
            }
            if !parameters.iter().any(|p| &p.name == name) {
                notes.insert(format!(
                    "{path}: example uses parameter '{name}' missing from the extracted model"
                ));
            }
        }
    }

    let summary = docs
        .iter()
        .find_map(|h| h.title.clone())
        .unwrap_or_else(|| format!("{} {}", op.action.verb(), op.content.label()));
    let description = docs.iter().find_map(|h| h.description.clone());

    PathItem {
        operation_id: op.operation_id(),
        tag: op.content.tag_group().name().to_string(),
        content: op.content,
        action: op.action,
        summary,
        description,
        parameters,
        permissions: required_permissions(op.content, op.action).into_iter().collect(),
        returns,
        examples: if options.include_examples {
            relevant.into_iter().cloned().collect()
        } else {
            Vec::new()
        },
        path,
    }
}

/// Union by name: required is OR'ed, the more specific type wins over `string`,
/// the first description and pattern are kept.
fn merge_parameter(into: &mut Vec<Parameter>, incoming: &Parameter) {
    match into.iter_mut().find(|p| p.name == incoming.name) {
        Some(existing) => {
            existing.required |= incoming.required;
            existing.param_type = existing.param_type.max(incoming.param_type);
            if existing.description.is_none() {
                existing.description.clone_from(&incoming.description);
            }
            if existing.pattern.is_none() {
                existing.pattern.clone_from(&incoming.pattern);
            }
        }
        None => into.push(incoming.clone()),
    }
}

/// Parameters every request for `op` carries.
pub fn standard_parameters(op: Operation, returns: ReturnShape) -> Vec<Parameter> {
    let mut parameters = vec![
        Parameter::new("token", ParamType::String, true)
            .with_description("The API token specific to your REDCap project and username")
            .with_pattern(TOKEN_PATTERN),
        Parameter::new("content", ParamType::String, true)
            .with_description(format!("Must be '{}'", op.content.key())),
    ];

    if !matches!(op.content.actions(), [Action::Export]) {
        parameters.push(
            Parameter::new("action", ParamType::String, op.action != Action::Export)
                .with_description(format!("Must be '{}'", op.action.key())),
        );
    }

    if returns != ReturnShape::Binary {
        parameters.push(
            Parameter::new("format", ParamType::String, false)
                .with_description("csv, json or xml (default: xml)"),
        );
    }

    parameters.push(
        Parameter::new("returnFormat", ParamType::String, false)
            .with_description("Format of error messages: csv, json or xml (default: format)"),
    );

    parameters
}

/// Return shape for operations no handler describes.
pub fn default_return_shape(content: ContentType, action: Action) -> ReturnShape {
    match (content, action) {
        (ContentType::File | ContentType::Pdf | ContentType::FileRepository, Action::Export) => {
            ReturnShape::Binary
        }
        (ContentType::Version | ContentType::GenerateNextRecordName, Action::Export) => {
            ReturnShape::Text
        }
        (_, Action::Import | Action::Delete) => ReturnShape::Count,
        (_, Action::Rename | Action::Switch) => ReturnShape::Text,
        _ => ReturnShape::Formatted,
    }
}

/// Merge same-named definitions; fields union by name, the more specific type wins.
fn merge_schemas(definitions: &[SchemaDefinition]) -> BTreeMap<String, SchemaDefinition> {
    let mut sorted: Vec<&SchemaDefinition> = definitions.iter().collect();
    sorted.sort_by(|a, b| (&a.name, a.kind, &a.fields).cmp(&(&b.name, b.kind, &b.fields)));

    let mut schemas: BTreeMap<String, SchemaDefinition> = BTreeMap::new();
    for definition in sorted {
        let merged = schemas
            .entry(definition.name.clone())
            .or_insert_with(|| SchemaDefinition {
                name: definition.name.clone(),
                kind: definition.kind,
                fields: Vec::new(),
            });

        for field in &definition.fields {
            match merged.fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => existing.field_type = existing.field_type.max(field.field_type),
                None => merged.fields.push(field.clone()),
            }
        }
    }
    schemas
}

// ============================================================================
// OpenAPI rendering
// ============================================================================

/// Render as OpenAPI 3.0 JSON. Every REDCap call is a form POST to a single
/// endpoint; the `/<content>/<action>` paths are virtual and each carries its
/// operation's fixed `content`/`action` values in the request body schema.
pub fn render_openapi(description: &InterfaceDescription) -> Value {
    let mut tags: Vec<&str> = Vec::new();
    let mut paths = Map::new();

    for item in &description.paths {
        if !tags.contains(&item.tag.as_str()) {
            tags.push(item.tag.as_str());
        }
        paths.insert(item.path.clone(), json!({ "post": render_operation(item) }));
    }

    let tags: Vec<Value> = tags.iter().map(|name| json!({ "name": name })).collect();
    let schemas: Map<String, Value> = description
        .schemas
        .iter()
        .map(|(name, definition)| (name.clone(), render_schema(definition)))
        .collect();

    json!({
        "openapi": description.openapi,
        "info": {
            "title": description.info.title,
            "version": description.info.server_version.to_string(),
            "x-redcap-adapter": description.info.adapter,
            "x-redcap-version-range": description.info.version_range.to_string(),
            "x-redcap-features": description.info.features,
        },
        "tags": tags,
        "paths": paths,
        "components": { "schemas": schemas },
    })
}

fn render_operation(item: &PathItem) -> Value {
    let media_type = if item.parameters.iter().any(|p| p.param_type == ParamType::File) {
        "multipart/form-data"
    } else {
        "application/x-www-form-urlencoded"
    };

    let required: Vec<&str> = item
        .parameters
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();
    let properties: Map<String, Value> = item
        .parameters
        .iter()
        .map(|p| (p.name.clone(), render_parameter(p)))
        .collect();

    let mut body = Map::new();
    body.insert(
        "schema".to_string(),
        json!({ "type": "object", "required": required, "properties": properties }),
    );
    if !item.examples.is_empty() {
        let examples: Map<String, Value> = item
            .examples
            .iter()
            .enumerate()
            .map(|(i, ex)| (format!("example{}", i + 1), json!({ "value": ex.params })))
            .collect();
        body.insert("examples".to_string(), Value::Object(examples));
    }

    let mut operation = Map::new();
    operation.insert("operationId".to_string(), json!(item.operation_id));
    operation.insert("tags".to_string(), json!([item.tag]));
    operation.insert("summary".to_string(), json!(item.summary));
    if let Some(description) = &item.description {
        operation.insert("description".to_string(), json!(description));
    }
    operation.insert(
        "requestBody".to_string(),
        json!({ "required": true, "content": { media_type: body } }),
    );
    operation.insert("responses".to_string(), render_responses(item.returns));
    operation.insert("x-redcap-permissions".to_string(), json!(item.permissions));
    Value::Object(operation)
}

fn render_type(param_type: ParamType) -> Map<String, Value> {
    let (kind, format) = match param_type {
        ParamType::String => ("string", None),
        ParamType::Boolean => ("boolean", None),
        ParamType::Integer => ("integer", None),
        ParamType::Number => ("number", None),
        ParamType::Date => ("string", Some("date")),
        ParamType::Datetime => ("string", Some("date-time")),
        ParamType::Array => ("array", None),
        ParamType::File => ("string", Some("binary")),
    };

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!(kind));
    if let Some(format) = format {
        schema.insert("format".to_string(), json!(format));
    }
    if param_type == ParamType::Array {
        schema.insert("items".to_string(), json!({ "type": "string" }));
    }
    schema
}

fn render_parameter(parameter: &Parameter) -> Value {
    let mut schema = render_type(parameter.param_type);
    if let Some(description) = &parameter.description {
        schema.insert("description".to_string(), json!(description));
    }
    if let Some(pattern) = &parameter.pattern {
        schema.insert("pattern".to_string(), json!(pattern));
    }
    Value::Object(schema)
}

fn render_responses(returns: ReturnShape) -> Value {
    let success = match returns {
        ReturnShape::Formatted => json!({
            "description": "Requested data in the format named by `format`",
            "content": { "application/json": {}, "text/csv": {}, "application/xml": {} },
        }),
        ReturnShape::Count => json!({
            "description": "Number of items affected",
            "content": { "application/json": { "schema": { "type": "integer" } } },
        }),
        ReturnShape::Text => json!({
            "description": "Plain text value",
            "content": { "text/plain": { "schema": { "type": "string" } } },
        }),
        ReturnShape::Binary => json!({
            "description": "File contents",
            "content": {
                "application/octet-stream": { "schema": { "type": "string", "format": "binary" } }
            },
        }),
    };

    json!({
        "200": success,
        "400": { "description": "Invalid or missing request parameters" },
        "403": { "description": "The token's user lacks the required privileges" },
    })
}

fn render_schema(definition: &SchemaDefinition) -> Value {
    let properties: Map<String, Value> = definition
        .fields
        .iter()
        .map(|f| (f.name.clone(), Value::Object(render_type(f.field_type))))
        .collect();
    json!({
        "type": "object",
        "x-redcap-kind": definition.kind,
        "properties": properties,
    })
}
