use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{Action, ContentType};

/// One upstream file, already read by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Path relative to the upstream source root, `/`-separated.
    pub path: String,
    /// Full text content of the file.
    pub text: String,
}

impl SourceUnit {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        SourceUnit {
            path: path.into().replace('\\', "/"),
            text: text.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
    }

    pub fn parent_dir(&self) -> Option<&str> {
        let mut parts = self.path.rsplit('/');
        parts.next()?;
        parts.next()
    }

    pub fn extension(&self) -> Option<&str> {
        self.file_name().rsplit_once('.').map(|(_, ext)| ext)
    }
}

/// A non-fatal extraction problem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParseWarning {
    pub source: String,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Best-effort parser output: whatever could be extracted plus what could not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction<T> {
    pub records: Vec<T>,
    pub warnings: Vec<ParseWarning>,
}

impl<T> Default for Extraction<T> {
    fn default() -> Self {
        Extraction {
            records: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl<T> Extraction<T> {
    pub fn warn(&mut self, source: &str, message: impl Into<String>) {
        self.warnings.push(ParseWarning {
            source: source.to_string(),
            message: message.into(),
        });
    }

    pub fn absorb(&mut self, other: Extraction<T>) {
        self.records.extend(other.records);
        self.warnings.extend(other.warnings);
    }

    /// Re-attribute every warning to `source` (e.g. the real file path).
    pub fn with_source(mut self, source: &str) -> Self {
        for warning in &mut self.warnings {
            warning.source = source.to_string();
        }
        self
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Primitive kinds a request parameter or schema field can take.
///
/// Declaration order doubles as merge precedence: when two sources disagree,
/// the later (more specific) kind wins over `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Boolean,
    Integer,
    Number,
    Date,
    Datetime,
    Array,
    File,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Date => "date",
            ParamType::Datetime => "datetime",
            ParamType::Array => "array",
            ParamType::File => "file",
        }
    }

    /// Map a PHP or documentation type name.
    pub fn from_name(name: &str) -> Option<ParamType> {
        let name = name.trim().trim_start_matches('?').to_ascii_lowercase();
        if name.ends_with("[]") {
            return Some(ParamType::Array);
        }
        match name.as_str() {
            "string" | "str" | "text" | "mixed" => Some(ParamType::String),
            "int" | "integer" => Some(ParamType::Integer),
            "float" | "double" | "number" | "numeric" | "decimal" => Some(ParamType::Number),
            "bool" | "boolean" => Some(ParamType::Boolean),
            "array" | "list" => Some(ParamType::Array),
            "file" | "binary" => Some(ParamType::File),
            "date" => Some(ParamType::Date),
            "datetime" | "\\datetime" | "timestamp" => Some(ParamType::Datetime),
            _ => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Validation regex the handler applies to the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, param_type: ParamType, required: bool) -> Self {
        Parameter {
            name: name.into(),
            param_type,
            required,
            description: None,
            pattern: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

/// One row of the `index.php` dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// The `case` label as written upstream.
    pub content_key: String,
    pub content_type: Option<ContentType>,
    pub action: Option<Action>,
    /// Included handler path.
    pub entry_point: String,
}

/// Documentation for one operation from the API help page.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HelpEntry {
    pub content_type: ContentType,
    pub action: Action,
    pub title: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
}

/// What an operation sends back on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnShape {
    /// Data rendered in the requested `format` (json, csv, xml).
    Formatted,
    /// The number of items affected.
    Count,
    /// A plain text value.
    Text,
    /// Raw file contents.
    Binary,
}

impl fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReturnShape::Formatted => "formatted",
            ReturnShape::Count => "count",
            ReturnShape::Text => "text",
            ReturnShape::Binary => "binary",
        };
        f.write_str(text)
    }
}

/// Structured description of one action handler.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionFileInfo {
    pub source: String,
    pub content_type: ContentType,
    pub action: Action,
    pub parameters: Vec<Parameter>,
    pub returns: ReturnShape,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<CurlExample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaKind {
    Project,
    UserRights,
    Class,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: ParamType,
}

/// A data shape embedded in upstream source (field list plus types).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,
    pub kind: SchemaKind,
    pub fields: Vec<SchemaField>,
}

/// An example API invocation found in documentation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurlExample {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub params: BTreeMap<String, String>,
    /// Multipart uploads: form field to local file path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
}

/// Everything extracted from an upstream source tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRecords {
    pub index: Vec<IndexEntry>,
    pub help: Vec<HelpEntry>,
    pub actions: Vec<ActionFileInfo>,
    pub schemas: Vec<SchemaDefinition>,
    pub examples: Vec<CurlExample>,
}

impl SourceRecords {
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
            && self.help.is_empty()
            && self.actions.is_empty()
            && self.schemas.is_empty()
            && self.examples.is_empty()
    }
}

/// Output of [`crate::parsers::extract_sources`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceExtraction {
    pub records: SourceRecords,
    pub warnings: Vec<ParseWarning>,
}
