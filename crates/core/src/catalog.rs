//! Static tables describing the REDCap API surface
//!
//! Which content types exist, which actions each supports, which feature flag
//! gates them, how they group for documentation, and which user permissions an
//! operation needs. Everything here is a compile-time table; version-specific
//! answers come from combining these tables with the adapter registry.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::adapters::{select_adapter, Adapter, Feature};
use crate::error::Result;
use crate::version::Version;

/// A REDCap API resource category, the `content` request parameter.
///
/// Declaration order is documentation order within a tag group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "record")]
    Record,
    #[serde(rename = "generateNextRecordName")]
    GenerateNextRecordName,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "fileInfo")]
    FileInfo,
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "metadata")]
    Metadata,
    #[serde(rename = "instrument")]
    Instrument,
    #[serde(rename = "exportFieldNames")]
    ExportFieldNames,
    #[serde(rename = "formEventMapping")]
    FormEventMapping,
    #[serde(rename = "repeatingFormsEvents")]
    RepeatingFormsEvents,
    #[serde(rename = "project")]
    Project,
    #[serde(rename = "project_settings")]
    ProjectSettings,
    #[serde(rename = "project_xml")]
    ProjectXml,
    #[serde(rename = "version")]
    Version,
    #[serde(rename = "log")]
    Log,
    #[serde(rename = "alerts")]
    Alert,
    #[serde(rename = "arm")]
    Arm,
    #[serde(rename = "event")]
    Event,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "userRole")]
    UserRole,
    #[serde(rename = "userRoleMapping")]
    UserRoleMapping,
    #[serde(rename = "dag")]
    Dag,
    #[serde(rename = "userDagMapping")]
    UserDagMapping,
    #[serde(rename = "fileRepository")]
    FileRepository,
    #[serde(rename = "participantList")]
    ParticipantList,
    #[serde(rename = "surveyLink")]
    SurveyLink,
    #[serde(rename = "surveyQueueLink")]
    SurveyQueueLink,
    #[serde(rename = "surveyReturnCode")]
    SurveyReturnCode,
    #[serde(rename = "report")]
    Report,
    #[serde(rename = "mycap")]
    MyCap,
}

impl ContentType {
    pub const ALL: [ContentType; 30] = [
        ContentType::Record,
        ContentType::GenerateNextRecordName,
        ContentType::File,
        ContentType::FileInfo,
        ContentType::Pdf,
        ContentType::Metadata,
        ContentType::Instrument,
        ContentType::ExportFieldNames,
        ContentType::FormEventMapping,
        ContentType::RepeatingFormsEvents,
        ContentType::Project,
        ContentType::ProjectSettings,
        ContentType::ProjectXml,
        ContentType::Version,
        ContentType::Log,
        ContentType::Alert,
        ContentType::Arm,
        ContentType::Event,
        ContentType::User,
        ContentType::UserRole,
        ContentType::UserRoleMapping,
        ContentType::Dag,
        ContentType::UserDagMapping,
        ContentType::FileRepository,
        ContentType::ParticipantList,
        ContentType::SurveyLink,
        ContentType::SurveyQueueLink,
        ContentType::SurveyReturnCode,
        ContentType::Report,
        ContentType::MyCap,
    ];

    /// Canonical wire value of the `content` parameter.
    pub fn key(&self) -> &'static str {
        match self {
            ContentType::Record => "record",
            ContentType::GenerateNextRecordName => "generateNextRecordName",
            ContentType::File => "file",
            ContentType::FileInfo => "fileInfo",
            ContentType::Pdf => "pdf",
            ContentType::Metadata => "metadata",
            ContentType::Instrument => "instrument",
            ContentType::ExportFieldNames => "exportFieldNames",
            ContentType::FormEventMapping => "formEventMapping",
            ContentType::RepeatingFormsEvents => "repeatingFormsEvents",
            ContentType::Project => "project",
            ContentType::ProjectSettings => "project_settings",
            ContentType::ProjectXml => "project_xml",
            ContentType::Version => "version",
            ContentType::Log => "log",
            ContentType::Alert => "alerts",
            ContentType::Arm => "arm",
            ContentType::Event => "event",
            ContentType::User => "user",
            ContentType::UserRole => "userRole",
            ContentType::UserRoleMapping => "userRoleMapping",
            ContentType::Dag => "dag",
            ContentType::UserDagMapping => "userDagMapping",
            ContentType::FileRepository => "fileRepository",
            ContentType::ParticipantList => "participantList",
            ContentType::SurveyLink => "surveyLink",
            ContentType::SurveyQueueLink => "surveyQueueLink",
            ContentType::SurveyReturnCode => "surveyReturnCode",
            ContentType::Report => "report",
            ContentType::MyCap => "mycap",
        }
    }

    /// Human-readable noun used in generated summaries.
    pub fn label(&self) -> &'static str {
        match self {
            ContentType::Record => "Records",
            ContentType::GenerateNextRecordName => "Next Record Name",
            ContentType::File => "File",
            ContentType::FileInfo => "File Info",
            ContentType::Pdf => "PDF",
            ContentType::Metadata => "Metadata (Data Dictionary)",
            ContentType::Instrument => "Instruments",
            ContentType::ExportFieldNames => "Export Field Names",
            ContentType::FormEventMapping => "Instrument-Event Mappings",
            ContentType::RepeatingFormsEvents => "Repeating Instruments and Events",
            ContentType::Project => "Project Info",
            ContentType::ProjectSettings => "Project Settings",
            ContentType::ProjectXml => "Project XML",
            ContentType::Version => "REDCap Version",
            ContentType::Log => "Logging",
            ContentType::Alert => "Alerts",
            ContentType::Arm => "Arms",
            ContentType::Event => "Events",
            ContentType::User => "Users",
            ContentType::UserRole => "User Roles",
            ContentType::UserRoleMapping => "User-Role Assignments",
            ContentType::Dag => "Data Access Groups",
            ContentType::UserDagMapping => "User-DAG Assignments",
            ContentType::FileRepository => "File Repository",
            ContentType::ParticipantList => "Survey Participants",
            ContentType::SurveyLink => "Survey Link",
            ContentType::SurveyQueueLink => "Survey Queue Link",
            ContentType::SurveyReturnCode => "Survey Return Code",
            ContentType::Report => "Reports",
            ContentType::MyCap => "MyCap Participants",
        }
    }

    /// Feature flag that must be enabled for the type to exist at all.
    pub fn gate(&self) -> Option<Feature> {
        match self {
            ContentType::FileInfo => Some(Feature::FileInfo),
            ContentType::RepeatingFormsEvents => Some(Feature::RepeatingInstruments),
            ContentType::ProjectSettings => Some(Feature::ProjectSettings),
            ContentType::ProjectXml => Some(Feature::ProjectXml),
            ContentType::Alert => Some(Feature::Alerts),
            ContentType::Dag | ContentType::UserDagMapping => Some(Feature::DataAccessGroups),
            ContentType::FileRepository => Some(Feature::FileRepository),
            ContentType::SurveyQueueLink => Some(Feature::SurveyQueue),
            ContentType::MyCap => Some(Feature::MyCap),
            _ => None,
        }
    }

    pub fn tag_group(&self) -> TagGroup {
        match self {
            ContentType::Record
            | ContentType::GenerateNextRecordName
            | ContentType::File
            | ContentType::FileInfo
            | ContentType::Pdf => TagGroup::Records,
            ContentType::Metadata
            | ContentType::Instrument
            | ContentType::ExportFieldNames
            | ContentType::FormEventMapping
            | ContentType::RepeatingFormsEvents => TagGroup::Metadata,
            ContentType::Project
            | ContentType::ProjectSettings
            | ContentType::ProjectXml
            | ContentType::Version
            | ContentType::Log
            | ContentType::Alert => TagGroup::Project,
            ContentType::Arm | ContentType::Event => TagGroup::EventsAndArms,
            ContentType::User
            | ContentType::UserRole
            | ContentType::UserRoleMapping
            | ContentType::Dag
            | ContentType::UserDagMapping => TagGroup::UsersAndAccess,
            ContentType::FileRepository => TagGroup::Files,
            ContentType::ParticipantList
            | ContentType::SurveyLink
            | ContentType::SurveyQueueLink
            | ContentType::SurveyReturnCode => TagGroup::Surveys,
            ContentType::Report => TagGroup::Reports,
            ContentType::MyCap => TagGroup::MyCap,
        }
    }

    /// Actions the type supports in any release.
    pub fn actions(&self) -> &'static [Action] {
        use Action::*;
        match self {
            ContentType::Record => &[Export, Import, Delete, Rename, Randomize],
            ContentType::File => &[Export, Import, Delete],
            ContentType::FileRepository => &[Export, Import, Delete, List, CreateFolder],
            ContentType::Dag => &[Export, Import, Delete, Switch],
            ContentType::Arm | ContentType::Event | ContentType::User | ContentType::UserRole => {
                &[Export, Import, Delete]
            }
            ContentType::Metadata
            | ContentType::FormEventMapping
            | ContentType::RepeatingFormsEvents
            | ContentType::Project
            | ContentType::UserRoleMapping
            | ContentType::UserDagMapping => &[Export, Import],
            ContentType::ProjectSettings => &[Import],
            ContentType::GenerateNextRecordName
            | ContentType::FileInfo
            | ContentType::Pdf
            | ContentType::Instrument
            | ContentType::ExportFieldNames
            | ContentType::ProjectXml
            | ContentType::Version
            | ContentType::Log
            | ContentType::Alert
            | ContentType::ParticipantList
            | ContentType::SurveyLink
            | ContentType::SurveyQueueLink
            | ContentType::SurveyReturnCode
            | ContentType::Report
            | ContentType::MyCap => &[Export],
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// The `action` request parameter. REDCap treats a missing action as `export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Export,
    Import,
    Delete,
    Rename,
    Randomize,
    Switch,
    List,
    CreateFolder,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::Export,
        Action::Import,
        Action::Delete,
        Action::Rename,
        Action::Randomize,
        Action::Switch,
        Action::List,
        Action::CreateFolder,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Action::Export => "export",
            Action::Import => "import",
            Action::Delete => "delete",
            Action::Rename => "rename",
            Action::Randomize => "randomize",
            Action::Switch => "switch",
            Action::List => "list",
            Action::CreateFolder => "createFolder",
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Action::Export => "Export",
            Action::Import => "Import",
            Action::Delete => "Delete",
            Action::Rename => "Rename",
            Action::Randomize => "Randomize",
            Action::Switch => "Switch",
            Action::List => "List",
            Action::CreateFolder => "Create Folder in",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A (content type, action) pair: one callable API operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    pub content: ContentType,
    pub action: Action,
}

impl Operation {
    pub fn new(content: ContentType, action: Action) -> Self {
        Operation { content, action }
    }

    /// Path identifier used in generated descriptions: `/<content>/<action>`.
    pub fn path(&self) -> String {
        format!("/{}/{}", self.content.key(), self.action.key())
    }

    pub fn operation_id(&self) -> String {
        format!("{}_{}", self.action.key(), self.content.key())
    }

    /// Documentation order: tag group, then content type, then action.
    pub fn sort_key(&self) -> (TagGroup, ContentType, Action) {
        (self.content.tag_group(), self.content, self.action)
    }
}

impl PartialOrd for Operation {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Operation {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.content.key(), self.action.key())
    }
}

/// Documentation clusters. Declaration order is output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TagGroup {
    Records,
    Metadata,
    Project,
    EventsAndArms,
    UsersAndAccess,
    Files,
    Surveys,
    Reports,
    MyCap,
}

impl TagGroup {
    pub const ALL: [TagGroup; 9] = [
        TagGroup::Records,
        TagGroup::Metadata,
        TagGroup::Project,
        TagGroup::EventsAndArms,
        TagGroup::UsersAndAccess,
        TagGroup::Files,
        TagGroup::Surveys,
        TagGroup::Reports,
        TagGroup::MyCap,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TagGroup::Records => "Records",
            TagGroup::Metadata => "Metadata",
            TagGroup::Project => "Project",
            TagGroup::EventsAndArms => "Events & Arms",
            TagGroup::UsersAndAccess => "Users & Access",
            TagGroup::Files => "Files",
            TagGroup::Surveys => "Surveys",
            TagGroup::Reports => "Reports",
            TagGroup::MyCap => "MyCap",
        }
    }

    pub fn from_name(name: &str) -> Option<TagGroup> {
        TagGroup::ALL.into_iter().find(|g| g.name() == name)
    }
}

impl fmt::Display for TagGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// User-rights privileges an API token's owner must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    ApiExport,
    ApiImport,
    RecordCreate,
    RecordDelete,
    RecordRename,
    Randomize,
    Design,
    ProjectSetup,
    UserRights,
    DataAccessGroups,
    FileRepository,
    Logging,
    Reports,
    #[serde(rename = "mycap")]
    MyCap,
    Alerts,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ApiExport => "api-export",
            Permission::ApiImport => "api-import",
            Permission::RecordCreate => "record-create",
            Permission::RecordDelete => "record-delete",
            Permission::RecordRename => "record-rename",
            Permission::Randomize => "randomize",
            Permission::Design => "design",
            Permission::ProjectSetup => "project-setup",
            Permission::UserRights => "user-rights",
            Permission::DataAccessGroups => "data-access-groups",
            Permission::FileRepository => "file-repository",
            Permission::Logging => "logging",
            Permission::Reports => "reports",
            Permission::MyCap => "mycap",
            Permission::Alerts => "alerts",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions that arrived partway through a supported release line.
const ACTION_INTRODUCED: &[(ContentType, Action, Version)] = &[
    (ContentType::Record, Action::Randomize, Version::new(14, 1, 0)),
    (ContentType::FileRepository, Action::CreateFolder, Version::new(14, 0, 0)),
];

/// Additional spellings seen in upstream source, already normalized.
const CONTENT_SYNONYMS: &[(&str, ContentType)] = &[
    ("records", ContentType::Record),
    ("data", ContentType::Record),
    ("datadictionary", ContentType::Metadata),
    ("dictionary", ContentType::Metadata),
    ("fieldnames", ContentType::ExportFieldNames),
    ("instrumenteventmapping", ContentType::FormEventMapping),
    ("instruments", ContentType::Instrument),
    ("forms", ContentType::Instrument),
    ("dags", ContentType::Dag),
    ("projectinfo", ContentType::Project),
    ("participants", ContentType::ParticipantList),
    ("users", ContentType::User),
    ("userroles", ContentType::UserRole),
    ("logging", ContentType::Log),
    ("reports", ContentType::Report),
    ("arms", ContentType::Arm),
    ("events", ContentType::Event),
    ("alert", ContentType::Alert),
    ("redcapversion", ContentType::Version),
];

const ACTION_SYNONYMS: &[(&str, Action)] = &[
    ("exp", Action::Export),
    ("imp", Action::Import),
    ("del", Action::Delete),
    ("mkdir", Action::CreateFolder),
];

fn normalize_key(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalize a raw `content` value (case, separators, synonyms) to its type.
pub fn map_content_key_to_type(raw: &str) -> Option<ContentType> {
    let key = normalize_key(raw);
    if key.is_empty() {
        return None;
    }

    ContentType::ALL
        .into_iter()
        .find(|ct| normalize_key(ct.key()) == key)
        .or_else(|| {
            CONTENT_SYNONYMS
                .iter()
                .find(|(synonym, _)| *synonym == key)
                .map(|(_, ct)| *ct)
        })
}

pub fn map_action_key(raw: &str) -> Option<Action> {
    let key = normalize_key(raw);
    Action::ALL
        .into_iter()
        .find(|a| normalize_key(a.key()) == key)
        .or_else(|| {
            ACTION_SYNONYMS
                .iter()
                .find(|(synonym, _)| *synonym == key)
                .map(|(_, a)| *a)
        })
}

/// Content types enabled under `adapter`'s feature set.
pub fn content_types_for_adapter(adapter: &Adapter) -> BTreeSet<ContentType> {
    ContentType::ALL
        .into_iter()
        .filter(|ct| ct.gate().is_none_or(|f| adapter.supports(f)))
        .collect()
}

pub fn content_types_for_version(version: &Version) -> Result<BTreeSet<ContentType>> {
    Ok(content_types_for_adapter(select_adapter(version)?))
}

/// False for unsupported versions as well as gated-off types.
pub fn is_content_type_available(version: &Version, content: ContentType) -> bool {
    content_types_for_version(version)
        .map(|types| types.contains(&content))
        .unwrap_or(false)
}

pub fn actions_for_content_type(content: ContentType) -> BTreeSet<Action> {
    content.actions().iter().copied().collect()
}

pub fn is_action_available(content: ContentType, action: Action) -> bool {
    content.actions().contains(&action)
}

fn action_introduced(content: ContentType, action: Action) -> Option<Version> {
    ACTION_INTRODUCED
        .iter()
        .find(|(c, a, _)| *c == content && *a == action)
        .map(|(_, _, v)| *v)
}

/// Operations callable on a server at `version` whose feature set is `adapter`'s,
/// in documentation order.
pub fn operations_for_adapter(adapter: &Adapter, version: &Version) -> Vec<Operation> {
    let mut operations: Vec<Operation> = content_types_for_adapter(adapter)
        .into_iter()
        .flat_map(|content| {
            content
                .actions()
                .iter()
                .filter(move |action| {
                    action_introduced(content, **action).is_none_or(|since| *version >= since)
                })
                .map(move |action| Operation::new(content, *action))
        })
        .collect();
    operations.sort();
    operations
}

/// Structural actions intersected with version-specific availability.
pub fn actions_for_version(version: &Version, content: ContentType) -> Result<BTreeSet<Action>> {
    let adapter = select_adapter(version)?;
    Ok(operations_for_adapter(adapter, version)
        .into_iter()
        .filter(|op| op.content == content)
        .map(|op| op.action)
        .collect())
}

/// Every operation in the catalog regardless of version, in documentation order.
pub fn all_operations() -> Vec<Operation> {
    let mut operations: Vec<Operation> = ContentType::ALL
        .into_iter()
        .flat_map(|content| {
            content
                .actions()
                .iter()
                .map(move |action| Operation::new(content, *action))
        })
        .collect();
    operations.sort();
    operations
}

pub fn tag_group(content: ContentType) -> TagGroup {
    content.tag_group()
}

pub fn content_types_in_group(group: TagGroup) -> BTreeSet<ContentType> {
    ContentType::ALL
        .into_iter()
        .filter(|ct| ct.tag_group() == group)
        .collect()
}

/// Baseline API privilege for an action.
pub fn map_permission(action: Action) -> Permission {
    match action {
        Action::Export | Action::List | Action::Switch => Permission::ApiExport,
        Action::Import
        | Action::Delete
        | Action::Rename
        | Action::Randomize
        | Action::CreateFolder => Permission::ApiImport,
    }
}

/// Full privilege set for an operation: the baseline plus content-specific rights.
pub fn required_permissions(content: ContentType, action: Action) -> BTreeSet<Permission> {
    let mut permissions = BTreeSet::from([map_permission(action)]);
    let writes = matches!(action, Action::Import | Action::Delete);

    let extra = match (content, action) {
        (ContentType::Record, Action::Import) => Some(Permission::RecordCreate),
        (ContentType::Record, Action::Delete) => Some(Permission::RecordDelete),
        (ContentType::Record, Action::Rename) => Some(Permission::RecordRename),
        (ContentType::Record, Action::Randomize) => Some(Permission::Randomize),
        (
            ContentType::Metadata
            | ContentType::Arm
            | ContentType::Event
            | ContentType::FormEventMapping
            | ContentType::RepeatingFormsEvents
            | ContentType::ProjectSettings,
            _,
        ) if writes => Some(Permission::Design),
        (ContentType::User | ContentType::UserRole | ContentType::UserRoleMapping, _)
            if writes =>
        {
            Some(Permission::UserRights)
        }
        (ContentType::Dag | ContentType::UserDagMapping, _) if writes => {
            Some(Permission::DataAccessGroups)
        }
        (ContentType::FileRepository, _) => Some(Permission::FileRepository),
        (ContentType::Log, _) => Some(Permission::Logging),
        (ContentType::Report, _) => Some(Permission::Reports),
        (ContentType::MyCap, _) => Some(Permission::MyCap),
        (ContentType::Alert, _) => Some(Permission::Alerts),
        (ContentType::ProjectXml, _) | (ContentType::Project, Action::Import) => {
            Some(Permission::ProjectSetup)
        }
        _ => None,
    };

    permissions.extend(extra);
    permissions
}
