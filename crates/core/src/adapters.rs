//! Release-line adapters
//!
//! One adapter per supported REDCap release line, each a version range plus the
//! feature flags that line supports. The table is plain data sorted by
//! `range.min`; selection scans it from the newest line down so that, should
//! two ranges ever overlap, the most recently declared line wins.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpecError};
use crate::version::{Version, VersionRange};

/// Highest minor/patch component of a release line. A line declared up to
/// `X.LINE_CEILING.LINE_CEILING` is contiguous with one starting at `X+1.0.0`.
pub const LINE_CEILING: u32 = u32::MAX;

pub const MIN_SUPPORTED_VERSION: Version = Version::new(14, 0, 0);
pub const LATEST_VERSION: Version = Version::new(16, 0, 8);

/// Releases the surface model has been checked against.
pub const SUPPORTED_VERSIONS: &[Version] = &[
    Version::new(14, 0, 0),
    Version::new(14, 1, 0),
    Version::new(14, 5, 10),
    Version::new(15, 0, 0),
    Version::new(15, 5, 32),
    Version::new(16, 0, 0),
    Version::new(16, 0, 8),
];

// Per-feature thresholds. Those below MIN_SUPPORTED_VERSION are historical and
// informational only; adapter selection never reads them.
pub const REPEATING_INSTRUMENTS_MIN_VERSION: Version = Version::new(8, 0, 0);
pub const DAG_MIN_VERSION: Version = Version::new(6, 0, 0);
pub const FILE_REPOSITORY_MIN_VERSION: Version = Version::new(9, 0, 0);
pub const SURVEY_QUEUE_MIN_VERSION: Version = Version::new(6, 0, 0);
pub const PROJECT_XML_MIN_VERSION: Version = Version::new(8, 0, 0);
pub const MYCAP_MIN_VERSION: Version = Version::new(13, 0, 0);
pub const ALERTS_MIN_VERSION: Version = Version::new(15, 0, 0);
pub const PROJECT_SETTINGS_MIN_VERSION: Version = Version::new(15, 0, 0);
pub const FILE_INFO_MIN_VERSION: Version = Version::new(16, 0, 0);

/// Named capabilities whose availability depends on the server version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    RepeatingInstruments,
    DataAccessGroups,
    FileRepository,
    #[serde(rename = "mycap")]
    MyCap,
    SurveyQueue,
    Alerts,
    ProjectSettings,
    FileInfo,
    ProjectXml,
}

impl Feature {
    pub const ALL: [Feature; 9] = [
        Feature::RepeatingInstruments,
        Feature::DataAccessGroups,
        Feature::FileRepository,
        Feature::MyCap,
        Feature::SurveyQueue,
        Feature::Alerts,
        Feature::ProjectSettings,
        Feature::FileInfo,
        Feature::ProjectXml,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::RepeatingInstruments => "repeating-instruments",
            Feature::DataAccessGroups => "data-access-groups",
            Feature::FileRepository => "file-repository",
            Feature::MyCap => "mycap",
            Feature::SurveyQueue => "survey-queue",
            Feature::Alerts => "alerts",
            Feature::ProjectSettings => "project-settings",
            Feature::FileInfo => "file-info",
            Feature::ProjectXml => "project-xml",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First REDCap version that shipped `feature`.
pub fn feature_min_version(feature: Feature) -> Version {
    match feature {
        Feature::RepeatingInstruments => REPEATING_INSTRUMENTS_MIN_VERSION,
        Feature::DataAccessGroups => DAG_MIN_VERSION,
        Feature::FileRepository => FILE_REPOSITORY_MIN_VERSION,
        Feature::MyCap => MYCAP_MIN_VERSION,
        Feature::SurveyQueue => SURVEY_QUEUE_MIN_VERSION,
        Feature::Alerts => ALERTS_MIN_VERSION,
        Feature::ProjectSettings => PROJECT_SETTINGS_MIN_VERSION,
        Feature::FileInfo => FILE_INFO_MIN_VERSION,
        Feature::ProjectXml => PROJECT_XML_MIN_VERSION,
    }
}

/// Feature flags for one release line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FeatureSet {
    pub repeating_instruments: bool,
    pub data_access_groups: bool,
    pub file_repository: bool,
    #[serde(rename = "mycap")]
    pub mycap: bool,
    pub survey_queue: bool,
    pub alerts: bool,
    pub project_settings: bool,
    pub file_info: bool,
    pub project_xml: bool,
}

impl FeatureSet {
    pub fn get(&self, feature: Feature) -> bool {
        match feature {
            Feature::RepeatingInstruments => self.repeating_instruments,
            Feature::DataAccessGroups => self.data_access_groups,
            Feature::FileRepository => self.file_repository,
            Feature::MyCap => self.mycap,
            Feature::SurveyQueue => self.survey_queue,
            Feature::Alerts => self.alerts,
            Feature::ProjectSettings => self.project_settings,
            Feature::FileInfo => self.file_info,
            Feature::ProjectXml => self.project_xml,
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = Feature> + '_ {
        Feature::ALL.into_iter().filter(|f| self.get(*f))
    }

    /// True when every feature enabled here is also enabled in `other`.
    pub fn is_subset_of(&self, other: &FeatureSet) -> bool {
        self.enabled().all(|f| other.get(f))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Adapter {
    pub name: &'static str,
    pub range: VersionRange,
    pub features: FeatureSet,
}

impl Adapter {
    pub fn supports(&self, feature: Feature) -> bool {
        self.features.get(feature)
    }
}

/// Supported release lines, ascending by `range.min`.
pub static ADAPTERS: [Adapter; 3] = [
    Adapter {
        name: "v14",
        range: VersionRange::bounded(
            Version::new(14, 0, 0),
            Version::new(14, LINE_CEILING, LINE_CEILING),
        ),
        features: FeatureSet {
            repeating_instruments: true,
            data_access_groups: true,
            file_repository: true,
            mycap: true,
            survey_queue: true,
            alerts: false,
            project_settings: false,
            file_info: false,
            project_xml: true,
        },
    },
    Adapter {
        name: "v15",
        range: VersionRange::bounded(
            Version::new(15, 0, 0),
            Version::new(15, LINE_CEILING, LINE_CEILING),
        ),
        features: FeatureSet {
            repeating_instruments: true,
            data_access_groups: true,
            file_repository: true,
            mycap: true,
            survey_queue: true,
            alerts: true,
            project_settings: true,
            file_info: false,
            project_xml: true,
        },
    },
    Adapter {
        name: "v16",
        range: VersionRange::open(Version::new(16, 0, 0)),
        features: FeatureSet {
            repeating_instruments: true,
            data_access_groups: true,
            file_repository: true,
            mycap: true,
            survey_queue: true,
            alerts: true,
            project_settings: true,
            file_info: true,
            project_xml: true,
        },
    },
];

/// The validated adapter table. Panics on first use if the table breaks a
/// registry invariant: that is a build defect, not a runtime condition.
pub fn registry() -> &'static [Adapter] {
    static VALIDATED: OnceLock<&'static [Adapter]> = OnceLock::new();
    VALIDATED.get_or_init(|| {
        if let Err(problems) = validate_table(&ADAPTERS) {
            panic!("invalid adapter table: {}", problems.join("; "));
        }
        &ADAPTERS[..]
    })
}

/// Check the table invariants: ascending order, exactly one open-ended line
/// (the last), no overlaps, no gaps and no feature regressions between lines.
pub fn validate_table(adapters: &[Adapter]) -> std::result::Result<(), Vec<String>> {
    let mut problems = Vec::new();

    if adapters.is_empty() {
        problems.push("no adapters registered".to_string());
        return Err(problems);
    }

    let open_ended: Vec<&str> = adapters
        .iter()
        .filter(|a| a.range.is_open_ended())
        .map(|a| a.name)
        .collect();
    if open_ended.len() != 1 {
        problems.push(format!(
            "expected exactly one open-ended adapter, found {} ({})",
            open_ended.len(),
            open_ended.join(", ")
        ));
    }

    for adapter in adapters {
        if let Some(max) = adapter.range.max {
            if max < adapter.range.min {
                problems.push(format!("{}: max {} below min {}", adapter.name, max, adapter.range.min));
            }
        }
    }

    for pair in adapters.windows(2) {
        let (older, newer) = (&pair[0], &pair[1]);

        if newer.range.min <= older.range.min {
            problems.push(format!("{} is not sorted after {}", newer.name, older.name));
            continue;
        }

        match older.range.max {
            None => problems.push(format!(
                "{} is open-ended but {} follows it",
                older.name, newer.name
            )),
            Some(max) if newer.range.min <= max => problems.push(format!(
                "{} overlaps {} at {}",
                older.name, newer.name, newer.range.min
            )),
            Some(max) if successor(&max) != Some(newer.range.min) => problems.push(format!(
                "gap between {} (ends {}) and {} (starts {})",
                older.name, max, newer.name, newer.range.min
            )),
            Some(_) => {}
        }

        if !older.features.is_subset_of(&newer.features) {
            let lost: Vec<&str> = older
                .features
                .enabled()
                .filter(|f| !newer.features.get(*f))
                .map(|f| f.as_str())
                .collect();
            problems.push(format!(
                "{} drops features enabled in {}: {}",
                newer.name,
                older.name,
                lost.join(", ")
            ));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

/// Next representable version; `None` past `u32::MAX.u32::MAX.u32::MAX`.
fn successor(version: &Version) -> Option<Version> {
    if let Some(patch) = version.patch.checked_add(1) {
        Some(Version::new(version.major, version.minor, patch))
    } else if let Some(minor) = version.minor.checked_add(1) {
        Some(Version::new(version.major, minor, 0))
    } else {
        version.major.checked_add(1).map(|major| Version::new(major, 0, 0))
    }
}

/// Overall (min, max) across a table; max is `None` when any range is open.
pub fn supported_bounds(adapters: &[Adapter]) -> (Version, Option<Version>) {
    let min = adapters
        .iter()
        .map(|a| a.range.min)
        .min()
        .unwrap_or(MIN_SUPPORTED_VERSION);
    let max = adapters
        .iter()
        .map(|a| a.range.max)
        .try_fold(Version::new(0, 0, 0), |acc, max| max.map(|m| acc.max(m)));
    (min, max)
}

/// Select from an arbitrary table: highest `min` first, first containing range wins.
pub fn select_adapter_in<'a>(adapters: &'a [Adapter], version: &Version) -> Result<&'a Adapter> {
    let mut candidates: Vec<&Adapter> = adapters.iter().collect();
    candidates.sort_by(|a, b| b.range.min.cmp(&a.range.min));

    candidates
        .into_iter()
        .find(|a| a.range.contains(version))
        .ok_or_else(|| {
            let (min_supported, max_supported) = supported_bounds(adapters);
            SpecError::UnsupportedVersion {
                version: *version,
                min_supported,
                max_supported,
            }
        })
}

pub fn select_adapter(version: &Version) -> Result<&'static Adapter> {
    select_adapter_in(registry(), version)
}

pub fn adapter_by_name(name: &str) -> Option<&'static Adapter> {
    registry().iter().find(|a| a.name == name)
}

/// The open-ended "current" release line.
pub fn latest_adapter() -> &'static Adapter {
    // registry() guarantees exactly one open-ended adapter, and it is last.
    &registry()[registry().len() - 1]
}

/// Greatest-min adapter in `adapters` whose line starts at or below `version`.
pub fn nearest_lower_adapter_in<'a>(adapters: &'a [Adapter], version: &Version) -> Option<&'a Adapter> {
    adapters
        .iter()
        .filter(|a| a.range.min <= *version)
        .max_by_key(|a| a.range.min)
}

pub fn nearest_lower_adapter(version: &Version) -> Option<&'static Adapter> {
    nearest_lower_adapter_in(registry(), version)
}

pub fn is_version_supported(version: &Version) -> bool {
    select_adapter(version).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(name: &'static str, min: Version, max: Option<Version>, features: FeatureSet) -> Adapter {
        Adapter {
            name,
            range: VersionRange { min, max },
            features,
        }
    }

    // ============================================================================
    // table invariants
    // ============================================================================

    #[test]
    fn test_registry_table_is_valid() {
        assert_eq!(validate_table(&ADAPTERS), Ok(()));
        assert_eq!(registry().len(), 3);
    }

    #[test]
    fn test_validate_rejects_two_open_ended() {
        let table = [
            adapter("a", Version::new(1, 0, 0), None, FeatureSet::default()),
            adapter("b", Version::new(2, 0, 0), None, FeatureSet::default()),
        ];
        let problems = validate_table(&table).unwrap_err();
        assert!(problems.iter().any(|p| p.contains("exactly one open-ended")));
    }

    #[test]
    fn test_validate_rejects_gap() {
        let table = [
            adapter("a", Version::new(1, 0, 0), Some(Version::new(1, 5, 0)), FeatureSet::default()),
            adapter("b", Version::new(2, 0, 0), None, FeatureSet::default()),
        ];
        let problems = validate_table(&table).unwrap_err();
        assert!(problems.iter().any(|p| p.contains("gap between a")));
    }

    #[test]
    fn test_validate_rejects_gap_past_three_digit_minor() {
        let table = [
            adapter("a", Version::new(1, 0, 0), Some(Version::new(1, 999, 999)), FeatureSet::default()),
            adapter("b", Version::new(2, 0, 0), None, FeatureSet::default()),
        ];
        let problems = validate_table(&table).unwrap_err();
        assert!(problems.iter().any(|p| p.contains("gap between a")));
    }

    #[test]
    fn test_successor_carries_and_saturates() {
        assert_eq!(successor(&Version::new(1, 2, 3)), Some(Version::new(1, 2, 4)));
        assert_eq!(successor(&Version::new(1, 2, u32::MAX)), Some(Version::new(1, 3, 0)));
        assert_eq!(successor(&Version::new(1, u32::MAX, u32::MAX)), Some(Version::new(2, 0, 0)));
        assert_eq!(successor(&Version::new(u32::MAX, u32::MAX, u32::MAX)), None);
    }

    #[test]
    fn test_validate_rejects_feature_regression() {
        let with_alerts = FeatureSet {
            alerts: true,
            ..FeatureSet::default()
        };
        let table = [
            adapter(
                "a",
                Version::new(1, 0, 0),
                Some(Version::new(1, LINE_CEILING, LINE_CEILING)),
                with_alerts,
            ),
            adapter("b", Version::new(2, 0, 0), None, FeatureSet::default()),
        ];
        let problems = validate_table(&table).unwrap_err();
        assert!(problems.iter().any(|p| p.contains("drops features") && p.contains("alerts")));
    }

    #[test]
    fn test_feature_monotonicity_across_registry() {
        for pair in registry().windows(2) {
            assert!(
                pair[0].features.is_subset_of(&pair[1].features),
                "{} regresses features of {}",
                pair[1].name,
                pair[0].name
            );
        }
    }

    #[test]
    fn test_feature_monotonicity_over_supported_versions() {
        for (i, v1) in SUPPORTED_VERSIONS.iter().enumerate() {
            for v2 in &SUPPORTED_VERSIONS[i + 1..] {
                let f1 = select_adapter(v1).unwrap().features;
                let f2 = select_adapter(v2).unwrap().features;
                for feature in Feature::ALL {
                    if f1.get(feature) {
                        assert!(f2.get(feature), "{feature} lost between {v1} and {v2}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_thresholds_agree_with_adapters() {
        for feature in Feature::ALL {
            let threshold = feature_min_version(feature);
            if threshold < MIN_SUPPORTED_VERSION {
                // Historical: every supported line has it.
                assert!(registry().iter().all(|a| a.supports(feature)), "{feature}");
            } else {
                let at = select_adapter(&threshold).unwrap();
                assert!(at.supports(feature), "{feature} missing at {threshold}");
                for below in registry().iter().filter(|a| a.range.min < threshold) {
                    assert!(!below.supports(feature), "{feature} present in {}", below.name);
                }
            }
        }
    }

    #[test]
    fn test_supported_versions_are_supported() {
        for v in SUPPORTED_VERSIONS {
            assert!(is_version_supported(v), "{v}");
        }
        assert_eq!(SUPPORTED_VERSIONS.first(), Some(&MIN_SUPPORTED_VERSION));
        assert_eq!(SUPPORTED_VERSIONS.last(), Some(&LATEST_VERSION));
    }

    // ============================================================================
    // selection
    // ============================================================================

    #[test]
    fn test_select_v15() {
        let adapter = select_adapter(&Version::parse("15.5.32").unwrap()).unwrap();
        assert_eq!(adapter.name, "v15");
        assert!(adapter.features.project_settings);
        assert!(!adapter.features.file_info);
    }

    #[test]
    fn test_select_boundaries() {
        assert_eq!(select_adapter(&Version::new(14, 0, 0)).unwrap().name, "v14");
        assert_eq!(select_adapter(&Version::new(14, 999, 999)).unwrap().name, "v14");
        assert_eq!(select_adapter(&Version::new(14, u32::MAX, u32::MAX)).unwrap().name, "v14");
        assert_eq!(select_adapter(&Version::new(15, 0, 0)).unwrap().name, "v15");
        assert_eq!(select_adapter(&Version::new(16, 0, 0)).unwrap().name, "v16");
        assert_eq!(select_adapter(&Version::new(42, 1, 1)).unwrap().name, "v16");
    }

    #[test]
    fn test_select_covers_wide_minor_components() {
        let v14 = Version::parse("14.1000.0").unwrap();
        assert!(is_version_supported(&v14));
        assert_eq!(select_adapter(&v14).unwrap().name, "v14");
        assert_eq!(select_adapter(&Version::parse("15.4294967295.0").unwrap()).unwrap().name, "v15");
        assert_eq!(select_adapter(&Version::parse("15.5.1000").unwrap()).unwrap().name, "v15");
    }

    #[test]
    fn test_select_is_deterministic() {
        let v = Version::new(16, 0, 8);
        let first = select_adapter(&v).unwrap();
        let second = select_adapter(&v).unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_select_unsupported_reports_bounds() {
        let err = select_adapter(&Version::new(13, 9, 9)).unwrap_err();
        assert_eq!(
            err,
            SpecError::UnsupportedVersion {
                version: Version::new(13, 9, 9),
                min_supported: Version::new(14, 0, 0),
                max_supported: None,
            }
        );
        assert!(!is_version_supported(&Version::new(13, 9, 9)));
    }

    #[test]
    fn test_select_unsupported_bounded_table() {
        let table = [adapter(
            "only",
            Version::new(1, 0, 0),
            Some(Version::new(1, 2, 0)),
            FeatureSet::default(),
        )];
        let err = select_adapter_in(&table, &Version::new(2, 0, 0)).unwrap_err();
        assert!(matches!(
            err,
            SpecError::UnsupportedVersion {
                max_supported: Some(max),
                ..
            } if max == Version::new(1, 2, 0)
        ));
    }

    #[test]
    fn test_select_overlap_prefers_greatest_min() {
        let table = [
            adapter("old", Version::new(1, 0, 0), Some(Version::new(3, 0, 0)), FeatureSet::default()),
            adapter("new", Version::new(2, 0, 0), None, FeatureSet::default()),
        ];
        assert_eq!(select_adapter_in(&table, &Version::new(2, 5, 0)).unwrap().name, "new");
        assert_eq!(select_adapter_in(&table, &Version::new(1, 5, 0)).unwrap().name, "old");
    }

    #[test]
    fn test_adapter_by_name() {
        assert_eq!(adapter_by_name("v14").map(|a| a.name), Some("v14"));
        assert!(adapter_by_name("v13").is_none());
    }

    #[test]
    fn test_latest_adapter_is_open_ended() {
        let latest = latest_adapter();
        assert_eq!(latest.name, "v16");
        assert!(latest.range.is_open_ended());
    }

    #[test]
    fn test_nearest_lower_adapter() {
        assert_eq!(
            nearest_lower_adapter(&Version::new(15, 2, 0)).map(|a| a.name),
            Some("v15")
        );
        assert!(nearest_lower_adapter(&Version::new(13, 0, 0)).is_none());
    }

    #[test]
    fn test_feature_set_serializes_kebab_case() {
        let json = serde_json::to_value(ADAPTERS[2].features).unwrap();
        assert_eq!(json["file-info"], serde_json::json!(true));
        assert_eq!(json["mycap"], serde_json::json!(true));
        assert_eq!(json["repeating-instruments"], serde_json::json!(true));
    }
}
