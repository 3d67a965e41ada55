//! Three-part REDCap version identifiers
//!
//! Pure parsing, ordering and range tests. REDCap releases are always
//! `major.minor.patch`, so anything else (a `v` prefix, a fourth component,
//! pre-release suffixes) is rejected rather than guessed at.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SpecError};

/// A REDCap server version. Ordering is lexicographic on (major, minor, patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }

    /// Parse `"<digits>.<digits>.<digits>"`, ignoring surrounding whitespace.
    /// Components with a leading zero (`15.05.32`) are rejected, so any string
    /// this accepts, once trimmed, is exactly what [`format`] gives back.
    pub fn parse(text: &str) -> Result<Self> {
        Self::try_parse(text).ok_or_else(|| SpecError::VersionParse {
            input: text.to_string(),
        })
    }

    /// Non-failing variant of [`Version::parse`].
    pub fn try_parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split('.');
        let major = parse_component(parts.next()?)?;
        let minor = parse_component(parts.next()?)?;
        let patch = parse_component(parts.next()?)?;

        if parts.next().is_some() {
            return None;
        }

        Some(Version::new(major, minor, patch))
    }
}

// `u32::from_str` accepts a leading '+', so digits are checked first.
fn parse_component(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if part.len() > 1 && part.starts_with('0') {
        return None;
    }
    part.parse().ok()
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Version::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// An inclusive version range. `max: None` covers `min` and every later version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    pub min: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Version>,
}

impl VersionRange {
    /// Build a range, rejecting `max < min`.
    pub fn new(min: Version, max: Option<Version>) -> Result<Self> {
        match max {
            Some(max) if max < min => Err(SpecError::InvalidRange { min, max }),
            _ => Ok(VersionRange { min, max }),
        }
    }

    /// Const constructor for static tables. Callers are responsible for `max >= min`;
    /// the adapter table validation re-checks it.
    pub const fn bounded(min: Version, max: Version) -> Self {
        VersionRange {
            min,
            max: Some(max),
        }
    }

    pub const fn open(min: Version) -> Self {
        VersionRange { min, max: None }
    }

    pub fn contains(&self, version: &Version) -> bool {
        in_range(version, self)
    }

    pub fn is_open_ended(&self) -> bool {
        self.max.is_none()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{} - {}", self.min, max),
            None => write!(f, "{}+", self.min),
        }
    }
}

pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

pub fn in_range(version: &Version, range: &VersionRange) -> bool {
    *version >= range.min && range.max.is_none_or(|max| *version <= max)
}

pub fn format(version: &Version) -> String {
    version.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // parse tests
    // ============================================================================

    #[test]
    fn test_parse_simple() {
        assert_eq!(Version::parse("15.5.32").unwrap(), Version::new(15, 5, 32));
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(
            Version::parse("  16.0.8\n").unwrap(),
            Version::new(16, 0, 8)
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in [
            "", "15", "15.5", "15.5.32.1", "v15.5.32", "15.x.1", "15..1", "+15.5.1", "15.5.-1",
            "1 5.5.1", "15.5.32-rc1",
        ] {
            assert!(Version::parse(input).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn test_parse_error_carries_input() {
        let err = Version::parse("abc").unwrap_err();
        assert_eq!(
            err,
            SpecError::VersionParse {
                input: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!(Version::parse("4294967296.0.0").is_err());
    }

    #[test]
    fn test_try_parse_returns_none() {
        assert_eq!(Version::try_parse("not a version"), None);
        assert_eq!(Version::try_parse("14.0.0"), Some(Version::new(14, 0, 0)));
    }

    #[test]
    fn test_format_round_trip() {
        for input in ["0.0.0", "14.5.10", "15.5.32", "16.0.8", "100.20.3"] {
            assert_eq!(format(&Version::parse(input).unwrap()), input);
        }
    }

    #[test]
    fn test_parse_rejects_zero_padding() {
        for input in ["15.05.32", "015.5.32", "15.5.032", "16.00.8"] {
            assert!(Version::try_parse(input).is_none(), "{input}");
        }
        assert_eq!(Version::parse("10.0.0").unwrap(), Version::new(10, 0, 0));
    }

    #[test]
    fn test_from_str() {
        let v: Version = "14.1.2".parse().unwrap();
        assert_eq!(v, Version::new(14, 1, 2));
    }

    // ============================================================================
    // compare tests
    // ============================================================================

    #[test]
    fn test_compare_lexicographic() {
        assert_eq!(
            compare(&Version::new(15, 0, 0), &Version::new(14, 9, 99)),
            Ordering::Greater
        );
        assert_eq!(
            compare(&Version::new(15, 5, 2), &Version::new(15, 5, 10)),
            Ordering::Less
        );
        assert_eq!(
            compare(&Version::new(16, 0, 8), &Version::new(16, 0, 8)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_compare_is_transitive() {
        let versions = [
            Version::new(14, 0, 0),
            Version::new(14, 5, 10),
            Version::new(15, 0, 1),
            Version::new(15, 5, 32),
            Version::new(16, 0, 8),
        ];
        for a in &versions {
            for b in &versions {
                for c in &versions {
                    if a < b && b < c {
                        assert_eq!(compare(a, c), Ordering::Less);
                    }
                }
            }
        }
    }

    // ============================================================================
    // range tests
    // ============================================================================

    #[test]
    fn test_in_range_bounded() {
        let range = VersionRange::new(Version::new(15, 0, 0), Some(Version::new(15, 999, 999)))
            .unwrap();
        assert!(in_range(&Version::new(15, 0, 0), &range));
        assert!(in_range(&Version::new(15, 5, 32), &range));
        assert!(in_range(&Version::new(15, 999, 999), &range));
        assert!(!in_range(&Version::new(14, 9, 9), &range));
        assert!(!in_range(&Version::new(16, 0, 0), &range));
    }

    #[test]
    fn test_in_range_open_ended() {
        let range = VersionRange::open(Version::new(16, 0, 0));
        assert!(range.contains(&Version::new(16, 0, 0)));
        assert!(range.contains(&Version::new(99, 0, 0)));
        assert!(!range.contains(&Version::new(15, 999, 999)));
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        let err = VersionRange::new(Version::new(15, 0, 0), Some(Version::new(14, 0, 0)))
            .unwrap_err();
        assert!(matches!(err, SpecError::InvalidRange { .. }));
    }

    #[test]
    fn test_range_display() {
        assert_eq!(VersionRange::open(Version::new(16, 0, 0)).to_string(), "16.0.0+");
        assert_eq!(
            VersionRange::bounded(Version::new(14, 0, 0), Version::new(14, 999, 999)).to_string(),
            "14.0.0 - 14.999.999"
        );
    }

    #[test]
    fn test_version_serializes_as_string() {
        let json = serde_json::to_string(&Version::new(15, 5, 32)).unwrap();
        assert_eq!(json, "\"15.5.32\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Version::new(15, 5, 32));
        assert!(serde_json::from_str::<Version>("\"15.5\"").is_err());
    }
}
