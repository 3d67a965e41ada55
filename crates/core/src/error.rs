//! Error kinds for the functional core.
//!
//! Only caller contract violations are errors: a malformed version string, a
//! version outside every registered adapter range, or an inverted range.
//! Noisy upstream source is never an error; parsers and the generator return
//! warnings alongside partial results instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::version::Version;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SpecError {
    #[error("Invalid version string '{input}': expected <major>.<minor>.<patch>")]
    VersionParse { input: String },

    #[error(
        "Unsupported REDCap version {version}: supported range is {min_supported} to {}",
        max_supported.map(|v| v.to_string()).unwrap_or_else(|| "latest".to_string())
    )]
    UnsupportedVersion {
        version: Version,
        min_supported: Version,
        max_supported: Option<Version>,
    },

    #[error("Invalid version range: max {max} is lower than min {min}")]
    InvalidRange { min: Version, max: Version },
}

pub type Result<T> = std::result::Result<T, SpecError>;
