//! Core library for redcap-spec
//!
//! This crate implements the **Functional Core** of the redcap-spec tool,
//! following the Functional Core - Imperative Shell architectural pattern.
//!
//! # Architecture Overview
//!
//! - **`redcap_spec_core`** (this crate): Pure functions with zero I/O
//! - **`redcap-spec`**: File access and orchestration (the Imperative Shell)
//!
//! Nothing in this crate reads files, logs, or touches the network. Upstream
//! source text arrives as [`parsers::SourceUnit`] values; problems in that text
//! come back as warnings next to whatever could still be extracted.
//!
//! # Module Organization
//!
//! - [`version`]: Three-part REDCap version identifiers and ranges
//! - [`adapters`]: One adapter per supported release line, and adapter selection
//! - [`catalog`]: Content types, actions, tag groups and permissions
//! - [`parsers`]: Extraction of records from upstream PHP, HTML and curl text
//! - [`generator`]: Version-scoped interface descriptions and OpenAPI rendering
//! - [`comparator`]: Structural diffs between descriptions
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use redcap_spec_core::generator::{generate_openapi_spec, GenerationOptions};
//! use redcap_spec_core::parsers::{extract_sources, SourceUnit};
//!
//! let units = vec![SourceUnit::new("API/arm/export.php", "<?php ...")];
//! let extraction = extract_sources(&units);
//!
//! let output = generate_openapi_spec("15.5.32", &extraction.records, &GenerationOptions::default())?;
//! assert_eq!(output.description.info.adapter, "v15");
//! ```

pub mod adapters;
pub mod catalog;
pub mod comparator;
pub mod error;
pub mod generator;
pub mod parsers;
pub mod version;

pub use error::{Result, SpecError};
pub use version::{Version, VersionRange};
