//! Vendor manifest handling for trowel.
//!
//! This crate loads the declarative vendor manifest (`vendors.json`), expands
//! the glob patterns it names, and splices vendor `<link>`/`<script>` tags into
//! HTML placeholders.

pub mod inject;
pub mod manifest;
pub mod pattern;

pub use inject::{inject_vendor_tags, CSS_PLACEHOLDER, JS_PLACEHOLDER};
pub use manifest::{CopyJob, Manifest, ManifestError, Sources, Vendor, VendorCopy};
pub use pattern::{GlobMatch, GlobPattern, GlobSet, PatternError};
