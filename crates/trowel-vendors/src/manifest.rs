//! Vendor manifest loading.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::pattern::{GlobSet, PatternError};

/// One or more glob patterns.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Sources {
    One(String),
    Many(Vec<String>),
}

impl Sources {
    /// The patterns, in order.
    pub fn patterns(&self) -> Vec<&str> {
        match self {
            Sources::One(pattern) => vec![pattern.as_str()],
            Sources::Many(patterns) => patterns.iter().map(String::as_str).collect(),
        }
    }
}

/// A `{src, dest}` pair of a multi-file vendor.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VendorCopy {
    pub src: Sources,

    #[serde(default)]
    pub dest: String,
}

/// A single manifest entry.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Vendor {
    /// Stylesheet URL injected at the CSS placeholder
    #[serde(default)]
    pub css_link: Option<String>,

    /// Script URL injected at the JS placeholder
    #[serde(default)]
    pub js_link: Option<String>,

    /// Files to copy into the distribution folder
    #[serde(default)]
    pub src: Option<Sources>,

    /// Destination of `src`, relative to the distribution folder
    #[serde(default)]
    pub dest: Option<String>,

    /// Multi-file copies, used when `src` is absent
    #[serde(default)]
    pub srcs: Vec<VendorCopy>,
}

impl Vendor {
    /// The `<link>` tag for this vendor, if it has a stylesheet.
    pub fn css_tag(&self) -> Option<String> {
        self.css_link
            .as_ref()
            .map(|href| format!(r#"<link href="{}" rel="stylesheet">"#, href))
    }

    /// The `<script>` tag for this vendor, if it has a script.
    pub fn js_tag(&self) -> Option<String> {
        self.js_link
            .as_ref()
            .map(|src| format!(r#"<script src="{}"></script>"#, src))
    }
}

/// A resolved copy operation.
#[derive(Debug, Clone)]
pub struct CopyJob {
    /// Vendor the job came from
    pub vendor: String,

    /// Files to copy
    pub sources: GlobSet,

    /// Destination relative to the distribution folder
    pub dest: PathBuf,
}

/// Errors that can occur when loading the manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Failed to parse manifest: {0}")]
    ParseError(String),

    #[error("Invalid vendor '{vendor}': {message}")]
    InvalidVendor { vendor: String, message: String },

    #[error("Invalid pattern in vendor '{vendor}': {source}")]
    Pattern {
        vendor: String,
        #[source]
        source: PatternError,
    },
}

/// The vendor manifest, in file order.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    root: PathBuf,
    vendors: Vec<(String, Vendor)>,
}

impl Manifest {
    /// Load a manifest from disk.
    ///
    /// Relative patterns resolve against the manifest's directory. A missing
    /// file yields an empty manifest.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        if !path.exists() {
            tracing::info!("No vendor manifest at {}, skipping vendors", path.display());
            return Ok(Self {
                root,
                vendors: Vec::new(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| ManifestError::ReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let manifest = Self::from_json(&content, root)?;
        tracing::debug!(
            "Loaded {} vendors from {}",
            manifest.vendors.len(),
            path.display()
        );
        Ok(manifest)
    }

    /// Parse a manifest from JSON source.
    pub fn from_json(source: &str, root: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let entries: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(source).map_err(|e| ManifestError::ParseError(e.to_string()))?;

        let vendors = entries
            .into_iter()
            .map(|(name, value)| {
                serde_json::from_value::<Vendor>(value)
                    .map(|vendor| (name.clone(), vendor))
                    .map_err(|e| ManifestError::InvalidVendor {
                        vendor: name,
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root: root.into(),
            vendors,
        })
    }

    /// Directory that manifest paths resolve against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Vendors in manifest order.
    pub fn vendors(&self) -> impl Iterator<Item = (&str, &Vendor)> {
        self.vendors.iter().map(|(name, vendor)| (name.as_str(), vendor))
    }

    /// Number of declared vendors.
    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    /// Whether the manifest declares no vendors.
    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }

    /// One `<link>` tag per vendor with a `css_link`.
    pub fn css_tags(&self) -> Vec<String> {
        self.vendors.iter().filter_map(|(_, v)| v.css_tag()).collect()
    }

    /// One `<script>` tag per vendor with a `js_link`.
    pub fn js_tags(&self) -> Vec<String> {
        self.vendors.iter().filter_map(|(_, v)| v.js_tag()).collect()
    }

    /// Flatten `src`/`srcs` entries into copy jobs.
    pub fn copy_jobs(&self) -> Result<Vec<CopyJob>, ManifestError> {
        let mut jobs = Vec::new();

        for (name, vendor) in &self.vendors {
            let pairs: Vec<(&Sources, &str)> = match &vendor.src {
                Some(src) => vec![(src, vendor.dest.as_deref().unwrap_or_default())],
                None => vendor
                    .srcs
                    .iter()
                    .map(|copy| (&copy.src, copy.dest.as_str()))
                    .collect(),
            };

            for (sources, dest) in pairs {
                let sources =
                    GlobSet::new(sources.patterns()).map_err(|source| ManifestError::Pattern {
                        vendor: name.clone(),
                        source,
                    })?;
                jobs.push(CopyJob {
                    vendor: name.clone(),
                    sources,
                    dest: PathBuf::from(dest.trim_start_matches("./")),
                });
            }
        }

        Ok(jobs)
    }
}
