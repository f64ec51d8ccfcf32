//! Configuration file (`trowel.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use trowel_static::{BuildConfig, FormatOptions};

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub html: FormatConfig,
    #[serde(default)]
    pub js: FormatConfig,
    #[serde(default)]
    pub css: CssConfig,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_src")]
    pub src: String,
    #[serde(default = "default_dist")]
    pub dist: String,
    #[serde(default = "default_vendors")]
    pub vendors: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            src: default_src(),
            dist: default_dist(),
            vendors: default_vendors(),
        }
    }
}

/// Beautifier overrides; unset keys keep the per-language defaults.
#[derive(Debug, Deserialize, Default)]
pub struct FormatConfig {
    pub indent_size: Option<usize>,
    pub max_preserve_newlines: Option<usize>,
}

impl FormatConfig {
    fn apply(&self, defaults: FormatOptions) -> FormatOptions {
        FormatOptions {
            indent_size: self.indent_size.unwrap_or(defaults.indent_size),
            max_preserve_newlines: self
                .max_preserve_newlines
                .unwrap_or(defaults.max_preserve_newlines),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CssConfig {
    #[serde(default = "default_browserslist")]
    pub browserslist: Vec<String>,
}

impl Default for CssConfig {
    fn default() -> Self {
        Self {
            browserslist: default_browserslist(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_open")]
    pub open: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            open: default_open(),
        }
    }
}

fn default_src() -> String {
    "src".to_string()
}
fn default_dist() -> String {
    "dist".to_string()
}
fn default_vendors() -> String {
    "vendors.json".to_string()
}
fn default_browserslist() -> Vec<String> {
    vec!["defaults".to_string()]
}
fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_open() -> bool {
    true
}

impl ConfigFile {
    /// Parse configuration from TOML source.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    /// Resolve into a build configuration rooted at `root`.
    pub fn build_config(&self, root: &Path) -> BuildConfig {
        BuildConfig {
            root: root.to_path_buf(),
            src_dir: PathBuf::from(&self.paths.src),
            output_dir: PathBuf::from(&self.paths.dist),
            vendors: PathBuf::from(&self.paths.vendors),
            html: self.html.apply(FormatOptions::HTML),
            js: self.js.apply(FormatOptions::JS),
            browserslist: self.css.browserslist.clone(),
        }
    }
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        tracing::debug!("No {}, using defaults", path.display());
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = ConfigFile::from_toml(&content)
        .with_context(|| format!("Invalid config in {}", path.display()))?;

    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// The project root: the directory holding the config file.
pub fn project_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classic_layout() {
        let config = ConfigFile::from_toml("").unwrap();
        let build = config.build_config(Path::new("."));

        assert_eq!(build.src_dir, PathBuf::from("src"));
        assert_eq!(build.output_dir, PathBuf::from("dist"));
        assert_eq!(build.vendors, PathBuf::from("vendors.json"));
        assert_eq!(build.html, FormatOptions::HTML);
        assert_eq!(build.js, FormatOptions::JS);
        assert_eq!(config.server.port, 3000);
        assert!(config.server.open);
    }

    #[test]
    fn reads_every_section() {
        let config = ConfigFile::from_toml(
            r#"
[paths]
src = "site"
dist = "public"
vendors = "config/vendors.json"

[html]
indent_size = 4

[js]
max_preserve_newlines = 3

[css]
browserslist = ["last 2 versions"]

[server]
port = 8080
open = false
"#,
        )
        .unwrap();
        let build = config.build_config(Path::new("/project"));

        assert_eq!(build.src_path(), PathBuf::from("/project/site"));
        assert_eq!(build.output_path(), PathBuf::from("/project/public"));
        assert_eq!(
            build.html,
            FormatOptions {
                indent_size: 4,
                max_preserve_newlines: 1
            }
        );
        assert_eq!(build.js.max_preserve_newlines, 3);
        assert_eq!(build.browserslist, vec!["last 2 versions".to_string()]);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.server.open);
    }

    #[test]
    fn rejects_malformed_config() {
        assert!(ConfigFile::from_toml("[server]\nport = \"high\"").is_err());
    }

    #[test]
    fn missing_config_uses_defaults() {
        let config = load_config(Path::new("/definitely/not/here/trowel.toml")).unwrap();

        assert_eq!(config.paths.dist, "dist");
    }

    #[test]
    fn root_is_config_directory() {
        assert_eq!(project_root(Path::new("trowel.toml")), PathBuf::from("."));
        assert_eq!(
            project_root(Path::new("site/trowel.toml")),
            PathBuf::from("site")
        );
    }
}
