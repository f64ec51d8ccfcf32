//! Static site builder.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;

use trowel_vendors::{inject_vendor_tags, GlobMatch, Manifest, ManifestError, PatternError};

use crate::assets::AssetPipeline;
use crate::format::{format_html, FormatOptions};
use crate::rules::{SourceRules, Task};
use crate::templates::TemplateEngine;

/// Configuration for building a site.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Project root; relative paths below resolve against it
    pub root: PathBuf,

    /// Source directory
    pub src_dir: PathBuf,

    /// Output directory, emptied on every full build
    pub output_dir: PathBuf,

    /// Vendor manifest path
    pub vendors: PathBuf,

    /// HTML beautifier settings
    pub html: FormatOptions,

    /// JavaScript beautifier settings
    pub js: FormatOptions,

    /// Browsers targeted by autoprefixing
    pub browserslist: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            src_dir: PathBuf::from("src"),
            output_dir: PathBuf::from("dist"),
            vendors: PathBuf::from("vendors.json"),
            html: FormatOptions::HTML,
            js: FormatOptions::JS,
            browserslist: vec!["defaults".to_string()],
        }
    }
}

impl BuildConfig {
    pub fn src_path(&self) -> PathBuf {
        self.root.join(&self.src_dir)
    }

    pub fn output_path(&self) -> PathBuf {
        self.root.join(&self.output_dir)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(&self.vendors)
    }
}

/// Outcome of a single task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub task: Task,

    /// Files written
    pub files: usize,

    /// Inputs that failed and were skipped
    pub errors: usize,

    pub duration_ms: u64,
}

/// Result of a full build.
#[derive(Debug)]
pub struct BuildResult {
    /// Per-task reports, in `Task::ALL` order
    pub tasks: Vec<TaskReport>,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

impl BuildResult {
    pub fn files(&self) -> usize {
        self.tasks.iter().map(|t| t.files).sum()
    }

    pub fn errors(&self) -> usize {
        self.tasks.iter().map(|t| t.errors).sum()
    }
}

/// Errors that can occur during build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to read source: {0}")]
    ReadError(String),

    #[error("Failed to write output: {0}")]
    WriteError(String),

    #[error("Failed to render template {path}: {message}")]
    TemplateError { path: String, message: String },

    #[error("Vendor manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Glob error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Refusing to clean {0}: it contains the project sources")]
    UnsafeOutputDir(PathBuf),
}

#[derive(Debug, Default)]
struct Outcome {
    files: usize,
    errors: usize,
}

/// Static site builder.
pub struct StaticBuilder {
    config: BuildConfig,
    manifest: Manifest,
    rules: SourceRules,
    assets: AssetPipeline,
}

impl StaticBuilder {
    /// Create a builder, loading the vendor manifest once.
    pub fn new(mut config: BuildConfig) -> Result<Self, BuildError> {
        config.root = absolute_root(&config.root)?;

        let manifest = Manifest::load(&config.manifest_path())?;
        let rules = SourceRules::new(&config.root, &config.src_dir)?;
        let assets = AssetPipeline::new(&config.browserslist)
            .map_err(|e| BuildError::ConfigError(e.to_string()))?
            .with_load_path(config.src_path().join("scss"));

        Ok(Self {
            config,
            manifest,
            rules,
            assets,
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn rules(&self) -> &SourceRules {
        &self.rules
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Clean the output directory, then run every task concurrently.
    pub fn build(&self) -> Result<BuildResult, BuildError> {
        let start = Instant::now();

        let clean_start = Instant::now();
        tracing::info!("Starting 'clean'...");
        self.clean()?;
        tracing::info!(
            "Finished 'clean' after {} ms",
            clean_start.elapsed().as_millis()
        );

        let results: Vec<Result<TaskReport, BuildError>> = Task::ALL
            .par_iter()
            .map(|task| self.run_task(*task))
            .collect();

        let tasks = results.into_iter().collect::<Result<Vec<_>, _>>()?;

        Ok(BuildResult {
            tasks,
            duration_ms: start.elapsed().as_millis() as u64,
            output_dir: self.config.output_path(),
        })
    }

    /// Delete everything inside the output directory, keeping the directory.
    pub fn clean(&self) -> Result<(), BuildError> {
        let output = self.config.output_path();

        if !output.exists() {
            return fs::create_dir_all(&output).map_err(|e| BuildError::WriteError(e.to_string()));
        }

        self.check_output_dir(&output)?;

        let entries = fs::read_dir(&output)
            .map_err(|e| BuildError::WriteError(format!("{}: {}", output.display(), e)))?;

        for entry in entries {
            let entry = entry.map_err(|e| BuildError::WriteError(e.to_string()))?;
            let path = entry.path();
            let removed = if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.map_err(|e| BuildError::WriteError(format!("{}: {}", path.display(), e)))?;
        }

        Ok(())
    }

    /// Reject output directories that would take the sources down with them.
    fn check_output_dir(&self, output: &Path) -> Result<(), BuildError> {
        let canonical = |p: &Path| p.canonicalize().ok();
        let Some(output_abs) = canonical(output) else {
            return Ok(());
        };

        let is_root = canonical(&self.config.root).is_some_and(|root| root == output_abs);
        let holds_src = canonical(&self.config.src_path()).is_some_and(|src| src.starts_with(&output_abs));

        if is_root || holds_src {
            return Err(BuildError::UnsafeOutputDir(output.to_path_buf()));
        }

        Ok(())
    }

    /// Run a single task without cleaning.
    pub fn run_task(&self, task: Task) -> Result<TaskReport, BuildError> {
        let start = Instant::now();
        tracing::info!("Starting '{}'...", task);

        let outcome = match task {
            Task::CopyFiles => self.copy_files(),
            Task::CompileHtml => self.compile_html(),
            Task::CompileScss => self.compile_scss(),
            Task::CompileJs => self.compile_js(),
            Task::CopyVendors => self.copy_vendors(),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(outcome) => {
                tracing::info!("Finished '{}' after {} ms", task, duration_ms);
                Ok(TaskReport {
                    task,
                    files: outcome.files,
                    errors: outcome.errors,
                    duration_ms,
                })
            }
            Err(e) => {
                tracing::error!("'{}' errored after {} ms", task, duration_ms);
                Err(e)
            }
        }
    }

    /// Copy assets (except `main.js`) and forms byte-for-byte.
    fn copy_files(&self) -> Result<Outcome, BuildError> {
        let output = self.config.output_path();
        let root = self.rules.root();

        let assets = self.rules.assets.expand(root)?;
        let forms = self.rules.forms.expand(root)?;

        let files = copy_matches(&assets, &output.join("assets"))?
            + copy_matches(&forms, &output.join("forms"))?;

        Ok(Outcome { files, errors: 0 })
    }

    /// Render top-level HTML templates, inject vendor tags and beautify.
    fn compile_html(&self) -> Result<Outcome, BuildError> {
        let output = self.config.output_path();
        let engine = TemplateEngine::new(&self.config.src_path().join("html"));

        let pages = self.rules.html.expand(self.rules.root())?;

        let written: Vec<Result<(), BuildError>> = pages
            .par_iter()
            .filter(|page| !page.is_dir)
            .map(|page| {
                let name = template_name(&page.relative);
                let rendered = engine
                    .render(&name)
                    .map_err(|e| BuildError::TemplateError {
                        path: page.source.display().to_string(),
                        message: e.to_string(),
                    })?;

                let html = inject_vendor_tags(&rendered, &self.manifest);
                let html = format_html(&html, self.config.html);

                write_output(&output.join(&page.relative), html.as_bytes())
            })
            .collect();

        let files = written.len();
        written.into_iter().collect::<Result<Vec<_>, _>>()?;

        Ok(Outcome { files, errors: 0 })
    }

    /// Compile stylesheets. Failures are logged and skipped.
    fn compile_scss(&self) -> Result<Outcome, BuildError> {
        let css_dir = self.config.output_path().join("assets").join("css");

        let sheets = self.rules.scss.expand(self.rules.root())?;

        let results: Vec<Result<bool, BuildError>> = sheets
            .par_iter()
            .filter(|sheet| !sheet.is_dir && !is_partial(&sheet.relative))
            .map(|sheet| match self.assets.compile_scss(&sheet.source) {
                Ok(css) => {
                    let target = css_dir.join(&sheet.relative).with_extension("css");
                    write_output(&target, css.as_bytes()).map(|_| true)
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    Ok(false)
                }
            })
            .collect();

        let mut outcome = Outcome::default();
        for result in results {
            if result? {
                outcome.files += 1;
            } else {
                outcome.errors += 1;
            }
        }

        Ok(outcome)
    }

    /// Beautify `assets/js/main.js`.
    fn compile_js(&self) -> Result<Outcome, BuildError> {
        let source_path = self.config.src_path().join("assets/js/main.js");
        if !source_path.exists() {
            tracing::debug!("No {} to compile", source_path.display());
            return Ok(Outcome::default());
        }

        let source = fs::read_to_string(&source_path)
            .map_err(|e| BuildError::ReadError(format!("{}: {}", source_path.display(), e)))?;

        let js = match AssetPipeline::beautify_js(&source, self.config.js) {
            Ok(js) => js,
            Err(e) => {
                tracing::warn!("{}; copying {} unchanged", e, source_path.display());
                source
            }
        };

        let target = self.config.output_path().join("assets/js/main.js");
        write_output(&target, js.as_bytes())?;

        Ok(Outcome {
            files: 1,
            errors: 0,
        })
    }

    /// Copy every vendor `src`/`srcs` entry.
    fn copy_vendors(&self) -> Result<Outcome, BuildError> {
        let output = self.config.output_path();
        let mut files = 0;

        for job in self.manifest.copy_jobs()? {
            let matches = job.sources.expand(self.manifest.root())?;
            if matches.is_empty() {
                tracing::warn!("Vendor '{}' matched no files", job.vendor);
                continue;
            }

            files += copy_matches(&matches, &output.join(&job.dest))?;
        }

        Ok(Outcome { files, errors: 0 })
    }
}

/// Resolve the project root to an absolute path.
///
/// Watcher events carry absolute paths, so source rules must be rooted the same way.
fn absolute_root(root: &Path) -> Result<PathBuf, BuildError> {
    if let Ok(canonical) = root.canonicalize() {
        return Ok(canonical);
    }
    if root.is_absolute() {
        return Ok(root.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(root))
        .map_err(|e| BuildError::ReadError(format!("current directory: {}", e)))
}

/// Copy glob matches under `dest`, mirroring directories.
fn copy_matches(matches: &[GlobMatch], dest: &Path) -> Result<usize, BuildError> {
    let copied: Vec<Result<bool, BuildError>> = matches
        .par_iter()
        .map(|m| {
            let target = dest.join(&m.relative);
            if m.is_dir {
                fs::create_dir_all(&target)
                    .map_err(|e| BuildError::WriteError(format!("{}: {}", target.display(), e)))?;
                return Ok(false);
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| BuildError::WriteError(format!("{}: {}", parent.display(), e)))?;
            }
            fs::copy(&m.source, &target).map_err(|e| {
                BuildError::WriteError(format!(
                    "{} -> {}: {}",
                    m.source.display(),
                    target.display(),
                    e
                ))
            })?;
            Ok(true)
        })
        .collect();

    let mut files = 0;
    for result in copied {
        if result? {
            files += 1;
        }
    }
    Ok(files)
}

fn write_output(path: &Path, contents: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::WriteError(e.to_string()))?;
    }
    fs::write(path, contents)
        .map_err(|e| BuildError::WriteError(format!("{}: {}", path.display(), e)))
}

/// Template names always use forward slashes.
fn template_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    /// Lay out a small project and return its root.
    fn project() -> TempDir {
        let temp = tempdir().unwrap();
        let root = temp.path();

        let files: &[(&str, &[u8])] = &[
            ("src/assets/img/logo.png", &[0x89, b'P', b'N', b'G', 0xff, 0x00]),
            ("src/assets/js/main.js", b"function hello(){console.log('hi')}"),
            ("src/forms/contact.php", b"<?php echo 'ok';"),
            (
                "src/html/index.html",
                b"<!DOCTYPE html>\n<html>\n{% include \"partials/head.html\" %}\n<body>\n<h1>{{ \"Hello\" }}</h1>\n<!-- Vendor JS Files -->\n</body>\n</html>\n",
            ),
            (
                "src/html/partials/head.html",
                b"<head>\n<!-- Vendor CSS Files -->\n</head>",
            ),
            ("src/scss/_vars.scss", b"$accent: red;"),
            (
                "src/scss/style.scss",
                b"@import 'vars';\n.card { color: $accent; .title { margin: 0; } }",
            ),
            ("node_modules/lib/dist/lib.js", b"/* lib */"),
            ("node_modules/lib/dist/lib.css", b"/* lib */"),
            ("node_modules/lib/dist/fonts/icons.woff2", b"font"),
            (
                "vendors.json",
                br#"{
  "lib": {
    "css_link": "vendor/lib/lib.css",
    "js_link": "vendor/lib/lib.js",
    "src": "./node_modules/lib/dist/**/*",
    "dest": "vendor/lib"
  },
  "cdn": { "js_link": "https://cdn.example.com/x.js" }
}"#,
            ),
        ];

        for (path, contents) in files {
            let path = root.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        temp
    }

    fn builder(root: &Path) -> StaticBuilder {
        StaticBuilder::new(BuildConfig {
            root: root.to_path_buf(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn builds_complete_site() {
        let temp = project();
        let root = temp.path();
        let dist = root.join("dist");

        let result = builder(root).build().unwrap();

        assert_eq!(result.tasks.len(), 5);
        assert_eq!(result.errors(), 0);
        assert_eq!(
            fs::read(dist.join("assets/img/logo.png")).unwrap(),
            fs::read(root.join("src/assets/img/logo.png")).unwrap()
        );
        assert!(dist.join("forms/contact.php").exists());
        assert!(dist.join("assets/css/style.css").exists());
        assert!(!dist.join("assets/css/_vars.css").exists());
        assert!(dist.join("index.html").exists());
        assert!(!dist.join("partials").exists());
        assert!(dist.join("vendor/lib/lib.js").exists());
        assert!(dist.join("vendor/lib/fonts/icons.woff2").exists());
    }

    #[test]
    fn injects_vendor_tags_into_pages() {
        let temp = project();
        let root = temp.path();

        builder(root).build().unwrap();
        let html = fs::read_to_string(root.join("dist/index.html")).unwrap();

        assert!(html.contains("<h1>Hello</h1>"));
        assert!(html.contains("<!-- Vendor CSS Files -->\n  <link href=\"vendor/lib/lib.css\" rel=\"stylesheet\">\n"));
        assert_eq!(html.matches("<script src=\"vendor/lib/lib.js\"></script>").count(), 1);
        assert_eq!(html.matches("https://cdn.example.com/x.js").count(), 1);
    }

    #[test]
    fn beautifies_main_js_instead_of_copying() {
        let temp = project();
        let root = temp.path();

        builder(root).build().unwrap();
        let js = fs::read_to_string(root.join("dist/assets/js/main.js")).unwrap();

        assert!(js.contains("function hello() {"));
        assert!(js.contains("\n  console.log("));
    }

    #[test]
    fn clean_removes_stale_output() {
        let temp = project();
        let root = temp.path();
        fs::create_dir_all(root.join("dist/old")).unwrap();
        fs::write(root.join("dist/old/stale.html"), "stale").unwrap();
        fs::write(root.join("dist/stale.txt"), "stale").unwrap();

        builder(root).build().unwrap();

        assert!(root.join("dist").exists());
        assert!(!root.join("dist/old").exists());
        assert!(!root.join("dist/stale.txt").exists());
    }

    #[test]
    fn scss_errors_do_not_halt_the_build() {
        let temp = project();
        let root = temp.path();
        fs::write(root.join("src/scss/broken.scss"), ".a { @include missing-mixin; }").unwrap();

        let result = builder(root).build().unwrap();

        let scss = result
            .tasks
            .iter()
            .find(|t| t.task == Task::CompileScss)
            .unwrap();
        assert_eq!(scss.errors, 1);
        assert_eq!(scss.files, 1);
        assert!(root.join("dist/assets/css/style.css").exists());
        assert!(!root.join("dist/assets/css/broken.css").exists());
        assert!(root.join("dist/index.html").exists());
    }

    #[test]
    fn run_task_does_not_clean() {
        let temp = project();
        let root = temp.path();
        fs::create_dir_all(root.join("dist")).unwrap();
        fs::write(root.join("dist/keep.txt"), "keep").unwrap();

        let report = builder(root).run_task(Task::CompileJs).unwrap();

        assert_eq!(report.files, 1);
        assert!(root.join("dist/keep.txt").exists());
    }

    #[test]
    fn template_errors_fail_the_task() {
        let temp = project();
        let root = temp.path();
        fs::write(root.join("src/html/broken.html"), "{% include \"nope.html\" %}").unwrap();

        let result = builder(root).run_task(Task::CompileHtml);

        assert!(matches!(result, Err(BuildError::TemplateError { .. })));
    }

    #[test]
    fn missing_vendor_file_is_an_error() {
        let temp = project();
        let root = temp.path();
        fs::write(
            root.join("vendors.json"),
            r#"{ "gone": { "src": "./node_modules/gone/gone.js", "dest": "vendor" } }"#,
        )
        .unwrap();

        let result = builder(root).run_task(Task::CopyVendors);

        assert!(matches!(
            result,
            Err(BuildError::Pattern(PatternError::NotFound(_)))
        ));
    }

    #[test]
    fn relative_root_classifies_absolute_changes() {
        let builder = StaticBuilder::new(BuildConfig {
            root: PathBuf::from("."),
            vendors: PathBuf::from("no-such-vendors.json"),
            ..Default::default()
        })
        .unwrap();
        let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();

        assert!(builder.config().root.is_absolute());
        assert_eq!(
            builder.rules().watch_task(&cwd.join("src/scss/style.scss")),
            Some(Task::CompileScss)
        );
        assert_eq!(
            builder.rules().watch_task(&cwd.join("./src/html/index.html")),
            Some(Task::CompileHtml)
        );
    }

    #[test]
    fn refuses_to_clean_source_tree() {
        let temp = project();
        let root = temp.path();

        let builder = StaticBuilder::new(BuildConfig {
            root: root.to_path_buf(),
            output_dir: PathBuf::from("."),
            ..Default::default()
        })
        .unwrap();

        assert!(matches!(builder.clean(), Err(BuildError::UnsafeOutputDir(_))));
        assert!(root.join("src/html/index.html").exists());
    }
}
