//! Source layout and the globs each task reads.

use std::fmt;
use std::path::{Path, PathBuf};

use trowel_vendors::{GlobSet, PatternError};

/// A build task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    CopyFiles,
    CompileHtml,
    CompileScss,
    CompileJs,
    CopyVendors,
}

impl Task {
    /// Every task, in the order reports are listed.
    pub const ALL: [Task; 5] = [
        Task::CopyFiles,
        Task::CompileHtml,
        Task::CompileScss,
        Task::CompileJs,
        Task::CopyVendors,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Task::CopyFiles => "copy-files",
            Task::CompileHtml => "compile-html",
            Task::CompileScss => "compile-scss",
            Task::CompileJs => "compile-js",
            Task::CopyVendors => "copy-vendors",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Globs over the source tree, resolved against the project root.
#[derive(Debug, Clone)]
pub struct SourceRules {
    root: PathBuf,
    pub assets: GlobSet,
    pub forms: GlobSet,
    pub html: GlobSet,
    pub html_watch: GlobSet,
    pub scss: GlobSet,
    pub scss_watch: GlobSet,
    pub main_js: GlobSet,
}

impl SourceRules {
    /// Build the rules for a source directory (relative to `root` or absolute).
    pub fn new(root: &Path, src_dir: &Path) -> Result<Self, PatternError> {
        let src = src_dir.to_string_lossy().replace('\\', "/");
        let src = src.trim_end_matches('/');
        let main_js = format!("{src}/assets/js/main.js");

        Ok(Self {
            root: root.to_path_buf(),
            assets: GlobSet::new([format!("{src}/assets/**/*"), format!("!{main_js}")])?,
            forms: GlobSet::new([format!("{src}/forms/**/*")])?,
            html: GlobSet::new([format!("{src}/html/*.html")])?,
            html_watch: GlobSet::new([format!("{src}/html/**/*.html")])?,
            scss: GlobSet::new([format!("{src}/scss/**/*.scss")])?,
            scss_watch: GlobSet::new([format!("{src}/scss/**/*")])?,
            main_js: GlobSet::new([main_js])?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The task to re-run when `path` changes, if any.
    pub fn watch_task(&self, path: &Path) -> Option<Task> {
        let root = self.root.as_path();

        if self.scss_watch.matches(root, path) {
            Some(Task::CompileScss)
        } else if self.html_watch.matches(root, path) {
            Some(Task::CompileHtml)
        } else if self.main_js.matches(root, path) {
            Some(Task::CompileJs)
        } else if self.assets.matches(root, path) {
            Some(Task::CopyFiles)
        } else {
            None
        }
    }
}
