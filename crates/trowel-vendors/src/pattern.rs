//! Glob patterns in the gulp dialect.
//!
//! A pattern is split into a literal *base* directory and a glob tail. Matches
//! are reported relative to the base, which is how outputs keep their shape:
//! `node_modules/lib/dist/**/*` copied to `vendor/lib` writes everything under
//! `dist/` into `vendor/lib/`.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

/// Errors that can occur when parsing or expanding a glob.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Unbalanced '{delimiter}' in glob pattern: {pattern}")]
    Unbalanced { pattern: String, delimiter: char },

    #[error("Invalid glob pattern {pattern}: {message}")]
    Invalid { pattern: String, message: String },

    #[error("File not found with singular glob: {0}")]
    NotFound(PathBuf),

    #[error("Failed to walk {path}: {message}")]
    Walk { path: PathBuf, message: String },
}

/// A file or directory matched by a glob.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobMatch {
    /// Path on disk
    pub source: PathBuf,

    /// Path relative to the pattern base
    pub relative: PathBuf,

    /// Whether the match is a directory
    pub is_dir: bool,
}

/// A single compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    base: PathBuf,
    tail: String,
    matcher: Regex,
    literal: bool,
    dot: bool,
}

impl GlobPattern {
    /// Compile a pattern such as `./src/assets/**/*`.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let absolute = pattern.starts_with('/');
        let segments: Vec<&str> = pattern
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();

        let first_glob = segments.iter().position(|s| has_glob_chars(s));
        let (base_segments, rest) = match first_glob {
            Some(i) => (&segments[..i], &segments[i..]),
            None => match segments.split_last() {
                Some((last, parents)) => (parents, std::slice::from_ref(last)),
                None => {
                    return Err(PatternError::Invalid {
                        pattern: pattern.to_string(),
                        message: "empty pattern".to_string(),
                    })
                }
            },
        };

        let mut base = if absolute {
            PathBuf::from("/")
        } else {
            PathBuf::new()
        };
        base.extend(base_segments.iter());

        Ok(Self {
            base,
            tail: rest.join("/"),
            matcher: build_regex(pattern, rest)?,
            literal: first_glob.is_none(),
            dot: rest.iter().any(|s| s.starts_with('.')),
        })
    }

    /// Literal directory prefix before the first glob segment.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Whether the pattern names a single file (no glob characters).
    pub fn is_literal(&self) -> bool {
        self.literal
    }

    /// Test a path given relative to the pattern base.
    pub fn matches(&self, relative: &Path) -> bool {
        if !self.dot && is_hidden(relative) {
            return false;
        }
        self.matcher.is_match(&to_slash(relative))
    }

    /// Test a path given relative to (or rooted at) `root`.
    pub fn matches_under(&self, root: &Path, path: &Path) -> bool {
        let base = root.join(&self.base);
        let path = root.join(path);
        path.strip_prefix(&base)
            .map(|relative| self.matches(relative))
            .unwrap_or(false)
    }

    /// Expand the pattern against the filesystem, resolving it under `root`.
    ///
    /// Results are sorted by path. A literal pattern that does not exist is an
    /// error; a glob whose base does not exist expands to nothing.
    pub fn expand(&self, root: &Path) -> Result<Vec<GlobMatch>, PatternError> {
        let base = root.join(&self.base);

        if self.literal {
            let source = base.join(&self.tail);
            if !source.exists() {
                return Err(PatternError::NotFound(source));
            }
            let is_dir = source.is_dir();
            return Ok(vec![GlobMatch {
                source,
                relative: PathBuf::from(&self.tail),
                is_dir,
            }]);
        }

        if !base.exists() {
            tracing::debug!("Glob base {} does not exist", base.display());
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        let walker = WalkDir::new(&base)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.dot || !starts_with_dot(e.file_name()));

        for entry in walker {
            let entry = entry.map_err(|e| PatternError::Walk {
                path: base.clone(),
                message: e.to_string(),
            })?;

            let Ok(relative) = entry.path().strip_prefix(&base) else {
                continue;
            };

            if self.matches(relative) {
                matches.push(GlobMatch {
                    source: entry.path().to_path_buf(),
                    relative: relative.to_path_buf(),
                    is_dir: entry.file_type().is_dir(),
                });
            }
        }

        Ok(matches)
    }
}

/// An ordered list of include patterns with `!`-prefixed exclusions.
#[derive(Debug, Clone, Default)]
pub struct GlobSet {
    include: Vec<GlobPattern>,
    exclude: Vec<GlobPattern>,
}

impl GlobSet {
    /// Compile a list of patterns. Patterns starting with `!` exclude.
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_prefix('!') {
                Some(negated) => set.exclude.push(GlobPattern::parse(negated)?),
                None => set.include.push(GlobPattern::parse(pattern)?),
            }
        }
        Ok(set)
    }

    /// Whether any exclusion matches `path`.
    pub fn is_excluded(&self, root: &Path, path: &Path) -> bool {
        self.exclude.iter().any(|p| p.matches_under(root, path))
    }

    /// Whether `path` is selected by the set without touching the filesystem.
    pub fn matches(&self, root: &Path, path: &Path) -> bool {
        self.include.iter().any(|p| p.matches_under(root, path)) && !self.is_excluded(root, path)
    }

    /// Expand every include pattern, dropping exclusions and duplicates.
    pub fn expand(&self, root: &Path) -> Result<Vec<GlobMatch>, PatternError> {
        let mut seen = HashSet::new();
        let mut matches = Vec::new();

        for pattern in &self.include {
            for found in pattern.expand(root)? {
                if self.is_excluded(root, &found.source) {
                    continue;
                }
                if seen.insert(found.source.clone()) {
                    matches.push(found);
                }
            }
        }

        Ok(matches)
    }
}

fn has_glob_chars(segment: &str) -> bool {
    segment.contains(['*', '?', '[', '{'])
}

fn starts_with_dot(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => starts_with_dot(name),
        _ => false,
    })
}

/// Join path components with `/` regardless of platform.
fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn build_regex(pattern: &str, segments: &[&str]) -> Result<Regex, PatternError> {
    let mut re = String::from("^");
    let last = segments.len().saturating_sub(1);

    for (i, segment) in segments.iter().enumerate() {
        if *segment == "**" {
            if i == last {
                re.push_str(".*");
            } else {
                re.push_str("(?:[^/]+/)*");
            }
            continue;
        }

        push_segment(&mut re, pattern, segment)?;
        if i != last {
            re.push('/');
        }
    }
    re.push('$');

    Regex::new(&re).map_err(|e| PatternError::Invalid {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

fn push_segment(re: &mut String, pattern: &str, segment: &str) -> Result<(), PatternError> {
    let mut chars = segment.chars().peekable();
    let mut braces = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '[' => {
                let mut class = String::from("[");
                if matches!(chars.peek(), Some('!') | Some('^')) {
                    chars.next();
                    class.push('^');
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if c == '\\' || c == '[' {
                        class.push('\\');
                    }
                    class.push(c);
                }
                if !closed {
                    return Err(PatternError::Unbalanced {
                        pattern: pattern.to_string(),
                        delimiter: '[',
                    });
                }
                class.push(']');
                re.push_str(&class);
            }
            '{' => {
                braces += 1;
                re.push_str("(?:");
            }
            '}' if braces > 0 => {
                braces -= 1;
                re.push(')');
            }
            ',' if braces > 0 => re.push('|'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    if braces > 0 {
        return Err(PatternError::Unbalanced {
            pattern: pattern.to_string(),
            delimiter: '{',
        });
    }

    Ok(())
}
