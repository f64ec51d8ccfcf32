//! Asset pipeline for stylesheet and script processing.

use std::path::{Path, PathBuf};

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};

use crate::format::{format_indented, restore_blank_lines, FormatOptions};

/// Errors that can occur while processing an asset.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Failed to compile {path}: {message}")]
    SassError { path: PathBuf, message: String },

    #[error("Failed to prefix {path}: {message}")]
    CssError { path: PathBuf, message: String },

    #[error("Failed to parse JavaScript: {0}")]
    JsError(String),

    #[error("Invalid browserslist query: {0}")]
    BrowserslistError(String),
}

/// Asset pipeline utilities.
#[derive(Debug, Clone)]
pub struct AssetPipeline {
    targets: Targets,
    load_paths: Vec<PathBuf>,
}

impl AssetPipeline {
    /// Create a pipeline prefixing for the given browserslist queries.
    ///
    /// An empty query list disables prefixing.
    pub fn new(browserslist: &[String]) -> Result<Self, AssetError> {
        let browsers = if browserslist.is_empty() {
            None
        } else {
            Browsers::from_browserslist(browserslist)
                .map_err(|e| AssetError::BrowserslistError(e.to_string()))?
        };

        Ok(Self {
            targets: Targets {
                browsers,
                ..Targets::default()
            },
            load_paths: Vec::new(),
        })
    }

    /// Add a directory searched by `@use`/`@import`.
    pub fn with_load_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.load_paths.push(path.into());
        self
    }

    /// Compile an SCSS file to expanded, prefixed CSS.
    pub fn compile_scss(&self, path: &Path) -> Result<String, AssetError> {
        let options = self
            .load_paths
            .iter()
            .fold(grass::Options::default(), |options, dir| options.load_path(dir))
            .style(grass::OutputStyle::Expanded);

        let css = grass::from_path(path, &options).map_err(|e| AssetError::SassError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        self.autoprefix(&css, path)
    }

    /// Add vendor prefixes required by the configured browsers.
    pub fn autoprefix(&self, css: &str, path: &Path) -> Result<String, AssetError> {
        let css_error = |message: String| AssetError::CssError {
            path: path.to_path_buf(),
            message,
        };

        let mut stylesheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: path.display().to_string(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| css_error(e.to_string()))?;

        stylesheet
            .minify(MinifyOptions {
                targets: self.targets.clone(),
                ..MinifyOptions::default()
            })
            .map_err(|e| css_error(e.to_string()))?;

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: false,
                targets: self.targets.clone(),
                ..PrinterOptions::default()
            })
            .map_err(|e| css_error(e.to_string()))?;

        Ok(printed.code)
    }

    /// Reformat JavaScript source with consistent indentation.
    ///
    /// Blank lines between top-level statements are kept, up to
    /// `max_preserve_newlines - 1` in a row.
    pub fn beautify_js(source: &str, options: FormatOptions) -> Result<String, AssetError> {
        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();

        if let Some(error) = parsed.errors.first() {
            return Err(AssetError::JsError(error.to_string()));
        }
        if parsed.panicked {
            return Err(AssetError::JsError("parser aborted".to_string()));
        }

        let program = &parsed.program;
        let mut spans: Vec<Span> = Vec::new();
        spans.extend(program.hashbang.as_ref().map(|hashbang| hashbang.span));
        spans.extend(program.directives.iter().map(|directive| directive.span));
        spans.extend(program.body.iter().map(GetSpan::span));

        let code = Codegen::new().build(program).code;
        let code = restore_blank_lines(&code, &blank_lines_between(source, &spans));

        Ok(format_indented(&code, options))
    }
}

/// Blank source lines in front of each span.
fn blank_lines_between(source: &str, spans: &[Span]) -> Vec<usize> {
    let mut gaps = vec![0; spans.len()];

    for (i, pair) in spans.windows(2).enumerate() {
        let gap = source
            .get(pair[0].end as usize..pair[1].start as usize)
            .unwrap_or("");
        let segments: Vec<&str> = gap.split('\n').collect();

        // The first and last segments share a line with a statement
        if segments.len() > 2 {
            gaps[i + 1] = segments[1..segments.len() - 1]
                .iter()
                .filter(|segment| segment.trim().is_empty())
                .count();
        }
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn pipeline(query: &str) -> AssetPipeline {
        AssetPipeline::new(&[query.to_string()]).unwrap()
    }

    #[test]
    fn compiles_scss_to_expanded_css() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("style.scss");
        fs::write(&path, "$accent: red;\n.card { color: $accent; .title { margin: 0; } }").unwrap();

        let css = pipeline("defaults").compile_scss(&path).unwrap();

        assert!(css.contains(".card {\n  color: red;\n}"));
        assert!(css.contains(".card .title"));
    }

    #[test]
    fn resolves_partials_from_load_path() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("_vars.scss"), "$gap: 4px;").unwrap();
        let path = temp.path().join("main.scss");
        fs::write(&path, "@import 'vars';\n.grid { gap: $gap; }").unwrap();

        let css = pipeline("defaults")
            .with_load_path(temp.path())
            .compile_scss(&path)
            .unwrap();

        assert!(css.contains("gap: 4px"));
    }

    #[test]
    fn reports_sass_errors() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("broken.scss");
        fs::write(&path, ".a { @include missing-mixin; }").unwrap();

        let result = pipeline("defaults").compile_scss(&path);

        assert!(matches!(result, Err(AssetError::SassError { .. })));
    }

    #[test]
    fn adds_vendor_prefixes() {
        let css = pipeline("safari 12")
            .autoprefix(".a { user-select: none; }", Path::new("a.css"))
            .unwrap();

        assert!(css.contains("-webkit-user-select: none"));
        assert!(css.contains("user-select: none"));
    }

    #[test]
    fn empty_query_disables_prefixing() {
        let css = AssetPipeline::new(&[])
            .unwrap()
            .autoprefix(".a { user-select: none; }", Path::new("a.css"))
            .unwrap();

        assert!(!css.contains("-webkit-"));
    }

    #[test]
    fn beautifies_javascript() {
        let js = AssetPipeline::beautify_js(
            "function greet(name){if(name){return 'hi '+name}}",
            FormatOptions::JS,
        )
        .unwrap();

        assert!(js.contains("function greet(name) {"));
        assert!(js.contains("\n    return "));
        assert!(!js.contains('\t'));
    }

    #[test]
    fn keeps_blank_lines_between_statements() {
        let source = "function a() {\n  return 1;\n}\n\n\n\nfunction b() {\n  return 2;\n}\nconst c = a() + b();\n";

        let js = AssetPipeline::beautify_js(source, FormatOptions::JS).unwrap();
        assert!(js.contains("}\n\nfunction b() {"));
        assert!(!js.contains("\n\n\n"));
        assert!(js.contains("}\nconst c = "));

        let squashed = AssetPipeline::beautify_js(
            source,
            FormatOptions {
                indent_size: 2,
                max_preserve_newlines: 1,
            },
        )
        .unwrap();
        assert!(squashed.contains("}\nfunction b() {"));
    }

    #[test]
    fn counts_blank_lines_between_spans() {
        let source = "a();\n\n// note\n\nb(); c();\n";

        let spans = [Span::new(0, 4), Span::new(15, 19), Span::new(20, 24)];

        let gaps = blank_lines_between(source, &spans);

        assert_eq!(gaps, vec![0, 2, 0]);
    }

    #[test]
    fn rewrites_declarations_while_prefixing() {
        let css = pipeline("defaults")
            .autoprefix(
                ".a{margin-top:1px;margin-right:1px;margin-bottom:1px;margin-left:1px;color:#ff0000}.b{color:blue}.b{padding:0}",
                Path::new("a.css"),
            )
            .unwrap();

        assert!(css.contains("margin: 1px"));
        assert!(!css.contains("margin-top"));
        assert!(css.contains("color: red"));
        assert!(css.contains("color: #00f"));
        assert_eq!(css.matches(".b {").count(), 1);
    }

    #[test]
    fn rejects_invalid_javascript() {
        let result = AssetPipeline::beautify_js("function (", FormatOptions::JS);

        assert!(matches!(result, Err(AssetError::JsError(_))));
    }
}
