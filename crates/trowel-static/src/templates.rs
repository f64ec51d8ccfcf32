//! Template engine for rendering HTML pages.

use std::path::Path;

use minijinja::{context, path_loader, Environment};

/// Template engine using minijinja.
///
/// Templates are loaded from disk on demand, so `include`/`extends` resolve
/// against the template directory. Create a fresh engine per build; loaded
/// templates are cached for the engine's lifetime.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create a template engine rooted at `template_dir`.
    pub fn new(template_dir: &Path) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(template_dir));
        env.set_keep_trailing_newline(true);

        Self { env }
    }

    /// Render a template by its name relative to the template directory.
    pub fn render(&self, name: &str) -> Result<String, minijinja::Error> {
        let tmpl = self.env.get_template(name)?;
        tmpl.render(context! {})
    }
}
