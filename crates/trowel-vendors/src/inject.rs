//! Vendor tag injection.

use crate::manifest::Manifest;

/// Placeholder after which vendor stylesheets are inserted.
pub const CSS_PLACEHOLDER: &str = "<!-- Vendor CSS Files -->";

/// Placeholder after which vendor scripts are inserted.
pub const JS_PLACEHOLDER: &str = "<!-- Vendor JS Files -->";

/// Insert the manifest's vendor tags after every placeholder in `html`.
///
/// The placeholder itself is kept. Each tag goes on its own line so the HTML
/// formatter can indent it.
pub fn inject_vendor_tags(html: &str, manifest: &Manifest) -> String {
    let html = splice(html, CSS_PLACEHOLDER, &manifest.css_tags());
    splice(&html, JS_PLACEHOLDER, &manifest.js_tags())
}

fn splice(html: &str, placeholder: &str, tags: &[String]) -> String {
    if tags.is_empty() {
        return html.to_string();
    }

    let mut replacement = String::from(placeholder);
    for tag in tags {
        replacement.push('\n');
        replacement.push_str(tag);
    }

    html.replace(placeholder, &replacement)
}
