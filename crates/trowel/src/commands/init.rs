//! Scaffold a starter project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::project_root;

/// Starter files, relative to the project root.
const STARTER_FILES: &[(&str, &str)] = &[
    ("vendors.json", DEFAULT_VENDORS),
    ("src/html/index.html", DEFAULT_INDEX),
    ("src/html/partials/header.html", DEFAULT_HEADER),
    ("src/scss/style.scss", DEFAULT_STYLE),
    ("src/scss/_variables.scss", DEFAULT_VARIABLES),
    ("src/assets/js/main.js", DEFAULT_MAIN_JS),
];

/// Run the init command.
pub async fn run(config_path: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing trowel project...");

    let root = project_root(config_path);
    let src_dir = root.join("src");

    // Check if src already exists
    if src_dir.exists() && !yes {
        tracing::warn!("src/ directory already exists. Use --yes to overwrite.");
        return Ok(());
    }

    write_starter(config_path, DEFAULT_CONFIG, yes)?;

    for (relative, content) in STARTER_FILES {
        write_starter(&root.join(relative), content, yes)?;
    }

    let forms_dir = src_dir.join("forms");
    fs::create_dir_all(&forms_dir).context("Failed to create forms directory")?;

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'trowel start' to start the development server.");

    Ok(())
}

fn write_starter(path: &Path, content: &str, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        tracing::debug!("Keeping existing {}", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Created {}", path.display());

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Trowel Configuration

[paths]
# Source directory
src = "src"

# Output directory for the built site
dist = "dist"

# Third-party vendor manifest
vendors = "vendors.json"

[html]
indent_size = 2
max_preserve_newlines = 1

[js]
indent_size = 2
max_preserve_newlines = 2

[css]
# Autoprefixer targets
browserslist = ["defaults"]

[server]
port = 3000
host = "127.0.0.1"
open = true
"#;

const DEFAULT_VENDORS: &str = r#"{
  "bootstrap": {
    "css_link": "https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css",
    "js_link": "https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/js/bootstrap.bundle.min.js"
  }
}
"#;

const DEFAULT_INDEX: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>My Site</title>
<!-- Vendor CSS Files -->
<link href="/assets/css/style.css" rel="stylesheet">
</head>
<body>
{% include "partials/header.html" %}
<main class="container">
<p>Edit <code>src/html/index.html</code> and the page reloads.</p>
</main>
<!-- Vendor JS Files -->
<script src="/assets/js/main.js"></script>
</body>
</html>
"#;

const DEFAULT_HEADER: &str = r#"<header class="container">
<h1>My Site</h1>
</header>
"#;

const DEFAULT_STYLE: &str = r#"@use "variables" as *;

body {
  color: $text-color;

  header h1 {
    color: $accent-color;
  }
}
"#;

const DEFAULT_VARIABLES: &str = r#"$text-color: #212529;
$accent-color: #0d6efd;
"#;

const DEFAULT_MAIN_JS: &str = r#"document.addEventListener('DOMContentLoaded', () => {
  console.log('Ready');
});
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn scaffolds_starter_project() {
        let temp = tempdir().unwrap();
        let config_path = temp.path().join("trowel.toml");

        run(&config_path, false).await.unwrap();

        assert!(config_path.exists());
        assert!(temp.path().join("vendors.json").exists());
        assert!(temp.path().join("src/html/index.html").exists());
        assert!(temp.path().join("src/scss/_variables.scss").exists());
        assert!(temp.path().join("src/assets/js/main.js").exists());
        assert!(temp.path().join("src/forms").is_dir());
    }

    #[tokio::test]
    async fn keeps_existing_project_without_yes() {
        let temp = tempdir().unwrap();
        let config_path = temp.path().join("trowel.toml");
        fs::create_dir_all(temp.path().join("src/html")).unwrap();
        fs::write(temp.path().join("src/html/index.html"), "mine").unwrap();

        run(&config_path, false).await.unwrap();

        assert_eq!(
            fs::read_to_string(temp.path().join("src/html/index.html")).unwrap(),
            "mine"
        );
        assert!(!config_path.exists());
    }

    #[test]
    fn starter_config_parses() {
        let config = crate::config::ConfigFile::from_toml(DEFAULT_CONFIG).unwrap();

        assert_eq!(config.server.port, 3000);
    }
}
