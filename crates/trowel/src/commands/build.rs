//! Static site build command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use trowel_static::{BuildConfig, StaticBuilder};

use crate::config::{load_config, project_root};

/// Run the build command.
pub async fn run(config_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let file_config = load_config(config_path)?;

    let mut config = file_config.build_config(&project_root(config_path));
    if let Some(output) = output {
        config.output_dir = output;
    }

    build_site(config).await?;

    Ok(())
}

/// Clean and rebuild the whole site, returning the builder for reuse.
pub async fn build_site(config: BuildConfig) -> Result<Arc<StaticBuilder>> {
    tracing::info!("Building static site...");

    let builder = Arc::new(StaticBuilder::new(config)?);

    let task_builder = Arc::clone(&builder);
    let result = tokio::task::spawn_blocking(move || task_builder.build())
        .await
        .context("Build task did not finish")??;

    tracing::info!(
        "Built {} files from {} tasks in {}ms",
        result.files(),
        result.tasks.len(),
        result.duration_ms
    );

    if result.errors() > 0 {
        tracing::warn!("{} files failed to compile", result.errors());
    }

    tracing::info!("Output: {}", result.output_dir.display());

    Ok(builder)
}
