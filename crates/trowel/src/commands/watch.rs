//! Watch command: build, then rebuild on change.

use std::path::Path;

use anyhow::Result;
use trowel_server::{shutdown_signal, watch_loop, watch_sources};

use crate::commands::build::build_site;
use crate::config::{load_config, project_root};

/// Run the watch command until Ctrl-C.
pub async fn run(config_path: &Path) -> Result<()> {
    let file_config = load_config(config_path)?;
    let builder = build_site(file_config.build_config(&project_root(config_path))).await?;

    let (watcher, rx) = watch_sources(&builder)?;

    tokio::select! {
        _ = watch_loop(builder, rx, None) => {}
        _ = shutdown_signal() => {}
    }

    drop(watcher);

    Ok(())
}
