//! Development server command.

use std::path::Path;

use anyhow::Result;
use trowel_server::{DevServer, DevServerConfig};

use crate::commands::build::build_site;
use crate::config::{load_config, project_root};

/// Run the start command: build, watch, and serve.
pub async fn run(
    config_path: &Path,
    port: Option<u16>,
    host: Option<String>,
    open: bool,
) -> Result<()> {
    let file_config = load_config(config_path)?;
    let builder = build_site(file_config.build_config(&project_root(config_path))).await?;

    let config = DevServerConfig {
        dist_dir: builder.config().output_path(),
        port: port.unwrap_or(file_config.server.port),
        host: host.unwrap_or_else(|| file_config.server.host.clone()),
        open: open && file_config.server.open,
    };

    tracing::info!("Starting development server on port {}", config.port);

    DevServer::new(config, builder).start().await?;

    Ok(())
}
