//! Development server implementation.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::services::ServeDir;

use trowel_static::{StaticBuilder, Task};

use crate::watcher::FileWatcher;
use crate::websocket::{reload_client_script, ReloadHub, ReloadMessage};

/// WebSocket endpoint for live reload.
const RELOAD_SOCKET: &str = "/__livereload";

/// Live reload client script.
const RELOAD_SCRIPT: &str = "/__livereload.js";

/// Ports tried after the configured one is taken.
const MAX_PORT_RETRIES: u16 = 10;

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory to serve
    pub dist_dir: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            dist_dir: PathBuf::from("dist"),
            port: 3000,
            host: "127.0.0.1".to_string(),
            open: true,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(String, String),

    #[error("File watch error: {0}")]
    WatchError(String),

    #[error("Server error: {0}")]
    ServeError(String),
}

/// Shared server state.
struct ServerState {
    hub: ReloadHub,
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    builder: Arc<StaticBuilder>,
}

impl DevServer {
    /// Create a new development server over an already-built site.
    pub fn new(config: DevServerConfig, builder: Arc<StaticBuilder>) -> Self {
        Self { config, builder }
    }

    /// Watch sources and serve the output directory until Ctrl-C.
    pub async fn start(self) -> Result<(), ServerError> {
        let hub = ReloadHub::new();

        let (watcher, rx) = watch_sources(&self.builder)?;
        let builder = Arc::clone(&self.builder);
        let loop_hub = hub.clone();
        tokio::spawn(async move {
            watch_loop(builder, rx, Some(loop_hub)).await;
            // Keep watcher alive
            drop(watcher);
        });

        let (listener, addr) = bind(&self.config.host, self.config.port).await?;
        let app = router(&self.config.dist_dir, hub);

        let url = format!("http://{}", addr);
        tracing::info!("Serving {} at {}", self.config.dist_dir.display(), url);

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::debug!("Could not open browser: {}", e);
            }
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        Ok(())
    }
}

/// Start watching the builder's source directory.
pub fn watch_sources(
    builder: &StaticBuilder,
) -> Result<(FileWatcher, mpsc::Receiver<Task>), ServerError> {
    let src = builder.config().src_path();
    tracing::info!("Watching {} for changes", src.display());

    FileWatcher::new(&[src], builder.rules().clone())
        .map_err(|e| ServerError::WatchError(e.to_string()))
}

/// Re-run tasks as the watcher reports them, notifying `hub` after each.
///
/// Returns when the watcher's channel closes. A failed rebuild is logged and
/// watching continues.
pub async fn watch_loop(
    builder: Arc<StaticBuilder>,
    mut rx: mpsc::Receiver<Task>,
    hub: Option<ReloadHub>,
) {
    while let Some(task) = rx.recv().await {
        let task_builder = Arc::clone(&builder);
        let result = tokio::task::spawn_blocking(move || task_builder.run_task(task)).await;

        match result {
            Ok(Ok(report)) => {
                tracing::debug!("'{}' wrote {} files", task, report.files);
                if let Some(hub) = &hub {
                    hub.send(ReloadMessage::for_task(task));
                }
            }
            Ok(Err(e)) => tracing::error!("{}", e),
            Err(e) => tracing::error!("Rebuild of '{}' did not finish: {}", task, e),
        }
    }
}

/// Resolve when the process receives Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

/// Build the router serving `dist_dir` with live reload.
fn router(dist_dir: &Path, hub: ReloadHub) -> Router {
    let state = Arc::new(ServerState { hub });

    Router::new()
        .route(RELOAD_SOCKET, get(ws_handler))
        .route(RELOAD_SCRIPT, get(reload_script_handler))
        .fallback_service(ServeDir::new(dist_dir))
        .layer(middleware::map_response(inject_reload_client))
        .with_state(state)
}

/// Bind `host:port`, moving to the next port while the current one is taken.
async fn bind(host: &str, port: u16) -> Result<(TcpListener, SocketAddr), ServerError> {
    let mut last_error = None;

    for offset in 0..MAX_PORT_RETRIES {
        let candidate = port.saturating_add(offset);
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => {
                let addr = listener
                    .local_addr()
                    .map_err(|e| ServerError::BindError(format!("{}:{}", host, candidate), e.to_string()))?;
                if offset > 0 {
                    tracing::warn!("Port {} is in use, using {}", port, addr.port());
                }
                return Ok((listener, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(ServerError::BindError(
        format!("{}:{}", host, port),
        last_error.map(|e| e.to_string()).unwrap_or_default(),
    ))
}

/// Handler for the live reload WebSocket endpoint.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_ws(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut rx = state.hub.subscribe();

    if send_message(&mut socket, &ReloadMessage::Connected).await.is_err() {
        return;
    }

    while let Ok(msg) = rx.recv().await {
        if send_message(&mut socket, &msg).await.is_err() {
            break;
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

/// Handler for the live reload client script.
async fn reload_script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        reload_client_script(RELOAD_SOCKET),
    )
}

/// Add the live reload script to HTML responses.
async fn inject_reload_client(response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));

    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script_tag(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);

    Response::from_parts(parts, Body::from(html))
}

/// Insert the client script tag before the closing `</body>`, or append it.
fn inject_script_tag(html: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, RELOAD_SCRIPT);

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => format!("{}{}\n{}", &html[..pos], tag, &html[pos..]),
        None => format!("{}{}", html, tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use trowel_static::BuildConfig;

    #[test]
    fn default_config_serves_dist_on_3000() {
        let config = DevServerConfig::default();

        assert_eq!(config.port, 3000);
        assert_eq!(config.dist_dir, PathBuf::from("dist"));
    }

    #[test]
    fn injects_before_closing_body() {
        let html = inject_script_tag("<html><body><p>Hi</p></BODY></html>");

        assert_eq!(
            html,
            "<html><body><p>Hi</p><script src=\"/__livereload.js\"></script>\n</BODY></html>"
        );
    }

    #[test]
    fn appends_without_body() {
        let html = inject_script_tag("<p>fragment</p>");

        assert!(html.ends_with("<script src=\"/__livereload.js\"></script>"));
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn serves_dist_with_reload_client() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("index.html"), "<body><h1>Home</h1></body>").unwrap();
        fs::write(temp.path().join("site.css"), "body { margin: 0; }").unwrap();

        let (listener, addr) = bind("127.0.0.1", 0).await.unwrap();
        let app = router(temp.path(), ReloadHub::new());
        tokio::spawn(async move { axum::serve(listener, app).await });

        let index = get(addr, "/").await;
        assert!(index.starts_with("HTTP/1.1 200"));
        assert!(index.contains("<h1>Home</h1><script src=\"/__livereload.js\"></script>"));

        let css = get(addr, "/site.css").await;
        assert!(css.contains("body { margin: 0; }"));
        assert!(!css.contains("__livereload"));

        let script = get(addr, RELOAD_SCRIPT).await;
        assert!(script.contains("application/javascript"));

        let missing = get(addr, "/missing.html").await;
        assert!(missing.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn watches_sources_of_relative_project_root() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src/html")).unwrap();

        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp.path()).unwrap();
        let builder = StaticBuilder::new(BuildConfig::default());
        std::env::set_current_dir(previous).unwrap();
        let builder = builder.unwrap();

        let (watcher, mut rx) = watch_sources(&builder).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(temp.path().join("src/html/index.html"), "<p>Changed</p>").unwrap();

        let task = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        drop(watcher);

        assert!(task.is_ok(), "timeout waiting for file watch event");
        assert_eq!(task.unwrap(), Some(Task::CompileHtml));
    }

    #[tokio::test]
    async fn watch_loop_rebuilds_and_notifies() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src/scss")).unwrap();
        fs::write(root.join("src/scss/site.scss"), ".a { .b { color: red; } }").unwrap();

        let builder = Arc::new(
            StaticBuilder::new(BuildConfig {
                root: root.to_path_buf(),
                ..Default::default()
            })
            .unwrap(),
        );
        let hub = ReloadHub::new();
        let mut messages = hub.subscribe();

        let (tx, rx) = mpsc::channel(4);
        tx.send(Task::CompileScss).await.unwrap();
        drop(tx);

        watch_loop(builder, rx, Some(hub)).await;

        assert!(root.join("dist/assets/css/site.css").exists());
        assert_eq!(
            messages.try_recv().unwrap(),
            ReloadMessage::UpdateCss {
                path: "/assets/css/".to_string()
            }
        );
    }
}
