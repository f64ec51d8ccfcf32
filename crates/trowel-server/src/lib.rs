//! Development server with live reload for trowel sites.
//!
//! Watches the source tree, re-runs the affected build task on change, and
//! serves the output folder with a WebSocket live reload client injected
//! into every page.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{
    shutdown_signal, watch_loop, watch_sources, DevServer, DevServerConfig, ServerError,
};
pub use watcher::FileWatcher;
pub use websocket::{ReloadHub, ReloadMessage};
