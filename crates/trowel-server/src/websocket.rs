//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use trowel_static::Task;

/// Messages sent to browsers after a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Refresh stylesheets in place
    UpdateCss {
        /// URL prefix of the rebuilt stylesheets
        path: String,
    },

    /// Connection established
    Connected,
}

impl ReloadMessage {
    /// The message announcing a finished task.
    pub fn for_task(task: Task) -> Self {
        match task {
            Task::CompileScss => ReloadMessage::UpdateCss {
                path: "/assets/css/".to_string(),
            },
            _ => ReloadMessage::Reload,
        }
    }
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    /// Create a new reload hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers is fine
        let _ = self.sender.send(msg);
    }

    /// Subscribe to reload messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate the client-side live reload script.
///
/// The socket URL is derived from the page's own host, so the script works
/// whichever port the server ended up on.
pub fn reload_client_script(ws_path: &str) -> String {
    format!(
        r#"
(function() {{
  'use strict';

  const protocol = location.protocol === 'https:' ? 'wss://' : 'ws://';
  const ws = new WebSocket(protocol + location.host + '{}');
  let reconnectAttempts = 0;
  const maxReconnectAttempts = 10;

  function refreshStylesheets(prefix) {{
    const stamp = Date.now();
    document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {{
      const url = new URL(link.href, location.href);
      if (url.origin !== location.origin || !url.pathname.startsWith(prefix)) {{
        return;
      }}
      url.searchParams.set('livereload', stamp);
      link.href = url.toString();
    }});
  }}

  ws.onopen = function() {{
    reconnectAttempts = 0;
  }};

  ws.onmessage = function(event) {{
    const msg = JSON.parse(event.data);

    switch (msg.type) {{
      case 'reload':
        location.reload();
        break;

      case 'update_css':
        refreshStylesheets(msg.path);
        break;

      case 'connected':
        console.log('[livereload] Connected');
        break;
    }}
  }};

  ws.onclose = function() {{
    if (reconnectAttempts < maxReconnectAttempts) {{
      reconnectAttempts++;
      setTimeout(function() {{
        location.reload();
      }}, 1000 * reconnectAttempts);
    }}
  }};
}})();
"#,
        ws_path
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_broadcasts_messages() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();

        hub.send(ReloadMessage::Reload);

        match rx.try_recv() {
            Ok(ReloadMessage::Reload) => {}
            other => panic!("Expected Reload message, got {:?}", other),
        }
    }

    #[test]
    fn send_without_subscribers_is_ignored() {
        let hub = ReloadHub::new();

        hub.send(ReloadMessage::Reload);

        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn serializes_messages() {
        let json = serde_json::to_string(&ReloadMessage::for_task(Task::CompileScss)).unwrap();

        assert_eq!(json, r#"{"type":"update_css","path":"/assets/css/"}"#);
        assert_eq!(
            serde_json::to_string(&ReloadMessage::for_task(Task::CompileHtml)).unwrap(),
            r#"{"type":"reload"}"#
        );
    }

    #[test]
    fn client_script_targets_socket_path() {
        let script = reload_client_script("/__livereload");

        assert!(script.contains("location.host + '/__livereload'"));
        assert!(script.contains("update_css"));
    }
}
