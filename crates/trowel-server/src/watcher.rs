//! File watching for rebuilds.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;
use trowel_static::{SourceRules, Task};

/// Quiet period that ends a burst of filesystem events.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// File watcher that reports which task a change calls for.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `paths` recursively, classifying changes with `rules`.
    ///
    /// Each burst of events yields every affected task once, in the order
    /// first seen.
    pub fn new(
        paths: &[PathBuf],
        rules: SourceRules,
    ) -> Result<(Self, async_mpsc::Receiver<Task>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            match res {
                Ok(event) => {
                    let _ = sync_tx.send(event);
                }
                Err(e) => tracing::warn!("Watch error: {}", e),
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(std::io::Error::other)?;
            } else {
                tracing::warn!("Not watching {}: it does not exist", path.display());
            }
        }

        std::thread::spawn(move || {
            while let Ok(event) = sync_rx.recv() {
                let mut pending = Vec::new();
                collect_tasks(&rules, &event, &mut pending);

                // Drain the rest of the burst
                while let Ok(event) = sync_rx.recv_timeout(DEBOUNCE) {
                    collect_tasks(&rules, &event, &mut pending);
                }

                for task in pending {
                    if async_tx.blocking_send(task).is_err() {
                        return;
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

fn collect_tasks(rules: &SourceRules, event: &notify::Event, pending: &mut Vec<Task>) {
    for path in &event.paths {
        if let Some(task) = classify_event(rules, path, &event.kind) {
            if !pending.contains(&task) {
                pending.push(task);
            }
        }
    }
}

/// Classify a notify event into the task it triggers.
fn classify_event(rules: &SourceRules, path: &Path, kind: &EventKind) -> Option<Task> {
    match kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
            rules.watch_task(path)
        }
        _ => None,
    }
}
