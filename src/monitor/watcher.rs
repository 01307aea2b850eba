// src/monitor/watcher.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::Result;

/// Wrapper around the platform watcher.
///
/// Directories are watched non-recursively and only while some registered
/// dependency lives in them. The `notify` callback runs on its own thread;
/// events are forwarded into the async world over an unbounded channel
/// (the debouncer consumes them).
pub struct FileWatcher {
    inner: RecommendedWatcher,
    watched: HashSet<PathBuf>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("watched", &self.watched)
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Build a watcher forwarding raw events to `raw_tx`.
    ///
    /// Access-only events are dropped at the callback; everything else is
    /// matched against the dependency index downstream.
    pub fn new(raw_tx: mpsc::UnboundedSender<Event>) -> Result<Self> {
        let inner = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_access() {
                        return;
                    }
                    if let Err(err) = raw_tx.send(event) {
                        // We can't log via tracing here easily, so fallback to stderr.
                        eprintln!("preheat: failed to forward notify event: {err}");
                    }
                }
                Err(err) => {
                    eprintln!("preheat: file watch error: {err}");
                }
            },
            Config::default(),
        )
        .map_err(|e| crate::errors::PreheatError::Other(e.into()))?;

        Ok(Self {
            inner,
            watched: HashSet::new(),
        })
    }

    /// Start watching a directory (non-recursive). Idempotent.
    pub fn watch_dir(&mut self, dir: &Path) {
        if self.watched.contains(dir) {
            return;
        }
        match self.inner.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                debug!(dir = ?dir, "watching directory");
                self.watched.insert(dir.to_path_buf());
            }
            Err(err) => {
                warn!(dir = ?dir, error = %err, "failed to watch directory");
            }
        }
    }

    /// Stop watching a directory.
    pub fn unwatch_dir(&mut self, dir: &Path) {
        if !self.watched.remove(dir) {
            return;
        }
        if let Err(err) = self.inner.unwatch(dir) {
            debug!(dir = ?dir, error = %err, "failed to unwatch directory");
        } else {
            debug!(dir = ?dir, "stopped watching directory");
        }
    }
}
