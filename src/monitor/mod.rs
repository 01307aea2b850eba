// src/monitor/mod.rs

//! File monitoring: dependency bookkeeping and change detection.
//!
//! This module is responsible for:
//! - Maintaining the path → slot-set map fed by slot dependency reports.
//! - Wiring up a cross-platform filesystem watcher (`notify`) over the
//!   parent directories of registered paths.
//! - Coalescing raw events into one `FilesChanged` batch per burst.
//!
//! It does **not** know about the slot tree; it only turns filesystem
//! changes into slot-level restart requests. The [`FileMonitor`] facade is
//! owned by the supervisor shell, which keeps the single-writer rule: the
//! index only changes while the control loop processes an event.

pub mod debounce;
pub mod registry;
pub mod watcher;

use std::path::{Path, PathBuf};

pub use debounce::spawn_debouncer;
pub use registry::DependencyIndex;
pub use watcher::FileWatcher;

use crate::tree::SlotName;

/// Canonicalize where possible so reported dependencies and watcher event
/// paths compare equal even when one of them goes through a symlink (e.g.
/// /var vs /private/var). A path that no longer exists is kept as-is.
fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Dependency index plus the watcher it keeps trimmed.
#[derive(Debug)]
pub struct FileMonitor {
    index: DependencyIndex,
    watcher: FileWatcher,
}

impl FileMonitor {
    pub fn new(watcher: FileWatcher) -> Self {
        Self {
            index: DependencyIndex::new(),
            watcher,
        }
    }

    /// Record that `slot`'s current process loaded `path`, extending the
    /// watched directory set if needed. Idempotent.
    pub fn register_dependency(&mut self, slot: &str, path: PathBuf) {
        if let Some(dir) = self.index.register(slot, normalize(&path)) {
            self.watcher.watch_dir(&dir);
        }
    }

    /// Drop all of `slot`'s registrations, unwatching directories that no
    /// longer back any dependency.
    pub fn clear_dependencies(&mut self, slot: &str) {
        for dir in self.index.clear(slot) {
            self.watcher.unwatch_dir(&dir);
        }
    }

    /// Which slots depend on any of the changed paths.
    pub fn affected_slots(&self, paths: &[PathBuf]) -> Vec<SlotName> {
        let paths: Vec<PathBuf> = paths.iter().map(|p| normalize(p)).collect();
        self.index.affected(&paths)
    }

    pub fn index(&self) -> &DependencyIndex {
        &self.index
    }
}
