// src/monitor/registry.rs

//! The dependency index: which slots loaded which files.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::tree::SlotName;

/// Path → depending slots and slot → registered paths, plus a refcount of
/// registered paths per parent directory so the watcher can be trimmed as
/// registrations come and go.
///
/// Entries whose slot set empties are pruned immediately, so a path that no
/// live process depends on can never produce a restart.
#[derive(Debug, Default)]
pub struct DependencyIndex {
    by_path: HashMap<PathBuf, BTreeSet<SlotName>>,
    by_slot: HashMap<SlotName, BTreeSet<PathBuf>>,
    dir_paths: HashMap<PathBuf, usize>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register that `slot` depends on `path`. Idempotent.
    ///
    /// Returns the path's parent directory if it was not being watched
    /// before this registration.
    pub fn register(&mut self, slot: &str, path: PathBuf) -> Option<PathBuf> {
        let slot_paths = self.by_slot.entry(slot.to_string()).or_default();
        if !slot_paths.insert(path.clone()) {
            return None;
        }

        debug!(slot = %slot, path = ?path, "dependency registered");

        let new_path = !self.by_path.contains_key(&path);
        self.by_path
            .entry(path.clone())
            .or_default()
            .insert(slot.to_string());

        if !new_path {
            return None;
        }

        let dir = watch_dir_of(&path);
        let refs = self.dir_paths.entry(dir.clone()).or_insert(0);
        *refs += 1;
        if *refs == 1 { Some(dir) } else { None }
    }

    /// Remove every association for `slot`.
    ///
    /// Returns the directories that no longer back any registration and
    /// should be unwatched.
    pub fn clear(&mut self, slot: &str) -> Vec<PathBuf> {
        let Some(paths) = self.by_slot.remove(slot) else {
            return Vec::new();
        };

        debug!(slot = %slot, count = paths.len(), "dependencies cleared");

        let mut stale_dirs = Vec::new();
        for path in paths {
            let Some(slots) = self.by_path.get_mut(&path) else {
                continue;
            };
            slots.remove(slot);
            if !slots.is_empty() {
                continue;
            }
            self.by_path.remove(&path);

            let dir = watch_dir_of(&path);
            if let Some(refs) = self.dir_paths.get_mut(&dir) {
                *refs -= 1;
                if *refs == 0 {
                    self.dir_paths.remove(&dir);
                    stale_dirs.push(dir);
                }
            }
        }
        stale_dirs
    }

    /// Slots depending on any of `paths`, deduplicated.
    pub fn affected(&self, paths: &[PathBuf]) -> Vec<SlotName> {
        let mut out = BTreeSet::new();
        for path in paths {
            if let Some(slots) = self.by_path.get(path) {
                out.extend(slots.iter().cloned());
            }
        }
        out.into_iter().collect()
    }

    pub fn paths_of(&self, slot: &str) -> Option<&BTreeSet<PathBuf>> {
        self.by_slot.get(slot)
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// The directory watched on behalf of `path`. Watching the parent rather
/// than the file itself keeps rename-style saves (write temp file, move
/// over the original) visible.
fn watch_dir_of(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
