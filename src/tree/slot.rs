// src/tree/slot.rs

//! The supervised unit: one plan position plus its live process state.

use std::path::PathBuf;

/// Index of a slot in the [`ProcessTree`](super::ProcessTree) arena.
pub type SlotId = usize;

/// Canonical slot name type used throughout the crate.
pub type SlotName = String;

/// Lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// Not yet spawned (initial boot, or waiting for its parent to become
    /// ready again after a restart).
    Pending,
    /// Spawned, waiting for the readiness signal.
    Booting,
    /// Process signalled readiness; leaves accept sessions in this state.
    Ready,
    /// Part of a restart batch whose teardown has not finished yet.
    Restarting,
    /// Not running and not coming back without outside intervention
    /// (boot failure, exhausted retry budget, or shutdown).
    Dead,
}

/// One supervised tree position.
///
/// Identity (name, parent, children) is fixed at tree build time; only the
/// process-related fields change across respawns.
#[derive(Debug, Clone)]
pub struct Slot {
    pub name: SlotName,
    pub parent: Option<SlotId>,
    pub children: Vec<SlotId>,
    pub status: SlotStatus,
    /// Bumped on every spawn; 0 means never spawned. Together with `live`
    /// this is the process identity the rest of the system keys on.
    pub generation: u64,
    /// Whether a spawned process currently exists for `generation`.
    pub live: bool,
    /// Session socket announced by the current generation (leaves only).
    pub endpoint: Option<PathBuf>,
    /// Whether the current generation has already been asked to exit.
    pub exit_requested: bool,
}

impl Slot {
    pub fn new(name: SlotName, parent: Option<SlotId>) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            status: SlotStatus::Pending,
            generation: 0,
            live: false,
            endpoint: None,
            exit_requested: false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
