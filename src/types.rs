// src/types.rs

//! Small types shared between the supervisor (writer) and the router
//! (reader).

use std::collections::HashMap;
use std::path::PathBuf;

use crate::tree::{SlotName, SlotStatus};

/// Read-only routing view of a single slot, published by the supervisor
/// after every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub status: SlotStatus,
    pub is_leaf: bool,
    /// Process identity: bumped on every respawn. A session attached under
    /// one generation must not survive into the next.
    pub generation: u64,
    /// Session socket announced by a leaf process, present only while the
    /// announcing generation is current.
    pub endpoint: Option<PathBuf>,
}

/// Snapshot of the whole tree as the router sees it.
///
/// Replaced wholesale over a `tokio::sync::watch` channel, so readers
/// observe either the previous or the next snapshot, never a partial
/// update.
pub type RoutingTable = HashMap<SlotName, RouteEntry>;
