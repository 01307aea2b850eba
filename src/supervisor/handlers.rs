// src/supervisor/handlers.rs

//! Core step results and the tree-mutation helpers shared by the event
//! handlers in [`super::core`].

use tracing::debug;

use crate::tree::{ProcessTree, SlotId, SlotName, SlotStatus};

/// What the IO shell should do after a core step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Spawn a process for this slot. The generation is the one the core
    /// just assigned; all later events for this process carry it.
    SpawnSlot { slot: SlotName, generation: u64 },
    /// Ask the process to exit gracefully (close its control channel) and
    /// arm the grace timer.
    RequestSlotExit { slot: SlotName, generation: u64 },
    /// Force-kill the process.
    KillSlot { slot: SlotName, generation: u64 },
    /// Drop every dependency registration for this slot from the file
    /// monitor. Always ordered before the slot's next `SpawnSlot`, so a
    /// stale path can never be attributed to the replacement process.
    ClearDeps { slot: SlotName },
}

/// Result of feeding one event into the core.
#[derive(Debug, Default)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// `Some(code)` once the whole tree is down and the process should
    /// exit with `code`.
    pub exit: Option<i32>,
}

/// Bump the generation and mark a slot as spawned.
pub(super) fn spawn_slot(tree: &mut ProcessTree, id: SlotId, commands: &mut Vec<CoreCommand>) {
    let slot = tree.get_mut(id);
    slot.generation += 1;
    slot.status = SlotStatus::Booting;
    slot.live = true;
    slot.endpoint = None;
    slot.exit_requested = false;
    commands.push(CoreCommand::SpawnSlot {
        slot: slot.name.clone(),
        generation: slot.generation,
    });
}

/// Mark a whole subtree dead and clear its dependency registrations.
///
/// Live processes in the subtree are not told to exit here; the caller's
/// teardown sweep picks them up leaf-first.
pub(super) fn mark_subtree_dead(
    tree: &mut ProcessTree,
    seed: SlotId,
    commands: &mut Vec<CoreCommand>,
) {
    for id in tree.subtree_of(seed) {
        let slot = tree.get_mut(id);
        slot.endpoint = None;
        if slot.status != SlotStatus::Dead {
            slot.status = SlotStatus::Dead;
            commands.push(CoreCommand::ClearDeps {
                slot: slot.name.clone(),
            });
        }
    }
}

/// Whether a live slot is part of some teardown (restart batch, dead
/// subtree, or full shutdown) and should exit once its children are down.
pub(super) fn is_draining(tree: &ProcessTree, id: SlotId, shutting_down: bool) -> bool {
    let slot = tree.get(id);
    slot.live
        && (shutting_down
            || slot.status == SlotStatus::Dead
            || slot.status == SlotStatus::Restarting)
}

/// Leaf-first exit-request sweep: every draining slot whose children are
/// all down is asked to exit. Iterates the arena in reverse (leaf-first)
/// order so the emitted command order matches the teardown invariant.
pub(super) fn request_exit_frontier(
    tree: &mut ProcessTree,
    shutting_down: bool,
    commands: &mut Vec<CoreCommand>,
) {
    let ids: Vec<SlotId> = tree.ids().collect();
    for &id in ids.iter().rev() {
        if !is_draining(tree, id, shutting_down) {
            continue;
        }
        let children_down = tree
            .get(id)
            .children
            .iter()
            .all(|&child| !tree.get(child).live);
        if !children_down {
            continue;
        }
        let slot = tree.get_mut(id);
        if slot.exit_requested {
            continue;
        }
        slot.exit_requested = true;
        debug!(slot = %slot.name, generation = slot.generation, "requesting exit");
        commands.push(CoreCommand::RequestSlotExit {
            slot: slot.name.clone(),
            generation: slot.generation,
        });
    }
}
