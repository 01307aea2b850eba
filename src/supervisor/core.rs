// src/supervisor/core.rs

//! Pure supervision state machine.
//!
//! This module contains a synchronous, deterministic core that consumes
//! [`RuntimeEvent`]s and produces:
//! - an updated slot tree
//! - a list of [`CoreCommand`]s describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`supervisor::runtime::Runtime`) is responsible
//! for:
//! - reading events from channels
//! - executing commands against the process backend
//! - arming boot/grace timers and publishing the routing table
//!
//! The core has no channels, no tokio types, and performs no IO, so the
//! whole lifecycle (boot cascade, restart batches, crash budgets, shutdown
//! ordering) is unit-testable without processes.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::supervisor::handlers::{
    mark_subtree_dead, request_exit_frontier, spawn_slot, CoreCommand, CoreStep,
};
use crate::supervisor::{RetryPolicy, RuntimeEvent};
use crate::tree::{ProcessTree, SlotId, SlotStatus};
use crate::types::{RouteEntry, RoutingTable};

/// Slots currently being torn down for respawn. The members are the
/// deduplicated union of every requested subtree; the batch dissolves into
/// respawns once every member's process is down.
#[derive(Debug)]
struct RestartBatch {
    members: BTreeSet<SlotId>,
}

#[derive(Debug)]
pub struct SupervisorCore {
    tree: ProcessTree,
    retry: RetryPolicy,
    batch: Option<RestartBatch>,
    /// Recent unexpected-exit timestamps per slot, pruned to the retry
    /// window.
    crashes: HashMap<SlotId, VecDeque<Instant>>,
    shutting_down: bool,
    /// Set when a fatal condition (root boot failure) decides the exit
    /// code ahead of the normal shutdown accounting.
    fatal: Option<i32>,
    /// A process had to be force-killed during shutdown.
    forced_kill: bool,
}

impl SupervisorCore {
    pub fn new(tree: ProcessTree, retry: RetryPolicy) -> Self {
        Self {
            tree,
            retry,
            batch: None,
            crashes: HashMap::new(),
            shutting_down: false,
            fatal: None,
            forced_kill: false,
        }
    }

    /// Read-only access for the shell and tests.
    pub fn tree(&self) -> &ProcessTree {
        &self.tree
    }

    /// Whether a dependency report from `(slot, generation)` should be
    /// registered. Stale generations and draining slots are rejected, so a
    /// report from a process being replaced can never re-associate files
    /// with the slot.
    pub fn accepts_files(&self, slot: &str, generation: u64) -> bool {
        if self.shutting_down {
            return false;
        }
        match self.tree.find(slot) {
            Some(id) => {
                let s = self.tree.get(id);
                s.generation == generation
                    && s.live
                    && matches!(s.status, SlotStatus::Booting | SlotStatus::Ready)
            }
            None => false,
        }
    }

    /// Routing snapshot for the command router.
    pub fn routes(&self) -> RoutingTable {
        self.tree
            .slots()
            .map(|s| {
                (
                    s.name.clone(),
                    RouteEntry {
                        status: s.status,
                        is_leaf: s.is_leaf(),
                        generation: s.generation,
                        endpoint: s.endpoint.clone(),
                    },
                )
            })
            .collect()
    }

    /// Handle a single event, updating the tree and returning the commands
    /// for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let mut step = CoreStep::default();

        match event {
            RuntimeEvent::StartTree => self.handle_start_tree(&mut step),
            RuntimeEvent::SlotReady { slot, generation } => {
                self.handle_slot_ready(&slot, generation, &mut step)
            }
            RuntimeEvent::SlotServing {
                slot,
                generation,
                endpoint,
            } => self.handle_slot_serving(&slot, generation, endpoint),
            RuntimeEvent::SlotExited {
                slot,
                generation,
                code,
            } => self.handle_slot_exited(&slot, generation, code, &mut step),
            RuntimeEvent::BootTimedOut { slot, generation } => {
                self.handle_boot_timeout(&slot, generation, &mut step)
            }
            RuntimeEvent::GraceTimedOut { slot, generation } => {
                self.handle_grace_timeout(&slot, generation, &mut step)
            }
            RuntimeEvent::RestartSlots { slots } => self.handle_restart(&slots, &mut step),
            RuntimeEvent::ShutdownRequested => self.handle_shutdown(&mut step),
            RuntimeEvent::SlotFiles { .. } | RuntimeEvent::FilesChanged { .. } => {
                // Resolved by the shell; reaching the core is a wiring bug.
                debug!("shell-level event reached the core; ignoring");
            }
        }

        step.exit = self.maybe_exit();
        step
    }

    fn handle_start_tree(&mut self, step: &mut CoreStep) {
        let root = self.tree.root();
        info!(root = %self.tree.get(root).name, "booting plan tree");
        spawn_slot(&mut self.tree, root, &mut step.commands);
    }

    fn handle_slot_ready(&mut self, name: &str, generation: u64, step: &mut CoreStep) {
        let Some(id) = self.find_or_warn(name) else {
            return;
        };
        let slot = self.tree.get(id);
        if slot.generation != generation || slot.status != SlotStatus::Booting {
            debug!(slot = %name, generation, "stale readiness signal; ignoring");
            return;
        }

        self.tree.get_mut(id).status = SlotStatus::Ready;
        info!(slot = %name, generation, "slot ready");

        if self.shutting_down {
            // Became ready mid-shutdown; fold it into the teardown.
            request_exit_frontier(&mut self.tree, self.shutting_down, &mut step.commands);
            return;
        }

        // Root-first cascade: children boot only once their parent is ready.
        let children = self.tree.get(id).children.clone();
        for child in children {
            if self.tree.get(child).status == SlotStatus::Pending {
                spawn_slot(&mut self.tree, child, &mut step.commands);
            }
        }
    }

    fn handle_slot_serving(&mut self, name: &str, generation: u64, endpoint: PathBuf) {
        let Some(id) = self.find_or_warn(name) else {
            return;
        };
        let slot = self.tree.get_mut(id);
        if slot.generation != generation
            || !slot.live
            || !matches!(slot.status, SlotStatus::Booting | SlotStatus::Ready)
        {
            debug!(slot = %name, generation, "stale serve announcement; ignoring");
            return;
        }
        debug!(slot = %name, generation, endpoint = ?endpoint, "session endpoint announced");
        slot.endpoint = Some(endpoint);
    }

    fn handle_slot_exited(
        &mut self,
        name: &str,
        generation: u64,
        code: Option<i32>,
        step: &mut CoreStep,
    ) {
        let Some(id) = self.find_or_warn(name) else {
            return;
        };
        let slot = self.tree.get(id);
        if slot.generation != generation || !slot.live {
            debug!(slot = %name, generation, "exit for a stale generation; ignoring");
            return;
        }

        let status = slot.status;
        {
            let slot = self.tree.get_mut(id);
            slot.live = false;
            slot.endpoint = None;
        }

        if self.shutting_down {
            debug!(slot = %name, generation, ?code, "slot exited during shutdown");
            self.tree.get_mut(id).status = SlotStatus::Dead;
            self.advance_teardown(step);
            return;
        }

        match status {
            SlotStatus::Restarting | SlotStatus::Dead => {
                // Expected teardown progress.
                debug!(slot = %name, generation, ?code, "slot torn down");
                self.advance_teardown(step);
            }
            SlotStatus::Booting => {
                warn!(slot = %name, generation, ?code, "slot exited before signalling readiness");
                self.handle_boot_failure(id, step);
            }
            SlotStatus::Ready => {
                self.handle_unexpected_exit(id, code, step);
            }
            SlotStatus::Pending => {
                debug!(slot = %name, generation, "exit for a pending slot; ignoring");
            }
        }
    }

    fn handle_boot_timeout(&mut self, name: &str, generation: u64, step: &mut CoreStep) {
        let Some(id) = self.find_or_warn(name) else {
            return;
        };
        let slot = self.tree.get(id);
        if slot.generation != generation || !slot.live || slot.status != SlotStatus::Booting {
            return;
        }

        warn!(slot = %name, generation, "no readiness signal within boot timeout");
        {
            let slot = self.tree.get_mut(id);
            slot.exit_requested = true;
        }
        step.commands.push(CoreCommand::KillSlot {
            slot: name.to_string(),
            generation,
        });
        self.handle_boot_failure(id, step);
    }

    fn handle_grace_timeout(&mut self, name: &str, generation: u64, step: &mut CoreStep) {
        let Some(id) = self.find_or_warn(name) else {
            return;
        };
        let slot = self.tree.get(id);
        if slot.generation != generation || !slot.live {
            return;
        }

        warn!(slot = %name, generation, "grace period exceeded; force-killing");
        if self.shutting_down {
            self.forced_kill = true;
        }
        step.commands.push(CoreCommand::KillSlot {
            slot: name.to_string(),
            generation,
        });
    }

    /// A spawned process failed to reach readiness. Fatal for the root,
    /// local to the subtree otherwise.
    fn handle_boot_failure(&mut self, id: SlotId, step: &mut CoreStep) {
        mark_subtree_dead(&mut self.tree, id, &mut step.commands);
        let tree = &self.tree;
        if let Some(batch) = &mut self.batch {
            // Dead slots stay in the batch only as teardown bookkeeping;
            // drop the ones that will never come back so the batch can
            // dissolve.
            batch.members.retain(|&m| tree.get(m).status != SlotStatus::Dead);
        }

        if id == self.tree.root() {
            warn!("root slot failed to boot; shutting down");
            self.fatal = Some(1);
            self.shutting_down = true;
            self.batch = None;
            self.mark_all_dead(step);
        }

        self.advance_teardown(step);
    }

    /// A ready slot's process died outside any planned teardown.
    fn handle_unexpected_exit(&mut self, id: SlotId, code: Option<i32>, step: &mut CoreStep) {
        let name = self.tree.get(id).name.clone();
        let now = Instant::now();

        let history = self.crashes.entry(id).or_default();
        history.push_back(now);
        while let Some(&front) = history.front() {
            if now.duration_since(front) > self.retry.window {
                history.pop_front();
            } else {
                break;
            }
        }
        let recent = history.len() as u32;

        if recent > self.retry.budget {
            warn!(
                slot = %name,
                ?code,
                crashes = recent,
                budget = self.retry.budget,
                "unexpected-exit budget exhausted; marking subtree permanently dead"
            );
            mark_subtree_dead(&mut self.tree, id, &mut step.commands);
            self.advance_teardown(step);
            return;
        }

        warn!(
            slot = %name,
            ?code,
            crashes = recent,
            budget = self.retry.budget,
            "slot exited unexpectedly; respawning its subtree"
        );
        self.begin_restart(vec![id], false, step);
    }

    fn handle_restart(&mut self, slots: &[String], step: &mut CoreStep) {
        if self.shutting_down {
            debug!(?slots, "restart request during shutdown; ignoring");
            return;
        }

        let mut seeds = Vec::new();
        for name in slots {
            match self.tree.find(name) {
                Some(id) if self.tree.get(id).status == SlotStatus::Dead => {
                    // Dead slots have no registered dependencies; a seed
                    // here means a stale resolution. Nothing to do.
                    debug!(slot = %name, "restart seed is dead; skipping");
                }
                Some(id) => seeds.push(id),
                None => warn!(slot = %name, "restart request for unknown slot; ignoring"),
            }
        }

        if seeds.is_empty() {
            return;
        }

        info!(?slots, "dependency change; restarting affected subtrees");
        self.begin_restart(seeds, true, step);
    }

    fn handle_shutdown(&mut self, step: &mut CoreStep) {
        if self.shutting_down {
            debug!("shutdown already in progress");
            return;
        }
        info!("shutdown requested; tearing down the tree");
        self.shutting_down = true;
        self.batch = None;
        self.mark_all_dead(step);
        self.advance_teardown(step);
    }

    /// Start (or extend) the restart batch with the subtrees under `seeds`.
    ///
    /// A later request overlapping an in-flight batch merges into it: the
    /// union tears down together and only the final membership respawns,
    /// which is what makes overlapping requests supersede older ones.
    fn begin_restart(&mut self, seeds: Vec<SlotId>, reset_history: bool, step: &mut CoreStep) {
        let members = self.tree.restart_set(seeds);

        for &id in &members {
            let already_member = self
                .batch
                .as_ref()
                .is_some_and(|b| b.members.contains(&id));
            if already_member {
                continue;
            }

            if reset_history {
                // The on-disk state the crashes were blamed on is being
                // replaced; give the slot a fresh budget.
                self.crashes.remove(&id);
            }

            let slot = self.tree.get_mut(id);
            if slot.status == SlotStatus::Dead && !reset_history {
                // Crash-triggered restarts never resurrect a dead subtree.
                continue;
            }
            slot.status = SlotStatus::Restarting;
            slot.endpoint = None;
            step.commands.push(CoreCommand::ClearDeps {
                slot: slot.name.clone(),
            });

            match &mut self.batch {
                Some(batch) => {
                    batch.members.insert(id);
                }
                None => {
                    self.batch = Some(RestartBatch {
                        members: BTreeSet::from([id]),
                    });
                }
            }
        }

        self.advance_teardown(step);
    }

    /// Drive every in-flight teardown forward: request exits leaf-first,
    /// dissolve the restart batch into respawns once it is fully down.
    fn advance_teardown(&mut self, step: &mut CoreStep) {
        request_exit_frontier(&mut self.tree, self.shutting_down, &mut step.commands);

        let batch_down = self
            .batch
            .as_ref()
            .is_some_and(|b| b.members.iter().all(|&m| !self.tree.get(m).live));
        if batch_down {
            let members = self.batch.take().expect("batch checked above").members;
            self.finish_restart(&members, step);
        }
    }

    /// Respawn a fully-town-down batch root-first. Batch roots with a ready
    /// parent (or no parent) spawn immediately; the rest are left pending
    /// for the readiness cascade.
    fn finish_restart(&mut self, members: &BTreeSet<SlotId>, step: &mut CoreStep) {
        for &id in members {
            let slot = self.tree.get_mut(id);
            if slot.status == SlotStatus::Restarting {
                slot.status = SlotStatus::Pending;
            }
        }

        // BTreeSet iteration is arena order, which is root-first.
        for &id in members {
            if self.tree.get(id).status != SlotStatus::Pending {
                continue;
            }
            match self.tree.get(id).parent {
                None => spawn_slot(&mut self.tree, id, &mut step.commands),
                Some(parent) if !members.contains(&parent) => {
                    match self.tree.get(parent).status {
                        SlotStatus::Ready => {
                            spawn_slot(&mut self.tree, id, &mut step.commands)
                        }
                        SlotStatus::Dead => {
                            warn!(
                                slot = %self.tree.get(id).name,
                                parent = %self.tree.get(parent).name,
                                "cannot respawn under a dead parent; marking subtree dead"
                            );
                            mark_subtree_dead(&mut self.tree, id, &mut step.commands);
                        }
                        // Parent is itself booting or pending; the cascade
                        // spawns this slot when the parent becomes ready.
                        _ => {}
                    }
                }
                // Parent is a batch member: spawned via the cascade.
                Some(_) => {}
            }
        }
    }

    fn mark_all_dead(&mut self, step: &mut CoreStep) {
        let root = self.tree.root();
        mark_subtree_dead(&mut self.tree, root, &mut step.commands);
    }

    fn maybe_exit(&self) -> Option<i32> {
        if !self.shutting_down {
            return None;
        }
        if self.tree.slots().any(|s| s.live) {
            return None;
        }
        Some(self.fatal.unwrap_or(if self.forced_kill { 1 } else { 0 }))
    }

    fn find_or_warn(&self, name: &str) -> Option<SlotId> {
        let id = self.tree.find(name);
        if id.is_none() {
            warn!(slot = %name, "event for unknown slot; ignoring");
        }
        id
    }

    /// Whether a restart batch is currently tearing down (for tests).
    pub fn restart_in_progress(&self) -> bool {
        self.batch.is_some()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }
}
