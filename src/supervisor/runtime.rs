// src/supervisor/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::monitor::FileMonitor;
use crate::plan::MasterSection;
use crate::proc::{SlotBackend, SlotProcess, SpawnRequest};
use crate::supervisor::core::SupervisorCore;
use crate::supervisor::handlers::CoreCommand;
use crate::supervisor::RuntimeEvent;
use crate::tree::SlotName;
use crate::types::RoutingTable;

/// One live process handle, keyed under its slot name.
struct ActiveProcess {
    generation: u64,
    process: Box<dyn SlotProcess>,
}

/// Drives the supervision core in response to `RuntimeEvent`s and delegates
/// process operations to a [`SlotBackend`].
///
/// This is a pure IO shell around [`SupervisorCore`], which contains all
/// the lifecycle semantics. The shell handles async IO: reading events from
/// the channel, resolving file changes through the [`FileMonitor`], arming
/// boot/grace timers, and publishing the routing table for the command
/// router.
pub struct Runtime<B: SlotBackend> {
    core: SupervisorCore,
    events_rx: mpsc::Receiver<RuntimeEvent>,
    /// Cloned into timer tasks so their expiries re-enter the single loop.
    events_tx: mpsc::Sender<RuntimeEvent>,
    backend: B,
    monitor: FileMonitor,
    routes_tx: watch::Sender<RoutingTable>,
    handles: HashMap<SlotName, ActiveProcess>,
    boot_timeout: Duration,
    grace: Duration,
}

impl<B: SlotBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<B: SlotBackend> Runtime<B> {
    pub fn new(
        core: SupervisorCore,
        events_rx: mpsc::Receiver<RuntimeEvent>,
        events_tx: mpsc::Sender<RuntimeEvent>,
        backend: B,
        monitor: FileMonitor,
        routes_tx: watch::Sender<RoutingTable>,
        master: &MasterSection,
    ) -> Self {
        Self {
            core,
            events_rx,
            events_tx,
            backend,
            monitor,
            routes_tx,
            handles: HashMap::new(),
            boot_timeout: master.boot_timeout(),
            grace: master.grace(),
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from the channel.
    /// - Feeds them into the pure core.
    /// - Executes the commands returned by the core against the backend.
    ///
    /// Returns the process exit code once the core decides the tree is
    /// fully torn down.
    pub async fn run(mut self) -> Result<i32> {
        info!("preheat runtime started");
        self.publish_routes();

        loop {
            let event = match self.events_rx.recv().await {
                Some(e) => e,
                None => {
                    warn!("runtime event channel closed; exiting");
                    return Ok(1);
                }
            };

            debug!(?event, "runtime received event");

            if let RuntimeEvent::SlotExited {
                slot, generation, ..
            } = &event
            {
                self.reap_handle(slot, *generation);
            }

            let step = match event {
                RuntimeEvent::FilesChanged { paths } => {
                    let slots = self.monitor.affected_slots(&paths);
                    if slots.is_empty() {
                        debug!("filesystem change matched no registered dependency");
                        continue;
                    }
                    self.core.step(RuntimeEvent::RestartSlots { slots })
                }
                RuntimeEvent::SlotFiles {
                    slot,
                    generation,
                    paths,
                } => {
                    if self.core.accepts_files(&slot, generation) {
                        for path in paths {
                            self.monitor.register_dependency(&slot, path);
                        }
                    } else {
                        debug!(
                            slot = %slot,
                            generation,
                            "dependency report from a stale generation; dropping"
                        );
                    }
                    continue;
                }
                other => self.core.step(other),
            };

            for command in step.commands {
                self.execute_command(command).await;
            }

            self.publish_routes();

            if let Some(code) = step.exit {
                info!(code, "runtime exiting");
                return Ok(code);
            }
        }
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::SpawnSlot { slot, generation } => {
                self.spawn_slot(slot, generation).await;
            }
            CoreCommand::RequestSlotExit { slot, generation } => {
                if let Some(active) = self.current_handle(&slot, generation) {
                    active.process.request_exit();
                    self.arm_grace_timer(slot, generation);
                }
            }
            CoreCommand::KillSlot { slot, generation } => {
                if let Some(active) = self.current_handle(&slot, generation) {
                    active.process.kill().await;
                }
            }
            CoreCommand::ClearDeps { slot } => {
                self.monitor.clear_dependencies(&slot);
            }
        }
    }

    async fn spawn_slot(&mut self, slot: SlotName, generation: u64) {
        let req = SpawnRequest {
            slot: slot.clone(),
            generation,
        };
        match self.backend.spawn_slot(req).await {
            Ok(process) => {
                self.handles.insert(
                    slot.clone(),
                    ActiveProcess {
                        generation,
                        process,
                    },
                );
                self.arm_boot_timer(slot, generation);
            }
            Err(err) => {
                error!(slot = %slot, generation, error = %err, "failed to spawn slot process");
                // Surface the failure as an immediate exit so the core's
                // boot-failure handling applies. Sent from a task so the
                // loop never awaits capacity in its own channel.
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let _ = tx
                        .send(RuntimeEvent::SlotExited {
                            slot,
                            generation,
                            code: None,
                        })
                        .await;
                });
            }
        }
    }

    fn current_handle(&mut self, slot: &str, generation: u64) -> Option<&mut ActiveProcess> {
        match self.handles.get_mut(slot) {
            Some(active) if active.generation == generation => Some(active),
            Some(_) => {
                debug!(slot = %slot, generation, "command for a stale handle; skipping");
                None
            }
            None => {
                debug!(slot = %slot, generation, "command for an unknown handle; skipping");
                None
            }
        }
    }

    /// Drop the process handle once its exit has been observed.
    fn reap_handle(&mut self, slot: &str, generation: u64) {
        if self
            .handles
            .get(slot)
            .is_some_and(|active| active.generation == generation)
        {
            self.handles.remove(slot);
        }
    }

    fn arm_boot_timer(&self, slot: SlotName, generation: u64) {
        let tx = self.events_tx.clone();
        let timeout = self.boot_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            // The core ignores this if the slot became ready (or the
            // generation moved on) in the meantime.
            let _ = tx
                .send(RuntimeEvent::BootTimedOut { slot, generation })
                .await;
        });
    }

    fn arm_grace_timer(&self, slot: SlotName, generation: u64) {
        let tx = self.events_tx.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx
                .send(RuntimeEvent::GraceTimedOut { slot, generation })
                .await;
        });
    }

    fn publish_routes(&self) {
        // Receivers may all be gone (tests without a router); that's fine.
        let _ = self.routes_tx.send(self.core.routes());
    }
}
