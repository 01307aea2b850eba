// src/proc/backend.rs

//! Pluggable process backend abstraction.
//!
//! The runtime talks to a `SlotBackend` instead of spawning processes
//! directly. This makes it easy to swap in a fake backend in tests while
//! keeping the production implementation in [`spawner`](super::spawner).
//!
//! A spawned process is represented by a boxed [`SlotProcess`]: the runtime
//! keeps it alive for as long as the generation is current and uses it for
//! the two teardown verbs. Exit reporting does not go through the handle;
//! the backend's own wait task emits `RuntimeEvent::SlotExited`.

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::tree::SlotName;

/// What the core decided to spawn.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub slot: SlotName,
    /// Generation assigned by the core; every event the backend emits for
    /// this process must carry it.
    pub generation: u64,
}

/// Handle to one live slot process.
pub trait SlotProcess: Send {
    /// Ask the process to exit by closing the control channel write side.
    /// The grace timer decides when this escalates to [`kill`](Self::kill).
    fn request_exit(&mut self);

    /// Force-terminate the process.
    fn kill(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Trait abstracting how slot processes are spawned.
///
/// Production code uses [`RealSlotBackend`](super::RealSlotBackend); tests
/// can provide their own implementation that doesn't spawn real processes.
pub trait SlotBackend: Send {
    /// Spawn a process for the given slot.
    ///
    /// The implementation is free to:
    /// - exec the plan's boot command (production)
    /// - simulate readiness/deps/exits by emitting `RuntimeEvent`s (tests)
    fn spawn_slot(
        &mut self,
        req: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn SlotProcess>>> + Send + '_>>;
}
