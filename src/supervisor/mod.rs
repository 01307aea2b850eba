// src/supervisor/mod.rs

//! Supervision engine for preheat.
//!
//! This module ties together:
//! - the slot tree (who exists, who spawns before whom)
//! - restart batches (what happens when dependency files change)
//! - the main control loop that reacts to:
//!   - process readiness / dependency reports / exits
//!   - debounced filesystem changes
//!   - boot and grace timers
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. Every tree mutation flows through the core's
//! `step`, which is what makes concurrent triggers (a crash and a file
//! change hitting the same subtree) safe to reason about.

use std::path::PathBuf;
use std::time::Duration;

use crate::tree::SlotName;

/// Crash tolerance for a single slot: more than `budget` unexpected exits
/// within `window` marks the slot (and its subtree) permanently dead.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub budget: u32,
    pub window: Duration,
}

/// Events flowing into the control loop from control-channel readers,
/// the file monitor, timers, and the signal handler.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Instantiate and boot the tree (sent once at startup).
    StartTree,
    /// A slot process signalled readiness on its control channel.
    SlotReady { slot: SlotName, generation: u64 },
    /// A leaf announced the unix socket it answers sessions on.
    SlotServing {
        slot: SlotName,
        generation: u64,
        endpoint: PathBuf,
    },
    /// A slot process reported files it has loaded.
    SlotFiles {
        slot: SlotName,
        generation: u64,
        paths: Vec<PathBuf>,
    },
    /// A slot process exited. `code` is `None` for signal-terminated
    /// (including force-killed) processes.
    SlotExited {
        slot: SlotName,
        generation: u64,
        code: Option<i32>,
    },
    /// The boot timer for a spawned generation fired.
    BootTimedOut { slot: SlotName, generation: u64 },
    /// The grace timer following an exit request fired.
    GraceTimedOut { slot: SlotName, generation: u64 },
    /// Debounced batch of raw filesystem event paths. Resolved against the
    /// dependency index by the shell before it reaches the core.
    FilesChanged { paths: Vec<PathBuf> },
    /// Restart the subtrees rooted at these slots (resolved form).
    RestartSlots { slots: Vec<SlotName> },
    /// Graceful shutdown requested (signal or operator).
    ShutdownRequested,
}

pub mod core;
pub mod handlers;
pub mod runtime;

pub use core::SupervisorCore;
pub use handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
