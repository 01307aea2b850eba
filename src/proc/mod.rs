// src/proc/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually spawning slot processes with
//! `tokio::process::Command`, speaking the control protocol over their
//! stdin/stdout, and reporting back to the supervision runtime via
//! `RuntimeEvent`s.
//!
//! - [`backend`] provides the `SlotBackend`/`SlotProcess` traits that the
//!   runtime talks to in production, and which tests replace with a fake
//!   implementation.
//! - [`spawner`] contains the real backend: command building, the control
//!   line reader, the stderr drain, and the wait/kill task.
//!
//! Control protocol (process side):
//! - the first line on stdin is the slot name to boot;
//! - `dep <path>` on stdout reports a loaded file;
//! - `serve <path>` on stdout announces a leaf's session socket;
//! - `ready` on stdout signals that boot work is complete;
//! - stdin closing is the request to exit.

pub mod backend;
pub mod spawner;

pub use backend::{SlotBackend, SlotProcess, SpawnRequest};
pub use spawner::RealSlotBackend;
