// src/tree/mod.rs

//! The slot arena: tree shape and per-slot process state.
//!
//! - [`slot`] defines the supervised unit and its lifecycle states.
//! - [`arena`] holds the [`ProcessTree`] built from a validated plan,
//!   with name lookup, subtree enumeration and restart-set computation.
//!
//! The tree is only ever mutated by the supervisor core; everything else
//! sees it through the published routing table.

pub mod arena;
pub mod slot;

pub use arena::ProcessTree;
pub use slot::{Slot, SlotId, SlotName, SlotStatus};
