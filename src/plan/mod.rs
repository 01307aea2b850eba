// src/plan/mod.rs

//! Plan file loading and validation.
//!
//! - [`model`] holds the raw and validated data types.
//! - [`loader`] reads TOML from disk.
//! - [`validate`] turns a `RawPlanFile` into a [`PlanFile`] via `TryFrom`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_plan_path, load_and_validate, load_from_path};
pub use model::{MasterSection, PlanFile, PlanNode, RawPlanFile, RawPlanNode};
