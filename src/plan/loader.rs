// src/plan/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::plan::model::{PlanFile, RawPlanFile};

/// Load a plan file from a given path and return the raw `RawPlanFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (single root, unique names, etc.). Use [`load_and_validate`]
/// for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPlanFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let plan: RawPlanFile = toml::from_str(&contents)?;

    Ok(plan)
}

/// Load a plan file from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + default fns).
/// - Checks for:
///   - a non-empty boot command,
///   - exactly one root node under `[plan]`,
///   - unique node names across the whole tree,
///   - basic policy value sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PlanFile> {
    let raw = load_from_path(&path)?;
    let plan = PlanFile::try_from(raw)?;
    Ok(plan)
}

/// Helper to resolve a default plan file path.
///
/// Currently this just returns `Preheat.toml` in the current working
/// directory; it exists so that config discovery (env var, parent
/// directories) can be added in one place later.
pub fn default_plan_path() -> PathBuf {
    PathBuf::from("Preheat.toml")
}
