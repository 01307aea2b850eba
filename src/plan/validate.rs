// src/plan/validate.rs

use std::collections::BTreeSet;

use crate::errors::{PreheatError, Result};
use crate::plan::model::{PlanFile, PlanNode, RawPlanFile, RawPlanNode};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = crate::errors::PreheatError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        validate_master(&raw)?;
        let root = single_root(&raw)?;
        let root = build_node(root.0, root.1);
        ensure_unique_names(&root)?;
        Ok(PlanFile::new_unchecked(raw.master, root))
    }
}

fn validate_master(raw: &RawPlanFile) -> Result<()> {
    if raw.master.command.trim().is_empty() {
        return Err(PreheatError::PlanError(
            "[master].command must not be empty".to_string(),
        ));
    }

    if raw.master.boot_timeout_ms == 0 {
        return Err(PreheatError::PlanError(
            "[master].boot_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if raw.master.retry_window_ms == 0 {
        return Err(PreheatError::PlanError(
            "[master].retry_window_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn single_root(raw: &RawPlanFile) -> Result<(&str, &RawPlanNode)> {
    let mut roots = raw.plan.iter();

    let first = roots.next().ok_or_else(|| {
        PreheatError::PlanError(
            "plan must declare a root node under [plan]".to_string(),
        )
    })?;

    if let Some((second, _)) = roots.next() {
        return Err(PreheatError::PlanError(format!(
            "plan must have exactly one root node (found '{}' and '{}')",
            first.0, second
        )));
    }

    Ok((first.0.as_str(), first.1))
}

fn build_node(name: &str, raw: &RawPlanNode) -> PlanNode {
    let children = raw
        .0
        .iter()
        .map(|(child, sub)| build_node(child, sub))
        .collect();

    PlanNode {
        name: name.to_string(),
        children,
    }
}

fn ensure_unique_names(root: &PlanNode) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in root.names() {
        if !seen.insert(name) {
            return Err(PreheatError::PlanError(format!(
                "duplicate node name '{}' in plan tree",
                name
            )));
        }
    }
    Ok(())
}
