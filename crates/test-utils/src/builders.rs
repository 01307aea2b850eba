#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use preheat::plan::{MasterSection, PlanFile, RawPlanFile, RawPlanNode};

/// Builder for `PlanFile` to simplify test setup.
///
/// Slots are declared flat with an optional parent; `build()` assembles the
/// nested raw tree and runs the normal validation path.
pub struct PlanFileBuilder {
    master: MasterSection,
    slots: Vec<(String, Option<String>)>,
}

impl PlanFileBuilder {
    pub fn new(command: &str) -> Self {
        Self {
            master: MasterSection {
                command: command.to_string(),
                socket: PathBuf::from(".preheat.sock"),
                debounce_ms: 50,
                boot_timeout_ms: 2_000,
                grace_ms: 1_000,
                session_wait_ms: 2_000,
                retry_budget: 3,
                retry_window_ms: 30_000,
            },
            slots: Vec::new(),
        }
    }

    pub fn with_root(mut self, name: &str) -> Self {
        self.slots.push((name.to_string(), None));
        self
    }

    pub fn with_slot(mut self, name: &str, parent: &str) -> Self {
        self.slots
            .push((name.to_string(), Some(parent.to_string())));
        self
    }

    pub fn with_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.master.socket = path.into();
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.master.debounce_ms = ms;
        self
    }

    pub fn with_boot_timeout_ms(mut self, ms: u64) -> Self {
        self.master.boot_timeout_ms = ms;
        self
    }

    pub fn with_grace_ms(mut self, ms: u64) -> Self {
        self.master.grace_ms = ms;
        self
    }

    pub fn with_session_wait_ms(mut self, ms: u64) -> Self {
        self.master.session_wait_ms = ms;
        self
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.master.retry_budget = budget;
        self
    }

    pub fn build(self) -> PlanFile {
        let mut plan = BTreeMap::new();
        for (name, parent) in &self.slots {
            if parent.is_none() {
                plan.insert(name.clone(), self.subtree_of(name));
            }
        }

        let raw = RawPlanFile {
            master: self.master,
            plan,
        };
        PlanFile::try_from(raw).expect("Failed to build valid plan from builder")
    }

    fn subtree_of(&self, name: &str) -> RawPlanNode {
        let mut children = BTreeMap::new();
        for (child, parent) in &self.slots {
            if parent.as_deref() == Some(name) {
                children.insert(child.clone(), self.subtree_of(child));
            }
        }
        RawPlanNode(children)
    }
}
