// src/plan/model.rs

//! Plan file data model.
//!
//! A plan file has two parts:
//!
//! - `[master]` — the command used to boot every slot process, the public
//!   socket path, and tunable policy values (debounce window, boot timeout,
//!   teardown grace, session wait, crash retry budget).
//! - `[plan.…]` — a nested table tree naming the slots. Table nesting is
//!   the parent/child relation; leaves are the nodes clients may request.
//!
//! `RawPlanFile` is the deserialized form; [`PlanFile`] is the validated
//! form produced via `TryFrom` in [`super::validate`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Plan file as read from disk, prior to semantic validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlanFile {
    pub master: MasterSection,
    #[serde(default)]
    pub plan: BTreeMap<String, RawPlanNode>,
}

/// A node in the raw plan tree: just its children, keyed by name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlanNode(pub BTreeMap<String, RawPlanNode>);

/// The `[master]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MasterSection {
    /// Shell command spawned for every slot. The slot name is written to
    /// the child's stdin as the first line of the control channel.
    pub command: String,

    /// Public command socket path.
    #[serde(default = "default_socket")]
    pub socket: PathBuf,

    /// Coalescing window for filesystem events.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long a spawned process has to signal readiness.
    #[serde(default = "default_boot_timeout_ms")]
    pub boot_timeout_ms: u64,

    /// Grace period between the exit request and a forced kill.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// How long a client session waits for a slot to become ready.
    #[serde(default = "default_session_wait_ms")]
    pub session_wait_ms: u64,

    /// Unexpected exits tolerated per slot within `retry_window_ms` before
    /// the slot is surfaced as permanently dead.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Sliding window for `retry_budget`.
    #[serde(default = "default_retry_window_ms")]
    pub retry_window_ms: u64,
}

fn default_socket() -> PathBuf {
    PathBuf::from(".preheat.sock")
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_boot_timeout_ms() -> u64 {
    10_000
}

fn default_grace_ms() -> u64 {
    5_000
}

fn default_session_wait_ms() -> u64 {
    5_000
}

fn default_retry_budget() -> u32 {
    3
}

fn default_retry_window_ms() -> u64 {
    30_000
}

impl MasterSection {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_millis(self.boot_timeout_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn session_wait(&self) -> Duration {
        Duration::from_millis(self.session_wait_ms)
    }

    pub fn retry_window(&self) -> Duration {
        Duration::from_millis(self.retry_window_ms)
    }
}

/// Validated, immutable plan node. Children are kept in name order (the
/// plan tables deserialize into a `BTreeMap`), which makes spawn order
/// deterministic across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    pub name: String,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// All names in this subtree, root first.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        out.push(self.name.as_str());
        for child in &self.children {
            child.collect_names(out);
        }
    }
}

/// A validated plan file: master settings plus a single root node.
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub master: MasterSection,
    pub root: PlanNode,
}

impl PlanFile {
    /// Construct without re-validating. Only `validate` should call this.
    pub(crate) fn new_unchecked(master: MasterSection, root: PlanNode) -> Self {
        Self { master, root }
    }
}
