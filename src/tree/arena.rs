// src/tree/arena.rs

//! Slot arena built from a validated plan tree.
//!
//! Slots are stored in root-first depth-first order, so `subtree_of` and
//! `restart_set` yield spawn order directly and teardown order is simply
//! the reverse. Parent/child links are arena indices, which keeps lookup
//! O(1) without ownership cycles.

use std::collections::HashMap;

use crate::errors::{PreheatError, Result};
use crate::plan::PlanNode;
use crate::tree::slot::{Slot, SlotId, SlotName};

#[derive(Debug)]
pub struct ProcessTree {
    slots: Vec<Slot>,
    by_name: HashMap<SlotName, SlotId>,
    root: SlotId,
}

impl ProcessTree {
    /// Instantiate the slot arena for a plan tree.
    ///
    /// Duplicate names are rejected at plan validation; this re-checks so
    /// the arena's name index can never silently shadow a slot.
    pub fn build(plan_root: &PlanNode) -> Result<Self> {
        let mut tree = Self {
            slots: Vec::new(),
            by_name: HashMap::new(),
            root: 0,
        };
        tree.root = tree.add_node(plan_root, None)?;
        Ok(tree)
    }

    fn add_node(&mut self, node: &PlanNode, parent: Option<SlotId>) -> Result<SlotId> {
        let id = self.slots.len();
        if self.by_name.insert(node.name.clone(), id).is_some() {
            return Err(PreheatError::PlanError(format!(
                "duplicate node name '{}' in plan tree",
                node.name
            )));
        }
        self.slots.push(Slot::new(node.name.clone(), parent));

        for child in &node.children {
            let child_id = self.add_node(child, Some(id))?;
            self.slots[id].children.push(child_id);
        }
        Ok(id)
    }

    pub fn root(&self) -> SlotId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: SlotId) -> &Slot {
        &self.slots[id]
    }

    pub fn get_mut(&mut self, id: SlotId) -> &mut Slot {
        &mut self.slots[id]
    }

    /// Look a slot up by name.
    pub fn find(&self, name: &str) -> Option<SlotId> {
        self.by_name.get(name).copied()
    }

    /// All slot ids in root-first depth-first order.
    pub fn ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        0..self.slots.len()
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    /// The subtree rooted at `id`, root first.
    pub fn subtree_of(&self, id: SlotId) -> Vec<SlotId> {
        let mut out = Vec::new();
        self.collect_subtree(id, &mut out);
        out
    }

    fn collect_subtree(&self, id: SlotId, out: &mut Vec<SlotId>) {
        out.push(id);
        for &child in &self.slots[id].children {
            self.collect_subtree(child, out);
        }
    }

    /// Deduplicated union of the subtrees rooted at `seeds`, in root-first
    /// order. A shared ancestor appears exactly once, so a file depended on
    /// by several subtrees restarts the union rather than each subtree
    /// independently.
    pub fn restart_set(&self, seeds: impl IntoIterator<Item = SlotId>) -> Vec<SlotId> {
        let mut member = vec![false; self.slots.len()];
        for seed in seeds {
            for id in self.subtree_of(seed) {
                member[id] = true;
            }
        }
        // Arena order is root-first DFS order already.
        (0..self.slots.len()).filter(|&id| member[id]).collect()
    }
}
