//! Property tests over random plan shapes, driving the pure supervision
//! core with a synchronous scripted backend:
//!
//! - spawn order within any subtree is root-first (a slot only ever spawns
//!   after its parent reported ready);
//! - teardown order is leaf-first (a slot is only asked to exit once all
//!   of its children are down);
//! - restarting a subtree never changes the process identity of any slot
//!   outside it.

use std::collections::HashMap;

use proptest::prelude::*;

use preheat::plan::PlanNode;
use preheat::supervisor::{CoreCommand, RetryPolicy, RuntimeEvent, SupervisorCore};
use preheat::tree::ProcessTree;

/// A random tree as a parent-pointer vector: node `i + 1`'s parent is
/// `parents[i] % (i + 1)`, which always yields a connected tree rooted at
/// node 0.
fn tree_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(any::<usize>(), 0..8)
}

fn build_plan(parents: &[usize]) -> PlanNode {
    let count = parents.len() + 1;
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (i, raw) in parents.iter().enumerate() {
        let child = i + 1;
        children[raw % child].push(child);
    }

    fn build(node: usize, children: &[Vec<usize>]) -> PlanNode {
        PlanNode {
            name: format!("s{node}"),
            children: children[node]
                .iter()
                .map(|&c| build(c, children))
                .collect(),
        }
    }
    build(0, &children)
}

/// Synchronous driver: executes core commands against a scripted "backend"
/// that immediately acknowledges spawns with readiness and exit requests
/// with exits, recording the order of both.
#[derive(Default)]
struct Script {
    spawn_order: Vec<String>,
    exit_order: Vec<String>,
    generations: HashMap<String, u64>,
    exit_code: Option<i32>,
}

impl Script {
    fn drive(&mut self, core: &mut SupervisorCore, event: RuntimeEvent) {
        let mut queue: Vec<CoreCommand> = Vec::new();
        let step = core.step(event);
        self.exit_code = self.exit_code.or(step.exit);
        queue.extend(step.commands);

        while !queue.is_empty() {
            let command = queue.remove(0);
            let follow_up = match command {
                CoreCommand::SpawnSlot { slot, generation } => {
                    self.spawn_order.push(slot.clone());
                    self.generations.insert(slot.clone(), generation);
                    Some(RuntimeEvent::SlotReady { slot, generation })
                }
                CoreCommand::RequestSlotExit { slot, generation } => {
                    self.exit_order.push(slot.clone());
                    Some(RuntimeEvent::SlotExited {
                        slot,
                        generation,
                        code: Some(0),
                    })
                }
                CoreCommand::KillSlot { slot, generation } => {
                    self.exit_order.push(slot.clone());
                    Some(RuntimeEvent::SlotExited {
                        slot,
                        generation,
                        code: None,
                    })
                }
                CoreCommand::ClearDeps { .. } => None,
            };

            if let Some(event) = follow_up {
                let step = core.step(event);
                self.exit_code = self.exit_code.or(step.exit);
                queue.extend(step.commands);
            }
        }
    }

    fn position_in(order: &[String], slot: &str) -> Option<usize> {
        order.iter().position(|s| s == slot)
    }
}

/// Every (parent, child) edge of the plan, by name.
fn edges(node: &PlanNode, out: &mut Vec<(String, String)>) {
    for child in &node.children {
        out.push((node.name.clone(), child.name.clone()));
        edges(child, out);
    }
}

proptest! {
    #[test]
    fn spawn_is_root_first_and_teardown_leaf_first(parents in tree_strategy()) {
        let plan = build_plan(&parents);
        let tree = ProcessTree::build(&plan).unwrap();
        let mut core = SupervisorCore::new(
            tree,
            RetryPolicy { budget: 3, window: std::time::Duration::from_secs(60) },
        );

        let mut script = Script::default();
        script.drive(&mut core, RuntimeEvent::StartTree);

        let mut plan_edges = Vec::new();
        edges(&plan, &mut plan_edges);

        // Everything spawned exactly once, parents before children.
        let mut names: Vec<&str> = plan.names();
        names.sort_unstable();
        let mut spawned: Vec<&str> = script.spawn_order.iter().map(|s| s.as_str()).collect();
        spawned.sort_unstable();
        prop_assert_eq!(&names, &spawned);
        for (parent, child) in &plan_edges {
            let p = Script::position_in(&script.spawn_order, parent).unwrap();
            let c = Script::position_in(&script.spawn_order, child).unwrap();
            prop_assert!(p < c, "parent {} spawned after child {}", parent, child);
        }

        script.drive(&mut core, RuntimeEvent::ShutdownRequested);

        // Everything torn down exactly once, children before parents.
        let mut torn_down: Vec<&str> = script.exit_order.iter().map(|s| s.as_str()).collect();
        torn_down.sort_unstable();
        prop_assert_eq!(&names, &torn_down);
        for (parent, child) in &plan_edges {
            let p = Script::position_in(&script.exit_order, parent).unwrap();
            let c = Script::position_in(&script.exit_order, child).unwrap();
            prop_assert!(c < p, "parent {} torn down before child {}", parent, child);
        }

        prop_assert_eq!(script.exit_code, Some(0));
    }

    #[test]
    fn restart_never_touches_disjoint_slots(
        parents in tree_strategy(),
        seed_choice in any::<prop::sample::Index>(),
    ) {
        let plan = build_plan(&parents);
        let names: Vec<String> = plan.names().iter().map(|s| s.to_string()).collect();
        let seed = names[seed_choice.index(names.len())].clone();

        let tree = ProcessTree::build(&plan).unwrap();
        let mut core = SupervisorCore::new(
            tree,
            RetryPolicy { budget: 3, window: std::time::Duration::from_secs(60) },
        );

        let mut script = Script::default();
        script.drive(&mut core, RuntimeEvent::StartTree);
        let before = script.generations.clone();

        script.drive(&mut core, RuntimeEvent::RestartSlots { slots: vec![seed.clone()] });

        let seed_id = core.tree().find(&seed).unwrap();
        let subtree: Vec<String> = core
            .tree()
            .subtree_of(seed_id)
            .into_iter()
            .map(|id| core.tree().get(id).name.clone())
            .collect();

        for name in &names {
            let generation = core.tree().get(core.tree().find(name).unwrap()).generation;
            if subtree.contains(name) {
                prop_assert_eq!(generation, before[name] + 1, "slot {} not replaced", name);
            } else {
                prop_assert_eq!(generation, before[name], "slot {} was touched", name);
            }
        }

        // Within the restarted subtree, teardown was leaf-first.
        let mut plan_edges = Vec::new();
        edges(&plan, &mut plan_edges);
        for (parent, child) in &plan_edges {
            if subtree.contains(parent) && subtree.contains(child) {
                let p = Script::position_in(&script.exit_order, parent).unwrap();
                let c = Script::position_in(&script.exit_order, child).unwrap();
                prop_assert!(c < p);
            }
        }
    }
}
