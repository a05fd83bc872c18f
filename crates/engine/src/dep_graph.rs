//! Dependency graph for formula cells.
//!
//! Stores the set of ordered pairs (dependee, dependent), meaning "the
//! dependent's formula reads the dependee".
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B's formula reads A"  (A is a dependee of B)
//! ```
//!
//! This makes "what breaks if I change A?" trivial: follow outgoing edges.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::recalc::CircularError;

/// Persistent dependency graph for formula cells.
///
/// Maintains bidirectional adjacency for O(1) lookups:
/// - `dependents[A]` = cells whose formulas read A
/// - `dependees[B]` = cells B's formula reads
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** A ∈ dependees[B] iff B ∈ dependents[A].
/// 2. **No dangling entries:** Empty sets are removed, not stored.
/// 3. **No duplicate pairs:** Set semantics enforced by FxHashSet.
/// 4. **Pair count:** `len()` always equals the number of distinct pairs.
///
/// The graph never fails on well-formed but unknown names; they simply
/// have empty adjacency. Callers mutate it only through the operations
/// below, and the cell store keeps it acyclic at rest by probing
/// `would_create_cycle` before committing any edit.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    /// For each cell A, the cells whose formulas read A.  A -> {B1, B2, ...}
    dependents: FxHashMap<String, FxHashSet<String>>,

    /// For each formula cell B, the cells its formula reads.  B -> {A1, A2, ...}
    dependees: FxHashMap<String, FxHashSet<String>>,

    /// Number of distinct (dependee, dependent) pairs.
    pairs: usize,
}

impl DepGraph {
    /// Create an empty dependency graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of distinct (dependee, dependent) pairs.
    pub fn len(&self) -> usize {
        self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs == 0
    }

    /// Returns the cells whose formulas read `name`.
    ///
    /// Empty for unknown names; never mutates the graph.
    pub fn dependents(&self, name: &str) -> impl Iterator<Item = &str> + '_ {
        self.dependents
            .get(name)
            .into_iter()
            .flat_map(|s| s.iter().map(String::as_str))
    }

    /// Returns the cells that `name`'s formula reads.
    pub fn dependees(&self, name: &str) -> impl Iterator<Item = &str> + '_ {
        self.dependees
            .get(name)
            .into_iter()
            .flat_map(|s| s.iter().map(String::as_str))
    }

    /// Returns true if at least one formula reads `name`.
    pub fn has_dependents(&self, name: &str) -> bool {
        self.dependents.contains_key(name)
    }

    /// Returns true if `name`'s formula reads at least one cell.
    pub fn has_dependees(&self, name: &str) -> bool {
        self.dependees.contains_key(name)
    }

    /// Adds the pair (dependee, dependent). Inserting an existing pair is
    /// a no-op and leaves `len()` unchanged.
    pub fn add_dependency(&mut self, dependee: &str, dependent: &str) {
        let inserted = self
            .dependents
            .entry(dependee.to_string())
            .or_default()
            .insert(dependent.to_string());
        if !inserted {
            return;
        }
        self.dependees
            .entry(dependent.to_string())
            .or_default()
            .insert(dependee.to_string());
        self.pairs += 1;
    }

    /// Removes the pair (dependee, dependent). Removing a pair that is not
    /// in the graph is a no-op.
    pub fn remove_dependency(&mut self, dependee: &str, dependent: &str) {
        let removed = match self.dependents.get_mut(dependee) {
            Some(set) => {
                let removed = set.remove(dependent);
                if set.is_empty() {
                    self.dependents.remove(dependee);
                }
                removed
            }
            None => false,
        };
        if !removed {
            return;
        }
        if let Some(set) = self.dependees.get_mut(dependent) {
            set.remove(dependee);
            if set.is_empty() {
                self.dependees.remove(dependent);
            }
        }
        self.pairs -= 1;
    }

    /// Atomically replaces every pair (name, *) with (name, t) for each t
    /// in `new_dependents`. Duplicates in the input collapse by set
    /// semantics. Pass an empty iterator to clear the cell's dependents.
    pub fn replace_dependents(
        &mut self,
        name: &str,
        new_dependents: impl IntoIterator<Item = String>,
    ) {
        let old: Vec<String> = self.dependents(name).map(str::to_string).collect();
        for dependent in &old {
            self.remove_dependency(name, dependent);
        }
        for dependent in new_dependents {
            self.add_dependency(name, &dependent);
        }
    }

    /// Atomically replaces every pair (*, name) with (s, name) for each s
    /// in `new_dependees`. This is the primary mutation of the edit path:
    /// when a cell's formula changes, its dependee set is swapped in one
    /// call.
    pub fn replace_dependees(
        &mut self,
        name: &str,
        new_dependees: impl IntoIterator<Item = String>,
    ) {
        let old: Vec<String> = self.dependees(name).map(str::to_string).collect();
        for dependee in &old {
            self.remove_dependency(dependee, name);
        }
        for dependee in new_dependees {
            self.add_dependency(&dependee, name);
        }
    }

    // =========================================================================
    // Read-only algorithms for the edit path
    // =========================================================================

    /// Check if giving `cell` the dependee set `new_dependees` would close
    /// a cycle.
    ///
    /// Does not modify the graph; the caller commits the edge swap only on
    /// `None`, so no rollback logic exists anywhere.
    ///
    /// # Algorithm
    ///
    /// A cycle appears iff some proposed dependee is reachable from `cell`
    /// by following dependent edges: cell → ... → v plus the new edge
    /// v → cell closes the loop. DFS from `cell` over dependents, checking
    /// each visited cell against the proposed set.
    pub fn would_create_cycle(
        &self,
        cell: &str,
        new_dependees: &[String],
    ) -> Option<CircularError> {
        if new_dependees.is_empty() {
            return None;
        }
        // Self-reference check
        if new_dependees.iter().any(|d| d == cell) {
            return Some(CircularError::self_reference(cell));
        }

        let targets: FxHashSet<&str> = new_dependees.iter().map(String::as_str).collect();
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut stack: Vec<&str> = vec![cell];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(deps) = self.dependents.get(current) {
                for dep in deps {
                    if targets.contains(dep.as_str()) {
                        // Found a path cell → ... → dep; the proposed edge
                        // dep → cell completes the cycle.
                        return Some(CircularError::cycle(vec![
                            dep.clone(),
                            cell.to_string(),
                        ]));
                    }
                    stack.push(dep.as_str());
                }
            }
        }

        None
    }

    /// Cells to re-evaluate after `start` changes, in dependency order:
    /// `start` first, and every affected cell after all of its own
    /// dependees within the affected set.
    ///
    /// Reverse post-order DFS over the dependents view. Neighbour lists
    /// are sorted before traversal, so the order is deterministic from one
    /// call to the next. Assumes the graph is acyclic, which the edit path
    /// guarantees by probing `would_create_cycle` first.
    pub fn update_order(&self, start: &str) -> Vec<String> {
        let sorted_neighbours = |name: &str| -> Vec<String> {
            let mut neighbours: Vec<String> =
                self.dependents(name).map(str::to_string).collect();
            neighbours.sort();
            neighbours
        };

        // Iterative DFS to stay safe on deep dependency chains.
        struct DfsFrame {
            name: String,
            neighbours: Vec<String>,
            next_idx: usize,
        }

        let mut order: Vec<String> = Vec::new();
        let mut visited: FxHashSet<String> = FxHashSet::default();
        visited.insert(start.to_string());

        let mut dfs_stack = vec![DfsFrame {
            name: start.to_string(),
            neighbours: sorted_neighbours(start),
            next_idx: 0,
        }];

        while let Some(frame) = dfs_stack.last_mut() {
            if frame.next_idx < frame.neighbours.len() {
                let next = frame.neighbours[frame.next_idx].clone();
                frame.next_idx += 1;
                if visited.insert(next.clone()) {
                    let neighbours = sorted_neighbours(&next);
                    dfs_stack.push(DfsFrame {
                        name: next,
                        neighbours,
                        next_idx: 0,
                    });
                }
            } else if let Some(finished) = dfs_stack.pop() {
                order.push(finished.name);
            }
        }

        order.reverse();
        order
    }

    /// Check all invariants. Panics if any are violated.
    ///
    /// Only available in test builds.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        let mut counted = 0;
        for (dependee, dependents) in &self.dependents {
            assert!(
                !dependents.is_empty(),
                "Empty dependents set stored for {:?}",
                dependee
            );
            counted += dependents.len();
            for dependent in dependents {
                assert!(
                    self.dependees
                        .get(dependent)
                        .map_or(false, |s| s.contains(dependee)),
                    "Missing dependee edge: {:?} should list {:?}",
                    dependent,
                    dependee
                );
            }
        }
        for (dependent, dependees) in &self.dependees {
            assert!(
                !dependees.is_empty(),
                "Empty dependees set stored for {:?}",
                dependent
            );
            for dependee in dependees {
                assert!(
                    self.dependents
                        .get(dependee)
                        .map_or(false, |s| s.contains(dependent)),
                    "Missing dependent edge: {:?} should list {:?}",
                    dependee,
                    dependent
                );
            }
        }
        assert_eq!(counted, self.pairs, "pair count out of sync");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;

    fn dependents_of(graph: &DepGraph, name: &str) -> BTreeSet<String> {
        graph.dependents(name).map(str::to_string).collect()
    }

    fn dependees_of(graph: &DepGraph, name: &str) -> BTreeSet<String> {
        graph.dependees(name).map(str::to_string).collect()
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_graph() {
        let graph = DepGraph::new();

        assert_eq!(graph.len(), 0);
        assert!(graph.is_empty());
        assert!(!graph.has_dependents("a"));
        assert!(!graph.has_dependees("a"));
        assert_eq!(graph.dependents("a").count(), 0);
        assert_eq!(graph.dependees("a").count(), 0);

        graph.assert_consistent();
    }

    #[test]
    fn test_single_pair() {
        // b's formula reads a
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "b");
        graph.assert_consistent();

        assert_eq!(graph.len(), 1);
        assert!(graph.has_dependents("a"));
        assert!(graph.has_dependees("b"));
        assert!(!graph.has_dependents("b"));
        assert!(!graph.has_dependees("a"));
        assert_eq!(dependents_of(&graph, "a"), BTreeSet::from(["b".to_string()]));
        assert_eq!(dependees_of(&graph, "b"), BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("a", "b");
        graph.assert_consistent();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_add_then_remove_restores_initial_state() {
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("a", "c");

        graph.add_dependency("c", "d");
        graph.remove_dependency("c", "d");
        graph.assert_consistent();

        assert_eq!(graph.len(), 2);
        assert_eq!(dependents_of(&graph, "c"), BTreeSet::new());
        assert!(!graph.has_dependees("d"));
    }

    #[test]
    fn test_remove_missing_pair_is_a_no_op() {
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "b");
        graph.remove_dependency("a", "z");
        graph.remove_dependency("z", "b");
        graph.assert_consistent();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_replace_dependents() {
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("a", "c");
        graph.add_dependency("x", "c");

        graph.replace_dependents("a", names(&["d", "e", "d"]));
        graph.assert_consistent();

        assert_eq!(
            dependents_of(&graph, "a"),
            BTreeSet::from(["d".to_string(), "e".to_string()])
        );
        // Pairs not rooted at "a" are untouched.
        assert_eq!(dependees_of(&graph, "c"), BTreeSet::from(["x".to_string()]));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_replace_dependees() {
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "c");
        graph.add_dependency("b", "c");
        graph.add_dependency("b", "d");

        graph.replace_dependees("c", names(&["e"]));
        graph.assert_consistent();

        assert_eq!(dependees_of(&graph, "c"), BTreeSet::from(["e".to_string()]));
        assert_eq!(dependents_of(&graph, "b"), BTreeSet::from(["d".to_string()]));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_replace_with_empty_clears() {
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "b");
        graph.replace_dependees("b", names(&[]));
        graph.assert_consistent();
        assert!(graph.is_empty());
        assert!(!graph.has_dependents("a"));
    }

    #[test]
    fn test_would_create_cycle_self_reference() {
        let graph = DepGraph::new();
        let err = graph.would_create_cycle("a1", &names(&["a1"]));
        assert!(err.is_some());
    }

    #[test]
    fn test_would_create_cycle_direct() {
        // b1 reads a1; making a1 read b1 must be rejected.
        let mut graph = DepGraph::new();
        graph.add_dependency("a1", "b1");
        assert!(graph.would_create_cycle("a1", &names(&["b1"])).is_some());
        // The reverse direction is fine.
        assert!(graph.would_create_cycle("b1", &names(&["c1"])).is_none());
    }

    #[test]
    fn test_would_create_cycle_transitive() {
        // c reads b reads a; making a read c closes a three-cell loop.
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "c");
        assert!(graph.would_create_cycle("a", &names(&["c"])).is_some());
        assert!(graph.would_create_cycle("a", &names(&["d"])).is_none());
    }

    #[test]
    fn test_would_create_cycle_diamond_is_fine() {
        // d reads b and c, both read a; no cycle anywhere.
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("a", "c");
        graph.add_dependency("b", "d");
        graph.add_dependency("c", "d");
        assert!(graph.would_create_cycle("a", &names(&["e"])).is_none());
        assert!(graph.would_create_cycle("e", &names(&["d"])).is_none());
    }

    #[test]
    fn test_would_create_cycle_does_not_mutate() {
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "b");
        let before = graph.len();
        let _ = graph.would_create_cycle("a", &names(&["b"]));
        let _ = graph.would_create_cycle("b", &names(&["c"]));
        graph.assert_consistent();
        assert_eq!(graph.len(), before);
        assert_eq!(dependees_of(&graph, "b"), BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn test_update_order_chain() {
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "c");
        assert_eq!(graph.update_order("a"), names(&["a", "b", "c"]));
        assert_eq!(graph.update_order("b"), names(&["b", "c"]));
        assert_eq!(graph.update_order("c"), names(&["c"]));
    }

    #[test]
    fn test_update_order_diamond() {
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("a", "c");
        graph.add_dependency("b", "d");
        graph.add_dependency("c", "d");

        let order = graph.update_order("a");
        assert_eq!(order[0], "a");
        assert_eq!(order.len(), 4);
        let pos = |n: &str| order.iter().position(|x| x == n).expect("missing");
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn test_update_order_only_reaches_affected_cells() {
        let mut graph = DepGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("x", "y");
        assert_eq!(graph.update_order("a"), names(&["a", "b"]));
    }

    #[test]
    fn test_update_order_is_deterministic() {
        let mut graph = DepGraph::new();
        for dependent in ["q", "m", "z", "b"] {
            graph.add_dependency("a", dependent);
        }
        let first = graph.update_order("a");
        for _ in 0..10 {
            assert_eq!(graph.update_order("a"), first);
        }
    }

    // Model-based property check: the graph must agree with a plain set
    // of pairs under any operation sequence, and the two adjacency views
    // must stay mutually consistent throughout.
    proptest! {
        #[test]
        fn random_ops_match_set_of_pairs_model(
            ops in proptest::collection::vec((0u8..5, 0usize..5, 0usize..5), 0..80)
        ) {
            const NAMES: [&str; 5] = ["a", "b", "c", "d", "e"];
            let mut graph = DepGraph::new();
            let mut model: BTreeSet<(usize, usize)> = BTreeSet::new();

            for (op, s, t) in ops {
                match op {
                    0 | 1 => {
                        graph.add_dependency(NAMES[s], NAMES[t]);
                        model.insert((s, t));
                    }
                    2 => {
                        graph.remove_dependency(NAMES[s], NAMES[t]);
                        model.remove(&(s, t));
                    }
                    3 => {
                        graph.replace_dependents(NAMES[s], vec![NAMES[t].to_string()]);
                        model.retain(|&(ms, _)| ms != s);
                        model.insert((s, t));
                    }
                    _ => {
                        graph.replace_dependees(NAMES[t], vec![NAMES[s].to_string()]);
                        model.retain(|&(_, mt)| mt != t);
                        model.insert((s, t));
                    }
                }
                graph.assert_consistent();
                prop_assert_eq!(graph.len(), model.len());
            }

            for (i, name) in NAMES.iter().enumerate() {
                let expected_dependents: BTreeSet<String> = model
                    .iter()
                    .filter(|&&(s, _)| s == i)
                    .map(|&(_, t)| NAMES[t].to_string())
                    .collect();
                let expected_dependees: BTreeSet<String> = model
                    .iter()
                    .filter(|&&(_, t)| t == i)
                    .map(|&(s, _)| NAMES[s].to_string())
                    .collect();
                prop_assert_eq!(dependents_of(&graph, name), expected_dependents);
                prop_assert_eq!(dependees_of(&graph, name), expected_dependees);
            }
        }
    }
}
