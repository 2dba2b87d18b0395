//! Dependency graph construction, cycle detection, and topological order.
//!
//! Edges point from a dependency to its dependents, so a topological order
//! schedules every resource after everything it depends on. Edges are only
//! added between names present in the graph; unknown targets are a
//! per-resource validation concern handled by the planner.

use crate::error::{Cycle, Error, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, BTreeSet};

/// A dependency DAG over logical resource names.
pub struct DepGraph {
    graph: DiGraph<String, ()>,
    indices: BTreeMap<String, NodeIndex>,
}

impl DepGraph {
    /// Build a graph from `name -> dependencies` pairs.
    pub fn build(dependencies: &BTreeMap<String, BTreeSet<String>>) -> Self {
        let mut graph = DiGraph::new();
        let mut indices = BTreeMap::new();

        for name in dependencies.keys() {
            let index = graph.add_node(name.clone());
            indices.insert(name.clone(), index);
        }
        for (name, deps) in dependencies {
            let node = indices[name];
            for dep in deps {
                if let Some(&dep_node) = indices.get(dep) {
                    graph.add_edge(dep_node, node, ());
                }
            }
        }

        Self { graph, indices }
    }

    /// Names in dependency order: every name after all its dependencies.
    ///
    /// Ties are broken deterministically by name so plans are stable across
    /// runs of the same stackfile.
    pub fn topo_order(&self) -> Result<Vec<String>> {
        // Kahn's algorithm with an ordered ready set for determinism.
        let mut in_degree: BTreeMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.edges_directed(n, Direction::Incoming).count()))
            .collect();

        let mut ready: BTreeSet<&String> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&n, _)| &self.graph[n])
            .collect();

        let mut order = Vec::with_capacity(self.indices.len());
        while let Some(name) = ready.iter().next().map(|n| (*n).clone()) {
            ready.remove(&name);
            let node = self.indices[&name];
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                let target = edge.target();
                let degree = in_degree
                    .get_mut(&target)
                    .expect("target present in degree map");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(&self.graph[target]);
                }
            }
            order.push(name);
        }

        if order.len() < self.indices.len() {
            let leftover: BTreeSet<NodeIndex> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(&n, _)| n)
                .collect();
            return Err(Error::Cycle(self.find_cycle(&leftover)));
        }
        Ok(order)
    }

    /// Names that directly depend on `name` (within this graph).
    pub fn direct_dependents(&self, name: &str) -> Vec<String> {
        match self.indices.get(name) {
            Some(&node) => self
                .graph
                .edges_directed(node, Direction::Outgoing)
                .map(|edge| self.graph[edge.target()].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Name one concrete cycle among the nodes Kahn's algorithm could not
    /// resolve. Every leftover node keeps at least one leftover
    /// predecessor, so a backward walk restricted to `leftover` must
    /// revisit a node, and the revisited segment is a cycle.
    fn find_cycle(&self, leftover: &BTreeSet<NodeIndex>) -> Cycle {
        let Some(&start) = leftover.iter().next() else {
            return Cycle(Vec::new());
        };

        let mut seen: Vec<NodeIndex> = Vec::new();
        let mut current = start;
        loop {
            if let Some(position) = seen.iter().position(|&n| n == current) {
                // The walk followed edges backwards, so reverse the segment
                // to present the cycle in dependency direction.
                let names = seen[position..]
                    .iter()
                    .rev()
                    .map(|&n| self.graph[n].clone())
                    .collect();
                return Cycle(names);
            }
            seen.push(current);
            match self
                .graph
                .edges_directed(current, Direction::Incoming)
                .map(|edge| edge.source())
                .filter(|source| leftover.contains(source))
                .min()
            {
                Some(previous) => current = previous,
                None => return Cycle(vec![self.graph[current].clone()]),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(pairs: &[(&str, &[&str])]) -> DepGraph {
        let map = pairs
            .iter()
            .map(|(name, deps)| {
                (
                    (*name).to_string(),
                    deps.iter().map(|d| (*d).to_string()).collect(),
                )
            })
            .collect();
        DepGraph::build(&map)
    }

    #[test]
    fn topo_order_schedules_dependencies_first() {
        let graph = graph_of(&[
            ("app", &["db", "cache"]),
            ("db", &["network"]),
            ("cache", &["network"]),
            ("network", &[]),
        ]);
        let order = graph.topo_order().unwrap();

        let position =
            |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(position("network") < position("db"));
        assert!(position("network") < position("cache"));
        assert!(position("db") < position("app"));
        assert!(position("cache") < position("app"));
    }

    #[test]
    fn topo_order_is_deterministic() {
        let graph = graph_of(&[("c", &[]), ("a", &[]), ("b", &[])]);
        assert_eq!(graph.topo_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn cycle_is_reported_with_members() {
        let graph = graph_of(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        match graph.topo_order() {
            Err(Error::Cycle(cycle)) => {
                assert_eq!(cycle.0.len(), 3);
                for name in ["a", "b", "c"] {
                    assert!(cycle.0.iter().any(|n| n == name), "{name} in cycle");
                }
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let graph = graph_of(&[("a", &["a"])]);
        assert!(matches!(graph.topo_order(), Err(Error::Cycle(_))));
    }

    #[test]
    fn unknown_targets_add_no_edges() {
        let graph = graph_of(&[("a", &["ghost"])]);
        assert_eq!(graph.topo_order().unwrap(), vec!["a"]);
    }

    #[test]
    fn direct_dependents_follow_edges() {
        let graph = graph_of(&[("app", &["db"]), ("db", &[]), ("job", &["db"])]);
        let mut dependents = graph.direct_dependents("db");
        dependents.sort();
        assert_eq!(dependents, vec!["app", "job"]);
    }
}
