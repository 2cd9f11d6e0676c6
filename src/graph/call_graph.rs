// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Call graphs over arbitrary method and call-site identifiers.
//!
//! The context-sensitive pointer analysis instantiates this with
//! context-qualified ids; the CHA fallback builder instantiates it with
//! plain ids. The graph is the single authoritative set of call edges:
//! edge newness is answered here and nowhere else.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use petgraph::graph::{DefaultIx, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use petgraph::Graph;

use crate::pta::cs_manager::{CSCallSiteId, CSMethodId};

/// Unique identifiers for call graph nodes.
pub type CGNodeId = NodeIndex<DefaultIx>;
/// Unique identifiers for call graph edges.
pub type CGEdgeId = EdgeIndex<DefaultIx>;
/// Context-sensitive call graph.
pub type CSCallGraph = CallGraph<CSMethodId, CSCallSiteId>;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum CallKind {
    Static,
    Virtual,
    Interface,
    Special,
    Dynamic,
}

#[derive(Debug)]
pub struct CallGraphNode<F> {
    pub func: F,
}

#[derive(Debug)]
pub struct CallGraphEdge<S> {
    pub kind: CallKind,
    pub callsite: S,
}

pub struct CallGraph<F, S> {
    /// The graph structure capturing call relationships.
    graph: Graph<CallGraphNode<F>, CallGraphEdge<S>>,
    /// A map from methods to their corresponding call graph nodes.
    func_nodes: HashMap<F, CGNodeId>,
    /// A map from call sites to their outgoing call graph edges.
    callsite_to_edges: HashMap<S, HashSet<CGEdgeId>>,
    /// Methods whose statements have been visited by the solver.
    reachable: HashSet<F>,
    /// Reachable methods in discovery order.
    reachable_list: Vec<F>,
    entries: Vec<F>,
}

impl<F, S> CallGraph<F, S>
where
    F: Copy + Eq + Hash + Debug,
    S: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        CallGraph {
            graph: Graph::new(),
            func_nodes: HashMap::new(),
            callsite_to_edges: HashMap::new(),
            reachable: HashSet::new(),
            reachable_list: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn get_or_insert_node(&mut self, func: F) -> CGNodeId {
        match self.func_nodes.entry(func) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let node_id = self.graph.add_node(CallGraphNode { func });
                *v.insert(node_id)
            }
        }
    }

    pub fn add_entry_method(&mut self, func: F) {
        self.get_or_insert_node(func);
        self.entries.push(func);
    }

    pub fn entry_methods(&self) -> &[F] {
        &self.entries
    }

    /// Marks `func` reachable. Returns false if it was already reachable.
    pub fn add_reachable_method(&mut self, func: F) -> bool {
        self.get_or_insert_node(func);
        if self.reachable.insert(func) {
            self.reachable_list.push(func);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, func: F) -> bool {
        self.reachable.contains(&func)
    }

    pub fn reachable_methods(&self) -> impl Iterator<Item = F> + '_ {
        self.reachable_list.iter().copied()
    }

    pub fn num_reachable(&self) -> usize {
        self.reachable_list.len()
    }

    /// All methods an edge from `callsite` targets.
    pub fn callees_of(&self, callsite: &S) -> HashSet<F> {
        match self.callsite_to_edges.get(callsite) {
            Some(edges) => edges
                .iter()
                .filter_map(|edge_id| {
                    let (_, target) = self.graph.edge_endpoints(*edge_id)?;
                    Some(self.graph[target].func)
                })
                .collect(),
            None => HashSet::new(),
        }
    }

    /// Adds a call edge from `caller` to `callee` at `callsite`.
    /// Returns false if the edge already existed, true otherwise.
    pub fn add_edge(&mut self, kind: CallKind, callsite: S, caller: F, callee: F) -> bool {
        let caller_node = self.get_or_insert_node(caller);
        let callee_node = self.get_or_insert_node(callee);
        if self.callees_of(&callsite).contains(&callee) {
            return false;
        }
        let edge_id = self.graph.add_edge(caller_node, callee_node, CallGraphEdge { kind, callsite });
        self.callsite_to_edges.entry(callsite).or_default().insert(edge_id);
        true
    }

    /// Iterates all call edges as `(kind, callsite, caller, callee)`.
    pub fn edges(&self) -> impl Iterator<Item = (CallKind, S, F, F)> + '_ {
        self.graph.edge_indices().filter_map(move |edge_id| {
            let (src, dst) = self.graph.edge_endpoints(edge_id)?;
            let weight = &self.graph[edge_id];
            Some((weight.kind, weight.callsite, self.graph[src].func, self.graph[dst].func))
        })
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// Callers of `func`, one entry per incoming edge.
    pub fn callers_of(&self, func: F) -> Vec<(CallKind, S, F)> {
        match self.func_nodes.get(&func) {
            Some(node) => self
                .graph
                .edges_directed(*node, Direction::Incoming)
                .map(|e| {
                    let weight = e.weight();
                    (weight.kind, weight.callsite, self.graph[e.source()].func)
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

impl<F, S> Default for CallGraph<F, S>
where
    F: Copy + Eq + Hash + Debug,
    S: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn edge_deduplication() {
        let mut cg: CallGraph<u32, u32> = CallGraph::new();
        cg.add_entry_method(0);
        assert!(cg.add_reachable_method(0));
        assert!(!cg.add_reachable_method(0));
        assert!(cg.add_edge(CallKind::Static, 10, 0, 1));
        assert!(!cg.add_edge(CallKind::Static, 10, 0, 1));
        assert!(cg.add_edge(CallKind::Virtual, 10, 0, 2));
        assert_eq!(cg.num_edges(), 2);
        assert_eq!(cg.callees_of(&10).len(), 2);
        assert_eq!(cg.callers_of(1).len(), 1);
    }
}
