// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The pointer flow graph.
//!
//! Nodes are canonical pointers; an edge `p -> q` states that the
//! points-to set of `p` is included in the points-to set of `q`. Edges
//! are deduplicated; self-loops are permitted (propagating a delta through
//! a self-loop is a natural no-op, the delta is already in the set).

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use petgraph::graph::{DefaultIx, NodeIndex};
use petgraph::Direction;
use petgraph::Graph;

use crate::pta::cs_manager::PointerId;

pub type PFGNodeId = NodeIndex<DefaultIx>;

pub struct PointerFlowGraph {
    graph: Graph<PointerId, ()>,
    nodes: HashMap<PointerId, PFGNodeId>,
}

impl PointerFlowGraph {
    pub fn new() -> Self {
        PointerFlowGraph {
            graph: Graph::new(),
            nodes: HashMap::new(),
        }
    }

    fn get_or_insert_node(&mut self, pointer: PointerId) -> PFGNodeId {
        match self.nodes.entry(pointer) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let node_id = self.graph.add_node(pointer);
                *v.insert(node_id)
            }
        }
    }

    /// Adds an edge from `src` to `dst`. Returns true iff the edge is new.
    pub fn add_edge(&mut self, src: PointerId, dst: PointerId) -> bool {
        let src_id = self.get_or_insert_node(src);
        let dst_id = self.get_or_insert_node(dst);
        if self.graph.find_edge(src_id, dst_id).is_some() {
            return false;
        }
        self.graph.add_edge(src_id, dst_id, ());
        true
    }

    /// Successors of `pointer`, in insertion-independent graph order.
    pub fn succs_of(&self, pointer: PointerId) -> impl Iterator<Item = PointerId> + '_ {
        self.nodes
            .get(&pointer)
            .into_iter()
            .flat_map(move |node_id| {
                self.graph
                    .neighbors_directed(*node_id, Direction::Outgoing)
                    .map(move |succ| self.graph[succ])
            })
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }
}

impl Default for PointerFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}
