// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The generic interprocedural worklist solver.
//!
//! The workload of an interprocedural analysis is heavy, so the solver is
//! always worklist-driven: a node is re-evaluated when the OUT fact of a
//! predecessor changes, or when the analysis itself requests it through
//! the [`WorkQueue`] handed to the node transfer (the alias-aware transfer
//! of the constant propagation uses this to re-trigger loads).

use std::collections::{HashMap, VecDeque};

use crate::graph::icfg::{Icfg, IcfgEdgeKind};
use crate::ir::StmtId;

/// Per-node IN/OUT facts.
pub struct DataflowResult<F> {
    in_facts: HashMap<StmtId, F>,
    out_facts: HashMap<StmtId, F>,
}

impl<F> DataflowResult<F> {
    fn new() -> Self {
        DataflowResult {
            in_facts: HashMap::new(),
            out_facts: HashMap::new(),
        }
    }

    pub fn in_fact(&self, node: StmtId) -> Option<&F> {
        self.in_facts.get(&node)
    }

    pub fn out_fact(&self, node: StmtId) -> Option<&F> {
        self.out_facts.get(&node)
    }

    fn set_in(&mut self, node: StmtId, fact: F) {
        self.in_facts.insert(node, fact);
    }

    fn set_out(&mut self, node: StmtId, fact: F) {
        self.out_facts.insert(node, fact);
    }
}

/// The re-evaluation queue exposed to transfer functions.
pub struct WorkQueue {
    queue: VecDeque<StmtId>,
}

impl WorkQueue {
    fn new() -> Self {
        WorkQueue {
            queue: VecDeque::new(),
        }
    }

    pub fn add_to_work_list(&mut self, node: StmtId) {
        self.queue.push_back(node);
    }

    pub fn add_all_to_work_list<I: IntoIterator<Item = StmtId>>(&mut self, nodes: I) {
        self.queue.extend(nodes);
    }

    fn poll(&mut self) -> Option<StmtId> {
        self.queue.pop_front()
    }
}

/// An interprocedural dataflow analysis over the ICFG.
pub trait InterDataflowAnalysis {
    type Fact: Clone + PartialEq;

    fn new_boundary_fact(&self, entry: StmtId) -> Self::Fact;
    fn new_initial_fact(&self) -> Self::Fact;
    fn meet_into(&self, fact: &Self::Fact, target: &mut Self::Fact);

    /// Applies the node transfer. Returns true iff `out` changed. The
    /// analysis may enqueue nodes for re-evaluation through `work`.
    fn transfer_node(
        &mut self,
        node: StmtId,
        in_fact: &Self::Fact,
        out: &mut Self::Fact,
        work: &mut WorkQueue,
    ) -> bool;

    /// Applies the edge transfer to the OUT fact of the edge's source.
    fn transfer_edge(&self, src: StmtId, kind: &IcfgEdgeKind, out_of_src: &Self::Fact) -> Self::Fact;
}

pub struct InterSolver<'a, A: InterDataflowAnalysis> {
    analysis: A,
    icfg: &'a Icfg,
    /// Boundary facts of entry nodes; they seed the IN recomputation so an
    /// entry without predecessors keeps its boundary bindings.
    boundary_facts: HashMap<StmtId, A::Fact>,
}

impl<'a, A: InterDataflowAnalysis> InterSolver<'a, A> {
    pub fn new(analysis: A, icfg: &'a Icfg) -> Self {
        InterSolver {
            analysis,
            icfg,
            boundary_facts: HashMap::new(),
        }
    }

    pub fn solve(mut self) -> DataflowResult<A::Fact> {
        let mut result = DataflowResult::new();
        self.initialize(&mut result);
        self.do_solve(&mut result);
        result
    }

    fn initialize(&mut self, result: &mut DataflowResult<A::Fact>) {
        for node in self.icfg.nodes() {
            result.set_in(node, self.analysis.new_initial_fact());
            result.set_out(node, self.analysis.new_initial_fact());
        }
        for &entry_method in self.icfg.entry_methods() {
            if let Some(entry) = self.icfg.entry_of(entry_method) {
                let boundary = self.analysis.new_boundary_fact(entry);
                result.set_in(entry, boundary.clone());
                result.set_out(entry, boundary.clone());
                self.boundary_facts.insert(entry, boundary);
            }
        }
    }

    fn do_solve(&mut self, result: &mut DataflowResult<A::Fact>) {
        let mut work = WorkQueue::new();
        work.add_all_to_work_list(self.icfg.nodes());

        while let Some(node) = work.poll() {
            // Alias-driven re-enqueues may name statements of methods the
            // ICFG does not cover.
            if !self.icfg.contains(node) {
                continue;
            }
            let mut in_fact = match self.boundary_facts.get(&node) {
                Some(boundary) => boundary.clone(),
                None => self.analysis.new_initial_fact(),
            };
            for (src, kind) in self.icfg.in_edges_of(node) {
                let out_of_src = result
                    .out_fact(src)
                    .expect("ICFG predecessor without an OUT fact");
                let edge_fact = self.analysis.transfer_edge(src, kind, out_of_src);
                self.analysis.meet_into(&edge_fact, &mut in_fact);
            }
            let mut out = result
                .out_facts
                .remove(&node)
                .expect("worklist node without an OUT fact");
            let changed = self.analysis.transfer_node(node, &in_fact, &mut out, &mut work);
            result.set_in(node, in_fact);
            result.set_out(node, out);
            if changed {
                work.add_all_to_work_list(self.icfg.succs_of(node));
            }
        }
    }
}
