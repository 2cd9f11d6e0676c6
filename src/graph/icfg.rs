// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The interprocedural control flow graph.
//!
//! Nodes are the statements of the included methods. Within a method the
//! control flow is the statement order; the intraprocedural successor edge
//! of an invoke is a call-to-return edge. Each resolved call additionally
//! gets a call edge into the callee's entry and a return edge from the
//! callee's exit back to the invoke's fall-through successor, carrying the
//! callee's return variables.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::graph::{DefaultIx, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use petgraph::Graph;

use crate::ir::resolver;
use crate::ir::{MethodId, Program, StmtId, StmtKind, VarId};
use crate::pta::PointerAnalysisResult;

pub type IcfgNodeId = NodeIndex<DefaultIx>;

#[derive(Clone, Debug)]
pub enum IcfgEdgeKind {
    Normal,
    /// The intraprocedural edge over an invoke.
    CallToReturn,
    /// From an invoke to the entry of one of its callees.
    Call { callee: MethodId },
    /// From a callee's exit back to the return site.
    Return {
        call_site: StmtId,
        ret_vars: Vec<VarId>,
    },
}

pub struct Icfg {
    graph: Graph<StmtId, IcfgEdgeKind>,
    nodes: HashMap<StmtId, IcfgNodeId>,
    node_order: Vec<StmtId>,
    entries: HashMap<MethodId, StmtId>,
    exits: HashMap<MethodId, StmtId>,
    entry_methods: Vec<MethodId>,
}

impl Icfg {
    /// Builds the ICFG over `methods`, resolving invokes through
    /// `call_map`. Methods with empty bodies contribute no nodes; calls to
    /// them simply have no interprocedural edges.
    pub fn build(
        prog: &Program,
        methods: &BTreeSet<MethodId>,
        call_map: &BTreeMap<StmtId, BTreeSet<MethodId>>,
        entry_methods: Vec<MethodId>,
    ) -> Self {
        let mut icfg = Icfg {
            graph: Graph::new(),
            nodes: HashMap::new(),
            node_order: Vec::new(),
            entries: HashMap::new(),
            exits: HashMap::new(),
            entry_methods,
        };
        for &method in methods {
            let stmts = &prog.method(method).stmts;
            if stmts.is_empty() {
                continue;
            }
            for &stmt in stmts {
                let node_id = icfg.graph.add_node(stmt);
                icfg.nodes.insert(stmt, node_id);
                icfg.node_order.push(stmt);
            }
            icfg.entries.insert(method, stmts[0]);
            icfg.exits.insert(method, stmts[stmts.len() - 1]);
        }
        // Intraprocedural edges.
        for &method in methods {
            let stmts = &prog.method(method).stmts;
            for window in stmts.windows(2) {
                let kind = match &prog.stmt(window[0]).kind {
                    StmtKind::Invoke { .. } => IcfgEdgeKind::CallToReturn,
                    _ => IcfgEdgeKind::Normal,
                };
                icfg.add_edge(window[0], window[1], kind);
            }
        }
        // Interprocedural edges.
        for (&site, callees) in call_map {
            if !icfg.nodes.contains_key(&site) {
                continue;
            }
            let return_site = icfg.fall_through(prog, site);
            for &callee in callees {
                let Some(&entry) = icfg.entries.get(&callee) else {
                    continue;
                };
                icfg.add_edge(site, entry, IcfgEdgeKind::Call { callee });
                if let Some(ret_site) = return_site {
                    let exit = icfg.exits[&callee];
                    icfg.add_edge(
                        exit,
                        ret_site,
                        IcfgEdgeKind::Return {
                            call_site: site,
                            ret_vars: prog.method(callee).ret_vars.clone(),
                        },
                    );
                }
            }
        }
        icfg
    }

    /// Builds the ICFG from a pointer analysis result.
    pub fn from_pta(prog: &Program, pta: &PointerAnalysisResult) -> Self {
        let entry_methods = prog.main_method().into_iter().collect();
        Self::build(prog, pta.reachable_methods(), &pta.call_map(), entry_methods)
    }

    /// Builds the ICFG from the CHA call graph, the fallback when no
    /// pointer analysis result is available.
    pub fn from_cha(prog: &Program) -> Self {
        let cg = resolver::build_call_graph_cha(prog);
        let methods: BTreeSet<MethodId> = cg.reachable_methods().collect();
        let mut call_map: BTreeMap<StmtId, BTreeSet<MethodId>> = BTreeMap::new();
        for (_, site, _, callee) in cg.edges() {
            call_map.entry(site).or_default().insert(callee);
        }
        let entry_methods = prog.main_method().into_iter().collect();
        Self::build(prog, &methods, &call_map, entry_methods)
    }

    fn fall_through(&self, prog: &Program, stmt: StmtId) -> Option<StmtId> {
        let data = prog.stmt(stmt);
        prog.method(data.method).stmts.get(data.index + 1).copied()
    }

    fn add_edge(&mut self, src: StmtId, dst: StmtId, kind: IcfgEdgeKind) {
        let src_id = self.nodes[&src];
        let dst_id = self.nodes[&dst];
        self.graph.add_edge(src_id, dst_id, kind);
    }

    pub fn contains(&self, stmt: StmtId) -> bool {
        self.nodes.contains_key(&stmt)
    }

    /// All nodes, in method-then-statement order.
    pub fn nodes(&self) -> impl Iterator<Item = StmtId> + '_ {
        self.node_order.iter().copied()
    }

    pub fn num_nodes(&self) -> usize {
        self.node_order.len()
    }

    pub fn in_edges_of(&self, stmt: StmtId) -> impl Iterator<Item = (StmtId, &IcfgEdgeKind)> {
        self.nodes.get(&stmt).into_iter().flat_map(move |node_id| {
            self.graph
                .edges_directed(*node_id, Direction::Incoming)
                .map(|e| (self.graph[e.source()], e.weight()))
        })
    }

    pub fn succs_of(&self, stmt: StmtId) -> impl Iterator<Item = StmtId> + '_ {
        self.nodes.get(&stmt).into_iter().flat_map(move |node_id| {
            self.graph
                .neighbors_directed(*node_id, Direction::Outgoing)
                .map(move |succ| self.graph[succ])
        })
    }

    pub fn entry_methods(&self) -> &[MethodId] {
        &self.entry_methods
    }

    pub fn entry_of(&self, method: MethodId) -> Option<StmtId> {
        self.entries.get(&method).copied()
    }

    pub fn exit_of(&self, method: MethodId) -> Option<StmtId> {
        self.exits.get(&method).copied()
    }
}
