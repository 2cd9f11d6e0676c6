// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Taint propagation, piggy-backed on the pointer analysis.
//!
//! The engine introduces taint objects at configured sources, routes them
//! through an information flow graph parallel to the pointer flow graph
//! (only transfer edges carry taint, keeping them out of ordinary
//! points-to propagation), and collects source-to-sink flows when the
//! solver reaches its fixed point. All communication towards the solver
//! goes through the shared worklist.

pub mod config;

use std::collections::{BTreeSet, HashMap};

use crate::graph::call_graph::CSCallGraph;
use crate::ir::{MethodId, Program, StmtId, StmtKind, TypeId, VarId};
use crate::pta::context::CtxId;
use crate::pta::cs_manager::{CSManager, CSObjId, PointerId};
use crate::pta::heap::{ObjId, ObjPool};
use crate::pta::solver::WorkList;
use crate::pts_set::{HybridPointsToSet, PointsToSet};

pub use config::{ConfigError, TaintConfig, TransferPoint};

pub const TAINT_ANALYSIS_ID: &str = "taint";

/// A detected flow from a source call site into a sink argument.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct TaintFlow {
    pub source_call: StmtId,
    pub sink_call: StmtId,
    pub index: usize,
}

/// Canonicalizes taint objects: one object per `(source call, type)` pair.
#[derive(Default)]
pub struct TaintManager {
    taint_objs: HashMap<(StmtId, TypeId), ObjId>,
}

impl TaintManager {
    pub fn new() -> Self {
        TaintManager::default()
    }

    /// Returns the taint object for `(source_call, ty)`, creating it on
    /// first request. Idempotent.
    pub fn make_taint(&mut self, pool: &mut ObjPool, source_call: StmtId, ty: TypeId) -> ObjId {
        *self
            .taint_objs
            .entry((source_call, ty))
            .or_insert_with(|| pool.add_taint_obj(source_call, ty))
    }
}

/// The information flow graph: a multimap of pointer-to-pointer edges used
/// strictly to route taint objects.
#[derive(Default)]
struct InfoFlowGraph {
    successors: HashMap<PointerId, BTreeSet<PointerId>>,
}

impl InfoFlowGraph {
    fn add_edge(&mut self, src: PointerId, dst: PointerId) -> bool {
        self.successors.entry(src).or_default().insert(dst)
    }

    fn succs_of(&self, pointer: PointerId) -> impl Iterator<Item = PointerId> + '_ {
        self.successors.get(&pointer).into_iter().flatten().copied()
    }
}

pub struct TaintEngine {
    config: TaintConfig,
    manager: TaintManager,
    ifg: InfoFlowGraph,
    empty_ctx: CtxId,
}

impl TaintEngine {
    pub fn new(config: TaintConfig, empty_ctx: CtxId) -> Self {
        TaintEngine {
            config,
            manager: TaintManager::new(),
            ifg: InfoFlowGraph::default(),
            empty_ctx,
        }
    }

    pub fn is_taint(&self, csm: &CSManager, pool: &ObjPool, cs_obj: CSObjId) -> bool {
        let (_, obj) = csm.cs_obj(cs_obj);
        pool.is_taint(obj)
    }

    fn taint_subset(
        &self,
        set: &HybridPointsToSet<CSObjId>,
        csm: &CSManager,
        pool: &ObjPool,
    ) -> HybridPointsToSet<CSObjId> {
        let mut result = HybridPointsToSet::new();
        for cs_obj in set.iter() {
            let (_, obj) = csm.cs_obj(cs_obj);
            if pool.is_taint(obj) {
                result.insert(cs_obj);
            }
        }
        result
    }

    /// Inserts an IFG edge and, if it is new, pushes the taint subset of
    /// `src`'s points-to set towards `dst` through the solver worklist.
    fn add_ifg_edge(
        &mut self,
        src: PointerId,
        dst: PointerId,
        csm: &CSManager,
        pool: &ObjPool,
        work_list: &mut WorkList,
    ) {
        if self.ifg.add_edge(src, dst) {
            let taint = self.taint_subset(csm.points_to(src), csm, pool);
            if !taint.is_empty() {
                work_list.add_entry(dst, taint);
            }
        }
    }

    /// Observes one call: wires up configured transfer edges and injects
    /// taint objects for configured sources. `base` is the receiver
    /// variable for instance calls, `None` for static calls.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_call(
        &mut self,
        prog: &Program,
        csm: &mut CSManager,
        pool: &mut ObjPool,
        work_list: &mut WorkList,
        base: Option<VarId>,
        _recv_obj: Option<ObjId>,
        cs_callsite: (CtxId, StmtId),
        callee: MethodId,
    ) {
        let (ctx, invoke) = cs_callsite;
        let StmtKind::Invoke { result, args, .. } = &prog.stmt(invoke).kind else {
            panic!("taint handle_call on a non-invoke statement: {:?}", invoke);
        };
        let resolve = |point: TransferPoint| -> Option<(CtxId, VarId)> {
            match point {
                TransferPoint::Base => base.map(|b| (ctx, b)),
                TransferPoint::Result => result.map(|r| (ctx, r)),
                TransferPoint::Arg(i) => args.get(i).map(|a| (ctx, *a)),
            }
        };

        let transfers: Vec<_> = self.config.transfers_of(callee).copied().collect();
        for transfer in transfers {
            let (Some(from), Some(to)) = (resolve(transfer.from), resolve(transfer.to)) else {
                continue;
            };
            let from_ptr = csm.get_cs_var(from.0, from.1);
            let to_ptr = csm.get_cs_var(to.0, to.1);
            self.add_ifg_edge(from_ptr, to_ptr, csm, pool, work_list);
        }

        let sources: Vec<_> = self.config.sources_of(callee).copied().collect();
        if let Some(result) = *result {
            if !sources.is_empty() {
                let mut taint_set = HybridPointsToSet::new();
                for source in sources {
                    let obj = self.manager.make_taint(pool, invoke, source.ty);
                    taint_set.insert(csm.get_cs_obj(self.empty_ctx, obj));
                }
                let lhs = csm.get_cs_var(ctx, result);
                work_list.add_entry(lhs, taint_set);
            }
        }
    }

    /// Observes one propagation step of the solver: routes the taint
    /// subset of `delta` through the IFG successors of `pointer`.
    pub fn propagate(
        &self,
        pointer: PointerId,
        delta: &HybridPointsToSet<CSObjId>,
        csm: &CSManager,
        pool: &ObjPool,
        work_list: &mut WorkList,
    ) {
        let taint = self.taint_subset(delta, csm, pool);
        if taint.is_empty() {
            return;
        }
        for succ in self.ifg.succs_of(pointer) {
            work_list.add_entry(succ, taint.clone());
        }
    }

    /// Collects source-to-sink flows over the final call graph. Flows are
    /// deduplicated and totally ordered.
    pub fn on_finish(
        &self,
        prog: &Program,
        call_graph: &CSCallGraph,
        csm: &mut CSManager,
        pool: &ObjPool,
    ) -> BTreeSet<TaintFlow> {
        let mut flows = BTreeSet::new();
        for (_kind, cs_callsite, _caller, cs_callee) in call_graph.edges() {
            let (ctx, invoke) = csm.cs_call_site(cs_callsite);
            let (_, callee) = csm.cs_method(cs_callee);
            let StmtKind::Invoke { args, .. } = &prog.stmt(invoke).kind else {
                continue;
            };
            for sink in self.config.sinks_of(callee) {
                let Some(&arg) = args.get(sink.index) else {
                    continue;
                };
                let pointer = csm.get_cs_var(ctx, arg);
                let pts = csm.points_to(pointer).clone();
                for cs_obj in pts.iter() {
                    let (_, obj) = csm.cs_obj(cs_obj);
                    if let Some(source_call) = pool.taint_source_call(obj) {
                        flows.insert(TaintFlow {
                            source_call,
                            sink_call: invoke,
                            index: sink.index,
                        });
                    }
                }
            }
        }
        flows
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn taint_objects_are_idempotent() {
        let mut pool = ObjPool::new();
        let mut manager = TaintManager::new();
        let call = StmtId(1);
        let ty = TypeId(0);
        let t1 = manager.make_taint(&mut pool, call, ty);
        let t2 = manager.make_taint(&mut pool, call, ty);
        assert_eq!(t1, t2);
        let other = manager.make_taint(&mut pool, StmtId(2), ty);
        assert_ne!(t1, other);
    }

    #[test]
    fn ifg_edges_deduplicate() {
        let mut ifg = InfoFlowGraph::default();
        assert!(ifg.add_edge(PointerId(0), PointerId(1)));
        assert!(!ifg.add_edge(PointerId(0), PointerId(1)));
        assert_eq!(ifg.succs_of(PointerId(0)).count(), 1);
        assert_eq!(ifg.succs_of(PointerId(1)).count(), 0);
    }
}
