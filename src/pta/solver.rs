// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The context-sensitive pointer analysis fixed point.
//!
//! The solver discovers reachable context-method pairs, translates their
//! statements into pointer flow graph edges, and drains the worklist until
//! the points-to sets stop growing. Call graph construction happens
//! on the fly: a receiver's points-to growth materializes new call edges,
//! which in turn make new methods reachable. The taint engine observes
//! every call and every propagation step and replies through the shared
//! worklist.

use std::collections::VecDeque;

use log::*;

use crate::graph::call_graph::{CSCallGraph, CallKind};
use crate::graph::pfg::PointerFlowGraph;
use crate::ir::{resolver, InvokeKind, MethodId, Program, StmtId, StmtKind, VarId};
use crate::pta::context::CtxId;
use crate::pta::cs_manager::{CSManager, CSMethodId, CSObjId, PointerId, PointerKind};
use crate::pta::heap::{HeapModel, ObjPool};
use crate::pta::selector::ContextSelector;
use crate::pta::PointerAnalysisResult;
use crate::pts_set::{HybridPointsToSet, PointsToSet};
use crate::taint::{TaintConfig, TaintEngine};

/// FIFO worklist of `(pointer, delta)` entries. Duplicate entries are
/// permitted; propagation is idempotent.
pub struct WorkList {
    queue: VecDeque<(PointerId, HybridPointsToSet<CSObjId>)>,
}

impl WorkList {
    pub fn new() -> Self {
        WorkList {
            queue: VecDeque::new(),
        }
    }

    pub fn add_entry(&mut self, pointer: PointerId, delta: HybridPointsToSet<CSObjId>) {
        self.queue.push_back((pointer, delta));
    }

    pub fn poll_entry(&mut self) -> Option<(PointerId, HybridPointsToSet<CSObjId>)> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for WorkList {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CSPTASolver<'p, S: ContextSelector, H: HeapModel> {
    prog: &'p Program,
    selector: S,
    heap_model: H,
    pool: ObjPool,
    csm: CSManager,
    pfg: PointerFlowGraph,
    call_graph: CSCallGraph,
    work_list: WorkList,
    taint: TaintEngine,
}

impl<'p, S: ContextSelector, H: HeapModel> CSPTASolver<'p, S, H> {
    pub fn new(prog: &'p Program, mut selector: S, heap_model: H, taint_config: TaintConfig) -> Self {
        let empty_ctx = selector.empty_context();
        CSPTASolver {
            prog,
            selector,
            heap_model,
            pool: ObjPool::new(),
            csm: CSManager::new(),
            pfg: PointerFlowGraph::new(),
            call_graph: CSCallGraph::new(),
            work_list: WorkList::new(),
            taint: TaintEngine::new(taint_config, empty_ctx),
        }
    }

    pub fn solve(mut self) -> PointerAnalysisResult {
        self.initialize();
        self.analyze();
        let flows = self
            .taint
            .on_finish(self.prog, &self.call_graph, &mut self.csm, &self.pool);
        info!(
            "Pointer analysis reached fixed point: {} reachable methods, {} call edges, {} pointers",
            self.call_graph.num_reachable(),
            self.call_graph.num_edges(),
            self.csm.num_pointers()
        );
        PointerAnalysisResult::new(self.csm, self.call_graph, self.pool, flows)
    }

    fn initialize(&mut self) {
        let main = self.prog.main_method().expect("program entry method is not set");
        let main_ctx = self.selector.empty_context();
        let cs_main = self.csm.get_cs_method(main_ctx, main);
        self.call_graph.add_entry_method(cs_main);
        self.add_reachable(cs_main);
    }

    /// Processes a newly reachable context-method pair: visits each of its
    /// statements once under the method's context.
    fn add_reachable(&mut self, cs_method: CSMethodId) {
        if self.call_graph.contains(cs_method) {
            return;
        }
        self.call_graph.add_reachable_method(cs_method);
        let (ctx, method) = self.csm.cs_method(cs_method);
        let prog = self.prog;
        debug!("Reachable: {} under {:?}", prog.method(method).name, ctx);
        for &stmt in &prog.method(method).stmts {
            self.process_stmt(cs_method, ctx, method, stmt);
        }
    }

    fn process_stmt(&mut self, cs_method: CSMethodId, ctx: CtxId, method: MethodId, stmt: StmtId) {
        let prog = self.prog;
        match &prog.stmt(stmt).kind {
            StmtKind::New { lhs, .. } => {
                let obj = self.heap_model.get_obj(&mut self.pool, stmt, prog);
                let heap_ctx = self.selector.select_heap_context(ctx, method, obj);
                let cs_obj = self.csm.get_cs_obj(heap_ctx, obj);
                let lhs_ptr = self.csm.get_cs_var(ctx, *lhs);
                self.work_list.add_entry(lhs_ptr, HybridPointsToSet::singleton(cs_obj));
            }
            StmtKind::Copy { lhs, rhs } => {
                let src = self.csm.get_cs_var(ctx, *rhs);
                let dst = self.csm.get_cs_var(ctx, *lhs);
                self.add_pfg_edge(src, dst);
            }
            StmtKind::StoreField {
                base: None, field, rhs, ..
            } => {
                let src = self.csm.get_cs_var(ctx, *rhs);
                let dst = self.csm.get_static_field(*field);
                self.add_pfg_edge(src, dst);
            }
            StmtKind::LoadField {
                lhs, base: None, field, ..
            } => {
                let src = self.csm.get_static_field(*field);
                let dst = self.csm.get_cs_var(ctx, *lhs);
                self.add_pfg_edge(src, dst);
            }
            StmtKind::Invoke {
                kind: InvokeKind::Static,
                ..
            } => self.process_static_call(cs_method, ctx, stmt),
            // Instance field and array accesses are deferred until the
            // base variable's points-to set grows.
            _ => {}
        }
    }

    fn process_static_call(&mut self, cs_caller: CSMethodId, ctx: CtxId, stmt: StmtId) {
        let prog = self.prog;
        let Some(callee) = resolver::resolve_callee(prog, None, stmt) else {
            warn!("Unresolved static call at {:?}", stmt);
            return;
        };
        let cs_callsite = self.csm.get_cs_call_site(ctx, stmt);
        let callee_ctx = self.selector.select_static_context(ctx, stmt, callee);
        let cs_callee = self.csm.get_cs_method(callee_ctx, callee);

        self.add_invoke_edges(ctx, stmt, callee_ctx, callee);
        self.taint.handle_call(
            prog,
            &mut self.csm,
            &mut self.pool,
            &mut self.work_list,
            None,
            None,
            (ctx, stmt),
            callee,
        );
        if self
            .call_graph
            .add_edge(CallKind::Static, cs_callsite, cs_caller, cs_callee)
        {
            self.add_reachable(cs_callee);
        }
    }

    /// Adds the argument-to-parameter and return-to-result edges for a
    /// resolved call.
    fn add_invoke_edges(&mut self, caller_ctx: CtxId, invoke: StmtId, callee_ctx: CtxId, callee: MethodId) {
        let prog = self.prog;
        let StmtKind::Invoke { result, args, .. } = &prog.stmt(invoke).kind else {
            panic!("add_invoke_edges on a non-invoke statement: {:?}", invoke);
        };
        for (i, &arg) in args.iter().enumerate() {
            let Some(&param) = prog.method(callee).params.get(i) else {
                warn!("Argument count mismatch at {:?}", invoke);
                break;
            };
            let src = self.csm.get_cs_var(caller_ctx, arg);
            let dst = self.csm.get_cs_var(callee_ctx, param);
            self.add_pfg_edge(src, dst);
        }
        if let Some(result) = *result {
            let dst = self.csm.get_cs_var(caller_ctx, result);
            for &ret in &prog.method(callee).ret_vars {
                let src = self.csm.get_cs_var(callee_ctx, ret);
                self.add_pfg_edge(src, dst);
            }
        }
    }

    /// Adds an edge to the pointer flow graph; if the edge is new, the
    /// source's current points-to set is scheduled at the target.
    fn add_pfg_edge(&mut self, src: PointerId, dst: PointerId) {
        if self.pfg.add_edge(src, dst) {
            let pts = self.csm.points_to(src).clone();
            self.work_list.add_entry(dst, pts);
        }
    }

    /// Drains the worklist. On a points-to growth of a variable, the
    /// deferred instance accesses of that variable are wired up and the
    /// instance calls on it are resolved.
    fn analyze(&mut self) {
        let prog = self.prog;
        while let Some((pointer, delta)) = self.work_list.poll_entry() {
            let diff = self.propagate(pointer, &delta);
            if diff.is_empty() {
                continue;
            }
            let PointerKind::CSVar { ctx, var } = self.csm.pointer(pointer).kind else {
                continue;
            };
            for cs_obj in diff.iter() {
                for &store in &prog.var(var).store_arrays {
                    let StmtKind::StoreArray { rhs, .. } = &prog.stmt(store).kind else {
                        unreachable!()
                    };
                    let src = self.csm.get_cs_var(ctx, *rhs);
                    let dst = self.csm.get_array_index(cs_obj);
                    self.add_pfg_edge(src, dst);
                }
                for &load in &prog.var(var).load_arrays {
                    let StmtKind::LoadArray { lhs, .. } = &prog.stmt(load).kind else {
                        unreachable!()
                    };
                    let src = self.csm.get_array_index(cs_obj);
                    let dst = self.csm.get_cs_var(ctx, *lhs);
                    self.add_pfg_edge(src, dst);
                }
                for &load in &prog.var(var).load_fields {
                    let StmtKind::LoadField { lhs, field, .. } = &prog.stmt(load).kind else {
                        unreachable!()
                    };
                    let src = self.csm.get_instance_field(cs_obj, *field);
                    let dst = self.csm.get_cs_var(ctx, *lhs);
                    self.add_pfg_edge(src, dst);
                }
                for &store in &prog.var(var).store_fields {
                    let StmtKind::StoreField { field, rhs, .. } = &prog.stmt(store).kind else {
                        unreachable!()
                    };
                    let src = self.csm.get_cs_var(ctx, *rhs);
                    let dst = self.csm.get_instance_field(cs_obj, *field);
                    self.add_pfg_edge(src, dst);
                }
                let (_, obj) = self.csm.cs_obj(cs_obj);
                if !self.pool.is_taint(obj) {
                    self.process_call(ctx, var, cs_obj);
                }
            }
        }
    }

    /// Unions `delta` into `pt(pointer)` and schedules the growth at the
    /// PFG successors. Returns the growth. The taint engine sees the full
    /// delta; filtering happens inside the engine.
    fn propagate(&mut self, pointer: PointerId, delta: &HybridPointsToSet<CSObjId>) -> HybridPointsToSet<CSObjId> {
        let mut diff = HybridPointsToSet::new();
        let pts = self.csm.points_to_mut(pointer);
        for obj in delta.iter() {
            if pts.insert(obj) {
                diff.insert(obj);
            }
        }
        if !diff.is_empty() {
            for succ in self.pfg.succs_of(pointer) {
                self.work_list.add_entry(succ, diff.clone());
            }
            self.taint
                .propagate(pointer, &diff, &self.csm, &self.pool, &mut self.work_list);
        }
        diff
    }

    /// Resolves the instance calls on `recv_var` against a newly
    /// discovered receiver object.
    fn process_call(&mut self, ctx: CtxId, recv_var: VarId, recv_obj: CSObjId) {
        let prog = self.prog;
        let (heap_ctx, obj) = self.csm.cs_obj(recv_obj);
        let recv_ty = self.pool.obj(obj).ty;
        for &invoke in &prog.var(recv_var).invokes {
            let Some(callee) = resolver::resolve_callee(prog, Some(recv_ty), invoke) else {
                debug!("Unresolved instance call at {:?}", invoke);
                continue;
            };
            let cs_callsite = self.csm.get_cs_call_site(ctx, invoke);
            let callee_ctx = self
                .selector
                .select_instance_context(ctx, invoke, (heap_ctx, obj), callee);
            let cs_callee = self.csm.get_cs_method(callee_ctx, callee);

            // The receiver always reaches the callee's `this`, whether or
            // not the call edge is new.
            if let Some(this) = prog.method(callee).this_var {
                let this_ptr = self.csm.get_cs_var(callee_ctx, this);
                self.work_list
                    .add_entry(this_ptr, HybridPointsToSet::singleton(recv_obj));
            }

            let StmtKind::Invoke { kind, .. } = &prog.stmt(invoke).kind else {
                unreachable!()
            };
            let cs_caller = self.csm.get_cs_method(ctx, prog.stmt(invoke).method);
            if self
                .call_graph
                .add_edge((*kind).into(), cs_callsite, cs_caller, cs_callee)
            {
                self.add_invoke_edges(ctx, invoke, callee_ctx, callee);
                self.taint.handle_call(
                    prog,
                    &mut self.csm,
                    &mut self.pool,
                    &mut self.work_list,
                    Some(recv_var),
                    Some(obj),
                    (ctx, invoke),
                    callee,
                );
                self.add_reachable(cs_callee);
            }
        }
    }
}
