// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Context-sensitive pointer analysis.

pub mod context;
pub mod cs_manager;
pub mod heap;
pub mod selector;
pub mod solver;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::*;

use crate::graph::call_graph::{CSCallGraph, CallKind};
use crate::ir::{MethodId, Program, StmtId, VarId};
use crate::pta::cs_manager::{CSManager, PointerKind};
use crate::pta::heap::{AllocationSiteModel, ObjId, ObjPool};
use crate::pta::selector::{ContextInsensitive, KCallSiteSensitive, KObjectSensitive};
use crate::pta::solver::CSPTASolver;
use crate::pts_set::PointsToSet;
use crate::taint::{TaintConfig, TaintFlow};
use crate::util::options::{AnalysisOptions, PtaType};

pub const PTA_ID: &str = "cs-pta";

static EMPTY_OBJ_SET: BTreeSet<ObjId> = BTreeSet::new();

/// The result of a pointer analysis run: context-collapsed points-to sets,
/// the context-sensitive call graph, and the taint flows collected on
/// finish.
pub struct PointerAnalysisResult {
    points_to: HashMap<VarId, BTreeSet<ObjId>>,
    reachable_methods: BTreeSet<MethodId>,
    call_edges: BTreeSet<(CallKind, StmtId, MethodId)>,
    cs_call_graph: CSCallGraph,
    cs_manager: CSManager,
    pool: ObjPool,
    taint_flows: BTreeSet<TaintFlow>,
}

impl PointerAnalysisResult {
    pub(crate) fn new(
        cs_manager: CSManager,
        cs_call_graph: CSCallGraph,
        pool: ObjPool,
        taint_flows: BTreeSet<TaintFlow>,
    ) -> Self {
        let mut points_to: HashMap<VarId, BTreeSet<ObjId>> = HashMap::new();
        for (_, data) in cs_manager.pointers() {
            if let PointerKind::CSVar { var, .. } = data.kind {
                let objs = points_to.entry(var).or_default();
                for cs_obj in data.pts.iter() {
                    let (_, obj) = cs_manager.cs_obj(cs_obj);
                    objs.insert(obj);
                }
            }
        }
        let reachable_methods = cs_call_graph
            .reachable_methods()
            .map(|cs_m| cs_manager.cs_method(cs_m).1)
            .collect();
        let call_edges = cs_call_graph
            .edges()
            .map(|(kind, cs_site, _, cs_callee)| {
                (
                    kind,
                    cs_manager.cs_call_site(cs_site).1,
                    cs_manager.cs_method(cs_callee).1,
                )
            })
            .collect();
        PointerAnalysisResult {
            points_to,
            reachable_methods,
            call_edges,
            cs_call_graph,
            cs_manager,
            pool,
            taint_flows,
        }
    }

    /// The context-collapsed may-point-to set of `var`.
    pub fn points_to(&self, var: VarId) -> &BTreeSet<ObjId> {
        self.points_to.get(&var).unwrap_or(&EMPTY_OBJ_SET)
    }

    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.points_to.keys().copied()
    }

    pub fn reachable_methods(&self) -> &BTreeSet<MethodId> {
        &self.reachable_methods
    }

    /// Collapsed call edges as `(kind, callsite, callee)` triples.
    pub fn call_edges(&self) -> &BTreeSet<(CallKind, StmtId, MethodId)> {
        &self.call_edges
    }

    /// Callee sets per call site, for ICFG construction.
    pub fn call_map(&self) -> BTreeMap<StmtId, BTreeSet<MethodId>> {
        let mut map: BTreeMap<StmtId, BTreeSet<MethodId>> = BTreeMap::new();
        for &(_, site, callee) in &self.call_edges {
            map.entry(site).or_default().insert(callee);
        }
        map
    }

    pub fn cs_call_graph(&self) -> &CSCallGraph {
        &self.cs_call_graph
    }

    pub fn cs_manager(&self) -> &CSManager {
        &self.cs_manager
    }

    pub fn obj_pool(&self) -> &ObjPool {
        &self.pool
    }

    /// Taint flows, deduplicated and totally ordered. Stored under the
    /// taint analysis id.
    pub fn taint_flows(&self) -> &BTreeSet<TaintFlow> {
        &self.taint_flows
    }
}

/// Runs the pointer analysis configured by `options` on `prog`.
pub fn run_pta(prog: &Program, options: &AnalysisOptions) -> PointerAnalysisResult {
    let taint_config = match &options.taint_config {
        Some(path) => match TaintConfig::load(path, prog) {
            Ok(config) => config,
            Err(err) => {
                error!("{}; proceeding without a taint policy", err);
                TaintConfig::empty()
            }
        },
        None => TaintConfig::empty(),
    };
    run_pta_with_config(prog, options, taint_config)
}

/// Runs the pointer analysis with an already loaded taint policy.
pub fn run_pta_with_config(
    prog: &Program,
    options: &AnalysisOptions,
    taint_config: TaintConfig,
) -> PointerAnalysisResult {
    let k = options.context_depth;
    match options.pta_type {
        PtaType::Insensitive => {
            CSPTASolver::new(prog, ContextInsensitive::new(), AllocationSiteModel, taint_config).solve()
        }
        PtaType::CallSiteSensitive => {
            CSPTASolver::new(prog, KCallSiteSensitive::new(k), AllocationSiteModel, taint_config).solve()
        }
        PtaType::ObjectSensitive => {
            CSPTASolver::new(prog, KObjectSensitive::new(k), AllocationSiteModel, taint_config).solve()
        }
    }
}
