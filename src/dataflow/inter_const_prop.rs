// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Interprocedural constant propagation for integer values.
//!
//! Field and array accesses are resolved through the pointer analysis
//! result: stores meet into per-cell maps keyed by abstract object, loads
//! read them back, and a changed cell re-enqueues every load on an alias
//! of the written object.

use std::collections::HashMap;

use itertools::Itertools;

use crate::dataflow::const_prop::{CPFact, ConstantPropagation, Value};
use crate::dataflow::inter_solver::{DataflowResult, InterDataflowAnalysis, InterSolver, WorkQueue};
use crate::graph::icfg::{Icfg, IcfgEdgeKind};
use crate::ir::{FieldId, Program, StmtId, StmtKind, VarId};
use crate::pta::heap::ObjId;
use crate::pta::PointerAnalysisResult;

pub const INTER_CONSTPROP_ID: &str = "inter-constprop";

pub struct InterConstantPropagation<'p> {
    prog: &'p Program,
    pta: &'p PointerAnalysisResult,
    cp: ConstantPropagation,
    /// Inverted pointer result: every variable an object may flow into.
    alias_map: HashMap<ObjId, Vec<VarId>>,
    static_field_value: HashMap<FieldId, Value>,
    instance_field_value: HashMap<(ObjId, FieldId), Value>,
    array_index_value: HashMap<(ObjId, Value), Value>,
    /// Static field loads in the ICFG, per field.
    static_field_loads: HashMap<FieldId, Vec<StmtId>>,
}

impl<'p> InterConstantPropagation<'p> {
    pub fn new(prog: &'p Program, pta: &'p PointerAnalysisResult, icfg: &Icfg) -> Self {
        let mut alias_map: HashMap<ObjId, Vec<VarId>> = HashMap::new();
        for var in pta.vars().sorted() {
            for &obj in pta.points_to(var) {
                alias_map.entry(obj).or_default().push(var);
            }
        }
        let mut static_field_loads: HashMap<FieldId, Vec<StmtId>> = HashMap::new();
        for node in icfg.nodes() {
            if let StmtKind::LoadField {
                base: None, field, ..
            } = &prog.stmt(node).kind
            {
                static_field_loads.entry(*field).or_default().push(node);
            }
        }
        InterConstantPropagation {
            prog,
            pta,
            cp: ConstantPropagation::new(),
            alias_map,
            static_field_value: HashMap::new(),
            instance_field_value: HashMap::new(),
            array_index_value: HashMap::new(),
            static_field_loads,
        }
    }

    /// Re-enqueues the instance field loads on every alias of `obj`.
    fn propagate_field_alias(&self, obj: ObjId, work: &mut WorkQueue) {
        if let Some(aliases) = self.alias_map.get(&obj) {
            for &alias in aliases {
                work.add_all_to_work_list(self.prog.var(alias).load_fields.iter().copied());
            }
        }
    }

    /// Re-enqueues the array loads on every alias of `array`.
    fn propagate_array_alias(&self, array: ObjId, work: &mut WorkQueue) {
        if let Some(aliases) = self.alias_map.get(&array) {
            for &alias in aliases {
                work.add_all_to_work_list(self.prog.var(alias).load_arrays.iter().copied());
            }
        }
    }

    fn transfer_non_call_node(
        &mut self,
        node: StmtId,
        in_fact: &CPFact,
        out: &mut CPFact,
        work: &mut WorkQueue,
    ) -> bool {
        let prog = self.prog;
        match &prog.stmt(node).kind {
            StmtKind::StoreField {
                base: None, field, rhs,
            } => {
                let changed = out.copy_from(in_fact);
                let rvalue = in_fact.get(*rhs);
                let old = self
                    .static_field_value
                    .get(field)
                    .copied()
                    .unwrap_or(Value::Undef);
                let new = old.meet(rvalue);
                if new != old {
                    self.static_field_value.insert(*field, new);
                    if let Some(loads) = self.static_field_loads.get(field) {
                        work.add_all_to_work_list(loads.iter().copied());
                    }
                }
                changed
            }
            StmtKind::StoreField {
                base: Some(base),
                field,
                rhs,
            } => {
                let changed = out.copy_from(in_fact);
                let rvalue = in_fact.get(*rhs);
                let pta = self.pta;
                for &obj in pta.points_to(*base) {
                    let old = self
                        .instance_field_value
                        .get(&(obj, *field))
                        .copied()
                        .unwrap_or(Value::Undef);
                    let new = old.meet(rvalue);
                    if new != old {
                        self.instance_field_value.insert((obj, *field), new);
                        self.propagate_field_alias(obj, work);
                    }
                }
                changed
            }
            StmtKind::StoreArray { array, index, rhs } => {
                let changed = out.copy_from(in_fact);
                let index_value = in_fact.get(*index);
                if index_value.is_undef() {
                    return changed;
                }
                let rvalue = in_fact.get(*rhs);
                let pta = self.pta;
                for &obj in pta.points_to(*array) {
                    let old = self
                        .array_index_value
                        .get(&(obj, index_value))
                        .copied()
                        .unwrap_or(Value::Undef);
                    let new = old.meet(rvalue);
                    if new != old {
                        self.array_index_value.insert((obj, index_value), new);
                        self.propagate_array_alias(obj, work);
                    }
                }
                changed
            }
            StmtKind::LoadField {
                lhs, base: None, field,
            } => {
                let mut changed = out.copy_from(in_fact);
                let value = self
                    .static_field_value
                    .get(field)
                    .copied()
                    .unwrap_or(Value::Undef);
                changed |= out.update(*lhs, value);
                changed
            }
            StmtKind::LoadField {
                lhs,
                base: Some(base),
                field,
            } => {
                let mut changed = out.copy_from(in_fact);
                let mut value = Value::Undef;
                for &obj in self.pta.points_to(*base) {
                    let cell = self
                        .instance_field_value
                        .get(&(obj, *field))
                        .copied()
                        .unwrap_or(Value::Undef);
                    value = value.meet(cell);
                }
                changed |= out.update(*lhs, value);
                changed
            }
            StmtKind::LoadArray { lhs, array, index } => {
                let mut changed = out.copy_from(in_fact);
                let index_value = in_fact.get(*index);
                if index_value.is_undef() {
                    return changed;
                }
                let mut value = Value::Undef;
                for &obj in self.pta.points_to(*array) {
                    for (&(cell_obj, cell_index), &cell_value) in &self.array_index_value {
                        if cell_obj != obj {
                            continue;
                        }
                        // A NAC index may read any cell; a constant index
                        // reads matching cells and NAC-indexed cells.
                        if index_value.is_nac() || cell_index.is_nac() || cell_index == index_value {
                            value = value.meet(cell_value);
                        }
                    }
                }
                changed |= out.update(*lhs, value);
                changed
            }
            _ => self.cp.transfer_stmt(prog, node, in_fact, out),
        }
    }
}

impl<'p> InterDataflowAnalysis for InterConstantPropagation<'p> {
    type Fact = CPFact;

    fn new_boundary_fact(&self, entry: StmtId) -> CPFact {
        let method = self.prog.stmt(entry).method;
        self.cp.new_boundary_fact(self.prog, method)
    }

    fn new_initial_fact(&self) -> CPFact {
        self.cp.new_initial_fact()
    }

    fn meet_into(&self, fact: &CPFact, target: &mut CPFact) {
        self.cp.meet_into(fact, target);
    }

    fn transfer_node(&mut self, node: StmtId, in_fact: &CPFact, out: &mut CPFact, work: &mut WorkQueue) -> bool {
        match &self.prog.stmt(node).kind {
            // Flow across a call is carried by the edge transfers.
            StmtKind::Invoke { .. } => out.copy_from(in_fact),
            _ => self.transfer_non_call_node(node, in_fact, out, work),
        }
    }

    fn transfer_edge(&self, src: StmtId, kind: &IcfgEdgeKind, out_of_src: &CPFact) -> CPFact {
        match kind {
            IcfgEdgeKind::Normal => out_of_src.clone(),
            IcfgEdgeKind::CallToReturn => {
                // The call result is defined by the return edge; kill it.
                let mut fact = out_of_src.clone();
                if let Some(def) = self.prog.def_var(src) {
                    fact.remove(def);
                }
                fact
            }
            IcfgEdgeKind::Call { callee } => {
                let mut fact = self.cp.new_initial_fact();
                let StmtKind::Invoke { args, .. } = &self.prog.stmt(src).kind else {
                    return fact;
                };
                for (i, &arg) in args.iter().enumerate() {
                    if let Some(&param) = self.prog.method(*callee).params.get(i) {
                        fact.update(param, out_of_src.get(arg));
                    }
                }
                fact
            }
            IcfgEdgeKind::Return { call_site, ret_vars } => {
                let mut fact = self.cp.new_initial_fact();
                if let Some(lhs) = self.prog.def_var(*call_site) {
                    let mut value = Value::Undef;
                    for &ret in ret_vars {
                        value = value.meet(out_of_src.get(ret));
                    }
                    if self.prog.can_hold_int(lhs) && !value.is_const() {
                        value = Value::Nac;
                    }
                    fact.update(lhs, value);
                }
                fact
            }
        }
    }
}

/// Runs interprocedural constant propagation over the ICFG induced by the
/// pointer analysis result.
pub fn analyze(prog: &Program, pta: &PointerAnalysisResult) -> DataflowResult<CPFact> {
    let icfg = Icfg::from_pta(prog, pta);
    let analysis = InterConstantPropagation::new(prog, pta, &icfg);
    InterSolver::new(analysis, &icfg).solve()
}

/// Runs interprocedural constant propagation over a caller-provided ICFG.
pub fn analyze_with_icfg(
    prog: &Program,
    pta: &PointerAnalysisResult,
    icfg: &Icfg,
) -> DataflowResult<CPFact> {
    let analysis = InterConstantPropagation::new(prog, pta, icfg);
    InterSolver::new(analysis, icfg).solve()
}
