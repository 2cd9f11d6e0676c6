//! End-to-end scenarios for the pointer analysis and the taint engine.

use optra::graph::call_graph::CallKind;
use optra::ir::{InvokeKind, MethodId, Program, StmtId, StmtKind, VarId};
use optra::pta::{run_pta_with_config, PointerAnalysisResult};
use optra::taint::TaintConfig;
use optra::util::options::{AnalysisOptions, PtaType};

fn options(pta_type: PtaType) -> AnalysisOptions {
    AnalysisOptions {
        pta_type,
        ..AnalysisOptions::default()
    }
}

fn run(prog: &Program, pta_type: PtaType) -> PointerAnalysisResult {
    run_pta_with_config(prog, &options(pta_type), TaintConfig::empty())
}

fn invoke_static(prog: &mut Program, method: MethodId, class: &str, name: &str, result: Option<VarId>, args: Vec<VarId>) -> StmtId {
    let callee_class = prog.class_by_name(class).unwrap();
    prog.add_stmt(
        method,
        StmtKind::Invoke {
            result,
            kind: InvokeKind::Static,
            callee_class,
            callee_name: name.to_string(),
            base: None,
            args,
        },
    )
}

/// `x = new C(); x.m();` where both `C` and its subclass `D` override `m`:
/// only `C.m` is called, `D.m` stays unreachable.
#[test]
fn virtual_dispatch_follows_points_to() {
    let mut prog = Program::new();
    let c = prog.add_class("C", None);
    let d = prog.add_class("D", Some(c));
    let cm = prog.add_method(c, "m", false);
    let dm = prog.add_method(d, "m", false);
    let main_class = prog.add_class("Main", None);
    let main = prog.add_method(main_class, "main", true);
    let c_ty = prog.class(c).ty;
    let x = prog.new_var(main, "x", Some(c_ty));
    prog.add_stmt(main, StmtKind::New { lhs: x, ty: c_ty });
    let call = prog.add_stmt(
        main,
        StmtKind::Invoke {
            result: None,
            kind: InvokeKind::Virtual,
            callee_class: c,
            callee_name: "m".to_string(),
            base: Some(x),
            args: vec![],
        },
    );
    prog.set_main(main);

    let result = run(&prog, PtaType::Insensitive);
    assert_eq!(result.points_to(x).len(), 1);
    let edges: Vec<_> = result
        .call_edges()
        .iter()
        .filter(|(_, site, _)| *site == call)
        .collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].0, CallKind::Virtual);
    assert_eq!(edges[0].2, cm);
    assert!(result.reachable_methods().contains(&cm));
    assert!(!result.reachable_methods().contains(&dm));

    // The receiver object reaches the callee's `this`.
    let this = prog.method(cm).this_var.unwrap();
    assert_eq!(result.points_to(this), result.points_to(x));
}

/// Copy chains at the fixed point: inclusion edges are saturated.
#[test]
fn copies_saturate_points_to_sets() {
    let mut prog = Program::new();
    let c = prog.add_class("C", None);
    let main_class = prog.add_class("Main", None);
    let main = prog.add_method(main_class, "main", true);
    let c_ty = prog.class(c).ty;
    let x = prog.new_var(main, "x", Some(c_ty));
    let y = prog.new_var(main, "y", Some(c_ty));
    let z = prog.new_var(main, "z", Some(c_ty));
    prog.add_stmt(main, StmtKind::New { lhs: x, ty: c_ty });
    prog.add_stmt(main, StmtKind::Copy { lhs: y, rhs: x });
    prog.add_stmt(main, StmtKind::Copy { lhs: z, rhs: y });
    // A cycle back into x must not diverge.
    prog.add_stmt(main, StmtKind::Copy { lhs: x, rhs: z });
    prog.set_main(main);

    let result = run(&prog, PtaType::Insensitive);
    assert_eq!(result.points_to(x).len(), 1);
    assert_eq!(result.points_to(x), result.points_to(y));
    assert_eq!(result.points_to(y), result.points_to(z));
}

/// Instance fields through an alias: `a.f = o; b = a; y = b.f`.
#[test]
fn instance_field_flow_through_alias() {
    let mut prog = Program::new();
    let c = prog.add_class("C", None);
    let box_class = prog.add_class("Box", None);
    let c_ty = prog.class(c).ty;
    let box_ty = prog.class(box_class).ty;
    let f = prog.add_field(box_class, "f", c_ty, false);
    let main_class = prog.add_class("Main", None);
    let main = prog.add_method(main_class, "main", true);
    let a = prog.new_var(main, "a", Some(box_ty));
    let b = prog.new_var(main, "b", Some(box_ty));
    let o = prog.new_var(main, "o", Some(c_ty));
    let y = prog.new_var(main, "y", Some(c_ty));
    prog.add_stmt(main, StmtKind::New { lhs: a, ty: box_ty });
    prog.add_stmt(main, StmtKind::New { lhs: o, ty: c_ty });
    prog.add_stmt(
        main,
        StmtKind::StoreField {
            base: Some(a),
            field: f,
            rhs: o,
        },
    );
    prog.add_stmt(main, StmtKind::Copy { lhs: b, rhs: a });
    prog.add_stmt(
        main,
        StmtKind::LoadField {
            lhs: y,
            base: Some(b),
            field: f,
        },
    );
    prog.set_main(main);

    let result = run(&prog, PtaType::Insensitive);
    assert_eq!(result.points_to(y), result.points_to(o));
    assert_eq!(result.points_to(y).len(), 1);
}

/// Static fields and array cells route objects through their canonical
/// pointers.
#[test]
fn static_fields_and_arrays_route_objects() {
    let mut prog = Program::new();
    let c = prog.add_class("C", None);
    let c_ty = prog.class(c).ty;
    let holder = prog.add_class("Holder", None);
    let g = prog.add_field(holder, "g", c_ty, true);
    let arr_ty = prog.array_type(c_ty);
    let int_ty = prog.int_type();
    let main_class = prog.add_class("Main", None);
    let main = prog.add_method(main_class, "main", true);
    let o = prog.new_var(main, "o", Some(c_ty));
    let s = prog.new_var(main, "s", Some(c_ty));
    let arr = prog.new_var(main, "arr", Some(arr_ty));
    let i = prog.new_var(main, "i", Some(int_ty));
    let t = prog.new_var(main, "t", Some(c_ty));
    prog.add_stmt(main, StmtKind::New { lhs: o, ty: c_ty });
    prog.add_stmt(main, StmtKind::StoreField { base: None, field: g, rhs: o });
    prog.add_stmt(main, StmtKind::LoadField { lhs: s, base: None, field: g });
    prog.add_stmt(main, StmtKind::New { lhs: arr, ty: arr_ty });
    prog.add_stmt(main, StmtKind::StoreArray { array: arr, index: i, rhs: o });
    prog.add_stmt(main, StmtKind::LoadArray { lhs: t, array: arr, index: i });
    prog.set_main(main);

    let result = run(&prog, PtaType::Insensitive);
    assert_eq!(result.points_to(s), result.points_to(o));
    assert_eq!(result.points_to(t), result.points_to(o));
}

/// 1-call-site sensitivity keeps two identity calls apart; the
/// insensitive analysis merges them.
#[test]
fn one_call_site_sensitivity_separates_calls() {
    let mut prog = Program::new();
    let c = prog.add_class("C", None);
    let d = prog.add_class("D", None);
    let c_ty = prog.class(c).ty;
    let d_ty = prog.class(d).ty;
    let id_class = prog.add_class("Id", None);
    let id = prog.add_method(id_class, "id", true);
    let p = prog.new_var(id, "p", None);
    prog.set_params(id, vec![p]);
    prog.add_return_var(id, p);
    let main_class = prog.add_class("Main", None);
    let main = prog.add_method(main_class, "main", true);
    let a1 = prog.new_var(main, "a1", Some(c_ty));
    let a2 = prog.new_var(main, "a2", Some(d_ty));
    let x1 = prog.new_var(main, "x1", Some(c_ty));
    let x2 = prog.new_var(main, "x2", Some(d_ty));
    prog.add_stmt(main, StmtKind::New { lhs: a1, ty: c_ty });
    prog.add_stmt(main, StmtKind::New { lhs: a2, ty: d_ty });
    invoke_static(&mut prog, main, "Id", "id", Some(x1), vec![a1]);
    invoke_static(&mut prog, main, "Id", "id", Some(x2), vec![a2]);
    prog.set_main(main);

    let insensitive = run(&prog, PtaType::Insensitive);
    assert_eq!(insensitive.points_to(x1).len(), 2);
    assert_eq!(insensitive.points_to(x1), insensitive.points_to(x2));

    let cs = run(&prog, PtaType::CallSiteSensitive);
    assert_eq!(cs.points_to(x1).len(), 1);
    assert_eq!(cs.points_to(x2).len(), 1);
    assert_ne!(cs.points_to(x1), cs.points_to(x2));
    assert_eq!(cs.points_to(x1), cs.points_to(a1));
    assert_eq!(cs.points_to(x2), cs.points_to(a2));
}

/// Builds the taint scenario program:
/// `s = Secret.readSecret(); t = lit.concat(s); Log.log(<arg>);`.
fn taint_program(log_concat_result: bool) -> (Program, StmtId, StmtId) {
    let mut prog = Program::new();
    let string = prog.add_class("String", None);
    let string_ty = prog.class(string).ty;
    let concat = prog.add_method(string, "concat", false);
    let concat_p = prog.new_var(concat, "p", Some(string_ty));
    prog.set_params(concat, vec![concat_p]);
    let secret = prog.add_class("Secret", None);
    prog.add_method(secret, "readSecret", true);
    let log_class = prog.add_class("Log", None);
    let log = prog.add_method(log_class, "log", true);
    let log_p = prog.new_var(log, "p", Some(string_ty));
    prog.set_params(log, vec![log_p]);

    let main_class = prog.add_class("Main", None);
    let main = prog.add_method(main_class, "main", true);
    let lit = prog.new_var(main, "lit", Some(string_ty));
    let s = prog.new_var(main, "s", Some(string_ty));
    let y = prog.new_var(main, "y", Some(string_ty));
    prog.add_stmt(main, StmtKind::New { lhs: lit, ty: string_ty });
    let source_call = invoke_static(&mut prog, main, "Secret", "readSecret", Some(s), vec![]);
    prog.add_stmt(
        main,
        StmtKind::Invoke {
            result: Some(y),
            kind: InvokeKind::Virtual,
            callee_class: string,
            callee_name: "concat".to_string(),
            base: Some(lit),
            args: vec![s],
        },
    );
    let sink_arg = if log_concat_result { y } else { s };
    let sink_call = invoke_static(&mut prog, main, "Log", "log", None, vec![sink_arg]);
    prog.set_main(main);
    (prog, source_call, sink_call)
}

const BASE_POLICY: &str = r#"
sources:
  - { method: "Secret.readSecret", type: "String" }
sinks:
  - { method: "Log.log", index: 0 }
"#;

/// `s = readSecret(); log(s);` yields exactly one flow.
#[test]
fn taint_source_to_sink() {
    let (prog, source_call, sink_call) = taint_program(false);
    let config = TaintConfig::parse(BASE_POLICY, &prog).unwrap();
    let result = run_pta_with_config(&prog, &options(PtaType::Insensitive), config);
    let flows: Vec<_> = result.taint_flows().iter().collect();
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].source_call, source_call);
    assert_eq!(flows[0].sink_call, sink_call);
    assert_eq!(flows[0].index, 0);
}

/// A base-to-result transfer does not move the taint (the taint sits on
/// the argument, not the base); an arg0-to-result transfer does.
#[test]
fn taint_transfer_endpoints_matter() {
    let (prog, _, _) = taint_program(true);
    let base_transfer = format!(
        "{}\ntransfers:\n  - {{ method: \"String.concat\", from: base, to: result }}\n",
        BASE_POLICY
    );
    let config = TaintConfig::parse(&base_transfer, &prog).unwrap();
    let result = run_pta_with_config(&prog, &options(PtaType::Insensitive), config);
    assert!(result.taint_flows().is_empty());

    let (prog, source_call, sink_call) = taint_program(true);
    let arg_transfer = format!(
        "{}\ntransfers:\n  - {{ method: \"String.concat\", from: 0, to: result }}\n",
        BASE_POLICY
    );
    let config = TaintConfig::parse(&arg_transfer, &prog).unwrap();
    let result = run_pta_with_config(&prog, &options(PtaType::Insensitive), config);
    let flows: Vec<_> = result.taint_flows().iter().collect();
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].source_call, source_call);
    assert_eq!(flows[0].sink_call, sink_call);
}

/// Duplicated source rules inject the same `(callsite, type)` taint
/// object twice; the flow set does not change.
#[test]
fn taint_injection_is_idempotent() {
    let (prog, _, _) = taint_program(false);
    let doubled = r#"
sources:
  - { method: "Secret.readSecret", type: "String" }
  - { method: "Secret.readSecret", type: "String" }
sinks:
  - { method: "Log.log", index: 0 }
"#;
    let config = TaintConfig::parse(doubled, &prog).unwrap();
    let result = run_pta_with_config(&prog, &options(PtaType::Insensitive), config);
    assert_eq!(result.taint_flows().len(), 1);
}

/// Taint objects never act as call receivers: a tainted variable used as
/// a receiver triggers no spurious dispatch.
#[test]
fn taint_objects_do_not_dispatch() {
    let (prog, _, _) = taint_program(false);
    let config = TaintConfig::parse(BASE_POLICY, &prog).unwrap();
    let result = run_pta_with_config(&prog, &options(PtaType::Insensitive), config);
    // `lit.concat(s)` resolves through the String literal object only:
    // one edge, even though `s` holds a taint object of type String.
    let concat = prog.class(prog.class_by_name("String").unwrap()).methods["concat"];
    let concat_edges = result
        .call_edges()
        .iter()
        .filter(|(_, _, callee)| *callee == concat)
        .count();
    assert_eq!(concat_edges, 1);
}
