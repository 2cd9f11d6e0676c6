// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Method dispatch and class-hierarchy call resolution.

use std::collections::{BTreeSet, HashSet, VecDeque};

use log::*;

use crate::graph::call_graph::{CallGraph, CallKind};
use crate::ir::{ClassId, InvokeKind, MethodId, Program, StmtId, StmtKind, TypeId, TypeKind};

impl From<InvokeKind> for CallKind {
    fn from(kind: InvokeKind) -> CallKind {
        match kind {
            InvokeKind::Static => CallKind::Static,
            InvokeKind::Virtual => CallKind::Virtual,
            InvokeKind::Interface => CallKind::Interface,
            InvokeKind::Special => CallKind::Special,
            InvokeKind::Dynamic => CallKind::Dynamic,
        }
    }
}

/// Looks up the target method for `subsig` starting at `class`, walking up
/// the superclass chain until a non-abstract declaration is found.
pub fn dispatch(prog: &Program, class: ClassId, subsig: &str) -> Option<MethodId> {
    let mut current = Some(class);
    while let Some(c) = current {
        let data = prog.class(c);
        if let Some(&method) = data.methods.get(subsig) {
            if !prog.method(method).is_abstract {
                return Some(method);
            }
        }
        current = data.superclass;
    }
    None
}

fn receiver_class(prog: &Program, ty: TypeId) -> Option<ClassId> {
    match prog.type_kind(ty) {
        TypeKind::Reference(class) => Some(class),
        _ => None,
    }
}

/// Resolves the callee of a call site, using `recv_ty` for virtual and
/// interface dispatch. Returns `None` when resolution fails; callers treat
/// that as "no call edge", never as an error.
pub fn resolve_callee(prog: &Program, recv_ty: Option<TypeId>, invoke: StmtId) -> Option<MethodId> {
    let StmtKind::Invoke {
        kind,
        callee_class,
        callee_name,
        ..
    } = &prog.stmt(invoke).kind
    else {
        panic!("resolve_callee on a non-invoke statement: {:?}", invoke);
    };
    match kind {
        InvokeKind::Static => prog.class(*callee_class).methods.get(callee_name.as_str()).copied(),
        InvokeKind::Special => dispatch(prog, *callee_class, callee_name),
        InvokeKind::Virtual | InvokeKind::Interface => {
            let ty = recv_ty?;
            let class = receiver_class(prog, ty)?;
            dispatch(prog, class, callee_name)
        }
        InvokeKind::Dynamic => None,
    }
}

/// Resolves the possible callees of a call site via class hierarchy
/// analysis: the declared class and, for virtual and interface sites, its
/// whole subtree of subinterfaces, implementors, and subclasses.
pub fn resolve_cha(prog: &Program, invoke: StmtId) -> BTreeSet<MethodId> {
    let StmtKind::Invoke {
        kind,
        callee_class,
        callee_name,
        ..
    } = &prog.stmt(invoke).kind
    else {
        panic!("resolve_cha on a non-invoke statement: {:?}", invoke);
    };
    let mut methods = BTreeSet::new();
    match kind {
        InvokeKind::Static => {
            if let Some(&m) = prog.class(*callee_class).methods.get(callee_name.as_str()) {
                methods.insert(m);
            }
        }
        InvokeKind::Special => {
            if let Some(m) = dispatch(prog, *callee_class, callee_name) {
                methods.insert(m);
            }
        }
        InvokeKind::Virtual | InvokeKind::Interface => {
            let mut queue = VecDeque::new();
            let mut visited = HashSet::new();
            queue.push_back(*callee_class);
            visited.insert(*callee_class);
            while let Some(class) = queue.pop_front() {
                let data = prog.class(class);
                if data.is_interface {
                    for next in data.direct_subinterfaces.iter().chain(&data.direct_implementors) {
                        if visited.insert(*next) {
                            queue.push_back(*next);
                        }
                    }
                } else {
                    if let Some(target) = dispatch(prog, class, callee_name) {
                        methods.insert(target);
                    }
                    for sub in &data.direct_subclasses {
                        if visited.insert(*sub) {
                            queue.push_back(*sub);
                        }
                    }
                }
            }
        }
        InvokeKind::Dynamic => {}
    }
    methods
}

/// Builds a whole-program call graph by the CHA reachability walk from the
/// main method. This is the fallback used when no pointer analysis result
/// is available.
pub fn build_call_graph_cha(prog: &Program) -> CallGraph<MethodId, StmtId> {
    let mut call_graph = CallGraph::new();
    let Some(entry) = prog.main_method() else {
        warn!("No main method; CHA call graph is empty");
        return call_graph;
    };
    call_graph.add_entry_method(entry);
    let mut queue = VecDeque::new();
    queue.push_back(entry);
    while let Some(method) = queue.pop_front() {
        if !call_graph.add_reachable_method(method) {
            continue;
        }
        for &stmt in &prog.method(method).stmts {
            let StmtKind::Invoke { kind, .. } = &prog.stmt(stmt).kind else {
                continue;
            };
            for callee in resolve_cha(prog, stmt) {
                call_graph.add_edge((*kind).into(), stmt, method, callee);
                queue.push_back(callee);
            }
        }
    }
    call_graph
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::Program;

    /// class A { m() } ; class B extends A { m() } ; class C extends B {}
    fn hierarchy() -> (Program, ClassId, ClassId, ClassId, MethodId, MethodId) {
        let mut prog = Program::new();
        let a = prog.add_class("A", None);
        let b = prog.add_class("B", Some(a));
        let c = prog.add_class("C", Some(b));
        let am = prog.add_method(a, "m", false);
        let bm = prog.add_method(b, "m", false);
        (prog, a, b, c, am, bm)
    }

    #[test]
    fn dispatch_walks_superclasses() {
        let (prog, a, b, c, am, bm) = hierarchy();
        assert_eq!(dispatch(&prog, a, "m"), Some(am));
        assert_eq!(dispatch(&prog, b, "m"), Some(bm));
        assert_eq!(dispatch(&prog, c, "m"), Some(bm));
        assert_eq!(dispatch(&prog, c, "missing"), None);
    }

    #[test]
    fn cha_collects_overrides() {
        let (mut prog, a, _b, _c, am, bm) = hierarchy();
        let main_class = prog.add_class("Main", None);
        let main = prog.add_method(main_class, "main", true);
        let a_ty = prog.class(a).ty;
        let x = prog.new_var(main, "x", Some(a_ty));
        let invoke = prog.add_stmt(
            main,
            StmtKind::Invoke {
                result: None,
                kind: InvokeKind::Virtual,
                callee_class: a,
                callee_name: "m".to_string(),
                base: Some(x),
                args: vec![],
            },
        );
        prog.set_main(main);
        let callees = resolve_cha(&prog, invoke);
        assert_eq!(callees, BTreeSet::from([am, bm]));

        let cg = build_call_graph_cha(&prog);
        assert!(cg.contains(main));
        assert!(cg.contains(am));
        assert!(cg.contains(bm));
        assert_eq!(cg.num_edges(), 2);
    }

    #[test]
    fn interface_sites_walk_implementors() {
        let mut prog = Program::new();
        let iface = prog.add_interface("I");
        let impl_class = prog.add_class("Impl", None);
        prog.add_implements(impl_class, iface);
        let m = prog.add_method(impl_class, "run", false);
        let main_class = prog.add_class("Main", None);
        let main = prog.add_method(main_class, "main", true);
        let i_ty = prog.class(iface).ty;
        let x = prog.new_var(main, "x", Some(i_ty));
        let invoke = prog.add_stmt(
            main,
            StmtKind::Invoke {
                result: None,
                kind: InvokeKind::Interface,
                callee_class: iface,
                callee_name: "run".to_string(),
                base: Some(x),
                args: vec![],
            },
        );
        assert_eq!(resolve_cha(&prog, invoke), BTreeSet::from([m]));
    }
}
