// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Abstract heap objects and the heap model.

use std::collections::HashMap;

use crate::ir::{Program, StmtId, StmtKind, TypeId};
use crate::util::new_index;

new_index!(ObjId);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ObjKind {
    /// An object identified by its allocation site.
    Alloc { site: StmtId },
    /// A taint object introduced by a source rule, identified by the
    /// source call site and the tainted type.
    Taint { source_call: StmtId },
}

#[derive(Clone, Copy, Debug)]
pub struct ObjData {
    pub kind: ObjKind,
    pub ty: TypeId,
}

/// Arena for abstract heap objects. Allocation objects are canonical per
/// site; taint objects are canonicalized by the taint manager, which owns
/// the `(source call, type)` table.
#[derive(Default)]
pub struct ObjPool {
    objs: Vec<ObjData>,
    alloc_objs: HashMap<StmtId, ObjId>,
}

impl ObjPool {
    pub fn new() -> Self {
        ObjPool::default()
    }

    #[inline]
    pub fn obj(&self, id: ObjId) -> &ObjData {
        &self.objs[id.index()]
    }

    pub fn is_taint(&self, id: ObjId) -> bool {
        matches!(self.objs[id.index()].kind, ObjKind::Taint { .. })
    }

    /// The call site a taint object was born at, if `id` is one.
    pub fn taint_source_call(&self, id: ObjId) -> Option<StmtId> {
        match self.objs[id.index()].kind {
            ObjKind::Taint { source_call } => Some(source_call),
            ObjKind::Alloc { .. } => None,
        }
    }

    pub fn get_alloc_obj(&mut self, site: StmtId, ty: TypeId) -> ObjId {
        if let Some(id) = self.alloc_objs.get(&site) {
            return *id;
        }
        let id = ObjId::new(self.objs.len());
        self.objs.push(ObjData {
            kind: ObjKind::Alloc { site },
            ty,
        });
        self.alloc_objs.insert(site, id);
        id
    }

    /// Allocates a fresh taint object. Callers are expected to
    /// canonicalize; the pool only stores.
    pub fn add_taint_obj(&mut self, source_call: StmtId, ty: TypeId) -> ObjId {
        let id = ObjId::new(self.objs.len());
        self.objs.push(ObjData {
            kind: ObjKind::Taint { source_call },
            ty,
        });
        id
    }
}

/// Maps allocation sites to heap object identities.
pub trait HeapModel {
    fn get_obj(&mut self, pool: &mut ObjPool, alloc: StmtId, prog: &Program) -> ObjId;
}

/// The allocation-site heap model: one abstract object per `new` site.
pub struct AllocationSiteModel;

impl HeapModel for AllocationSiteModel {
    fn get_obj(&mut self, pool: &mut ObjPool, alloc: StmtId, prog: &Program) -> ObjId {
        let ty = match &prog.stmt(alloc).kind {
            StmtKind::New { ty, .. } => *ty,
            kind => panic!("heap model queried on a non-allocation statement: {:?}", kind),
        };
        pool.get_alloc_obj(alloc, ty)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn objects_are_canonical() {
        let mut prog = Program::new();
        let c = prog.add_class("C", None);
        let m = prog.add_method(c, "main", true);
        let c_ty = prog.class(c).ty;
        let x = prog.new_var(m, "x", Some(c_ty));
        let site = prog.add_stmt(m, StmtKind::New { lhs: x, ty: c_ty });

        let mut pool = ObjPool::new();
        let mut model = AllocationSiteModel;
        let o1 = model.get_obj(&mut pool, site, &prog);
        let o2 = model.get_obj(&mut pool, site, &prog);
        assert_eq!(o1, o2);
        assert!(!pool.is_taint(o1));

        let call = StmtId(100);
        let t1 = pool.add_taint_obj(call, c_ty);
        assert_ne!(t1, o1);
        assert!(pool.is_taint(t1));
        assert_eq!(pool.taint_source_call(t1), Some(call));
    }
}
