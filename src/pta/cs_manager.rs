// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Canonicalization of context-sensitive analysis entities.
//!
//! Every context-qualified variable, object, method, call site, and field
//! pointer is interned here: two requests with equal components return the
//! same index, so index equality is structural equality. Entities are
//! created lazily on first request and live for the whole analysis run.

use std::collections::HashMap;

use crate::ir::{FieldId, MethodId, StmtId, VarId};
use crate::pta::context::CtxId;
use crate::pta::heap::ObjId;
use crate::pts_set::{HybridPointsToSet, PointsToSet};
use crate::util::new_index;

new_index!(CSObjId);
new_index!(CSMethodId);
new_index!(CSCallSiteId);
new_index!(PointerId);

/// The polymorphic pointer: the nodes of the pointer flow graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PointerKind {
    CSVar { ctx: CtxId, var: VarId },
    InstanceField { base: CSObjId, field: FieldId },
    StaticField { field: FieldId },
    ArrayIndex { array: CSObjId },
}

pub struct PointerData {
    pub kind: PointerKind,
    /// The points-to set owned by this pointer. Monotonic, no removal.
    pub pts: HybridPointsToSet<CSObjId>,
}

#[derive(Default)]
pub struct CSManager {
    pointers: Vec<PointerData>,
    cs_vars: HashMap<(CtxId, VarId), PointerId>,
    static_fields: HashMap<FieldId, PointerId>,
    instance_fields: HashMap<(CSObjId, FieldId), PointerId>,
    array_indexes: HashMap<CSObjId, PointerId>,

    cs_objs: HashMap<(CtxId, ObjId), CSObjId>,
    cs_obj_list: Vec<(CtxId, ObjId)>,

    cs_methods: HashMap<(CtxId, MethodId), CSMethodId>,
    cs_method_list: Vec<(CtxId, MethodId)>,

    cs_call_sites: HashMap<(CtxId, StmtId), CSCallSiteId>,
    cs_call_site_list: Vec<(CtxId, StmtId)>,
}

impl CSManager {
    pub fn new() -> Self {
        CSManager::default()
    }

    fn intern_pointer(pointers: &mut Vec<PointerData>, kind: PointerKind) -> PointerId {
        let id = PointerId::new(pointers.len());
        pointers.push(PointerData {
            kind,
            pts: HybridPointsToSet::new(),
        });
        id
    }

    pub fn get_cs_var(&mut self, ctx: CtxId, var: VarId) -> PointerId {
        let pointers = &mut self.pointers;
        *self
            .cs_vars
            .entry((ctx, var))
            .or_insert_with(|| Self::intern_pointer(pointers, PointerKind::CSVar { ctx, var }))
    }

    pub fn get_static_field(&mut self, field: FieldId) -> PointerId {
        let pointers = &mut self.pointers;
        *self
            .static_fields
            .entry(field)
            .or_insert_with(|| Self::intern_pointer(pointers, PointerKind::StaticField { field }))
    }

    pub fn get_instance_field(&mut self, base: CSObjId, field: FieldId) -> PointerId {
        let pointers = &mut self.pointers;
        *self
            .instance_fields
            .entry((base, field))
            .or_insert_with(|| Self::intern_pointer(pointers, PointerKind::InstanceField { base, field }))
    }

    pub fn get_array_index(&mut self, array: CSObjId) -> PointerId {
        let pointers = &mut self.pointers;
        *self
            .array_indexes
            .entry(array)
            .or_insert_with(|| Self::intern_pointer(pointers, PointerKind::ArrayIndex { array }))
    }

    pub fn get_cs_obj(&mut self, heap_ctx: CtxId, obj: ObjId) -> CSObjId {
        if let Some(id) = self.cs_objs.get(&(heap_ctx, obj)) {
            return *id;
        }
        let id = CSObjId::new(self.cs_obj_list.len());
        self.cs_obj_list.push((heap_ctx, obj));
        self.cs_objs.insert((heap_ctx, obj), id);
        id
    }

    pub fn get_cs_method(&mut self, ctx: CtxId, method: MethodId) -> CSMethodId {
        if let Some(id) = self.cs_methods.get(&(ctx, method)) {
            return *id;
        }
        let id = CSMethodId::new(self.cs_method_list.len());
        self.cs_method_list.push((ctx, method));
        self.cs_methods.insert((ctx, method), id);
        id
    }

    pub fn get_cs_call_site(&mut self, ctx: CtxId, callsite: StmtId) -> CSCallSiteId {
        if let Some(id) = self.cs_call_sites.get(&(ctx, callsite)) {
            return *id;
        }
        let id = CSCallSiteId::new(self.cs_call_site_list.len());
        self.cs_call_site_list.push((ctx, callsite));
        self.cs_call_sites.insert((ctx, callsite), id);
        id
    }

    #[inline]
    pub fn pointer(&self, id: PointerId) -> &PointerData {
        &self.pointers[id.index()]
    }

    #[inline]
    pub fn points_to(&self, id: PointerId) -> &HybridPointsToSet<CSObjId> {
        &self.pointers[id.index()].pts
    }

    #[inline]
    pub fn points_to_mut(&mut self, id: PointerId) -> &mut HybridPointsToSet<CSObjId> {
        &mut self.pointers[id.index()].pts
    }

    #[inline]
    pub fn cs_obj(&self, id: CSObjId) -> (CtxId, ObjId) {
        self.cs_obj_list[id.index()]
    }

    #[inline]
    pub fn cs_method(&self, id: CSMethodId) -> (CtxId, MethodId) {
        self.cs_method_list[id.index()]
    }

    #[inline]
    pub fn cs_call_site(&self, id: CSCallSiteId) -> (CtxId, StmtId) {
        self.cs_call_site_list[id.index()]
    }

    pub fn num_pointers(&self) -> usize {
        self.pointers.len()
    }

    /// Iterates all canonical pointers with their data.
    pub fn pointers(&self) -> impl Iterator<Item = (PointerId, &PointerData)> {
        self.pointers
            .iter()
            .enumerate()
            .map(|(i, data)| (PointerId::new(i), data))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pta::context::ContextCache;

    #[test]
    fn entities_are_canonical() {
        let mut csm = CSManager::new();
        let ctx = ContextCache::EMPTY;
        let v = VarId(7);
        let p1 = csm.get_cs_var(ctx, v);
        let p2 = csm.get_cs_var(ctx, v);
        assert_eq!(p1, p2);
        assert_eq!(csm.pointer(p1).kind, PointerKind::CSVar { ctx, var: v });

        let obj = csm.get_cs_obj(ctx, ObjId(0));
        assert_eq!(obj, csm.get_cs_obj(ctx, ObjId(0)));
        let f = FieldId(1);
        assert_eq!(csm.get_instance_field(obj, f), csm.get_instance_field(obj, f));
        assert_ne!(csm.get_instance_field(obj, f), csm.get_static_field(f));
        assert_eq!(csm.get_array_index(obj), csm.get_array_index(obj));

        let m = csm.get_cs_method(ctx, MethodId(0));
        assert_eq!(csm.cs_method(m), (ctx, MethodId(0)));
        let s = csm.get_cs_call_site(ctx, StmtId(4));
        assert_eq!(csm.cs_call_site(s), (ctx, StmtId(4)));
    }
}
