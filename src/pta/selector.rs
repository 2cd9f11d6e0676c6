// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Context selectors.
//!
//! A selector decides which calling-context a callee is analyzed under and
//! which heap-context an allocated object carries. The solver treats the
//! returned ids as opaque; each selector owns its own [`ContextCache`].

use crate::ir::{MethodId, StmtId};
use crate::pta::context::{Context, ContextCache, ContextElem, CtxId};
use crate::pta::heap::ObjId;

pub trait ContextSelector {
    fn empty_context(&mut self) -> CtxId {
        ContextCache::EMPTY
    }

    /// Context for the callee of a static call.
    fn select_static_context(&mut self, caller_ctx: CtxId, callsite: StmtId, callee: MethodId) -> CtxId;

    /// Context for the callee of an instance call dispatched on `recv`.
    fn select_instance_context(
        &mut self,
        caller_ctx: CtxId,
        callsite: StmtId,
        recv: (CtxId, ObjId),
        callee: MethodId,
    ) -> CtxId;

    /// Heap context for an object allocated in `alloc_method` under
    /// `alloc_ctx`.
    fn select_heap_context(&mut self, alloc_ctx: CtxId, alloc_method: MethodId, obj: ObjId) -> CtxId;
}

/// The context-insensitive selector: everything runs under the empty
/// context.
#[derive(Default)]
pub struct ContextInsensitive;

impl ContextInsensitive {
    pub fn new() -> Self {
        ContextInsensitive
    }
}

impl ContextSelector for ContextInsensitive {
    fn select_static_context(&mut self, _caller_ctx: CtxId, _callsite: StmtId, _callee: MethodId) -> CtxId {
        ContextCache::EMPTY
    }

    fn select_instance_context(
        &mut self,
        _caller_ctx: CtxId,
        _callsite: StmtId,
        _recv: (CtxId, ObjId),
        _callee: MethodId,
    ) -> CtxId {
        ContextCache::EMPTY
    }

    fn select_heap_context(&mut self, _alloc_ctx: CtxId, _alloc_method: MethodId, _obj: ObjId) -> CtxId {
        ContextCache::EMPTY
    }
}

/// k-limited call-site sensitivity: the callee context is the call string
/// truncated to `k` sites, heap contexts keep `k - 1` sites.
pub struct KCallSiteSensitive {
    k: usize,
    cache: ContextCache,
}

impl KCallSiteSensitive {
    pub fn new(k: usize) -> Self {
        KCallSiteSensitive {
            k,
            cache: ContextCache::new(),
        }
    }

    fn push_site(&mut self, caller_ctx: CtxId, callsite: StmtId) -> CtxId {
        let old = self.cache.get_context(caller_ctx);
        let ctx = Context::new_k_limited(&old, ContextElem::CallSite(callsite), self.k);
        self.cache.get_context_id(&ctx)
    }
}

impl ContextSelector for KCallSiteSensitive {
    fn select_static_context(&mut self, caller_ctx: CtxId, callsite: StmtId, _callee: MethodId) -> CtxId {
        self.push_site(caller_ctx, callsite)
    }

    fn select_instance_context(
        &mut self,
        caller_ctx: CtxId,
        callsite: StmtId,
        _recv: (CtxId, ObjId),
        _callee: MethodId,
    ) -> CtxId {
        self.push_site(caller_ctx, callsite)
    }

    fn select_heap_context(&mut self, alloc_ctx: CtxId, _alloc_method: MethodId, _obj: ObjId) -> CtxId {
        let ctx = self.cache.get_context(alloc_ctx);
        let limited = Context::k_limited(&ctx, self.k.saturating_sub(1));
        self.cache.get_context_id(&limited)
    }
}

/// k-limited object sensitivity: the callee context is the receiver's
/// allocation string; static calls inherit the caller context.
pub struct KObjectSensitive {
    k: usize,
    cache: ContextCache,
}

impl KObjectSensitive {
    pub fn new(k: usize) -> Self {
        KObjectSensitive {
            k,
            cache: ContextCache::new(),
        }
    }
}

impl ContextSelector for KObjectSensitive {
    fn select_static_context(&mut self, caller_ctx: CtxId, _callsite: StmtId, _callee: MethodId) -> CtxId {
        caller_ctx
    }

    fn select_instance_context(
        &mut self,
        _caller_ctx: CtxId,
        _callsite: StmtId,
        recv: (CtxId, ObjId),
        _callee: MethodId,
    ) -> CtxId {
        let (heap_ctx, obj) = recv;
        let old = self.cache.get_context(heap_ctx);
        let ctx = Context::new_k_limited(&old, ContextElem::Object(obj), self.k);
        self.cache.get_context_id(&ctx)
    }

    fn select_heap_context(&mut self, alloc_ctx: CtxId, _alloc_method: MethodId, _obj: ObjId) -> CtxId {
        let ctx = self.cache.get_context(alloc_ctx);
        let limited = Context::k_limited(&ctx, self.k.saturating_sub(1));
        self.cache.get_context_id(&limited)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insensitive_selects_empty_everywhere() {
        let mut sel = ContextInsensitive::new();
        let ctx = sel.select_static_context(ContextCache::EMPTY, StmtId(0), MethodId(0));
        assert_eq!(ctx, ContextCache::EMPTY);
        assert_eq!(sel.empty_context(), ContextCache::EMPTY);
    }

    #[test]
    fn one_call_site_contexts_distinguish_sites() {
        let mut sel = KCallSiteSensitive::new(1);
        let empty = sel.empty_context();
        let c1 = sel.select_static_context(empty, StmtId(1), MethodId(0));
        let c2 = sel.select_static_context(empty, StmtId(2), MethodId(0));
        let c1_again = sel.select_static_context(empty, StmtId(1), MethodId(0));
        assert_ne!(c1, c2);
        assert_eq!(c1, c1_again);
        // With k = 1, a nested call replaces the context entirely.
        let nested = sel.select_static_context(c1, StmtId(2), MethodId(0));
        assert_eq!(nested, c2);
        // Heap contexts under 1-call-site sensitivity are empty.
        assert_eq!(sel.select_heap_context(c1, MethodId(0), ObjId(0)), empty);
    }

    #[test]
    fn object_sensitive_contexts_follow_receivers() {
        let mut sel = KObjectSensitive::new(1);
        let empty = sel.empty_context();
        let c1 = sel.select_instance_context(empty, StmtId(0), (empty, ObjId(1)), MethodId(0));
        let c2 = sel.select_instance_context(empty, StmtId(9), (empty, ObjId(1)), MethodId(0));
        assert_eq!(c1, c2);
        assert_eq!(sel.select_static_context(c1, StmtId(3), MethodId(0)), c1);
    }
}
