// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Calling contexts and their canonicalization.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

use crate::ir::{StmtId, TypeId};
use crate::pta::heap::ObjId;
use crate::util::new_index;

new_index!(
    /// The unique identifier for each canonical context.
    CtxId
);

/// A single abstraction element a context is built from. The selectors
/// decide which kind they push.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ContextElem {
    CallSite(StmtId),
    Object(ObjId),
    Type(TypeId),
}

/// An immutable context string. Equality and hashing are structural; the
/// [`ContextCache`] maps every distinct context to one [`CtxId`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Context {
    elems: Vec<ContextElem>,
}

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        self.elems.fmt(f)
    }
}

impl Context {
    pub fn new_empty() -> Rc<Self> {
        Rc::new(Context { elems: Vec::new() })
    }

    pub fn new(elems: Vec<ContextElem>) -> Rc<Self> {
        Rc::new(Context { elems })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn elems(&self) -> &[ContextElem] {
        &self.elems
    }

    /// Composes a new context from an old context and a fresh element,
    /// discarding the oldest elements beyond the depth limit `k`.
    pub fn new_k_limited(old_ctx: &Context, elem: ContextElem, k: usize) -> Rc<Self> {
        let mut elems = Vec::with_capacity(k);
        if k > 0 {
            elems.push(elem);
            let keep = old_ctx.len().min(k - 1);
            elems.extend_from_slice(&old_ctx.elems[..keep]);
        }
        Rc::new(Context { elems })
    }

    /// Truncates `ctx` to its first `k` elements.
    pub fn k_limited(ctx: &Rc<Context>, k: usize) -> Rc<Self> {
        if ctx.len() <= k {
            ctx.clone()
        } else {
            Rc::new(Context {
                elems: ctx.elems[..k].to_vec(),
            })
        }
    }
}

/// Canonicalization table for contexts. The empty context is interned at
/// construction and always has id [`ContextCache::EMPTY`].
pub struct ContextCache {
    context_list: Vec<Rc<Context>>,
    context_map: HashMap<Rc<Context>, CtxId>,
}

impl ContextCache {
    pub const EMPTY: CtxId = CtxId(0);

    pub fn new() -> Self {
        let mut cache = ContextCache {
            context_list: Vec::new(),
            context_map: HashMap::new(),
        };
        let empty_id = cache.get_context_id(&Context::new_empty());
        debug_assert_eq!(empty_id, Self::EMPTY);
        cache
    }

    /// Returns the canonical id for `context`, interning it on first sight.
    pub fn get_context_id(&mut self, context: &Rc<Context>) -> CtxId {
        if let Some(id) = self.context_map.get(context) {
            return *id;
        }
        let id = CtxId::new(self.context_list.len());
        self.context_list.push(context.clone());
        self.context_map.insert(context.clone(), id);
        id
    }

    pub fn get_context(&self, id: CtxId) -> Rc<Context> {
        self.context_list[id.index()].clone()
    }

    pub fn num_contexts(&self) -> usize {
        self.context_list.len()
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn contexts_are_canonical() {
        let mut cache = ContextCache::new();
        let site = ContextElem::CallSite(StmtId(3));
        let c1 = Context::new(vec![site]);
        let c2 = Context::new(vec![site]);
        assert_eq!(cache.get_context_id(&c1), cache.get_context_id(&c2));
        assert_ne!(cache.get_context_id(&c1), ContextCache::EMPTY);
    }

    #[test]
    fn k_limiting_discards_oldest() {
        let s0 = ContextElem::CallSite(StmtId(0));
        let s1 = ContextElem::CallSite(StmtId(1));
        let s2 = ContextElem::CallSite(StmtId(2));
        let base = Context::new(vec![s1, s0]);
        let pushed = Context::new_k_limited(&base, s2, 2);
        assert_eq!(pushed.elems(), &[s2, s1]);
        let zero = Context::new_k_limited(&base, s2, 0);
        assert!(zero.is_empty());
        let truncated = Context::k_limited(&base, 1);
        assert_eq!(truncated.elems(), &[s1]);
    }
}
