// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The class-based intermediate representation consumed by the analyses.
//!
//! The IR is an arena owned by [`Program`]: classes, fields, methods,
//! variables, and statements are identified by copyable indices and hold
//! their cross references as indices as well. Variables carry reverse
//! indices (the invoke/load/store statements they appear in as a base),
//! which the pointer analysis consumes when a receiver's points-to set
//! grows.

pub mod resolver;

use std::collections::HashMap;

use crate::util::new_index;

new_index!(TypeId);
new_index!(ClassId);
new_index!(FieldId);
new_index!(MethodId);
new_index!(VarId);
new_index!(StmtId);

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Reference(ClassId),
    Array(TypeId),
    Null,
}

impl TypeKind {
    /// Whether a variable of this type participates in the integer
    /// constant-propagation domain.
    pub fn is_int_like(self) -> bool {
        matches!(
            self,
            TypeKind::Boolean | TypeKind::Byte | TypeKind::Char | TypeKind::Short | TypeKind::Int
        )
    }
}

#[derive(Debug)]
pub struct ClassData {
    pub name: String,
    pub superclass: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub is_interface: bool,
    pub ty: TypeId,
    /// Declared methods, keyed by subsignature.
    pub methods: HashMap<String, MethodId>,
    pub direct_subclasses: Vec<ClassId>,
    pub direct_subinterfaces: Vec<ClassId>,
    pub direct_implementors: Vec<ClassId>,
}

#[derive(Debug)]
pub struct FieldData {
    pub class: ClassId,
    pub name: String,
    pub ty: TypeId,
    pub is_static: bool,
}

#[derive(Debug)]
pub struct MethodData {
    pub class: ClassId,
    pub name: String,
    pub is_static: bool,
    pub is_abstract: bool,
    pub params: Vec<VarId>,
    pub ret_vars: Vec<VarId>,
    pub this_var: Option<VarId>,
    pub stmts: Vec<StmtId>,
}

#[derive(Debug)]
pub struct VarData {
    pub method: MethodId,
    pub name: String,
    pub ty: Option<TypeId>,
    /// Instance invokes with this variable as the receiver.
    pub invokes: Vec<StmtId>,
    /// Instance field loads with this variable as the base.
    pub load_fields: Vec<StmtId>,
    /// Instance field stores with this variable as the base.
    pub store_fields: Vec<StmtId>,
    /// Array loads with this variable as the array.
    pub load_arrays: Vec<StmtId>,
    /// Array stores with this variable as the array.
    pub store_arrays: Vec<StmtId>,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum InvokeKind {
    Static,
    Virtual,
    Interface,
    Special,
    Dynamic,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    /// `x = new T`
    New { lhs: VarId, ty: TypeId },
    /// `x = c`
    AssignLiteral { lhs: VarId, value: i32 },
    /// `x = y`
    Copy { lhs: VarId, rhs: VarId },
    /// `x = a <op> b`
    Binary {
        lhs: VarId,
        op: BinaryOp,
        op1: VarId,
        op2: VarId,
    },
    /// `x = b.f` (instance) or `x = C.f` (static, base is `None`)
    LoadField {
        lhs: VarId,
        base: Option<VarId>,
        field: FieldId,
    },
    /// `b.f = y` or `C.f = y`
    StoreField {
        base: Option<VarId>,
        field: FieldId,
        rhs: VarId,
    },
    /// `x = a[i]`
    LoadArray { lhs: VarId, array: VarId, index: VarId },
    /// `a[i] = y`
    StoreArray { array: VarId, index: VarId, rhs: VarId },
    /// `r = b.m(args)` / `r = C.m(args)`
    Invoke {
        result: Option<VarId>,
        kind: InvokeKind,
        /// The class named by the method reference at the call site.
        callee_class: ClassId,
        /// The subsignature named by the method reference.
        callee_name: String,
        base: Option<VarId>,
        args: Vec<VarId>,
    },
    Nop,
}

#[derive(Debug)]
pub struct StmtData {
    pub method: MethodId,
    /// Position within the containing method's statement list.
    pub index: usize,
    pub kind: StmtKind,
}

/// The whole-program arena.
#[derive(Debug, Default)]
pub struct Program {
    types: Vec<TypeKind>,
    type_map: HashMap<TypeKind, TypeId>,
    classes: Vec<ClassData>,
    class_map: HashMap<String, ClassId>,
    fields: Vec<FieldData>,
    methods: Vec<MethodData>,
    vars: Vec<VarData>,
    stmts: Vec<StmtData>,
    main_method: Option<MethodId>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    fn intern_type(&mut self, kind: TypeKind) -> TypeId {
        if let Some(id) = self.type_map.get(&kind) {
            return *id;
        }
        let id = TypeId::new(self.types.len());
        self.types.push(kind);
        self.type_map.insert(kind, id);
        id
    }

    pub fn int_type(&mut self) -> TypeId {
        self.intern_type(TypeKind::Int)
    }

    pub fn boolean_type(&mut self) -> TypeId {
        self.intern_type(TypeKind::Boolean)
    }

    pub fn array_type(&mut self, elem: TypeId) -> TypeId {
        self.intern_type(TypeKind::Array(elem))
    }

    fn add_class_data(&mut self, name: &str, superclass: Option<ClassId>, is_interface: bool) -> ClassId {
        assert!(
            !self.class_map.contains_key(name),
            "class {} declared twice",
            name
        );
        let id = ClassId::new(self.classes.len());
        let ty = self.intern_type(TypeKind::Reference(id));
        self.classes.push(ClassData {
            name: name.to_string(),
            superclass,
            interfaces: Vec::new(),
            is_interface,
            ty,
            methods: HashMap::new(),
            direct_subclasses: Vec::new(),
            direct_subinterfaces: Vec::new(),
            direct_implementors: Vec::new(),
        });
        self.class_map.insert(name.to_string(), id);
        if let Some(sup) = superclass {
            self.classes[sup.index()].direct_subclasses.push(id);
        }
        id
    }

    pub fn add_class(&mut self, name: &str, superclass: Option<ClassId>) -> ClassId {
        self.add_class_data(name, superclass, false)
    }

    pub fn add_interface(&mut self, name: &str) -> ClassId {
        self.add_class_data(name, None, true)
    }

    /// Records that `class` implements (or, for an interface, extends)
    /// `iface`.
    pub fn add_implements(&mut self, class: ClassId, iface: ClassId) {
        self.classes[class.index()].interfaces.push(iface);
        if self.classes[class.index()].is_interface {
            self.classes[iface.index()].direct_subinterfaces.push(class);
        } else {
            self.classes[iface.index()].direct_implementors.push(class);
        }
    }

    pub fn add_field(&mut self, class: ClassId, name: &str, ty: TypeId, is_static: bool) -> FieldId {
        let id = FieldId::new(self.fields.len());
        self.fields.push(FieldData {
            class,
            name: name.to_string(),
            ty,
            is_static,
        });
        id
    }

    pub fn add_method(&mut self, class: ClassId, name: &str, is_static: bool) -> MethodId {
        let id = MethodId::new(self.methods.len());
        self.methods.push(MethodData {
            class,
            name: name.to_string(),
            is_static,
            is_abstract: false,
            params: Vec::new(),
            ret_vars: Vec::new(),
            this_var: None,
            stmts: Vec::new(),
        });
        if !is_static {
            let class_ty = self.classes[class.index()].ty;
            let this = self.new_var(id, "%this", Some(class_ty));
            self.methods[id.index()].this_var = Some(this);
        }
        self.classes[class.index()].methods.insert(name.to_string(), id);
        id
    }

    pub fn add_abstract_method(&mut self, class: ClassId, name: &str) -> MethodId {
        let id = self.add_method(class, name, false);
        self.methods[id.index()].is_abstract = true;
        id
    }

    pub fn set_main(&mut self, method: MethodId) {
        self.main_method = Some(method);
    }

    pub fn main_method(&self) -> Option<MethodId> {
        self.main_method
    }

    pub fn new_var(&mut self, method: MethodId, name: &str, ty: Option<TypeId>) -> VarId {
        let id = VarId::new(self.vars.len());
        self.vars.push(VarData {
            method,
            name: name.to_string(),
            ty,
            invokes: Vec::new(),
            load_fields: Vec::new(),
            store_fields: Vec::new(),
            load_arrays: Vec::new(),
            store_arrays: Vec::new(),
        });
        id
    }

    pub fn set_params(&mut self, method: MethodId, params: Vec<VarId>) {
        self.methods[method.index()].params = params;
    }

    pub fn add_return_var(&mut self, method: MethodId, var: VarId) {
        self.methods[method.index()].ret_vars.push(var);
    }

    /// Appends a statement to `method`, maintaining the reverse indices on
    /// the variables it uses.
    pub fn add_stmt(&mut self, method: MethodId, kind: StmtKind) -> StmtId {
        let id = StmtId::new(self.stmts.len());
        let index = self.methods[method.index()].stmts.len();
        match &kind {
            StmtKind::Invoke { base: Some(b), .. } => self.vars[b.index()].invokes.push(id),
            StmtKind::LoadField { base: Some(b), .. } => self.vars[b.index()].load_fields.push(id),
            StmtKind::StoreField { base: Some(b), .. } => self.vars[b.index()].store_fields.push(id),
            StmtKind::LoadArray { array, .. } => self.vars[array.index()].load_arrays.push(id),
            StmtKind::StoreArray { array, .. } => self.vars[array.index()].store_arrays.push(id),
            _ => {}
        }
        self.stmts.push(StmtData { method, index, kind });
        self.methods[method.index()].stmts.push(id);
        id
    }

    #[inline]
    pub fn type_kind(&self, ty: TypeId) -> TypeKind {
        self.types[ty.index()]
    }

    #[inline]
    pub fn class(&self, id: ClassId) -> &ClassData {
        &self.classes[id.index()]
    }

    #[inline]
    pub fn field(&self, id: FieldId) -> &FieldData {
        &self.fields[id.index()]
    }

    #[inline]
    pub fn method(&self, id: MethodId) -> &MethodData {
        &self.methods[id.index()]
    }

    #[inline]
    pub fn var(&self, id: VarId) -> &VarData {
        &self.vars[id.index()]
    }

    #[inline]
    pub fn stmt(&self, id: StmtId) -> &StmtData {
        &self.stmts[id.index()]
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn var_ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.vars.len()).map(VarId::new)
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_map.get(name).copied()
    }

    /// Resolves a type name from a configuration document. Primitive names
    /// resolve to the corresponding primitive type; anything else is looked
    /// up as a class name.
    pub fn type_by_name(&self, name: &str) -> Option<TypeId> {
        let prim = match name {
            "boolean" => Some(TypeKind::Boolean),
            "byte" => Some(TypeKind::Byte),
            "char" => Some(TypeKind::Char),
            "short" => Some(TypeKind::Short),
            "int" => Some(TypeKind::Int),
            "long" => Some(TypeKind::Long),
            _ => None,
        };
        if let Some(kind) = prim {
            return self.type_map.get(&kind).copied();
        }
        self.class_by_name(name).map(|c| self.classes[c.index()].ty)
    }

    /// Whether `var` can hold an integer value.
    pub fn can_hold_int(&self, var: VarId) -> bool {
        match self.vars[var.index()].ty {
            Some(ty) => self.type_kind(ty).is_int_like(),
            None => false,
        }
    }

    /// The variable defined by `stmt`, if any.
    pub fn def_var(&self, stmt: StmtId) -> Option<VarId> {
        match &self.stmts[stmt.index()].kind {
            StmtKind::New { lhs, .. }
            | StmtKind::AssignLiteral { lhs, .. }
            | StmtKind::Copy { lhs, .. }
            | StmtKind::Binary { lhs, .. }
            | StmtKind::LoadField { lhs, .. }
            | StmtKind::LoadArray { lhs, .. } => Some(*lhs),
            StmtKind::Invoke { result, .. } => *result,
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reverse_indices_track_uses() {
        let mut prog = Program::new();
        let int_ty = prog.int_type();
        let c = prog.add_class("C", None);
        let m = prog.add_method(c, "main", true);
        let c_ty = prog.class(c).ty;
        let x = prog.new_var(m, "x", Some(c_ty));
        let i = prog.new_var(m, "i", Some(int_ty));
        let y = prog.new_var(m, "y", Some(int_ty));
        let f = prog.add_field(c, "f", int_ty, false);
        let store = prog.add_stmt(
            m,
            StmtKind::StoreField {
                base: Some(x),
                field: f,
                rhs: y,
            },
        );
        let load = prog.add_stmt(
            m,
            StmtKind::LoadField {
                lhs: y,
                base: Some(x),
                field: f,
            },
        );
        let invoke = prog.add_stmt(
            m,
            StmtKind::Invoke {
                result: None,
                kind: InvokeKind::Virtual,
                callee_class: c,
                callee_name: "m".to_string(),
                base: Some(x),
                args: vec![i],
            },
        );
        assert_eq!(prog.var(x).store_fields, vec![store]);
        assert_eq!(prog.var(x).load_fields, vec![load]);
        assert_eq!(prog.var(x).invokes, vec![invoke]);
        assert!(prog.can_hold_int(i));
        assert!(!prog.can_hold_int(x));
        assert_eq!(prog.def_var(load), Some(y));
        assert_eq!(prog.def_var(store), None);
    }
}
