// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The constant propagation lattice and intraprocedural transfer.

use std::collections::HashMap;

use crate::ir::{BinaryOp, MethodId, Program, StmtId, StmtKind, VarId};

pub const CONSTPROP_ID: &str = "constprop";

/// A lattice value: `Undef` ⊑ `Const(k)` ⊑ `Nac`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Value {
    Undef,
    Const(i32),
    Nac,
}

impl Value {
    pub fn is_undef(self) -> bool {
        self == Value::Undef
    }

    pub fn is_const(self) -> bool {
        matches!(self, Value::Const(_))
    }

    pub fn is_nac(self) -> bool {
        self == Value::Nac
    }

    pub fn as_const(self) -> Option<i32> {
        match self {
            Value::Const(c) => Some(c),
            _ => None,
        }
    }

    /// The meet operator. Commutative, associative, idempotent.
    pub fn meet(self, other: Value) -> Value {
        match (self, other) {
            (Value::Nac, _) | (_, Value::Nac) => Value::Nac,
            (Value::Undef, v) => v,
            (v, Value::Undef) => v,
            (Value::Const(a), Value::Const(b)) => {
                if a == b {
                    Value::Const(a)
                } else {
                    Value::Nac
                }
            }
        }
    }
}

/// A dataflow fact: a mapping from variables to lattice values. A missing
/// key reads as `Undef`.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct CPFact {
    map: HashMap<VarId, Value>,
}

impl CPFact {
    pub fn new() -> Self {
        CPFact::default()
    }

    pub fn get(&self, var: VarId) -> Value {
        self.map.get(&var).copied().unwrap_or(Value::Undef)
    }

    /// Binds `var` to `value`. Returns true iff the fact changed.
    pub fn update(&mut self, var: VarId, value: Value) -> bool {
        if self.get(var) == value {
            return false;
        }
        if value == Value::Undef {
            self.map.remove(&var);
        } else {
            self.map.insert(var, value);
        }
        true
    }

    pub fn remove(&mut self, var: VarId) {
        self.map.remove(&var);
    }

    /// Copies every binding of `other` into this fact. Returns true iff
    /// this fact changed.
    pub fn copy_from(&mut self, other: &CPFact) -> bool {
        let mut changed = false;
        for (&var, &value) in &other.map {
            changed |= self.update(var, value);
        }
        changed
    }

    pub fn entries(&self) -> impl Iterator<Item = (VarId, Value)> + '_ {
        self.map.iter().map(|(&var, &value)| (var, value))
    }
}

/// The intraprocedural constant propagation transfer functions.
pub struct ConstantPropagation;

impl ConstantPropagation {
    pub fn new() -> Self {
        ConstantPropagation
    }

    /// The boundary fact of a method: every integer-holding parameter is
    /// `Nac`, everything else `Undef`.
    pub fn new_boundary_fact(&self, prog: &Program, method: MethodId) -> CPFact {
        let mut fact = CPFact::new();
        for &param in &prog.method(method).params {
            if prog.can_hold_int(param) {
                fact.update(param, Value::Nac);
            }
        }
        fact
    }

    pub fn new_initial_fact(&self) -> CPFact {
        CPFact::new()
    }

    pub fn meet_into(&self, fact: &CPFact, target: &mut CPFact) {
        for (var, value) in fact.entries() {
            target.update(var, value.meet(target.get(var)));
        }
    }

    /// The embedded per-statement transfer: `OUT = IN`, and a definition
    /// of an integer-holding variable re-binds it to the evaluated RHS.
    pub fn transfer_stmt(&self, prog: &Program, stmt: StmtId, in_fact: &CPFact, out: &mut CPFact) -> bool {
        let mut changed = out.copy_from(in_fact);
        if let Some(lhs) = prog.def_var(stmt) {
            if prog.can_hold_int(lhs) {
                changed |= out.update(lhs, evaluate(prog, stmt, in_fact));
            }
        }
        changed
    }
}

impl Default for ConstantPropagation {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluates the right-hand side of a definition statement over `in_fact`.
/// Monotone in the fact argument.
pub fn evaluate(prog: &Program, stmt: StmtId, in_fact: &CPFact) -> Value {
    match &prog.stmt(stmt).kind {
        StmtKind::AssignLiteral { value, .. } => Value::Const(*value),
        StmtKind::Copy { rhs, .. } => in_fact.get(*rhs),
        StmtKind::Binary { op, op1, op2, .. } => {
            eval_binary(*op, in_fact.get(*op1), in_fact.get(*op2))
        }
        _ => Value::Nac,
    }
}

/// Evaluates one binary expression over lattice values, with wrap-around
/// integer arithmetic. Division and remainder by a constant zero are
/// `Undef`, and that dominates a `Nac` dividend.
pub fn eval_binary(op: BinaryOp, v1: Value, v2: Value) -> Value {
    if let (Value::Const(a), Value::Const(b)) = (v1, v2) {
        return match op {
            BinaryOp::Add => Value::Const(a.wrapping_add(b)),
            BinaryOp::Sub => Value::Const(a.wrapping_sub(b)),
            BinaryOp::Mul => Value::Const(a.wrapping_mul(b)),
            BinaryOp::Div => {
                if b == 0 {
                    Value::Undef
                } else {
                    Value::Const(a.wrapping_div(b))
                }
            }
            BinaryOp::Rem => {
                if b == 0 {
                    Value::Undef
                } else {
                    Value::Const(a.wrapping_rem(b))
                }
            }
            BinaryOp::And => Value::Const(a & b),
            BinaryOp::Or => Value::Const(a | b),
            BinaryOp::Xor => Value::Const(a ^ b),
            BinaryOp::Shl => Value::Const(a.wrapping_shl(b as u32)),
            BinaryOp::Shr => Value::Const(a.wrapping_shr(b as u32)),
            BinaryOp::Ushr => Value::Const(((a as u32).wrapping_shr(b as u32)) as i32),
            BinaryOp::Eq => Value::Const((a == b) as i32),
            BinaryOp::Ne => Value::Const((a != b) as i32),
            BinaryOp::Lt => Value::Const((a < b) as i32),
            BinaryOp::Le => Value::Const((a <= b) as i32),
            BinaryOp::Gt => Value::Const((a > b) as i32),
            BinaryOp::Ge => Value::Const((a >= b) as i32),
        };
    }
    if v1.is_undef() || v2.is_undef() {
        return Value::Undef;
    }
    // NAC / 0 and NAC % 0 are undefined, not NAC.
    if v1.is_nac() && v2 == Value::Const(0) && matches!(op, BinaryOp::Div | BinaryOp::Rem) {
        return Value::Undef;
    }
    Value::Nac
}
