//! SSA values and instructions.
//!
//! Expressions lower to pure `Value` trees; only control flow, assignment
//! and calls become instructions. Values reference locals, globals and
//! nested functions by arena id.

use ahash::AHashMap;

use super::func::{FuncId, GlobalId, LocalId};
use crate::ast::{ArithOp, CompoundOp, LogicOp, RelOp, UnaryOp};

/// One entry of a table-constructor value.
#[derive(Debug, Clone)]
pub struct FieldValue {
    pub key: Option<Value>,
    pub value: Value,
}

/// Callee shape of a call value, mirroring the AST invariant: a method call
/// has a receiver and name, a plain call a callee value, never both.
#[derive(Debug, Clone)]
pub enum CallTargetValue {
    Function(Value),
    Method { receiver: Value, name: String },
}

/// A call, usable as a value (expression position) or an instruction
/// (statement position).
#[derive(Debug, Clone)]
pub struct CallValue {
    pub target: CallTargetValue,
    pub args: Vec<Value>,
}

/// A pure value.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    True,
    False,
    VarArg,
    Number(f64),
    Str(Vec<u8>),
    Local(LocalId),
    Global(GlobalId),
    AttrGet { object: Box<Value>, key: Box<Value> },
    Table(Vec<FieldValue>),
    Arith { op: ArithOp, lhs: Box<Value>, rhs: Box<Value> },
    Concat { lhs: Box<Value>, rhs: Box<Value> },
    Relation { op: RelOp, lhs: Box<Value>, rhs: Box<Value> },
    Logic { op: LogicOp, lhs: Box<Value>, rhs: Box<Value> },
    Unary { op: UnaryOp, value: Box<Value> },
    Call(Box<CallValue>),
    Function(FuncId),
}

impl Value {
    /// Visits this value and every nested value, preorder. Does not descend
    /// into nested function bodies (they have their own instruction lists).
    pub fn walk(&self, f: &mut impl FnMut(&Self)) {
        f(self);
        match self {
            Self::AttrGet { object, key } => {
                object.walk(f);
                key.walk(f);
            }
            Self::Table(fields) => {
                for field in fields {
                    if let Some(key) = &field.key {
                        key.walk(f);
                    }
                    field.value.walk(f);
                }
            }
            Self::Arith { lhs, rhs, .. }
            | Self::Concat { lhs, rhs }
            | Self::Relation { lhs, rhs, .. }
            | Self::Logic { lhs, rhs, .. } => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Self::Unary { value, .. } => value.walk(f),
            Self::Call(call) => {
                match &call.target {
                    CallTargetValue::Function(callee) => callee.walk(f),
                    CallTargetValue::Method { receiver, .. } => receiver.walk(f),
                }
                for arg in &call.args {
                    arg.walk(f);
                }
            }
            _ => {}
        }
    }

    /// Replaces every `Local` present in `renaming` with its current
    /// version, recursively.
    pub fn substitute(&mut self, renaming: &AHashMap<LocalId, Self>) {
        match self {
            Self::Local(id) => {
                if let Some(current) = renaming.get(id) {
                    *self = current.clone();
                }
            }
            Self::AttrGet { object, key } => {
                object.substitute(renaming);
                key.substitute(renaming);
            }
            Self::Table(fields) => {
                for field in fields {
                    if let Some(key) = &mut field.key {
                        key.substitute(renaming);
                    }
                    field.value.substitute(renaming);
                }
            }
            Self::Arith { lhs, rhs, .. }
            | Self::Concat { lhs, rhs }
            | Self::Relation { lhs, rhs, .. }
            | Self::Logic { lhs, rhs, .. } => {
                lhs.substitute(renaming);
                rhs.substitute(renaming);
            }
            Self::Unary { value, .. } => value.substitute(renaming),
            Self::Call(call) => {
                match &mut call.target {
                    CallTargetValue::Function(callee) => callee.substitute(renaming),
                    CallTargetValue::Method { receiver, .. } => receiver.substitute(renaming),
                }
                for arg in &mut call.args {
                    arg.substitute(renaming);
                }
            }
            _ => {}
        }
    }
}

/// A φ-node: selects among incoming definitions of `local`, one edge per
/// predecessor, positionally aligned with the block's `preds`.
#[derive(Debug, Clone)]
pub struct Phi {
    /// The source local being merged.
    pub local: LocalId,
    /// The SSA version this φ defines (equals `local` until renaming).
    pub target: LocalId,
    pub edges: Vec<Value>,
    /// The source name, kept for diagnostics.
    pub name: String,
}

/// An instruction. Every block's last instruction is its only terminator;
/// φ-nodes are always a block's leading prefix.
#[derive(Debug, Clone)]
pub enum Instruction {
    Assign { lhs: Vec<Value>, rhs: Vec<Value> },
    CompoundAssign { op: CompoundOp, lhs: Vec<Value>, rhs: Vec<Value> },
    Call(CallValue),
    Return { values: Vec<Value> },
    If { cond: Value },
    Jump,
    NumberFor {
        local: LocalId,
        init: Value,
        limit: Value,
        step: Option<Value>,
    },
    GenericFor { locals: Vec<LocalId>, values: Vec<Value> },
    Phi(Phi),
}

impl Instruction {
    pub fn is_phi(&self) -> bool {
        matches!(self, Self::Phi(_))
    }

    /// Visits every top-level operand value, φ-edges included. Assignment
    /// targets are visited too; callers that care about the def/use split
    /// match on the instruction shape instead.
    pub fn for_each_value(&self, f: &mut impl FnMut(&Value)) {
        match self {
            Self::Assign { lhs, rhs } | Self::CompoundAssign { lhs, rhs, .. } => {
                for value in lhs.iter().chain(rhs) {
                    f(value);
                }
            }
            Self::Call(call) => {
                match &call.target {
                    CallTargetValue::Function(callee) => f(callee),
                    CallTargetValue::Method { receiver, .. } => f(receiver),
                }
                for arg in &call.args {
                    f(arg);
                }
            }
            Self::Return { values } => {
                for value in values {
                    f(value);
                }
            }
            Self::If { cond } => f(cond),
            Self::Jump => {}
            Self::NumberFor { init, limit, step, .. } => {
                f(init);
                f(limit);
                if let Some(step) = step {
                    f(step);
                }
            }
            Self::GenericFor { values, .. } => {
                for value in values {
                    f(value);
                }
            }
            Self::Phi(phi) => {
                for edge in &phi.edges {
                    f(edge);
                }
            }
        }
    }
}
