//! AST peephole optimizer.
//!
//! A post-order rewrite framework (`Pass` + `traverse`) with per-node-kind
//! hooks, plus the two passes built on it: `Optimizer` (constant folding,
//! logical short-circuiting, table-index and IIFE propagation, local
//! constant propagation) and `Renamer` (fresh `L_<n>_` names for every
//! declared local). A hook returns a replacement node or `None`; children
//! are always rewritten before their parent is offered to the hook, and no
//! hook ever fails — a node it cannot improve is left alone.

use ahash::AHashMap;

use crate::{
    ast::{ArithOp, CallExpr, CallTarget, Chunk, Expr, Field, FuncBody, FuncName, LogicOp, Stmt, UnaryOp},
    print,
};

/// Per-node-kind rewrite hooks. Every hook has a no-op default, so a pass
/// implements only the kinds it cares about.
#[allow(unused_variables)]
pub trait Pass {
    fn enter_scope(&mut self) {}
    fn exit_scope(&mut self) {}
    /// A binding occurrence: local names, parameters, loop variables.
    fn bind(&mut self, name: &mut String) {}
    /// A root identifier in assignment-target position.
    fn ident_lhs(&mut self, name: &mut String) {}
    /// Called after local bindings are introduced, with the initializers.
    fn local_assign(&mut self, names: &[String], exprs: &[Expr]) {}

    fn ident(&mut self, name: &str) -> Option<Expr> {
        None
    }
    fn attr_get(&mut self, object: &Expr, key: &Expr) -> Option<Expr> {
        None
    }
    fn table(&mut self, fields: &[Field]) -> Option<Expr> {
        None
    }
    fn arith(&mut self, op: ArithOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
        None
    }
    fn concat(&mut self, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
        None
    }
    fn logic(&mut self, op: LogicOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
        None
    }
    fn unary(&mut self, op: UnaryOp, expr: &Expr) -> Option<Expr> {
        None
    }
    fn call(&mut self, call: &CallExpr) -> Option<Expr> {
        None
    }
}

/// Rewrites every statement of `chunk` in place with `pass`.
pub fn traverse(chunk: &mut Chunk, pass: &mut impl Pass) {
    for stmt in chunk {
        statement(stmt, pass);
    }
}

fn statement(stmt: &mut Stmt, pass: &mut impl Pass) {
    match stmt {
        Stmt::Assign { lhs, rhs } | Stmt::CompoundAssign { lhs, rhs, .. } => {
            for target in lhs {
                rewrite_lhs(target, pass);
            }
            for value in rhs {
                rewrite(value, pass);
            }
        }
        Stmt::LocalAssign { names, exprs } => {
            for value in exprs.iter_mut() {
                rewrite(value, pass);
            }
            for name in names.iter_mut() {
                pass.bind(name);
            }
            pass.local_assign(names, exprs);
        }
        Stmt::Call(call) => rewrite_call_parts(call, pass),
        Stmt::Do(body) => {
            pass.enter_scope();
            traverse(body, pass);
            pass.exit_scope();
        }
        Stmt::While { cond, body } => {
            rewrite(cond, pass);
            pass.enter_scope();
            traverse(body, pass);
            pass.exit_scope();
        }
        Stmt::Repeat { body, cond } => {
            // the until-condition sees the body's locals
            pass.enter_scope();
            traverse(body, pass);
            rewrite(cond, pass);
            pass.exit_scope();
        }
        Stmt::If { cond, then, orelse } => {
            rewrite(cond, pass);
            pass.enter_scope();
            traverse(then, pass);
            pass.exit_scope();
            pass.enter_scope();
            traverse(orelse, pass);
            pass.exit_scope();
        }
        Stmt::NumberFor {
            name,
            init,
            limit,
            step,
            body,
        } => {
            rewrite(init, pass);
            rewrite(limit, pass);
            if let Some(step) = step {
                rewrite(step, pass);
            }
            pass.enter_scope();
            pass.bind(name);
            traverse(body, pass);
            pass.exit_scope();
        }
        Stmt::GenericFor { names, exprs, body } => {
            for value in exprs.iter_mut() {
                rewrite(value, pass);
            }
            pass.enter_scope();
            for name in names.iter_mut() {
                pass.bind(name);
            }
            traverse(body, pass);
            pass.exit_scope();
        }
        Stmt::LocalFunction { name, func } => {
            // the name is visible inside the body, enabling recursion
            pass.bind(name);
            rewrite_func(func, pass);
        }
        Stmt::Function { name, func } => {
            match name {
                FuncName::Plain(expr) => rewrite_lhs(expr, pass),
                FuncName::Method { receiver, .. } => rewrite_lhs(receiver, pass),
            }
            rewrite_func(func, pass);
        }
        Stmt::Return(exprs) => {
            for value in exprs {
                rewrite(value, pass);
            }
        }
        Stmt::Break | Stmt::Continue | Stmt::Label(_) | Stmt::Goto(_) => {}
    }
}

/// Rewrites an assignment target. The root identifier is a definition, not a
/// use, so it goes through `ident_lhs` instead of the expression hook;
/// everything inside an index chain is an ordinary use.
fn rewrite_lhs(expr: &mut Expr, pass: &mut impl Pass) {
    match expr {
        Expr::Ident(name) => pass.ident_lhs(name),
        Expr::AttrGet { object, key } => {
            rewrite(object, pass);
            rewrite(key, pass);
        }
        _ => rewrite(expr, pass),
    }
}

fn rewrite_func(func: &mut FuncBody, pass: &mut impl Pass) {
    pass.enter_scope();
    for param in &mut func.params {
        pass.bind(param);
    }
    traverse(&mut func.chunk, pass);
    pass.exit_scope();
}

fn rewrite_call_parts(call: &mut CallExpr, pass: &mut impl Pass) {
    match &mut call.target {
        CallTarget::Function(callee) => rewrite(callee, pass),
        CallTarget::Method { receiver, .. } => rewrite(receiver, pass),
    }
    for arg in &mut call.args {
        rewrite(arg, pass);
    }
}

/// Post-order expression rewrite: children first, then the node's hook.
fn rewrite(expr: &mut Expr, pass: &mut impl Pass) {
    match expr {
        Expr::Nil | Expr::True | Expr::False | Expr::VarArg | Expr::Number(_) | Expr::Str(_) => {}
        Expr::Ident(name) => {
            if let Some(replacement) = pass.ident(name) {
                *expr = replacement;
            }
        }
        Expr::AttrGet { object, key } => {
            rewrite(object, pass);
            rewrite(key, pass);
            if let Some(replacement) = pass.attr_get(object, key) {
                *expr = replacement;
            }
        }
        Expr::Table(fields) => {
            for field in fields.iter_mut() {
                if let Some(key) = &mut field.key {
                    rewrite(key, pass);
                }
                rewrite(&mut field.value, pass);
            }
            if let Some(replacement) = pass.table(fields) {
                *expr = replacement;
            }
        }
        Expr::Arith { op, lhs, rhs } => {
            rewrite(lhs, pass);
            rewrite(rhs, pass);
            if let Some(replacement) = pass.arith(*op, lhs, rhs) {
                *expr = replacement;
            }
        }
        Expr::Concat { lhs, rhs } => {
            rewrite(lhs, pass);
            rewrite(rhs, pass);
            if let Some(replacement) = pass.concat(lhs, rhs) {
                *expr = replacement;
            }
        }
        Expr::Relation { lhs, rhs, .. } => {
            rewrite(lhs, pass);
            rewrite(rhs, pass);
        }
        Expr::Logic { op, lhs, rhs } => {
            rewrite(lhs, pass);
            rewrite(rhs, pass);
            if let Some(replacement) = pass.logic(*op, lhs, rhs) {
                *expr = replacement;
            }
        }
        Expr::Unary { op, expr: operand } => {
            rewrite(operand, pass);
            if let Some(replacement) = pass.unary(*op, operand) {
                *expr = replacement;
            }
        }
        Expr::Function(func) => rewrite_func(func, pass),
        Expr::Call(call) => {
            rewrite_call_parts(call, pass);
            if let Some(replacement) = pass.call(call) {
                *expr = replacement;
            }
        }
    }
}

/// Runs the folding and propagation pass over a chunk.
pub fn optimize(chunk: &mut Chunk) {
    let mut pass = Optimizer::new();
    traverse(chunk, &mut pass);
}

/// Renames every declared local to a fresh `L_<n>_` name.
pub fn rename_locals(chunk: &mut Chunk) {
    let mut pass = Renamer {
        scopes: vec![AHashMap::new()],
        counter: 0,
    };
    traverse(chunk, &mut pass);
}

/// Constant folding and propagation.
///
/// Tracks per-local constness in a scope stack: a local bound to a literal
/// is substituted at its uses until the first subsequent assignment clears
/// it. Folds are value-preserving only; anything that could change observable
/// behavior (non-finite results, impure operands) is declined.
struct Optimizer {
    scopes: Vec<AHashMap<String, Option<Expr>>>,
}

impl Optimizer {
    fn new() -> Self {
        Self {
            scopes: vec![AHashMap::new()],
        }
    }

    fn lookup(&self, name: &str) -> Option<&Option<Expr>> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn set(&mut self, name: &str, value: Option<Expr>) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_owned(), value);
    }

    /// Clears the constant flag on the nearest binding of `name`, if any.
    fn clear(&mut self, name: &str) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(entry) = scope.get_mut(name) {
                *entry = None;
                return;
            }
        }
    }
}

/// Statically known truthiness: `nil` and `false` are falsy, other literal
/// values truthy, and `getfenv` is a known truthy global.
fn known_truth(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Nil | Expr::False => Some(false),
        Expr::True | Expr::Number(_) | Expr::Str(_) => Some(true),
        Expr::Ident(name) if name == "getfenv" => Some(true),
        _ => None,
    }
}

/// Evaluating this expression has no observable side effect.
fn is_pure(expr: &Expr) -> bool {
    match expr {
        Expr::Nil | Expr::True | Expr::False | Expr::VarArg | Expr::Number(_) | Expr::Str(_) | Expr::Ident(_) => true,
        Expr::Function(_) => true,
        Expr::Unary { expr, .. } => is_pure(expr),
        Expr::Arith { lhs, rhs, .. }
        | Expr::Concat { lhs, rhs }
        | Expr::Relation { lhs, rhs, .. }
        | Expr::Logic { lhs, rhs, .. } => is_pure(lhs) && is_pure(rhs),
        Expr::Table(fields) => fields
            .iter()
            .all(|f| f.key.as_ref().is_none_or(is_pure) && is_pure(&f.value)),
        // indexing can hit metamethods and calls can do anything
        Expr::AttrGet { .. } | Expr::Call(_) => false,
    }
}

/// The string form of a constant usable in concatenation: strings verbatim,
/// numbers via their shortest round-trip form.
fn concat_operand(expr: &Expr) -> Option<Vec<u8>> {
    match expr {
        Expr::Str(bytes) => Some(bytes.clone()),
        Expr::Number(value) => Some(print::number(*value).into_bytes()),
        _ => None,
    }
}

/// If `expr` is a call of a nullary variadic function literal whose body is a
/// single `return`, yields the returned expressions — the table-append
/// pattern whose cardinality is the number of returned values.
fn append_call_returns(expr: &Expr) -> Option<&[Expr]> {
    let Expr::Call(call) = expr else { return None };
    let CallTarget::Function(callee) = &call.target else { return None };
    let Expr::Function(body) = callee.as_ref() else { return None };
    if !call.args.is_empty() || !body.params.is_empty() || !body.has_vararg {
        return None;
    }
    match body.chunk.as_slice() {
        [Stmt::Return(exprs)] => Some(exprs),
        _ => None,
    }
}

/// The statically known length of a table constructor: positional fields
/// plus the contiguous integer-key prefix, e.g. `{1, 2, [3] = x}` has
/// length 3. Returns `None` when any field could have a side effect.
fn table_length(fields: &[Field]) -> Option<f64> {
    let mut count = 0u32;
    for field in fields {
        match &field.key {
            None => {
                if let Some(returns) = append_call_returns(&field.value) {
                    if !returns.iter().all(is_pure) {
                        return None;
                    }
                    count += u32::try_from(returns.len()).ok()?;
                } else {
                    if !is_pure(&field.value) {
                        return None;
                    }
                    count += 1;
                }
            }
            Some(key) => {
                if !is_pure(key) || !is_pure(&field.value) {
                    return None;
                }
                if let Expr::Number(value) = key {
                    if *value == f64::from(count + 1) {
                        count += 1;
                    }
                }
            }
        }
    }
    Some(f64::from(count))
}

impl Pass for Optimizer {
    fn enter_scope(&mut self) {
        self.scopes.push(AHashMap::new());
    }

    fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: &mut String) {
        self.set(name, None);
    }

    fn ident_lhs(&mut self, name: &mut String) {
        self.clear(name);
    }

    fn local_assign(&mut self, names: &[String], exprs: &[Expr]) {
        for (i, name) in names.iter().enumerate() {
            let value = exprs.get(i).filter(|e| e.is_literal()).cloned();
            self.set(name, value);
        }
    }

    fn ident(&mut self, name: &str) -> Option<Expr> {
        match self.lookup(name) {
            Some(Some(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn arith(&mut self, op: ArithOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
        let (Expr::Number(a), Expr::Number(b)) = (lhs, rhs) else {
            return None;
        };
        let result = match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => a - (a / b).floor() * b,
            ArithOp::Pow => a.powf(*b),
        };
        result.is_finite().then_some(Expr::Number(result))
    }

    fn concat(&mut self, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
        let mut bytes = concat_operand(lhs)?;
        bytes.extend(concat_operand(rhs)?);
        Some(Expr::Str(bytes))
    }

    fn logic(&mut self, op: LogicOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
        let left = known_truth(lhs)?;
        let take_left = match op {
            LogicOp::And => !left,
            LogicOp::Or => left,
        };
        if take_left {
            return Some(lhs.clone());
        }
        known_truth(rhs).map(|_| rhs.clone())
    }

    fn unary(&mut self, op: UnaryOp, expr: &Expr) -> Option<Expr> {
        match op {
            UnaryOp::Neg => {
                let Expr::Number(value) = expr else { return None };
                let result = -value;
                result.is_finite().then_some(Expr::Number(result))
            }
            UnaryOp::Not => {
                if !is_pure(expr) {
                    return None;
                }
                known_truth(expr).map(|truth| if truth { Expr::False } else { Expr::True })
            }
            UnaryOp::Len => match expr {
                Expr::Str(bytes) => Some(Expr::Number(bytes.len() as f64)),
                Expr::Table(fields) => table_length(fields).map(Expr::Number),
                _ => None,
            },
            UnaryOp::BitNot => None,
        }
    }

    fn attr_get(&mut self, object: &Expr, key: &Expr) -> Option<Expr> {
        let Expr::Table(fields) = object else { return None };
        if !key.is_literal() || !is_pure(object) {
            return None;
        }
        let mut position = 0f64;
        let mut found = None;
        for field in fields {
            match &field.key {
                None => {
                    position += 1.0;
                    if matches!(key, Expr::Number(k) if *k == position) {
                        found = Some(&field.value);
                    }
                }
                Some(field_key) => {
                    if !field_key.is_literal() {
                        return None;
                    }
                    if field_key == key {
                        found = Some(&field.value);
                    }
                }
            }
        }
        Some(found.cloned().unwrap_or(Expr::Nil))
    }

    fn call(&mut self, call: &CallExpr) -> Option<Expr> {
        let CallTarget::Function(callee) = &call.target else {
            return None;
        };
        let Expr::Function(body) = callee.as_ref() else { return None };
        if !call.args.is_empty() || !body.params.is_empty() {
            return None;
        }
        match body.chunk.as_slice() {
            [Stmt::Return(exprs)] if exprs.len() == 1 && exprs[0].is_literal() => Some(exprs[0].clone()),
            _ => None,
        }
    }
}

/// Fresh-name generation for declared locals.
///
/// Every binding gets `L_<n>_` with a monotonically increasing `n`; uses
/// resolve through the scope stack, so globals keep their names. Scope entry
/// snapshots the active map (a fresh frame), scope exit restores it.
struct Renamer {
    scopes: Vec<AHashMap<String, String>>,
    counter: u32,
}

impl Renamer {
    fn lookup(&self, name: &str) -> Option<&String> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}

impl Pass for Renamer {
    fn enter_scope(&mut self) {
        self.scopes.push(AHashMap::new());
    }

    fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: &mut String) {
        let fresh = format!("L_{}_", self.counter);
        self.counter += 1;
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(std::mem::replace(name, fresh.clone()), fresh);
    }

    fn ident_lhs(&mut self, name: &mut String) {
        if let Some(fresh) = self.lookup(name) {
            *name = fresh.clone();
        }
    }

    fn ident(&mut self, name: &str) -> Option<Expr> {
        self.lookup(name).map(|fresh| Expr::Ident(fresh.clone()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{parse::parse, print::print_chunk};

    fn optimized(src: &str) -> String {
        let mut chunk = parse(src).expect("parse");
        optimize(&mut chunk);
        print_chunk(&chunk)
    }

    fn renamed(src: &str) -> String {
        let mut chunk = parse(src).expect("parse");
        rename_locals(&mut chunk);
        print_chunk(&chunk)
    }

    #[test]
    fn folds_arithmetic_concat_and_logic() {
        let input = "local _ = 1+2\nlocal _ = 1-2\nlocal _ = 1*2\nlocal _ = 1/2\nlocal _ = 1%2\nlocal _ = 1^2\nlocal _ = \"a\"..\"z\"\nlocal _ = true and false\nlocal _ = true or false\n";
        let expected = "local _ = 3;\nlocal _ = -1;\nlocal _ = 2;\nlocal _ = 0.5;\nlocal _ = 1;\nlocal _ = 1;\nlocal _ = \"az\";\nlocal _ = false;\nlocal _ = true;\n";
        assert_eq!(optimized(input), expected);
    }

    #[test]
    fn declines_non_finite_results() {
        assert_eq!(optimized("x = 1/0"), "x = 1 / 0;\n");
        assert_eq!(optimized("x = 0/0"), "x = 0 / 0;\n");
        assert_eq!(optimized("x = 1e308 * 10"), "x = 1e308 * 10;\n");
    }

    #[test]
    fn logic_folds_are_value_preserving() {
        assert_eq!(optimized("x = true and nil"), "x = nil;\n");
        assert_eq!(optimized("x = false or \"s\""), "x = \"s\";\n");
        assert_eq!(optimized("x = 1 and 2"), "x = 2;\n");
        assert_eq!(optimized("x = getfenv and f()"), "x = getfenv and f();\n");
        assert_eq!(optimized("x = nil and f()"), "x = nil;\n");
        assert_eq!(optimized("x = y and 1"), "x = y and 1;\n");
    }

    #[test]
    fn concat_stringifies_numbers() {
        assert_eq!(optimized("x = 1 .. \"a\""), "x = \"1a\";\n");
        assert_eq!(optimized("x = 0.5 .. \"\""), "x = \"0.5\";\n");
    }

    #[test]
    fn length_folds() {
        assert_eq!(optimized("x = #\"abc\""), "x = 3;\n");
        assert_eq!(optimized("x = #{1, 2, [3] = y}"), "x = 3;\n");
        assert_eq!(optimized("x = #{1, [5] = y}"), "x = 1;\n");
        // field values with possible side effects are left alone
        assert_eq!(optimized("x = #{f()}"), "x = #{\n\tf()\n};\n");
    }

    #[test]
    fn length_counts_variadic_append() {
        assert_eq!(
            optimized("x = #{(function(...) return 1, 2, 3 end)()}"),
            "x = 3;\n"
        );
    }

    #[test]
    fn table_index_folds() {
        assert_eq!(optimized("x = ({10, 20})[2]"), "x = 20;\n");
        assert_eq!(optimized("x = ({a = 5}).a"), "x = 5;\n");
        assert_eq!(optimized("x = ({a = 5}).b"), "x = nil;\n");
        assert_eq!(optimized("x = ({f()})[1]"), "x = ({\n\tf()\n})[1];\n");
    }

    #[test]
    fn iife_propagates_constants() {
        assert_eq!(optimized("x = (function() return 5 end)()"), "x = 5;\n");
        assert_eq!(
            optimized("x = (function() f() return 5 end)()"),
            "x = (function()\n\tf();\n\treturn 5;\nend)();\n"
        );
    }

    #[test]
    fn locals_propagate_until_reassigned() {
        assert_eq!(optimized("local a = 2 local b = a + 1"), "local a = 2;\nlocal b = 3;\n");
        assert_eq!(
            optimized("local a = 2 a = f() local b = a"),
            "local a = 2;\na = f();\nlocal b = a;\n"
        );
    }

    #[test]
    fn propagation_respects_shadowing() {
        let src = "local a = 1 do local a = f() x = a end y = a";
        assert_eq!(
            optimized(src),
            "local a = 1;\ndo\n\tlocal a = f();\n\tx = a;\nend;\ny = 1;\n"
        );
    }

    #[test]
    fn unary_folds() {
        assert_eq!(optimized("x = -(3)"), "x = -3;\n");
        assert_eq!(optimized("x = not true"), "x = false;\n");
        assert_eq!(optimized("x = not nil"), "x = true;\n");
        assert_eq!(optimized("x = not f()"), "x = not f();\n");
    }

    #[test]
    fn renames_locals_and_params() {
        assert_eq!(
            renamed("local a = 1 local function f(b) return a + b end x = a"),
            "local L_0_ = 1;\nlocal function L_1_(L_2_)\n\treturn L_0_ + L_2_;\nend;\nx = L_0_;\n"
        );
    }

    #[test]
    fn renaming_leaves_globals_alone() {
        assert_eq!(renamed("print(x)"), "print(x);\n");
        assert_eq!(
            renamed("local print = 1 print = 2"),
            "local L_0_ = 1;\nL_0_ = 2;\n"
        );
    }

    #[test]
    fn renaming_scopes_restore_on_exit() {
        assert_eq!(
            renamed("local a = 1 do local a = 2 x = a end x = a"),
            "local L_0_ = 1;\ndo\n\tlocal L_1_ = 2;\n\tx = L_1_;\nend;\nx = L_0_;\n"
        );
    }
}
