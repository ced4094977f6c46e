//! Structural pattern matching over chunks.
//!
//! A pattern is itself parsed source. Two sentinel identifiers act as
//! wildcards: `_IdentExpr_` matches any identifier and `_NumberExpr_` any
//! number literal; each match is captured in order. Literals match by kind
//! (any string matches any string), operators by kind and operator, and
//! function literals by parameter shape plus body. The beautifier never
//! emits the sentinels; they exist for callers hunting for known code
//! shapes.

use crate::ast::{CallExpr, CallTarget, Chunk, Expr, FuncBody, Stmt};

/// Identifier wildcard recognized inside patterns.
pub const IDENT_WILDCARD: &str = "_IdentExpr_";
/// Number wildcard recognized inside patterns.
pub const NUMBER_WILDCARD: &str = "_NumberExpr_";

/// Searches `target` (and every function body inside it) for a consecutive
/// statement run matching `pattern`. On success returns the expressions
/// captured by wildcards, in pattern order.
pub fn find(target: &Chunk, pattern: &Chunk) -> Option<Vec<Expr>> {
    if pattern.is_empty() {
        return Some(Vec::new());
    }
    let mut chunks = vec![target];
    while let Some(chunk) = chunks.pop() {
        if chunk.len() >= pattern.len() {
            for start in 0..=chunk.len() - pattern.len() {
                let mut matcher = Matcher { captures: Vec::new() };
                if matcher.stmts(&chunk[start..start + pattern.len()], pattern) {
                    return Some(matcher.captures);
                }
            }
        }
        for stmt in chunk {
            collect_nested(stmt, &mut chunks);
        }
    }
    None
}

/// Queues every chunk nested under `stmt` (function bodies and blocks).
fn collect_nested<'a>(stmt: &'a Stmt, out: &mut Vec<&'a Chunk>) {
    match stmt {
        Stmt::Do(body)
        | Stmt::While { body, .. }
        | Stmt::Repeat { body, .. }
        | Stmt::NumberFor { body, .. }
        | Stmt::GenericFor { body, .. } => out.push(body),
        Stmt::If { then, orelse, .. } => {
            out.push(then);
            out.push(orelse);
        }
        Stmt::LocalFunction { func, .. } | Stmt::Function { func, .. } => out.push(&func.chunk),
        Stmt::Assign { rhs, .. } => {
            for expr in rhs {
                collect_nested_expr(expr, out);
            }
        }
        Stmt::LocalAssign { exprs, .. } | Stmt::Return(exprs) => {
            for expr in exprs {
                collect_nested_expr(expr, out);
            }
        }
        Stmt::Call(call) => {
            for arg in &call.args {
                collect_nested_expr(arg, out);
            }
        }
        _ => {}
    }
}

fn collect_nested_expr<'a>(expr: &'a Expr, out: &mut Vec<&'a Chunk>) {
    match expr {
        Expr::Function(func) => out.push(&func.chunk),
        Expr::Call(call) => {
            if let CallTarget::Function(callee) = &call.target {
                collect_nested_expr(callee, out);
            }
            for arg in &call.args {
                collect_nested_expr(arg, out);
            }
        }
        Expr::Table(fields) => {
            for field in fields {
                collect_nested_expr(&field.value, out);
            }
        }
        _ => {}
    }
}

struct Matcher {
    captures: Vec<Expr>,
}

impl Matcher {
    fn stmts(&mut self, target: &[Stmt], pattern: &[Stmt]) -> bool {
        target.len() == pattern.len() && target.iter().zip(pattern).all(|(t, p)| self.stmt(t, p))
    }

    fn stmt(&mut self, target: &Stmt, pattern: &Stmt) -> bool {
        match (target, pattern) {
            (Stmt::Assign { lhs: tl, rhs: tr }, Stmt::Assign { lhs: pl, rhs: pr }) => {
                self.exprs(tl, pl) && self.exprs(tr, pr)
            }
            (
                Stmt::CompoundAssign {
                    op: to,
                    lhs: tl,
                    rhs: tr,
                },
                Stmt::CompoundAssign {
                    op: po,
                    lhs: pl,
                    rhs: pr,
                },
            ) => to == po && self.exprs(tl, pl) && self.exprs(tr, pr),
            (Stmt::LocalAssign { names: tn, exprs: te }, Stmt::LocalAssign { names: pn, exprs: pe }) => {
                tn.len() == pn.len() && self.names(tn, pn) && self.exprs(te, pe)
            }
            (Stmt::Call(t), Stmt::Call(p)) => self.call(t, p),
            (Stmt::Do(t), Stmt::Do(p)) => self.stmts(t, p),
            (Stmt::While { cond: tc, body: tb }, Stmt::While { cond: pc, body: pb }) => {
                self.expr(tc, pc) && self.stmts(tb, pb)
            }
            (Stmt::Repeat { body: tb, cond: tc }, Stmt::Repeat { body: pb, cond: pc }) => {
                self.stmts(tb, pb) && self.expr(tc, pc)
            }
            (
                Stmt::If {
                    cond: tc,
                    then: tt,
                    orelse: te,
                },
                Stmt::If {
                    cond: pc,
                    then: pt,
                    orelse: pe,
                },
            ) => self.expr(tc, pc) && self.stmts(tt, pt) && self.stmts(te, pe),
            (
                Stmt::NumberFor {
                    init: ti,
                    limit: tl,
                    step: ts,
                    body: tb,
                    ..
                },
                Stmt::NumberFor {
                    init: pi,
                    limit: pl,
                    step: ps,
                    body: pb,
                    ..
                },
            ) => {
                self.expr(ti, pi)
                    && self.expr(tl, pl)
                    && match (ts, ps) {
                        (Some(t), Some(p)) => self.expr(t, p),
                        (None, None) => true,
                        _ => false,
                    }
                    && self.stmts(tb, pb)
            }
            (
                Stmt::GenericFor {
                    names: tn,
                    exprs: te,
                    body: tb,
                },
                Stmt::GenericFor {
                    names: pn,
                    exprs: pe,
                    body: pb,
                },
            ) => tn.len() == pn.len() && self.names(tn, pn) && self.exprs(te, pe) && self.stmts(tb, pb),
            (Stmt::LocalFunction { func: tf, .. }, Stmt::LocalFunction { func: pf, .. }) => self.func(tf, pf),
            (Stmt::Function { func: tf, .. }, Stmt::Function { func: pf, .. }) => self.func(tf, pf),
            (Stmt::Return(te), Stmt::Return(pe)) => self.exprs(te, pe),
            (Stmt::Break, Stmt::Break) | (Stmt::Continue, Stmt::Continue) => true,
            _ => false,
        }
    }

    /// Name lists match positionally; a wildcard pattern name captures the
    /// target name as an identifier.
    fn names(&mut self, target: &[String], pattern: &[String]) -> bool {
        for (t, p) in target.iter().zip(pattern) {
            if p == IDENT_WILDCARD {
                self.captures.push(Expr::Ident(t.clone()));
            }
        }
        true
    }

    fn exprs(&mut self, target: &[Expr], pattern: &[Expr]) -> bool {
        target.len() == pattern.len() && target.iter().zip(pattern).all(|(t, p)| self.expr(t, p))
    }

    fn expr(&mut self, target: &Expr, pattern: &Expr) -> bool {
        match (target, pattern) {
            (Expr::Number(_), Expr::Ident(name)) if name == NUMBER_WILDCARD => {
                self.captures.push(target.clone());
                true
            }
            (Expr::Ident(_), Expr::Ident(name)) => {
                if name == IDENT_WILDCARD {
                    self.captures.push(target.clone());
                }
                true
            }
            (Expr::Nil, Expr::Nil)
            | (Expr::True, Expr::True)
            | (Expr::False, Expr::False)
            | (Expr::VarArg, Expr::VarArg)
            | (Expr::Number(_), Expr::Number(_))
            | (Expr::Str(_), Expr::Str(_))
            // in-depth table comparison buys nothing for shape hunting
            | (Expr::Table(_), Expr::Table(_)) => true,
            (Expr::AttrGet { object: to, key: tk }, Expr::AttrGet { object: po, key: pk }) => {
                self.expr(to, po) && self.expr(tk, pk)
            }
            (
                Expr::Arith {
                    op: t_op,
                    lhs: tl,
                    rhs: tr,
                },
                Expr::Arith {
                    op: p_op,
                    lhs: pl,
                    rhs: pr,
                },
            ) => t_op == p_op && self.expr(tl, pl) && self.expr(tr, pr),
            (Expr::Concat { lhs: tl, rhs: tr }, Expr::Concat { lhs: pl, rhs: pr }) => {
                self.expr(tl, pl) && self.expr(tr, pr)
            }
            (
                Expr::Relation {
                    op: t_op,
                    lhs: tl,
                    rhs: tr,
                },
                Expr::Relation {
                    op: p_op,
                    lhs: pl,
                    rhs: pr,
                },
            ) => t_op == p_op && self.expr(tl, pl) && self.expr(tr, pr),
            (
                Expr::Logic {
                    op: t_op,
                    lhs: tl,
                    rhs: tr,
                },
                Expr::Logic {
                    op: p_op,
                    lhs: pl,
                    rhs: pr,
                },
            ) => t_op == p_op && self.expr(tl, pl) && self.expr(tr, pr),
            (Expr::Unary { op: t_op, expr: te }, Expr::Unary { op: p_op, expr: pe }) => {
                t_op == p_op && self.expr(te, pe)
            }
            (Expr::Function(tf), Expr::Function(pf)) => self.func(tf, pf),
            (Expr::Call(t), Expr::Call(p)) => self.call(t, p),
            _ => false,
        }
    }

    fn call(&mut self, target: &CallExpr, pattern: &CallExpr) -> bool {
        if target.adjust_ret != pattern.adjust_ret {
            return false;
        }
        let targets_match = match (&target.target, &pattern.target) {
            (CallTarget::Function(t), CallTarget::Function(p)) => self.expr(t, p),
            (CallTarget::Method { receiver: tr, .. }, CallTarget::Method { receiver: pr, .. }) => self.expr(tr, pr),
            _ => false,
        };
        targets_match && self.exprs(&target.args, &pattern.args)
    }

    fn func(&mut self, target: &FuncBody, pattern: &FuncBody) -> bool {
        if target.has_vararg != pattern.has_vararg || target.params.len() != pattern.params.len() {
            return false;
        }
        // parameters capture before the body so captures arrive in source
        // order; a failed window discards the whole matcher anyway
        for (t, p) in target.params.iter().zip(&pattern.params) {
            if p == IDENT_WILDCARD {
                self.captures.push(Expr::Ident(t.clone()));
            }
        }
        self.stmts(&target.chunk, &pattern.chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    #[test]
    fn wildcards_capture_in_order() {
        let target = parse(
            "local function Wrap(Chunk, Env, Upvals)\n\
             local Instr = Chunk[1]\n\
             local Proto = Chunk[2]\n\
             local Params = Chunk[3]\n\
             return function(...) end\n\
             end",
        )
        .expect("target");
        let pattern = parse(
            "local function Wrap(Chunk, _IdentExpr_, Upvals)\n\
             local Instr = Chunk[1]\n\
             local Proto = Chunk[2]\n\
             local Params = Chunk[_NumberExpr_]\n\
             return function(...) end\n\
             end",
        )
        .expect("pattern");
        let captures = find(&target, &pattern).expect("should match");
        assert_eq!(captures, vec![Expr::Ident("Env".to_owned()), Expr::Number(3.0)]);
    }

    #[test]
    fn literal_kinds_match_loosely() {
        let target = parse("x = \"hello\" y = 42").expect("target");
        let pattern = parse("x = \"\" y = 0").expect("pattern");
        assert!(find(&target, &pattern).is_some());
    }

    #[test]
    fn operators_must_agree() {
        let target = parse("x = a + b").expect("target");
        assert!(find(&target, &parse("x = a + b").expect("p")).is_some());
        assert!(find(&target, &parse("x = a - b").expect("p")).is_none());
        assert!(find(&target, &parse("x = a .. b").expect("p")).is_none());
    }

    #[test]
    fn matches_inside_nested_functions() {
        let target = parse("local f = function() y = 1 + 2 end").expect("target");
        let pattern = parse("y = 1 + 2").expect("pattern");
        assert!(find(&target, &pattern).is_some());
    }

    #[test]
    fn window_matching_skips_leading_statements() {
        let target = parse("f() a = 1 b = 2").expect("target");
        let pattern = parse("x = 1 y = 2").expect("pattern");
        assert!(find(&target, &pattern).is_some(), "trailing window should match");
        let pattern = parse("g() h()").expect("pattern");
        assert!(find(&target, &pattern).is_none(), "no consecutive call pair exists");
    }
}
