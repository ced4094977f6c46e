//! Pretty-printer: turns a chunk back into canonical source text.
//!
//! Output conventions: statements end with `;`, blocks indent with tabs,
//! strings are double-quoted, numbers print in their shortest round-trip
//! form, and binary expressions carry the minimal parentheses that preserve
//! the parse. The printer never mutates its input.

use crate::{
    ast::{CallExpr, CallTarget, Chunk, Expr, Field, FuncBody, FuncName, LogicOp, Stmt},
    quote,
};

/// Prints a chunk as canonical source text.
pub fn print_chunk(chunk: &Chunk) -> String {
    let mut printer = Printer {
        out: String::new(),
        indent: 0,
    };
    printer.stmts(chunk);
    printer.out
}

/// Prints a single expression (no trailing newline or semicolon).
pub fn print_expr(expr: &Expr) -> String {
    let mut printer = Printer {
        out: String::new(),
        indent: 0,
    };
    printer.expr(expr, Ctx::default());
    printer.out
}

/// Shortest decimal representation of a number that round-trips through
/// `f64`, with no trailing `.0`.
pub fn number(value: f64) -> String {
    let mut buffer = ryu::Buffer::new();
    let text = buffer.format(value);
    text.strip_suffix(".0").unwrap_or(text).to_owned()
}

/// Parenthesization context for a sub-expression: the parent operator's
/// precedence and which side of it we are on.
#[derive(Debug, Clone, Copy, Default)]
struct Ctx {
    prec: u8,
    /// True when printing the right operand of the parent operator.
    right: bool,
}

struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn tab(&mut self) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
    }

    fn stmts(&mut self, chunk: &Chunk) {
        for stmt in chunk {
            self.stmt(stmt);
        }
    }

    fn chunk(&mut self, chunk: &Chunk) {
        self.indent += 1;
        self.stmts(chunk);
        self.indent -= 1;
    }

    fn comma_list(&mut self, exprs: &[Expr]) {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(expr, Ctx::default());
        }
    }

    fn name_list(&mut self, names: &[String]) {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push(name);
        }
    }

    /// Prints `lhs op rhs`, parenthesized iff the parent binds tighter, or
    /// equally tight on the side the operator does not associate to.
    fn binary(&mut self, prec: u8, right_assoc: bool, op: &str, lhs: &Expr, rhs: &Expr, ctx: Ctx) {
        let wrap = prec < ctx.prec || (prec == ctx.prec && right_assoc != ctx.right);
        if wrap {
            self.push("(");
        }
        self.expr(lhs, Ctx { prec, right: false });
        self.push(" ");
        self.push(op);
        self.push(" ");
        self.expr(rhs, Ctx { prec, right: true });
        if wrap {
            self.push(")");
        }
    }

    fn expr(&mut self, expr: &Expr, ctx: Ctx) {
        match expr {
            Expr::Nil => self.push("nil"),
            Expr::True => self.push("true"),
            Expr::False => self.push("false"),
            Expr::VarArg => self.push("..."),
            Expr::Number(value) => {
                let text = number(*value);
                self.push(&text);
            }
            Expr::Str(bytes) => {
                let text = quote::quote(bytes);
                self.push(&text);
            }
            Expr::Ident(name) => self.push(name),
            Expr::AttrGet { object, key } => {
                match object.as_ref() {
                    Expr::Ident(_) | Expr::AttrGet { .. } | Expr::Call(_) => self.expr(object, Ctx::default()),
                    _ => {
                        self.push("(");
                        self.expr(object, Ctx::default());
                        self.push(")");
                    }
                }
                self.key(key);
            }
            Expr::Table(fields) => self.table(fields),
            Expr::Arith { op, lhs, rhs } => {
                let (prec, right_assoc) = match op {
                    crate::ast::ArithOp::Add | crate::ast::ArithOp::Sub => (6, false),
                    crate::ast::ArithOp::Mul | crate::ast::ArithOp::Div | crate::ast::ArithOp::Mod => (7, false),
                    crate::ast::ArithOp::Pow => (10, true),
                };
                self.binary(prec, right_assoc, &op.to_string(), lhs, rhs, ctx);
            }
            Expr::Concat { lhs, rhs } => self.binary(5, true, "..", lhs, rhs, ctx),
            Expr::Relation { op, lhs, rhs } => self.binary(3, false, &op.to_string(), lhs, rhs, ctx),
            Expr::Logic { op, lhs, rhs } => {
                let prec = match op {
                    LogicOp::Or => 1,
                    LogicOp::And => 2,
                };
                self.binary(prec, false, &op.to_string(), lhs, rhs, ctx);
            }
            Expr::Unary { op, expr } => {
                let wrap = ctx.prec > 8 || ctx.right;
                if wrap {
                    self.push("(");
                }
                self.push(&op.to_string());
                if *op == crate::ast::UnaryOp::Not {
                    self.push(" ");
                }
                self.expr(expr, Ctx { prec: 8, right: true });
                if wrap {
                    self.push(")");
                }
            }
            Expr::Function(func) => self.func_body(func, true),
            Expr::Call(call) => self.call(call),
        }
    }

    /// Prints an attribute key: `.name` for identifier-like string literals,
    /// `[expr]` otherwise (including reserved words).
    fn key(&mut self, key: &Expr) {
        if let Expr::Str(bytes) = key {
            if quote::is_valid_name(bytes) {
                self.push(".");
                let name = String::from_utf8_lossy(bytes).into_owned();
                self.push(&name);
                return;
            }
        }
        self.push("[");
        self.expr(key, Ctx::default());
        self.push("]");
    }

    fn table(&mut self, fields: &[Field]) {
        if fields.is_empty() {
            self.push("{}");
            return;
        }
        self.push("{");
        self.indent += 1;
        let last = fields.len() - 1;
        for (i, field) in fields.iter().enumerate() {
            self.push("\n");
            self.tab();
            if let Some(key) = &field.key {
                match key {
                    Expr::Str(bytes) if quote::is_valid_name(bytes) => {
                        let name = String::from_utf8_lossy(bytes).into_owned();
                        self.push(&name);
                    }
                    _ => {
                        self.push("[");
                        self.expr(key, Ctx::default());
                        self.push("]");
                    }
                }
                self.push(" = ");
            }
            self.expr(&field.value, Ctx::default());
            if i < last {
                self.push(",");
            } else {
                self.push("\n");
                self.indent -= 1;
                self.tab();
                self.indent += 1;
            }
        }
        self.indent -= 1;
        self.push("}");
    }

    fn call(&mut self, call: &CallExpr) {
        if call.adjust_ret {
            self.push("(");
        }
        match &call.target {
            CallTarget::Function(callee) => match callee.as_ref() {
                Expr::Ident(_) | Expr::AttrGet { .. } | Expr::Table(_) | Expr::Call(_) => {
                    self.expr(callee, Ctx::default());
                }
                _ => {
                    self.push("(");
                    self.expr(callee, Ctx::default());
                    self.push(")");
                }
            },
            CallTarget::Method { receiver, name } => {
                match receiver.as_ref() {
                    Expr::Ident(_) | Expr::AttrGet { .. } | Expr::Call(_) => self.expr(receiver, Ctx::default()),
                    _ => {
                        self.push("(");
                        self.expr(receiver, Ctx::default());
                        self.push(")");
                    }
                }
                self.push(":");
                self.push(name);
            }
        }
        self.push("(");
        self.comma_list(&call.args);
        self.push(")");
        if call.adjust_ret {
            self.push(")");
        }
    }

    fn func_body(&mut self, func: &FuncBody, with_keyword: bool) {
        if with_keyword {
            self.push("function(");
        } else {
            self.push("(");
        }
        self.name_list(&func.params);
        if func.has_vararg {
            if !func.params.is_empty() {
                self.push(", ");
            }
            self.push("...");
        }
        self.push(")\n");
        self.chunk(&func.chunk);
        self.tab();
        self.push("end");
    }

    fn else_body(&mut self, orelse: &Chunk) {
        if orelse.is_empty() {
            return;
        }
        if orelse.len() == 1 {
            if let Stmt::If { cond, then, orelse: nested } = &orelse[0] {
                self.tab();
                self.push("elseif ");
                self.expr(cond, Ctx::default());
                self.push(" then\n");
                self.chunk(then);
                self.else_body(nested);
                return;
            }
        }
        self.tab();
        self.push("else\n");
        self.chunk(orelse);
    }

    fn stmt(&mut self, stmt: &Stmt) {
        self.tab();
        match stmt {
            Stmt::Assign { lhs, rhs } => {
                self.comma_list(lhs);
                self.push(" = ");
                self.comma_list(rhs);
            }
            Stmt::CompoundAssign { op, lhs, rhs } => {
                self.comma_list(lhs);
                self.push(" ");
                self.push(&op.to_string());
                self.push(" ");
                self.comma_list(rhs);
            }
            Stmt::LocalAssign { names, exprs } => {
                self.push("local ");
                self.name_list(names);
                if !exprs.is_empty() {
                    self.push(" = ");
                    self.comma_list(exprs);
                }
            }
            Stmt::Call(call) => self.call(call),
            Stmt::Do(body) => {
                self.push("do\n");
                self.chunk(body);
                self.tab();
                self.push("end");
            }
            Stmt::While { cond, body } => {
                self.push("while ");
                self.expr(cond, Ctx::default());
                self.push(" do\n");
                self.chunk(body);
                self.tab();
                self.push("end");
            }
            Stmt::Repeat { body, cond } => {
                self.push("repeat\n");
                self.chunk(body);
                self.tab();
                self.push("until ");
                self.expr(cond, Ctx::default());
            }
            Stmt::If { cond, then, orelse } => {
                self.push("if ");
                self.expr(cond, Ctx::default());
                self.push(" then\n");
                self.chunk(then);
                self.else_body(orelse);
                self.tab();
                self.push("end");
            }
            Stmt::NumberFor {
                name,
                init,
                limit,
                step,
                body,
            } => {
                self.push("for ");
                self.push(name);
                self.push(" = ");
                self.expr(init, Ctx::default());
                self.push(", ");
                self.expr(limit, Ctx::default());
                if let Some(step) = step {
                    self.push(", ");
                    self.expr(step, Ctx::default());
                }
                self.push(" do\n");
                self.chunk(body);
                self.tab();
                self.push("end");
            }
            Stmt::GenericFor { names, exprs, body } => {
                self.push("for ");
                self.name_list(names);
                self.push(" in ");
                self.comma_list(exprs);
                self.push(" do\n");
                self.chunk(body);
                self.tab();
                self.push("end");
            }
            Stmt::LocalFunction { name, func } => {
                self.push("local function ");
                self.push(name);
                self.func_body(func, false);
            }
            Stmt::Function { name, func } => {
                self.push("function ");
                match name {
                    FuncName::Plain(expr) => self.expr(expr, Ctx::default()),
                    FuncName::Method { receiver, name } => {
                        self.expr(receiver, Ctx::default());
                        self.push(":");
                        self.push(name);
                    }
                }
                self.func_body(func, false);
            }
            Stmt::Return(exprs) => {
                self.push("return");
                if !exprs.is_empty() {
                    self.push(" ");
                    self.comma_list(exprs);
                }
            }
            Stmt::Break => self.push("break"),
            Stmt::Continue => self.push("continue"),
            Stmt::Label(name) => {
                self.push("::");
                self.push(name);
                self.push("::");
            }
            Stmt::Goto(name) => {
                self.push("goto ");
                self.push(name);
            }
        }
        self.push(";\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn roundtrip(src: &str) -> String {
        print_chunk(&parse(src).expect("parse"))
    }

    #[test]
    fn numbers_print_shortest() {
        assert_eq!(number(3.0), "3");
        assert_eq!(number(0.5), "0.5");
        assert_eq!(number(-1.0), "-1");
        assert_eq!(number(0.0), "0");
    }

    #[test]
    fn minimal_parentheses() {
        assert_eq!(roundtrip("x = a + b * c"), "x = a + b * c;\n");
        assert_eq!(roundtrip("x = (a + b) * c"), "x = (a + b) * c;\n");
        assert_eq!(roundtrip("x = a - (b - c)"), "x = a - (b - c);\n");
        assert_eq!(roundtrip("x = (a .. b) .. c"), "x = (a .. b) .. c;\n");
        assert_eq!(roundtrip("x = a .. b .. c"), "x = a .. b .. c;\n");
        assert_eq!(roundtrip("x = a or b and c"), "x = a or b and c;\n");
    }

    #[test]
    fn redundant_parentheses_are_dropped() {
        assert_eq!(roundtrip("x = (((a)))"), "x = a;\n");
        assert_eq!(roundtrip("x = (a + b) + c"), "x = a + b + c;\n");
    }

    #[test]
    fn unary_spacing_and_wrapping() {
        assert_eq!(roundtrip("x = not a"), "x = not a;\n");
        assert_eq!(roundtrip("x = - -a"), "x = -(-a);\n");
        assert_eq!(roundtrip("x = -a ^ 2"), "x = -a ^ 2;\n");
        assert_eq!(roundtrip("x = (-a) ^ 2"), "x = (-a) ^ 2;\n");
        assert_eq!(roundtrip("x = #t"), "x = #t;\n");
    }

    #[test]
    fn table_layout() {
        assert_eq!(roundtrip("x = {}"), "x = {};\n");
        assert_eq!(roundtrip("x = {1}"), "x = {\n\t1\n};\n");
        assert_eq!(roundtrip("x = {1, 2}"), "x = {\n\t1,\n\t2\n};\n");
        assert_eq!(roundtrip("x = {a = 1}"), "x = {\n\ta = 1\n};\n");
        assert_eq!(roundtrip("x = {[1] = 2}"), "x = {\n\t[1] = 2\n};\n");
        // trailing comma is dropped
        assert_eq!(roundtrip("x = {1, 2,}"), "x = {\n\t1,\n\t2\n};\n");
    }

    #[test]
    fn reserved_words_as_keys_use_brackets() {
        assert_eq!(roundtrip("x = {[\"end\"] = 1}"), "x = {\n\t[\"end\"] = 1\n};\n");
        assert_eq!(roundtrip("x = t[\"end\"]"), "x = t[\"end\"];\n");
        assert_eq!(roundtrip("x = t[\"ok\"]"), "x = t.ok;\n");
    }

    #[test]
    fn elseif_collapsing() {
        let src = "if a then x=1 else if b then x=2 else x=3 end end";
        assert_eq!(
            roundtrip(src),
            "if a then\n\tx = 1;\nelseif b then\n\tx = 2;\nelse\n\tx = 3;\nend;\n"
        );
    }

    #[test]
    fn adjusted_call_keeps_parentheses() {
        assert_eq!(roundtrip("x = (f())"), "x = (f());\n");
        assert_eq!(roundtrip("x = f()"), "x = f();\n");
    }

    #[test]
    fn callee_wrapping() {
        assert_eq!(roundtrip("(function() end)()"), "(function()\nend)();\n");
        assert_eq!(roundtrip("f()()"), "f()();\n");
        assert_eq!(roundtrip("x = (\"s\"):rep(2)"), "x = (\"s\"):rep(2);\n");
    }

    #[test]
    fn string_call_sugar_normalizes() {
        assert_eq!(roundtrip("f \"s\""), "f(\"s\");\n");
        assert_eq!(roundtrip("f {1}"), "f({\n\t1\n});\n");
    }
}
