//! Recursive-descent parser.
//!
//! Statements are dispatched on the leading token; expressions use
//! precedence climbing over the table `or=1, and=2, relational=3, ..=5,
//! + -=6, * / %=7, unary=8, ^=10` with `..` and `^` right-associative.
//! Call sugar (`o:m(...)`, `f"s"`, `f{...}`) is normalized into call nodes
//! here, so everything downstream sees one call shape.

use std::fmt;

use crate::{
    ast::{ArithOp, CallExpr, CallTarget, Chunk, CompoundOp, Expr, Field, FuncBody, FuncName, LogicOp, RelOp, Stmt, UnaryOp},
    lexer::{Lexeme, Lexer},
    token::Token,
};

/// A parse failure with its source position.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at line {}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parses a complete source text into a chunk.
pub fn parse(source: &str) -> Result<Chunk, ParseError> {
    let lexemes = Lexer::new(source).lex_all()?;
    let mut parser = Parser { lexemes, pos: 0 };
    let chunk = parser.chunk()?;
    parser.expect(&Token::Eof)?;
    Ok(chunk)
}

struct Parser {
    lexemes: Vec<Lexeme>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.lexemes[self.pos.min(self.lexemes.len() - 1)].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.lexemes[(self.pos + offset).min(self.lexemes.len() - 1)].token
    }

    fn line(&self) -> u32 {
        self.lexemes[self.pos.min(self.lexemes.len() - 1)].line
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.lexemes.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line(),
            column: 0,
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{token}`, found `{}`", self.peek())))
        }
    }

    fn expect_name(&mut self) -> Result<String, ParseError> {
        match self.bump() {
            Token::Name(name) => Ok(name),
            other => Err(self.error(format!("expected name, found `{other}`"))),
        }
    }

    /// True when the current token terminates a block.
    fn at_block_end(&self) -> bool {
        matches!(self.peek(), Token::End | Token::Else | Token::Elseif | Token::Until | Token::Eof)
    }

    fn chunk(&mut self) -> Result<Chunk, ParseError> {
        let mut stmts = Vec::new();
        while !self.at_block_end() {
            if self.eat(&Token::Semi) {
                continue;
            }
            let is_return = self.peek() == &Token::Return;
            stmts.push(self.statement()?);
            if is_return {
                self.eat(&Token::Semi);
                if !self.at_block_end() {
                    return Err(self.error("`return` must be the last statement of a block"));
                }
            }
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Token::Do => {
                self.bump();
                let body = self.chunk()?;
                self.expect(&Token::End)?;
                Ok(Stmt::Do(body))
            }
            Token::While => {
                self.bump();
                let cond = self.expr()?;
                self.expect(&Token::Do)?;
                let body = self.chunk()?;
                self.expect(&Token::End)?;
                Ok(Stmt::While { cond, body })
            }
            Token::Repeat => {
                self.bump();
                let body = self.chunk()?;
                self.expect(&Token::Until)?;
                let cond = self.expr()?;
                Ok(Stmt::Repeat { body, cond })
            }
            Token::If => {
                self.bump();
                self.if_statement()
            }
            Token::For => {
                self.bump();
                self.for_statement()
            }
            Token::Function => {
                self.bump();
                let name = self.func_name()?;
                let func = self.func_body()?;
                Ok(Stmt::Function { name, func })
            }
            Token::Local => {
                self.bump();
                if self.eat(&Token::Function) {
                    let name = self.expect_name()?;
                    let func = self.func_body()?;
                    Ok(Stmt::LocalFunction { name, func })
                } else {
                    let mut names = vec![self.expect_name()?];
                    while self.eat(&Token::Comma) {
                        names.push(self.expect_name()?);
                    }
                    let exprs = if self.eat(&Token::Assign) { self.expr_list()? } else { Vec::new() };
                    Ok(Stmt::LocalAssign { names, exprs })
                }
            }
            Token::Return => {
                self.bump();
                let exprs = if self.at_block_end() || self.peek() == &Token::Semi {
                    Vec::new()
                } else {
                    self.expr_list()?
                };
                Ok(Stmt::Return(exprs))
            }
            Token::Break => {
                self.bump();
                Ok(Stmt::Break)
            }
            Token::Continue => {
                self.bump();
                Ok(Stmt::Continue)
            }
            Token::Goto => {
                self.bump();
                Ok(Stmt::Goto(self.expect_name()?))
            }
            Token::DoubleColon => {
                self.bump();
                let name = self.expect_name()?;
                self.expect(&Token::DoubleColon)?;
                Ok(Stmt::Label(name))
            }
            _ => self.expr_statement(),
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        let cond = self.expr()?;
        self.expect(&Token::Then)?;
        let then = self.chunk()?;
        let orelse = match self.peek() {
            Token::Elseif => {
                self.bump();
                vec![self.if_statement()?]
            }
            Token::Else => {
                self.bump();
                let orelse = self.chunk()?;
                self.expect(&Token::End)?;
                orelse
            }
            _ => {
                self.expect(&Token::End)?;
                Vec::new()
            }
        };
        Ok(Stmt::If { cond, then, orelse })
    }

    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        let first = self.expect_name()?;
        if self.eat(&Token::Assign) {
            let init = self.expr()?;
            self.expect(&Token::Comma)?;
            let limit = self.expr()?;
            let step = if self.eat(&Token::Comma) { Some(self.expr()?) } else { None };
            self.expect(&Token::Do)?;
            let body = self.chunk()?;
            self.expect(&Token::End)?;
            return Ok(Stmt::NumberFor {
                name: first,
                init,
                limit,
                step,
                body,
            });
        }
        let mut names = vec![first];
        while self.eat(&Token::Comma) {
            names.push(self.expect_name()?);
        }
        self.expect(&Token::In)?;
        let exprs = self.expr_list()?;
        self.expect(&Token::Do)?;
        let body = self.chunk()?;
        self.expect(&Token::End)?;
        Ok(Stmt::GenericFor { names, exprs, body })
    }

    fn func_name(&mut self) -> Result<FuncName, ParseError> {
        let mut expr = Expr::Ident(self.expect_name()?);
        while self.eat(&Token::Dot) {
            let key = self.expect_name()?;
            expr = Expr::attr_get(expr, Expr::Str(key.into_bytes()));
        }
        if self.eat(&Token::Colon) {
            let name = self.expect_name()?;
            return Ok(FuncName::Method { receiver: expr, name });
        }
        Ok(FuncName::Plain(expr))
    }

    /// Parses `( params ) block end`. The `function` keyword (and any name)
    /// was already consumed. The implicit `self` of method definitions is
    /// added during lowering, not here, so printing keeps the source
    /// parameter list.
    fn func_body(&mut self) -> Result<FuncBody, ParseError> {
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        let mut has_vararg = false;
        if !self.eat(&Token::RParen) {
            loop {
                match self.bump() {
                    Token::Name(name) => params.push(name),
                    Token::Ellipsis => {
                        has_vararg = true;
                        self.expect(&Token::RParen)?;
                        break;
                    }
                    other => return Err(self.error(format!("expected parameter, found `{other}`"))),
                }
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma)?;
            }
        }
        let chunk = self.chunk()?;
        self.expect(&Token::End)?;
        Ok(FuncBody {
            params,
            has_vararg,
            chunk,
        })
    }

    /// A statement starting with an expression: either a call statement or
    /// the left-hand side of a (compound) assignment.
    fn expr_statement(&mut self) -> Result<Stmt, ParseError> {
        let first = self.suffixed_expr()?;
        let compound = match self.peek() {
            Token::PlusAssign => Some(CompoundOp::Add),
            Token::MinusAssign => Some(CompoundOp::Sub),
            Token::StarAssign => Some(CompoundOp::Mul),
            Token::SlashAssign => Some(CompoundOp::Div),
            Token::PercentAssign => Some(CompoundOp::Mod),
            Token::CaretAssign => Some(CompoundOp::Pow),
            Token::ConcatAssign => Some(CompoundOp::Concat),
            _ => None,
        };
        if let Some(op) = compound {
            self.check_assign_target(&first)?;
            self.bump();
            let rhs = self.expr_list()?;
            return Ok(Stmt::CompoundAssign {
                op,
                lhs: vec![first],
                rhs,
            });
        }
        if self.peek() == &Token::Comma || self.peek() == &Token::Assign {
            let mut lhs = vec![first];
            while self.eat(&Token::Comma) {
                lhs.push(self.suffixed_expr()?);
            }
            for target in &lhs {
                self.check_assign_target(target)?;
            }
            self.expect(&Token::Assign)?;
            let rhs = self.expr_list()?;
            return Ok(Stmt::Assign { lhs, rhs });
        }
        match first {
            Expr::Call(call) if !call.adjust_ret => Ok(Stmt::Call(call)),
            Expr::Call(_) => Err(self.error("parenthesized call cannot stand as a statement")),
            _ => Err(self.error("expression is not a statement")),
        }
    }

    fn check_assign_target(&self, expr: &Expr) -> Result<(), ParseError> {
        match expr {
            Expr::Ident(_) | Expr::AttrGet { .. } => Ok(()),
            _ => Err(self.error("cannot assign to this expression")),
        }
    }

    fn expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.expr()?];
        while self.eat(&Token::Comma) {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_expr(0)
    }

    /// Precedence climbing; `min` is the binding floor (exclusive).
    fn binary_expr(&mut self, min: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let (prec, right_assoc) = match self.peek() {
                Token::Or | Token::And => (if self.peek() == &Token::Or { 1 } else { 2 }, false),
                Token::EqEq | Token::NotEq | Token::Less | Token::LessEq | Token::Greater | Token::GreaterEq => {
                    (3, false)
                }
                Token::Concat => (5, true),
                Token::Plus | Token::Minus => (6, false),
                Token::Star | Token::Slash | Token::Percent => (7, false),
                Token::Caret => (10, true),
                _ => break,
            };
            if prec <= min {
                break;
            }
            let op = self.bump();
            let next_min = if right_assoc { prec - 1 } else { prec };
            let rhs = self.binary_expr(next_min)?;
            lhs = build_binary(&op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            Token::Hash => UnaryOp::Len,
            Token::Tilde => UnaryOp::BitNot,
            _ => return self.simple_expr(),
        };
        self.bump();
        // unary binds at 8; only `^` (10) binds tighter into the operand
        let operand = self.binary_expr(8)?;
        Ok(Expr::unary(op, operand))
    }

    fn simple_expr(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Token::Nil => {
                self.bump();
                Ok(Expr::Nil)
            }
            Token::True => {
                self.bump();
                Ok(Expr::True)
            }
            Token::False => {
                self.bump();
                Ok(Expr::False)
            }
            Token::Ellipsis => {
                self.bump();
                Ok(Expr::VarArg)
            }
            Token::Number(_) => {
                let Token::Number(value) = self.bump() else { unreachable!() };
                Ok(Expr::Number(value))
            }
            Token::Str(_) => {
                let Token::Str(bytes) = self.bump() else { unreachable!() };
                Ok(Expr::Str(bytes))
            }
            Token::LBrace => self.table_expr(),
            Token::Function => {
                self.bump();
                Ok(Expr::Function(self.func_body()?))
            }
            _ => self.suffixed_expr(),
        }
    }

    /// A primary expression followed by any number of suffixes:
    /// `.name`, `[expr]`, `:name(args)`, or call arguments.
    fn suffixed_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = match self.peek() {
            Token::Name(_) => {
                let Token::Name(name) = self.bump() else { unreachable!() };
                Expr::Ident(name)
            }
            Token::LParen => {
                self.bump();
                let mut inner = self.expr()?;
                self.expect(&Token::RParen)?;
                if let Expr::Call(call) = &mut inner {
                    call.adjust_ret = true;
                }
                inner
            }
            other => return Err(self.error(format!("unexpected token `{other}`"))),
        };
        loop {
            match self.peek() {
                Token::Dot => {
                    self.bump();
                    let key = self.expect_name()?;
                    expr = Expr::attr_get(expr, Expr::Str(key.into_bytes()));
                }
                Token::LBracket => {
                    self.bump();
                    let key = self.expr()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::attr_get(expr, key);
                }
                Token::Colon => {
                    self.bump();
                    let name = self.expect_name()?;
                    let args = self.call_args()?;
                    expr = Expr::Call(CallExpr {
                        target: CallTarget::Method {
                            receiver: Box::new(expr),
                            name,
                        },
                        args,
                        adjust_ret: false,
                    });
                }
                Token::LParen | Token::Str(_) | Token::LBrace => {
                    let args = self.call_args()?;
                    expr = Expr::Call(CallExpr {
                        target: CallTarget::Function(Box::new(expr)),
                        args,
                        adjust_ret: false,
                    });
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Call arguments: `( exprlist )`, a lone string, or a lone table
    /// constructor.
    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        match self.peek() {
            Token::Str(_) => {
                let Token::Str(bytes) = self.bump() else { unreachable!() };
                Ok(vec![Expr::Str(bytes)])
            }
            Token::LBrace => Ok(vec![self.table_expr()?]),
            Token::LParen => {
                self.bump();
                if self.eat(&Token::RParen) {
                    return Ok(Vec::new());
                }
                let args = self.expr_list()?;
                self.expect(&Token::RParen)?;
                Ok(args)
            }
            other => Err(self.error(format!("expected call arguments, found `{other}`"))),
        }
    }

    fn table_expr(&mut self) -> Result<Expr, ParseError> {
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        while !self.eat(&Token::RBrace) {
            let field = match self.peek() {
                Token::LBracket => {
                    self.bump();
                    let key = self.expr()?;
                    self.expect(&Token::RBracket)?;
                    self.expect(&Token::Assign)?;
                    Field {
                        key: Some(key),
                        value: self.expr()?,
                    }
                }
                Token::Name(_) if self.peek_at(1) == &Token::Assign => {
                    let Token::Name(name) = self.bump() else { unreachable!() };
                    self.bump();
                    Field {
                        key: Some(Expr::Str(name.into_bytes())),
                        value: self.expr()?,
                    }
                }
                _ => Field {
                    key: None,
                    value: self.expr()?,
                },
            };
            fields.push(field);
            if !self.eat(&Token::Comma) && !self.eat(&Token::Semi) {
                self.expect(&Token::RBrace)?;
                break;
            }
        }
        Ok(Expr::Table(fields))
    }
}

fn build_binary(op: &Token, lhs: Expr, rhs: Expr) -> Expr {
    let lhs = Box::new(lhs);
    let rhs = Box::new(rhs);
    match op {
        Token::Or => Expr::Logic {
            op: LogicOp::Or,
            lhs,
            rhs,
        },
        Token::And => Expr::Logic {
            op: LogicOp::And,
            lhs,
            rhs,
        },
        Token::EqEq => Expr::Relation { op: RelOp::Eq, lhs, rhs },
        Token::NotEq => Expr::Relation { op: RelOp::Ne, lhs, rhs },
        Token::Less => Expr::Relation { op: RelOp::Lt, lhs, rhs },
        Token::LessEq => Expr::Relation { op: RelOp::Le, lhs, rhs },
        Token::Greater => Expr::Relation { op: RelOp::Gt, lhs, rhs },
        Token::GreaterEq => Expr::Relation { op: RelOp::Ge, lhs, rhs },
        Token::Concat => Expr::Concat { lhs, rhs },
        Token::Plus => Expr::Arith { op: ArithOp::Add, lhs, rhs },
        Token::Minus => Expr::Arith { op: ArithOp::Sub, lhs, rhs },
        Token::Star => Expr::Arith { op: ArithOp::Mul, lhs, rhs },
        Token::Slash => Expr::Arith { op: ArithOp::Div, lhs, rhs },
        Token::Percent => Expr::Arith { op: ArithOp::Mod, lhs, rhs },
        Token::Caret => Expr::Arith { op: ArithOp::Pow, lhs, rhs },
        other => unreachable!("not a binary operator token: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_shapes() {
        let chunk = parse("x = a + b * c").expect("parse");
        let Stmt::Assign { rhs, .. } = &chunk[0] else { panic!("expected assign") };
        let Expr::Arith { op: ArithOp::Add, rhs: mul, .. } = &rhs[0] else {
            panic!("expected + at the top: {rhs:?}")
        };
        assert!(matches!(**mul, Expr::Arith { op: ArithOp::Mul, .. }));
    }

    #[test]
    fn power_is_right_associative_and_tighter_than_unary() {
        let chunk = parse("x = -a ^ 2").expect("parse");
        let Stmt::Assign { rhs, .. } = &chunk[0] else { panic!("expected assign") };
        let Expr::Unary { op: UnaryOp::Neg, expr } = &rhs[0] else {
            panic!("expected unary minus at the top: {rhs:?}")
        };
        assert!(matches!(**expr, Expr::Arith { op: ArithOp::Pow, .. }));

        let chunk = parse("x = a ^ b ^ c").expect("parse");
        let Stmt::Assign { rhs, .. } = &chunk[0] else { panic!("expected assign") };
        let Expr::Arith { op: ArithOp::Pow, rhs: nested, .. } = &rhs[0] else {
            panic!("expected ^ at the top")
        };
        assert!(matches!(**nested, Expr::Arith { op: ArithOp::Pow, .. }));
    }

    #[test]
    fn concat_is_right_associative() {
        let chunk = parse("x = a .. b .. c").expect("parse");
        let Stmt::Assign { rhs, .. } = &chunk[0] else { panic!("expected assign") };
        let Expr::Concat { rhs: nested, .. } = &rhs[0] else { panic!("expected concat") };
        assert!(matches!(**nested, Expr::Concat { .. }));
    }

    #[test]
    fn method_call_has_no_callee() {
        let chunk = parse("obj:m(1)").expect("parse");
        let Stmt::Call(call) = &chunk[0] else { panic!("expected call statement") };
        assert!(matches!(&call.target, CallTarget::Method { name, .. } if name == "m"));
    }

    #[test]
    fn call_sugar_normalizes() {
        let chunk = parse("f \"s\" g {1}").expect("parse");
        let Stmt::Call(call) = &chunk[0] else { panic!("expected call statement") };
        assert_eq!(call.args, vec![Expr::Str(b"s".to_vec())]);
        let Stmt::Call(call) = &chunk[1] else { panic!("expected call statement") };
        assert!(matches!(call.args[0], Expr::Table(_)));
    }

    #[test]
    fn parenthesized_call_sets_adjust_ret() {
        let chunk = parse("x = (f())").expect("parse");
        let Stmt::Assign { rhs, .. } = &chunk[0] else { panic!("expected assign") };
        let Expr::Call(call) = &rhs[0] else { panic!("expected call") };
        assert!(call.adjust_ret);
    }

    #[test]
    fn elseif_parses_to_nested_if() {
        let chunk = parse("if a then x = 1 elseif b then x = 2 else x = 3 end").expect("parse");
        let Stmt::If { orelse, .. } = &chunk[0] else { panic!("expected if") };
        assert_eq!(orelse.len(), 1);
        let Stmt::If { orelse: inner, .. } = &orelse[0] else { panic!("expected nested if") };
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn return_must_be_last() {
        assert!(parse("return 1 x = 2").is_err());
        assert!(parse("do return end x = 2").is_ok());
        assert!(parse("return;").is_ok());
    }

    #[test]
    fn assignment_targets_are_validated() {
        assert!(parse("f() = 1").is_err());
        assert!(parse("a.b, c[1] = 1, 2").is_ok());
        assert!(parse("1 = 2").is_err());
    }

    #[test]
    fn compound_assignment() {
        let chunk = parse("x += 1 s ..= t").expect("parse");
        assert!(matches!(&chunk[0], Stmt::CompoundAssign { op: CompoundOp::Add, .. }));
        assert!(matches!(&chunk[1], Stmt::CompoundAssign { op: CompoundOp::Concat, .. }));
    }

    #[test]
    fn goto_and_labels_parse() {
        let chunk = parse("::top:: goto top").expect("parse");
        assert_eq!(chunk[0], Stmt::Label("top".to_owned()));
        assert_eq!(chunk[1], Stmt::Goto("top".to_owned()));
    }
}
