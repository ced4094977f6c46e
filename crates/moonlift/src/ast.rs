//! The abstract syntax tree shared by the parser, the peephole optimizer,
//! the pretty-printer, and both ends of the SSA pipeline.
//!
//! The tree is a pair of tagged sums (`Expr`, `Stmt`) plus a `Chunk`
//! (an ordered statement list). Structural equality ignores nothing: two
//! trees are equal iff they print identically, which is what the round-trip
//! tests lean on.

/// Arithmetic binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum ArithOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "^")]
    Pow,
}

/// Relational binary operators. `~=` is the language's inequality spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum RelOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "~=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
}

/// Short-circuiting logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum LogicOp {
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
}

/// Unary prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "#")]
    Len,
    #[strum(serialize = "~")]
    BitNot,
}

/// Operators usable in compound assignment (`x += 1`, `s ..= t`).
///
/// The display form includes the trailing `=` so statement printing can emit
/// the operator token directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum CompoundOp {
    #[strum(serialize = "+=")]
    Add,
    #[strum(serialize = "-=")]
    Sub,
    #[strum(serialize = "*=")]
    Mul,
    #[strum(serialize = "/=")]
    Div,
    #[strum(serialize = "%=")]
    Mod,
    #[strum(serialize = "^=")]
    Pow,
    #[strum(serialize = "..=")]
    Concat,
}

/// One entry of a table constructor. A missing key is a positional array
/// element; field order is significant and preserved.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Field {
    pub key: Option<Expr>,
    pub value: Expr,
}

/// A function literal body: parameter names, whether the parameter list ends
/// in `...`, and the statements.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FuncBody {
    pub params: Vec<String>,
    pub has_vararg: bool,
    pub chunk: Chunk,
}

/// What a call dispatches through.
///
/// A method call (`o:m(...)`) carries the receiver and method name and never
/// a callee expression; a plain call carries only the callee. Making the two
/// shapes a sum keeps that invariant in the types.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum CallTarget {
    /// `f(...)`, `t.f(...)`, `(expr)(...)`
    Function(Box<Expr>),
    /// `receiver:name(...)`
    Method { receiver: Box<Expr>, name: String },
}

/// A call expression, usable both in expression position and as a statement.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CallExpr {
    pub target: CallTarget,
    pub args: Vec<Expr>,
    /// True when the source wrapped the call in parentheses, truncating a
    /// multi-value result to a single value. Preserved so printing keeps the
    /// truncation.
    pub adjust_ret: bool,
}

/// An expression.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Nil,
    True,
    False,
    /// `...`
    VarArg,
    Number(f64),
    /// String literals are byte strings; escapes were already decoded.
    Str(Vec<u8>),
    Ident(String),
    /// `obj.name` and `obj[key]`, normalized: `obj.name` stores the key as a
    /// string literal.
    AttrGet { object: Box<Expr>, key: Box<Expr> },
    Table(Vec<Field>),
    Arith { op: ArithOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// `..`
    Concat { lhs: Box<Expr>, rhs: Box<Expr> },
    Relation { op: RelOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Logic { op: LogicOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Function(FuncBody),
    Call(CallExpr),
}

impl Expr {
    /// True for literal constants: `nil`, booleans, numbers, strings.
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Nil | Self::True | Self::False | Self::Number(_) | Self::Str(_))
    }

    pub fn attr_get(object: Self, key: Self) -> Self {
        Self::AttrGet {
            object: Box::new(object),
            key: Box::new(key),
        }
    }

    pub fn unary(op: UnaryOp, expr: Self) -> Self {
        Self::Unary {
            op,
            expr: Box::new(expr),
        }
    }
}

/// The name being defined by a `function` statement.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FuncName {
    /// `function a.b.c() end` — an identifier or attribute chain.
    Plain(Expr),
    /// `function a.b:m() end` — receiver chain plus method name; lowering
    /// prepends an implicit `self` parameter.
    Method { receiver: Expr, name: String },
}

/// A statement.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Stmt {
    Assign { lhs: Vec<Expr>, rhs: Vec<Expr> },
    CompoundAssign { op: CompoundOp, lhs: Vec<Expr>, rhs: Vec<Expr> },
    LocalAssign { names: Vec<String>, exprs: Vec<Expr> },
    Call(CallExpr),
    Do(Chunk),
    While { cond: Expr, body: Chunk },
    Repeat { body: Chunk, cond: Expr },
    /// `if`/`elseif` chains parse into nested `If` statements in `orelse`;
    /// the printer folds a single-`If` else-chunk back into `elseif`.
    If { cond: Expr, then: Chunk, orelse: Chunk },
    NumberFor {
        name: String,
        init: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Chunk,
    },
    GenericFor {
        names: Vec<String>,
        exprs: Vec<Expr>,
        body: Chunk,
    },
    LocalFunction { name: String, func: FuncBody },
    Function { name: FuncName, func: FuncBody },
    Return(Vec<Expr>),
    Break,
    Continue,
    Label(String),
    Goto(String),
}

/// An ordered list of statements.
pub type Chunk = Vec<Stmt>;
