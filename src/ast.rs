//! Abstract syntax tree for annotated straight-line functions
//!
//! The node kinds form a closed set: a compilation unit is a list of
//! function definitions, a body is a flat sequence of statements, and
//! expressions are names, number literals, calls, and binary operations.
//! The translator dispatches on these kinds with exhaustive matches, so an
//! unhandled construct is a compile error here rather than a runtime
//! surprise in the tree walk.

/// A parsed compilation unit
#[derive(Debug, Clone, PartialEq)]
pub struct SourceModule {
    pub functions: Vec<FunctionSpec>,
}

/// One function definition: name, annotated parameters, body statements
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

/// A declared parameter with its optional annotation expression
///
/// The annotation is optional only at the syntax level; translation
/// requires one for every parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<AnnotExpr>,
}

/// A body statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// No-op statement: `pass`
    Pass,
    /// Assignment: `target = expr` (extra targets parse but are rejected
    /// during translation)
    Assign { targets: Vec<String>, value: Expr },
    /// Terminal return: `return expr`
    Return(Expr),
    /// Bare expression statement (no translation rule)
    Expr(Expr),
}

/// An expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Variable reference
    Name(String),
    /// Numeric literal
    Number(f64),
    /// Binary operation
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Function call (no translation rule)
    Call { name: String, args: Vec<Expr> },
}

/// Binary operator kinds
///
/// `-` and `/` parse so that the translator can reject them with a
/// dedicated operator error instead of a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Mul,
    Sub,
    Div,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Mul => "*",
            BinOp::Sub => "-",
            BinOp::Div => "/",
        }
    }
}

/// A parameter's type annotation expression
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotExpr {
    /// `Tensor(shape=(dims...), dtype=d)` in keyword or positional form
    Tensor { shape: Vec<DimExpr>, dtype: DtypeExpr },
    /// A bare name resolving to a full tensor type in the resolution
    /// context, e.g. a helper alias defined at the call site
    Named(String),
}

/// One dimension inside an annotation's shape tuple
#[derive(Debug, Clone, PartialEq)]
pub enum DimExpr {
    /// Fixed dimension: `Tensor((2, 3), ...)`
    Literal(usize),
    /// Free name looked up in the resolution context: `Tensor((m, n), ...)`
    Name(String),
}

/// The dtype part of an annotation
#[derive(Debug, Clone, PartialEq)]
pub enum DtypeExpr {
    /// String literal: `dtype="float32"`
    Literal(String),
    /// Builtin dtype name or free context name: `dtype=float32`, `dtype=dt`
    Name(String),
}
