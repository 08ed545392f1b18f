//! The intermediate representation that parsed scripts are lowered into.
//!
//! The tree walker in `vm.rs` executes `Node`s directly; there is no separate
//! preparation pass.

use std::sync::Arc;

use crate::value::Value;

/// A statement.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Pass,
    Expr(Expr),
    /// `a = b = value`; targets are assigned left to right.
    Assign {
        targets: Vec<Target>,
        value: Expr,
    },
    Return(Option<Expr>),
    If {
        test: Expr,
        body: Vec<Node>,
        or_else: Vec<Node>,
    },
    /// `raise` or `raise exc`. A bare `raise` is a `RuntimeError` since there
    /// is no active exception to re-raise.
    Raise(Option<Expr>),
    FunctionDef(Arc<FunctionDef>),
    ClassDef(Arc<ClassDef>),
    /// `from module import name as alias, ...`
    ImportFrom {
        module: String,
        names: Vec<ImportName>,
    },
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone)]
pub(crate) enum Target {
    Name(String),
    Attr { object: Expr, attr: String },
    Subscript { object: Expr, index: Expr },
}

#[derive(Debug, Clone)]
pub(crate) struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportName {
    /// The name the import binds in the current scope.
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A `def` statement. Only positional parameters are supported.
#[derive(Debug)]
pub(crate) struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Node>,
}

#[derive(Debug)]
pub(crate) struct ClassDef {
    pub name: String,
    pub bases: Vec<Expr>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    /// `None`, booleans, ints and strings. Never a `Value::Ref`.
    Literal(Value),
    Name(String),
    Attr {
        object: Box<Expr>,
        attr: String,
    },
    Call {
        callable: Box<Expr>,
        args: Vec<Expr>,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Op {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
    CmpOp {
        left: Box<Expr>,
        op: CmpOperator,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
    Not(Box<Expr>),
    /// List displays; tuple displays are lowered to lists too.
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operator {
    // `+`
    Add,
    // `-`
    Sub,
    // `*`
    Mult,
    // bool operators, short-circuiting
    // `and`
    And,
    // `or`
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}
