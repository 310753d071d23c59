/// Abstract syntax tree for the script dialect.
///
/// The parser produces a stream of top-level [`Stmt`]s. Every node that can
/// fail at run time carries a [`Span`] so errors can report a line.
use std::rc::Rc;

use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterpolationPart {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    String(String),
    /// A string literal containing `%(...)` parts.
    Interpolation(Vec<InterpolationPart>),
    Bool(bool),
    Null,
    This,
    /// A variable reference, resolved against locals then module scope.
    Variable(String),
    /// An instance field, e.g. `_msg`.
    Field(String),
    List(Vec<Expr>),
    /// A prefix operator, sent as a zero-argument method (`-`, `!`).
    Unary {
        op: &'static str,
        operand: Box<Expr>,
    },
    /// An infix operator, sent as a one-argument method on `lhs`.
    Binary {
        op: &'static str,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Short-circuiting `&&` / `||`.
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        target: AssignTarget,
        value: Box<Expr>,
    },
    /// `receiver.name(args)`; `args` is `None` for a getter.
    Call {
        receiver: Box<Expr>,
        name: String,
        args: Option<Vec<Expr>>,
    },
    /// `receiver[index]`.
    Subscript {
        receiver: Box<Expr>,
        index: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Variable(String),
    Field(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Var {
        name: String,
        init: Option<Expr>,
        span: Span,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    /// `for (name in sequence) body`, iterating a list.
    For {
        name: String,
        sequence: Expr,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Break(Span),
    Class(Rc<ClassDecl>),
    Import {
        module: String,
        names: Vec<String>,
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub is_foreign: bool,
    pub methods: Vec<Rc<MethodDecl>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// `name(params) { ... }`
    Method,
    /// `name { ... }`, called without parentheses.
    Getter,
    /// `construct name(params) { ... }`
    Constructor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub kind: MethodKind,
    pub params: Vec<String>,
    pub is_static: bool,
    pub is_foreign: bool,
    /// `None` for foreign methods, which have no script body.
    pub body: Option<Vec<Stmt>>,
    pub span: Span,
}

impl MethodDecl {
    /// The signature the method is looked up by, e.g. `add(_,_)` or
    /// `count`. Constructors use their name, so `construct new()` is
    /// `new()` on the class.
    pub fn signature(&self) -> String {
        match self.kind {
            MethodKind::Getter => self.name.clone(),
            MethodKind::Method | MethodKind::Constructor => {
                call_signature(&self.name, Some(self.params.len()))
            }
        }
    }
}

/// Build a call signature from a name and an argument count; `None` is a
/// getter.
pub fn call_signature(name: &str, arity: Option<usize>) -> String {
    match arity {
        None => name.to_string(),
        Some(n) => {
            let holes = vec!["_"; n].join(",");
            format!("{name}({holes})")
        }
    }
}
