//! Statement AST nodes.

use crate::expr::{BinOp, Expr};
use crate::types::TypeDesc;
use crate::Span;

/// A statement in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The kind of statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Variable declaration. `mutable` is false for `const` bindings.
    Let {
        name: String,
        ty: Option<TypeDesc>,
        init: Option<Expr>,
        mutable: bool,
    },
    /// Assignment; `op` carries the compound operator when present.
    Assign {
        target: Expr,
        op: Option<BinOp>,
        value: Expr,
    },
    /// Expression statement
    Expr(Expr),
    /// Return statement
    Return(Option<Expr>),
    /// Bare block
    Block(Vec<Stmt>),
    /// If statement. Else-if chains nest as a single `If` inside
    /// `else_block`.
    If {
        cond: Expr,
        then_block: Vec<Stmt>,
        else_block: Option<Vec<Stmt>>,
    },
    /// While loop
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    /// C-style for loop
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    /// For-in loop
    ForIn {
        var: String,
        var_ty: Option<TypeDesc>,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    /// Match statement
    Match {
        scrutinee: Expr,
        arms: Vec<MatchArm>,
    },
    Break,
    Continue,
    /// Try with optional catch and finally blocks
    Try {
        body: Vec<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Throw(Expr),
}

/// One arm of a match statement.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Vec<Stmt>,
}

/// A catch clause: `catch (e) { ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub binding: Option<String>,
    pub body: Vec<Stmt>,
}

/// A pattern in a match arm.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Wildcard `_`
    Wildcard,
    /// Binding `name`
    Ident(String),
    /// Literal pattern
    Literal(Box<Expr>),
    /// Constructor pattern `Name(subpatterns...)` or `Enum.Variant(...)`
    Constructor {
        path: Vec<String>,
        fields: Vec<Pattern>,
    },
}
