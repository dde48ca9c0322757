//! Statement nodes.

use crate::arena::{ExprId, StmtId};
use crate::span::Span;

/// Statement node.
#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Stmt { kind, span }
    }
}

/// Statement variants.
#[derive(Clone, Debug)]
pub enum StmtKind {
    /// Variable declaration: `let x: u32 = e`.
    Let {
        name: String,
        ty: Option<String>,
        value: ExprId,
    },

    /// Assignment. The target is an identifier, member, or index
    /// expression; index targets are rejected by the back end.
    Assign { target: ExprId, value: ExprId },

    /// Expression evaluated for its effects.
    Expr(ExprId),

    /// Conditional.
    If {
        condition: ExprId,
        then_block: Vec<StmtId>,
        else_block: Option<Vec<StmtId>>,
    },

    /// Pre-tested loop.
    While { condition: ExprId, body: Vec<StmtId> },

    /// Range-based loop: `for i in a..b`.
    For {
        binding: String,
        range: ExprId,
        body: Vec<StmtId>,
    },

    /// Return, with an optional value.
    Return(Option<ExprId>),

    /// Raise a crashable error value.
    Throw(ExprId),

    /// `absent` body marker; throws `AbsentValueError` at runtime.
    Absent,

    /// `pass` no-op.
    Pass,

    /// `when` pattern match, standalone (`subject` empty) or subject-based.
    When {
        subject: Option<ExprId>,
        clauses: Vec<WhenClause>,
    },

    /// Nested block scope.
    Block(Vec<StmtId>),
}

/// One clause of a `when`.
#[derive(Clone, Debug)]
pub struct WhenClause {
    pub pattern: WhenPattern,
    pub body: WhenBody,
    pub span: Span,
}

/// Clause pattern.
///
/// Standalone `when` uses `Guard` (a boolean expression) and `Wildcard`;
/// subject-based `when` uses `Literal`, `Binding`, and `Wildcard`.
#[derive(Clone, Debug)]
pub enum WhenPattern {
    /// Compare the subject against a literal.
    Literal(ExprId),
    /// Bind the subject to a fresh name.
    Binding(String),
    /// Default clause.
    Wildcard,
    /// Boolean guard (standalone mode).
    Guard(ExprId),
}

/// Clause body: a bare expression (becomes a return in value functions) or
/// a statement block.
#[derive(Clone, Debug)]
pub enum WhenBody {
    Expr(ExprId),
    Block(Vec<StmtId>),
}
