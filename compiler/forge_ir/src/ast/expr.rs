//! Expression nodes.

use crate::arena::ExprId;
use crate::span::Span;

use super::operators::{BinaryOp, OverflowBehavior, UnaryOp};

/// Expression node.
///
/// `resolved_type` is the front-language type name attached by semantic
/// analysis where available (`"u32"`, `"Point"`, `"Stack<u64>"`). The back
/// end treats it as the primary annotation and falls back to local
/// inference when it is absent.
#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub resolved_type: Option<String>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span, resolved_type: impl Into<String>) -> Self {
        Expr {
            kind,
            span,
            resolved_type: Some(resolved_type.into()),
        }
    }

    /// An expression with no type annotation; the back end infers locally.
    pub fn untyped(kind: ExprKind, span: Span) -> Self {
        Expr {
            kind,
            span,
            resolved_type: None,
        }
    }
}

/// A call argument, optionally named.
///
/// Record and crashable constructors use named arguments
/// (`Point(x: 1, y: 2)`); plain calls leave `name` empty.
#[derive(Clone, Debug)]
pub struct CallArg {
    pub name: Option<String>,
    pub value: ExprId,
}

impl CallArg {
    pub fn positional(value: ExprId) -> Self {
        CallArg { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: ExprId) -> Self {
        CallArg {
            name: Some(name.into()),
            value,
        }
    }
}

/// Expression variants.
#[derive(Clone, Debug)]
pub enum ExprKind {
    /// Integer literal: `42`, `1_000`. Wide enough for every integer type
    /// up to 128 bits.
    Int(i128),

    /// Float literal: `3.14`, `2.5e-8`.
    Float(f64),

    /// Boolean literal.
    Bool(bool),

    /// Text literal (pooled by the back end).
    Text(String),

    /// Codepoint literal: `'a'`.
    Letter(char),

    /// Variable or parameter reference.
    Ident(String),

    /// Binary operation with an overflow flavor for `+`/`-`/`*`.
    Binary {
        op: BinaryOp,
        overflow: OverflowBehavior,
        lhs: ExprId,
        rhs: ExprId,
    },

    /// Unary operation.
    Unary { op: UnaryOp, operand: ExprId },

    /// Chained comparison: `a op1 b op2 c`, middle operands evaluated once.
    ChainedCompare {
        operands: Vec<ExprId>,
        ops: Vec<BinaryOp>,
    },

    /// Call through a name: functions, constructors, casts, intrinsics.
    /// The resolver decides which, in priority order.
    Call {
        callee: String,
        generic_args: Vec<String>,
        args: Vec<CallArg>,
    },

    /// Method call on a typed receiver.
    MethodCall {
        receiver: ExprId,
        method: String,
        args: Vec<CallArg>,
    },

    /// Field access: `point.x`.
    Member { object: ExprId, field: String },

    /// Index access: `xs[i]`.
    Index { object: ExprId, index: ExprId },

    /// Ternary conditional, lowered to `select` (no branch blocks).
    Conditional {
        condition: ExprId,
        then_value: ExprId,
        else_value: ExprId,
    },

    /// None-coalesce: `value ?? fallback`.
    Coalesce { value: ExprId, fallback: ExprId },

    /// Range: `a..b` / `a..=b`.
    Range {
        start: ExprId,
        end: ExprId,
        inclusive: bool,
    },
}
