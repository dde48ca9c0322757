//! Operator enums.

use std::fmt;

/// Binary operators.
///
/// Arithmetic selection in the back end depends on the left operand's
/// signedness and float-ness; the overflow flavor rides separately on the
/// `Binary` expression node as [`OverflowBehavior`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` true division
    Div,
    /// `//` floor division
    FloorDiv,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `and` short-circuit
    And,
    /// `or` short-circuit
    Or,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>` arithmetic shift right
    Shr,
    /// `>>>` logical shift right
    LShr,
}

impl BinaryOp {
    /// Comparison operators produce a bare `i1` rather than a wrapper.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// Operators eligible for overflow flavors (`+^`, `-?`, `*%`, ...).
    pub fn has_overflow_variants(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul)
    }

    /// Short-circuit logical operators.
    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Surface syntax, for diagnostics.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::LShr => ">>>",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Overflow flavor for `+`, `-`, `*`.
///
/// `Default` and `Unchecked` both wrap (two's complement); `Checked` traps
/// at runtime through the crash entry point; `Saturate` clamps to the type's
/// extremes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum OverflowBehavior {
    #[default]
    Default,
    /// `+%` explicit wrap
    Wrap,
    /// `+^` saturate
    Saturate,
    /// `+?` trap on overflow
    Checked,
    /// `+!` no trap, wrap
    Unchecked,
}

/// Unary operators.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `not`
    Not,
    /// `~`
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not",
            UnaryOp::BitNot => "~",
        }
    }
}
