//! Typed AST for the Forge compiler.
//!
//! This crate defines the nodes the back end consumes: expressions and
//! statements stored in an index-based [`AstArena`], declarations, operator
//! enums, and source [`Span`]s. Semantic analysis runs before code
//! generation and attaches resolved front-language type names to expression
//! nodes where it can; the back end performs local inference as a fallback.
//!
//! # Design Notes
//! - No `Box<Expr>`: children are `ExprId(u32)` / `StmtId(u32)` indices into
//!   the owning program's arena.
//! - Type names are plain strings (`"u32"`, `"Point"`, `"Stack<u64>"`); the
//!   back end reasons over names for mapping, mangling, and method lookup.

pub mod arena;
pub mod ast;
pub mod span;

pub use arena::{AstArena, ExprId, StmtId};
pub use ast::{
    BinaryOp, CallArg, Decl, Expr, ExprKind, ExternalDecl, FieldDecl, FunctionDecl,
    ImportDecl, ImportedModule, ImportedModules, OverflowBehavior, Param, PresetDecl,
    Program, RecordDecl, RecordKind, Stmt, StmtKind, UnaryOp, WhenBody, WhenClause,
    WhenPattern,
};
pub use span::Span;
