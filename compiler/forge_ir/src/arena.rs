//! Index-based AST node storage.
//!
//! All expression and statement nodes of one program live in a single
//! [`AstArena`]; children reference each other through `ExprId` / `StmtId`
//! indices. This keeps nodes contiguous and makes the back end's traversal
//! a matter of index lookups rather than pointer chasing.

use crate::ast::{Expr, Stmt};

/// Handle to an expression node in an [`AstArena`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ExprId(u32);

/// Handle to a statement node in an [`AstArena`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct StmtId(u32);

impl ExprId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl StmtId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena holding every AST node of one program.
#[derive(Default, Debug)]
pub struct AstArena {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
}

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an expression node, returning its handle.
    ///
    /// # Panics
    /// Panics if more than `u32::MAX` expressions are allocated.
    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        let id = u32::try_from(self.exprs.len()).unwrap_or_else(|_| {
            panic!("expression arena overflow: more than u32::MAX nodes")
        });
        self.exprs.push(expr);
        ExprId(id)
    }

    /// Allocate a statement node, returning its handle.
    ///
    /// # Panics
    /// Panics if more than `u32::MAX` statements are allocated.
    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = u32::try_from(self.stmts.len()).unwrap_or_else(|_| {
            panic!("statement arena overflow: more than u32::MAX nodes")
        });
        self.stmts.push(stmt);
        StmtId(id)
    }

    /// Look up an expression node.
    #[inline]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// Look up a statement node.
    #[inline]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }
}
