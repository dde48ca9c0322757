//! Statement lowering.
//!
//! Every terminator sets the block-termination flag, and statements after
//! a terminator in the same block are skipped: a basic block ends with
//! exactly one terminator. Labels for each construct are allocated up
//! front so numbering stays monotonic in emission order.

use forge_diagnostic::{CodegenError, CodegenResult};
use forge_ir::{ExprId, ExprKind, Span, StmtId, StmtKind};

use crate::context::Value;
use crate::module::ModuleGenerator;
use crate::scope::{Binding, FnState};

impl<'a> ModuleGenerator<'a> {
    pub(crate) fn lower_stmt(&mut self, fx: &mut FnState<'a>, id: StmtId) -> CodegenResult<()> {
        // Nothing may follow a terminator inside a block.
        if fx.block_terminated {
            return Ok(());
        }
        let arena = fx.arena;
        let stmt = arena.stmt(id);
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Let { name, ty, value } => self.lower_let(fx, name, ty.as_deref(), *value, span),
            StmtKind::Assign { target, value } => self.lower_assign(fx, *target, *value, span),
            StmtKind::Expr(e) => {
                self.lower_expr(fx, *e)?;
                Ok(())
            }
            StmtKind::If {
                condition,
                then_block,
                else_block,
            } => self.lower_if(fx, *condition, then_block, else_block.as_deref(), span),
            StmtKind::While { condition, body } => self.lower_while(fx, *condition, body, span),
            StmtKind::For {
                binding,
                range,
                body,
            } => self.lower_for(fx, binding, *range, body, span),
            StmtKind::Return(value) => self.lower_return(fx, *value, span),
            StmtKind::Throw(e) => self.lower_throw(fx, *e, span),
            StmtKind::Absent => self.lower_absent(fx, span),
            StmtKind::Pass => {
                self.ctx.emit("; pass");
                Ok(())
            }
            StmtKind::When { subject, clauses } => self.lower_when(fx, *subject, clauses, span),
            StmtKind::Block(stmts) => {
                let saved = fx.enter_block();
                let result = self.lower_stmts(fx, stmts);
                fx.exit_block(saved);
                result
            }
        }
    }

    pub(crate) fn lower_stmts(
        &mut self,
        fx: &mut FnState<'a>,
        stmts: &[StmtId],
    ) -> CodegenResult<()> {
        for &stmt in stmts {
            self.lower_stmt(fx, stmt)?;
        }
        Ok(())
    }

    fn lower_let(
        &mut self,
        fx: &mut FnState<'a>,
        name: &str,
        ty: Option<&str>,
        value: ExprId,
        span: Span,
    ) -> CodegenResult<()> {
        let declared = ty.map(|t| fx.subst_type(t));
        let v = self.lower_expr_expecting(fx, value, declared.as_deref())?;
        let front = declared.unwrap_or_else(|| v.info.front_type.clone());
        let llvm = self.llvm_type_for(&front, span)?;

        let slot = fx.slot_name(name);
        self.ctx.emit(&format!("{slot} = alloca {llvm}"));
        let v = if llvm == "ptr" {
            v
        } else {
            self.wrap_into(v, &front, span)?
        };
        self.ctx
            .emit(&format!("store {llvm} {}, ptr {slot}", v.repr));
        fx.vars.insert(
            name.to_string(),
            Binding::Slot {
                ptr: slot,
                llvm_type: llvm,
                front_type: front,
            },
        );
        Ok(())
    }

    fn lower_assign(
        &mut self,
        fx: &mut FnState<'a>,
        target: ExprId,
        value: ExprId,
        span: Span,
    ) -> CodegenResult<()> {
        let (ptr, llvm, front) = self.lvalue_ptr(fx, target)?;
        let v = self.lower_expr_expecting(fx, value, Some(front.as_str()))?;
        let v = if llvm == "ptr" {
            v
        } else {
            self.wrap_into(v, &front, span)?
        };
        self.ctx.emit(&format!("store {llvm} {}, ptr {ptr}", v.repr));
        Ok(())
    }

    fn lower_if(
        &mut self,
        fx: &mut FnState<'a>,
        condition: ExprId,
        then_block: &[StmtId],
        else_block: Option<&[StmtId]>,
        span: Span,
    ) -> CodegenResult<()> {
        let cond = self.lower_expr(fx, condition)?;
        let cond = self.ensure_i1(cond, span)?;

        // All target labels allocated up front.
        let then_label = self.ctx.fresh_label("if.then");
        let else_label = else_block.map(|_| self.ctx.fresh_label("if.else"));
        let end_label = self.ctx.fresh_label("if.end");

        let false_target = else_label.as_deref().unwrap_or(end_label.as_str());
        self.branch_cond(fx, &cond.repr, &then_label, false_target);

        self.start_block(fx, &then_label);
        let saved = fx.enter_block();
        self.lower_stmts(fx, then_block)?;
        fx.exit_block(saved);
        self.branch(fx, &end_label);

        if let (Some(else_label), Some(else_stmts)) = (&else_label, else_block) {
            self.start_block(fx, else_label);
            let saved = fx.enter_block();
            self.lower_stmts(fx, else_stmts)?;
            fx.exit_block(saved);
            self.branch(fx, &end_label);
        }

        self.start_block(fx, &end_label);
        Ok(())
    }

    fn lower_while(
        &mut self,
        fx: &mut FnState<'a>,
        condition: ExprId,
        body: &[StmtId],
        span: Span,
    ) -> CodegenResult<()> {
        let cond_label = self.ctx.fresh_label("while.cond");
        let body_label = self.ctx.fresh_label("while.body");
        let end_label = self.ctx.fresh_label("while.end");

        self.branch(fx, &cond_label);
        self.start_block(fx, &cond_label);
        let cond = self.lower_expr(fx, condition)?;
        let cond = self.ensure_i1(cond, span)?;
        self.branch_cond(fx, &cond.repr, &body_label, &end_label);

        self.start_block(fx, &body_label);
        let saved = fx.enter_block();
        self.lower_stmts(fx, body)?;
        fx.exit_block(saved);
        self.branch(fx, &cond_label);

        self.start_block(fx, &end_label);
        Ok(())
    }

    /// Range-based loop: evaluate both bounds once, keep the induction
    /// variable in a slot, step by one.
    fn lower_for(
        &mut self,
        fx: &mut FnState<'a>,
        binding: &str,
        range: ExprId,
        body: &[StmtId],
        span: Span,
    ) -> CodegenResult<()> {
        let arena = fx.arena;
        let (start, end, inclusive) = match &arena.expr(range).kind {
            ExprKind::Range {
                start,
                end,
                inclusive,
            } => (*start, *end, *inclusive),
            _ => {
                return Err(CodegenError::unsupported(
                    self.location(span),
                    "`for` requires a range bound",
                ))
            }
        };

        let start_v = self.lower_expr(fx, start)?;
        let front = start_v.info.front_type.clone();
        let end_v = self.lower_expr_expecting(fx, end, Some(front.as_str()))?;
        let llvm = self.llvm_type_for(&front, span)?;
        let Some(prim) = self.ctx.primitive_for_wrapper(&llvm) else {
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!("`{front}` cannot drive a `for` range"),
            ));
        };
        let unsigned = start_v.info.is_unsigned;

        let end_prim = self.ensure_primitive(end_v);
        let end_prim = self.coerce_primitive(end_prim, &prim);

        let slot = fx.slot_name(binding);
        self.ctx.emit(&format!("{slot} = alloca {llvm}"));
        let start_w = self.wrap_into(start_v, &front, span)?;
        self.ctx
            .emit(&format!("store {llvm} {}, ptr {slot}", start_w.repr));

        let cond_label = self.ctx.fresh_label("for.cond");
        let body_label = self.ctx.fresh_label("for.body");
        let step_label = self.ctx.fresh_label("for.step");
        let end_label = self.ctx.fresh_label("for.end");

        self.branch(fx, &cond_label);
        self.start_block(fx, &cond_label);
        let current = self.load_from(&slot, &llvm, &front);
        let current = self.ensure_primitive(current);
        let pred = match (inclusive, unsigned) {
            (true, true) => "ule",
            (true, false) => "sle",
            (false, true) => "ult",
            (false, false) => "slt",
        };
        let cmp = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{cmp} = icmp {pred} {prim} {}, {}",
            current.repr, end_prim.repr
        ));
        self.branch_cond(fx, &cmp, &body_label, &end_label);

        self.start_block(fx, &body_label);
        let saved = fx.enter_block();
        fx.vars.insert(
            binding.to_string(),
            Binding::Slot {
                ptr: slot.clone(),
                llvm_type: llvm.clone(),
                front_type: front.clone(),
            },
        );
        self.lower_stmts(fx, body)?;
        fx.exit_block(saved);
        self.branch(fx, &step_label);

        self.start_block(fx, &step_label);
        let current = self.load_from(&slot, &llvm, &front);
        let current = self.ensure_primitive(current);
        let next = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{next} = add {prim} {}, 1",
            current.repr
        ));
        let next_info = current.info.clone();
        self.ctx.record_value(&next, next_info.clone());
        let wrapped = self.wrap_into(Value::new(next, next_info), &front, span)?;
        self.ctx
            .emit(&format!("store {llvm} {}, ptr {slot}", wrapped.repr));
        self.branch(fx, &cond_label);

        self.start_block(fx, &end_label);
        Ok(())
    }

    fn lower_return(
        &mut self,
        fx: &mut FnState<'a>,
        value: Option<ExprId>,
        span: Span,
    ) -> CodegenResult<()> {
        match value {
            None => {
                self.emit_ret(fx, None);
                Ok(())
            }
            Some(e) => {
                let return_front = fx.return_front.clone();
                let v = self.lower_expr_expecting(fx, e, return_front.as_deref())?;
                let return_llvm = fx.return_llvm.clone();
                let v = if v.info.llvm_type == return_llvm || return_llvm == "ptr" {
                    v
                } else if let Some(front) = &return_front {
                    self.wrap_into(v, front, span)?
                } else {
                    v
                };
                self.emit_ret(fx, Some(&v));
                Ok(())
            }
        }
    }
}
