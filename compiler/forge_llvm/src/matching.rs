//! `when` pattern matching.
//!
//! Two modes share one skeleton: every clause gets a then-label and (all
//! but the last) a next-label, allocated up front. Standalone clauses
//! carry boolean guards; subject-based clauses compare the once-evaluated
//! subject against literals, bind it to a name, or match unconditionally.
//!
//! A bare-expression clause body inside a value-returning function lowers
//! straight to `ret`. If no clause leaves a fall-through path, the end
//! label is terminated with `unreachable`.

use forge_diagnostic::{CodegenError, CodegenResult};
use forge_ir::{BinaryOp, ExprId, Span, WhenBody, WhenClause, WhenPattern};

use crate::context::Value;
use crate::module::ModuleGenerator;
use crate::scope::{Binding, FnState};

impl<'a> ModuleGenerator<'a> {
    pub(crate) fn lower_when(
        &mut self,
        fx: &mut FnState<'a>,
        subject: Option<ExprId>,
        clauses: &[WhenClause],
        span: Span,
    ) -> CodegenResult<()> {
        if clauses.is_empty() {
            return Err(self.invariant(span, "`when` requires at least one clause"));
        }
        let subject = match subject {
            Some(id) => {
                let v = self.lower_expr(fx, id)?;
                Some(self.ensure_primitive(v))
            }
            None => None,
        };

        // Pre-allocate every target label so numbering is monotonic.
        let mut then_labels = Vec::with_capacity(clauses.len());
        let mut next_labels = Vec::with_capacity(clauses.len().saturating_sub(1));
        for i in 0..clauses.len() {
            then_labels.push(self.ctx.fresh_label("when.then"));
            if i + 1 < clauses.len() {
                next_labels.push(self.ctx.fresh_label("when.next"));
            }
        }
        let end_label = self.ctx.fresh_label("when.end");

        let mut falls_through = false;
        for (i, clause) in clauses.iter().enumerate() {
            let then_label = then_labels[i].clone();
            let next_label = next_labels.get(i).cloned();
            let fail_target = next_label.clone().unwrap_or_else(|| end_label.clone());
            let is_last = next_label.is_none();

            let mut bind_name: Option<String> = None;
            match (&clause.pattern, &subject) {
                (WhenPattern::Guard(guard), None) => {
                    let cond = self.lower_expr(fx, *guard)?;
                    let cond = self.ensure_i1(cond, clause.span)?;
                    self.branch_cond(fx, &cond.repr, &then_label, &fail_target);
                    if is_last {
                        // A failing final guard falls through to the end.
                        falls_through = true;
                    }
                }
                (WhenPattern::Wildcard, _) => {
                    self.branch(fx, &then_label);
                }
                (WhenPattern::Literal(lit), Some(subj)) => {
                    let front = subj.info.front_type.clone();
                    let lit_v = self.lower_expr_expecting(fx, *lit, Some(front.as_str()))?;
                    let lit_v = self.ensure_primitive(lit_v);
                    let cond = self.emit_compare(BinaryOp::Eq, subj, &lit_v, clause.span)?;
                    self.branch_cond(fx, &cond.repr, &then_label, &fail_target);
                    if is_last {
                        falls_through = true;
                    }
                }
                (WhenPattern::Binding(name), Some(_)) => {
                    bind_name = Some(name.clone());
                    self.branch(fx, &then_label);
                }
                (WhenPattern::Literal(_) | WhenPattern::Binding(_), None) => {
                    return Err(self.invariant(
                        clause.span,
                        "subject pattern in a standalone `when`",
                    ));
                }
                (WhenPattern::Guard(_), Some(_)) => {
                    return Err(self.invariant(
                        clause.span,
                        "boolean guard in a subject `when`",
                    ));
                }
            }

            self.start_block(fx, &then_label);
            let saved = fx.enter_block();
            if let (Some(name), Some(subj)) = (&bind_name, &subject) {
                // Bind the subject to a freshly allocated slot under the
                // clause's name.
                let front = subj.info.front_type.clone();
                let llvm = self.llvm_type_for(&front, clause.span)?;
                let slot = fx.slot_name(name);
                self.ctx.emit(&format!("{slot} = alloca {llvm}"));
                let wrapped = self.wrap_into(subj.clone(), &front, clause.span)?;
                self.ctx
                    .emit(&format!("store {llvm} {}, ptr {slot}", wrapped.repr));
                fx.vars.insert(
                    name.clone(),
                    Binding::Slot {
                        ptr: slot,
                        llvm_type: llvm,
                        front_type: front,
                    },
                );
            }
            let body_result = self.lower_when_body(fx, &clause.body, clause.span);
            fx.exit_block(saved);
            body_result?;
            if !fx.block_terminated {
                falls_through = true;
            }
            self.branch(fx, &end_label);

            if let Some(next) = &next_label {
                self.start_block(fx, next);
            }
        }

        self.start_block(fx, &end_label);
        if !falls_through {
            self.ctx.emit("unreachable");
            fx.block_terminated = true;
        }
        Ok(())
    }

    /// Clause body: a bare expression in a value-returning function
    /// becomes a coerced `ret`; otherwise the body lowers normally.
    fn lower_when_body(
        &mut self,
        fx: &mut FnState<'a>,
        body: &WhenBody,
        span: Span,
    ) -> CodegenResult<()> {
        match body {
            WhenBody::Expr(e) => {
                if fx.return_llvm == "void" {
                    self.lower_expr(fx, *e)?;
                    return Ok(());
                }
                let return_front = fx.return_front.clone();
                let v = self.lower_expr_expecting(fx, *e, return_front.as_deref())?;
                let return_llvm = fx.return_llvm.clone();
                let v: Value = if v.info.llvm_type == return_llvm || return_llvm == "ptr" {
                    v
                } else if let Some(front) = &return_front {
                    self.wrap_into(v, front, span)?
                } else {
                    v
                };
                self.emit_ret(fx, Some(&v));
                Ok(())
            }
            WhenBody::Block(stmts) => self.lower_stmts(fx, stmts),
        }
    }
}
