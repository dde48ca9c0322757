//! Binary and comparison operator lowering.
//!
//! Operator selection keys off the left operand: its signedness picks the
//! signed/unsigned instruction and its float-ness the `f*` family. The
//! right operand is coerced to the left's width first. Arithmetic results
//! are rewrapped into the left operand's wrapper; comparisons stay bare
//! `i1`.

use forge_diagnostic::{CodegenError, CodegenResult};
use forge_ir::{BinaryOp, ExprId, OverflowBehavior, Span};

use crate::context::{Value, ValueInfo};
use crate::module::ModuleGenerator;
use crate::scope::FnState;
use crate::types::{self, TypeKind};

impl<'a> ModuleGenerator<'a> {
    pub(crate) fn lower_binary(
        &mut self,
        fx: &mut FnState<'a>,
        op: BinaryOp,
        overflow: OverflowBehavior,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    ) -> CodegenResult<Value> {
        if op.is_short_circuit() {
            return self.lower_short_circuit(fx, op, lhs, rhs, span);
        }
        // Left shift has no overflow variants; a checked shift would need
        // a Maybe-returning form the engine refuses rather than silently
        // wrapping.
        if op == BinaryOp::Shl && overflow != OverflowBehavior::Default {
            return Err(CodegenError::unsupported(
                self.location(span),
                "overflow-variant left shift is not supported",
            ));
        }

        // An unannotated literal on the left takes its type from the
        // right operand's annotation.
        let lhs_hint = fx.arena.expr(rhs).resolved_type.clone();
        let lhs_v = self.lower_expr_expecting(fx, lhs, lhs_hint.as_deref())?;
        let front = lhs_v.info.front_type.clone();
        let rhs_v = self.lower_expr_expecting(fx, rhs, Some(front.as_str()))?;

        let l = self.ensure_primitive(lhs_v);
        let r = self.ensure_primitive(rhs_v);
        let prim = l.info.llvm_type.clone();
        let r = self.coerce_operand(r, &prim);

        if op.is_comparison() {
            return self.emit_compare(op, &l, &r, span);
        }

        if l.info.is_float {
            let instr = match op {
                BinaryOp::Add => "fadd",
                BinaryOp::Sub => "fsub",
                BinaryOp::Mul => "fmul",
                BinaryOp::Div => "fdiv",
                BinaryOp::Rem => "frem",
                _ => {
                    return Err(CodegenError::unsupported(
                        self.location(span),
                        format!("`{}` is not defined on floats", op.symbol()),
                    ))
                }
            };
            let tmp = self.ctx.fresh_temp();
            self.ctx
                .emit(&format!("{tmp} = {instr} {prim} {}, {}", l.repr, r.repr));
            let info = l.info.clone();
            self.ctx.record_value(&tmp, info.clone());
            return self.wrap_into(Value::new(tmp, info), &front, span);
        }

        let unsigned = l.info.is_unsigned;
        let result = match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
                self.lower_overflow_arith(fx, op, overflow, &l, &r, &prim, span)?
            }
            BinaryOp::Div | BinaryOp::FloorDiv => {
                self.plain_arith(if unsigned { "udiv" } else { "sdiv" }, &l, &r, &prim)
            }
            BinaryOp::Rem => self.plain_arith(if unsigned { "urem" } else { "srem" }, &l, &r, &prim),
            BinaryOp::BitAnd => self.plain_arith("and", &l, &r, &prim),
            BinaryOp::BitOr => self.plain_arith("or", &l, &r, &prim),
            BinaryOp::BitXor => self.plain_arith("xor", &l, &r, &prim),
            BinaryOp::Shl => self.plain_arith("shl", &l, &r, &prim),
            BinaryOp::Shr => {
                self.plain_arith(if unsigned { "lshr" } else { "ashr" }, &l, &r, &prim)
            }
            BinaryOp::LShr => self.plain_arith("lshr", &l, &r, &prim),
            BinaryOp::And | BinaryOp::Or => {
                return Err(self.invariant(span, "short-circuit operator fell through"))
            }
            _ => {
                return Err(self.invariant(span, "comparison operator fell through"));
            }
        };
        self.wrap_into(result, &front, span)
    }

    /// Coerce the right operand to the operation primitive.
    fn coerce_operand(&mut self, value: Value, prim: &str) -> Value {
        if value.info.llvm_type == prim {
            return value;
        }
        self.coerce_primitive(value, prim)
    }

    fn plain_arith(&mut self, instr: &str, l: &Value, r: &Value, prim: &str) -> Value {
        let tmp = self.ctx.fresh_temp();
        self.ctx
            .emit(&format!("{tmp} = {instr} {prim} {}, {}", l.repr, r.repr));
        let info = l.info.clone();
        self.ctx.record_value(&tmp, info.clone());
        Value::new(tmp, info)
    }

    /// `+`/`-`/`*` in their four flavors. Wrap and unchecked are the plain
    /// two's-complement instruction; saturate clamps; checked traps.
    fn lower_overflow_arith(
        &mut self,
        fx: &mut FnState<'a>,
        op: BinaryOp,
        overflow: OverflowBehavior,
        l: &Value,
        r: &Value,
        prim: &str,
        span: Span,
    ) -> CodegenResult<Value> {
        let unsigned = l.info.is_unsigned;
        let plain = match op {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            _ => "mul",
        };
        match overflow {
            OverflowBehavior::Default | OverflowBehavior::Wrap | OverflowBehavior::Unchecked => {
                Ok(self.plain_arith(plain, l, r, prim))
            }
            OverflowBehavior::Saturate => match op {
                BinaryOp::Add | BinaryOp::Sub => {
                    let base = match (op, unsigned) {
                        (BinaryOp::Add, false) => "sadd",
                        (BinaryOp::Add, true) => "uadd",
                        (_, false) => "ssub",
                        (_, true) => "usub",
                    };
                    let intrinsic = format!("llvm.{base}.sat.{prim}");
                    self.ctx.declare_external(&format!(
                        "declare {prim} @{intrinsic}({prim}, {prim})"
                    ));
                    let tmp = self.ctx.fresh_temp();
                    self.ctx.emit(&format!(
                        "{tmp} = call {prim} @{intrinsic}({prim} {}, {prim} {})",
                        l.repr, r.repr
                    ));
                    let info = l.info.clone();
                    self.ctx.record_value(&tmp, info.clone());
                    Ok(Value::new(tmp, info))
                }
                _ => Ok(self.saturating_mul(l, r, prim)),
            },
            OverflowBehavior::Checked => {
                let base = match (op, unsigned) {
                    (BinaryOp::Add, false) => "sadd",
                    (BinaryOp::Add, true) => "uadd",
                    (BinaryOp::Sub, false) => "ssub",
                    (BinaryOp::Sub, true) => "usub",
                    (_, false) => "smul",
                    (_, true) => "umul",
                };
                self.checked_arith(fx, base, l, r, prim, span)
            }
        }
    }

    /// Multiplication has no saturation intrinsic: use the overflow
    /// intrinsic and select the clamp value on the flag. Signed picks the
    /// min/max by the sign parity of the operands; unsigned clamps to max.
    fn saturating_mul(&mut self, l: &Value, r: &Value, prim: &str) -> Value {
        let unsigned = l.info.is_unsigned;
        let base = if unsigned { "umul" } else { "smul" };
        let intrinsic = format!("llvm.{base}.with.overflow.{prim}");
        self.ctx.declare_external(&format!(
            "declare {{ {prim}, i1 }} @{intrinsic}({prim}, {prim})"
        ));
        let pair = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{pair} = call {{ {prim}, i1 }} @{intrinsic}({prim} {}, {prim} {})",
            l.repr, r.repr
        ));
        let value = self.ctx.fresh_temp();
        self.ctx
            .emit(&format!("{value} = extractvalue {{ {prim}, i1 }} {pair}, 0"));
        let flag = self.ctx.fresh_temp();
        self.ctx
            .emit(&format!("{flag} = extractvalue {{ {prim}, i1 }} {pair}, 1"));

        let bits = types::classify(prim).bits;
        let (min, max) = types::int_min_max(bits, unsigned);
        let clamp = if unsigned {
            max
        } else {
            let sign = self.ctx.fresh_temp();
            self.ctx
                .emit(&format!("{sign} = xor {prim} {}, {}", l.repr, r.repr));
            let negative = self.ctx.fresh_temp();
            self.ctx
                .emit(&format!("{negative} = icmp slt {prim} {sign}, 0"));
            let sat = self.ctx.fresh_temp();
            self.ctx.emit(&format!(
                "{sat} = select i1 {negative}, {prim} {min}, {prim} {max}"
            ));
            sat
        };
        let result = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{result} = select i1 {flag}, {prim} {clamp}, {prim} {value}"
        ));
        let info = l.info.clone();
        self.ctx.record_value(&result, info.clone());
        Value::new(result, info)
    }

    /// `*.with.overflow` plus a trap block that calls the crash runtime
    /// with the fixed overflow message and never returns.
    fn checked_arith(
        &mut self,
        fx: &mut FnState<'a>,
        base: &str,
        l: &Value,
        r: &Value,
        prim: &str,
        _span: Span,
    ) -> CodegenResult<Value> {
        let intrinsic = format!("llvm.{base}.with.overflow.{prim}");
        self.ctx.declare_external(&format!(
            "declare {{ {prim}, i1 }} @{intrinsic}({prim}, {prim})"
        ));
        let pair = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{pair} = call {{ {prim}, i1 }} @{intrinsic}({prim} {}, {prim} {})",
            l.repr, r.repr
        ));
        let value = self.ctx.fresh_temp();
        self.ctx
            .emit(&format!("{value} = extractvalue {{ {prim}, i1 }} {pair}, 0"));
        let flag = self.ctx.fresh_temp();
        self.ctx
            .emit(&format!("{flag} = extractvalue {{ {prim}, i1 }} {pair}, 1"));

        let trap = self.ctx.fresh_label("ovf.trap");
        let cont = self.ctx.fresh_label("ovf.cont");
        self.branch_cond(fx, &flag, &trap, &cont);
        self.start_block(fx, &trap);
        self.ctx
            .emit("call void @forge_crash_overflow(ptr @.msg.overflow)");
        self.ctx.emit("unreachable");
        fx.block_terminated = true;
        self.start_block(fx, &cont);

        let info = l.info.clone();
        self.ctx.record_value(&value, info.clone());
        Ok(Value::new(value, info))
    }

    /// Comparison to a bare `i1`; never rewrapped.
    pub(crate) fn emit_compare(
        &mut self,
        op: BinaryOp,
        l: &Value,
        r: &Value,
        span: Span,
    ) -> CodegenResult<Value> {
        let prim = &l.info.llvm_type;
        let tmp = self.ctx.fresh_temp();
        if l.info.is_float {
            let pred = match op {
                BinaryOp::Eq => "oeq",
                BinaryOp::Ne => "one",
                BinaryOp::Lt => "olt",
                BinaryOp::Le => "ole",
                BinaryOp::Gt => "ogt",
                _ => "oge",
            };
            self.ctx.emit(&format!(
                "{tmp} = fcmp {pred} {prim} {}, {}",
                l.repr, r.repr
            ));
        } else {
            if types::classify(prim).kind == TypeKind::Aggregate {
                return Err(CodegenError::type_resolution(
                    self.location(span),
                    format!("`{}` values cannot be compared directly", l.info.front_type),
                ));
            }
            let unsigned = l.info.is_unsigned;
            let pred = match op {
                BinaryOp::Eq => "eq",
                BinaryOp::Ne => "ne",
                BinaryOp::Lt if unsigned => "ult",
                BinaryOp::Lt => "slt",
                BinaryOp::Le if unsigned => "ule",
                BinaryOp::Le => "sle",
                BinaryOp::Gt if unsigned => "ugt",
                BinaryOp::Gt => "sgt",
                _ if unsigned => "uge",
                _ => "sge",
            };
            self.ctx.emit(&format!(
                "{tmp} = icmp {pred} {prim} {}, {}",
                l.repr, r.repr
            ));
        }
        let info = ValueInfo::bool_flag();
        self.ctx.record_value(&tmp, info.clone());
        Ok(Value::new(tmp, info))
    }

    /// `and`/`or` with three blocks and an `i1` phi. The right side only
    /// evaluates when the left doesn't decide the result.
    pub(crate) fn lower_short_circuit(
        &mut self,
        fx: &mut FnState<'a>,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    ) -> CodegenResult<Value> {
        let stem = if op == BinaryOp::And { "and" } else { "or" };
        let lhs_v = self.lower_expr(fx, lhs)?;
        let lhs_flag = self.ensure_i1(lhs_v, span)?;
        let lhs_block = fx.current_block.clone();

        let rhs_label = self.ctx.fresh_label(&format!("{stem}.rhs"));
        let end_label = self.ctx.fresh_label(&format!("{stem}.end"));

        if op == BinaryOp::And {
            self.branch_cond(fx, &lhs_flag.repr, &rhs_label, &end_label);
        } else {
            self.branch_cond(fx, &lhs_flag.repr, &end_label, &rhs_label);
        }

        self.start_block(fx, &rhs_label);
        let rhs_v = self.lower_expr(fx, rhs)?;
        let rhs_flag = self.ensure_i1(rhs_v, span)?;
        let rhs_block = fx.current_block.clone();
        self.branch(fx, &end_label);

        self.start_block(fx, &end_label);
        let short_value = if op == BinaryOp::And { "false" } else { "true" };
        let tmp = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{tmp} = phi i1 [ {short_value}, %{lhs_block} ], [ {}, %{rhs_block} ]",
            rhs_flag.repr
        ));
        let info = ValueInfo::bool_flag();
        self.ctx.record_value(&tmp, info.clone());
        Ok(Value::new(tmp, info))
    }

    /// `a op1 b op2 c`: each operand evaluates exactly once; each pair is
    /// widened to the larger width and compared; the `i1` results fold
    /// with `and`.
    pub(crate) fn lower_chained_compare(
        &mut self,
        fx: &mut FnState<'a>,
        operands: &[ExprId],
        ops: &[BinaryOp],
        span: Span,
    ) -> CodegenResult<Value> {
        if operands.len() != ops.len() + 1 || ops.is_empty() {
            return Err(self.invariant(span, "malformed comparison chain"));
        }
        // Unannotated literal links adopt the chain's annotated type.
        let hint = operands
            .iter()
            .find_map(|&id| fx.arena.expr(id).resolved_type.clone());
        let mut values = Vec::with_capacity(operands.len());
        for &operand in operands {
            let v = self.lower_expr_expecting(fx, operand, hint.as_deref())?;
            values.push(self.ensure_primitive(v));
        }

        let mut acc: Option<Value> = None;
        for (i, &op) in ops.iter().enumerate() {
            let mut l = values[i].clone();
            let mut r = values[i + 1].clone();
            let lb = types::classify(&l.info.llvm_type).bits;
            let rb = types::classify(&r.info.llvm_type).bits;
            if lb < rb {
                let target = r.info.llvm_type.clone();
                l = self.coerce_primitive(l, &target);
            } else if rb < lb {
                let target = l.info.llvm_type.clone();
                r = self.coerce_primitive(r, &target);
            }
            let cmp = self.emit_compare(op, &l, &r, span)?;
            acc = Some(match acc {
                None => cmp,
                Some(prev) => {
                    let tmp = self.ctx.fresh_temp();
                    self.ctx
                        .emit(&format!("{tmp} = and i1 {}, {}", prev.repr, cmp.repr));
                    let info = ValueInfo::bool_flag();
                    self.ctx.record_value(&tmp, info.clone());
                    Value::new(tmp, info)
                }
            });
        }
        acc.ok_or_else(|| self.invariant(span, "empty comparison chain"))
    }

    /// `value ?? fallback`: branch on the validity discriminant, extract
    /// the carried value on success, evaluate the fallback otherwise, and
    /// merge with a phi.
    pub(crate) fn lower_coalesce(
        &mut self,
        fx: &mut FnState<'a>,
        value: ExprId,
        fallback: ExprId,
        span: Span,
    ) -> CodegenResult<Value> {
        let subject = self.lower_expr(fx, value)?;
        // Pointer-carrying wrappers (`text`, address types) coalesce on a
        // null check of their primitive.
        let subject = if subject.info.is_aggregate()
            && self
                .ctx
                .primitive_for_wrapper(&subject.info.llvm_type)
                .as_deref()
                == Some("ptr")
        {
            self.ensure_primitive(subject)
        } else {
            subject
        };

        // Determine the validity flag and the carried value's shape.
        let (ok_flag, carried_llvm, carried_front) = if subject.info.llvm_type == "ptr" {
            let tmp = self.ctx.fresh_temp();
            self.ctx
                .emit(&format!("{tmp} = icmp ne ptr {}, null", subject.repr));
            (
                tmp,
                "ptr".to_string(),
                subject.info.front_type.clone(),
            )
        } else {
            let key = self.layout_key(&subject.info.front_type);
            let Some(layout) = self.ctx.layout(&key) else {
                return Err(CodegenError::type_resolution(
                    self.location(span),
                    format!(
                        "`{}` has no validity discriminant to coalesce on",
                        subject.info.front_type
                    ),
                ));
            };
            if layout.fields.len() < 2 {
                return Err(CodegenError::type_resolution(
                    self.location(span),
                    format!("`{}` carries no value to coalesce", subject.info.front_type),
                ));
            }
            let flag_llvm = layout.fields[0].1.clone();
            let flag_front = layout.front_fields[0].1.clone();
            let carried_llvm = layout.fields[1].1.clone();
            let carried_front = layout.front_fields[1].1.clone();
            let subject_ty = subject.info.llvm_type.clone();

            let raw_flag = self.ctx.fresh_temp();
            self.ctx.emit(&format!(
                "{raw_flag} = extractvalue {subject_ty} {}, 0",
                subject.repr
            ));
            let flag_info = ValueInfo::of_front(flag_front, flag_llvm);
            self.ctx.record_value(&raw_flag, flag_info.clone());
            let flag = self.ensure_primitive(Value::new(raw_flag, flag_info));
            let ok = if flag.info.llvm_type == "i1" {
                flag.repr
            } else {
                // Lookup-style state enums: any nonzero state carries.
                let tmp = self.ctx.fresh_temp();
                self.ctx.emit(&format!(
                    "{tmp} = icmp ne {} {}, 0",
                    flag.info.llvm_type, flag.repr
                ));
                tmp
            };
            (ok, carried_llvm, carried_front)
        };

        let hit = self.ctx.fresh_label("coalesce.hit");
        let miss = self.ctx.fresh_label("coalesce.miss");
        let end = self.ctx.fresh_label("coalesce.end");
        self.branch_cond(fx, &ok_flag, &hit, &miss);

        self.start_block(fx, &hit);
        let carried = if subject.info.llvm_type == "ptr" {
            subject.repr.clone()
        } else {
            let tmp = self.ctx.fresh_temp();
            self.ctx.emit(&format!(
                "{tmp} = extractvalue {} {}, 1",
                subject.info.llvm_type, subject.repr
            ));
            tmp
        };
        let hit_block = fx.current_block.clone();
        self.branch(fx, &end);

        self.start_block(fx, &miss);
        let fallback_v = self.lower_expr_expecting(fx, fallback, Some(carried_front.as_str()))?;
        let fallback_v = if fallback_v.info.llvm_type == carried_llvm {
            fallback_v
        } else if carried_llvm == "ptr" {
            // Pointer-carrying wrappers merge on the raw pointer.
            self.ensure_primitive(fallback_v)
        } else {
            self.wrap_into(fallback_v, &carried_front, span)?
        };
        let miss_block = fx.current_block.clone();
        self.branch(fx, &end);

        self.start_block(fx, &end);
        let tmp = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{tmp} = phi {carried_llvm} [ {carried}, %{hit_block} ], [ {}, %{miss_block} ]",
            fallback_v.repr
        ));
        let info = if carried_llvm == "ptr" {
            ValueInfo {
                llvm_type: carried_llvm,
                is_unsigned: false,
                is_float: false,
                front_type: carried_front,
            }
        } else {
            ValueInfo::of_front(carried_front, carried_llvm)
        };
        self.ctx.record_value(&tmp, info.clone());
        Ok(Value::new(tmp, info))
    }
}
