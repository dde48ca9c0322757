//! Expression lowering.
//!
//! The dispatch walks the arena and returns a [`Value`]: an operand string
//! plus its identity. The wrapper discipline lives here: every primitive
//! is a single-field struct in IR, so values move between wrapper and
//! primitive form through `extractvalue`/`insertvalue`, and a value is
//! only ever stored in wrapper form.

use forge_diagnostic::{CodegenError, CodegenResult};
use forge_ir::{ExprId, ExprKind, Span, UnaryOp};
use tracing::debug;

use crate::context::{Value, ValueInfo};
use crate::generics;
use crate::literals;
use crate::module::{default_literal_front, ModuleGenerator};
use crate::scope::{Binding, FnState};
use crate::types::{self, TypeKind};

impl<'a> ModuleGenerator<'a> {
    /// Lower an expression with no outer type expectation.
    pub(crate) fn lower_expr(&mut self, fx: &mut FnState<'a>, id: ExprId) -> CodegenResult<Value> {
        self.lower_expr_expecting(fx, id, None)
    }

    /// Lower an expression. `expected` is the front-language type the
    /// surrounding context wants, used for untyped literals.
    pub(crate) fn lower_expr_expecting(
        &mut self,
        fx: &mut FnState<'a>,
        id: ExprId,
        expected: Option<&str>,
    ) -> CodegenResult<Value> {
        let arena = fx.arena;
        let expr = arena.expr(id);
        let span = expr.span;
        let annotated = expr
            .resolved_type
            .as_ref()
            .map(|t| fx.subst_type(t))
            .or_else(|| expected.map(|t| fx.subst_type(t)));

        match &expr.kind {
            ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Bool(_)
            | ExprKind::Text(_)
            | ExprKind::Letter(_) => self.lower_literal(&expr.kind, annotated.as_deref(), span),

            ExprKind::Ident(name) => self.lower_ident(fx, name, span),

            ExprKind::Binary {
                op,
                overflow,
                lhs,
                rhs,
            } => self.lower_binary(fx, *op, *overflow, *lhs, *rhs, span),

            ExprKind::Unary { op, operand } => {
                self.lower_unary(fx, *op, *operand, annotated.as_deref(), span)
            }

            ExprKind::ChainedCompare { operands, ops } => {
                self.lower_chained_compare(fx, operands, ops, span)
            }

            ExprKind::Call {
                callee,
                generic_args,
                args,
            } => self.lower_call(fx, callee, generic_args, args, span),

            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.lower_method_call(fx, *receiver, method, args, span),

            ExprKind::Member { object, field } => self.lower_member(fx, *object, field, span),

            ExprKind::Index { object, index } => self.lower_index(fx, *object, *index, span),

            ExprKind::Conditional {
                condition,
                then_value,
                else_value,
            } => self.lower_conditional(fx, *condition, *then_value, *else_value, span),

            ExprKind::Coalesce { value, fallback } => {
                self.lower_coalesce(fx, *value, *fallback, span)
            }

            ExprKind::Range { .. } => Err(CodegenError::unsupported(
                self.location(span),
                "range expressions only appear as `for` loop bounds",
            )),
        }
    }

    // -- literals ------------------------------------------------------------

    fn lower_literal(
        &mut self,
        kind: &ExprKind,
        annotated: Option<&str>,
        span: Span,
    ) -> CodegenResult<Value> {
        let front = annotated
            .map(str::to_string)
            .unwrap_or_else(|| default_literal_front(kind).to_string());

        match kind {
            ExprKind::Int(n) => {
                let prim = self.literal_primitive(&front, span)?;
                if types::classify(&prim).kind == TypeKind::Float {
                    return Ok(Value::new(
                        literals::float_constant(&prim, *n as f64),
                        ValueInfo::of_front(front, prim),
                    ));
                }
                Ok(Value::new(n.to_string(), ValueInfo::of_front(front, prim)))
            }
            ExprKind::Float(v) => {
                let prim = self.literal_primitive(&front, span)?;
                Ok(Value::new(
                    literals::float_constant(&prim, *v),
                    ValueInfo::of_front(front, prim),
                ))
            }
            ExprKind::Bool(b) => Ok(Value::new(b.to_string(), ValueInfo::bool_flag())),
            ExprKind::Text(s) => {
                let global = self.ctx.intern_string(s);
                Ok(Value::new(
                    global,
                    ValueInfo {
                        llvm_type: "ptr".to_string(),
                        is_unsigned: false,
                        is_float: false,
                        front_type: "text".to_string(),
                    },
                ))
            }
            ExprKind::Letter(c) => {
                let prim = self.literal_primitive(&front, span)?;
                Ok(Value::new(
                    u32::from(*c).to_string(),
                    ValueInfo::of_front(front, prim),
                ))
            }
            _ => Err(self.invariant(span, "literal dispatch on non-literal node")),
        }
    }

    /// The primitive a literal of this front type is written in.
    fn literal_primitive(&mut self, front: &str, span: Span) -> CodegenResult<String> {
        let llvm = self.llvm_type_for(front, span)?;
        self.ctx.primitive_for_wrapper(&llvm).ok_or_else(|| {
            CodegenError::type_resolution(
                self.location(span),
                format!("`{front}` cannot carry a literal"),
            )
        })
    }

    // -- identifiers ---------------------------------------------------------

    fn lower_ident(
        &mut self,
        fx: &mut FnState<'a>,
        name: &str,
        span: Span,
    ) -> CodegenResult<Value> {
        if let Some(binding) = fx.vars.get(name).cloned() {
            return Ok(match binding {
                Binding::Param {
                    ssa,
                    llvm_type,
                    front_type,
                } => {
                    // The side table recorded the parameter's identity at
                    // function entry; rebuild only if it is missing.
                    let info = self.ctx.value_info(&ssa).cloned().unwrap_or_else(|| {
                        if llvm_type == "ptr" {
                            ValueInfo {
                                llvm_type,
                                is_unsigned: false,
                                is_float: false,
                                front_type,
                            }
                        } else {
                            ValueInfo::of_front(front_type, llvm_type)
                        }
                    });
                    Value::new(ssa, info)
                }
                Binding::Slot {
                    ptr,
                    llvm_type,
                    front_type,
                } => self.load_from(&ptr, &llvm_type, &front_type),
            });
        }
        if let Some((front, llvm)) = self.presets.get(name).cloned() {
            return Ok(self.load_from(&format!("@{name}"), &llvm, &front));
        }
        Err(CodegenError::type_resolution(
            self.location(span),
            format!("unknown identifier `{name}`"),
        ))
    }

    /// Load a value out of a pointer slot, tracking its identity.
    pub(crate) fn load_from(&mut self, ptr: &str, llvm_type: &str, front: &str) -> Value {
        let tmp = self.ctx.fresh_temp();
        self.ctx
            .emit(&format!("{tmp} = load {llvm_type}, ptr {ptr}"));
        let info = if llvm_type == "ptr" {
            ValueInfo {
                llvm_type: llvm_type.to_string(),
                is_unsigned: false,
                is_float: false,
                front_type: front.to_string(),
            }
        } else {
            ValueInfo::of_front(front, llvm_type)
        };
        self.ctx.record_value(&tmp, info.clone());
        Value::new(tmp, info)
    }

    // -- wrapper discipline --------------------------------------------------

    /// Extract the primitive from a wrapper value. Bare primitives pass
    /// through; multi-field aggregates are returned unchanged.
    pub(crate) fn ensure_primitive(&mut self, value: Value) -> Value {
        if !value.info.is_aggregate() {
            return value;
        }
        let Some(prim) = self.ctx.primitive_for_wrapper(&value.info.llvm_type) else {
            return value;
        };
        let tmp = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{tmp} = extractvalue {} {}, 0",
            value.info.llvm_type, value.repr
        ));
        let info = ValueInfo {
            llvm_type: prim,
            ..value.info
        };
        self.ctx.record_value(&tmp, info.clone());
        Value::new(tmp, info)
    }

    /// Wrap a primitive into the wrapper struct for `front`, resizing the
    /// primitive first when widths differ. Values already in wrapper form
    /// pass through.
    pub(crate) fn wrap_into(
        &mut self,
        value: Value,
        front: &str,
        span: Span,
    ) -> CodegenResult<Value> {
        let wrapper = self.llvm_type_for(front, span)?;
        if value.info.llvm_type == wrapper {
            return Ok(value);
        }
        if wrapper == "ptr" || wrapper == "void" {
            return Ok(value);
        }
        let Some(prim) = self.ctx.primitive_for_wrapper(&wrapper) else {
            // Multi-field target; nothing sensible to wrap.
            return Ok(value);
        };
        let value = self.ensure_primitive(value);
        let value = self.coerce_primitive(value, &prim);
        let tmp = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{tmp} = insertvalue {wrapper} undef, {prim} {}, 0",
            value.repr
        ));
        let info = ValueInfo::of_front(front, wrapper);
        self.ctx.record_value(&tmp, info.clone());
        Ok(Value::new(tmp, info))
    }

    /// Resize a primitive to a target primitive type. Integer extension
    /// follows the source's signedness; floats use `fpext`/`fptrunc`.
    pub(crate) fn coerce_primitive(&mut self, value: Value, target_prim: &str) -> Value {
        if value.info.llvm_type == target_prim {
            return value;
        }
        let from = types::classify(&value.info.llvm_type);
        let to = types::classify(target_prim);
        let op = match (from.kind, to.kind) {
            (TypeKind::Int, TypeKind::Int) => {
                if from.bits > to.bits {
                    "trunc"
                } else if value.info.is_unsigned {
                    "zext"
                } else {
                    "sext"
                }
            }
            (TypeKind::Float, TypeKind::Float) => {
                if from.bits > to.bits {
                    "fptrunc"
                } else {
                    "fpext"
                }
            }
            (TypeKind::Int, TypeKind::Float) => {
                if value.info.is_unsigned {
                    "uitofp"
                } else {
                    "sitofp"
                }
            }
            (TypeKind::Float, TypeKind::Int) => "fptosi",
            _ => return value,
        };
        let tmp = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{tmp} = {op} {} {} to {target_prim}",
            value.info.llvm_type, value.repr
        ));
        let info = ValueInfo {
            llvm_type: target_prim.to_string(),
            ..value.info
        };
        self.ctx.record_value(&tmp, info.clone());
        Value::new(tmp, info)
    }

    /// Reduce a value to a bare `i1` for branching. `%bool` wrappers are
    /// extracted; anything non-boolean is a type error.
    pub(crate) fn ensure_i1(&mut self, value: Value, span: Span) -> CodegenResult<Value> {
        if value.info.llvm_type == "i1" {
            return Ok(value);
        }
        if value.info.llvm_type == "%bool" {
            return Ok(self.ensure_primitive(value));
        }
        Err(CodegenError::type_resolution(
            self.location(span),
            format!(
                "expected a boolean condition, found `{}`",
                value.info.front_type
            ),
        ))
    }

    // -- aggregates ----------------------------------------------------------

    /// Concrete layout-table key for a front type name (`Stack<u64>` →
    /// `Stack_u64`).
    pub(crate) fn layout_key(&self, front: &str) -> String {
        match generics::parse_generic_name(front) {
            Some((base, args)) => generics::mangle(base, &args),
            None => front.to_string(),
        }
    }

    /// Spill a by-value aggregate to a fresh stack slot so `getelementptr`
    /// has a pointer operand.
    pub(crate) fn spill_to_slot(&mut self, value: &Value) -> String {
        let tmp = self.ctx.fresh_temp();
        let ty = &value.info.llvm_type;
        self.ctx.emit(&format!("{tmp} = alloca {ty}"));
        self.ctx
            .emit(&format!("store {ty} {}, ptr {tmp}", value.repr));
        tmp
    }

    fn lower_member(
        &mut self,
        fx: &mut FnState<'a>,
        object: ExprId,
        field: &str,
        span: Span,
    ) -> CodegenResult<Value> {
        let obj = self.lower_expr(fx, object)?;
        let key = self.layout_key(&obj.info.front_type);
        let Some(layout) = self.ctx.layout(&key) else {
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!("`{}` has no field layout", obj.info.front_type),
            ));
        };
        let Some(index) = layout.field_index(field) else {
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!("`{}` has no field `{field}`", obj.info.front_type),
            ));
        };
        let field_llvm = layout.fields[index].1.clone();
        let field_front = layout.front_fields[index].1.clone();
        let type_name = format!("%{}", layout.name);

        let base_ptr = if obj.info.llvm_type == "ptr" {
            obj.repr.clone()
        } else {
            self.spill_to_slot(&obj)
        };
        let ptr = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{ptr} = getelementptr inbounds {type_name}, ptr {base_ptr}, i32 0, i32 {index}"
        ));
        Ok(self.load_from(&ptr, &field_llvm, &field_front))
    }

    /// Byte indexing through a raw pointer domain (`text`, address
    /// wrappers). Anything else has no indexable representation here.
    fn lower_index(
        &mut self,
        fx: &mut FnState<'a>,
        object: ExprId,
        index: ExprId,
        span: Span,
    ) -> CodegenResult<Value> {
        let obj = self.lower_expr(fx, object)?;
        let obj = self.ensure_primitive(obj);
        let idx = self.lower_expr(fx, index)?;
        let idx = self.ensure_primitive(idx);
        let ptr_int = self.ctx.target.ptr_int.clone();
        let idx = self.coerce_primitive(idx, &ptr_int);

        let base = match types::classify(&obj.info.llvm_type).kind {
            TypeKind::Pointer => obj.repr.clone(),
            TypeKind::Int => {
                let tmp = self.ctx.fresh_temp();
                self.ctx.emit(&format!(
                    "{tmp} = inttoptr {} {} to ptr",
                    obj.info.llvm_type, obj.repr
                ));
                tmp
            }
            _ => {
                return Err(CodegenError::unsupported(
                    self.location(span),
                    format!("`{}` is not indexable", obj.info.front_type),
                ))
            }
        };
        let elem_ptr = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{elem_ptr} = getelementptr i8, ptr {base}, {ptr_int} {}",
            idx.repr
        ));
        let raw = self.load_from(&elem_ptr, "i8", "u8");
        self.wrap_into(raw, "u8", span)
    }

    fn lower_conditional(
        &mut self,
        fx: &mut FnState<'a>,
        condition: ExprId,
        then_value: ExprId,
        else_value: ExprId,
        span: Span,
    ) -> CodegenResult<Value> {
        let cond = self.lower_expr(fx, condition)?;
        let cond = self.ensure_i1(cond, span)?;
        let then_v = self.lower_expr(fx, then_value)?;
        let else_v = self.lower_expr_expecting(fx, else_value, Some(then_v.info.front_type.as_str()))?;
        if then_v.info.llvm_type != else_v.info.llvm_type {
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!(
                    "conditional arms disagree: `{}` vs `{}`",
                    then_v.info.front_type, else_v.info.front_type
                ),
            ));
        }
        let tmp = self.ctx.fresh_temp();
        let ty = &then_v.info.llvm_type;
        self.ctx.emit(&format!(
            "{tmp} = select i1 {}, {ty} {}, {ty} {}",
            cond.repr, then_v.repr, else_v.repr
        ));
        self.ctx.record_value(&tmp, then_v.info.clone());
        Ok(Value::new(tmp, then_v.info))
    }

    // -- unary ---------------------------------------------------------------

    fn lower_unary(
        &mut self,
        fx: &mut FnState<'a>,
        op: UnaryOp,
        operand: ExprId,
        annotated: Option<&str>,
        span: Span,
    ) -> CodegenResult<Value> {
        // Negation of a literal folds into a single constant.
        if op == UnaryOp::Neg {
            let arena = fx.arena;
            match &arena.expr(operand).kind {
                ExprKind::Int(n) => {
                    return self.lower_literal(&ExprKind::Int(-n), annotated, span);
                }
                ExprKind::Float(v) => {
                    return self.lower_literal(&ExprKind::Float(-v), annotated, span);
                }
                _ => {}
            }
        }

        let value = self.lower_expr_expecting(fx, operand, annotated)?;
        match op {
            UnaryOp::Neg => {
                let front = value.info.front_type.clone();
                let prim = self.ensure_primitive(value);
                let tmp = self.ctx.fresh_temp();
                if prim.info.is_float {
                    self.ctx.emit(&format!(
                        "{tmp} = fneg {} {}",
                        prim.info.llvm_type, prim.repr
                    ));
                } else {
                    self.ctx.emit(&format!(
                        "{tmp} = sub {} 0, {}",
                        prim.info.llvm_type, prim.repr
                    ));
                }
                let info = ValueInfo {
                    llvm_type: prim.info.llvm_type.clone(),
                    ..prim.info
                };
                self.ctx.record_value(&tmp, info.clone());
                self.wrap_into(Value::new(tmp, info), &front, span)
            }
            UnaryOp::Not => {
                let flag = self.ensure_i1(value, span)?;
                let tmp = self.ctx.fresh_temp();
                self.ctx.emit(&format!("{tmp} = xor i1 {}, true", flag.repr));
                let info = ValueInfo::bool_flag();
                self.ctx.record_value(&tmp, info.clone());
                Ok(Value::new(tmp, info))
            }
            UnaryOp::BitNot => {
                let front = value.info.front_type.clone();
                let prim = self.ensure_primitive(value);
                let tmp = self.ctx.fresh_temp();
                self.ctx.emit(&format!(
                    "{tmp} = xor {} {}, -1",
                    prim.info.llvm_type, prim.repr
                ));
                let info = prim.info.clone();
                self.ctx.record_value(&tmp, info.clone());
                self.wrap_into(Value::new(tmp, info), &front, span)
            }
        }
    }

    // -- lvalues -------------------------------------------------------------

    /// Resolve an assignment target to `(pointer, pointee LLVM type,
    /// front type)`. Index targets are rejected.
    pub(crate) fn lvalue_ptr(
        &mut self,
        fx: &mut FnState<'a>,
        target: ExprId,
    ) -> CodegenResult<(String, String, String)> {
        let arena = fx.arena;
        let expr = arena.expr(target);
        let span = expr.span;
        match &expr.kind {
            ExprKind::Ident(name) => self.ident_slot(fx, name, span),
            ExprKind::Member { object, field } => {
                let (base_ptr, base_llvm, base_front) = self.lvalue_ptr(fx, *object)?;
                let key = self.layout_key(&base_front);
                let Some(layout) = self.ctx.layout(&key) else {
                    return Err(CodegenError::type_resolution(
                        self.location(span),
                        format!("`{base_front}` has no field layout"),
                    ));
                };
                let Some(index) = layout.field_index(field) else {
                    return Err(CodegenError::type_resolution(
                        self.location(span),
                        format!("`{base_front}` has no field `{field}`"),
                    ));
                };
                let field_llvm = layout.fields[index].1.clone();
                let field_front = layout.front_fields[index].1.clone();
                let type_name = format!("%{}", layout.name);

                // Entities store a pointer in the slot; dereference it
                // before indexing into the aggregate.
                let object_ptr = if base_llvm == "ptr" {
                    let tmp = self.ctx.fresh_temp();
                    self.ctx.emit(&format!("{tmp} = load ptr, ptr {base_ptr}"));
                    tmp
                } else {
                    base_ptr
                };
                let ptr = self.ctx.fresh_temp();
                self.ctx.emit(&format!(
                    "{ptr} = getelementptr inbounds {type_name}, ptr {object_ptr}, i32 0, i32 {index}"
                ));
                Ok((ptr, field_llvm, field_front))
            }
            ExprKind::Index { .. } => Err(CodegenError::unsupported(
                self.location(span),
                "index assignment is not supported",
            )),
            _ => Err(CodegenError::unsupported(
                self.location(span),
                "assignment target must be a variable or field",
            )),
        }
    }

    /// Slot pointer for a named variable, materializing parameters on
    /// their first use as an assignment target.
    fn ident_slot(
        &mut self,
        fx: &mut FnState<'a>,
        name: &str,
        span: Span,
    ) -> CodegenResult<(String, String, String)> {
        let Some(binding) = fx.vars.get(name).cloned() else {
            if self.presets.contains_key(name) {
                return Err(CodegenError::unsupported(
                    self.location(span),
                    format!("preset `{name}` is constant and cannot be assigned"),
                ));
            }
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!("unknown identifier `{name}`"),
            ));
        };
        match binding {
            Binding::Slot {
                ptr,
                llvm_type,
                front_type,
            } => Ok((ptr, llvm_type, front_type)),
            Binding::Param {
                ssa,
                llvm_type,
                front_type,
            } => {
                // First assignment: copy the incoming value to a slot and
                // re-point all future reads through it.
                let slot = fx.slot_name(name);
                self.ctx.emit(&format!("{slot} = alloca {llvm_type}"));
                self.ctx
                    .emit(&format!("store {llvm_type} {ssa}, ptr {slot}"));
                if fx.params.contains(name) {
                    fx.materialized.insert(name.to_string());
                }
                debug!(
                    name,
                    materialized = fx.materialized.len(),
                    "parameter promoted to stack slot"
                );
                fx.vars.insert(
                    name.to_string(),
                    Binding::Slot {
                        ptr: slot.clone(),
                        llvm_type: llvm_type.clone(),
                        front_type: front_type.clone(),
                    },
                );
                Ok((slot, llvm_type, front_type))
            }
        }
    }
}
