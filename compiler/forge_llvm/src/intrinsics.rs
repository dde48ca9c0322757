//! Danger-zone, source-location, and error intrinsics.
//!
//! Danger-zone primitives are raw memory operations the surface language
//! only allows in marked scopes; by the time they reach code generation
//! they lower directly. Source-location intrinsics resolve at compile
//! time from the call site's span. The error intrinsics branch into the
//! crash runtime.

use forge_diagnostic::{CodegenError, CodegenResult};
use forge_ir::{CallArg, Span};

use crate::context::{Value, ValueInfo};
use crate::module::ModuleGenerator;
use crate::scope::FnState;
use crate::types::{self, TypeKind};

impl<'a> ModuleGenerator<'a> {
    pub(crate) fn lower_danger_intrinsic(
        &mut self,
        fx: &mut FnState<'a>,
        name: &str,
        generic_args: &[String],
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<Value> {
        match name {
            "address_of" => {
                self.expect_arity(name, args, 1, span)?;
                let (ptr, _, _) = self.lvalue_ptr(fx, args[0].value)?;
                let ptr_int = self.ctx.target.ptr_int.clone();
                let tmp = self.ctx.fresh_temp();
                self.ctx
                    .emit(&format!("{tmp} = ptrtoint ptr {ptr} to {ptr_int}"));
                let info = ValueInfo::of_front("uaddr", ptr_int);
                self.ctx.record_value(&tmp, info.clone());
                self.wrap_into(Value::new(tmp, info), "uaddr", span)
            }
            "invalidate" => {
                self.expect_arity(name, args, 1, span)?;
                let (ptr, llvm, _) = self.lvalue_ptr(fx, args[0].value)?;
                self.ctx
                    .emit(&format!("store {llvm} zeroinitializer, ptr {ptr}"));
                Ok(Value::new("", ValueInfo::of_front("void", "void")))
            }
            "read_as" | "volatile_read" => {
                self.expect_arity(name, args, 1, span)?;
                let target = self.danger_type_arg(name, generic_args, span)?;
                let addr = self.lower_expr(fx, args[0].value)?;
                let base = self.pointer_operand(addr);
                let volatile = if name == "volatile_read" { "volatile " } else { "" };

                // Raw intrinsic contexts pass LLVM type names through and
                // fall back to `ptr` for unresolved names.
                let llvm = self.llvm_type_or_ptr(&target, span);
                match self.ctx.primitive_for_wrapper(&llvm) {
                    Some(prim) => {
                        let tmp = self.ctx.fresh_temp();
                        self.ctx
                            .emit(&format!("{tmp} = load {volatile}{prim}, ptr {base}"));
                        let info = ValueInfo::of_front(target.clone(), prim);
                        self.ctx.record_value(&tmp, info.clone());
                        self.wrap_into(Value::new(tmp, info), &target, span)
                    }
                    None => {
                        let tmp = self.ctx.fresh_temp();
                        self.ctx
                            .emit(&format!("{tmp} = load {volatile}{llvm}, ptr {base}"));
                        let info = ValueInfo {
                            llvm_type: llvm,
                            is_unsigned: false,
                            is_float: false,
                            front_type: target,
                        };
                        self.ctx.record_value(&tmp, info.clone());
                        Ok(Value::new(tmp, info))
                    }
                }
            }
            "write_as" | "volatile_write" => {
                self.expect_arity(name, args, 2, span)?;
                let target = self.danger_type_arg(name, generic_args, span)?;
                let addr = self.lower_expr(fx, args[0].value)?;
                let base = self.pointer_operand(addr);
                let value = self.lower_expr_expecting(fx, args[1].value, Some(target.as_str()))?;
                let value = self.ensure_primitive(value);
                let volatile = if name == "volatile_write" { "volatile " } else { "" };
                self.ctx.emit(&format!(
                    "store {volatile}{} {}, ptr {base}",
                    value.info.llvm_type, value.repr
                ));
                Ok(Value::new("", ValueInfo::of_front("void", "void")))
            }
            _ => Err(self.invariant(span, "danger intrinsic dispatch mismatch")),
        }
    }

    fn danger_type_arg(
        &self,
        name: &str,
        generic_args: &[String],
        span: Span,
    ) -> CodegenResult<String> {
        match generic_args.first() {
            Some(t) if generic_args.len() == 1 => Ok(t.clone()),
            _ => Err(CodegenError::type_resolution(
                self.location(span),
                format!("`{name}` requires exactly one type argument"),
            )),
        }
    }

    /// Turn an address value (addr wrapper or raw pointer) into a `ptr`
    /// operand.
    fn pointer_operand(&mut self, addr: Value) -> String {
        let addr = self.ensure_primitive(addr);
        if types::classify(&addr.info.llvm_type).kind == TypeKind::Pointer {
            return addr.repr;
        }
        let tmp = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{tmp} = inttoptr {} {} to ptr",
            addr.info.llvm_type, addr.repr
        ));
        tmp
    }

    pub(crate) fn lower_location_intrinsic(
        &mut self,
        fx: &mut FnState<'a>,
        name: &str,
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<Value> {
        self.expect_arity(name, args, 0, span)?;
        match name {
            "get_line_number" => Ok(Value::new(
                span.line.to_string(),
                ValueInfo::of_front("s32", "i32"),
            )),
            "get_column_number" => Ok(Value::new(
                span.column.to_string(),
                ValueInfo::of_front("s32", "i32"),
            )),
            "get_file_name" => {
                let global = self.ctx.intern_string(&self.program.file_name);
                Ok(Value::new(global, text_info()))
            }
            "get_routine_name" => {
                let global = self.ctx.intern_string(&fx.fn_name);
                Ok(Value::new(global, text_info()))
            }
            _ => Err(self.invariant(span, "location intrinsic dispatch mismatch")),
        }
    }

    pub(crate) fn lower_error_intrinsic(
        &mut self,
        fx: &mut FnState<'a>,
        name: &str,
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<Value> {
        match name {
            "verify!" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(CodegenError::arity(
                        self.location(span),
                        "`verify!` takes a condition and an optional message",
                    ));
                }
                let cond = self.lower_expr(fx, args[0].value)?;
                let cond = self.ensure_i1(cond, span)?;
                let fail = self.ctx.fresh_label("verify.fail");
                let cont = self.ctx.fresh_label("verify.cont");
                self.branch_cond(fx, &cond.repr, &cont, &fail);

                self.start_block(fx, &fail);
                let message = match args.get(1) {
                    Some(arg) => {
                        let v = self.lower_expr_expecting(fx, arg.value, Some("text"))?;
                        self.ensure_primitive(v).repr
                    }
                    None => self.ctx.intern_string("verification failed"),
                };
                let type_name = self.ctx.intern_string("VerificationError");
                self.ctx.emit(&format!(
                    "call void @forge_crash(ptr {type_name}, ptr {message})"
                ));
                self.ctx.emit("unreachable");
                fx.block_terminated = true;
                self.start_block(fx, &cont);
                Ok(Value::new("", ValueInfo::of_front("void", "void")))
            }
            "breach!" => {
                if args.len() > 1 {
                    return Err(CodegenError::arity(
                        self.location(span),
                        "`breach!` takes at most a message",
                    ));
                }
                let message = match args.first() {
                    Some(arg) => {
                        let v = self.lower_expr_expecting(fx, arg.value, Some("text"))?;
                        self.ensure_primitive(v).repr
                    }
                    None => self.ctx.intern_string("entered unreachable code"),
                };
                let type_name = self.ctx.intern_string("BreachError");
                self.ctx.emit(&format!(
                    "call void @forge_crash(ptr {type_name}, ptr {message})"
                ));
                self.ctx.emit("unreachable");
                fx.block_terminated = true;
                Ok(Value::new("", ValueInfo::of_front("void", "void")))
            }
            "stop!" => {
                if args.len() > 1 {
                    return Err(CodegenError::arity(
                        self.location(span),
                        "`stop!` takes at most a message",
                    ));
                }
                let message = match args.first() {
                    Some(arg) => {
                        let v = self.lower_expr_expecting(fx, arg.value, Some("text"))?;
                        self.ensure_primitive(v).repr
                    }
                    None => self.ctx.intern_string("stopped"),
                };
                self.ctx
                    .emit(&format!("call void @forge_stop(ptr {message})"));
                self.ctx.emit("unreachable");
                fx.block_terminated = true;
                Ok(Value::new("", ValueInfo::of_front("void", "void")))
            }
            _ => Err(self.invariant(span, "error intrinsic dispatch mismatch")),
        }
    }

    fn expect_arity(
        &self,
        name: &str,
        args: &[CallArg],
        want: usize,
        span: Span,
    ) -> CodegenResult<()> {
        if args.len() == want {
            return Ok(());
        }
        Err(CodegenError::arity(
            self.location(span),
            format!("`{name}` expects {want} argument(s), found {}", args.len()),
        ))
    }
}

fn text_info() -> ValueInfo {
    ValueInfo {
        llvm_type: "ptr".to_string(),
        is_unsigned: false,
        is_float: false,
        front_type: "text".to_string(),
    }
}
