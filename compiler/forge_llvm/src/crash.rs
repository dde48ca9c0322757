//! Error lowering.
//!
//! A `throw` of a crashable constructor picks one of two shapes: a
//! dedicated runtime thunk call when the type is dynamic and a thunk
//! exists (the evaluated constructor fields become thunk arguments), or a
//! static pointer pair (type name, message) handed to the stack-trace
//! runtime together with the debug location. Either way the block ends in
//! `unreachable`.

use forge_diagnostic::CodegenResult;
use forge_ir::{CallArg, ExprId, ExprKind, Span};

use crate::context::{Value, ValueInfo};
use crate::module::ModuleGenerator;
use crate::scope::FnState;

/// Crashable types with a dedicated runtime entry point, and the number
/// of constructor fields the thunk takes (as `i64`s).
fn runtime_thunk(name: &str) -> Option<(&'static str, usize)> {
    match name {
        "IndexOutOfBoundsError" => Some(("forge_throw_index_out_of_bounds", 2)),
        _ => None,
    }
}

impl<'a> ModuleGenerator<'a> {
    pub(crate) fn lower_throw(
        &mut self,
        fx: &mut FnState<'a>,
        expr: ExprId,
        span: Span,
    ) -> CodegenResult<()> {
        let arena = fx.arena;
        if let ExprKind::Call { callee, args, .. } = &arena.expr(expr).kind {
            if self.is_crashable_name(callee) {
                return self.lower_throw_ctor(fx, callee, args, span);
            }
        }

        // Throwing an already-built error value: its tracked front type is
        // the error type; a pointer value is its message.
        let v = self.lower_expr(fx, expr)?;
        let type_name = v.info.front_type.clone();
        let message = if v.info.llvm_type == "ptr" {
            v.repr.clone()
        } else {
            self.default_message_ptr(&type_name)
        };
        self.emit_throw(fx, &type_name, &message, span);
        Ok(())
    }

    fn lower_throw_ctor(
        &mut self,
        fx: &mut FnState<'a>,
        type_name: &str,
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<()> {
        // Dynamic path: the resolver marked the message dynamic and a
        // thunk exists to receive the fields.
        if let Some((symbol, field_count)) = runtime_thunk(type_name) {
            let dynamic = !args.is_empty() || self.crash_messages.is_dynamic(type_name);
            if dynamic && args.len() == field_count {
                let mut operands = Vec::with_capacity(args.len());
                for arg in args {
                    let v = self.lower_expr(fx, arg.value)?;
                    let v = self.ensure_primitive(v);
                    let v = self.coerce_primitive(v, "i64");
                    operands.push(format!("i64 {}", v.repr));
                }
                self.debug.type_id(type_name);
                self.ctx.emit(&format!(
                    "call void @{symbol}({})",
                    operands.join(", ")
                ));
                self.ctx.emit("unreachable");
                fx.block_terminated = true;
                return Ok(());
            }
        }

        // Static path: evaluate fields for their effects, then hand the
        // name/message pair to the stack-trace runtime.
        for arg in args {
            self.lower_expr(fx, arg.value)?;
        }
        let message = self.message_ptr(type_name);
        self.emit_throw(fx, type_name, &message, span);
        Ok(())
    }

    /// `absent` throws `AbsentValueError` through its runtime entry point.
    pub(crate) fn lower_absent(&mut self, fx: &mut FnState<'a>, span: Span) -> CodegenResult<()> {
        let file = self.debug.file_id(&self.program.file_name);
        self.debug.type_id("AbsentValueError");
        self.ctx.emit(&format!(
            "call void @forge_throw_absent(i32 {file}, i32 {}, i32 {})",
            span.line, span.column
        ));
        self.ctx.emit("unreachable");
        fx.block_terminated = true;
        Ok(())
    }

    /// A crashable constructor in expression position produces a
    /// static-message pointer.
    pub(crate) fn lower_crashable_value(
        &mut self,
        fx: &mut FnState<'a>,
        type_name: &str,
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<Value> {
        let _ = span;
        for arg in args {
            self.lower_expr(fx, arg.value)?;
        }
        self.debug.type_id(type_name);
        let message = self.message_ptr(type_name);
        Ok(Value::new(
            message,
            ValueInfo {
                llvm_type: "ptr".to_string(),
                is_unsigned: false,
                is_float: false,
                front_type: type_name.to_string(),
            },
        ))
    }

    /// The pooled message for a crashable type: the stdlib's static
    /// `crash_message` when the resolver found one, a generic fallback
    /// otherwise.
    fn message_ptr(&mut self, type_name: &str) -> String {
        match self.crash_messages.static_message(type_name) {
            Some(message) => {
                let message = message.to_string();
                self.ctx.intern_string(&message)
            }
            None => self.default_message_ptr(type_name),
        }
    }

    fn default_message_ptr(&mut self, type_name: &str) -> String {
        self.ctx.intern_string(&format!("{type_name} was thrown"))
    }

    /// The static throw sequence: type-name and message pointers plus the
    /// debug location, then `unreachable`.
    fn emit_throw(&mut self, fx: &mut FnState<'a>, type_name: &str, message: &str, span: Span) {
        self.debug.type_id(type_name);
        let file = self.debug.file_id(&self.program.file_name);
        let name_ptr = self.ctx.intern_string(type_name);
        self.ctx.emit(&format!(
            "call void @forge_throw(ptr {name_ptr}, ptr {message}, i32 {file}, i32 {}, i32 {})",
            span.line, span.column
        ));
        self.ctx.emit("unreachable");
        fx.block_terminated = true;
    }
}
