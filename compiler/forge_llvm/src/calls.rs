//! Call resolution and lowering.
//!
//! A call through a name can be many things; the resolver tries them in a
//! fixed priority order, first match wins:
//!
//! 1. danger-zone intrinsics
//! 2. source-location intrinsics
//! 3. error intrinsics (`verify!`, `breach!`, `stop!`)
//! 4. static/generic method named through a type (`Point.origin()`)
//! 5. parse constructors (`s64!`, `u32?`)
//! 6. crashable error constructors
//! 7. record/entity constructors (generic ones instantiate on demand)
//! 8. primitive casts (`u64(x)`)
//! 9. external FFI declarations, then runtime helpers
//! 10. module functions: current unit, generic templates, then imports
//!
//! Method calls on a typed receiver resolve separately through the method
//! lookup order (current unit, record body, imports, templates).

use forge_diagnostic::{CodegenError, CodegenResult};
use forge_ir::{CallArg, Decl, ExprId, FunctionDecl, RecordKind, Span};

use crate::context::{RecordLayout, Value, ValueInfo};
use crate::generics::{self, ModuleRef};
use crate::module::{template_params_from_name, ModuleGenerator};
use crate::runtime;
use crate::scope::FnState;
use crate::types::{self, TypeKind};

/// How the receiver travels to a method.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum ReceiverMode {
    ByPointer,
    ByValue,
}

/// A resolved call target.
pub(crate) struct Callee {
    pub symbol: String,
    pub param_fronts: Vec<String>,
    pub return_front: Option<String>,
    pub receiver: Option<ReceiverMode>,
    /// Imported symbols get a `declare` on first use.
    pub declare: Option<String>,
}

impl<'a> ModuleGenerator<'a> {
    pub(crate) fn lower_call(
        &mut self,
        fx: &mut FnState<'a>,
        callee: &str,
        generic_args: &[String],
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<Value> {
        let callee = fx.subst_type(callee);
        let generic_args: Vec<String> = generic_args.iter().map(|a| fx.subst_type(a)).collect();

        // 1. Danger-zone intrinsics.
        if matches!(
            callee.as_str(),
            "address_of" | "invalidate" | "read_as" | "write_as" | "volatile_read"
                | "volatile_write"
        ) {
            return self.lower_danger_intrinsic(fx, &callee, &generic_args, args, span);
        }

        // 2. Source-location intrinsics.
        if matches!(
            callee.as_str(),
            "get_line_number" | "get_column_number" | "get_file_name" | "get_routine_name"
        ) {
            return self.lower_location_intrinsic(fx, &callee, args, span);
        }

        // 3. Error intrinsics.
        if matches!(callee.as_str(), "verify!" | "breach!" | "stop!") {
            return self.lower_error_intrinsic(fx, &callee, args, span);
        }

        // 4. Static or generic method named through a type.
        if let Some((ty, method)) = callee.rsplit_once('.') {
            let target = self.resolve_method(ty, method, span)?;
            return self.emit_call(fx, &target, None, args, span);
        }

        // 5. Parse constructors.
        if let Some(base) = callee.strip_suffix('!').or_else(|| callee.strip_suffix('?')) {
            if types::is_primitive_front(base) {
                let crashing = callee.ends_with('!');
                return self.lower_parse_ctor(fx, base, crashing, args, span);
            }
        }

        // 6. Crashable error constructors.
        if self.is_crashable_name(&callee) {
            return self.lower_crashable_value(fx, &callee, args, span);
        }

        // 7. Record/entity constructors.
        if !generic_args.is_empty() || callee.contains('<') {
            let (base, mut targs) = match generics::parse_generic_name(&callee) {
                Some((base, targs)) => (base.to_string(), targs),
                None => (callee.clone(), Vec::new()),
            };
            targs.extend(generic_args.iter().cloned());
            if let Some(symbol) = self.mono.request_record(&base, &targs) {
                // Layout may not be drained yet; materialize it now so the
                // constructor can see the fields.
                self.ensure_instantiated_layout(&symbol)?;
                return self.lower_record_ctor(fx, &symbol, args, span);
            }
            if let Some(symbol) = self.mono.request_function(&base, &targs) {
                let target = self.generic_function_callee(&base, &symbol, &targs, span)?;
                return self.emit_call(fx, &target, None, args, span);
            }
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!("no generic template named `{base}`"),
            ));
        }
        if self.ctx.layout(&callee).is_some() {
            return self.lower_record_ctor(fx, &callee, args, span);
        }
        if let Some((_, record)) = self.find_record(&callee) {
            if record.type_params.is_empty() {
                let record = record.clone();
                self.register_record_layout(&record, &callee, &Default::default())?;
                return self.lower_record_ctor(fx, &callee, args, span);
            }
        }

        // 8. Primitive casts.
        if types::is_primitive_front(&callee) {
            return self.lower_cast(fx, &callee, args, span);
        }

        // 9. External FFI, then runtime helpers.
        if let Some(ext) = self.find_external(&callee) {
            return self.lower_ffi_call(fx, ext, args, span);
        }
        if runtime::is_runtime_helper(&callee) {
            return self.lower_runtime_call(fx, &callee, args, span);
        }

        // 10. Module functions.
        if let Some(decl) = self.find_function(&callee) {
            if decl.type_params.is_empty() {
                let target = Callee {
                    symbol: callee.clone(),
                    param_fronts: decl.params.iter().map(|p| p.ty.clone()).collect(),
                    return_front: decl.return_type.clone(),
                    receiver: None,
                    declare: None,
                };
                return self.emit_call(fx, &target, None, args, span);
            }
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!("generic function `{callee}` requires type arguments"),
            ));
        }
        if let Some((_, decl)) = self.find_imported_function(&callee) {
            let target = self.imported_function_callee(decl, span)?;
            return self.emit_call(fx, &target, None, args, span);
        }

        Err(CodegenError::type_resolution(
            self.location(span),
            format!("unknown function `{callee}`"),
        ))
    }

    // -- method calls --------------------------------------------------------

    pub(crate) fn lower_method_call(
        &mut self,
        fx: &mut FnState<'a>,
        receiver: ExprId,
        method: &str,
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<Value> {
        let recv = self.lower_expr(fx, receiver)?;
        let ty = recv.info.front_type.clone();
        let target = self.resolve_method(&ty, method, span)?;
        self.emit_call(fx, &target, Some(recv), args, span)
    }

    /// Method lookup order: current unit's qualified functions, methods in
    /// the record body, imported modules, then generic templates (queuing
    /// a monomorphization).
    pub(crate) fn resolve_method(
        &mut self,
        ty: &str,
        method: &str,
        span: Span,
    ) -> CodegenResult<Callee> {
        let (base, targs) = match generics::parse_generic_name(ty) {
            Some((base, targs)) => (base.to_string(), targs),
            // Values built from an instantiation are tracked under the
            // mangled name; map it back to its template.
            None => match self.mono.instantiation_of(ty) {
                Some((base, targs)) => (base.clone(), targs.clone()),
                None => (ty.to_string(), Vec::new()),
            },
        };
        let concrete = if targs.is_empty() {
            base.clone()
        } else {
            generics::mangle(&base, &targs)
        };
        // The receiver's layout must exist before its passing mode is
        // decided; queue the record instantiation first.
        if !targs.is_empty() {
            self.mono.request_record(&base, &targs);
            self.ensure_instantiated_layout(&concrete)?;
        }
        let receiver_mode = self.receiver_mode(&concrete, span);

        // Bang-suffixed declarations answer bare lookups too.
        let names = [method.to_string(), format!("{method}!")];

        // 1. Qualified top-level functions in the current unit. Their
        // receiver, if any, is an explicit leading `self` parameter.
        for name in &names {
            let qualified = format!("{concrete}.{name}");
            if let Some(decl) = self.find_function(&qualified) {
                if decl.type_params.is_empty() {
                    let takes_self = decl.params.first().is_some_and(|p| p.name == "self");
                    let declared = if takes_self {
                        &decl.params[1..]
                    } else {
                        &decl.params[..]
                    };
                    return Ok(Callee {
                        symbol: qualified,
                        param_fronts: declared.iter().map(|p| p.ty.clone()).collect(),
                        return_front: decl.return_type.clone(),
                        receiver: takes_self.then_some(receiver_mode),
                        declare: None,
                    });
                }
            }
        }

        // 2. Methods declared inside the record body (non-generic base).
        if targs.is_empty() {
            if let Some((module, record)) = self.find_record(&base) {
                for name in &names {
                    if let Some(m) = record
                        .methods
                        .iter()
                        .find(|m| &m.name == name && m.type_params.is_empty())
                    {
                        let symbol = format!("{base}.{name}");
                        let declare = match &module {
                            ModuleRef::Current => None,
                            ModuleRef::Import(_) => Some(self.method_declare_line(
                                m,
                                &symbol,
                                receiver_mode,
                                &base,
                                span,
                            )?),
                        };
                        return Ok(Callee {
                            symbol,
                            param_fronts: m.params.iter().map(|p| p.ty.clone()).collect(),
                            return_front: m.return_type.clone(),
                            receiver: Some(receiver_mode),
                            declare,
                        });
                    }
                }
            }
        }

        // 3 + 4. Generic templates: queue the instantiation and dispatch
        // to the mangled name.
        if !targs.is_empty() {
            for name in &names {
                let key = format!("{base}.{name}");
                if let Some(template) = self.mono.function_template(&key).cloned() {
                    let symbol = format!("{concrete}.{name}");
                    self.mono
                        .request_function_symbol(template.clone(), &symbol, &targs);
                    let decl = self.template_function_decl(&template, span)?;
                    let subst = crate::module::build_subst(
                        &self.template_type_params(&template, decl),
                        &targs,
                    );
                    // Record-body templates take an implicit receiver;
                    // `Base<P>.m` spellings declare `self` explicitly.
                    let implicit_receiver = template.method_index.is_some();
                    let takes_self = implicit_receiver
                        || decl.params.first().is_some_and(|p| p.name == "self");
                    let declared = if !implicit_receiver && takes_self {
                        &decl.params[1..]
                    } else {
                        &decl.params[..]
                    };
                    return Ok(Callee {
                        symbol,
                        param_fronts: declared
                            .iter()
                            .map(|p| generics::substitute_type(&p.ty, &subst))
                            .collect(),
                        return_front: decl
                            .return_type
                            .as_ref()
                            .map(|t| generics::substitute_type(t, &subst)),
                        receiver: takes_self.then_some(receiver_mode),
                        declare: None,
                    });
                }
            }
        }

        Err(CodegenError::type_resolution(
            self.location(span),
            format!("no method `{method}` on `{ty}`"),
        ))
    }

    fn receiver_mode(&mut self, concrete: &str, _span: Span) -> ReceiverMode {
        match self.ctx.layout(concrete) {
            Some(layout) if layout.passes_by_pointer() => ReceiverMode::ByPointer,
            Some(_) => ReceiverMode::ByValue,
            // Wrappers and not-yet-registered types travel by value.
            None => ReceiverMode::ByValue,
        }
    }

    fn method_declare_line(
        &mut self,
        decl: &FunctionDecl,
        symbol: &str,
        receiver_mode: ReceiverMode,
        receiver_front: &str,
        span: Span,
    ) -> CodegenResult<String> {
        let ret = match &decl.return_type {
            Some(t) => self.llvm_type_for(t, span)?,
            None => "void".to_string(),
        };
        let mut params = vec![match receiver_mode {
            ReceiverMode::ByPointer => "ptr".to_string(),
            ReceiverMode::ByValue => self.llvm_type_for(receiver_front, span)?,
        }];
        for p in &decl.params {
            params.push(self.llvm_type_for(&p.ty, p.span)?);
        }
        Ok(format!("declare {ret} @{symbol}({})", params.join(", ")))
    }

    // -- shared call emission ------------------------------------------------

    /// Lower arguments against the callee's parameter types and emit the
    /// call, wrapping the result's identity.
    pub(crate) fn emit_call(
        &mut self,
        fx: &mut FnState<'a>,
        target: &Callee,
        receiver: Option<Value>,
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<Value> {
        if args.len() != target.param_fronts.len() {
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!(
                    "`{}` expects {} arguments, found {}",
                    target.symbol,
                    target.param_fronts.len(),
                    args.len()
                ),
            ));
        }
        if let Some(line) = &target.declare {
            let line = line.clone();
            self.ctx.declare_external(&line);
        }

        if target.receiver.is_some() != receiver.is_some() {
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!(
                    "`{}` {} a receiver",
                    target.symbol,
                    if target.receiver.is_some() {
                        "requires"
                    } else {
                        "does not take"
                    }
                ),
            ));
        }

        let mut operands = Vec::with_capacity(args.len() + 1);
        if let Some(recv) = receiver {
            let mode = target.receiver.unwrap_or(ReceiverMode::ByValue);
            match mode {
                ReceiverMode::ByPointer => {
                    let ptr = if recv.info.llvm_type == "ptr" {
                        recv.repr
                    } else {
                        self.spill_to_slot(&recv)
                    };
                    operands.push(format!("ptr {ptr}"));
                }
                ReceiverMode::ByValue => {
                    let front = recv.info.front_type.clone();
                    let v = self.wrap_into(recv, &front, span)?;
                    operands.push(format!("{} {}", v.info.llvm_type, v.repr));
                }
            }
        }

        let param_fronts = target.param_fronts.clone();
        for (arg, front) in args.iter().zip(&param_fronts) {
            let v = self.lower_expr_expecting(fx, arg.value, Some(front.as_str()))?;
            let llvm = self.llvm_type_for(front, span)?;
            let v = if llvm == "ptr" {
                v
            } else {
                self.wrap_into(v, front, span)?
            };
            operands.push(format!("{llvm} {}", v.repr));
        }

        let operands = operands.join(", ");
        match &target.return_front {
            None => {
                self.ctx
                    .emit(&format!("call void @{}({operands})", target.symbol));
                Ok(Value::new("", ValueInfo::of_front("void", "void")))
            }
            Some(front) => {
                let ret_llvm = self.llvm_type_for(front, span)?;
                let tmp = self.ctx.fresh_temp();
                self.ctx.emit(&format!(
                    "{tmp} = call {ret_llvm} @{}({operands})",
                    target.symbol
                ));
                let info = if ret_llvm == "ptr" {
                    ValueInfo {
                        llvm_type: ret_llvm,
                        is_unsigned: false,
                        is_float: false,
                        front_type: front.clone(),
                    }
                } else {
                    ValueInfo::of_front(front.clone(), ret_llvm)
                };
                self.ctx.record_value(&tmp, info.clone());
                Ok(Value::new(tmp, info))
            }
        }
    }

    // -- constructors --------------------------------------------------------

    /// Value records build with `insertvalue`; entities heap-allocate and
    /// store each field.
    pub(crate) fn lower_record_ctor(
        &mut self,
        fx: &mut FnState<'a>,
        layout_name: &str,
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<Value> {
        let Some(layout) = self.ctx.layout(layout_name) else {
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!("`{layout_name}` has no registered layout"),
            ));
        };
        let layout = layout.clone();
        if args.len() != layout.fields.len() {
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!(
                    "`{layout_name}` has {} fields, constructor got {}",
                    layout.fields.len(),
                    args.len()
                ),
            ));
        }

        // Evaluate arguments in source order, then map named arguments to
        // their field slots.
        let mut slot_values: Vec<Option<Value>> = vec![None; layout.fields.len()];
        for (i, arg) in args.iter().enumerate() {
            let index = match &arg.name {
                Some(name) => layout.field_index(name).ok_or_else(|| {
                    CodegenError::type_resolution(
                        self.location(span),
                        format!("`{layout_name}` has no field `{name}`"),
                    )
                })?,
                None => i,
            };
            let front = layout.front_fields[index].1.clone();
            let v = self.lower_expr_expecting(fx, arg.value, Some(front.as_str()))?;
            let llvm = layout.fields[index].1.clone();
            let v = if llvm == "ptr" {
                v
            } else {
                self.wrap_into(v, &front, span)?
            };
            slot_values[index] = Some(v);
        }

        let type_name = format!("%{}", layout.name);
        match layout.kind {
            RecordKind::Value => {
                let mut acc = "undef".to_string();
                for (index, value) in slot_values.iter().enumerate() {
                    let Some(value) = value else {
                        return Err(CodegenError::type_resolution(
                            self.location(span),
                            format!(
                                "missing field `{}` in `{layout_name}` constructor",
                                layout.fields[index].0
                            ),
                        ));
                    };
                    let tmp = self.ctx.fresh_temp();
                    self.ctx.emit(&format!(
                        "{tmp} = insertvalue {type_name} {acc}, {} {}, {index}",
                        value.info.llvm_type, value.repr
                    ));
                    acc = tmp;
                }
                let info = ValueInfo {
                    llvm_type: type_name,
                    is_unsigned: false,
                    is_float: false,
                    front_type: layout.name.clone(),
                };
                self.ctx.record_value(&acc, info.clone());
                Ok(Value::new(acc, info))
            }
            RecordKind::Entity => {
                let size = self.ctx.byte_size(&type_name);
                let ptr = self.ctx.fresh_temp();
                self.ctx
                    .emit(&format!("{ptr} = call ptr @malloc(i64 {size})"));
                for (index, value) in slot_values.iter().enumerate() {
                    let Some(value) = value else {
                        return Err(CodegenError::type_resolution(
                            self.location(span),
                            format!(
                                "missing field `{}` in `{layout_name}` constructor",
                                layout.fields[index].0
                            ),
                        ));
                    };
                    let field_ptr = self.ctx.fresh_temp();
                    self.ctx.emit(&format!(
                        "{field_ptr} = getelementptr inbounds {type_name}, ptr {ptr}, i32 0, i32 {index}"
                    ));
                    self.ctx.emit(&format!(
                        "store {} {}, ptr {field_ptr}",
                        value.info.llvm_type, value.repr
                    ));
                }
                let info = ValueInfo {
                    llvm_type: "ptr".to_string(),
                    is_unsigned: false,
                    is_float: false,
                    front_type: layout.name.clone(),
                };
                self.ctx.record_value(&ptr, info.clone());
                Ok(Value::new(ptr, info))
            }
        }
    }

    /// `u64(x)`: extract the source primitive, resize, rewrap.
    fn lower_cast(
        &mut self,
        fx: &mut FnState<'a>,
        target_front: &str,
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<Value> {
        if args.len() != 1 {
            return Err(CodegenError::arity(
                self.location(span),
                format!("cast to `{target_front}` takes exactly one argument"),
            ));
        }
        let v = self.lower_expr(fx, args[0].value)?;
        let v = self.ensure_primitive(v);
        let target_llvm = self.llvm_type_for(target_front, span)?;
        let Some(target_prim) = self.ctx.primitive_for_wrapper(&target_llvm) else {
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!("`{target_front}` is not a castable primitive"),
            ));
        };

        let from = types::classify(&v.info.llvm_type);
        let to = types::classify(&target_prim);
        let target_unsigned = types::is_unsigned_front(target_front);
        let converted = if v.info.llvm_type == target_prim {
            v
        } else {
            let op = match (from.kind, to.kind) {
                (TypeKind::Int, TypeKind::Int) => {
                    if from.bits > to.bits {
                        "trunc"
                    } else if v.info.is_unsigned {
                        "zext"
                    } else {
                        "sext"
                    }
                }
                (TypeKind::Int, TypeKind::Float) => {
                    if v.info.is_unsigned {
                        "uitofp"
                    } else {
                        "sitofp"
                    }
                }
                (TypeKind::Float, TypeKind::Int) => {
                    if target_unsigned {
                        "fptoui"
                    } else {
                        "fptosi"
                    }
                }
                (TypeKind::Float, TypeKind::Float) => {
                    if from.bits > to.bits {
                        "fptrunc"
                    } else {
                        "fpext"
                    }
                }
                _ => {
                    return Err(CodegenError::type_resolution(
                        self.location(span),
                        format!(
                            "cannot cast `{}` to `{target_front}`",
                            v.info.front_type
                        ),
                    ))
                }
            };
            let tmp = self.ctx.fresh_temp();
            self.ctx.emit(&format!(
                "{tmp} = {op} {} {} to {target_prim}",
                v.info.llvm_type, v.repr
            ));
            let info = ValueInfo::of_front(target_front, target_prim.clone());
            self.ctx.record_value(&tmp, info.clone());
            Value::new(tmp, info)
        };
        self.wrap_into(converted, target_front, span)
    }

    /// `T!(text)` / `T?(text)`: route to the runtime parsers.
    fn lower_parse_ctor(
        &mut self,
        fx: &mut FnState<'a>,
        base: &str,
        crashing: bool,
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<Value> {
        if args.len() != 1 {
            return Err(CodegenError::arity(
                self.location(span),
                format!("`{base}` parse constructor takes exactly one argument"),
            ));
        }
        let text = self.lower_expr(fx, args[0].value)?;
        let text = self.ensure_primitive(text);
        if text.info.llvm_type != "ptr" {
            return Err(CodegenError::type_resolution(
                self.location(span),
                "parse constructors take a text argument",
            ));
        }

        let llvm = self.llvm_type_for(base, span)?;
        let Some(prim) = self.ctx.primitive_for_wrapper(&llvm) else {
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!("`{base}` is not parseable"),
            ));
        };

        let parsed = if types::is_float_front(base) {
            let raw = self.ctx.fresh_temp();
            self.ctx.emit(&format!(
                "{raw} = call double @strtod(ptr {}, ptr null)",
                text.repr
            ));
            let info = ValueInfo::of_front("f64", "double");
            self.ctx.record_value(&raw, info.clone());
            let v = Value::new(raw, info);
            self.coerce_primitive(v, &prim)
        } else {
            let raw = self.ctx.fresh_temp();
            self.ctx.emit(&format!(
                "{raw} = call i64 @strtol(ptr {}, ptr null, i32 10)",
                text.repr
            ));
            let info = ValueInfo::of_front("s64", "i64");
            self.ctx.record_value(&raw, info.clone());
            let v = Value::new(raw, info);
            self.coerce_primitive(v, &prim)
        };
        let value = self.wrap_into(
            Value::new(parsed.repr, ValueInfo::of_front(base, prim)),
            base,
            span,
        )?;

        if crashing {
            return Ok(value);
        }

        // The optional form wraps into `Maybe<T>`; the validity flag is
        // set here, failure detection lives with the runtime parser.
        let maybe_name = match self.mono.request_record("Maybe", &[base.to_string()]) {
            Some(symbol) => {
                self.ensure_instantiated_layout(&symbol)?;
                symbol
            }
            None => {
                let name = format!("Maybe_{base}");
                if self.ctx.layout(&name).is_none() {
                    self.ctx.register_layout(RecordLayout {
                        name: name.clone(),
                        kind: RecordKind::Value,
                        fields: vec![
                            ("has".to_string(), "%bool".to_string()),
                            ("value".to_string(), llvm.clone()),
                        ],
                        front_fields: vec![
                            ("has".to_string(), "bool".to_string()),
                            ("value".to_string(), base.to_string()),
                        ],
                    });
                }
                name
            }
        };
        let flag = self.wrap_into(Value::new("true", ValueInfo::bool_flag()), "bool", span)?;
        let type_name = format!("%{maybe_name}");
        let with_flag = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{with_flag} = insertvalue {type_name} undef, %bool {}, 0",
            flag.repr
        ));
        let built = self.ctx.fresh_temp();
        self.ctx.emit(&format!(
            "{built} = insertvalue {type_name} {with_flag}, {} {}, 1",
            value.info.llvm_type, value.repr
        ));
        let info = ValueInfo {
            llvm_type: type_name,
            is_unsigned: false,
            is_float: false,
            front_type: maybe_name,
        };
        self.ctx.record_value(&built, info.clone());
        Ok(Value::new(built, info))
    }

    // -- externals -----------------------------------------------------------

    /// FFI calls unwrap wrapper arguments to the bare primitives C
    /// expects; address wrappers bound for pointer parameters go through
    /// `inttoptr`.
    fn lower_ffi_call(
        &mut self,
        fx: &mut FnState<'a>,
        ext: &'a forge_ir::ExternalDecl,
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<Value> {
        if args.len() != ext.params.len() && !(ext.variadic && args.len() > ext.params.len()) {
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!(
                    "`{}` expects {} arguments, found {}",
                    ext.name,
                    ext.params.len(),
                    args.len()
                ),
            ));
        }
        let line = self.external_declaration_line(ext)?;
        self.ctx.declare_external(&line);

        let mut operands = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let v = self.lower_expr(fx, arg.value)?;
            let v = self.ensure_primitive(v);
            let operand = match ext.params.get(i) {
                Some(param) => {
                    let want = self.primitive_type_for(&param.ty, param.span)?;
                    self.coerce_ffi_operand(v, &want)
                }
                // Variadic tail: pass the primitive as-is.
                None => v,
            };
            operands.push(format!("{} {}", operand.info.llvm_type, operand.repr));
        }

        let ret = match &ext.return_type {
            Some(front) => self.primitive_type_for(front, span)?,
            None => "void".to_string(),
        };
        // Call sites repeat any non-C calling convention, and variadic
        // sites spell out the full function type.
        let cc = match ext.calling_convention.as_deref() {
            Some(name) => match types::calling_convention(name) {
                Some("ccc") | None => String::new(),
                Some(attr) => format!("{attr} "),
            },
            None => String::new(),
        };
        let fn_ty = if ext.variadic {
            let mut tys = Vec::with_capacity(ext.params.len());
            for p in &ext.params {
                tys.push(self.primitive_type_for(&p.ty, p.span)?);
            }
            format!("{ret} ({}, ...)", tys.join(", "))
        } else {
            ret.clone()
        };
        let operands = operands.join(", ");
        if ret == "void" {
            self.ctx
                .emit(&format!("call {cc}{fn_ty} @{}({operands})", ext.name));
            return Ok(Value::new("", ValueInfo::of_front("void", "void")));
        }
        let tmp = self.ctx.fresh_temp();
        self.ctx
            .emit(&format!("{tmp} = call {cc}{fn_ty} @{}({operands})", ext.name));
        let front = ext.return_type.clone().unwrap_or_default();
        let info = ValueInfo {
            llvm_type: ret.clone(),
            is_unsigned: types::is_unsigned_front(&front),
            is_float: types::is_float_front(&front),
            front_type: front.clone(),
        };
        self.ctx.record_value(&tmp, info.clone());
        // Rewrap into the declared front wrapper when there is one.
        if types::is_primitive_front(&front) {
            return self.wrap_into(Value::new(tmp, info), &front, span);
        }
        Ok(Value::new(tmp, info))
    }

    /// Match an already-primitive value to an FFI parameter type.
    fn coerce_ffi_operand(&mut self, v: Value, want: &str) -> Value {
        if v.info.llvm_type == *want {
            return v;
        }
        if want == "ptr" && types::classify(&v.info.llvm_type).kind == TypeKind::Int {
            let tmp = self.ctx.fresh_temp();
            self.ctx.emit(&format!(
                "{tmp} = inttoptr {} {} to ptr",
                v.info.llvm_type, v.repr
            ));
            let info = ValueInfo {
                llvm_type: "ptr".to_string(),
                ..v.info
            };
            self.ctx.record_value(&tmp, info.clone());
            return Value::new(tmp, info);
        }
        self.coerce_primitive(v, want)
    }

    fn lower_runtime_call(
        &mut self,
        fx: &mut FnState<'a>,
        name: &str,
        args: &[CallArg],
        span: Span,
    ) -> CodegenResult<Value> {
        let Some((params, ret, variadic)) = runtime::runtime_signature(name) else {
            return Err(self.invariant(span, "runtime helper without a signature"));
        };
        if args.len() < params.len() || (!variadic && args.len() > params.len()) {
            return Err(CodegenError::arity(
                self.location(span),
                format!("`{name}` expects {} arguments", params.len()),
            ));
        }
        let mut operands = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let v = self.lower_expr(fx, arg.value)?;
            let v = self.ensure_primitive(v);
            let operand = match params.get(i) {
                Some(want) => self.coerce_ffi_operand(v, want),
                None => v,
            };
            operands.push(format!("{} {}", operand.info.llvm_type, operand.repr));
        }
        let symbol = runtime::runtime_symbol(name);
        let operands = operands.join(", ");
        // Variadic call sites spell out the full function type.
        let fn_ty = if variadic {
            format!("{ret} ({}, ...)", params.join(", "))
        } else {
            ret.to_string()
        };
        if ret == "void" {
            self.ctx.emit(&format!("call {fn_ty} {symbol}({operands})"));
            return Ok(Value::new("", ValueInfo::of_front("void", "void")));
        }
        let tmp = self.ctx.fresh_temp();
        self.ctx
            .emit(&format!("{tmp} = call {fn_ty} {symbol}({operands})"));
        let info = ValueInfo {
            llvm_type: ret.to_string(),
            is_unsigned: false,
            is_float: ret == "double",
            front_type: match ret {
                "ptr" => "uaddr".to_string(),
                "double" => "f64".to_string(),
                "i32" => "s32".to_string(),
                _ => "s64".to_string(),
            },
        };
        self.ctx.record_value(&tmp, info.clone());
        Ok(Value::new(tmp, info))
    }

    /// A non-generic function from an imported module: called by name,
    /// declared on first use with the wrapper ABI its own unit compiles
    /// with.
    fn imported_function_callee(
        &mut self,
        decl: &'a FunctionDecl,
        span: Span,
    ) -> CodegenResult<Callee> {
        let ret = match &decl.return_type {
            Some(t) => self.llvm_type_for(t, span)?,
            None => "void".to_string(),
        };
        let mut params = Vec::with_capacity(decl.params.len());
        for p in &decl.params {
            params.push(self.llvm_type_for(&p.ty, p.span)?);
        }
        let declare = format!("declare {ret} @{}({})", decl.name, params.join(", "));
        Ok(Callee {
            symbol: decl.name.clone(),
            param_fronts: decl.params.iter().map(|p| p.ty.clone()).collect(),
            return_front: decl.return_type.clone(),
            receiver: None,
            declare: Some(declare),
        })
    }

    // -- template plumbing ---------------------------------------------------

    fn generic_function_callee(
        &mut self,
        base: &str,
        symbol: &str,
        targs: &[String],
        span: Span,
    ) -> CodegenResult<Callee> {
        let Some(template) = self.mono.function_template(base).cloned() else {
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!("no generic template named `{base}`"),
            ));
        };
        let decl = self.template_function_decl(&template, span)?;
        let subst = crate::module::build_subst(&self.template_type_params(&template, decl), targs);
        Ok(Callee {
            symbol: symbol.to_string(),
            param_fronts: decl
                .params
                .iter()
                .map(|p| generics::substitute_type(&p.ty, &subst))
                .collect(),
            return_front: decl
                .return_type
                .as_ref()
                .map(|t| generics::substitute_type(t, &subst)),
            receiver: None,
            declare: None,
        })
    }

    pub(crate) fn template_function_decl(
        &self,
        template: &generics::TemplateRef,
        span: Span,
    ) -> CodegenResult<&'a FunctionDecl> {
        let program = self.module_program(&template.module);
        match program.declarations.get(template.decl_index) {
            Some(Decl::Function(f)) => Ok(f),
            Some(Decl::Record(r)) => template
                .method_index
                .and_then(|mi| r.methods.get(mi))
                .ok_or_else(|| self.invariant(span, "template method index out of range")),
            _ => Err(self.invariant(span, "template declaration index out of range")),
        }
    }

    pub(crate) fn template_type_params(
        &self,
        template: &generics::TemplateRef,
        decl: &FunctionDecl,
    ) -> Vec<String> {
        if !decl.type_params.is_empty() {
            return decl.type_params.clone();
        }
        // Record-body methods substitute over the record's parameters.
        if template.method_index.is_some() {
            let program = self.module_program(&template.module);
            if let Some(Decl::Record(r)) = program.declarations.get(template.decl_index) {
                if !r.type_params.is_empty() {
                    return r.type_params.clone();
                }
            }
        }
        // `Base<P>.m` spellings carry their parameters in the name.
        template_params_from_name(&decl.name)
    }

    /// Make a queued record instantiation's layout visible right away so
    /// constructors and member access can use it before the drain.
    pub(crate) fn ensure_instantiated_layout(&mut self, symbol: &str) -> CodegenResult<()> {
        if self.ctx.layout(symbol).is_some() {
            return Ok(());
        }
        // Emit the layout immediately; the pending queue entry dedupes on
        // the requested set, so the drain skips it.
        let pendings: Vec<_> = std::iter::from_fn(|| self.mono.next_record()).collect();
        for pending in &pendings {
            let program = self.module_program(&pending.template.module);
            let Some(Decl::Record(record)) = program.declarations.get(pending.template.decl_index)
            else {
                continue;
            };
            let subst = crate::module::build_subst(&record.type_params, &pending.args);
            self.register_record_layout(record, &pending.symbol, &subst)?;
        }
        Ok(())
    }

    /// Crashable names end in `Error` or sit in the well-known set.
    pub(crate) fn is_crashable_name(&self, name: &str) -> bool {
        name.ends_with("Error")
            || matches!(
                name,
                "Breach" | "AbsentValue" | "DivideByZero" | "IndexOutOfBounds"
            )
    }
}
