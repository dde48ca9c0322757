//! Module generation driver.
//!
//! Orchestrates one compilation: scans crash messages, registers generic
//! templates, visits declarations in program order, drains the pending
//! generic instantiations to fixpoint, and assembles the final IR text in
//! the fixed region order (header, wrapper types, runtime and math
//! declarations, format pool head, string pool, user types and
//! declarations with their discovered externals, queued instantiations,
//! debug name tables).

use std::path::PathBuf;

use tracing::debug;

use forge_diagnostic::{CodegenError, CodegenResult, SourceLocation};
use forge_ir::{
    Decl, ExprKind, ExternalDecl, FunctionDecl, ImportedModules, PresetDecl, Program, RecordDecl,
    RecordKind, Span,
};
use rustc_hash::FxHashMap;

use crate::context::{CodegenContext, RecordLayout, Sink, Value, ValueInfo};
use crate::crash_messages::CrashMessages;
use crate::debug_tables::DebugTables;
use crate::generics::{self, ModuleRef, Monomorphizer, TemplateRef};
use crate::literals;
use crate::runtime;
use crate::scope::{Binding, FnState};
use crate::target::{NativeTarget, TargetPlatform, TargetSpec};
use crate::types;

/// What kind of artifact the module becomes.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum CodegenMode {
    /// Emit a C `main` shim calling the user `main`.
    #[default]
    Executable,
    /// No entry shim.
    Library,
}

/// Compilation inputs beyond the AST itself.
pub struct CodegenOptions {
    pub module_name: String,
    /// Source language identifier, recorded in the module header.
    pub language: String,
    pub mode: CodegenMode,
    /// Root of the stdlib sources for the crash-message resolver.
    pub stdlib_path: Option<PathBuf>,
    pub target: Box<dyn TargetPlatform>,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            module_name: "main".to_string(),
            language: "forge".to_string(),
            mode: CodegenMode::Executable,
            stdlib_path: None,
            target: Box::new(NativeTarget),
        }
    }
}

/// The closed primitive wrapper set, emitted in this order at the module
/// head. `saddr`/`uaddr` widths come from the target.
const WRAPPER_FRONTS: &[&str] = &[
    "bool", "s8", "s16", "s32", "s64", "s128", "u8", "u16", "u32", "u64", "u128", "saddr",
    "uaddr", "f16", "f32", "f64", "f128", "letter8", "letter16", "letter32", "text",
];

/// Single-pass AST visitor producing one textual IR buffer.
pub struct ModuleGenerator<'a> {
    pub(crate) program: &'a Program,
    pub(crate) imports: &'a ImportedModules,
    pub(crate) opts: CodegenOptions,
    pub(crate) ctx: CodegenContext,
    pub(crate) mono: Monomorphizer,
    pub(crate) crash_messages: CrashMessages,
    pub(crate) debug: DebugTables,
    /// Preset name → (front type, LLVM type).
    pub(crate) presets: FxHashMap<String, (String, String)>,
}

impl<'a> ModuleGenerator<'a> {
    pub fn new(program: &'a Program, imports: &'a ImportedModules, opts: CodegenOptions) -> Self {
        let crash_messages = match &opts.stdlib_path {
            Some(path) => CrashMessages::scan(path),
            None => CrashMessages::new(),
        };
        let spec = TargetSpec::capture(opts.target.as_ref());
        ModuleGenerator {
            program,
            imports,
            opts,
            ctx: CodegenContext::new(spec),
            mono: Monomorphizer::new(),
            crash_messages,
            debug: DebugTables::new(),
            presets: FxHashMap::default(),
        }
    }

    /// Generate the module, consuming the generator.
    pub fn run(mut self) -> CodegenResult<String> {
        self.debug.file_id(&self.program.file_name);
        self.register_templates();

        let decl_count = self.program.declarations.len();
        for index in 0..decl_count {
            self.visit_decl(index)?;
        }

        self.drain_generics()?;

        if self.opts.mode == CodegenMode::Executable {
            self.emit_main_shim()?;
        }

        Ok(self.assemble())
    }

    // -- pre-pass -----------------------------------------------------------

    /// Register every generic template (records, functions, methods) from
    /// the current module and all imports. Templates emit nothing until
    /// instantiated.
    fn register_templates(&mut self) {
        self.register_module_templates(ModuleRef::Current);
        let names: Vec<String> = self.imports.keys().cloned().collect();
        for name in names {
            self.register_module_templates(ModuleRef::Import(name));
        }
    }

    fn register_module_templates(&mut self, module: ModuleRef) {
        let program = self.module_program(&module);
        for (index, decl) in program.declarations.iter().enumerate() {
            match decl {
                Decl::Record(record) => {
                    if !record.type_params.is_empty() {
                        self.mono.register_record_template(
                            &record.name,
                            TemplateRef {
                                module: module.clone(),
                                decl_index: index,
                                method_index: None,
                            },
                        );
                        // Methods of a generic record are templates too,
                        // instantiated alongside the record.
                        for (mi, method) in record.methods.iter().enumerate() {
                            let key = format!("{}.{}", record.name, method.name);
                            self.mono.register_function_template(
                                &key,
                                TemplateRef {
                                    module: module.clone(),
                                    decl_index: index,
                                    method_index: Some(mi),
                                },
                            );
                        }
                    } else {
                        for (mi, method) in record.methods.iter().enumerate() {
                            if !method.type_params.is_empty() {
                                let key = format!("{}.{}", record.name, method.name);
                                self.mono.register_function_template(
                                    &key,
                                    TemplateRef {
                                        module: module.clone(),
                                        decl_index: index,
                                        method_index: Some(mi),
                                    },
                                );
                            }
                        }
                    }
                }
                Decl::Function(f) => {
                    if !f.type_params.is_empty() {
                        let key = normalize_template_name(&f.name);
                        self.mono.register_function_template(
                            &key,
                            TemplateRef {
                                module: module.clone(),
                                decl_index: index,
                                method_index: None,
                            },
                        );
                    }
                }
                _ => {}
            }
        }
    }

    // -- declaration visiting -----------------------------------------------

    fn visit_decl(&mut self, index: usize) -> CodegenResult<()> {
        match &self.program.declarations[index] {
            Decl::Record(record) => {
                if record.type_params.is_empty() {
                    self.emit_record(index)?;
                }
            }
            Decl::Function(f) => {
                if f.type_params.is_empty() {
                    self.emit_program_function(index)?;
                }
            }
            Decl::Preset(_) => self.emit_preset(index)?,
            Decl::External(_) => self.declare_program_external(index)?,
            Decl::Import(_) => {}
        }
        Ok(())
    }

    /// Emit a non-generic record/entity: its named type, layout, and
    /// methods.
    fn emit_record(&mut self, index: usize) -> CodegenResult<()> {
        let program: &'a Program = self.program;
        let Decl::Record(record) = &program.declarations[index] else {
            return Err(self.invariant(Span::DUMMY, "declaration index is not a record"));
        };
        self.register_record_layout(record, &record.name, &FxHashMap::default())?;

        for method in &record.methods {
            if !method.type_params.is_empty() {
                continue;
            }
            let symbol = format!("{}.{}", record.name, method.name);
            self.emit_function_body(
                &program.arena,
                method,
                &symbol,
                Some(record.name.clone()),
                FxHashMap::default(),
            )?;
        }
        Ok(())
    }

    /// Register the layout (and type line) for a record declaration under
    /// a concrete name, applying a type substitution for monomorphized
    /// templates.
    pub(crate) fn register_record_layout(
        &mut self,
        record: &RecordDecl,
        concrete_name: &str,
        subst: &FxHashMap<String, String>,
    ) -> CodegenResult<()> {
        if self.ctx.layout(concrete_name).is_some() {
            return Ok(());
        }
        let mut fields = Vec::with_capacity(record.fields.len());
        let mut front_fields = Vec::with_capacity(record.fields.len());
        for field in &record.fields {
            let front = generics::substitute_type(&field.ty, subst);
            let llvm = self.llvm_type_for(&front, field.span)?;
            fields.push((field.name.clone(), llvm));
            front_fields.push((field.name.clone(), front));
        }
        self.debug.type_id(concrete_name);
        self.ctx.register_layout(RecordLayout {
            name: concrete_name.to_string(),
            kind: record.kind,
            fields,
            front_fields,
        });
        Ok(())
    }

    fn emit_program_function(&mut self, index: usize) -> CodegenResult<()> {
        let program: &'a Program = self.program;
        let Decl::Function(decl) = &program.declarations[index] else {
            return Err(self.invariant(Span::DUMMY, "declaration index is not a function"));
        };
        let symbol = if decl.name == "main" && self.opts.mode == CodegenMode::Executable {
            "forge_main".to_string()
        } else {
            decl.name.clone()
        };
        self.emit_function_body(&program.arena, decl, &symbol, None, FxHashMap::default())
    }

    fn emit_preset(&mut self, index: usize) -> CodegenResult<()> {
        let Decl::Preset(preset) = &self.program.declarations[index] else {
            return Err(self.invariant(Span::DUMMY, "declaration index is not a preset"));
        };
        let preset: &'a PresetDecl = preset;
        let expr = self.program.arena.expr(preset.value);
        let front = preset
            .ty
            .clone()
            .or_else(|| expr.resolved_type.clone())
            .unwrap_or_else(|| default_literal_front(&expr.kind).to_string());
        let llvm = self.llvm_type_for(&front, preset.span)?;
        let Some(prim) = self.ctx.primitive_for_wrapper(&llvm) else {
            return Err(CodegenError::unsupported(
                self.location(preset.span),
                format!("preset `{}` must have a primitive wrapper type", preset.name),
            ));
        };

        let constant = match &expr.kind {
            ExprKind::Int(n) => n.to_string(),
            ExprKind::Float(v) => literals::float_constant(&prim, *v),
            ExprKind::Bool(b) => b.to_string(),
            ExprKind::Letter(c) => u32::from(*c).to_string(),
            ExprKind::Text(s) => self.ctx.intern_string(s),
            ExprKind::Unary {
                op: forge_ir::UnaryOp::Neg,
                operand,
            } => match &self.program.arena.expr(*operand).kind {
                ExprKind::Int(n) => (-n).to_string(),
                ExprKind::Float(v) => literals::float_constant(&prim, -v),
                _ => {
                    return Err(CodegenError::unsupported(
                        self.location(preset.span),
                        "preset initializers must be literal constants",
                    ))
                }
            },
            _ => {
                return Err(CodegenError::unsupported(
                    self.location(preset.span),
                    "preset initializers must be literal constants",
                ))
            }
        };

        self.ctx.emit_raw(&format!(
            "@{} = constant {} {{ {} {} }}",
            preset.name, llvm, prim, constant
        ));
        self.ctx.emit_raw("");
        self.presets.insert(preset.name.clone(), (front, llvm));
        Ok(())
    }

    fn declare_program_external(&mut self, index: usize) -> CodegenResult<()> {
        let Decl::External(ext) = &self.program.declarations[index] else {
            return Err(self.invariant(Span::DUMMY, "declaration index is not an external"));
        };
        let ext: &'a ExternalDecl = ext;
        let line = self.external_declaration_line(ext)?;
        self.ctx.declare_external(&line);
        Ok(())
    }

    /// Render a `declare` line for a foreign function. Externals take and
    /// return bare primitives.
    pub(crate) fn external_declaration_line(
        &mut self,
        ext: &ExternalDecl,
    ) -> CodegenResult<String> {
        let ret = match &ext.return_type {
            Some(front) => self.primitive_type_for(front, ext.span)?,
            None => "void".to_string(),
        };
        let mut params = Vec::with_capacity(ext.params.len());
        for p in &ext.params {
            params.push(self.primitive_type_for(&p.ty, p.span)?);
        }
        if ext.variadic {
            params.push("...".to_string());
        }
        let cc = match &ext.calling_convention {
            Some(name) => {
                let Some(attr) = types::calling_convention(name) else {
                    return Err(CodegenError::type_resolution(
                        self.location(ext.span),
                        format!("unknown calling convention `{name}`"),
                    ));
                };
                if attr == "ccc" {
                    String::new()
                } else {
                    format!("{attr} ")
                }
            }
            None => String::new(),
        };
        Ok(format!(
            "declare {cc}{ret} @{}({})",
            ext.name,
            params.join(", ")
        ))
    }

    // -- generic fixpoint ---------------------------------------------------

    /// Drain the pending-instantiation queues until empty. Each drained
    /// item may enqueue more.
    fn drain_generics(&mut self) -> CodegenResult<()> {
        while self.mono.has_pending() {
            while let Some(pending) = self.mono.next_record() {
                self.instantiate_record(&pending)?;
            }
            while let Some(pending) = self.mono.next_function() {
                self.instantiate_function(&pending)?;
            }
        }
        Ok(())
    }

    fn instantiate_record(&mut self, pending: &generics::Pending) -> CodegenResult<()> {
        let program = self.module_program(&pending.template.module);
        let Some(Decl::Record(record)) = program.declarations.get(pending.template.decl_index)
        else {
            return Err(self.invariant(Span::DUMMY, "record template index out of range"));
        };
        let subst = build_subst(&record.type_params, &pending.args);
        debug!(symbol = %pending.symbol, "instantiating record template");
        self.register_record_layout(record, &pending.symbol, &subst)?;
        Ok(())
    }

    fn instantiate_function(&mut self, pending: &generics::Pending) -> CodegenResult<()> {
        let program = self.module_program(&pending.template.module);
        let decl = match program.declarations.get(pending.template.decl_index) {
            Some(Decl::Function(f)) => f,
            Some(Decl::Record(r)) => match pending.template.method_index {
                Some(mi) => match r.methods.get(mi) {
                    Some(m) => m,
                    None => {
                        return Err(
                            self.invariant(Span::DUMMY, "method template index out of range")
                        )
                    }
                },
                None => {
                    return Err(self.invariant(Span::DUMMY, "record template used as function"))
                }
            },
            _ => return Err(self.invariant(Span::DUMMY, "function template index out of range")),
        };
        let type_params = self.template_type_params(&pending.template, decl);
        let subst = build_subst(&type_params, &pending.args);
        debug!(symbol = %pending.symbol, "instantiating function template");

        // Method templates take their (substituted) receiver first.
        let receiver = pending.template.method_index.and_then(|_| {
            pending
                .symbol
                .rsplit_once('.')
                .map(|(ty, _)| ty.to_string())
        });

        let previous = self.ctx.select_sink(Sink::Generics);
        let result = self.emit_function_body(&program.arena, decl, &pending.symbol, receiver, subst);
        self.ctx.select_sink(previous);
        result
    }

    // -- assembly -----------------------------------------------------------

    fn wrapper_type_block(&self) -> String {
        let mut out = String::new();
        for front in WRAPPER_FRONTS {
            let prim = self
                .ctx
                .primitive_for_wrapper(front)
                .unwrap_or_else(|| "ptr".to_string());
            out.push_str(&format!("%{front} = type {{ {prim} }}\n"));
        }
        out
    }

    fn assemble(self) -> String {
        let mut out = String::new();
        out.push_str(&format!("; ModuleID = '{}'\n", self.opts.module_name));
        out.push_str(&format!("source_filename = \"{}\"\n", self.program.file_name));
        out.push_str(&format!(
            "target datalayout = \"{}\"\n",
            self.ctx.target.data_layout
        ));
        out.push_str(&format!("target triple = \"{}\"\n", self.ctx.target.triple));
        out.push_str(&format!("; source language: {}\n\n", self.opts.language));

        out.push_str(&self.wrapper_type_block());
        out.push('\n');
        out.push_str(runtime::RUNTIME_DECLARATIONS);
        out.push('\n');
        out.push_str(runtime::MATH_DECLARATIONS);
        out.push('\n');
        out.push_str(runtime::FORMAT_POOL_HEAD);
        out.push_str(&self.ctx.render_pool());
        out.push('\n');
        if !self.ctx.types_buf.is_empty() {
            out.push_str(&self.ctx.types_buf);
            out.push('\n');
        }
        out.push_str(&self.ctx.body_buf);
        // Discovered declarations (intrinsics, imported symbols) close the
        // user region, ahead of the queued instantiations.
        let externals = self.ctx.render_externals();
        if !externals.is_empty() {
            out.push_str(&externals);
            out.push('\n');
        }
        out.push_str(&self.ctx.generics_buf);
        out.push_str(&self.render_debug_tables());
        out
    }

    /// Name tables the stack-trace runtime resolves ids against, one
    /// private constant per registered name, in id order.
    fn render_debug_tables(&self) -> String {
        let mut out = String::new();
        for (table, names) in [
            ("file", self.debug.files()),
            ("routine", self.debug.routines()),
            ("type", self.debug.types()),
        ] {
            for (id, name) in names.iter().enumerate() {
                let bytes = name.as_bytes();
                out.push_str(&format!(
                    "@.dbg.{table}.{id} = private unnamed_addr constant [{} x i8] c\"{}\\00\"\n",
                    bytes.len() + 1,
                    crate::context::escape_string(bytes),
                ));
            }
        }
        out
    }

    /// Append the C entry shim calling the user `main`.
    fn emit_main_shim(&mut self) -> CodegenResult<()> {
        let Some(user_main) = self.find_function("main") else {
            return Ok(());
        };
        let previous = self.ctx.select_sink(Sink::Generics);
        self.ctx.emit_raw("define i32 @main() {");
        self.ctx.emit_raw("entry:");
        match &user_main.return_type {
            None => {
                self.ctx.emit("call void @forge_main()");
                self.ctx.emit("ret i32 0");
            }
            Some(front) => {
                let llvm = self.llvm_type_for(front, user_main.span)?;
                let ret = self.ctx.fresh_temp();
                self.ctx
                    .emit(&format!("{ret} = call {llvm} @forge_main()"));
                match self.ctx.primitive_for_wrapper(&llvm) {
                    Some(prim) if types::classify(&prim).kind == types::TypeKind::Int => {
                        let code = self.ctx.fresh_temp();
                        self.ctx.emit(&format!(
                            "{code} = extractvalue {llvm} {ret}, 0"
                        ));
                        let bits = types::classify(&prim).bits;
                        if bits == 32 {
                            self.ctx.emit(&format!("ret i32 {code}"));
                        } else {
                            let resized = self.ctx.fresh_temp();
                            let op = if bits > 32 { "trunc" } else { "sext" };
                            self.ctx.emit(&format!(
                                "{resized} = {op} {prim} {code} to i32"
                            ));
                            self.ctx.emit(&format!("ret i32 {resized}"));
                        }
                    }
                    _ => self.ctx.emit("ret i32 0"),
                }
            }
        }
        self.ctx.emit_raw("}");
        self.ctx.emit_raw("");
        self.ctx.select_sink(previous);
        Ok(())
    }

    // -- shared lookups and helpers -----------------------------------------

    pub(crate) fn module_program(&self, module: &ModuleRef) -> &'a Program {
        match module {
            ModuleRef::Current => self.program,
            ModuleRef::Import(name) => self
                .imports
                .get(name)
                .map_or(self.program, |m| &m.program),
        }
    }

    /// Find a top-level function by exact name in the current module.
    pub(crate) fn find_function(&self, name: &str) -> Option<&'a FunctionDecl> {
        let program: &'a Program = self.program;
        program.declarations.iter().find_map(|d| match d {
            Decl::Function(f) if f.name == name => Some(f),
            _ => None,
        })
    }

    /// Find a function by exact name in an imported module.
    pub(crate) fn find_imported_function(
        &self,
        name: &str,
    ) -> Option<(String, &'a FunctionDecl)> {
        for (module_name, module) in self.imports {
            let module: &'a forge_ir::ImportedModule = module;
            for decl in &module.program.declarations {
                if let Decl::Function(f) = decl {
                    if f.name == name && f.type_params.is_empty() {
                        return Some((module_name.clone(), f));
                    }
                }
            }
        }
        None
    }

    /// Find an external declaration in the current module, then imports.
    pub(crate) fn find_external(&self, name: &str) -> Option<&'a ExternalDecl> {
        let program: &'a Program = self.program;
        let current = program.declarations.iter().find_map(|d| match d {
            Decl::External(e) if e.name == name => Some(e),
            _ => None,
        });
        if current.is_some() {
            return current;
        }
        for module in self.imports.values() {
            let module: &'a forge_ir::ImportedModule = module;
            for decl in &module.program.declarations {
                if let Decl::External(e) = decl {
                    if e.name == name {
                        return Some(e);
                    }
                }
            }
        }
        None
    }

    /// Find a record declaration by base name, current module first.
    pub(crate) fn find_record(&self, name: &str) -> Option<(ModuleRef, &'a RecordDecl)> {
        let program: &'a Program = self.program;
        for decl in &program.declarations {
            if let Decl::Record(r) = decl {
                if r.name == name {
                    return Some((ModuleRef::Current, r));
                }
            }
        }
        for (module_name, module) in self.imports {
            let module: &'a forge_ir::ImportedModule = module;
            for decl in &module.program.declarations {
                if let Decl::Record(r) = decl {
                    if r.name == name {
                        return Some((ModuleRef::Import(module_name.clone()), r));
                    }
                }
            }
        }
        None
    }

    /// Map a front-language type name to its LLVM type.
    ///
    /// Primitive names map to wrapper references; LLVM names pass through;
    /// generic names queue an instantiation and map to the mangled type;
    /// entity names map to `ptr`. Unknown names are fatal.
    pub(crate) fn llvm_type_for(&mut self, front: &str, span: Span) -> CodegenResult<String> {
        self.llvm_type_impl(front, span, false)
    }

    /// Like [`Self::llvm_type_for`], but unknown names become `ptr`
    /// (generic type parameters before substitution).
    pub(crate) fn llvm_type_or_ptr(&mut self, front: &str, span: Span) -> String {
        self.llvm_type_impl(front, span, true)
            .unwrap_or_else(|_| "ptr".to_string())
    }

    fn llvm_type_impl(
        &mut self,
        front: &str,
        span: Span,
        lenient: bool,
    ) -> CodegenResult<String> {
        if front == "void" {
            return Ok("void".to_string());
        }
        if types::is_llvm_type_name(front) {
            return Ok(front.to_string());
        }
        if types::is_primitive_front(front) {
            return Ok(format!("%{front}"));
        }
        if let Some((base, args)) = generics::parse_generic_name(front) {
            if let Some(symbol) = self.mono.request_record(base, &args) {
                let kind = self
                    .mono
                    .record_template(base)
                    .map(|t| self.template_record_kind(t))
                    .unwrap_or(RecordKind::Value);
                return Ok(match kind {
                    RecordKind::Entity => "ptr".to_string(),
                    RecordKind::Value => format!("%{symbol}"),
                });
            }
            if lenient {
                return Ok("ptr".to_string());
            }
            return Err(CodegenError::type_resolution(
                self.location(span),
                format!("no generic template named `{base}`"),
            ));
        }
        if let Some(layout) = self.ctx.layout(front) {
            return Ok(match layout.kind {
                RecordKind::Entity => "ptr".to_string(),
                RecordKind::Value => format!("%{front}"),
            });
        }
        if let Some((_, record)) = self.find_record(front) {
            if record.type_params.is_empty() {
                // Declared later in the unit; the named type resolves
                // textually once its definition is emitted.
                return Ok(match record.kind {
                    RecordKind::Entity => "ptr".to_string(),
                    RecordKind::Value => format!("%{front}"),
                });
            }
        }
        if lenient {
            return Ok("ptr".to_string());
        }
        Err(CodegenError::type_resolution(
            self.location(span),
            format!("unknown type name `{front}`"),
        ))
    }

    fn template_record_kind(&self, template: &TemplateRef) -> RecordKind {
        let program = self.module_program(&template.module);
        match program.declarations.get(template.decl_index) {
            Some(Decl::Record(r)) => r.kind,
            _ => RecordKind::Value,
        }
    }

    /// The bare primitive for a front type, for FFI boundaries.
    pub(crate) fn primitive_type_for(&mut self, front: &str, span: Span) -> CodegenResult<String> {
        if types::is_llvm_type_name(front) {
            return Ok(front.to_string());
        }
        // C interop widths vary by OS; the injected target answers.
        match front {
            "clong" => return Ok(self.ctx.target.long.clone()),
            "cwchar" => return Ok(self.ctx.target.wchar.clone()),
            _ => {}
        }
        let llvm = self.llvm_type_for(front, span)?;
        if llvm == "ptr" {
            return Ok(llvm);
        }
        self.ctx.primitive_for_wrapper(&llvm).ok_or_else(|| {
            CodegenError::type_resolution(
                self.location(span),
                format!("`{front}` has no primitive representation for FFI"),
            )
        })
    }

    pub(crate) fn location(&self, span: Span) -> SourceLocation {
        SourceLocation::new(
            self.program.file_name.clone(),
            span.line,
            span.column,
            span.start,
        )
    }

    pub(crate) fn invariant(&self, span: Span, message: &str) -> CodegenError {
        CodegenError::invariant(self.location(span), message)
    }

    // -- function emission --------------------------------------------------

    /// Emit one function definition: signature, entry block, body, and a
    /// synthesized default return when the final block falls through.
    pub(crate) fn emit_function_body(
        &mut self,
        arena: &'a forge_ir::AstArena,
        decl: &'a FunctionDecl,
        symbol: &str,
        receiver_front: Option<String>,
        subst: FxHashMap<String, String>,
    ) -> CodegenResult<()> {
        self.debug.routine_id(symbol);

        let return_front = decl
            .return_type
            .as_ref()
            .map(|t| generics::substitute_type(t, &subst));
        let return_llvm = match &return_front {
            Some(front) => self.llvm_type_for(front, decl.span)?,
            None => "void".to_string(),
        };

        let mut fx = FnState::new(arena, symbol, return_front, return_llvm.clone());
        fx.type_subst = subst;

        // Receiver first, then declared parameters.
        let mut param_text = Vec::new();
        if let Some(recv_front) = receiver_front {
            let (llvm, by_pointer) = self.receiver_param_type(&recv_front, decl.span)?;
            let ssa = "%self".to_string();
            let info = if by_pointer {
                ValueInfo {
                    llvm_type: "ptr".to_string(),
                    is_unsigned: false,
                    is_float: false,
                    front_type: recv_front.clone(),
                }
            } else {
                ValueInfo::of_front(recv_front.clone(), llvm.clone())
            };
            param_text.push(format!("{} {}", info.llvm_type, ssa));
            self.ctx.record_value(&ssa, info.clone());
            fx.params.insert("self".to_string());
            fx.vars.insert(
                "self".to_string(),
                Binding::Param {
                    ssa,
                    llvm_type: info.llvm_type,
                    front_type: recv_front,
                },
            );
        }
        for param in &decl.params {
            let front = fx.subst_type(&param.ty);
            // Explicit `self` parameters follow the receiver rule:
            // multi-field receivers come in by pointer.
            let llvm = if param.name == "self" {
                self.receiver_param_type(&front, param.span)?.0
            } else {
                self.llvm_type_for(&front, param.span)?
            };
            let ssa = format!("%{}", param.name);
            let info = if llvm == "ptr" {
                ValueInfo {
                    llvm_type: llvm.clone(),
                    is_unsigned: false,
                    is_float: false,
                    front_type: front.clone(),
                }
            } else {
                ValueInfo::of_front(front.clone(), llvm.clone())
            };
            param_text.push(format!("{llvm} {ssa}"));
            self.ctx.record_value(&ssa, info);
            fx.params.insert(param.name.clone());
            fx.vars.insert(
                param.name.clone(),
                Binding::Param {
                    ssa,
                    llvm_type: llvm,
                    front_type: front,
                },
            );
        }

        self.ctx.emit_raw(&format!(
            "define {return_llvm} @{symbol}({}) {{",
            param_text.join(", ")
        ));
        self.ctx.emit_raw("entry:");

        for stmt in &decl.body {
            self.lower_stmt(&mut fx, *stmt)?;
        }

        if !fx.block_terminated {
            if fx.return_llvm == "void" {
                self.ctx.emit("ret void");
            } else if fx.has_return {
                // Every live path returned; the dangling block (e.g. the
                // join after an if/else whose arms both return) just needs
                // a terminator.
                self.ctx.emit("unreachable");
            } else {
                let llvm = fx.return_llvm.clone();
                self.ctx.emit(&format!("ret {llvm} zeroinitializer"));
            }
        }

        self.ctx.emit_raw("}");
        self.ctx.emit_raw("");
        Ok(())
    }

    /// Receiver IR type: multi-field records and entities by pointer,
    /// single-field wrappers by value.
    pub(crate) fn receiver_param_type(
        &mut self,
        front: &str,
        span: Span,
    ) -> CodegenResult<(String, bool)> {
        let llvm = self.llvm_type_for(front, span)?;
        if llvm == "ptr" {
            return Ok(("ptr".to_string(), true));
        }
        let name = llvm.strip_prefix('%').unwrap_or(&llvm);
        if let Some(layout) = self.ctx.layout(name) {
            if layout.passes_by_pointer() {
                return Ok(("ptr".to_string(), true));
            }
        }
        Ok((llvm, false))
    }

    // -- block helpers ------------------------------------------------------

    /// Start a new basic block: emit the label, reset the termination
    /// flag, and record the block for phi predecessor accounting.
    pub(crate) fn start_block(&mut self, fx: &mut FnState<'a>, label: &str) {
        self.ctx.emit_raw(&format!("{label}:"));
        fx.current_block = label.to_string();
        fx.block_terminated = false;
    }

    /// Branch unconditionally unless the block already terminated.
    pub(crate) fn branch(&mut self, fx: &mut FnState<'a>, target: &str) {
        if fx.block_terminated {
            return;
        }
        self.ctx.emit(&format!("br label %{target}"));
        fx.block_terminated = true;
    }

    /// Conditional branch; the condition must already be a bare `i1`.
    pub(crate) fn branch_cond(
        &mut self,
        fx: &mut FnState<'a>,
        cond: &str,
        then_label: &str,
        else_label: &str,
    ) {
        if fx.block_terminated {
            return;
        }
        self.ctx.emit(&format!(
            "br i1 {cond}, label %{then_label}, label %{else_label}"
        ));
        fx.block_terminated = true;
    }

    /// Emit `ret`, tracking the flags the driver consults for default
    /// return synthesis.
    pub(crate) fn emit_ret(&mut self, fx: &mut FnState<'a>, value: Option<&Value>) {
        match value {
            Some(v) => {
                let ty = &v.info.llvm_type;
                let repr = &v.repr;
                self.ctx.emit(&format!("ret {ty} {repr}"));
            }
            None => self.ctx.emit("ret void"),
        }
        fx.block_terminated = true;
        fx.has_return = true;
    }
}

/// `Stack<P>.push` → key `Stack.push`; plain names pass through.
pub(crate) fn normalize_template_name(name: &str) -> String {
    match (name.find('<'), name.rfind(">.")) {
        (Some(open), Some(close)) if close > open => {
            format!("{}{}", &name[..open], &name[close + 1..])
        }
        _ => name.to_string(),
    }
}

/// Extract `[P, Q]` from a `Base<P, Q>.m` spelling when the declaration
/// itself carries no type parameter list.
pub(crate) fn template_params_from_name(name: &str) -> Vec<String> {
    match (name.find('<'), name.rfind('>')) {
        (Some(open), Some(close)) if close > open => name[open + 1..close]
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Build a parameter → argument substitution map.
pub(crate) fn build_subst(params: &[String], args: &[String]) -> FxHashMap<String, String> {
    params
        .iter()
        .cloned()
        .zip(args.iter().cloned())
        .collect()
}

/// Default front type of an untyped literal.
pub(crate) fn default_literal_front(kind: &ExprKind) -> &'static str {
    match kind {
        ExprKind::Float(_) => "f64",
        ExprKind::Bool(_) => "bool",
        ExprKind::Text(_) => "text",
        ExprKind::Letter(_) => "letter32",
        _ => "s64",
    }
}
