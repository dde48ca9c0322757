//! Generic template registry and monomorphization queue.
//!
//! Templates are registered at declaration time and never emitted as-is.
//! Call sites and type references request instantiations; each request is
//! mangled, deduplicated, and queued. The driver drains the queues to
//! fixpoint after the main traversal (drained items may enqueue more).

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

/// Which module a template was declared in.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ModuleRef {
    Current,
    Import(String),
}

/// Where a template's declaration lives, so it can be fetched without
/// holding AST references across the compilation.
#[derive(Clone, Debug)]
pub struct TemplateRef {
    pub module: ModuleRef,
    /// Index into the module's declaration list.
    pub decl_index: usize,
    /// Index into the record's method list, for templated methods.
    pub method_index: Option<usize>,
}

/// A queued instantiation.
#[derive(Clone, Debug)]
pub struct Pending {
    pub template: TemplateRef,
    /// Mangled symbol/type name the instantiation emits under.
    pub symbol: String,
    /// Concrete type arguments, in parameter order.
    pub args: Vec<String>,
}

/// Template registry plus pending-instantiation FIFOs.
#[derive(Default)]
pub struct Monomorphizer {
    record_templates: FxHashMap<String, TemplateRef>,
    function_templates: FxHashMap<String, TemplateRef>,
    /// Mangled names already queued or emitted; at most one IR definition
    /// per mangled name.
    requested: FxHashSet<String>,
    /// Mangled type name → `(base, args)`, so values tracked under their
    /// concrete name still resolve template methods.
    instantiations: FxHashMap<String, (String, Vec<String>)>,
    pending_records: VecDeque<Pending>,
    pending_functions: VecDeque<Pending>,
}

impl Monomorphizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_record_template(&mut self, name: &str, template: TemplateRef) {
        self.record_templates
            .entry(name.to_string())
            .or_insert(template);
    }

    pub fn register_function_template(&mut self, name: &str, template: TemplateRef) {
        self.function_templates
            .entry(name.to_string())
            .or_insert(template);
    }

    pub fn record_template(&self, name: &str) -> Option<&TemplateRef> {
        self.record_templates.get(name)
    }

    pub fn function_template(&self, name: &str) -> Option<&TemplateRef> {
        self.function_templates.get(name)
    }

    /// Queue a record/entity instantiation, returning its mangled type
    /// name. Requesting the same pair twice queues once.
    pub fn request_record(&mut self, base: &str, args: &[String]) -> Option<String> {
        let template = self.record_templates.get(base)?.clone();
        let symbol = mangle(base, args);
        if self.requested.insert(symbol.clone()) {
            self.instantiations
                .insert(symbol.clone(), (base.to_string(), args.to_vec()));
            self.pending_records.push_back(Pending {
                template,
                symbol: symbol.clone(),
                args: args.to_vec(),
            });
        }
        Some(symbol)
    }

    /// The `(base, args)` pair a mangled type name was instantiated from.
    pub fn instantiation_of(&self, symbol: &str) -> Option<&(String, Vec<String>)> {
        self.instantiations.get(symbol)
    }

    /// Queue a generic function instantiation under the given symbol.
    pub fn request_function_symbol(
        &mut self,
        template: TemplateRef,
        symbol: &str,
        args: &[String],
    ) {
        if self.requested.insert(symbol.to_string()) {
            self.pending_functions.push_back(Pending {
                template,
                symbol: symbol.to_string(),
                args: args.to_vec(),
            });
        }
    }

    /// Queue a free generic function instantiation, returning its mangled
    /// symbol.
    pub fn request_function(&mut self, base: &str, args: &[String]) -> Option<String> {
        let template = self.function_templates.get(base)?.clone();
        let symbol = mangle(base, args);
        self.request_function_symbol(template, &symbol, args);
        Some(symbol)
    }

    pub fn next_record(&mut self) -> Option<Pending> {
        self.pending_records.pop_front()
    }

    pub fn next_function(&mut self) -> Option<Pending> {
        self.pending_functions.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_records.is_empty() || !self.pending_functions.is_empty()
    }
}

/// Mangle `Base<Arg1, Arg2>` to `Base_Arg1_Arg2`. Nested generic
/// arguments are sanitized by replacing `<`, `>`, `,` (and spaces) with
/// `_`.
pub fn mangle(base: &str, args: &[String]) -> String {
    let mut out = sanitize(base);
    for arg in args {
        out.push('_');
        out.push_str(&sanitize(arg));
    }
    out
}

/// Replace generic punctuation with `_` so the name is a plain IR
/// identifier.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ',' | ' ' => '_',
            other => other,
        })
        .collect()
}

/// Split `Base<A, B<C>>` into `("Base", ["A", "B<C>"])`. Returns `None`
/// for non-generic names.
pub fn parse_generic_name(name: &str) -> Option<(&str, Vec<String>)> {
    let open = name.find('<')?;
    let close = name.rfind('>')?;
    if close < open {
        return None;
    }
    let base = &name[..open];
    let inner = &name[open + 1..close];
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(inner[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = inner[start..].trim();
    if !last.is_empty() {
        args.push(last.to_string());
    }
    Some((base, args))
}

/// Substitute type-parameter names inside a type name: identifiers that
/// appear in the map are replaced, punctuation and unknown names pass
/// through. `List<T>` with `T → u8` becomes `List<u8>`.
pub fn substitute_type(name: &str, map: &FxHashMap<String, String>) -> String {
    let mut out = String::with_capacity(name.len());
    let mut ident = String::new();
    for c in name.chars() {
        if c.is_alphanumeric() || c == '_' {
            ident.push(c);
        } else {
            flush_ident(&mut out, &mut ident, map);
            out.push(c);
        }
    }
    flush_ident(&mut out, &mut ident, map);
    out
}

fn flush_ident(out: &mut String, ident: &mut String, map: &FxHashMap<String, String>) {
    if ident.is_empty() {
        return;
    }
    match map.get(ident.as_str()) {
        Some(replacement) => out.push_str(replacement),
        None => out.push_str(ident),
    }
    ident.clear();
}
