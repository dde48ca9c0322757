//! Shared code generation state.
//!
//! One [`CodegenContext`] lives for the whole compilation: the output
//! buffers, the temp and label counters (shared across all functions and
//! never reset, so nested generation interleaves without collisions), the
//! SSA value-identity table, the record layout table, the string pool, and
//! the deduplicated external-declaration list.

use rustc_hash::{FxHashMap, FxHashSet};

use forge_ir::RecordKind;

use crate::target::TargetSpec;
use crate::types;

/// Identity of an emitted value: everything later operations need to
/// reconstruct signedness, wrapper state, and domain type.
///
/// Keyed by SSA name in [`CodegenContext::temp_types`] and also threaded
/// through lowering results inside [`Value`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueInfo {
    /// LLVM type of the value as emitted (`%u32`, `i32`, `i1`, `ptr`, ...).
    pub llvm_type: String,
    pub is_unsigned: bool,
    pub is_float: bool,
    /// Front-language type name (`u32`, `Point`, `bool`, ...).
    pub front_type: String,
}

impl ValueInfo {
    /// Identity for a value of a front-language type with the given LLVM
    /// representation.
    pub fn of_front(front: impl Into<String>, llvm_type: impl Into<String>) -> Self {
        let front = front.into();
        ValueInfo {
            llvm_type: llvm_type.into(),
            is_unsigned: types::is_unsigned_front(&front),
            is_float: types::is_float_front(&front),
            front_type: front,
        }
    }

    /// Identity for a bare `i1` comparison result.
    pub fn bool_flag() -> Self {
        ValueInfo {
            llvm_type: "i1".to_string(),
            is_unsigned: true,
            is_float: false,
            front_type: "bool".to_string(),
        }
    }

    /// Is the emitted representation a named wrapper/aggregate?
    pub fn is_aggregate(&self) -> bool {
        self.llvm_type.starts_with('%')
    }
}

/// A lowered expression: symbolic value handle plus its identity.
///
/// `repr` is either an SSA name (`%t12`, `%x`) or a constant usable inline
/// as an operand (`42`, `0x4010000000000000`, `true`, `@.str.0`).
#[derive(Clone, Debug)]
pub struct Value {
    pub repr: String,
    pub info: ValueInfo,
}

impl Value {
    pub fn new(repr: impl Into<String>, info: ValueInfo) -> Self {
        Value {
            repr: repr.into(),
            info,
        }
    }
}

/// Field layout of an emitted record or entity type.
#[derive(Clone, Debug)]
pub struct RecordLayout {
    /// Concrete (possibly mangled) type name, without the `%` sigil.
    pub name: String,
    pub kind: RecordKind,
    /// Ordered `(field name, LLVM field type)` pairs.
    pub fields: Vec<(String, String)>,
    /// Ordered `(field name, front-language field type)` pairs, used by
    /// method lookup and member typing.
    pub front_fields: Vec<(String, String)>,
}

impl RecordLayout {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(f, _)| f == name)
    }

    /// Entities and multi-field records pass by pointer; single-field
    /// value records pass by value.
    pub fn passes_by_pointer(&self) -> bool {
        self.kind == RecordKind::Entity || self.fields.len() > 1
    }
}

/// Which buffer function-body text is currently written into.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Sink {
    /// User declarations region.
    Body,
    /// Queued generic instantiations region.
    Generics,
}

/// Global code generation state.
pub struct CodegenContext {
    pub target: TargetSpec,

    /// Named type definitions (`%Point = type { ... }`), in registration
    /// order.
    pub types_buf: String,
    /// Presets and functions, in traversal order.
    pub body_buf: String,
    /// Monomorphized functions, in fixpoint-drain order.
    pub generics_buf: String,
    sink: Sink,

    temp_counter: u32,
    label_counter: u32,

    /// SSA name → value identity. Primary source of truth at lowering
    /// time; expression-attached annotations are the fallback.
    pub temp_types: FxHashMap<String, ValueInfo>,

    /// Concrete type name → layout.
    layouts: FxHashMap<String, RecordLayout>,

    /// String pool: `(global name, literal)` in first-emission order.
    pool: Vec<(String, String)>,
    pool_index: FxHashMap<String, String>,

    /// Discovered declarations (intrinsics, imported functions), one line
    /// each, in discovery order.
    extern_decls: Vec<String>,
    extern_set: FxHashSet<String>,
}

impl CodegenContext {
    pub fn new(target: TargetSpec) -> Self {
        CodegenContext {
            target,
            types_buf: String::new(),
            body_buf: String::new(),
            generics_buf: String::new(),
            sink: Sink::Body,
            temp_counter: 0,
            label_counter: 0,
            temp_types: FxHashMap::default(),
            layouts: FxHashMap::default(),
            pool: Vec::new(),
            pool_index: FxHashMap::default(),
            extern_decls: Vec::new(),
            extern_set: FxHashSet::default(),
        }
    }

    // -- counters -----------------------------------------------------------

    /// Next SSA temporary. The counter is shared by every function in the
    /// module and never resets, so nested generation cannot collide.
    pub fn fresh_temp(&mut self) -> String {
        let n = self.temp_counter;
        self.temp_counter += 1;
        format!("%t{n}")
    }

    /// Next label for the given stem. Suffixes are monotonic in emission
    /// order within a function (the counter is shared and never resets).
    pub fn fresh_label(&mut self, stem: &str) -> String {
        let n = self.label_counter;
        self.label_counter += 1;
        format!("{stem}{n}")
    }

    // -- emission -----------------------------------------------------------

    /// Select the buffer subsequent function text goes to, returning the
    /// previous sink so callers can restore it.
    pub fn select_sink(&mut self, sink: Sink) -> Sink {
        std::mem::replace(&mut self.sink, sink)
    }

    fn out(&mut self) -> &mut String {
        match self.sink {
            Sink::Body => &mut self.body_buf,
            Sink::Generics => &mut self.generics_buf,
        }
    }

    /// Emit one indented instruction line.
    pub fn emit(&mut self, line: &str) {
        let out = self.out();
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }

    /// Emit one unindented line (labels, `define`, `}`).
    pub fn emit_raw(&mut self, line: &str) {
        let out = self.out();
        out.push_str(line);
        out.push('\n');
    }

    // -- value identity -----------------------------------------------------

    /// Record the identity of an SSA name.
    pub fn record_value(&mut self, name: &str, info: ValueInfo) {
        self.temp_types.insert(name.to_string(), info);
    }

    /// Look up the identity of an SSA name.
    pub fn value_info(&self, name: &str) -> Option<&ValueInfo> {
        self.temp_types.get(name)
    }

    // -- record layouts -----------------------------------------------------

    /// Register a layout and emit its named type definition.
    pub fn register_layout(&mut self, layout: RecordLayout) {
        if self.layouts.contains_key(&layout.name) {
            return;
        }
        let fields = layout
            .fields
            .iter()
            .map(|(_, ty)| ty.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        self.types_buf
            .push_str(&format!("%{} = type {{ {} }}\n", layout.name, fields));
        self.layouts.insert(layout.name.clone(), layout);
    }

    pub fn layout(&self, name: &str) -> Option<&RecordLayout> {
        self.layouts.get(name)
    }

    /// Single source of truth for extract/insert: the primitive carried by
    /// a wrapper type, driven by the layout table with the built-in map as
    /// fallback for the well-known wrappers.
    pub fn primitive_for_wrapper(&self, wrapper: &str) -> Option<String> {
        let name = wrapper.strip_prefix('%').unwrap_or(wrapper);
        if let Some(layout) = self.layouts.get(name) {
            if layout.fields.len() == 1 {
                return Some(layout.fields[0].1.clone());
            }
            return None;
        }
        if matches!(name, "saddr" | "uaddr") {
            return Some(self.target.ptr_int.clone());
        }
        types::builtin_primitive(name).map(str::to_string)
    }

    /// Byte size of an LLVM type under natural alignment, for heap
    /// allocation of entities.
    pub fn byte_size(&self, llvm: &str) -> u64 {
        let class = types::classify(llvm);
        match class.kind {
            types::TypeKind::Pointer => u64::from(self.target.ptr_bits) / 8,
            types::TypeKind::Int | types::TypeKind::Float => u64::from(class.bits.max(8)) / 8,
            types::TypeKind::Aggregate => {
                let name = llvm.strip_prefix('%').unwrap_or(llvm);
                let Some(layout) = self.layouts.get(name) else {
                    // Built-in wrappers are the size of their primitive.
                    if let Some(prim) = self.primitive_for_wrapper(name) {
                        return self.byte_size(&prim);
                    }
                    return u64::from(self.target.ptr_bits) / 8;
                };
                let mut size = 0u64;
                let mut align = 1u64;
                for (_, field_ty) in &layout.fields {
                    let field_size = self.byte_size(field_ty);
                    let field_align = field_size.max(1).min(16);
                    size = size.div_ceil(field_align) * field_align;
                    size += field_size;
                    align = align.max(field_align);
                }
                size.div_ceil(align.max(1)) * align.max(1)
            }
        }
    }

    // -- string pool --------------------------------------------------------

    /// Intern a string literal, returning its pooled global name. Identical
    /// literals share one constant; pool order is first-emission order.
    pub fn intern_string(&mut self, literal: &str) -> String {
        if let Some(name) = self.pool_index.get(literal) {
            return name.clone();
        }
        let name = format!("@.str.{}", self.pool.len());
        self.pool.push((name.clone(), literal.to_string()));
        self.pool_index.insert(literal.to_string(), name.clone());
        name
    }

    /// Render the collected pool, spliced after the format-string head.
    pub fn render_pool(&self) -> String {
        let mut out = String::new();
        for (name, literal) in &self.pool {
            let bytes = literal.as_bytes();
            out.push_str(&format!(
                "{name} = private unnamed_addr constant [{} x i8] c\"{}\\00\"\n",
                bytes.len() + 1,
                escape_string(bytes),
            ));
        }
        out
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    // -- external declarations ----------------------------------------------

    /// Add a `declare` line once; later duplicates are dropped.
    pub fn declare_external(&mut self, line: &str) {
        if self.extern_set.insert(line.to_string()) {
            self.extern_decls.push(line.to_string());
        }
    }

    pub fn render_externals(&self) -> String {
        let mut out = String::new();
        for line in &self.extern_decls {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Escape bytes for an LLVM `c"..."` constant.
pub(crate) fn escape_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\{b:02X}"));
        }
    }
    out
}
