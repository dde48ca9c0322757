//! Per-function lowering state.
//!
//! Bindings live in an `im::HashMap` so a nested block scope is an O(1)
//! structural-sharing clone: enter a block by saving `vars`, restore it on
//! exit, and shadowing inside the block never leaks out.
//!
//! Parameters start as immutable SSA inputs. The first assignment to one
//! materializes it: a stack slot is allocated, the incoming value stored,
//! and every later read goes through the slot.

use im::HashMap as ImHashMap;
use rustc_hash::{FxHashMap, FxHashSet};

use forge_ir::AstArena;

/// How a variable is reachable in IR.
#[derive(Clone, Debug)]
pub enum Binding {
    /// Function parameter still in SSA form (never assigned).
    Param {
        ssa: String,
        llvm_type: String,
        front_type: String,
    },
    /// Stack slot: `ptr` is the alloca, `llvm_type` the pointee.
    Slot {
        ptr: String,
        llvm_type: String,
        front_type: String,
    },
}

impl Binding {
    pub fn front_type(&self) -> &str {
        match self {
            Binding::Param { front_type, .. } | Binding::Slot { front_type, .. } => front_type,
        }
    }
}

/// State scoped to one function definition.
pub struct FnState<'a> {
    /// Arena owning this function's body nodes (the current module's, or
    /// an imported module's for monomorphized templates).
    pub arena: &'a AstArena,

    /// Emitted symbol name (`foo`, `Point.length`, `identity_u64`).
    pub fn_name: String,

    /// Front-language return type; `None` for void routines.
    pub return_front: Option<String>,
    /// LLVM return type (`void` or a wrapper reference).
    pub return_llvm: String,

    /// Lexical bindings; cloned wholesale on block entry.
    pub vars: ImHashMap<String, Binding>,

    /// Names declared as parameters (materialization bookkeeping).
    pub params: FxHashSet<String>,
    /// Parameters that have been promoted to stack slots.
    pub materialized: FxHashSet<String>,

    /// Per-name counter so shadowed slots get distinct IR names.
    slot_counters: FxHashMap<String, u32>,

    /// Type-parameter substitution for monomorphized bodies; empty
    /// otherwise.
    pub type_subst: FxHashMap<String, String>,

    /// The current basic block already ended with a terminator.
    pub block_terminated: bool,
    /// A `ret` was emitted somewhere along the primary path.
    pub has_return: bool,
    /// Label of the block instructions are currently appended to, for phi
    /// predecessor accounting.
    pub current_block: String,
}

impl<'a> FnState<'a> {
    pub fn new(
        arena: &'a AstArena,
        fn_name: impl Into<String>,
        return_front: Option<String>,
        return_llvm: impl Into<String>,
    ) -> Self {
        FnState {
            arena,
            fn_name: fn_name.into(),
            return_front,
            return_llvm: return_llvm.into(),
            vars: ImHashMap::new(),
            params: FxHashSet::default(),
            materialized: FxHashSet::default(),
            slot_counters: FxHashMap::default(),
            type_subst: FxHashMap::default(),
            block_terminated: false,
            has_return: false,
            current_block: "entry".to_string(),
        }
    }

    /// Apply the active type-parameter substitution to a front-language
    /// type name. Identity outside monomorphized bodies.
    pub fn subst_type(&self, name: &str) -> String {
        if self.type_subst.is_empty() {
            return name.to_string();
        }
        crate::generics::substitute_type(name, &self.type_subst)
    }

    /// A fresh, unique stack-slot name for `name`.
    pub fn slot_name(&mut self, name: &str) -> String {
        let n = self.slot_counters.entry(name.to_string()).or_insert(0);
        *n += 1;
        if *n == 1 {
            format!("%{name}.addr")
        } else {
            format!("%{name}.addr{n}")
        }
    }

    /// Snapshot the bindings for block entry. O(1).
    pub fn enter_block(&self) -> ImHashMap<String, Binding> {
        self.vars.clone()
    }

    /// Restore a snapshot on block exit.
    pub fn exit_block(&mut self, saved: ImHashMap<String, Binding>) {
        self.vars = saved;
    }
}

#[cfg(test)]
mod tests {
    use forge_ir::AstArena;

    use super::*;

    #[test]
    fn block_scopes_restore_shadowed_bindings() {
        let arena = AstArena::new();
        let mut fx = FnState::new(&arena, "f", None, "void");
        fx.vars.insert(
            "x".to_string(),
            Binding::Slot {
                ptr: "%x.addr".to_string(),
                llvm_type: "%u32".to_string(),
                front_type: "u32".to_string(),
            },
        );

        let saved = fx.enter_block();
        fx.vars.insert(
            "x".to_string(),
            Binding::Slot {
                ptr: "%x.addr2".to_string(),
                llvm_type: "%u64".to_string(),
                front_type: "u64".to_string(),
            },
        );
        assert_eq!(fx.vars["x"].front_type(), "u64");

        fx.exit_block(saved);
        assert_eq!(fx.vars["x"].front_type(), "u32");
    }

    #[test]
    fn slot_names_stay_unique_under_shadowing() {
        let arena = AstArena::new();
        let mut fx = FnState::new(&arena, "f", None, "void");
        assert_eq!(fx.slot_name("x"), "%x.addr");
        assert_eq!(fx.slot_name("x"), "%x.addr2");
        assert_eq!(fx.slot_name("y"), "%y.addr");
    }
}
