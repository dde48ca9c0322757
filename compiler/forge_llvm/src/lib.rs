//! LLVM textual IR backend for the Forge compiler.
//!
//! A single-pass AST visitor that lowers a typed program to one textual
//! IR buffer. The engine never links against LLVM: expressions return
//! SSA-name strings, a side table tracks each name's wrapper state and
//! domain type, and the driver assembles the module regions in a fixed
//! order so identical inputs produce byte-identical IR.
//!
//! # Module Organization
//!
//! ```text
//! target.rs          — platform queries (pointer width, wchar, triple)
//! types.rs           — front-type classification and name mapping
//! context.rs         — buffers, counters, value identities, string pool
//! scope.rs           — per-function state, persistent-map block scopes
//! literals.rs        — constant formatting (half/quad hex encodings)
//! expressions.rs     — expression dispatch + wrapper discipline
//! operators.rs       — binary ops, overflow flavors, short-circuit
//! statements.rs      — statement dispatch, loops, termination tracking
//! matching.rs        — `when` lowering
//! calls.rs           — call resolver and method dispatch
//! intrinsics.rs      — danger-zone, source-location, error intrinsics
//! generics.rs        — template registry and monomorphization queues
//! crash.rs           — throw lowering and runtime thunks
//! crash_messages.rs  — stdlib crash-message resolver
//! runtime.rs         — runtime/math declarations, format pool head
//! debug_tables.rs    — stack-trace id registries
//! module.rs          — driver and module assembly
//! ```

mod calls;
mod context;
mod crash;
pub mod crash_messages;
pub mod debug_tables;
mod expressions;
pub mod generics;
mod intrinsics;
pub mod literals;
mod matching;
mod module;
mod operators;
pub mod runtime;
mod scope;
mod statements;
pub mod target;
pub mod types;

pub use context::{RecordLayout, Value, ValueInfo};
pub use crash_messages::{CrashMessage, CrashMessages};
pub use module::{CodegenMode, CodegenOptions, ModuleGenerator};
pub use target::{NativeTarget, TargetPlatform, TargetSpec};

use forge_diagnostic::CodegenResult;
use forge_ir::{ImportedModules, Program};

/// Lower one program to textual LLVM IR.
pub fn generate(
    program: &Program,
    imports: &ImportedModules,
    options: CodegenOptions,
) -> CodegenResult<String> {
    ModuleGenerator::new(program, imports, options).run()
}

#[cfg(test)]
mod tests;
