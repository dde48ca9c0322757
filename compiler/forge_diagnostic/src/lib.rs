//! Structured errors for Forge code generation.
//!
//! Code generation aborts on the first contract violation; no partial IR is
//! returned. Every error carries the source location (file, line, column,
//! byte position) of the construct that triggered it and one of the four
//! [`ErrorKind`]s. The driver is the single top-level handler that formats
//! and reports.

mod error;

pub use error::{CodegenError, CodegenResult, ErrorKind, SourceLocation};
