//! Code generation error types.

use std::fmt;

use thiserror::Error;

/// What contract was violated.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorKind {
    /// Unknown type name, missing annotation where one is required, or an
    /// ambiguous method lookup.
    TypeResolutionFailed,
    /// Syntactically valid construct the engine does not implement.
    UnsupportedFeature,
    /// Intrinsic called with the wrong argument count.
    ArityMismatch,
    /// The engine's own bookkeeping broke (e.g. a label was not
    /// pre-allocated where the algorithm requires it).
    InternalInvariantViolation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::TypeResolutionFailed => "type-resolution-failed",
            ErrorKind::UnsupportedFeature => "unsupported-feature",
            ErrorKind::ArityMismatch => "arity-mismatch",
            ErrorKind::InternalInvariantViolation => "internal-invariant-violation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the source the violated construct sits.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
    /// Byte offset from file start.
    pub position: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, column: u32, position: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
            column,
            position,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A structured code generation error.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("error[{kind}] {location}: {message}")]
pub struct CodegenError {
    pub kind: ErrorKind,
    pub location: SourceLocation,
    pub message: String,
}

impl CodegenError {
    pub fn new(kind: ErrorKind, location: SourceLocation, message: impl Into<String>) -> Self {
        CodegenError {
            kind,
            location,
            message: message.into(),
        }
    }

    /// Unknown or unresolvable type name.
    pub fn type_resolution(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeResolutionFailed, location, message)
    }

    /// Valid construct the engine refuses.
    pub fn unsupported(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedFeature, location, message)
    }

    /// Intrinsic arity error.
    pub fn arity(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArityMismatch, location, message)
    }

    /// Engine bookkeeping violation.
    pub fn invariant(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalInvariantViolation, location, message)
    }
}

/// Code generation result alias.
pub type CodegenResult<T> = Result<T, CodegenError>;
