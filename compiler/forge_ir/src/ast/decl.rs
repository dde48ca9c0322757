//! Top-level declarations.

use crate::arena::{ExprId, StmtId};
use crate::span::Span;

/// A top-level declaration.
#[derive(Clone, Debug)]
pub enum Decl {
    Function(FunctionDecl),
    Record(RecordDecl),
    Preset(PresetDecl),
    External(ExternalDecl),
    Import(ImportDecl),
}

/// Aggregate kind: value records live on the stack and copy; entities are
/// heap-allocated and passed by pointer.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum RecordKind {
    Value,
    Entity,
}

/// A record or entity declaration.
///
/// A non-empty `type_params` list makes this a generic template: it is
/// registered at declaration time and only emitted when instantiated.
#[derive(Clone, Debug)]
pub struct RecordDecl {
    pub name: String,
    pub kind: RecordKind,
    pub type_params: Vec<String>,
    pub fields: Vec<FieldDecl>,
    /// Methods declared inside the record body.
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

/// An ordered named field.
#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub name: String,
    /// Front-language type name.
    pub ty: String,
    pub span: Span,
}

/// A function or method declaration.
///
/// Method names may be qualified (`Point.length`) when declared at top
/// level; methods inside a record body carry their bare name.
#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub params: Vec<Param>,
    /// Front-language return type name; `None` for void routines.
    pub return_type: Option<String>,
    pub body: Vec<StmtId>,
    pub span: Span,
}

/// A function parameter.
#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub ty: String,
    pub span: Span,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            ty: ty.into(),
            span: Span::DUMMY,
        }
    }
}

/// A global constant.
#[derive(Clone, Debug)]
pub struct PresetDecl {
    pub name: String,
    pub ty: Option<String>,
    pub value: ExprId,
    pub span: Span,
}

/// A foreign function declaration.
#[derive(Clone, Debug)]
pub struct ExternalDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    /// Calling convention name (`"C"`, `"stdcall"`, ...); `None` means C.
    pub calling_convention: Option<String>,
    pub variadic: bool,
    pub span: Span,
}

/// An import of another module by name.
#[derive(Clone, Debug)]
pub struct ImportDecl {
    pub module: String,
    pub span: Span,
}
