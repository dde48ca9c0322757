//! Driver output: region order, string pool, presets, determinism.

use forge_ir::{Decl, ExprKind, ExternalDecl, FunctionDecl, Param, PresetDecl, Span, Stmt, StmtKind};

use super::helper::*;
use crate::target::NativeTarget;
use crate::{CodegenMode, CodegenOptions};

#[test]
fn header_regions_come_in_order() {
    let program = program_with_fn("greet", vec![], None, |arena| {
        let msg = text(arena, "hello");
        let c = call(arena, "printf", vec![msg]);
        vec![expr_stmt(arena, c)]
    });
    let ir = lower(&program);

    assert!(ir.starts_with("; ModuleID = 'test'\n"));
    assert_has(&ir, "source_filename = \"test.fr\"");
    assert_has(&ir, "target datalayout = \"");
    assert_has(&ir, "target triple = \"");
    assert_has(&ir, "%u32 = type { i32 }");
    assert_has(&ir, "%f16 = type { half }");
    assert_has(&ir, "%text = type { ptr }");
    assert_has(&ir, "declare ptr @forge_heap_alloc(i64)");
    assert_has(&ir, "declare double @sqrt(double)");

    // Fixed ordering: triple, wrappers, runtime, format head, pool, code.
    let triple = pos(&ir, "target triple");
    let wrappers = pos(&ir, "%bool = type { i1 }");
    let runtime = pos(&ir, "declare i32 @printf");
    let fmt = pos(&ir, "@.fmt.int");
    let pool = pos(&ir, "@.str.0");
    let code = pos(&ir, "\ndefine ");
    assert!(triple < wrappers);
    assert!(wrappers < runtime);
    assert!(runtime < fmt);
    assert!(fmt < pool);
    assert!(pool < code);
}

#[test]
fn discovered_externals_sit_in_the_user_region() {
    let mut program = program_with_fn("use", vec![Param::new("k", "u64")], Some("u64"), |arena| {
        let msg = text(arena, "hi");
        let printed = call(arena, "puts", vec![msg]);
        let s1 = expr_stmt(arena, printed);
        let k = ident(arena, "k", "u64");
        let v = generic_call(arena, "identity", vec!["u64"], vec![k]);
        let s2 = ret(arena, Some(v));
        vec![s1, s2]
    });
    program.declarations.insert(
        0,
        Decl::External(ExternalDecl {
            name: "puts".to_string(),
            params: vec![Param::new("s", "text")],
            return_type: Some("s32".to_string()),
            calling_convention: None,
            variadic: false,
            span: Span::DUMMY,
        }),
    );
    let identity_body = {
        let arena = &mut program.arena;
        let x = ident_untyped(arena, "x");
        vec![ret(arena, Some(x))]
    };
    program.declarations.push(Decl::Function(FunctionDecl {
        name: "identity".to_string(),
        type_params: vec!["T".to_string()],
        params: vec![Param::new("x", "T")],
        return_type: Some("T".to_string()),
        body: identity_body,
        span: Span::DUMMY,
    }));
    let ir = lower(&program);

    // Pool, then the user region with its declares, then instantiations.
    let pool = pos(&ir, "@.str.0");
    let declare = pos(&ir, "declare i32 @puts(ptr)");
    let instantiation = pos(&ir, "define %u64 @identity_u64");
    assert!(pool < declare);
    assert!(declare < instantiation);
}

#[test]
fn debug_name_tables_close_the_module() {
    let mut program = program_with_fn("read", vec![], Some("s32"), |arena| {
        let one = int(arena, 1, "s32");
        let two = int(arena, 2, "s32");
        let point = named_call(arena, "Point", vec![("x", one), ("y", two)]);
        let let_p = let_stmt(arena, "p", Some("Point"), point);
        let p = ident(arena, "p", "Point");
        let x = member(arena, p, "x");
        vec![let_p, ret(arena, Some(x))]
    });
    program.declarations.insert(
        0,
        Decl::Record(forge_ir::RecordDecl {
            name: "Point".to_string(),
            kind: forge_ir::RecordKind::Value,
            type_params: Vec::new(),
            fields: vec![
                forge_ir::FieldDecl {
                    name: "x".to_string(),
                    ty: "s32".to_string(),
                    span: Span::DUMMY,
                },
                forge_ir::FieldDecl {
                    name: "y".to_string(),
                    ty: "s32".to_string(),
                    span: Span::DUMMY,
                },
            ],
            methods: Vec::new(),
            span: Span::DUMMY,
        }),
    );
    let ir = lower(&program);

    assert_has(
        &ir,
        "@.dbg.file.0 = private unnamed_addr constant [8 x i8] c\"test.fr\\00\"",
    );
    assert_has(
        &ir,
        "@.dbg.routine.0 = private unnamed_addr constant [5 x i8] c\"read\\00\"",
    );
    assert_has(
        &ir,
        "@.dbg.type.0 = private unnamed_addr constant [6 x i8] c\"Point\\00\"",
    );
    // The tables are the final region.
    let last_define = ir.rfind("\ndefine ").unwrap();
    assert!(pos(&ir, "@.dbg.file.0") > last_define);
}

#[test]
fn identical_literals_share_a_pool_slot() {
    let program = program_with_fn("greet", vec![], None, |arena| {
        let a = text(arena, "hello");
        let first = call(arena, "printf", vec![a]);
        let s1 = expr_stmt(arena, first);
        let b = text(arena, "hello");
        let second = call(arena, "printf", vec![b]);
        let s2 = expr_stmt(arena, second);
        vec![s1, s2]
    });
    let ir = lower(&program);

    assert_eq!(ir.matches("@.str.0 = private unnamed_addr constant").count(), 1);
    assert!(!ir.contains("@.str.1"));
    assert_eq!(
        ir.matches("call i32 (ptr, ...) @printf(ptr @.str.0)").count(),
        2
    );
}

#[test]
fn byte_for_byte_deterministic() {
    let build = || {
        program_with_fn("greet", vec![Param::new("k", "u64")], Some("u64"), |arena| {
            let msg = text(arena, "hi");
            let c = call(arena, "printf", vec![msg]);
            let s1 = expr_stmt(arena, c);
            let k = ident(arena, "k", "u64");
            let one = int(arena, 1, "u64");
            let sum = binary(arena, forge_ir::BinaryOp::Add, k, one);
            let s2 = ret(arena, Some(sum));
            vec![s1, s2]
        })
    };
    let first = lower(&build());
    let second = lower(&build());
    pretty_assertions::assert_eq!(first, second);
}

#[test]
fn presets_emit_wrapped_constants() {
    let mut program = program_with_fn("read", vec![], Some("u32"), |arena| {
        let m = ident(arena, "MAX", "u32");
        vec![ret(arena, Some(m))]
    });
    let limit = program
        .arena
        .alloc_expr(forge_ir::Expr::new(ExprKind::Int(100), Span::DUMMY, "u32"));
    program.declarations.insert(
        0,
        Decl::Preset(PresetDecl {
            name: "MAX".to_string(),
            ty: Some("u32".to_string()),
            value: limit,
            span: Span::DUMMY,
        }),
    );
    let ir = lower(&program);

    assert_has(&ir, "@MAX = constant %u32 { i32 100 }");
    assert_has(&ir, "load %u32, ptr @MAX");
}

#[test]
fn executable_mode_emits_main_shim() {
    let program = program_with_fn("main", vec![], Some("s32"), |arena| {
        let zero = int(arena, 0, "s32");
        vec![ret(arena, Some(zero))]
    });
    let options = CodegenOptions {
        module_name: "app".to_string(),
        language: "forge".to_string(),
        mode: CodegenMode::Executable,
        stdlib_path: None,
        target: Box::new(NativeTarget),
    };
    let ir = lower_with(&program, options);

    assert_has(&ir, "define %s32 @forge_main()");
    assert_has(&ir, "define i32 @main()");
    assert_has(&ir, "call %s32 @forge_main()");
    assert_has(&ir, "ret i32 ");
}

#[test]
fn library_mode_has_no_shim() {
    let program = program_with_fn("main", vec![], Some("s32"), |arena| {
        let zero = int(arena, 0, "s32");
        vec![ret(arena, Some(zero))]
    });
    let ir = lower(&program);
    assert_has(&ir, "define %s32 @main()");
    assert!(!ir.contains("define i32 @main()"));
}

#[test]
fn index_assignment_is_unsupported() {
    let program = program_with_fn("bad", vec![Param::new("t", "text")], None, |arena| {
        let t = ident(arena, "t", "text");
        let zero = int(arena, 0, "s64");
        let target = arena.alloc_expr(forge_ir::Expr::untyped(
            ExprKind::Index {
                object: t,
                index: zero,
            },
            Span::DUMMY,
        ));
        let one = int(arena, 1, "u8");
        let stmt = arena.alloc_stmt(Stmt::new(
            StmtKind::Assign { target, value: one },
            Span::DUMMY,
        ));
        vec![stmt]
    });
    let err = try_lower(&program).unwrap_err();
    assert_eq!(err.kind, forge_diagnostic::ErrorKind::UnsupportedFeature);
}

#[test]
fn unknown_type_name_is_fatal() {
    let program = program_with_fn("bad", vec![Param::new("x", "Quux")], None, |arena| {
        vec![pass(arena)]
    });
    let err = try_lower(&program).unwrap_err();
    assert_eq!(err.kind, forge_diagnostic::ErrorKind::TypeResolutionFailed);
}

#[test]
fn stdlib_static_messages_reach_throw_sites() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("errors.fr"),
        "record DivideByZeroError: Crashable {\n  routine crash_message() -> text {\n    return \"division by zero\"\n  }\n}\n",
    )
    .unwrap();

    let program = program_with_fn("boom", vec![], None, |arena| {
        let err = call(arena, "DivideByZeroError", vec![]);
        let stmt = arena.alloc_stmt(Stmt::new(StmtKind::Throw(err), Span::DUMMY));
        vec![stmt]
    });
    let options = CodegenOptions {
        module_name: "test".to_string(),
        language: "forge".to_string(),
        mode: CodegenMode::Library,
        stdlib_path: Some(dir.path().to_path_buf()),
        target: Box::new(NativeTarget),
    };
    let ir = lower_with(&program, options);

    assert_has(&ir, "division by zero");
    assert!(!ir.contains("DivideByZeroError was thrown"));
}

#[test]
fn imported_function_declares_on_first_use() {
    let mut math = forge_ir::Program::new("math.fr");
    let body = {
        let arena = &mut math.arena;
        let x = ident(arena, "x", "u64");
        vec![ret(arena, Some(x))]
    };
    math.declarations
        .push(Decl::Function(function("double", vec![Param::new("x", "u64")], Some("u64"), body)));
    let mut imports = forge_ir::ImportedModules::new();
    imports.insert(
        "math".to_string(),
        forge_ir::ImportedModule {
            path: "lib/math.fr".to_string(),
            program: math,
        },
    );

    let program = program_with_fn("use", vec![Param::new("k", "u64")], Some("u64"), |arena| {
        let k = ident(arena, "k", "u64");
        let d = call(arena, "double", vec![k]);
        vec![ret(arena, Some(d))]
    });
    let ir = crate::generate(&program, &imports, super::helper::library_options())
        .expect("codegen failed");

    assert_has(&ir, "declare %u64 @double(%u64)");
    assert_has(&ir, "call %u64 @double(%u64 ");
    // Declared, never defined here.
    assert!(!ir.contains("define %u64 @double"));
}

#[test]
fn imported_generic_template_monomorphizes_locally() {
    let mut prelude = forge_ir::Program::new("prelude.fr");
    let body = {
        let arena = &mut prelude.arena;
        let x = ident_untyped(arena, "x");
        vec![ret(arena, Some(x))]
    };
    prelude.declarations.push(Decl::Function(forge_ir::FunctionDecl {
        name: "identity".to_string(),
        type_params: vec!["T".to_string()],
        params: vec![Param::new("x", "T")],
        return_type: Some("T".to_string()),
        body,
        span: Span::DUMMY,
    }));
    let mut imports = forge_ir::ImportedModules::new();
    imports.insert(
        "prelude".to_string(),
        forge_ir::ImportedModule {
            path: "lib/prelude.fr".to_string(),
            program: prelude,
        },
    );

    let program = program_with_fn("use", vec![Param::new("k", "u32")], Some("u32"), |arena| {
        let k = ident(arena, "k", "u32");
        let v = generic_call(arena, "identity", vec!["u32"], vec![k]);
        vec![ret(arena, Some(v))]
    });
    let ir = crate::generate(&program, &imports, super::helper::library_options())
        .expect("codegen failed");

    // The instantiation is emitted into this unit, not declared.
    assert_has(&ir, "define %u32 @identity_u32(%u32 %x)");
    assert_has(&ir, "call %u32 @identity_u32(%u32 ");
}

#[test]
fn source_location_intrinsics_fold_to_constants() {
    let program = program_with_fn("here", vec![], Some("s32"), |arena| {
        let line = arena.alloc_expr(forge_ir::Expr::untyped(
            ExprKind::Call {
                callee: "get_line_number".to_string(),
                generic_args: Vec::new(),
                args: Vec::new(),
            },
            Span::new(0, 0, 42, 7),
        ));
        vec![ret(arena, Some(line))]
    });
    let ir = lower(&program);
    assert_has(&ir, "insertvalue %s32 undef, i32 42");
}
