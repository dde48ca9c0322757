//! Monomorphization: mangling, uniqueness, fixpoint, template methods.

use forge_ir::{Decl, FieldDecl, FunctionDecl, Param, RecordDecl, RecordKind, Span};

use super::helper::*;

fn generic_record(name: &str, params: &[&str], fields: &[(&str, &str)]) -> RecordDecl {
    RecordDecl {
        name: name.to_string(),
        kind: RecordKind::Value,
        type_params: params.iter().map(|p| (*p).to_string()).collect(),
        fields: fields
            .iter()
            .map(|(n, t)| FieldDecl {
                name: (*n).to_string(),
                ty: (*t).to_string(),
                span: Span::DUMMY,
            })
            .collect(),
        methods: Vec::new(),
        span: Span::DUMMY,
    }
}

#[test]
fn generic_function_monomorphizes_once() {
    // identity<T>(x: T) -> T, called twice as identity<u64>
    let mut program = program_with_fns(|arena| {
        let k = ident(arena, "k", "u64");
        let first = generic_call(arena, "identity", vec!["u64"], vec![k]);
        let let_a = let_stmt(arena, "a", Some("u64"), first);
        let k2 = ident(arena, "k", "u64");
        let second = generic_call(arena, "identity", vec!["u64"], vec![k2]);
        let ret_b = ret(arena, Some(second));
        vec![function(
            "use",
            vec![Param::new("k", "u64")],
            Some("u64"),
            vec![let_a, ret_b],
        )]
    });
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

    assert_has(&ir, "define %u64 @identity_u64(%u64 %x)");
    assert_has(&ir, "call %u64 @identity_u64(%u64 ");
    // Requested twice, emitted once.
    assert_eq!(ir.matches("define %u64 @identity_u64").count(), 1);
    assert_eq!(ir.matches("call %u64 @identity_u64").count(), 2);
    // The template itself never emits.
    assert!(!ir.contains("@identity("));
}

#[test]
fn generic_record_instantiates_with_mangled_type() {
    let mut program = program_with_fn("make", vec![Param::new("k", "u64")], Some("u64"), |arena| {
        let k = ident(arena, "k", "u64");
        let boxed = arena.alloc_expr(forge_ir::Expr::untyped(
            forge_ir::ExprKind::Call {
                callee: "Box".to_string(),
                generic_args: vec!["u64".to_string()],
                args: vec![forge_ir::CallArg::named("value", k)],
            },
            Span::DUMMY,
        ));
        let let_b = let_stmt(arena, "b", None, boxed);
        let b = ident_untyped(arena, "b");
        let v = member(arena, b, "value");
        let ret_v = ret(arena, Some(v));
        vec![let_b, ret_v]
    });
    program
        .declarations
        .insert(0, Decl::Record(generic_record("Box", &["T"], &[("value", "T")])));
    let ir = lower(&program);

    assert_has(&ir, "%Box_u64 = type { %u64 }");
    assert_has(&ir, "insertvalue %Box_u64 undef, %u64 ");
    assert_has(&ir, "getelementptr inbounds %Box_u64, ptr ");
}

#[test]
fn method_on_generic_record_dispatches_to_mangled_symbol() {
    let mut boxed = generic_record("Box", &["T"], &[("value", "T")]);
    let mut program = program_with_fn("get", vec![Param::new("k", "u64")], Some("u64"), |arena| {
        let k = ident(arena, "k", "u64");
        let make = arena.alloc_expr(forge_ir::Expr::untyped(
            forge_ir::ExprKind::Call {
                callee: "Box".to_string(),
                generic_args: vec!["u64".to_string()],
                args: vec![forge_ir::CallArg::named("value", k)],
            },
            Span::DUMMY,
        ));
        let let_b = let_stmt(arena, "b", None, make);
        let b = ident_untyped(arena, "b");
        let got = method_call(arena, b, "unwrap", vec![]);
        let ret_v = ret(arena, Some(got));
        vec![let_b, ret_v]
    });
    let method_body = {
        let arena = &mut program.arena;
        let receiver = ident_untyped(arena, "self");
        let v = member(arena, receiver, "value");
        vec![ret(arena, Some(v))]
    };
    boxed.methods.push(FunctionDecl {
        name: "unwrap".to_string(),
        type_params: Vec::new(),
        params: Vec::new(),
        return_type: Some("T".to_string()),
        body: method_body,
        span: Span::DUMMY,
    });
    program.declarations.insert(0, Decl::Record(boxed));
    let ir = lower(&program);

    assert_has(&ir, "define %u64 @Box_u64.unwrap(%Box_u64 %self)");
    assert_has(&ir, "call %u64 @Box_u64.unwrap(%Box_u64 ");
}

#[test]
fn nested_generic_references_reach_fixpoint() {
    // Pair<T> { first: Box<T> } — instantiating Pair pulls in Box.
    let mut program = program_with_fn("touch", vec![Param::new("k", "u64")], None, |arena| {
        let k = ident(arena, "k", "u64");
        let inner = arena.alloc_expr(forge_ir::Expr::untyped(
            forge_ir::ExprKind::Call {
                callee: "Box".to_string(),
                generic_args: vec!["u64".to_string()],
                args: vec![forge_ir::CallArg::named("value", k)],
            },
            Span::DUMMY,
        ));
        let pair = arena.alloc_expr(forge_ir::Expr::untyped(
            forge_ir::ExprKind::Call {
                callee: "Pair".to_string(),
                generic_args: vec!["u64".to_string()],
                args: vec![forge_ir::CallArg::named("first", inner)],
            },
            Span::DUMMY,
        ));
        let let_p = let_stmt(arena, "p", None, pair);
        vec![let_p]
    });
    program
        .declarations
        .insert(0, Decl::Record(generic_record("Box", &["T"], &[("value", "T")])));
    program.declarations.insert(
        1,
        Decl::Record(generic_record("Pair", &["T"], &[("first", "Box<T>")])),
    );
    let ir = lower(&program);

    assert_has(&ir, "%Box_u64 = type { %u64 }");
    assert_has(&ir, "%Pair_u64 = type { %Box_u64 }");
}

#[test]
fn nested_generic_argument_mangles_flat() {
    let mut program = program_with_fn("touch", vec![Param::new("k", "u8")], None, |arena| {
        let k = ident(arena, "k", "u8");
        let inner = arena.alloc_expr(forge_ir::Expr::untyped(
            forge_ir::ExprKind::Call {
                callee: "Box".to_string(),
                generic_args: vec!["u8".to_string()],
                args: vec![forge_ir::CallArg::named("value", k)],
            },
            Span::DUMMY,
        ));
        let outer = arena.alloc_expr(forge_ir::Expr::untyped(
            forge_ir::ExprKind::Call {
                callee: "Box".to_string(),
                generic_args: vec!["Box<u8>".to_string()],
                args: vec![forge_ir::CallArg::named("value", inner)],
            },
            Span::DUMMY,
        ));
        let let_b = let_stmt(arena, "b", None, outer);
        vec![let_b]
    });
    program
        .declarations
        .insert(0, Decl::Record(generic_record("Box", &["T"], &[("value", "T")])));
    let ir = lower(&program);

    assert_has(&ir, "%Box_Box_u8_ = type { %Box_u8 }");
    assert_has(&ir, "%Box_u8 = type { %u8 }");
}
