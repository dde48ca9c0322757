//! Call resolution: constructors, methods, casts, FFI, intrinsics.

use forge_ir::{
    Decl, ExternalDecl, FieldDecl, FunctionDecl, Param, RecordDecl, RecordKind, Span,
};

use super::helper::*;

fn record(name: &str, kind: RecordKind, fields: &[(&str, &str)]) -> RecordDecl {
    RecordDecl {
        name: name.to_string(),
        kind,
        type_params: Vec::new(),
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
fn record_constructor_and_member_access() {
    let mut program = program_with_fn("use", vec![], Some("s32"), |arena| {
        let one = int(arena, 1, "s32");
        let two = int(arena, 2, "s32");
        let point = named_call(arena, "Point", vec![("x", one), ("y", two)]);
        let let_p = let_stmt(arena, "p", Some("Point"), point);
        let p = ident(arena, "p", "Point");
        let x = member(arena, p, "x");
        let ret_x = ret(arena, Some(x));
        vec![let_p, ret_x]
    });
    program.declarations.insert(
        0,
        Decl::Record(record("Point", RecordKind::Value, &[("x", "s32"), ("y", "s32")])),
    );
    let ir = lower(&program);

    assert_has(&ir, "%Point = type { %s32, %s32 }");
    assert_has(&ir, "insertvalue %Point undef, %s32 ");
    assert_has(&ir, "getelementptr inbounds %Point, ptr ");
    assert_has(&ir, "load %s32, ptr ");
}

#[test]
fn entity_constructor_heap_allocates() {
    let mut program = program_with_fn("make", vec![], None, |arena| {
        let n = int(arena, 7, "u64");
        let counter = named_call(arena, "Counter", vec![("n", n)]);
        let let_c = let_stmt(arena, "c", Some("Counter"), counter);
        vec![let_c]
    });
    program.declarations.insert(
        0,
        Decl::Record(record("Counter", RecordKind::Entity, &[("n", "u64")])),
    );
    let ir = lower(&program);

    assert_has(&ir, "call ptr @malloc(i64 8)");
    assert_has(&ir, "getelementptr inbounds %Counter, ptr ");
    assert_has(&ir, "store %u64 ");
    // Entity slots hold the pointer.
    assert_has(&ir, "%c.addr = alloca ptr");
}

#[test]
fn method_receiver_passes_by_pointer() {
    let mut point = record("Point", RecordKind::Value, &[("x", "s32"), ("y", "s32")]);
    let mut program = program_with_fn("use", vec![Param::new("p", "Point")], Some("s32"), |arena| {
        let p = ident(arena, "p", "Point");
        let call = method_call(arena, p, "get_x", vec![]);
        vec![ret(arena, Some(call))]
    });
    // routine get_x() -> s32 { return self.x }
    let method_body = {
        let arena = &mut program.arena;
        let receiver = ident_untyped(arena, "self");
        let x = member(arena, receiver, "x");
        vec![ret(arena, Some(x))]
    };
    point.methods.push(FunctionDecl {
        name: "get_x".to_string(),
        type_params: Vec::new(),
        params: Vec::new(),
        return_type: Some("s32".to_string()),
        body: method_body,
        span: Span::DUMMY,
    });
    program.declarations.insert(0, Decl::Record(point));
    let ir = lower(&program);

    assert_has(&ir, "define %s32 @Point.get_x(ptr %self)");
    assert_has(&ir, "call %s32 @Point.get_x(ptr ");
}

#[test]
fn primitive_cast_extends_and_rewraps() {
    let program = program_with_fn("widen", vec![Param::new("x", "s32")], Some("u64"), |arena| {
        let x = ident(arena, "x", "s32");
        let cast = call(arena, "u64", vec![x]);
        vec![ret(arena, Some(cast))]
    });
    let ir = lower(&program);

    assert_has(&ir, "extractvalue %s32 %x, 0");
    assert_has(&ir, "sext i32");
    assert_has(&ir, "to i64");
    assert_has(&ir, "insertvalue %u64 undef, i64 ");
}

#[test]
fn narrowing_cast_truncates() {
    let program = program_with_fn("narrow", vec![Param::new("x", "u64")], Some("u8"), |arena| {
        let x = ident(arena, "x", "u64");
        let cast = call(arena, "u8", vec![x]);
        vec![ret(arena, Some(cast))]
    });
    let ir = lower(&program);
    assert_has(&ir, "trunc i64");
    assert_has(&ir, "to i8");
}

#[test]
fn float_to_unsigned_cast_uses_fptoui() {
    let program = program_with_fn("conv", vec![Param::new("x", "f64")], Some("u32"), |arena| {
        let x = ident(arena, "x", "f64");
        let cast = call(arena, "u32", vec![x]);
        vec![ret(arena, Some(cast))]
    });
    let ir = lower(&program);
    assert_has(&ir, "fptoui double");
}

#[test]
fn ffi_call_unwraps_text_to_pointer() {
    let mut program = program_with_fn("say", vec![Param::new("msg", "text")], Some("s32"), |arena| {
        let msg = ident(arena, "msg", "text");
        let result = call(arena, "puts", vec![msg]);
        vec![ret(arena, Some(result))]
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
    let ir = lower(&program);

    assert_has(&ir, "declare i32 @puts(ptr)");
    assert_has(&ir, "extractvalue %text %msg, 0");
    assert_has(&ir, "call i32 @puts(ptr ");
    // The FFI result rewraps into the declared front type.
    assert_has(&ir, "insertvalue %s32 undef, i32 ");
}

#[test]
fn stdcall_convention_is_emitted() {
    let mut program = program_with_fn("ping", vec![], None, |arena| {
        let c = call(arena, "Beep", vec![]);
        vec![expr_stmt(arena, c)]
    });
    program.declarations.insert(
        0,
        Decl::External(ExternalDecl {
            name: "Beep".to_string(),
            params: vec![],
            return_type: None,
            calling_convention: Some("stdcall".to_string()),
            variadic: false,
            span: Span::DUMMY,
        }),
    );
    let ir = lower(&program);
    assert_has(&ir, "declare x86_stdcallcc void @Beep()");
}

#[cfg(not(windows))]
#[test]
fn c_interop_widths_follow_the_target() {
    let mut program = program_with_fn("tick", vec![], None, |arena| {
        let c = call(arena, "wcslen", vec![]);
        vec![expr_stmt(arena, c)]
    });
    program.declarations.insert(
        0,
        Decl::External(ExternalDecl {
            name: "wcslen".to_string(),
            params: vec![],
            return_type: Some("clong".to_string()),
            calling_convention: None,
            variadic: false,
            span: Span::DUMMY,
        }),
    );
    let ir = lower(&program);
    // Unix: C long is 64-bit.
    assert_has(&ir, "declare i64 @wcslen()");
}

#[test]
fn printf_routes_through_runtime_declarations() {
    let program = program_with_fn("greet", vec![], None, |arena| {
        let msg = text(arena, "hello");
        let c = call(arena, "printf", vec![msg]);
        vec![expr_stmt(arena, c)]
    });
    let ir = lower(&program);
    assert_has(&ir, "call i32 (ptr, ...) @printf(ptr @.str.0)");
    // Declared once in the runtime block, not per call.
    assert_eq!(ir.matches("declare i32 @printf(ptr, ...)").count(), 1);
}

#[test]
fn parse_constructor_calls_strtol() {
    let program = program_with_fn("parse", vec![Param::new("t", "text")], Some("s64"), |arena| {
        let t = ident(arena, "t", "text");
        let parsed = call(arena, "s64!", vec![t]);
        vec![ret(arena, Some(parsed))]
    });
    let ir = lower(&program);
    assert_has(&ir, "call i64 @strtol(ptr ");
    assert_has(&ir, "insertvalue %s64 undef, i64 ");
}

#[test]
fn optional_parse_constructor_builds_maybe() {
    let program = program_with_fn("parse", vec![Param::new("t", "text")], None, |arena| {
        let t = ident(arena, "t", "text");
        let parsed = call(arena, "u32?", vec![t]);
        let let_v = let_stmt(arena, "v", None, parsed);
        vec![let_v]
    });
    let ir = lower(&program);
    assert_has(&ir, "%Maybe_u32 = type { %bool, %u32 }");
    assert_has(&ir, "insertvalue %Maybe_u32 undef, %bool ");
    assert_has(&ir, "call i64 @strtol(ptr ");
}

#[test]
fn verify_branches_to_crash() {
    let program = program_with_fn("check", vec![Param::new("c", "bool")], None, |arena| {
        let c = ident(arena, "c", "bool");
        let v = call(arena, "verify!", vec![c]);
        vec![expr_stmt(arena, v)]
    });
    let ir = lower(&program);

    assert_has(&ir, "verify.fail");
    assert_has(&ir, "verify.cont");
    assert_has(&ir, "call void @forge_crash(ptr ");
    assert_has(&ir, "verification failed");
    assert_has(&ir, "unreachable");
}

#[test]
fn breach_terminates_the_block() {
    let program = program_with_fn("never", vec![], None, |arena| {
        let b = call(arena, "breach!", vec![]);
        vec![expr_stmt(arena, b)]
    });
    let ir = lower(&program);
    assert_has(&ir, "entered unreachable code");
    assert_has(&ir, "unreachable");
    // No synthesized return after the crash.
    assert!(!ir.contains("ret void"));
}

#[test]
fn address_of_and_read_as_round_trip() {
    let program = program_with_fn("peek", vec![], Some("u8"), |arena| {
        let init = int(arena, 5, "u8");
        let let_x = let_stmt(arena, "x", Some("u8"), init);
        let x = ident_untyped(arena, "x");
        let addr = call(arena, "address_of", vec![x]);
        let let_a = let_stmt(arena, "a", Some("uaddr"), addr);
        let a = ident(arena, "a", "uaddr");
        let read = generic_call(arena, "read_as", vec!["u8"], vec![a]);
        let ret_v = ret(arena, Some(read));
        vec![let_x, let_a, ret_v]
    });
    let ir = lower(&program);

    assert_has(&ir, "ptrtoint ptr %x.addr to i64");
    assert_has(&ir, "insertvalue %uaddr undef, i64 ");
    assert_has(&ir, "inttoptr i64 ");
    assert_has(&ir, "load i8, ptr ");
}

#[test]
fn volatile_write_is_marked() {
    let program = program_with_fn("poke", vec![Param::new("a", "uaddr")], None, |arena| {
        let a = ident(arena, "a", "uaddr");
        let v = int(arena, 1, "u32");
        let w = generic_call(arena, "volatile_write", vec!["u32"], vec![a, v]);
        vec![expr_stmt(arena, w)]
    });
    let ir = lower(&program);
    assert_has(&ir, "store volatile i32 1, ptr ");
}

#[test]
fn arity_mismatch_on_intrinsics() {
    let program = program_with_fn("bad", vec![], None, |arena| {
        let msg = text(arena, "oops");
        let v = call(arena, "get_line_number", vec![msg]);
        vec![expr_stmt(arena, v)]
    });
    let err = try_lower(&program).unwrap_err();
    assert_eq!(err.kind, forge_diagnostic::ErrorKind::ArityMismatch);
}
