//! Arithmetic lowering: wrapper discipline, overflow flavors, literals.

use forge_ir::{BinaryOp, ExprKind, OverflowBehavior, Param, Span, UnaryOp};

use super::helper::*;

#[test]
fn minimal_add_on_wrapped_u32() {
    // let x: u32 = 3; return x + 4
    let program = program_with_fn("compute", vec![], Some("u32"), |arena| {
        let three = int(arena, 3, "u32");
        let let_x = let_stmt(arena, "x", Some("u32"), three);
        let x = ident(arena, "x", "u32");
        let four = int(arena, 4, "u32");
        let sum = binary(arena, BinaryOp::Add, x, four);
        let ret_sum = ret(arena, Some(sum));
        vec![let_x, ret_sum]
    });
    let ir = lower(&program);

    assert_has(&ir, "%x.addr = alloca %u32");
    assert_has(&ir, "insertvalue %u32 undef, i32 3, 0");
    assert_has(&ir, "load %u32, ptr %x.addr");
    assert_has(&ir, "extractvalue %u32");
    assert_has(&ir, ", 4\n");
    assert_has(&ir, "add i32");
    assert_has(&ir, "ret %u32");
    // Exactly one function, no pooled strings.
    assert_eq!(ir.matches("\ndefine ").count(), 1);
    assert!(!ir.contains("@.str."));
}

#[test]
fn saturating_add_on_s32() {
    let program = program_with_fn(
        "sat",
        vec![Param::new("a", "s32"), Param::new("b", "s32")],
        Some("s32"),
        |arena| {
            let a = ident(arena, "a", "s32");
            let b = ident(arena, "b", "s32");
            let sum = binary_overflow(arena, BinaryOp::Add, OverflowBehavior::Saturate, a, b);
            vec![ret(arena, Some(sum))]
        },
    );
    let ir = lower(&program);

    assert_has(&ir, "declare i32 @llvm.sadd.sat.i32(i32, i32)");
    assert_has(&ir, "call i32 @llvm.sadd.sat.i32(i32 ");
    assert_has(&ir, "insertvalue %s32 undef, i32 ");
}

#[test]
fn unsigned_saturating_sub_picks_usub() {
    let program = program_with_fn(
        "sat",
        vec![Param::new("a", "u8"), Param::new("b", "u8")],
        Some("u8"),
        |arena| {
            let a = ident(arena, "a", "u8");
            let b = ident(arena, "b", "u8");
            let diff = binary_overflow(arena, BinaryOp::Sub, OverflowBehavior::Saturate, a, b);
            vec![ret(arena, Some(diff))]
        },
    );
    let ir = lower(&program);
    assert_has(&ir, "call i8 @llvm.usub.sat.i8(i8 ");
}

#[test]
fn checked_multiply_emits_trap_block() {
    let program = program_with_fn(
        "mul",
        vec![Param::new("a", "s64"), Param::new("b", "s64")],
        Some("s64"),
        |arena| {
            let a = ident(arena, "a", "s64");
            let b = ident(arena, "b", "s64");
            let product = binary_overflow(arena, BinaryOp::Mul, OverflowBehavior::Checked, a, b);
            vec![ret(arena, Some(product))]
        },
    );
    let ir = lower(&program);

    assert_has(&ir, "call { i64, i1 } @llvm.smul.with.overflow.i64(i64 ");
    assert_has(&ir, "extractvalue { i64, i1 }");
    assert_has(&ir, "ovf.trap");
    assert_has(&ir, "call void @forge_crash_overflow(ptr @.msg.overflow)");
    assert_has(&ir, "unreachable");
    // The continue block returns the computed value.
    let cont = pos(&ir, "ovf.cont");
    assert!(ir[cont..].contains("ret %s64"));
}

#[test]
fn saturating_multiply_selects_clamp() {
    let program = program_with_fn(
        "mul",
        vec![Param::new("a", "s32"), Param::new("b", "s32")],
        Some("s32"),
        |arena| {
            let a = ident(arena, "a", "s32");
            let b = ident(arena, "b", "s32");
            let product = binary_overflow(arena, BinaryOp::Mul, OverflowBehavior::Saturate, a, b);
            vec![ret(arena, Some(product))]
        },
    );
    let ir = lower(&program);

    assert_has(&ir, "@llvm.smul.with.overflow.i32");
    // Sign parity picks between min and max before the overflow select.
    assert_has(&ir, "icmp slt i32");
    assert_has(&ir, "select i1 ");
    assert_has(&ir, "i32 -2147483648, i32 2147483647");
}

#[test]
fn wrap_and_unchecked_flavors_stay_plain() {
    for flavor in [OverflowBehavior::Wrap, OverflowBehavior::Unchecked] {
        let program = program_with_fn(
            "add",
            vec![Param::new("a", "u16"), Param::new("b", "u16")],
            Some("u16"),
            |arena| {
                let a = ident(arena, "a", "u16");
                let b = ident(arena, "b", "u16");
                let sum = binary_overflow(arena, BinaryOp::Add, flavor, a, b);
                vec![ret(arena, Some(sum))]
            },
        );
        let ir = lower(&program);
        assert_has(&ir, "add i16");
        assert!(!ir.contains("with.overflow"), "{flavor:?} must not trap");
        assert!(!ir.contains(".sat."), "{flavor:?} must not saturate");
    }
}

#[test]
fn overflow_variant_left_shift_is_rejected() {
    for flavor in [
        OverflowBehavior::Checked,
        OverflowBehavior::Saturate,
        OverflowBehavior::Wrap,
    ] {
        let program = program_with_fn(
            "shift",
            vec![Param::new("a", "u32"), Param::new("b", "u32")],
            Some("u32"),
            |arena| {
                let a = ident(arena, "a", "u32");
                let b = ident(arena, "b", "u32");
                let shifted = binary_overflow(arena, BinaryOp::Shl, flavor, a, b);
                vec![ret(arena, Some(shifted))]
            },
        );
        let err = try_lower(&program).unwrap_err();
        assert_eq!(
            err.kind,
            forge_diagnostic::ErrorKind::UnsupportedFeature,
            "{flavor:?}"
        );
    }
}

#[test]
fn plain_left_shift_still_lowers() {
    let program = program_with_fn(
        "shift",
        vec![Param::new("a", "u32"), Param::new("b", "u32")],
        Some("u32"),
        |arena| {
            let a = ident(arena, "a", "u32");
            let b = ident(arena, "b", "u32");
            let shifted = binary(arena, BinaryOp::Shl, a, b);
            vec![ret(arena, Some(shifted))]
        },
    );
    let ir = lower(&program);
    assert_has(&ir, "shl i32");
}

#[test]
fn division_by_zero_is_not_folded() {
    let program = program_with_fn("div", vec![Param::new("x", "s64")], Some("s64"), |arena| {
        let x = ident(arena, "x", "s64");
        let zero = int(arena, 0, "s64");
        let quotient = binary(arena, BinaryOp::Div, x, zero);
        vec![ret(arena, Some(quotient))]
    });
    let ir = lower(&program);
    assert_has(&ir, "sdiv i64");
    assert_has(&ir, ", 0\n");
}

#[test]
fn unsigned_division_and_remainder() {
    let program = program_with_fn(
        "rem",
        vec![Param::new("a", "u64"), Param::new("b", "u64")],
        Some("u64"),
        |arena| {
            let a = ident(arena, "a", "u64");
            let b = ident(arena, "b", "u64");
            let q = binary(arena, BinaryOp::FloorDiv, a, b);
            let let_q = let_stmt(arena, "q", Some("u64"), q);
            let a2 = ident(arena, "a", "u64");
            let b2 = ident(arena, "b", "u64");
            let r = binary(arena, BinaryOp::Rem, a2, b2);
            let ret_r = ret(arena, Some(r));
            vec![let_q, ret_r]
        },
    );
    let ir = lower(&program);
    assert_has(&ir, "udiv i64");
    assert_has(&ir, "urem i64");
}

#[test]
fn negative_literal_at_type_minimum_folds() {
    let program = program_with_fn("min", vec![], Some("s32"), |arena| {
        let big = int_untyped(arena, 2_147_483_648);
        let negated = arena.alloc_expr(forge_ir::Expr::untyped(
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand: big,
            },
            Span::DUMMY,
        ));
        vec![ret(arena, Some(negated))]
    });
    let ir = lower(&program);
    assert_has(&ir, "insertvalue %s32 undef, i32 -2147483648");
    assert!(!ir.contains("sub i32 0"));
}

#[test]
fn float_literals_use_hex_prefixes() {
    let program = program_with_fn("floats", vec![], None, |arena| {
        let h = float(arena, 1.0, "f16");
        let let_h = let_stmt(arena, "h", Some("f16"), h);
        let q = float(arena, 1.0, "f128");
        let let_q = let_stmt(arena, "q", Some("f128"), q);
        let d = float(arena, 1.0, "f64");
        let let_d = let_stmt(arena, "d", Some("f64"), d);
        vec![let_h, let_q, let_d]
    });
    let ir = lower(&program);
    assert_has(&ir, "insertvalue %f16 undef, half 0xH3C00, 0");
    assert_has(
        &ir,
        "insertvalue %f128 undef, fp128 0xL3FFF0000000000000000000000000000, 0",
    );
    assert_has(&ir, "insertvalue %f64 undef, double 0x3FF0000000000000, 0");
}

#[test]
fn float_arithmetic_uses_f_family() {
    let program = program_with_fn(
        "favg",
        vec![Param::new("a", "f64"), Param::new("b", "f64")],
        Some("f64"),
        |arena| {
            let a = ident(arena, "a", "f64");
            let b = ident(arena, "b", "f64");
            let sum = binary(arena, BinaryOp::Add, a, b);
            vec![ret(arena, Some(sum))]
        },
    );
    let ir = lower(&program);
    assert_has(&ir, "fadd double");
    assert_has(&ir, "insertvalue %f64 undef, double ");
}
