//! Runtime declarations emitted at the module head.
//!
//! These symbols are provided by libc, the Forge allocator, and the
//! stack-trace runtime; compiled code only ever `call`s them. The format
//! string pool head sits after the declarations so pooled user literals
//! can be spliced in right behind it.

/// C and Forge runtime helpers.
pub const RUNTIME_DECLARATIONS: &str = "\
declare i32 @printf(ptr, ...)
declare ptr @malloc(i64)
declare void @free(ptr)
declare ptr @memcpy(ptr, ptr, i64)
declare i64 @strtol(ptr, ptr, i32)
declare double @strtod(ptr, ptr)
declare ptr @forge_heap_alloc(i64)
declare ptr @forge_stack_alloc(i64)
declare void @forge_crash(ptr, ptr)
declare void @forge_crash_overflow(ptr)
declare void @forge_throw(ptr, ptr, i32, i32, i32)
declare void @forge_throw_absent(i32, i32, i32)
declare void @forge_throw_index_out_of_bounds(i64, i64)
declare void @forge_stop(ptr)
declare void @exit(i32)
";

/// Math library helpers (double precision entry points).
pub const MATH_DECLARATIONS: &str = "\
declare double @sqrt(double)
declare double @pow(double, double)
declare double @fabs(double)
declare double @floor(double)
declare double @ceil(double)
declare double @fmod(double, double)
";

/// Format-string pool head: integer format, string format, and the fixed
/// overflow message used by checked arithmetic traps.
pub const FORMAT_POOL_HEAD: &str = "\
@.fmt.int = private unnamed_addr constant [5 x i8] c\"%lld\\00\"
@.fmt.str = private unnamed_addr constant [3 x i8] c\"%s\\00\"
@.msg.overflow = private unnamed_addr constant [20 x i8] c\"arithmetic overflow\\00\"
";

/// Names that resolve to runtime helpers when called directly.
pub fn is_runtime_helper(name: &str) -> bool {
    matches!(
        name,
        "printf"
            | "malloc"
            | "free"
            | "memcpy"
            | "strtol"
            | "strtod"
            | "heap_alloc"
            | "stack_alloc"
            | "exit"
            | "sqrt"
            | "pow"
            | "fabs"
            | "floor"
            | "ceil"
            | "fmod"
    )
}

/// IR symbol for a runtime helper (the allocator entry points carry the
/// `forge_` prefix; libc names pass through).
pub fn runtime_symbol(name: &str) -> String {
    match name {
        "heap_alloc" => "@forge_heap_alloc".to_string(),
        "stack_alloc" => "@forge_stack_alloc".to_string(),
        _ => format!("@{name}"),
    }
}

/// Signature of a runtime helper: `(param LLVM types, return LLVM type,
/// variadic)`.
pub fn runtime_signature(name: &str) -> Option<(&'static [&'static str], &'static str, bool)> {
    let sig: (&[&str], &str, bool) = match name {
        "printf" => (&["ptr"], "i32", true),
        "malloc" | "heap_alloc" | "stack_alloc" => (&["i64"], "ptr", false),
        "free" => (&["ptr"], "void", false),
        "memcpy" => (&["ptr", "ptr", "i64"], "ptr", false),
        "strtol" => (&["ptr", "ptr", "i32"], "i64", false),
        "strtod" => (&["ptr", "ptr"], "double", false),
        "exit" => (&["i32"], "void", false),
        "sqrt" | "fabs" | "floor" | "ceil" => (&["double"], "double", false),
        "pow" | "fmod" => (&["double", "double"], "double", false),
        _ => return None,
    };
    Some(sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_message_length_matches_constant() {
        // "arithmetic overflow" plus the NUL terminator.
        assert_eq!("arithmetic overflow".len() + 1, 20);
        assert!(FORMAT_POOL_HEAD.contains("[20 x i8]"));
    }

    #[test]
    fn helper_symbols() {
        assert_eq!(runtime_symbol("heap_alloc"), "@forge_heap_alloc");
        assert_eq!(runtime_symbol("printf"), "@printf");
        assert!(is_runtime_helper("strtol"));
        assert!(!is_runtime_helper("main"));
    }

    #[test]
    fn signatures_cover_all_helpers() {
        for name in [
            "printf",
            "malloc",
            "free",
            "memcpy",
            "strtol",
            "strtod",
            "heap_alloc",
            "stack_alloc",
            "exit",
            "sqrt",
            "pow",
            "fabs",
            "floor",
            "ceil",
            "fmod",
        ] {
            assert!(runtime_signature(name).is_some(), "{name}");
        }
    }
}
