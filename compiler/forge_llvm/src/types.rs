//! Front-language type classification and name mapping.
//!
//! Pure functions over the closed primitive name set. Everything layout- or
//! target-dependent (user record lookup, `saddr`/`uaddr` width) lives on
//! `CodegenContext`; this module is the built-in fallback map those paths
//! bottom out in.

/// LLVM-level classification of a type name.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TypeKind {
    Int,
    Float,
    Pointer,
    Aggregate,
}

/// Bit width plus kind for an LLVM type string.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct TypeClass {
    pub bits: u32,
    pub kind: TypeKind,
}

/// Classify an LLVM type string.
///
/// Aggregates (named structs, literal structs, arrays) report zero bits.
pub fn classify(llvm: &str) -> TypeClass {
    match llvm {
        "half" => TypeClass {
            bits: 16,
            kind: TypeKind::Float,
        },
        "float" => TypeClass {
            bits: 32,
            kind: TypeKind::Float,
        },
        "double" => TypeClass {
            bits: 64,
            kind: TypeKind::Float,
        },
        "fp128" => TypeClass {
            bits: 128,
            kind: TypeKind::Float,
        },
        "ptr" => TypeClass {
            bits: 64,
            kind: TypeKind::Pointer,
        },
        _ => {
            if let Some(width) = llvm.strip_prefix('i') {
                if let Ok(bits) = width.parse::<u32>() {
                    return TypeClass {
                        bits,
                        kind: TypeKind::Int,
                    };
                }
            }
            TypeClass {
                bits: 0,
                kind: TypeKind::Aggregate,
            }
        }
    }
}

/// Is this name one of the closed primitive wrapper set?
pub fn is_primitive_front(name: &str) -> bool {
    builtin_primitive(name).is_some() || matches!(name, "saddr" | "uaddr")
}

/// Built-in wrapper → primitive map for the well-known wrappers.
///
/// `saddr`/`uaddr` are absent: their primitive is target-dependent and
/// resolved by the context.
pub fn builtin_primitive(front: &str) -> Option<&'static str> {
    let prim = match front {
        "s8" | "u8" | "letter8" => "i8",
        "s16" | "u16" | "letter16" => "i16",
        "s32" | "u32" | "letter32" => "i32",
        "s64" | "u64" => "i64",
        "s128" | "u128" => "i128",
        "f16" => "half",
        "f32" => "float",
        "f64" => "double",
        "f128" => "fp128",
        "bool" => "i1",
        "text" => "ptr",
        _ => return None,
    };
    Some(prim)
}

/// Does the front name denote an unsigned integer domain?
///
/// Codepoints and `bool` count as unsigned; comparisons and widenings on
/// them use the unsigned forms.
pub fn is_unsigned_front(name: &str) -> bool {
    matches!(
        name,
        "u8" | "u16" | "u32" | "u64" | "u128" | "uaddr" | "bool" | "letter8" | "letter16"
            | "letter32"
    )
}

/// Is the front name an IEEE float type?
pub fn is_float_front(name: &str) -> bool {
    matches!(name, "f16" | "f32" | "f64" | "f128")
}

/// Is the front name a signed integer type?
pub fn is_signed_front(name: &str) -> bool {
    matches!(name, "s8" | "s16" | "s32" | "s64" | "s128" | "saddr")
}

/// Does the string name an LLVM type directly (passthrough in raw
/// intrinsic contexts)?
pub fn is_llvm_type_name(name: &str) -> bool {
    if matches!(name, "half" | "float" | "double" | "fp128" | "ptr" | "void") {
        return true;
    }
    name.strip_prefix('i')
        .is_some_and(|w| !w.is_empty() && w.bytes().all(|b| b.is_ascii_digit()))
}

/// Map a calling convention name to its LLVM attribute.
///
/// The set is closed; unknown names return `None` and the caller reports
/// the failure.
pub fn calling_convention(name: &str) -> Option<&'static str> {
    let attr = match name {
        "C" => "ccc",
        "stdcall" => "x86_stdcallcc",
        "fastcall" => "x86_fastcallcc",
        "thiscall" => "x86_thiscallcc",
        "vectorcall" => "x86_vectorcallcc",
        "win64" => "win64cc",
        "sysv64" => "x86_64_sysvcc",
        "aapcs" => "arm_aapcscc",
        "aapcs_vfp" => "arm_aapcs_vfpcc",
        _ => return None,
    };
    Some(attr)
}

/// Integer min/max constants for saturation, as decimal text.
pub fn int_min_max(bits: u32, unsigned: bool) -> (String, String) {
    if unsigned {
        let max = if bits >= 128 {
            u128::MAX
        } else {
            (1u128 << bits) - 1
        };
        ("0".to_string(), max.to_string())
    } else if bits >= 128 {
        (i128::MIN.to_string(), i128::MAX.to_string())
    } else {
        let min = -(1i128 << (bits - 1));
        let max = (1i128 << (bits - 1)) - 1;
        (min.to_string(), max.to_string())
    }
}
