// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Built-in function and method registries.
//!
//! Built-ins are names whose lowering is wired directly to the runtime
//! externals rather than to user functions: `print`/`println` synthesize a
//! printf call, and a small set of reserved string methods map onto the C
//! string functions.

use flast_ast::types::{TypeDesc, TypeTag};

/// The runtime externals registered with every module, with their
/// canonical C signatures.
pub const RUNTIME_EXTERNALS: &[&str] = &[
    "printf", "strlen", "strstr", "atoi", "atoll", "atof", "malloc", "free",
];

/// A reserved method on a built-in type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinMethod {
    /// `str.len()` → `strlen`
    StrLen,
    /// `str.contains(sub)` → `strstr(self, sub) != null`
    StrContains,
    /// `str.to_i32()` → `atoi`
    StrToI32,
    /// `str.to_i64()` → `atoll`
    StrToI64,
    /// `str.to_f32()` → `atof` + demote
    StrToF32,
    /// `str.to_f64()` → `atof`
    StrToF64,
}

/// Look up a reserved method for a receiver type. Only string receivers
/// carry built-in methods; anything else falls through to a free function.
pub fn builtin_method(receiver: &TypeDesc, method: &str) -> Option<BuiltinMethod> {
    if receiver.tag != TypeTag::Str {
        return None;
    }
    Some(match method {
        "len" => BuiltinMethod::StrLen,
        "contains" => BuiltinMethod::StrContains,
        "to_i32" => BuiltinMethod::StrToI32,
        "to_i64" => BuiltinMethod::StrToI64,
        "to_f32" => BuiltinMethod::StrToF32,
        "to_f64" => BuiltinMethod::StrToF64,
        _ => return None,
    })
}

/// The printf conversion for a lowered argument type, chosen by width:
/// `%hhd`/`%hd`/`%d`/`%lld` for integers, `%f` for floats, `%s` for
/// strings and other pointers.
pub fn printf_spec(ty: &TypeDesc) -> &'static str {
    if ty.is_pointer || ty.is_reference {
        return "%s";
    }
    match ty.tag {
        TypeTag::Bool => "%d",
        TypeTag::I8 | TypeTag::U8 => "%hhd",
        TypeTag::I16 | TypeTag::U16 => "%hd",
        TypeTag::I32 | TypeTag::U32 | TypeTag::Char => "%d",
        TypeTag::I64 | TypeTag::U64 | TypeTag::I128 | TypeTag::U128 => "%lld",
        TypeTag::F32 | TypeTag::F64 => "%f",
        _ => "%s",
    }
}

/// Build the format string for a `print`/`println` call from the argument
/// types: conversions joined by spaces, with a trailing newline for
/// `println`.
pub fn format_string(arg_types: &[TypeDesc], newline: bool) -> String {
    let mut format = arg_types
        .iter()
        .map(printf_spec)
        .collect::<Vec<_>>()
        .join(" ");
    if newline {
        format.push('\n');
    }
    format
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_methods_resolve() {
        let s = TypeDesc::simple(TypeTag::Str);
        assert_eq!(builtin_method(&s, "len"), Some(BuiltinMethod::StrLen));
        assert_eq!(builtin_method(&s, "contains"), Some(BuiltinMethod::StrContains));
        assert_eq!(builtin_method(&s, "to_f64"), Some(BuiltinMethod::StrToF64));
        assert_eq!(builtin_method(&s, "reverse"), None);
        // Non-string receivers never match.
        let i = TypeDesc::simple(TypeTag::I32);
        assert_eq!(builtin_method(&i, "len"), None);
    }

    #[test]
    fn format_synthesis_by_width() {
        let args = vec![
            TypeDesc::simple(TypeTag::I32),
            TypeDesc::simple(TypeTag::Str),
            TypeDesc::simple(TypeTag::F64),
            TypeDesc::simple(TypeTag::I64),
        ];
        assert_eq!(format_string(&args, true), "%d %s %f %lld\n");
        assert_eq!(format_string(&args, false), "%d %s %f %lld");
        assert_eq!(format_string(&[], true), "\n");
    }
}
