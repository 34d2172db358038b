// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Type descriptors.
//!
//! Types are recorded as written: a primary tag, modifier flags, ordered
//! parameters for compound kinds, and a symbolic name for user-defined and
//! qualified types. No inference happens here; the code generator reads
//! these descriptors directly.

use std::fmt;

/// The primary kind of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Void,
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Char,
    Str,
    Bool,
    Array,
    Slice,
    Vec,
    Map,
    Set,
    Tuple,
    Option,
    Result,
    Struct,
    Enum,
    Trait,
    Function,
    Closure,
    Module,
    Box,
    Ref,
    SelfTy,
    Auto,
    Unknown,
}

/// A recursive type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDesc {
    pub tag: TypeTag,
    pub is_pointer: bool,
    pub is_reference: bool,
    pub is_const: bool,
    pub is_optional: bool,
    /// Ordered parameter types for compound kinds (element types, generic
    /// arguments, array length expressions rendered as types).
    pub params: Vec<TypeDesc>,
    /// Symbolic name for struct/enum/trait types and qualified names like
    /// `pkg.sub.Name`.
    pub name: Option<String>,
}

impl TypeDesc {
    pub fn simple(tag: TypeTag) -> Self {
        Self {
            tag,
            is_pointer: false,
            is_reference: false,
            is_const: false,
            is_optional: false,
            params: Vec::new(),
            name: None,
        }
    }

    pub fn named(tag: TypeTag, name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::simple(tag) }
    }

    pub fn with_params(tag: TypeTag, params: Vec<TypeDesc>) -> Self {
        Self { params, ..Self::simple(tag) }
    }

    pub fn unknown() -> Self {
        Self::simple(TypeTag::Unknown)
    }

    pub fn is_void(&self) -> bool {
        self.tag == TypeTag::Void
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.tag,
            TypeTag::I8
                | TypeTag::I16
                | TypeTag::I32
                | TypeTag::I64
                | TypeTag::I128
                | TypeTag::U8
                | TypeTag::U16
                | TypeTag::U32
                | TypeTag::U64
                | TypeTag::U128
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self.tag, TypeTag::F32 | TypeTag::F64)
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self.tag,
            TypeTag::I8 | TypeTag::I16 | TypeTag::I32 | TypeTag::I64 | TypeTag::I128
        )
    }

    /// Bit width for integer and float tags.
    pub fn bit_width(&self) -> Option<u8> {
        Some(match self.tag {
            TypeTag::I8 | TypeTag::U8 => 8,
            TypeTag::I16 | TypeTag::U16 => 16,
            TypeTag::I32 | TypeTag::U32 | TypeTag::F32 => 32,
            TypeTag::I64 | TypeTag::U64 | TypeTag::F64 => 64,
            TypeTag::I128 | TypeTag::U128 => 128,
            _ => return None,
        })
    }

    /// Map a primitive type keyword to its tag.
    pub fn tag_for_keyword(name: &str) -> Option<TypeTag> {
        Some(match name {
            "void" => TypeTag::Void,
            "i8" => TypeTag::I8,
            "i16" => TypeTag::I16,
            "i32" => TypeTag::I32,
            "i64" => TypeTag::I64,
            "i128" => TypeTag::I128,
            "u8" => TypeTag::U8,
            "u16" => TypeTag::U16,
            "u32" => TypeTag::U32,
            "u64" => TypeTag::U64,
            "u128" => TypeTag::U128,
            "f32" => TypeTag::F32,
            "f64" => TypeTag::F64,
            "char" => TypeTag::Char,
            "str" => TypeTag::Str,
            "bool" => TypeTag::Bool,
            "array" => TypeTag::Array,
            "slice" => TypeTag::Slice,
            "vec" => TypeTag::Vec,
            "map" => TypeTag::Map,
            "set" => TypeTag::Set,
            "tuple" => TypeTag::Tuple,
            "option" => TypeTag::Option,
            "result" => TypeTag::Result,
            "box" => TypeTag::Box,
            "ref" => TypeTag::Ref,
            "auto" => TypeTag::Auto,
            _ => return None,
        })
    }

    fn base_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match self.tag {
            TypeTag::Void => "void",
            TypeTag::I8 => "i8",
            TypeTag::I16 => "i16",
            TypeTag::I32 => "i32",
            TypeTag::I64 => "i64",
            TypeTag::I128 => "i128",
            TypeTag::U8 => "u8",
            TypeTag::U16 => "u16",
            TypeTag::U32 => "u32",
            TypeTag::U64 => "u64",
            TypeTag::U128 => "u128",
            TypeTag::F32 => "f32",
            TypeTag::F64 => "f64",
            TypeTag::Char => "char",
            TypeTag::Str => "str",
            TypeTag::Bool => "bool",
            TypeTag::Array => "array",
            TypeTag::Slice => "slice",
            TypeTag::Vec => "vec",
            TypeTag::Map => "map",
            TypeTag::Set => "set",
            TypeTag::Tuple => "tuple",
            TypeTag::Option => "option",
            TypeTag::Result => "result",
            TypeTag::Struct => "struct",
            TypeTag::Enum => "enum",
            TypeTag::Trait => "trait",
            TypeTag::Function => "func",
            TypeTag::Closure => "closure",
            TypeTag::Module => "module",
            TypeTag::Box => "box",
            TypeTag::Ref => "ref",
            TypeTag::SelfTy => "self",
            TypeTag::Auto => "auto",
            TypeTag::Unknown => "unknown",
        }
        .to_string()
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            write!(f, "const ")?;
        }
        write!(f, "{}", self.base_name())?;
        if !self.params.is_empty() {
            write!(f, "<")?;
            for (i, p) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", p)?;
            }
            write!(f, ">")?;
        }
        if self.is_pointer {
            write!(f, "*")?;
        }
        if self.is_reference {
            write!(f, " ref")?;
        }
        if self.is_optional {
            write!(f, "?")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_widths() {
        assert_eq!(TypeDesc::simple(TypeTag::I8).bit_width(), Some(8));
        assert_eq!(TypeDesc::simple(TypeTag::U64).bit_width(), Some(64));
        assert_eq!(TypeDesc::simple(TypeTag::F32).bit_width(), Some(32));
        assert_eq!(TypeDesc::simple(TypeTag::Str).bit_width(), None);
    }

    #[test]
    fn signedness() {
        assert!(TypeDesc::simple(TypeTag::I32).is_signed());
        assert!(!TypeDesc::simple(TypeTag::U32).is_signed());
        assert!(TypeDesc::simple(TypeTag::U32).is_integer());
    }

    #[test]
    fn display_compound() {
        let opt = TypeDesc::with_params(
            TypeTag::Option,
            vec![TypeDesc::simple(TypeTag::I32)],
        );
        assert_eq!(opt.to_string(), "option<i32>");

        let mut ptr = TypeDesc::named(TypeTag::Struct, "Point");
        ptr.is_pointer = true;
        assert_eq!(ptr.to_string(), "Point*");
    }

    #[test]
    fn keyword_lookup() {
        assert_eq!(TypeDesc::tag_for_keyword("i64"), Some(TypeTag::I64));
        assert_eq!(TypeDesc::tag_for_keyword("result"), Some(TypeTag::Result));
        assert_eq!(TypeDesc::tag_for_keyword("Point"), None);
    }
}
