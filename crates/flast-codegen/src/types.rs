// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! TypeDesc → Cranelift type translation and struct layout.

use cranelift::prelude::*;
use flast_ast::decl::StructDecl;
use flast_ast::types::{TypeDesc, TypeTag};

use crate::{CodegenError, CodegenResult};

/// Translate a type descriptor to a Cranelift value type.
///
/// Signed and unsigned integers share the same-width IR type; sign is
/// tracked at use sites. Strings and every pointer-shaped type lower to
/// the 64-bit pointer width, and struct values are represented by pointer
/// to their laid-out storage.
pub fn clif_type(ty: &TypeDesc) -> CodegenResult<Type> {
    if ty.is_pointer || ty.is_reference {
        return Ok(types::I64);
    }
    Ok(match ty.tag {
        TypeTag::Void => types::I64,
        TypeTag::Bool => types::I8,
        TypeTag::I8 | TypeTag::U8 => types::I8,
        TypeTag::I16 | TypeTag::U16 => types::I16,
        TypeTag::I32 | TypeTag::U32 => types::I32,
        TypeTag::I64 | TypeTag::U64 => types::I64,
        TypeTag::I128 | TypeTag::U128 => types::I128,
        TypeTag::F32 => types::F32,
        TypeTag::F64 => types::F64,
        TypeTag::Char => types::I32,
        TypeTag::Str => types::I64,
        TypeTag::Struct | TypeTag::Enum | TypeTag::Trait => types::I64,
        // `self` as a type is a generic byte pointer.
        TypeTag::SelfTy => types::I64,
        TypeTag::Box | TypeTag::Ref | TypeTag::Function | TypeTag::Closure => types::I64,
        TypeTag::Option | TypeTag::Result | TypeTag::Array | TypeTag::Slice | TypeTag::Vec
        | TypeTag::Map | TypeTag::Set | TypeTag::Tuple | TypeTag::Module => types::I64,
        TypeTag::Auto | TypeTag::Unknown => {
            return Err(CodegenError::Lowering(format!(
                "cannot lower un-inferred type '{}'",
                ty
            )))
        }
    })
}

/// Size in bytes of a field of this type inside a struct.
pub fn field_size(ty: &TypeDesc) -> u32 {
    if ty.is_pointer || ty.is_reference {
        return 8;
    }
    match ty.tag {
        TypeTag::Bool | TypeTag::I8 | TypeTag::U8 => 1,
        TypeTag::I16 | TypeTag::U16 => 2,
        TypeTag::I32 | TypeTag::U32 | TypeTag::F32 | TypeTag::Char => 4,
        TypeTag::I128 | TypeTag::U128 => 16,
        _ => 8,
    }
}

/// Alignment of a field of this type.
pub fn field_align(ty: &TypeDesc) -> u32 {
    field_size(ty).min(8)
}

/// A field's resolved position inside a struct.
#[derive(Debug, Clone)]
pub struct FieldLayout {
    pub name: String,
    pub ty: TypeDesc,
    pub offset: u32,
}

/// The computed memory layout of a struct: fields in declaration order at
/// C-like aligned offsets.
#[derive(Debug, Clone)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<FieldLayout>,
    pub size: u32,
    pub align: u32,
}

impl StructLayout {
    pub fn for_decl(decl: &StructDecl) -> Self {
        let mut fields = Vec::with_capacity(decl.fields.len());
        let mut offset = 0u32;
        let mut align = 1u32;

        for field in &decl.fields {
            let f_align = field_align(&field.ty);
            let f_size = field_size(&field.ty);
            offset = round_up(offset, f_align);
            fields.push(FieldLayout {
                name: field.name.clone(),
                ty: field.ty.clone(),
                offset,
            });
            offset += f_size;
            align = align.max(f_align);
        }

        let size = round_up(offset.max(1), align);
        StructLayout { name: decl.name.clone(), fields, size, align }
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    (value + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use flast_ast::decl::{Field, Modifiers};

    fn field(name: &str, tag: TypeTag) -> Field {
        Field { name: name.to_string(), ty: TypeDesc::simple(tag), is_pub: false }
    }

    #[test]
    fn clif_types_by_width() {
        assert_eq!(clif_type(&TypeDesc::simple(TypeTag::I8)).unwrap(), types::I8);
        assert_eq!(clif_type(&TypeDesc::simple(TypeTag::U16)).unwrap(), types::I16);
        assert_eq!(clif_type(&TypeDesc::simple(TypeTag::I32)).unwrap(), types::I32);
        assert_eq!(clif_type(&TypeDesc::simple(TypeTag::F64)).unwrap(), types::F64);
        assert_eq!(clif_type(&TypeDesc::simple(TypeTag::Str)).unwrap(), types::I64);
        assert_eq!(clif_type(&TypeDesc::simple(TypeTag::SelfTy)).unwrap(), types::I64);
    }

    #[test]
    fn pointer_modifier_overrides_base() {
        let mut ty = TypeDesc::simple(TypeTag::I8);
        ty.is_pointer = true;
        assert_eq!(clif_type(&ty).unwrap(), types::I64);
    }

    #[test]
    fn struct_layout_aligns_fields() {
        let decl = StructDecl {
            name: "Mixed".to_string(),
            fields: vec![
                field("flag", TypeTag::Bool), // offset 0, size 1
                field("count", TypeTag::I32), // aligned to 4
                field("value", TypeTag::F64), // aligned to 8
                field("tail", TypeTag::I8),   // offset 16
            ],
            modifiers: Modifiers::default(),
        };
        let layout = StructLayout::for_decl(&decl);
        assert_eq!(layout.field("flag").unwrap().offset, 0);
        assert_eq!(layout.field("count").unwrap().offset, 4);
        assert_eq!(layout.field("value").unwrap().offset, 8);
        assert_eq!(layout.field("tail").unwrap().offset, 16);
        // Total rounds up to the struct's alignment.
        assert_eq!(layout.align, 8);
        assert_eq!(layout.size, 24);
    }

    #[test]
    fn empty_struct_has_nonzero_size() {
        let decl = StructDecl {
            name: "Unit".to_string(),
            fields: vec![],
            modifiers: Modifiers::default(),
        };
        assert!(StructLayout::for_decl(&decl).size >= 1);
    }
}
