// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Declaration AST nodes.

use crate::expr::Expr;
use crate::stmt::Stmt;
use crate::types::TypeDesc;
use crate::Span;

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub kind: DeclKind,
    pub span: Span,
}

impl Decl {
    pub fn new(kind: DeclKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The kind of declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    Function(FnDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Trait(TraitDecl),
    Impl(ImplDecl),
    Import(ImportDecl),
    Module(ModDecl),
}

/// Modifier flags preceding a declaration head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub is_pub: bool,
    pub is_static: bool,
    pub is_const: bool,
    pub is_unsafe: bool,
    pub is_async: bool,
}

/// A function declaration.
///
/// `body` is `None` for foreign/abstract declarations (a trailing `;`
/// instead of a block).
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_ty: Option<TypeDesc>,
    pub body: Option<Vec<Stmt>>,
    pub modifiers: Modifiers,
    /// Linkage string from `extern "C" func ...`.
    pub abi: Option<String>,
}

impl FnDecl {
    /// True when the declared return type is the `self` pseudo-type,
    /// marking this function as a constructor.
    pub fn is_constructor(&self) -> bool {
        self.ret_ty
            .as_ref()
            .map(|t| t.tag == crate::types::TypeTag::SelfTy)
            .unwrap_or(false)
    }
}

/// A function parameter. A default value implies the parameter is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeDesc,
    pub default: Option<Expr>,
}

/// A struct declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<Field>,
    pub modifiers: Modifiers,
}

/// A struct field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeDesc,
    pub is_pub: bool,
}

/// An enum declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<Variant>,
    pub modifiers: Modifiers,
}

/// An enum variant with an optional tuple payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub name: String,
    pub payload: Vec<TypeDesc>,
}

/// A trait declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitDecl {
    pub name: String,
    pub methods: Vec<FnDecl>,
    pub modifiers: Modifiers,
}

/// An impl block, `impl T { .. }` or `impl Trait for T { .. }`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImplDecl {
    pub trait_name: Option<String>,
    pub target: String,
    pub methods: Vec<FnDecl>,
}

/// An import declaration. All four syntactic shapes produce this record:
///
/// - `import "path";`                    — names empty, no wildcard
/// - `import name from "path";`          — names = [name]
/// - `import { a, b } from "path";`      — names = [a, b]
/// - `import * from "path";`             — wildcard
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub path: String,
    pub alias: Option<String>,
    pub names: Vec<String>,
    pub wildcard: bool,
}

/// An inline module declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ModDecl {
    pub name: String,
    pub decls: Vec<Decl>,
}
