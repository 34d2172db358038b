// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The parser implementation using Pratt parsing for expressions.

use std::path::PathBuf;

use flast_ast::decl::{
    Decl, DeclKind, EnumDecl, Field, FnDecl, ImplDecl, ImportDecl, ModDecl, Modifiers, Param,
    StructDecl, TraitDecl, Variant,
};
use flast_ast::expr::{BinOp, Expr, ExprKind, LambdaParam, UnaryOp};
use flast_ast::stmt::{CatchClause, MatchArm, Pattern, Stmt, StmtKind};
use flast_ast::token::{Token, TokenKind};
use flast_ast::types::{TypeDesc, TypeTag};
use flast_ast::{Program, Span};

/// Maximum number of errors to collect before stopping.
const MAX_ERRORS: usize = 20;

/// The parser for Flast source code.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Track pending `>` from splitting `>>` in generic argument lists
    pending_gt: bool,
    /// Controls whether `{` can start a map literal (false in control flow
    /// conditions, where `{` opens the body)
    allow_brace_expr: bool,
    /// Collected errors during parsing
    errors: Vec<ParseError>,
    file: PathBuf,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, file: impl Into<PathBuf>) -> Self {
        // Doc comments are lexed for tools but invisible to the grammar.
        let tokens = tokens
            .into_iter()
            .filter(|t| t.kind != TokenKind::DocComment)
            .collect();
        Self {
            tokens,
            pos: 0,
            pending_gt: false,
            allow_brace_expr: true,
            errors: Vec::new(),
            file: file.into(),
        }
    }

    /// Record error, return whether parsing should continue.
    fn record_error(&mut self, error: ParseError) -> bool {
        self.errors.push(error);
        self.errors.len() < MAX_ERRORS
    }

    /// Skip to the next declaration after an error: advance until a `;` was
    /// just consumed or a declaration-starter keyword is ahead.
    fn synchronize(&mut self) {
        while !self.at_end() {
            if self.check(&TokenKind::Semi) {
                self.advance();
                return;
            }
            if self.current_kind().starts_decl()
                || matches!(
                    self.current_kind(),
                    TokenKind::Import | TokenKind::Use | TokenKind::Mod | TokenKind::Extern
                )
            {
                return;
            }
            self.advance();
        }
    }

    // =========================================================================
    // Token Navigation
    // =========================================================================

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek(&self, n: usize) -> &TokenKind {
        self.tokens.get(self.pos + n).map(|t| &t.kind).unwrap_or(&TokenKind::Eof)
    }

    fn at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> &Token {
        if !self.at_end() {
            self.pos += 1;
        }
        self.tokens.get(self.pos - 1).unwrap()
    }

    fn prev_span(&self) -> Span {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span)
            .unwrap_or(Span::new(0, 0))
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<&Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::expected(
                kind.display_name(),
                self.current_kind(),
                self.current().span,
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.current_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(ParseError::expected(
                "a name",
                self.current_kind(),
                self.current().span,
            )),
        }
    }

    /// Allow keywords as member/method names. After `.` or `?.` the type
    /// keywords (`map`, `set`, `vec`, ...) are ordinary names.
    fn expect_ident_or_keyword(&mut self) -> Result<String, ParseError> {
        let name = match self.current_kind().clone() {
            TokenKind::Ident(name) => name,
            TokenKind::ArrayTy => "array".to_string(),
            TokenKind::SliceTy => "slice".to_string(),
            TokenKind::VecTy => "vec".to_string(),
            TokenKind::MapTy => "map".to_string(),
            TokenKind::SetTy => "set".to_string(),
            TokenKind::TupleTy => "tuple".to_string(),
            TokenKind::OptionTy => "option".to_string(),
            TokenKind::ResultTy => "result".to_string(),
            TokenKind::StrTy => "str".to_string(),
            TokenKind::BoolTy => "bool".to_string(),
            TokenKind::CharTy => "char".to_string(),
            TokenKind::BoxKw => "box".to_string(),
            TokenKind::New => "new".to_string(),
            TokenKind::From => "from".to_string(),
            TokenKind::Print => "print".to_string(),
            TokenKind::Println => "println".to_string(),
            _ => {
                return Err(ParseError::expected(
                    "a name",
                    self.current_kind(),
                    self.current().span,
                ))
            }
        };
        self.advance();
        Ok(name)
    }

    fn expect_string(&mut self) -> Result<String, ParseError> {
        match self.current_kind().clone() {
            TokenKind::Str(s) | TokenKind::RawStr(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(ParseError::expected(
                "a string",
                self.current_kind(),
                self.current().span,
            )),
        }
    }

    fn expect_semi(&mut self) -> Result<(), ParseError> {
        if self.match_token(&TokenKind::Semi) {
            Ok(())
        } else {
            Err(ParseError::expected(
                "';'",
                self.current_kind(),
                self.current().span,
            ))
        }
    }

    /// Handle `>>` splitting when closing nested generic argument lists.
    fn expect_gt_in_generic(&mut self) -> Result<(), ParseError> {
        if self.pending_gt {
            self.pending_gt = false;
            return Ok(());
        }
        match self.current_kind() {
            TokenKind::Gt => {
                self.advance();
                Ok(())
            }
            TokenKind::Shr => {
                self.advance();
                self.pending_gt = true;
                Ok(())
            }
            _ => Err(ParseError::expected(
                "'>'",
                self.current_kind(),
                self.current().span,
            )),
        }
    }

    // =========================================================================
    // Top-Level Parsing
    // =========================================================================

    pub fn parse(&mut self) -> ParseResult {
        let mut decls = Vec::new();

        while !self.at_end() {
            let before = self.pos;
            match self.parse_decl() {
                Ok(decl) => decls.push(decl),
                Err(e) => {
                    if !self.record_error(e) {
                        break;
                    }
                    self.synchronize();
                    // A declaration that failed without consuming anything
                    // would resynchronize in place; force progress.
                    if self.pos == before {
                        self.advance();
                    }
                }
            }
        }

        ParseResult {
            program: Program::new(decls, self.file.clone()),
            errors: std::mem::take(&mut self.errors),
        }
    }

    fn parse_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        loop {
            match self.current_kind() {
                TokenKind::Pub => modifiers.is_pub = true,
                TokenKind::Static => modifiers.is_static = true,
                // `const` is a modifier only when a declaration head follows;
                // otherwise it starts a const binding inside a block.
                TokenKind::Const
                    if matches!(
                        self.peek(1),
                        TokenKind::Func | TokenKind::Fn | TokenKind::Struct | TokenKind::Enum
                    ) =>
                {
                    modifiers.is_const = true
                }
                TokenKind::Unsafe => modifiers.is_unsafe = true,
                TokenKind::Async => modifiers.is_async = true,
                _ => break,
            }
            self.advance();
        }
        modifiers
    }

    fn parse_decl(&mut self) -> Result<Decl, ParseError> {
        let start = self.current().span.start;
        let modifiers = self.parse_modifiers();

        let kind = match self.current_kind() {
            TokenKind::Func | TokenKind::Fn => {
                DeclKind::Function(self.parse_fn_decl(modifiers, None)?)
            }
            TokenKind::Extern => {
                self.advance();
                let abi = self.expect_string()?;
                DeclKind::Function(self.parse_fn_decl(modifiers, Some(abi))?)
            }
            TokenKind::Struct => DeclKind::Struct(self.parse_struct_decl(modifiers)?),
            TokenKind::Enum => DeclKind::Enum(self.parse_enum_decl(modifiers)?),
            TokenKind::Trait => DeclKind::Trait(self.parse_trait_decl(modifiers)?),
            TokenKind::Impl => DeclKind::Impl(self.parse_impl_decl()?),
            TokenKind::Import | TokenKind::Use => DeclKind::Import(self.parse_import_decl()?),
            TokenKind::Mod => DeclKind::Module(self.parse_mod_decl()?),
            _ => {
                return Err(ParseError::expected(
                    "declaration (func, struct, enum, trait, impl, import, mod)",
                    self.current_kind(),
                    self.current().span,
                ))
            }
        };

        let end = self.prev_span().end;
        Ok(Decl::new(kind, Span::new(start, end)))
    }

    fn parse_fn_decl(
        &mut self,
        modifiers: Modifiers,
        abi: Option<String>,
    ) -> Result<FnDecl, ParseError> {
        // Either head keyword spelling is accepted.
        if !self.match_token(&TokenKind::Func) && !self.match_token(&TokenKind::Fn) {
            return Err(ParseError::expected(
                "'func'",
                self.current_kind(),
                self.current().span,
            ));
        }
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(&TokenKind::RParen)?;

        let ret_ty = if self.match_token(&TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };

        // A trailing `;` instead of a block marks a foreign or abstract
        // declaration.
        let body = if self.match_token(&TokenKind::Semi) {
            None
        } else {
            Some(self.parse_block()?)
        };

        Ok(FnDecl { name, params, ret_ty, body, modifiers, abi })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let is_self = self.check(&TokenKind::SelfKw);
            let name = if is_self {
                self.advance();
                "self".to_string()
            } else {
                self.expect_ident()?
            };
            // A bare `self` parameter carries the self pseudo-type; every
            // other parameter needs an annotation.
            let ty = if self.match_token(&TokenKind::Colon) {
                self.parse_type()?
            } else if is_self {
                TypeDesc::simple(TypeTag::SelfTy)
            } else {
                return Err(ParseError::expected(
                    "':'",
                    self.current_kind(),
                    self.current().span,
                ));
            };
            let default = if self.match_token(&TokenKind::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(Param { name, ty, default });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_struct_decl(&mut self, modifiers: Modifiers) -> Result<StructDecl, ParseError> {
        self.expect(&TokenKind::Struct)?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LBrace)?;

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let is_pub = self.match_token(&TokenKind::Pub);
            let field_name = self.expect_ident()?;
            self.expect(&TokenKind::Colon)?;
            let ty = self.parse_type()?;
            fields.push(Field { name: field_name, ty, is_pub });
            if !self.match_token(&TokenKind::Comma) && !self.match_token(&TokenKind::Semi) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;

        Ok(StructDecl { name, fields, modifiers })
    }

    fn parse_enum_decl(&mut self, modifiers: Modifiers) -> Result<EnumDecl, ParseError> {
        self.expect(&TokenKind::Enum)?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LBrace)?;

        let mut variants = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let variant_name = self.expect_ident()?;
            let mut payload = Vec::new();
            if self.match_token(&TokenKind::LParen) {
                while !self.check(&TokenKind::RParen) && !self.at_end() {
                    payload.push(self.parse_type()?);
                    if !self.match_token(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen)?;
            }
            variants.push(Variant { name: variant_name, payload });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;

        Ok(EnumDecl { name, variants, modifiers })
    }

    fn parse_trait_decl(&mut self, modifiers: Modifiers) -> Result<TraitDecl, ParseError> {
        self.expect(&TokenKind::Trait)?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LBrace)?;

        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let method_modifiers = self.parse_modifiers();
            methods.push(self.parse_fn_decl(method_modifiers, None)?);
        }
        self.expect(&TokenKind::RBrace)?;

        Ok(TraitDecl { name, methods, modifiers })
    }

    fn parse_impl_decl(&mut self) -> Result<ImplDecl, ParseError> {
        self.expect(&TokenKind::Impl)?;
        let first = self.expect_ident()?;

        // `impl Trait for Target { .. }` vs `impl Target { .. }`
        let (trait_name, target) = if let TokenKind::Ident(s) = self.current_kind() {
            if s == "for" {
                self.advance();
                (Some(first), self.expect_ident()?)
            } else {
                (None, first)
            }
        } else if self.check(&TokenKind::For) {
            self.advance();
            (Some(first), self.expect_ident()?)
        } else {
            (None, first)
        };

        self.expect(&TokenKind::LBrace)?;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let method_modifiers = self.parse_modifiers();
            methods.push(self.parse_fn_decl(method_modifiers, None)?);
        }
        self.expect(&TokenKind::RBrace)?;

        Ok(ImplDecl { trait_name, target, methods })
    }

    /// Parse one of the four import shapes:
    /// `import "path";` / `import name from "path";` /
    /// `import { a, b } from "path";` / `import * from "path";`
    fn parse_import_decl(&mut self) -> Result<ImportDecl, ParseError> {
        self.advance(); // import / use

        let mut names = Vec::new();
        let mut wildcard = false;

        let path = match self.current_kind().clone() {
            TokenKind::Str(path) | TokenKind::RawStr(path) => {
                self.advance();
                path
            }
            TokenKind::Star => {
                self.advance();
                wildcard = true;
                self.expect(&TokenKind::From)?;
                self.expect_string()?
            }
            TokenKind::LBrace => {
                self.advance();
                loop {
                    names.push(self.expect_ident()?);
                    if !self.match_token(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace)?;
                self.expect(&TokenKind::From)?;
                self.expect_string()?
            }
            TokenKind::Ident(name) => {
                self.advance();
                names.push(name);
                self.expect(&TokenKind::From)?;
                self.expect_string()?
            }
            _ => {
                return Err(ParseError::expected(
                    "a string",
                    self.current_kind(),
                    self.current().span,
                )
                .with_hint("Imports look like: import \"path\"; or import name from \"path\";"))
            }
        };

        let alias = if self.match_token(&TokenKind::As) {
            Some(self.expect_ident()?)
        } else {
            None
        };

        self.expect_semi()?;
        Ok(ImportDecl { path, alias, names, wildcard })
    }

    fn parse_mod_decl(&mut self) -> Result<ModDecl, ParseError> {
        self.expect(&TokenKind::Mod)?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LBrace)?;

        let mut decls = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            decls.push(self.parse_decl()?);
        }
        self.expect(&TokenKind::RBrace)?;

        Ok(ModDecl { name, decls })
    }

    // =========================================================================
    // Types
    // =========================================================================

    /// Parse a type: primitive keywords, `self`/`Self`, `auto`, or a
    /// qualified name `A.B.C` with optional generic arguments, followed by
    /// trailing modifiers `*`, `ref`, `const`, `?`.
    pub fn parse_type(&mut self) -> Result<TypeDesc, ParseError> {
        let mut is_const = false;
        if self.check(&TokenKind::Const) {
            self.advance();
            is_const = true;
        }

        let mut desc = self.parse_type_base()?;
        desc.is_const = desc.is_const || is_const;

        loop {
            match self.current_kind() {
                TokenKind::Star => {
                    self.advance();
                    desc.is_pointer = true;
                }
                TokenKind::RefKw => {
                    self.advance();
                    desc.is_reference = true;
                }
                TokenKind::Const => {
                    self.advance();
                    desc.is_const = true;
                }
                TokenKind::Question => {
                    self.advance();
                    desc.is_optional = true;
                }
                _ => break,
            }
        }
        Ok(desc)
    }

    fn parse_type_base(&mut self) -> Result<TypeDesc, ParseError> {
        let kind = self.current_kind().clone();
        match kind {
            TokenKind::SelfKw | TokenKind::SelfTy => {
                self.advance();
                Ok(TypeDesc::simple(TypeTag::SelfTy))
            }
            TokenKind::Auto => {
                self.advance();
                Ok(TypeDesc::simple(TypeTag::Auto))
            }
            TokenKind::Void => {
                self.advance();
                Ok(TypeDesc::simple(TypeTag::Void))
            }
            // The parameterized forms option<T>, result<T, E>, array<T, N>
            // attach their arguments to the descriptor.
            TokenKind::OptionTy => {
                self.advance();
                let params = self.parse_generic_args()?;
                Ok(TypeDesc::with_params(TypeTag::Option, params))
            }
            TokenKind::ResultTy => {
                self.advance();
                let params = self.parse_generic_args()?;
                Ok(TypeDesc::with_params(TypeTag::Result, params))
            }
            TokenKind::ArrayTy => {
                self.advance();
                let params = self.parse_generic_args()?;
                Ok(TypeDesc::with_params(TypeTag::Array, params))
            }
            TokenKind::SliceTy | TokenKind::VecTy | TokenKind::MapTy | TokenKind::SetTy
            | TokenKind::TupleTy | TokenKind::BoxKw | TokenKind::RefKw => {
                let tag = match kind {
                    TokenKind::SliceTy => TypeTag::Slice,
                    TokenKind::VecTy => TypeTag::Vec,
                    TokenKind::MapTy => TypeTag::Map,
                    TokenKind::SetTy => TypeTag::Set,
                    TokenKind::TupleTy => TypeTag::Tuple,
                    TokenKind::BoxKw => TypeTag::Box,
                    _ => TypeTag::Ref,
                };
                self.advance();
                let params = self.parse_generic_args()?;
                Ok(TypeDesc::with_params(tag, params))
            }
            TokenKind::BoolTy => {
                self.advance();
                Ok(TypeDesc::simple(TypeTag::Bool))
            }
            TokenKind::CharTy => {
                self.advance();
                Ok(TypeDesc::simple(TypeTag::Char))
            }
            TokenKind::StrTy => {
                self.advance();
                Ok(TypeDesc::simple(TypeTag::Str))
            }
            TokenKind::I8 | TokenKind::I16 | TokenKind::I32 | TokenKind::I64 | TokenKind::I128
            | TokenKind::U8 | TokenKind::U16 | TokenKind::U32 | TokenKind::U64 | TokenKind::U128
            | TokenKind::F32 | TokenKind::F64 => {
                let tag = match kind {
                    TokenKind::I8 => TypeTag::I8,
                    TokenKind::I16 => TypeTag::I16,
                    TokenKind::I32 => TypeTag::I32,
                    TokenKind::I64 => TypeTag::I64,
                    TokenKind::I128 => TypeTag::I128,
                    TokenKind::U8 => TypeTag::U8,
                    TokenKind::U16 => TypeTag::U16,
                    TokenKind::U32 => TypeTag::U32,
                    TokenKind::U64 => TypeTag::U64,
                    TokenKind::U128 => TypeTag::U128,
                    TokenKind::F32 => TypeTag::F32,
                    _ => TypeTag::F64,
                };
                self.advance();
                Ok(TypeDesc::simple(tag))
            }
            TokenKind::Ident(first) => {
                self.advance();
                let mut name = first;
                while self.check(&TokenKind::Dot) {
                    self.advance();
                    name.push('.');
                    name.push_str(&self.expect_ident()?);
                }
                let mut desc = TypeDesc::named(TypeTag::Struct, name);
                if self.check(&TokenKind::Lt) {
                    desc.params = self.parse_generic_args()?;
                }
                Ok(desc)
            }
            _ => Err(ParseError::expected(
                "type",
                self.current_kind(),
                self.current().span,
            )),
        }
    }

    /// Parse `<T, U>` if present. A numeric argument (the N of
    /// `array<T, N>`) is recorded as an unknown-tagged descriptor carrying
    /// its spelling.
    fn parse_generic_args(&mut self) -> Result<Vec<TypeDesc>, ParseError> {
        let mut params = Vec::new();
        if !self.check(&TokenKind::Lt) {
            return Ok(params);
        }
        self.advance();
        loop {
            match self.current_kind().clone() {
                TokenKind::Number(_) => {
                    let lexeme = self.current().lexeme.clone();
                    self.advance();
                    params.push(TypeDesc::named(TypeTag::Unknown, lexeme));
                }
                _ => params.push(self.parse_type()?),
            }
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_gt_in_generic()?;
        Ok(params)
    }

    // =========================================================================
    // Statement Parsing
    // =========================================================================

    /// Parse a braced block, with error recovery inside the braces.
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&TokenKind::LBrace)?;

        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(e) => {
                    if !self.record_error(e) {
                        self.skip_to_closing_brace();
                        break;
                    }
                    self.synchronize_in_block();
                }
            }
        }

        self.expect(&TokenKind::RBrace)?;
        Ok(stmts)
    }

    /// Synchronize within a block - skip to the next statement boundary.
    fn synchronize_in_block(&mut self) {
        while !self.at_end() {
            if self.check(&TokenKind::RBrace) {
                return;
            }
            if self.check(&TokenKind::Semi) {
                self.advance();
                return;
            }
            match self.current_kind() {
                TokenKind::Let | TokenKind::Const | TokenKind::Return | TokenKind::If
                | TokenKind::While | TokenKind::For | TokenKind::Match | TokenKind::Break
                | TokenKind::Continue | TokenKind::Try | TokenKind::Throw => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skip to the closing brace of the current block.
    fn skip_to_closing_brace(&mut self) {
        let mut depth = 1;
        while !self.at_end() && depth > 0 {
            match self.current_kind() {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                _ => {}
            }
            if depth > 0 {
                self.advance();
            }
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current().span.start;

        let kind = match self.current_kind() {
            TokenKind::Let => self.parse_let_stmt(true)?,
            TokenKind::Const => self.parse_let_stmt(false)?,
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_semi()?;
                StmtKind::Return(value)
            }
            TokenKind::Break => {
                self.advance();
                self.expect_semi()?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.expect_semi()?;
                StmtKind::Continue
            }
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr_no_braces()?;
                let body = self.parse_block()?;
                StmtKind::While { cond, body }
            }
            TokenKind::For => self.parse_for_stmt()?,
            TokenKind::If => self.parse_if_stmt()?,
            TokenKind::Match => self.parse_match_stmt()?,
            TokenKind::Try => self.parse_try_stmt()?,
            TokenKind::Throw => {
                self.advance();
                let value = self.parse_expr()?;
                self.expect_semi()?;
                StmtKind::Throw(value)
            }
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            _ => {
                let kind = self.parse_simple_stmt()?;
                self.expect_semi()?;
                kind
            }
        };

        let end = self.prev_span().end;
        Ok(Stmt::new(kind, Span::new(start, end)))
    }

    /// Parse an expression or assignment without consuming a terminator.
    /// Used by ordinary expression statements and by C-style for headers.
    fn parse_simple_stmt(&mut self) -> Result<StmtKind, ParseError> {
        let expr = self.parse_expr()?;
        if let ExprKind::Assign { target, op, value } = expr.kind {
            return Ok(StmtKind::Assign { target: *target, op, value: *value });
        }
        Ok(StmtKind::Expr(expr))
    }

    fn parse_let_stmt(&mut self, mutable: bool) -> Result<StmtKind, ParseError> {
        self.advance(); // let / const
        let name = self.expect_ident()?;
        let ty = if self.match_token(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.match_token(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect_semi()?;
        Ok(StmtKind::Let { name, ty, init, mutable })
    }

    /// Parse a `for` statement, deciding between C-style and for-in by
    /// one-token lookahead past `let NAME [: TYPE]` for the `in` keyword.
    fn parse_for_stmt(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(&TokenKind::For)?;

        if self.check(&TokenKind::Let) {
            let let_start = self.current().span.start;
            self.advance();
            let name = self.expect_ident()?;
            let ty = if self.match_token(&TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };

            if self.match_token(&TokenKind::In) {
                let iterable = self.parse_expr_no_braces()?;
                let body = self.parse_block()?;
                return Ok(StmtKind::ForIn { var: name, var_ty: ty, iterable, body });
            }

            // C-style: the `let` we consumed is the init statement.
            self.expect(&TokenKind::Eq)?;
            let init_value = self.parse_expr()?;
            let init_span = Span::new(let_start, self.prev_span().end);
            self.expect_semi()?;
            let init = Some(Box::new(Stmt::new(
                StmtKind::Let { name, ty, init: Some(init_value), mutable: true },
                init_span,
            )));
            return self.parse_cstyle_for_rest(init);
        }

        // C-style without a declaration: `for ; cond ; update { }` or
        // `for i = 0; cond; update { }`.
        let init = if self.check(&TokenKind::Semi) {
            self.advance();
            None
        } else {
            let start = self.current().span.start;
            let kind = self.parse_simple_stmt()?;
            self.expect_semi()?;
            Some(Box::new(Stmt::new(kind, Span::new(start, self.prev_span().end))))
        };
        self.parse_cstyle_for_rest(init)
    }

    fn parse_cstyle_for_rest(&mut self, init: Option<Box<Stmt>>) -> Result<StmtKind, ParseError> {
        let cond = if self.check(&TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_semi()?;

        let update = if self.check(&TokenKind::LBrace) {
            None
        } else {
            let start = self.current().span.start;
            let old = self.allow_brace_expr;
            self.allow_brace_expr = false;
            let kind = self.parse_simple_stmt();
            self.allow_brace_expr = old;
            Some(Box::new(Stmt::new(kind?, Span::new(start, self.prev_span().end))))
        };

        let body = self.parse_block()?;
        Ok(StmtKind::For { init, cond, update, body })
    }

    fn parse_if_stmt(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(&TokenKind::If)?;
        let cond = self.parse_expr_no_braces()?;
        let then_block = self.parse_block()?;

        let else_block = if self.match_token(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                let start = self.current().span.start;
                let kind = self.parse_if_stmt()?;
                let end = self.prev_span().end;
                Some(vec![Stmt::new(kind, Span::new(start, end))])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(StmtKind::If { cond, then_block, else_block })
    }

    fn parse_match_stmt(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(&TokenKind::Match)?;
        let scrutinee = self.parse_expr_no_braces()?;
        self.expect(&TokenKind::LBrace)?;

        let mut arms = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let pattern = self.parse_pattern()?;
            self.expect(&TokenKind::FatArrow)?;
            let body = if self.check(&TokenKind::LBrace) {
                self.parse_block()?
            } else {
                let start = self.current().span.start;
                let kind = self.parse_simple_stmt()?;
                vec![Stmt::new(kind, Span::new(start, self.prev_span().end))]
            };
            arms.push(MatchArm { pattern, body });
            self.match_token(&TokenKind::Comma);
        }
        self.expect(&TokenKind::RBrace)?;

        Ok(StmtKind::Match { scrutinee, arms })
    }

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        match self.current_kind().clone() {
            TokenKind::Ident(name) if name == "_" => {
                self.advance();
                Ok(Pattern::Wildcard)
            }
            TokenKind::Ident(first) => {
                self.advance();
                let mut path = vec![first];
                while self.match_token(&TokenKind::Dot) {
                    path.push(self.expect_ident()?);
                }

                let mut fields = Vec::new();
                let has_parens = self.match_token(&TokenKind::LParen);
                if has_parens {
                    while !self.check(&TokenKind::RParen) && !self.at_end() {
                        fields.push(self.parse_pattern()?);
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                }

                // A lone lowercase name binds; anything else is a constructor.
                let is_binding = path.len() == 1
                    && !has_parens
                    && path[0].chars().next().map(|c| c.is_lowercase()).unwrap_or(false);
                if is_binding {
                    Ok(Pattern::Ident(path.pop().unwrap()))
                } else {
                    Ok(Pattern::Constructor { path, fields })
                }
            }
            TokenKind::Number(_) | TokenKind::Scientific(_) | TokenKind::Str(_)
            | TokenKind::Char(_) | TokenKind::Bool(_) | TokenKind::Null | TokenKind::Minus => {
                let expr = self.parse_expr_bp(Self::PREFIX_BP)?;
                Ok(Pattern::Literal(Box::new(expr)))
            }
            _ => Err(ParseError::expected(
                "pattern",
                self.current_kind(),
                self.current().span,
            )),
        }
    }

    fn parse_try_stmt(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(&TokenKind::Try)?;
        let body = self.parse_block()?;

        let catch = if self.match_token(&TokenKind::Catch) {
            let binding = if self.match_token(&TokenKind::LParen) {
                let name = self.expect_ident()?;
                self.expect(&TokenKind::RParen)?;
                Some(name)
            } else {
                None
            };
            let catch_body = self.parse_block()?;
            Some(CatchClause { binding, body: catch_body })
        } else {
            None
        };

        let finally = if self.match_token(&TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };

        if catch.is_none() && finally.is_none() {
            return Err(ParseError::expected(
                "'catch'",
                self.current_kind(),
                self.current().span,
            )
            .with_hint("A try block needs a catch or finally clause"));
        }

        Ok(StmtKind::Try { body, catch, finally })
    }

    // =========================================================================
    // Expression Parsing (Pratt Parser)
    // =========================================================================

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_expr_bp(0)
    }

    /// Disallow brace-started literals in control flow conditions, where
    /// `{` opens the body.
    fn parse_expr_no_braces(&mut self) -> Result<Expr, ParseError> {
        let old = self.allow_brace_expr;
        self.allow_brace_expr = false;
        let result = self.parse_expr_bp(0);
        self.allow_brace_expr = old;
        result
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let start = self.current().span.start;
        let mut lhs = self.parse_prefix()?;

        loop {
            if let Some(bp) = self.postfix_bp() {
                if bp < min_bp {
                    break;
                }
                lhs = self.parse_postfix(lhs)?;
                continue;
            }

            if self.check(&TokenKind::As) {
                if Self::CAST_BP < min_bp {
                    break;
                }
                self.advance();
                let ty = self.parse_type()?;
                let end = self.prev_span().end;
                lhs = Expr::new(
                    ExprKind::Cast { expr: Box::new(lhs), ty },
                    Span::new(start, end),
                );
                continue;
            }

            // Ternary and elvis, right-associative.
            if self.check(&TokenKind::Question) || self.check(&TokenKind::Elvis) {
                let (l_bp, r_bp) = Self::TERNARY_BP;
                if l_bp < min_bp {
                    break;
                }
                let elvis = self.check(&TokenKind::Elvis);
                self.advance();
                if elvis {
                    let else_branch = self.parse_expr_bp(r_bp)?;
                    let end = else_branch.span.end;
                    lhs = Expr::new(
                        ExprKind::Ternary {
                            cond: Box::new(lhs),
                            then_branch: None,
                            else_branch: Box::new(else_branch),
                        },
                        Span::new(start, end),
                    );
                } else {
                    let then_branch = self.parse_expr_bp(0)?;
                    self.expect(&TokenKind::Colon)?;
                    let else_branch = self.parse_expr_bp(r_bp)?;
                    let end = else_branch.span.end;
                    lhs = Expr::new(
                        ExprKind::Ternary {
                            cond: Box::new(lhs),
                            then_branch: Some(Box::new(then_branch)),
                            else_branch: Box::new(else_branch),
                        },
                        Span::new(start, end),
                    );
                }
                continue;
            }

            // Assignment, right-associative, lowest precedence.
            if let Some(op) = self.peek_assign_op() {
                let (l_bp, r_bp) = Self::ASSIGN_BP;
                if l_bp < min_bp {
                    break;
                }
                self.advance();
                let value = self.parse_expr_bp(r_bp)?;
                let end = value.span.end;
                lhs = Expr::new(
                    ExprKind::Assign { target: Box::new(lhs), op, value: Box::new(value) },
                    Span::new(start, end),
                );
                continue;
            }

            // Pipeline `a |> f(b)` desugars to `f(a, b)`.
            if self.check(&TokenKind::Pipeline) {
                let (l_bp, r_bp) = Self::PIPELINE_BP;
                if l_bp < min_bp {
                    break;
                }
                self.advance();
                let rhs = self.parse_expr_bp(r_bp)?;
                let end = rhs.span.end;
                lhs = match rhs.kind {
                    ExprKind::Call { func, mut args } => {
                        args.insert(0, lhs);
                        Expr::new(ExprKind::Call { func, args }, Span::new(start, end))
                    }
                    _ => Expr::new(
                        ExprKind::Call { func: Box::new(rhs), args: vec![lhs] },
                        Span::new(start, end),
                    ),
                };
                continue;
            }

            if let Some((l_bp, r_bp, op)) = self.infix_bp() {
                if l_bp < min_bp {
                    break;
                }
                self.advance();
                let rhs = self.parse_expr_bp(r_bp)?;
                let end = rhs.span.end;
                lhs = Expr::new(
                    ExprKind::Binary { op, left: Box::new(lhs), right: Box::new(rhs) },
                    Span::new(start, end),
                );
                continue;
            }

            break;
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        let start = self.current().span.start;

        let prefix_op = match self.current_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::Bang | TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::PlusPlus => Some(UnaryOp::Inc),
            TokenKind::MinusMinus => Some(UnaryOp::Dec),
            TokenKind::Amp => Some(UnaryOp::Ref),
            TokenKind::Star => Some(UnaryOp::Deref),
            _ => None,
        };
        if let Some(op) = prefix_op {
            self.advance();
            let operand = self.parse_expr_bp(Self::PREFIX_BP)?;
            let end = operand.span.end;
            return Ok(Expr::new(
                ExprKind::Unary { op, operand: Box::new(operand), prefix: true },
                Span::new(start, end),
            ));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let start = self.current().span.start;
        let lexeme = self.current().lexeme.clone();

        match self.current_kind().clone() {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Number { value, text: lexeme },
                    Span::new(start, self.prev_span().end),
                ))
            }
            TokenKind::Scientific(value) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Scientific { value, text: lexeme },
                    Span::new(start, self.prev_span().end),
                ))
            }
            TokenKind::Str(s) | TokenKind::RawStr(s) | TokenKind::Template(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(s), Span::new(start, self.prev_span().end)))
            }
            TokenKind::Char(c) => {
                self.advance();
                Ok(Expr::new(ExprKind::Char(c), Span::new(start, self.prev_span().end)))
            }
            TokenKind::Bool(b) => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(b), Span::new(start, self.prev_span().end)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Null, Span::new(start, self.prev_span().end)))
            }
            TokenKind::SelfKw => {
                self.advance();
                Ok(Expr::new(ExprKind::SelfRef, Span::new(start, self.prev_span().end)))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Ident(name), Span::new(start, self.prev_span().end)))
            }
            TokenKind::Println | TokenKind::Print => {
                let name = if matches!(self.current_kind(), TokenKind::Println) {
                    "println"
                } else {
                    "print"
                };
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let args = self.parse_args()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::new(
                    ExprKind::Builtin { name: name.to_string(), args },
                    Span::new(start, self.prev_span().end),
                ))
            }
            TokenKind::New => {
                self.advance();
                let class = self.expect_ident()?;
                self.expect(&TokenKind::LParen)?;
                let args = self.parse_args()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::new(
                    ExprKind::New { class, args },
                    Span::new(start, self.prev_span().end),
                ))
            }
            TokenKind::LParen => self.parse_paren_or_tuple(),
            TokenKind::LBracket => self.parse_list_literal(),
            TokenKind::LBrace if self.allow_brace_expr => self.parse_map_literal(),
            TokenKind::Pipe => self.parse_lambda(),
            TokenKind::PipePipe => {
                // `||` at expression start is an empty lambda parameter list.
                self.advance();
                let body = self.parse_expr()?;
                let end = body.span.end;
                Ok(Expr::new(
                    ExprKind::Lambda { params: Vec::new(), body: Box::new(body) },
                    Span::new(start, end),
                ))
            }
            _ => Err(ParseError::expected(
                "expression",
                self.current_kind(),
                self.current().span,
            )),
        }
    }

    fn parse_paren_or_tuple(&mut self) -> Result<Expr, ParseError> {
        let start = self.current().span.start;
        self.expect(&TokenKind::LParen)?;

        // Parenthesized expressions never restrict braces.
        let old = self.allow_brace_expr;
        self.allow_brace_expr = true;

        if self.check(&TokenKind::RParen) {
            self.advance();
            self.allow_brace_expr = old;
            return Ok(Expr::new(
                ExprKind::TupleLit(Vec::new()),
                Span::new(start, self.prev_span().end),
            ));
        }

        let result = (|this: &mut Self| {
            let first = this.parse_expr()?;
            if this.match_token(&TokenKind::Comma) {
                let mut elements = vec![first];
                while !this.check(&TokenKind::RParen) && !this.at_end() {
                    elements.push(this.parse_expr()?);
                    if !this.match_token(&TokenKind::Comma) {
                        break;
                    }
                }
                this.expect(&TokenKind::RParen)?;
                Ok(Expr::new(
                    ExprKind::TupleLit(elements),
                    Span::new(start, this.prev_span().end),
                ))
            } else {
                this.expect(&TokenKind::RParen)?;
                Ok(first)
            }
        })(self);

        self.allow_brace_expr = old;
        result
    }

    fn parse_list_literal(&mut self) -> Result<Expr, ParseError> {
        let start = self.current().span.start;
        self.expect(&TokenKind::LBracket)?;

        let mut items = Vec::new();
        while !self.check(&TokenKind::RBracket) && !self.at_end() {
            items.push(self.parse_expr()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(Expr::new(ExprKind::List(items), Span::new(start, self.prev_span().end)))
    }

    fn parse_map_literal(&mut self) -> Result<Expr, ParseError> {
        let start = self.current().span.start;
        self.expect(&TokenKind::LBrace)?;

        let mut pairs = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let key = self.parse_expr()?;
            self.expect(&TokenKind::Colon)?;
            let value = self.parse_expr()?;
            pairs.push((key, value));
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::new(ExprKind::MapLit(pairs), Span::new(start, self.prev_span().end)))
    }

    fn parse_lambda(&mut self) -> Result<Expr, ParseError> {
        let start = self.current().span.start;
        self.expect(&TokenKind::Pipe)?;

        let mut params = Vec::new();
        while !self.check(&TokenKind::Pipe) && !self.at_end() {
            let name = self.expect_ident()?;
            let ty = if self.match_token(&TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            params.push(LambdaParam { name, ty });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::Pipe)?;

        let body = self.parse_expr()?;
        let end = body.span.end;
        Ok(Expr::new(
            ExprKind::Lambda { params, body: Box::new(body) },
            Span::new(start, end),
        ))
    }

    /// Postfix chains fold member access, index, call, and safe access
    /// uniformly.
    fn parse_postfix(&mut self, lhs: Expr) -> Result<Expr, ParseError> {
        let start = lhs.span.start;

        match self.current_kind() {
            TokenKind::LParen => {
                self.advance();
                let args = self.parse_args()?;
                self.expect(&TokenKind::RParen)?;
                let end = self.prev_span().end;
                Ok(Expr::new(
                    ExprKind::Call { func: Box::new(lhs), args },
                    Span::new(start, end),
                ))
            }
            TokenKind::Dot => {
                self.advance();
                let field = self.expect_ident_or_keyword()?;
                if self.check(&TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_args()?;
                    self.expect(&TokenKind::RParen)?;
                    let end = self.prev_span().end;
                    Ok(Expr::new(
                        ExprKind::MethodCall { object: Box::new(lhs), method: field, args },
                        Span::new(start, end),
                    ))
                } else {
                    let end = self.prev_span().end;
                    Ok(Expr::new(
                        ExprKind::Member { object: Box::new(lhs), field, safe: false },
                        Span::new(start, end),
                    ))
                }
            }
            TokenKind::QuestionDot => {
                self.advance();
                let field = self.expect_ident_or_keyword()?;
                let end = self.prev_span().end;
                Ok(Expr::new(
                    ExprKind::Member { object: Box::new(lhs), field, safe: true },
                    Span::new(start, end),
                ))
            }
            TokenKind::LBracket => {
                self.advance();
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBracket)?;
                let end = self.prev_span().end;
                Ok(Expr::new(
                    ExprKind::Index { object: Box::new(lhs), index: Box::new(index) },
                    Span::new(start, end),
                ))
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if matches!(self.current_kind(), TokenKind::PlusPlus) {
                    UnaryOp::Inc
                } else {
                    UnaryOp::Dec
                };
                self.advance();
                let end = self.prev_span().end;
                Ok(Expr::new(
                    ExprKind::Unary { op, operand: Box::new(lhs), prefix: false },
                    Span::new(start, end),
                ))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let old = self.allow_brace_expr;
        self.allow_brace_expr = true;
        let result = (|this: &mut Self| {
            let mut args = Vec::new();
            if this.check(&TokenKind::RParen) {
                return Ok(args);
            }
            loop {
                args.push(this.parse_expr()?);
                if !this.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            Ok(args)
        })(self);
        self.allow_brace_expr = old;
        result
    }

    // =========================================================================
    // Operator Precedence
    // =========================================================================

    const ASSIGN_BP: (u8, u8) = (2, 1);
    const PIPELINE_BP: (u8, u8) = (3, 4);
    const TERNARY_BP: (u8, u8) = (6, 5);
    const CAST_BP: u8 = 28;
    const PREFIX_BP: u8 = 29;
    const POSTFIX_BP: u8 = 31;

    fn postfix_bp(&self) -> Option<u8> {
        match self.current_kind() {
            TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::Dot
            | TokenKind::QuestionDot
            | TokenKind::PlusPlus
            | TokenKind::MinusMinus => Some(Self::POSTFIX_BP),
            _ => None,
        }
    }

    /// Compound-assignment detection for the Pratt loop. Returns the
    /// compound operator (`None` inner value for plain `=`).
    fn peek_assign_op(&self) -> Option<Option<BinOp>> {
        match self.current_kind() {
            TokenKind::Eq => Some(None),
            TokenKind::PlusEq => Some(Some(BinOp::Add)),
            TokenKind::MinusEq => Some(Some(BinOp::Sub)),
            TokenKind::StarEq => Some(Some(BinOp::Mul)),
            TokenKind::SlashEq => Some(Some(BinOp::Div)),
            TokenKind::PercentEq => Some(Some(BinOp::Mod)),
            TokenKind::StarStarEq => Some(Some(BinOp::Pow)),
            TokenKind::AmpEq => Some(Some(BinOp::BitAnd)),
            TokenKind::PipeEq => Some(Some(BinOp::BitOr)),
            TokenKind::CaretEq => Some(Some(BinOp::BitXor)),
            TokenKind::ShlEq => Some(Some(BinOp::Shl)),
            TokenKind::ShrEq => Some(Some(BinOp::Shr)),
            _ => None,
        }
    }

    /// Binding powers for the infix ladder, low to high. Equality sits
    /// below comparison, so `a < b == c > d` parses as `(a < b) == (c > d)`.
    /// Power is right-associative.
    fn infix_bp(&self) -> Option<(u8, u8, BinOp)> {
        let entry = match self.current_kind() {
            TokenKind::QuestionQuestion => (6, 5, BinOp::NullCoalesce),
            TokenKind::PipePipe | TokenKind::Or => (7, 8, BinOp::Or),
            TokenKind::AmpAmp | TokenKind::And => (9, 10, BinOp::And),
            TokenKind::Pipe => (11, 12, BinOp::BitOr),
            TokenKind::Caret | TokenKind::Xor => (13, 14, BinOp::BitXor),
            TokenKind::Amp => (15, 16, BinOp::BitAnd),
            TokenKind::EqEq => (17, 18, BinOp::Eq),
            TokenKind::NotEq => (17, 18, BinOp::Ne),
            TokenKind::EqEqEq => (17, 18, BinOp::StrictEq),
            TokenKind::NotEqEq => (17, 18, BinOp::StrictNe),
            TokenKind::Lt => (19, 20, BinOp::Lt),
            TokenKind::Gt => (19, 20, BinOp::Gt),
            TokenKind::LtEq => (19, 20, BinOp::Le),
            TokenKind::GtEq => (19, 20, BinOp::Ge),
            TokenKind::Spaceship => (19, 20, BinOp::Compare),
            TokenKind::Shl => (21, 22, BinOp::Shl),
            TokenKind::Shr => (21, 22, BinOp::Shr),
            TokenKind::UShr => (21, 22, BinOp::UShr),
            TokenKind::Plus => (23, 24, BinOp::Add),
            TokenKind::Minus => (23, 24, BinOp::Sub),
            TokenKind::Star => (25, 26, BinOp::Mul),
            TokenKind::Slash => (25, 26, BinOp::Div),
            TokenKind::Percent => (25, 26, BinOp::Mod),
            TokenKind::StarStar => (28, 27, BinOp::Pow),
            _ => return None,
        };
        Some(entry)
    }
}

/// Result of parsing: the program plus any errors found.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Program,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    /// Returns true if parsing completed without errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A parser error with location and friendly message.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    /// True when the error was caused by running out of input.
    pub at_eof: bool,
    /// What the parser was looking for, used to pick a diagnostic kind.
    pub expected: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    fn expected(expected: &str, found: &TokenKind, span: Span) -> Self {
        let message = format_expected_message(expected, found);
        let hint = crate::hints::for_expected(expected, found).map(String::from);
        Self {
            span,
            message,
            hint,
            at_eof: matches!(found, TokenKind::Eof),
            expected: expected.to_string(),
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Format a user-friendly "expected X, found Y" message.
fn format_expected_message(expected: &str, found: &TokenKind) -> String {
    match expected {
        "';'" => format!("Expected ';' after statement, found {}", found.display_name()),
        "'}'" => format!("Expected '}}' to close block, found {}", found.display_name()),
        "'{'" => format!("Expected '{{' to start block, found {}", found.display_name()),
        "')'" => {
            if matches!(found, TokenKind::Eof) {
                "Unclosed '(' - missing ')'".to_string()
            } else {
                format!("Expected ')', found {}", found.display_name())
            }
        }
        "']'" => {
            if matches!(found, TokenKind::Eof) {
                "Unclosed '[' - missing ']'".to_string()
            } else {
                format!("Expected ']', found {}", found.display_name())
            }
        }
        "a name" => format!("Expected name, found {}", found.display_name()),
        "expression" => format!("Expected expression, found {}", found.display_name()),
        "type" => format!("Expected type, found {}", found.display_name()),
        "pattern" => format!("Expected pattern, found {}", found.display_name()),
        _ => format!("Expected {}, found {}", expected, found.display_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flast_lexer::Lexer;

    fn parse_source(source: &str) -> Program {
        let lex = Lexer::new(source).tokenize();
        assert!(lex.is_ok(), "lex errors: {:?}", lex.errors);
        let mut parser = Parser::new(lex.tokens, "test.fls");
        let result = parser.parse();
        assert!(result.is_ok(), "parse errors: {:?}", result.errors);
        result.program
    }

    fn parse_expr_source(source: &str) -> Expr {
        let lex = Lexer::new(source).tokenize();
        assert!(lex.is_ok(), "lex errors: {:?}", lex.errors);
        let mut parser = Parser::new(lex.tokens, "test.fls");
        let expr = parser.parse_expr().expect("expression should parse");
        assert!(parser.errors.is_empty());
        expr
    }

    #[test]
    fn scientific_literal_preserved() {
        let program = parse_source("func f() { let x: f64 = 1.5e-3; }");
        let DeclKind::Function(f) = &program.decls[0].kind else {
            panic!("expected function");
        };
        let body = f.body.as_ref().unwrap();
        let StmtKind::Let { init: Some(init), ty: Some(ty), .. } = &body[0].kind else {
            panic!("expected let with init");
        };
        assert_eq!(ty.tag, TypeTag::F64);
        let ExprKind::Scientific { value, text } = &init.kind else {
            panic!("expected scientific literal, got {:?}", init.kind);
        };
        assert_eq!(*value, 0.0015);
        assert_eq!(text, "1.5e-3");
        assert_eq!(init.render(), "1.5e-3");
    }

    #[test]
    fn equality_below_comparison() {
        // a < b == c > d parses as (a < b) == (c > d)
        let expr = parse_expr_source("a < b == c > d");
        assert_eq!(expr.render(), "((a < b) == (c > d))");
    }

    #[test]
    fn power_is_right_associative() {
        let expr = parse_expr_source("2 ** 3 ** 2");
        assert_eq!(expr.render(), "(2 ** (3 ** 2))");
    }

    #[test]
    fn assignment_is_right_associative() {
        let expr = parse_expr_source("a = b = c");
        let ExprKind::Assign { value, .. } = &expr.kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn equal_precedence_is_left_leaning() {
        let expr = parse_expr_source("a - b - c");
        assert_eq!(expr.render(), "((a - b) - c)");
        let expr = parse_expr_source("a * b / c % d");
        assert_eq!(expr.render(), "(((a * b) / c) % d)");
    }

    #[test]
    fn mixed_precedence_ladder() {
        let expr = parse_expr_source("a + b * c");
        assert_eq!(expr.render(), "(a + (b * c))");
        let expr = parse_expr_source("a << b + c");
        assert_eq!(expr.render(), "(a << (b + c))");
        let expr = parse_expr_source("a | b ^ c & d");
        assert_eq!(expr.render(), "(a | (b ^ (c & d)))");
        let expr = parse_expr_source("a or b and c");
        assert_eq!(expr.render(), "(a || (b && c))");
    }

    #[test]
    fn ternary_and_elvis() {
        let expr = parse_expr_source("a ? b : c");
        assert_eq!(expr.render(), "(a ? b : c)");
        let expr = parse_expr_source("a ?: b");
        assert_eq!(expr.render(), "(a ?: b)");
        // Right-associative: a ? b : c ? d : e
        let expr = parse_expr_source("a ? b : c ? d : e");
        assert_eq!(expr.render(), "(a ? b : (c ? d : e))");
    }

    #[test]
    fn pipeline_desugars_to_call() {
        let expr = parse_expr_source("x |> f(y)");
        assert_eq!(expr.render(), "f(x, y)");
        let expr = parse_expr_source("x |> f |> g");
        assert_eq!(expr.render(), "g(f(x))");
    }

    #[test]
    fn postfix_chain_folds_uniformly() {
        let expr = parse_expr_source("a.b[0].c(1)?.d");
        assert_eq!(expr.render(), "a.b[0].c(1)?.d");
        let expr = parse_expr_source("s.len()");
        assert!(matches!(expr.kind, ExprKind::MethodCall { .. }));
    }

    #[test]
    fn unary_prefix_and_postfix() {
        let expr = parse_expr_source("-x");
        assert_eq!(expr.render(), "(-x)");
        let expr = parse_expr_source("i++");
        assert_eq!(expr.render(), "(i++)");
        let expr = parse_expr_source("not a && b");
        assert_eq!(expr.render(), "((!a) && b)");
    }

    #[test]
    fn for_in_vs_cstyle_disambiguation() {
        // For-in with a typed binding and an integer iterable.
        let program = parse_source("func f() { for let i: i32 in 10 { println(i); } }");
        let DeclKind::Function(f) = &program.decls[0].kind else { panic!() };
        let body = f.body.as_ref().unwrap();
        let StmtKind::ForIn { var, iterable, .. } = &body[0].kind else {
            panic!("expected for-in, got {:?}", body[0].kind);
        };
        assert_eq!(var, "i");
        assert!(matches!(iterable.kind, ExprKind::Number { value, .. } if value == 10.0));

        // C-style with the same prefix.
        let program =
            parse_source("func f() { for let i: i32 = 0; i < 10; i = i + 1 { println(i); } }");
        let DeclKind::Function(f) = &program.decls[0].kind else { panic!() };
        let body = f.body.as_ref().unwrap();
        let StmtKind::For { init, cond, update, .. } = &body[0].kind else {
            panic!("expected c-style for, got {:?}", body[0].kind);
        };
        assert!(init.is_some());
        assert!(cond.is_some());
        assert!(matches!(
            update.as_ref().unwrap().kind,
            StmtKind::Assign { .. }
        ));
    }

    #[test]
    fn import_shapes() {
        let program = parse_source(
            r#"
            import "lib";
            import helper from "utils";
            import { a, b, c } from "many";
            import * from "everything";
            "#,
        );
        let imports: Vec<&ImportDecl> = program
            .decls
            .iter()
            .map(|d| match &d.kind {
                DeclKind::Import(i) => i,
                other => panic!("expected import, got {:?}", other),
            })
            .collect();

        assert_eq!(imports[0].path, "lib");
        assert!(imports[0].names.is_empty() && !imports[0].wildcard);

        assert_eq!(imports[1].names, vec!["helper"]);
        assert_eq!(imports[1].path, "utils");

        assert_eq!(imports[2].names, vec!["a", "b", "c"]);
        assert_eq!(imports[2].path, "many");

        assert!(imports[3].wildcard);
        assert_eq!(imports[3].path, "everything");
    }

    #[test]
    fn declarations_parse() {
        let program = parse_source(
            r#"
            pub struct Point { x: i32, y: i32 }
            enum Shape { Circle(f64), Rect(f64, f64), Empty }
            trait Area { func area(self) -> f64; }
            impl Area for Point { func area(self) -> f64 { return 0; } }
            pub func origin() -> self { return new Point(); }
            extern "C" func puts(s: str) -> i32;
            mod geometry { func helper() -> i32 { return 1; } }
            "#,
        );
        assert_eq!(program.decls.len(), 7);
        assert!(matches!(&program.decls[0].kind, DeclKind::Struct(s) if s.modifiers.is_pub));
        let DeclKind::Enum(e) = &program.decls[1].kind else { panic!() };
        assert_eq!(e.variants.len(), 3);
        assert_eq!(e.variants[1].payload.len(), 2);
        let DeclKind::Impl(i) = &program.decls[3].kind else { panic!() };
        assert_eq!(i.trait_name.as_deref(), Some("Area"));
        assert_eq!(i.target, "Point");
        let DeclKind::Function(f) = &program.decls[4].kind else { panic!() };
        assert!(f.is_constructor());
        let DeclKind::Function(f) = &program.decls[5].kind else { panic!() };
        assert_eq!(f.abi.as_deref(), Some("C"));
        assert!(f.body.is_none());
    }

    #[test]
    fn default_params_and_foreign_functions() {
        let program = parse_source("func greet(name: str, times: i32 = 1) { }");
        let DeclKind::Function(f) = &program.decls[0].kind else { panic!() };
        assert!(f.params[0].default.is_none());
        assert!(f.params[1].default.is_some());
    }

    #[test]
    fn types_parse_with_params_and_modifiers() {
        let program = parse_source(
            "func f(a: option<i32>, b: result<str, i32>, c: array<i32, 4>, d: map<str, vec<i32>>, e: Point*, g: i32 ref) { }",
        );
        let DeclKind::Function(f) = &program.decls[0].kind else { panic!() };
        assert_eq!(f.params[0].ty.tag, TypeTag::Option);
        assert_eq!(f.params[0].ty.params.len(), 1);
        assert_eq!(f.params[1].ty.params.len(), 2);
        assert_eq!(f.params[2].ty.params.len(), 2);
        assert_eq!(f.params[3].ty.params[1].tag, TypeTag::Vec);
        assert!(f.params[4].ty.is_pointer);
        assert!(f.params[5].ty.is_reference);
    }

    #[test]
    fn match_try_throw_parse() {
        let program = parse_source(
            r#"
            func f(x: i32) {
                match x {
                    0 => { return; }
                    n => { println(n); }
                }
                try { g(); } catch (e) { println(e); } finally { h(); }
                throw "boom";
            }
            "#,
        );
        let DeclKind::Function(f) = &program.decls[0].kind else { panic!() };
        let body = f.body.as_ref().unwrap();
        assert!(matches!(body[0].kind, StmtKind::Match { .. }));
        let StmtKind::Try { catch, finally, .. } = &body[1].kind else { panic!() };
        assert_eq!(catch.as_ref().unwrap().binding.as_deref(), Some("e"));
        assert!(finally.is_some());
        assert!(matches!(body[2].kind, StmtKind::Throw(_)));
    }

    #[test]
    fn recovery_resynchronizes_at_decl_boundary() {
        let lex = Lexer::new("func ( { } func ok() { return 1; }").tokenize();
        let mut parser = Parser::new(lex.tokens, "test.fls");
        let result = parser.parse();
        assert!(!result.is_ok());
        // The good declaration after the bad one still parses.
        assert!(result
            .program
            .decls
            .iter()
            .any(|d| matches!(&d.kind, DeclKind::Function(f) if f.name == "ok")));
    }

    #[test]
    fn stray_statement_at_top_level_recovers() {
        let lex = Lexer::new("let x = 5; func ok() { }").tokenize();
        let mut parser = Parser::new(lex.tokens, "test.fls");
        let result = parser.parse();
        assert!(!result.is_ok());
        assert!(result
            .program
            .decls
            .iter()
            .any(|d| matches!(&d.kind, DeclKind::Function(f) if f.name == "ok")));
    }

    #[test]
    fn missing_semicolon_recovers_in_block() {
        let lex = Lexer::new("func f() { let x = 1 let y = 2; }").tokenize();
        let mut parser = Parser::new(lex.tokens, "test.fls");
        let result = parser.parse();
        assert!(!result.is_ok());
        assert!(result.errors[0].message.contains("';'"));
    }

    #[test]
    fn render_round_trip_is_stable() {
        let source = r#"
            import sqrt from "math";
            pub struct Point { x: f64, y: f64 }
            func norm(p: Point) -> f64 {
                let sum: f64 = p.x * p.x + p.y * p.y;
                if sum == 0 {
                    return 0;
                }
                return sqrt(sum);
            }
            func main() -> i32 {
                for let i: i32 in 3 {
                    println(i, "of", 3);
                }
                let total = 0;
                for let j: i32 = 0; j < 10; j = j + 1 {
                    total += j ** 2;
                }
                while total > 100 {
                    total = total - 7;
                }
                return 0;
            }
        "#;
        let first = parse_source(source);
        let rendered = first.render();

        let relex = Lexer::new(&rendered).tokenize();
        assert!(relex.is_ok(), "re-lex errors: {:?}", relex.errors);
        let mut reparser = Parser::new(relex.tokens, "test.fls");
        let second = reparser.parse();
        assert!(second.is_ok(), "re-parse errors: {:?}", second.errors);
        assert_eq!(second.program.render(), rendered);
    }
}
