// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Conversions from phase error types into diagnostics.
//!
//! The lexer and parser collect their own lightweight error lists; the
//! driver folds them into the sink through these impls.

use flast_lexer::{LexError, LexErrorKind};
use flast_parser::ParseError;

use crate::{DiagKind, Diagnostic, ToDiagnostic};

impl ToDiagnostic for LexError {
    fn to_diagnostic(&self) -> Diagnostic {
        let kind = match self.kind {
            LexErrorKind::UnexpectedCharacter => DiagKind::UnexpectedCharacter,
            LexErrorKind::UnterminatedString => DiagKind::UnterminatedString,
            LexErrorKind::UnterminatedComment => DiagKind::UnterminatedComment,
            LexErrorKind::InvalidNumber => DiagKind::InvalidNumber,
            LexErrorKind::InvalidIdentifier => DiagKind::InvalidIdentifier,
        };
        let mut diagnostic = Diagnostic::error(kind, self.message.clone()).with_span(self.span);
        if let Some(hint) = &self.hint {
            diagnostic = diagnostic.with_hint(hint.clone());
        }
        diagnostic
    }
}

impl ToDiagnostic for ParseError {
    fn to_diagnostic(&self) -> Diagnostic {
        let kind = if self.at_eof {
            DiagKind::UnexpectedEof
        } else {
            match self.expected.as_str() {
                "';'" => DiagKind::MissingSemicolon,
                "'{'" | "'}'" => DiagKind::MissingBrace,
                "'('" | "')'" => DiagKind::MissingParen,
                "'['" | "']'" => DiagKind::MissingBracket,
                "expression" => DiagKind::InvalidExpression,
                s if s.starts_with("declaration") => DiagKind::InvalidDeclaration,
                _ => DiagKind::UnexpectedToken,
            }
        };
        let mut diagnostic = Diagnostic::error(kind, self.message.clone()).with_span(self.span);
        if let Some(hint) = &self.hint {
            diagnostic = diagnostic.with_hint(hint.clone());
        }
        diagnostic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flast_lexer::Lexer;
    use flast_parser::Parser;

    #[test]
    fn lex_errors_map_to_lexical_kinds() {
        let result = Lexer::new("let s = \"open").tokenize();
        let diag = result.errors[0].to_diagnostic();
        assert_eq!(diag.kind, DiagKind::UnterminatedString);
        assert!(diag.span.is_some());
    }

    #[test]
    fn parse_errors_map_to_syntax_kinds() {
        let lex = Lexer::new("func f() { let x = 1 }").tokenize();
        let mut parser = Parser::new(lex.tokens, "t.fls");
        let result = parser.parse();
        let diag = result.errors[0].to_diagnostic();
        assert_eq!(diag.kind, DiagKind::MissingSemicolon);
    }

    #[test]
    fn eof_errors_map_to_unexpected_eof() {
        let lex = Lexer::new("func f() {").tokenize();
        let mut parser = Parser::new(lex.tokens, "t.fls");
        let result = parser.parse();
        assert!(result
            .errors
            .iter()
            .any(|e| e.to_diagnostic().kind == DiagKind::UnexpectedEof));
    }
}
