// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Flast compiler diagnostics.
//!
//! A single diagnostic model shared by every phase. Each phase's error
//! type converts to `Diagnostic` via the `ToDiagnostic` trait; the driver
//! owns one `DiagnosticSink` and hands it to the phases that report
//! directly, so all output flows through one append-only log.

pub mod convert;
pub mod formatter;

use flast_ast::Span;
use serde::Serialize;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    /// Halts the current phase immediately.
    Fatal,
}

/// The closed set of diagnostic kinds, grouped by phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagKind {
    // Lexical
    UnexpectedCharacter,
    UnterminatedString,
    UnterminatedComment,
    InvalidNumber,
    InvalidIdentifier,

    // Syntax
    UnexpectedToken,
    MissingSemicolon,
    MissingBrace,
    MissingParen,
    MissingBracket,
    UnexpectedEof,
    InvalidDeclaration,
    InvalidStatement,
    InvalidExpression,

    // Imports
    ModuleNotFound,
    DuplicateImport,
    InvalidImportPath,
    CircularDependency,

    // Types / semantics
    TypeMismatch,
    UndefinedVariable,
    UndefinedFunction,
    UndefinedType,
    InvalidConversion,
    DuplicateDeclaration,
    InvalidAccessModifier,
    InvalidMethodCall,

    // System
    FileNotFound,
    PermissionDenied,
    CompilationFailed,
    LinkingFailed,
}

/// A compiler diagnostic with enough context for caret rendering.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagKind,
    pub message: String,
    /// Byte span in the source of `file`, when known.
    pub span: Option<Span>,
    /// The offending lexeme, when known.
    pub lexeme: Option<String>,
    pub suggestion: Option<String>,
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, kind: DiagKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            span: None,
            lexeme: None,
            suggestion: None,
            hints: Vec::new(),
        }
    }

    pub fn error(kind: DiagKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, kind, message)
    }

    pub fn warning(kind: DiagKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, kind, message)
    }

    pub fn fatal(kind: DiagKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, kind, message)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_lexeme(mut self, lexeme: impl Into<String>) -> Self {
        self.lexeme = Some(lexeme.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }
}

/// Convert a phase error into a diagnostic.
pub trait ToDiagnostic {
    fn to_diagnostic(&self) -> Diagnostic;
}

/// Append-only log of diagnostics, owned by the top-level driver.
///
/// Diagnostics are recorded in discovery order and displayed grouped
/// (errors first, then warnings) at end of phase.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn report_all<E: ToDiagnostic>(&mut self, errors: &[E]) {
        for error in errors {
            self.report(error.to_diagnostic());
        }
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Diagnostics grouped for display: errors (and fatals) first, then
    /// warnings, then notes, each group in discovery order.
    pub fn grouped(&self) -> Vec<&Diagnostic> {
        let mut out: Vec<&Diagnostic> = Vec::with_capacity(self.diagnostics.len());
        out.extend(self.diagnostics.iter().filter(|d| d.is_error()));
        out.extend(
            self.diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Warning),
        );
        out.extend(self.diagnostics.iter().filter(|d| d.severity == Severity::Info));
        out
    }

    /// The final summary line.
    pub fn summary(&self) -> String {
        format!(
            "compilation failed with {} error(s) and {} warning(s)",
            self.error_count(),
            self.warning_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_puts_errors_first() {
        let mut sink = DiagnosticSink::new();
        sink.report(Diagnostic::warning(DiagKind::DuplicateImport, "dup"));
        sink.report(Diagnostic::error(DiagKind::UnexpectedToken, "bad"));
        sink.report(Diagnostic::warning(DiagKind::DuplicateImport, "dup2"));
        sink.report(Diagnostic::fatal(DiagKind::LinkingFailed, "ld"));

        let grouped = sink.grouped();
        assert_eq!(grouped.len(), 4);
        assert!(grouped[0].is_error());
        assert!(grouped[1].is_error());
        assert_eq!(grouped[2].severity, Severity::Warning);
        assert_eq!(sink.error_count(), 2);
        assert_eq!(sink.warning_count(), 2);
    }

    #[test]
    fn summary_counts() {
        let mut sink = DiagnosticSink::new();
        sink.report(Diagnostic::error(DiagKind::ModuleNotFound, "missing"));
        assert_eq!(
            sink.summary(),
            "compilation failed with 1 error(s) and 0 warning(s)"
        );
    }
}
