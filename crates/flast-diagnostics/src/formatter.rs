// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Terminal formatter for diagnostics.
//!
//! Produces multi-line, color-coded output with a source context line and
//! a caret underlining the offending lexeme:
//!
//! ```text
//! error: expected ';' after statement
//!   --> main.fls:10:25
//!    |
//! 10 |     let result = calculate()
//!    |                  ^^^^^^^^^^^
//!    = hint: statements end with ';'
//! ```
//!
//! Color is applied by the `colored` crate, which disables itself when
//! stdout is not an interactive terminal or NO_COLOR is set.

use colored::Colorize;

use flast_ast::LineMap;

use crate::{Diagnostic, Severity};

/// Formats diagnostics for terminal output.
pub struct DiagnosticFormatter<'a> {
    source: &'a str,
    file_name: &'a str,
    line_map: LineMap,
}

impl<'a> DiagnosticFormatter<'a> {
    pub fn new(source: &'a str, file_name: &'a str) -> Self {
        Self {
            source,
            file_name,
            line_map: LineMap::new(source),
        }
    }

    pub fn format(&self, diagnostic: &Diagnostic) -> String {
        let mut out = String::new();

        let severity_str = match diagnostic.severity {
            Severity::Info => "info".blue().bold(),
            Severity::Warning => "warning".yellow().bold(),
            Severity::Error => "error".red().bold(),
            Severity::Fatal => "fatal".red().bold(),
        };
        out.push_str(&format!("{}: {}\n", severity_str, diagnostic.message.bold()));

        if let Some(span) = diagnostic.span {
            let (line, col) = self.line_map.offset_to_line_col(span.start);
            out.push_str(&format!(
                "  {} {}:{}:{}\n",
                "-->".blue(),
                self.file_name,
                line,
                col
            ));

            if let Some(text) = self.line_map.line_text(self.source, line) {
                let gutter = line.to_string().len().max(2);
                out.push_str(&format!("{} {}\n", " ".repeat(gutter + 1), "|".blue()));
                out.push_str(&format!(
                    "{:>width$} {} {}\n",
                    line.to_string().blue().bold(),
                    "|".blue(),
                    text,
                    width = gutter + 1,
                ));

                // Caret underline covering the offending lexeme.
                let caret_len = diagnostic
                    .lexeme
                    .as_ref()
                    .map(|l| l.len())
                    .unwrap_or_else(|| span.end.saturating_sub(span.start))
                    .max(1);
                let col = col as usize;
                let avail = (text.len() + 1).saturating_sub(col).max(1);
                out.push_str(&format!(
                    "{} {} {}{}\n",
                    " ".repeat(gutter + 1),
                    "|".blue(),
                    " ".repeat(col.saturating_sub(1)),
                    "^".repeat(caret_len.min(avail)).red().bold(),
                ));
            }
        }

        if let Some(suggestion) = &diagnostic.suggestion {
            out.push_str(&format!(
                "   {} {}: {}\n",
                "=".cyan(),
                "suggestion".cyan().bold(),
                suggestion
            ));
        }
        for hint in &diagnostic.hints {
            out.push_str(&format!(
                "   {} {}: {}\n",
                "=".cyan(),
                "hint".cyan().bold(),
                hint
            ));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DiagKind;
    use flast_ast::Span;

    #[test]
    fn format_includes_location_and_caret() {
        colored::control::set_override(false);
        let source = "let x = ;\n";
        let formatter = DiagnosticFormatter::new(source, "main.fls");
        let diag = Diagnostic::error(DiagKind::InvalidExpression, "expected expression")
            .with_span(Span::new(8, 9))
            .with_lexeme(";");
        let text = formatter.format(&diag);
        assert!(text.contains("error: expected expression"));
        assert!(text.contains("main.fls:1:9"));
        assert!(text.contains("let x = ;"));
        assert!(text.contains('^'));
    }

    #[test]
    fn format_without_span_is_header_only() {
        colored::control::set_override(false);
        let formatter = DiagnosticFormatter::new("", "main.fls");
        let diag = Diagnostic::fatal(DiagKind::LinkingFailed, "linker exited with status 1");
        let text = formatter.format(&diag);
        assert!(text.starts_with("fatal: linker exited"));
        assert!(!text.contains("-->"));
    }

    #[test]
    fn hints_render_after_context() {
        colored::control::set_override(false);
        let source = "import \"nowhere\";\n";
        let formatter = DiagnosticFormatter::new(source, "main.fls");
        let diag = Diagnostic::error(DiagKind::ModuleNotFound, "module not found: nowhere")
            .with_span(Span::new(7, 16))
            .with_hint("check if the module file exists");
        let text = formatter.format(&diag);
        let hint_pos = text.find("hint:").unwrap();
        let ctx_pos = text.find("import").unwrap();
        assert!(hint_pos > ctx_pos);
    }
}
