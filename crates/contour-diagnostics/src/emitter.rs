//! Diagnostic emitters for different output formats.

use crate::diagnostic::{Diagnostic, Diagnostics, Severity};
use std::io::Write;

/// Trait for emitting diagnostics in various formats.
pub trait DiagnosticEmitter {
    /// Emit a single diagnostic.
    fn emit(&mut self, diagnostic: &Diagnostic) -> std::io::Result<()>;

    /// Emit multiple diagnostics.
    fn emit_all(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        for diag in diagnostics.iter() {
            self.emit(diag)?;
        }
        Ok(())
    }

    /// Emit a summary line.
    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()>;
}

/// Terminal output with optional colors.
pub struct TerminalEmitter<W: Write> {
    writer: W,
    colored: bool,
}

impl<W: Write> TerminalEmitter<W> {
    pub fn new(writer: W, colored: bool) -> Self {
        Self { writer, colored }
    }

    fn severity_color(&self, severity: Severity) -> &'static str {
        if !self.colored {
            return "";
        }
        match severity {
            Severity::Error => "\x1b[31m", // Red
            Severity::Hint => "\x1b[34m",  // Blue
        }
    }

    fn reset(&self) -> &'static str {
        if self.colored {
            "\x1b[0m"
        } else {
            ""
        }
    }

    fn bold(&self) -> &'static str {
        if self.colored {
            "\x1b[1m"
        } else {
            ""
        }
    }

    fn cyan(&self) -> &'static str {
        if self.colored {
            "\x1b[36m"
        } else {
            ""
        }
    }
}

impl<W: Write> DiagnosticEmitter for TerminalEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic) -> std::io::Result<()> {
        let color = self.severity_color(diagnostic.severity);
        let reset = self.reset();
        let bold = self.bold();
        let cyan = self.cyan();

        // Header: error[I001]: message
        writeln!(
            self.writer,
            "{}{}{}[{}]{}: {}",
            bold,
            color,
            diagnostic.severity.as_str(),
            diagnostic.code.as_str(),
            reset,
            diagnostic.message
        )?;

        if let Some(ref unit) = diagnostic.unit {
            writeln!(self.writer, "  {}-->{} {}", cyan, reset, unit)?;
        }

        for note in &diagnostic.notes {
            writeln!(self.writer, "  {}= note:{} {}", cyan, reset, note)?;
        }

        if let Some(ref explanation) = diagnostic.explanation {
            writeln!(self.writer, "  {}= help:{} {}", cyan, reset, explanation)?;
        }

        writeln!(self.writer)?;
        Ok(())
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        let errors = diagnostics.error_count();
        let hints = diagnostics.hint_count();
        let plural = |n: usize| if n == 1 { "" } else { "s" };

        let (color, summary) = match (errors, hints) {
            (0, 0) => return Ok(()),
            (0, hints) => (Severity::Hint, format!("{} hint{}", hints, plural(hints))),
            (errors, 0) => (Severity::Error, format!("{} error{}", errors, plural(errors))),
            (errors, hints) => (
                Severity::Error,
                format!(
                    "{} error{} and {} hint{}",
                    errors,
                    plural(errors),
                    hints,
                    plural(hints)
                ),
            ),
        };
        writeln!(
            self.writer,
            "{}{} emitted{}",
            self.severity_color(color),
            summary,
            self.reset()
        )
    }
}

/// JSON output for tooling integration.
pub struct JsonEmitter<W: Write> {
    writer: W,
}

impl<W: Write> JsonEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> DiagnosticEmitter for JsonEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic) -> std::io::Result<()> {
        let json = serde_json::json!({
            "code": diagnostic.code.as_str(),
            "severity": diagnostic.severity.as_str(),
            "message": diagnostic.message,
            "unit": diagnostic.unit,
            "notes": diagnostic.notes,
            "help": diagnostic.explanation,
        });

        serde_json::to_writer(&mut self.writer, &json)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        let summary = serde_json::json!({
            "type": "summary",
            "errors": diagnostics.error_count(),
            "hints": diagnostics.hint_count(),
            "total": diagnostics.len(),
        });
        serde_json::to_writer(&mut self.writer, &summary)?;
        writeln!(self.writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticCode;

    fn sample() -> Diagnostic {
        Diagnostic::new(DiagnosticCode::UnboundEscapingVariable, "no slot for `x`")
            .in_unit("demo")
            .with_note("variable x#3 is defined in scope `outer`")
            .build()
    }

    #[test]
    fn test_terminal_emitter_without_color() {
        let mut out = Vec::new();
        TerminalEmitter::new(&mut out, false).emit(&sample()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("error[I001]: no slot for `x`\n"));
        assert!(text.contains("= note: variable x#3"));
    }

    #[test]
    fn test_json_emitter() {
        let mut out = Vec::new();
        JsonEmitter::new(&mut out).emit(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["code"], "I001");
        assert_eq!(value["unit"], "demo");
    }

    #[test]
    fn test_terminal_summary() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(sample());
        diagnostics.push(Diagnostic::new(DiagnosticCode::HeapEnvironment, "heap record").build());
        diagnostics.push(Diagnostic::new(DiagnosticCode::HeapEnvironment, "heap record").build());

        let mut out = Vec::new();
        TerminalEmitter::new(&mut out, false).emit_summary(&diagnostics).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1 error and 2 hints emitted\n");

        let mut out = Vec::new();
        TerminalEmitter::new(&mut out, false).emit_summary(&Diagnostics::new()).unwrap();
        assert!(out.is_empty());
    }
}
