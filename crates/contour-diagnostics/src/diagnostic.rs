//! Diagnostic types for lowering errors and layout hints.

use serde::{Deserialize, Serialize};

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational hint (why a record was placed where it was)
    Hint,
    /// Error (aborts lowering of the unit)
    Error,
}

impl Severity {
    /// Get the string representation for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Hint => "hint",
            Severity::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic codes organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // Input errors (E001-E099)
    /// The unit could not be read or decoded
    InvalidInput,
    /// A variable or scope id in the tree is outside the unit's tables
    DanglingId,

    // Internal consistency errors (I001-I099)
    /// An escaping variable has no slot in any enclosing scope
    UnboundEscapingVariable,
    /// A function definition still carries non-simple parameters
    UnsupportedParameters,
    /// An environment lookup targeted a scope outside the scope stack
    ScopeNotInChain,
    /// A chain walk needed a parent link the record does not have
    MissingParentLink,

    // Layout hints (H001-H099)
    /// A record must be heap-allocated
    HeapEnvironment,
}

impl DiagnosticCode {
    /// Get the code string (e.g., "I001").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "E001",
            Self::DanglingId => "E002",

            Self::UnboundEscapingVariable => "I001",
            Self::UnsupportedParameters => "I002",
            Self::ScopeNotInChain => "I003",
            Self::MissingParentLink => "I004",

            Self::HeapEnvironment => "H001",
        }
    }

    /// Get the default severity for this code.
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::InvalidInput
            | Self::DanglingId
            | Self::UnboundEscapingVariable
            | Self::UnsupportedParameters
            | Self::ScopeNotInChain
            | Self::MissingParentLink => Severity::Error,

            Self::HeapEnvironment => Severity::Hint,
        }
    }

    /// Look up a code by its string form.
    pub fn lookup(code: &str) -> Option<Self> {
        ALL_CODES
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(code))
    }
}

/// Every code, in display order.
pub const ALL_CODES: &[DiagnosticCode] = &[
    DiagnosticCode::InvalidInput,
    DiagnosticCode::DanglingId,
    DiagnosticCode::UnboundEscapingVariable,
    DiagnosticCode::UnsupportedParameters,
    DiagnosticCode::ScopeNotInChain,
    DiagnosticCode::MissingParentLink,
    DiagnosticCode::HeapEnvironment,
];

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A diagnostic produced while lowering a unit.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Unique code
    pub code: DiagnosticCode,
    /// Severity level
    pub severity: Severity,
    /// Short message (single line)
    pub message: String,
    /// Longer explanation (optional)
    pub explanation: Option<String>,
    /// Unit the diagnostic belongs to
    pub unit: Option<String>,
    /// Additional notes (offending variables, scopes)
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Create a diagnostic with the code's default severity.
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(code, code.default_severity(), message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_hint(&self) -> bool {
        self.severity == Severity::Hint
    }
}

/// Builder for constructing diagnostics fluently.
pub struct DiagnosticBuilder {
    inner: Diagnostic,
}

impl DiagnosticBuilder {
    /// Create a new diagnostic builder.
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            inner: Diagnostic {
                code,
                severity,
                message: message.into(),
                explanation: None,
                unit: None,
                notes: Vec::new(),
            },
        }
    }

    /// Name the unit being lowered.
    pub fn in_unit(mut self, unit: impl Into<String>) -> Self {
        self.inner.unit = Some(unit.into());
        self
    }

    /// Add a note line.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.inner.notes.push(note.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.inner.explanation = Some(help.into());
        self
    }

    /// Build the diagnostic.
    pub fn build(self) -> Diagnostic {
        self.inner
    }
}

/// Collection of diagnostics with summary statistics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// All diagnostics
    pub items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn hint_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_hint()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip_by_string() {
        for code in ALL_CODES {
            assert_eq!(DiagnosticCode::lookup(code.as_str()), Some(*code));
        }
        assert_eq!(
            DiagnosticCode::lookup("i003"),
            Some(DiagnosticCode::ScopeNotInChain)
        );
        assert_eq!(DiagnosticCode::lookup("Z999"), None);
    }

    #[test]
    fn test_counts() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::new(DiagnosticCode::ScopeNotInChain, "lost scope").build());
        diags.push(Diagnostic::new(DiagnosticCode::HeapEnvironment, "heap record").build());
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.hint_count(), 1);
        assert_eq!(diags.len(), 2);
    }
}
