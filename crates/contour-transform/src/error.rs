//! Errors raised by environment lowering
//!
//! Every variant is an internal-consistency violation: it means an
//! upstream pass produced a tree this pass cannot address correctly.
//! None of them are recovered from.

use contour_diagnostics::{Diagnostic, DiagnosticCode};
use contour_types::{ScopeId, VarId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerError {
    #[error("{what} id {id} is outside the unit's tables")]
    DanglingId { what: &'static str, id: u32 },

    #[error("no enclosing scope holds a slot for escaping variable `{name}` (#{var})")]
    UnboundEscapingVariable { var: VarId, name: String },

    #[error("function `{function}` has unsupported parameters: {reason}")]
    UnsupportedParameters { function: String, reason: String },

    #[error("scope `{name}` (#{scope}) is not reachable from the environment chain")]
    ScopeNotInChain { scope: ScopeId, name: String },

    #[error("record of scope `{name}` (#{scope}) has no parent link to walk through")]
    MissingParentLink { scope: ScopeId, name: String },
}

pub type Result<T> = std::result::Result<T, LowerError>;

impl LowerError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            LowerError::DanglingId { .. } => DiagnosticCode::DanglingId,
            LowerError::UnboundEscapingVariable { .. } => DiagnosticCode::UnboundEscapingVariable,
            LowerError::UnsupportedParameters { .. } => DiagnosticCode::UnsupportedParameters,
            LowerError::ScopeNotInChain { .. } => DiagnosticCode::ScopeNotInChain,
            LowerError::MissingParentLink { .. } => DiagnosticCode::MissingParentLink,
        }
    }

    /// Convert into a diagnostic attributed to `unit`
    pub fn to_diagnostic(&self, unit: &str) -> Diagnostic {
        let builder = Diagnostic::new(self.code(), self.to_string()).in_unit(unit);
        match self {
            LowerError::UnsupportedParameters { .. } => builder
                .with_help("special, keyword and non-constant default parameters must be simplified before environment lowering")
                .build(),
            LowerError::DanglingId { .. } => builder.build(),
            _ => builder
                .with_help("escape analysis and rewriting disagree; this is a bug in an earlier pass")
                .build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_offender() {
        let err = LowerError::UnboundEscapingVariable {
            var: 7,
            name: "count".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no enclosing scope holds a slot for escaping variable `count` (#7)"
        );
        assert_eq!(err.code(), DiagnosticCode::UnboundEscapingVariable);
    }

    #[test]
    fn test_to_diagnostic() {
        let err = LowerError::ScopeNotInChain {
            scope: 2,
            name: "outer".to_string(),
        };
        let diag = err.to_diagnostic("demo");
        assert!(diag.is_error());
        assert_eq!(diag.unit.as_deref(), Some("demo"));
        assert_eq!(diag.code.as_str(), "I003");
    }
}
