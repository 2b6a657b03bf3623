//! Diagnostic infrastructure for contour.
//!
//! Lowering failures are internal-consistency violations; this crate
//! turns them (and layout hints) into structured diagnostics with codes
//! and renders them as terminal text or JSON.
//!
//! # Example
//!
//! ```
//! use contour_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticEmitter, TerminalEmitter};
//!
//! let diag = Diagnostic::new(DiagnosticCode::ScopeNotInChain, "scope `outer` is not on the stack")
//!     .in_unit("demo")
//!     .build();
//!
//! let mut out = Vec::new();
//! TerminalEmitter::new(&mut out, false).emit(&diag).unwrap();
//! ```

pub mod diagnostic;
pub mod emitter;

// Re-export commonly used types
pub use diagnostic::{
    Diagnostic, DiagnosticBuilder, DiagnosticCode, Diagnostics, Severity, ALL_CODES,
};
pub use emitter::{DiagnosticEmitter, JsonEmitter, TerminalEmitter};
