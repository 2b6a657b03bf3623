//! CLI command implementations

pub mod config;
pub mod explain;
pub mod layout;
pub mod lower;

use anyhow::{anyhow, Error};
use contour_diagnostics::{
    Diagnostic, DiagnosticCode, DiagnosticEmitter, Diagnostics, JsonEmitter, TerminalEmitter,
};
use contour_ir::Unit;
use std::fs;
use std::path::Path;

use crate::OutputFormat;

/// Emit diagnostics to stderr in the selected format, followed by a summary
pub fn emit(
    diagnostics: Diagnostics,
    format: OutputFormat,
    use_color: bool,
) -> std::io::Result<()> {
    let stderr = std::io::stderr();
    let mut emitter: Box<dyn DiagnosticEmitter> = match format {
        OutputFormat::Text => Box::new(TerminalEmitter::new(stderr.lock(), use_color)),
        OutputFormat::Json => Box::new(JsonEmitter::new(stderr.lock())),
    };
    emitter.emit_all(&diagnostics)?;
    emitter.emit_summary(&diagnostics)
}

/// Report a fatal diagnostic and turn it into the command's error
pub fn fail(diagnostic: Diagnostic, format: OutputFormat, use_color: bool) -> Error {
    let message = format!("{} [{}]", diagnostic.message, diagnostic.code);
    let mut diagnostics = Diagnostics::new();
    diagnostics.push(diagnostic);
    if let Err(e) = emit(diagnostics, format, use_color) {
        return anyhow!("{} (could not report diagnostic: {})", message, e);
    }
    anyhow!(message)
}

/// Read a unit from JSON, optionally recomputing its reference sets
pub fn load_unit(
    path: &Path,
    annotate: bool,
    format: OutputFormat,
    use_color: bool,
) -> anyhow::Result<Unit> {
    let invalid = |reason: String| {
        fail(
            Diagnostic::new(DiagnosticCode::InvalidInput, reason)
                .in_unit(path.display().to_string())
                .build(),
            format,
            use_color,
        )
    };

    let text = fs::read_to_string(path)
        .map_err(|e| invalid(format!("cannot read {}: {}", path.display(), e)))?;
    let mut unit: Unit = serde_json::from_str(&text)
        .map_err(|e| invalid(format!("cannot decode {}: {}", path.display(), e)))?;

    if annotate {
        contour_transform::validate_unit(&unit)
            .map_err(|e| fail(e.to_diagnostic(&unit.name), format, use_color))?;
        contour_ir::annotate_references(&mut unit);
    }
    log::info!(
        "loaded `{}`: {} variables, {} scopes",
        unit.name,
        unit.vars.len(),
        unit.scopes.len()
    );
    Ok(unit)
}
