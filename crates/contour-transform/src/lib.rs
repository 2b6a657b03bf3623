//! Environment lowering for Contour
//!
//! Turns an already-bound tree with nested function definitions into one
//! where all non-local variable access goes through explicit environment
//! records and every capturing function value is an explicit closure:
//! - Free-variable calculation
//! - Escape analysis and record layout, with bounded-lifetime inference
//! - Closure conversion over the environment chain
//!
//! ```ignore
//! let analysis = contour_transform::lower_environments(&mut unit, &LowerOptions::default())?;
//! ```

pub mod chain;
pub mod closure;
pub mod error;
pub mod free_vars;
pub mod layout;
pub mod options;
pub mod validate;

use contour_diagnostics::{Diagnostic, DiagnosticCode};
use contour_ir::Unit;
use log::info;

pub use closure::convert_closures;
pub use error::{LowerError, Result};
pub use free_vars::{compute_free_variables, FreeVariables};
pub use layout::{check_parameters, compute_layout, HeapReason, Layout};
pub use options::LowerOptions;
pub use validate::validate_unit;

/// Analysis results of one unit
#[derive(Debug, Clone)]
pub struct Analysis {
    pub free: FreeVariables,
    pub layout: Layout,
}

/// Run free-variable and layout analysis without rewriting the tree
///
/// Escape flags, slot offsets and bounded-lifetime flags are still
/// written into the unit.
pub fn analyze(unit: &mut Unit, options: &LowerOptions) -> Result<Analysis> {
    validate_unit(unit)?;
    let free = compute_free_variables(&unit.root);
    let layout = compute_layout(unit, options)?;
    Ok(Analysis { free, layout })
}

/// Analyze the unit and rewrite its tree in place
pub fn lower_environments(unit: &mut Unit, options: &LowerOptions) -> Result<Analysis> {
    let analysis = analyze(unit, options)?;
    convert_closures(unit, &analysis.free, &analysis.layout, options)?;
    info!(
        "lowered `{}`: {} records, {} on the stack",
        unit.name,
        analysis.layout.slots.len(),
        analysis.layout.stack.values().filter(|s| **s).count()
    );
    Ok(analysis)
}

/// Explain every heap-allocated record as a hint diagnostic
pub fn heap_hints(unit: &Unit, analysis: &Analysis) -> Vec<Diagnostic> {
    let mut scopes: Vec<_> = analysis.layout.heap_reasons.iter().collect();
    scopes.sort_by_key(|(scope, _)| **scope);

    scopes
        .into_iter()
        .map(|(scope, reason)| {
            let builder = Diagnostic::new(
                DiagnosticCode::HeapEnvironment,
                format!("record of `{}` is heap-allocated", unit.scope_name(*scope)),
            )
            .in_unit(unit.name.clone());
            match reason {
                HeapReason::Disabled => builder.with_note("stack records are disabled").build(),
                HeapReason::Captured { var, reader } => builder
                    .with_note(format!(
                        "`{}` is read from `{}`, which may outlive the activation",
                        unit.var_name(*var),
                        unit.scope_name(*reader)
                    ))
                    .with_help("declare the function dynamic-extent if it never escapes")
                    .build(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contour_ir::builder::UnitBuilder;
    use contour_ir::{FunctionDef, Node, ParamList};

    fn returned_closure() -> Unit {
        let mut b = UnitBuilder::new("demo");
        let outer = b.function_scope("outer", None);
        let inner = b.function_scope("inner", Some(outer));
        let x = b.var("x", outer);
        let inner_def = FunctionDef::new(inner, ParamList::default(), vec![Node::VarRef(x)]);
        b.finish(FunctionDef::new(outer, ParamList::required([x]), vec![Node::lambda(inner_def)]))
    }

    #[test]
    fn test_analyze_leaves_tree_untouched() {
        let mut unit = returned_closure();
        let before = contour_ir::print_unit(&unit);
        let analysis = analyze(&mut unit, &LowerOptions::default()).unwrap();
        assert_eq!(contour_ir::print_unit(&unit), before);
        assert_eq!(analysis.layout.slots_of(0), &[0]);
        assert!(!unit.var(0).is_local);
    }

    #[test]
    fn test_heap_hint_names_reader() {
        let mut unit = returned_closure();
        let analysis = lower_environments(&mut unit, &LowerOptions::default()).unwrap();
        let hints = heap_hints(&unit, &analysis);
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].code, DiagnosticCode::HeapEnvironment);
        assert!(hints[0].is_hint());
        assert_eq!(hints[0].message, "record of `outer` is heap-allocated");
        assert_eq!(
            hints[0].notes,
            vec!["`x` is read from `inner`, which may outlive the activation".to_string()]
        );
    }

    #[test]
    fn test_dangling_ids_rejected_before_analysis() {
        let mut b = UnitBuilder::new("bad");
        let top = b.function_scope("top", None);
        let mut unit = b.finish(FunctionDef::new(top, ParamList::default(), vec![Node::VarRef(0)]));
        let err = lower_environments(&mut unit, &LowerOptions::default()).unwrap_err();
        assert_eq!(err.code(), DiagnosticCode::DanglingId);
    }
}
