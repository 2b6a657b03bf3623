//! Layout command - show free variables and record layouts

use anyhow::Result;
use clap::Args;
use contour_ir::{ScopeKind, Unit};
use contour_transform::{analyze, Analysis, HeapReason};
use std::path::PathBuf;

use super::config::OptionArgs;
use super::{fail, load_unit};
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct LayoutArgs {
    /// Compilation unit (JSON)
    pub input: PathBuf,

    #[command(flatten)]
    pub options: OptionArgs,
}

pub fn run(args: LayoutArgs, format: OutputFormat, use_color: bool) -> Result<()> {
    let options = args.options.resolve()?;
    let mut unit = load_unit(&args.input, args.options.annotate, format, use_color)?;
    let analysis = analyze(&mut unit, &options)
        .map_err(|e| fail(e.to_diagnostic(&unit.name), format, use_color))?;

    match format {
        OutputFormat::Text => print!("{}", render_text(&unit, &analysis, use_color)),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&render_json(&unit, &analysis))?)
        }
    }
    Ok(())
}

fn names(unit: &Unit, vars: impl IntoIterator<Item = u32>) -> Vec<String> {
    vars.into_iter().map(|v| unit.var_name(v).to_string()).collect()
}

fn placement(analysis: &Analysis, scope: u32) -> &'static str {
    if analysis.layout.is_stack(scope) {
        "stack"
    } else {
        "heap"
    }
}

fn reason(unit: &Unit, analysis: &Analysis, scope: u32) -> Option<String> {
    analysis
        .layout
        .heap_reasons
        .get(&scope)
        .map(|reason| match reason {
            HeapReason::Disabled => "stack records disabled".to_string(),
            HeapReason::Captured { var, reader } => format!(
                "`{}` read from `{}`",
                unit.var_name(*var),
                unit.scope_name(*reader)
            ),
        })
}

fn render_text(unit: &Unit, analysis: &Analysis, use_color: bool) -> String {
    let mut out = String::new();
    let header = format!("unit {}", unit.name);
    if use_color {
        out.push_str(&format!("{}\n", console::style(header).bold()));
    } else {
        out.push_str(&format!("{}\n", header));
    }

    for (id, scope) in unit.scopes.iter().enumerate() {
        let id = id as u32;
        let kind = match scope.kind {
            ScopeKind::Function => "function",
            ScopeKind::Segment => "segment",
        };
        out.push_str(&format!("  {} {} (#{})\n", kind, scope.name, id));
        if let Some(free) = analysis.free.get(&id) {
            let free = names(unit, free.iter().copied());
            out.push_str(&format!("    free:  [{}]\n", free.join(", ")));
        }
        if analysis.layout.has_record(id) {
            let slots = names(unit, analysis.layout.slots_of(id).iter().copied());
            let mut line = format!("    slots: [{}] {}", slots.join(", "), placement(analysis, id));
            if let Some(reason) = reason(unit, analysis, id) {
                line.push_str(&format!(" ({})", reason));
            }
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

fn render_json(unit: &Unit, analysis: &Analysis) -> serde_json::Value {
    let scopes: Vec<_> = unit
        .scopes
        .iter()
        .enumerate()
        .map(|(id, scope)| {
            let id = id as u32;
            serde_json::json!({
                "id": id,
                "name": scope.name,
                "kind": scope.kind,
                "free": analysis.free.get(&id).map(|free| names(unit, free.iter().copied())),
                "slots": names(unit, analysis.layout.slots_of(id).iter().copied()),
                "placement": analysis.layout.has_record(id).then(|| placement(analysis, id)),
                "heap_reason": reason(unit, analysis, id),
            })
        })
        .collect();
    serde_json::json!({
        "unit": unit.name,
        "scopes": scopes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contour_ir::builder::UnitBuilder;
    use contour_ir::{FunctionDef, Node, ParamList};
    use contour_transform::LowerOptions;

    fn analyzed() -> (Unit, Analysis) {
        let mut b = UnitBuilder::new("demo");
        let outer = b.function_scope("outer", None);
        let inner = b.function_scope("inner", Some(outer));
        let x = b.var("x", outer);
        let inner_def = FunctionDef::new(inner, ParamList::default(), vec![Node::VarRef(x)]);
        let mut unit = b.finish(FunctionDef::new(
            outer,
            ParamList::required([x]),
            vec![Node::lambda(inner_def)],
        ));
        let analysis = analyze(&mut unit, &LowerOptions::default()).unwrap();
        (unit, analysis)
    }

    #[test]
    fn test_render_text() {
        let (unit, analysis) = analyzed();
        assert_eq!(
            render_text(&unit, &analysis, false),
            "unit demo\n  function outer (#0)\n    free:  []\n    slots: [x] heap (`x` read from `inner`)\n  function inner (#1)\n    free:  [x]\n"
        );
    }

    #[test]
    fn test_render_json() {
        let (unit, analysis) = analyzed();
        let json = render_json(&unit, &analysis);
        assert_eq!(json["scopes"][0]["slots"], serde_json::json!(["x"]));
        assert_eq!(json["scopes"][0]["placement"], "heap");
        assert_eq!(json["scopes"][1]["free"], serde_json::json!(["x"]));
        assert!(json["scopes"][1]["placement"].is_null());
    }
}
