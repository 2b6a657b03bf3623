//! Explain command - explain diagnostic codes

use anyhow::{anyhow, Result};
use clap::Args;

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ExplainArgs {
    /// Diagnostic code to explain (e.g., I001, H001)
    pub code: String,
}

struct ErrorExplanation {
    code: &'static str,
    title: &'static str,
    description: &'static str,
    example: Option<&'static str>,
    suggestion: Option<&'static str>,
    related: &'static [&'static str],
}

const ERROR_EXPLANATIONS: &[ErrorExplanation] = &[
    // Input errors
    ErrorExplanation {
        code: "E001",
        title: "Invalid Input",
        description: "The unit file could not be read or is not a valid JSON-encoded unit.",
        example: None,
        suggestion: Some("Check the path and that the file was produced by a compatible front end."),
        related: &["E002"],
    },
    ErrorExplanation {
        code: "E002",
        title: "Dangling Id",
        description: r#"A variable or scope id in the tree, or a scope's parent link, points outside
the unit's tables. Scope parent links that form a cycle are reported the same way."#,
        example: Some(r#"{ "VarRef": 12 }  // but the unit has only 4 variables"#),
        suggestion: Some("Regenerate the unit; ids are indices into `vars` and `scopes`."),
        related: &["E001"],
    },
    // Internal consistency errors
    ErrorExplanation {
        code: "I001",
        title: "Unbound Escaping Variable",
        description: r#"A variable was marked as escaping, but no enclosing scope assigned it a slot.

Escape flags are computed from the variable's reference set. This usually means the
reference sets disagree with the tree, or the variable's defining scope is not an
ancestor of the place it is used."#,
        example: None,
        suggestion: Some("Run with --annotate to recompute reference sets from the tree."),
        related: &["I003"],
    },
    ErrorExplanation {
        code: "I002",
        title: "Unsupported Parameters",
        description: r#"A function still carries special (dynamically scoped) parameters, keyword
parameters, or optional parameters with non-constant defaults.

These forms must be simplified into plain bindings before environment lowering."#,
        example: Some("(lambda (x &optional (y (f x))) ...)  // non-constant default"),
        suggestion: Some("Run parameter simplification before lowering."),
        related: &[],
    },
    ErrorExplanation {
        code: "I003",
        title: "Scope Not In Chain",
        description: "An environment lookup targeted a scope that is not on the current scope stack.",
        example: None,
        suggestion: Some("Check that scope parent links match the nesting of the tree."),
        related: &["I001", "I004"],
    },
    ErrorExplanation {
        code: "I004",
        title: "Missing Parent Link",
        description: r#"Reaching an outer record required following slot 0 of a record that was
created without a parent link."#,
        example: None,
        suggestion: Some("This indicates a bug in record layout; please report it with the unit."),
        related: &["I003"],
    },
    // Layout hints
    ErrorExplanation {
        code: "H001",
        title: "Heap Environment",
        description: r#"A record is heap-allocated because one of its variables is read from a
function that may outlive the activation that created the record."#,
        example: Some("(lambda (x) (lambda () x))  // the inner function is returned"),
        suggestion: Some(r#"If the function never escapes, declare it dynamic-extent or invoke it in
place so its record can live on the stack."#),
        related: &[],
    },
];

pub fn run(args: ExplainArgs, format: OutputFormat, use_color: bool) -> Result<()> {
    let code = args.code.to_uppercase();

    let explanation = ERROR_EXPLANATIONS
        .iter()
        .find(|e| e.code == code)
        .ok_or_else(|| anyhow!("Unknown error code: {}", code))?;

    match format {
        OutputFormat::Text => {
            if use_color {
                println!(
                    "\n{}: {}\n{}",
                    console::style(&code).bold().cyan(),
                    console::style(explanation.title).bold(),
                    "=".repeat(code.len() + explanation.title.len() + 2)
                );
            } else {
                println!(
                    "\n{}: {}\n{}",
                    code,
                    explanation.title,
                    "=".repeat(code.len() + explanation.title.len() + 2)
                );
            }

            println!("\n{}\n", explanation.description);

            if let Some(example) = explanation.example {
                if use_color {
                    println!("{}:", console::style("Example").bold());
                } else {
                    println!("Example:");
                }
                for line in example.lines() {
                    println!("  {}", line);
                }
                println!();
            }

            if let Some(suggestion) = explanation.suggestion {
                if use_color {
                    println!("{}:", console::style("Suggestion").bold().green());
                } else {
                    println!("Suggestion:");
                }
                for line in suggestion.lines() {
                    println!("  {}", line);
                }
                println!();
            }

            if !explanation.related.is_empty() {
                if use_color {
                    println!(
                        "{}: {}",
                        console::style("Related").dim(),
                        explanation.related.join(", ")
                    );
                } else {
                    println!("Related: {}", explanation.related.join(", "));
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "code": explanation.code,
                "title": explanation.title,
                "description": explanation.description,
                "example": explanation.example,
                "suggestion": explanation.suggestion,
                "related": explanation.related,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contour_diagnostics::ALL_CODES;

    #[test]
    fn test_every_code_is_explained() {
        for code in ALL_CODES {
            assert!(
                ERROR_EXPLANATIONS.iter().any(|e| e.code == code.as_str()),
                "{} has no explanation",
                code
            );
        }
    }

    #[test]
    fn test_unknown_code() {
        let args = ExplainArgs {
            code: "Z999".to_string(),
        };
        assert!(run(args, OutputFormat::Text, false).is_err());
    }
}
