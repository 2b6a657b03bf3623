//! Reference annotation
//!
//! Recomputes every variable's use-set from the tree: each `VarRef`,
//! `SetVar`, `Go` and `ReturnFrom` records the scope it appears in.
//! Binding sites are not references.

use contour_types::{ScopeId, VarId};

use crate::ir::*;

/// Clear and recompute the `refs` of every variable in the unit
pub fn annotate_references(unit: &mut Unit) {
    for var in &mut unit.vars {
        var.refs.clear();
    }

    let mut found: Vec<(VarId, ScopeId)> = Vec::new();
    collect_function(&unit.root, &mut found);

    for (var, scope) in found {
        if let Some(entry) = unit.vars.get_mut(var as usize) {
            entry.refs.insert(scope);
        }
    }
}

fn collect_function(def: &FunctionDef, found: &mut Vec<(VarId, ScopeId)>) {
    for opt in &def.params.optional {
        collect_node(&opt.default, def.scope, found);
    }
    for key in &def.params.keys {
        collect_node(&key.default, def.scope, found);
    }
    collect_body(&def.body, def.scope, found);
}

fn collect_body(body: &[Node], scope: ScopeId, found: &mut Vec<(VarId, ScopeId)>) {
    for node in body {
        collect_node(node, scope, found);
    }
}

fn collect_node(node: &Node, scope: ScopeId, found: &mut Vec<(VarId, ScopeId)>) {
    match node {
        Node::Literal(_) => {}
        Node::VarRef(var) | Node::ExitMarker(var) => found.push((*var, scope)),
        Node::SetVar { var, value } => {
            found.push((*var, scope));
            collect_node(value, scope, found);
        }
        Node::If {
            test,
            then,
            otherwise,
        } => {
            collect_node(test, scope, found);
            collect_node(then, scope, found);
            collect_node(otherwise, scope, found);
        }
        Node::Call { callee, args } => {
            if let Callee::Expr(expr) = callee {
                collect_node(expr, scope, found);
            }
            collect_body(args, scope, found);
        }
        Node::Progn(body) => collect_body(body, scope, found),
        Node::Let { bindings, body } => {
            for binding in bindings {
                collect_node(&binding.init, scope, found);
            }
            collect_body(body, scope, found);
        }
        Node::Function(def) => collect_function(def, found),
        Node::Tagbody { segments, .. } => {
            for segment in segments {
                collect_body(&segment.body, segment.scope, found);
            }
        }
        Node::Go { tag, via, .. } => {
            found.push((*tag, scope));
            if let Some(via) = via {
                collect_node(via, scope, found);
            }
        }
        Node::Block { body, .. } => collect_body(body, scope, found),
        Node::ReturnFrom { tag, value, via } => {
            found.push((*tag, scope));
            collect_node(value, scope, found);
            if let Some(via) = via {
                collect_node(via, scope, found);
            }
        }
        Node::MultipleValueBind { value, body, .. } => {
            collect_node(value, scope, found);
            collect_body(body, scope, found);
        }
        Node::MultipleValueProg1 { first, rest } => {
            collect_node(first, scope, found);
            collect_body(rest, scope, found);
        }
        Node::The { value, .. } => collect_node(value, scope, found),
        Node::UnwindProtect { protected, cleanup } => {
            collect_node(protected, scope, found);
            collect_node(cleanup, scope, found);
        }
        Node::Case {
            key,
            clauses,
            default,
        } => {
            collect_node(key, scope, found);
            for clause in clauses {
                collect_body(&clause.body, scope, found);
            }
            collect_body(default, scope, found);
        }
    }
}
