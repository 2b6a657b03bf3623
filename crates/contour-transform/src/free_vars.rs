//! Free-variable calculation
//!
//! A single bottom-up traversal: a construct's free set is the union of
//! its children's free sets minus the variables it binds itself. Exit and
//! label identities are tracked like any other variable, so a `go` or
//! `return-from` inside a nested function makes the tag free there.

use contour_ir::{Callee, FunctionDef, Node};
use contour_types::{ScopeId, VarId};
use std::collections::{BTreeSet, HashMap};

/// Free variables per function definition
pub type FreeVariables = HashMap<ScopeId, BTreeSet<VarId>>;

/// Compute the free variables of every function definition in the tree
pub fn compute_free_variables(root: &FunctionDef) -> FreeVariables {
    let mut map = FreeVariables::new();
    free_in_function(root, &mut map);
    map
}

fn free_in_function(def: &FunctionDef, map: &mut FreeVariables) -> BTreeSet<VarId> {
    let mut free = BTreeSet::new();
    for opt in &def.params.optional {
        free.extend(free_in_node(&opt.default, map));
    }
    for key in &def.params.keys {
        free.extend(free_in_node(&key.default, map));
    }
    free.extend(free_in_body(&def.body, map));
    for param in def.params.iter() {
        free.remove(&param.var);
    }
    if let Some(env) = def.props.env_param {
        free.remove(&env);
    }
    map.insert(def.scope, free.clone());
    free
}

fn free_in_body(body: &[Node], map: &mut FreeVariables) -> BTreeSet<VarId> {
    let mut free = BTreeSet::new();
    for node in body {
        free.extend(free_in_node(node, map));
    }
    free
}

fn free_in_node(node: &Node, map: &mut FreeVariables) -> BTreeSet<VarId> {
    match node {
        Node::Literal(_) => BTreeSet::new(),
        Node::VarRef(var) | Node::ExitMarker(var) => BTreeSet::from([*var]),
        Node::SetVar { var, value } => {
            let mut free = free_in_node(value, map);
            free.insert(*var);
            free
        }
        Node::If {
            test,
            then,
            otherwise,
        } => {
            let mut free = free_in_node(test, map);
            free.extend(free_in_node(then, map));
            free.extend(free_in_node(otherwise, map));
            free
        }
        Node::Call { callee, args } => {
            let mut free = match callee {
                Callee::Expr(expr) => free_in_node(expr, map),
                Callee::Named(_) | Callee::Primitive(_) => BTreeSet::new(),
            };
            free.extend(free_in_body(args, map));
            free
        }
        Node::Progn(body) => free_in_body(body, map),
        Node::Let { bindings, body } => {
            // Init forms see the outer bindings, so they are added after the removal.
            let mut free = free_in_body(body, map);
            for binding in bindings {
                free.remove(&binding.var);
            }
            for binding in bindings {
                free.extend(free_in_node(&binding.init, map));
            }
            free
        }
        Node::Function(def) => free_in_function(def, map),
        Node::Tagbody { tag, segments } => {
            let mut free = BTreeSet::new();
            for segment in segments {
                free.extend(free_in_body(&segment.body, map));
            }
            free.remove(tag);
            free
        }
        Node::Go { tag, via, .. } => {
            let mut free = BTreeSet::from([*tag]);
            if let Some(via) = via {
                free.extend(free_in_node(via, map));
            }
            free
        }
        Node::Block { tag, body } => {
            let mut free = free_in_body(body, map);
            free.remove(tag);
            free
        }
        Node::ReturnFrom { tag, value, via } => {
            let mut free = free_in_node(value, map);
            free.insert(*tag);
            if let Some(via) = via {
                free.extend(free_in_node(via, map));
            }
            free
        }
        Node::MultipleValueBind { vars, value, body } => {
            let mut free = free_in_body(body, map);
            for var in vars {
                free.remove(var);
            }
            free.extend(free_in_node(value, map));
            free
        }
        Node::MultipleValueProg1 { first, rest } => {
            let mut free = free_in_node(first, map);
            free.extend(free_in_body(rest, map));
            free
        }
        Node::The { value, .. } => free_in_node(value, map),
        Node::UnwindProtect { protected, cleanup } => {
            let mut free = free_in_node(protected, map);
            free.extend(free_in_node(cleanup, map));
            free
        }
        Node::Case {
            key,
            clauses,
            default,
        } => {
            let mut free = free_in_node(key, map);
            for clause in clauses {
                free.extend(free_in_body(&clause.body, map));
            }
            free.extend(free_in_body(default, map));
            free
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contour_ir::builder::UnitBuilder;
    use contour_ir::{Binding, ParamList, Segment};

    #[test]
    fn test_inner_function_sees_outer_parameter() {
        let mut b = UnitBuilder::new("free");
        let outer = b.function_scope("outer", None);
        let inner = b.function_scope("inner", Some(outer));
        let x = b.var("x", outer);
        let y = b.var("y", inner);

        let inner_def = FunctionDef::new(
            inner,
            ParamList::required([y]),
            vec![Node::call("add", vec![Node::VarRef(x), Node::VarRef(y)])],
        );
        let root = FunctionDef::new(outer, ParamList::required([x]), vec![Node::lambda(inner_def)]);
        let unit = b.finish(root);

        let free = compute_free_variables(&unit.root);
        assert_eq!(free[&inner], BTreeSet::from([x]));
        assert!(free[&outer].is_empty());
    }

    #[test]
    fn test_let_init_is_outside_the_binding() {
        let mut b = UnitBuilder::new("free");
        let top = b.function_scope("top", None);
        let inner = b.function_scope("inner", Some(top));
        let a = b.var("a", top);
        let c = b.var("c", inner);

        // (lambda () (let ((c a)) c)) : `a` stays free, `c` is bound
        let inner_def = FunctionDef::new(
            inner,
            ParamList::default(),
            vec![Node::Let {
                bindings: vec![Binding {
                    var: c,
                    init: Node::VarRef(a),
                }],
                body: vec![Node::VarRef(c)],
            }],
        );
        let root = FunctionDef::new(top, ParamList::required([a]), vec![Node::lambda(inner_def)]);
        let unit = b.finish(root);

        let free = compute_free_variables(&unit.root);
        assert_eq!(free[&inner], BTreeSet::from([a]));
    }

    #[test]
    fn test_exit_tag_is_free_in_nested_function() {
        let mut b = UnitBuilder::new("free");
        let top = b.function_scope("top", None);
        let thunk = b.function_scope("thunk", Some(top));
        let done = b.exit_tag("done", top);

        let thunk_def = FunctionDef::new(
            thunk,
            ParamList::default(),
            vec![Node::ReturnFrom {
                tag: done,
                value: Box::new(Node::int(1)),
                via: None,
            }],
        );
        let root = FunctionDef::new(
            top,
            ParamList::default(),
            vec![Node::Block {
                tag: done,
                body: vec![Node::call("funcall", vec![Node::lambda(thunk_def)])],
            }],
        );
        let unit = b.finish(root);

        let free = compute_free_variables(&unit.root);
        assert_eq!(free[&thunk], BTreeSet::from([done]));
        assert!(free[&top].is_empty());
    }

    #[test]
    fn test_label_tag_bound_by_tagbody() {
        let mut b = UnitBuilder::new("free");
        let top = b.function_scope("top", None);
        let tag = b.label_tag("tb", top);
        let s0 = b.segment_scope(None, top);
        let s1 = b.segment_scope(Some("end"), top);

        let root = FunctionDef::new(
            top,
            ParamList::default(),
            vec![Node::Tagbody {
                tag,
                segments: vec![
                    Segment {
                        label: None,
                        scope: s0,
                        body: vec![Node::Go {
                            tag,
                            label: "end".to_string(),
                            via: None,
                        }],
                    },
                    Segment {
                        label: Some("end".to_string()),
                        scope: s1,
                        body: Vec::new(),
                    },
                ],
            }],
        );
        let unit = b.finish(root);
        let free = compute_free_variables(&unit.root);
        assert!(free[&top].is_empty());
    }
}
