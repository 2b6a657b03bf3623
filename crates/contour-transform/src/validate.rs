//! Id validation
//!
//! Units usually arrive as JSON, so every id the tree and tables mention is
//! checked against the tables before analysis indexes them.

use contour_ir::{Callee, FunctionDef, Node, Unit};
use contour_types::{ScopeId, VarId};

use crate::error::{LowerError, Result};

/// Check that every variable and scope id in the unit is in range and
/// that the scope parent links form a forest
pub fn validate_unit(unit: &Unit) -> Result<()> {
    let checker = Checker {
        vars: unit.vars.len(),
        scopes: unit.scopes.len(),
    };

    for (id, scope) in unit.scopes.iter().enumerate() {
        if let Some(parent) = scope.parent {
            checker.scope(parent)?;
        }
        // A parent walk longer than the table means a cycle.
        let mut current = Some(id as ScopeId);
        let mut steps = 0;
        while let Some(scope) = current {
            steps += 1;
            if steps > unit.scopes.len() {
                return Err(LowerError::DanglingId {
                    what: "cyclic scope",
                    id: id as u32,
                });
            }
            current = unit.scopes[scope as usize].parent;
        }
    }
    for var in &unit.vars {
        checker.scope(var.scope)?;
        for r in &var.refs {
            checker.scope(*r)?;
        }
    }
    checker.function(&unit.root)
}

struct Checker {
    vars: usize,
    scopes: usize,
}

impl Checker {
    fn var(&self, id: VarId) -> Result<()> {
        if (id as usize) < self.vars {
            Ok(())
        } else {
            Err(LowerError::DanglingId { what: "variable", id })
        }
    }

    fn scope(&self, id: ScopeId) -> Result<()> {
        if (id as usize) < self.scopes {
            Ok(())
        } else {
            Err(LowerError::DanglingId { what: "scope", id })
        }
    }

    fn function(&self, def: &FunctionDef) -> Result<()> {
        self.scope(def.scope)?;
        if let Some(env) = def.props.env_param {
            self.var(env)?;
        }
        for param in def.params.iter() {
            self.var(param.var)?;
        }
        for opt in &def.params.optional {
            self.node(&opt.default)?;
        }
        for key in &def.params.keys {
            self.node(&key.default)?;
        }
        self.body(&def.body)
    }

    fn body(&self, body: &[Node]) -> Result<()> {
        body.iter().try_for_each(|node| self.node(node))
    }

    fn via(&self, via: &Option<Box<Node>>) -> Result<()> {
        match via {
            Some(via) => self.node(via),
            None => Ok(()),
        }
    }

    fn node(&self, node: &Node) -> Result<()> {
        match node {
            Node::Literal(_) => Ok(()),
            Node::VarRef(var) | Node::ExitMarker(var) => self.var(*var),
            Node::SetVar { var, value } => {
                self.var(*var)?;
                self.node(value)
            }
            Node::If {
                test,
                then,
                otherwise,
            } => {
                self.node(test)?;
                self.node(then)?;
                self.node(otherwise)
            }
            Node::Call { callee, args } => {
                if let Callee::Expr(expr) = callee {
                    self.node(expr)?;
                }
                self.body(args)
            }
            Node::Progn(body) => self.body(body),
            Node::Let { bindings, body } => {
                for binding in bindings {
                    self.var(binding.var)?;
                    self.node(&binding.init)?;
                }
                self.body(body)
            }
            Node::Function(def) => self.function(def),
            Node::Tagbody { tag, segments } => {
                self.var(*tag)?;
                for segment in segments {
                    self.scope(segment.scope)?;
                    self.body(&segment.body)?;
                }
                Ok(())
            }
            Node::Go { tag, via, .. } => {
                self.var(*tag)?;
                self.via(via)
            }
            Node::Block { tag, body } => {
                self.var(*tag)?;
                self.body(body)
            }
            Node::ReturnFrom { tag, value, via } => {
                self.var(*tag)?;
                self.node(value)?;
                self.via(via)
            }
            Node::MultipleValueBind { vars, value, body } => {
                for var in vars {
                    self.var(*var)?;
                }
                self.node(value)?;
                self.body(body)
            }
            Node::MultipleValueProg1 { first, rest } => {
                self.node(first)?;
                self.body(rest)
            }
            Node::The { value, .. } => self.node(value),
            Node::UnwindProtect { protected, cleanup } => {
                self.node(protected)?;
                self.node(cleanup)
            }
            Node::Case {
                key,
                clauses,
                default,
            } => {
                self.node(key)?;
                for clause in clauses {
                    self.body(&clause.body)?;
                }
                self.body(default)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contour_ir::builder::UnitBuilder;
    use contour_ir::{ParamList, ScopeInfo, ScopeKind};

    #[test]
    fn test_accepts_built_unit() {
        let mut b = UnitBuilder::new("ok");
        let top = b.function_scope("top", None);
        let x = b.var("x", top);
        let unit = b.finish(FunctionDef::new(top, ParamList::required([x]), vec![Node::VarRef(x)]));
        assert!(validate_unit(&unit).is_ok());
    }

    #[test]
    fn test_rejects_dangling_variable() {
        let mut b = UnitBuilder::new("bad");
        let top = b.function_scope("top", None);
        let unit = b.finish(FunctionDef::new(top, ParamList::default(), vec![Node::VarRef(3)]));
        assert_eq!(
            validate_unit(&unit),
            Err(LowerError::DanglingId {
                what: "variable",
                id: 3
            })
        );
    }

    #[test]
    fn test_rejects_scope_cycle() {
        let mut b = UnitBuilder::new("cycle");
        let top = b.function_scope("top", None);
        let mut unit = b.finish(FunctionDef::new(top, ParamList::default(), Vec::new()));
        unit.scopes.push(ScopeInfo {
            name: "a".to_string(),
            kind: ScopeKind::Segment,
            parent: Some(2),
        });
        unit.scopes.push(ScopeInfo {
            name: "b".to_string(),
            kind: ScopeKind::Segment,
            parent: Some(1),
        });
        assert!(matches!(
            validate_unit(&unit),
            Err(LowerError::DanglingId { what: "cyclic scope", .. })
        ));
    }
}
