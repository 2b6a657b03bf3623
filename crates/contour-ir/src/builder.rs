//! Convenience builder for compilation units
//!
//! Used by tests and by tools that construct trees programmatically.
//! `finish` runs reference annotation so use-sets match the tree.

use contour_types::{ScopeId, VarId};

use crate::ir::*;
use crate::refs::annotate_references;

pub struct UnitBuilder {
    name: String,
    vars: Vec<Variable>,
    scopes: Vec<ScopeInfo>,
}

impl UnitBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: Vec::new(),
            scopes: Vec::new(),
        }
    }

    fn scope(&mut self, name: String, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        let id = self.scopes.len() as ScopeId;
        self.scopes.push(ScopeInfo { name, kind, parent });
        id
    }

    fn variable(&mut self, name: &str, kind: VarKind, scope: ScopeId) -> VarId {
        let id = self.vars.len() as VarId;
        self.vars.push(Variable::new(name, kind, scope));
        id
    }

    pub fn function_scope(&mut self, name: &str, parent: Option<ScopeId>) -> ScopeId {
        self.scope(name.to_string(), ScopeKind::Function, parent)
    }

    /// Scope of a tagbody segment; `label` is None for the implicit first segment
    pub fn segment_scope(&mut self, label: Option<&str>, parent: ScopeId) -> ScopeId {
        let name = label.unwrap_or("<entry>").to_string();
        self.scope(name, ScopeKind::Segment, Some(parent))
    }

    pub fn var(&mut self, name: &str, scope: ScopeId) -> VarId {
        self.variable(name, VarKind::Lexical, scope)
    }

    pub fn exit_tag(&mut self, name: &str, scope: ScopeId) -> VarId {
        self.variable(name, VarKind::ExitTag, scope)
    }

    pub fn label_tag(&mut self, name: &str, scope: ScopeId) -> VarId {
        self.variable(name, VarKind::LabelTag, scope)
    }

    pub fn finish(self, root: FunctionDef) -> Unit {
        let mut unit = Unit {
            name: self.name,
            vars: self.vars,
            scopes: self.scopes,
            root,
        };
        annotate_references(&mut unit);
        unit
    }
}
