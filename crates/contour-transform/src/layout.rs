//! Escape analysis and record layout
//!
//! One traversal over the tree decides, per variable, whether it escapes
//! its defining scope; escaping variables get a slot in that scope's
//! record in first-discovered order. When a scope's slot list is complete
//! (at the end of its function body, or of the tagbody for segments) the
//! scope's record is judged stack-allocatable or not, exactly once.
//!
//! The stack judgment is local and conservative: every function between a
//! reader of a slotted variable and the variable's own defining function
//! must itself have bounded lifetime. Functions are known bounded when
//! they carry a dynamic-extent declaration, are invoked in place, or are
//! the cleanup thunk of an unwind-protect; all of these are recorded on
//! the function before the enclosing scope is finalized.

use contour_ir::{
    enclosing_function, lexical_ancestors, Callee, FunctionDef, Node, ScopeInfo, ScopeKind, Unit,
    VarKind, Variable,
};
use contour_types::{ScopeId, VarId};
use log::{debug, trace};
use std::collections::{HashMap, HashSet};

use crate::error::{LowerError, Result};
use crate::options::LowerOptions;

/// Why a record could not be stack-allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapReason {
    /// Stack records are disabled by options
    Disabled,
    /// `var` is read from inside `reader`, a function without bounded lifetime
    Captured { var: VarId, reader: ScopeId },
}

/// Result of layout analysis
#[derive(Debug, Clone, Default)]
pub struct Layout {
    /// Ordered slotted variables per scope; present iff non-empty
    pub slots: HashMap<ScopeId, Vec<VarId>>,
    /// Stack-allocatability per scope that has slots
    pub stack: HashMap<ScopeId, bool>,
    /// Why each heap-allocated record is on the heap
    pub heap_reasons: HashMap<ScopeId, HeapReason>,
}

impl Layout {
    pub fn slots_of(&self, scope: ScopeId) -> &[VarId] {
        self.slots.get(&scope).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check if a scope materializes a record at run time
    pub fn has_record(&self, scope: ScopeId) -> bool {
        self.slots.contains_key(&scope)
    }

    pub fn is_stack(&self, scope: ScopeId) -> bool {
        self.stack.get(&scope).copied().unwrap_or(false)
    }
}

/// Run escape analysis and slot assignment over the unit
///
/// Escape flags and slot offsets are written into the unit's variables and
/// computed bounded-lifetime flags into function properties. Earlier
/// results are cleared first, so the analysis can be re-run.
pub fn compute_layout(unit: &mut Unit, options: &LowerOptions) -> Result<Layout> {
    let Unit {
        vars, scopes, root, ..
    } = unit;

    for var in vars.iter_mut() {
        if var.kind != VarKind::Environment {
            var.is_local = true;
            var.slot = None;
        }
    }

    let mut analyzer = LayoutAnalyzer {
        vars: vars.as_mut_slice(),
        scopes: scopes.as_slice(),
        options,
        layout: Layout::default(),
        bounded: HashSet::new(),
    };
    analyzer.visit_function(root, false)?;
    Ok(analyzer.layout)
}

/// Reject parameter forms that earlier simplification should have removed
pub fn check_parameters(def: &FunctionDef, scopes: &[ScopeInfo], vars: &[Variable]) -> Result<()> {
    let function = || {
        def.name
            .clone()
            .unwrap_or_else(|| scopes[def.scope as usize].name.clone())
    };
    let var_name = |var: VarId| vars[var as usize].name.clone();

    if let Some(param) = def.params.iter().find(|p| p.special) {
        return Err(LowerError::UnsupportedParameters {
            function: function(),
            reason: format!("special binding of `{}`", var_name(param.var)),
        });
    }
    if let Some(key) = def.params.keys.first() {
        return Err(LowerError::UnsupportedParameters {
            function: function(),
            reason: format!("keyword parameter `{}`", key.keyword),
        });
    }
    for opt in &def.params.optional {
        if !matches!(opt.default, Node::Literal(_)) {
            return Err(LowerError::UnsupportedParameters {
                function: function(),
                reason: format!("non-constant default for `{}`", var_name(opt.param.var)),
            });
        }
    }
    Ok(())
}

struct LayoutAnalyzer<'a> {
    vars: &'a mut [Variable],
    scopes: &'a [ScopeInfo],
    options: &'a LowerOptions,
    layout: Layout,
    /// Functions known to have bounded lifetime
    bounded: HashSet<ScopeId>,
}

impl<'a> LayoutAnalyzer<'a> {
    fn visit_function(&mut self, def: &mut FunctionDef, force_bounded: bool) -> Result<()> {
        check_parameters(def, self.scopes, self.vars)?;

        if force_bounded || def.decls.dynamic_extent {
            def.props.bounded = true;
        }
        if def.props.bounded {
            self.bounded.insert(def.scope);
        }

        let params: Vec<VarId> = def.params.iter().map(|p| p.var).collect();
        for var in params {
            self.bind(var);
        }
        self.visit_body(&mut def.body)?;
        self.finalize(def.scope);
        Ok(())
    }

    fn visit_body(&mut self, body: &mut [Node]) -> Result<()> {
        for node in body {
            self.visit_node(node)?;
        }
        Ok(())
    }

    fn visit_node(&mut self, node: &mut Node) -> Result<()> {
        match node {
            Node::Literal(_) | Node::VarRef(_) | Node::ExitMarker(_) => Ok(()),
            Node::SetVar { value, .. } => self.visit_node(value),
            Node::If {
                test,
                then,
                otherwise,
            } => {
                self.visit_node(test)?;
                self.visit_node(then)?;
                self.visit_node(otherwise)
            }
            Node::Call { callee, args } => {
                if let Callee::Expr(expr) = callee {
                    match expr.as_mut() {
                        // Invoked in place: the closure cannot outlive the call.
                        Node::Function(def) => self.visit_function(def, true)?,
                        other => self.visit_node(other)?,
                    }
                }
                self.visit_body(args)
            }
            Node::Progn(body) => self.visit_body(body),
            Node::Let { bindings, body } => {
                for binding in bindings.iter_mut() {
                    self.visit_node(&mut binding.init)?;
                }
                for binding in bindings.iter() {
                    self.bind(binding.var);
                }
                self.visit_body(body)
            }
            Node::Function(def) => self.visit_function(def, false),
            Node::Tagbody { tag, segments } => {
                self.bind(*tag);
                for segment in segments.iter_mut() {
                    // Variables defined directly in a segment are bound at its label.
                    let locals: Vec<VarId> = self
                        .vars
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| v.scope == segment.scope && v.kind == VarKind::Lexical)
                        .map(|(id, _)| id as VarId)
                        .collect();
                    for var in locals {
                        self.bind(var);
                    }
                    self.visit_body(&mut segment.body)?;
                }
                // A later segment may be nested in an earlier one, so readers in
                // every segment must be known before any segment is judged.
                for segment in segments.iter().rev() {
                    self.finalize(segment.scope);
                }
                Ok(())
            }
            Node::Go { via, .. } => match via {
                Some(via) => self.visit_node(via),
                None => Ok(()),
            },
            Node::Block { tag, body } => {
                self.bind(*tag);
                self.visit_body(body)
            }
            Node::ReturnFrom { value, .. } => self.visit_node(value),
            Node::MultipleValueBind { vars, value, body } => {
                self.visit_node(value)?;
                for var in vars.iter() {
                    self.bind(*var);
                }
                self.visit_body(body)
            }
            Node::MultipleValueProg1 { first, rest } => {
                self.visit_node(first)?;
                self.visit_body(rest)
            }
            Node::The { value, .. } => self.visit_node(value),
            Node::UnwindProtect { protected, cleanup } => {
                self.visit_node(protected)?;
                match cleanup.as_mut() {
                    // The cleanup runs before the creating activation exits.
                    Node::Function(def) => self.visit_function(def, true),
                    other => self.visit_node(other),
                }
            }
            Node::Case {
                key,
                clauses,
                default,
            } => {
                self.visit_node(key)?;
                for clause in clauses {
                    self.visit_body(&mut clause.body)?;
                }
                self.visit_body(default)
            }
        }
    }

    fn escapes(&self, var: &Variable) -> bool {
        if var.kind == VarKind::Environment {
            return false;
        }
        if var.is_pseudo() {
            let home = enclosing_function(self.scopes, var.scope);
            return var
                .refs
                .iter()
                .any(|r| enclosing_function(self.scopes, *r) != home);
        }
        var.refs.iter().any(|r| *r != var.scope)
    }

    /// Assign a slot to `var` if it escapes
    fn bind(&mut self, id: VarId) {
        let escapes = self.escapes(&self.vars[id as usize]);
        let var = &mut self.vars[id as usize];
        if !escapes || var.slot.is_some() {
            return;
        }
        let slots = self.layout.slots.entry(var.scope).or_default();
        var.is_local = false;
        var.slot = Some(slots.len() as u32);
        slots.push(id);
        debug!(
            "`{}` escapes: slot {} of `{}`",
            var.name,
            slots.len() - 1,
            self.scopes[var.scope as usize].name
        );
    }

    /// The first function between `reader` and `home` (exclusive) that is not bounded
    fn unbounded_reader(&self, reader: ScopeId, home: ScopeId) -> Option<ScopeId> {
        for scope in lexical_ancestors(self.scopes, reader) {
            if scope == home {
                return None;
            }
            let function = self.scopes[scope as usize].kind == ScopeKind::Function;
            if function && !self.bounded.contains(&scope) {
                return Some(scope);
            }
        }
        // Not lexically inside the defining function at all.
        Some(reader)
    }

    fn finalize(&mut self, scope: ScopeId) {
        let Some(slotted) = self.layout.slots.get(&scope) else {
            return;
        };

        let reason = if !self.options.stack_environments {
            Some(HeapReason::Disabled)
        } else {
            slotted.iter().find_map(|&id| {
                let var = &self.vars[id as usize];
                let home = enclosing_function(self.scopes, var.scope);
                var.refs.iter().find_map(|&r| {
                    trace!("checking reader `{}` of `{}`", self.scopes[r as usize].name, var.name);
                    self.unbounded_reader(r, home)
                        .map(|reader| HeapReason::Captured { var: id, reader })
                })
            })
        };

        debug!(
            "record of `{}` ({} slots): {}",
            self.scopes[scope as usize].name,
            slotted.len(),
            if reason.is_none() { "stack" } else { "heap" }
        );
        self.layout.stack.insert(scope, reason.is_none());
        if let Some(reason) = reason {
            self.layout.heap_reasons.insert(scope, reason);
        }
    }
}
