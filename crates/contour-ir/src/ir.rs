//! Tree definitions for the environment-lowering pass
//!
//! A compilation unit is an already-bound tree: every variable entity
//! knows the scope that defines it and the scopes it is referenced from.
//! The same node type describes both the input tree and the lowered tree;
//! the lowered tree additionally uses `ExitMarker`, the `via` fields of
//! `Go`/`ReturnFrom`, and calls to the environment primitives.

use contour_types::{Literal, ScopeId, VarId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a variable entity stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    /// An ordinary lexical binding (parameter, let, multiple-value-bind)
    Lexical,
    /// The identity of a named exit scope (block)
    ExitTag,
    /// The jump-target identity of a label region (tagbody)
    LabelTag,
    /// A record-holding temporary or entry-environment parameter introduced by lowering
    Environment,
}

/// One lexical binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// Diagnostic name
    pub name: String,
    pub kind: VarKind,
    /// The function definition or segment that introduces this binding
    pub scope: ScopeId,
    /// Scopes from which the variable is referenced (filled in upstream)
    #[serde(default)]
    pub refs: BTreeSet<ScopeId>,
    /// False once the variable is known to escape its defining scope
    #[serde(default = "default_true")]
    pub is_local: bool,
    /// Index within the defining scope's slot list, valid only if escaping
    #[serde(default)]
    pub slot: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Variable {
    pub fn new(name: impl Into<String>, kind: VarKind, scope: ScopeId) -> Self {
        Self {
            name: name.into(),
            kind,
            scope,
            refs: BTreeSet::new(),
            is_local: true,
            slot: None,
        }
    }

    /// Exit and label identities are pseudo-variables: they escape only
    /// when a nested function definition jumps to them.
    pub fn is_pseudo(&self) -> bool {
        matches!(self.kind, VarKind::ExitTag | VarKind::LabelTag)
    }
}

/// Kind of environment-defining contour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    /// A function definition
    Function,
    /// A label-to-label segment of a tagbody
    Segment,
}

/// Entry of the unit's scope table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeInfo {
    pub name: String,
    pub kind: ScopeKind,
    /// Lexically enclosing scope (None for the unit's root function)
    pub parent: Option<ScopeId>,
}

/// The function definition owning `scope` in a scope table
///
/// Segments resolve to the function that contains them; a scope without a
/// parent resolves to itself.
pub fn enclosing_function(scopes: &[ScopeInfo], scope: ScopeId) -> ScopeId {
    let mut current = scope;
    loop {
        let info = &scopes[current as usize];
        match (info.kind, info.parent) {
            (ScopeKind::Function, _) | (_, None) => return current,
            (ScopeKind::Segment, Some(parent)) => current = parent,
        }
    }
}

/// Iterate from `scope` outward through its lexical ancestors (inclusive)
pub fn lexical_ancestors(
    scopes: &[ScopeInfo],
    scope: ScopeId,
) -> impl Iterator<Item = ScopeId> + '_ {
    std::iter::successors(Some(scope), move |s| scopes[*s as usize].parent)
}

/// A complete compilation unit
///
/// The unit owns the variable and scope tables; nodes refer into them by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub vars: Vec<Variable>,
    pub scopes: Vec<ScopeInfo>,
    /// The top-level function definition
    pub root: FunctionDef,
}

impl Unit {
    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id as usize]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id as usize]
    }

    /// Name of a variable for diagnostics, tolerating out-of-range ids
    pub fn var_name(&self, id: VarId) -> &str {
        self.vars
            .get(id as usize)
            .map(|v| v.name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn scope_name(&self, id: ScopeId) -> &str {
        self.scopes
            .get(id as usize)
            .map(|s| s.name.as_str())
            .unwrap_or("<unknown>")
    }
}

/// A call target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Callee {
    /// A global function, by name
    Named(String),
    /// A runtime primitive introduced by lowering
    Primitive(Primitive),
    /// A computed function value (a nested function definition when invoked in place)
    Expr(Box<Node>),
}

/// Runtime primitives the lowered tree calls into
///
/// These are opaque to the pass; only their arity and meaning matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Primitive {
    /// `(size)`: allocate a record with bounded lifetime
    MakeStackEnv,
    /// `(size [area])`: allocate a general record, optionally in a named area
    MakeEnv,
    /// `(function env)`: closure with bounded lifetime
    MakeStackClosure,
    /// `(function env [area])`: general closure, optionally in a named area
    MakeClosure,
    /// `(env index)`: indexed load
    EnvRef,
    /// `(env index value)`: indexed store
    EnvSet,
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::MakeStackEnv => "%make-stack-env",
            Primitive::MakeEnv => "%make-env",
            Primitive::MakeStackClosure => "%make-stack-closure",
            Primitive::MakeClosure => "%make-closure",
            Primitive::EnvRef => "%env-ref",
            Primitive::EnvSet => "%env-set",
        }
    }

    /// Inclusive (min, max) argument count
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Primitive::MakeStackEnv => (1, 1),
            Primitive::MakeEnv => (1, 2),
            Primitive::MakeStackClosure => (2, 2),
            Primitive::MakeClosure => (2, 3),
            Primitive::EnvRef => (2, 2),
            Primitive::EnvSet => (3, 3),
        }
    }

    pub fn accepts(&self, argc: usize) -> bool {
        let (min, max) = self.arity();
        (min..=max).contains(&argc)
    }
}

/// A `let` binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub var: VarId,
    pub init: Node,
}

/// One label-to-label segment of a tagbody
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// None for the implicit segment before the first label
    pub label: Option<String>,
    pub scope: ScopeId,
    pub body: Vec<Node>,
}

/// A clause of a dispatch table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseClause {
    pub keys: Vec<Literal>,
    pub body: Vec<Node>,
}

/// Tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Literal(Literal),
    VarRef(VarId),
    SetVar {
        var: VarId,
        value: Box<Node>,
    },
    If {
        test: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },
    Call {
        callee: Callee,
        args: Vec<Node>,
    },
    Progn(Vec<Node>),
    /// Parallel local binding
    Let {
        bindings: Vec<Binding>,
        body: Vec<Node>,
    },
    Function(Box<FunctionDef>),
    /// Label region; `tag` is its jump-target identity
    Tagbody {
        tag: VarId,
        segments: Vec<Segment>,
    },
    Go {
        tag: VarId,
        label: String,
        /// Environment load of the target identity, set when the jump crosses a function boundary
        #[serde(default)]
        via: Option<Box<Node>>,
    },
    /// Named exit scope; `tag` is its identity
    Block {
        tag: VarId,
        body: Vec<Node>,
    },
    ReturnFrom {
        tag: VarId,
        value: Box<Node>,
        #[serde(default)]
        via: Option<Box<Node>>,
    },
    MultipleValueBind {
        vars: Vec<VarId>,
        value: Box<Node>,
        body: Vec<Node>,
    },
    MultipleValueProg1 {
        first: Box<Node>,
        rest: Vec<Node>,
    },
    The {
        ty: String,
        value: Box<Node>,
    },
    UnwindProtect {
        protected: Box<Node>,
        cleanup: Box<Node>,
    },
    /// Dispatch table
    Case {
        key: Box<Node>,
        clauses: Vec<CaseClause>,
        default: Vec<Node>,
    },
    /// Run-time identity of the exit scope or label region named by `tag`
    ExitMarker(VarId),
}

impl Node {
    pub fn int(n: i64) -> Node {
        Node::Literal(Literal::Int(n))
    }

    pub fn nil() -> Node {
        Node::Literal(Literal::Nil)
    }

    pub fn call(name: impl Into<String>, args: Vec<Node>) -> Node {
        Node::Call {
            callee: Callee::Named(name.into()),
            args,
        }
    }

    pub fn primitive(op: Primitive, args: Vec<Node>) -> Node {
        debug_assert!(op.accepts(args.len()), "bad arity for {}", op.name());
        Node::Call {
            callee: Callee::Primitive(op),
            args,
        }
    }

    pub fn env_ref(env: Node, index: u32) -> Node {
        Node::primitive(Primitive::EnvRef, vec![env, Node::int(index as i64)])
    }

    pub fn env_set(env: Node, index: u32, value: Node) -> Node {
        Node::primitive(Primitive::EnvSet, vec![env, Node::int(index as i64), value])
    }

    pub fn set(var: VarId, value: Node) -> Node {
        Node::SetVar {
            var,
            value: Box::new(value),
        }
    }

    pub fn lambda(def: FunctionDef) -> Node {
        Node::Function(Box::new(def))
    }
}

/// A required, optional, rest or keyword parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub var: VarId,
    /// Dynamically scoped binding
    #[serde(default)]
    pub special: bool,
}

impl Param {
    pub fn new(var: VarId) -> Self {
        Self {
            var,
            special: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionalParam {
    pub param: Param,
    pub default: Node,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyParam {
    pub keyword: String,
    pub param: Param,
    pub default: Node,
}

/// Parameter list of a function definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamList {
    pub required: Vec<Param>,
    #[serde(default)]
    pub optional: Vec<OptionalParam>,
    #[serde(default)]
    pub rest: Option<Param>,
    #[serde(default)]
    pub keys: Vec<KeyParam>,
}

impl ParamList {
    pub fn required(vars: impl IntoIterator<Item = VarId>) -> Self {
        Self {
            required: vars.into_iter().map(Param::new).collect(),
            ..Default::default()
        }
    }

    /// All parameters in binding order
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.required
            .iter()
            .chain(self.optional.iter().map(|o| &o.param))
            .chain(self.rest.iter())
            .chain(self.keys.iter().map(|k| &k.param))
    }
}

/// Declarations attached to a function definition in source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionDecls {
    /// Declared not to outlive the creating activation
    #[serde(default)]
    pub dynamic_extent: bool,
    /// Allocation area for records and closures created in the body
    #[serde(default)]
    pub area: Option<String>,
}

/// Properties computed by lowering
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionProps {
    /// Closures of this function never outlive their creator
    #[serde(default)]
    pub bounded: bool,
    /// Implicit leading parameter carrying the caller-supplied record
    #[serde(default)]
    pub env_param: Option<VarId>,
    #[serde(default)]
    pub layout: Option<EnvLayout>,
}

/// Debug description of the record a function synthesizes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvLayout {
    /// Variable names in slot order
    pub vars: Vec<String>,
    /// Variable-name lists of the ancestor records, innermost first
    pub ancestors: Vec<Vec<String>>,
}

/// A function definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub scope: ScopeId,
    #[serde(default)]
    pub name: Option<String>,
    pub params: ParamList,
    pub body: Vec<Node>,
    #[serde(default)]
    pub decls: FunctionDecls,
    #[serde(default)]
    pub props: FunctionProps,
}

impl FunctionDef {
    pub fn new(scope: ScopeId, params: ParamList, body: Vec<Node>) -> Self {
        Self {
            scope,
            name: None,
            params,
            body,
            decls: FunctionDecls::default(),
            props: FunctionProps::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_decls(mut self, decls: FunctionDecls) -> Self {
        self.decls = decls;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scopes() -> Vec<ScopeInfo> {
        let scope = |name: &str, kind, parent| ScopeInfo {
            name: name.to_string(),
            kind,
            parent,
        };
        vec![
            scope("top", ScopeKind::Function, None),
            scope("loop", ScopeKind::Segment, Some(0)),
            scope("inner", ScopeKind::Function, Some(1)),
            scope("again", ScopeKind::Segment, Some(2)),
        ]
    }

    #[test]
    fn test_enclosing_function() {
        let scopes = sample_scopes();
        assert_eq!(enclosing_function(&scopes, 0), 0);
        assert_eq!(enclosing_function(&scopes, 1), 0);
        assert_eq!(enclosing_function(&scopes, 2), 2);
        assert_eq!(enclosing_function(&scopes, 3), 2);
    }

    #[test]
    fn test_lexical_ancestors() {
        let scopes = sample_scopes();
        let chain: Vec<ScopeId> = lexical_ancestors(&scopes, 3).collect();
        assert_eq!(chain, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_param_order() {
        let params = ParamList {
            required: vec![Param::new(0), Param::new(1)],
            optional: vec![OptionalParam {
                param: Param::new(2),
                default: Node::nil(),
            }],
            rest: Some(Param::new(3)),
            keys: Vec::new(),
        };
        let order: Vec<VarId> = params.iter().map(|p| p.var).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_primitive_arity() {
        assert!(Primitive::MakeEnv.accepts(1));
        assert!(Primitive::MakeEnv.accepts(2));
        assert!(!Primitive::MakeEnv.accepts(3));
        assert!(Primitive::EnvSet.accepts(3));
        assert!(!Primitive::EnvRef.accepts(3));
    }
}
