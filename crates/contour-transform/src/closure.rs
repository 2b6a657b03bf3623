//! Closure conversion
//!
//! Rewrites the tree so that every non-local variable access becomes an
//! indexed load or store on a chain of environment records, and every
//! function value that captures anything becomes an explicit closure
//! (code plus the innermost live record):
//! 1. A function with free variables gets an implicit leading parameter
//!    carrying the caller-supplied record
//! 2. A scope with slots allocates its record on entry, links slot 0 to
//!    the enclosing live record and copies escaping bindings into it
//! 3. Escaping references and assignments are rewritten to `%env-ref` and
//!    `%env-set` against the record found by chain lookup
//! 4. Function values become `%make-closure` (or `%make-stack-closure`
//!    when their lifetime is bounded)

use contour_ir::{
    enclosing_function, Binding, Callee, EnvLayout, FunctionDef, Node, Primitive, ScopeInfo,
    Segment, Unit, VarKind, Variable,
};
use contour_types::{Literal, ScopeId, VarId};
use log::debug;
use std::rc::Rc;

use crate::chain::{lookup_record, Chain, RecordShape, Records, ScopeStack};
use crate::error::{LowerError, Result};
use crate::free_vars::FreeVariables;
use crate::layout::Layout;
use crate::options::LowerOptions;

/// Rewriting context, layered per recursive call
#[derive(Debug, Clone, Default)]
struct Context {
    stack: ScopeStack,
    chain: Chain,
    /// Allocation area for general records and closures
    area: Option<Rc<str>>,
}

/// Rewrite the unit's tree against a finished analysis
///
/// On error the unit's tree is left as it was.
pub fn convert_closures(
    unit: &mut Unit,
    free: &FreeVariables,
    layout: &Layout,
    options: &LowerOptions,
) -> Result<()> {
    let Unit {
        vars, scopes, root, ..
    } = unit;

    let mut rewriter = Rewriter {
        vars,
        scopes: scopes.as_slice(),
        free,
        layout,
        records: Records::new(),
    };
    let ctx = Context {
        area: options.default_area.as_deref().map(Rc::from),
        ..Default::default()
    };
    let lowered = rewriter.lower_function(root.clone(), &ctx)?;
    *root = lowered;
    Ok(())
}

/// Nesting and record of one tagbody segment
struct SegmentPlan {
    scope: ScopeId,
    labeled: bool,
    /// Index of the enclosing segment in the same tagbody
    outer: Option<usize>,
    stack: ScopeStack,
    /// Innermost segment record live inside the segment
    live: Option<(ScopeId, VarId)>,
    record: Option<SegmentRecord>,
}

struct SegmentRecord {
    /// Variable bound around the tagbody that holds the record
    holder: VarId,
    init: Node,
    /// Record written to slot 0
    link: Option<VarId>,
}

impl SegmentRecord {
    fn materialize(&self) -> Vec<Node> {
        let mut nodes = vec![Node::set(self.holder, self.init.clone())];
        if let Some(parent) = self.link {
            nodes.push(Node::env_set(Node::VarRef(self.holder), 0, Node::VarRef(parent)));
        }
        nodes
    }

    /// Materialize the record unless it is already live
    fn ensure(&self) -> Node {
        Node::If {
            test: Box::new(Node::VarRef(self.holder)),
            then: Box::new(Node::nil()),
            otherwise: Box::new(Node::Progn(self.materialize())),
        }
    }
}

struct Rewriter<'a> {
    vars: &'a mut Vec<Variable>,
    scopes: &'a [ScopeInfo],
    free: &'a FreeVariables,
    layout: &'a Layout,
    /// Records materialized so far
    records: Records,
}

impl<'a> Rewriter<'a> {
    fn scope_name(&self, scope: ScopeId) -> String {
        self.scopes
            .get(scope as usize)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    fn is_local(&self, var: VarId) -> bool {
        self.vars[var as usize].is_local
    }

    fn fresh_env(&mut self, name: String, scope: ScopeId) -> VarId {
        let id = self.vars.len() as VarId;
        self.vars.push(Variable::new(name, VarKind::Environment, scope));
        id
    }

    fn lower_function(&mut self, mut def: FunctionDef, ctx: &Context) -> Result<FunctionDef> {
        let name = def
            .name
            .clone()
            .unwrap_or_else(|| self.scope_name(def.scope));
        let area = def
            .decls
            .area
            .as_deref()
            .map(Rc::from)
            .or_else(|| ctx.area.clone());
        let captures = self
            .free
            .get(&def.scope)
            .map_or(false, |free| !free.is_empty());

        let mut inner = Context {
            stack: ctx.stack.push(def.scope),
            chain: Chain::default(),
            area,
        };
        if let (true, Some((head_scope, _))) = (captures, ctx.chain.head()) {
            let env = self.fresh_env(format!("{}-parent", name), def.scope);
            def.props.env_param = Some(env);
            inner.chain = inner.chain.push(head_scope, env);
        }

        let body = std::mem::take(&mut def.body);
        def.body = if self.layout.has_record(def.scope) {
            let (binding, mut prologue, inner) = self.open_record(def.scope, &inner, &name);
            for param in def.params.iter() {
                if !self.is_local(param.var) {
                    prologue.push(self.store(param.var, Node::VarRef(param.var), &inner)?);
                }
            }
            def.props.layout = Some(self.describe(def.scope, &inner.stack));
            prologue.extend(self.lower_body(body, &inner)?);
            vec![Node::Let {
                bindings: vec![binding],
                body: prologue,
            }]
        } else {
            self.lower_body(body, &inner)?
        };
        Ok(def)
    }

    /// Allocate the variable holding `scope`'s record and build the
    /// allocation, sized for a parent link when `linked`
    fn new_record(
        &mut self,
        scope: ScopeId,
        linked: bool,
        area: Option<&str>,
        name: &str,
    ) -> (VarId, Node) {
        let shape = RecordShape::new(self.layout.slots_of(scope).len(), linked);
        let env = self.fresh_env(format!("{}-env", name), scope);
        let stack = self.layout.is_stack(scope);

        let size = Node::int(shape.size as i64);
        let init = match (stack, area) {
            (true, _) => Node::primitive(Primitive::MakeStackEnv, vec![size]),
            (false, Some(area)) => Node::primitive(
                Primitive::MakeEnv,
                vec![size, Node::Literal(Literal::Symbol(area.to_string()))],
            ),
            (false, None) => Node::primitive(Primitive::MakeEnv, vec![size]),
        };

        debug!(
            "record for `{}`: {} slots, {}",
            name,
            shape.size,
            if stack { "stack" } else { "heap" }
        );
        self.records.insert(scope, shape);
        (env, init)
    }

    /// Materialize the record of `scope` and return its binding, the link
    /// write, and the context with the record pushed onto the chain.
    fn open_record(
        &mut self,
        scope: ScopeId,
        ctx: &Context,
        name: &str,
    ) -> (Binding, Vec<Node>, Context) {
        let parent = ctx.chain.head().map(|(_, env)| env);
        let (env, init) = self.new_record(scope, parent.is_some(), ctx.area.as_deref(), name);
        let prologue = parent
            .map(|parent| Node::env_set(Node::VarRef(env), 0, Node::VarRef(parent)))
            .into_iter()
            .collect();

        let inner = Context {
            chain: ctx.chain.push(scope, env),
            ..ctx.clone()
        };
        (Binding { var: env, init }, prologue, inner)
    }

    /// Debug layout: slot names of `scope` and of each reachable ancestor record
    fn describe(&self, scope: ScopeId, stack: &ScopeStack) -> EnvLayout {
        let names = |s: ScopeId| -> Vec<String> {
            self.layout
                .slots_of(s)
                .iter()
                .map(|v| self.vars[*v as usize].name.clone())
                .collect()
        };

        let mut ancestors = Vec::new();
        let mut linked = self.records.get(&scope).map_or(false, |r| r.linked);
        for s in stack.iter().skip_while(|s| *s != scope).skip(1) {
            if !linked {
                break;
            }
            if let Some(shape) = self.records.get(&s) {
                ancestors.push(names(s));
                linked = shape.linked;
            }
        }
        EnvLayout {
            vars: names(scope),
            ancestors,
        }
    }

    /// Resolve an escaping variable to its live record and index
    fn locate(&self, var: VarId, ctx: &Context) -> Result<(Node, u32)> {
        let unbound = || LowerError::UnboundEscapingVariable {
            var,
            name: self.vars[var as usize].name.clone(),
        };

        let owner = ctx
            .stack
            .iter()
            .find(|s| self.layout.slots_of(*s).contains(&var))
            .ok_or_else(unbound)?;
        let record = lookup_record(owner, &ctx.stack, &ctx.chain, &self.records, |s| {
            self.scope_name(s)
        })?;
        let slot = self.vars[var as usize].slot.ok_or_else(unbound)?;
        let shape = self
            .records
            .get(&owner)
            .ok_or_else(|| LowerError::ScopeNotInChain {
                scope: owner,
                name: self.scope_name(owner),
            })?;
        Ok((record, shape.index(slot)))
    }

    fn store(&self, var: VarId, value: Node, ctx: &Context) -> Result<Node> {
        let (env, index) = self.locate(var, ctx)?;
        Ok(Node::env_set(env, index, value))
    }

    /// Stores copying escaping bindings into their records
    fn bind_escaping(
        &self,
        vars: impl IntoIterator<Item = VarId>,
        ctx: &Context,
    ) -> Result<Vec<Node>> {
        vars.into_iter()
            .filter(|var| !self.is_local(*var))
            .map(|var| self.store(var, Node::VarRef(var), ctx))
            .collect()
    }

    /// Environment load of an exit or label identity when the jump leaves the current function
    fn jump_via(&self, tag: VarId, ctx: &Context) -> Result<Option<Box<Node>>> {
        if self.is_local(tag) {
            return Ok(None);
        }
        let home = enclosing_function(self.scopes, self.vars[tag as usize].scope);
        let here = ctx
            .stack
            .head()
            .map(|s| enclosing_function(self.scopes, s));
        if here == Some(home) {
            return Ok(None);
        }
        let (env, index) = self.locate(tag, ctx)?;
        Ok(Some(Box::new(Node::env_ref(env, index))))
    }

    fn lower_body(&mut self, body: Vec<Node>, ctx: &Context) -> Result<Vec<Node>> {
        body.into_iter()
            .map(|node| self.lower_node(node, ctx))
            .collect()
    }

    fn lower_boxed(&mut self, node: Box<Node>, ctx: &Context) -> Result<Box<Node>> {
        Ok(Box::new(self.lower_node(*node, ctx)?))
    }

    /// Lower a function appearing as a value into a closure construction
    fn lower_closure(
        &mut self,
        mut def: FunctionDef,
        ctx: &Context,
        in_place: bool,
    ) -> Result<Node> {
        if in_place && !def.props.bounded {
            def.props.bounded = true;
        }
        let bounded = def.props.bounded;
        let def = self.lower_function(def, ctx)?;

        let env = match (def.props.env_param, ctx.chain.head()) {
            (Some(_), Some((_, env))) => env,
            _ => return Ok(Node::lambda(def)),
        };
        debug!(
            "closure over #{} for `{}`: {}",
            env,
            def.name.as_deref().unwrap_or("<lambda>"),
            if bounded { "stack" } else { "heap" }
        );

        let function = Node::lambda(def);
        let env = Node::VarRef(env);
        Ok(if bounded {
            Node::primitive(Primitive::MakeStackClosure, vec![function, env])
        } else {
            match &ctx.area {
                Some(area) => Node::primitive(
                    Primitive::MakeClosure,
                    vec![function, env, Node::Literal(Literal::Symbol(area.to_string()))],
                ),
                None => Node::primitive(Primitive::MakeClosure, vec![function, env]),
            }
        })
    }

    /// A segment nests in an earlier segment of the same tagbody when the
    /// scope table makes it that segment's child; otherwise it hangs off
    /// the tagbody's own context.
    ///
    /// Segment records live in variables bound around the whole tagbody.
    /// Inside a segment the chain holds only the innermost live segment
    /// record, so variables of enclosing segments are reached through
    /// slot 0. A `go` may skip an enclosing labeled segment, so entering a
    /// segment first materializes any enclosing record that is not live
    /// yet, and entering a labeled segment drops the records of the
    /// segments nested in it.
    fn lower_tagbody(&mut self, tag: VarId, segments: Vec<Segment>, ctx: &Context) -> Result<Node> {
        let mut marker = if self.is_local(tag) {
            None
        } else {
            Some(self.store(tag, Node::ExitMarker(tag), ctx)?)
        };

        let mut plans: Vec<SegmentPlan> = Vec::with_capacity(segments.len());
        for segment in &segments {
            let parent = self.scopes.get(segment.scope as usize).and_then(|s| s.parent);
            let outer = parent.and_then(|p| plans.iter().position(|plan| plan.scope == p));
            let (stack, live) = match outer {
                Some(i) => (plans[i].stack.clone(), plans[i].live),
                None => (ctx.stack.clone(), None),
            };

            let record = if self.layout.has_record(segment.scope) {
                let link = live
                    .map(|(_, env)| env)
                    .or_else(|| ctx.chain.head().map(|(_, env)| env));
                let name = segment.label.as_deref().unwrap_or("entry");
                let (holder, init) =
                    self.new_record(segment.scope, link.is_some(), ctx.area.as_deref(), name);
                Some(SegmentRecord { holder, init, link })
            } else {
                None
            };
            plans.push(SegmentPlan {
                scope: segment.scope,
                labeled: segment.label.is_some(),
                outer,
                stack: stack.push(segment.scope),
                live: record.as_ref().map(|r| (segment.scope, r.holder)).or(live),
                record,
            });
        }

        let nested_in = |mut index: usize, ancestor: usize| {
            while let Some(outer) = plans[index].outer {
                if outer == ancestor {
                    return true;
                }
                index = outer;
            }
            false
        };

        let mut lowered = Vec::with_capacity(segments.len());
        for (index, segment) in segments.into_iter().enumerate() {
            let plan = &plans[index];
            let mut body: Vec<Node> = marker.take().into_iter().collect();

            let mut enclosing = Vec::new();
            let mut outer = plan.outer;
            while let Some(i) = outer {
                enclosing.push(i);
                outer = plans[i].outer;
            }
            for &i in enclosing.iter().rev() {
                match &plans[i].record {
                    Some(record) if plans[i].labeled => body.push(record.ensure()),
                    _ => {}
                }
            }
            if plan.labeled {
                for (later, other) in plans.iter().enumerate().skip(index + 1) {
                    match &other.record {
                        Some(record) if nested_in(later, index) => {
                            body.push(Node::set(record.holder, Node::nil()))
                        }
                        _ => {}
                    }
                }
            }
            if let Some(record) = &plan.record {
                body.extend(record.materialize());
            }

            let seg_ctx = Context {
                stack: plan.stack.clone(),
                chain: match plan.live {
                    Some((scope, env)) => ctx.chain.push(scope, env),
                    None => ctx.chain.clone(),
                },
                area: ctx.area.clone(),
            };
            body.extend(self.lower_body(segment.body, &seg_ctx)?);
            lowered.push(Segment {
                label: segment.label,
                scope: segment.scope,
                body,
            });
        }

        let holders: Vec<Binding> = plans
            .iter()
            .filter_map(|plan| plan.record.as_ref())
            .map(|record| Binding {
                var: record.holder,
                init: Node::nil(),
            })
            .collect();
        let tagbody = Node::Tagbody {
            tag,
            segments: lowered,
        };
        Ok(if holders.is_empty() {
            tagbody
        } else {
            Node::Let {
                bindings: holders,
                body: vec![tagbody],
            }
        })
    }

    fn lower_node(&mut self, node: Node, ctx: &Context) -> Result<Node> {
        Ok(match node {
            Node::Literal(_) | Node::ExitMarker(_) => node,
            Node::VarRef(var) => {
                if self.is_local(var) {
                    Node::VarRef(var)
                } else {
                    let (env, index) = self.locate(var, ctx)?;
                    Node::env_ref(env, index)
                }
            }
            Node::SetVar { var, value } => {
                let value = self.lower_node(*value, ctx)?;
                if self.is_local(var) {
                    Node::set(var, value)
                } else {
                    self.store(var, value, ctx)?
                }
            }
            Node::If {
                test,
                then,
                otherwise,
            } => Node::If {
                test: self.lower_boxed(test, ctx)?,
                then: self.lower_boxed(then, ctx)?,
                otherwise: self.lower_boxed(otherwise, ctx)?,
            },
            Node::Call { callee, args } => {
                let callee = match callee {
                    Callee::Expr(expr) => match *expr {
                        Node::Function(def) => {
                            Callee::Expr(Box::new(self.lower_closure(*def, ctx, true)?))
                        }
                        other => Callee::Expr(Box::new(self.lower_node(other, ctx)?)),
                    },
                    other => other,
                };
                Node::Call {
                    callee,
                    args: self.lower_body(args, ctx)?,
                }
            }
            Node::Progn(body) => Node::Progn(self.lower_body(body, ctx)?),
            Node::Let { bindings, body } => {
                let mut lowered = Vec::with_capacity(bindings.len());
                for binding in bindings {
                    lowered.push(Binding {
                        var: binding.var,
                        init: self.lower_node(binding.init, ctx)?,
                    });
                }
                let mut inner = self.bind_escaping(lowered.iter().map(|b| b.var), ctx)?;
                inner.extend(self.lower_body(body, ctx)?);
                Node::Let {
                    bindings: lowered,
                    body: inner,
                }
            }
            Node::Function(def) => self.lower_closure(*def, ctx, false)?,
            Node::Tagbody { tag, segments } => self.lower_tagbody(tag, segments, ctx)?,
            Node::Go { tag, label, via } => {
                let via = match via {
                    Some(via) => Some(self.lower_boxed(via, ctx)?),
                    None => self.jump_via(tag, ctx)?,
                };
                Node::Go { tag, label, via }
            }
            Node::Block { tag, body } => {
                let mut inner = Vec::with_capacity(body.len() + 1);
                if !self.is_local(tag) {
                    inner.push(self.store(tag, Node::ExitMarker(tag), ctx)?);
                }
                inner.extend(self.lower_body(body, ctx)?);
                Node::Block { tag, body: inner }
            }
            Node::ReturnFrom { tag, value, via } => {
                let value = self.lower_boxed(value, ctx)?;
                let via = match via {
                    Some(via) => Some(self.lower_boxed(via, ctx)?),
                    None => self.jump_via(tag, ctx)?,
                };
                Node::ReturnFrom { tag, value, via }
            }
            Node::MultipleValueBind { vars, value, body } => {
                let value = self.lower_boxed(value, ctx)?;
                let mut inner = self.bind_escaping(vars.iter().copied(), ctx)?;
                inner.extend(self.lower_body(body, ctx)?);
                Node::MultipleValueBind {
                    vars,
                    value,
                    body: inner,
                }
            }
            Node::MultipleValueProg1 { first, rest } => Node::MultipleValueProg1 {
                first: self.lower_boxed(first, ctx)?,
                rest: self.lower_body(rest, ctx)?,
            },
            Node::The { ty, value } => Node::The {
                ty,
                value: self.lower_boxed(value, ctx)?,
            },
            Node::UnwindProtect { protected, cleanup } => {
                let protected = self.lower_boxed(protected, ctx)?;
                let cleanup = match *cleanup {
                    Node::Function(def) => self.lower_closure(*def, ctx, true)?,
                    other => self.lower_node(other, ctx)?,
                };
                Node::UnwindProtect {
                    protected,
                    cleanup: Box::new(cleanup),
                }
            }
            Node::Case {
                key,
                clauses,
                default,
            } => {
                let key = self.lower_boxed(key, ctx)?;
                let mut lowered = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    lowered.push(contour_ir::CaseClause {
                        keys: clause.keys,
                        body: self.lower_body(clause.body, ctx)?,
                    });
                }
                Node::Case {
                    key,
                    clauses: lowered,
                    default: self.lower_body(default, ctx)?,
                }
            }
        })
    }
}
