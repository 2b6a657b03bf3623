//! Environment chain and scope stack, and record lookup over them
//!
//! Both structures are persistent singly-linked lists: pushing returns a
//! new value that shares the caller's tail, so each recursive rewrite call
//! layers its own entries without disturbing its caller's view.
//!
//! The scope stack lists every enclosing scope, innermost first. The chain
//! lists only scopes whose records are held in local variables at the
//! current point; scopes with empty layouts never appear in it.

use contour_ir::Node;
use contour_types::{ScopeId, VarId};
use log::trace;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{LowerError, Result};

/// Every enclosing scope, materialized or not
#[derive(Debug, Clone, Default)]
pub struct ScopeStack(Option<Rc<StackFrame>>);

#[derive(Debug)]
struct StackFrame {
    scope: ScopeId,
    next: ScopeStack,
}

impl ScopeStack {
    pub fn push(&self, scope: ScopeId) -> ScopeStack {
        ScopeStack(Some(Rc::new(StackFrame {
            scope,
            next: self.clone(),
        })))
    }

    pub fn head(&self) -> Option<ScopeId> {
        self.0.as_ref().map(|frame| frame.scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(self.0.as_deref(), |frame| frame.next.0.as_deref())
            .map(|frame| frame.scope)
    }

    pub fn contains(&self, scope: ScopeId) -> bool {
        self.iter().any(|s| s == scope)
    }
}

/// Materialized records reachable without indirection, innermost first
#[derive(Debug, Clone, Default)]
pub struct Chain(Option<Rc<ChainLink>>);

#[derive(Debug)]
struct ChainLink {
    scope: ScopeId,
    /// Local variable holding the record
    env: VarId,
    next: Chain,
}

impl Chain {
    pub fn push(&self, scope: ScopeId, env: VarId) -> Chain {
        Chain(Some(Rc::new(ChainLink {
            scope,
            env,
            next: self.clone(),
        })))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn head(&self) -> Option<(ScopeId, VarId)> {
        self.0.as_ref().map(|link| (link.scope, link.env))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScopeId, VarId)> + '_ {
        std::iter::successors(self.0.as_deref(), |link| link.next.0.as_deref())
            .map(|link| (link.scope, link.env))
    }

    /// The variable holding `scope`'s record, if it is on the chain
    pub fn find(&self, scope: ScopeId) -> Option<VarId> {
        self.iter().find(|(s, _)| *s == scope).map(|(_, env)| env)
    }
}

/// Shape of a record that has been materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordShape {
    /// Slot 0 holds the enclosing record
    pub linked: bool,
    /// Total number of slots, including the link
    pub size: u32,
}

impl RecordShape {
    pub fn new(slot_count: usize, linked: bool) -> Self {
        Self {
            linked,
            size: slot_count as u32 + linked as u32,
        }
    }

    /// Index of the variable stored at `slot`
    pub fn index(&self, slot: u32) -> u32 {
        slot + self.linked as u32
    }
}

/// Materialized records by scope
pub type Records = HashMap<ScopeId, RecordShape>;

/// Build an expression denoting the live record of `target`
///
/// The chain head is used directly when it is the target; any other chain
/// entry is used directly too. Otherwise the walk starts at the chain
/// head and follows slot-0 links outward through the stack, one
/// dereference per materialized record, until `target` is reached.
pub fn lookup_record(
    target: ScopeId,
    stack: &ScopeStack,
    chain: &Chain,
    records: &Records,
    scope_name: impl Fn(ScopeId) -> String,
) -> Result<Node> {
    let not_found = || LowerError::ScopeNotInChain {
        scope: target,
        name: scope_name(target),
    };

    let (head_scope, head_env) = chain.head().ok_or_else(not_found)?;
    if head_scope == target {
        return Ok(Node::VarRef(head_env));
    }
    if let Some(env) = chain.find(target) {
        return Ok(Node::VarRef(env));
    }
    if !stack.contains(target) {
        return Err(not_found());
    }

    let mut expr = Node::VarRef(head_env);
    let mut current = head_scope;
    for scope in stack.iter().skip_while(|s| *s != head_scope).skip(1) {
        if !records.contains_key(&scope) {
            if scope == target {
                break;
            }
            continue;
        }
        let linked = records.get(&current).map_or(false, |shape| shape.linked);
        if !linked {
            return Err(LowerError::MissingParentLink {
                scope: current,
                name: scope_name(current),
            });
        }
        trace!("walk: record of #{} -> #{}", current, scope);
        expr = Node::env_ref(expr, 0);
        current = scope;
        if scope == target {
            return Ok(expr);
        }
    }
    Err(not_found())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contour_ir::{Callee, Primitive};

    fn name(scope: ScopeId) -> String {
        format!("s{}", scope)
    }

    /// Count nested slot-0 loads and return the variable at the bottom
    fn unwrap_loads(mut node: &Node) -> (usize, VarId) {
        let mut depth = 0;
        loop {
            match node {
                Node::VarRef(var) => return (depth, *var),
                Node::Call {
                    callee: Callee::Primitive(Primitive::EnvRef),
                    args,
                } => {
                    assert!(matches!(args[1], Node::Literal(ref l) if l.as_int() == Some(0)));
                    depth += 1;
                    node = &args[0];
                }
                other => panic!("unexpected node {:?}", other),
            }
        }
    }

    #[test]
    fn test_persistent_push_shares_tail() {
        let base = ScopeStack::default().push(0).push(1);
        let left = base.push(2);
        let right = base.push(3);
        assert_eq!(left.iter().collect::<Vec<_>>(), vec![2, 1, 0]);
        assert_eq!(right.iter().collect::<Vec<_>>(), vec![3, 1, 0]);
        assert_eq!(base.head(), Some(1));
    }

    #[test]
    fn test_head_is_depth_zero() {
        let stack = ScopeStack::default().push(0);
        let chain = Chain::default().push(0, 10);
        let records = Records::from([(0, RecordShape::new(1, false))]);
        let expr = lookup_record(0, &stack, &chain, &records, name).unwrap();
        assert!(matches!(expr, Node::VarRef(10)));
    }

    #[test]
    fn test_chain_entry_used_directly() {
        // Scope 1 has an empty layout: it is on the stack but not the chain.
        let stack = ScopeStack::default().push(0).push(1).push(2);
        let chain = Chain::default().push(0, 10).push(2, 12);
        let records = Records::from([
            (0, RecordShape::new(1, false)),
            (2, RecordShape::new(1, true)),
        ]);
        let expr = lookup_record(0, &stack, &chain, &records, name).unwrap();
        assert!(matches!(expr, Node::VarRef(10)));
    }

    #[test]
    fn test_walk_counts_only_materialized_records() {
        // stack: 4 3 2 1 0 ; records at 3, 1 and 0 ; chain holds only 3
        let stack = ScopeStack::default()
            .push(0)
            .push(1)
            .push(2)
            .push(3)
            .push(4);
        let chain = Chain::default().push(3, 13);
        let records = Records::from([
            (0, RecordShape::new(2, false)),
            (1, RecordShape::new(1, true)),
            (3, RecordShape::new(1, true)),
        ]);

        let expr = lookup_record(1, &stack, &chain, &records, name).unwrap();
        assert_eq!(unwrap_loads(&expr), (1, 13));

        let expr = lookup_record(0, &stack, &chain, &records, name).unwrap();
        assert_eq!(unwrap_loads(&expr), (2, 13));
    }

    #[test]
    fn test_missing_scope_is_an_error() {
        let stack = ScopeStack::default().push(0).push(1);
        let chain = Chain::default().push(1, 11);
        let records = Records::from([(1, RecordShape::new(1, false))]);
        let err = lookup_record(7, &stack, &chain, &records, name).unwrap_err();
        assert_eq!(
            err,
            LowerError::ScopeNotInChain {
                scope: 7,
                name: "s7".to_string()
            }
        );
    }

    #[test]
    fn test_unlinked_record_cannot_be_walked() {
        let stack = ScopeStack::default().push(0).push(1);
        let chain = Chain::default().push(1, 11);
        let records = Records::from([
            (0, RecordShape::new(1, false)),
            (1, RecordShape::new(1, false)),
        ]);
        let err = lookup_record(0, &stack, &chain, &records, name).unwrap_err();
        assert!(matches!(err, LowerError::MissingParentLink { scope: 1, .. }));
    }

    #[test]
    fn test_record_shape() {
        let linked = RecordShape::new(3, true);
        assert_eq!(linked.size, 4);
        assert_eq!(linked.index(0), 1);
        let root = RecordShape::new(3, false);
        assert_eq!(root.size, 3);
        assert_eq!(root.index(2), 2);
    }
}
