//! Shared identifiers for contour
//!
//! Variables and scopes are referred to by stable integer ids that index
//! into the tables owned by a compilation unit. Maps produced by the
//! analyses are keyed by these ids, never by structural equality.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a variable entity (index into the unit's variable table)
pub type VarId = u32;

/// Unique identifier for a scope (index into the unit's scope table)
pub type ScopeId = u32;

/// A quoted constant appearing in the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    /// An interned name, printed without quotes
    Symbol(String),
}

impl Literal {
    /// Check if this literal is the empty value
    pub fn is_nil(&self) -> bool {
        matches!(self, Literal::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Nil => write!(f, "nil"),
            Literal::Bool(true) => write!(f, "t"),
            Literal::Bool(false) => write!(f, "false"),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Symbol(s) => write!(f, "'{}", s),
        }
    }
}

impl Default for Literal {
    fn default() -> Self {
        Literal::Nil
    }
}
