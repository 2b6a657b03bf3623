//! Tree representation for contour
//!
//! The input is an already-bound tree: variable entities know their
//! defining scope and the scopes that reference them. Lowering rewrites
//! the same node type in place of the original.

pub mod builder;
pub mod ir;
pub mod printer;
pub mod refs;

pub use ir::*;
pub use printer::{print_node, print_unit};
pub use refs::annotate_references;
