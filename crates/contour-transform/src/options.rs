//! Lowering options

use serde::{Deserialize, Serialize};

/// Knobs for environment lowering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowerOptions {
    /// Allow records proven not to outlive their activation to be stack-allocated
    pub stack_environments: bool,
    /// Allocation area for general records and closures when no function declares one
    pub default_area: Option<String>,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            stack_environments: true,
            default_area: None,
        }
    }
}
