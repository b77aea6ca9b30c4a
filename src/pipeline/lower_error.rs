use thiserror::Error;

use crate::lang::node::Node;

#[derive(Debug, Clone, Error)]
pub enum LowerError {
    /// A node that's valid but appeared where it cannot be lowered
    InvalidPosition {
        node_type: &'static str,
        reason: String,
        hint: Option<String>,
    },
}

impl LowerError {
    fn invalid(node: &Node, reason: &str, hint: Option<&str>) -> Self {
        LowerError::InvalidPosition {
            node_type: node.kind_name(),
            reason: reason.to_string(),
            hint: hint.map(str::to_string),
        }
    }

    pub fn break_outside_loop(node: &Node) -> Self {
        Self::invalid(node, "break outside of a loop", None)
    }

    /// `break` that would leave a block body for the method that yielded.
    pub fn break_in_block(node: &Node) -> Self {
        Self::invalid(
            node,
            "break cannot leave a block",
            Some("use next to finish the block invocation instead"),
        )
    }

    pub fn return_in_block(node: &Node) -> Self {
        Self::invalid(
            node,
            "return cannot leave a block",
            Some("use next to hand a value back to the yielding method"),
        )
    }

    pub fn next_outside_loop(node: &Node) -> Self {
        Self::invalid(node, "next outside of a loop or block", None)
    }
}

impl std::fmt::Display for LowerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LowerError::InvalidPosition {
                node_type,
                reason,
                hint,
            } => {
                write!(f, "lower error: {}: {}", node_type, reason)?;
                if let Some(h) = hint {
                    write!(f, "\n  hint: {}", h)?;
                }
                Ok(())
            }
        }
    }
}
