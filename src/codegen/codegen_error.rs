use thiserror::Error;

use crate::ir::{scope::UnknownVariable, structural_error::StructuralError};

/// Reasons a lowered program cannot be translated to C.
#[derive(Debug, Clone, Error)]
pub enum CodegenError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    UnknownVariable(#[from] UnknownVariable),
}
