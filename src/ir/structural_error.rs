use thiserror::Error;

/// Which consumer of the IR detected the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pass(u8),
    Vm,
    Codegen,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Pass(n) => write!(f, "pass {}", n),
            Stage::Vm => write!(f, "vm"),
            Stage::Codegen => write!(f, "codegen"),
        }
    }
}

/// Malformed IR: unbalanced blocks, a label mismatch, or an exhausted
/// operand stack. Always a compiler bug, never a user error.
#[derive(Debug, Clone, Error)]
pub struct StructuralError {
    pub stage: Option<Stage>,
    /// Absolute index of the offending instruction in the lowered program.
    pub index: usize,
    pub message: String,
}

impl std::fmt::Display for StructuralError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "structural error")?;
        if let Some(stage) = self.stage {
            write!(f, " in {}", stage)?;
        }
        write!(f, " at instruction {}: {}", self.index, self.message)
    }
}

impl StructuralError {
    pub fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            stage: None,
            index,
            message: message.into(),
        }
    }

    pub fn out_of_stack(index: usize) -> Self {
        Self::new(index, "out of stack")
    }

    /// Attaches the detecting stage unless one is already recorded.
    pub fn in_stage(mut self, stage: Stage) -> Self {
        self.stage.get_or_insert(stage);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_stage() {
        let err = StructuralError::out_of_stack(7).in_stage(Stage::Vm);
        assert_eq!(err.to_string(), "structural error in vm at instruction 7: out of stack");
    }

    #[test]
    fn test_first_stage_wins() {
        let err = StructuralError::new(0, "x")
            .in_stage(Stage::Pass(4))
            .in_stage(Stage::Codegen);
        assert_eq!(err.stage, Some(Stage::Pass(4)));
    }
}
