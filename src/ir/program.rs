use serde::{Deserialize, Serialize};

use crate::ir::op::{Instruction, Op};
use crate::ir::scope::ScopeTree;
use crate::ir::stream::InstructionStream;
use crate::ir::structural_error::StructuralError;

/// A fully lowered program: the final instruction list plus the scope tree
/// its instructions point into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub instructions: Vec<Instruction>,

    /// Lexical scopes; `ScopeId::ROOT` is the program's top level.
    pub scopes: ScopeTree,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>, scopes: ScopeTree) -> Self {
        Self {
            instructions,
            scopes,
        }
    }

    pub fn stream(&self) -> InstructionStream {
        InstructionStream::new(self.instructions.clone())
    }

    /// Checks that the scope tree is well formed and that every scope an
    /// instruction names exists in it.
    pub fn validate(&self) -> Result<(), StructuralError> {
        self.scopes.validate()?;

        for (index, instruction) in self.instructions.iter().enumerate() {
            let body_scope = match &instruction.op {
                Op::DefineMethod { body_scope, .. } | Op::DefineBlock { body_scope } => {
                    Some(*body_scope)
                }
                _ => None,
            };
            for scope in std::iter::once(instruction.scope).chain(body_scope) {
                if !self.scopes.contains(scope) {
                    return Err(StructuralError::new(index, format!("unknown scope {}", scope)));
                }
            }
        }
        Ok(())
    }

    /// Encodes the program for `--emit-ir`.
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::op::{BlockLabel, Op};
    use crate::ir::scope::{ScopeId, ScopeKind};

    #[test]
    fn test_encoded_program_decodes_to_same_ir() {
        let mut scopes = ScopeTree::new();
        let body = scopes.push(ScopeId::ROOT, ScopeKind::Method);
        scopes.declare(body, "n");
        let instructions = vec![
            Instruction::new(
                Op::DefineMethod {
                    name: "id".to_string(),
                    body_scope: body,
                },
                ScopeId::ROOT,
            ),
            Instruction::new(Op::PushArg(0), body),
            Instruction::new(Op::End(BlockLabel::Def), ScopeId::ROOT),
            Instruction::new(Op::PushString("héllo".to_string()), ScopeId::ROOT),
        ];
        let program = Program::new(instructions.clone(), scopes);

        let bytes = program.encode().unwrap();
        let decoded = Program::decode(&bytes).unwrap();

        assert_eq!(decoded.instructions, instructions);
        assert_eq!(decoded.scopes.len(), 2);
        assert_eq!(decoded.scopes.resolve(body, "n", false).unwrap().depth, 0);
    }

    #[test]
    fn test_validate_rejects_unknown_body_scope() {
        let mut scopes = ScopeTree::new();
        let body = scopes.push(ScopeId::ROOT, ScopeKind::Block);
        let instructions = vec![
            Instruction::new(Op::DefineBlock { body_scope: body }, ScopeId::ROOT),
            Instruction::new(Op::PushNil, body),
            Instruction::new(Op::End(BlockLabel::Block), ScopeId::ROOT),
        ];
        assert!(Program::new(instructions.clone(), scopes).validate().is_ok());

        let err = Program::new(instructions, ScopeTree::new())
            .validate()
            .unwrap_err();
        assert_eq!(err.index, 0);
        assert_eq!(err.message, "unknown scope s1");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Program::decode(&[0xff, 0xff, 0xff]).is_err());
    }
}
