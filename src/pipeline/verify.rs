//! Pass 4: structural verification.
//!
//! Walks the stream the same way the VM and the code generator do, checking
//! that blocks nest with matching labels and that every instruction finds
//! the operands it needs. Both branches of an `IF` must leave the same
//! height, loop bodies must be stack-neutral, and method/block bodies must
//! leave exactly one value. The stream itself is returned unchanged.

use crate::ir::{
    op::{BlockLabel, Op, Terminator},
    stream::InstructionStream,
    structural_error::StructuralError,
};

/// Returns (pops, pushes) for a non-structured op.
fn effect(op: &Op) -> Option<(usize, usize)> {
    use Op::*;
    Some(match op {
        PushInt(_) | PushString(_) | PushSymbol(_) | PushNil | PushTrue | PushFalse
        | PushSelf => (0, 1),

        Pop => (1, 0),
        Dup => (1, 2),

        VariableGet { .. } | GlobalGet { .. } => (0, 1),
        VariableSet { .. } | GlobalSet { .. } => (1, 0),

        CheckArgs { .. } => (0, 0),
        PushArg(_) => (0, 1),

        Send {
            argc,
            receiver,
            with_block,
            ..
        } => (argc + usize::from(*receiver) + usize::from(*with_block), 1),
        Yield { argc } => (*argc, 1),

        Return => (1, 0),
        Break | Halt | SetVisibility(_) => (0, 0),
        Next { with_value } => (usize::from(*with_value), 0),

        If | Else | While | WhileBody | DefineMethod { .. } | DefineBlock { .. } | End(_) => {
            return None;
        }
    })
}

/// Checks `stream` starting from an empty stack; the program must finish
/// with `final_height` values live.
pub fn verify(stream: &InstructionStream, final_height: usize) -> Result<(), StructuralError> {
    let mut stream = stream.clone();
    stream.set_cursor(0);
    let height = check(&mut stream, 0)?;
    if height != final_height {
        return Err(StructuralError::new(
            stream.absolute(stream.len()),
            format!(
                "program leaves {} values, expected {}",
                height, final_height
            ),
        ));
    }
    Ok(())
}

fn check(stream: &mut InstructionStream, initial: usize) -> Result<usize, StructuralError> {
    let mut h = initial;

    stream.walk(|s, instruction| {
        let index = s.current_index();
        let op = &instruction.op;

        if let Some((pops, pushes)) = effect(op) {
            if h < pops {
                return Err(StructuralError::new(
                    index,
                    format!("stack underflow: {} needs {} values, {} live", op, pops, h),
                ));
            }
            h = h - pops + pushes;
            return Ok(None::<()>);
        }

        match op {
            Op::If => {
                if h == 0 {
                    return Err(StructuralError::out_of_stack(index));
                }
                h -= 1;
                let mut then_branch = s.fetch_block(Terminator::Else, None)?;
                let mut else_branch = s.fetch_block(Terminator::End, Some(BlockLabel::If))?;
                let then_h = check(&mut then_branch, h)?;
                let else_h = check(&mut else_branch, h)?;
                if then_h != else_h {
                    return Err(StructuralError::new(
                        index,
                        format!("IF branches leave {} and {} values", then_h, else_h),
                    ));
                }
                h = then_h;
            }

            Op::While => {
                let mut condition = s.fetch_block(Terminator::WhileBody, None)?;
                let mut body = s.fetch_block(Terminator::End, Some(BlockLabel::While))?;
                if check(&mut condition, h)? != h + 1 {
                    return Err(StructuralError::new(
                        index,
                        "WHILE condition must leave exactly one value",
                    ));
                }
                if check(&mut body, h)? != h {
                    return Err(StructuralError::new(
                        index,
                        "WHILE body must leave the stack as it found it",
                    ));
                }
            }

            Op::DefineMethod { .. } | Op::DefineBlock { .. } => {
                let label = op.opens_block().unwrap_or(BlockLabel::Def);
                let mut body = s.fetch_block(Terminator::End, Some(label))?;
                let body_h = check(&mut body, 0)?;
                if body_h != 1 {
                    return Err(StructuralError::new(
                        index,
                        format!("{} body must leave one value, leaves {}", label, body_h),
                    ));
                }
                h += 1;
            }

            Op::Else | Op::WhileBody | Op::End(_) => {
                return Err(StructuralError::new(
                    index,
                    format!("unexpected {} outside its block", op),
                ));
            }

            other => {
                return Err(StructuralError::new(
                    index,
                    format!("no stack effect known for {}", other),
                ));
            }
        }

        Ok(None)
    })?;

    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::op::Instruction;
    use crate::ir::scope::ScopeId;

    fn stream(ops: Vec<Op>) -> InstructionStream {
        InstructionStream::new(
            ops.into_iter()
                .map(|op| Instruction::new(op, ScopeId::ROOT))
                .collect(),
        )
    }

    fn assert_error(ops: Vec<Op>, final_height: usize, needle: &str) {
        let err = verify(&stream(ops), final_height).unwrap_err();
        assert!(
            err.message.contains(needle),
            "expected '{}' in '{}'",
            needle,
            err.message
        );
    }

    #[test]
    fn test_simple_ops() {
        let ops = vec![
            Op::PushInt(1),
            Op::PushInt(2),
            Op::Send {
                message: "+".to_string(),
                argc: 1,
                receiver: true,
                with_block: false,
            },
            Op::Pop,
        ];
        assert!(verify(&stream(ops), 0).is_ok());
    }

    #[test]
    fn test_underflow() {
        assert_error(vec![Op::Pop], 0, "underflow");
    }

    #[test]
    fn test_final_height_checked() {
        assert_error(vec![Op::PushNil], 0, "program leaves 1 values");
        assert!(verify(&stream(vec![Op::PushNil]), 1).is_ok());
    }

    #[test]
    fn test_unbalanced_if_rejected() {
        assert_error(
            vec![
                Op::PushTrue,
                Op::If,
                Op::PushInt(1),
                Op::PushInt(2),
                Op::Else,
                Op::PushInt(3),
                Op::End(BlockLabel::If),
            ],
            1,
            "IF branches leave 2 and 1",
        );
    }

    #[test]
    fn test_and_shape_balances() {
        // a DUP IF POP b ELSE END
        let ops = vec![
            Op::PushTrue,
            Op::Dup,
            Op::If,
            Op::Pop,
            Op::PushInt(2),
            Op::Else,
            Op::End(BlockLabel::If),
        ];
        assert!(verify(&stream(ops), 1).is_ok());
    }

    #[test]
    fn test_method_body_must_leave_one_value() {
        let ops = vec![
            Op::DefineMethod {
                name: "f".to_string(),
                body_scope: ScopeId::ROOT,
            },
            Op::CheckArgs { expected: 0 },
            Op::End(BlockLabel::Def),
            Op::Pop,
        ];
        assert_error(ops, 0, "def body must leave one value, leaves 0");
    }

    #[test]
    fn test_label_mismatch_detected() {
        let ops = vec![
            Op::PushTrue,
            Op::If,
            Op::Else,
            Op::End(BlockLabel::While),
        ];
        assert_error(ops, 0, "expected END if");
    }

    #[test]
    fn test_stray_end_detected() {
        assert_error(vec![Op::End(BlockLabel::If)], 0, "unexpected END");
    }

    #[test]
    fn test_while_must_be_stack_neutral() {
        let ops = vec![
            Op::While,
            Op::PushFalse,
            Op::WhileBody,
            Op::PushInt(1),
            Op::End(BlockLabel::While),
        ];
        assert_error(ops, 0, "WHILE body");
    }
}
