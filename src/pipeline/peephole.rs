//! Pass 3: peephole cleanup of the push/pop pairs pass 1 leaves behind.
//!
//! Rules, applied to each `POP` against what has already been kept:
//! - a side-effect-free push followed by `POP` disappears;
//! - `DUP; POP` disappears;
//! - `DUP; VARIABLE_SET|GLOBAL_SET; POP` keeps only the store.

use crate::ir::op::{Instruction, Op};

pub fn peephole(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let mut out: Vec<Instruction> = Vec::with_capacity(instructions.len());

    for instruction in instructions {
        if instruction.op == Op::Pop && absorb_pop(&mut out) {
            continue;
        }
        out.push(instruction);
    }

    out
}

/// Removes whatever makes the pending `POP` redundant. Returns false when
/// the `POP` has to stay.
fn absorb_pop(out: &mut Vec<Instruction>) -> bool {
    let Some(last) = out.last() else {
        return false;
    };

    if last.op.is_pure_push() || last.op == Op::Dup {
        out.pop();
        return true;
    }

    if matches!(last.op, Op::VariableSet { .. } | Op::GlobalSet { .. }) {
        let len = out.len();
        if len >= 2 && out[len - 2].op == Op::Dup {
            out.remove(len - 2);
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::op::BlockLabel;
    use crate::ir::scope::ScopeId;
    use pretty_assertions::assert_eq;

    fn optimized(ops: Vec<Op>) -> Vec<Op> {
        let instructions = ops
            .into_iter()
            .map(|op| Instruction::new(op, ScopeId::ROOT))
            .collect();
        peephole(instructions).into_iter().map(|i| i.op).collect()
    }

    fn set(name: &str) -> Op {
        Op::VariableSet {
            name: name.to_string(),
            local_only: false,
        }
    }

    #[test]
    fn test_push_pop_removed() {
        assert_eq!(
            optimized(vec![Op::PushInt(1), Op::Pop, Op::PushNil]),
            vec![Op::PushNil]
        );
    }

    #[test]
    fn test_statement_assignment_keeps_store() {
        assert_eq!(
            optimized(vec![Op::PushInt(1), Op::Dup, set("x"), Op::Pop]),
            vec![Op::PushInt(1), set("x")]
        );
    }

    #[test]
    fn test_removals_cascade() {
        // a nil pushed for a loop value, then dropped twice over
        assert_eq!(
            optimized(vec![Op::PushNil, Op::Dup, Op::Pop, Op::Pop]),
            Vec::<Op>::new()
        );
    }

    #[test]
    fn test_pop_after_send_stays() {
        let send = Op::Send {
            message: "puts".to_string(),
            argc: 0,
            receiver: false,
            with_block: false,
        };
        assert_eq!(
            optimized(vec![send.clone(), Op::Pop]),
            vec![send, Op::Pop]
        );
    }

    #[test]
    fn test_pop_across_block_boundary_stays() {
        let ops = vec![
            Op::PushTrue,
            Op::If,
            Op::PushInt(1),
            Op::Else,
            Op::PushInt(2),
            Op::End(BlockLabel::If),
            Op::Pop,
        ];
        assert_eq!(optimized(ops.clone()), ops);
    }

    #[test]
    fn test_pop_right_after_if_stays() {
        // `a || b` pops inside the else branch: the preceding ELSE is no push.
        let ops = vec![Op::PushTrue, Op::Dup, Op::If, Op::Else, Op::Pop, Op::PushInt(1)];
        assert_eq!(optimized(ops.clone()), ops);
    }
}
