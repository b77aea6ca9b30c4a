//! Pass 2: integer constant folding.
//!
//! `PUSH_INT a; PUSH_INT b; SEND op argc=1 receiver` collapses into the
//! result when `op` is a builtin Integer operator. Builtins take priority
//! over user methods at dispatch, so the rewrite cannot change behavior.
//! Division and modulo by zero are left alone to raise at run time.

use crate::{
    ir::op::{Instruction, Op},
    runtime::builtins,
};

pub fn fold(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let mut out: Vec<Instruction> = Vec::with_capacity(instructions.len());

    for instruction in instructions {
        if let Some(folded) = try_fold(&out, &instruction) {
            out.truncate(out.len() - 2);
            out.push(Instruction::new(folded, instruction.scope));
        } else {
            out.push(instruction);
        }
    }

    out
}

fn try_fold(out: &[Instruction], instruction: &Instruction) -> Option<Op> {
    let Op::Send {
        message,
        argc: 1,
        receiver: true,
        with_block: false,
    } = &instruction.op
    else {
        return None;
    };

    let [.., left, right] = out else {
        return None;
    };
    let (Op::PushInt(a), Op::PushInt(b)) = (&left.op, &right.op) else {
        return None;
    };

    let op = match builtins::integer_binop(message, *a, *b)? {
        builtins::Folded::Int(n) => Op::PushInt(n),
        builtins::Folded::Bool(true) => Op::PushTrue,
        builtins::Folded::Bool(false) => Op::PushFalse,
    };
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::scope::ScopeId;
    use pretty_assertions::assert_eq;

    fn at_root(ops: Vec<Op>) -> Vec<Instruction> {
        ops.into_iter()
            .map(|op| Instruction::new(op, ScopeId::ROOT))
            .collect()
    }

    fn folded(ops: Vec<Op>) -> Vec<Op> {
        fold(at_root(ops)).into_iter().map(|i| i.op).collect()
    }

    fn binop(message: &str) -> Op {
        Op::Send {
            message: message.to_string(),
            argc: 1,
            receiver: true,
            with_block: false,
        }
    }

    #[test]
    fn test_fold_addition() {
        assert_eq!(
            folded(vec![Op::PushInt(1), Op::PushInt(2), binop("+")]),
            vec![Op::PushInt(3)]
        );
    }

    #[test]
    fn test_fold_cascades() {
        // (1 + 2) * 4
        assert_eq!(
            folded(vec![
                Op::PushInt(1),
                Op::PushInt(2),
                binop("+"),
                Op::PushInt(4),
                binop("*"),
            ]),
            vec![Op::PushInt(12)]
        );
    }

    #[test]
    fn test_fold_comparison() {
        assert_eq!(
            folded(vec![Op::PushInt(1), Op::PushInt(2), binop("<")]),
            vec![Op::PushTrue]
        );
    }

    #[test]
    fn test_fold_floors_division() {
        assert_eq!(
            folded(vec![Op::PushInt(-7), Op::PushInt(2), binop("/")]),
            vec![Op::PushInt(-4)]
        );
    }

    #[test]
    fn test_division_by_zero_is_kept() {
        let ops = vec![Op::PushInt(1), Op::PushInt(0), binop("/")];
        assert_eq!(folded(ops.clone()), ops);
    }

    #[test]
    fn test_non_literal_operand_is_kept() {
        let ops = vec![
            Op::VariableGet {
                name: "n".to_string(),
            },
            Op::PushInt(1),
            binop("-"),
        ];
        assert_eq!(folded(ops.clone()), ops);
    }

    #[test]
    fn test_unknown_operator_is_kept() {
        let ops = vec![Op::PushInt(1), Op::PushInt(2), binop("foo")];
        assert_eq!(folded(ops.clone()), ops);
    }
}
