use std::rc::Rc;

use crate::ir::op::{BlockLabel, Instruction, Op, Terminator};
use crate::ir::structural_error::StructuralError;

/// An ordered run of instructions with a traversal cursor.
///
/// Sub-streams returned by `fetch_block` are views into the same shared
/// instruction buffer, so extracting a method body or a branch never copies
/// instructions, and each view keeps its own cursor (a recursive method call
/// walks its body with a fresh cursor).
///
/// Both the VM and the code generator traverse streams only through this
/// type, so block nesting is counted in exactly one place.
#[derive(Debug, Clone)]
pub struct InstructionStream {
    instructions: Rc<[Instruction]>,
    start: usize,
    end: usize,
    /// Absolute index of the next instruction to visit.
    ip: usize,
}

impl InstructionStream {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let end = instructions.len();
        Self {
            instructions: instructions.into(),
            start: 0,
            end,
            ip: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Cursor position relative to the start of this stream.
    pub fn get_cursor(&self) -> usize {
        self.ip - self.start
    }

    /// Repositions the cursor (relative); used for loop back-edges.
    pub fn set_cursor(&mut self, ip: usize) {
        self.ip = (self.start + ip).min(self.end);
    }

    /// Absolute index (in the whole lowered program) of the instruction at
    /// relative position `ip`, for diagnostics.
    pub fn absolute(&self, ip: usize) -> usize {
        self.start + ip
    }

    /// Absolute index of the most recently visited instruction.
    pub fn current_index(&self) -> usize {
        self.ip.saturating_sub(1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions[self.start..self.end].iter()
    }

    pub fn to_vec(&self) -> Vec<Instruction> {
        self.iter().cloned().collect()
    }

    /// Visits every remaining instruction in order.
    ///
    /// `visit` receives the stream itself so it can pull nested blocks out
    /// with `fetch_block` or move the cursor. A visit returning a signal
    /// stops the walk immediately and hands the signal to the caller.
    pub fn walk<S, E, F>(&mut self, mut visit: F) -> Result<Option<S>, E>
    where
        F: FnMut(&mut Self, &Instruction) -> Result<Option<S>, E>,
    {
        let instructions = Rc::clone(&self.instructions);
        while self.ip < self.end {
            let instruction = &instructions[self.ip];
            self.ip += 1;
            if let Some(signal) = visit(self, instruction)? {
                return Ok(Some(signal));
            }
        }
        Ok(None)
    }

    /// Collects the instructions after the cursor up to the `terminator`
    /// that sits at nesting depth zero.
    ///
    /// Every block opener passed on the way raises the depth and every `End`
    /// lowers it; terminators met while the depth is positive belong to the
    /// nested block and are included. On success the cursor sits just past
    /// the terminator.
    pub fn fetch_block(
        &mut self,
        terminator: Terminator,
        expected_label: Option<BlockLabel>,
    ) -> Result<InstructionStream, StructuralError> {
        let start = self.ip;
        let mut depth = 0usize;

        for index in start..self.end {
            let op = &self.instructions[index].op;

            if depth == 0 && op.terminator() == Some(terminator) {
                if let Some(expected) = expected_label {
                    if op.label() != Some(expected) {
                        return Err(StructuralError::new(
                            index,
                            format!("expected END {}, found {}", expected, op),
                        ));
                    }
                }
                self.ip = index + 1;
                return Ok(InstructionStream {
                    instructions: Rc::clone(&self.instructions),
                    start,
                    end: index,
                    ip: start,
                });
            }

            if op.opens_block().is_some() {
                depth += 1;
            } else if let Op::End(label) = op {
                if depth == 0 {
                    return Err(StructuralError::new(
                        index,
                        format!("END {} reached while looking for {}", label, terminator),
                    ));
                }
                depth -= 1;
            }
        }

        Err(StructuralError::new(
            self.end,
            format!("stream ended while looking for {}", terminator),
        ))
    }
}
