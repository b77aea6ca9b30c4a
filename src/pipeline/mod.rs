//! The lowering pipeline: AST in, verified instruction stream out.
//!
//! | pass | name     | effect                                         |
//! |------|----------|------------------------------------------------|
//! | 1    | lower    | AST to instructions, builds the scope tree     |
//! | 2    | fold     | integer constant folding                       |
//! | 3    | peephole | drops push/pop pairs                           |
//! | 4    | verify   | block nesting and stack-height check           |
//!
//! Each of passes 2-4 consumes a stream and hands back a replacement.

pub mod fold;
pub mod lower;
pub mod lower_error;
pub mod peephole;
pub mod verify;

use thiserror::Error;
use tracing::debug;

use crate::{
    ir::{
        disasm,
        program::Program,
        scope::ScopeTree,
        stream::InstructionStream,
        structural_error::{Stage, StructuralError},
    },
    lang::node::Node,
};
use lower::Lowerer;
use lower_error::LowerError;

pub const PASS_COUNT: u8 = 4;

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Leave the program's final value on the stack.
    pub used: bool,

    /// Render the listing after this pass and stop.
    pub dump_pass: Option<u8>,
}

#[derive(Debug)]
pub enum PipelineOutput {
    Lowered(Program),
    /// Listing produced by `dump_pass`.
    Dumped(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Lower(#[from] LowerError),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("no pass {0}: passes are numbered 1 to 4")]
    NoSuchPass(u8),
}

type PassFn = fn(InstructionStream, &PipelineOptions) -> Result<InstructionStream, StructuralError>;

const REWRITE_PASSES: [(u8, &str, PassFn); 3] = [
    (2, "fold", run_fold),
    (3, "peephole", run_peephole),
    (4, "verify", run_verify),
];

fn run_fold(
    stream: InstructionStream,
    _: &PipelineOptions,
) -> Result<InstructionStream, StructuralError> {
    Ok(InstructionStream::new(fold::fold(stream.to_vec())))
}

fn run_peephole(
    stream: InstructionStream,
    _: &PipelineOptions,
) -> Result<InstructionStream, StructuralError> {
    Ok(InstructionStream::new(peephole::peephole(stream.to_vec())))
}

fn run_verify(
    stream: InstructionStream,
    options: &PipelineOptions,
) -> Result<InstructionStream, StructuralError> {
    verify::verify(&stream, usize::from(options.used))?;
    Ok(stream)
}

pub struct Pipeline {
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self { options }
    }

    pub fn run(&self, ast: &Node) -> Result<PipelineOutput, PipelineError> {
        if let Some(n) = self.options.dump_pass {
            if n == 0 || n > PASS_COUNT {
                return Err(PipelineError::NoSuchPass(n));
            }
        }

        let (instructions, scopes) = Lowerer::new().lower_program(ast, self.options.used)?;
        debug!(
            pass = 1,
            instructions = instructions.len(),
            scopes = scopes.len(),
            "lower"
        );

        let mut stream = InstructionStream::new(instructions);
        if let Some(listing) = self.dump_after(1, "lower", &stream, &scopes) {
            return Ok(PipelineOutput::Dumped(listing));
        }

        for (number, name, pass) in REWRITE_PASSES {
            let before = stream.len();
            stream = pass(stream, &self.options).map_err(|e| e.in_stage(Stage::Pass(number)))?;
            debug!(
                pass = number,
                before,
                after = stream.len(),
                "{}",
                name
            );
            if let Some(listing) = self.dump_after(number, name, &stream, &scopes) {
                return Ok(PipelineOutput::Dumped(listing));
            }
        }

        Ok(PipelineOutput::Lowered(Program::new(stream.to_vec(), scopes)))
    }

    fn dump_after(
        &self,
        number: u8,
        name: &str,
        stream: &InstructionStream,
        scopes: &ScopeTree,
    ) -> Option<String> {
        (self.options.dump_pass == Some(number)).then(|| {
            disasm::listing(
                &format!("after pass {} ({})", number, name),
                &stream.to_vec(),
                scopes,
            )
        })
    }
}

/// Runs all passes and returns the lowered program, ignoring `dump_pass`.
pub fn lower_program(ast: &Node, used: bool) -> Result<Program, PipelineError> {
    let options = PipelineOptions {
        used,
        dump_pass: None,
    };
    match Pipeline::new(options).run(ast)? {
        PipelineOutput::Lowered(program) => Ok(program),
        PipelineOutput::Dumped(_) => Err(PipelineError::NoSuchPass(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::read_source;
    use crate::ir::op::Op;
    use pretty_assertions::assert_eq;

    fn run(source: &str, options: PipelineOptions) -> PipelineOutput {
        let ast = read_source(source).unwrap();
        Pipeline::new(options).run(&ast).unwrap()
    }

    #[test]
    fn test_all_passes_fold_and_clean() {
        let ast = read_source("(lasgn x (call (lit 2) * (lit 21)))").unwrap();
        let program = lower_program(&ast, false).unwrap();
        let ops: Vec<Op> = program.instructions.iter().map(|i| i.op.clone()).collect();
        assert_eq!(
            ops,
            vec![
                Op::PushInt(42),
                Op::VariableSet {
                    name: "x".to_string(),
                    local_only: false
                },
            ]
        );
    }

    #[test]
    fn test_used_program_keeps_value() {
        let ast = read_source("(lit 1) (lit 2)").unwrap();
        let program = lower_program(&ast, true).unwrap();
        let ops: Vec<Op> = program.instructions.iter().map(|i| i.op.clone()).collect();
        assert_eq!(ops, vec![Op::PushInt(2)]);
    }

    #[test]
    fn test_dump_after_pass_one_keeps_raw_stream() {
        let output = run(
            "(call nil puts (call (lit 1) + (lit 2)))",
            PipelineOptions {
                used: false,
                dump_pass: Some(1),
            },
        );
        let PipelineOutput::Dumped(listing) = output else {
            panic!("expected a listing");
        };
        assert!(listing.contains("after pass 1 (lower)"));
        assert!(listing.contains("SEND            + argc=1 receiver"));
    }

    #[test]
    fn test_dump_after_pass_two_shows_folded_constant() {
        let output = run(
            "(call nil puts (call (lit 1) + (lit 2)))",
            PipelineOptions {
                used: false,
                dump_pass: Some(2),
            },
        );
        let PipelineOutput::Dumped(listing) = output else {
            panic!("expected a listing");
        };
        assert!(listing.contains("PUSH_INT        3"));
        assert!(!listing.contains("SEND            +"));
    }

    #[test]
    fn test_unknown_pass_rejected() {
        let ast = read_source("(nil)").unwrap();
        let options = PipelineOptions {
            used: false,
            dump_pass: Some(5),
        };
        let err = Pipeline::new(options).run(&ast).unwrap_err();
        assert!(matches!(err, PipelineError::NoSuchPass(5)));
    }

    #[test]
    fn test_lower_errors_surface() {
        let ast = read_source("(break)").unwrap();
        let err = lower_program(&ast, false).unwrap_err();
        assert!(matches!(err, PipelineError::Lower(_)));
    }
}
