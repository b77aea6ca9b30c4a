pub mod disasm;
pub mod op;
pub mod program;
pub mod scope;
pub mod stream;
pub mod structural_error;

pub use op::{BlockLabel, Instruction, Op, Terminator, Visibility};
pub use program::Program;
pub use scope::{ScopeId, ScopeKind, ScopeTree, UnknownVariable};
pub use stream::InstructionStream;
pub use structural_error::{Stage, StructuralError};
