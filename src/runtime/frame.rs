use std::rc::Rc;

use crate::{
    ir::{scope::ScopeId, stream::InstructionStream},
    lang::value::Value,
    runtime::scope::ScopeRef,
};

/// A block captured by `DEFINE_BLOCK`: its body plus everything needed to
/// run it later from inside another method.
#[derive(Debug)]
pub struct Closure {
    pub body: InstructionStream,
    pub body_scope: ScopeId,
    /// Run-time scope the block was created in.
    pub env: ScopeRef,
    pub self_value: Value,
    /// Block of the creating frame, so `yield` inside a block still works.
    pub block: Option<Rc<Closure>>,
    /// Name of the method the block was written in, for backtraces.
    pub home: String,
}

/// A user-defined method.
#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub body: InstructionStream,
    pub body_scope: ScopeId,
    pub private: bool,
}

/// One activation record on the VM call stack.
#[derive(Debug)]
pub struct Frame {
    pub name: String,
    /// Absolute index of the instruction that made the call.
    pub return_ip: usize,
    pub args: Vec<Value>,
    pub scope: ScopeRef,
    pub block: Option<Rc<Closure>>,
    pub self_value: Value,
    /// Operand stack height when the frame was entered.
    pub stack_base: usize,
}
