use std::io::Write;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::{
    ir::{
        op::{BlockLabel, Instruction, Op, Terminator, Visibility},
        program::Program,
        scope::{ScopeId, ScopeTree},
        stream::InstructionStream,
        structural_error::{Stage, StructuralError},
    },
    lang::value::Value,
    runtime::{
        builtins,
        frame::{Closure, Frame, Method},
        runtime_error::{
            VmError, no_block_given, no_method, private_method, stack_too_deep, wrong_arity,
        },
        scope::{RuntimeScope, ScopeRef},
    },
};

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_steps: Option<usize>,
    /// Operand stack bound for the interpreter itself. Unbounded by
    /// default; generated code has no such limit.
    pub max_stack_size: Option<usize>,
    /// Re-resolve every variable access against the compile-time scope
    /// tree and fail on disagreement.
    pub verify_scopes: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_steps: None,
            max_stack_size: None,
            verify_scopes: false,
        }
    }
}

/// Early termination of a `walk`. Not an error: the caller that owns the
/// matching construct (loop, method, block, program) consumes it.
#[derive(Debug)]
pub enum Signal {
    BreakOut,
    Halt,
    /// Continue a loop, or finish a block invocation with a value.
    Next(Option<Value>),
    Return(Value),
}

/// How a method or block invocation ended.
enum Completion {
    Value(Value),
    Halt,
}

/// How a whole program ended.
#[derive(Debug, PartialEq)]
pub enum Exit {
    /// Ran off the end (or returned); carries the value left on the stack.
    Finished(Option<Value>),
    /// `exit` was called.
    Halted,
}

pub struct Vm<W: Write> {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    methods: FxHashMap<String, Rc<Method>>,
    globals: FxHashMap<String, Value>,
    visibility: Visibility,
    scopes: Rc<ScopeTree>,
    out: W,
    // Safety limits
    config: VmConfig,
    steps: usize,
}

fn structural(err: StructuralError) -> VmError {
    err.in_stage(Stage::Vm).into()
}

impl<W: Write> Vm<W> {
    pub fn new(out: W) -> Self {
        Self::with_config(VmConfig::default(), out)
    }

    pub fn with_config(config: VmConfig, out: W) -> Self {
        Self {
            stack: Vec::new(),
            frames: Vec::new(),
            methods: FxHashMap::default(),
            globals: FxHashMap::default(),
            visibility: Visibility::Private,
            scopes: Rc::new(ScopeTree::new()),
            out,
            config,
            steps: 0,
        }
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn reset_execution_state(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.methods.clear();
        self.globals.clear();
        self.visibility = Visibility::Private;
        self.steps = 0;
    }

    /// Interprets a lowered program from the top.
    pub fn run(&mut self, program: &Program) -> Result<Exit, VmError> {
        self.reset_execution_state();
        self.scopes = Rc::new(program.scopes.clone());

        let scope = RuntimeScope::new(&self.scopes, ScopeId::ROOT, None);
        self.frames.push(Frame {
            name: "<main>".to_string(),
            return_ip: 0,
            args: Vec::new(),
            scope,
            block: None,
            self_value: Value::Main,
            stack_base: 0,
        });

        let mut stream = program.stream();
        let result = self.run_stream(&mut stream);
        self.out.flush()?;

        let exit = match result? {
            None => Exit::Finished(self.stack.last().cloned()),
            Some(Signal::Return(value)) => Exit::Finished(Some(value)),
            Some(Signal::Halt) => Exit::Halted,
            Some(other) => {
                return Err(structural(StructuralError::new(
                    stream.current_index(),
                    format!("{:?} escaped the program", other),
                )));
            }
        };
        debug!(steps = self.steps, methods = self.methods.len(), "program finished");
        Ok(exit)
    }

    fn run_stream(&mut self, stream: &mut InstructionStream) -> Result<Option<Signal>, VmError> {
        stream.walk(|s, instruction| self.execute(s, instruction))
    }

    // Execution

    fn check_limits(&mut self) -> Result<(), VmError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(VmError::StepLimit(max));
            }
        }

        if let Some(max) = self.config.max_stack_size {
            if self.stack.len() > max {
                return Err(VmError::StackLimit(max));
            }
        }

        Ok(())
    }

    fn execute(
        &mut self,
        stream: &mut InstructionStream,
        instruction: &Instruction,
    ) -> Result<Option<Signal>, VmError> {
        self.check_limits()?;
        let index = stream.current_index();

        match &instruction.op {
            // Literals
            Op::PushInt(n) => self.push(Value::Integer(*n)),
            Op::PushString(s) => self.push(Value::string(s)),
            Op::PushSymbol(s) => self.push(Value::symbol(s)),
            Op::PushNil => self.push(Value::Nil),
            Op::PushTrue => self.push(Value::Bool(true)),
            Op::PushFalse => self.push(Value::Bool(false)),
            Op::PushSelf => {
                let value = self.frame(index)?.self_value.clone();
                self.push(value);
            }

            // Stack operations
            Op::Pop => {
                self.pop(index)?;
            }
            Op::Dup => {
                let value = self.peek(index)?.clone();
                self.push(value);
            }

            // Variables
            Op::VariableGet { name } => {
                let scope = self.current_scope(index)?;
                self.verify_scope(&scope, instruction, name, false, index)?;
                let value = RuntimeScope::get(&scope, name)?;
                self.push(value);
            }
            Op::VariableSet { name, local_only } => {
                let value = self.pop(index)?;
                let scope = self.current_scope(index)?;
                self.verify_scope(&scope, instruction, name, *local_only, index)?;
                RuntimeScope::set(&scope, name, value, *local_only)?;
            }
            Op::GlobalGet { name } => {
                let value = self.globals.get(name).cloned().unwrap_or(Value::Nil);
                self.push(value);
            }
            Op::GlobalSet { name } => {
                let value = self.pop(index)?;
                self.globals.insert(name.clone(), value);
            }

            // Arguments
            Op::CheckArgs { expected } => {
                let given = self.frame(index)?.args.len();
                if given != *expected {
                    return Err(wrong_arity(given, *expected).into());
                }
            }
            Op::PushArg(i) => {
                let value = self.frame(index)?.args.get(*i).cloned();
                self.push(value.unwrap_or(Value::Nil));
            }

            // Calls
            Op::Send {
                message,
                argc,
                receiver,
                with_block,
            } => {
                let block = if *with_block {
                    match self.pop(index)? {
                        Value::Proc(closure) => Some(closure),
                        other => {
                            return Err(structural(StructuralError::new(
                                index,
                                format!("SEND expected a block, found {}", other.class_name()),
                            )));
                        }
                    }
                } else {
                    None
                };
                let args = self.pop_n(*argc, index)?;
                let receiver = if *receiver {
                    Some(self.pop(index)?)
                } else {
                    None
                };
                match self.send(receiver, message, args, block, index)? {
                    Completion::Value(value) => self.push(value),
                    Completion::Halt => return Ok(Some(Signal::Halt)),
                }
            }
            Op::Yield { argc } => {
                let args = self.pop_n(*argc, index)?;
                let block = self.frame(index)?.block.clone().ok_or_else(no_block_given)?;
                match self.call_block(&block, args, index)? {
                    Completion::Value(value) => self.push(value),
                    Completion::Halt => return Ok(Some(Signal::Halt)),
                }
            }

            // Structured blocks
            Op::If => {
                let condition = self.pop(index)?;
                let mut then_branch = stream
                    .fetch_block(Terminator::Else, None)
                    .map_err(structural)?;
                let mut else_branch = stream
                    .fetch_block(Terminator::End, Some(BlockLabel::If))
                    .map_err(structural)?;
                let branch = if condition.is_truthy() {
                    &mut then_branch
                } else {
                    &mut else_branch
                };
                return self.run_stream(branch);
            }
            Op::While => {
                let condition = stream
                    .fetch_block(Terminator::WhileBody, None)
                    .map_err(structural)?;
                let body = stream
                    .fetch_block(Terminator::End, Some(BlockLabel::While))
                    .map_err(structural)?;
                return self.run_loop(&condition, &body, index);
            }
            Op::DefineMethod { name, body_scope } => {
                let body = stream
                    .fetch_block(Terminator::End, Some(BlockLabel::Def))
                    .map_err(structural)?;
                let private = self.visibility == Visibility::Private;
                trace!(method = %name, private, instructions = body.len(), "define method");
                self.methods.insert(
                    name.clone(),
                    Rc::new(Method {
                        name: name.clone(),
                        body,
                        body_scope: *body_scope,
                        private,
                    }),
                );
                self.push(Value::symbol(name));
            }
            Op::DefineBlock { body_scope } => {
                let body = stream
                    .fetch_block(Terminator::End, Some(BlockLabel::Block))
                    .map_err(structural)?;
                let frame = self.frame(index)?;
                let closure = Closure {
                    body,
                    body_scope: *body_scope,
                    env: Rc::clone(&frame.scope),
                    self_value: frame.self_value.clone(),
                    block: frame.block.clone(),
                    home: frame.name.clone(),
                };
                self.push(Value::Proc(Rc::new(closure)));
            }
            Op::Else | Op::WhileBody | Op::End(_) => {
                return Err(structural(StructuralError::new(
                    index,
                    format!("unexpected {} outside its block", instruction.op),
                )));
            }

            // Control
            Op::Return => {
                let value = self.pop(index)?;
                return Ok(Some(Signal::Return(value)));
            }
            Op::Break => return Ok(Some(Signal::BreakOut)),
            Op::Next { with_value } => {
                let value = if *with_value {
                    Some(self.pop(index)?)
                } else {
                    None
                };
                return Ok(Some(Signal::Next(value)));
            }
            Op::Halt => return Ok(Some(Signal::Halt)),
            Op::SetVisibility(visibility) => self.visibility = *visibility,
        }

        Ok(None)
    }

    fn run_loop(
        &mut self,
        condition: &InstructionStream,
        body: &InstructionStream,
        index: usize,
    ) -> Result<Option<Signal>, VmError> {
        let base = self.stack.len();
        loop {
            let mut cond = condition.clone();
            match self.run_stream(&mut cond)? {
                None => {}
                Some(Signal::BreakOut) => break,
                Some(Signal::Next(None)) => {
                    self.stack.truncate(base);
                    continue;
                }
                Some(other) => return Ok(Some(other)),
            }
            if !self.pop(index)?.is_truthy() {
                break;
            }

            let mut iteration = body.clone();
            match self.run_stream(&mut iteration)? {
                None | Some(Signal::Next(None)) => self.stack.truncate(base),
                Some(Signal::BreakOut) => break,
                Some(other) => return Ok(Some(other)),
            }
        }
        self.stack.truncate(base);
        Ok(None)
    }

    // Dispatch

    fn send(
        &mut self,
        receiver: Option<Value>,
        message: &str,
        args: Vec<Value>,
        block: Option<Rc<Closure>>,
        call_ip: usize,
    ) -> Result<Completion, VmError> {
        let explicit = receiver.is_some();
        let receiver = match receiver {
            Some(value) => value,
            None => self.frame(call_ip)?.self_value.clone(),
        };

        if let Some(result) = builtins::call_builtin(&receiver, message, &args) {
            return Ok(Completion::Value(result?));
        }

        if let Some(method) = self.methods.get(message).cloned() {
            if method.private && explicit {
                return Err(private_method(message, &receiver.describe()).into());
            }
            return self.invoke_method(&method, receiver, args, block, call_ip);
        }

        if !explicit {
            match message {
                "puts" => {
                    self.puts(&args)?;
                    return Ok(Completion::Value(Value::Nil));
                }
                "print" => {
                    for arg in &args {
                        write!(self.out, "{}", arg)?;
                    }
                    return Ok(Completion::Value(Value::Nil));
                }
                _ => {}
            }
        }

        Err(no_method(message, &receiver.describe()).into())
    }

    fn puts(&mut self, args: &[Value]) -> Result<(), VmError> {
        if args.is_empty() {
            writeln!(self.out)?;
        }
        for arg in args {
            let text = arg.to_string();
            if text.ends_with('\n') {
                write!(self.out, "{}", text)?;
            } else {
                writeln!(self.out, "{}", text)?;
            }
        }
        Ok(())
    }

    /// Number of method/block invocations currently active.
    fn call_depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    fn invoke_method(
        &mut self,
        method: &Rc<Method>,
        self_value: Value,
        args: Vec<Value>,
        block: Option<Rc<Closure>>,
        call_ip: usize,
    ) -> Result<Completion, VmError> {
        if self.call_depth() >= self.config.max_call_depth {
            return Err(stack_too_deep().into());
        }
        trace!(method = %method.name, argc = args.len(), depth = self.call_depth(), "call");

        let scope = RuntimeScope::new(&self.scopes, method.body_scope, None);
        self.frames.push(Frame {
            name: method.name.clone(),
            return_ip: call_ip,
            args,
            scope,
            block,
            self_value,
            stack_base: self.stack.len(),
        });

        let mut body = method.body.clone();
        let result = self.run_stream(&mut body);
        self.finish_invocation(result, &body, false)
    }

    fn call_block(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<Value>,
        call_ip: usize,
    ) -> Result<Completion, VmError> {
        if self.call_depth() >= self.config.max_call_depth {
            return Err(stack_too_deep().into());
        }

        let scope = RuntimeScope::new(
            &self.scopes,
            closure.body_scope,
            Some(Rc::clone(&closure.env)),
        );
        self.frames.push(Frame {
            name: format!("block in {}", closure.home),
            return_ip: call_ip,
            args,
            scope,
            block: closure.block.clone(),
            self_value: closure.self_value.clone(),
            stack_base: self.stack.len(),
        });

        let mut body = closure.body.clone();
        let result = self.run_stream(&mut body);
        self.finish_invocation(result, &body, true)
    }

    /// Pops the invocation's frame and turns the walk result into the
    /// invocation's value.
    fn finish_invocation(
        &mut self,
        result: Result<Option<Signal>, VmError>,
        body: &InstructionStream,
        is_block: bool,
    ) -> Result<Completion, VmError> {
        let index = body.current_index();
        let completion = match result {
            Ok(None) => self.pop(index).map(Completion::Value),
            Ok(Some(Signal::Return(value))) if !is_block => Ok(Completion::Value(value)),
            Ok(Some(Signal::Next(Some(value)))) if is_block => Ok(Completion::Value(value)),
            Ok(Some(Signal::Halt)) => Ok(Completion::Halt),
            Ok(Some(other)) => Err(structural(StructuralError::new(
                index,
                format!("{:?} escaped its body", other),
            ))),
            Err(e) => Err(e),
        };

        let frame = self.frames.pop().ok_or_else(|| {
            structural(StructuralError::new(index, "call stack underflow"))
        })?;
        self.stack.truncate(frame.stack_base);

        completion.map_err(|e| match e {
            VmError::Runtime(e) => e
                .with_context(&format!(
                    "in '{}' (called at instruction {})",
                    frame.name, frame.return_ip
                ))
                .into(),
            other => other,
        })
    }

    // Helpers

    fn frame(&self, index: usize) -> Result<&Frame, VmError> {
        self.frames
            .last()
            .ok_or_else(|| structural(StructuralError::new(index, "no active call frame")))
    }

    fn current_scope(&self, index: usize) -> Result<ScopeRef, VmError> {
        Ok(Rc::clone(&self.frame(index)?.scope))
    }

    /// Checks that the run-time lookup binds where the compile-time lookup
    /// does. Only active with `verify_scopes`.
    fn verify_scope(
        &self,
        scope: &ScopeRef,
        instruction: &Instruction,
        name: &str,
        local_only: bool,
        index: usize,
    ) -> Result<(), VmError> {
        if !self.config.verify_scopes {
            return Ok(());
        }
        let expected = self.scopes.resolve(instruction.scope, name, local_only)?;
        let (owner, depth) = RuntimeScope::resolve(scope, name, local_only)?;
        let found = owner.borrow().lexical;
        if found != expected.scope || depth != expected.depth {
            return Err(structural(StructuralError::new(
                index,
                format!(
                    "'{}' binds to {} at depth {} at run time, {} at depth {} statically",
                    name, found, depth, expected.scope, expected.depth
                ),
            )));
        }
        Ok(())
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pops within the current frame; reaching below the frame's base is
    /// malformed IR.
    fn pop(&mut self, index: usize) -> Result<Value, VmError> {
        let base = self.frames.last().map_or(0, |f| f.stack_base);
        if self.stack.len() <= base {
            return Err(structural(StructuralError::out_of_stack(index)));
        }
        self.stack
            .pop()
            .ok_or_else(|| structural(StructuralError::out_of_stack(index)))
    }

    fn peek(&self, index: usize) -> Result<&Value, VmError> {
        let base = self.frames.last().map_or(0, |f| f.stack_base);
        if self.stack.len() <= base {
            return Err(structural(StructuralError::out_of_stack(index)));
        }
        self.stack
            .last()
            .ok_or_else(|| structural(StructuralError::out_of_stack(index)))
    }

    /// Pops `n` values, returned in push order.
    fn pop_n(&mut self, n: usize, index: usize) -> Result<Vec<Value>, VmError> {
        let base = self.frames.last().map_or(0, |f| f.stack_base);
        if self.stack.len() < base + n {
            return Err(structural(StructuralError::out_of_stack(index)));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }
}
