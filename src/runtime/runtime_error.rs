use thiserror::Error;

use crate::ir::{scope::UnknownVariable, structural_error::StructuralError};

/// Exception classes an interpreted program can raise. The generated C
/// runtime raises the same classes with the same messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionClass {
    NoMethodError,
    ArgumentError,
    TypeError,
    ZeroDivisionError,
    LocalJumpError,
    SystemStackError,
}

impl std::fmt::Display for ExceptionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExceptionClass::NoMethodError => "NoMethodError",
            ExceptionClass::ArgumentError => "ArgumentError",
            ExceptionClass::TypeError => "TypeError",
            ExceptionClass::ZeroDivisionError => "ZeroDivisionError",
            ExceptionClass::LocalJumpError => "LocalJumpError",
            ExceptionClass::SystemStackError => "SystemStackError",
        };
        write!(f, "{}", s)
    }
}

/// An uncaught exception of the interpreted program.
///
/// `Display` renders the `message (Class)` line both execution modes print
/// on stderr; the call stack is kept for diagnostics.
#[derive(Debug, Clone, Error)]
pub struct RuntimeError {
    pub class: ExceptionClass,
    pub message: String,
    pub call_stack: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.class)
    }
}

impl RuntimeError {
    pub fn new(class: ExceptionClass, message: impl Into<String>) -> Self {
        RuntimeError {
            class,
            message: message.into(),
            call_stack: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.push(context.to_string());
        self
    }

    /// Innermost frame first.
    pub fn backtrace(&self) -> String {
        let mut out = String::new();
        for (i, frame) in self.call_stack.iter().enumerate() {
            out.push_str(&format!("    {}: {}\n", i, frame));
        }
        out
    }
}

pub fn no_method(name: &str, receiver_description: &str) -> RuntimeError {
    RuntimeError::new(
        ExceptionClass::NoMethodError,
        format!("undefined method '{}' for {}", name, receiver_description),
    )
}

pub fn private_method(name: &str, receiver_description: &str) -> RuntimeError {
    RuntimeError::new(
        ExceptionClass::NoMethodError,
        format!(
            "private method '{}' called for {}",
            name, receiver_description
        ),
    )
}

pub fn wrong_arity(given: usize, expected: usize) -> RuntimeError {
    RuntimeError::new(
        ExceptionClass::ArgumentError,
        format!(
            "wrong number of arguments (given {}, expected {})",
            given, expected
        ),
    )
}

pub fn divided_by_zero() -> RuntimeError {
    RuntimeError::new(ExceptionClass::ZeroDivisionError, "divided by 0")
}

pub fn no_block_given() -> RuntimeError {
    RuntimeError::new(ExceptionClass::LocalJumpError, "no block given (yield)")
}

pub fn stack_too_deep() -> RuntimeError {
    RuntimeError::new(ExceptionClass::SystemStackError, "stack level too deep")
}

/// Everything that can stop the VM short of a normal finish.
#[derive(Debug, Error)]
pub enum VmError {
    /// The program raised an exception.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    UnknownVariable(#[from] UnknownVariable),

    #[error("execution step limit exceeded ({0})")]
    StepLimit(usize),

    #[error("operand stack limit exceeded ({0})")]
    StackLimit(usize),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}
