pub mod builtins;
pub mod frame;
pub mod runtime_error;
pub mod scope;
pub mod vm;

pub use runtime_error::{ExceptionClass, RuntimeError, VmError};
pub use vm::{Exit, Vm, VmConfig};
