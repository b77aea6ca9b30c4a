//! `cinder`: a back end for a Ruby-like language.
//!
//! An AST (read from its S-expression form) is lowered through four passes
//! into a flat instruction stream, which can then be interpreted by the
//! stack VM or translated into a C program and built natively.
//!
//! ```text
//! frontend ──> pipeline ──> ir::Program ──┬──> runtime::Vm
//!                                         └──> codegen ──> toolchain
//! ```

pub mod codegen;
pub mod driver;
pub mod error;
pub mod frontend;
pub mod ir;
pub mod lang;
pub mod pipeline;
pub mod runtime;


pub use error::Error;
