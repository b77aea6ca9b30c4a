use std::path::PathBuf;

use thiserror::Error;

use crate::{
    codegen::{codegen_error::CodegenError, toolchain::ToolchainError},
    frontend::read_error::ReadError,
    ir::structural_error::StructuralError,
    pipeline::PipelineError,
    runtime::runtime_error::VmError,
};

/// Any failure between reading an AST file and finishing a run or build.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}: {source}", path.display())]
    Read { path: PathBuf, source: ReadError },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Vm(#[from] VmError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{}: invalid IR file: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: postcard::Error,
    },

    #[error("could not encode IR: {0}")]
    Encode(#[source] postcard::Error),

    #[error("could not start the interpreter thread: {0}")]
    Thread(#[source] std::io::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}
