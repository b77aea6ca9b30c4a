//! File-level entry points shared by the binary and the end-to-end tests.

use std::path::Path;

use tracing::info;

use crate::{
    error::Error,
    frontend::read_source,
    ir::{program::Program, structural_error::Stage},
    pipeline::{Pipeline, PipelineOptions, PipelineOutput, verify},
};

/// Reads an AST file and runs the pipeline over it.
pub fn load_source(path: &Path, options: PipelineOptions) -> Result<PipelineOutput, Error> {
    let source = std::fs::read_to_string(path).map_err(Error::io(path))?;
    let ast = read_source(&source).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Pipeline::new(options).run(&ast)?)
}

/// Reads a program written by `save_ir`. Scope references and the stream
/// are verified again, since the file may not come from this pipeline.
pub fn load_ir(path: &Path, used: bool) -> Result<Program, Error> {
    let bytes = std::fs::read(path).map_err(Error::io(path))?;
    let program = Program::decode(&bytes).map_err(|source| Error::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    program.validate().map_err(|e| e.in_stage(Stage::Pass(4)))?;
    verify::verify(&program.stream(), usize::from(used))
        .map_err(|e| e.in_stage(Stage::Pass(4)))?;
    info!(
        path = %path.display(),
        instructions = program.instructions.len(),
        "loaded IR"
    );
    Ok(program)
}

pub fn save_ir(program: &Program, path: &Path) -> Result<(), Error> {
    let bytes = program.encode().map_err(Error::Encode)?;
    std::fs::write(path, bytes).map_err(Error::io(path))?;
    info!(path = %path.display(), "wrote IR");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::scope::ScopeTree;
    use crate::pipeline::lower_program;

    #[test]
    fn test_saved_ir_loads_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.cir");
        let ast = read_source("(call nil puts (lit 1))").unwrap();
        let program = lower_program(&ast, false).unwrap();

        save_ir(&program, &path).unwrap();
        let loaded = load_ir(&path, false).unwrap();
        assert_eq!(loaded.instructions, program.instructions);
    }

    #[test]
    fn test_loading_with_wrong_final_height_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.cir");
        let ast = read_source("(lit 1)").unwrap();
        let program = lower_program(&ast, true).unwrap();

        save_ir(&program, &path).unwrap();
        let err = load_ir(&path, false).unwrap_err();
        assert!(matches!(err, Error::Structural(_)));
    }

    #[test]
    fn test_loading_with_missing_scopes_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.cir");
        let ast = read_source("(defn id (args n) (lvar n)) (call nil id (lit 1))").unwrap();
        let mut program = lower_program(&ast, false).unwrap();
        program.scopes = ScopeTree::new();

        save_ir(&program, &path).unwrap();
        match load_ir(&path, false).unwrap_err() {
            Error::Structural(err) => {
                assert_eq!(err.stage, Some(Stage::Pass(4)));
                assert!(err.message.starts_with("unknown scope"), "{}", err);
            }
            other => panic!("expected a structural error, got {}", other),
        }
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let err = load_source(Path::new("/nonexistent/cinder.sexp"), PipelineOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_read_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.sexp");
        std::fs::write(&path, "(call nil puts").unwrap();
        let err = load_source(&path, PipelineOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
