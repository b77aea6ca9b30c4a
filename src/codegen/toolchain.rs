//! Turning a translation unit into a native executable with the system C
//! compiler.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
};

use thiserror::Error;
use tracing::{debug, info};

use crate::codegen::unit::TranslationUnit;

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("C compilation failed:\n{stderr}")]
    Compile { stderr: String },

    #[error("linking failed:\n{stderr}")]
    Link { stderr: String },

    #[error("could not write {}: {io}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        io: std::io::Error,
    },

    #[error("could not run '{program}': {io}")]
    Spawn {
        program: String,
        #[source]
        io: std::io::Error,
    },
}

/// Something that can build an executable from a generated unit.
pub trait Toolchain {
    fn build(&self, unit: &TranslationUnit, output: &Path) -> Result<(), ToolchainError>;
}

/// The host C compiler, driven as `cc -c` followed by a link step.
#[derive(Debug, Clone)]
pub struct SystemCc {
    pub compiler: String,
    pub flags: Vec<String>,
}

impl Default for SystemCc {
    fn default() -> Self {
        SystemCc {
            compiler: std::env::var("CC").unwrap_or_else(|_| "cc".to_string()),
            flags: vec!["-std=c99".to_string(), "-O2".to_string()],
        }
    }
}

impl SystemCc {
    pub fn with_compiler(compiler: impl Into<String>) -> Self {
        SystemCc {
            compiler: compiler.into(),
            ..SystemCc::default()
        }
    }

    /// Whether the compiler can be started at all.
    pub fn available(&self) -> bool {
        Command::new(&self.compiler)
            .arg("--version")
            .output()
            .is_ok_and(|output| output.status.success())
    }

    fn run(&self, args: &[&OsStr]) -> Result<std::process::Output, ToolchainError> {
        debug!(compiler = %self.compiler, ?args, "invoking C compiler");
        Command::new(&self.compiler)
            .args(&self.flags)
            .args(args)
            .output()
            .map_err(|io| ToolchainError::Spawn {
                program: self.compiler.clone(),
                io,
            })
    }
}

/// `<output>.<extension>`, keeping any extension `output` already has.
fn sibling(output: &Path, extension: &str) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

impl Toolchain for SystemCc {
    fn build(&self, unit: &TranslationUnit, output: &Path) -> Result<(), ToolchainError> {
        let source_path = sibling(output, "c");
        let object_path = sibling(output, "o");
        let source = unit.render();
        std::fs::write(&source_path, &source).map_err(|io| ToolchainError::Write {
            path: source_path.clone(),
            io,
        })?;

        let compiled = self.run(&[
            OsStr::new("-c"),
            source_path.as_os_str(),
            OsStr::new("-o"),
            object_path.as_os_str(),
        ]);
        let _ = std::fs::remove_file(&source_path);
        let compiled = compiled?;
        if !compiled.status.success() {
            return Err(ToolchainError::Compile {
                stderr: String::from_utf8_lossy(&compiled.stderr).into_owned(),
            });
        }

        let linked = self.run(&[object_path.as_os_str(), OsStr::new("-o"), output.as_os_str()]);
        let _ = std::fs::remove_file(&object_path);
        let linked = linked?;
        if !linked.status.success() {
            return Err(ToolchainError::Link {
                stderr: String::from_utf8_lossy(&linked.stderr).into_owned(),
            });
        }

        info!(output = %output.display(), bytes = source.len(), "built native executable");
        Ok(())
    }
}
