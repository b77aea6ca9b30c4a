//! `cinder` command line.
//!
//! Usage: `cinder [OPTIONS] <FILE>`. By default the program is interpreted;
//! `--compile` builds a native executable instead.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{self, Command};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cinder::{
    Error,
    codegen::{
        self, CodegenConfig,
        toolchain::{SystemCc, Toolchain},
    },
    driver,
    ir::program::Program,
    pipeline::{PipelineOptions, PipelineOutput},
    runtime::{Exit, Vm, VmConfig, VmError},
};

/// Deep user recursion runs on the host stack of the interpreter thread.
const VM_THREAD_STACK: usize = 256 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "cinder")]
#[command(about = "Lower a Ruby-like AST and run it on a VM or compile it to C")]
struct Args {
    /// AST file (S-expression), or an IR file with --load-ir
    file: PathBuf,

    /// Build a native executable instead of interpreting
    #[arg(short, long)]
    compile: bool,

    /// Executable path for --compile (default: FILE without extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the generated C source to PATH and stop
    #[arg(long, value_name = "PATH")]
    emit_c: Option<PathBuf>,

    /// Print the instruction listing after pass N (1-4) and stop
    #[arg(long, value_name = "N")]
    dump_pass: Option<u8>,

    /// Write the lowered program to PATH and stop
    #[arg(long, value_name = "PATH")]
    emit_ir: Option<PathBuf>,

    /// FILE is a lowered program written by --emit-ir
    #[arg(long)]
    load_ir: bool,

    /// Print the program's final value as `=> value`
    #[arg(long)]
    echo: bool,

    /// Nesting limit for method and block calls
    #[arg(long, default_value_t = 1000)]
    max_call_depth: usize,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let args = Args::parse();

    if let Err(e) = run(args) {
        if let Error::Vm(VmError::Runtime(runtime)) = &e {
            debug!("backtrace:\n{}", runtime.backtrace());
        }
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Error> {
    let program = if args.load_ir {
        driver::load_ir(&args.file, args.echo)?
    } else {
        let options = PipelineOptions {
            used: args.echo,
            dump_pass: args.dump_pass,
        };
        match driver::load_source(&args.file, options)? {
            PipelineOutput::Lowered(program) => program,
            PipelineOutput::Dumped(listing) => {
                print!("{}", listing);
                return Ok(());
            }
        }
    };

    if let Some(path) = &args.emit_ir {
        return driver::save_ir(&program, path);
    }

    let codegen_config = CodegenConfig {
        max_call_depth: args.max_call_depth,
        echo_result: args.echo,
    };

    if let Some(path) = &args.emit_c {
        let unit = codegen::generate(&program, codegen_config)?;
        std::fs::write(path, unit.render()).map_err(Error::io(path))?;
        info!(path = %path.display(), "wrote C source");
        return Ok(());
    }

    if args.compile {
        let output = args
            .output
            .clone()
            .unwrap_or_else(|| default_output(&args.file));
        let unit = codegen::generate(&program, codegen_config)?;
        SystemCc::default().build(&unit, &output)?;
        return run_native(&output);
    }

    let config = VmConfig {
        max_call_depth: args.max_call_depth,
        ..VmConfig::default()
    };
    interpret_on_big_stack(program, config, args.echo)
}

/// Runs a built executable in place of this process's own exit status.
fn run_native(executable: &Path) -> Result<(), Error> {
    // A bare file name would be looked up on PATH.
    let executable = if executable.is_relative() {
        Path::new(".").join(executable)
    } else {
        executable.to_path_buf()
    };
    let status = Command::new(&executable)
        .status()
        .map_err(Error::io(&executable))?;
    debug!(%status, "native program finished");
    if !status.success() {
        process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}

fn default_output(file: &Path) -> PathBuf {
    let stem = file.with_extension("");
    if stem == file {
        file.with_extension("out")
    } else {
        stem
    }
}

fn interpret_on_big_stack(program: Program, config: VmConfig, echo: bool) -> Result<(), Error> {
    let handle = std::thread::Builder::new()
        .name("cinder-vm".to_string())
        .stack_size(VM_THREAD_STACK)
        .spawn(move || interpret(&program, config, echo))
        .map_err(Error::Thread)?;

    match handle.join() {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn interpret(program: &Program, config: VmConfig, echo: bool) -> Result<(), Error> {
    let stdout = std::io::stdout();
    let mut vm = Vm::with_config(config, stdout.lock());
    let exit = vm.run(program)?;

    if let Exit::Finished(Some(value)) = exit {
        if echo {
            let mut out = vm.into_output();
            writeln!(out, "=> {}", value.inspect()).map_err(VmError::Io)?;
            out.flush().map_err(VmError::Io)?;
        }
    }
    Ok(())
}
