//! Translation of a lowered program into one C99 translation unit.
//!
//! The generator walks the same `InstructionStream` the VM executes and
//! keeps a symbolic operand stack (`GenScope`) instead of a real one. Each
//! method and block body becomes its own C function; conditionals and loops
//! become structured C with their operand stacks reconciled by
//! `normalize_stack`.

pub mod codegen_error;
pub mod gen_scope;
pub mod intern;
pub mod toolchain;
pub mod unit;

use std::convert::Infallible;

use tracing::debug;

use crate::ir::{
    op::{BlockLabel, Instruction, Op, Terminator, Visibility},
    program::Program,
    scope::{ScopeId, ScopeTree},
    stream::InstructionStream,
    structural_error::{Stage, StructuralError},
};
use codegen_error::CodegenError;
use gen_scope::{Branch, GenScope, Operand, Temps, normalize_stack};
use intern::InternTable;
use unit::{CFunction, FunctionKind, MAIN_FUNCTION, TranslationUnit, mangle};

#[derive(Debug, Clone)]
pub struct CodegenConfig {
    /// Compiled into the unit; matches `VmConfig::max_call_depth`.
    pub max_call_depth: usize,
    /// Print `=> <inspect>` of the program's value on exit.
    pub echo_result: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        CodegenConfig {
            max_call_depth: 1000,
            echo_result: false,
        }
    }
}

/// State shared by every function of one unit.
#[derive(Debug, Default)]
struct GenContext {
    symbols: InternTable,
    strings: InternTable,
    temps: Temps,
    functions: Vec<CFunction>,
    next_function: usize,
}

impl GenContext {
    fn function_name(&mut self, prefix: &str, name: &str) -> String {
        let n = self.next_function;
        self.next_function += 1;
        format!("{}{}_{}", prefix, n, mangle(name))
    }
}

fn structural(index: usize, message: impl Into<String>) -> CodegenError {
    StructuralError::new(index, message)
        .in_stage(Stage::Codegen)
        .into()
}

fn in_codegen(err: StructuralError) -> CodegenError {
    err.in_stage(Stage::Codegen).into()
}

pub struct CodeGenerator<'p> {
    scopes: &'p ScopeTree,
    config: CodegenConfig,
    ctx: GenContext,
}

impl<'p> CodeGenerator<'p> {
    pub fn new(program: &'p Program, config: CodegenConfig) -> Self {
        Self {
            scopes: &program.scopes,
            config,
            ctx: GenContext::default(),
        }
    }

    /// Translates `program` into a complete unit.
    pub fn generate(mut self, program: &Program) -> Result<TranslationUnit, CodegenError> {
        let mut stream = program.stream();
        let main = self.with_new_scope(
            FunctionKind::Main,
            MAIN_FUNCTION.to_string(),
            ScopeId::ROOT,
            &mut stream,
        )?;

        debug!(
            functions = self.ctx.functions.len() + 1,
            symbols = self.ctx.symbols.len(),
            strings = self.ctx.strings.len(),
            "generated unit"
        );

        Ok(TranslationUnit {
            max_call_depth: self.config.max_call_depth,
            echo_result: self.config.echo_result,
            symbols: self.ctx.symbols.entries().to_vec(),
            strings: self.ctx.strings.entries().to_vec(),
            functions: self.ctx.functions,
            main,
        })
    }

    // ========================================================================
    // Regions
    // ========================================================================

    /// Translates a whole body into a standalone C function. The value the
    /// body leaves on top of the stack is returned; the top level may leave
    /// nothing, in which case it returns nil.
    fn with_new_scope(
        &mut self,
        kind: FunctionKind,
        name: String,
        body_scope: ScopeId,
        stream: &mut InstructionStream,
    ) -> Result<CFunction, CodegenError> {
        let mut scope = GenScope::new();
        self.gen_stream(&mut scope, stream)?;

        let result = match (kind, scope.stack.pop()) {
            (_, Some(value)) => value,
            (FunctionKind::Main, None) => Operand::Literal("rt_nil()".to_string()),
            (_, None) => {
                return Err(structural(
                    stream.current_index(),
                    format!("{} left no value", name),
                ));
            }
        };
        scope.emit(format!("return {};", result));

        Ok(CFunction {
            name,
            kind,
            env_size: self.scopes.get(body_scope).vars.len(),
            body: scope.into_branch().code,
        })
    }

    /// Translates a region that shares its enclosing function: a branch arm,
    /// a loop condition or a loop body.
    fn with_same_scope(
        &mut self,
        scope: &GenScope,
        mut stream: InstructionStream,
    ) -> Result<Branch, CodegenError> {
        let mut inner = scope.fork();
        self.gen_stream(&mut inner, &mut stream)?;
        Ok(inner.into_branch())
    }

    fn gen_stream(
        &mut self,
        scope: &mut GenScope,
        stream: &mut InstructionStream,
    ) -> Result<(), CodegenError> {
        let _: Option<Infallible> = stream.walk(|s, instruction| {
            self.gen_instruction(scope, s, instruction)?;
            Ok::<_, CodegenError>(None)
        })?;
        Ok(())
    }

    // ========================================================================
    // Instructions
    // ========================================================================

    fn gen_instruction(
        &mut self,
        scope: &mut GenScope,
        stream: &mut InstructionStream,
        instruction: &Instruction,
    ) -> Result<(), CodegenError> {
        let index = stream.current_index();

        match &instruction.op {
            // Literals
            Op::PushInt(n) => {
                if *n == i64::MIN {
                    scope.push_literal("rt_int(INT64_MIN)");
                } else {
                    scope.push_literal(format!("rt_int(INT64_C({}))", n));
                }
            }
            Op::PushString(s) => {
                let k = self.ctx.strings.intern(s);
                scope.push_literal(format!("rt_str({})", k));
            }
            Op::PushSymbol(s) => {
                let k = self.ctx.symbols.intern(s);
                scope.push_literal(format!("rt_sym({})", k));
            }
            Op::PushNil => scope.push_literal("rt_nil()"),
            Op::PushTrue => scope.push_literal("rt_bool(1)"),
            Op::PushFalse => scope.push_literal("rt_bool(0)"),
            Op::PushSelf => scope.push_literal("self"),

            // Stack operations
            Op::Pop => scope.pop_discard(index)?,
            Op::Dup => {
                let top = scope.peek(index)?.clone();
                scope.push(top);
            }

            // Variables
            Op::VariableGet { name } => {
                let slot = self.variable(instruction, name, false)?;
                scope.memoize(&mut self.ctx.temps, slot);
            }
            Op::VariableSet { name, local_only } => {
                let value = scope.pop(index)?;
                let slot = self.variable(instruction, name, *local_only)?;
                scope.emit(format!("{} = {};", slot, value));
            }
            Op::GlobalGet { name } => {
                let k = self.ctx.symbols.intern(name);
                scope.memoize(&mut self.ctx.temps, format!("rt_globals[{}]", k));
            }
            Op::GlobalSet { name } => {
                let value = scope.pop(index)?;
                let k = self.ctx.symbols.intern(name);
                scope.emit(format!("rt_globals[{}] = {};", k, value));
            }

            // Arguments
            Op::CheckArgs { expected } => {
                scope.emit(format!("rt_check_args(argc, {});", expected));
            }
            Op::PushArg(i) => scope.push_literal(format!("rt_arg(argc, args, {})", i)),

            // Calls
            Op::Send {
                message,
                argc,
                receiver,
                with_block,
            } => {
                let block = if *with_block {
                    scope.pop(index)?.to_string()
                } else {
                    "rt_nil()".to_string()
                };
                let args = scope.pop_n(*argc, index)?;
                let receiver_code = if *receiver {
                    scope.pop(index)?.to_string()
                } else {
                    "self".to_string()
                };
                let k = self.ctx.symbols.intern(message);
                let expr = format!(
                    "rt_send({}, {}, {} /* {} */, {}, {}, {})",
                    receiver_code,
                    u8::from(*receiver),
                    k,
                    c_comment(message),
                    argc,
                    arg_array(&args),
                    block
                );
                scope.memoize(&mut self.ctx.temps, expr);
            }
            Op::Yield { argc } => {
                let args = scope.pop_n(*argc, index)?;
                let expr = format!("rt_yield(blk, {}, {})", argc, arg_array(&args));
                scope.memoize(&mut self.ctx.temps, expr);
            }

            // Structured blocks
            Op::If => {
                let condition = scope.pop(index)?;
                let then_body = stream
                    .fetch_block(Terminator::Else, None)
                    .map_err(in_codegen)?;
                let else_body = stream
                    .fetch_block(Terminator::End, Some(BlockLabel::If))
                    .map_err(in_codegen)?;

                let mut branches = [
                    self.with_same_scope(scope, then_body)?,
                    self.with_same_scope(scope, else_body)?,
                ];
                let (merged, stack) =
                    normalize_stack(&mut self.ctx.temps, &scope.stack, &mut branches);
                let [then_branch, else_branch] = branches;

                for temp in &merged {
                    scope.emit(format!("Value {} = rt_nil();", temp));
                }
                scope.emit(format!("if (rt_truthy({})) {{", condition));
                scope.emit_nested(then_branch.code);
                scope.emit("} else {");
                scope.emit_nested(else_branch.code);
                scope.emit("}");
                scope.stack = stack;
            }
            Op::While => {
                let condition_body = stream
                    .fetch_block(Terminator::WhileBody, None)
                    .map_err(in_codegen)?;
                let loop_body = stream
                    .fetch_block(Terminator::End, Some(BlockLabel::While))
                    .map_err(in_codegen)?;

                let mut condition = self.with_same_scope(scope, condition_body)?;
                let test = condition
                    .stack
                    .pop()
                    .ok_or_else(|| in_codegen(StructuralError::out_of_stack(index)))?;
                let body = self.with_same_scope(scope, loop_body)?;

                scope.emit("while (1) {");
                scope.emit_nested(condition.code);
                scope.emit(format!("    if (!rt_truthy({})) break;", test));
                scope.emit_nested(body.code);
                scope.emit("}");
            }
            Op::DefineMethod { name, body_scope } => {
                let mut body = stream
                    .fetch_block(Terminator::End, Some(BlockLabel::Def))
                    .map_err(in_codegen)?;
                let function_name = self.ctx.function_name("m", name);
                let function = self.with_new_scope(
                    FunctionKind::Method,
                    function_name,
                    *body_scope,
                    &mut body,
                )?;
                let k = self.ctx.symbols.intern(name);
                scope.emit(format!("rt_define_method({}, {});", k, function.name));
                self.ctx.functions.push(function);
                scope.push_literal(format!("rt_sym({})", k));
            }
            Op::DefineBlock { body_scope } => {
                let mut body = stream
                    .fetch_block(Terminator::End, Some(BlockLabel::Block))
                    .map_err(in_codegen)?;
                let function_name = self.ctx.function_name("b", "block");
                let function = self.with_new_scope(
                    FunctionKind::Block,
                    function_name,
                    *body_scope,
                    &mut body,
                )?;
                let expr = format!("rt_proc(rt_closure_new({}, env, self, blk))", function.name);
                self.ctx.functions.push(function);
                scope.memoize(&mut self.ctx.temps, expr);
            }
            Op::Else | Op::WhileBody | Op::End(_) => {
                return Err(structural(
                    index,
                    format!("unexpected {} outside its block", instruction.op),
                ));
            }

            // Control
            Op::Return => {
                let value = scope.pop(index)?;
                scope.emit(format!("return {};", value));
            }
            Op::Break => scope.emit("break;"),
            Op::Next { with_value: false } => scope.emit("continue;"),
            Op::Next { with_value: true } => {
                let value = scope.pop(index)?;
                scope.emit(format!("return {};", value));
            }
            Op::Halt => scope.emit("rt_exit();"),
            Op::SetVisibility(Visibility::Public) => scope.emit("rt_visibility = RT_PUBLIC;"),
            Op::SetVisibility(Visibility::Private) => scope.emit("rt_visibility = RT_PRIVATE;"),
        }

        Ok(())
    }

    /// C lvalue of the storage `name` binds to from `instruction`'s scope.
    fn variable(
        &self,
        instruction: &Instruction,
        name: &str,
        local_only: bool,
    ) -> Result<String, CodegenError> {
        let resolved = self.scopes.resolve(instruction.scope, name, local_only)?;
        let env = if resolved.depth == 0 {
            "env".to_string()
        } else {
            format!("rt_env_at(env, {})", resolved.depth)
        };
        Ok(format!(
            "{}->vars[{}] /* {} */",
            env,
            resolved.slot.index,
            c_comment(name)
        ))
    }
}

/// `(Value[]){a, b}`, or `NULL` for no arguments.
fn arg_array(args: &[Operand]) -> String {
    if args.is_empty() {
        return "NULL".to_string();
    }
    let items: Vec<&str> = args.iter().map(Operand::code).collect();
    format!("(Value[]){{{}}}", items.join(", "))
}

fn c_comment(text: &str) -> String {
    text.replace("*/", "* /")
}

/// Generates the C source for `program`.
pub fn generate(program: &Program, config: CodegenConfig) -> Result<TranslationUnit, CodegenError> {
    CodeGenerator::new(program, config).generate(program)
}
