use serde::{Deserialize, Serialize};

use crate::ir::scope::ScopeId;

// =============================================================================
// OP - IR instructions
// =============================================================================

/// Which construct an `End` closes. Checked by `fetch_block` when the caller
/// expects a particular block to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockLabel {
    If,
    While,
    Def,
    Block,
}

impl std::fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BlockLabel::If => "if",
            BlockLabel::While => "while",
            BlockLabel::Def => "def",
            BlockLabel::Block => "block",
        };
        write!(f, "{}", s)
    }
}

/// Instruction tags that can end a `fetch_block` scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Else,
    WhileBody,
    End,
}

impl std::fmt::Display for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Terminator::Else => "ELSE",
            Terminator::WhileBody => "WHILE_BODY",
            Terminator::End => "END",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // literals
    PushInt(i64),
    PushString(String),
    PushSymbol(String),
    PushNil,
    PushTrue,
    PushFalse,
    PushSelf,

    // stack ops
    Pop,
    Dup,

    // variables
    VariableGet {
        name: String,
    },
    /// ( value -- ). `local_only` binds in the innermost scope without
    /// searching enclosing blocks (parameter binding).
    VariableSet {
        name: String,
        local_only: bool,
    },
    GlobalGet {
        name: String,
    },
    GlobalSet {
        name: String,
    },

    // arguments of the current call frame
    /// Raise `ArgumentError` unless exactly `expected` arguments were passed.
    CheckArgs {
        expected: usize,
    },
    /// Push argument `index`, or nil when the caller passed fewer.
    PushArg(usize),

    // calls
    /// ( [receiver] args... [block] -- result )
    Send {
        message: String,
        argc: usize,
        receiver: bool,
        with_block: bool,
    },
    /// ( args... -- result )
    Yield {
        argc: usize,
    },

    // ==========================================================================
    // Structured blocks: every opener is closed by `End(label)`
    // ==========================================================================
    /// ( cond -- ). Then-branch runs up to `Else`, else-branch up to `End(If)`.
    If,
    Else,
    /// Condition runs up to `WhileBody`, body up to `End(While)`.
    While,
    WhileBody,
    /// Body runs up to `End(Def)`; `body_scope` is the method's lexical scope.
    DefineMethod {
        name: String,
        body_scope: ScopeId,
    },
    /// ( -- proc ). Body runs up to `End(Block)`.
    DefineBlock {
        body_scope: ScopeId,
    },
    End(BlockLabel),

    // control signals
    /// ( value -- ) return from the current method.
    Return,
    Break,
    /// Without a value: continue the innermost loop. With a value:
    /// ( value -- ) finish the current block invocation.
    Next {
        with_value: bool,
    },
    Halt,

    SetVisibility(Visibility),
}

impl Op {
    /// The block this instruction opens, if any.
    pub fn opens_block(&self) -> Option<BlockLabel> {
        match self {
            Op::If => Some(BlockLabel::If),
            Op::While => Some(BlockLabel::While),
            Op::DefineMethod { .. } => Some(BlockLabel::Def),
            Op::DefineBlock { .. } => Some(BlockLabel::Block),
            _ => None,
        }
    }

    pub fn terminator(&self) -> Option<Terminator> {
        match self {
            Op::Else => Some(Terminator::Else),
            Op::WhileBody => Some(Terminator::WhileBody),
            Op::End(_) => Some(Terminator::End),
            _ => None,
        }
    }

    /// Label of an `End`.
    pub fn label(&self) -> Option<BlockLabel> {
        match self {
            Op::End(label) => Some(*label),
            _ => None,
        }
    }

    /// Pushes a constant with no side effects.
    pub fn is_pure_push(&self) -> bool {
        matches!(
            self,
            Op::PushInt(_)
                | Op::PushString(_)
                | Op::PushSymbol(_)
                | Op::PushNil
                | Op::PushTrue
                | Op::PushFalse
                | Op::PushSelf
        )
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::PushInt(n) => write!(f, "PUSH_INT        {}", n),
            Op::PushString(s) => write!(f, "PUSH_STRING     {:?}", s),
            Op::PushSymbol(s) => write!(f, "PUSH_SYMBOL     :{}", s),
            Op::PushNil => write!(f, "PUSH_NIL"),
            Op::PushTrue => write!(f, "PUSH_TRUE"),
            Op::PushFalse => write!(f, "PUSH_FALSE"),
            Op::PushSelf => write!(f, "PUSH_SELF"),
            Op::Pop => write!(f, "POP"),
            Op::Dup => write!(f, "DUP"),
            Op::VariableGet { name } => write!(f, "VARIABLE_GET    {}", name),
            Op::VariableSet { name, local_only } => {
                write!(f, "VARIABLE_SET    {}", name)?;
                if *local_only {
                    write!(f, " (local)")?;
                }
                Ok(())
            }
            Op::GlobalGet { name } => write!(f, "GLOBAL_GET      {}", name),
            Op::GlobalSet { name } => write!(f, "GLOBAL_SET      {}", name),
            Op::CheckArgs { expected } => write!(f, "CHECK_ARGS      {}", expected),
            Op::PushArg(i) => write!(f, "PUSH_ARG        {}", i),
            Op::Send {
                message,
                argc,
                receiver,
                with_block,
            } => {
                write!(f, "SEND            {} argc={}", message, argc)?;
                if *receiver {
                    write!(f, " receiver")?;
                }
                if *with_block {
                    write!(f, " block")?;
                }
                Ok(())
            }
            Op::Yield { argc } => write!(f, "YIELD           argc={}", argc),
            Op::If => write!(f, "IF"),
            Op::Else => write!(f, "ELSE"),
            Op::While => write!(f, "WHILE"),
            Op::WhileBody => write!(f, "WHILE_BODY"),
            Op::DefineMethod { name, body_scope } => {
                write!(f, "DEFINE_METHOD   {} scope={}", name, body_scope)
            }
            Op::DefineBlock { body_scope } => write!(f, "DEFINE_BLOCK    scope={}", body_scope),
            Op::End(label) => write!(f, "END             {}", label),
            Op::Return => write!(f, "RETURN"),
            Op::Break => write!(f, "BREAK"),
            Op::Next { with_value } => {
                if *with_value {
                    write!(f, "NEXT            value")
                } else {
                    write!(f, "NEXT")
                }
            }
            Op::Halt => write!(f, "HALT"),
            Op::SetVisibility(Visibility::Public) => write!(f, "SET_VISIBILITY  public"),
            Op::SetVisibility(Visibility::Private) => write!(f, "SET_VISIBILITY  private"),
        }
    }
}

/// One IR instruction: an op plus the lexical scope active where pass 1
/// emitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Op,
    pub scope: ScopeId,
}

impl Instruction {
    pub fn new(op: Op, scope: ScopeId) -> Self {
        Self { op, scope }
    }
}
