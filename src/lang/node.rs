/// Abstract Syntax Tree node handed over by the external parser.
///
/// Each `Node` is one expression of the source program. Pass 1 of the
/// lowering pipeline pattern-matches on these and never mutates them.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // ───────────────────────────── Literals ─────────────────────────────
    /// Integer literal: `(lit 42)`.
    Int(i64),

    /// String literal: `(str "hi")`.
    Str(String),

    /// Symbol literal: `(sym name)`.
    Sym(String),

    /// `(nil)`
    Nil,

    /// `(true)`
    True,

    /// `(false)`
    False,

    /// The current receiver: `(self)`.
    SelfRef,

    // ───────────────────────────── Variables ────────────────────────────
    /// Local variable read: `(lvar x)`.
    Lvar(String),

    /// Local variable assignment: `(lasgn x EXPR)`.
    Lasgn(String, Box<Node>),

    /// Global variable read: `(gvar $x)`.
    Gvar(String),

    /// Global variable assignment: `(gasgn $x EXPR)`.
    Gasgn(String, Box<Node>),

    // ─────────────────────────────── Calls ──────────────────────────────
    /// Method call: `(call RECV name ARGS...)`, optionally with a block
    /// when wrapped in `(iter ...)`.
    Call {
        receiver: Option<Box<Node>>,
        name: String,
        args: Vec<Node>,
        block: Option<BlockNode>,
    },

    /// `(yield ARGS...)`
    Yield(Vec<Node>),

    // ──────────────────────────── Control flow ──────────────────────────
    /// `(if COND THEN ELSE)`; missing branches evaluate to nil.
    If {
        condition: Box<Node>,
        then_branch: Option<Box<Node>>,
        else_branch: Option<Box<Node>>,
    },

    /// `(while COND BODY...)`
    While {
        condition: Box<Node>,
        body: Vec<Node>,
    },

    /// Short-circuit `(and A B)`.
    And(Box<Node>, Box<Node>),

    /// Short-circuit `(or A B)`.
    Or(Box<Node>, Box<Node>),

    /// `(not A)`
    Not(Box<Node>),

    /// Sequence of expressions; evaluates to the last one.
    Block(Vec<Node>),

    /// `(return [EXPR])`
    Return(Option<Box<Node>>),

    /// `(break)`
    Break,

    /// `(next [EXPR])`
    Next(Option<Box<Node>>),

    // ──────────────────────────── Definitions ───────────────────────────
    /// Method definition: `(defn name (args a b) BODY...)`.
    Def {
        name: String,
        params: Vec<String>,
        body: Vec<Node>,
    },
}

/// A literal block attached to a call: `(iter CALL (args a) BODY...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub params: Vec<String>,
    pub body: Vec<Node>,
}

impl Node {
    /// Short name of the node kind, used in lowering diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Int(_) => "lit",
            Node::Str(_) => "str",
            Node::Sym(_) => "sym",
            Node::Nil => "nil",
            Node::True => "true",
            Node::False => "false",
            Node::SelfRef => "self",
            Node::Lvar(_) => "lvar",
            Node::Lasgn(..) => "lasgn",
            Node::Gvar(_) => "gvar",
            Node::Gasgn(..) => "gasgn",
            Node::Call { block: None, .. } => "call",
            Node::Call { block: Some(_), .. } => "iter",
            Node::Yield(_) => "yield",
            Node::If { .. } => "if",
            Node::While { .. } => "while",
            Node::And(..) => "and",
            Node::Or(..) => "or",
            Node::Not(_) => "not",
            Node::Block(_) => "block",
            Node::Return(_) => "return",
            Node::Break => "break",
            Node::Next(_) => "next",
            Node::Def { .. } => "defn",
        }
    }
}
