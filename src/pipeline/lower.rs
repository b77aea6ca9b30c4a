//! Pass 1: AST to instruction stream.
//!
//! Every expression lowers to code that leaves exactly one value on the
//! operand stack; statement sequences pop all but the last. Later passes
//! clean up the resulting push/pop pairs.

use tracing::trace;

use crate::{
    ir::{
        op::{BlockLabel, Instruction, Op, Visibility},
        scope::{ScopeId, ScopeKind, ScopeTree},
    },
    lang::node::{BlockNode, Node},
    pipeline::lower_error::LowerError,
};

/// What kind of body the lowerer is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Top,
    Method,
    Block,
}

pub struct Lowerer {
    instructions: Vec<Instruction>,
    scopes: ScopeTree,

    /// Scope attached to every emitted instruction
    scope: ScopeId,

    body: BodyKind,

    /// Enclosing `while` loops within the current body
    loops: usize,
}

impl Default for Lowerer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lowerer {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            scopes: ScopeTree::new(),
            scope: ScopeId::ROOT,
            body: BodyKind::Top,
            loops: 0,
        }
    }

    /// Lowers a whole program. With `used` the program's final value is
    /// left on the stack (for echoing); otherwise it is popped.
    pub fn lower_program(
        mut self,
        ast: &Node,
        used: bool,
    ) -> Result<(Vec<Instruction>, ScopeTree), LowerError> {
        self.lower_node(ast)?;
        if !used {
            self.emit(Op::Pop);
        }
        Ok((self.instructions, self.scopes))
    }

    fn emit(&mut self, op: Op) {
        self.instructions.push(Instruction::new(op, self.scope));
    }

    /// Runs `f` inside a fresh hoisting scope (conditional and loop bodies).
    fn in_hoisted<F>(&mut self, f: F) -> Result<(), LowerError>
    where
        F: FnOnce(&mut Self) -> Result<(), LowerError>,
    {
        let saved = self.scope;
        self.scope = self.scopes.push(saved, ScopeKind::Hoisted);
        let result = f(self);
        self.scope = saved;
        result
    }

    /// Runs `f` as the body of a method or block owning `scope`.
    fn in_body<F>(&mut self, scope: ScopeId, body: BodyKind, f: F) -> Result<(), LowerError>
    where
        F: FnOnce(&mut Self) -> Result<(), LowerError>,
    {
        let saved = (self.scope, self.body, self.loops);
        self.scope = scope;
        self.body = body;
        self.loops = 0;
        let result = f(self);
        (self.scope, self.body, self.loops) = saved;
        result
    }

    /// Lowers a statement sequence; an empty one evaluates to nil.
    fn lower_body(&mut self, nodes: &[Node]) -> Result<(), LowerError> {
        if nodes.is_empty() {
            self.emit(Op::PushNil);
            return Ok(());
        }
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                self.emit(Op::Pop);
            }
            self.lower_node(node)?;
        }
        Ok(())
    }

    fn lower_optional(&mut self, node: Option<&Node>) -> Result<(), LowerError> {
        match node {
            Some(node) => self.lower_node(node),
            None => {
                self.emit(Op::PushNil);
                Ok(())
            }
        }
    }

    /// Binds positional parameters to fresh locals of `scope`.
    fn bind_params(&mut self, scope: ScopeId, params: &[String]) {
        for (index, name) in params.iter().enumerate() {
            self.scopes.declare(scope, name);
            self.emit(Op::PushArg(index));
            self.emit(Op::VariableSet {
                name: name.clone(),
                local_only: true,
            });
        }
    }

    pub fn lower_node(&mut self, node: &Node) -> Result<(), LowerError> {
        match node {
            Node::Int(n) => self.emit(Op::PushInt(*n)),
            Node::Str(s) => self.emit(Op::PushString(s.clone())),
            Node::Sym(s) => self.emit(Op::PushSymbol(s.clone())),
            Node::Nil => self.emit(Op::PushNil),
            Node::True => self.emit(Op::PushTrue),
            Node::False => self.emit(Op::PushFalse),
            Node::SelfRef => self.emit(Op::PushSelf),

            Node::Lvar(name) => {
                if self.scopes.resolve(self.scope, name, false).is_ok() {
                    self.emit(Op::VariableGet { name: name.clone() });
                } else {
                    // Never assigned in scope: a receiver-less call.
                    self.emit(Op::Send {
                        message: name.clone(),
                        argc: 0,
                        receiver: false,
                        with_block: false,
                    });
                }
            }

            Node::Lasgn(name, value) => {
                // Declared before the right-hand side, so `x = x` reads nil.
                if self.scopes.resolve(self.scope, name, false).is_err() {
                    let (owner, slot) = self.scopes.declare(self.scope, name);
                    trace!(name = %name, scope = %owner, slot = slot.index, "declare local");
                }
                self.lower_node(value)?;
                self.emit(Op::Dup);
                self.emit(Op::VariableSet {
                    name: name.clone(),
                    local_only: false,
                });
            }

            Node::Gvar(name) => self.emit(Op::GlobalGet { name: name.clone() }),

            Node::Gasgn(name, value) => {
                self.lower_node(value)?;
                self.emit(Op::Dup);
                self.emit(Op::GlobalSet { name: name.clone() });
            }

            Node::Call {
                receiver,
                name,
                args,
                block,
            } => self.lower_call(receiver.as_deref(), name, args, block.as_ref())?,

            Node::Yield(args) => {
                for arg in args {
                    self.lower_node(arg)?;
                }
                self.emit(Op::Yield { argc: args.len() });
            }

            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.lower_node(condition)?;
                self.emit(Op::If);
                self.in_hoisted(|this| this.lower_optional(then_branch.as_deref()))?;
                self.emit(Op::Else);
                self.in_hoisted(|this| this.lower_optional(else_branch.as_deref()))?;
                self.emit(Op::End(BlockLabel::If));
            }

            Node::While { condition, body } => {
                self.emit(Op::While);
                self.in_hoisted(|this| {
                    this.loops += 1;
                    this.lower_node(condition)?;
                    this.emit(Op::WhileBody);
                    for stmt in body {
                        this.lower_node(stmt)?;
                        this.emit(Op::Pop);
                    }
                    this.loops -= 1;
                    Ok(())
                })?;
                self.emit(Op::End(BlockLabel::While));
                self.emit(Op::PushNil);
            }

            // a && b  =>  a DUP IF POP b ELSE END
            Node::And(left, right) => {
                self.lower_node(left)?;
                self.emit(Op::Dup);
                self.emit(Op::If);
                self.in_hoisted(|this| {
                    this.emit(Op::Pop);
                    this.lower_node(right)
                })?;
                self.emit(Op::Else);
                self.emit(Op::End(BlockLabel::If));
            }

            // a || b  =>  a DUP IF ELSE POP b END
            Node::Or(left, right) => {
                self.lower_node(left)?;
                self.emit(Op::Dup);
                self.emit(Op::If);
                self.emit(Op::Else);
                self.in_hoisted(|this| {
                    this.emit(Op::Pop);
                    this.lower_node(right)
                })?;
                self.emit(Op::End(BlockLabel::If));
            }

            Node::Not(operand) => {
                self.lower_node(operand)?;
                self.emit(Op::If);
                self.emit(Op::PushFalse);
                self.emit(Op::Else);
                self.emit(Op::PushTrue);
                self.emit(Op::End(BlockLabel::If));
            }

            Node::Block(nodes) => self.lower_body(nodes)?,

            Node::Return(value) => {
                if self.body == BodyKind::Block {
                    return Err(LowerError::return_in_block(node));
                }
                self.lower_optional(value.as_deref())?;
                self.emit(Op::Return);
                self.emit(Op::PushNil);
            }

            Node::Break => {
                if self.loops == 0 {
                    return Err(match self.body {
                        BodyKind::Block => LowerError::break_in_block(node),
                        _ => LowerError::break_outside_loop(node),
                    });
                }
                self.emit(Op::Break);
                self.emit(Op::PushNil);
            }

            Node::Next(value) => {
                if self.loops > 0 {
                    if let Some(value) = value {
                        self.lower_node(value)?;
                        self.emit(Op::Pop);
                    }
                    self.emit(Op::Next { with_value: false });
                } else if self.body == BodyKind::Block {
                    self.lower_optional(value.as_deref())?;
                    self.emit(Op::Next { with_value: true });
                } else {
                    return Err(LowerError::next_outside_loop(node));
                }
                self.emit(Op::PushNil);
            }

            Node::Def { name, params, body } => {
                let body_scope = self.scopes.push(self.scope, ScopeKind::Method);
                trace!(method = %name, scope = %body_scope, "lower def");
                self.emit(Op::DefineMethod {
                    name: name.clone(),
                    body_scope,
                });
                self.in_body(body_scope, BodyKind::Method, |this| {
                    this.emit(Op::CheckArgs {
                        expected: params.len(),
                    });
                    this.bind_params(body_scope, params);
                    this.lower_body(body)
                })?;
                self.emit(Op::End(BlockLabel::Def));
            }
        }
        Ok(())
    }

    fn lower_call(
        &mut self,
        receiver: Option<&Node>,
        name: &str,
        args: &[Node],
        block: Option<&BlockNode>,
    ) -> Result<(), LowerError> {
        // `self.foo` may call private methods, exactly like `foo`.
        let receiver = receiver.filter(|r| **r != Node::SelfRef);

        if receiver.is_none() && args.is_empty() && block.is_none() {
            let special = match name {
                "exit" => Some(Op::Halt),
                "public" => Some(Op::SetVisibility(Visibility::Public)),
                "private" => Some(Op::SetVisibility(Visibility::Private)),
                _ => None,
            };
            if let Some(op) = special {
                self.emit(op);
                self.emit(Op::PushNil);
                return Ok(());
            }
        }

        if let Some(receiver) = receiver {
            self.lower_node(receiver)?;
        }
        for arg in args {
            self.lower_node(arg)?;
        }

        if let Some(block) = block {
            let body_scope = self.scopes.push(self.scope, ScopeKind::Block);
            self.emit(Op::DefineBlock { body_scope });
            self.in_body(body_scope, BodyKind::Block, |this| {
                this.bind_params(body_scope, &block.params);
                this.lower_body(&block.body)
            })?;
            self.emit(Op::End(BlockLabel::Block));
        }

        self.emit(Op::Send {
            message: name.to_string(),
            argc: args.len(),
            receiver: receiver.is_some(),
            with_block: block.is_some(),
        });
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::read_source;
    use pretty_assertions::assert_eq;

    fn lower(source: &str) -> (Vec<Instruction>, ScopeTree) {
        let ast = read_source(source).unwrap();
        Lowerer::new().lower_program(&ast, false).unwrap()
    }

    fn ops(source: &str) -> Vec<Op> {
        lower(source).0.into_iter().map(|i| i.op).collect()
    }

    fn lower_err(source: &str) -> LowerError {
        let ast = read_source(source).unwrap();
        Lowerer::new().lower_program(&ast, false).unwrap_err()
    }

    fn send(message: &str, argc: usize, receiver: bool) -> Op {
        Op::Send {
            message: message.to_string(),
            argc,
            receiver,
            with_block: false,
        }
    }

    #[test]
    fn test_lower_puts_sum() {
        assert_eq!(
            ops("(call nil puts (call (lit 1) + (lit 2)))"),
            vec![
                Op::PushInt(1),
                Op::PushInt(2),
                send("+", 1, true),
                send("puts", 1, false),
                Op::Pop,
            ]
        );
    }

    #[test]
    fn test_used_keeps_final_value() {
        let ast = read_source("(lit 7)").unwrap();
        let (instructions, _) = Lowerer::new().lower_program(&ast, true).unwrap();
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].op, Op::PushInt(7));
    }

    #[test]
    fn test_undeclared_lvar_becomes_call() {
        assert_eq!(ops("(lvar foo)"), vec![send("foo", 0, false), Op::Pop]);
    }

    #[test]
    fn test_assignment_declares_in_root() {
        let (instructions, scopes) = lower("(lasgn x (lit 1)) (lvar x)");
        assert_eq!(scopes.slot_names(ScopeId::ROOT), vec!["x"]);
        assert!(instructions.iter().any(|i| i.op
            == Op::VariableGet {
                name: "x".to_string()
            }));
    }

    #[test]
    fn test_if_branches_hoist_to_method() {
        let (instructions, scopes) = lower("(if (true) (lasgn y (lit 1)) nil) (lvar y)");
        assert_eq!(scopes.slot_names(ScopeId::ROOT), vec!["y"]);
        let then_scope = instructions[2].scope;
        assert!(scopes.get(then_scope).hoist);
        assert_eq!(instructions[0].scope, ScopeId::ROOT);
    }

    #[test]
    fn test_def_binds_params() {
        let (instructions, scopes) = lower("(defn id (args n) (lvar n))");
        let ops: Vec<Op> = instructions.iter().map(|i| i.op.clone()).collect();
        let body_scope = match &ops[0] {
            Op::DefineMethod { body_scope, .. } => *body_scope,
            other => panic!("expected DEFINE_METHOD, got {}", other),
        };
        assert_eq!(
            ops[1..].to_vec(),
            vec![
                Op::CheckArgs { expected: 1 },
                Op::PushArg(0),
                Op::VariableSet {
                    name: "n".to_string(),
                    local_only: true
                },
                Op::VariableGet {
                    name: "n".to_string()
                },
                Op::End(BlockLabel::Def),
                Op::Pop,
            ]
        );
        assert_eq!(scopes.slot_names(body_scope), vec!["n"]);
        assert_eq!(instructions[1].scope, body_scope);
        assert_eq!(instructions[5].scope, ScopeId::ROOT);
    }

    #[test]
    fn test_block_params_live_in_block_scope() {
        let (instructions, scopes) =
            lower("(lasgn t (lit 0)) (iter (call nil each) (args v) (lasgn t (lvar v)))");
        let block_scope = instructions
            .iter()
            .find_map(|i| match i.op {
                Op::DefineBlock { body_scope } => Some(body_scope),
                _ => None,
            })
            .unwrap();
        assert_eq!(scopes.slot_names(block_scope), vec!["v"]);
        // `t` already exists outside, so the block writes the outer one.
        assert_eq!(scopes.slot_names(ScopeId::ROOT), vec!["t"]);
        assert_eq!(scopes.resolve(block_scope, "t", false).unwrap().depth, 1);
    }

    #[test]
    fn test_while_lowering_shape() {
        assert_eq!(
            ops("(while (false) (lit 1))"),
            vec![
                Op::While,
                Op::PushFalse,
                Op::WhileBody,
                Op::PushInt(1),
                Op::Pop,
                Op::End(BlockLabel::While),
                Op::PushNil,
                Op::Pop,
            ]
        );
    }

    #[test]
    fn test_and_lowering_shape() {
        assert_eq!(
            ops("(and (true) (lit 2))"),
            vec![
                Op::PushTrue,
                Op::Dup,
                Op::If,
                Op::Pop,
                Op::PushInt(2),
                Op::Else,
                Op::End(BlockLabel::If),
                Op::Pop,
            ]
        );
    }

    #[test]
    fn test_exit_and_visibility_are_special() {
        assert_eq!(
            ops("(call nil public) (call nil exit)"),
            vec![
                Op::SetVisibility(Visibility::Public),
                Op::PushNil,
                Op::Pop,
                Op::Halt,
                Op::PushNil,
                Op::Pop,
            ]
        );
    }

    #[test]
    fn test_self_receiver_is_implicit() {
        assert_eq!(
            ops("(call (self) foo)"),
            vec![send("foo", 0, false), Op::Pop]
        );
    }

    #[test]
    fn test_next_inside_block_carries_value() {
        let ops = ops("(iter (call nil each) (args) (next (lit 3)))");
        assert!(ops.contains(&Op::Next { with_value: true }));
    }

    #[test]
    fn test_next_inside_loop_continues() {
        let ops = ops("(while (true) (next))");
        assert!(ops.contains(&Op::Next { with_value: false }));
    }

    #[test]
    fn test_break_outside_loop_rejected() {
        let err = lower_err("(break)");
        assert!(err.to_string().contains("break outside of a loop"));
    }

    #[test]
    fn test_break_in_block_rejected() {
        let err = lower_err("(iter (call nil each) (args) (break))");
        assert!(err.to_string().contains("break cannot leave a block"));
    }

    #[test]
    fn test_break_in_loop_inside_block_allowed() {
        let ops = ops("(iter (call nil each) (args) (while (true) (break)))");
        assert!(ops.contains(&Op::Break));
    }

    #[test]
    fn test_return_in_block_rejected() {
        let err = lower_err("(defn f (args) (iter (call nil each) (args) (return (lit 1))))");
        assert!(err.to_string().contains("return cannot leave a block"));
    }

    #[test]
    fn test_next_at_top_level_rejected() {
        assert!(lower_err("(next)").to_string().contains("next outside"));
    }
}
