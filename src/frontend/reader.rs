use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::read_error::ReadError;
use crate::frontend::token::Token;
use crate::lang::node::{BlockNode, Node};

/// Recursive-descent reader for the S-expression AST format.
///
/// The reader consumes a stream of lexed `Spanned` tokens and produces the
/// top-level forms of one source file, in order.
///
/// Notes:
/// - Comments and newlines are filtered out in `Reader::new`.
/// - The bare atom `nil` stands for an absent receiver or branch; the form
///   `(nil)` is the nil literal.
pub struct Reader {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Span of the most recently consumed token.
    ///
    /// Used to provide stable source locations for errors that occur after
    /// advancing past the last token or at end-of-file.
    last_span: Option<Span>,
}

impl Reader {
    /// Creates a new reader from lexer output.
    pub fn new(tokens: Vec<Spanned>) -> Self {
        let tokens: Vec<Spanned> = tokens
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Comment(_) | Token::Newline))
            .collect();
        Reader {
            tokens,
            pos: 0,
            last_span: None,
        }
    }

    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let spanned = self.tokens.get(self.pos)?.clone();
        self.last_span = Some(spanned.span);
        self.pos += 1;
        Some(spanned.token)
    }

    /// Constructs a `ReadError` at the most relevant location.
    ///
    /// Priority:
    /// 1. If `current()` exists, use its span.
    /// 2. Else, use `last_span`.
    /// 3. Else, default to (1,1) for truly empty input.
    fn error(&self, message: impl Into<String>) -> ReadError {
        let (line, col) = match (self.current(), &self.last_span) {
            (Some(spanned), _) => (spanned.span.line, spanned.span.col),
            (None, Some(span)) => (span.line, span.col),
            (None, None) => (1, 1),
        };
        ReadError {
            message: message.into(),
            line,
            col,
        }
    }

    /// Reads every top-level form until `Token::Eof`.
    pub fn read_program(&mut self) -> Result<Vec<Node>, ReadError> {
        let mut forms = Vec::new();
        while !matches!(self.peek(), None | Some(Token::Eof)) {
            forms.push(self.read_expr()?);
        }
        Ok(forms)
    }

    fn expect_lparen(&mut self) -> Result<(), ReadError> {
        match self.peek() {
            Some(Token::LParen) => {
                self.advance();
                Ok(())
            }
            Some(other) => Err(self.error(format!("expected '(', found {}", other))),
            None => Err(self.error("unexpected end of input, expected '('")),
        }
    }

    fn expect_rparen(&mut self, head: &str) -> Result<(), ReadError> {
        match self.peek() {
            Some(Token::RParen) => {
                self.advance();
                Ok(())
            }
            Some(Token::Eof) | None => {
                Err(self.error(format!("unexpected EOF, expected ')' to close ({}", head)))
            }
            Some(other) => Err(self.error(format!(
                "unexpected {} in ({} ...), expected ')'",
                other, head
            ))),
        }
    }

    fn read_atom(&mut self, what: &str) -> Result<String, ReadError> {
        match self.peek() {
            Some(Token::Atom(_)) => match self.advance() {
                Some(Token::Atom(name)) => Ok(name),
                _ => Err(self.error(format!("expected {}", what))),
            },
            _ => Err(self.error(format!("expected {}", what))),
        }
    }

    fn at_close(&self) -> bool {
        matches!(self.peek(), Some(Token::RParen))
    }

    /// `nil` (bare atom) reads as `None`; anything else must be a form.
    fn read_optional_expr(&mut self) -> Result<Option<Node>, ReadError> {
        if matches!(self.peek(), Some(Token::Atom(a)) if a == "nil") {
            self.advance();
            return Ok(None);
        }
        self.read_expr().map(Some)
    }

    fn read_exprs_until_close(&mut self) -> Result<Vec<Node>, ReadError> {
        let mut exprs = Vec::new();
        while !self.at_close() {
            if matches!(self.peek(), None | Some(Token::Eof)) {
                return Err(self.error("unexpected EOF, expected ')'"));
            }
            exprs.push(self.read_expr()?);
        }
        Ok(exprs)
    }

    /// Reads `(args a b ...)`.
    fn read_params(&mut self) -> Result<Vec<String>, ReadError> {
        self.expect_lparen()?;
        let head = self.read_atom("'args'")?;
        if head != "args" {
            return Err(self.error(format!("expected (args ...), found ({} ...)", head)));
        }
        let mut params = Vec::new();
        while !self.at_close() {
            params.push(self.read_atom("parameter name")?);
        }
        self.expect_rparen("args")?;
        Ok(params)
    }

    /// Reads one parenthesised form.
    pub fn read_expr(&mut self) -> Result<Node, ReadError> {
        self.expect_lparen()?;
        let head = self.read_atom("form name")?;

        let node = match head.as_str() {
            "lit" => match self.advance() {
                Some(Token::Integer(n)) => Node::Int(n),
                _ => return Err(self.error("(lit ...) expects an integer")),
            },
            "str" => match self.advance() {
                Some(Token::String(s)) => Node::Str(s),
                _ => return Err(self.error("(str ...) expects a string literal")),
            },
            "sym" => Node::Sym(self.read_atom("symbol name")?),
            "nil" => Node::Nil,
            "true" => Node::True,
            "false" => Node::False,
            "self" => Node::SelfRef,

            "lvar" => Node::Lvar(self.read_atom("variable name")?),
            "lasgn" => {
                let name = self.read_atom("variable name")?;
                Node::Lasgn(name, Box::new(self.read_expr()?))
            }
            "gvar" => Node::Gvar(self.read_global()?),
            "gasgn" => {
                let name = self.read_global()?;
                Node::Gasgn(name, Box::new(self.read_expr()?))
            }

            "call" => self.read_call_tail()?,
            "iter" => {
                let call = self.read_expr()?;
                let params = self.read_params()?;
                let body = self.read_exprs_until_close()?;
                match call {
                    Node::Call {
                        receiver,
                        name,
                        args,
                        block: None,
                    } => Node::Call {
                        receiver,
                        name,
                        args,
                        block: Some(BlockNode { params, body }),
                    },
                    other => {
                        return Err(self.error(format!(
                            "(iter ...) expects a call, found ({} ...)",
                            other.kind_name()
                        )));
                    }
                }
            }
            "yield" => Node::Yield(self.read_exprs_until_close()?),

            "if" => {
                let condition = Box::new(self.read_expr()?);
                let then_branch = self.read_optional_expr()?.map(Box::new);
                let else_branch = if self.at_close() {
                    None
                } else {
                    self.read_optional_expr()?.map(Box::new)
                };
                Node::If {
                    condition,
                    then_branch,
                    else_branch,
                }
            }
            "while" => {
                let condition = Box::new(self.read_expr()?);
                let body = self.read_exprs_until_close()?;
                Node::While { condition, body }
            }
            "and" => {
                let left = self.read_expr()?;
                Node::And(Box::new(left), Box::new(self.read_expr()?))
            }
            "or" => {
                let left = self.read_expr()?;
                Node::Or(Box::new(left), Box::new(self.read_expr()?))
            }
            "not" => Node::Not(Box::new(self.read_expr()?)),
            "block" => Node::Block(self.read_exprs_until_close()?),
            "return" => Node::Return(self.read_trailing_expr()?),
            "break" => Node::Break,
            "next" => Node::Next(self.read_trailing_expr()?),

            "defn" => {
                let name = self.read_atom("method name")?;
                let params = self.read_params()?;
                let body = self.read_exprs_until_close()?;
                Node::Def { name, params, body }
            }

            other => return Err(self.error(format!("unknown form ({} ...)", other))),
        };

        self.expect_rparen(&head)?;
        Ok(node)
    }

    fn read_call_tail(&mut self) -> Result<Node, ReadError> {
        let receiver = self.read_optional_expr()?.map(Box::new);
        let name = self.read_atom("method name")?;
        let args = self.read_exprs_until_close()?;
        Ok(Node::Call {
            receiver,
            name,
            args,
            block: None,
        })
    }

    fn read_trailing_expr(&mut self) -> Result<Option<Box<Node>>, ReadError> {
        if self.at_close() {
            Ok(None)
        } else {
            Ok(Some(Box::new(self.read_expr()?)))
        }
    }

    fn read_global(&mut self) -> Result<String, ReadError> {
        let name = self.read_atom("global name")?;
        if !name.starts_with('$') {
            return Err(self.error(format!("global names start with '$', got {}", name)));
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn read(source: &str) -> Result<Vec<Node>, ReadError> {
        let tokens = Lexer::new(source).tokenize()?;
        Reader::new(tokens).read_program()
    }

    fn call(receiver: Option<Node>, name: &str, args: Vec<Node>) -> Node {
        Node::Call {
            receiver: receiver.map(Box::new),
            name: name.to_string(),
            args,
            block: None,
        }
    }

    #[test]
    fn test_read_puts_call() {
        let forms = read("(call nil puts (call (lit 1) + (lit 2)))").unwrap();
        assert_eq!(
            forms,
            vec![call(
                None,
                "puts",
                vec![call(Some(Node::Int(1)), "+", vec![Node::Int(2)])]
            )]
        );
    }

    #[test]
    fn test_read_defn() {
        let forms = read("(defn id (args x) (lvar x))").unwrap();
        assert_eq!(
            forms,
            vec![Node::Def {
                name: "id".to_string(),
                params: vec!["x".to_string()],
                body: vec![Node::Lvar("x".to_string())],
            }]
        );
    }

    #[test]
    fn test_read_if_with_absent_branch() {
        let forms = read("(if (true) nil (lit 2))").unwrap();
        assert_eq!(
            forms,
            vec![Node::If {
                condition: Box::new(Node::True),
                then_branch: None,
                else_branch: Some(Box::new(Node::Int(2))),
            }]
        );
    }

    #[test]
    fn test_read_iter_attaches_block() {
        let forms = read("(iter (call nil each) (args a b) (lvar a))").unwrap();
        match &forms[0] {
            Node::Call {
                name,
                block: Some(block),
                ..
            } => {
                assert_eq!(name, "each");
                assert_eq!(block.params, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(block.body.len(), 1);
            }
            other => panic!("expected call with block, got {:?}", other),
        }
    }

    #[test]
    fn test_read_return_without_value() {
        assert_eq!(read("(return)").unwrap(), vec![Node::Return(None)]);
    }

    #[test]
    fn test_unknown_form_error() {
        let err = read("(frobnicate 1)").unwrap_err();
        assert!(err.message.contains("unknown form"));
    }

    #[test]
    fn test_missing_close_paren_uses_last_span() {
        let err = read("(block (lit 1)").unwrap_err();
        assert!(err.message.contains("expected ')'"), "{}", err.message);
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_global_must_start_with_dollar() {
        assert!(read("(gvar count)").is_err());
        assert_eq!(read("(gvar $count)").unwrap(), vec![Node::Gvar("$count".to_string())]);
    }
}
