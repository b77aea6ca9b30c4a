//! Reader for the S-expression AST the external parser emits.

pub mod lexer;
pub mod read_error;
pub mod reader;
pub mod token;

use crate::lang::node::Node;
use lexer::Lexer;
use read_error::ReadError;
use reader::Reader;

/// Reads a whole AST file into one top-level `(block ...)`.
pub fn read_source(source: &str) -> Result<Node, ReadError> {
    let tokens = Lexer::new(source).tokenize()?;
    let forms = Reader::new(tokens).read_program()?;
    Ok(Node::Block(forms))
}
