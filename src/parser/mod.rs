//! Tiny parser module
//!
//! Parses a token stream into the arena-based abstract syntax tree consumed by
//! the compiler passes.

mod ast;
#[allow(clippy::module_inception)]
mod parser;

pub use ast::{
    Annotations, Ast, BinaryOp, Decl, DeclId, Expr, ExprId, Field, FieldId, Node, ParamMode,
    Program, Stmt, StmtId, Type, TypeId, UnaryOp,
};
pub use parser::Parser;

use crate::error::Result;
use crate::lexer::Scanner;

/// Scans and parses source text in one step
pub fn parse_source(source: &str) -> Result<Ast> {
    let tokens = Scanner::new(source).scan_tokens()?;
    Parser::new(tokens).parse()
}
