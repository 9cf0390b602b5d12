//! Lexical analysis for Tiny
//!
//! Converts source text into a stream of tokens, each tagged with its line and column.

mod scanner;
mod token;

pub use scanner::Scanner;
pub use token::{Position, Token, TokenKind};
