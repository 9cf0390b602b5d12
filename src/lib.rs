//! # Tiny - a compiler and stack machine for a small imperative language
//!
//! Tiny programs declare typed variables (`int`, `real`, `bool`, `string`,
//! arrays, records and pointers), nested procedures with by-value and
//! by-reference parameters, and run structured statements over them. This crate
//! compiles such programs to code for a stack virtual machine and runs it.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::io::Cursor;
//! use tiny::{Compiler, Vm, VmConfig};
//!
//! # fn main() -> tiny::Result<()> {
//! let source = "var x: int; var y: real; x := 3; y := x + 2; write(y);";
//!
//! let program = Compiler::default().compile_source(source)?;
//! let mut vm = Vm::new(program, &VmConfig::default(), Cursor::new(""), Vec::new())?;
//! vm.run()?;
//!
//! assert_eq!(vm.into_output(), b"5.0");
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! 1. [`lexer`] turns source text into positioned tokens.
//! 2. [`parser`] builds the arena-based AST.
//! 3. [`compiler`] resolves names, type checks ([`types`]), lays out storage,
//!    labels every node with its instruction range and emits code.
//! 4. [`runtime`] executes the code on the [`Vm`].
//!
//! Every phase reports failures through [`Error`]; type errors are collected
//! for the whole program before compilation stops.

pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod types;

pub use compiler::{CompileOptions, CompiledProgram, Compiler};
pub use error::{Error, Fault, Result};
pub use lexer::{Scanner, Token, TokenKind};
pub use parser::{parse_source, Ast, Parser};
pub use runtime::{Instruction, Value, Vm, VmConfig};
