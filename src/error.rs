//! Error types for the Tiny compiler and virtual machine

use thiserror::Error;

use crate::lexer::Position;
use crate::types::TypeError;

/// Errors raised by any phase of the pipeline
///
/// Front-end and resolution errors abort at the first occurrence. Type errors are
/// collected for the whole program and surfaced together. Runtime faults abort
/// execution of the compiled program.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Front-end errors
    /// Malformed token in the source text
    ///
    /// **Example:** `x := 3 $ 4;` (unknown character), an unterminated string
    #[error("lexical error at {pos}: {message}")]
    Lexical {
        /// Where the offending character sits
        pos: Position,
        /// Error description
        message: String,
    },

    /// Token sequence that does not match the grammar
    ///
    /// **Example:** `var x int;` (missing `:`)
    #[error("syntax error at {pos}: {message}")]
    Syntax {
        /// Position of the unexpected token
        pos: Position,
        /// Error description
        message: String,
    },

    // Resolution errors
    /// Use of a name that no enclosing scope declares
    #[error("resolution error at {pos}: undeclared identifier \"{name}\"")]
    Undeclared {
        /// The unresolved name
        name: String,
        /// Position of the use
        pos: Position,
    },

    /// Second declaration of a name within one scope
    ///
    /// **Example:** `var x: int; var x: real;` fails at the second `x`
    #[error("resolution error at {pos}: duplicate identifier \"{name}\"")]
    Duplicate {
        /// The redeclared name
        name: String,
        /// Position of the second declaration
        pos: Position,
    },

    // Semantic errors
    /// One or more type errors; the pipeline stops after the checker reports them all
    #[error("{} type error(s), first: {}", .0.len(), .0.first().map(ToString::to_string).unwrap_or_default())]
    TypeCheck(Vec<TypeError>),

    // Runtime errors
    /// Fault raised by the virtual machine while executing a program
    #[error("Execution aborted: [ERROR] {0}")]
    Runtime(#[from] Fault),

    /// A pipeline invariant did not hold (labels out of sync with emission, a
    /// call whose callee is not a procedure after type checking, ...)
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates an internal error from a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Creates a syntax error at the given position
    pub fn syntax(pos: Position, msg: impl Into<String>) -> Self {
        Error::Syntax {
            pos,
            message: msg.into(),
        }
    }

    /// Returns the individual diagnostic lines this error should print
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            Error::TypeCheck(errors) => errors.iter().map(ToString::to_string).collect(),
            other => vec![other.to_string()],
        }
    }
}

/// Runtime faults of the virtual machine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Fault {
    /// Address outside both memory regions, or a negative address
    #[error("invalid memory address {0}")]
    InvalidAddress(i64),

    /// Block move whose source or destination spans a region boundary
    #[error("move of {len} cells from {src} to {dst} crosses a memory region boundary")]
    RegionCrossing {
        /// Destination address
        dst: i64,
        /// Source address
        src: i64,
        /// Number of cells
        len: usize,
    },

    /// Jump to a program counter outside the program
    #[error("invalid instruction address {0}")]
    InvalidInstruction(i64),

    /// Display access for a level the program never declared
    #[error("invalid display level {0}")]
    InvalidDisplay(usize),

    /// Operand of the wrong kind on the stack
    #[error("illegal operand on stack: expected {expected}, found {found}")]
    IllegalStackType {
        /// Expected value kind
        expected: &'static str,
        /// Value actually found
        found: String,
    },

    /// Dereference or delete of nil
    #[error("access through null")]
    NilDereference,

    /// Heap exhausted
    #[error("out of heap memory: requested {requested} cells, {available} available")]
    OutOfMemory {
        /// Cells requested
        requested: usize,
        /// Cells still free
        available: usize,
    },

    /// Static memory (globals plus activation records) exhausted
    #[error("static memory overflow at address {addr} (limit {limit})")]
    StaticOverflow {
        /// Address that did not fit
        addr: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Pop from an empty operand stack
    #[error("operand stack is empty")]
    StackEmpty,

    /// Integer division or remainder by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Input line that does not parse as the requested type
    #[error("invalid input for {expected}: {input:?}")]
    InvalidInput {
        /// Type being read
        expected: &'static str,
        /// Offending line
        input: String,
    },

    /// Failure reading stdin or writing stdout
    #[error("I/O failure: {0}")]
    Io(String),
}

impl From<std::io::Error> for Fault {
    fn from(err: std::io::Error) -> Self {
        Fault::Io(err.to_string())
    }
}

/// Result type for Tiny operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_display() {
        let err: Error = Fault::NilDereference.into();
        assert_eq!(err.to_string(), "Execution aborted: [ERROR] access through null");
    }

    #[test]
    fn test_resolution_error_display() {
        let err = Error::Duplicate {
            name: "x".into(),
            pos: Position::new(1, 17),
        };
        assert_eq!(
            err.to_string(),
            "resolution error at (l:1; c:17): duplicate identifier \"x\""
        );
        assert_eq!(err.diagnostics().len(), 1);
    }
}
