//! Stack machine instruction set

use std::fmt;

use super::value::Value;

/// Binary operator applied to the two topmost stack values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Comparison (int and real operands compare numerically)
    /// Equality
    Eq,
    /// Inequality
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,

    // Logical
    /// Logical AND
    And,
    /// Logical OR
    Or,

    // Arithmetic
    /// Integer addition (wrapping)
    AddInt,
    /// Integer subtraction (wrapping)
    SubInt,
    /// Integer multiplication (wrapping)
    MulInt,
    /// Integer division; faults on zero divisor
    DivInt,
    /// Integer remainder; faults on zero divisor
    Mod,
    /// Real addition
    AddReal,
    /// Real subtraction
    SubReal,
    /// Real multiplication
    MulReal,
    /// Real division
    DivReal,
}

impl BinOp {
    /// Mnemonic used in listings
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::Lt => "lt",
            BinOp::Le => "le",
            BinOp::Gt => "gt",
            BinOp::Ge => "ge",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::AddInt => "add-int",
            BinOp::SubInt => "sub-int",
            BinOp::MulInt => "mul-int",
            BinOp::DivInt => "div-int",
            BinOp::Mod => "mod",
            BinOp::AddReal => "add-real",
            BinOp::SubReal => "sub-real",
            BinOp::MulReal => "mul-real",
            BinOp::DivReal => "div-real",
        }
    }
}

/// Unary operator applied to the stack top
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Logical negation
    Not,
    /// Integer negation (wrapping)
    NegInt,
    /// Real negation
    NegReal,
}

impl UnOp {
    /// Mnemonic used in listings
    pub fn mnemonic(self) -> &'static str {
        match self {
            UnOp::Not => "not",
            UnOp::NegInt => "neg-int",
            UnOp::NegReal => "neg-real",
        }
    }
}

/// Basic type a `scan` instruction parses its input line into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    /// Base-10 integer
    Int,
    /// Floating-point number
    Real,
    /// `true` or `false`
    Bool,
    /// The line as-is
    Str,
}

impl ScanType {
    /// Name used in listings and input errors
    pub fn name(self) -> &'static str {
        match self {
            ScanType::Int => "int",
            ScanType::Real => "real",
            ScanType::Bool => "bool",
            ScanType::Str => "string",
        }
    }
}

/// Runtime traps raised by `stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    /// Dereference or delete of nil
    NilDereference,
}

impl Trap {
    /// Message carried by the trap
    pub fn message(self) -> &'static str {
        match self {
            Trap::NilDereference => "access through null",
        }
    }
}

/// A stack machine instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Push a literal
    Push(Value),
    /// Pop an address, push the cell it names
    LoadInd,
    /// Pop a value, pop an address, store the value there
    StoreInd,
    /// Pop source, pop destination, copy `n` cells
    Move(usize),
    /// Unconditional jump
    Goto(usize),
    /// Pop a boolean, jump if false
    JumpFalse(usize),
    /// Pop a boolean, jump if true
    JumpTrue(usize),
    /// Pop a program counter and jump to it
    JumpInd,
    /// Allocate `n` heap cells, push the start address
    Alloc(usize),
    /// Pop a heap address, free `n` cells from it
    Dealloc(usize),
    /// Open an activation record for a procedure of `level` with `frame` data
    /// cells, returning to `ret`; pushes the new frame base
    Activate {
        /// Procedure nesting level
        level: usize,
        /// Frame data size
        frame: usize,
        /// Return address
        ret: usize,
    },
    /// Push `display[n-1]`
    PushDisplay(usize),
    /// Pop into `display[n-1]`
    PopDisplay(usize),
    /// Close the activation record, restore the display, push the return PC
    Deactivate {
        /// Procedure nesting level
        level: usize,
        /// Frame data size
        frame: usize,
    },
    /// Duplicate the stack top
    Dup,
    /// Halt; with a trap, halt with a runtime error
    Stop(Option<Trap>),
    /// Binary operation
    Binary(BinOp),
    /// Unary operation
    Unary(UnOp),
    /// Convert an int on the stack top to real
    PromoteReal,
    /// Read a line of input as the given type and push it
    Scan(ScanType),
    /// Pop and print
    Print,
    /// Print a line separator and flush
    NewLine,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Push(v) => write!(f, "push {}", v.literal()),
            Instruction::LoadInd => f.write_str("load-ind"),
            Instruction::StoreInd => f.write_str("store-ind"),
            Instruction::Move(n) => write!(f, "move {}", n),
            Instruction::Goto(d) => write!(f, "goto {}", d),
            Instruction::JumpFalse(d) => write!(f, "jump-false {}", d),
            Instruction::JumpTrue(d) => write!(f, "jump-true {}", d),
            Instruction::JumpInd => f.write_str("jump-ind"),
            Instruction::Alloc(n) => write!(f, "alloc {}", n),
            Instruction::Dealloc(n) => write!(f, "dealloc {}", n),
            Instruction::Activate { level, frame, ret } => {
                write!(f, "activate {} {} {}", level, frame, ret)
            }
            Instruction::PushDisplay(n) => write!(f, "push-display {}", n),
            Instruction::PopDisplay(n) => write!(f, "pop-display {}", n),
            Instruction::Deactivate { level, frame } => write!(f, "deactivate {} {}", level, frame),
            Instruction::Dup => f.write_str("dup"),
            Instruction::Stop(None) => f.write_str("stop"),
            Instruction::Stop(Some(trap)) => write!(f, "stop {:?}", trap.message()),
            Instruction::Binary(op) => write!(f, "binary {}", op.mnemonic()),
            Instruction::Unary(op) => write!(f, "unary {}", op.mnemonic()),
            Instruction::PromoteReal => f.write_str("promote-real"),
            Instruction::Scan(ty) => write!(f, "scan {}", ty.name()),
            Instruction::Print => f.write_str("print"),
            Instruction::NewLine => f.write_str("newline"),
        }
    }
}
