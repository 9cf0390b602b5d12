use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based source position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub col: usize,
}

impl Position {
    /// Creates a position from a line and a column
    pub fn new(line: usize, col: usize) -> Self {
        Position { line, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(l:{}; c:{})", self.line, self.col)
    }
}

/// A single token from the source code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The type of token
    pub kind: TokenKind,
    /// Original text of the token
    pub lexeme: String,
    /// Where the token starts
    pub pos: Position,
}

impl Token {
    /// Creates a new token with the given properties
    pub fn new(kind: TokenKind, lexeme: String, pos: Position) -> Self {
        Token { kind, lexeme, pos }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} {}", self.pos, self.kind, self.lexeme)
    }
}

/// All token types of the Tiny language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    /// Integer literal
    Integer(i64),
    /// Real literal
    Real(f64),
    /// String literal, escapes already decoded
    String(String),
    /// Identifier
    Identifier(String),

    // Keywords
    /// `var`
    Var,
    /// `type`
    Type,
    /// `proc`
    Proc,
    /// `end`
    End,
    /// `int`
    Int,
    /// `real`
    RealType,
    /// `bool`
    Bool,
    /// `string`
    StringType,
    /// `array`
    Array,
    /// `record`
    Record,
    /// `pointer`
    Pointer,
    /// `begin`
    Begin,
    /// `if`
    If,
    /// `then`
    Then,
    /// `else`
    Else,
    /// `while`
    While,
    /// `do`
    Do,
    /// `read`
    Read,
    /// `write`
    Write,
    /// `newline`
    NewLine,
    /// `new`
    New,
    /// `delete`
    Delete,
    /// `true`
    True,
    /// `false`
    False,
    /// `nil`
    Nil,
    /// `and`
    And,
    /// `or`
    Or,
    /// `not`
    Not,

    // Punctuation
    /// `;`
    Semicolon,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `.`
    Dot,
    /// `^`
    Caret,
    /// `:=`
    Assign,
    /// `=`
    Equals,

    // Operators
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Maps a word to its keyword token, if it is one
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "var" => TokenKind::Var,
            "type" => TokenKind::Type,
            "proc" => TokenKind::Proc,
            "end" => TokenKind::End,
            "int" => TokenKind::Int,
            "real" => TokenKind::RealType,
            "bool" => TokenKind::Bool,
            "string" => TokenKind::StringType,
            "array" => TokenKind::Array,
            "record" => TokenKind::Record,
            "pointer" => TokenKind::Pointer,
            "begin" => TokenKind::Begin,
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "read" => TokenKind::Read,
            "write" => TokenKind::Write,
            "newline" => TokenKind::NewLine,
            "new" => TokenKind::New,
            "delete" => TokenKind::Delete,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" => TokenKind::Nil,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            _ => return None,
        };
        Some(kind)
    }
}
