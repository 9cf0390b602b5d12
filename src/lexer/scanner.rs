use super::token::{Position, Token, TokenKind};
use crate::error::{Error, Result};

/// Scanner for Tiny source text
pub struct Scanner {
    /// Source code as character vector
    source: Vec<char>,
    /// Accumulated tokens
    tokens: Vec<Token>,
    /// Start index of the current token
    start: usize,
    /// Position of the current token's first character
    start_pos: Position,
    /// Current index in source
    current: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
}

impl Scanner {
    /// Creates a new scanner from source code
    pub fn new(source: &str) -> Self {
        Scanner {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            start_pos: Position::new(1, 1),
            current: 0,
            line: 1,
            column: 1,
        }
    }

    /// Scans all tokens from source code, terminated by an `Eof` token
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.start_pos = Position::new(self.line, self.column);
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            String::new(),
            Position::new(self.line, self.column),
        ));

        Ok(std::mem::take(&mut self.tokens))
    }

    fn scan_token(&mut self) -> Result<()> {
        let c = self.advance();

        match c {
            ' ' | '\r' | '\t' => {}
            '\n' => {
                self.line += 1;
                self.column = 1;
            }

            '#' => self.skip_line_comment(),

            ';' => self.add_token(TokenKind::Semicolon),
            ',' => self.add_token(TokenKind::Comma),
            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            '[' => self.add_token(TokenKind::LeftBracket),
            ']' => self.add_token(TokenKind::RightBracket),
            '.' => self.add_token(TokenKind::Dot),
            '^' => self.add_token(TokenKind::Caret),
            '+' => self.add_token(TokenKind::Plus),
            '-' => self.add_token(TokenKind::Minus),
            '*' => self.add_token(TokenKind::Star),
            '/' => self.add_token(TokenKind::Slash),
            '%' => self.add_token(TokenKind::Percent),

            ':' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::Assign);
                } else {
                    self.add_token(TokenKind::Colon);
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::Eq);
                } else {
                    self.add_token(TokenKind::Equals);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::NotEq);
                } else {
                    return Err(self.error("expected '=' after '!'"));
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::LtEq);
                } else {
                    self.add_token(TokenKind::Lt);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::GtEq);
                } else {
                    self.add_token(TokenKind::Gt);
                }
            }

            '"' => self.scan_string()?,

            c if c.is_ascii_digit() => self.scan_number()?,

            c if c.is_ascii_alphabetic() || c == '_' => self.scan_identifier_or_keyword(),

            _ => return Err(self.error(format!("unexpected character '{}'", c))),
        }

        Ok(())
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn scan_string(&mut self) -> Result<()> {
        let mut value = String::new();

        while !self.is_at_end() && self.peek() != '"' {
            match self.advance() {
                '\\' => {
                    let escaped = self.advance();
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        '\\' => value.push('\\'),
                        '"' => value.push('"'),
                        _ => {
                            return Err(self.error(format!("invalid escape sequence \\{}", escaped)))
                        }
                    }
                }
                '\n' => return Err(self.error("unterminated string")),
                c => value.push(c),
            }
        }

        if self.is_at_end() {
            return Err(self.error("unterminated string"));
        }

        self.advance(); // closing "
        self.add_token(TokenKind::String(value));
        Ok(())
    }

    fn scan_number(&mut self) -> Result<()> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut is_real = false;
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_real = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }

            if matches!(self.peek(), 'e' | 'E') {
                let sign = usize::from(matches!(self.peek_next(), '+' | '-'));
                if self.peek_at(1 + sign).is_ascii_digit() {
                    for _ in 0..=sign {
                        self.advance();
                    }
                    while self.peek().is_ascii_digit() {
                        self.advance();
                    }
                }
            }
        }

        let text = self.lexeme();
        if is_real {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(format!("invalid real literal {}", text)))?;
            self.add_token(TokenKind::Real(value));
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| self.error(format!("integer literal {} out of range", text)))?;
            self.add_token(TokenKind::Integer(value));
        }

        Ok(())
    }

    fn scan_identifier_or_keyword(&mut self) {
        while self.peek().is_ascii_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text = self.lexeme();
        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Identifier(text));
        self.add_token(kind);
    }

    fn lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Lexical {
            pos: self.start_pos,
            message: message.into(),
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        self.column += 1;
        c
    }

    fn peek(&self) -> char {
        self.peek_at(0)
    }

    fn peek_next(&self) -> char {
        self.peek_at(1)
    }

    fn peek_at(&self, ahead: usize) -> char {
        self.source
            .get(self.current + ahead)
            .copied()
            .unwrap_or('\0')
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() != expected || self.is_at_end() {
            return false;
        }
        self.advance();
        true
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = self.lexeme();
        self.tokens.push(Token::new(kind, lexeme, self.start_pos));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source)
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_declaration_tokens() {
        assert_eq!(
            kinds("var x: int;"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier("x".into()),
                TokenKind::Colon,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds(":= = == != <= >= < > ^"),
            vec![
                TokenKind::Assign,
                TokenKind::Equals,
                TokenKind::Eq,
                TokenKind::NotEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Caret,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 3.5 1.0e3 2.5E-1"),
            vec![
                TokenKind::Integer(42),
                TokenKind::Real(3.5),
                TokenKind::Real(1000.0),
                TokenKind::Real(0.25),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_field_access_after_integer() {
        // `a[1].f` must not lex `1.` as a real
        assert_eq!(
            kinds("a[1].f"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::LeftBracket,
                TokenKind::Integer(1),
                TokenKind::RightBracket,
                TokenKind::Dot,
                TokenKind::Identifier("f".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\n""#),
            vec![TokenKind::String("a\"b\n".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_comments_and_positions() {
        let tokens = Scanner::new("# header\n  x := 1;").scan_tokens().unwrap();
        assert_eq!(tokens[0].pos, Position::new(2, 3));
        assert_eq!(tokens[1].pos, Position::new(2, 5));
    }

    #[test]
    fn test_unexpected_character() {
        let err = Scanner::new("x := $;").scan_tokens().unwrap_err();
        assert!(matches!(err, Error::Lexical { pos, .. } if pos == Position::new(1, 6)));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(Scanner::new("write(\"abc").scan_tokens().is_err());
    }
}
