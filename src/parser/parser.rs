use super::ast::{
    Ast, BinaryOp, Decl, DeclId, Expr, ExprId, Field, ParamMode, Program, Stmt, StmtId, Type,
    TypeId, UnaryOp,
};
use crate::error::{Error, Result};
use crate::lexer::{Position, Token, TokenKind};

/// Recursive-descent parser producing an [`Ast`]
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    ast: Ast,
}

impl Parser {
    /// Creates a new parser over a token stream ending in `Eof`
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            current: 0,
            ast: Ast::new(),
        }
    }

    /// Parses a whole program
    pub fn parse(mut self) -> Result<Ast> {
        let pos = self.peek().pos;
        let decls = self.parse_decls()?;
        let body = self.parse_stmts()?;
        if !self.is_at_end() {
            return Err(self.unexpected("a declaration or a statement"));
        }
        self.ast.program.kind = Program { decls, body };
        self.ast.program.pos = pos;
        Ok(self.ast)
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn parse_decls(&mut self) -> Result<Vec<DeclId>> {
        let mut decls = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Var | TokenKind::Type => decls.push(self.parse_decl()?),
                TokenKind::Proc if !self.check_next(&TokenKind::End) => {
                    decls.push(self.parse_decl()?)
                }
                _ => return Ok(decls),
            }
        }
    }

    fn parse_decl(&mut self) -> Result<DeclId> {
        let keyword = self.advance().clone();
        let (name, pos) = self.expect_identifier()?;
        let decl = match keyword.kind {
            TokenKind::Var => {
                self.consume(&TokenKind::Colon, "':' after variable name")?;
                let ty = self.parse_type()?;
                Decl::Var { name, ty }
            }
            TokenKind::Type => {
                self.consume(&TokenKind::Equals, "'=' after type name")?;
                let ty = self.parse_type()?;
                Decl::Type { name, ty }
            }
            _ => {
                self.consume(&TokenKind::LeftParen, "'(' after procedure name")?;
                let mut params = Vec::new();
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        params.push(self.parse_param()?);
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(&TokenKind::RightParen, "')' after parameters")?;
                self.consume(&TokenKind::Semicolon, "';' after procedure header")?;
                let decls = self.parse_decls()?;
                let body = self.parse_stmts()?;
                self.consume(&TokenKind::Proc, "'proc end' closing the procedure")?;
                self.consume(&TokenKind::End, "'end' after 'proc'")?;
                Decl::Proc {
                    name,
                    params,
                    decls,
                    body,
                }
            }
        };
        self.consume(&TokenKind::Semicolon, "';' after declaration")?;
        Ok(self.ast.add_decl(decl, pos))
    }

    fn parse_param(&mut self) -> Result<DeclId> {
        let mode = if self.match_token(&TokenKind::Var) {
            ParamMode::Reference
        } else {
            ParamMode::Value
        };
        let (name, pos) = self.expect_identifier()?;
        self.consume(&TokenKind::Colon, "':' after parameter name")?;
        let ty = self.parse_type()?;
        Ok(self.ast.add_decl(Decl::Param { name, ty, mode }, pos))
    }

    fn parse_type(&mut self) -> Result<TypeId> {
        let token = self.advance().clone();
        let kind = match token.kind {
            TokenKind::Int => Type::Int,
            TokenKind::RealType => Type::Real,
            TokenKind::Bool => Type::Bool,
            TokenKind::StringType => Type::Str,
            TokenKind::Identifier(name) => Type::Ref { name },
            TokenKind::Array => {
                self.consume(&TokenKind::LeftParen, "'(' after 'array'")?;
                let elem = self.parse_type()?;
                self.consume(&TokenKind::Comma, "',' before array size")?;
                let negative = self.match_token(&TokenKind::Minus);
                let size = self.advance().clone();
                let len = match size.kind {
                    TokenKind::Integer(_) if negative => format!("-{}", size.lexeme),
                    TokenKind::Integer(_) => size.lexeme,
                    _ => return Err(Error::syntax(size.pos, "expected array size")),
                };
                self.consume(&TokenKind::RightParen, "')' after array size")?;
                Type::Array { elem, len }
            }
            TokenKind::Record => {
                self.consume(&TokenKind::LeftParen, "'(' after 'record'")?;
                let mut fields = Vec::new();
                loop {
                    let (name, pos) = self.expect_identifier()?;
                    self.consume(&TokenKind::Colon, "':' after field name")?;
                    let ty = self.parse_type()?;
                    fields.push(self.ast.add_field(Field { name, ty }, pos));
                    if !self.match_token(&TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(&TokenKind::RightParen, "')' after record fields")?;
                Type::Record { fields }
            }
            TokenKind::Pointer => {
                self.consume(&TokenKind::LeftParen, "'(' after 'pointer'")?;
                let elem = self.parse_type()?;
                self.consume(&TokenKind::RightParen, "')' after pointer type")?;
                Type::Pointer { elem }
            }
            _ => return Err(Error::syntax(token.pos, format!("expected a type, found '{}'", token.lexeme))),
        };
        Ok(self.ast.add_type(kind, token.pos))
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn parse_stmts(&mut self) -> Result<Vec<StmtId>> {
        let mut stmts = Vec::new();
        while self.starts_statement() {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn starts_statement(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Identifier(_)
                | TokenKind::Begin
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Read
                | TokenKind::Write
                | TokenKind::NewLine
                | TokenKind::New
                | TokenKind::Delete
        )
    }

    fn parse_stmt(&mut self) -> Result<StmtId> {
        let token = self.peek().clone();
        let pos = token.pos;
        let stmt = match token.kind {
            TokenKind::Begin => {
                self.advance();
                let decls = self.parse_decls()?;
                let body = self.parse_stmts()?;
                self.consume(&TokenKind::End, "'end' closing the block")?;
                Stmt::Seq { decls, body }
            }
            TokenKind::If => {
                self.advance();
                let cond = self.parse_expression()?;
                self.consume(&TokenKind::Then, "'then' after condition")?;
                let then_branch = self.parse_stmts()?;
                let stmt = if self.match_token(&TokenKind::Else) {
                    let else_branch = self.parse_stmts()?;
                    Stmt::IfThenElse {
                        cond,
                        then_branch,
                        else_branch,
                    }
                } else {
                    Stmt::IfThen { cond, then_branch }
                };
                self.consume(&TokenKind::End, "'end' closing 'if'")?;
                stmt
            }
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expression()?;
                self.consume(&TokenKind::Do, "'do' after loop condition")?;
                let body = self.parse_stmts()?;
                self.consume(&TokenKind::End, "'end' closing 'while'")?;
                Stmt::While { cond, body }
            }
            TokenKind::Read => Stmt::Read(self.parse_builtin_arg()?),
            TokenKind::Write => Stmt::Write(self.parse_builtin_arg()?),
            TokenKind::New => Stmt::New(self.parse_builtin_arg()?),
            TokenKind::Delete => Stmt::Delete(self.parse_builtin_arg()?),
            TokenKind::NewLine => {
                self.advance();
                self.consume(&TokenKind::LeftParen, "'(' after 'newline'")?;
                self.consume(&TokenKind::RightParen, "')' after 'newline('")?;
                Stmt::NewLine
            }
            TokenKind::Identifier(name) if self.check_next(&TokenKind::LeftParen) => {
                self.advance();
                let callee = self.ast.add_expr(Expr::Ident(name), pos);
                self.advance();
                let mut args = Vec::new();
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(&TokenKind::RightParen, "')' after arguments")?;
                Stmt::Call { callee, args }
            }
            _ => {
                let lhs = self.parse_postfix()?;
                let assign = self.consume(&TokenKind::Assign, "':=' in assignment")?;
                let rhs = self.parse_expression()?;
                self.consume(&TokenKind::Semicolon, "';' after statement")?;
                return Ok(self.ast.add_stmt(Stmt::Assign { lhs, rhs }, assign.pos));
            }
        };
        self.consume(&TokenKind::Semicolon, "';' after statement")?;
        Ok(self.ast.add_stmt(stmt, pos))
    }

    /// `keyword '(' expr ')'`
    fn parse_builtin_arg(&mut self) -> Result<ExprId> {
        let keyword = self.advance().lexeme.clone();
        self.consume(&TokenKind::LeftParen, &format!("'(' after '{}'", keyword))?;
        let expr = self.parse_expression()?;
        self.consume(&TokenKind::RightParen, &format!("')' closing '{}'", keyword))?;
        Ok(expr)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn parse_expression(&mut self) -> Result<ExprId> {
        let mut lhs = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            let pos = self.advance().pos;
            let rhs = self.parse_and()?;
            lhs = self.binary(BinaryOp::Or, lhs, rhs, pos);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<ExprId> {
        let mut lhs = self.parse_relational()?;
        while self.check(&TokenKind::And) {
            let pos = self.advance().pos;
            let rhs = self.parse_relational()?;
            lhs = self.binary(BinaryOp::And, lhs, rhs, pos);
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<ExprId> {
        let lhs = self.parse_additive()?;
        let op = match self.peek().kind {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::LtEq => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::GtEq => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        let pos = self.advance().pos;
        let rhs = self.parse_additive()?;
        Ok(self.binary(op, lhs, rhs, pos))
    }

    fn parse_additive(&mut self) -> Result<ExprId> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            let pos = self.advance().pos;
            let rhs = self.parse_multiplicative()?;
            lhs = self.binary(op, lhs, rhs, pos);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<ExprId> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            let pos = self.advance().pos;
            let rhs = self.parse_unary()?;
            lhs = self.binary(op, lhs, rhs, pos);
        }
    }

    fn parse_unary(&mut self) -> Result<ExprId> {
        let op = match self.peek().kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        let pos = self.advance().pos;
        let operand = self.parse_unary()?;
        Ok(self.ast.add_expr(Expr::Unary { op, operand }, pos))
    }

    fn parse_postfix(&mut self) -> Result<ExprId> {
        let mut expr = self.parse_primary()?;
        loop {
            let pos = self.peek().pos;
            if self.match_token(&TokenKind::LeftBracket) {
                let index = self.parse_expression()?;
                self.consume(&TokenKind::RightBracket, "']' after index")?;
                expr = self.ast.add_expr(Expr::Index { array: expr, index }, pos);
            } else if self.match_token(&TokenKind::Dot) {
                let (name, _) = self.expect_identifier()?;
                expr = self.ast.add_expr(Expr::Field { record: expr, name }, pos);
            } else if self.match_token(&TokenKind::Caret) {
                expr = self.ast.add_expr(Expr::Deref(expr), pos);
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<ExprId> {
        let token = self.advance().clone();
        let kind = match token.kind {
            TokenKind::Integer(value) => Expr::Int(value),
            TokenKind::Real(value) => Expr::Real(value),
            TokenKind::String(value) => Expr::Str(value),
            TokenKind::Identifier(name) => Expr::Ident(name),
            TokenKind::True => Expr::True,
            TokenKind::False => Expr::False,
            TokenKind::Nil => Expr::Nil,
            TokenKind::LeftParen => {
                let expr = self.parse_expression()?;
                self.consume(&TokenKind::RightParen, "')' after expression")?;
                return Ok(expr);
            }
            _ => {
                return Err(Error::syntax(
                    token.pos,
                    format!("expected an expression, found '{}'", token.lexeme),
                ))
            }
        };
        Ok(self.ast.add_expr(kind, token.pos))
    }

    fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId, pos: Position) -> ExprId {
        self.ast.add_expr(Expr::Binary { op, lhs, rhs }, pos)
    }

    // ========================================================================
    // Token helpers
    // ========================================================================

    fn expect_identifier(&mut self) -> Result<(String, Position)> {
        let token = self.advance().clone();
        match token.kind {
            TokenKind::Identifier(name) => Ok((name, token.pos)),
            _ => Err(Error::syntax(
                token.pos,
                format!("expected an identifier, found '{}'", token.lexeme),
            )),
        }
    }

    fn consume(&mut self, kind: &TokenKind, expected: &str) -> Result<Token> {
        if self.check(kind) {
            Ok(self.advance().clone())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        let token = self.peek();
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", token.lexeme)
        };
        Error::syntax(token.pos, format!("expected {}, found {}", expected, found))
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn check_next(&self, kind: &TokenKind) -> bool {
        self.tokens
            .get(self.current + 1)
            .is_some_and(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }
}
