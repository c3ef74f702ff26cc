//! Recursive-descent parser producing arena handles.
//!
//! The parser consumes the scanner's token stream and appends nodes into the
//! shared [`Ast`] arena, returning the root statement (a `Block` holding the
//! top-level declarations). Expression parsing follows the precedence chain
//! `assignment → or → and → equality → comparison → term → factor → unary →
//! call → primary`, with one shared helper for all left-associative binary
//! levels.
//!
//! Error handling distinguishes two classes. Recoverable errors (a missing
//! `;`, a missing expression, a missing `)`) put the parser into panic mode:
//! the error is reported once, cascading diagnostics are suppressed, and the
//! token stream is discarded up to the next `;` or declaration keyword so
//! parsing can continue and surface further independent errors. Every other
//! parse error is fatal and aborts the parse with the first error surfaced.

use crate::ast::{Ast, Expr, ExprIdx, Lit, Stmt, StmtIdx};
use crate::diagnostics::{Diagnostic, Diagnostics, ErrorKind};
use crate::token::{Span, Token, TokenTag};

/// Argument and parameter lists are capped by the call protocol.
const MAX_CALL_ARGS: usize = 255;

/// An in-flight parse error, carried on the `Err` channel until it is
/// reported into the diagnostics buffer.
#[derive(Debug, Clone)]
struct ParseError {
    kind: ErrorKind,
    message: String,
    token: Token,
}

impl ParseError {
    fn new(kind: ErrorKind, message: impl Into<String>, token: Token) -> Self {
        Self {
            kind,
            message: message.into(),
            token,
        }
    }
}

type PResult<T> = Result<T, ParseError>;

/// The recursive-descent parser. One-shot: construct, call [`Parser::parse`].
#[derive(Debug)]
pub struct Parser<'a> {
    src: &'a str,
    tokens: &'a [Token],
    current: usize,
    /// Set after reporting an error, cleared on synchronization; suppresses
    /// cascade diagnostics in between.
    panic_mode: bool,
    ast: &'a mut Ast,
    diags: &'a mut Diagnostics,
}

impl<'a> Parser<'a> {
    #[must_use]
    pub fn new(src: &'a str, tokens: &'a [Token], ast: &'a mut Ast, diags: &'a mut Diagnostics) -> Self {
        debug_assert!(matches!(tokens.last(), Some(t) if t.tag == TokenTag::Eof));
        Self {
            src,
            tokens,
            current: 0,
            panic_mode: false,
            ast,
            diags,
        }
    }

    /// Parses the whole token stream into a root `Block` statement.
    ///
    /// Returns `None` if a fatal error aborted the parse. A `Some` root with
    /// buffered errors means panic-mode recovery kicked in; the pipeline
    /// still refuses to execute such a program.
    pub fn parse(mut self) -> Option<StmtIdx> {
        let origin = self.peek();
        let mut statements = Vec::new();
        while !self.check(TokenTag::Eof) {
            match self.declaration() {
                Ok(Some(idx)) => statements.push(idx),
                Ok(None) => {} // recovered; keep going
                Err(err) => {
                    self.report(err);
                    return None;
                }
            }
        }
        Some(self.ast.push_stmt(Stmt::Block {
            statements,
            loc: origin,
        }))
    }

    // ========================================================================
    // Declarations and statements
    // ========================================================================

    /// Parses one declaration, absorbing recoverable errors via panic-mode
    /// synchronization. `Ok(None)` means an error was recovered from; `Err`
    /// is fatal and must propagate to the caller.
    fn declaration(&mut self) -> PResult<Option<StmtIdx>> {
        match self.declaration_inner() {
            Ok(idx) => Ok(Some(idx)),
            Err(err) if err.kind.is_recoverable_parse() => {
                self.report(err);
                self.synchronize();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn declaration_inner(&mut self) -> PResult<StmtIdx> {
        if self.eat(&[TokenTag::Var]).is_some() {
            self.var_declaration()
        } else if self.eat(&[TokenTag::Fun]).is_some() {
            self.function("function")
        } else if self.eat(&[TokenTag::Class]).is_some() {
            self.class_declaration()
        } else {
            self.statement()
        }
    }

    fn var_declaration(&mut self) -> PResult<StmtIdx> {
        let name = self.consume(
            TokenTag::Identifier,
            ErrorKind::ExpectedIdentifier,
            "expected variable name",
        )?;
        let initializer = if self.eat(&[TokenTag::Equal]).is_some() {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(
            TokenTag::Semicolon,
            ErrorKind::ExpectedSemiColon,
            "expected ';' after variable declaration",
        )?;
        Ok(self.ast.push_stmt(Stmt::Variable { name, initializer }))
    }

    /// Parses a function or method declaration (the `fun` keyword, for
    /// functions, has already been consumed).
    fn function(&mut self, what: &str) -> PResult<StmtIdx> {
        let name = self.consume(
            TokenTag::Identifier,
            ErrorKind::ExpectedIdentifier,
            format!("expected {what} name"),
        )?;
        self.consume(
            TokenTag::LeftParen,
            ErrorKind::ExpectedOpeningParen,
            format!("expected '(' after {what} name"),
        )?;
        let mut params = Vec::new();
        if !self.check(TokenTag::RightParen) {
            loop {
                if params.len() >= MAX_CALL_ARGS {
                    // Report, but keep parsing; the list itself is well formed.
                    self.report_overflow(format!("more than {MAX_CALL_ARGS} parameters"));
                }
                params.push(self.consume(
                    TokenTag::Identifier,
                    ErrorKind::ExpectedIdentifier,
                    "expected parameter name",
                )?);
                if self.eat(&[TokenTag::Comma]).is_none() {
                    break;
                }
            }
        }
        self.consume(
            TokenTag::RightParen,
            ErrorKind::ExpectedClosingParen,
            "expected ')' after parameters",
        )?;
        let brace = match self.eat(&[TokenTag::LeftBrace]) {
            Some(brace) => brace,
            None => {
                return Err(self.error_at_current(
                    ErrorKind::ExpectedBlockStatement,
                    format!("expected '{{' before {what} body"),
                ))
            }
        };
        let body = self.block(brace)?;
        Ok(self.ast.push_stmt(Stmt::Function { name, params, body }))
    }

    fn class_declaration(&mut self) -> PResult<StmtIdx> {
        let name = self.consume(
            TokenTag::Identifier,
            ErrorKind::ExpectedIdentifier,
            "expected class name",
        )?;
        let superclass = if self.eat(&[TokenTag::Less]).is_some() {
            let super_name = self.consume(
                TokenTag::Identifier,
                ErrorKind::ExpectedIdentifier,
                "expected superclass name",
            )?;
            Some(self.ast.push_expr(Expr::Variable { name: super_name }))
        } else {
            None
        };
        self.consume(
            TokenTag::LeftBrace,
            ErrorKind::ExpectedToken,
            "expected '{' before class body",
        )?;
        let mut methods = Vec::new();
        while !self.check(TokenTag::RightBrace) && !self.check(TokenTag::Eof) {
            methods.push(self.function("method")?);
        }
        self.consume(
            TokenTag::RightBrace,
            ErrorKind::ExpectedClosingBrace,
            "expected '}' after class body",
        )?;
        Ok(self.ast.push_stmt(Stmt::Class {
            name,
            superclass,
            methods,
        }))
    }

    fn statement(&mut self) -> PResult<StmtIdx> {
        if self.eat(&[TokenTag::If]).is_some() {
            self.if_statement()
        } else if self.eat(&[TokenTag::While]).is_some() {
            self.while_statement()
        } else if let Some(keyword) = self.eat(&[TokenTag::For]) {
            self.for_statement(keyword)
        } else if let Some(brace) = self.eat(&[TokenTag::LeftBrace]) {
            self.block(brace)
        } else if self.eat(&[TokenTag::Print]).is_some() {
            self.print_statement()
        } else if let Some(keyword) = self.eat(&[TokenTag::Return]) {
            self.return_statement(keyword)
        } else {
            self.expression_statement()
        }
    }

    fn block(&mut self, brace: Token) -> PResult<StmtIdx> {
        let mut statements = Vec::new();
        while !self.check(TokenTag::RightBrace) && !self.check(TokenTag::Eof) {
            if let Some(idx) = self.declaration()? {
                statements.push(idx);
            }
        }
        self.consume(
            TokenTag::RightBrace,
            ErrorKind::ExpectedClosingBrace,
            "expected '}' after block",
        )?;
        Ok(self.ast.push_stmt(Stmt::Block {
            statements,
            loc: brace,
        }))
    }

    fn if_statement(&mut self) -> PResult<StmtIdx> {
        self.consume(
            TokenTag::LeftParen,
            ErrorKind::ExpectedOpeningParen,
            "expected '(' after 'if'",
        )?;
        let condition = self.expression()?;
        self.consume(
            TokenTag::RightParen,
            ErrorKind::ExpectedClosingParen,
            "expected ')' after if condition",
        )?;
        let then_branch = self.statement()?;
        let else_branch = if self.eat(&[TokenTag::Else]).is_some() {
            Some(self.statement()?)
        } else {
            None
        };
        Ok(self.ast.push_stmt(Stmt::If {
            condition,
            then_branch,
            else_branch,
        }))
    }

    fn while_statement(&mut self) -> PResult<StmtIdx> {
        self.consume(
            TokenTag::LeftParen,
            ErrorKind::ExpectedOpeningParen,
            "expected '(' after 'while'",
        )?;
        let condition = self.expression()?;
        self.consume(
            TokenTag::RightParen,
            ErrorKind::ExpectedClosingParen,
            "expected ')' after while condition",
        )?;
        let body = self.statement()?;
        Ok(self.ast.push_stmt(Stmt::While { condition, body }))
    }

    /// `for` has no node of its own: it desugars into
    /// `{ init; while (cond) { body; inc; } }` with a default `true`
    /// condition when omitted. The `for` keyword stands in as the location
    /// token of the synthetic blocks.
    fn for_statement(&mut self, keyword: Token) -> PResult<StmtIdx> {
        self.consume(
            TokenTag::LeftParen,
            ErrorKind::ExpectedOpeningParen,
            "expected '(' after 'for'",
        )?;

        let initializer = if self.eat(&[TokenTag::Semicolon]).is_some() {
            None
        } else if self.eat(&[TokenTag::Var]).is_some() {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if self.check(TokenTag::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(
            TokenTag::Semicolon,
            ErrorKind::ExpectedSemiColon,
            "expected ';' after loop condition",
        )?;

        let increment = if self.check(TokenTag::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(
            TokenTag::RightParen,
            ErrorKind::ExpectedClosingParen,
            "expected ')' after for clauses",
        )?;

        let mut body = self.statement()?;

        if let Some(inc) = increment {
            let inc_stmt = self.ast.push_stmt(Stmt::Expression { value: inc });
            body = self.ast.push_stmt(Stmt::Block {
                statements: vec![body, inc_stmt],
                loc: keyword,
            });
        }

        let condition = condition.unwrap_or_else(|| {
            self.ast.push_expr(Expr::Literal {
                value: Lit::Bool(true),
            })
        });
        let loop_stmt = self.ast.push_stmt(Stmt::While { condition, body });

        Ok(match initializer {
            Some(init) => self.ast.push_stmt(Stmt::Block {
                statements: vec![init, loop_stmt],
                loc: keyword,
            }),
            None => loop_stmt,
        })
    }

    fn print_statement(&mut self) -> PResult<StmtIdx> {
        let value = self.expression()?;
        self.consume(
            TokenTag::Semicolon,
            ErrorKind::ExpectedSemiColon,
            "expected ';' after value",
        )?;
        Ok(self.ast.push_stmt(Stmt::Print { value }))
    }

    fn return_statement(&mut self, keyword: Token) -> PResult<StmtIdx> {
        let value = if self.check(TokenTag::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(
            TokenTag::Semicolon,
            ErrorKind::ExpectedSemiColon,
            "expected ';' after return value",
        )?;
        Ok(self.ast.push_stmt(Stmt::Return { keyword, value }))
    }

    fn expression_statement(&mut self) -> PResult<StmtIdx> {
        let value = self.expression()?;
        self.consume(
            TokenTag::Semicolon,
            ErrorKind::ExpectedSemiColon,
            "expected ';' after expression",
        )?;
        Ok(self.ast.push_stmt(Stmt::Expression { value }))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn expression(&mut self) -> PResult<ExprIdx> {
        self.assignment()
    }

    /// Parses an r-value first, then reinterprets it as an assignment target
    /// when an `=` follows. Only `Variable` and `Get` are valid targets.
    fn assignment(&mut self) -> PResult<ExprIdx> {
        let expr = self.logical_or()?;
        if let Some(equals) = self.eat(&[TokenTag::Equal]) {
            let value = self.assignment()?;
            return match *self.ast.expr(expr) {
                Expr::Variable { name } => Ok(self.ast.push_expr(Expr::Assign { name, value })),
                Expr::Get { object, name } => {
                    Ok(self.ast.push_expr(Expr::Set { object, name, value }))
                }
                _ => Err(ParseError::new(
                    ErrorKind::ExpectedLVal,
                    "invalid assignment target",
                    equals,
                )),
            };
        }
        Ok(expr)
    }

    fn logical_or(&mut self) -> PResult<ExprIdx> {
        self.binary(&[TokenTag::Or], Self::logical_and, true)
    }

    fn logical_and(&mut self) -> PResult<ExprIdx> {
        self.binary(&[TokenTag::And], Self::equality, true)
    }

    fn equality(&mut self) -> PResult<ExprIdx> {
        self.binary(
            &[TokenTag::BangEqual, TokenTag::EqualEqual],
            Self::comparison,
            false,
        )
    }

    fn comparison(&mut self) -> PResult<ExprIdx> {
        self.binary(
            &[
                TokenTag::Greater,
                TokenTag::GreaterEqual,
                TokenTag::Less,
                TokenTag::LessEqual,
            ],
            Self::term,
            false,
        )
    }

    fn term(&mut self) -> PResult<ExprIdx> {
        self.binary(&[TokenTag::Minus, TokenTag::Plus], Self::factor, false)
    }

    fn factor(&mut self) -> PResult<ExprIdx> {
        self.binary(&[TokenTag::Slash, TokenTag::Star], Self::unary, false)
    }

    /// Shared helper for every left-associative binary level: loop on the
    /// given operator set, parsing operands with the next-higher parser.
    fn binary(
        &mut self,
        ops: &[TokenTag],
        next: fn(&mut Self) -> PResult<ExprIdx>,
        logical: bool,
    ) -> PResult<ExprIdx> {
        let mut left = next(self)?;
        while let Some(op) = self.eat(ops) {
            let right = next(self)?;
            left = self.ast.push_expr(if logical {
                Expr::Logical { left, op, right }
            } else {
                Expr::Binary { left, op, right }
            });
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<ExprIdx> {
        if let Some(op) = self.eat(&[TokenTag::Bang, TokenTag::Minus]) {
            let expr = self.unary()?;
            return Ok(self.ast.push_expr(Expr::Unary { op, expr }));
        }
        self.call()
    }

    /// Parses postfix `(args)` and `.name` chains.
    fn call(&mut self) -> PResult<ExprIdx> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&[TokenTag::LeftParen]).is_some() {
                expr = self.finish_call(expr)?;
            } else if self.eat(&[TokenTag::Dot]).is_some() {
                let name = self.consume(
                    TokenTag::Identifier,
                    ErrorKind::ExpectedIdentifier,
                    "expected property name after '.'",
                )?;
                expr = self.ast.push_expr(Expr::Get { object: expr, name });
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: ExprIdx) -> PResult<ExprIdx> {
        let mut args = Vec::new();
        if !self.check(TokenTag::RightParen) {
            loop {
                if args.len() >= MAX_CALL_ARGS {
                    self.report_overflow(format!("more than {MAX_CALL_ARGS} arguments"));
                }
                args.push(self.expression()?);
                if self.eat(&[TokenTag::Comma]).is_none() {
                    break;
                }
            }
        }
        let paren = self.consume(
            TokenTag::RightParen,
            ErrorKind::ExpectedClosingParen,
            "expected ')' after arguments",
        )?;
        Ok(self.ast.push_expr(Expr::Call { callee, paren, args }))
    }

    fn primary(&mut self) -> PResult<ExprIdx> {
        let token = self.peek();
        let expr = match token.tag {
            TokenTag::False => {
                self.advance();
                Expr::Literal {
                    value: Lit::Bool(false),
                }
            }
            TokenTag::True => {
                self.advance();
                Expr::Literal {
                    value: Lit::Bool(true),
                }
            }
            TokenTag::Nil => {
                self.advance();
                Expr::Literal { value: Lit::Nil }
            }
            TokenTag::Number => {
                self.advance();
                Expr::Literal {
                    value: Lit::Number(token.number_literal(self.src)),
                }
            }
            TokenTag::Str => {
                self.advance();
                // Store the span with the quotes already stripped; the
                // evaluator allocates only when the literal is reached.
                Expr::Literal {
                    value: Lit::Str(Span {
                        start: token.span.start + 1,
                        end: token.span.end - 1,
                    }),
                }
            }
            TokenTag::Identifier => {
                self.advance();
                Expr::Variable { name: token }
            }
            TokenTag::This => {
                self.advance();
                Expr::This { keyword: token }
            }
            TokenTag::Super => {
                self.advance();
                self.consume(
                    TokenTag::Dot,
                    ErrorKind::ExpectedToken,
                    "expected '.' after 'super'",
                )?;
                let method = self.consume(
                    TokenTag::Identifier,
                    ErrorKind::ExpectedIdentifier,
                    "expected superclass method name",
                )?;
                Expr::Super {
                    keyword: token,
                    method,
                }
            }
            TokenTag::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(
                    TokenTag::RightParen,
                    ErrorKind::ExpectedClosingParen,
                    "expected ')' after expression",
                )?;
                Expr::Group { expr }
            }
            TokenTag::Invalid => {
                return Err(ParseError::new(
                    ErrorKind::UnexpectedToken,
                    "unexpected token",
                    token,
                ))
            }
            _ => {
                return Err(ParseError::new(
                    ErrorKind::ExpectedExpression,
                    "expected expression",
                    token,
                ))
            }
        };
        Ok(self.ast.push_expr(expr))
    }

    // ========================================================================
    // Token plumbing and error recovery
    // ========================================================================

    fn peek(&self) -> Token {
        self.tokens[self.current]
    }

    fn check(&self, tag: TokenTag) -> bool {
        self.peek().tag == tag
    }

    /// Advances past the current token and returns it. Never moves past the
    /// trailing `Eof`.
    fn advance(&mut self) -> Token {
        let token = self.peek();
        if token.tag != TokenTag::Eof {
            self.current += 1;
        }
        token
    }

    /// Consumes and returns the current token if its tag is in `tags`.
    fn eat(&mut self, tags: &[TokenTag]) -> Option<Token> {
        if tags.contains(&self.peek().tag) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn consume(
        &mut self,
        tag: TokenTag,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> PResult<Token> {
        if self.check(tag) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(kind, message))
        }
    }

    fn error_at_current(&self, kind: ErrorKind, message: impl Into<String>) -> ParseError {
        ParseError::new(kind, message, self.peek())
    }

    /// Reports an overflowing argument/parameter list without entering
    /// panic mode: the list itself still parses.
    fn report_overflow(&mut self, message: String) {
        let token = self.peek();
        self.diags.report_error(
            Diagnostic::new(ErrorKind::TooManyArguments, message, token.loc)
                .with_lexeme(token.lexeme(self.src)),
        );
    }

    /// Buffers a parse error unless panic mode already swallowed one for
    /// this stretch of input.
    fn report(&mut self, err: ParseError) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let mut diagnostic = Diagnostic::new(err.kind, err.message, err.token.loc);
        if err.token.tag != TokenTag::Eof {
            diagnostic = diagnostic.with_lexeme(err.token.lexeme(self.src));
        }
        self.diags.report_error(diagnostic);
    }

    /// Panic-mode recovery: discard tokens until just past a `;` or just
    /// before the next declaration-starting keyword.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.check(TokenTag::Eof) {
            match self.peek().tag {
                TokenTag::Class
                | TokenTag::Fun
                | TokenTag::Var
                | TokenTag::For
                | TokenTag::If
                | TokenTag::While
                | TokenTag::Print
                | TokenTag::Return => return,
                _ => {}
            }
            if self.advance().tag == TokenTag::Semicolon {
                return;
            }
        }
    }
}
