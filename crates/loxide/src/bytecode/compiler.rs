//! Single-pass compiler: tokens straight to bytecode.
//!
//! No AST. The compiler walks the token stream once, flipping between
//! "expecting a value" and "got a value", with an explicit operator stack of
//! `(precedence, opcode)` entries plus group markers for `(`. Value tokens
//! emit push instructions immediately; operators wait on the stack until an
//! incoming operator of equal or lower precedence (or a `)`, or the end of
//! input) flushes them, which yields left-associative postfix order without
//! recursion.
//!
//! The first compile error aborts compilation and is returned as-is.

use std::rc::Rc;

use super::chunk::{Chunk, Value, MAX_CONSTANTS};
use super::op::Opcode;
use crate::diagnostics::{Diagnostic, ErrorKind};
use crate::token::{Token, TokenTag};

/// Operator precedence, low to high. Group markers sit outside this
/// ordering: a `(` fences the stack regardless of what is above it.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    /// Bottom of the ordering. Unused until the compiler handles `=`,
    /// which needs variable storage in the VM first.
    #[expect(dead_code)]
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
}

/// One entry on the operator stack.
#[derive(Debug, Clone, Copy)]
enum Pending {
    /// An operator waiting for its right operand to finish.
    Op { prec: Prec, opcode: Opcode, line: u32 },
    /// The `(` fence. Only a matching `)` removes it.
    Group { token: Token },
}

/// Compiles one expression into a chunk terminated by `Return`.
///
/// # Errors
///
/// Returns the first compile error's diagnostic.
pub fn compile(src: &str, tokens: &[Token]) -> Result<Chunk, Diagnostic> {
    Compiler::new(src).compile(tokens)
}

struct Compiler<'a> {
    src: &'a str,
    chunk: Chunk,
    pending: Vec<Pending>,
    expecting_value: bool,
}

impl<'a> Compiler<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chunk: Chunk::new(),
            pending: Vec::new(),
            expecting_value: true,
        }
    }

    fn compile(mut self, tokens: &[Token]) -> Result<Chunk, Diagnostic> {
        for &token in tokens {
            match token.tag {
                TokenTag::Number => {
                    self.value_token(token)?;
                    self.push_constant(Value::Number(token.number_literal(self.src)), token)?;
                }
                TokenTag::Str => {
                    self.value_token(token)?;
                    self.push_constant(
                        Value::Str(Rc::from(token.string_literal(self.src))),
                        token,
                    )?;
                }
                TokenTag::True => {
                    self.value_token(token)?;
                    self.chunk.write_op(Opcode::True, token.loc.line);
                }
                TokenTag::False => {
                    self.value_token(token)?;
                    self.chunk.write_op(Opcode::False, token.loc.line);
                }
                TokenTag::Nil => {
                    self.value_token(token)?;
                    self.chunk.write_op(Opcode::Nil, token.loc.line);
                }

                TokenTag::LeftParen => {
                    if !self.expecting_value {
                        return Err(self.error(
                            ErrorKind::UnexpectedToken,
                            "expected an operator, not '('",
                            token,
                        ));
                    }
                    self.pending.push(Pending::Group { token });
                }

                TokenTag::RightParen => self.close_group(token)?,

                TokenTag::Minus => {
                    if self.expecting_value {
                        self.push_unary(Opcode::Negate, token);
                    } else {
                        self.push_binary(Prec::Term, Opcode::Subtract, token)?;
                    }
                }
                TokenTag::Bang => {
                    if self.expecting_value {
                        self.push_unary(Opcode::Not, token);
                    } else {
                        return Err(self.error(
                            ErrorKind::UnexpectedToken,
                            "'!' is not a binary operator",
                            token,
                        ));
                    }
                }

                TokenTag::Plus => self.push_binary(Prec::Term, Opcode::Add, token)?,
                TokenTag::Star => self.push_binary(Prec::Factor, Opcode::Multiply, token)?,
                TokenTag::Slash => self.push_binary(Prec::Factor, Opcode::Divide, token)?,
                TokenTag::EqualEqual => self.push_binary(Prec::Equality, Opcode::Equal, token)?,
                TokenTag::BangEqual => self.push_binary(Prec::Equality, Opcode::NotEqual, token)?,
                TokenTag::Greater => self.push_binary(Prec::Comparison, Opcode::Greater, token)?,
                TokenTag::GreaterEqual => {
                    self.push_binary(Prec::Comparison, Opcode::GreaterEqual, token)?;
                }
                TokenTag::Less => self.push_binary(Prec::Comparison, Opcode::Less, token)?,
                TokenTag::LessEqual => {
                    self.push_binary(Prec::Comparison, Opcode::LessEqual, token)?;
                }
                TokenTag::And => self.push_binary(Prec::And, Opcode::And, token)?,
                TokenTag::Or => self.push_binary(Prec::Or, Opcode::Or, token)?,

                TokenTag::Eof => {
                    self.finish(token)?;
                    break;
                }

                _ => {
                    return Err(self.error(
                        ErrorKind::UnexpectedToken,
                        "unexpected token in expression",
                        token,
                    ))
                }
            }
        }
        Ok(self.chunk)
    }

    /// Transition for tokens that produce a value.
    fn value_token(&mut self, token: Token) -> Result<(), Diagnostic> {
        if !self.expecting_value {
            return Err(self.error(
                ErrorKind::UnexpectedToken,
                "expected an operator between values",
                token,
            ));
        }
        self.expecting_value = false;
        Ok(())
    }

    fn push_constant(&mut self, value: Value, token: Token) -> Result<(), Diagnostic> {
        let Some(index) = self.chunk.add_constant(value) else {
            return Err(self.error(
                ErrorKind::OutOfMemory,
                format!("constant pool limit ({MAX_CONSTANTS}) exceeded"),
                token,
            ));
        };
        self.chunk.write_constant(index, token.loc.line);
        Ok(())
    }

    /// Unary operators wait on the stack until their operand finishes; they
    /// bind tighter than anything binary, so the ordinary pop rules emit
    /// them at the right time.
    fn push_unary(&mut self, opcode: Opcode, token: Token) {
        self.pending.push(Pending::Op {
            prec: Prec::Unary,
            opcode,
            line: token.loc.line,
        });
        // Still expecting the operand.
    }

    /// Binary operator: flush every stacked operator of equal or higher
    /// precedence (left associativity), never past a group fence, then wait.
    fn push_binary(&mut self, prec: Prec, opcode: Opcode, token: Token) -> Result<(), Diagnostic> {
        if self.expecting_value {
            return Err(self.error(
                ErrorKind::ExpectedExpression,
                "expected an operand before this operator",
                token,
            ));
        }
        while let Some(&Pending::Op {
            prec: top_prec,
            opcode: top_opcode,
            line,
        }) = self.pending.last()
        {
            if top_prec < prec {
                break;
            }
            self.pending.pop();
            self.chunk.write_op(top_opcode, line);
        }
        self.pending.push(Pending::Op {
            prec,
            opcode,
            line: token.loc.line,
        });
        self.expecting_value = true;
        Ok(())
    }

    /// `)`: flush down to the matching fence, then flush the unary
    /// operators that were waiting on the whole group.
    fn close_group(&mut self, token: Token) -> Result<(), Diagnostic> {
        if self.expecting_value {
            return Err(self.error(
                ErrorKind::ExpectedExpression,
                "expected an expression before ')'",
                token,
            ));
        }
        loop {
            match self.pending.pop() {
                Some(Pending::Group { .. }) => break,
                Some(Pending::Op { opcode, line, .. }) => self.chunk.write_op(opcode, line),
                None => {
                    return Err(self.error(
                        ErrorKind::UnmatchedClosingParen,
                        "no matching '(' for ')'",
                        token,
                    ))
                }
            }
        }
        while let Some(&Pending::Op {
            prec: Prec::Unary,
            opcode,
            line,
        }) = self.pending.last()
        {
            self.pending.pop();
            self.chunk.write_op(opcode, line);
        }
        Ok(())
    }

    /// End of input: drain the stack and emit `Return`. A surviving group
    /// fence means a `(` was never closed.
    fn finish(&mut self, eof: Token) -> Result<(), Diagnostic> {
        if self.expecting_value {
            return Err(self.error(ErrorKind::ExpectedExpression, "expected an expression", eof));
        }
        while let Some(entry) = self.pending.pop() {
            match entry {
                Pending::Op { opcode, line, .. } => self.chunk.write_op(opcode, line),
                Pending::Group { token } => {
                    return Err(self.error(
                        ErrorKind::UnclosedGrouping,
                        "unclosed '(' grouping",
                        token,
                    ))
                }
            }
        }
        self.chunk.write_op(Opcode::Return, eof.loc.line);
        Ok(())
    }

    fn error(&self, kind: ErrorKind, message: impl Into<String>, token: Token) -> Diagnostic {
        let diagnostic = Diagnostic::new(kind, message, token.loc);
        if token.tag == TokenTag::Eof {
            diagnostic
        } else {
            diagnostic.with_lexeme(token.lexeme(self.src))
        }
    }
}
