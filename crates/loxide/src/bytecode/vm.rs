//! The stack machine.
//!
//! A tight decode loop over `code[ip]`: each arm pops its operands, checks
//! types, pushes the result, and continues. The VM is strict about types —
//! arithmetic and comparisons take numbers, `Not`/`And`/`Or` take booleans —
//! unlike the treewalk's universal truthiness; equality alone accepts any
//! pair and reports mismatched kinds as unequal.
//!
//! `Return` ends the chunk: the final value is popped and printed through
//! the [`PrintWriter`], which is the backend's observable output. Runtime
//! failures report a diagnostic carrying the source line from the chunk's
//! line map. Stack underflow cannot occur on compiler-produced chunks and is
//! treated as a fatal internal error.

use super::chunk::{Chunk, Value};
use super::op::Opcode;
use crate::diagnostics::{Diagnostic, Diagnostics, ErrorKind};
use crate::io::PrintWriter;
use crate::token::SrcLoc;

/// What an execution attempt produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// The virtual machine. Construct per chunk, call [`Vm::run`] once.
pub struct Vm<'a, W: PrintWriter> {
    chunk: &'a Chunk,
    ip: usize,
    stack: Vec<Value>,
    out: &'a mut W,
}

impl<'a, W: PrintWriter> Vm<'a, W> {
    #[must_use]
    pub fn new(chunk: &'a Chunk, out: &'a mut W) -> Self {
        Self {
            chunk,
            ip: 0,
            stack: Vec::new(),
            out,
        }
    }

    /// Runs the chunk to its `Return`.
    pub fn run(&mut self, diags: &mut Diagnostics) -> InterpretResult {
        loop {
            let op_offset = self.ip;
            let Some(&byte) = self.chunk.code().get(self.ip) else {
                return self.fail(diags, ErrorKind::UnexpectedToken, "ran off the end of the chunk", op_offset);
            };
            self.ip += 1;
            let Some(op) = Opcode::from_repr(byte) else {
                return self.fail(
                    diags,
                    ErrorKind::UnexpectedToken,
                    format!("invalid opcode 0x{byte:02x}"),
                    op_offset,
                );
            };

            match op {
                Opcode::Constant => {
                    let index = self.chunk.code()[self.ip];
                    self.ip += 1;
                    self.stack.push(self.chunk.constant(index).clone());
                }
                Opcode::Nil => self.stack.push(Value::Nil),
                Opcode::True => self.stack.push(Value::Bool(true)),
                Opcode::False => self.stack.push(Value::Bool(false)),

                Opcode::Add => match self.pop_numbers() {
                    Ok((a, b)) => self.stack.push(Value::Number(a + b)),
                    Err(pair) => return self.operands_fail(diags, op, pair, op_offset),
                },
                Opcode::Subtract => match self.pop_numbers() {
                    Ok((a, b)) => self.stack.push(Value::Number(a - b)),
                    Err(pair) => return self.operands_fail(diags, op, pair, op_offset),
                },
                Opcode::Multiply => match self.pop_numbers() {
                    Ok((a, b)) => self.stack.push(Value::Number(a * b)),
                    Err(pair) => return self.operands_fail(diags, op, pair, op_offset),
                },
                Opcode::Divide => match self.pop_numbers() {
                    Ok((_, divisor)) if divisor == 0.0 => {
                        return self.fail(diags, ErrorKind::DivisionByZero, "division by zero", op_offset)
                    }
                    Ok((a, b)) => self.stack.push(Value::Number(a / b)),
                    Err(pair) => return self.operands_fail(diags, op, pair, op_offset),
                },

                Opcode::Greater => match self.pop_numbers() {
                    Ok((a, b)) => self.stack.push(Value::Bool(a > b)),
                    Err(pair) => return self.operands_fail(diags, op, pair, op_offset),
                },
                Opcode::GreaterEqual => match self.pop_numbers() {
                    Ok((a, b)) => self.stack.push(Value::Bool(a >= b)),
                    Err(pair) => return self.operands_fail(diags, op, pair, op_offset),
                },
                Opcode::Less => match self.pop_numbers() {
                    Ok((a, b)) => self.stack.push(Value::Bool(a < b)),
                    Err(pair) => return self.operands_fail(diags, op, pair, op_offset),
                },
                Opcode::LessEqual => match self.pop_numbers() {
                    Ok((a, b)) => self.stack.push(Value::Bool(a <= b)),
                    Err(pair) => return self.operands_fail(diags, op, pair, op_offset),
                },

                // Values of different kinds compare unequal, never error.
                Opcode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(Value::Bool(a == b));
                }
                Opcode::NotEqual => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(Value::Bool(a != b));
                }

                Opcode::Negate => match self.pop() {
                    Value::Number(n) => self.stack.push(Value::Number(-n)),
                    other => {
                        return self.fail(
                            diags,
                            ErrorKind::TypeMismatch,
                            format!("operand to Negate must be a number, not a {}", other.type_name()),
                            op_offset,
                        )
                    }
                },
                Opcode::Not => match self.pop() {
                    Value::Bool(b) => self.stack.push(Value::Bool(!b)),
                    other => {
                        return self.fail(
                            diags,
                            ErrorKind::TypeMismatch,
                            format!("operand to Not must be a boolean, not a {}", other.type_name()),
                            op_offset,
                        )
                    }
                },

                Opcode::And => match self.pop_booleans() {
                    Ok((a, b)) => self.stack.push(Value::Bool(a && b)),
                    Err(pair) => return self.boolean_fail(diags, op, pair, op_offset),
                },
                Opcode::Or => match self.pop_booleans() {
                    Ok((a, b)) => self.stack.push(Value::Bool(a || b)),
                    Err(pair) => return self.boolean_fail(diags, op, pair, op_offset),
                },

                Opcode::Jump => {
                    let offset = self.read_u16();
                    self.ip += offset as usize;
                }
                Opcode::JumpIfFalse => {
                    let offset = self.read_u16();
                    match self.pop() {
                        Value::Bool(false) => self.ip += offset as usize,
                        Value::Bool(true) => {}
                        other => {
                            return self.fail(
                                diags,
                                ErrorKind::TypeMismatch,
                                format!(
                                    "operand to JumpIfFalse must be a boolean, not a {}",
                                    other.type_name()
                                ),
                                op_offset,
                            )
                        }
                    }
                }

                Opcode::Return => {
                    let value = self.pop();
                    self.out.print_line(&value.to_string());
                    return InterpretResult::Ok;
                }
            }
        }
    }

    fn read_u16(&mut self) -> u16 {
        let operand =
            u16::from_le_bytes([self.chunk.code()[self.ip], self.chunk.code()[self.ip + 1]]);
        self.ip += 2;
        operand
    }

    /// # Panics
    ///
    /// Underflow is a compiler bug, not a user error.
    fn pop(&mut self) -> Value {
        self.stack.pop().expect("value stack underflow")
    }

    fn pop_numbers(&mut self) -> Result<(f64, f64), (Value, Value)> {
        let b = self.pop();
        let a = self.pop();
        match (a, b) {
            (Value::Number(a), Value::Number(b)) => Ok((a, b)),
            pair => Err(pair),
        }
    }

    fn pop_booleans(&mut self) -> Result<(bool, bool), (Value, Value)> {
        let b = self.pop();
        let a = self.pop();
        match (a, b) {
            (Value::Bool(a), Value::Bool(b)) => Ok((a, b)),
            pair => Err(pair),
        }
    }

    fn operands_fail(
        &self,
        diags: &mut Diagnostics,
        op: Opcode,
        (a, b): (Value, Value),
        offset: usize,
    ) -> InterpretResult {
        self.fail(
            diags,
            ErrorKind::TypeMismatch,
            format!(
                "operands to {op} must be numbers, not {} and {}",
                a.type_name(),
                b.type_name()
            ),
            offset,
        )
    }

    fn boolean_fail(
        &self,
        diags: &mut Diagnostics,
        op: Opcode,
        (a, b): (Value, Value),
        offset: usize,
    ) -> InterpretResult {
        self.fail(
            diags,
            ErrorKind::TypeMismatch,
            format!(
                "operands to {op} must be booleans, not {} and {}",
                a.type_name(),
                b.type_name()
            ),
            offset,
        )
    }

    fn fail(
        &self,
        diags: &mut Diagnostics,
        kind: ErrorKind,
        message: impl Into<String>,
        offset: usize,
    ) -> InterpretResult {
        diags.report_error(Diagnostic::new(
            kind,
            message,
            SrcLoc::new(self.chunk.line(offset), 1),
        ));
        InterpretResult::RuntimeError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler::compile;
    use crate::io::CollectPrint;
    use crate::scanner::Scanner;

    fn run(src: &str) -> (String, InterpretResult, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = Scanner::new(src).scan(&mut diags);
        assert!(!diags.has_errors(), "test source should lex cleanly");
        let chunk = compile(src, &tokens).expect("test source should compile");
        let mut out = CollectPrint::new();
        let result = Vm::new(&chunk, &mut out).run(&mut diags);
        (out.output().to_owned(), result, diags)
    }

    fn run_ok(src: &str) -> String {
        let (output, result, diags) = run(src);
        assert_eq!(result, InterpretResult::Ok, "diags: {:?}", diags.errors());
        output
    }

    fn run_err(src: &str) -> Diagnostic {
        let (_, result, diags) = run(src);
        assert_eq!(result, InterpretResult::RuntimeError);
        diags.errors()[0].clone()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(run_ok("1 + 2 * 3"), "7\n");
        assert_eq!(run_ok("(1 + 2) * 3"), "9\n");
        assert_eq!(run_ok("7 / 2"), "3.5\n");
        assert_eq!(run_ok("-(1 + 2)"), "-3\n");
    }

    #[test]
    fn comparisons_produce_booleans() {
        assert_eq!(run_ok("1 < 2"), "true\n");
        assert_eq!(run_ok("2 <= 1"), "false\n");
        assert_eq!(run_ok("3 > 2"), "true\n");
        assert_eq!(run_ok("3 >= 4"), "false\n");
    }

    #[test]
    fn equality_never_errors_across_kinds() {
        assert_eq!(run_ok("1 == 1"), "true\n");
        assert_eq!(run_ok("1 == \"1\""), "false\n");
        assert_eq!(run_ok("nil == false"), "false\n");
        assert_eq!(run_ok("\"ab\" == \"ab\""), "true\n");
        assert_eq!(run_ok("nil != 0"), "true\n");
    }

    #[test]
    fn boolean_logic_is_strict() {
        assert_eq!(run_ok("true and false"), "false\n");
        assert_eq!(run_ok("false or true"), "true\n");
        assert_eq!(run_ok("!false"), "true\n");
        // Stricter than the treewalk: non-booleans are errors here.
        assert_eq!(run_err("!1").kind, ErrorKind::TypeMismatch);
        assert_eq!(run_err("1 and 2").kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn arithmetic_requires_numbers() {
        let diag = run_err("1 + nil");
        assert_eq!(diag.kind, ErrorKind::TypeMismatch);
        assert!(diag.message.contains("number"));
        assert_eq!(run_err("-\"a\"").kind, ErrorKind::TypeMismatch);
        assert_eq!(run_err("\"a\" < \"b\"").kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        assert_eq!(run_err("1 / 0").kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn runtime_errors_carry_the_source_line() {
        let diag = run_err("\n\n1 + nil");
        assert_eq!(diag.loc.line, 3);
    }

    #[test]
    fn jump_skips_forward() {
        // Jump +1 hops over the True push; Return sees Nil.
        let mut chunk = Chunk::new();
        chunk.write_op(Opcode::Jump, 1);
        chunk.write(1, 1);
        chunk.write(0, 1);
        chunk.write_op(Opcode::True, 1);
        chunk.write_op(Opcode::Nil, 1);
        chunk.write_op(Opcode::Return, 1);

        let mut diags = Diagnostics::new();
        let mut out = CollectPrint::new();
        let result = Vm::new(&chunk, &mut out).run(&mut diags);
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(out.output(), "nil\n");
    }

    #[test]
    fn jump_if_false_pops_its_condition() {
        // False: jump +2 lands on the False/Return tail. True: falls through.
        for (condition, expected) in [(Opcode::False, "false\n"), (Opcode::True, "true\n")] {
            let mut chunk = Chunk::new();
            chunk.write_op(condition, 1);
            chunk.write_op(Opcode::JumpIfFalse, 1);
            chunk.write(2, 1);
            chunk.write(0, 1);
            chunk.write_op(Opcode::True, 1);
            chunk.write_op(Opcode::Return, 1);
            chunk.write_op(Opcode::False, 1);
            chunk.write_op(Opcode::Return, 1);

            let mut diags = Diagnostics::new();
            let mut out = CollectPrint::new();
            let result = Vm::new(&chunk, &mut out).run(&mut diags);
            assert_eq!(result, InterpretResult::Ok);
            assert_eq!(out.output(), expected);
        }
    }

    #[test]
    fn string_constants_flow_through() {
        assert_eq!(run_ok("\"hello\" == \"hello\""), "true\n");
        assert_eq!(run_err("\"a\" + \"b\"").kind, ErrorKind::TypeMismatch);
    }
}
