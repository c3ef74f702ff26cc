//! Pipeline entry points: the library's interface to drivers.
//!
//! [`run_source`] executes a whole program through the treewalk pipeline;
//! [`run_bytecode`] pushes an expression through the compiler and VM;
//! [`ReplSession`] keeps one treewalk pipeline alive across fed lines.
//!
//! Diagnostics are buffered, never printed here: callers render them at
//! their boundary and map [`ExecStatus`] to an exit code.

use ahash::AHashMap;

use crate::ast::Ast;
use crate::bytecode::{self, Chunk, InterpretResult, Vm};
use crate::diagnostics::Diagnostics;
use crate::env::EnvRef;
use crate::io::PrintWriter;
use crate::parser::Parser;
use crate::printer::AstPrinter;
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::token::Token;
use crate::treewalk::{new_globals, Interpreter};

/// Outcome of a pipeline run, mirroring the process exit conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Ok,
    /// Lexing, parsing, static analysis, or bytecode compilation failed.
    CompileError,
    RuntimeError,
}

impl ExecStatus {
    /// The conventional process exit code for this outcome.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::CompileError => 65,
            Self::RuntimeError => 70,
        }
    }
}

/// Runs a whole program through scan → parse → resolve → interpret.
///
/// Errors land in `diags`; the returned status says which stage failed
/// first. Execution is never attempted once any stage reported an error.
pub fn run_source(source: &str, out: &mut impl PrintWriter, diags: &mut Diagnostics) -> ExecStatus {
    let tokens = Scanner::new(source).scan(diags);
    if diags.has_errors() {
        return ExecStatus::CompileError;
    }

    let mut ast = Ast::new();
    let Some(root) = Parser::new(source, &tokens, &mut ast, diags).parse() else {
        return ExecStatus::CompileError;
    };
    if diags.has_errors() {
        return ExecStatus::CompileError;
    }

    let locals = Resolver::new(source, &ast, diags).resolve(root);
    if diags.has_errors() {
        return ExecStatus::CompileError;
    }

    let mut interpreter = Interpreter::new(&ast, source, &locals, new_globals(), out);
    match interpreter.interpret(root) {
        Ok(()) => ExecStatus::Ok,
        Err(diagnostic) => {
            diags.report_error(diagnostic);
            ExecStatus::RuntimeError
        }
    }
}

/// Parses a program and renders its AST as s-expressions, one top-level
/// statement per line. `None` when lexing or parsing failed.
#[must_use]
pub fn render_ast(source: &str, diags: &mut Diagnostics) -> Option<String> {
    let tokens = Scanner::new(source).scan(diags);
    if diags.has_errors() {
        return None;
    }
    let mut ast = Ast::new();
    let root = Parser::new(source, &tokens, &mut ast, diags).parse()?;
    if diags.has_errors() {
        return None;
    }
    Some(AstPrinter::new(&ast, source).print_program(root))
}

/// Compiles an expression to a chunk, reporting errors into `diags`.
#[must_use]
pub fn compile_bytecode(source: &str, diags: &mut Diagnostics) -> Option<Chunk> {
    let tokens = Scanner::new(source).scan(diags);
    if diags.has_errors() {
        return None;
    }
    match bytecode::compile(source, &tokens) {
        Ok(chunk) => Some(chunk),
        Err(diagnostic) => {
            diags.report_error(diagnostic);
            None
        }
    }
}

/// Runs an expression through the bytecode backend: scan → compile → VM.
pub fn run_bytecode(source: &str, out: &mut impl PrintWriter, diags: &mut Diagnostics) -> ExecStatus {
    let Some(chunk) = compile_bytecode(source, diags) else {
        return ExecStatus::CompileError;
    };
    match Vm::new(&chunk, out).run(diags) {
        InterpretResult::Ok => ExecStatus::Ok,
        InterpretResult::CompileError => ExecStatus::CompileError,
        InterpretResult::RuntimeError => ExecStatus::RuntimeError,
    }
}

/// A persistent treewalk pipeline for line-at-a-time execution.
///
/// Bindings survive across [`ReplSession::feed`] calls because the session
/// owns the global environment and never replays old lines. Three pieces of
/// state make the no-replay design work:
///
/// - the source buffer is append-only, so spans in old tokens stay valid;
/// - the AST arena only grows, so closures created by earlier lines keep
///   dereferencing their bodies;
/// - the resolver side-table accumulates, keyed on token identity, which is
///   unique per occurrence even across lines.
#[derive(Debug)]
pub struct ReplSession {
    source: String,
    ast: Ast,
    globals: EnvRef,
    locals: AHashMap<Token, usize>,
    diags: Diagnostics,
    /// 1-based line number the next fed line starts on.
    next_line: u32,
}

impl Default for ReplSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: String::new(),
            ast: Ast::new(),
            globals: new_globals(),
            locals: AHashMap::new(),
            diags: Diagnostics::new(),
            next_line: 1,
        }
    }

    /// Executes one fed line against the session state.
    ///
    /// On failure the diagnostics are available via
    /// [`ReplSession::diagnostics`] until the next feed; session state keeps
    /// whatever the line managed to do before failing, like any interactive
    /// interpreter.
    pub fn feed(&mut self, line: &str, out: &mut impl PrintWriter) -> ExecStatus {
        self.diags.clear();

        let offset = self.source.len();
        let start_line = self.next_line;
        self.source.push_str(line);
        if !self.source.ends_with('\n') {
            self.source.push('\n');
        }
        let appended = &self.source[offset..];
        self.next_line += u32::try_from(appended.bytes().filter(|&b| b == b'\n').count())
            .expect("line count exceeds u32");

        let tokens = Scanner::with_offset(&self.source, offset, start_line).scan(&mut self.diags);
        if self.diags.has_errors() {
            return ExecStatus::CompileError;
        }

        let Some(root) = Parser::new(&self.source, &tokens, &mut self.ast, &mut self.diags).parse()
        else {
            return ExecStatus::CompileError;
        };
        if self.diags.has_errors() {
            return ExecStatus::CompileError;
        }

        let new_locals = Resolver::new(&self.source, &self.ast, &mut self.diags).resolve(root);
        if self.diags.has_errors() {
            return ExecStatus::CompileError;
        }
        self.locals.extend(new_locals);

        let mut interpreter = Interpreter::new(
            &self.ast,
            &self.source,
            &self.locals,
            self.globals.clone(),
            out,
        );
        match interpreter.interpret(root) {
            Ok(()) => ExecStatus::Ok,
            Err(diagnostic) => {
                self.diags.report_error(diagnostic);
                ExecStatus::RuntimeError
            }
        }
    }

    /// The diagnostics from the most recent [`ReplSession::feed`].
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }
}
