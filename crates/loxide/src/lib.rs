//! Loxide: a Lox interpreter with two backends.
//!
//! One scanner feeds two pipelines. The treewalk path parses into flat AST
//! arenas, resolves lexical scope distances, and evaluates directly; the
//! bytecode path compiles tokens single-pass into a chunk executed by a
//! stack VM. Drivers work through [`run_source`], [`run_bytecode`], and
//! [`ReplSession`], render buffered [`Diagnostics`] at their boundary, and
//! map [`ExecStatus`] to an exit code.

pub mod ast;
pub mod bytecode;
pub mod diagnostics;
pub mod env;
pub mod io;
pub mod parser;
pub mod printer;
pub mod resolver;
pub mod scanner;
pub mod token;
pub mod treewalk;
pub mod value;

mod run;

pub use crate::{
    bytecode::{Chunk, InterpretResult},
    diagnostics::{Diagnostic, Diagnostics, ErrorKind},
    io::{CollectPrint, NoPrint, PrintWriter, StdPrint},
    printer::AstPrinter,
    run::{compile_bytecode, render_ast, run_bytecode, run_source, ExecStatus, ReplSession},
};
