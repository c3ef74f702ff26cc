//! The bytecode backend: single-pass compiler, chunk container, and VM.
//!
//! This backend shares the scanner with the treewalk pipeline and diverges
//! after tokens: no AST is built. It currently covers the expression subset
//! of the language (arithmetic, comparison, equality, strict boolean logic,
//! grouping); statements, variables, and control flow belong to the
//! treewalk until the VM grows jumps in anger.

pub mod chunk;
pub mod compiler;
pub mod op;
pub mod vm;

pub use chunk::{Chunk, Value};
pub use compiler::compile;
pub use op::Opcode;
pub use vm::{InterpretResult, Vm};
